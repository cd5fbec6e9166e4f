// Descriptor wallet library extending bitcoin & miniscript functionality
// by LNP/BP Association (https://lnp-bp.org)
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the Apache-2.0 License
// along with this software.
// If not, see <https://opensource.org/licenses/Apache-2.0>.

//! Bitcoin script codec working on the byte level, domain-separated (tagged)
//! hashes and taproot script tree construction.

// Coding conventions
#![recursion_limit = "256"]
#![deny(dead_code, missing_docs, warnings)]

#[macro_use]
extern crate amplify;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;

mod num;
pub mod opcode;
mod script;
mod tagged;
pub mod taproot;

pub use num::ScriptNum;
pub use opcode::Opcode;
pub use script::{
    push_data, Instruction, Instructions, LockScript, ScriptError, Token, MAX_SCRIPT_ELEMENT_SIZE,
};
pub use tagged::{tagged_hash, HashTag};
pub use taproot::{
    branch_hash, leaf_hash, BranchNode, ControlBlock, ControlEntry, Forest, Leaf, LeafScript,
    TapNodeHash, TaprootError, TaprootOutput, TreeNode, LEAF_VERSION_TAPSCRIPT, TAPROOT_MAX_DEPTH,
};

/// First byte of the taproot annex.
pub const ANNEX_TAG: u8 = 0x50;
