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

//! Toolkit for building taproot spending conditions: script codec, taproot
//! trees with tapscript descriptors, signature hashes and MuSig.

// Coding conventions
#![recursion_limit = "256"]
#![deny(dead_code, missing_docs, warnings)]

pub extern crate bitcoin_scripts as scripts;
pub extern crate bitcoin_signer as signer;
pub extern crate descriptors;

pub mod taproot {
    //! Taproot script trees, leaves and output construction.
    pub use descriptors::{generate_threshold_csa, LeafPolicy, TapLeaf, TapTree};
    pub use scripts::taproot::*;
}
pub mod miniscript {
    //! Typed tapscript fragments.
    pub use descriptors::miniscript::*;
}
pub mod sighash {
    //! Signature hashes for legacy, segwit v0 and taproot inputs.
    pub use signer::{
        legacy_sighash, segwit_v0_sighash, taproot_sighash, LegacySighash, ScriptPath, Sighash,
        SighashError, SighashOutOfRange, TapSighashType, SIGHASH_ONE,
    };
}
pub mod musig {
    //! MuSig key, nonce and signature aggregation.
    pub use signer::musig::*;
}

pub use scripts::{tagged_hash, HashTag, LockScript, Opcode, ScriptError, ScriptNum, Token};
