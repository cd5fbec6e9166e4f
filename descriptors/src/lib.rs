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

// Coding conventions
#![recursion_limit = "256"]
#![deny(dead_code, missing_docs, warnings)]

//! Tapscript descriptors. The workflow is:
//! ```text
//! Fragment -> TapLeaf (`ts(...)`) -> TapTree (`tp(...)`) -> TaprootOutput
//! ```
//!
//! Leaves are compiled from a closed set of spending policies into typed
//! miniscript fragments; k-of-n `OP_CHECKSIGADD` leaves can be generated for
//! every k-subset of the keys.

#[macro_use]
extern crate amplify;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;

mod leaf;
pub mod miniscript;
mod parser;
mod tree;

pub use leaf::{generate_threshold_csa, LeafPolicy, TapLeaf};
pub use miniscript::{
    BaseType, CompositionError, Correctness, Fragment, Hash160Digest, Malleability,
    SatisfactionItem,
};
pub use parser::DescriptorError;
pub use tree::TapTree;
