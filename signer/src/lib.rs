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

//! Signing primitives: signature hashes for all input types (legacy, segwit
//! v0 and taproot) and MuSig aggregation of Schnorr keys and signatures.

#[macro_use]
extern crate amplify;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;

pub mod musig;
mod sighash;

pub use musig::{
    aggregate_keys, aggregate_nonces, aggregate_signatures, partial_sign, AggregateNonce,
    KeyAggregation, MusigError, PartialSignature, SecretNonce,
};
pub use sighash::{
    legacy_sighash, segwit_v0_sighash, taproot_sighash, LegacySighash, ScriptPath, Sighash,
    SighashError, SighashOutOfRange, TapSighashType, SIGHASH_ONE,
};
