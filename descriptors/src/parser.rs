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

//! Low-level helpers for the descriptor string grammars: splitting of
//! `tag(arg,...)` expressions on the top-level commas and parsing of keys,
//! hex data and numbers.

use std::str::FromStr;

use bitcoin::hashes::hex::FromHex;
use bitcoin_scripts::{ScriptError, TaprootError};
use secp256k1::{PublicKey, XOnlyPublicKey};

use crate::CompositionError;

/// Errors parsing descriptor strings.
///
/// [`DescriptorError::UnrecognizedTag`] is a refinement of
/// [`DescriptorError::MalformedDescriptor`] for syntactically well-formed
/// expressions with an unknown tag; callers treating all grammar failures
/// alike should match on both.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum DescriptorError {
    /// malformed descriptor `{0}`: brackets and parentheses must be balanced
    /// and each expression must have form of `tag(arg,...)`.
    MalformedDescriptor(String),

    /// unrecognized descriptor tag `{0}`.
    UnrecognizedTag(String),

    /// invalid public key `{0}`: x-only (64 hex characters) or compressed
    /// (66 hex characters) key is expected.
    InvalidKey(String),

    /// invalid hex data `{0}`.
    InvalidHex(String),

    /// invalid number `{0}`.
    InvalidNumber(String),

    /// `{tag}` can't take {found} arguments.
    WrongArgumentCount {
        /// Descriptor tag
        tag: String,
        /// Number of provided arguments
        found: usize,
    },

    /// Invalid composition of script fragments
    #[from]
    #[display(inner)]
    Composition(CompositionError),

    /// Invalid script
    #[from]
    #[display(inner)]
    Script(ScriptError),

    /// Invalid taproot tree
    #[from]
    #[display(inner)]
    Taproot(TaprootError),
}

/// Removes all whitespace from the descriptor string.
pub(crate) fn strip_whitespace(s: &str) -> String { s.split_whitespace().collect() }

/// Splits the string on the commas which are not nested inside any brackets
/// or parentheses. Empty string produces no items.
pub(crate) fn split_args(s: &str) -> Result<Vec<&str>, DescriptorError> {
    if s.is_empty() {
        return Ok(vec![]);
    }
    let malformed = || DescriptorError::MalformedDescriptor(s.to_owned());
    let mut args = vec![];
    let mut depth = 0usize;
    let mut start = 0usize;
    for (pos, ch) in s.char_indices() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.checked_sub(1).ok_or_else(malformed)?,
            ',' if depth == 0 => {
                args.push(&s[start..pos]);
                start = pos + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(malformed());
    }
    args.push(&s[start..]);
    Ok(args)
}

/// Splits `tag(arg,...)` expression into the tag and the list of its
/// top-level arguments.
pub(crate) fn split_call(s: &str) -> Result<(&str, Vec<&str>), DescriptorError> {
    let malformed = || DescriptorError::MalformedDescriptor(s.to_owned());
    let open = s.find('(').ok_or_else(malformed)?;
    let body = s[open + 1..].strip_suffix(')').ok_or_else(malformed)?;
    let tag = &s[..open];
    if tag.is_empty() {
        return Err(malformed());
    }
    Ok((tag, split_args(body)?))
}

/// Checks the number of arguments for the given tag.
pub(crate) fn check_args(tag: &str, args: &[&str], count: usize) -> Result<(), DescriptorError> {
    if args.len() != count {
        return Err(DescriptorError::WrongArgumentCount {
            tag: tag.to_owned(),
            found: args.len(),
        });
    }
    Ok(())
}

pub(crate) fn parse_key(s: &str) -> Result<XOnlyPublicKey, DescriptorError> {
    let invalid = |_| DescriptorError::InvalidKey(s.to_owned());
    match s.len() {
        64 => XOnlyPublicKey::from_str(s).map_err(invalid),
        66 => PublicKey::from_str(s)
            .map(|pk| pk.x_only_public_key().0)
            .map_err(invalid),
        _ => Err(DescriptorError::InvalidKey(s.to_owned())),
    }
}

pub(crate) fn parse_hex(s: &str) -> Result<Vec<u8>, DescriptorError> {
    Vec::<u8>::from_hex(s).map_err(|_| DescriptorError::InvalidHex(s.to_owned()))
}

pub(crate) fn parse_hash160(s: &str) -> Result<[u8; 20], DescriptorError> {
    let data = parse_hex(s)?;
    <[u8; 20]>::try_from(data.as_slice()).map_err(|_| DescriptorError::InvalidHex(s.to_owned()))
}

pub(crate) fn parse_number<T: FromStr>(s: &str) -> Result<T, DescriptorError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DescriptorError::InvalidNumber(s.to_owned()));
    }
    T::from_str(s).map_err(|_| DescriptorError::InvalidNumber(s.to_owned()))
}
