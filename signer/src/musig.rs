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

//! MuSig multi-party Schnorr signatures producing BIP-340 compatible
//! signatures for the aggregated key.
//!
//! The protocol consists of three stateless phases:
//! 1. every participant computes [`aggregate_keys`] and derives own
//!    coefficient-weighted secret with [`KeyAggregation::signing_key`];
//! 2. public nonces are exchanged and combined with [`aggregate_nonces`];
//! 3. each participant produces [`partial_sign`] signature and the partial
//!    signatures are combined with [`aggregate_signatures`].
//!
//! Both the aggregated key and the aggregated nonce follow BIP-340 evenness
//! convention: points with odd y coordinate are negated, and participants
//! negate their secrets accordingly.

use std::collections::BTreeMap;

use amplify::Wrapper;
use bitcoin::hashes::{sha256, Hash, HashEngine};
use secp256k1::constants::CURVE_ORDER;
use secp256k1::schnorr::Signature;
use secp256k1::{Parity, PublicKey, Scalar, SecretKey, XOnlyPublicKey, SECP256K1};
use tracing::{debug, trace};

use bitcoin_scripts::HashTag;

/// Errors happening during MuSig protocol.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum MusigError {
    /// no public keys are provided for the aggregation.
    NoKeys,

    /// no public nonces are provided for the aggregation.
    NoNonces,

    /// no partial signatures are provided for the aggregation.
    NoPartialSignatures,

    /// the signing key does not participate in the key aggregation.
    UnknownKey,

    /// secret nonce must be a non-zero scalar below the curve order.
    InvalidNonce,

    /// aggregated nonce must have even y coordinate.
    NonCanonicalNonce,

    /// signed message must be 32 bytes long, while {0} bytes were provided.
    InvalidMessageLength(usize),

    /// Elliptic curve operation failure
    #[from]
    #[display(inner)]
    Secp(secp256k1::Error),

    /// scalar arithmetic produced zero.
    DegenerateScalar,
}

/// Performs conditional subtraction of the curve order from a big-endian
/// 256-bit number, such that any 256-bit hash gets reduced into a scalar.
fn reduce(mut num: [u8; 32]) -> [u8; 32] {
    if num >= CURVE_ORDER {
        num = sub_order(&num);
    }
    num
}

fn sub_order(num: &[u8; 32]) -> [u8; 32] {
    let mut res = [0u8; 32];
    let mut borrow = 0i16;
    for pos in (0..32).rev() {
        let mut diff = num[pos] as i16 - CURVE_ORDER[pos] as i16 - borrow;
        borrow = 0;
        if diff < 0 {
            diff += 0x100;
            borrow = 1;
        }
        res[pos] = diff as u8;
    }
    res
}

/// Sums two scalars modulo the curve order.
fn add_mod_order(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut sum = [0u8; 32];
    let mut carry = 0u16;
    for pos in (0..32).rev() {
        let acc = a[pos] as u16 + b[pos] as u16 + carry;
        sum[pos] = acc as u8;
        carry = acc >> 8;
    }
    // with overflow the wrapping subtraction still yields the right value
    if carry != 0 || sum >= CURVE_ORDER {
        sub_order(&sum)
    } else {
        sum
    }
}

fn hash_to_scalar(hash: [u8; 32]) -> Result<Scalar, MusigError> {
    // a reduced value is always below the order
    Scalar::from_be_bytes(reduce(hash)).map_err(|_| MusigError::DegenerateScalar)
}

fn secret_to_scalar(sk: &SecretKey) -> Result<Scalar, MusigError> {
    Scalar::from_be_bytes(sk.secret_bytes()).map_err(|_| MusigError::DegenerateScalar)
}

fn mul_point(point: &PublicKey, scalar: &Scalar) -> Result<PublicKey, MusigError> {
    point.mul_tweak(SECP256K1, scalar).map_err(|_| MusigError::DegenerateScalar)
}

fn sum_points(points: &[PublicKey]) -> Result<PublicKey, MusigError> {
    let refs = points.iter().collect::<Vec<_>>();
    PublicKey::combine_keys(&refs).map_err(MusigError::from)
}

/// Result of the key aggregation: per-key coefficients and the aggregated
/// public key.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct KeyAggregation {
    coefficients: BTreeMap<PublicKey, [u8; 32]>,
    aggregate: PublicKey,
}

impl KeyAggregation {
    /// Aggregated public key, which may have odd y coordinate.
    #[inline]
    pub fn aggregate(&self) -> PublicKey { self.aggregate }

    /// X-only aggregated public key, which is the key signatures verify
    /// against.
    #[inline]
    pub fn x_only(&self) -> XOnlyPublicKey { self.aggregate.x_only_public_key().0 }

    /// Coefficient of a participating key, as a big-endian scalar.
    #[inline]
    pub fn coefficient(&self, pubkey: &PublicKey) -> Option<[u8; 32]> {
        self.coefficients.get(pubkey).copied()
    }

    /// Derives secret key used for partial signing: the participant secret
    /// multiplied by its coefficient and negated if the aggregated key has
    /// odd y coordinate.
    pub fn signing_key(&self, secret: &SecretKey) -> Result<SecretKey, MusigError> {
        let pubkey = PublicKey::from_secret_key(SECP256K1, secret);
        let coefficient = self.coefficient(&pubkey).ok_or(MusigError::UnknownKey)?;
        let coefficient =
            Scalar::from_be_bytes(coefficient).map_err(|_| MusigError::DegenerateScalar)?;
        let weighted = secret.mul_tweak(&coefficient).map_err(|_| MusigError::DegenerateScalar)?;
        Ok(match self.aggregate.x_only_public_key().1 {
            Parity::Even => weighted,
            Parity::Odd => weighted.negate(),
        })
    }
}

/// Aggregates public keys.
///
/// Coefficient for each key is `SHA256(L || x)`, where `x` is the key x
/// coordinate and `L` is SHA256 of the concatenated x coordinates sorted in
/// ascending order. The aggregated key is the sum of the keys multiplied by
/// their coefficients. The result does not depend on the order of the keys.
pub fn aggregate_keys(pubkeys: &[PublicKey]) -> Result<KeyAggregation, MusigError> {
    if pubkeys.is_empty() {
        return Err(MusigError::NoKeys);
    }

    let mut xs = pubkeys
        .iter()
        .map(|pk| pk.x_only_public_key().0.serialize())
        .collect::<Vec<_>>();
    xs.sort();
    let mut engine = sha256::Hash::engine();
    for x in &xs {
        engine.input(x);
    }
    let l = sha256::Hash::from_engine(engine);

    let mut coefficients = BTreeMap::new();
    let mut weighted = Vec::with_capacity(pubkeys.len());
    for pk in pubkeys {
        let mut engine = sha256::Hash::engine();
        engine.input(&l[..]);
        engine.input(&pk.x_only_public_key().0.serialize());
        let hash = sha256::Hash::from_engine(engine).into_inner();
        let coefficient = hash_to_scalar(hash)?;
        coefficients.insert(*pk, coefficient.to_be_bytes());
        weighted.push(mul_point(pk, &coefficient)?);
    }
    let aggregate = sum_points(&weighted)?;

    debug!(keys = pubkeys.len(), aggregate = %aggregate, "aggregated MuSig keys");
    Ok(KeyAggregation {
        coefficients,
        aggregate,
    })
}

/// Secret nonce of a single participant.
#[derive(Copy, Clone, PartialEq, Eq, Debug, From)]
pub struct SecretNonce(SecretKey);

impl SecretNonce {
    /// Constructs nonce from a big-endian scalar, which must be non-zero and
    /// below the curve order.
    pub fn from_slice(data: &[u8]) -> Result<SecretNonce, MusigError> {
        SecretKey::from_slice(data).map(SecretNonce).map_err(|_| MusigError::InvalidNonce)
    }

    /// Public nonce point shared with the other participants.
    #[inline]
    pub fn public_nonce(&self) -> PublicKey { PublicKey::from_secret_key(SECP256K1, &self.0) }
}

/// Aggregated public nonce normalized to have even y coordinate.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct AggregateNonce {
    /// Aggregated nonce point
    pub point: PublicKey,
    /// Whether the sum of the nonces was negated
    pub negated: bool,
}

impl AggregateNonce {
    /// X coordinate of the nonce point, which forms the first half of the
    /// signature.
    #[inline]
    pub fn x_only(&self) -> XOnlyPublicKey { self.point.x_only_public_key().0 }
}

/// Sums public nonces of all participants, negating the sum when it has odd
/// y coordinate.
pub fn aggregate_nonces(nonces: &[PublicKey]) -> Result<AggregateNonce, MusigError> {
    if nonces.is_empty() {
        return Err(MusigError::NoNonces);
    }
    let sum = sum_points(nonces)?;
    let nonce = match sum.x_only_public_key().1 {
        Parity::Even => AggregateNonce {
            point: sum,
            negated: false,
        },
        Parity::Odd => AggregateNonce {
            point: sum.negate(SECP256K1),
            negated: true,
        },
    };
    debug!(nonces = nonces.len(), negated = nonce.negated, "aggregated MuSig nonces");
    Ok(nonce)
}

/// Partial signature of a single participant.
#[derive(
    Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, From
)]
pub struct PartialSignature([u8; 32]);

/// Produces partial signature `k + e·x mod n`, where `e` is the BIP-340
/// challenge for the aggregated nonce, aggregated key and the message.
///
/// `signing_key` must be obtained with [`KeyAggregation::signing_key`]; the
/// nonce is negated here if the aggregated nonce was negated.
pub fn partial_sign(
    signing_key: &SecretKey,
    nonce: &SecretNonce,
    aggregate_nonce: &AggregateNonce,
    aggregate_key: &XOnlyPublicKey,
    msg: &[u8],
) -> Result<PartialSignature, MusigError> {
    if msg.len() != 32 {
        return Err(MusigError::InvalidMessageLength(msg.len()));
    }
    if aggregate_nonce.point.x_only_public_key().1 != Parity::Even {
        return Err(MusigError::NonCanonicalNonce);
    }

    let k = match aggregate_nonce.negated {
        false => nonce.0,
        true => nonce.0.negate(),
    };

    let mut engine = HashTag::Bip340Challenge.engine();
    engine.input(&aggregate_nonce.x_only().serialize());
    engine.input(&aggregate_key.serialize());
    engine.input(msg);
    let e = hash_to_scalar(sha256::Hash::from_engine(engine).into_inner())?;

    let ex = signing_key.mul_tweak(&e).map_err(|_| MusigError::DegenerateScalar)?;
    let s = k.add_tweak(&secret_to_scalar(&ex)?).map_err(|_| MusigError::DegenerateScalar)?;
    trace!(negated = aggregate_nonce.negated, "produced MuSig partial signature");
    Ok(PartialSignature(s.secret_bytes()))
}

/// Combines partial signatures into BIP-340 signature `R.x || Σs mod n`.
/// The order of partial signatures does not affect the result.
pub fn aggregate_signatures(
    partials: &[PartialSignature],
    aggregate_nonce: &AggregateNonce,
) -> Result<Signature, MusigError> {
    if partials.is_empty() {
        return Err(MusigError::NoPartialSignatures);
    }
    let s = partials
        .iter()
        .fold([0u8; 32], |acc, partial| add_mod_order(&acc, partial.as_inner()));

    let mut sig = [0u8; 64];
    sig[..32].copy_from_slice(&aggregate_nonce.x_only().serialize());
    sig[32..].copy_from_slice(&s);
    debug!(signers = partials.len(), "aggregated MuSig signature");
    Signature::from_slice(&sig).map_err(MusigError::from)
}
