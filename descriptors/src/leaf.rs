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

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use bitcoin::hashes::hex::ToHex;
use bitcoin_scripts::{Leaf, LeafScript, LockScript, LEAF_VERSION_TAPSCRIPT};
use itertools::Itertools;
use secp256k1::XOnlyPublicKey;
use tracing::debug;

use crate::miniscript::{Fragment, Hash160Digest, SatisfactionItem};
use crate::parser::{self, DescriptorError};
use crate::CompositionError;

/// Spending policy of a tapscript leaf, as written in `ts(...)` descriptors.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum LeafPolicy {
    /// `pk(K)`: single signature
    Pk(XOnlyPublicKey),

    /// `pk_delay(K,n)`: single signature after a relative timelock
    PkDelay(XOnlyPublicKey, u32),

    /// `pk_hashlock(K,H)`: single signature and a HASH160 preimage
    PkHashlock(XOnlyPublicKey, Hash160Digest),

    /// `pk_hashlock_delay(K,H,n)`: single signature and a HASH160 preimage
    /// after a relative timelock
    PkHashlockDelay(XOnlyPublicKey, Hash160Digest, u32),

    /// `csa(k,K1,...)`: k-of-m signatures
    Csa(usize, Vec<XOnlyPublicKey>),

    /// `csa_delay(k,K1,...,n)`: k-of-m signatures after a relative timelock
    CsaDelay(usize, Vec<XOnlyPublicKey>, u32),

    /// `csa_hashlock(k,K1,...,H)`: k-of-m signatures and a HASH160 preimage
    CsaHashlock(usize, Vec<XOnlyPublicKey>, Hash160Digest),

    /// `csa_hashlock_delay(k,K1,...,H,n)`: k-of-m signatures and a HASH160
    /// preimage after a relative timelock
    CsaHashlockDelay(usize, Vec<XOnlyPublicKey>, Hash160Digest, u32),

    /// `raw(HEX)`: arbitrary script
    Raw(LockScript),
}

impl LeafPolicy {
    /// Descriptor tag of the policy.
    pub fn tag(&self) -> &'static str {
        match self {
            LeafPolicy::Pk(_) => "pk",
            LeafPolicy::PkDelay(..) => "pk_delay",
            LeafPolicy::PkHashlock(..) => "pk_hashlock",
            LeafPolicy::PkHashlockDelay(..) => "pk_hashlock_delay",
            LeafPolicy::Csa(..) => "csa",
            LeafPolicy::CsaDelay(..) => "csa_delay",
            LeafPolicy::CsaHashlock(..) => "csa_hashlock",
            LeafPolicy::CsaHashlockDelay(..) => "csa_hashlock_delay",
            LeafPolicy::Raw(_) => "raw",
        }
    }

    /// Compiles policy into the miniscript fragment. Returns `None` for raw
    /// scripts.
    #[inline]
    pub fn compile(&self) -> Result<Option<Fragment>, CompositionError> {
        self.build().map(|(_, miniscript)| miniscript)
    }

    /// Produces leaf script together with the miniscript fragment it was
    /// compiled from, if any.
    fn build(&self) -> Result<(LockScript, Option<Fragment>), CompositionError> {
        type Res = Result<Fragment, CompositionError>;

        let verified_pk = |key: XOnlyPublicKey| -> Res {
            Fragment::verify(Fragment::check(Fragment::pk(key))?)
        };
        let verified_csa = |k: usize, keys: &[XOnlyPublicKey]| -> Res {
            Fragment::verify(Fragment::thresh_csa(k, keys.to_vec())?)
        };
        let hashlock_delay = |digest: Hash160Digest, delay: u32| -> Res {
            Fragment::and_v(Fragment::verify(Fragment::hash160(digest))?, Fragment::older(delay)?)
        };

        let fragment = match self {
            LeafPolicy::Pk(key) => Fragment::check(Fragment::pk(*key))?,
            LeafPolicy::PkDelay(key, delay) => {
                Fragment::and_v(verified_pk(*key)?, Fragment::older(*delay)?)?
            }
            LeafPolicy::PkHashlock(key, digest) => {
                Fragment::and_v(verified_pk(*key)?, Fragment::hash160(*digest))?
            }
            LeafPolicy::PkHashlockDelay(key, digest, delay) => {
                Fragment::and_v(verified_pk(*key)?, hashlock_delay(*digest, *delay)?)?
            }
            LeafPolicy::Csa(k, keys) => Fragment::thresh_csa(*k, keys.clone())?,
            LeafPolicy::CsaDelay(k, keys, delay) => {
                Fragment::and_v(verified_csa(*k, keys)?, Fragment::older(*delay)?)?
            }
            LeafPolicy::CsaHashlock(k, keys, digest) => {
                Fragment::and_v(verified_csa(*k, keys)?, Fragment::hash160(*digest))?
            }
            LeafPolicy::CsaHashlockDelay(k, keys, digest, delay) => {
                Fragment::and_v(verified_csa(*k, keys)?, hashlock_delay(*digest, *delay)?)?
            }
            LeafPolicy::Raw(script) => return Ok((script.clone(), None)),
        };
        Ok((fragment.to_script()?, Some(fragment)))
    }

    fn parse(tag: &str, args: &[&str]) -> Result<LeafPolicy, DescriptorError> {
        use crate::parser::{parse_hash160 as hash, parse_key as key, parse_number as num};

        let keys = |args: &[&str]| -> Result<Vec<XOnlyPublicKey>, DescriptorError> {
            args.iter().map(|s| key(s)).collect()
        };
        let wrong_count = || DescriptorError::WrongArgumentCount {
            tag: tag.to_owned(),
            found: args.len(),
        };

        Ok(match (tag, args) {
            ("pk", [k]) => LeafPolicy::Pk(key(k)?),
            ("pk_delay", [k, n]) => LeafPolicy::PkDelay(key(k)?, num(n)?),
            ("pk_hashlock", [k, h]) => LeafPolicy::PkHashlock(key(k)?, hash(h)?.into()),
            ("pk_hashlock_delay", [k, h, n]) => {
                LeafPolicy::PkHashlockDelay(key(k)?, hash(h)?.into(), num(n)?)
            }
            ("csa", [k, rest @ ..]) => LeafPolicy::Csa(num(k)?, keys(rest)?),
            ("csa_delay", [k, rest @ .., n]) => LeafPolicy::CsaDelay(num(k)?, keys(rest)?, num(n)?),
            ("csa_hashlock", [k, rest @ .., h]) => {
                LeafPolicy::CsaHashlock(num(k)?, keys(rest)?, hash(h)?.into())
            }
            ("csa_hashlock_delay", [k, rest @ .., h, n]) => {
                LeafPolicy::CsaHashlockDelay(num(k)?, keys(rest)?, hash(h)?.into(), num(n)?)
            }
            ("raw", [script]) => LeafPolicy::Raw(LockScript::from(parser::parse_hex(script)?)),
            (
                "pk" | "pk_delay" | "pk_hashlock" | "pk_hashlock_delay" | "csa" | "csa_delay"
                | "csa_hashlock" | "csa_hashlock_delay" | "raw",
                _,
            ) => return Err(wrong_count()),
            (tag, _) => return Err(DescriptorError::UnrecognizedTag(tag.to_owned())),
        })
    }
}

impl Display for LeafPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.tag())?;
        match self {
            LeafPolicy::Pk(key) => write!(f, "{key}")?,
            LeafPolicy::PkDelay(key, delay) => write!(f, "{key},{delay}")?,
            LeafPolicy::PkHashlock(key, digest) => write!(f, "{key},{digest:x}")?,
            LeafPolicy::PkHashlockDelay(key, digest, delay) => {
                write!(f, "{key},{digest:x},{delay}")?
            }
            LeafPolicy::Csa(k, keyset) => fmt_threshold(f, *k, keyset)?,
            LeafPolicy::CsaDelay(k, keyset, delay) => {
                fmt_threshold(f, *k, keyset)?;
                write!(f, ",{delay}")?;
            }
            LeafPolicy::CsaHashlock(k, keyset, digest) => {
                fmt_threshold(f, *k, keyset)?;
                write!(f, ",{digest:x}")?;
            }
            LeafPolicy::CsaHashlockDelay(k, keyset, digest, delay) => {
                fmt_threshold(f, *k, keyset)?;
                write!(f, ",{digest:x},{delay}")?;
            }
            LeafPolicy::Raw(script) => f.write_str(&script.as_bytes().to_hex())?,
        }
        f.write_str(")")
    }
}

fn fmt_threshold(f: &mut Formatter<'_>, k: usize, keys: &[XOnlyPublicKey]) -> fmt::Result {
    write!(f, "{k}")?;
    keys.iter().try_for_each(|key| write!(f, ",{key}"))
}

/// Tapscript leaf built from a [`LeafPolicy`], keeping the compiled
/// miniscript fragment for the satisfaction analysis.
///
/// Leaves are ordered by their tagged leaf hash.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct TapLeaf {
    version: u8,
    policy: LeafPolicy,
    script: LockScript,
    miniscript: Option<Fragment>,
}

impl TapLeaf {
    /// Compiles tapscript leaf from the policy.
    pub fn with_policy(policy: LeafPolicy) -> Result<TapLeaf, CompositionError> {
        let (script, miniscript) = policy.build()?;
        Ok(TapLeaf {
            version: LEAF_VERSION_TAPSCRIPT,
            policy,
            script,
            miniscript,
        })
    }

    /// `c:pk(K)`
    pub fn pk(key: XOnlyPublicKey) -> Result<TapLeaf, CompositionError> {
        TapLeaf::with_policy(LeafPolicy::Pk(key))
    }

    /// `and_v(vc:pk(K),older(n))`
    pub fn pk_delay(key: XOnlyPublicKey, delay: u32) -> Result<TapLeaf, CompositionError> {
        TapLeaf::with_policy(LeafPolicy::PkDelay(key, delay))
    }

    /// `and_v(vc:pk(K),hash160(H))`
    pub fn pk_hashlock(
        key: XOnlyPublicKey,
        digest: impl Into<Hash160Digest>,
    ) -> Result<TapLeaf, CompositionError> {
        TapLeaf::with_policy(LeafPolicy::PkHashlock(key, digest.into()))
    }

    /// `and_v(vc:pk(K),and_v(v:hash160(H),older(n)))`
    pub fn pk_hashlock_delay(
        key: XOnlyPublicKey,
        digest: impl Into<Hash160Digest>,
        delay: u32,
    ) -> Result<TapLeaf, CompositionError> {
        TapLeaf::with_policy(LeafPolicy::PkHashlockDelay(key, digest.into(), delay))
    }

    /// `thresh_csa(k,K1,...)`
    pub fn csa(k: usize, keys: Vec<XOnlyPublicKey>) -> Result<TapLeaf, CompositionError> {
        TapLeaf::with_policy(LeafPolicy::Csa(k, keys))
    }

    /// `and_v(v:thresh_csa(k,K1,...),older(n))`
    pub fn csa_delay(
        k: usize,
        keys: Vec<XOnlyPublicKey>,
        delay: u32,
    ) -> Result<TapLeaf, CompositionError> {
        TapLeaf::with_policy(LeafPolicy::CsaDelay(k, keys, delay))
    }

    /// `and_v(v:thresh_csa(k,K1,...),hash160(H))`
    pub fn csa_hashlock(
        k: usize,
        keys: Vec<XOnlyPublicKey>,
        digest: impl Into<Hash160Digest>,
    ) -> Result<TapLeaf, CompositionError> {
        TapLeaf::with_policy(LeafPolicy::CsaHashlock(k, keys, digest.into()))
    }

    /// `and_v(v:thresh_csa(k,K1,...),and_v(v:hash160(H),older(n)))`
    pub fn csa_hashlock_delay(
        k: usize,
        keys: Vec<XOnlyPublicKey>,
        digest: impl Into<Hash160Digest>,
        delay: u32,
    ) -> Result<TapLeaf, CompositionError> {
        TapLeaf::with_policy(LeafPolicy::CsaHashlockDelay(k, keys, digest.into(), delay))
    }

    /// Leaf with an arbitrary script.
    pub fn raw(script: LockScript) -> TapLeaf {
        TapLeaf {
            version: LEAF_VERSION_TAPSCRIPT,
            policy: LeafPolicy::Raw(script.clone()),
            script,
            miniscript: None,
        }
    }

    /// Policy the leaf was built from.
    #[inline]
    pub fn policy(&self) -> &LeafPolicy { &self.policy }

    /// Leaf script.
    #[inline]
    pub fn script(&self) -> &LockScript { &self.script }

    /// Compiled miniscript fragment; `None` for raw scripts.
    #[inline]
    pub fn miniscript(&self) -> Option<&Fragment> { self.miniscript.as_ref() }

    /// Satisfaction witness template; empty for raw scripts.
    pub fn sat(&self) -> &[SatisfactionItem] {
        self.miniscript
            .as_ref()
            .map(Fragment::sat)
            .unwrap_or_default()
    }

    /// Returns versioned leaf script.
    #[inline]
    pub fn to_leaf_script(&self) -> LeafScript {
        LeafScript {
            version: self.version,
            script: self.script.clone(),
        }
    }
}

impl Leaf for TapLeaf {
    #[inline]
    fn leaf_version(&self) -> u8 { self.version }

    #[inline]
    fn leaf_script(&self) -> &LockScript { &self.script }
}

impl PartialOrd for TapLeaf {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for TapLeaf {
    fn cmp(&self, other: &Self) -> Ordering {
        self.leaf_hash()
            .cmp(&other.leaf_hash())
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.policy.cmp(&other.policy))
    }
}

impl Display for TapLeaf {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { write!(f, "ts({})", self.policy) }
}

impl FromStr for TapLeaf {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = parser::strip_whitespace(s);
        let (tag, args) = parser::split_call(&s)?;
        if tag != "ts" {
            return Err(DescriptorError::UnrecognizedTag(tag.to_owned()));
        }
        parser::check_args(tag, &args, 1)?;
        let (tag, args) = parser::split_call(args[0])?;
        let policy = LeafPolicy::parse(tag, &args)?;
        Ok(TapLeaf::with_policy(policy)?)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for TapLeaf {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for TapLeaf {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        TapLeaf::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Generates `csa` leaves for every k-sized subset of the keys.
///
/// Keys are sorted by their serialization first; the subsets follow the
/// lexicographic order of combinations over the sorted list, so the output
/// order is reproducible.
pub fn generate_threshold_csa(
    k: usize,
    keys: &[XOnlyPublicKey],
) -> Result<Vec<TapLeaf>, CompositionError> {
    let n = keys.len();
    if k <= 1 || n <= k {
        return Err(CompositionError::DegenerateThreshold { k, n });
    }
    let mut keys = keys.to_vec();
    keys.sort_by_key(XOnlyPublicKey::serialize);

    let leaves = keys
        .into_iter()
        .combinations(k)
        .map(|subset| TapLeaf::csa(k, subset))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(k, n, leaves = leaves.len(), "generated threshold csa leaves");
    Ok(leaves)
}

#[cfg(test)]
mod test {
    use bitcoin_scripts::opcode::{OP_CHECKSIG, OP_CHECKSIGADD, OP_NUMEQUAL};
    use bitcoin_scripts::Token;
    use proptest::prelude::*;
    use secp256k1::{PublicKey, SecretKey, SECP256K1};

    use super::*;

    fn key(i: u8) -> XOnlyPublicKey {
        let sk = SecretKey::from_slice(&[i; 32]).unwrap();
        PublicKey::from_secret_key(SECP256K1, &sk).x_only_public_key().0
    }

    fn sorted_keys(n: u8) -> Vec<XOnlyPublicKey> {
        let mut keys = (1..=n).map(key).collect::<Vec<_>>();
        keys.sort_by_key(XOnlyPublicKey::serialize);
        keys
    }

    fn binomial(n: usize, k: usize) -> usize {
        (0..k).fold(1, |acc, i| acc * (n - i) / (i + 1))
    }

    #[test]
    fn pk_leaf() {
        let leaf = TapLeaf::pk(key(1)).unwrap();
        assert_eq!(leaf.to_string(), format!("ts(pk({}))", key(1)));
        let mut expected = vec![0x20];
        expected.extend(key(1).serialize());
        expected.push(0xac);
        assert_eq!(leaf.script().as_bytes(), &expected[..]);
        assert_eq!(leaf.sat(), &[SatisfactionItem::Signature(key(1))]);
    }

    #[test]
    fn small_delay_pushes_script_num() {
        let leaf = TapLeaf::pk_delay(key(1), 5).unwrap();
        let bytes = leaf.script().as_bytes();
        assert_eq!(&bytes[bytes.len() - 3..], &[0x01, 0x05, 0xb2]);
        let leaf = TapLeaf::csa_delay(2, vec![key(1), key(2), key(3)], 16).unwrap();
        let bytes = leaf.script().as_bytes();
        assert_eq!(&bytes[bytes.len() - 3..], &[0x01, 0x10, 0xb2]);
    }

    #[test]
    fn recipes() {
        let digest = [0x5a; 20];
        let keys = vec![key(1), key(2), key(3)];
        let cases = [
            (TapLeaf::pk_delay(key(1), 20).unwrap(), format!("and_v(vc:pk({}),older(20))", key(1))),
            (
                TapLeaf::pk_hashlock(key(1), digest).unwrap(),
                format!("and_v(vc:pk({}),hash160({}))", key(1), "5a".repeat(20)),
            ),
            (
                TapLeaf::pk_hashlock_delay(key(1), digest, 20).unwrap(),
                format!(
                    "and_v(vc:pk({}),and_v(v:hash160({}),older(20)))",
                    key(1),
                    "5a".repeat(20)
                ),
            ),
            (
                TapLeaf::csa_delay(2, keys.clone(), 20).unwrap(),
                format!("and_v(v:thresh_csa(2,{},{},{}),older(20))", key(1), key(2), key(3)),
            ),
            (
                TapLeaf::csa_hashlock(2, keys.clone(), digest).unwrap(),
                format!(
                    "and_v(v:thresh_csa(2,{},{},{}),hash160({}))",
                    key(1),
                    key(2),
                    key(3),
                    "5a".repeat(20)
                ),
            ),
            (
                TapLeaf::csa_hashlock_delay(2, keys, digest, 20).unwrap(),
                format!(
                    "and_v(v:thresh_csa(2,{},{},{}),and_v(v:hash160({}),older(20)))",
                    key(1),
                    key(2),
                    key(3),
                    "5a".repeat(20)
                ),
            ),
        ];
        for (leaf, miniscript) in cases {
            let fragment = leaf.miniscript().unwrap();
            assert_eq!(fragment.to_string(), miniscript);
            assert_eq!(&fragment.to_script().unwrap(), leaf.script());
            // descriptor round trip
            assert_eq!(TapLeaf::from_str(&leaf.to_string()).unwrap(), leaf);
        }
    }

    #[test]
    fn descriptor_format() {
        let leaf = TapLeaf::csa_hashlock_delay(2, vec![key(1), key(2)], [0xcd; 20], 144).unwrap();
        assert_eq!(
            leaf.to_string(),
            format!("ts(csa_hashlock_delay(2,{},{},{},144))", key(1), key(2), "cd".repeat(20))
        );
        let raw = TapLeaf::raw(LockScript::from(vec![0x51]));
        assert_eq!(raw.to_string(), "ts(raw(51))");
        assert_eq!(TapLeaf::from_str(" ts( raw(51) ) ").unwrap(), raw);
        assert!(raw.miniscript().is_none());
        assert!(raw.sat().is_empty());
    }

    #[test]
    fn descriptor_errors() {
        assert!(matches!(
            TapLeaf::from_str("tr(pk(00))"),
            Err(DescriptorError::UnrecognizedTag(tag)) if tag == "tr"
        ));
        assert!(matches!(
            TapLeaf::from_str("ts(multi(1,00))"),
            Err(DescriptorError::UnrecognizedTag(tag)) if tag == "multi"
        ));
        assert!(matches!(
            TapLeaf::from_str(&format!("ts(pk_delay({}))", key(1))),
            Err(DescriptorError::WrongArgumentCount { found: 1, .. })
        ));
        assert!(matches!(
            TapLeaf::from_str(&format!("ts(pk_delay({},0))", key(1))),
            Err(DescriptorError::Composition(CompositionError::InvalidTimelock(0)))
        ));
        assert!(matches!(
            TapLeaf::from_str("ts(pk(zz))"),
            Err(DescriptorError::InvalidKey(_))
        ));
        assert!(matches!(
            TapLeaf::from_str("ts(raw(5))"),
            Err(DescriptorError::InvalidHex(_))
        ));
        assert!(matches!(
            TapLeaf::from_str("ts(pk(a)"),
            Err(DescriptorError::MalformedDescriptor(_))
        ));
    }

    #[test]
    fn two_of_three() {
        let keys = sorted_keys(3);
        let leaves = generate_threshold_csa(2, &[key(3), key(1), key(2)]).unwrap();
        assert_eq!(leaves.len(), 3);
        let expected = [(0, 1), (0, 2), (1, 2)];
        for (leaf, (a, b)) in leaves.iter().zip(expected) {
            assert_eq!(leaf.script().tokens().unwrap(), vec![
                Token::Push(keys[a].serialize().to_vec()),
                Token::Op(OP_CHECKSIG),
                Token::Push(keys[b].serialize().to_vec()),
                Token::Op(OP_CHECKSIGADD),
                Token::Int(2),
                Token::Op(OP_NUMEQUAL),
            ]);
        }
    }

    #[test]
    fn degenerate_thresholds() {
        let keys = sorted_keys(3);
        assert_eq!(
            generate_threshold_csa(1, &keys),
            Err(CompositionError::DegenerateThreshold { k: 1, n: 3 })
        );
        assert_eq!(
            generate_threshold_csa(3, &keys),
            Err(CompositionError::DegenerateThreshold { k: 3, n: 3 })
        );
        assert_eq!(
            generate_threshold_csa(0, &keys),
            Err(CompositionError::DegenerateThreshold { k: 0, n: 3 })
        );
    }

    #[test]
    fn ordering_by_hash() {
        let mut leaves = vec![
            TapLeaf::pk(key(1)).unwrap(),
            TapLeaf::pk(key(2)).unwrap(),
            TapLeaf::raw(LockScript::from(vec![0x51])),
        ];
        leaves.sort();
        assert!(leaves
            .windows(2)
            .all(|pair| pair[0].leaf_hash() <= pair[1].leaf_hash()));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn subset_count(m in 3u8..8, k in 2usize..7) {
            prop_assume!(k < m as usize);
            let leaves = generate_threshold_csa(k, &sorted_keys(m)).unwrap();
            prop_assert_eq!(leaves.len(), binomial(m as usize, k));
            for leaf in leaves {
                let tokens = leaf.script().tokens().unwrap();
                prop_assert_eq!(
                    &tokens[tokens.len() - 2..],
                    &[Token::Int(k as i64), Token::Op(OP_NUMEQUAL)]
                );
            }
        }
    }
}
