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

//! Typed algebra of tapscript miniscript fragments.
//!
//! Each [`Fragment`] carries the script it emits together with its
//! satisfaction and non-satisfaction witness templates, base type and
//! correctness and malleability properties. The properties are computed once,
//! at construction time, from the already-computed properties of the child
//! fragments. Combinators reject ill-typed children with
//! [`CompositionError::IllTypedComposition`].

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use amplify::Wrapper;
use bitcoin::hashes::hex::ToHex;
use bitcoin_scripts::opcode::*;
use bitcoin_scripts::{LockScript, ScriptError, ScriptNum, Token};
use secp256k1::XOnlyPublicKey;

use crate::parser::{self, DescriptorError};

/// Errors composing miniscript fragments.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum CompositionError {
    /// `{combinator}` requires {expected} fragment, while {found} fragment was
    /// provided.
    IllTypedComposition {
        /// Name of the combinator
        combinator: &'static str,
        /// Type required by the combinator
        expected: BaseType,
        /// Type of the provided fragment
        found: BaseType,
    },

    /// relative timelock {0} is invalid; it must be in range 1..2^32.
    InvalidTimelock(u32),

    /// threshold {k} of {n} keys is invalid; threshold must be non-zero and not
    /// exceed the number of keys, which must be greater than one.
    InvalidThreshold {
        /// Threshold value
        k: usize,
        /// Number of keys
        n: usize,
    },

    /// threshold {k} of {n} keys is degenerate for the threshold subset
    /// generation; 1 < k < n is required.
    DegenerateThreshold {
        /// Threshold value
        k: usize,
        /// Number of keys
        n: usize,
    },

    /// Unencodable script
    #[from]
    #[display(inner)]
    Script(ScriptError),
}

/// Base type of a miniscript fragment.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum BaseType {
    /// Base expression: takes inputs from the stack top and pushes a boolean
    #[display("B")]
    B,

    /// Verify expression: takes inputs from the stack top and pushes nothing;
    /// it can't be dissatisfied
    #[display("V")]
    V,

    /// Key expression: takes inputs from the stack top and pushes a public key
    /// for which a signature is to be checked
    #[display("K")]
    K,
}

/// Correctness properties of a fragment.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct Correctness {
    /// Zero-arg: always consumes exactly 0 stack elements
    pub z: bool,
    /// One-arg: always consumes exactly 1 stack element
    pub o: bool,
    /// Nonzero: satisfaction never needs a zero top stack element
    pub n: bool,
    /// Dissatisfiable: a dissatisfaction can be constructed
    pub d: bool,
    /// Unit: when satisfied, puts exactly 1 on the stack
    pub u: bool,
}

impl Display for Correctness {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (flag, letter) in [
            (self.z, 'z'),
            (self.o, 'o'),
            (self.n, 'n'),
            (self.d, 'd'),
            (self.u, 'u'),
        ] {
            if flag {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

/// Malleability properties of a fragment.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct Malleability {
    /// Expression: dissatisfaction is unique and requires a signature
    pub e: bool,
    /// Forced: no dissatisfaction exists
    pub f: bool,
    /// Non-malleable satisfaction is guaranteed to exist
    pub m: bool,
    /// Safe: every satisfaction requires a signature
    pub s: bool,
}

impl Display for Malleability {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (flag, letter) in [(self.e, 'e'), (self.f, 'f'), (self.m, 'm'), (self.s, 's')] {
            if flag {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

/// Placeholder in a satisfaction witness template.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display)]
pub enum SatisfactionItem {
    /// BIP-340 signature for the key
    #[display("sig({0})")]
    Signature(XOnlyPublicKey),

    /// Preimage of the HASH160 digest
    #[display("preimage({0:x})")]
    Preimage(Hash160Digest),
}

/// HASH160 digest used by the hashlock fragments.
#[derive(
    Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Debug, From
)]
pub struct Hash160Digest([u8; 20]);

impl fmt::LowerHex for Hash160Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(&self.0.to_hex()) }
}

/// Kind of a fragment together with its arguments and children.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Node {
    /// `pk(K)`: public key
    Pk(XOnlyPublicKey),

    /// `older(n)`: relative timelock
    Older(u32),

    /// `hash160(H)`: HASH160 preimage check
    Hash160(Hash160Digest),

    /// `thresh_csa(k,K1,...,Km)`: k-of-m signatures with `OP_CHECKSIGADD`
    ThreshCsa(usize, Vec<XOnlyPublicKey>),

    /// `c:X`: key check wrapper
    Check(Box<Fragment>),

    /// `v:X`: verify wrapper
    Verify(Box<Fragment>),

    /// `and_v(X,Y)`: conjunction
    AndV(Box<Fragment>, Box<Fragment>),
}

/// Miniscript fragment with its script, witness templates and type
/// properties.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Fragment {
    node: Node,
    script: Vec<Token>,
    nsat: Option<Vec<Vec<u8>>>,
    sat: Vec<SatisfactionItem>,
    ty: BaseType,
    corr: Correctness,
    mal: Malleability,
}

impl Fragment {
    /// `pk(K)`: pushes the key.
    pub fn pk(key: XOnlyPublicKey) -> Fragment {
        Fragment {
            script: vec![Token::Push(key.serialize().to_vec())],
            nsat: Some(vec![vec![]]),
            sat: vec![SatisfactionItem::Signature(key)],
            ty: BaseType::K,
            corr: Correctness {
                z: false,
                o: true,
                n: true,
                d: true,
                u: true,
            },
            mal: Malleability {
                e: true,
                f: false,
                m: true,
                s: true,
            },
            node: Node::Pk(key),
        }
    }

    /// `older(n)`: `<n> OP_CHECKSEQUENCEVERIFY`. The delay is always pushed
    /// as a [`ScriptNum`] byte string, including values in `1..=16`.
    pub fn older(n: u32) -> Result<Fragment, CompositionError> {
        if n == 0 {
            return Err(CompositionError::InvalidTimelock(n));
        }
        Ok(Fragment {
            node: Node::Older(n),
            script: vec![
                Token::from(ScriptNum::from(n as i64)),
                Token::Op(OP_CHECKSEQUENCEVERIFY),
            ],
            nsat: None,
            sat: vec![],
            ty: BaseType::B,
            corr: Correctness {
                z: true,
                ..Correctness::default()
            },
            mal: Malleability {
                e: false,
                f: true,
                m: true,
                s: false,
            },
        })
    }

    /// `hash160(H)`: `OP_SIZE 32 OP_EQUALVERIFY OP_HASH160 <H> OP_EQUAL`.
    pub fn hash160(digest: impl Into<Hash160Digest>) -> Fragment {
        let digest = digest.into();
        Fragment {
            node: Node::Hash160(digest),
            script: vec![
                Token::Op(OP_SIZE),
                Token::from(ScriptNum::from(32)),
                Token::Op(OP_EQUALVERIFY),
                Token::Op(OP_HASH160),
                Token::Push(digest.to_inner().to_vec()),
                Token::Op(OP_EQUAL),
            ],
            nsat: Some(vec![vec![0u8; 32]]),
            sat: vec![SatisfactionItem::Preimage(digest)],
            ty: BaseType::B,
            corr: Correctness {
                z: false,
                o: true,
                n: true,
                d: true,
                u: true,
            },
            mal: Malleability {
                e: false,
                f: false,
                m: true,
                s: false,
            },
        }
    }

    /// `thresh_csa(k,K1,...,Km)`:
    /// `<K1> OP_CHECKSIG <K2> OP_CHECKSIGADD ... <Km> OP_CHECKSIGADD <k>
    /// OP_NUMEQUAL`.
    ///
    /// Requires `0 < k <= m` and `m > 1`.
    pub fn thresh_csa(k: usize, keys: Vec<XOnlyPublicKey>) -> Result<Fragment, CompositionError> {
        let n = keys.len();
        if k == 0 || k > n || n < 2 {
            return Err(CompositionError::InvalidThreshold { k, n });
        }
        let mut script = Vec::with_capacity(n * 2 + 2);
        for (no, key) in keys.iter().enumerate() {
            script.push(Token::Push(key.serialize().to_vec()));
            script.push(Token::Op(if no == 0 { OP_CHECKSIG } else { OP_CHECKSIGADD }));
        }
        script.push(Token::Int(k as i64));
        script.push(Token::Op(OP_NUMEQUAL));
        Ok(Fragment {
            script,
            nsat: Some(vec![vec![]; n]),
            sat: keys
                .iter()
                .rev()
                .copied()
                .map(SatisfactionItem::Signature)
                .collect(),
            ty: BaseType::B,
            corr: Correctness {
                z: false,
                o: false,
                n: false,
                d: true,
                u: true,
            },
            mal: Malleability {
                e: true,
                f: false,
                m: true,
                s: true,
            },
            node: Node::ThreshCsa(k, keys),
        })
    }

    /// `c:X`: appends `OP_CHECKSIG` to a key expression.
    pub fn check(x: Fragment) -> Result<Fragment, CompositionError> {
        x.require("c", BaseType::K)?;
        let (corr, mal) = (x.corr, x.mal);
        let mut script = x.script.clone();
        script.push(Token::Op(OP_CHECKSIG));
        Ok(Fragment {
            script,
            nsat: x.nsat.clone(),
            sat: x.sat.clone(),
            ty: BaseType::B,
            corr: Correctness {
                z: false,
                u: true,
                ..corr
            },
            mal: Malleability { f: false, ..mal },
            node: Node::Check(Box::new(x)),
        })
    }

    /// `v:X`: appends `OP_VERIFY` to a base expression, making it
    /// non-dissatisfiable.
    pub fn verify(x: Fragment) -> Result<Fragment, CompositionError> {
        x.require("v", BaseType::B)?;
        let (corr, mal) = (x.corr, x.mal);
        let mut script = x.script.clone();
        script.push(Token::Op(OP_VERIFY));
        Ok(Fragment {
            script,
            nsat: None,
            sat: x.sat.clone(),
            ty: BaseType::V,
            corr: Correctness {
                d: false,
                u: false,
                ..corr
            },
            mal: Malleability {
                e: false,
                f: true,
                ..mal
            },
            node: Node::Verify(Box::new(x)),
        })
    }

    /// `and_v(X,Y)`: concatenation of a verify expression with any other
    /// expression; the result takes the type of `Y`.
    pub fn and_v(x: Fragment, y: Fragment) -> Result<Fragment, CompositionError> {
        x.require("and_v", BaseType::V)?;
        let (l, r) = (x.corr, y.corr);
        let mut script = x.script.clone();
        script.extend(y.script.iter().cloned());
        // witness stack top goes first: the left side consumes its
        // satisfaction before the right one
        let mut sat = y.sat.clone();
        sat.extend(x.sat.iter().copied());
        Ok(Fragment {
            script,
            nsat: None,
            sat,
            ty: y.ty,
            corr: Correctness {
                z: l.z && r.z,
                o: (l.z && r.o) || (l.o && r.z),
                n: l.n || (l.z && r.n),
                d: false,
                u: false,
            },
            mal: Malleability {
                e: false,
                f: x.mal.f && y.mal.f,
                m: x.mal.m && y.mal.m,
                s: x.mal.s || y.mal.s,
            },
            node: Node::AndV(Box::new(x), Box::new(y)),
        })
    }

    fn require(&self, combinator: &'static str, expected: BaseType) -> Result<(), CompositionError> {
        if self.ty != expected {
            return Err(CompositionError::IllTypedComposition {
                combinator,
                expected,
                found: self.ty,
            });
        }
        Ok(())
    }

    /// Fragment kind and its children.
    #[inline]
    pub fn node(&self) -> &Node { &self.node }

    /// Emitted script as a sequence of tokens.
    #[inline]
    pub fn tokens(&self) -> &[Token] { &self.script }

    /// Encodes the emitted script.
    pub fn to_script(&self) -> Result<LockScript, ScriptError> {
        LockScript::from_tokens(&self.script)
    }

    /// Non-satisfaction witness, if the fragment is dissatisfiable.
    #[inline]
    pub fn nsat(&self) -> Option<&[Vec<u8>]> { self.nsat.as_deref() }

    /// Satisfaction witness template, in witness stack order.
    #[inline]
    pub fn sat(&self) -> &[SatisfactionItem] { &self.sat }

    /// Base type.
    #[inline]
    pub fn base_type(&self) -> BaseType { self.ty }

    /// Correctness properties.
    #[inline]
    pub fn correctness(&self) -> Correctness { self.corr }

    /// Malleability properties.
    #[inline]
    pub fn malleability(&self) -> Malleability { self.mal }

    fn fmt_unwrapped(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.node {
            Node::Pk(key) => write!(f, "pk({key})"),
            Node::Older(n) => write!(f, "older({n})"),
            Node::Hash160(digest) => write!(f, "hash160({digest:x})"),
            Node::ThreshCsa(k, keys) => {
                write!(f, "thresh_csa({k}")?;
                for key in keys {
                    write!(f, ",{key}")?;
                }
                f.write_str(")")
            }
            Node::AndV(x, y) => write!(f, "and_v({x},{y})"),
            Node::Check(_) | Node::Verify(_) => Display::fmt(self, f),
        }
    }
}

impl Display for Fragment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut inner = self;
        let mut wrappers = String::new();
        loop {
            inner = match &inner.node {
                Node::Check(x) => {
                    wrappers.push('c');
                    x
                }
                Node::Verify(x) => {
                    wrappers.push('v');
                    x
                }
                _ => break,
            };
        }
        if !wrappers.is_empty() {
            write!(f, "{wrappers}:")?;
        }
        inner.fmt_unwrapped(f)
    }
}

impl FromStr for Fragment {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = parser::strip_whitespace(s);
        Fragment::parse(&s)
    }
}

impl Fragment {
    fn parse(s: &str) -> Result<Fragment, DescriptorError> {
        if let Some((wrappers, inner)) = s.split_once(':') {
            if !wrappers.contains(['(', ')', '[', ']', ',']) {
                if wrappers.is_empty() {
                    return Err(DescriptorError::MalformedDescriptor(s.to_owned()));
                }
                let mut fragment = Fragment::parse(inner)?;
                for wrapper in wrappers.chars().rev() {
                    fragment = match wrapper {
                        'c' => Fragment::check(fragment)?,
                        'v' => Fragment::verify(fragment)?,
                        _ => return Err(DescriptorError::UnrecognizedTag(wrapper.to_string())),
                    };
                }
                return Ok(fragment);
            }
        }

        let (tag, args) = parser::split_call(s)?;
        let fragment = match (tag, args.as_slice()) {
            ("pk", [key]) => Fragment::pk(parser::parse_key(key)?),
            ("older", [n]) => Fragment::older(parser::parse_number(n)?)?,
            ("hash160", [digest]) => Fragment::hash160(parser::parse_hash160(digest)?),
            ("thresh_csa", [k, keys @ ..]) => Fragment::thresh_csa(
                parser::parse_number(k)?,
                keys.iter()
                    .map(|key| parser::parse_key(key))
                    .collect::<Result<_, _>>()?,
            )?,
            ("and_v", [x, y]) => Fragment::and_v(Fragment::parse(x)?, Fragment::parse(y)?)?,
            ("pk" | "older" | "hash160" | "thresh_csa" | "and_v", _) => {
                return Err(DescriptorError::WrongArgumentCount {
                    tag: tag.to_owned(),
                    found: args.len(),
                })
            }
            (tag, _) => return Err(DescriptorError::UnrecognizedTag(tag.to_owned())),
        };
        Ok(fragment)
    }
}
