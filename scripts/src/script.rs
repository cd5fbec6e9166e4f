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

//! Byte-level script codec: push-data grammar, "cooked" token view, sigop
//! counting, legacy `FindAndDelete` and fixed-shape script recognizers.

use std::fmt::{self, Display, Formatter};

use amplify::Wrapper;
use bitcoin::hashes::hex::ToHex;
use bitcoin::hashes::{hash160, Hash};
use bitcoin::Script;
use secp256k1::PublicKey;

use crate::opcode::*;
use crate::ScriptNum;

/// Maximum size of a single stack element.
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Errors happening during script decoding and encoding.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ScriptError {
    /// {opcode} at byte {offset} declares {expected} bytes of push data, while
    /// only {remaining} bytes remain in the script.
    TruncatedPushData {
        /// Push opcode
        opcode: Opcode,
        /// Position of the push opcode within the script
        offset: usize,
        /// Number of bytes declared by the push header
        expected: usize,
        /// Number of bytes left after the push header
        remaining: usize,
    },

    /// {opcode} at byte {offset} is not followed by a complete data length.
    InvalidPushHeader {
        /// Push opcode
        opcode: Opcode,
        /// Position of the push opcode within the script
        offset: usize,
    },

    /// data of {0} bytes is too long to be pushed.
    DataTooLongToPush(usize),
}

/// Raw script instruction.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Instruction<'script> {
    /// Opcode byte
    pub opcode: Opcode,
    /// Push payload, present for all push opcodes (including `OP_0`, which
    /// pushes an empty slice)
    pub data: Option<&'script [u8]>,
    /// Position of the opcode byte within the script
    pub offset: usize,
}

/// Iterator over raw script instructions, distinguishing different push
/// encodings and reporting exact opcode positions.
///
/// Iteration stops after the first error.
#[derive(Clone, Debug)]
pub struct Instructions<'script> {
    bytes: &'script [u8],
    pos: usize,
    failed: bool,
}

impl<'script> Instructions<'script> {
    /// Constructs iterator over the provided script bytes.
    pub fn new(bytes: &'script [u8]) -> Self {
        Instructions {
            bytes,
            pos: 0,
            failed: false,
        }
    }

    fn read_len(&mut self, width: usize) -> Option<usize> {
        let end = self.pos.checked_add(width)?;
        let slice = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(
            slice
                .iter()
                .rev()
                .fold(0usize, |acc, byte| (acc << 8) | *byte as usize),
        )
    }

    fn next_instruction(&mut self) -> Result<Instruction<'script>, ScriptError> {
        let offset = self.pos;
        let opcode = Opcode::from(self.bytes[offset]);
        self.pos += 1;

        if !opcode.is_push() {
            return Ok(Instruction {
                opcode,
                data: None,
                offset,
            });
        }

        let len = match opcode {
            OP_PUSHDATA1 => self.read_len(1),
            OP_PUSHDATA2 => self.read_len(2),
            OP_PUSHDATA4 => self.read_len(4),
            direct => Some(direct.to_u8() as usize),
        }
        .ok_or(ScriptError::InvalidPushHeader { opcode, offset })?;

        let remaining = self.bytes.len() - self.pos;
        if len > remaining {
            return Err(ScriptError::TruncatedPushData {
                opcode,
                offset,
                expected: len,
                remaining,
            });
        }
        let data = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(Instruction {
            opcode,
            data: Some(data),
            offset,
        })
    }
}

impl<'script> Iterator for Instructions<'script> {
    type Item = Result<Instruction<'script>, ScriptError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.bytes.len() {
            return None;
        }
        let res = self.next_instruction();
        self.failed = res.is_err();
        Some(res)
    }
}

/// "Cooked" view of a script instruction, also used as an input for script
/// construction.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum Token {
    /// Non-push opcode. When encoding, any opcode byte is written as is.
    Op(Opcode),

    /// Small integer (`OP_1`..`OP_16` when decoding); when encoding any value
    /// is accepted and gets the shortest representation.
    Int(i64),

    /// Number which is always pushed as its minimal [`ScriptNum`] byte
    /// string, even in the small integer range. Zero is written as `OP_0`.
    /// Produced only for script construction; decoding yields
    /// [`Token::Push`] instead.
    Num(ScriptNum),

    /// Push payload.
    Push(Vec<u8>),
}

impl From<Opcode> for Token {
    #[inline]
    fn from(op: Opcode) -> Self { Token::Op(op) }
}

impl From<ScriptNum> for Token {
    #[inline]
    fn from(num: ScriptNum) -> Self { Token::Num(num) }
}

impl From<Vec<u8>> for Token {
    #[inline]
    fn from(data: Vec<u8>) -> Self { Token::Push(data) }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Token::Op(op) => Display::fmt(op, f),
            Token::Int(n) => Display::fmt(n, f),
            Token::Num(num) => Display::fmt(num, f),
            Token::Push(data) if data.is_empty() => f.write_str("<>"),
            Token::Push(data) => f.write_str(&data.to_hex()),
        }
    }
}

impl<'script> From<Instruction<'script>> for Token {
    fn from(instr: Instruction<'script>) -> Self {
        match (instr.data, instr.opcode.small_int()) {
            (Some(data), _) => Token::Push(data.to_vec()),
            (None, Some(n)) => Token::Int(n as i64),
            (None, None) => Token::Op(instr.opcode),
        }
    }
}

/// Writes minimal push-data encoding of the `data` into the `script`.
pub fn push_data(script: &mut Vec<u8>, data: &[u8]) -> Result<(), ScriptError> {
    let len = data.len();
    match len {
        0..=0x4b => script.push(len as u8),
        0x4c..=0xff => {
            script.push(OP_PUSHDATA1.to_u8());
            script.push(len as u8);
        }
        0x100..=0xffff => {
            script.push(OP_PUSHDATA2.to_u8());
            script.extend((len as u16).to_le_bytes());
        }
        _ => {
            let len = u32::try_from(len).map_err(|_| ScriptError::DataTooLongToPush(len))?;
            script.push(OP_PUSHDATA4.to_u8());
            script.extend(len.to_le_bytes());
        }
    }
    script.extend(data);
    Ok(())
}

/// Script with no specific semantics imposed, supporting byte-exact decoding
/// and construction from the "cooked" token sequences.
#[derive(
    Wrapper, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug, From
)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct LockScript(Script);

impl From<Vec<u8>> for LockScript {
    #[inline]
    fn from(bytes: Vec<u8>) -> Self { LockScript(Script::from(bytes)) }
}

impl AsRef<[u8]> for LockScript {
    #[inline]
    fn as_ref(&self) -> &[u8] { self.0.as_bytes() }
}

impl Display for LockScript {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for instr in self.instructions() {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            match instr {
                Ok(instr) => Display::fmt(&Token::from(instr), f)?,
                Err(err) => return write!(f, "<ERROR: {err}>"),
            }
        }
        Ok(())
    }
}

impl LockScript {
    /// Constructs script from the sequence of tokens.
    ///
    /// Integers `0..=16` are encoded with small integer opcodes, `-1` with
    /// `OP_1NEGATE`, the rest as a minimal push of their [`ScriptNum`]
    /// representation. [`Token::Num`] always uses the push-data form, with
    /// zero being written as `OP_0`.
    pub fn from_tokens<'token>(
        tokens: impl IntoIterator<Item = &'token Token>,
    ) -> Result<LockScript, ScriptError> {
        let mut script = Vec::new();
        for token in tokens {
            match token {
                Token::Op(op) => script.push(op.to_u8()),
                Token::Int(-1) => script.push(OP_1NEGATE.to_u8()),
                Token::Int(n @ 0..=16) => {
                    let op = Opcode::with_small_int(*n as u8).unwrap_or(OP_INVALIDOPCODE);
                    script.push(op.to_u8())
                }
                Token::Int(n) => push_data(&mut script, &ScriptNum::from(*n).to_vec())?,
                Token::Num(num) => push_data(&mut script, &num.to_vec())?,
                Token::Push(data) => push_data(&mut script, data)?,
            }
        }
        Ok(LockScript::from(script))
    }

    /// Returns raw script bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] { self.0.as_bytes() }

    /// Returns length of the script in bytes.
    #[inline]
    pub fn len(&self) -> usize { self.0.len() }

    /// Detects empty script.
    #[inline]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Iterates over raw script instructions.
    #[inline]
    pub fn instructions(&self) -> Instructions<'_> { Instructions::new(self.as_bytes()) }

    /// Decodes script into its "cooked" token representation: push data
    /// (including `OP_0` as an empty push) becomes [`Token::Push`], `OP_1`..
    /// `OP_16` become [`Token::Int`], the rest is kept as opcodes.
    pub fn tokens(&self) -> Result<Vec<Token>, ScriptError> {
        self.instructions()
            .map(|res| res.map(Token::from))
            .collect()
    }

    /// Counts signature operations.
    ///
    /// `OP_CHECKMULTISIG[VERIFY]` is counted by the preceding `OP_1`..`OP_16`
    /// opcode if `accurate` is set; otherwise (or if there is no such opcode)
    /// it is counted as 20.
    pub fn sigop_count(&self, accurate: bool) -> Result<usize, ScriptError> {
        let mut count = 0usize;
        let mut last = OP_INVALIDOPCODE;
        for instr in self.instructions() {
            let opcode = instr?.opcode;
            match opcode {
                OP_CHECKSIG | OP_CHECKSIGVERIFY => count += 1,
                OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                    count += match last.small_int() {
                        Some(n) if accurate && last != OP_0 => n as usize,
                        _ => 20,
                    }
                }
                _ => {}
            }
            last = opcode;
        }
        Ok(count)
    }

    /// Legacy consensus `FindAndDelete`: at every instruction boundary removes
    /// all consecutive occurrences of the `pattern` raw bytes. Instructions
    /// not matching the pattern are copied unchanged; an undecodable tail is
    /// copied as is. Empty pattern leaves the script untouched.
    ///
    /// Matching is done on raw bytes, not on whole instructions: a pattern
    /// equal to a prefix of a push instruction removes just that prefix, so
    /// `0201ab51` with the pattern `0201` results in `ab51`.
    pub fn find_and_delete(&self, pattern: &LockScript) -> LockScript {
        let bytes = self.as_bytes();
        let pattern = pattern.as_bytes();
        if pattern.is_empty() {
            return self.clone();
        }

        let mut result = Vec::with_capacity(bytes.len());
        let mut found = false;
        let mut copied = 0usize;
        let mut pos = 0usize;
        loop {
            result.extend_from_slice(&bytes[copied..pos]);
            while bytes[pos..].starts_with(pattern) {
                pos += pattern.len();
                found = true;
            }
            copied = pos;
            if pos >= bytes.len() {
                break;
            }
            let mut instructions = Instructions {
                bytes,
                pos,
                failed: false,
            };
            match instructions.next() {
                Some(Ok(_)) => pos = instructions.pos,
                _ => break,
            }
        }
        if !found {
            return self.clone();
        }
        result.extend_from_slice(&bytes[copied..]);
        LockScript::from(result)
    }

    /// Detects `OP_HASH160 <20 bytes> OP_EQUAL` scripts.
    pub fn is_p2sh(&self) -> bool {
        let b = self.as_bytes();
        b.len() == 23 && b[0] == OP_HASH160.to_u8() && b[1] == 20 && b[22] == OP_EQUAL.to_u8()
    }

    /// Detects `OP_1 <32 bytes>` scripts.
    pub fn is_p2tr(&self) -> bool {
        let b = self.as_bytes();
        b.len() == 34 && b[0] == OP_1.to_u8() && b[1] == 32
    }

    /// Detects `<33-byte valid public key> OP_CHECKSIG` scripts.
    pub fn is_p2pk(&self) -> bool {
        let b = self.as_bytes();
        b.len() == 35
            && b[0] == 33
            && b[34] == OP_CHECKSIG.to_u8()
            && PublicKey::from_slice(&b[1..34]).is_ok()
    }

    /// Detects scripts ending with `OP_CHECKSIGADD <int> OP_EQUAL|OP_NUMEQUAL`,
    /// i.e. threshold multisigs built on `OP_CHECKSIGADD`.
    pub fn is_checksigadd(&self) -> bool {
        let tokens = match self.tokens() {
            Ok(tokens) => tokens,
            Err(_) => return false,
        };
        match tokens.as_slice() {
            [.., Token::Op(add), threshold, Token::Op(eq)] => {
                *add == OP_CHECKSIGADD
                    && (*eq == OP_EQUAL || *eq == OP_NUMEQUAL)
                    && match threshold {
                        Token::Int(_) | Token::Num(_) => true,
                        Token::Push(data) => ScriptNum::from_slice(data).is_some(),
                        Token::Op(_) => false,
                    }
            }
            _ => false,
        }
    }

    /// Computes HASH160 of the script.
    #[inline]
    pub fn script_hash(&self) -> hash160::Hash { hash160::Hash::hash(self.as_bytes()) }

    /// Generates P2SH `scriptPubkey` committing to this script.
    pub fn to_p2sh(&self) -> LockScript {
        let mut bytes = Vec::with_capacity(23);
        bytes.push(OP_HASH160.to_u8());
        bytes.push(20);
        bytes.extend(self.script_hash().into_inner());
        bytes.push(OP_EQUAL.to_u8());
        LockScript::from(bytes)
    }

    /// Generates P2PKH `scriptPubkey` for the given public key hash.
    pub fn p2pkh(pubkey_hash: hash160::Hash) -> LockScript {
        let mut bytes = Vec::with_capacity(25);
        bytes.extend([OP_DUP.to_u8(), OP_HASH160.to_u8(), 20]);
        bytes.extend(pubkey_hash.into_inner());
        bytes.extend([OP_EQUALVERIFY.to_u8(), OP_CHECKSIG.to_u8()]);
        LockScript::from(bytes)
    }
}

#[cfg(test)]
mod test {
    use bitcoin::hashes::hex::FromHex;
    use proptest::prelude::*;

    use super::*;

    fn script(hex: &str) -> LockScript { LockScript::from(Vec::<u8>::from_hex(hex).unwrap()) }

    #[test]
    fn push_encodings() {
        for (len, prefix) in [
            (0usize, vec![0x00]),
            (1, vec![0x01]),
            (0x4b, vec![0x4b]),
            (0x4c, vec![0x4c, 0x4c]),
            (0xff, vec![0x4c, 0xff]),
            (0x100, vec![0x4d, 0x00, 0x01]),
            (0xffff, vec![0x4d, 0xff, 0xff]),
            (0x10000, vec![0x4e, 0x00, 0x00, 0x01, 0x00]),
        ] {
            let data = vec![0xa5u8; len];
            let script = LockScript::from_tokens(&[Token::Push(data.clone())]).unwrap();
            assert_eq!(&script.as_bytes()[..prefix.len()], &prefix[..]);
            assert_eq!(script.len(), prefix.len() + len);
            assert_eq!(script.tokens().unwrap(), vec![Token::Push(data)]);
        }
    }

    #[test]
    fn int_encodings() {
        let script = LockScript::from_tokens(&[
            Token::Int(0),
            Token::Int(1),
            Token::Int(16),
            Token::Int(-1),
            Token::Int(17),
            Token::Int(-2),
            Token::Int(1000),
        ])
        .unwrap();
        assert_eq!(script.as_bytes(), &[
            0x00, 0x51, 0x60, 0x4f, 0x01, 0x11, 0x01, 0x82, 0x02, 0xe8, 0x03
        ]);
        assert_eq!(script.tokens().unwrap(), vec![
            Token::Push(vec![]),
            Token::Int(1),
            Token::Int(16),
            Token::Op(OP_1NEGATE),
            Token::Push(vec![0x11]),
            Token::Push(vec![0x82]),
            Token::Push(vec![0xe8, 0x03]),
        ]);
    }

    #[test]
    fn script_num_encodings() {
        let script = LockScript::from_tokens(&[
            Token::from(ScriptNum::from(0)),
            Token::from(ScriptNum::from(1)),
            Token::from(ScriptNum::from(5)),
            Token::from(ScriptNum::from(16)),
            Token::from(ScriptNum::from(-1)),
            Token::from(ScriptNum::from(144)),
        ])
        .unwrap();
        assert_eq!(script.as_bytes(), &[
            0x00, 0x01, 0x01, 0x01, 0x05, 0x01, 0x10, 0x01, 0x81, 0x02, 0x90, 0x00
        ]);
        assert_eq!(script.tokens().unwrap(), vec![
            Token::Push(vec![]),
            Token::Push(vec![0x01]),
            Token::Push(vec![0x05]),
            Token::Push(vec![0x10]),
            Token::Push(vec![0x81]),
            Token::Push(vec![0x90, 0x00]),
        ]);
        assert_eq!(Token::from(ScriptNum::from(5)).to_string(), "5");
    }

    #[test]
    fn truncated_push() {
        let err = script("0501020304").tokens().unwrap_err();
        assert_eq!(err, ScriptError::TruncatedPushData {
            opcode: Opcode::from(0x05u8),
            offset: 0,
            expected: 5,
            remaining: 4
        });
        let err = script("ac4d0300aabb").tokens().unwrap_err();
        assert_eq!(err, ScriptError::TruncatedPushData {
            opcode: OP_PUSHDATA2,
            offset: 1,
            expected: 3,
            remaining: 2
        });
    }

    #[test]
    fn invalid_push_header() {
        for (hex, opcode) in [("4c", OP_PUSHDATA1), ("4d01", OP_PUSHDATA2), ("4e010000", OP_PUSHDATA4)]
        {
            assert_eq!(
                script(hex).tokens().unwrap_err(),
                ScriptError::InvalidPushHeader { opcode, offset: 0 }
            );
        }
    }

    #[test]
    fn iteration_stops_on_error() {
        let script = script("ac4c");
        let mut iter = script.instructions();
        assert_eq!(iter.next().unwrap().unwrap().opcode, OP_CHECKSIG);
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }

    #[test]
    fn offsets() {
        let script = script("0102ab4c01ffac");
        let offsets = script
            .instructions()
            .map(|i| i.unwrap().offset)
            .collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 2, 3, 6]);
    }

    #[test]
    fn disassembly() {
        assert!(script("5120aa").to_string().starts_with("1 <ERROR: OP_PUSHBYTES_32 at byte 1"));
        assert_eq!(script("0051ac02abcd").to_string(), "<> 1 OP_CHECKSIG abcd");
    }

    #[test]
    fn sigops() {
        // 2 <k1> <k2> 2 CHECKMULTISIG CHECKSIG
        let script = script("5201aa01bb52aeac");
        assert_eq!(script.sigop_count(true).unwrap(), 3);
        assert_eq!(script.sigop_count(false).unwrap(), 21);
        // multisig preceded by a push rather than a small int
        let script = self::script("0103ae");
        assert_eq!(script.sigop_count(true).unwrap(), 20);
        // only the immediately preceding opcode matters
        let script = self::script("5375ae");
        assert_eq!(script.sigop_count(true).unwrap(), 20);
        assert_eq!(self::script("ad60af").sigop_count(true).unwrap(), 17);
    }

    #[test]
    fn find_and_delete() {
        let codesep = LockScript::from_tokens(&[Token::Op(OP_CODESEPARATOR)]).unwrap();
        assert_eq!(script("ab76abab87").find_and_delete(&codesep), script("7687"));
        // raw byte match inside push data is not an instruction boundary
        assert_eq!(script("01ab87").find_and_delete(&codesep), script("01ab87"));
        // multi-instruction pattern matches on raw bytes
        assert_eq!(
            script("0302ff030302ff0301").find_and_delete(&script("0302ff03")),
            script("01")
        );
        // next instruction boundary is counted from the end of the removed match
        assert_eq!(script("0201ab51").find_and_delete(&script("0201")), script("ab51"));
        assert_eq!(script("ab4c").find_and_delete(&codesep), script("4c"));
        assert_eq!(script("76").find_and_delete(&LockScript::default()), script("76"));
    }

    #[test]
    fn recognizers() {
        assert!(script("a914000000000000000000000000000000000000000087").is_p2sh());
        assert!(!script("a9140000000000000000000000000000000000000000").is_p2sh());
        assert!(script(
            "51200000000000000000000000000000000000000000000000000000000000000000"
        )
        .is_p2tr());
        assert!(script(
            "210279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798ac"
        )
        .is_p2pk());
        // not a valid curve point
        assert!(!script(
            "21050000000000000000000000000000000000000000000000000000000000000000ac"
        )
        .is_p2pk());
        let k = vec![0x11u8; 32];
        let csa = LockScript::from_tokens(&[
            Token::Push(k.clone()),
            Token::Op(OP_CHECKSIG),
            Token::Push(k),
            Token::Op(OP_CHECKSIGADD),
            Token::Int(2),
            Token::Op(OP_NUMEQUAL),
        ])
        .unwrap();
        assert!(csa.is_checksigadd());
        assert!(!script("ac").is_checksigadd());
    }

    #[test]
    fn p2sh() {
        let redeem = script("51");
        let p2sh = redeem.to_p2sh();
        assert!(p2sh.is_p2sh());
        assert_eq!(
            p2sh.into_inner(),
            Script::new_p2sh(&bitcoin::ScriptHash::hash(&[0x51]))
        );
    }

    fn token() -> impl Strategy<Value = Token> {
        prop_oneof![
            any::<u8>().prop_map(|b| Token::Op(Opcode::from(b.max(0x4f)))),
            (-1i64..=16).prop_map(Token::Int),
            proptest::collection::vec(any::<u8>(), 0..300).prop_map(Token::Push),
        ]
    }

    proptest! {
        #[test]
        fn cooked_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..200)) {
            let script = LockScript::from(bytes);
            if let Ok(tokens) = script.tokens() {
                let reencoded = LockScript::from_tokens(&tokens).unwrap();
                prop_assert_eq!(reencoded.tokens().unwrap(), tokens);
            }
        }

        #[test]
        fn token_round_trip(tokens in proptest::collection::vec(token(), 0..20)) {
            let script = LockScript::from_tokens(&tokens).unwrap();
            let decoded = script.tokens().unwrap();
            prop_assert_eq!(LockScript::from_tokens(&decoded).unwrap(), script);
        }
    }
}
