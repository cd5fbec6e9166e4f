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

//! Signature hashes for legacy (pre-segwit), segwit v0 (BIP-143) and taproot
//! (BIP-341) inputs.

use std::fmt::{self, Display, Formatter};

use amplify::Wrapper;
use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::hex::ToHex;
use bitcoin::hashes::{sha256, sha256d, Hash, HashEngine};
use bitcoin::{SchnorrSighashType, Script, Sequence, Transaction, TxOut, Witness};
use bitcoin_scripts::opcode::OP_CODESEPARATOR;
use bitcoin_scripts::{leaf_hash, HashTag, LockScript, ANNEX_TAG, LEAF_VERSION_TAPSCRIPT};
use tracing::{debug, trace};

const SIGHASH_NONE: u32 = 0x02;
const SIGHASH_SINGLE: u32 = 0x03;
const SIGHASH_ANYONECANPAY: u32 = 0x80;

/// Digest returned by the legacy algorithm for the inputs which can't be
/// signed (`SIGHASH_SINGLE` without a matching output).
pub const SIGHASH_ONE: [u8; 32] = {
    let mut one = [0u8; 32];
    one[0] = 1;
    one
};

/// Errors computing signature hashes.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum SighashError {
    /// input index {index} is out of range for a transaction with {inputs}
    /// inputs.
    InputIndex {
        /// Index of the signed input
        index: usize,
        /// Number of transaction inputs
        inputs: usize,
    },

    /// number of spent outputs ({prevouts}) does not match the number of
    /// transaction inputs ({inputs}).
    PrevoutsMismatch {
        /// Number of transaction inputs
        inputs: usize,
        /// Number of provided spent outputs
        prevouts: usize,
    },

    /// taproot annex must be non-empty and start with 0x50 byte.
    InvalidAnnex,

    /// taproot signature message has length of {actual} bytes while {expected}
    /// bytes were expected.
    PreimageLength {
        /// Expected message length
        expected: usize,
        /// Actual message length
        actual: usize,
    },

    /// invalid taproot sighash type {0:#04x}.
    InvalidSighashType(u8),
}

/// Reasons for the legacy algorithm to return [`SIGHASH_ONE`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum SighashOutOfRange {
    /// input index {index} is out of range for a transaction with {inputs}
    /// inputs.
    Input {
        /// Index of the signed input
        index: usize,
        /// Number of transaction inputs
        inputs: usize,
    },

    /// SIGHASH_SINGLE is used for input {index} while the transaction has
    /// only {outputs} outputs.
    Output {
        /// Index of the signed input
        index: usize,
        /// Number of transaction outputs
        outputs: usize,
    },
}

/// 32-byte signature hash, in the byte order it is signed.
#[derive(
    Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Debug, From
)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct Sighash([u8; 32]);

impl Display for Sighash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(&self.0.to_hex()) }
}

impl AsRef<[u8]> for Sighash {
    #[inline]
    fn as_ref(&self) -> &[u8] { &self.0 }
}

/// Result of the legacy signature hash algorithm.
///
/// The algorithm never fails: for inputs which can't be signed it returns
/// [`SIGHASH_ONE`] digest, reproducing the consensus behaviour, and reports
/// the reason in `error`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct LegacySighash {
    /// Signature hash
    pub sighash: Sighash,
    /// Reason why the sighash is the [`SIGHASH_ONE`] sentinel
    pub error: Option<SighashOutOfRange>,
}

impl LegacySighash {
    fn out_of_range(error: SighashOutOfRange) -> LegacySighash {
        LegacySighash {
            sighash: Sighash(SIGHASH_ONE),
            error: Some(error),
        }
    }
}

/// Computes legacy (pre-segwit) signature hash for the input `index`, which
/// spends output locked with `script`.
///
/// `OP_CODESEPARATOR`s are removed from the `script`; other inputs get empty
/// `scriptSig`s.
pub fn legacy_sighash(
    script: &LockScript,
    tx: &Transaction,
    index: usize,
    hash_type: u32,
) -> LegacySighash {
    debug!(input = index, hash_type, "computing legacy signature hash");

    if index >= tx.input.len() {
        return LegacySighash::out_of_range(SighashOutOfRange::Input {
            index,
            inputs: tx.input.len(),
        });
    }
    let base_type = hash_type & 0x1f;
    if base_type == SIGHASH_SINGLE && index >= tx.output.len() {
        return LegacySighash::out_of_range(SighashOutOfRange::Output {
            index,
            outputs: tx.output.len(),
        });
    }

    let script_code = script.find_and_delete(&LockScript::from(vec![OP_CODESEPARATOR.to_u8()]));

    let mut tx = tx.clone();
    for (no, txin) in tx.input.iter_mut().enumerate() {
        txin.witness = Witness::default();
        txin.script_sig = if no == index {
            script_code.to_inner()
        } else {
            Script::new()
        };
    }

    match base_type {
        SIGHASH_NONE => {
            tx.output = vec![];
            zero_other_sequences(&mut tx, index);
        }
        SIGHASH_SINGLE => {
            tx.output.truncate(index + 1);
            for txout in &mut tx.output[..index] {
                *txout = TxOut {
                    value: u64::MAX,
                    script_pubkey: Script::new(),
                };
            }
            zero_other_sequences(&mut tx, index);
        }
        _ => {}
    }

    if hash_type & SIGHASH_ANYONECANPAY != 0 {
        tx.input = vec![tx.input.swap_remove(index)];
    }

    let mut engine = sha256d::Hash::engine();
    engine.input(&serialize(&tx));
    engine.input(&hash_type.to_le_bytes());
    LegacySighash {
        sighash: Sighash(sha256d::Hash::from_engine(engine).into_inner()),
        error: None,
    }
}

fn zero_other_sequences(tx: &mut Transaction, index: usize) {
    for (no, txin) in tx.input.iter_mut().enumerate() {
        if no != index {
            txin.sequence = Sequence(0);
        }
    }
}

fn sha256d_of(data: impl IntoIterator<Item = Vec<u8>>) -> [u8; 32] {
    let mut engine = sha256d::Hash::engine();
    for chunk in data {
        engine.input(&chunk);
    }
    sha256d::Hash::from_engine(engine).into_inner()
}

fn sha256_of(data: impl IntoIterator<Item = Vec<u8>>) -> [u8; 32] {
    let mut engine = sha256::Hash::engine();
    for chunk in data {
        engine.input(&chunk);
    }
    sha256::Hash::from_engine(engine).into_inner()
}

/// Computes BIP-143 signature hash for the segwit v0 input `index` spending
/// `amount` satoshis with `script_code`.
pub fn segwit_v0_sighash(
    script_code: &LockScript,
    tx: &Transaction,
    index: usize,
    hash_type: u32,
    amount: u64,
) -> Result<Sighash, SighashError> {
    debug!(input = index, hash_type, amount, "computing segwit v0 signature hash");

    let txin = tx.input.get(index).ok_or(SighashError::InputIndex {
        index,
        inputs: tx.input.len(),
    })?;
    let base_type = hash_type & 0x1f;
    let anyone_can_pay = hash_type & SIGHASH_ANYONECANPAY != 0;

    let mut hash_prevouts = [0u8; 32];
    let mut hash_sequence = [0u8; 32];
    let mut hash_outputs = [0u8; 32];

    if !anyone_can_pay {
        hash_prevouts = sha256d_of(tx.input.iter().map(|txin| serialize(&txin.previous_output)));
    }
    if !anyone_can_pay && base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
        hash_sequence = sha256d_of(tx.input.iter().map(|txin| serialize(&txin.sequence)));
    }
    if base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
        hash_outputs = sha256d_of(tx.output.iter().map(serialize));
    } else if base_type == SIGHASH_SINGLE && index < tx.output.len() {
        hash_outputs = sha256d_of([serialize(&tx.output[index])]);
    }

    let mut engine = sha256d::Hash::engine();
    engine.input(&tx.version.to_le_bytes());
    engine.input(&hash_prevouts);
    engine.input(&hash_sequence);
    engine.input(&serialize(&txin.previous_output));
    engine.input(&serialize(script_code.as_inner()));
    engine.input(&amount.to_le_bytes());
    engine.input(&txin.sequence.0.to_le_bytes());
    engine.input(&hash_outputs);
    engine.input(&tx.lock_time.0.to_le_bytes());
    engine.input(&hash_type.to_le_bytes());
    Ok(Sighash(sha256d::Hash::from_engine(engine).into_inner()))
}

/// Taproot signature hash types.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[repr(u8)]
pub enum TapSighashType {
    /// Commits to all inputs and outputs; omitted from the signature.
    #[default]
    #[display("SIGHASH_DEFAULT")]
    Default = 0x00,

    /// Commits to all inputs and outputs.
    #[display("SIGHASH_ALL")]
    All = 0x01,

    /// Commits to all inputs and no outputs.
    #[display("SIGHASH_NONE")]
    None = 0x02,

    /// Commits to all inputs and the output with the same index.
    #[display("SIGHASH_SINGLE")]
    Single = 0x03,

    /// Commits to the signed input and all outputs.
    #[display("SIGHASH_ALL|SIGHASH_ANYONECANPAY")]
    AllPlusAnyoneCanPay = 0x81,

    /// Commits to the signed input only.
    #[display("SIGHASH_NONE|SIGHASH_ANYONECANPAY")]
    NonePlusAnyoneCanPay = 0x82,

    /// Commits to the signed input and the output with the same index.
    #[display("SIGHASH_SINGLE|SIGHASH_ANYONECANPAY")]
    SinglePlusAnyoneCanPay = 0x83,
}

impl TapSighashType {
    /// Parses sighash type byte.
    pub fn from_u8(hash_type: u8) -> Result<TapSighashType, SighashError> {
        Ok(match hash_type {
            0x00 => TapSighashType::Default,
            0x01 => TapSighashType::All,
            0x02 => TapSighashType::None,
            0x03 => TapSighashType::Single,
            0x81 => TapSighashType::AllPlusAnyoneCanPay,
            0x82 => TapSighashType::NonePlusAnyoneCanPay,
            0x83 => TapSighashType::SinglePlusAnyoneCanPay,
            wrong => return Err(SighashError::InvalidSighashType(wrong)),
        })
    }

    /// Returns sighash type byte.
    #[inline]
    pub fn to_u8(self) -> u8 { self as u8 }

    /// Detects whether only the signed input is committed to.
    #[inline]
    pub fn is_anyone_can_pay(self) -> bool { self.to_u8() & 0x80 != 0 }

    fn commits_all_outputs(self) -> bool {
        matches!(
            self,
            TapSighashType::Default | TapSighashType::All | TapSighashType::AllPlusAnyoneCanPay
        )
    }

    fn is_single(self) -> bool {
        matches!(self, TapSighashType::Single | TapSighashType::SinglePlusAnyoneCanPay)
    }
}

impl From<TapSighashType> for SchnorrSighashType {
    fn from(ty: TapSighashType) -> Self {
        match ty {
            TapSighashType::Default => SchnorrSighashType::Default,
            TapSighashType::All => SchnorrSighashType::All,
            TapSighashType::None => SchnorrSighashType::None,
            TapSighashType::Single => SchnorrSighashType::Single,
            TapSighashType::AllPlusAnyoneCanPay => SchnorrSighashType::AllPlusAnyoneCanPay,
            TapSighashType::NonePlusAnyoneCanPay => SchnorrSighashType::NonePlusAnyoneCanPay,
            TapSighashType::SinglePlusAnyoneCanPay => SchnorrSighashType::SinglePlusAnyoneCanPay,
        }
    }
}

/// Leaf script which is spent with a taproot script path.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ScriptPath {
    /// Leaf version
    pub leaf_version: u8,
    /// Leaf script
    pub script: LockScript,
    /// Position of the last executed `OP_CODESEPARATOR`, or `u32::MAX` if
    /// none was executed.
    pub codesep_pos: u32,
}

impl ScriptPath {
    /// Tapscript leaf without executed `OP_CODESEPARATOR`s.
    pub fn tapscript(script: LockScript) -> ScriptPath {
        ScriptPath {
            leaf_version: LEAF_VERSION_TAPSCRIPT,
            script,
            codesep_pos: u32::MAX,
        }
    }
}

/// Computes BIP-341 signature hash for the taproot input `index`.
///
/// `spent` must contain outputs spent by every transaction input, in the
/// input order. For key path spends `script_path` is `None`. The `annex`,
/// when present, must start with `0x50`.
///
/// `SIGHASH_SINGLE` for an input without matching output commits to 32 zero
/// bytes in place of the output hash.
pub fn taproot_sighash(
    tx: &Transaction,
    spent: &[TxOut],
    hash_type: TapSighashType,
    index: usize,
    script_path: Option<&ScriptPath>,
    annex: Option<&[u8]>,
) -> Result<Sighash, SighashError> {
    debug!(
        input = index,
        %hash_type,
        script_path = script_path.is_some(),
        annex = annex.is_some(),
        "computing taproot signature hash"
    );

    if spent.len() != tx.input.len() {
        return Err(SighashError::PrevoutsMismatch {
            inputs: tx.input.len(),
            prevouts: spent.len(),
        });
    }
    let txin = tx.input.get(index).ok_or(SighashError::InputIndex {
        index,
        inputs: tx.input.len(),
    })?;
    if let Some(annex) = annex {
        if annex.first() != Some(&ANNEX_TAG) {
            return Err(SighashError::InvalidAnnex);
        }
    }

    let anyone_can_pay = hash_type.is_anyone_can_pay();
    let mut msg = Vec::with_capacity(256);

    msg.push(0u8); // epoch
    msg.push(hash_type.to_u8());
    msg.extend(tx.version.to_le_bytes());
    msg.extend(tx.lock_time.0.to_le_bytes());

    if !anyone_can_pay {
        msg.extend(sha256_of(tx.input.iter().map(|txin| serialize(&txin.previous_output))));
        msg.extend(sha256_of(spent.iter().map(|txout| txout.value.to_le_bytes().to_vec())));
        msg.extend(sha256_of(spent.iter().map(|txout| serialize(&txout.script_pubkey))));
        msg.extend(sha256_of(tx.input.iter().map(|txin| serialize(&txin.sequence))));
    }
    if hash_type.commits_all_outputs() {
        msg.extend(sha256_of(tx.output.iter().map(serialize)));
    }

    let spend_type = annex.is_some() as u8 | (script_path.is_some() as u8) << 1;
    msg.push(spend_type);

    let mut input_len = 4;
    if anyone_can_pay {
        let spk = serialize(&spent[index].script_pubkey);
        input_len = 36 + 8 + spk.len() + 4;
        msg.extend(serialize(&txin.previous_output));
        msg.extend(spent[index].value.to_le_bytes());
        msg.extend(spk);
        msg.extend(txin.sequence.0.to_le_bytes());
    } else {
        msg.extend((index as u32).to_le_bytes());
    }

    if let Some(annex) = annex {
        msg.extend(sha256_of([serialize(&annex.to_vec())]));
    }

    if hash_type.is_single() {
        match tx.output.get(index) {
            Some(txout) => msg.extend(sha256_of([serialize(txout)])),
            None => msg.extend([0u8; 32]),
        }
    }

    if let Some(path) = script_path {
        msg.extend(leaf_hash(path.leaf_version, &path.script).into_inner());
        msg.push(0u8); // key version
        msg.extend(path.codesep_pos.to_le_bytes());
    }

    let expected = 10
        + !anyone_can_pay as usize * 128
        + hash_type.commits_all_outputs() as usize * 32
        + 1
        + input_len
        + annex.is_some() as usize * 32
        + hash_type.is_single() as usize * 32
        + script_path.is_some() as usize * 37;
    if msg.len() != expected {
        return Err(SighashError::PreimageLength {
            expected,
            actual: msg.len(),
        });
    }
    trace!(preimage = %msg.to_hex(), "taproot signature message");

    Ok(Sighash(HashTag::TapSighash.hash(&msg)))
}

#[cfg(test)]
mod test {
    use bitcoin::hashes::hash160;
    use bitcoin::util::sighash::{Annex, Prevouts, SighashCache};
    use bitcoin::util::taproot::{LeafVersion, TapLeafHash};
    use bitcoin::{EcdsaSighashType, OutPoint, PackedLockTime, TxIn, Txid};

    use super::*;

    fn tx(inputs: u8, outputs: u8) -> Transaction {
        Transaction {
            version: 2,
            lock_time: PackedLockTime(500_000),
            input: (0..inputs)
                .map(|no| TxIn {
                    previous_output: OutPoint::new(Txid::from_inner([no + 1; 32]), no as u32),
                    script_sig: Script::from(vec![0x51; no as usize]),
                    sequence: Sequence(0xffff_fffd - no as u32),
                    witness: Witness::from_vec(vec![vec![no; 8]]),
                })
                .collect(),
            output: (0..outputs)
                .map(|no| TxOut {
                    value: 10_000 * (no as u64 + 1),
                    script_pubkey: LockScript::p2pkh(hash160::Hash::hash(&[no])).to_inner(),
                })
                .collect(),
        }
    }

    fn spent(count: u8) -> Vec<TxOut> {
        (0..count)
            .map(|no| TxOut {
                value: 50_000 + no as u64,
                script_pubkey: Script::from([&[0x51, 0x20][..], &[no; 32][..]].concat()),
            })
            .collect()
    }

    fn script_code() -> LockScript { LockScript::p2pkh(hash160::Hash::hash(b"signer")) }

    const ECDSA_TYPES: [u32; 6] = [0x01, 0x02, 0x03, 0x81, 0x82, 0x83];

    #[test]
    #[allow(deprecated)]
    fn legacy_matches_bitcoin() {
        let tx = tx(3, 3);
        let script = script_code();
        for hash_type in ECDSA_TYPES {
            for index in 0..3 {
                let ours = legacy_sighash(&script, &tx, index, hash_type);
                let theirs = tx.signature_hash(index, script.as_inner(), hash_type);
                assert_eq!(ours.error, None);
                assert_eq!(ours.sighash.into_inner(), theirs.into_inner(), "{hash_type:#x}");
            }
        }
    }

    #[test]
    fn legacy_single_bug() {
        let tx = tx(3, 1);
        let script = script_code();
        // the sentinel is selected by the base type, so SINGLE|ANYONECANPAY
        // is affected as well
        for hash_type in [0x03, 0x83] {
            let res = legacy_sighash(&script, &tx, 2, hash_type);
            assert_eq!(res.sighash, Sighash(SIGHASH_ONE));
            assert_eq!(
                res.error,
                Some(SighashOutOfRange::Output {
                    index: 2,
                    outputs: 1
                })
            );
        }
        let expected = SighashCache::new(&tx)
            .legacy_signature_hash(2, script.as_inner(), 0x03)
            .unwrap();
        assert_eq!(expected.into_inner(), SIGHASH_ONE);
        assert_eq!(
            legacy_sighash(&script, &tx, 1, 0x03).error,
            Some(SighashOutOfRange::Output {
                index: 1,
                outputs: 1
            })
        );
        assert_eq!(legacy_sighash(&script, &tx, 0, 0x03).error, None);
        let res = legacy_sighash(&script, &tx, 3, 0x01);
        assert_eq!(res.sighash.into_inner(), SIGHASH_ONE);
        assert_eq!(
            res.error,
            Some(SighashOutOfRange::Input {
                index: 3,
                inputs: 3
            })
        );
    }

    #[test]
    fn legacy_removes_codeseparators() {
        let tx = tx(2, 2);
        let plain = script_code();
        let mut bytes = vec![OP_CODESEPARATOR.to_u8()];
        bytes.extend(plain.as_bytes());
        bytes.push(OP_CODESEPARATOR.to_u8());
        let with_codesep = LockScript::from(bytes);
        for hash_type in ECDSA_TYPES {
            assert_eq!(
                legacy_sighash(&with_codesep, &tx, 1, hash_type),
                legacy_sighash(&plain, &tx, 1, hash_type)
            );
        }
    }

    #[test]
    fn segwit_v0_matches_bitcoin() {
        let tx = tx(3, 2);
        let script = script_code();
        let mut cache = SighashCache::new(&tx);
        for hash_type in ECDSA_TYPES {
            // input 2 has no matching output for SIGHASH_SINGLE
            for index in 0..3 {
                let ours = segwit_v0_sighash(&script, &tx, index, hash_type, 77_777).unwrap();
                let theirs = cache
                    .segwit_signature_hash(
                        index,
                        script.as_inner(),
                        77_777,
                        EcdsaSighashType::from_consensus(hash_type),
                    )
                    .unwrap();
                assert_eq!(ours.into_inner(), theirs.into_inner(), "{hash_type:#x}");
            }
        }
        assert_eq!(
            segwit_v0_sighash(&script, &tx, 3, 0x01, 0),
            Err(SighashError::InputIndex {
                index: 3,
                inputs: 3
            })
        );
    }

    const TAP_TYPES: [TapSighashType; 7] = [
        TapSighashType::Default,
        TapSighashType::All,
        TapSighashType::None,
        TapSighashType::Single,
        TapSighashType::AllPlusAnyoneCanPay,
        TapSighashType::NonePlusAnyoneCanPay,
        TapSighashType::SinglePlusAnyoneCanPay,
    ];

    #[test]
    fn taproot_matches_bitcoin() {
        let tx = tx(3, 3);
        let spent = spent(3);
        let annex = [ANNEX_TAG, 0xde, 0xad];
        let path = ScriptPath {
            codesep_pos: 7,
            ..ScriptPath::tapscript(script_code())
        };
        let leaf_hash = TapLeafHash::from_script(path.script.as_inner(), LeafVersion::TapScript);

        let mut cache = SighashCache::new(&tx);
        for hash_type in TAP_TYPES {
            for index in 0..3 {
                for with_annex in [false, true] {
                    for with_path in [false, true] {
                        let ours = taproot_sighash(
                            &tx,
                            &spent,
                            hash_type,
                            index,
                            with_path.then_some(&path),
                            with_annex.then_some(&annex[..]),
                        )
                        .unwrap();
                        let theirs = cache
                            .taproot_signature_hash(
                                index,
                                &Prevouts::All(&spent),
                                with_annex.then(|| Annex::new(&annex).unwrap()),
                                with_path.then_some((leaf_hash, 7)),
                                hash_type.into(),
                            )
                            .unwrap();
                        assert_eq!(ours.into_inner(), theirs.into_inner(), "{hash_type}");
                    }
                }
            }
        }
    }

    #[test]
    fn taproot_single_without_output() {
        let tx = tx(2, 1);
        let spent = spent(2);
        let single = taproot_sighash(&tx, &spent, TapSighashType::Single, 1, None, None).unwrap();
        let none = taproot_sighash(&tx, &spent, TapSighashType::None, 1, None, None).unwrap();
        assert_ne!(single, none);
    }

    #[test]
    fn taproot_errors() {
        let tx = tx(2, 2);
        assert_eq!(
            taproot_sighash(&tx, &spent(1), TapSighashType::Default, 0, None, None),
            Err(SighashError::PrevoutsMismatch {
                inputs: 2,
                prevouts: 1
            })
        );
        assert_eq!(
            taproot_sighash(&tx, &spent(2), TapSighashType::Default, 2, None, None),
            Err(SighashError::InputIndex {
                index: 2,
                inputs: 2
            })
        );
        for annex in [&[][..], &[0x51, 0x00][..]] {
            assert_eq!(
                taproot_sighash(&tx, &spent(2), TapSighashType::Default, 0, None, Some(annex)),
                Err(SighashError::InvalidAnnex)
            );
        }
    }

    #[test]
    fn sighash_type_bytes() {
        for ty in TAP_TYPES {
            assert_eq!(TapSighashType::from_u8(ty.to_u8()), Ok(ty));
            assert_eq!(SchnorrSighashType::from(ty) as u8, ty.to_u8());
        }
        for wrong in [0x04, 0x80, 0x84, 0xff] {
            assert_eq!(TapSighashType::from_u8(wrong), Err(SighashError::InvalidSighashType(wrong)));
        }
        assert!(TapSighashType::NonePlusAnyoneCanPay.is_anyone_can_pay());
        assert!(!TapSighashType::Default.is_anyone_can_pay());
    }
}
