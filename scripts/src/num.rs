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

use std::fmt::{self, Display, Formatter};

/// Integer as it is represented on the script stack: minimal little-endian
/// sign-magnitude byte string, with the sign kept in the top bit of the last
/// byte. Zero is an empty byte string.
#[derive(
    Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Debug, From
)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct ScriptNum(i64);

impl Display for ScriptNum {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { Display::fmt(&self.0, f) }
}

impl ScriptNum {
    /// Serializes the number into its minimal stack representation (without
    /// push opcode).
    pub fn to_vec(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(9);
        if self.0 == 0 {
            return bytes;
        }
        let neg = self.0 < 0;
        let mut abs = self.0.unsigned_abs();
        while abs > 0 {
            bytes.push((abs & 0xff) as u8);
            abs >>= 8;
        }
        // last byte is non-empty here since abs was non-zero
        let last = bytes.len() - 1;
        if bytes[last] & 0x80 != 0 {
            bytes.push(if neg { 0x80 } else { 0x00 });
        } else if neg {
            bytes[last] |= 0x80;
        }
        bytes
    }

    /// Decodes number from its stack representation. Minimal encoding is
    /// assumed and not checked; returns `None` for inputs longer than 8 bytes
    /// (which can't fit into `i64` magnitude).
    pub fn from_slice(data: &[u8]) -> Option<ScriptNum> {
        if data.is_empty() {
            return Some(ScriptNum(0));
        }
        if data.len() > 8 {
            return None;
        }
        let mut abs = 0u64;
        for (i, byte) in data.iter().enumerate() {
            abs |= (*byte as u64) << (8 * i);
        }
        let sign_bit = 0x80u64 << (8 * (data.len() - 1));
        if abs & sign_bit != 0 {
            let magnitude = abs & !sign_bit;
            // i64::MIN magnitude is not representable as a positive i64
            i64::try_from(magnitude).ok().map(|m| ScriptNum(-m))
        } else {
            i64::try_from(abs).ok().map(ScriptNum)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_encodings() {
        let cases: &[(i64, &[u8])] = &[
            (0, &[]),
            (1, &[0x01]),
            (-1, &[0x81]),
            (16, &[0x10]),
            (32, &[0x20]),
            (127, &[0x7f]),
            (128, &[0x80, 0x00]),
            (-128, &[0x80, 0x80]),
            (255, &[0xff, 0x00]),
            (256, &[0x00, 0x01]),
            (-255, &[0xff, 0x80]),
            (0x7fff_ffff, &[0xff, 0xff, 0xff, 0x7f]),
            (0xffff_ffff, &[0xff, 0xff, 0xff, 0xff, 0x00]),
        ];
        for (value, bytes) in cases {
            assert_eq!(&ScriptNum::from(*value).to_vec(), bytes, "{value}");
            assert_eq!(ScriptNum::from_slice(bytes), Some(ScriptNum::from(*value)));
        }
    }

    #[test]
    fn too_long() {
        assert_eq!(ScriptNum::from_slice(&[0u8; 9]), None);
    }

    proptest::proptest! {
        #[test]
        fn stack_representation(value in (i64::MIN + 1)..=i64::MAX) {
            let num = ScriptNum::from(value);
            proptest::prop_assert_eq!(ScriptNum::from_slice(&num.to_vec()), Some(num));
        }
    }
}
