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

use bitcoin::hashes::{sha256, Hash, HashEngine};

/// Tags used for domain separation of taproot and BIP-340 hashes.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
pub enum HashTag {
    /// Taproot script tree leaf
    #[display("TapLeaf")]
    TapLeaf,

    /// Taproot script tree branch
    #[display("TapBranch")]
    TapBranch,

    /// Taproot output key tweak
    #[display("TapTweak")]
    TapTweak,

    /// Taproot signature hash
    #[display("TapSighash")]
    TapSighash,

    /// BIP-340 signature challenge
    #[display("BIP0340/challenge")]
    Bip340Challenge,
}

impl HashTag {
    /// Returns tag string.
    pub fn as_str(self) -> &'static str {
        match self {
            HashTag::TapLeaf => "TapLeaf",
            HashTag::TapBranch => "TapBranch",
            HashTag::TapTweak => "TapTweak",
            HashTag::TapSighash => "TapSighash",
            HashTag::Bip340Challenge => "BIP0340/challenge",
        }
    }

    /// Starts hash engine with the tag midstate already consumed.
    pub fn engine(self) -> sha256::HashEngine { tagged_engine(self.as_str()) }

    /// Computes tagged hash of the data.
    #[inline]
    pub fn hash(self, data: &[u8]) -> [u8; 32] { tagged_hash(self.as_str(), data) }
}

fn tagged_engine(tag: &str) -> sha256::HashEngine {
    let tag_hash = sha256::Hash::hash(tag.as_bytes());
    let mut engine = sha256::Hash::engine();
    engine.input(&tag_hash[..]);
    engine.input(&tag_hash[..]);
    engine
}

/// Computes `SHA256(SHA256(tag) || SHA256(tag) || data)`.
pub fn tagged_hash(tag: &str, data: &[u8]) -> [u8; 32] {
    let mut engine = tagged_engine(tag);
    engine.input(data);
    sha256::Hash::from_engine(engine).into_inner()
}

#[cfg(test)]
mod test {
    use bitcoin::hashes::hex::FromHex;
    use bitcoin::util::taproot::{TapBranchHash, TapLeafHash};

    use super::*;

    #[test]
    fn engine_matches_oneshot() {
        let mut engine = HashTag::TapSighash.engine();
        engine.input(b"some ");
        engine.input(b"data");
        assert_eq!(
            sha256::Hash::from_engine(engine).into_inner(),
            HashTag::TapSighash.hash(b"some data")
        );
    }

    #[test]
    fn matches_bitcoin_tagged_types() {
        let data = Vec::<u8>::from_hex("c0025187").unwrap();
        let mut engine = TapLeafHash::engine();
        engine.input(&data);
        assert_eq!(
            TapLeafHash::from_engine(engine).into_inner(),
            HashTag::TapLeaf.hash(&data)
        );

        let data = [0x42u8; 64];
        let mut engine = TapBranchHash::engine();
        engine.input(&data);
        assert_eq!(
            TapBranchHash::from_engine(engine).into_inner(),
            HashTag::TapBranch.hash(&data)
        );
    }

    #[test]
    fn display() {
        assert_eq!(HashTag::Bip340Challenge.to_string(), "BIP0340/challenge");
        assert_eq!(HashTag::TapTweak.to_string(), HashTag::TapTweak.as_str());
    }
}
