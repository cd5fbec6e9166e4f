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

//! Taproot tree of tapscript leaves and its `tp(KEY,TREE)` descriptor.
//!
//! In the descriptor `TREE` is either a bracketed leaf descriptor (`[ts(...)]`)
//! or a bracketed pair of subtrees, where leaves nested in a pair are written
//! without brackets: `[ts(...),[ts(...),ts(...)]]`. Taproot tree without
//! script paths is written as `tp(KEY)`.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use bitcoin_scripts::{
    BranchNode, Forest, TaprootError, TaprootOutput, TreeNode, TAPROOT_MAX_DEPTH,
};
use secp256k1::XOnlyPublicKey;
use tracing::trace;

use crate::parser::{self, DescriptorError};
use crate::TapLeaf;

/// Internal key with an optional tree of tapscript leaves.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct TapTree {
    internal_key: XOnlyPublicKey,
    root: Option<TreeNode<TapLeaf>>,
}

impl TapTree {
    /// Constructs tree with no script paths.
    pub fn key_only(internal_key: XOnlyPublicKey) -> TapTree {
        TapTree {
            internal_key,
            root: None,
        }
    }

    /// Constructs tree with the given root node.
    pub fn with_root(
        internal_key: XOnlyPublicKey,
        root: TreeNode<TapLeaf>,
    ) -> Result<TapTree, TaprootError> {
        if root.subtree_depth() > TAPROOT_MAX_DEPTH {
            return Err(TaprootError::MaxDepthExceeded);
        }
        Ok(TapTree {
            internal_key,
            root: Some(root),
        })
    }

    /// Constructs balanced tree from the list of leaves. No leaves result in
    /// a tree without script paths.
    pub fn balanced(
        internal_key: XOnlyPublicKey,
        leaves: Vec<TapLeaf>,
    ) -> Result<TapTree, TaprootError> {
        if leaves.is_empty() {
            return Ok(TapTree::key_only(internal_key));
        }
        TreeNode::balanced(leaves).map(|root| TapTree {
            internal_key,
            root: Some(root),
        })
    }

    /// Constructs tree with the explicitly provided structure. An empty
    /// forest results in a tree without script paths; empty nested lists are
    /// an error.
    pub fn with_forest(
        internal_key: XOnlyPublicKey,
        forest: Vec<Forest<TapLeaf>>,
    ) -> Result<TapTree, TaprootError> {
        if forest.is_empty() {
            return Ok(TapTree::key_only(internal_key));
        }
        TreeNode::with_forest(forest).map(|root| TapTree {
            internal_key,
            root: Some(root),
        })
    }

    /// Constructs tree with the Huffman algorithm, such that leaves with
    /// higher weights get shorter control blocks.
    pub fn huffman(
        internal_key: XOnlyPublicKey,
        weighted: impl IntoIterator<Item = (u64, TapLeaf)>,
    ) -> Result<TapTree, TaprootError> {
        let weighted = weighted.into_iter().collect::<Vec<_>>();
        if weighted.is_empty() {
            return Ok(TapTree::key_only(internal_key));
        }
        TreeNode::huffman(weighted).map(|root| TapTree {
            internal_key,
            root: Some(root),
        })
    }

    /// Internal key.
    #[inline]
    pub fn internal_key(&self) -> XOnlyPublicKey { self.internal_key }

    /// Root of the script tree, if any.
    #[inline]
    pub fn root(&self) -> Option<&TreeNode<TapLeaf>> { self.root.as_ref() }

    /// Leaves in DFS order.
    pub fn leaves(&self) -> Vec<&TapLeaf> {
        self.root.as_ref().map(TreeNode::leaves).unwrap_or_default()
    }

    /// Computes output key, tweak and control blocks.
    pub fn construct(&self) -> Result<TaprootOutput, TaprootError> {
        match &self.root {
            None => Ok(TaprootOutput::key_only(self.internal_key)),
            Some(root) => TaprootOutput::with_tree(self.internal_key, root),
        }
    }
}

fn fmt_node(node: &TreeNode<TapLeaf>, f: &mut Formatter<'_>) -> fmt::Result {
    match node {
        TreeNode::Leaf(leaf) => Display::fmt(leaf, f),
        TreeNode::Branch(branch) => {
            f.write_str("[")?;
            fmt_node(branch.as_dfs_first_node(), f)?;
            f.write_str(",")?;
            fmt_node(branch.as_dfs_last_node(), f)?;
            f.write_str("]")
        }
    }
}

fn parse_node(s: &str, depth: usize) -> Result<TreeNode<TapLeaf>, DescriptorError> {
    if depth > TAPROOT_MAX_DEPTH + 1 {
        return Err(TaprootError::MaxDepthExceeded.into());
    }
    let inner = match s.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        Some(inner) => inner,
        None => return TapLeaf::from_str(s).map(TreeNode::Leaf),
    };
    match parser::split_args(inner)?.as_slice() {
        [single] => parse_node(single, depth + 1),
        [first, last] => Ok(TreeNode::Branch(Box::new(BranchNode::with(
            parse_node(first, depth + 1)?,
            parse_node(last, depth + 1)?,
        )))),
        _ => Err(DescriptorError::MalformedDescriptor(s.to_owned())),
    }
}

impl Display for TapTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "tp({}", self.internal_key)?;
        match &self.root {
            None => {}
            Some(TreeNode::Leaf(leaf)) => write!(f, ",[{leaf}]")?,
            Some(node) => {
                f.write_str(",")?;
                fmt_node(node, f)?;
            }
        }
        f.write_str(")")
    }
}

impl FromStr for TapTree {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = parser::strip_whitespace(s);
        let (tag, args) = parser::split_call(&s)?;
        if tag != "tp" {
            return Err(DescriptorError::UnrecognizedTag(tag.to_owned()));
        }
        let tree = match args.as_slice() {
            [key] => TapTree::key_only(parser::parse_key(key)?),
            [key, tree] => {
                let internal_key = parser::parse_key(key)?;
                let root = parse_node(tree, 0)?;
                TapTree::with_root(internal_key, root)?
            }
            _ => {
                return Err(DescriptorError::WrongArgumentCount {
                    tag: tag.to_owned(),
                    found: args.len(),
                })
            }
        };
        trace!(leaves = tree.leaves().len(), "parsed taproot tree descriptor");
        Ok(tree)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for TapTree {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for TapTree {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        TapTree::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use bitcoin_scripts::{Leaf, LockScript};
    use secp256k1::{PublicKey, SecretKey, SECP256K1};

    use super::*;
    use crate::generate_threshold_csa;

    fn key(i: u8) -> XOnlyPublicKey {
        let sk = SecretKey::from_slice(&[i; 32]).unwrap();
        PublicKey::from_secret_key(SECP256K1, &sk).x_only_public_key().0
    }

    fn raw(byte: u8) -> TapLeaf { TapLeaf::raw(LockScript::from(vec![byte])) }

    #[test]
    fn key_only() {
        let tree = TapTree::balanced(key(1), vec![]).unwrap();
        assert_eq!(tree, TapTree::key_only(key(1)));
        assert_eq!(tree.to_string(), format!("tp({})", key(1)));
        assert_eq!(TapTree::from_str(&tree.to_string()).unwrap(), tree);

        let output = tree.construct().unwrap();
        assert_eq!(output.tweak, [0u8; 32]);
        assert!(output.controls.is_empty());
        assert_eq!(output.output_key, key(1));
    }

    #[test]
    fn single_leaf() {
        let tree = TapTree::balanced(key(1), vec![TapLeaf::pk(key(2)).unwrap()]).unwrap();
        let desc = format!("tp({},[ts(pk({}))])", key(1), key(2));
        assert_eq!(tree.to_string(), desc);
        assert_eq!(TapTree::from_str(&desc).unwrap(), tree);
        // bare leaf is accepted as well
        assert_eq!(
            TapTree::from_str(&format!("tp({},ts(pk({})))", key(1), key(2))).unwrap(),
            tree
        );
    }

    #[test]
    fn nested_round_trip() {
        let forest = vec![
            Forest::Leaf(raw(0x51)),
            Forest::Nested(vec![raw(0x52).into(), raw(0x53).into(), raw(0x54).into()]),
        ];
        let tree = TapTree::with_forest(key(3), forest).unwrap();
        assert_eq!(
            tree.to_string(),
            format!("tp({},[ts(raw(51)),[ts(raw(52)),[ts(raw(53)),ts(raw(54))]]])", key(3))
        );
        let parsed = TapTree::from_str(&tree.to_string()).unwrap();
        assert_eq!(parsed, tree);
        assert_eq!(parsed.construct().unwrap(), tree.construct().unwrap());
    }

    #[test]
    fn malformed() {
        for desc in [
            format!("tp({},[ts(raw(51)),ts(raw(52))", key(1)),
            format!("tp({},[ts(raw(51)),ts(raw(52)),ts(raw(53))])", key(1)),
            format!("tp({},[ts(raw(51))]],[ts(raw(52))])", key(1)),
        ] {
            assert!(
                matches!(TapTree::from_str(&desc), Err(DescriptorError::MalformedDescriptor(_))),
                "{desc}"
            );
        }
        assert!(matches!(
            TapTree::from_str("tp(00,[ts(raw(51))])"),
            Err(DescriptorError::InvalidKey(_))
        ));
        assert!(matches!(
            TapTree::from_str(&format!("tr({})", key(1))),
            Err(DescriptorError::UnrecognizedTag(_))
        ));
    }

    #[test]
    fn huffman_weights() {
        let leaves = generate_threshold_csa(2, &[key(1), key(2), key(3), key(4)]).unwrap();
        assert_eq!(leaves.len(), 6);
        let weighted = leaves
            .iter()
            .cloned()
            .enumerate()
            .map(|(no, leaf)| (if no == 0 { 100 } else { 1 }, leaf));
        let tree = TapTree::huffman(key(5), weighted).unwrap();
        let output = tree.construct().unwrap();
        assert_eq!(output.controls.len(), 6);
        let heavy = output.control_block(leaves[0].script()).unwrap();
        assert_eq!(heavy.depth(), 1);
        assert_eq!(output.merkle_root, tree.root().map(TreeNode::node_hash));
        assert_eq!(TapTree::from_str(&tree.to_string()).unwrap(), tree);
    }

    #[test]
    fn leaves_order() {
        let tree = TapTree::balanced(key(1), vec![raw(0x51), raw(0x52), raw(0x53)]).unwrap();
        let scripts = tree
            .leaves()
            .into_iter()
            .map(|leaf| leaf.leaf_script().as_bytes()[0])
            .collect::<Vec<_>>();
        assert_eq!(scripts, vec![0x51, 0x52, 0x53]);
    }
}
