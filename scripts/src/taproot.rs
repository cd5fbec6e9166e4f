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

//! Taproot script tree construction (balanced, explicitly structured and
//! weighted Huffman trees), merkle root computation, output key tweaking and
//! control block derivation.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt::{self, Display, Formatter};

use amplify::Wrapper;
use bitcoin::consensus::encode::{serialize, VarInt};
use bitcoin::hashes::hex::ToHex;
use secp256k1::{Parity, Scalar, XOnlyPublicKey, SECP256K1};
use tracing::debug;

use crate::opcode::OP_1;
use crate::{HashTag, LockScript};

/// Maximum depth of a taproot script tree.
pub const TAPROOT_MAX_DEPTH: usize = 128;

/// Leaf version for BIP-342 tapscript.
pub const LEAF_VERSION_TAPSCRIPT: u8 = 0xc0;

/// Errors happening during taproot tree construction.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum TaprootError {
    /// maximum taproot script tree depth exceeded.
    MaxDepthExceeded,

    /// leaf version {0:#04x} is invalid: it must be even and must not be 0xff.
    InvalidLeafVersion(u8),

    /// the tweak for the internal key is not a valid scalar.
    TweakFailure,

    /// taproot script tree (or one of its subtrees) contains no leaves.
    EmptyForest,
}

/// Hash of a taproot script tree node (either leaf or branch).
#[derive(
    Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Debug, From
)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct TapNodeHash([u8; 32]);

impl Display for TapNodeHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(&self.0.to_hex()) }
}

/// Computes leaf hash: tagged `TapLeaf` hash of the version byte (with the
/// parity bit cleared) followed by the length-prefixed script.
pub fn leaf_hash(version: u8, script: &LockScript) -> TapNodeHash {
    let mut data = Vec::with_capacity(script.len() + 10);
    data.push(version & 0xfe);
    data.extend(serialize(&VarInt(script.len() as u64)));
    data.extend(script.as_bytes());
    TapNodeHash(HashTag::TapLeaf.hash(&data))
}

/// Computes branch hash. The child hashes are ordered lexicographically, so
/// the result does not depend on the order of arguments.
pub fn branch_hash(a: TapNodeHash, b: TapNodeHash) -> TapNodeHash {
    let (min, max) = if a <= b { (a, b) } else { (b, a) };
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(min.as_inner());
    data[32..].copy_from_slice(max.as_inner());
    TapNodeHash(HashTag::TapBranch.hash(&data))
}

/// Trait for the types which can be placed into the leaves of the taproot
/// script tree.
pub trait Leaf {
    /// Leaf version.
    fn leaf_version(&self) -> u8;

    /// Leaf script.
    fn leaf_script(&self) -> &LockScript;

    /// Computes leaf hash.
    fn leaf_hash(&self) -> TapNodeHash { leaf_hash(self.leaf_version(), self.leaf_script()) }
}

/// Script with a leaf version.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[display("{version:#04x} {script}")]
pub struct LeafScript {
    /// Leaf version of the script
    pub version: u8,

    /// Script data
    pub script: LockScript,
}

impl LeafScript {
    /// Constructs tapscript leaf (version `0xc0`).
    #[inline]
    pub fn tapscript(script: LockScript) -> LeafScript {
        LeafScript {
            version: LEAF_VERSION_TAPSCRIPT,
            script,
        }
    }
}

impl Leaf for LeafScript {
    #[inline]
    fn leaf_version(&self) -> u8 { self.version }

    #[inline]
    fn leaf_script(&self) -> &LockScript { &self.script }
}

/// Node of a taproot script tree.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum TreeNode<L> {
    /// Leaf node.
    Leaf(L),

    /// Branch node.
    Branch(Box<BranchNode<L>>),
}

/// Two child nodes under a branch node.
///
/// The children are kept in the construction (DFS) order; consensus ordering
/// is applied only when computing the branch hash.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct BranchNode<L> {
    first: TreeNode<L>,
    last: TreeNode<L>,
}

impl<L> BranchNode<L> {
    /// Constructs branch from two child nodes.
    pub fn with(first: TreeNode<L>, last: TreeNode<L>) -> Self { BranchNode { first, last } }

    /// Returns reference to the first (in DFS ordering) child node.
    #[inline]
    pub fn as_dfs_first_node(&self) -> &TreeNode<L> { &self.first }

    /// Returns reference to the last (in DFS ordering) child node.
    #[inline]
    pub fn as_dfs_last_node(&self) -> &TreeNode<L> { &self.last }

    /// Splits the structure into the child nodes in DFS order.
    #[inline]
    pub fn split_dfs(self) -> (TreeNode<L>, TreeNode<L>) { (self.first, self.last) }
}

impl<L: Leaf> BranchNode<L> {
    /// Computes branch hash of this branch node.
    pub fn branch_hash(&self) -> TapNodeHash {
        branch_hash(self.first.node_hash(), self.last.node_hash())
    }
}

/// Explicit tree structure: each list of items is split into two halves by
/// position, recursively; a single-item list is the item itself.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Forest<L> {
    /// Leaf item.
    Leaf(L),

    /// Nested list of items.
    Nested(Vec<Forest<L>>),
}

impl<L> From<L> for Forest<L> {
    #[inline]
    fn from(leaf: L) -> Self { Forest::Leaf(leaf) }
}

impl<L> TreeNode<L> {
    /// Returns the depth of the subtree under this node; zero for leaves.
    pub fn subtree_depth(&self) -> usize {
        match self {
            TreeNode::Leaf(_) => 0,
            TreeNode::Branch(branch) => {
                1 + branch
                    .first
                    .subtree_depth()
                    .max(branch.last.subtree_depth())
            }
        }
    }

    /// Returns all leaves of the tree in DFS order.
    pub fn leaves(&self) -> Vec<&L> {
        let mut leaves = vec![];
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                TreeNode::Leaf(leaf) => leaves.push(leaf),
                TreeNode::Branch(branch) => {
                    stack.push(&branch.last);
                    stack.push(&branch.first);
                }
            }
        }
        leaves
    }

    /// Constructs tree with the explicitly provided structure.
    ///
    /// Nested lists with a single item do not add a tree level. Depth is
    /// checked while descending, so over-deep forests fail before the whole
    /// structure is visited.
    #[inline]
    pub fn with_forest(forest: Vec<Forest<L>>) -> Result<TreeNode<L>, TaprootError> {
        Self::from_forest(forest, 0)
    }

    /// Constructs balanced tree, splitting the list of leaves into halves by
    /// position.
    pub fn balanced(leaves: impl IntoIterator<Item = L>) -> Result<TreeNode<L>, TaprootError> {
        Self::with_forest(leaves.into_iter().map(Forest::Leaf).collect())
    }

    fn from_forest(
        mut items: Vec<Forest<L>>,
        depth: usize,
    ) -> Result<TreeNode<L>, TaprootError> {
        if depth > TAPROOT_MAX_DEPTH {
            return Err(TaprootError::MaxDepthExceeded);
        }
        loop {
            match items.len() {
                0 => return Err(TaprootError::EmptyForest),
                1 => match items.remove(0) {
                    Forest::Leaf(leaf) => return Ok(TreeNode::Leaf(leaf)),
                    Forest::Nested(nested) => items = nested,
                },
                len => {
                    let last = items.split_off(len / 2);
                    return Ok(TreeNode::Branch(Box::new(BranchNode::with(
                        Self::from_forest(items, depth + 1)?,
                        Self::from_forest(last, depth + 1)?,
                    ))));
                }
            }
        }
    }

    fn check_depth(self) -> Result<Self, TaprootError> {
        if self.subtree_depth() > TAPROOT_MAX_DEPTH {
            return Err(TaprootError::MaxDepthExceeded);
        }
        Ok(self)
    }
}

struct Weighted<L> {
    weight: u64,
    hash: TapNodeHash,
    seq: usize,
    node: TreeNode<L>,
}

impl<L> Weighted<L> {
    fn key(&self) -> (u64, TapNodeHash, usize) { (self.weight, self.hash, self.seq) }
}

impl<L> PartialEq for Weighted<L> {
    fn eq(&self, other: &Self) -> bool { self.key() == other.key() }
}

impl<L> Eq for Weighted<L> {}

impl<L> PartialOrd for Weighted<L> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl<L> Ord for Weighted<L> {
    fn cmp(&self, other: &Self) -> Ordering { self.key().cmp(&other.key()) }
}

impl<L: Leaf> TreeNode<L> {
    /// Computes node hash.
    pub fn node_hash(&self) -> TapNodeHash {
        match self {
            TreeNode::Leaf(leaf) => leaf.leaf_hash(),
            TreeNode::Branch(branch) => branch.branch_hash(),
        }
    }

    /// Constructs tree with the Huffman algorithm, repeatedly merging two
    /// subtrees with the lowest weights, such that frequently used leaves get
    /// shorter merkle paths. Ties are resolved by the node hash.
    pub fn huffman(
        weighted: impl IntoIterator<Item = (u64, L)>,
    ) -> Result<TreeNode<L>, TaprootError> {
        let mut seq = 0usize;
        let mut queue = BinaryHeap::new();
        for (weight, leaf) in weighted {
            let node = TreeNode::Leaf(leaf);
            queue.push(Reverse(Weighted {
                weight,
                hash: node.node_hash(),
                seq,
                node,
            }));
            seq += 1;
        }

        loop {
            let Reverse(first) = queue.pop().ok_or(TaprootError::EmptyForest)?;
            let Reverse(last) = match queue.pop() {
                Some(item) => item,
                None => return first.node.check_depth(),
            };
            let node = TreeNode::Branch(Box::new(BranchNode::with(first.node, last.node)));
            queue.push(Reverse(Weighted {
                weight: first.weight.saturating_add(last.weight),
                hash: node.node_hash(),
                seq,
                node,
            }));
            seq += 1;
        }
    }
}

/// Control block for a taproot script path spending: leaf version byte with
/// the output key parity in its lowest bit, x-only internal key and the
/// merkle path from the leaf to the root.
#[derive(
    Wrapper, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug, From
)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct ControlBlock(Vec<u8>);

impl Display for ControlBlock {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(&self.0.to_hex()) }
}

impl ControlBlock {
    /// Leaf version.
    pub fn leaf_version(&self) -> u8 { self.0.first().copied().unwrap_or_default() & 0xfe }

    /// Parity of the output key.
    pub fn output_key_parity(&self) -> Parity {
        match self.0.first().copied().unwrap_or_default() & 1 {
            0 => Parity::Even,
            _ => Parity::Odd,
        }
    }

    /// Merkle path: sibling hashes from the leaf to the root.
    pub fn merkle_path(&self) -> Vec<TapNodeHash> {
        self.0
            .get(33..)
            .unwrap_or_default()
            .chunks_exact(32)
            .map(|chunk| {
                let mut hash = [0u8; 32];
                hash.copy_from_slice(chunk);
                TapNodeHash(hash)
            })
            .collect()
    }

    /// Depth of the leaf within the tree.
    pub fn depth(&self) -> usize { self.0.len().saturating_sub(33) / 32 }
}

/// Leaf script together with its control block.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ControlEntry {
    /// Leaf script
    pub leaf: LeafScript,
    /// Control block for the leaf
    pub control_block: ControlBlock,
}

/// Taproot output constructed from the internal key and (optional) script
/// tree.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TaprootOutput {
    /// Internal key
    pub internal_key: XOnlyPublicKey,
    /// Tweaked output key; equals to the internal key for key-only outputs
    pub output_key: XOnlyPublicKey,
    /// Parity of the output key (even for key-only outputs)
    pub parity: Parity,
    /// Tweak applied to the internal key; all zeros for key-only outputs
    pub tweak: [u8; 32],
    /// Merkle root of the script tree
    pub merkle_root: Option<TapNodeHash>,
    /// Control blocks for each of the leaves, in DFS order
    pub controls: Vec<ControlEntry>,
}

impl TaprootOutput {
    /// Constructs output without script tree. The output commits directly to
    /// the internal key and no tweak is applied.
    pub fn key_only(internal_key: XOnlyPublicKey) -> TaprootOutput {
        TaprootOutput {
            internal_key,
            output_key: internal_key,
            parity: Parity::Even,
            tweak: [0u8; 32],
            merkle_root: None,
            controls: vec![],
        }
    }

    /// Constructs output committing to the script tree.
    pub fn with_tree<L: Leaf>(
        internal_key: XOnlyPublicKey,
        tree: &TreeNode<L>,
    ) -> Result<TaprootOutput, TaprootError> {
        if tree.subtree_depth() > TAPROOT_MAX_DEPTH {
            return Err(TaprootError::MaxDepthExceeded);
        }
        let (paths, root) = merkle_paths(tree)?;

        let mut data = Vec::with_capacity(64);
        data.extend(internal_key.serialize());
        data.extend(root.as_inner());
        let tweak = HashTag::TapTweak.hash(&data);
        let scalar = Scalar::from_be_bytes(tweak).map_err(|_| TaprootError::TweakFailure)?;
        let (output_key, parity) = internal_key
            .add_tweak(SECP256K1, &scalar)
            .map_err(|_| TaprootError::TweakFailure)?;
        let parity_bit = match parity {
            Parity::Even => 0u8,
            Parity::Odd => 1u8,
        };

        let controls = paths
            .into_iter()
            .map(|(leaf, path)| {
                let mut control_block = Vec::with_capacity(33 + path.len());
                control_block.push(leaf.version | parity_bit);
                control_block.extend(internal_key.serialize());
                control_block.extend(path);
                ControlEntry {
                    leaf,
                    control_block: ControlBlock(control_block),
                }
            })
            .collect::<Vec<_>>();

        debug!(
            leaves = controls.len(),
            depth = tree.subtree_depth(),
            merkle_root = %root,
            output_key = %output_key,
            "constructed taproot output"
        );

        Ok(TaprootOutput {
            internal_key,
            output_key,
            parity,
            tweak,
            merkle_root: Some(root),
            controls,
        })
    }

    /// Constructs `scriptPubkey` (`OP_1 <x-only output key>`).
    pub fn script_pubkey(&self) -> LockScript {
        let mut bytes = Vec::with_capacity(34);
        bytes.push(OP_1.to_u8());
        bytes.push(32);
        bytes.extend(self.output_key.serialize());
        LockScript::from(bytes)
    }

    /// Returns control block for the first leaf with the given script.
    pub fn control_block(&self, script: &LockScript) -> Option<&ControlBlock> {
        self.controls
            .iter()
            .find(|entry| &entry.leaf.script == script)
            .map(|entry| &entry.control_block)
    }
}

type MerklePaths = (Vec<(LeafScript, Vec<u8>)>, TapNodeHash);

fn merkle_paths<L: Leaf>(node: &TreeNode<L>) -> Result<MerklePaths, TaprootError> {
    match node {
        TreeNode::Leaf(leaf) => {
            let version = leaf.leaf_version();
            if version & 1 == 1 || version == 0xff {
                return Err(TaprootError::InvalidLeafVersion(version));
            }
            let leaf = LeafScript {
                version,
                script: leaf.leaf_script().clone(),
            };
            let hash = leaf.leaf_hash();
            Ok((vec![(leaf, vec![])], hash))
        }
        TreeNode::Branch(branch) => {
            let (mut first, first_hash) = merkle_paths(&branch.first)?;
            let (last, last_hash) = merkle_paths(&branch.last)?;
            for (_, path) in &mut first {
                path.extend(last_hash.as_inner());
            }
            first.extend(last.into_iter().map(|(leaf, mut path)| {
                path.extend(first_hash.as_inner());
                (leaf, path)
            }));
            Ok((first, branch_hash(first_hash, last_hash)))
        }
    }
}
