use std::{collections::HashMap, marker::PhantomData};

use sparse_merkle_costs::{CostResult, CostsExt, OperationCost};

use crate::{
    Digest, Error,
    hash::{Blake3TreeHasher, EMPTY_LEAF_PAYLOAD, TreeHasher, validate_depth},
};

/// Sibling pairs from the level of a node up to the level below the root.
///
/// Entry `i` holds `(left, right)`, the two children of the `i`-th ancestor
/// of the node, so `compress(left, right)` of the last entry is the root.
pub type HashPath = Vec<(Digest, Digest)>;

/// Depth of a node index in heap layout: `floor(log2(index + 1))`.
///
/// Defined for every `u64`; `u64::MAX` sits at depth 64.
pub fn node_depth(index: u64) -> u32 {
    match index.checked_add(1) {
        Some(position) => position.ilog2(),
        None => u64::BITS,
    }
}

/// A complete binary tree of fixed depth that only materializes the nodes on
/// paths from set leaves to the root.
///
/// Nodes are indexed level-order: root=0, left child=2i+1, right child=2i+2.
/// A node that was never written resolves to the empty-subtree digest of its
/// depth, so memory stays proportional to `set leaves * depth` even at depth
/// 32.
#[derive(Debug, Clone)]
pub struct SparseTree<H = Blake3TreeHasher> {
    depth: u8,
    nodes: HashMap<u64, Digest>,
    /// `empty_hashes[d]` is the digest of an all-empty subtree rooted at
    /// depth `d`; `empty_hashes[depth]` is the empty leaf.
    empty_hashes: Vec<Digest>,
    _hasher: PhantomData<fn() -> H>,
}

impl<H: TreeHasher> SparseTree<H> {
    /// Create an all-empty tree.
    ///
    /// Depth must be between 1 and 32 inclusive.
    pub fn new(depth: u8) -> Result<Self, Error> {
        let depth = validate_depth(depth.into())?;
        let levels = depth as usize;

        let mut empty_hashes = vec![H::hash_leaf(&EMPTY_LEAF_PAYLOAD); levels + 1];
        for level in (0..levels).rev() {
            let child = empty_hashes[level + 1];
            empty_hashes[level] = H::compress(&child, &child);
        }

        Ok(Self {
            depth,
            nodes: HashMap::new(),
            empty_hashes,
            _hasher: PhantomData,
        })
    }

    /// Depth of the tree; leaves live at this depth.
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Number of leaf slots, `2^depth`.
    pub fn leaf_count(&self) -> u64 {
        1u64 << self.depth
    }

    /// Index of the last (rightmost) leaf node, `2^(depth+1) - 2`.
    pub fn max_node_index(&self) -> u64 {
        (1u64 << (self.depth + 1)) - 2
    }

    /// Node index of the leaf numbered `leaf` from the left.
    pub fn leaf_node_index(&self, leaf: u64) -> Result<u64, Error> {
        if leaf >= self.leaf_count() {
            return Err(Error::IndexOutOfRange {
                index: leaf,
                capacity: self.leaf_count(),
            });
        }
        Ok(leaf + self.leaf_count() - 1)
    }

    /// Digest of an empty subtree rooted at `level`, if `level <= depth`.
    pub fn empty_hash(&self, level: u8) -> Option<Digest> {
        self.empty_hashes.get(level as usize).copied()
    }

    /// Number of nodes held explicitly.
    pub fn explicit_node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Digest at `index`.
    pub fn get(&self, index: u64) -> Result<Digest, Error> {
        self.check_node_index(index)?;
        Ok(self.node(index))
    }

    /// Digest at the root.
    pub fn root_hash(&self) -> Digest {
        self.node(0)
    }

    /// Store `digest` at `index` and recompute every ancestor up to the root.
    ///
    /// Costs one `hash_node_calls` per ancestor.
    pub fn set(&mut self, index: u64, digest: Digest) -> CostResult<(), Error> {
        if let Err(e) = self.check_node_index(index) {
            return Err(e).wrap_with_cost(OperationCost::default());
        }

        let mut hash_node_calls = 0;
        self.nodes.insert(index, digest);

        let mut child = index;
        while child > 0 {
            let parent = (child - 1) / 2;
            let (left, right) = self.children(parent);
            self.nodes.insert(parent, H::compress(&left, &right));
            hash_node_calls += 1;
            child = parent;
        }

        Ok(()).wrap_with_cost(OperationCost::with_hash_node_calls(hash_node_calls))
    }

    /// Child pairs along the ancestor chain of `index`, bottom-up.
    ///
    /// For a leaf the path has exactly `depth` entries.
    pub fn path(&self, index: u64) -> Result<HashPath, Error> {
        self.check_node_index(index)?;

        let mut path = Vec::with_capacity(node_depth(index) as usize);
        let mut child = index;
        while child > 0 {
            let parent = (child - 1) / 2;
            path.push(self.children(parent));
            child = parent;
        }
        Ok(path)
    }

    fn check_node_index(&self, index: u64) -> Result<(), Error> {
        let max = self.max_node_index();
        if index > max {
            return Err(Error::NodeIndexOutOfRange { index, max });
        }
        Ok(())
    }

    /// Caller guarantees `index <= max_node_index()`.
    fn node(&self, index: u64) -> Digest {
        match self.nodes.get(&index) {
            Some(digest) => *digest,
            None => self.empty_hashes[node_depth(index) as usize],
        }
    }

    fn children(&self, parent: u64) -> (Digest, Digest) {
        (self.node(2 * parent + 1), self.node(2 * parent + 2))
    }
}
