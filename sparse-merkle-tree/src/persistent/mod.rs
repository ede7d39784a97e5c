//! Sparse tree bound to a name in durable storage.
//!
//! Every leaf write is persisted as a leaf record and followed by a metadata
//! record holding the new root. Opening an existing tree replays all leaf
//! records and refuses to continue unless the replayed root equals the
//! stored one.

mod record;
#[cfg(test)]
mod tests;

use std::fmt;

use sparse_merkle_costs::{
    CostResult, CostsExt, OperationCost, cost_return_on_error, cost_return_on_error_no_add,
};
use sparse_merkle_storage::{RawIterator, Storage, StorageContext};
use tracing::{debug, error, info, trace};

use self::record::{LeafRecord, MetadataRecord};
use crate::{
    Digest, Error, HashPath, LEAF_PAYLOAD_SIZE, SparseTree,
    hash::{Blake3TreeHasher, TreeHasher, validate_depth},
};

/// A named sparse Merkle tree persisted through a [`StorageContext`].
///
/// Single writer: one handle per tree name, and every call completes its
/// storage round trips before the next one starts.
pub struct PersistentTree<C, H = Blake3TreeHasher> {
    name: String,
    tree: SparseTree<H>,
    meta_storage: C,
    leaf_storage: C,
    /// Set when a leaf record was stored but its metadata record was not.
    needs_restore: bool,
}

impl<C, H: TreeHasher> fmt::Debug for PersistentTree<C, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentTree")
            .field("name", &self.name)
            .field("depth", &self.tree.depth())
            .field("root", &hex::encode(self.tree.root_hash()))
            .field("needs_restore", &self.needs_restore)
            .finish()
    }
}

impl<'db, C, H> PersistentTree<C, H>
where
    C: StorageContext<'db>,
    H: TreeHasher,
{
    /// Create or restore the tree called `name`.
    ///
    /// The metadata record lives in the metadata namespace of the root
    /// context and leaf records in the data namespace of the context at path
    /// `[name]`.
    pub fn open<S>(storage: &'db S, name: &str, depth: u8) -> CostResult<Self, Error>
    where
        S: Storage<'db, StorageContext = C>,
    {
        let meta_storage = storage.get_storage_context(std::iter::empty());
        let leaf_storage = storage.get_storage_context([name.as_bytes()]);
        Self::open_with_contexts(meta_storage, leaf_storage, name, depth)
    }

    /// Create or restore the tree called `name` on explicit contexts.
    ///
    /// If no metadata record exists a fresh tree of `depth` is created and its
    /// empty root persisted. Otherwise the stored depth wins over `depth`, all
    /// leaf records are replayed, and the replayed root must equal the stored
    /// root or [`Error::RootMismatch`] is returned.
    pub fn open_with_contexts(
        meta_storage: C,
        leaf_storage: C,
        name: &str,
        depth: u8,
    ) -> CostResult<Self, Error> {
        let mut cost = OperationCost::default();

        cost_return_on_error_no_add!(&cost, validate_depth(depth.into()));

        let stored = cost_return_on_error!(&mut cost, meta_storage.get_meta(name.as_bytes()));

        let tree = match stored {
            None => {
                let tree = cost_return_on_error_no_add!(&cost, SparseTree::<H>::new(depth));
                let record = MetadataRecord {
                    root: tree.root_hash(),
                    depth,
                };
                cost_return_on_error!(
                    &mut cost,
                    meta_storage.put_meta(name.as_bytes(), &record.encode())
                );
                debug!(tree = name, depth, "created sparse merkle tree");
                tree
            }
            Some(bytes) => {
                let record = cost_return_on_error_no_add!(&cost, MetadataRecord::decode(&bytes));
                if record.depth != depth {
                    debug!(
                        tree = name,
                        requested = depth,
                        stored = record.depth,
                        "using stored depth"
                    );
                }
                let (tree, leaves) =
                    cost_return_on_error!(&mut cost, Self::replay_leaves(&leaf_storage, record.depth));

                let computed = tree.root_hash();
                if computed != record.root {
                    error!(
                        tree = name,
                        stored = %hex::encode(record.root),
                        computed = %hex::encode(computed),
                        "persisted leaves do not reconstruct the stored root"
                    );
                    return Err(Error::RootMismatch {
                        stored: record.root,
                        computed,
                    })
                    .wrap_with_cost(cost);
                }
                info!(tree = name, depth = record.depth, leaves, "restored sparse merkle tree");
                tree
            }
        };

        Ok(Self {
            name: name.to_owned(),
            tree,
            meta_storage,
            leaf_storage,
            needs_restore: false,
        })
        .wrap_with_cost(cost)
    }

    /// Rebuild a tree of `depth` from every leaf record, in whatever order the
    /// store yields them. Returns the tree and the number of records replayed.
    fn replay_leaves(leaf_storage: &C, depth: u8) -> CostResult<(SparseTree<H>, u64), Error> {
        let mut cost = OperationCost::default();
        let mut tree = cost_return_on_error_no_add!(&cost, SparseTree::<H>::new(depth));
        let capacity = tree.leaf_count();
        let mut leaves = 0u64;

        let mut iter = leaf_storage.raw_iter();
        iter.seek_to_first().unwrap_add_cost(&mut cost);
        while iter.valid().unwrap_add_cost(&mut cost) {
            let key = iter.key().unwrap_add_cost(&mut cost).unwrap_or_default();
            let value = iter.value().unwrap_add_cost(&mut cost).unwrap_or_default();
            let record = cost_return_on_error_no_add!(&cost, LeafRecord::decode(key, value, capacity));

            let node_index = cost_return_on_error_no_add!(&cost, tree.leaf_node_index(record.index));
            cost_return_on_error!(&mut cost, tree.set(node_index, record.digest));
            leaves += 1;

            iter.next().unwrap_add_cost(&mut cost);
        }
        cost_return_on_error_no_add!(&cost, iter.status());

        Ok((tree, leaves)).wrap_with_cost(cost)
    }

    /// Name the tree is stored under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Depth of the tree.
    pub fn depth(&self) -> u8 {
        self.tree.depth()
    }

    /// Number of leaf slots, `2^depth`.
    pub fn capacity(&self) -> u64 {
        self.tree.leaf_count()
    }

    /// Node index of external leaf `index`.
    pub fn element_tree_index(&self, index: u64) -> Result<u64, Error> {
        self.tree.leaf_node_index(index)
    }

    /// Current root digest.
    pub fn root_hash(&self) -> Digest {
        self.tree.root_hash()
    }

    /// Current digest of leaf `index`; the empty-leaf digest if never set.
    pub fn element_hash(&self, index: u64) -> Result<Digest, Error> {
        self.tree.get(self.element_tree_index(index)?)
    }

    /// Hash path of leaf `index`, `depth` pairs ordered leaf to root.
    pub fn hash_path(&self, index: u64) -> Result<HashPath, Error> {
        self.tree.path(self.element_tree_index(index)?)
    }

    /// Set leaf `index` to `payload` and persist it, returning the new root.
    ///
    /// The leaf record is written before the metadata record. If the process
    /// dies in between, the next open fails with [`Error::RootMismatch`]
    /// instead of serving a root the leaves don't support.
    ///
    /// When a write fails the in-memory leaf is put back, so the handle keeps
    /// serving the last persisted root. If only the metadata write failed,
    /// the store already holds the new leaf and every later update returns
    /// [`Error::RestoreRequired`].
    pub fn update_element(
        &mut self,
        index: u64,
        payload: &[u8; LEAF_PAYLOAD_SIZE],
    ) -> CostResult<Digest, Error> {
        let mut cost = OperationCost::default();

        if self.needs_restore {
            return Err(Error::RestoreRequired(self.name.clone())).wrap_with_cost(cost);
        }

        let node_index = cost_return_on_error_no_add!(&cost, self.element_tree_index(index));
        let previous = cost_return_on_error_no_add!(&cost, self.tree.get(node_index));

        let digest = H::hash_leaf(payload);
        cost.hash_node_calls += 1;
        cost_return_on_error!(&mut cost, self.tree.set(node_index, digest));

        let leaf = LeafRecord { index, digest };
        if let Err(e) = self
            .leaf_storage
            .put(leaf.key(), leaf.value().as_bytes())
            .unwrap_add_cost(&mut cost)
        {
            self.roll_back(node_index, previous, &mut cost);
            return Err(e.into()).wrap_with_cost(cost);
        }

        let root = self.tree.root_hash();
        let metadata = MetadataRecord {
            root,
            depth: self.tree.depth(),
        };
        if let Err(e) = self
            .meta_storage
            .put_meta(self.name.as_bytes(), &metadata.encode())
            .unwrap_add_cost(&mut cost)
        {
            self.roll_back(node_index, previous, &mut cost);
            self.needs_restore = true;
            error!(
                tree = %self.name,
                index,
                error = %e,
                "leaf record stored without its metadata record, tree must be reopened"
            );
            return Err(e.into()).wrap_with_cost(cost);
        }

        trace!(tree = %self.name, index, root = %hex::encode(root), "updated element");
        Ok(root).wrap_with_cost(cost)
    }

    /// Put back the digest a failed update replaced.
    fn roll_back(&mut self, node_index: u64, previous: Digest, cost: &mut OperationCost) {
        // `node_index` was accepted by the forward `set`, so this only fails
        // if the engine itself is broken.
        if let Err(e) = self.tree.set(node_index, previous).unwrap_add_cost(cost) {
            error!(tree = %self.name, node_index, error = %e, "rollback failed");
        }
    }
}
