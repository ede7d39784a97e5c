//! Fixed-depth sparse Merkle tree.
//!
//! A complete binary tree of depth `D` (1 to 32) with `2^D` leaf slots.
//! Only nodes on paths from written leaves to the root are held; every other
//! node resolves to a precomputed empty-subtree digest for its depth.
//!
//! - [`SparseTree`] is the in-memory engine: `get`, `set` with O(D) ancestor
//!   recomputation, and hash paths.
//! - [`PersistentTree`] (requires the `storage` feature) binds an engine to a
//!   name in a [`sparse_merkle_storage::Storage`], persists every leaf write
//!   together with a root/depth metadata record, and on open verifies that
//!   the persisted leaves reproduce the persisted root.
//!
//! Producing hash paths is in scope; verifying them is left to the caller.

#![warn(missing_docs)]

mod error;
pub(crate) mod hash;
#[cfg(feature = "storage")]
mod persistent;
mod sparse;


pub use error::{Error, Result};
pub use hash::{
    Blake3TreeHasher, Digest, EMPTY_LEAF_PAYLOAD, LEAF_PAYLOAD_SIZE, MAX_DEPTH, TreeHasher,
};
#[cfg(feature = "storage")]
pub use persistent::PersistentTree;
pub use sparse::{HashPath, SparseTree, node_depth};
pub use sparse_merkle_costs::{CostResult, CostsExt, OperationCost};
