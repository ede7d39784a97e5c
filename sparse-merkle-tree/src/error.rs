use thiserror::Error;

use crate::Digest;

/// Alias for `core::result::Result<T, Error>`.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors from sparse Merkle tree operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Tree depth outside `[1, 32]`.
    #[error("depth must be between 1 and 32, got {0}")]
    InvalidDepth(u32),
    /// Replaying the persisted leaves did not reproduce the persisted root.
    #[error(
        "root mismatch: stored root {} but persisted leaves reconstruct {}",
        hex::encode(.stored),
        hex::encode(.computed)
    )]
    RootMismatch {
        /// Root found in the metadata record.
        stored: Digest,
        /// Root recomputed from the leaf records.
        computed: Digest,
    },
    /// External leaf index not below `2^depth`.
    #[error("leaf index {index} out of range for a tree of {capacity} leaves")]
    IndexOutOfRange {
        /// Offending leaf index.
        index: u64,
        /// Number of leaf slots, `2^depth`.
        capacity: u64,
    },
    /// Node index past the last leaf of the tree.
    #[error("node index {index} out of range, last node is {max}")]
    NodeIndexOutOfRange {
        /// Offending node index.
        index: u64,
        /// Index of the last leaf node.
        max: u64,
    },
    /// A persisted record could not be decoded.
    #[error("corrupted data: {0}")]
    CorruptedData(String),
    /// A leaf record reached the store but its metadata record did not. The
    /// handle refuses further writes; reopening the tree validates the store.
    #[error("tree {0} must be reopened after a failed metadata write")]
    RestoreRequired(String),
    /// The underlying store failed.
    #[cfg(feature = "storage")]
    #[error("storage error: {0}")]
    StorageError(#[from] sparse_merkle_storage::Error),
}
