#![deny(missing_docs)]

//! Storage abstraction for persistent sparse Merkle trees.

mod error;
#[cfg(feature = "rocksdb_storage")]
pub mod rocksdb_storage;
mod storage;

pub use crate::{
    error::Error,
    storage::{RawIterator, Storage, StorageContext, SubtreePrefix},
};
