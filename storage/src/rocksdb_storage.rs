//! Storage implemented over a RocksDB backend.
mod storage;
mod storage_context;
pub mod test_utils;

pub use storage_context::{PrefixedRocksDbRawIterator, PrefixedRocksDbStorageContext};

pub use self::storage::RocksDbStorage;
