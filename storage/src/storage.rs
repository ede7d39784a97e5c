// MIT LICENSE
//
// Copyright (c) 2021 Dash Core Group
//
// Permission is hereby granted, free of charge, to any
// person obtaining a copy of this software and associated
// documentation files (the "Software"), to deal in the
// Software without restriction, including without
// limitation the rights to use, copy, modify, merge,
// publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software
// is furnished to do so, subject to the following
// conditions:
//
// The above copyright notice and this permission notice
// shall be included in all copies or substantial portions
// of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF
// ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED
// TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A
// PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT
// SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY
// CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION
// OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR
// IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.


//! Storage traits

use sparse_merkle_costs::{CostContext, CostResult};

use crate::Error;

/// 32-byte prefix isolating the keys of one storage context.
pub type SubtreePrefix = [u8; 32];

/// Top-level storage abstraction.
/// Holds the storage connection and hands out [StorageContext]s, each of
/// which sees only the keys under its own prefix.
pub trait Storage<'db> {
    /// Storage context type
    type StorageContext: StorageContext<'db>;

    /// Make a context for the keyspace identified by `path`.
    fn get_storage_context<'p, P>(&'db self, path: P) -> Self::StorageContext
    where
        P: IntoIterator<Item = &'p [u8]>;

    /// Forces data to be written
    fn flush(&self) -> Result<(), Error>;
}

/// Storage context.
/// Two namespaces are available under the same prefix: data, which can be
/// iterated, and metadata, which is accessed by key only.
pub trait StorageContext<'db> {
    /// Storage raw iterator type (to iterate over data storage without
    /// supplying a key)
    type RawIterator: RawIterator;

    /// Put `value` into data storage with `key`
    fn put<K: AsRef<[u8]>>(&self, key: K, value: &[u8]) -> CostResult<(), Error>;

    /// Put `value` into metadata storage with `key`
    fn put_meta<K: AsRef<[u8]>>(&self, key: K, value: &[u8]) -> CostResult<(), Error>;

    /// Delete entry with `key` from data storage
    fn delete<K: AsRef<[u8]>>(&self, key: K) -> CostResult<(), Error>;

    /// Get entry by `key` from data storage
    fn get<K: AsRef<[u8]>>(&self, key: K) -> CostResult<Option<Vec<u8>>, Error>;

    /// Get entry by `key` from metadata storage
    fn get_meta<K: AsRef<[u8]>>(&self, key: K) -> CostResult<Option<Vec<u8>>, Error>;

    /// Get raw iterator over data storage
    fn raw_iter(&self) -> Self::RawIterator;
}

/// Allows to iterate over data records inside of a storage context.
///
/// Keys are yielded without the context prefix and iteration stops at the
/// prefix boundary.
pub trait RawIterator {
    /// Move iterator to first valid record.
    fn seek_to_first(&mut self) -> CostContext<()>;

    /// Move iterator forward until `key` is hit.
    fn seek<K: AsRef<[u8]>>(&mut self, key: K) -> CostContext<()>;

    /// Move iterator to next record.
    fn next(&mut self) -> CostContext<()>;

    /// Return value of key-value pair where raw iterator points at.
    fn value(&self) -> CostContext<Option<&[u8]>>;

    /// Return key of key-value pair where raw iterator points at.
    fn key(&self) -> CostContext<Option<&[u8]>>;

    /// Check if raw iterator points into a valid record
    fn valid(&self) -> CostContext<bool>;

    /// Surface an error the iterator stopped on, if any. An iterator that is
    /// no longer valid may have hit an I/O error rather than the end.
    fn status(&self) -> Result<(), Error>;
}
