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


//! Prefixed storage context implementation.

mod raw_iterator;

pub use raw_iterator::PrefixedRocksDbRawIterator;
use rocksdb::{ColumnFamily, DB};
use sparse_merkle_costs::{CostResult, CostsExt, OperationCost};

use super::storage::META_CF_NAME;
use crate::{Error, StorageContext, SubtreePrefix};

pub(crate) fn make_prefixed_key<K: AsRef<[u8]>>(prefix: &SubtreePrefix, key: K) -> Vec<u8> {
    let key = key.as_ref();
    let mut prefixed_key = Vec::with_capacity(prefix.len() + key.len());
    prefixed_key.extend_from_slice(prefix);
    prefixed_key.extend_from_slice(key);
    prefixed_key
}

/// Storage context with a prefix applied, writing straight to the database.
pub struct PrefixedRocksDbStorageContext<'db> {
    storage: &'db DB,
    prefix: SubtreePrefix,
}

impl<'db> PrefixedRocksDbStorageContext<'db> {
    /// Create a new prefixed storage context instance
    pub fn new(storage: &'db DB, prefix: SubtreePrefix) -> Self {
        PrefixedRocksDbStorageContext { storage, prefix }
    }

    /// Get metadata column family
    fn cf_meta(&self) -> Result<&'db ColumnFamily, Error> {
        self.storage
            .cf_handle(META_CF_NAME)
            .ok_or(Error::ColumnFamilyMissing(META_CF_NAME))
    }
}

fn read_cost(key_len: usize, value: &Option<Vec<u8>>) -> OperationCost {
    OperationCost {
        seek_count: 1,
        storage_loaded_bytes: value
            .as_ref()
            .map(|v| (key_len + v.len()) as u64)
            .unwrap_or_default(),
        ..Default::default()
    }
}

fn write_cost(key_len: usize, value_len: usize) -> OperationCost {
    OperationCost {
        seek_count: 1,
        storage_written_bytes: (key_len + value_len) as u64,
        ..Default::default()
    }
}

impl<'db> StorageContext<'db> for PrefixedRocksDbStorageContext<'db> {
    type RawIterator = PrefixedRocksDbRawIterator<'db>;

    fn put<K: AsRef<[u8]>>(&self, key: K, value: &[u8]) -> CostResult<(), Error> {
        let prefixed_key = make_prefixed_key(&self.prefix, key);
        let cost = write_cost(prefixed_key.len(), value.len());
        self.storage
            .put(prefixed_key, value)
            .map_err(Error::RocksDBError)
            .wrap_with_cost(cost)
    }

    fn put_meta<K: AsRef<[u8]>>(&self, key: K, value: &[u8]) -> CostResult<(), Error> {
        let prefixed_key = make_prefixed_key(&self.prefix, key);
        let cost = write_cost(prefixed_key.len(), value.len());
        self.cf_meta()
            .and_then(|cf| {
                self.storage
                    .put_cf(cf, prefixed_key, value)
                    .map_err(Error::RocksDBError)
            })
            .wrap_with_cost(cost)
    }

    fn delete<K: AsRef<[u8]>>(&self, key: K) -> CostResult<(), Error> {
        self.storage
            .delete(make_prefixed_key(&self.prefix, key))
            .map_err(Error::RocksDBError)
            .wrap_with_cost(OperationCost::with_seek_count(1))
    }

    fn get<K: AsRef<[u8]>>(&self, key: K) -> CostResult<Option<Vec<u8>>, Error> {
        let prefixed_key = make_prefixed_key(&self.prefix, key);
        let key_len = prefixed_key.len();
        self.storage
            .get(prefixed_key)
            .map_err(Error::RocksDBError)
            .wrap_fn_cost(|result| match result {
                Ok(value) => read_cost(key_len, value),
                Err(_) => OperationCost::with_seek_count(1),
            })
    }

    fn get_meta<K: AsRef<[u8]>>(&self, key: K) -> CostResult<Option<Vec<u8>>, Error> {
        let prefixed_key = make_prefixed_key(&self.prefix, key);
        let key_len = prefixed_key.len();
        self.cf_meta()
            .and_then(|cf| {
                self.storage
                    .get_cf(cf, prefixed_key)
                    .map_err(Error::RocksDBError)
            })
            .wrap_fn_cost(|result| match result {
                Ok(value) => read_cost(key_len, value),
                Err(_) => OperationCost::with_seek_count(1),
            })
    }

    fn raw_iter(&self) -> Self::RawIterator {
        PrefixedRocksDbRawIterator::new(self.prefix, self.storage.raw_iterator())
    }
}
