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


//! Prefixed raw iterator implementation for RocksDB backend.

use rocksdb::{DB, DBRawIteratorWithThreadMode};
use sparse_merkle_costs::{CostContext, CostsExt, OperationCost};

use super::make_prefixed_key;
use crate::{Error, RawIterator, SubtreePrefix};

/// 256 bytes for the key and 32 bytes for the prefix
const MAX_PREFIXED_KEY_LENGTH: u64 = 256 + 32;

/// Raw iterator over prefixed data storage.
pub struct PrefixedRocksDbRawIterator<'db> {
    prefix: SubtreePrefix,
    raw_iterator: DBRawIteratorWithThreadMode<'db, DB>,
}

impl<'db> PrefixedRocksDbRawIterator<'db> {
    /// Wrap a RocksDB raw iterator so that it only sees keys under `prefix`
    pub fn new(prefix: SubtreePrefix, raw_iterator: DBRawIteratorWithThreadMode<'db, DB>) -> Self {
        PrefixedRocksDbRawIterator {
            prefix,
            raw_iterator,
        }
    }
}

impl RawIterator for PrefixedRocksDbRawIterator<'_> {
    fn seek_to_first(&mut self) -> CostContext<()> {
        self.raw_iterator.seek(self.prefix);
        ().wrap_with_cost(OperationCost::with_seek_count(1))
    }

    fn seek<K: AsRef<[u8]>>(&mut self, key: K) -> CostContext<()> {
        self.raw_iterator
            .seek(make_prefixed_key(&self.prefix, key));
        ().wrap_with_cost(OperationCost::with_seek_count(1))
    }

    fn next(&mut self) -> CostContext<()> {
        self.raw_iterator.next();
        ().wrap_with_cost(OperationCost::with_seek_count(1))
    }

    fn value(&self) -> CostContext<Option<&[u8]>> {
        let mut cost = OperationCost::default();

        let value = if self.valid().unwrap_add_cost(&mut cost) {
            self.raw_iterator.value().inspect(|v| {
                cost.storage_loaded_bytes += v.len() as u64;
            })
        } else {
            None
        };

        value.wrap_with_cost(cost)
    }

    fn key(&self) -> CostContext<Option<&[u8]>> {
        let mut cost = OperationCost::default();

        let key = match self.raw_iterator.key() {
            Some(k) if k.starts_with(&self.prefix) => {
                cost.storage_loaded_bytes += k.len() as u64;
                Some(k.split_at(self.prefix.len()).1)
            }
            // Crossing into another prefix (or running off the end) is charged
            // a fixed amount so the cost does not depend on neighbouring data.
            _ => {
                cost.storage_loaded_bytes += MAX_PREFIXED_KEY_LENGTH;
                None
            }
        };

        key.wrap_with_cost(cost)
    }

    fn valid(&self) -> CostContext<bool> {
        let mut cost = OperationCost::default();

        let valid = match self.raw_iterator.key() {
            Some(k) if k.starts_with(&self.prefix) => {
                cost.storage_loaded_bytes += k.len() as u64;
                true
            }
            _ => {
                cost.storage_loaded_bytes += MAX_PREFIXED_KEY_LENGTH;
                false
            }
        };

        valid.wrap_with_cost(cost)
    }

    fn status(&self) -> Result<(), Error> {
        self.raw_iterator.status().map_err(Error::RocksDBError)
    }
}
