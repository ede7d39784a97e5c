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


//! Implementation for a storage abstraction over RocksDB.

use std::path::Path;

use lazy_static::lazy_static;
use rocksdb::{ColumnFamilyDescriptor, DB};

use super::PrefixedRocksDbStorageContext;
use crate::{Error, Storage, SubtreePrefix};

/// Name of column family used to store metadata
pub(super) const META_CF_NAME: &str = "meta";

lazy_static! {
    static ref DEFAULT_OPTS: rocksdb::Options = {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        opts.increase_parallelism(num_cpus::get() as i32);
        opts.create_missing_column_families(true);
        opts
    };
}

/// Storage which uses RocksDB as its backend.
pub struct RocksDbStorage {
    db: DB,
}

impl RocksDbStorage {
    /// Open (or create) a RocksDB database at `path` with default options.
    pub fn default_rocksdb_with_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let db = DB::open_cf_descriptors(
            &DEFAULT_OPTS,
            &path,
            [ColumnFamilyDescriptor::new(
                META_CF_NAME,
                DEFAULT_OPTS.clone(),
            )],
        )?;

        Ok(RocksDbStorage { db })
    }

    /// A helper method to build a prefix to rocksdb keys from a path of
    /// segments. Segment boundaries are part of the hashed input, so `[aa, b]`
    /// and `[a, ab]` produce different prefixes.
    pub fn build_prefix<'a, P>(path: P) -> SubtreePrefix
    where
        P: IntoIterator<Item = &'a [u8]>,
    {
        let mut segments_count: usize = 0;
        let mut res = Vec::new();
        let mut lengths = Vec::new();

        for s in path {
            segments_count += 1;
            res.extend_from_slice(s);
            lengths.extend(s.len().to_ne_bytes());
        }

        res.extend(segments_count.to_ne_bytes());
        res.extend(lengths);
        *blake3::hash(&res).as_bytes()
    }
}

impl<'db> Storage<'db> for RocksDbStorage {
    type StorageContext = PrefixedRocksDbStorageContext<'db>;

    fn get_storage_context<'p, P>(&'db self, path: P) -> Self::StorageContext
    where
        P: IntoIterator<Item = &'p [u8]>,
    {
        PrefixedRocksDbStorageContext::new(&self.db, Self::build_prefix(path))
    }

    fn flush(&self) -> Result<(), Error> {
        self.db.flush().map_err(Error::RocksDBError)
    }
}
