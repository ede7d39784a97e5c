use std::{cell::Cell, rc::Rc};

use assert_matches::assert_matches;
use rand::{Rng, SeedableRng, rngs::StdRng};
use sparse_merkle_storage::{
    Storage, StorageContext,
    rocksdb_storage::{PrefixedRocksDbStorageContext, RocksDbStorage, test_utils::TempStorage},
};

use super::*;
use crate::EMPTY_LEAF_PAYLOAD;

type Tree<'db> = PersistentTree<PrefixedRocksDbStorageContext<'db>>;

fn open<'db>(storage: &'db RocksDbStorage, name: &str, depth: u8) -> Tree<'db> {
    Tree::open(storage, name, depth)
        .unwrap()
        .expect("should open tree")
}

fn payload(byte: u8) -> [u8; LEAF_PAYLOAD_SIZE] {
    [byte; LEAF_PAYLOAD_SIZE]
}

fn random_payload(rng: &mut StdRng) -> [u8; LEAF_PAYLOAD_SIZE] {
    let mut payload = [0u8; LEAF_PAYLOAD_SIZE];
    rng.fill(&mut payload[..]);
    payload
}

fn empty_root(depth: u8) -> Digest {
    let mut digest = Blake3TreeHasher::hash_leaf(&[0u8; LEAF_PAYLOAD_SIZE]);
    for _ in 0..depth {
        digest = Blake3TreeHasher::compress(&digest, &digest);
    }
    digest
}

/// Recompute the root from a leaf digest and its hash path.
fn root_from_path(tree: &Tree, index: u64, leaf: Digest) -> Digest {
    let path = tree.hash_path(index).expect("hash path");
    assert_eq!(path.len(), tree.depth() as usize);
    let mut node = tree.element_tree_index(index).expect("leaf index");
    let mut digest = leaf;
    for (left, right) in path {
        let expected = if node % 2 == 1 { left } else { right };
        assert_eq!(digest, expected);
        digest = Blake3TreeHasher::compress(&left, &right);
        node = (node - 1) / 2;
    }
    digest
}

// ── create ───────────────────────────────────────────────────────────

#[test]
fn test_fresh_tree_has_empty_root() {
    let storage = TempStorage::new();
    for depth in [1u8, 2, 16, 32] {
        let tree = open(&storage, &format!("tree{depth}"), depth);
        assert_eq!(tree.depth(), depth);
        assert_eq!(tree.capacity(), 1 << depth);
        assert_eq!(tree.root_hash(), empty_root(depth));
    }
}

#[test]
fn test_fresh_tree_persists_metadata() {
    let storage = TempStorage::new();
    let tree = open(&storage, "tree", 10);

    let meta = storage.get_storage_context(std::iter::empty());
    let record = meta
        .get_meta(b"tree")
        .unwrap()
        .expect("storage should not fail")
        .expect("metadata record should exist");
    assert_eq!(record.len(), 40);
    assert_eq!(&record[..32], &tree.root_hash());
    assert_eq!(&record[32..36], &10u32.to_le_bytes());
    assert_eq!(&record[36..], &[0u8; 4]);
}

#[test]
fn test_invalid_depth_is_rejected_before_touching_storage() {
    let storage = TempStorage::new();
    assert_matches!(
        Tree::open(&*storage, "tree", 0).unwrap(),
        Err(Error::InvalidDepth(0))
    );
    assert_matches!(
        Tree::open(&*storage, "tree", 33).unwrap(),
        Err(Error::InvalidDepth(33))
    );

    let meta = storage.get_storage_context(std::iter::empty());
    assert_eq!(
        meta.get_meta(b"tree").unwrap().expect("storage should not fail"),
        None
    );
}

// ── update ───────────────────────────────────────────────────────────

#[test]
fn test_depth_2_scenario() {
    let storage = TempStorage::new();
    let mut tree = open(&storage, "tree", 2);

    let e = Blake3TreeHasher::hash_leaf(&EMPTY_LEAF_PAYLOAD);
    let ee = Blake3TreeHasher::compress(&e, &e);
    assert_eq!(tree.root_hash(), Blake3TreeHasher::compress(&ee, &ee));

    let v0 = payload(0x42);
    let h0 = Blake3TreeHasher::hash_leaf(&v0);
    let root = tree
        .update_element(0, &v0)
        .unwrap()
        .expect("update should succeed");

    let left = Blake3TreeHasher::compress(&h0, &e);
    assert_eq!(root, Blake3TreeHasher::compress(&left, &ee));
    assert_eq!(tree.root_hash(), root);
    assert_eq!(
        tree.hash_path(0).expect("hash path"),
        vec![(h0, e), (left, ee)]
    );
    assert_eq!(root_from_path(&tree, 0, h0), root);
}

#[test]
fn test_update_persists_leaf_and_metadata_records() {
    let storage = TempStorage::new();
    let mut tree = open(&storage, "tree", 8);
    let value = payload(7);
    let root = tree
        .update_element(5, &value)
        .unwrap()
        .expect("update should succeed");

    let leaves = storage.get_storage_context([b"tree".as_ref()]);
    let stored = leaves
        .get(b"5")
        .unwrap()
        .expect("storage should not fail")
        .expect("leaf record should exist");
    assert_eq!(stored, hex::encode(Blake3TreeHasher::hash_leaf(&value)).into_bytes());

    let meta = storage.get_storage_context(std::iter::empty());
    let record = meta
        .get_meta(b"tree")
        .unwrap()
        .expect("storage should not fail")
        .expect("metadata record should exist");
    assert_eq!(&record[..32], &root);
    assert_eq!(&record[32..36], &8u32.to_le_bytes());
    assert_eq!(&record[36..], &[0u8; 4]);
}

#[test]
fn test_paths_reconstruct_root_for_random_leaves() {
    let storage = TempStorage::new();
    let mut tree = open(&storage, "tree", 16);
    let mut rng = StdRng::seed_from_u64(1);

    let mut written = Vec::new();
    for _ in 0..64 {
        let index = rng.random_range(0..tree.capacity());
        let value = random_payload(&mut rng);
        tree.update_element(index, &value)
            .unwrap()
            .expect("update should succeed");
        written.push(index);

        // Immediately after the write, its own path reproduces the root.
        let digest = Blake3TreeHasher::hash_leaf(&value);
        assert_eq!(root_from_path(&tree, index, digest), tree.root_hash());
    }

    for index in written {
        let digest = tree.element_hash(index).expect("element hash");
        assert_eq!(root_from_path(&tree, index, digest), tree.root_hash());
    }
}

#[test]
fn test_update_is_idempotent() {
    let storage = TempStorage::new();
    let mut tree = open(&storage, "tree", 12);
    let value = payload(3);

    let once = tree
        .update_element(100, &value)
        .unwrap()
        .expect("update should succeed");
    let twice = tree
        .update_element(100, &value)
        .unwrap()
        .expect("update should succeed");
    assert_eq!(once, twice);
}

#[test]
fn test_update_order_does_not_matter() {
    let storage = TempStorage::new();
    let mut first = open(&storage, "first", 12);
    let mut second = open(&storage, "second", 12);

    first.update_element(1, &payload(1)).unwrap().expect("update");
    first.update_element(4000, &payload(2)).unwrap().expect("update");
    second.update_element(4000, &payload(2)).unwrap().expect("update");
    second.update_element(1, &payload(1)).unwrap().expect("update");

    assert_eq!(first.root_hash(), second.root_hash());
}

#[test]
fn test_zero_payload_restores_empty_leaf() {
    let storage = TempStorage::new();
    let mut tree = open(&storage, "tree", 4);
    let empty = tree.root_hash();

    tree.update_element(9, &payload(1)).unwrap().expect("update");
    assert_ne!(tree.root_hash(), empty);

    let root = tree
        .update_element(9, &EMPTY_LEAF_PAYLOAD)
        .unwrap()
        .expect("update");
    assert_eq!(root, empty);
    assert_eq!(
        tree.element_hash(9).expect("element hash"),
        Blake3TreeHasher::hash_leaf(&EMPTY_LEAF_PAYLOAD)
    );
}

#[test]
fn test_out_of_range_index_is_rejected_without_writing() {
    let storage = TempStorage::new();
    let mut tree = open(&storage, "tree", 3);
    let root = tree.root_hash();

    let ctx = tree.update_element(8, &payload(1));
    assert!(ctx.cost.is_nothing());
    assert_matches!(
        ctx.value,
        Err(Error::IndexOutOfRange {
            index: 8,
            capacity: 8
        })
    );
    assert_matches!(tree.hash_path(8), Err(Error::IndexOutOfRange { .. }));
    assert_matches!(tree.element_hash(u64::MAX), Err(Error::IndexOutOfRange { .. }));
    assert_eq!(tree.root_hash(), root);

    let leaves = storage.get_storage_context([b"tree".as_ref()]);
    assert_eq!(
        leaves.get(b"8").unwrap().expect("storage should not fail"),
        None
    );
}

#[test]
fn test_update_cost() {
    let storage = TempStorage::new();
    let mut tree = open(&storage, "tree", 20);
    let ctx = tree.update_element(1, &payload(1));
    // One leaf hash plus one compression per level.
    assert_eq!(ctx.cost.hash_node_calls, 21);
    // Leaf record and metadata record.
    assert_eq!(ctx.cost.seek_count, 2);
    // (32 prefix + 1 key + 64 hex) + (32 prefix + 4 name + 40 record)
    assert_eq!(ctx.cost.storage_written_bytes, 97 + 76);
    ctx.value.expect("update should succeed");
}

#[test]
fn test_trees_with_different_names_are_independent() {
    let storage = TempStorage::new();
    let mut a = open(&storage, "a", 8);
    let b = open(&storage, "b", 8);
    a.update_element(0, &payload(1)).unwrap().expect("update");
    assert_ne!(a.root_hash(), b.root_hash());
    assert_eq!(b.root_hash(), empty_root(8));
}

// ── failed writes ────────────────────────────────────────────────────

#[derive(Default)]
struct Faults {
    put: Cell<bool>,
    put_meta: Cell<bool>,
}

/// RocksDB context whose writes can be made to fail on demand.
struct FaultyContext<'db> {
    inner: PrefixedRocksDbStorageContext<'db>,
    faults: Rc<Faults>,
}

fn write_failure() -> CostResult<(), sparse_merkle_storage::Error> {
    Err(sparse_merkle_storage::Error::ColumnFamilyMissing("unavailable"))
        .wrap_with_cost(OperationCost::default())
}

impl<'db> StorageContext<'db> for FaultyContext<'db> {
    type RawIterator = <PrefixedRocksDbStorageContext<'db> as StorageContext<'db>>::RawIterator;

    fn put<K: AsRef<[u8]>>(
        &self,
        key: K,
        value: &[u8],
    ) -> CostResult<(), sparse_merkle_storage::Error> {
        if self.faults.put.get() {
            return write_failure();
        }
        self.inner.put(key, value)
    }

    fn put_meta<K: AsRef<[u8]>>(
        &self,
        key: K,
        value: &[u8],
    ) -> CostResult<(), sparse_merkle_storage::Error> {
        if self.faults.put_meta.get() {
            return write_failure();
        }
        self.inner.put_meta(key, value)
    }

    fn delete<K: AsRef<[u8]>>(&self, key: K) -> CostResult<(), sparse_merkle_storage::Error> {
        self.inner.delete(key)
    }

    fn get<K: AsRef<[u8]>>(
        &self,
        key: K,
    ) -> CostResult<Option<Vec<u8>>, sparse_merkle_storage::Error> {
        self.inner.get(key)
    }

    fn get_meta<K: AsRef<[u8]>>(
        &self,
        key: K,
    ) -> CostResult<Option<Vec<u8>>, sparse_merkle_storage::Error> {
        self.inner.get_meta(key)
    }

    fn raw_iter(&self) -> Self::RawIterator {
        self.inner.raw_iter()
    }
}

type FaultyTree<'db> = PersistentTree<FaultyContext<'db>>;

fn open_faulty<'db>(
    storage: &'db RocksDbStorage,
    name: &str,
    faults: &Rc<Faults>,
) -> FaultyTree<'db> {
    let meta = FaultyContext {
        inner: storage.get_storage_context(std::iter::empty()),
        faults: Rc::clone(faults),
    };
    let leaves = FaultyContext {
        inner: storage.get_storage_context([name.as_bytes()]),
        faults: Rc::clone(faults),
    };
    FaultyTree::open_with_contexts(meta, leaves, name, 4)
        .unwrap()
        .expect("should open tree")
}

#[test]
fn test_failed_leaf_write_keeps_persisted_root() {
    let storage = TempStorage::new();
    let faults = Rc::new(Faults::default());
    let empty_leaf = Blake3TreeHasher::hash_leaf(&EMPTY_LEAF_PAYLOAD);

    let root = {
        let mut tree = open_faulty(&storage, "tree", &faults);
        let before = tree
            .update_element(2, &payload(1))
            .unwrap()
            .expect("update should succeed");

        faults.put.set(true);
        assert_matches!(
            tree.update_element(5, &payload(2)).unwrap(),
            Err(Error::StorageError(_))
        );
        assert_eq!(tree.root_hash(), before);
        assert_eq!(tree.element_hash(5).expect("element hash"), empty_leaf);

        // Nothing reached the store, so the handle stays writable.
        faults.put.set(false);
        tree.update_element(6, &payload(3))
            .unwrap()
            .expect("update should succeed")
    };

    let storage = storage.reopen();
    let tree = open(&storage, "tree", 4);
    assert_eq!(tree.root_hash(), root);
    assert_eq!(tree.element_hash(5).expect("element hash"), empty_leaf);
}

#[test]
fn test_failed_metadata_write_requires_restore() {
    let storage = TempStorage::new();
    let faults = Rc::new(Faults::default());

    {
        let mut tree = open_faulty(&storage, "tree", &faults);
        let before = tree
            .update_element(2, &payload(1))
            .unwrap()
            .expect("update should succeed");

        faults.put_meta.set(true);
        assert_matches!(
            tree.update_element(5, &payload(2)).unwrap(),
            Err(Error::StorageError(_))
        );
        assert_eq!(tree.root_hash(), before);

        faults.put_meta.set(false);
        let ctx = tree.update_element(6, &payload(3));
        assert!(ctx.cost.is_nothing());
        assert_matches!(ctx.value, Err(Error::RestoreRequired(name)) if name == "tree");
        assert_eq!(tree.root_hash(), before);
    }

    // The orphaned leaf record is caught when the tree is reopened.
    let storage = storage.reopen();
    assert_matches!(
        Tree::open(&*storage, "tree", 4).unwrap(),
        Err(Error::RootMismatch { .. })
    );
}

// ── restore ──────────────────────────────────────────────────────────

#[test]
fn test_restore_reproduces_root_and_paths() {
    let storage = TempStorage::new();
    let mut rng = StdRng::seed_from_u64(42);
    let (root, paths) = {
        let mut tree = open(&storage, "tree", 24);
        let mut indices = Vec::new();
        for _ in 0..50 {
            let index = rng.random_range(0..tree.capacity());
            tree.update_element(index, &random_payload(&mut rng))
                .unwrap()
                .expect("update should succeed");
            indices.push(index);
        }
        let paths: Vec<_> = indices
            .into_iter()
            .map(|i| (i, tree.hash_path(i).expect("hash path")))
            .collect();
        (tree.root_hash(), paths)
    };

    let storage = storage.reopen();
    let ctx = Tree::open(&*storage, "tree", 24);
    // Restoring replays leaves, so it hashes and reads.
    assert!(ctx.cost.hash_node_calls > 0);
    assert!(ctx.cost.seek_count > 0);
    let tree = ctx.value.expect("restore should succeed");

    assert_eq!(tree.root_hash(), root);
    for (index, path) in paths {
        assert_eq!(tree.hash_path(index).expect("hash path"), path);
    }
}

#[test]
fn test_restore_uses_stored_depth() {
    let storage = TempStorage::new();
    let root = {
        let mut tree = open(&storage, "tree", 6);
        tree.update_element(63, &payload(5))
            .unwrap()
            .expect("update should succeed")
    };

    let tree = open(&storage, "tree", 20);
    assert_eq!(tree.depth(), 6);
    assert_eq!(tree.root_hash(), root);
}

#[test]
fn test_restore_of_untouched_tree() {
    let storage = TempStorage::new();
    drop(open(&storage, "tree", 9));
    let storage = storage.reopen();
    let tree = open(&storage, "tree", 9);
    assert_eq!(tree.root_hash(), empty_root(9));
}

#[test]
fn test_deleted_leaf_record_is_detected() {
    let storage = TempStorage::new();
    {
        let mut tree = open(&storage, "tree", 10);
        tree.update_element(3, &payload(1)).unwrap().expect("update");
        tree.update_element(700, &payload(2)).unwrap().expect("update");
    }

    let leaves = storage.get_storage_context([b"tree".as_ref()]);
    leaves
        .delete(b"3")
        .unwrap()
        .expect("delete should succeed");

    assert_matches!(
        Tree::open(&*storage, "tree", 10).unwrap(),
        Err(Error::RootMismatch { .. })
    );
}

#[test]
fn test_altered_leaf_record_is_detected() {
    let storage = TempStorage::new();
    let stored_root = {
        let mut tree = open(&storage, "tree", 10);
        tree.update_element(3, &payload(1))
            .unwrap()
            .expect("update should succeed")
    };

    let forged = hex::encode(Blake3TreeHasher::hash_leaf(&payload(9)));
    let leaves = storage.get_storage_context([b"tree".as_ref()]);
    leaves
        .put(b"3", forged.as_bytes())
        .unwrap()
        .expect("put should succeed");

    let result = Tree::open(&*storage, "tree", 10).unwrap();
    assert_matches!(result, Err(Error::RootMismatch { stored, computed }) => {
        assert_eq!(stored, stored_root);
        assert_ne!(computed, stored_root);
    });
}

#[test]
fn test_leaf_written_without_metadata_is_detected() {
    // A crash between the leaf write and the metadata write leaves a leaf
    // record the stored root does not account for.
    let storage = TempStorage::new();
    drop(open(&storage, "tree", 10));

    let digest = hex::encode(Blake3TreeHasher::hash_leaf(&payload(1)));
    let leaves = storage.get_storage_context([b"tree".as_ref()]);
    leaves
        .put(b"11", digest.as_bytes())
        .unwrap()
        .expect("put should succeed");

    let storage = storage.reopen();
    assert_matches!(
        Tree::open(&*storage, "tree", 10).unwrap(),
        Err(Error::RootMismatch { .. })
    );
}

#[test]
fn test_malformed_records_are_reported_as_corruption() {
    let storage = TempStorage::new();
    drop(open(&storage, "tree", 4));
    let leaves = storage.get_storage_context([b"tree".as_ref()]);
    leaves
        .put(b"2", b"not hex")
        .unwrap()
        .expect("put should succeed");
    assert_matches!(
        Tree::open(&*storage, "tree", 4).unwrap(),
        Err(Error::CorruptedData(_))
    );

    let meta = storage.get_storage_context(std::iter::empty());
    meta.put_meta(b"other", &[0u8; 12])
        .unwrap()
        .expect("put should succeed");
    assert_matches!(
        Tree::open(&*storage, "other", 4).unwrap(),
        Err(Error::CorruptedData(_))
    );
}

#[test]
fn test_root_mismatch_message_shows_both_roots() {
    let error = Error::RootMismatch {
        stored: [0xaa; 32],
        computed: [0xbb; 32],
    };
    let message = error.to_string();
    assert!(message.contains(&"aa".repeat(32)));
    assert!(message.contains(&"bb".repeat(32)));
}
