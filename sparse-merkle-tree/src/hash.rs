//! Node hashing.
//!
//! Domain separation for the default hasher:
//! - Leaves:         `blake3(0x00 || payload)`
//! - Internal nodes: `blake3(0x01 || left || right)`

use crate::Error;

/// Digest stored at every tree node.
pub type Digest = [u8; 32];

/// Size of a leaf payload in bytes.
pub const LEAF_PAYLOAD_SIZE: usize = 64;

/// Deepest supported tree (`2^32` leaves).
pub const MAX_DEPTH: u8 = 32;

/// Payload every unset leaf is treated as having.
pub const EMPTY_LEAF_PAYLOAD: [u8; LEAF_PAYLOAD_SIZE] = [0; LEAF_PAYLOAD_SIZE];

const LEAF_TAG: u8 = 0x00;
const INTERNAL_TAG: u8 = 0x01;

/// Hash function used to build a tree.
///
/// Any fixed-output hash works as long as both operations are deterministic.
pub trait TreeHasher {
    /// Digest of a leaf payload.
    fn hash_leaf(payload: &[u8; LEAF_PAYLOAD_SIZE]) -> Digest;

    /// Digest of an internal node from its children.
    fn compress(left: &Digest, right: &Digest) -> Digest;
}

/// Blake3 with leaf/internal domain tags.
#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3TreeHasher;

impl TreeHasher for Blake3TreeHasher {
    fn hash_leaf(payload: &[u8; LEAF_PAYLOAD_SIZE]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[LEAF_TAG]);
        hasher.update(payload);
        *hasher.finalize().as_bytes()
    }

    fn compress(left: &Digest, right: &Digest) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[INTERNAL_TAG]);
        hasher.update(left);
        hasher.update(right);
        *hasher.finalize().as_bytes()
    }
}

/// Validate that depth is in the allowed range [1, 32].
pub(crate) fn validate_depth(depth: u32) -> Result<u8, Error> {
    if !(1..=u32::from(MAX_DEPTH)).contains(&depth) {
        return Err(Error::InvalidDepth(depth));
    }
    Ok(depth as u8)
}
