//! On-disk encodings.
//!
//! Metadata record (metadata namespace, key = tree name):
//! `root (32 bytes) || depth (u32, little-endian) || 4 zero bytes`.
//!
//! Leaf record (data namespace under the tree's prefix):
//! key = decimal leaf index, value = lowercase hex of the leaf digest.

use crate::{Digest, Error, hash::validate_depth};

/// Size of an encoded metadata record.
pub(crate) const METADATA_RECORD_SIZE: usize = 40;
const DEPTH_OFFSET: usize = 32;
const PADDING_OFFSET: usize = DEPTH_OFFSET + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MetadataRecord {
    pub root: Digest,
    pub depth: u8,
}

impl MetadataRecord {
    pub fn encode(&self) -> [u8; METADATA_RECORD_SIZE] {
        let mut bytes = [0u8; METADATA_RECORD_SIZE];
        bytes[..DEPTH_OFFSET].copy_from_slice(&self.root);
        let depth = u32::from(self.depth).to_le_bytes();
        bytes[DEPTH_OFFSET..PADDING_OFFSET].copy_from_slice(&depth);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != METADATA_RECORD_SIZE {
            return Err(Error::CorruptedData(format!(
                "metadata record must be {} bytes, got {}",
                METADATA_RECORD_SIZE,
                bytes.len()
            )));
        }
        if bytes[PADDING_OFFSET..].iter().any(|b| *b != 0) {
            return Err(Error::CorruptedData(
                "metadata record has non-zero padding".to_owned()
            ));
        }
        let mut root = [0u8; 32];
        root.copy_from_slice(&bytes[..DEPTH_OFFSET]);
        let mut depth = [0u8; 4];
        depth.copy_from_slice(&bytes[DEPTH_OFFSET..PADDING_OFFSET]);
        let depth = u32::from_le_bytes(depth);
        let depth = validate_depth(depth).map_err(|_| {
            Error::CorruptedData(format!("metadata record holds invalid depth {}", depth))
        })?;
        Ok(Self { root, depth })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LeafRecord {
    pub index: u64,
    pub digest: Digest,
}

impl LeafRecord {
    pub fn key(&self) -> String {
        self.index.to_string()
    }

    pub fn value(&self) -> String {
        hex::encode(self.digest)
    }

    /// Decode a stored leaf record of a tree with `capacity` leaves.
    pub fn decode(key: &[u8], value: &[u8], capacity: u64) -> Result<Self, Error> {
        let index = std::str::from_utf8(key)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            // Only the canonical decimal form is ever written.
            .filter(|index| index.to_string().as_bytes() == key)
            .ok_or_else(|| {
                Error::CorruptedData(format!(
                    "leaf record key {} is not a decimal index",
                    hex::encode(key)
                ))
            })?;
        if index >= capacity {
            return Err(Error::CorruptedData(format!(
                "leaf record index {} out of range for a tree of {} leaves",
                index, capacity
            )));
        }

        let mut digest = [0u8; 32];
        hex::decode_to_slice(value, &mut digest).map_err(|e| {
            Error::CorruptedData(format!("leaf record {} has a bad digest: {}", index, e))
        })?;

        Ok(Self { index, digest })
    }
}
