//! Persisted record shapes shared by every storage layer.

use cairn_types::ContentHash;
use serde::{Deserialize, Serialize};

use crate::bucket::Bucket;

/// Current version written for root records.
pub const ROOT_VERSION: u32 = 2;

/// Digest algorithm behind a [`StorageItem`] hash.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashType {
    #[default]
    Blake3,
}

/// One `{item_id, hash, alias, hash_type}` entry of a node index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageItem {
    pub item_id: String,
    pub hash: ContentHash,
    pub alias: String,
    pub hash_type: HashType,
}

impl StorageItem {
    pub fn new(item_id: impl Into<String>, hash: ContentHash, alias: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            hash,
            alias: alias.into(),
            hash_type: HashType::Blake3,
        }
    }
}

/// The object the root pointer refers to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootRecord {
    pub version: u32,
    /// Hash of the tree snapshot.
    pub items: ContentHash,
    /// Bucket flag: `false` is bucket A.
    pub alt_location: bool,
    /// Epoch seconds of the last completed garbage collection.
    pub last_gc: u64,
    pub gc_in_progress: bool,
    /// Tree snapshot being collected, blank when idle.
    pub gc_root: ContentHash,
    /// Incremented on every successful save.
    pub sequence: u64,
}

impl RootRecord {
    pub fn bucket(&self) -> Bucket {
        Bucket::from_alt(self.alt_location)
    }
}

impl Default for RootRecord {
    fn default() -> Self {
        Self {
            version: ROOT_VERSION,
            items: ContentHash::blank(),
            alt_location: false,
            last_gc: 0,
            gc_in_progress: false,
            gc_root: ContentHash::blank(),
            sequence: 0,
        }
    }
}
