use std::collections::HashMap;

use cairn_types::ContentHash;
use parking_lot::RwLock;

use crate::bucket::{Bucket, BucketFlag};
use crate::driver::Driver;
use crate::error::{StoreError, StoreResult};

/// In-memory driver.
///
/// Intended for tests and ephemeral wallets. Each bucket is a `HashMap`
/// behind a `RwLock`; values are cloned on read and write.
pub struct MemoryDriver {
    bucket: BucketFlag,
    a: RwLock<HashMap<ContentHash, Vec<u8>>>,
    b: RwLock<HashMap<ContentHash, Vec<u8>>>,
    root: RwLock<ContentHash>,
}

impl MemoryDriver {
    pub fn new(bucket: BucketFlag) -> Self {
        Self {
            bucket,
            a: RwLock::new(HashMap::new()),
            b: RwLock::new(HashMap::new()),
            root: RwLock::new(ContentHash::blank()),
        }
    }

    fn map(&self, bucket: Bucket) -> &RwLock<HashMap<ContentHash, Vec<u8>>> {
        match bucket {
            Bucket::A => &self.a,
            Bucket::B => &self.b,
        }
    }

    /// Number of objects held in `bucket`.
    pub fn len(&self, bucket: Bucket) -> usize {
        self.map(bucket).read().len()
    }

    /// Returns `true` if both buckets are empty.
    pub fn is_empty(&self) -> bool {
        self.a.read().is_empty() && self.b.read().is_empty()
    }

    /// Remove a single object from every bucket, bypassing the tree.
    pub fn forget(&self, key: &ContentHash) -> bool {
        let in_a = self.a.write().remove(key).is_some();
        let in_b = self.b.write().remove(key).is_some();
        in_a || in_b
    }
}

impl Driver for MemoryDriver {
    fn load_from_bucket(&self, key: &ContentHash, bucket: Bucket) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.map(bucket).read().get(key).cloned())
    }

    fn store(
        &self,
        _is_transaction: bool,
        key: &ContentHash,
        value: &[u8],
        bucket: Bucket,
    ) -> StoreResult<()> {
        if key.is_blank() {
            return Err(StoreError::BlankKey);
        }
        // Same key always maps to the same content.
        self.map(bucket)
            .write()
            .entry(key.clone())
            .or_insert_with(|| value.to_vec());
        Ok(())
    }

    fn current_bucket(&self) -> Bucket {
        self.bucket.get()
    }

    fn empty_bucket(&self, bucket: Bucket) -> StoreResult<()> {
        if bucket == self.current_bucket() {
            return Err(StoreError::CurrentBucket);
        }
        self.map(bucket).write().clear();
        Ok(())
    }

    fn load_root(&self) -> StoreResult<ContentHash> {
        Ok(self.root.read().clone())
    }

    fn store_root(&self, _commit: bool, hash: &ContentHash) -> StoreResult<()> {
        *self.root.write() = hash.clone();
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

impl std::fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDriver")
            .field("bucket", &self.bucket.get())
            .field("a", &self.len(Bucket::A))
            .field("b", &self.len(Bucket::B))
            .finish()
    }
}
