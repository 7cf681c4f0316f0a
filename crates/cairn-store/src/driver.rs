use std::sync::Arc;

use cairn_crypto::ContentHasher;
use cairn_types::ContentHash;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use crate::bucket::Bucket;
use crate::error::{StoreError, StoreResult};

/// Backend persistence contract: immutable blobs keyed by content hash, in
/// two buckets, plus one mutable root pointer.
///
/// All implementations must satisfy these invariants:
/// - A blob is never changed once written under its key.
/// - The root pointer is the only mutable value a driver holds.
/// - Blank keys are never loaded or stored.
/// - [`Driver::empty_bucket`] refuses the bucket currently receiving writes.
pub trait Driver: Send + Sync {
    /// Read `key` from a specific bucket. Returns `Ok(None)` if absent.
    fn load_from_bucket(&self, key: &ContentHash, bucket: Bucket) -> StoreResult<Option<Vec<u8>>>;

    /// Write `value` under `key` into `bucket`.
    ///
    /// `is_transaction` asks transactional backends to make the write
    /// durable before returning.
    fn store(
        &self,
        is_transaction: bool,
        key: &ContentHash,
        value: &[u8],
        bucket: Bucket,
    ) -> StoreResult<()>;

    /// The bucket currently receiving writes.
    fn current_bucket(&self) -> Bucket;

    /// Destroy every object in `bucket`.
    fn empty_bucket(&self, bucket: Bucket) -> StoreResult<()>;

    /// Read the root pointer. Blank if none has been stored.
    fn load_root(&self) -> StoreResult<ContentHash>;

    /// Replace the root pointer.
    fn store_root(&self, commit: bool, hash: &ContentHash) -> StoreResult<()>;

    /// Short backend name for log output.
    fn name(&self) -> &str;

    /// Read `key`, looking in the current bucket first and then the other.
    ///
    /// A miss is `Ok(None)`. When `checking` is false the caller asserted the
    /// object exists, so a miss is logged as an error.
    fn load(&self, key: &ContentHash, checking: bool) -> StoreResult<Option<Vec<u8>>> {
        if key.is_blank() {
            return Ok(None);
        }
        let current = self.current_bucket();
        for bucket in [current, current.flip()] {
            if let Some(value) = self.load_from_bucket(key, bucket)? {
                return Ok(Some(value));
            }
        }
        if !checking {
            error!(driver = self.name(), key = %key, "object not found");
        }
        Ok(None)
    }

    /// Hash `value`, store it in the current bucket, and return its key.
    fn store_value(&self, is_transaction: bool, value: &[u8]) -> StoreResult<ContentHash> {
        let key = ContentHasher::OBJECT.content_hash(value);
        self.store(is_transaction, &key, value, self.current_bucket())?;
        Ok(key)
    }

    /// Copy one blob into `to`'s current bucket.
    ///
    /// Returns `Ok(true)` trivially for a blank key and `Ok(false)` if the
    /// blob is missing here.
    fn migrate(&self, key: &ContentHash, to: &dyn Driver) -> StoreResult<bool> {
        if key.is_blank() {
            return Ok(true);
        }
        match self.load(key, false)? {
            Some(value) => {
                to.store(false, key, &value, to.current_bucket())?;
                debug!(key = %key, from = self.name(), to = to.name(), "migrated object");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Typed record helpers available on every driver, including `dyn Driver`.
pub trait DriverExt: Driver {
    /// Load and decode a bincode record.
    ///
    /// A present-but-undecodable blob is corruption, not absence.
    fn load_record<T: DeserializeOwned>(&self, key: &ContentHash, checking: bool) -> StoreResult<Option<T>> {
        match self.load(key, checking)? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| StoreError::corrupt(key, format!("undecodable record: {e}"))),
            None => Ok(None),
        }
    }

    /// Encode a record with bincode and store it in the current bucket.
    fn store_record<T: Serialize>(&self, is_transaction: bool, record: &T) -> StoreResult<ContentHash> {
        let bytes = bincode::serialize(record)?;
        self.store_value(is_transaction, &bytes)
    }
}

impl<D: Driver + ?Sized> DriverExt for D {}

impl<D: Driver + ?Sized> Driver for Arc<D> {
    fn load_from_bucket(&self, key: &ContentHash, bucket: Bucket) -> StoreResult<Option<Vec<u8>>> {
        (**self).load_from_bucket(key, bucket)
    }

    fn store(
        &self,
        is_transaction: bool,
        key: &ContentHash,
        value: &[u8],
        bucket: Bucket,
    ) -> StoreResult<()> {
        (**self).store(is_transaction, key, value, bucket)
    }

    fn current_bucket(&self) -> Bucket {
        (**self).current_bucket()
    }

    fn empty_bucket(&self, bucket: Bucket) -> StoreResult<()> {
        (**self).empty_bucket(bucket)
    }

    fn load_root(&self) -> StoreResult<ContentHash> {
        (**self).load_root()
    }

    fn store_root(&self, commit: bool, hash: &ContentHash) -> StoreResult<()> {
        (**self).store_root(commit, hash)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn load(&self, key: &ContentHash, checking: bool) -> StoreResult<Option<Vec<u8>>> {
        (**self).load(key, checking)
    }

    fn store_value(&self, is_transaction: bool, value: &[u8]) -> StoreResult<ContentHash> {
        (**self).store_value(is_transaction, value)
    }

    fn migrate(&self, key: &ContentHash, to: &dyn Driver) -> StoreResult<bool> {
        (**self).migrate(key, to)
    }
}
