//! Encrypting wrapper for backup drivers.

use cairn_crypto::SymmetricKey;
use cairn_types::ContentHash;

use crate::bucket::Bucket;
use crate::driver::Driver;
use crate::error::StoreResult;

/// Seals every blob with a symmetric key before handing it to `inner`.
///
/// Keys stay plaintext content hashes so that multiplex reconciliation can
/// compare root pointers across sealed and unsealed backends.
pub struct SealedDriver {
    inner: Box<dyn Driver>,
    key: SymmetricKey,
    name: String,
}

impl SealedDriver {
    pub fn new(inner: Box<dyn Driver>, key: SymmetricKey) -> Self {
        let name = format!("sealed-{}", inner.name());
        Self { inner, key, name }
    }
}

impl Driver for SealedDriver {
    fn load_from_bucket(&self, key: &ContentHash, bucket: Bucket) -> StoreResult<Option<Vec<u8>>> {
        match self.inner.load_from_bucket(key, bucket)? {
            Some(sealed) => Ok(Some(self.key.open(&sealed)?)),
            None => Ok(None),
        }
    }

    fn store(
        &self,
        is_transaction: bool,
        key: &ContentHash,
        value: &[u8],
        bucket: Bucket,
    ) -> StoreResult<()> {
        let sealed = self.key.seal(value)?;
        self.inner.store(is_transaction, key, &sealed, bucket)
    }

    fn current_bucket(&self) -> Bucket {
        self.inner.current_bucket()
    }

    fn empty_bucket(&self, bucket: Bucket) -> StoreResult<()> {
        self.inner.empty_bucket(bucket)
    }

    fn load_root(&self) -> StoreResult<ContentHash> {
        self.inner.load_root()
    }

    fn store_root(&self, commit: bool, hash: &ContentHash) -> StoreResult<()> {
        self.inner.store_root(commit, hash)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::memory::MemoryDriver;
    use crate::BucketFlag;
    use std::sync::Arc;

    #[test]
    fn values_are_sealed_at_rest() {
        let raw = Arc::new(MemoryDriver::new(BucketFlag::default()));
        let sealed = SealedDriver::new(Box::new(raw.clone()), SymmetricKey::generate());

        let key = sealed.store_value(false, b"secret contract").unwrap();
        let at_rest = raw.load(&key, false).unwrap().unwrap();
        assert_ne!(at_rest, b"secret contract");
        assert_eq!(sealed.load(&key, false).unwrap().unwrap(), b"secret contract");
        assert_eq!(sealed.name(), "sealed-memory");
    }

    #[test]
    fn wrong_key_cannot_open() {
        let raw = Arc::new(MemoryDriver::new(BucketFlag::default()));
        let writer = SealedDriver::new(Box::new(raw.clone()), SymmetricKey::generate());
        let reader = SealedDriver::new(Box::new(raw), SymmetricKey::generate());
        let key = writer.store_value(false, b"data").unwrap();
        assert!(matches!(reader.load(&key, false), Err(StoreError::Seal(_))));
    }
}
