use cairn_types::ContentHash;

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(ContentHash),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted state is inconsistent: a non-blank hash that cannot be
    /// decoded, or bookkeeping that contradicts itself.
    #[error("fatal storage corruption at {key}: {reason}")]
    Corrupt { key: ContentHash, reason: String },

    /// A node was saved without holding its own write lock.
    #[error("lock violation while saving {node}")]
    LockViolation { node: &'static str },

    /// Attempted to store an object under a blank key.
    #[error("cannot store object under a blank key")]
    BlankKey,

    /// Refused to reclaim the bucket currently receiving writes.
    #[error("refusing to empty the current bucket")]
    CurrentBucket,

    /// Sealing or opening an encrypted value failed.
    #[error("seal error: {0}")]
    Seal(#[from] cairn_crypto::SealError),

    /// Every backend rejected a fanned-out write.
    #[error("all {0} backends rejected the write")]
    AllBackendsFailed(usize),

    /// Invalid storage configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether this error means the persisted graph is already inconsistent.
    ///
    /// Fatal errors are surfaced to the storage facade's fatal handler
    /// instead of being treated as ordinary failures.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Corrupt { .. } | Self::LockViolation { .. })
    }

    pub fn corrupt(key: &ContentHash, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.clone(),
            reason: reason.into(),
        }
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(StoreError::corrupt(&ContentHash::blank(), "bad").is_fatal());
        assert!(StoreError::LockViolation { node: "accounts" }.is_fatal());
        assert!(!StoreError::NotFound(ContentHash::blank()).is_fatal());
        assert!(!StoreError::CurrentBucket.is_fatal());
    }
}
