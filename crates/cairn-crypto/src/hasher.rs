use cairn_types::{ContentHash, Identifier};

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"cairn-object-v1"`,
/// `"cairn-credential-v1"`) that is prepended to every hash computation, so a
/// stored blob and a credential with identical bytes hash differently.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for stored blobs (driver keys).
    pub const OBJECT: Self = Self {
        domain: "cairn-object-v1",
    };
    /// Hasher for credential identifiers.
    pub const CREDENTIAL: Self = Self {
        domain: "cairn-credential-v1",
    };
    /// Hasher for NymID sources.
    pub const SOURCE: Self = Self {
        domain: "cairn-source-v1",
    };
    /// Hasher for contact claim identifiers.
    pub const CLAIM: Self = Self {
        domain: "cairn-claim-v1",
    };
    /// Hasher for payment code identifiers.
    pub const PAYMENT_CODE: Self = Self {
        domain: "cairn-paymentcode-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    fn digest(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// Hash raw bytes into an [`Identifier`].
    pub fn identifier(&self, data: &[u8]) -> Identifier {
        Identifier::from_hash(self.digest(data))
    }

    /// Hash raw bytes into a storage key.
    pub fn content_hash(&self, data: &[u8]) -> ContentHash {
        ContentHash::from_digest(&self.digest(data))
    }

    /// Hash a serializable value (bincode encoding) into an [`Identifier`].
    pub fn identifier_of<T: serde::Serialize>(&self, value: &T) -> Result<Identifier, HasherError> {
        let data = bincode::serialize(value).map_err(|e| HasherError::Serialization(e.to_string()))?;
        Ok(self.identifier(&data))
    }

    /// Verify that data produces the expected storage key.
    pub fn verify(&self, data: &[u8], expected: &ContentHash) -> bool {
        self.content_hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}
