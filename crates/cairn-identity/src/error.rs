use cairn_crypto::SignatureError;
use cairn_store::StoreError;
use cairn_types::Identifier;

/// The check a credential failed during verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Check {
    /// Required fields for the credential's role are missing or extra.
    Syntax,
    /// The credential names a different identity than its owner.
    NymId,
    /// A child credential names a different master than its authority.
    MasterId,
    /// The claimed ID is not the hash of the credential's content.
    PurportedId,
    SelfSignature,
    MasterSignature,
    /// The master credential is not anchored to its NymID source.
    Source,
}

impl std::fmt::Display for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Syntax => "syntax",
            Self::NymId => "nym id",
            Self::MasterId => "master id",
            Self::PurportedId => "purported id",
            Self::SelfSignature => "self signature",
            Self::MasterSignature => "master signature",
            Self::Source => "source",
        };
        f.write_str(name)
    }
}

/// Errors produced by identity operations.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("credential {0} holds no private keys")]
    MissingPrivateKey(Identifier),

    #[error("no usable credential with capability {0:?}")]
    MissingCapability(crate::credential::Capability),

    #[error("credential {credential} failed {check} check")]
    Verification { credential: Identifier, check: Check },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<bincode::Error> for IdentityError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl IdentityError {
    pub(crate) fn verification(credential: Identifier, check: Check) -> Self {
        Self::Verification { credential, check }
    }
}

pub type IdentityResult<T> = Result<T, IdentityError>;
