use cairn_crypto::{AgreementPublic, AgreementSecret, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::KeyRole;
use crate::error::{IdentityError, IdentityResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeys {
    pub sign: [u8; 32],
    pub auth: [u8; 32],
    pub encrypt: [u8; 32],
}

/// Raw private key bytes. Zeroed on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKeys {
    pub sign: [u8; 32],
    pub auth: [u8; 32],
    pub encrypt: [u8; 32],
}

impl std::fmt::Debug for PrivateKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKeys(<redacted>)")
    }
}

/// The signing, authentication and encryption keypairs of a key credential.
/// Private halves are absent for credentials loaded from a public copy.
#[derive(Clone, Debug)]
pub struct KeySet {
    sign: VerifyingKey,
    sign_secret: Option<SigningKey>,
    auth: VerifyingKey,
    auth_secret: Option<SigningKey>,
    encrypt: AgreementPublic,
    encrypt_secret: Option<AgreementSecret>,
}

impl KeySet {
    pub fn generate() -> Self {
        Self::with_signing_key(SigningKey::generate())
    }

    /// Fresh auth and encryption keys around an existing signing key.
    pub fn with_signing_key(sign: SigningKey) -> Self {
        let auth = SigningKey::generate();
        let encrypt = AgreementSecret::generate();
        Self {
            sign: sign.verifying_key(),
            sign_secret: Some(sign),
            auth: auth.verifying_key(),
            auth_secret: Some(auth),
            encrypt: encrypt.public(),
            encrypt_secret: Some(encrypt),
        }
    }

    /// Rebuild from stored key bytes. Private keys that do not match the
    /// stored public keys are rejected.
    pub fn from_serialized(public: &PublicKeys, private: Option<&PrivateKeys>) -> IdentityResult<Self> {
        let mut keys = Self {
            sign: VerifyingKey::from_bytes(public.sign)?,
            sign_secret: None,
            auth: VerifyingKey::from_bytes(public.auth)?,
            auth_secret: None,
            encrypt: AgreementPublic::from_bytes(public.encrypt),
            encrypt_secret: None,
        };
        if let Some(private) = private {
            let sign = SigningKey::from_bytes(private.sign);
            let auth = SigningKey::from_bytes(private.auth);
            let encrypt = AgreementSecret::from_bytes(private.encrypt);
            if sign.verifying_key() != keys.sign || auth.verifying_key() != keys.auth || encrypt.public() != keys.encrypt {
                return Err(IdentityError::InvalidParameters(
                    "private keys do not match public keys".into(),
                ));
            }
            keys.sign_secret = Some(sign);
            keys.auth_secret = Some(auth);
            keys.encrypt_secret = Some(encrypt);
        }
        Ok(keys)
    }

    pub fn public(&self) -> PublicKeys {
        PublicKeys {
            sign: self.sign.as_bytes(),
            auth: self.auth.as_bytes(),
            encrypt: self.encrypt.as_bytes(),
        }
    }

    /// All three private keys, or `None` if any is missing.
    pub fn private(&self) -> Option<PrivateKeys> {
        Some(PrivateKeys {
            sign: *self.sign_secret.as_ref()?.as_bytes(),
            auth: *self.auth_secret.as_ref()?.as_bytes(),
            encrypt: self.encrypt_secret.as_ref()?.to_bytes(),
        })
    }

    pub fn has_private(&self, role: KeyRole) -> bool {
        match role {
            KeyRole::Sign => self.sign_secret.is_some(),
            KeyRole::Auth => self.auth_secret.is_some(),
            KeyRole::Encrypt => self.encrypt_secret.is_some(),
        }
    }

    /// Signing key for `Sign` or `Auth`.
    pub fn signing_key(&self, role: KeyRole) -> Option<&SigningKey> {
        match role {
            KeyRole::Sign => self.sign_secret.as_ref(),
            KeyRole::Auth => self.auth_secret.as_ref(),
            KeyRole::Encrypt => None,
        }
    }

    pub fn verifying_key(&self, role: KeyRole) -> Option<VerifyingKey> {
        match role {
            KeyRole::Sign => Some(self.sign),
            KeyRole::Auth => Some(self.auth),
            KeyRole::Encrypt => None,
        }
    }

    pub fn agreement_public(&self) -> AgreementPublic {
        self.encrypt
    }

    pub fn agreement_secret(&self) -> Option<&AgreementSecret> {
        self.encrypt_secret.as_ref()
    }

    /// Raw public key bytes for `role`.
    pub fn public_bytes(&self, role: KeyRole) -> [u8; 32] {
        match role {
            KeyRole::Sign => self.sign.as_bytes(),
            KeyRole::Auth => self.auth.as_bytes(),
            KeyRole::Encrypt => self.encrypt.as_bytes(),
        }
    }
}
