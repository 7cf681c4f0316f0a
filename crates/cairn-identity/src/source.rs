//! NymID sources: the cryptographic anchor of an identity.
//!
//! A source is either a bare Ed25519 public key or a payment code. The NymID
//! is derived from the source alone, so anyone holding the master credential
//! can check that it belongs to the identity it claims.

use cairn_crypto::{ContentHasher, Signature, SigningKey, VerifyingKey};
use cairn_types::Identifier;
use serde::{Deserialize, Serialize};

use crate::error::{IdentityError, IdentityResult};

pub const PAYMENT_CODE_VERSION: u8 = 3;

/// A reusable payment code: a public key plus chain code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCode {
    pub version: u8,
    pub key: [u8; 32],
    pub chain_code: [u8; 32],
}

impl PaymentCode {
    pub fn id(&self) -> Identifier {
        let mut data = Vec::with_capacity(65);
        data.push(self.version);
        data.extend_from_slice(&self.key);
        data.extend_from_slice(&self.chain_code);
        ContentHasher::PAYMENT_CODE.identifier(&data)
    }

    pub fn verifying_key(&self) -> IdentityResult<VerifyingKey> {
        Ok(VerifyingKey::from_bytes(self.key)?)
    }
}

/// How a master credential proves it belongs to its source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceProof {
    /// The master's signing key is the source key; its self-signature is
    /// the proof. Only valid for public-key sources.
    SelfSignature,
    /// The source key signs the master credential.
    Signature,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    Pubkey,
    PaymentCode,
}

/// Public half of a NymID source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NymIdSource {
    Pubkey([u8; 32]),
    PaymentCode(PaymentCode),
}

impl NymIdSource {
    pub fn source_type(&self) -> SourceType {
        match self {
            Self::Pubkey(_) => SourceType::Pubkey,
            Self::PaymentCode(_) => SourceType::PaymentCode,
        }
    }

    /// The identity derived from this source.
    pub fn nym_id(&self) -> Identifier {
        match self {
            Self::Pubkey(key) => ContentHasher::SOURCE.identifier(key),
            Self::PaymentCode(code) => code.id(),
        }
    }

    pub fn verifying_key(&self) -> IdentityResult<VerifyingKey> {
        match self {
            Self::Pubkey(key) => Ok(VerifyingKey::from_bytes(*key)?),
            Self::PaymentCode(code) => code.verifying_key(),
        }
    }

    /// Check a source signature over a master credential's public form.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(key) = self.verifying_key() else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify(message, &signature).is_ok()
    }
}

/// Private half of a NymID source.
#[derive(Clone, Debug)]
pub struct SourceSecret {
    key: SigningKey,
    source: NymIdSource,
    proof: SourceProof,
}

impl SourceSecret {
    /// A fresh public-key source.
    pub fn pubkey(proof: SourceProof) -> Self {
        Self::from_key(SigningKey::generate(), proof)
    }

    pub fn from_key(key: SigningKey, proof: SourceProof) -> Self {
        let source = NymIdSource::Pubkey(key.verifying_key().as_bytes());
        Self { key, source, proof }
    }

    /// A fresh payment-code source. Payment codes always sign their master.
    pub fn payment_code() -> Self {
        let key = SigningKey::generate();
        let mut chain_code = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut chain_code);
        let source = NymIdSource::PaymentCode(PaymentCode {
            version: PAYMENT_CODE_VERSION,
            key: key.verifying_key().as_bytes(),
            chain_code,
        });
        Self {
            key,
            source,
            proof: SourceProof::Signature,
        }
    }

    /// Build a secret for `source_type`, rejecting combinations a payment
    /// code cannot satisfy.
    pub fn generate(source_type: SourceType, proof: SourceProof) -> IdentityResult<Self> {
        match (source_type, proof) {
            (SourceType::Pubkey, proof) => Ok(Self::pubkey(proof)),
            (SourceType::PaymentCode, SourceProof::Signature) => Ok(Self::payment_code()),
            (SourceType::PaymentCode, SourceProof::SelfSignature) => Err(IdentityError::InvalidParameters(
                "payment code sources cannot use self-signature proofs".into(),
            )),
        }
    }

    pub fn source(&self) -> &NymIdSource {
        &self.source
    }

    pub fn proof(&self) -> SourceProof {
        self.proof
    }

    pub fn nym_id(&self) -> Identifier {
        self.source.nym_id()
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.key
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.key.sign(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nym_id_depends_on_source_only() {
        let secret = SourceSecret::pubkey(SourceProof::Signature);
        let copy = NymIdSource::Pubkey(secret.signing_key().verifying_key().as_bytes());
        assert_eq!(copy.nym_id(), secret.nym_id());
        assert_ne!(SourceSecret::pubkey(SourceProof::Signature).nym_id(), secret.nym_id());
    }

    #[test]
    fn payment_code_and_pubkey_ids_differ() {
        let secret = SourceSecret::payment_code();
        let NymIdSource::PaymentCode(code) = secret.source() else {
            panic!("expected a payment code");
        };
        assert_eq!(secret.nym_id(), code.id());
        assert_ne!(secret.nym_id(), NymIdSource::Pubkey(code.key).nym_id());
    }

    #[test]
    fn source_signature_verifies() {
        let secret = SourceSecret::payment_code();
        let signature = secret.sign(b"master").to_bytes();
        assert!(secret.source().verify(b"master", &signature));
        assert!(!secret.source().verify(b"other", &signature));
        assert!(!secret.source().verify(b"master", &signature[..10]));
    }

    #[test]
    fn payment_code_rejects_self_signature() {
        let err = SourceSecret::generate(SourceType::PaymentCode, SourceProof::SelfSignature).unwrap_err();
        assert!(matches!(err, IdentityError::InvalidParameters(_)));
    }
}
