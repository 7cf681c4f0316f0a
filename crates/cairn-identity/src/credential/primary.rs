use cairn_types::Identifier;
use tracing::debug;

use super::{
    Capability, Credential, CredentialRole, CredentialSignature, KeyRole, KeySet, MasterData, SerializedCredential,
    SignatureRole,
};
use crate::error::{Check, IdentityError, IdentityResult};
use crate::source::{NymIdSource, SourceProof, SourceSecret};

/// The master credential: root of trust for one authority.
#[derive(Clone, Debug)]
pub struct Primary {
    base: Credential,
}

impl Primary {
    /// Create and sign a master credential anchored to `secret`.
    ///
    /// With a self-signature proof the source key becomes the master's
    /// signing key. Otherwise the master gets fresh keys and the source
    /// signs it.
    pub fn create(secret: &SourceSecret) -> IdentityResult<Self> {
        let keys = match (secret.proof(), secret.source()) {
            (SourceProof::SelfSignature, NymIdSource::Pubkey(_)) => KeySet::with_signing_key(secret.signing_key().clone()),
            (SourceProof::SelfSignature, NymIdSource::PaymentCode(_)) => {
                return Err(IdentityError::InvalidParameters(
                    "payment code sources cannot use self-signature proofs".into(),
                ))
            }
            (SourceProof::Signature, _) => KeySet::generate(),
        };
        let mut serialized = SerializedCredential::new(CredentialRole::MasterKey, secret.nym_id());
        serialized.master_data = Some(MasterData {
            source: secret.source().clone(),
            proof: secret.proof(),
        });
        let mut base = Credential::fresh(serialized, Some(keys))?;
        if secret.proof() == SourceProof::Signature {
            let signature = secret.sign(&base.serialized().public_signing_bytes()?);
            base.push_signature(CredentialSignature::new(SignatureRole::Source, secret.nym_id(), &signature));
        }
        debug!(credential = %base.id(), nym = %base.nym_id(), "master credential created");
        Ok(Self { base })
    }

    pub fn load(serialized: SerializedCredential) -> IdentityResult<Self> {
        if serialized.role != CredentialRole::MasterKey {
            return Err(IdentityError::InvalidParameters(format!(
                "credential {} is not a master credential",
                serialized.id
            )));
        }
        Ok(Self {
            base: Credential::from_serialized(serialized)?,
        })
    }

    pub fn base(&self) -> &Credential {
        &self.base
    }

    pub fn id(&self) -> Identifier {
        self.base.id()
    }

    pub fn nym_id(&self) -> Identifier {
        self.base.nym_id()
    }

    pub fn source(&self) -> Option<&NymIdSource> {
        self.base.serialized().master_data.as_ref().map(|data| &data.source)
    }

    /// Syntax, purported ID, self-signatures, then the source anchor.
    pub fn validate(&self) -> IdentityResult<()> {
        self.base.check_syntax()?;
        self.base.check_purported_id()?;
        self.base.check_self_signatures()?;
        self.check_source()
    }

    fn check_source(&self) -> IdentityResult<()> {
        let serialized = self.base.serialized();
        let Some(data) = &serialized.master_data else {
            return Err(self.base.fail(Check::Source));
        };
        if data.source.nym_id() != serialized.nym_id {
            return Err(self.base.fail(Check::NymId));
        }
        let anchored = match (data.proof, &data.source) {
            (SourceProof::SelfSignature, NymIdSource::Pubkey(key)) => {
                serialized.public_keys.map(|keys| keys.sign) == Some(*key)
            }
            (SourceProof::SelfSignature, NymIdSource::PaymentCode(_)) => false,
            (SourceProof::Signature, source) => match (
                serialized.signature(SignatureRole::Source),
                serialized.public_signing_bytes(),
            ) {
                (Some(signature), Ok(message)) => source.verify(&message, &signature.signature),
                _ => false,
            },
        };
        if anchored {
            Ok(())
        } else {
            Err(self.base.fail(Check::Source))
        }
    }

    /// Master-sign a child credential's public form.
    pub fn sign_child(&self, child: &SerializedCredential) -> IdentityResult<CredentialSignature> {
        let message = child.public_signing_bytes()?;
        self.base
            .sign_with(Capability::SignChildCred, KeyRole::Sign, SignatureRole::Master, &message)
    }

    /// Whether `child` carries a valid master signature from this
    /// credential.
    pub fn verify_child(&self, child: &SerializedCredential) -> bool {
        let Some(key) = self.base.keys().and_then(|k| k.verifying_key(KeyRole::Sign)) else {
            return false;
        };
        let Some(signature) = child.signature(SignatureRole::Master) else {
            return false;
        };
        if signature.credential != self.id() {
            return false;
        }
        child
            .public_signing_bytes()
            .map(|message| signature.verify(&key, &message))
            .unwrap_or(false)
    }
}
