//! The credential hierarchy.
//!
//! Every credential shares one serialized shape, [`SerializedCredential`],
//! whose populated fields depend on the [`CredentialRole`]. The role-specific
//! wrappers ([`Primary`], [`Secondary`], [`ContactCredential`],
//! [`VerificationCredential`]) add creation and validation on top of the
//! common [`Credential`] base.
//!
//! A credential's ID is the hash of its public form with the ID, private keys
//! and signatures removed, so the public and private copies of a credential
//! share one ID. Signatures cover the public form with the ID in place; the
//! private self-signature additionally covers the private keys.

mod child;
mod keys;
mod primary;

pub use child::{ChildCredential, ContactCredential, Secondary, VerificationCredential};
pub use keys::{KeySet, PrivateKeys, PublicKeys};
pub use primary::Primary;

use cairn_crypto::{ContentHasher, Signature, VerifyingKey};
use cairn_types::Identifier;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::contact_data::ContactData;
use crate::error::{Check, IdentityError, IdentityResult};
use crate::source::{NymIdSource, SourceProof};
use crate::verification::VerificationSet;

pub const CREDENTIAL_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialRole {
    MasterKey,
    ChildKey,
    Contact,
    Verify,
}

impl CredentialRole {
    pub fn has_keys(self) -> bool {
        matches!(self, Self::MasterKey | Self::ChildKey)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyMode {
    /// The credential carries no keys.
    Null,
    Public,
    Private,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    SignChildCred,
    SignMessage,
    EncryptMessage,
    AuthenticateConnection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureRole {
    PublicSelf,
    PrivateSelf,
    Master,
    Source,
    Message,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyRole {
    Sign,
    Auth,
    Encrypt,
}

/// A signature plus the credential (or source) that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSignature {
    pub role: SignatureRole,
    pub credential: Identifier,
    pub signature: Vec<u8>,
}

impl CredentialSignature {
    pub fn new(role: SignatureRole, credential: Identifier, signature: &Signature) -> Self {
        Self {
            role,
            credential,
            signature: signature.to_bytes().to_vec(),
        }
    }

    pub fn verify(&self, key: &VerifyingKey, message: &[u8]) -> bool {
        match Signature::from_slice(&self.signature) {
            Ok(signature) => key.verify(message, &signature).is_ok(),
            Err(_) => false,
        }
    }
}

/// Present only on master credentials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterData {
    pub source: NymIdSource,
    pub proof: SourceProof,
}

/// The persisted form shared by every credential role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedCredential {
    pub version: u32,
    pub role: CredentialRole,
    pub mode: KeyMode,
    pub id: Identifier,
    pub nym_id: Identifier,
    /// Set on every non-master credential.
    pub master_id: Option<Identifier>,
    pub master_data: Option<MasterData>,
    pub public_keys: Option<PublicKeys>,
    pub private_keys: Option<PrivateKeys>,
    pub contact_data: Option<ContactData>,
    pub verification: Option<VerificationSet>,
    pub signatures: Vec<CredentialSignature>,
}

fn encode<T: Serialize>(value: &T) -> IdentityResult<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

impl SerializedCredential {
    pub(crate) fn new(role: CredentialRole, nym_id: Identifier) -> Self {
        Self {
            version: CREDENTIAL_VERSION,
            role,
            mode: KeyMode::Null,
            id: Identifier::empty(),
            nym_id,
            master_id: None,
            master_data: None,
            public_keys: None,
            private_keys: None,
            contact_data: None,
            verification: None,
            signatures: Vec::new(),
        }
    }

    fn public_mode(&self) -> KeyMode {
        if self.role.has_keys() {
            KeyMode::Public
        } else {
            KeyMode::Null
        }
    }

    fn unsigned(&self, keep_id: bool, keep_private: bool) -> Self {
        let mut out = self.clone();
        out.signatures.clear();
        if !keep_id {
            out.id = Identifier::empty();
        }
        if !keep_private {
            out.private_keys = None;
            out.mode = self.public_mode();
        }
        out
    }

    /// The ID this content should carry.
    pub fn compute_id(&self) -> IdentityResult<Identifier> {
        Ok(ContentHasher::CREDENTIAL.identifier(&encode(&self.unsigned(false, false))?))
    }

    /// Bytes covered by the public self, master and source signatures.
    pub fn public_signing_bytes(&self) -> IdentityResult<Vec<u8>> {
        encode(&self.unsigned(true, false))
    }

    /// Bytes covered by the private self-signature.
    pub fn private_signing_bytes(&self) -> IdentityResult<Vec<u8>> {
        encode(&self.unsigned(true, true))
    }

    /// The copy that can be shared: private keys and the private
    /// self-signature removed.
    pub fn public_form(&self) -> Self {
        let mut out = self.clone();
        out.private_keys = None;
        out.mode = self.public_mode();
        out.signatures.retain(|s| s.role != SignatureRole::PrivateSelf);
        out
    }

    pub fn is_private(&self) -> bool {
        self.mode == KeyMode::Private && self.private_keys.is_some()
    }

    pub fn signature(&self, role: SignatureRole) -> Option<&CredentialSignature> {
        self.signatures.iter().find(|s| s.role == role)
    }

    pub fn to_bytes(&self) -> IdentityResult<Vec<u8>> {
        encode(self)
    }

    pub fn from_bytes(data: &[u8]) -> IdentityResult<Self> {
        Ok(bincode::deserialize(data)?)
    }

    /// Field presence required by the role.
    fn well_formed(&self) -> bool {
        if self.version == 0 || self.version > CREDENTIAL_VERSION {
            return false;
        }
        let keys_ok = if self.role.has_keys() {
            self.public_keys.is_some()
                && self.mode != KeyMode::Null
                && self.private_keys.is_some() == (self.mode == KeyMode::Private)
        } else {
            self.mode == KeyMode::Null && self.public_keys.is_none() && self.private_keys.is_none()
        };
        let role_ok = match self.role {
            CredentialRole::MasterKey => self.master_data.is_some() && self.master_id.is_none(),
            CredentialRole::ChildKey => self.master_data.is_none() && self.master_id.is_some(),
            CredentialRole::Contact => self.master_id.is_some() && self.contact_data.is_some(),
            CredentialRole::Verify => self.master_id.is_some() && self.verification.is_some(),
        };
        let payload_ok = match self.role {
            CredentialRole::Contact => self.verification.is_none() && self.master_data.is_none(),
            CredentialRole::Verify => self.contact_data.is_none() && self.master_data.is_none(),
            _ => self.contact_data.is_none() && self.verification.is_none(),
        };
        keys_ok && role_ok && payload_ok
    }
}

/// Common state of every credential: the serialized form plus the keys
/// parsed out of it.
#[derive(Clone, Debug)]
pub struct Credential {
    serialized: SerializedCredential,
    keys: Option<KeySet>,
}

impl Credential {
    /// Parse a stored credential. Never re-signs.
    pub(crate) fn from_serialized(serialized: SerializedCredential) -> IdentityResult<Self> {
        let keys = match &serialized.public_keys {
            Some(public) => Some(KeySet::from_serialized(public, serialized.private_keys.as_ref())?),
            None => None,
        };
        Ok(Self { serialized, keys })
    }

    /// Assign the ID for freshly built content and attach the self
    /// signatures a key credential carries.
    pub(crate) fn fresh(mut serialized: SerializedCredential, keys: Option<KeySet>) -> IdentityResult<Self> {
        if let Some(keys) = &keys {
            serialized.public_keys = Some(keys.public());
            serialized.private_keys = keys.private();
            serialized.mode = if serialized.private_keys.is_some() {
                KeyMode::Private
            } else {
                KeyMode::Public
            };
        }
        serialized.id = serialized.compute_id()?;
        let mut credential = Self { serialized, keys };
        credential.self_sign()?;
        Ok(credential)
    }

    fn self_sign(&mut self) -> IdentityResult<()> {
        let Some(keys) = &self.keys else {
            return Ok(());
        };
        let id = self.serialized.id;
        let signer = keys.signing_key(KeyRole::Sign).ok_or(IdentityError::MissingPrivateKey(id))?;
        let public = signer.sign(&self.serialized.public_signing_bytes()?);
        let private = signer.sign(&self.serialized.private_signing_bytes()?);
        self.serialized
            .signatures
            .push(CredentialSignature::new(SignatureRole::PublicSelf, id, &public));
        self.serialized
            .signatures
            .push(CredentialSignature::new(SignatureRole::PrivateSelf, id, &private));
        Ok(())
    }

    pub(crate) fn push_signature(&mut self, signature: CredentialSignature) {
        self.serialized.signatures.push(signature);
    }

    pub fn id(&self) -> Identifier {
        self.serialized.id
    }

    pub fn nym_id(&self) -> Identifier {
        self.serialized.nym_id
    }

    pub fn role(&self) -> CredentialRole {
        self.serialized.role
    }

    pub fn mode(&self) -> KeyMode {
        self.serialized.mode
    }

    pub fn master_id(&self) -> Option<Identifier> {
        self.serialized.master_id
    }

    pub fn serialized(&self) -> &SerializedCredential {
        &self.serialized
    }

    pub fn keys(&self) -> Option<&KeySet> {
        self.keys.as_ref()
    }

    pub fn is_private(&self) -> bool {
        self.serialized.is_private()
    }

    /// Whether this credential can perform `capability` right now. Key
    /// operations need the private half.
    pub fn has_capability(&self, capability: Capability) -> bool {
        let Some(keys) = &self.keys else {
            return false;
        };
        match (self.role(), capability) {
            (CredentialRole::MasterKey, Capability::SignChildCred) => keys.has_private(KeyRole::Sign),
            (CredentialRole::ChildKey, Capability::SignMessage) => keys.has_private(KeyRole::Sign),
            (CredentialRole::ChildKey, Capability::AuthenticateConnection) => keys.has_private(KeyRole::Auth),
            (CredentialRole::ChildKey, Capability::EncryptMessage) => keys.has_private(KeyRole::Encrypt),
            _ => false,
        }
    }

    pub(crate) fn fail(&self, check: Check) -> IdentityError {
        warn!(credential = %self.id(), role = ?self.role(), %check, "credential verification failed");
        IdentityError::verification(self.id(), check)
    }

    pub(crate) fn check_syntax(&self) -> IdentityResult<()> {
        if self.serialized.well_formed() {
            Ok(())
        } else {
            Err(self.fail(Check::Syntax))
        }
    }

    pub(crate) fn check_purported_id(&self) -> IdentityResult<()> {
        match self.serialized.compute_id() {
            Ok(id) if id == self.id() => Ok(()),
            _ => Err(self.fail(Check::PurportedId)),
        }
    }

    /// Public self-signature always; private self-signature when the
    /// private keys are present.
    pub(crate) fn check_self_signatures(&self) -> IdentityResult<()> {
        let Some(key) = self.keys.as_ref().and_then(|k| k.verifying_key(KeyRole::Sign)) else {
            return Err(self.fail(Check::SelfSignature));
        };
        let public_ok = match (
            self.serialized.signature(SignatureRole::PublicSelf),
            self.serialized.public_signing_bytes(),
        ) {
            (Some(signature), Ok(message)) => signature.verify(&key, &message),
            _ => false,
        };
        let private_ok = !self.is_private()
            || match (
                self.serialized.signature(SignatureRole::PrivateSelf),
                self.serialized.private_signing_bytes(),
            ) {
                (Some(signature), Ok(message)) => signature.verify(&key, &message),
                _ => false,
            };
        if public_ok && private_ok {
            Ok(())
        } else {
            Err(self.fail(Check::SelfSignature))
        }
    }

    /// Sign `message` with the key for `role`, gated on `capability`.
    pub(crate) fn sign_with(
        &self,
        capability: Capability,
        role: KeyRole,
        signature_role: SignatureRole,
        message: &[u8],
    ) -> IdentityResult<CredentialSignature> {
        if !self.has_capability(capability) {
            return Err(IdentityError::MissingCapability(capability));
        }
        let signer = self
            .keys
            .as_ref()
            .and_then(|k| k.signing_key(role))
            .ok_or(IdentityError::MissingPrivateKey(self.id()))?;
        Ok(CredentialSignature::new(signature_role, self.id(), &signer.sign(message)))
    }
}
