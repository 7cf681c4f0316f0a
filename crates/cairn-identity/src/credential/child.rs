use cairn_crypto::{AgreementPublic, SharedSecret};
use cairn_types::Identifier;

use super::{
    Capability, Credential, CredentialRole, CredentialSignature, KeyRole, KeySet, Primary, SerializedCredential,
    SignatureRole,
};
use crate::contact_data::ContactData;
use crate::error::{Check, IdentityError, IdentityResult};
use crate::verification::VerificationSet;

/// Build a child credential under `master`: assign the ID, self-sign if it
/// has keys, then attach the master signature.
fn issue(master: &Primary, mut serialized: SerializedCredential, keys: Option<KeySet>) -> IdentityResult<Credential> {
    serialized.master_id = Some(master.id());
    let mut credential = Credential::fresh(serialized, keys)?;
    let signature = master.sign_child(credential.serialized())?;
    credential.push_signature(signature);
    Ok(credential)
}

/// Checks shared by every child role, in the order they are reported.
fn validate_child(base: &Credential, nym_id: &Identifier, master: &Primary) -> IdentityResult<()> {
    base.check_syntax()?;
    if base.nym_id() != *nym_id {
        return Err(base.fail(Check::NymId));
    }
    if base.master_id() != Some(master.id()) {
        return Err(base.fail(Check::MasterId));
    }
    base.check_purported_id()?;
    if base.role().has_keys() {
        base.check_self_signatures()?;
    }
    if !master.verify_child(base.serialized()) {
        return Err(base.fail(Check::MasterSignature));
    }
    Ok(())
}

/// A child key credential carrying the keys used for everyday operations.
#[derive(Clone, Debug)]
pub struct Secondary {
    base: Credential,
}

impl Secondary {
    pub fn create(master: &Primary) -> IdentityResult<Self> {
        let serialized = SerializedCredential::new(CredentialRole::ChildKey, master.nym_id());
        Ok(Self {
            base: issue(master, serialized, Some(KeySet::generate()))?,
        })
    }

    pub fn base(&self) -> &Credential {
        &self.base
    }

    /// Sign with the key for `role` (`Sign` or `Auth`), gated on the
    /// matching capability.
    pub fn sign(&self, message: &[u8], role: KeyRole) -> IdentityResult<CredentialSignature> {
        let capability = match role {
            KeyRole::Sign => Capability::SignMessage,
            KeyRole::Auth => Capability::AuthenticateConnection,
            KeyRole::Encrypt => return Err(IdentityError::MissingCapability(Capability::EncryptMessage)),
        };
        self.base.sign_with(capability, role, SignatureRole::Message, message)
    }

    pub fn verify(&self, message: &[u8], signature: &CredentialSignature, role: KeyRole) -> bool {
        if signature.credential != self.base.id() {
            return false;
        }
        match self.base.keys().and_then(|k| k.verifying_key(role)) {
            Some(key) => signature.verify(&key, message),
            None => false,
        }
    }

    pub fn agree(&self, peer: &AgreementPublic) -> IdentityResult<SharedSecret> {
        if !self.base.has_capability(Capability::EncryptMessage) {
            return Err(IdentityError::MissingCapability(Capability::EncryptMessage));
        }
        let secret = self
            .base
            .keys()
            .and_then(KeySet::agreement_secret)
            .ok_or(IdentityError::MissingPrivateKey(self.base.id()))?;
        Ok(secret.agree(peer))
    }
}

/// A child credential publishing the identity's claims.
#[derive(Clone, Debug)]
pub struct ContactCredential {
    base: Credential,
}

impl ContactCredential {
    pub fn create(master: &Primary, data: ContactData) -> IdentityResult<Self> {
        let mut serialized = SerializedCredential::new(CredentialRole::Contact, master.nym_id());
        serialized.contact_data = Some(data);
        Ok(Self {
            base: issue(master, serialized, None)?,
        })
    }

    pub fn base(&self) -> &Credential {
        &self.base
    }

    pub fn contact_data(&self) -> Option<&ContactData> {
        self.base.serialized().contact_data.as_ref()
    }
}

/// A child credential publishing attestations about other identities.
#[derive(Clone, Debug)]
pub struct VerificationCredential {
    base: Credential,
}

impl VerificationCredential {
    pub fn create(master: &Primary, set: VerificationSet) -> IdentityResult<Self> {
        let mut serialized = SerializedCredential::new(CredentialRole::Verify, master.nym_id());
        serialized.verification = Some(set);
        Ok(Self {
            base: issue(master, serialized, None)?,
        })
    }

    pub fn base(&self) -> &Credential {
        &self.base
    }

    pub fn verification_set(&self) -> Option<&VerificationSet> {
        self.base.serialized().verification.as_ref()
    }
}

/// Any non-master credential.
#[derive(Clone, Debug)]
pub enum ChildCredential {
    Secondary(Secondary),
    Contact(ContactCredential),
    Verification(VerificationCredential),
}

impl ChildCredential {
    /// Parse a stored child credential, dispatching on its role.
    pub fn load(serialized: SerializedCredential) -> IdentityResult<Self> {
        let role = serialized.role;
        let base = Credential::from_serialized(serialized)?;
        match role {
            CredentialRole::ChildKey => Ok(Self::Secondary(Secondary { base })),
            CredentialRole::Contact => Ok(Self::Contact(ContactCredential { base })),
            CredentialRole::Verify => Ok(Self::Verification(VerificationCredential { base })),
            CredentialRole::MasterKey => Err(IdentityError::InvalidParameters(format!(
                "credential {} is a master credential",
                base.id()
            ))),
        }
    }

    pub fn base(&self) -> &Credential {
        match self {
            Self::Secondary(c) => &c.base,
            Self::Contact(c) => &c.base,
            Self::Verification(c) => &c.base,
        }
    }

    pub fn id(&self) -> Identifier {
        self.base().id()
    }

    pub fn role(&self) -> CredentialRole {
        self.base().role()
    }

    pub fn serialized(&self) -> &SerializedCredential {
        self.base().serialized()
    }

    pub fn as_secondary(&self) -> Option<&Secondary> {
        match self {
            Self::Secondary(c) => Some(c),
            _ => None,
        }
    }

    /// Syntax, NymID match, MasterID match, purported ID, self-signatures
    /// for key credentials, then the master signature.
    pub fn validate(&self, nym_id: &Identifier, master: &Primary) -> IdentityResult<()> {
        validate_child(self.base(), nym_id, master)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact_data::{Claim, ClaimType, SectionType};
    use crate::source::{SourceProof, SourceSecret};

    fn master() -> Primary {
        Primary::create(&SourceSecret::pubkey(SourceProof::Signature)).unwrap()
    }

    #[test]
    fn children_validate_against_their_master() {
        let master = master();
        let secondary = ChildCredential::Secondary(Secondary::create(&master).unwrap());
        let mut data = ContactData::new(master.nym_id());
        data.add_item(Claim::new(master.nym_id(), SectionType::Scope, ClaimType::Individual, "Alice"));
        let contact = ChildCredential::Contact(ContactCredential::create(&master, data).unwrap());

        for child in [&secondary, &contact] {
            child.validate(&master.nym_id(), &master).unwrap();
        }
        assert!(matches!(
            secondary.validate(&Identifier::from_hash([0; 32]), &master),
            Err(IdentityError::Verification { check: Check::NymId, .. })
        ));
    }

    #[test]
    fn other_master_fails_master_id_check() {
        let master = master();
        let stranger = Primary::create(&SourceSecret::pubkey(SourceProof::Signature)).unwrap();
        let child = ChildCredential::Secondary(Secondary::create(&master).unwrap());
        let err = child.validate(&master.nym_id(), &stranger).unwrap_err();
        assert!(matches!(err, IdentityError::Verification { check: Check::MasterId, .. }));
    }

    #[test]
    fn public_master_cannot_issue_children() {
        let master = master();
        let public = Primary::load(master.base().serialized().public_form()).unwrap();
        assert!(matches!(
            Secondary::create(&public),
            Err(IdentityError::MissingCapability(Capability::SignChildCred))
        ));
    }

    #[test]
    fn secondary_signs_and_agrees() {
        let master = master();
        let ours = Secondary::create(&master).unwrap();
        let theirs = Secondary::create(&master).unwrap();

        let signature = ours.sign(b"hello", KeyRole::Sign).unwrap();
        assert!(ours.verify(b"hello", &signature, KeyRole::Sign));
        assert!(!ours.verify(b"hello", &signature, KeyRole::Auth));
        assert!(!theirs.verify(b"hello", &signature, KeyRole::Sign));

        let a = ours.agree(&theirs.base().keys().unwrap().agreement_public()).unwrap();
        let b = theirs.agree(&ours.base().keys().unwrap().agreement_public()).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn public_secondary_lacks_capabilities() {
        let master = master();
        let secondary = Secondary::create(&master).unwrap();
        let public = ChildCredential::load(secondary.base().serialized().public_form()).unwrap();
        let public = public.as_secondary().unwrap();
        public.base().check_self_signatures().unwrap();
        assert!(matches!(
            public.sign(b"x", KeyRole::Sign),
            Err(IdentityError::MissingCapability(Capability::SignMessage))
        ));
    }
}
