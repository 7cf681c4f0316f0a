//! One master credential plus the child credentials it signed.

use std::collections::{BTreeMap, BTreeSet};

use cairn_crypto::{AgreementPublic, SharedSecret};
use cairn_types::Identifier;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::contact_data::ContactData;
use crate::credential::{
    Capability, ChildCredential, ContactCredential, CredentialRole, CredentialSignature, KeyRole, Primary,
    SerializedCredential, Secondary, VerificationCredential,
};
use crate::error::{Check, IdentityError, IdentityResult};
use crate::source::{SourceProof, SourceSecret, SourceType};
use crate::store::CredentialStore;
use crate::verification::VerificationSet;

pub const AUTHORITY_VERSION: u32 = 1;

/// How credentials are embedded in a serialized authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorityMode {
    /// Only IDs; credentials are fetched from a [`CredentialStore`].
    Index,
    /// Full credentials inline.
    Full,
}

/// Parameters for a new identity.
#[derive(Clone, Debug)]
pub struct NymParameters {
    pub source_type: SourceType,
    pub proof: SourceProof,
    pub contact_data: Option<ContactData>,
    pub verification: Option<VerificationSet>,
}

impl Default for NymParameters {
    fn default() -> Self {
        Self {
            source_type: SourceType::Pubkey,
            proof: SourceProof::Signature,
            contact_data: None,
            verification: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntry {
    pub role: CredentialRole,
    pub id: Identifier,
    /// Present in full mode.
    pub credential: Option<SerializedCredential>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedAuthority {
    pub version: u32,
    pub nym_id: Identifier,
    pub mode: AuthorityMode,
    pub master_id: Identifier,
    /// Present in full mode.
    pub master: Option<SerializedCredential>,
    pub children: Vec<ChildEntry>,
    pub revoked: Vec<ChildEntry>,
}

/// The credential set of one master.
///
/// Child credentials are kept in ID order. Key lookups take the first
/// secondary that is not in the caller's revocation list and can perform the
/// operation; the master's own keys are never used for messages.
#[derive(Clone, Debug)]
pub struct Authority {
    nym_id: Identifier,
    master: Primary,
    children: BTreeMap<Identifier, ChildCredential>,
    revoked: BTreeMap<Identifier, ChildCredential>,
}

impl Authority {
    /// Create a master credential from `secret`, plus contact and
    /// verification credentials if `params` carries them.
    pub fn new(secret: &SourceSecret, params: &NymParameters) -> IdentityResult<Self> {
        if secret.source().source_type() != params.source_type {
            return Err(IdentityError::InvalidParameters(format!(
                "secret is a {:?} source, parameters ask for {:?}",
                secret.source().source_type(),
                params.source_type
            )));
        }
        let master = Primary::create(secret)?;
        let mut authority = Self {
            nym_id: master.nym_id(),
            master,
            children: BTreeMap::new(),
            revoked: BTreeMap::new(),
        };
        if let Some(data) = &params.contact_data {
            authority.add_contact_credential(data)?;
        }
        if let Some(set) = &params.verification {
            authority.add_verification_credential(set)?;
        }
        Ok(authority)
    }

    /// Rebuild from a serialized authority. Index-mode entries are fetched
    /// from `store`. Nothing is re-signed and nothing is verified; call
    /// [`Authority::verify`] for that.
    pub fn load(serialized: &SerializedAuthority, store: &dyn CredentialStore) -> IdentityResult<Self> {
        let master = Primary::load(fetch(
            serialized.master.as_ref(),
            &serialized.master_id,
            store,
        )?)?;
        if master.id() != serialized.master_id {
            return Err(IdentityError::InvalidParameters(format!(
                "authority names master {} but holds {}",
                serialized.master_id,
                master.id()
            )));
        }
        let load_children = |entries: &[ChildEntry]| -> IdentityResult<BTreeMap<Identifier, ChildCredential>> {
            let mut out = BTreeMap::new();
            for entry in entries {
                let child = ChildCredential::load(fetch(entry.credential.as_ref(), &entry.id, store)?)?;
                out.insert(entry.id, child);
            }
            Ok(out)
        };
        Ok(Self {
            nym_id: serialized.nym_id,
            master,
            children: load_children(&serialized.children)?,
            revoked: load_children(&serialized.revoked)?,
        })
    }

    /// Serialize with private keys where they are held.
    pub fn serialize(&self, mode: AuthorityMode) -> SerializedAuthority {
        self.serialize_with(mode, |c| c.clone())
    }

    /// Serialize for sharing: private keys removed.
    pub fn serialize_public(&self, mode: AuthorityMode) -> SerializedAuthority {
        self.serialize_with(mode, SerializedCredential::public_form)
    }

    fn serialize_with(
        &self,
        mode: AuthorityMode,
        form: impl Fn(&SerializedCredential) -> SerializedCredential,
    ) -> SerializedAuthority {
        let full = mode == AuthorityMode::Full;
        let entries = |map: &BTreeMap<Identifier, ChildCredential>| -> Vec<ChildEntry> {
            map.values()
                .map(|child| ChildEntry {
                    role: child.role(),
                    id: child.id(),
                    credential: full.then(|| form(child.serialized())),
                })
                .collect()
        };
        SerializedAuthority {
            version: AUTHORITY_VERSION,
            nym_id: self.nym_id,
            mode,
            master_id: self.master.id(),
            master: full.then(|| form(self.master.base().serialized())),
            children: entries(&self.children),
            revoked: entries(&self.revoked),
        }
    }

    /// Every credential in full form, for persisting alongside an
    /// index-mode serialization.
    pub fn credentials(&self) -> Vec<SerializedCredential> {
        std::iter::once(self.master.base().serialized())
            .chain(self.children.values().map(ChildCredential::serialized))
            .chain(self.revoked.values().map(ChildCredential::serialized))
            .cloned()
            .collect()
    }

    pub fn nym_id(&self) -> Identifier {
        self.nym_id
    }

    pub fn master_cred_id(&self) -> Identifier {
        self.master.id()
    }

    pub fn master(&self) -> &Primary {
        &self.master
    }

    pub fn children(&self) -> impl Iterator<Item = &ChildCredential> {
        self.children.values()
    }

    pub fn child(&self, id: &Identifier) -> Option<&ChildCredential> {
        self.children.get(id)
    }

    pub fn is_private(&self) -> bool {
        self.master.base().is_private()
    }

    fn insert(&mut self, child: ChildCredential) -> Identifier {
        let id = child.id();
        debug!(nym = %self.nym_id, credential = %id, role = ?child.role(), "child credential added");
        self.children.insert(id, child);
        id
    }

    pub fn add_secondary(&mut self) -> IdentityResult<Identifier> {
        let child = Secondary::create(&self.master)?;
        Ok(self.insert(ChildCredential::Secondary(child)))
    }

    /// Publish `data`, revoking any previous contact credential.
    pub fn add_contact_credential(&mut self, data: &ContactData) -> IdentityResult<Identifier> {
        let child = ContactCredential::create(&self.master, data.clone())?;
        self.revoke_role(CredentialRole::Contact);
        Ok(self.insert(ChildCredential::Contact(child)))
    }

    /// Publish `set`, revoking any previous verification credential.
    pub fn add_verification_credential(&mut self, set: &VerificationSet) -> IdentityResult<Identifier> {
        let child = VerificationCredential::create(&self.master, set.clone())?;
        self.revoke_role(CredentialRole::Verify);
        Ok(self.insert(ChildCredential::Verification(child)))
    }

    fn revoke_role(&mut self, role: CredentialRole) {
        let ids: Vec<_> = self
            .children
            .values()
            .filter(|child| child.role() == role)
            .map(ChildCredential::id)
            .collect();
        for id in ids {
            self.revoke_child(&id);
        }
    }

    /// Move a child credential to the revoked set.
    pub fn revoke_child(&mut self, id: &Identifier) -> bool {
        match self.children.remove(id) {
            Some(child) => {
                debug!(nym = %self.nym_id, credential = %id, "child credential revoked");
                self.revoked.insert(*id, child);
                true
            }
            None => false,
        }
    }

    /// The first failure, if any: the master first, then each child in ID
    /// order.
    pub fn verify(&self) -> IdentityResult<()> {
        if self.master.nym_id() != self.nym_id {
            return Err(self.master.base().fail(Check::NymId));
        }
        self.master.validate()?;
        for child in self.children.values() {
            child.validate(&self.nym_id, &self.master)?;
        }
        Ok(())
    }

    pub fn verify_internally(&self) -> bool {
        match self.verify() {
            Ok(()) => true,
            Err(e) => {
                warn!(nym = %self.nym_id, master = %self.master.id(), error = %e, "authority failed verification");
                false
            }
        }
    }

    /// Claims from every active contact credential.
    pub fn contact_data(&self) -> Option<ContactData> {
        let mut merged: Option<ContactData> = None;
        for child in self.children.values() {
            if let ChildCredential::Contact(contact) = child {
                if let Some(data) = contact.contact_data() {
                    match &mut merged {
                        Some(out) => out.merge(data),
                        None => merged = Some(data.clone()),
                    }
                }
            }
        }
        merged
    }

    pub fn verification_set(&self) -> Option<VerificationSet> {
        self.children.values().find_map(|child| match child {
            ChildCredential::Verification(v) => v.verification_set().cloned(),
            _ => None,
        })
    }

    fn secondaries<'a>(&'a self, revoked: &'a [Identifier]) -> impl Iterator<Item = &'a Secondary> + 'a {
        self.children
            .values()
            .filter(move |child| !revoked.contains(&child.id()))
            .filter_map(ChildCredential::as_secondary)
    }

    /// Sign with the first usable secondary.
    pub fn sign(&self, message: &[u8], role: KeyRole, revoked: &[Identifier]) -> IdentityResult<CredentialSignature> {
        let capability = match role {
            KeyRole::Sign => Capability::SignMessage,
            KeyRole::Auth => Capability::AuthenticateConnection,
            KeyRole::Encrypt => Capability::EncryptMessage,
        };
        self.secondaries(revoked)
            .find(|s| s.base().has_capability(capability))
            .ok_or(IdentityError::MissingCapability(capability))?
            .sign(message, role)
    }

    /// Verify a message signature made by one of this authority's active
    /// secondaries.
    pub fn verify_message(&self, message: &[u8], signature: &CredentialSignature, role: KeyRole) -> bool {
        match self.children.get(&signature.credential).and_then(ChildCredential::as_secondary) {
            Some(secondary) => secondary.verify(message, signature, role),
            None => false,
        }
    }

    /// Public key bytes for `role` from the first secondary not in `revoked`.
    pub fn public_key(&self, role: KeyRole, revoked: &[Identifier]) -> Option<[u8; 32]> {
        self.secondaries(revoked)
            .find_map(|s| s.base().keys().map(|keys| keys.public_bytes(role)))
    }

    /// Key agreement with the first secondary able to decrypt.
    pub fn agree(&self, peer: &AgreementPublic, revoked: &[Identifier]) -> IdentityResult<SharedSecret> {
        self.secondaries(revoked)
            .find(|s| s.base().has_capability(Capability::EncryptMessage))
            .ok_or(IdentityError::MissingCapability(Capability::EncryptMessage))?
            .agree(peer)
    }

    /// IDs of the revoked children.
    pub fn revoked(&self) -> BTreeSet<Identifier> {
        self.revoked.keys().copied().collect()
    }
}

fn fetch(
    inline: Option<&SerializedCredential>,
    id: &Identifier,
    store: &dyn CredentialStore,
) -> IdentityResult<SerializedCredential> {
    match inline {
        Some(credential) => Ok(credential.clone()),
        None => store
            .load_credential(id)?
            .ok_or_else(|| IdentityError::NotFound(format!("credential {id}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact_data::{Claim, ClaimType, SectionType};
    use crate::store::MemoryCredentialStore;

    fn authority() -> Authority {
        let secret = SourceSecret::pubkey(SourceProof::Signature);
        Authority::new(&secret, &NymParameters::default()).unwrap()
    }

    #[test]
    fn fresh_authority_verifies() {
        let mut authority = authority();
        authority.add_secondary().unwrap();
        assert!(authority.verify_internally());
        assert!(authority.is_private());
    }

    #[test]
    fn no_secondary_means_no_message_signing() {
        let authority = authority();
        assert!(matches!(
            authority.sign(b"m", KeyRole::Sign, &[]),
            Err(IdentityError::MissingCapability(Capability::SignMessage))
        ));
        assert!(authority.public_key(KeyRole::Sign, &[]).is_none());
    }

    #[test]
    fn first_unrevoked_secondary_signs() {
        let mut authority = authority();
        let a = authority.add_secondary().unwrap();
        let b = authority.add_secondary().unwrap();
        let (first, second) = if a < b { (a, b) } else { (b, a) };

        let signature = authority.sign(b"m", KeyRole::Sign, &[]).unwrap();
        assert_eq!(signature.credential, first);
        let signature = authority.sign(b"m", KeyRole::Sign, &[first]).unwrap();
        assert_eq!(signature.credential, second);
        assert!(authority.verify_message(b"m", &signature, KeyRole::Sign));
        assert!(authority.sign(b"m", KeyRole::Sign, &[first, second]).is_err());
    }

    #[test]
    fn revoked_secondary_no_longer_verifies_messages() {
        let mut authority = authority();
        let id = authority.add_secondary().unwrap();
        let signature = authority.sign(b"m", KeyRole::Auth, &[]).unwrap();
        assert!(authority.verify_message(b"m", &signature, KeyRole::Auth));
        assert!(authority.revoke_child(&id));
        assert!(!authority.verify_message(b"m", &signature, KeyRole::Auth));
        assert_eq!(authority.revoked(), BTreeSet::from([id]));
    }

    #[test]
    fn agreement_between_authorities() {
        let mut ours = authority();
        let mut theirs = authority();
        ours.add_secondary().unwrap();
        theirs.add_secondary().unwrap();
        let their_key = AgreementPublic::from_bytes(theirs.public_key(KeyRole::Encrypt, &[]).unwrap());
        let our_key = AgreementPublic::from_bytes(ours.public_key(KeyRole::Encrypt, &[]).unwrap());
        let a = ours.agree(&their_key, &[]).unwrap();
        let b = theirs.agree(&our_key, &[]).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn new_contact_credential_replaces_old_one() {
        let mut authority = authority();
        let nym = authority.nym_id();
        let mut data = ContactData::new(nym);
        data.add_item(Claim::new(nym, SectionType::Scope, ClaimType::Individual, "Alice"));
        let first = authority.add_contact_credential(&data).unwrap();
        data.add_item(Claim::new(nym, SectionType::Communication, ClaimType::Email, "a@example.com"));
        authority.add_contact_credential(&data).unwrap();

        assert!(authority.revoked().contains(&first));
        assert_eq!(authority.contact_data().unwrap().len(), 2);
        assert!(authority.verify_internally());
    }

    #[test]
    fn full_mode_round_trip_keeps_ids() {
        let mut authority = authority();
        authority.add_secondary().unwrap();
        let serialized = authority.serialize(AuthorityMode::Full);
        let loaded = Authority::load(&serialized, &MemoryCredentialStore::default()).unwrap();
        assert_eq!(loaded.master_cred_id(), authority.master_cred_id());
        assert_eq!(loaded.serialize(AuthorityMode::Full), serialized);
        assert!(loaded.verify_internally());
        assert!(loaded.is_private());
    }

    #[test]
    fn public_serialization_verifies_but_cannot_sign() {
        let mut authority = authority();
        authority.add_secondary().unwrap();
        let public = authority.serialize_public(AuthorityMode::Full);
        let loaded = Authority::load(&public, &MemoryCredentialStore::default()).unwrap();
        assert!(loaded.verify_internally());
        assert!(!loaded.is_private());
        assert!(loaded.sign(b"m", KeyRole::Sign, &[]).is_err());
        let signature = authority.sign(b"m", KeyRole::Sign, &[]).unwrap();
        assert!(loaded.verify_message(b"m", &signature, KeyRole::Sign));
    }

    #[test]
    fn index_mode_needs_the_store() {
        let mut authority = authority();
        authority.add_secondary().unwrap();
        let serialized = authority.serialize(AuthorityMode::Index);
        assert!(serialized.master.is_none());
        assert!(matches!(
            Authority::load(&serialized, &MemoryCredentialStore::default()),
            Err(IdentityError::NotFound(_))
        ));
    }

    #[test]
    fn mismatched_nym_fails_verification() {
        let authority = authority();
        let mut serialized = authority.serialize(AuthorityMode::Full);
        serialized.nym_id = Identifier::from_hash([7; 32]);
        let loaded = Authority::load(&serialized, &MemoryCredentialStore::default()).unwrap();
        assert!(matches!(
            loaded.verify(),
            Err(IdentityError::Verification { check: Check::NymId, .. })
        ));
    }
}
