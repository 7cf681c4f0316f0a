//! An identity: one NymID source and the authorities anchored to it.

use std::collections::BTreeMap;

use cairn_types::Identifier;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::authority::{Authority, AuthorityMode, NymParameters, SerializedAuthority};
use crate::contact_data::{Claim, ContactData};
use crate::credential::{Capability, CredentialSignature, KeyRole};
use crate::error::{IdentityError, IdentityResult};
use crate::source::{NymIdSource, SourceSecret};
use crate::store::CredentialStore;
use crate::verification::{VerificationItem, VerificationSet};

pub const NYM_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedNym {
    pub version: u32,
    pub nym_id: Identifier,
    pub revision: u64,
    pub source: NymIdSource,
    pub authorities: Vec<SerializedAuthority>,
}

/// An identity.
///
/// Every change to published data (claims, attestations, keys) bumps the
/// revision so that stores keep the newest copy.
#[derive(Clone, Debug)]
pub struct Nym {
    id: Identifier,
    alias: String,
    revision: u64,
    source: NymIdSource,
    authorities: BTreeMap<Identifier, Authority>,
}

impl Nym {
    /// A new identity with one authority holding one secondary credential.
    pub fn new(secret: &SourceSecret, params: &NymParameters, alias: impl Into<String>) -> IdentityResult<Self> {
        let mut authority = Authority::new(secret, params)?;
        authority.add_secondary()?;
        let nym = Self {
            id: secret.nym_id(),
            alias: alias.into(),
            revision: 1,
            source: secret.source().clone(),
            authorities: BTreeMap::from([(authority.master_cred_id(), authority)]),
        };
        info!(nym = %nym.id, alias = %nym.alias, "identity created");
        Ok(nym)
    }

    /// Rebuild from a serialized identity. Index-mode authorities fetch
    /// their credentials from `store`.
    pub fn load(
        serialized: &SerializedNym,
        alias: impl Into<String>,
        store: &dyn CredentialStore,
    ) -> IdentityResult<Self> {
        if serialized.version != NYM_VERSION {
            return Err(IdentityError::InvalidParameters(format!(
                "unsupported identity version {}",
                serialized.version
            )));
        }
        if serialized.source.nym_id() != serialized.nym_id {
            return Err(IdentityError::InvalidParameters(format!(
                "source does not derive identity {}",
                serialized.nym_id
            )));
        }
        let mut authorities = BTreeMap::new();
        for entry in &serialized.authorities {
            let authority = Authority::load(entry, store)?;
            if authority.nym_id() != serialized.nym_id {
                return Err(IdentityError::InvalidParameters(format!(
                    "authority {} belongs to {}",
                    authority.master_cred_id(),
                    authority.nym_id()
                )));
            }
            authorities.insert(authority.master_cred_id(), authority);
        }
        Ok(Self {
            id: serialized.nym_id,
            alias: alias.into(),
            revision: serialized.revision,
            source: serialized.source.clone(),
            authorities,
        })
    }

    pub fn serialize(&self, mode: AuthorityMode) -> SerializedNym {
        self.serialize_with(|authority| authority.serialize(mode))
    }

    /// Serialize for publication: private keys removed.
    pub fn serialize_public(&self, mode: AuthorityMode) -> SerializedNym {
        self.serialize_with(|authority| authority.serialize_public(mode))
    }

    fn serialize_with(&self, form: impl Fn(&Authority) -> SerializedAuthority) -> SerializedNym {
        SerializedNym {
            version: NYM_VERSION,
            nym_id: self.id,
            revision: self.revision,
            source: self.source.clone(),
            authorities: self.authorities.values().map(form).collect(),
        }
    }

    pub fn id(&self) -> Identifier {
        self.id
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn set_alias(&mut self, alias: impl Into<String>) {
        self.alias = alias.into();
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn source(&self) -> &NymIdSource {
        &self.source
    }

    pub fn authorities(&self) -> impl Iterator<Item = &Authority> {
        self.authorities.values()
    }

    pub fn authority(&self, master: &Identifier) -> Option<&Authority> {
        self.authorities.get(master)
    }

    pub fn is_private(&self) -> bool {
        self.authorities.values().any(Authority::is_private)
    }

    /// The authority that issues new child credentials.
    fn issuer(&mut self) -> IdentityResult<&mut Authority> {
        self.authorities
            .values_mut()
            .find(|authority| authority.master().base().has_capability(Capability::SignChildCred))
            .ok_or(IdentityError::MissingCapability(Capability::SignChildCred))
    }

    pub fn add_secondary(&mut self) -> IdentityResult<Identifier> {
        let id = self.issuer()?.add_secondary()?;
        self.revision += 1;
        Ok(id)
    }

    /// Claims published by every authority.
    pub fn contact_data(&self) -> Option<ContactData> {
        let mut merged: Option<ContactData> = None;
        for data in self.authorities.values().filter_map(Authority::contact_data) {
            match &mut merged {
                Some(out) => out.merge(&data),
                None => merged = Some(data),
            }
        }
        merged
    }

    /// Replace the published claims.
    pub fn set_contact_data(&mut self, data: &ContactData) -> IdentityResult<()> {
        if data.nym_id() != self.id {
            return Err(IdentityError::InvalidParameters(format!(
                "contact data belongs to {}",
                data.nym_id()
            )));
        }
        self.issuer()?.add_contact_credential(data)?;
        self.revision += 1;
        debug!(nym = %self.id, revision = self.revision, claims = data.len(), "contact data replaced");
        Ok(())
    }

    /// Publish one more claim and return its ID.
    pub fn add_claim(&mut self, claim: Claim) -> IdentityResult<Identifier> {
        let mut data = self.contact_data().unwrap_or_else(|| ContactData::new(self.id));
        let id = data.add_item(claim);
        self.set_contact_data(&data)?;
        Ok(id)
    }

    /// Withdraw a claim. Returns `false` if it was not published.
    pub fn delete_claim(&mut self, id: &Identifier) -> IdentityResult<bool> {
        let Some(mut data) = self.contact_data() else {
            return Ok(false);
        };
        if !data.delete_item(id) {
            return Ok(false);
        }
        self.set_contact_data(&data)?;
        Ok(true)
    }

    pub fn verification_set(&self) -> Option<VerificationSet> {
        self.authorities.values().find_map(Authority::verification_set)
    }

    /// Every authority, in master ID order. Fails on the first invalid one.
    pub fn verify(&self) -> IdentityResult<()> {
        if self.source.nym_id() != self.id {
            return Err(IdentityError::InvalidParameters(format!(
                "source does not derive identity {}",
                self.id
            )));
        }
        for authority in self.authorities.values() {
            if authority.master().source() != Some(&self.source) {
                warn!(nym = %self.id, master = %authority.master_cred_id(), "authority anchored to another source");
                return Err(IdentityError::InvalidParameters(format!(
                    "authority {} uses a different source",
                    authority.master_cred_id()
                )));
            }
            authority.verify()?;
        }
        Ok(())
    }

    /// Sign with the first authority able to.
    pub fn sign(&self, message: &[u8], role: KeyRole) -> IdentityResult<CredentialSignature> {
        let mut last = None;
        for authority in self.authorities.values() {
            match authority.sign(message, role, &[]) {
                Ok(signature) => return Ok(signature),
                Err(e) => last = Some(e),
            }
        }
        Err(last.unwrap_or(IdentityError::NotFound(format!("authority for {}", self.id))))
    }

    pub fn verify_message(&self, message: &[u8], signature: &CredentialSignature, role: KeyRole) -> bool {
        self.authorities
            .values()
            .any(|authority| authority.verify_message(message, signature, role))
    }

    /// Sign a statement about another identity's claim and publish it.
    pub fn attest(&mut self, claimant: Identifier, claim: Identifier, valid: bool) -> IdentityResult<VerificationItem> {
        let mut item = VerificationItem::unsigned(self.id, claimant, claim, valid);
        item.signature = Some(self.sign(&item.signing_bytes(), KeyRole::Sign)?);
        let mut set = self.verification_set().unwrap_or_else(|| VerificationSet::new(self.id));
        set.add(item.clone());
        self.issuer()?.add_verification_credential(&set)?;
        self.revision += 1;
        debug!(nym = %self.id, claimant = %claimant, claim = %claim, valid, "attestation issued");
        Ok(item)
    }

    /// Whether `item` was issued and signed by this identity.
    pub fn check_attestation(&self, item: &VerificationItem) -> bool {
        if item.verifier != self.id || !item.is_consistent() {
            return false;
        }
        match &item.signature {
            Some(signature) => self.verify_message(&item.signing_bytes(), signature, KeyRole::Sign),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact_data::{ClaimType, SectionType};
    use crate::source::SourceProof;
    use crate::store::MemoryCredentialStore;

    fn nym() -> Nym {
        Nym::new(&SourceSecret::pubkey(SourceProof::Signature), &NymParameters::default(), "alice").unwrap()
    }

    #[test]
    fn new_identity_signs_and_verifies() {
        let nym = nym();
        nym.verify().unwrap();
        let signature = nym.sign(b"payload", KeyRole::Sign).unwrap();
        assert!(nym.verify_message(b"payload", &signature, KeyRole::Sign));
        assert!(!nym.verify_message(b"other", &signature, KeyRole::Sign));
        assert_eq!(nym.revision(), 1);
    }

    #[test]
    fn claim_edits_bump_revision() {
        let mut nym = nym();
        let id = nym
            .add_claim(Claim::new(nym.id(), SectionType::Scope, ClaimType::Individual, "Alice"))
            .unwrap();
        assert_eq!(nym.revision(), 2);
        assert_eq!(nym.contact_data().unwrap().name(), Some("Alice"));

        assert!(nym.delete_claim(&id).unwrap());
        assert_eq!(nym.revision(), 3);
        assert!(nym.contact_data().unwrap().is_empty());
        assert!(!nym.delete_claim(&id).unwrap());
        assert_eq!(nym.revision(), 3);
        nym.verify().unwrap();
    }

    #[test]
    fn foreign_contact_data_is_rejected() {
        let mut nym = nym();
        let data = ContactData::new(Identifier::from_hash([9; 32]));
        assert!(matches!(nym.set_contact_data(&data), Err(IdentityError::InvalidParameters(_))));
    }

    #[test]
    fn attestations_are_checkable() {
        let mut verifier = nym();
        let mut claimant = nym();
        let claim = claimant
            .add_claim(Claim::new(claimant.id(), SectionType::Identifier, ClaimType::Email, "bob@example.com"))
            .unwrap();

        let item = verifier.attest(claimant.id(), claim, true).unwrap();
        assert!(verifier.check_attestation(&item));
        assert!(!claimant.check_attestation(&item));
        assert_eq!(verifier.verification_set().unwrap().items_for(&claimant.id()).len(), 1);

        let mut forged = item.clone();
        forged.valid = false;
        assert!(!verifier.check_attestation(&forged));
        verifier.verify().unwrap();
    }

    #[test]
    fn public_copy_verifies_messages_but_cannot_sign() {
        let nym = nym();
        let public = nym.serialize_public(AuthorityMode::Full);
        let loaded = Nym::load(&public, "alice", &MemoryCredentialStore::new()).unwrap();
        loaded.verify().unwrap();
        assert!(!loaded.is_private());
        let signature = nym.sign(b"m", KeyRole::Auth).unwrap();
        assert!(loaded.verify_message(b"m", &signature, KeyRole::Auth));
        assert!(loaded.sign(b"m", KeyRole::Auth).is_err());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut serialized = nym().serialize(AuthorityMode::Full);
        serialized.version = 99;
        assert!(Nym::load(&serialized, "", &MemoryCredentialStore::new()).is_err());
    }
}
