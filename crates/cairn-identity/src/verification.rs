//! Attestations one identity makes about another identity's claims.

use std::collections::BTreeMap;

use cairn_crypto::ContentHasher;
use cairn_types::Identifier;
use serde::{Deserialize, Serialize};

use crate::credential::CredentialSignature;

pub const VERIFICATION_SET_VERSION: u32 = 1;

const VERIFICATION: ContentHasher = ContentHasher::new("cairn-verification-v1");

/// A signed statement that a claim is (or is not) valid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationItem {
    pub id: Identifier,
    pub verifier: Identifier,
    pub claimant: Identifier,
    pub claim: Identifier,
    pub valid: bool,
    pub start: u64,
    pub end: u64,
    pub signature: Option<CredentialSignature>,
}

impl VerificationItem {
    pub(crate) fn unsigned(verifier: Identifier, claimant: Identifier, claim: Identifier, valid: bool) -> Self {
        let mut item = Self {
            id: Identifier::empty(),
            verifier,
            claimant,
            claim,
            valid,
            start: 0,
            end: 0,
            signature: None,
        };
        item.id = VERIFICATION.identifier(&item.signing_bytes());
        item
    }

    /// The bytes the verifier signs. Excludes the ID and the signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(113);
        data.extend_from_slice(self.verifier.as_bytes());
        data.extend_from_slice(self.claimant.as_bytes());
        data.extend_from_slice(self.claim.as_bytes());
        data.push(u8::from(self.valid));
        data.extend_from_slice(&self.start.to_be_bytes());
        data.extend_from_slice(&self.end.to_be_bytes());
        data
    }

    /// Whether the ID matches the content. Says nothing about the signature.
    pub fn is_consistent(&self) -> bool {
        VERIFICATION.identifier(&self.signing_bytes()) == self.id
    }
}

/// Attestations issued by one identity, grouped by the identity they are
/// about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSet {
    nym_id: Identifier,
    version: u32,
    issued: BTreeMap<Identifier, BTreeMap<Identifier, VerificationItem>>,
}

impl VerificationSet {
    pub fn new(nym_id: Identifier) -> Self {
        Self {
            nym_id,
            version: VERIFICATION_SET_VERSION,
            issued: BTreeMap::new(),
        }
    }

    pub fn nym_id(&self) -> Identifier {
        self.nym_id
    }

    /// Returns `false` if the item was not issued by this set's owner.
    pub fn add(&mut self, item: VerificationItem) -> bool {
        if item.verifier != self.nym_id {
            return false;
        }
        self.issued.entry(item.claimant).or_default().insert(item.id, item);
        true
    }

    pub fn delete(&mut self, id: &Identifier) -> bool {
        let mut removed = false;
        for items in self.issued.values_mut() {
            removed |= items.remove(id).is_some();
        }
        self.issued.retain(|_, items| !items.is_empty());
        removed
    }

    pub fn item(&self, id: &Identifier) -> Option<&VerificationItem> {
        self.issued.values().find_map(|items| items.get(id))
    }

    pub fn items_for(&self, claimant: &Identifier) -> Vec<&VerificationItem> {
        self.issued
            .get(claimant)
            .map(|items| items.values().collect())
            .unwrap_or_default()
    }

    pub fn items(&self) -> impl Iterator<Item = &VerificationItem> {
        self.issued.values().flat_map(|items| items.values())
    }

    pub fn len(&self) -> usize {
        self.items().count()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> Identifier {
        Identifier::from_hash([byte; 32])
    }

    #[test]
    fn items_are_grouped_by_claimant() {
        let mut set = VerificationSet::new(id(1));
        let a = VerificationItem::unsigned(id(1), id(2), id(10), true);
        let b = VerificationItem::unsigned(id(1), id(3), id(11), false);
        assert!(set.add(a.clone()));
        assert!(set.add(b));
        assert!(!set.add(VerificationItem::unsigned(id(4), id(2), id(12), true)));

        assert_eq!(set.items_for(&id(2)), vec![&a]);
        assert_eq!(set.len(), 2);
        assert!(set.delete(&a.id));
        assert!(set.items_for(&id(2)).is_empty());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn tampering_breaks_consistency() {
        let mut item = VerificationItem::unsigned(id(1), id(2), id(10), true);
        assert!(item.is_consistent());
        item.valid = false;
        assert!(!item.is_consistent());
    }
}
