//! Structured claims an identity makes about itself.
//!
//! Claims are grouped by section, then by claim type. Each group has at most
//! one primary claim; the first claim added to a group becomes primary.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use cairn_crypto::ContentHasher;
use cairn_types::{Identifier, UnitType};
use serde::{Deserialize, Serialize};

pub const CONTACT_DATA_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SectionType {
    Scope,
    Identifier,
    Address,
    Communication,
    Profile,
    Relationship,
    Descriptor,
    Event,
    Contract,
    Procedure,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClaimType {
    Individual,
    Organization,
    Business,
    Government,
    Server,
    Bot,
    Name,
    Email,
    Phone,
    Url,
    Employee,
    Unit(UnitType),
    Other(String),
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit(unit) => write!(f, "unit:{unit}"),
            Self::Other(name) => write!(f, "other:{name}"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClaimAttribute {
    Active,
    Primary,
    Local,
}

/// A single statement, e.g. "my email is ...".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub nym_id: Identifier,
    pub section: SectionType,
    pub kind: ClaimType,
    pub value: String,
    /// Validity window in unix seconds; zero means unbounded.
    pub start: u64,
    pub end: u64,
    pub attributes: BTreeSet<ClaimAttribute>,
}

impl Claim {
    /// An active claim with an unbounded validity window.
    pub fn new(nym_id: Identifier, section: SectionType, kind: ClaimType, value: impl Into<String>) -> Self {
        Self {
            nym_id,
            section,
            kind,
            value: value.into(),
            start: 0,
            end: 0,
            attributes: BTreeSet::from([ClaimAttribute::Active]),
        }
    }

    pub fn with_attribute(mut self, attribute: ClaimAttribute) -> Self {
        self.attributes.insert(attribute);
        self
    }

    /// Derived from everything except the attributes, so marking a claim
    /// primary or inactive keeps its ID.
    pub fn id(&self) -> Identifier {
        let mut data = Vec::with_capacity(96 + self.value.len());
        data.extend_from_slice(self.nym_id.as_bytes());
        data.push(self.section as u8);
        data.extend_from_slice(self.kind.to_string().as_bytes());
        data.push(0);
        data.extend_from_slice(&self.start.to_be_bytes());
        data.extend_from_slice(&self.end.to_be_bytes());
        data.extend_from_slice(self.value.as_bytes());
        ContentHasher::CLAIM.identifier(&data)
    }

    pub fn is_primary(&self) -> bool {
        self.attributes.contains(&ClaimAttribute::Primary)
    }

    pub fn is_active(&self) -> bool {
        self.attributes.contains(&ClaimAttribute::Active)
    }
}

/// Claims of one type within a section.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactGroup {
    items: BTreeMap<Identifier, Claim>,
}

impl ContactGroup {
    pub fn primary(&self) -> Option<&Claim> {
        self.items.values().find(|claim| claim.is_primary())
    }

    pub fn claims(&self) -> impl Iterator<Item = &Claim> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn demote_all(&mut self) {
        for claim in self.items.values_mut() {
            claim.attributes.remove(&ClaimAttribute::Primary);
        }
    }

    fn promote_first(&mut self) {
        if self.primary().is_none() {
            if let Some(claim) = self.items.values_mut().next() {
                claim.attributes.insert(ClaimAttribute::Primary);
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSection {
    groups: BTreeMap<ClaimType, ContactGroup>,
}

impl ContactSection {
    pub fn group(&self, kind: &ClaimType) -> Option<&ContactGroup> {
        self.groups.get(kind)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&ClaimType, &ContactGroup)> {
        self.groups.iter()
    }
}

/// Every claim an identity publishes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactData {
    nym_id: Identifier,
    version: u32,
    sections: BTreeMap<SectionType, ContactSection>,
}

impl ContactData {
    pub fn new(nym_id: Identifier) -> Self {
        Self {
            nym_id,
            version: CONTACT_DATA_VERSION,
            sections: BTreeMap::new(),
        }
    }

    pub fn nym_id(&self) -> Identifier {
        self.nym_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Add or replace a claim and return its ID.
    ///
    /// The claim is rebound to this identity. A primary claim demotes the
    /// group's previous primary; a claim added to an empty group becomes
    /// primary.
    pub fn add_item(&mut self, mut claim: Claim) -> Identifier {
        claim.nym_id = self.nym_id;
        let id = claim.id();
        let group = self
            .sections
            .entry(claim.section)
            .or_default()
            .groups
            .entry(claim.kind.clone())
            .or_default();
        if claim.is_primary() {
            group.demote_all();
        }
        group.items.insert(id, claim);
        group.promote_first();
        id
    }

    /// Remove a claim. The first remaining claim of its group is promoted
    /// if the primary was removed.
    pub fn delete_item(&mut self, id: &Identifier) -> bool {
        let mut removed = false;
        for section in self.sections.values_mut() {
            for group in section.groups.values_mut() {
                if group.items.remove(id).is_some() {
                    group.promote_first();
                    removed = true;
                }
            }
            section.groups.retain(|_, group| !group.is_empty());
        }
        self.sections.retain(|_, section| !section.groups.is_empty());
        removed
    }

    /// Add every claim of `other` not already present. Primary flags from
    /// `other` only apply to groups that have no primary here.
    pub fn merge(&mut self, other: &ContactData) {
        for claim in other.claims() {
            let mut claim = claim.clone();
            claim.nym_id = self.nym_id;
            if self.claim(&claim.id()).is_some() {
                continue;
            }
            if self.primary(claim.section, &claim.kind).is_some() {
                claim.attributes.remove(&ClaimAttribute::Primary);
            }
            self.add_item(claim);
        }
    }

    pub fn claim(&self, id: &Identifier) -> Option<&Claim> {
        self.claims().find(|claim| claim.id() == *id)
    }

    pub fn claims(&self) -> impl Iterator<Item = &Claim> {
        self.sections
            .values()
            .flat_map(|section| section.groups.values())
            .flat_map(|group| group.items.values())
    }

    pub fn claims_in(&self, section: SectionType) -> Vec<&Claim> {
        self.sections
            .get(&section)
            .map(|s| s.groups.values().flat_map(|g| g.items.values()).collect())
            .unwrap_or_default()
    }

    pub fn section(&self, section: SectionType) -> Option<&ContactSection> {
        self.sections.get(&section)
    }

    pub fn primary(&self, section: SectionType, kind: &ClaimType) -> Option<&Claim> {
        self.sections.get(&section)?.group(kind)?.primary()
    }

    /// Value of the primary scope claim.
    pub fn name(&self) -> Option<&str> {
        let scope = self.sections.get(&SectionType::Scope)?;
        scope
            .groups
            .values()
            .find_map(|group| group.primary())
            .map(|claim| claim.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.claims().count()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn nym() -> Identifier {
        Identifier::from_hash([9; 32])
    }

    fn email(value: &str) -> Claim {
        Claim::new(nym(), SectionType::Communication, ClaimType::Email, value)
    }

    #[test]
    fn claim_id_ignores_attributes() {
        let plain = email("a@example.com");
        let primary = plain.clone().with_attribute(ClaimAttribute::Primary);
        assert_eq!(plain.id(), primary.id());
        assert_ne!(plain.id(), email("b@example.com").id());
    }

    #[test]
    fn first_claim_in_group_becomes_primary() {
        let mut data = ContactData::new(nym());
        let first = data.add_item(email("a@example.com"));
        let second = data.add_item(email("b@example.com"));
        let primary = data.primary(SectionType::Communication, &ClaimType::Email).unwrap();
        assert_eq!(primary.id(), first);
        assert!(!data.claim(&second).unwrap().is_primary());
    }

    #[test]
    fn new_primary_demotes_old_one() {
        let mut data = ContactData::new(nym());
        let first = data.add_item(email("a@example.com"));
        let second = data.add_item(email("b@example.com").with_attribute(ClaimAttribute::Primary));
        assert!(!data.claim(&first).unwrap().is_primary());
        assert!(data.claim(&second).unwrap().is_primary());
    }

    #[test]
    fn deleting_primary_promotes_remaining_claim() {
        let mut data = ContactData::new(nym());
        let first = data.add_item(email("a@example.com"));
        let second = data.add_item(email("b@example.com"));
        assert!(data.delete_item(&first));
        assert!(!data.delete_item(&first));
        assert!(data.claim(&second).unwrap().is_primary());
        assert!(data.delete_item(&second));
        assert!(data.is_empty());
    }

    #[test]
    fn merge_keeps_existing_primary() {
        let mut ours = ContactData::new(nym());
        let kept = ours.add_item(email("a@example.com"));
        let mut theirs = ContactData::new(Identifier::from_hash([1; 32]));
        theirs.add_item(email("b@example.com").with_attribute(ClaimAttribute::Primary));
        theirs.add_item(Claim::new(nym(), SectionType::Scope, ClaimType::Individual, "Alice"));

        ours.merge(&theirs);
        assert_eq!(ours.len(), 3);
        assert_eq!(ours.primary(SectionType::Communication, &ClaimType::Email).unwrap().id(), kept);
        assert_eq!(ours.name(), Some("Alice"));
        assert!(ours.claims().all(|claim| claim.nym_id == nym()));
    }

    #[test]
    fn claims_in_filters_by_section() {
        let mut data = ContactData::new(nym());
        data.add_item(email("a@example.com"));
        data.add_item(Claim::new(nym(), SectionType::Contract, ClaimType::Unit(UnitType::Btc), "v"));
        let contracts = data.claims_in(SectionType::Contract);
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].value, "v");
        assert!(data.claims_in(SectionType::Event).is_empty());
    }

    proptest! {
        #[test]
        fn every_group_keeps_exactly_one_primary(values in proptest::collection::vec("[a-z]{1,8}", 1..12)) {
            let mut data = ContactData::new(nym());
            let ids: Vec<_> = values.iter().map(|v| data.add_item(email(v))).collect();
            for id in ids.iter().step_by(2) {
                data.delete_item(id);
                if let Some(section) = data.section(SectionType::Communication) {
                    for (_, group) in section.groups() {
                        prop_assert_eq!(group.claims().filter(|c| c.is_primary()).count(), 1);
                    }
                }
            }
        }
    }
}
