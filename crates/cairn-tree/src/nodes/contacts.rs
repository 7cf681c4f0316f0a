//! Address-book contacts with merge tracking.

use std::collections::{BTreeMap, BTreeSet};

use cairn_store::StoreResult;
use serde::{Deserialize, Serialize};

use crate::editor::editor_methods;
use crate::node::{ItemMap, Node, NodeContext, NodeKind, Revisioned};

/// A stored contact.
///
/// `merged` lists contacts that were folded into this one. `nyms` lists the
/// identities known to belong to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: String,
    pub revision: u64,
    pub label: String,
    pub merged: Vec<String>,
    pub nyms: Vec<String>,
    pub data: Vec<u8>,
}

impl Revisioned for ContactRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactIndexRecord {
    /// parent contact -> contacts merged into it
    pub merge: BTreeMap<String, BTreeSet<String>>,
    /// contact -> nyms it owns
    pub nyms: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Default)]
pub struct Contacts {
    merge: BTreeMap<String, BTreeSet<String>>,
    merged_into: BTreeMap<String, String>,
    nyms: BTreeMap<String, BTreeSet<String>>,
    nym_owner: BTreeMap<String, String>,
}

impl Contacts {
    fn index(&mut self, record: &ContactRecord) {
        for child in &record.merged {
            self.merge.entry(record.id.clone()).or_default().insert(child.clone());
            self.merged_into.insert(child.clone(), record.id.clone());
        }
        for nym in &record.nyms {
            if let Some(previous) = self.nym_owner.insert(nym.clone(), record.id.clone()) {
                if previous != record.id {
                    if let Some(set) = self.nyms.get_mut(&previous) {
                        set.remove(nym);
                    }
                }
            }
            self.nyms.entry(record.id.clone()).or_default().insert(nym.clone());
        }
    }

    fn unindex(&mut self, id: &str) {
        if let Some(children) = self.merge.remove(id) {
            for child in children {
                self.merged_into.remove(&child);
            }
        }
        self.merged_into.remove(id);
        for set in self.merge.values_mut() {
            set.remove(id);
        }
        if let Some(nyms) = self.nyms.remove(id) {
            for nym in nyms {
                self.nym_owner.remove(&nym);
            }
        }
    }

    fn rebuild(&mut self) {
        self.merged_into = self
            .merge
            .iter()
            .flat_map(|(parent, children)| children.iter().map(move |c| (c.clone(), parent.clone())))
            .collect();
        self.nym_owner = self
            .nyms
            .iter()
            .flat_map(|(contact, nyms)| nyms.iter().map(move |n| (n.clone(), contact.clone())))
            .collect();
    }
}

impl NodeKind for Contacts {
    const NAME: &'static str = "contacts";
    const VERSION: u32 = 2;
    type Index = ContactIndexRecord;

    fn load_index(&mut self, _ctx: &NodeContext, index: ContactIndexRecord, _items: &mut ItemMap) -> StoreResult<()> {
        self.merge = index.merge;
        self.nyms = index.nyms;
        self.rebuild();
        Ok(())
    }

    fn save_index(&self, items: &ItemMap) -> ContactIndexRecord {
        let keep = |map: &BTreeMap<String, BTreeSet<String>>| -> BTreeMap<String, BTreeSet<String>> {
            map.iter()
                .filter(|(id, set)| items.contains_key(*id) && !set.is_empty())
                .map(|(id, set)| (id.clone(), set.clone()))
                .collect()
        };
        ContactIndexRecord {
            merge: keep(&self.merge),
            nyms: keep(&self.nyms),
        }
    }

    fn is_empty(&self) -> bool {
        self.merge.is_empty() && self.nyms.is_empty()
    }
}

impl Node<Contacts> {
    /// Store a contact; a revision not newer than the stored one is ignored.
    pub(crate) fn store(&self, record: &ContactRecord) -> StoreResult<bool> {
        let label = record.label.clone();
        self.store_revisioned(record, &label, |contacts, record| contacts.index(record))
    }

    /// Load a contact, following merges to the surviving contact.
    pub fn load(&self, id: &str, checking: bool) -> StoreResult<Option<(ContactRecord, String)>> {
        let id = self.resolve(id);
        self.load_record(&id, checking)
    }

    /// The contact `id` was ultimately merged into, or `id` itself.
    pub fn resolve(&self, id: &str) -> String {
        let state = self.lock();
        let mut current = id.to_string();
        let mut seen = BTreeSet::new();
        while let Some(parent) = state.kind.merged_into.get(&current) {
            if !seen.insert(current.clone()) {
                break;
            }
            current = parent.clone();
        }
        current
    }

    pub fn merged_into(&self, id: &str) -> Option<String> {
        self.lock().kind.merged_into.get(id).cloned()
    }

    /// The contact that claims `nym`.
    pub fn contact_owner_nym(&self, nym: &str) -> Option<String> {
        self.lock().kind.nym_owner.get(nym).cloned()
    }

    pub(crate) fn delete(&self, id: &str) -> StoreResult<bool> {
        self.delete_with(id, |contacts, id| contacts.unindex(id))
    }
}

editor_methods! {
    impl Contacts {
        fn store(&self, record: &ContactRecord) -> StoreResult<bool>;
        fn delete(&self, id: &str) -> StoreResult<bool>;
    }
}
