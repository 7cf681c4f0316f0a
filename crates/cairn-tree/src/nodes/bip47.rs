//! Payment-code channels between a local nym and one contact.

use std::collections::{BTreeMap, BTreeSet};

use cairn_store::StoreResult;
use cairn_types::UnitType;
use serde::{Deserialize, Serialize};

use crate::editor::editor_methods;
use crate::node::{ItemMap, Node, NodeContext, NodeKind};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: String,
    pub contact: String,
    pub chain: UnitType,
    pub local_payment_code: String,
    pub remote_payment_code: String,
    /// Addresses derived for this channel in either direction.
    pub addresses: Vec<String>,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub contact: String,
    pub chain: UnitType,
    pub addresses: BTreeSet<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelIndexRecord {
    pub channels: BTreeMap<String, ChannelEntry>,
}

#[derive(Default)]
pub struct Bip47Channels {
    entries: BTreeMap<String, ChannelEntry>,
    by_contact: BTreeMap<String, BTreeSet<String>>,
    by_chain: BTreeMap<UnitType, BTreeSet<String>>,
    by_address: BTreeMap<String, String>,
}

impl Bip47Channels {
    fn insert(&mut self, id: &str, entry: ChannelEntry) {
        self.remove(id);
        self.by_contact
            .entry(entry.contact.clone())
            .or_default()
            .insert(id.to_string());
        self.by_chain.entry(entry.chain).or_default().insert(id.to_string());
        for address in &entry.addresses {
            self.by_address.insert(address.clone(), id.to_string());
        }
        self.entries.insert(id.to_string(), entry);
    }

    fn remove(&mut self, id: &str) {
        let Some(old) = self.entries.remove(id) else {
            return;
        };
        if let Some(ids) = self.by_contact.get_mut(&old.contact) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_contact.remove(&old.contact);
            }
        }
        if let Some(ids) = self.by_chain.get_mut(&old.chain) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_chain.remove(&old.chain);
            }
        }
        self.by_address.retain(|_, channel| channel != id);
    }
}

impl NodeKind for Bip47Channels {
    const NAME: &'static str = "bip47-channels";
    const VERSION: u32 = 1;
    type Index = ChannelIndexRecord;

    fn load_index(&mut self, _ctx: &NodeContext, index: ChannelIndexRecord, items: &mut ItemMap) -> StoreResult<()> {
        for (id, entry) in index.channels {
            if items.contains_key(&id) {
                self.insert(&id, entry);
            }
        }
        Ok(())
    }

    fn save_index(&self, items: &ItemMap) -> ChannelIndexRecord {
        ChannelIndexRecord {
            channels: self
                .entries
                .iter()
                .filter(|(id, _)| items.contains_key(*id))
                .map(|(id, entry)| (id.clone(), entry.clone()))
                .collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Node<Bip47Channels> {
    pub(crate) fn store(&self, record: &ChannelRecord, alias: &str) -> StoreResult<bool> {
        let entry = ChannelEntry {
            contact: record.contact.clone(),
            chain: record.chain,
            addresses: record.addresses.iter().cloned().collect(),
        };
        self.store_record_with(&record.id, record, alias, |channels, _| {
            channels.insert(&record.id, entry)
        })
    }

    pub fn load(&self, id: &str, checking: bool) -> StoreResult<Option<ChannelRecord>> {
        Ok(self.load_record(id, checking)?.map(|(record, _)| record))
    }

    pub(crate) fn delete(&self, id: &str) -> StoreResult<bool> {
        self.delete_with(id, |channels, id| channels.remove(id))
    }

    pub fn channel_contact(&self, id: &str) -> Option<String> {
        self.lock().kind.entries.get(id).map(|entry| entry.contact.clone())
    }

    pub fn channel_chain(&self, id: &str) -> Option<UnitType> {
        self.lock().kind.entries.get(id).map(|entry| entry.chain)
    }

    pub fn channels_by_contact(&self, contact: &str) -> BTreeSet<String> {
        self.lock().kind.by_contact.get(contact).cloned().unwrap_or_default()
    }

    pub fn channels_by_chain(&self, chain: UnitType) -> BTreeSet<String> {
        self.lock().kind.by_chain.get(&chain).cloned().unwrap_or_default()
    }

    /// The channel that derived `address`.
    pub fn channel_by_address(&self, address: &str) -> Option<String> {
        self.lock().kind.by_address.get(address).cloned()
    }
}

editor_methods! {
    impl Bip47Channels {
        fn store(&self, record: &ChannelRecord, alias: &str) -> StoreResult<bool>;
        fn delete(&self, id: &str) -> StoreResult<bool>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::tests::context;

    fn channel(id: &str, contact: &str, chain: UnitType, addresses: &[&str]) -> ChannelRecord {
        ChannelRecord {
            id: id.into(),
            contact: contact.into(),
            chain,
            local_payment_code: "PM8Tlocal".into(),
            remote_payment_code: format!("PM8T{contact}"),
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
            data: Vec::new(),
        }
    }

    #[test]
    fn indices_track_contact_chain_and_address() {
        let ctx = context();
        let channels = Node::<Bip47Channels>::blank(&ctx);
        channels.store(&channel("ch1", "bob", UnitType::Btc, &["addr1", "addr2"]), "").unwrap();
        channels.store(&channel("ch2", "bob", UnitType::Bch, &["addr3"]), "").unwrap();

        assert_eq!(channels.channel_contact("ch1").as_deref(), Some("bob"));
        assert_eq!(channels.channels_by_contact("bob").len(), 2);
        assert_eq!(channels.channels_by_chain(UnitType::Btc), BTreeSet::from(["ch1".to_string()]));
        assert_eq!(channels.channel_by_address("addr3").as_deref(), Some("ch2"));

        channels.store(&channel("ch1", "bob", UnitType::Btc, &["addr1"]), "").unwrap();
        assert_eq!(channels.channel_by_address("addr2"), None);

        channels.delete("ch2").unwrap();
        assert_eq!(channels.channel_by_address("addr3"), None);
        assert!(channels.channels_by_chain(UnitType::Bch).is_empty());
    }

    #[test]
    fn round_trip_restores_indices() {
        let ctx = context();
        let channels = Node::<Bip47Channels>::blank(&ctx);
        channels.store(&channel("ch1", "alice", UnitType::Btc, &["a1"]), "first").unwrap();
        channels.store(&channel("ch2", "carol", UnitType::Ltc, &["c1", "c2"]), "").unwrap();

        let reopened = Node::<Bip47Channels>::open(&ctx, &channels.root_hash()).unwrap();
        assert_eq!(reopened.list(), channels.list());
        for id in ["ch1", "ch2"] {
            assert_eq!(reopened.channel_contact(id), channels.channel_contact(id));
            assert_eq!(reopened.channel_chain(id), channels.channel_chain(id));
        }
        assert_eq!(reopened.channel_by_address("c2").as_deref(), Some("ch2"));
        assert_eq!(reopened.load("ch1", false).unwrap().unwrap().addresses, vec!["a1".to_string()]);
    }
}
