//! One conversation thread: references to items held in other boxes.

use std::collections::{BTreeMap, BTreeSet};

use cairn_store::StoreResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::editor::editor_methods;
use crate::node::{ItemMap, Node, NodeContext, NodeKind};

/// Where the item a thread entry points at actually lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemBox {
    MailInbox,
    MailOutbox,
    IncomingPeerRequest,
    IncomingPeerReply,
    OutgoingPeerRequest,
    OutgoingPeerReply,
    BlockchainTransaction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadItem {
    pub id: String,
    pub index: u64,
    pub time: DateTime<Utc>,
    pub item_box: ItemBox,
    pub account: Option<String>,
    pub unread: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadIndexRecord {
    pub id: String,
    pub participants: BTreeSet<String>,
    pub items: BTreeMap<String, ThreadItem>,
}

/// Thread state lives entirely in the index section; its item list stays
/// empty, so a thread is never collapsed to the blank hash.
#[derive(Default)]
pub struct Thread {
    id: String,
    participants: BTreeSet<String>,
    items: BTreeMap<String, ThreadItem>,
}

impl NodeKind for Thread {
    const NAME: &'static str = "thread";
    const VERSION: u32 = 1;
    const ITEM_LIST: bool = false;
    type Index = ThreadIndexRecord;

    fn load_index(&mut self, _ctx: &NodeContext, index: ThreadIndexRecord, _items: &mut ItemMap) -> StoreResult<()> {
        self.id = index.id;
        self.participants = index.participants;
        self.items = index.items;
        Ok(())
    }

    fn save_index(&self, _items: &ItemMap) -> ThreadIndexRecord {
        ThreadIndexRecord {
            id: self.id.clone(),
            participants: self.participants.clone(),
            items: self.items.clone(),
        }
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty() && self.participants.is_empty()
    }
}

impl Node<Thread> {
    /// Record identity and participants on a freshly created thread.
    pub(crate) fn initialize(&self, id: &str, participants: &BTreeSet<String>) -> StoreResult<()> {
        let mut state = self.lock();
        state.kind.id = id.to_string();
        state.kind.participants = participants.clone();
        self.save(&mut state)
    }

    pub fn id(&self) -> String {
        self.lock().kind.id.clone()
    }

    pub fn participants(&self) -> BTreeSet<String> {
        self.lock().kind.participants.clone()
    }

    /// Items ordered by their thread index.
    pub fn items(&self) -> Vec<ThreadItem> {
        let mut items: Vec<_> = self.lock().kind.items.values().cloned().collect();
        items.sort_by_key(|item| (item.index, item.time));
        items
    }

    pub fn item(&self, id: &str) -> Option<ThreadItem> {
        self.lock().kind.items.get(id).cloned()
    }

    /// Add an unread item. Returns `false` if `id` is already present.
    pub(crate) fn add_item(
        &self,
        id: &str,
        time: DateTime<Utc>,
        item_box: ItemBox,
        account: Option<&str>,
    ) -> StoreResult<bool> {
        let mut state = self.lock();
        if state.kind.items.contains_key(id) {
            return Ok(false);
        }
        let index = state.kind.items.values().map(|item| item.index + 1).max().unwrap_or(0);
        state.kind.items.insert(
            id.to_string(),
            ThreadItem {
                id: id.to_string(),
                index,
                time,
                item_box,
                account: account.map(str::to_string),
                unread: true,
            },
        );
        self.save(&mut state)?;
        Ok(true)
    }

    pub(crate) fn remove_item(&self, id: &str) -> StoreResult<bool> {
        let mut state = self.lock();
        if state.kind.items.remove(id).is_none() {
            return Ok(false);
        }
        self.save(&mut state)?;
        Ok(true)
    }

    /// Returns `false` if `id` is not in this thread.
    pub(crate) fn set_read(&self, id: &str, read: bool) -> StoreResult<bool> {
        let mut state = self.lock();
        match state.kind.items.get_mut(id) {
            Some(item) if item.unread == read => item.unread = !read,
            Some(_) => return Ok(true),
            None => return Ok(false),
        }
        self.save(&mut state)?;
        Ok(true)
    }

    pub fn unread_count(&self) -> usize {
        self.lock().kind.items.values().filter(|item| item.unread).count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().kind.items.contains_key(id)
    }
}

editor_methods! {
    impl Thread {
        fn add_item(&self, id: &str, time: DateTime<Utc>, item_box: ItemBox, account: Option<&str>) -> StoreResult<bool>;
        fn remove_item(&self, id: &str) -> StoreResult<bool>;
        fn set_read(&self, id: &str, read: bool) -> StoreResult<bool>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::tests::context;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn read_state_and_ordering() {
        let ctx = context();
        let thread = Node::<Thread>::blank(&ctx);
        thread
            .initialize("t1", &BTreeSet::from(["bob".to_string()]))
            .unwrap();
        thread.add_item("m2", at(20), ItemBox::MailInbox, None).unwrap();
        thread.add_item("m1", at(10), ItemBox::MailOutbox, Some("acct")).unwrap();
        assert!(!thread.add_item("m1", at(30), ItemBox::MailOutbox, None).unwrap());

        let ids: Vec<_> = thread.items().into_iter().map(|item| item.id).collect();
        assert_eq!(ids, ["m2", "m1"]);
        assert_eq!(thread.unread_count(), 2);

        thread.set_read("m2", true).unwrap();
        assert_eq!(thread.unread_count(), 1);
        assert!(!thread.set_read("missing", true).unwrap());

        thread.remove_item("m1").unwrap();
        assert_eq!(thread.unread_count(), 0);
    }

    #[test]
    fn round_trip_keeps_items_and_participants() {
        let ctx = context();
        let thread = Node::<Thread>::blank(&ctx);
        thread
            .initialize("t1", &BTreeSet::from(["bob".to_string(), "carol".to_string()]))
            .unwrap();
        thread.add_item("m1", at(5), ItemBox::IncomingPeerRequest, None).unwrap();

        let reopened = Node::<Thread>::open(&ctx, &thread.root_hash()).unwrap();
        assert_eq!(reopened.id(), "t1");
        assert_eq!(reopened.participants(), thread.participants());
        assert_eq!(reopened.items(), thread.items());
    }
}
