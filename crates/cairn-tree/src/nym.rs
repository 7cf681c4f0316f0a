//! Per-identity storage node.
//!
//! A nym node holds the serialized credential index of one identity and
//! lazily owns every per-identity box. Its item list is used for the
//! identity's blockchain accounts.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use cairn_store::{Driver, DriverExt, StoreResult};
use cairn_types::{ContentHash, UnitType};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::editor::{editor_methods, Editor};
use crate::node::{ItemMap, Node, NodeContext, NodeKind, Pick, Slot};
use crate::nodes::{
    Bip47Channels, Contexts, Issuers, Mailbox, PaymentWorkflows, PeerReplies, PeerRequests, Threads, Txos,
};

/// One of the four peer request/reply boxes of a nym.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerBox {
    Sent,
    Incoming,
    Finished,
    Processed,
}

impl PeerBox {
    pub const ALL: [PeerBox; 4] = [PeerBox::Sent, PeerBox::Incoming, PeerBox::Finished, PeerBox::Processed];
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NymIndexRecord {
    pub id: String,
    pub alias: String,
    pub credentials: ContentHash,
    pub revision: u64,
    pub private: bool,
    pub bip47: ContentHash,
    pub contexts: ContentHash,
    pub issuers: ContentHash,
    pub mail_inbox: ContentHash,
    pub mail_outbox: ContentHash,
    pub workflows: ContentHash,
    pub peer_requests: [ContentHash; 4],
    pub peer_replies: [ContentHash; 4],
    pub threads: ContentHash,
    pub txos: ContentHash,
    /// blockchain account -> chain
    pub account_chains: BTreeMap<String, UnitType>,
}

#[derive(Default)]
pub struct Nym {
    id: String,
    alias: String,
    credentials: ContentHash,
    revision: u64,
    private: bool,
    bip47: Slot<Bip47Channels>,
    contexts: Slot<Contexts>,
    issuers: Slot<Issuers>,
    mail_inbox: Slot<Mailbox>,
    mail_outbox: Slot<Mailbox>,
    workflows: Slot<PaymentWorkflows>,
    peer_requests: [Slot<PeerRequests>; 4],
    peer_replies: [Slot<PeerReplies>; 4],
    threads: Slot<Threads>,
    txos: Slot<Txos>,
    account_chains: BTreeMap<String, UnitType>,
    by_chain: BTreeMap<UnitType, BTreeSet<String>>,
}

impl Nym {
    fn bind_account(&mut self, id: &str, chain: UnitType) {
        self.unbind_account(id);
        self.account_chains.insert(id.to_string(), chain);
        self.by_chain.entry(chain).or_default().insert(id.to_string());
    }

    fn unbind_account(&mut self, id: &str) {
        if let Some(chain) = self.account_chains.remove(id) {
            if let Some(set) = self.by_chain.get_mut(&chain) {
                set.remove(id);
                if set.is_empty() {
                    self.by_chain.remove(&chain);
                }
            }
        }
    }
}

impl NodeKind for Nym {
    const NAME: &'static str = "nym";
    const VERSION: u32 = 4;
    const ITEM_LIST: bool = false;
    type Index = NymIndexRecord;

    fn load_index(&mut self, ctx: &NodeContext, index: NymIndexRecord, items: &mut ItemMap) -> StoreResult<()> {
        let slot_hash = |hash: &ContentHash| ctx.normalize(hash);
        self.id = index.id;
        self.alias = index.alias;
        self.credentials = slot_hash(&index.credentials);
        self.revision = index.revision;
        self.private = index.private;
        self.bip47 = Slot::new(slot_hash(&index.bip47));
        self.contexts = Slot::new(slot_hash(&index.contexts));
        self.issuers = Slot::new(slot_hash(&index.issuers));
        self.mail_inbox = Slot::new(slot_hash(&index.mail_inbox));
        self.mail_outbox = Slot::new(slot_hash(&index.mail_outbox));
        self.workflows = Slot::new(slot_hash(&index.workflows));
        self.peer_requests = index.peer_requests.each_ref().map(|hash| Slot::new(slot_hash(hash)));
        self.peer_replies = index.peer_replies.each_ref().map(|hash| Slot::new(slot_hash(hash)));
        self.threads = Slot::new(slot_hash(&index.threads));
        self.txos = Slot::new(slot_hash(&index.txos));
        for (account, chain) in index.account_chains {
            if items.contains_key(&account) {
                self.bind_account(&account, chain);
            }
        }
        Ok(())
    }

    fn save_index(&self, items: &ItemMap) -> NymIndexRecord {
        NymIndexRecord {
            id: self.id.clone(),
            alias: self.alias.clone(),
            credentials: self.credentials.clone(),
            revision: self.revision,
            private: self.private,
            bip47: self.bip47.hash().clone(),
            contexts: self.contexts.hash().clone(),
            issuers: self.issuers.hash().clone(),
            mail_inbox: self.mail_inbox.hash().clone(),
            mail_outbox: self.mail_outbox.hash().clone(),
            workflows: self.workflows.hash().clone(),
            peer_requests: self.peer_requests.each_ref().map(|slot| slot.hash().clone()),
            peer_replies: self.peer_replies.each_ref().map(|slot| slot.hash().clone()),
            threads: self.threads.hash().clone(),
            txos: self.txos.hash().clone(),
            account_chains: self
                .account_chains
                .iter()
                .filter(|(id, _)| items.contains_key(*id))
                .map(|(id, chain)| (id.clone(), *chain))
                .collect(),
        }
    }

    fn migrate_children(&self, ctx: &NodeContext, _items: &ItemMap, to: &dyn Driver) -> StoreResult<bool> {
        let mut complete = ctx.driver().migrate(&self.credentials, to)?;
        complete &= self.bip47.migrate(ctx, to)?;
        complete &= self.contexts.migrate(ctx, to)?;
        complete &= self.issuers.migrate(ctx, to)?;
        complete &= self.mail_inbox.migrate(ctx, to)?;
        complete &= self.mail_outbox.migrate(ctx, to)?;
        complete &= self.workflows.migrate(ctx, to)?;
        for slot in &self.peer_requests {
            complete &= slot.migrate(ctx, to)?;
        }
        for slot in &self.peer_replies {
            complete &= slot.migrate(ctx, to)?;
        }
        complete &= self.threads.migrate(ctx, to)?;
        complete &= self.txos.migrate(ctx, to)?;
        Ok(complete)
    }
}

macro_rules! nym_children {
    ($($field:ident: $kind:ty => $get:ident, $edit:ident;)*) => {
        impl Node<Nym> {
            $(
                pub fn $get(&self) -> StoreResult<Arc<Node<$kind>>> {
                    self.child(|nym: &mut Nym| &mut nym.$field)
                }

                pub fn $edit(parent: Editor<Node<Nym>>) -> StoreResult<Editor<Node<$kind>>> {
                    Node::child_editor(parent, |nym: &mut Nym| &mut nym.$field)
                }
            )*
        }
    };
}

nym_children! {
    bip47: Bip47Channels => bip47_channels, mutable_bip47_channels;
    contexts: Contexts => contexts, mutable_contexts;
    issuers: Issuers => issuers, mutable_issuers;
    mail_inbox: Mailbox => mail_inbox, mutable_mail_inbox;
    mail_outbox: Mailbox => mail_outbox, mutable_mail_outbox;
    workflows: PaymentWorkflows => payment_workflows, mutable_payment_workflows;
    threads: Threads => threads, mutable_threads;
    txos: Txos => txos, mutable_txos;
}

fn request_pick(which: PeerBox) -> Pick<Nym, PeerRequests> {
    match which {
        PeerBox::Sent => |nym| &mut nym.peer_requests[0],
        PeerBox::Incoming => |nym| &mut nym.peer_requests[1],
        PeerBox::Finished => |nym| &mut nym.peer_requests[2],
        PeerBox::Processed => |nym| &mut nym.peer_requests[3],
    }
}

fn reply_pick(which: PeerBox) -> Pick<Nym, PeerReplies> {
    match which {
        PeerBox::Sent => |nym| &mut nym.peer_replies[0],
        PeerBox::Incoming => |nym| &mut nym.peer_replies[1],
        PeerBox::Finished => |nym| &mut nym.peer_replies[2],
        PeerBox::Processed => |nym| &mut nym.peer_replies[3],
    }
}

impl Node<Nym> {
    /// Record the identity ID on a freshly created nym.
    pub(crate) fn initialize(&self, id: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state.kind.id = id.to_string();
        self.save(&mut state)
    }

    pub fn id(&self) -> String {
        self.lock().kind.id.clone()
    }

    pub fn nym_alias(&self) -> String {
        self.lock().kind.alias.clone()
    }

    pub fn revision(&self) -> u64 {
        self.lock().kind.revision
    }

    /// Whether the stored credential index includes private keys.
    pub fn is_private(&self) -> bool {
        self.lock().kind.private
    }

    pub fn peer_requests(&self, which: PeerBox) -> StoreResult<Arc<Node<PeerRequests>>> {
        self.child(request_pick(which))
    }

    pub fn mutable_peer_requests(parent: Editor<Node<Nym>>, which: PeerBox) -> StoreResult<Editor<Node<PeerRequests>>> {
        Node::child_editor(parent, request_pick(which))
    }

    pub fn peer_replies(&self, which: PeerBox) -> StoreResult<Arc<Node<PeerReplies>>> {
        self.child(reply_pick(which))
    }

    pub fn mutable_peer_replies(parent: Editor<Node<Nym>>, which: PeerBox) -> StoreResult<Editor<Node<PeerReplies>>> {
        Node::child_editor(parent, reply_pick(which))
    }

    /// Store the serialized credential index of this identity.
    ///
    /// A lower revision is ignored. At equal revision only a private copy
    /// replaces a public one.
    pub(crate) fn store_credentials(&self, data: &[u8], alias: &str, revision: u64, private: bool) -> StoreResult<bool> {
        let mut state = self.lock();
        let current = &state.kind;
        let replace = current.credentials.is_blank()
            || revision > current.revision
            || (revision == current.revision && private && !current.private);
        if !replace {
            debug!(nym = %current.id, revision, stored = current.revision, "credential index not replaced");
            return Ok(true);
        }
        let hash = self.ctx().driver().store_value(false, data)?;
        let nym = &mut state.kind;
        nym.credentials = hash;
        nym.alias = alias.to_string();
        nym.revision = revision;
        nym.private = private;
        self.save(&mut state)?;
        Ok(true)
    }

    /// The serialized credential index and alias.
    pub fn load_credentials(&self, checking: bool) -> StoreResult<Option<(Vec<u8>, String)>> {
        let (hash, alias) = {
            let state = self.lock();
            (state.kind.credentials.clone(), state.kind.alias.clone())
        };
        if hash.is_blank() {
            return Ok(None);
        }
        Ok(self.ctx().driver().load(&hash, checking)?.map(|data| (data, alias)))
    }

    pub(crate) fn set_nym_alias(&self, alias: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state.kind.alias = alias.to_string();
        self.save(&mut state)
    }

    pub(crate) fn store_blockchain_account(&self, id: &str, chain: UnitType, data: &[u8]) -> StoreResult<bool> {
        self.store_raw_with(id, data, "", |nym, _| nym.bind_account(id, chain))
    }

    pub fn load_blockchain_account(&self, id: &str, checking: bool) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.load_raw(id, checking)?.map(|(data, _)| data))
    }

    pub(crate) fn delete_blockchain_account(&self, id: &str) -> StoreResult<bool> {
        self.delete_with(id, |nym, id| nym.unbind_account(id))
    }

    pub fn blockchain_account_chain(&self, id: &str) -> Option<UnitType> {
        self.lock().kind.account_chains.get(id).copied()
    }

    pub fn blockchain_accounts_by_chain(&self, chain: UnitType) -> BTreeSet<String> {
        self.lock().kind.by_chain.get(&chain).cloned().unwrap_or_default()
    }

    /// Read the stored credential index as a typed record.
    pub fn load_credential_record<T: serde::de::DeserializeOwned>(&self, checking: bool) -> StoreResult<Option<T>> {
        let hash = self.lock().kind.credentials.clone();
        if hash.is_blank() {
            return Ok(None);
        }
        self.ctx().driver().load_record(&hash, checking)
    }
}

editor_methods! {
    impl Nym {
        fn store_credentials(&self, data: &[u8], alias: &str, revision: u64, private: bool) -> StoreResult<bool>;
        fn set_nym_alias(&self, alias: &str) -> StoreResult<()>;
        fn store_blockchain_account(&self, id: &str, chain: UnitType, data: &[u8]) -> StoreResult<bool>;
        fn delete_blockchain_account(&self, id: &str) -> StoreResult<bool>;
    }
}
