//! Top-level aggregate holding one instance of each top-level node.

use std::sync::Arc;

use cairn_store::{Driver, StoreResult};
use cairn_types::ContentHash;
use serde::{Deserialize, Serialize};

use crate::editor::Editor;
use crate::node::{ItemMap, Node, NodeContext, NodeKind, Slot};
use crate::nodes::{Accounts, BlockchainTransactions, Contacts, Credentials, Seeds, Servers, Units};
use crate::nyms::Nyms;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeIndexRecord {
    pub accounts: ContentHash,
    pub contacts: ContentHash,
    pub credentials: ContentHash,
    pub nyms: ContentHash,
    pub seeds: ContentHash,
    pub servers: ContentHash,
    pub units: ContentHash,
    pub blockchain_transactions: ContentHash,
}

#[derive(Default)]
pub struct Tree {
    accounts: Slot<Accounts>,
    contacts: Slot<Contacts>,
    credentials: Slot<Credentials>,
    nyms: Slot<Nyms>,
    seeds: Slot<Seeds>,
    servers: Slot<Servers>,
    units: Slot<Units>,
    blockchain_transactions: Slot<BlockchainTransactions>,
}

impl NodeKind for Tree {
    const NAME: &'static str = "tree";
    const VERSION: u32 = 2;
    const ITEM_LIST: bool = false;
    type Index = TreeIndexRecord;

    fn load_index(&mut self, ctx: &NodeContext, index: TreeIndexRecord, _items: &mut ItemMap) -> StoreResult<()> {
        self.accounts = Slot::new(ctx.normalize(&index.accounts));
        self.contacts = Slot::new(ctx.normalize(&index.contacts));
        self.credentials = Slot::new(ctx.normalize(&index.credentials));
        self.nyms = Slot::new(ctx.normalize(&index.nyms));
        self.seeds = Slot::new(ctx.normalize(&index.seeds));
        self.servers = Slot::new(ctx.normalize(&index.servers));
        self.units = Slot::new(ctx.normalize(&index.units));
        self.blockchain_transactions = Slot::new(ctx.normalize(&index.blockchain_transactions));
        Ok(())
    }

    fn save_index(&self, _items: &ItemMap) -> TreeIndexRecord {
        TreeIndexRecord {
            accounts: self.accounts.hash().clone(),
            contacts: self.contacts.hash().clone(),
            credentials: self.credentials.hash().clone(),
            nyms: self.nyms.hash().clone(),
            seeds: self.seeds.hash().clone(),
            servers: self.servers.hash().clone(),
            units: self.units.hash().clone(),
            blockchain_transactions: self.blockchain_transactions.hash().clone(),
        }
    }

    fn migrate_children(&self, ctx: &NodeContext, _items: &ItemMap, to: &dyn Driver) -> StoreResult<bool> {
        let mut complete = self.accounts.migrate(ctx, to)?;
        complete &= self.contacts.migrate(ctx, to)?;
        complete &= self.credentials.migrate(ctx, to)?;
        complete &= self.nyms.migrate(ctx, to)?;
        complete &= self.seeds.migrate(ctx, to)?;
        complete &= self.servers.migrate(ctx, to)?;
        complete &= self.units.migrate(ctx, to)?;
        complete &= self.blockchain_transactions.migrate(ctx, to)?;
        Ok(complete)
    }
}

macro_rules! tree_children {
    ($($field:ident: $kind:ty => $edit:ident;)*) => {
        impl Node<Tree> {
            $(
                pub fn $field(&self) -> StoreResult<Arc<Node<$kind>>> {
                    self.child(|tree: &mut Tree| &mut tree.$field)
                }

                pub fn $edit(parent: Editor<Node<Tree>>) -> StoreResult<Editor<Node<$kind>>> {
                    Node::child_editor(parent, |tree: &mut Tree| &mut tree.$field)
                }
            )*
        }
    };
}

tree_children! {
    accounts: Accounts => mutable_accounts;
    contacts: Contacts => mutable_contacts;
    credentials: Credentials => mutable_credentials;
    nyms: Nyms => mutable_nyms;
    seeds: Seeds => mutable_seeds;
    servers: Servers => mutable_servers;
    units: Units => mutable_units;
    blockchain_transactions: BlockchainTransactions => mutable_blockchain_transactions;
}
