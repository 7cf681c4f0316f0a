//! Transaction outputs owned by a nym's blockchain accounts.

use std::collections::{BTreeMap, BTreeSet};

use cairn_store::StoreResult;
use serde::{Deserialize, Serialize};

use crate::editor::editor_methods;
use crate::node::{ItemMap, Node, NodeContext, NodeKind};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxoEntry {
    pub account: String,
    pub spent: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxoIndexRecord {
    pub outputs: BTreeMap<String, TxoEntry>,
}

#[derive(Default)]
pub struct Txos {
    outputs: BTreeMap<String, TxoEntry>,
    by_account: BTreeMap<String, BTreeSet<String>>,
}

impl Txos {
    fn insert(&mut self, outpoint: &str, entry: TxoEntry) {
        self.remove(outpoint);
        self.by_account
            .entry(entry.account.clone())
            .or_default()
            .insert(outpoint.to_string());
        self.outputs.insert(outpoint.to_string(), entry);
    }

    fn remove(&mut self, outpoint: &str) {
        let Some(old) = self.outputs.remove(outpoint) else {
            return;
        };
        if let Some(set) = self.by_account.get_mut(&old.account) {
            set.remove(outpoint);
            if set.is_empty() {
                self.by_account.remove(&old.account);
            }
        }
    }
}

impl NodeKind for Txos {
    const NAME: &'static str = "txos";
    const VERSION: u32 = 1;
    type Index = TxoIndexRecord;

    fn load_index(&mut self, _ctx: &NodeContext, index: TxoIndexRecord, items: &mut ItemMap) -> StoreResult<()> {
        for (outpoint, entry) in index.outputs {
            if items.contains_key(&outpoint) {
                self.insert(&outpoint, entry);
            }
        }
        Ok(())
    }

    fn save_index(&self, items: &ItemMap) -> TxoIndexRecord {
        TxoIndexRecord {
            outputs: self
                .outputs
                .iter()
                .filter(|(outpoint, _)| items.contains_key(*outpoint))
                .map(|(outpoint, entry)| (outpoint.clone(), entry.clone()))
                .collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

impl Node<Txos> {
    pub(crate) fn store(&self, outpoint: &str, data: &[u8], account: &str, spent: bool) -> StoreResult<bool> {
        let entry = TxoEntry {
            account: account.to_string(),
            spent,
        };
        self.store_raw_with(outpoint, data, "", |txos, _| txos.insert(outpoint, entry))
    }

    pub fn load(&self, outpoint: &str, checking: bool) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.load_raw(outpoint, checking)?.map(|(data, _)| data))
    }

    /// Returns `false` if `outpoint` is unknown.
    pub(crate) fn mark_spent(&self, outpoint: &str, spent: bool) -> StoreResult<bool> {
        let mut state = self.lock();
        match state.kind.outputs.get_mut(outpoint) {
            Some(entry) => entry.spent = spent,
            None => return Ok(false),
        }
        self.save(&mut state)?;
        Ok(true)
    }

    pub fn is_spent(&self, outpoint: &str) -> Option<bool> {
        self.lock().kind.outputs.get(outpoint).map(|entry| entry.spent)
    }

    pub fn by_account(&self, account: &str) -> BTreeSet<String> {
        self.lock().kind.by_account.get(account).cloned().unwrap_or_default()
    }

    pub fn unspent(&self) -> BTreeSet<String> {
        self.lock()
            .kind
            .outputs
            .iter()
            .filter(|(_, entry)| !entry.spent)
            .map(|(outpoint, _)| outpoint.clone())
            .collect()
    }

    pub(crate) fn delete(&self, outpoint: &str) -> StoreResult<bool> {
        self.delete_with(outpoint, |txos, outpoint| txos.remove(outpoint))
    }
}

editor_methods! {
    impl Txos {
        fn store(&self, outpoint: &str, data: &[u8], account: &str, spent: bool) -> StoreResult<bool>;
        fn mark_spent(&self, outpoint: &str, spent: bool) -> StoreResult<bool>;
        fn delete(&self, outpoint: &str) -> StoreResult<bool>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::tests::context;

    #[test]
    fn spend_tracking() {
        let ctx = context();
        let txos = Node::<Txos>::blank(&ctx);
        txos.store("tx1:0", b"out", "acct1", false).unwrap();
        txos.store("tx1:1", b"out", "acct2", false).unwrap();
        txos.store("tx2:0", b"out", "acct1", true).unwrap();

        assert_eq!(txos.by_account("acct1").len(), 2);
        assert_eq!(txos.unspent().len(), 2);
        assert!(txos.mark_spent("tx1:0", true).unwrap());
        assert!(!txos.mark_spent("nope:0", true).unwrap());
        assert_eq!(txos.unspent(), BTreeSet::from(["tx1:1".to_string()]));

        let reopened = Node::<Txos>::open(&ctx, &txos.root_hash()).unwrap();
        assert_eq!(reopened.is_spent("tx1:0"), Some(true));
        assert_eq!(reopened.unspent(), txos.unspent());
        reopened.delete("tx1:1").unwrap();
        assert!(reopened.by_account("acct2").is_empty());
    }
}
