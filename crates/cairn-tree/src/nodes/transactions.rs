//! Raw blockchain transactions and the nyms they concern.

use std::collections::{BTreeMap, BTreeSet};

use cairn_store::StoreResult;
use serde::{Deserialize, Serialize};

use crate::editor::editor_methods;
use crate::node::{ItemMap, Node, NodeContext, NodeKind};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIndexRecord {
    /// txid -> nyms
    pub nyms: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Default)]
pub struct BlockchainTransactions {
    nyms: BTreeMap<String, BTreeSet<String>>,
    by_nym: BTreeMap<String, BTreeSet<String>>,
}

impl BlockchainTransactions {
    fn link(&mut self, txid: &str, nym: &str) {
        self.nyms.entry(txid.to_string()).or_default().insert(nym.to_string());
        self.by_nym.entry(nym.to_string()).or_default().insert(txid.to_string());
    }

    fn unlink(&mut self, txid: &str, nym: &str) -> bool {
        let removed = self.nyms.get_mut(txid).is_some_and(|set| set.remove(nym));
        if let Some(set) = self.by_nym.get_mut(nym) {
            set.remove(txid);
            if set.is_empty() {
                self.by_nym.remove(nym);
            }
        }
        removed
    }

    fn forget(&mut self, txid: &str) {
        for nym in self.nyms.remove(txid).unwrap_or_default() {
            if let Some(set) = self.by_nym.get_mut(&nym) {
                set.remove(txid);
                if set.is_empty() {
                    self.by_nym.remove(&nym);
                }
            }
        }
    }
}

impl NodeKind for BlockchainTransactions {
    const NAME: &'static str = "blockchain-transactions";
    const VERSION: u32 = 1;
    type Index = TransactionIndexRecord;

    fn load_index(&mut self, _ctx: &NodeContext, index: TransactionIndexRecord, items: &mut ItemMap) -> StoreResult<()> {
        for (txid, nyms) in index.nyms {
            if !items.contains_key(&txid) {
                continue;
            }
            for nym in nyms {
                self.link(&txid, &nym);
            }
        }
        Ok(())
    }

    fn save_index(&self, items: &ItemMap) -> TransactionIndexRecord {
        TransactionIndexRecord {
            nyms: self
                .nyms
                .iter()
                .filter(|(txid, nyms)| items.contains_key(*txid) && !nyms.is_empty())
                .map(|(txid, nyms)| (txid.clone(), nyms.clone()))
                .collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.by_nym.is_empty()
    }
}

impl Node<BlockchainTransactions> {
    /// Store a serialized transaction, adding `nyms` to its associations.
    pub(crate) fn store(&self, txid: &str, data: &[u8], nyms: &[String]) -> StoreResult<bool> {
        self.store_raw_with(txid, data, "", |txs, _| {
            for nym in nyms {
                txs.link(txid, nym);
            }
        })
    }

    pub fn load(&self, txid: &str, checking: bool) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.load_raw(txid, checking)?.map(|(data, _)| data))
    }

    pub fn transactions_by_nym(&self, nym: &str) -> BTreeSet<String> {
        self.lock().kind.by_nym.get(nym).cloned().unwrap_or_default()
    }

    /// Returns `false` if `txid` is not stored.
    pub(crate) fn associate(&self, nym: &str, txid: &str) -> StoreResult<bool> {
        let mut state = self.lock();
        if !state.items.contains_key(txid) {
            return Ok(false);
        }
        state.kind.link(txid, nym);
        self.save(&mut state)?;
        Ok(true)
    }

    /// Returns `false` if the association did not exist.
    pub(crate) fn disassociate(&self, nym: &str, txid: &str) -> StoreResult<bool> {
        let mut state = self.lock();
        if !state.kind.unlink(txid, nym) {
            return Ok(false);
        }
        self.save(&mut state)?;
        Ok(true)
    }

    pub(crate) fn delete(&self, txid: &str) -> StoreResult<bool> {
        self.delete_with(txid, |txs, txid| txs.forget(txid))
    }
}

editor_methods! {
    impl BlockchainTransactions {
        fn store(&self, txid: &str, data: &[u8], nyms: &[String]) -> StoreResult<bool>;
        fn associate(&self, nym: &str, txid: &str) -> StoreResult<bool>;
        fn disassociate(&self, nym: &str, txid: &str) -> StoreResult<bool>;
        fn delete(&self, txid: &str) -> StoreResult<bool>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::tests::context;

    #[test]
    fn associations_follow_nyms() {
        let ctx = context();
        let txs = Node::<BlockchainTransactions>::blank(&ctx);
        txs.store("tx1", b"raw1", &["alice".to_string()]).unwrap();
        txs.store("tx2", b"raw2", &["alice".to_string(), "bob".to_string()]).unwrap();
        assert_eq!(txs.transactions_by_nym("alice").len(), 2);

        assert!(txs.associate("carol", "tx1").unwrap());
        assert!(!txs.associate("carol", "missing").unwrap());
        assert!(txs.disassociate("alice", "tx2").unwrap());
        assert!(!txs.disassociate("alice", "tx2").unwrap());
        assert_eq!(txs.transactions_by_nym("alice"), BTreeSet::from(["tx1".to_string()]));

        let reopened = Node::<BlockchainTransactions>::open(&ctx, &txs.root_hash()).unwrap();
        assert_eq!(reopened.transactions_by_nym("carol"), BTreeSet::from(["tx1".to_string()]));
        assert_eq!(reopened.load("tx2", false).unwrap().unwrap(), b"raw2");

        reopened.delete("tx1").unwrap();
        assert!(reopened.transactions_by_nym("carol").is_empty());
    }
}
