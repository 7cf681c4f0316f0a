//! Custodial account index with immutable identity bindings.

use std::collections::{BTreeMap, BTreeSet};

use cairn_store::StoreResult;
use cairn_types::UnitType;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::editor::editor_methods;
use crate::node::{ItemMap, Node, NodeContext, NodeKind};

/// The identities an account is bound to when first stored.
///
/// `owner`, `signer`, `issuer`, `server` and `contract` never change after
/// creation. `unit` may be upgraded once from [`UnitType::Unknown`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBinding {
    pub owner: String,
    pub signer: String,
    pub issuer: String,
    pub server: String,
    pub contract: String,
    pub unit: UnitType,
}

impl AccountBinding {
    fn is_complete(&self) -> bool {
        [&self.owner, &self.signer, &self.issuer, &self.server, &self.contract]
            .iter()
            .all(|field| !field.is_empty())
    }

    /// Name of the first identity field that differs from `other`.
    fn conflict(&self, other: &Self) -> Option<&'static str> {
        if self.owner != other.owner {
            Some("owner")
        } else if self.signer != other.signer {
            Some("signer")
        } else if self.issuer != other.issuer {
            Some("issuer")
        } else if self.server != other.server {
            Some("server")
        } else if self.contract != other.contract {
            Some("contract")
        } else if self.unit != other.unit && self.unit != UnitType::Unknown {
            Some("unit")
        } else {
            None
        }
    }
}

type Index<K> = BTreeMap<K, BTreeSet<String>>;

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIndexRecord {
    pub owner: Index<String>,
    pub signer: Index<String>,
    pub issuer: Index<String>,
    pub server: Index<String>,
    pub contract: Index<String>,
    pub unit: Index<UnitType>,
}

impl AccountIndexRecord {
    fn insert(&mut self, id: &str, b: &AccountBinding) {
        self.owner.entry(b.owner.clone()).or_default().insert(id.to_string());
        self.signer.entry(b.signer.clone()).or_default().insert(id.to_string());
        self.issuer.entry(b.issuer.clone()).or_default().insert(id.to_string());
        self.server.entry(b.server.clone()).or_default().insert(id.to_string());
        self.contract.entry(b.contract.clone()).or_default().insert(id.to_string());
        self.unit.entry(b.unit).or_default().insert(id.to_string());
    }

    fn remove(&mut self, id: &str, b: &AccountBinding) {
        unlink(&mut self.owner, &b.owner, id);
        unlink(&mut self.signer, &b.signer, id);
        unlink(&mut self.issuer, &b.issuer, id);
        unlink(&mut self.server, &b.server, id);
        unlink(&mut self.contract, &b.contract, id);
        unlink(&mut self.unit, &b.unit, id);
    }
}

fn unlink<K: Ord>(index: &mut Index<K>, key: &K, id: &str) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

fn lookup<K: Ord>(index: &Index<K>, key: &K) -> BTreeSet<String> {
    index.get(key).cloned().unwrap_or_default()
}

/// Forward bindings plus one reverse index per binding field.
#[derive(Default)]
pub struct Accounts {
    bindings: BTreeMap<String, AccountBinding>,
    index: AccountIndexRecord,
}

impl Accounts {
    fn bind(&mut self, id: &str, binding: &AccountBinding) {
        if let Some(old) = self.bindings.remove(id) {
            self.index.remove(id, &old);
        }
        self.index.insert(id, binding);
        self.bindings.insert(id.to_string(), binding.clone());
    }

    fn unbind(&mut self, id: &str) {
        if let Some(old) = self.bindings.remove(id) {
            self.index.remove(id, &old);
        }
    }
}

/// Invert one persisted reverse index into the forward bindings.
fn restore<K: Clone>(
    index: &Index<K>,
    bindings: &mut BTreeMap<String, AccountBinding>,
    set: impl Fn(&mut AccountBinding, K),
) {
    for (key, ids) in index {
        for id in ids {
            if let Some(binding) = bindings.get_mut(id) {
                set(binding, key.clone());
            }
        }
    }
}

impl NodeKind for Accounts {
    const NAME: &'static str = "accounts";
    const VERSION: u32 = 1;
    type Index = AccountIndexRecord;

    fn load_index(&mut self, _ctx: &NodeContext, index: AccountIndexRecord, items: &mut ItemMap) -> StoreResult<()> {
        let mut bindings: BTreeMap<String, AccountBinding> = items
            .keys()
            .map(|id| {
                let blank = AccountBinding {
                    owner: String::new(),
                    signer: String::new(),
                    issuer: String::new(),
                    server: String::new(),
                    contract: String::new(),
                    unit: UnitType::Unknown,
                };
                (id.clone(), blank)
            })
            .collect();
        restore(&index.owner, &mut bindings, |b, v| b.owner = v);
        restore(&index.signer, &mut bindings, |b, v| b.signer = v);
        restore(&index.issuer, &mut bindings, |b, v| b.issuer = v);
        restore(&index.server, &mut bindings, |b, v| b.server = v);
        restore(&index.contract, &mut bindings, |b, v| b.contract = v);
        restore(&index.unit, &mut bindings, |b, v| b.unit = v);

        self.bindings = BTreeMap::new();
        self.index = AccountIndexRecord::default();
        for (id, binding) in bindings {
            self.bind(&id, &binding);
        }
        Ok(())
    }

    fn save_index(&self, items: &ItemMap) -> AccountIndexRecord {
        let mut out = AccountIndexRecord::default();
        for (id, binding) in self.bindings.iter().filter(|(id, _)| items.contains_key(*id)) {
            out.insert(id, binding);
        }
        out
    }

    fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Node<Accounts> {
    /// Store account `id`.
    ///
    /// Returns `false` without touching anything if a binding field is empty
    /// or if `id` already exists with a different binding.
    pub(crate) fn store(&self, id: &str, data: &[u8], alias: &str, binding: &AccountBinding) -> StoreResult<bool> {
        if id.is_empty() || !binding.is_complete() {
            warn!(account = id, "refusing account with incomplete binding");
            return Ok(false);
        }
        let accept = |accounts: &Accounts| match accounts.bindings.get(id).and_then(|b| b.conflict(binding)) {
            Some(field) => {
                warn!(account = id, field, "account binding is immutable");
                false
            }
            None => true,
        };
        self.store_raw_checked(id, data, alias, accept, |accounts, _| accounts.bind(id, binding))
    }

    pub fn load(&self, id: &str, checking: bool) -> StoreResult<Option<(Vec<u8>, String)>> {
        self.load_raw(id, checking)
    }

    /// Drop `id` from every secondary index, then from the item list.
    pub(crate) fn delete(&self, id: &str) -> StoreResult<bool> {
        self.delete_with(id, |accounts, id| accounts.unbind(id))
    }

    pub fn binding(&self, id: &str) -> Option<AccountBinding> {
        self.lock().kind.bindings.get(id).cloned()
    }

    pub fn account_owner(&self, id: &str) -> Option<String> {
        self.binding(id).map(|b| b.owner)
    }

    pub fn account_signer(&self, id: &str) -> Option<String> {
        self.binding(id).map(|b| b.signer)
    }

    pub fn account_issuer(&self, id: &str) -> Option<String> {
        self.binding(id).map(|b| b.issuer)
    }

    pub fn account_server(&self, id: &str) -> Option<String> {
        self.binding(id).map(|b| b.server)
    }

    pub fn account_contract(&self, id: &str) -> Option<String> {
        self.binding(id).map(|b| b.contract)
    }

    pub fn account_unit(&self, id: &str) -> UnitType {
        self.binding(id).map_or(UnitType::Unknown, |b| b.unit)
    }

    pub fn accounts_by_owner(&self, nym: &str) -> BTreeSet<String> {
        lookup(&self.lock().kind.index.owner, &nym.to_string())
    }

    pub fn accounts_by_signer(&self, nym: &str) -> BTreeSet<String> {
        lookup(&self.lock().kind.index.signer, &nym.to_string())
    }

    pub fn accounts_by_issuer(&self, nym: &str) -> BTreeSet<String> {
        lookup(&self.lock().kind.index.issuer, &nym.to_string())
    }

    pub fn accounts_by_server(&self, server: &str) -> BTreeSet<String> {
        lookup(&self.lock().kind.index.server, &server.to_string())
    }

    pub fn accounts_by_contract(&self, contract: &str) -> BTreeSet<String> {
        lookup(&self.lock().kind.index.contract, &contract.to_string())
    }

    pub fn accounts_by_unit(&self, unit: UnitType) -> BTreeSet<String> {
        lookup(&self.lock().kind.index.unit, &unit)
    }
}

editor_methods! {
    impl Accounts {
        fn store(&self, id: &str, data: &[u8], alias: &str, binding: &AccountBinding) -> StoreResult<bool>;
        fn delete(&self, id: &str) -> StoreResult<bool>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::tests::context;
    use proptest::prelude::*;

    fn binding(owner: &str) -> AccountBinding {
        AccountBinding {
            owner: owner.into(),
            signer: "signer".into(),
            issuer: "issuer".into(),
            server: "server".into(),
            contract: "contract".into(),
            unit: UnitType::Usd,
        }
    }

    #[test]
    fn indices_follow_store_and_delete() {
        let ctx = context();
        let accounts = Node::<Accounts>::blank(&ctx);
        assert!(accounts.store("acct1", b"one", "checking", &binding("alice")).unwrap());
        assert!(accounts.store("acct2", b"two", "savings", &binding("bob")).unwrap());

        assert_eq!(accounts.accounts_by_owner("alice"), BTreeSet::from(["acct1".to_string()]));
        assert_eq!(accounts.accounts_by_server("server").len(), 2);
        assert_eq!(accounts.accounts_by_unit(UnitType::Usd).len(), 2);
        assert!(accounts.accounts_by_owner("nobody").is_empty());

        assert!(accounts.delete("acct1").unwrap());
        assert!(accounts.accounts_by_owner("alice").is_empty());
        assert_eq!(accounts.account_owner("acct1"), None);
        assert!(!accounts.delete("acct1").unwrap());
    }

    #[test]
    fn incomplete_binding_is_refused() {
        let ctx = context();
        let accounts = Node::<Accounts>::blank(&ctx);
        let mut b = binding("alice");
        b.server.clear();
        assert!(!accounts.store("acct", b"x", "", &b).unwrap());
        assert!(!accounts.exists("acct"));
    }

    #[test]
    fn unknown_unit_may_be_resolved_once() {
        let ctx = context();
        let accounts = Node::<Accounts>::blank(&ctx);
        let mut b = binding("alice");
        b.unit = UnitType::Unknown;
        assert!(accounts.store("acct", b"x", "", &b).unwrap());
        b.unit = UnitType::Btc;
        assert!(accounts.store("acct", b"y", "", &b).unwrap());
        assert_eq!(accounts.account_unit("acct"), UnitType::Btc);
        b.unit = UnitType::Eth;
        assert!(!accounts.store("acct", b"z", "", &b).unwrap());
    }

    #[test]
    fn concurrent_first_stores_bind_exactly_once() {
        let ctx = context();
        let accounts = Node::<Accounts>::blank(&ctx);
        let owners: Vec<String> = (0..8).map(|i| format!("owner-{i}")).collect();
        let accepted: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = owners
                .iter()
                .map(|owner| {
                    let accounts = &accounts;
                    scope.spawn(move || {
                        accounts
                            .store("acct", owner.as_bytes(), "", &binding(owner))
                            .unwrap()
                            .then(|| owner.clone())
                    })
                })
                .collect();
            handles.into_iter().filter_map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(accepted.len(), 1);
        assert_eq!(accounts.account_owner("acct"), Some(accepted[0].clone()));
        assert_eq!(accounts.accounts_by_owner(&accepted[0]).len(), 1);
        assert_eq!(accounts.load("acct", false).unwrap().unwrap().0, accepted[0].as_bytes());
    }

    #[test]
    fn round_trip_restores_indices() {
        let ctx = context();
        let accounts = Node::<Accounts>::blank(&ctx);
        accounts.store("acct1", b"one", "a", &binding("alice")).unwrap();
        let mut other = binding("bob");
        other.unit = UnitType::Btc;
        accounts.store("acct2", b"two", "b", &other).unwrap();

        let reopened = Node::<Accounts>::open(&ctx, &accounts.root_hash()).unwrap();
        assert_eq!(reopened.list(), accounts.list());
        for id in ["acct1", "acct2"] {
            assert_eq!(reopened.binding(id), accounts.binding(id));
        }
        assert_eq!(reopened.accounts_by_unit(UnitType::Btc), BTreeSet::from(["acct2".to_string()]));
        assert_eq!(reopened.root_hash(), accounts.root_hash());
    }

    proptest! {
        #[test]
        fn bindings_are_immutable(field in 0usize..5, replacement in "[a-z]{1,8}") {
            let ctx = context();
            let accounts = Node::<Accounts>::blank(&ctx);
            let original = binding("alice");
            accounts.store("acct", b"data", "", &original).unwrap();
            let root = accounts.root_hash();

            let mut changed = original.clone();
            let target = match field {
                0 => &mut changed.owner,
                1 => &mut changed.signer,
                2 => &mut changed.issuer,
                3 => &mut changed.server,
                _ => &mut changed.contract,
            };
            prop_assume!(*target != replacement);
            *target = replacement;

            prop_assert!(!accounts.store("acct", b"other", "", &changed).unwrap());
            prop_assert_eq!(accounts.binding("acct"), Some(original.clone()));
            prop_assert_eq!(accounts.root_hash(), root);
            prop_assert_eq!(accounts.accounts_by_owner("alice").len(), 1);
            prop_assert_eq!(accounts.accounts_by_signer("signer").len(), 1);
            prop_assert_eq!(accounts.accounts_by_issuer("issuer").len(), 1);
            prop_assert_eq!(accounts.accounts_by_server("server").len(), 1);
            prop_assert_eq!(accounts.accounts_by_contract("contract").len(), 1);
        }
    }
}
