//! Payment workflows and their lookup indices.

use std::collections::{BTreeMap, BTreeSet};

use cairn_store::StoreResult;
use cairn_types::UnitType;
use serde::{Deserialize, Serialize};

use crate::editor::editor_methods;
use crate::node::{ItemMap, Node, NodeContext, NodeKind, Revisioned};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkflowType {
    OutgoingCheque,
    IncomingCheque,
    OutgoingInvoice,
    IncomingInvoice,
    OutgoingTransfer,
    IncomingTransfer,
    InternalTransfer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkflowState {
    Unsent,
    Initiated,
    Conveyed,
    Acknowledged,
    Accepted,
    Completed,
    Rejected,
    Cancelled,
    Aborted,
    Expired,
}

/// One payment workflow. `sources` are the instrument or message IDs the
/// workflow was started from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: String,
    pub revision: u64,
    pub kind: WorkflowType,
    pub state: WorkflowState,
    pub sources: Vec<String>,
    pub account: String,
    pub unit: UnitType,
    pub data: Vec<u8>,
}

impl Revisioned for WorkflowRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}

/// Everything the indices need to know about one workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEntry {
    pub kind: WorkflowType,
    pub state: WorkflowState,
    pub sources: BTreeSet<String>,
    pub account: String,
    pub unit: UnitType,
}

impl From<&WorkflowRecord> for WorkflowEntry {
    fn from(record: &WorkflowRecord) -> Self {
        Self {
            kind: record.kind,
            state: record.state,
            sources: record.sources.iter().cloned().collect(),
            account: record.account.clone(),
            unit: record.unit,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowIndexRecord {
    pub workflows: BTreeMap<String, WorkflowEntry>,
}

#[derive(Default)]
pub struct PaymentWorkflows {
    entries: BTreeMap<String, WorkflowEntry>,
    by_state: BTreeMap<(WorkflowType, WorkflowState), BTreeSet<String>>,
    by_source: BTreeMap<String, String>,
    by_account: BTreeMap<String, BTreeSet<String>>,
    by_unit: BTreeMap<UnitType, BTreeSet<String>>,
}

impl PaymentWorkflows {
    fn insert(&mut self, id: &str, entry: WorkflowEntry) {
        self.remove(id);
        self.by_state
            .entry((entry.kind, entry.state))
            .or_default()
            .insert(id.to_string());
        for source in &entry.sources {
            self.by_source.insert(source.clone(), id.to_string());
        }
        if !entry.account.is_empty() {
            self.by_account
                .entry(entry.account.clone())
                .or_default()
                .insert(id.to_string());
        }
        self.by_unit.entry(entry.unit).or_default().insert(id.to_string());
        self.entries.insert(id.to_string(), entry);
    }

    fn remove(&mut self, id: &str) {
        let Some(old) = self.entries.remove(id) else {
            return;
        };
        drop_from(&mut self.by_state, &(old.kind, old.state), id);
        for source in &old.sources {
            if self.by_source.get(source).is_some_and(|owner| owner == id) {
                self.by_source.remove(source);
            }
        }
        drop_from(&mut self.by_account, &old.account, id);
        drop_from(&mut self.by_unit, &old.unit, id);
    }
}

fn drop_from<K: Ord>(index: &mut BTreeMap<K, BTreeSet<String>>, key: &K, id: &str) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

impl NodeKind for PaymentWorkflows {
    const NAME: &'static str = "payment-workflows";
    const VERSION: u32 = 1;
    type Index = WorkflowIndexRecord;

    fn load_index(&mut self, _ctx: &NodeContext, index: WorkflowIndexRecord, items: &mut ItemMap) -> StoreResult<()> {
        for (id, entry) in index.workflows {
            if items.contains_key(&id) {
                self.insert(&id, entry);
            }
        }
        Ok(())
    }

    fn save_index(&self, items: &ItemMap) -> WorkflowIndexRecord {
        WorkflowIndexRecord {
            workflows: self
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

impl Node<PaymentWorkflows> {
    /// Store a workflow; a revision not newer than the stored one is ignored.
    pub(crate) fn store(&self, record: &WorkflowRecord) -> StoreResult<bool> {
        self.store_revisioned(record, "", |workflows, record| {
            workflows.insert(&record.id, WorkflowEntry::from(record))
        })
    }

    pub fn load(&self, id: &str, checking: bool) -> StoreResult<Option<WorkflowRecord>> {
        Ok(self.load_record(id, checking)?.map(|(record, _)| record))
    }

    pub(crate) fn delete(&self, id: &str) -> StoreResult<bool> {
        self.delete_with(id, |workflows, id| workflows.remove(id))
    }

    /// The workflow started from `source`.
    pub fn lookup_by_source(&self, source: &str) -> Option<String> {
        self.lock().kind.by_source.get(source).cloned()
    }

    pub fn list_by_state(&self, kind: WorkflowType, state: WorkflowState) -> BTreeSet<String> {
        self.lock()
            .kind
            .by_state
            .get(&(kind, state))
            .cloned()
            .unwrap_or_default()
    }

    pub fn list_by_account(&self, account: &str) -> BTreeSet<String> {
        self.lock().kind.by_account.get(account).cloned().unwrap_or_default()
    }

    pub fn list_by_unit(&self, unit: UnitType) -> BTreeSet<String> {
        self.lock().kind.by_unit.get(&unit).cloned().unwrap_or_default()
    }

    pub fn workflow_state(&self, id: &str) -> Option<(WorkflowType, WorkflowState)> {
        self.lock().kind.entries.get(id).map(|entry| (entry.kind, entry.state))
    }
}

editor_methods! {
    impl PaymentWorkflows {
        fn store(&self, record: &WorkflowRecord) -> StoreResult<bool>;
        fn delete(&self, id: &str) -> StoreResult<bool>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::tests::context;

    fn workflow(id: &str, revision: u64, state: WorkflowState) -> WorkflowRecord {
        WorkflowRecord {
            id: id.into(),
            revision,
            kind: WorkflowType::OutgoingCheque,
            state,
            sources: vec![format!("cheque-{id}")],
            account: "acct".into(),
            unit: UnitType::Usd,
            data: Vec::new(),
        }
    }

    #[test]
    fn state_changes_move_between_lists() {
        let ctx = context();
        let workflows = Node::<PaymentWorkflows>::blank(&ctx);
        workflows.store(&workflow("w1", 1, WorkflowState::Unsent)).unwrap();
        assert_eq!(
            workflows.list_by_state(WorkflowType::OutgoingCheque, WorkflowState::Unsent).len(),
            1
        );

        workflows.store(&workflow("w1", 2, WorkflowState::Conveyed)).unwrap();
        assert!(workflows
            .list_by_state(WorkflowType::OutgoingCheque, WorkflowState::Unsent)
            .is_empty());
        assert_eq!(
            workflows.workflow_state("w1"),
            Some((WorkflowType::OutgoingCheque, WorkflowState::Conveyed))
        );

        workflows.store(&workflow("w1", 1, WorkflowState::Cancelled)).unwrap();
        assert_eq!(workflows.load("w1", false).unwrap().unwrap().state, WorkflowState::Conveyed);
    }

    #[test]
    fn source_account_and_unit_lookups() {
        let ctx = context();
        let workflows = Node::<PaymentWorkflows>::blank(&ctx);
        workflows.store(&workflow("w1", 1, WorkflowState::Unsent)).unwrap();
        workflows.store(&workflow("w2", 1, WorkflowState::Unsent)).unwrap();
        assert_eq!(workflows.lookup_by_source("cheque-w2").as_deref(), Some("w2"));
        assert_eq!(workflows.list_by_account("acct").len(), 2);
        assert_eq!(workflows.list_by_unit(UnitType::Usd).len(), 2);

        workflows.delete("w2").unwrap();
        assert_eq!(workflows.lookup_by_source("cheque-w2"), None);
        assert_eq!(workflows.list_by_account("acct").len(), 1);
    }

    #[test]
    fn round_trip_restores_indices() {
        let ctx = context();
        let workflows = Node::<PaymentWorkflows>::blank(&ctx);
        workflows.store(&workflow("w1", 3, WorkflowState::Accepted)).unwrap();
        let mut other = workflow("w2", 1, WorkflowState::Unsent);
        other.kind = WorkflowType::IncomingInvoice;
        other.unit = UnitType::Btc;
        workflows.store(&other).unwrap();

        let reopened = Node::<PaymentWorkflows>::open(&ctx, &workflows.root_hash()).unwrap();
        assert_eq!(reopened.list(), workflows.list());
        assert_eq!(reopened.workflow_state("w2"), workflows.workflow_state("w2"));
        assert_eq!(reopened.list_by_unit(UnitType::Btc), BTreeSet::from(["w2".to_string()]));
        assert_eq!(reopened.lookup_by_source("cheque-w1").as_deref(), Some("w1"));
        assert_eq!(reopened.root_hash(), workflows.root_hash());
    }
}
