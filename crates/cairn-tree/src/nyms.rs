//! The set of identities known to the store.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use cairn_store::{Driver, StoreResult};
use serde::{Deserialize, Serialize};

use crate::editor::{editor_methods, Editor};
use crate::node::{ItemMap, Node, NodeContext, NodeKind};
use crate::nym::Nym;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NymsIndexRecord {
    /// Nyms whose private keys are held locally.
    pub local: BTreeSet<String>,
}

/// Items are identities; each item hash is the root of a [`Nym`] node.
#[derive(Default)]
pub struct Nyms {
    local: BTreeSet<String>,
    cache: HashMap<String, Arc<Node<Nym>>>,
}

fn cache(nyms: &mut Nyms) -> &mut HashMap<String, Arc<Node<Nym>>> {
    &mut nyms.cache
}

impl NodeKind for Nyms {
    const NAME: &'static str = "nyms";
    const VERSION: u32 = 2;
    type Index = NymsIndexRecord;

    fn load_index(&mut self, _ctx: &NodeContext, index: NymsIndexRecord, items: &mut ItemMap) -> StoreResult<()> {
        self.local = index.local.into_iter().filter(|id| items.contains_key(id)).collect();
        Ok(())
    }

    fn save_index(&self, items: &ItemMap) -> NymsIndexRecord {
        NymsIndexRecord {
            local: self.local.iter().filter(|id| items.contains_key(*id)).cloned().collect(),
        }
    }

    fn migrate_children(&self, ctx: &NodeContext, items: &ItemMap, to: &dyn Driver) -> StoreResult<bool> {
        let mut complete = true;
        for meta in items.values() {
            complete &= Node::<Nym>::open(ctx, &meta.hash)?.migrate(to)?;
        }
        Ok(complete)
    }
}

impl Node<Nyms> {
    pub fn nym(&self, id: &str) -> StoreResult<Option<Arc<Node<Nym>>>> {
        self.item_child(id, cache)
    }

    /// Editor for nym `id`, created empty if it does not exist yet.
    pub fn mutable_nym(parent: Editor<Node<Nyms>>, id: &str) -> StoreResult<Editor<Node<Nym>>> {
        let created = !parent.exists(id);
        let editor = Node::item_child_editor(parent, id, cache)?;
        if created {
            editor.initialize(id)?;
        }
        Ok(editor)
    }

    pub fn local_nyms(&self) -> BTreeSet<String> {
        self.lock().kind.local.clone()
    }

    /// Returns `false` if `id` is unknown.
    pub(crate) fn set_local(&self, id: &str, local: bool) -> StoreResult<bool> {
        let mut state = self.lock();
        if !state.items.contains_key(id) {
            return Ok(false);
        }
        let changed = if local {
            state.kind.local.insert(id.to_string())
        } else {
            state.kind.local.remove(id)
        };
        if changed {
            self.save(&mut state)?;
        }
        Ok(true)
    }

    pub(crate) fn delete(&self, id: &str) -> StoreResult<bool> {
        self.delete_with(id, |nyms, id| {
            nyms.local.remove(id);
            nyms.cache.remove(id);
        })
    }
}

editor_methods! {
    impl Nyms {
        fn set_local(&self, id: &str, local: bool) -> StoreResult<bool>;
        fn delete(&self, id: &str) -> StoreResult<bool>;
    }
}
