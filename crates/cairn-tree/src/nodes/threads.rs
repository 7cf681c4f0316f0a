//! The set of conversation threads belonging to one nym.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use cairn_store::{Driver, StoreResult};
use tracing::debug;

use crate::editor::{editor_methods, Editor};
use crate::node::{ItemMap, Metadata, Node, NodeContext, NodeKind};
use crate::nodes::thread::Thread;

/// Items are threads; each item hash is the root of a [`Thread`] node.
#[derive(Default)]
pub struct Threads {
    cache: HashMap<String, Arc<Node<Thread>>>,
}

fn cache(threads: &mut Threads) -> &mut HashMap<String, Arc<Node<Thread>>> {
    &mut threads.cache
}

impl NodeKind for Threads {
    const NAME: &'static str = "threads";
    const VERSION: u32 = 1;
    type Index = ();

    fn migrate_children(&self, ctx: &NodeContext, items: &ItemMap, to: &dyn Driver) -> StoreResult<bool> {
        let mut complete = true;
        for meta in items.values() {
            complete &= Node::<Thread>::open(ctx, &meta.hash)?.migrate(to)?;
        }
        Ok(complete)
    }
}

impl Node<Threads> {
    /// Create an empty thread. Returns `false` if `id` already exists.
    pub(crate) fn create(&self, id: &str, participants: &BTreeSet<String>) -> StoreResult<bool> {
        let mut state = self.lock();
        if state.items.contains_key(id) {
            return Ok(false);
        }
        let thread = Arc::new(Node::<Thread>::blank(self.ctx()));
        thread.initialize(id, participants)?;
        state
            .items
            .insert(id.to_string(), Metadata::new(thread.root_hash(), ""));
        state.kind.cache.insert(id.to_string(), thread);
        self.save(&mut state)?;
        Ok(true)
    }

    pub fn thread(&self, id: &str) -> StoreResult<Option<Arc<Node<Thread>>>> {
        self.item_child(id, cache)
    }

    /// Editor for an existing thread, or `None` if it does not exist.
    pub fn mutable_thread(parent: Editor<Node<Threads>>, id: &str) -> StoreResult<Option<Editor<Node<Thread>>>> {
        if !parent.exists(id) {
            return Ok(None);
        }
        Node::item_child_editor(parent, id, cache).map(Some)
    }

    pub(crate) fn remove_thread(&self, id: &str) -> StoreResult<bool> {
        self.delete_with(id, |threads, id| {
            threads.cache.remove(id);
        })
    }

    /// Remove `item` from every thread that references it.
    pub(crate) fn find_and_delete_item(&self, item: &str) -> StoreResult<bool> {
        let ids: Vec<String> = self.lock().items.keys().cloned().collect();
        let mut found = false;
        for id in ids {
            let Some(thread) = self.thread(&id)? else {
                continue;
            };
            if !thread.remove_item(item)? {
                continue;
            }
            debug!(thread = %id, item, "removed thread item");
            let mut state = self.lock();
            if let Some(meta) = state.items.get_mut(&id) {
                meta.hash = thread.root_hash();
            }
            self.save(&mut state)?;
            found = true;
        }
        Ok(found)
    }
}

editor_methods! {
    impl Threads {
        fn create(&self, id: &str, participants: &BTreeSet<String>) -> StoreResult<bool>;
        fn remove_thread(&self, id: &str) -> StoreResult<bool>;
        fn find_and_delete_item(&self, item: &str) -> StoreResult<bool>;
    }
}
