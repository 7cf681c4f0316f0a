//! Generic storage-tree node.
//!
//! A node is an index from logical item IDs to `(hash, alias, revision,
//! private)` metadata, persisted as one immutable [`IndexRecord`]. Each
//! concrete node kind adds its own secondary-index section through
//! [`NodeKind`]. Mutating a node re-serializes it and replaces its root
//! hash; propagating that hash to the parent is the job of the [`Editor`].

use std::collections::{BTreeMap, HashMap};
use std::ptr;
use std::sync::Arc;

use cairn_store::{Driver, DriverExt, StorageItem, StoreError, StoreResult};
use cairn_types::{ContentHash, HashBand};
use parking_lot::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::editor::{Editable, Editor};

/// Driver and hash sanitation band shared by every node of one tree.
#[derive(Clone)]
pub struct NodeContext {
    driver: Arc<dyn Driver>,
    band: HashBand,
}

impl NodeContext {
    pub fn new(driver: Arc<dyn Driver>, band: HashBand) -> Self {
        Self { driver, band }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn band(&self) -> HashBand {
        self.band
    }

    /// Coerce a persisted hash outside the band to blank.
    pub fn normalize(&self, hash: &ContentHash) -> ContentHash {
        ContentHash::normalize_with(hash.as_str(), self.band)
    }
}

/// Per-item bookkeeping.
///
/// `revision` is a cache that starts at zero after loading; the real value
/// is read from the stored record the first time a revisioned write needs it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    pub hash: ContentHash,
    pub alias: String,
    pub revision: u64,
    pub private: bool,
}

impl Metadata {
    pub fn new(hash: ContentHash, alias: impl Into<String>) -> Self {
        Self {
            hash,
            alias: alias.into(),
            revision: 0,
            private: false,
        }
    }
}

pub type ItemMap = BTreeMap<String, Metadata>;

/// The persisted shape of every node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexRecord<I> {
    pub version: u32,
    pub items: Vec<StorageItem>,
    pub index: I,
}

/// A stored record that carries its own ID and a monotonic revision.
pub trait Revisioned {
    fn id(&self) -> &str;
    fn revision(&self) -> u64;
}

/// Type-specific behaviour of a node.
pub trait NodeKind: Default + Send + 'static {
    const NAME: &'static str;
    /// Version written on the next save.
    const VERSION: u32;
    /// Item-list nodes with nothing in them are saved as the blank hash.
    const ITEM_LIST: bool = true;

    /// Secondary-index section of the persisted record.
    type Index: Serialize + DeserializeOwned + Default;

    /// Rebuild in-memory indices from the persisted section.
    fn load_index(
        &mut self,
        _ctx: &NodeContext,
        _index: Self::Index,
        _items: &mut ItemMap,
    ) -> StoreResult<()> {
        Ok(())
    }

    /// Recompute the persisted section from scratch.
    fn save_index(&self, _items: &ItemMap) -> Self::Index {
        Self::Index::default()
    }

    /// Whether every secondary section is empty.
    fn is_empty(&self) -> bool {
        true
    }

    /// Copy child subtrees that are not plain item blobs.
    fn migrate_children(
        &self,
        _ctx: &NodeContext,
        _items: &ItemMap,
        _to: &dyn Driver,
    ) -> StoreResult<bool> {
        Ok(true)
    }
}

/// Mutable state of a node, guarded by the node's lock.
pub struct NodeState<K> {
    pub(crate) original_version: u32,
    pub(crate) version: u32,
    pub(crate) root: ContentHash,
    pub(crate) items: ItemMap,
    pub(crate) kind: K,
}

pub struct Node<K: NodeKind> {
    ctx: NodeContext,
    edit: Arc<Mutex<()>>,
    state: Mutex<NodeState<K>>,
}

/// Selects a lazily loaded child slot inside a parent kind.
pub(crate) type Pick<P, C> = fn(&mut P) -> &mut Slot<C>;

/// Selects the cache of item-keyed children inside a parent kind.
pub(crate) type PickMap<P, C> = fn(&mut P) -> &mut HashMap<String, Arc<Node<C>>>;

impl<K: NodeKind> Node<K> {
    /// Load the node stored under `hash`, or an empty node for a blank hash.
    ///
    /// A non-blank hash promises that the record exists; a missing or
    /// undecodable record is corruption.
    pub fn open(ctx: &NodeContext, hash: &ContentHash) -> StoreResult<Self> {
        let root = ctx.normalize(hash);
        let mut state = NodeState {
            original_version: K::VERSION,
            version: K::VERSION,
            root: root.clone(),
            items: ItemMap::new(),
            kind: K::default(),
        };

        if !root.is_blank() {
            let record: IndexRecord<K::Index> = ctx
                .driver
                .load_record(&root, false)?
                .ok_or_else(|| StoreError::corrupt(&root, format!("{} index is missing", K::NAME)))?;
            state.original_version = record.version;
            state.version = record.version.max(K::VERSION);
            if state.version != state.original_version {
                debug!(
                    node = K::NAME,
                    from = state.original_version,
                    to = state.version,
                    "index will be upgraded on next save"
                );
            }
            for item in record.items {
                let hash = ctx.normalize(&item.hash);
                state.items.insert(item.item_id, Metadata::new(hash, item.alias));
            }
            let NodeState { kind, items, .. } = &mut state;
            kind.load_index(ctx, record.index, items)?;
        }

        Ok(Self {
            ctx: ctx.clone(),
            edit: Arc::new(Mutex::new(())),
            state: Mutex::new(state),
        })
    }

    /// An empty, unsaved node.
    pub fn blank(ctx: &NodeContext) -> Self {
        Self {
            ctx: ctx.clone(),
            edit: Arc::new(Mutex::new(())),
            state: Mutex::new(NodeState {
                original_version: K::VERSION,
                version: K::VERSION,
                root: ContentHash::blank(),
                items: ItemMap::new(),
                kind: K::default(),
            }),
        }
    }

    pub(crate) fn ctx(&self) -> &NodeContext {
        &self.ctx
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, NodeState<K>> {
        self.state.lock()
    }

    /// Serialize and store the node, replacing its root hash.
    ///
    /// `state` must be this node's own guard. Anything else means the
    /// caller mutated state it did not hold, which is reported as a fatal
    /// [`StoreError::LockViolation`].
    pub(crate) fn save(&self, state: &mut MutexGuard<'_, NodeState<K>>) -> StoreResult<()> {
        if !ptr::eq(MutexGuard::mutex(state), &self.state) {
            return Err(StoreError::LockViolation { node: K::NAME });
        }
        let hash = if K::ITEM_LIST && state.items.is_empty() && state.kind.is_empty() {
            ContentHash::blank()
        } else {
            let record = IndexRecord {
                version: state.version,
                items: state
                    .items
                    .iter()
                    .map(|(id, meta)| StorageItem::new(id.clone(), meta.hash.clone(), meta.alias.clone()))
                    .collect(),
                index: state.kind.save_index(&state.items),
            };
            self.ctx.driver.store_record(false, &record)?
        };
        state.original_version = state.version;
        state.root = hash;
        Ok(())
    }

    pub fn root_hash(&self) -> ContentHash {
        self.state.lock().root.clone()
    }

    pub fn version(&self) -> u32 {
        self.state.lock().version
    }

    /// Version of the record this node was loaded from.
    pub fn original_version(&self) -> u32 {
        self.state.lock().original_version
    }

    /// `(id, alias)` for every item.
    pub fn list(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .items
            .iter()
            .map(|(id, meta)| (id.clone(), meta.alias.clone()))
            .collect()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.state.lock().items.contains_key(id)
    }

    pub fn alias(&self, id: &str) -> Option<String> {
        self.state.lock().items.get(id).map(|meta| meta.alias.clone())
    }

    pub fn metadata(&self, id: &str) -> Option<Metadata> {
        self.state.lock().items.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Returns `false` if `id` is unknown.
    pub(crate) fn set_alias(&self, id: &str, alias: &str) -> StoreResult<bool> {
        let mut state = self.lock();
        match state.items.get_mut(id) {
            Some(meta) => meta.alias = alias.to_string(),
            None => return Ok(false),
        }
        self.save(&mut state)?;
        Ok(true)
    }

    /// Remove `id` and persist. Returns `false` if `id` is unknown.
    pub(crate) fn delete_item(&self, id: &str) -> StoreResult<bool> {
        self.delete_with(id, |_, _| {})
    }

    /// Remove `id`, letting `unindex` drop it from secondary indices first.
    pub(crate) fn delete_with(&self, id: &str, unindex: impl FnOnce(&mut K, &str)) -> StoreResult<bool> {
        let mut state = self.lock();
        if !state.items.contains_key(id) {
            return Ok(false);
        }
        unindex(&mut state.kind, id);
        state.items.remove(id);
        self.save(&mut state)?;
        Ok(true)
    }

    /// Load an opaque blob and its alias.
    pub fn load_raw(&self, id: &str, checking: bool) -> StoreResult<Option<(Vec<u8>, String)>> {
        let meta = match self.metadata(id) {
            Some(meta) => meta,
            None => {
                if !checking {
                    warn!(node = K::NAME, item = id, "item not found");
                }
                return Ok(None);
            }
        };
        Ok(self
            .ctx
            .driver
            .load(&meta.hash, checking)?
            .map(|bytes| (bytes, meta.alias)))
    }

    /// Store an opaque blob under `id`.
    pub(crate) fn store_raw(&self, id: &str, data: &[u8], alias: &str) -> StoreResult<bool> {
        self.store_raw_with(id, data, alias, |_, _| {})
    }

    pub(crate) fn store_raw_with(
        &self,
        id: &str,
        data: &[u8],
        alias: &str,
        index: impl FnOnce(&mut K, &mut Metadata),
    ) -> StoreResult<bool> {
        self.store_raw_checked(id, data, alias, |_| true, index)
    }

    /// Like [`Node::store_raw_with`], but `accept` inspects the secondary
    /// index under the same lock as the write and may refuse it.
    pub(crate) fn store_raw_checked(
        &self,
        id: &str,
        data: &[u8],
        alias: &str,
        accept: impl FnOnce(&K) -> bool,
        index: impl FnOnce(&mut K, &mut Metadata),
    ) -> StoreResult<bool> {
        let hash = self.ctx.driver.store_value(false, data)?;
        self.insert_hash(id, hash, alias, accept, index)
    }

    /// Store an unrevisioned typed record under `id`.
    pub(crate) fn store_record_with<T: Serialize>(
        &self,
        id: &str,
        record: &T,
        alias: &str,
        index: impl FnOnce(&mut K, &mut Metadata),
    ) -> StoreResult<bool> {
        let hash = self.ctx.driver.store_record(false, record)?;
        self.insert_hash(id, hash, alias, |_| true, index)
    }

    fn insert_hash(
        &self,
        id: &str,
        hash: ContentHash,
        alias: &str,
        accept: impl FnOnce(&K) -> bool,
        index: impl FnOnce(&mut K, &mut Metadata),
    ) -> StoreResult<bool> {
        let mut state = self.lock();
        if !accept(&state.kind) {
            return Ok(false);
        }
        let NodeState { items, kind, .. } = &mut *state;
        let meta = items
            .entry(id.to_string())
            .or_insert_with(|| Metadata::new(ContentHash::blank(), ""));
        meta.hash = hash;
        meta.alias = alias.to_string();
        index(kind, meta);
        self.save(&mut state)?;
        Ok(true)
    }

    /// Load and decode a typed record.
    pub fn load_record<T: DeserializeOwned>(&self, id: &str, checking: bool) -> StoreResult<Option<(T, String)>> {
        let meta = match self.metadata(id) {
            Some(meta) => meta,
            None => {
                if !checking {
                    warn!(node = K::NAME, item = id, "item not found");
                }
                return Ok(None);
            }
        };
        Ok(self
            .ctx
            .driver
            .load_record(&meta.hash, checking)?
            .map(|record| (record, meta.alias)))
    }

    /// Store a revisioned record unless an equal or newer revision is
    /// already recorded. A stale write is a successful no-op.
    pub(crate) fn store_record<T>(&self, record: &T, alias: &str) -> StoreResult<bool>
    where
        T: Serialize + DeserializeOwned + Revisioned,
    {
        self.store_revisioned(record, alias, |_, _| {})
    }

    pub(crate) fn store_revisioned<T>(
        &self,
        record: &T,
        alias: &str,
        index: impl FnOnce(&mut K, &T),
    ) -> StoreResult<bool>
    where
        T: Serialize + DeserializeOwned + Revisioned,
    {
        let id = record.id();
        let mut state = self.lock();
        if !self.is_newer::<T>(&mut state, id, record.revision())? {
            debug!(node = K::NAME, item = id, revision = record.revision(), "stale write ignored");
            return Ok(true);
        }
        let hash = self.ctx.driver.store_record(false, record)?;
        let NodeState { items, kind, .. } = &mut *state;
        let meta = items
            .entry(id.to_string())
            .or_insert_with(|| Metadata::new(ContentHash::blank(), ""));
        meta.hash = hash;
        meta.alias = alias.to_string();
        meta.revision = record.revision();
        index(kind, record);
        self.save(&mut state)?;
        Ok(true)
    }

    /// Whether `incoming` is strictly greater than the recorded revision,
    /// loading the recorded revision from the backend if it is not cached.
    fn is_newer<T>(&self, state: &mut NodeState<K>, id: &str, incoming: u64) -> StoreResult<bool>
    where
        T: DeserializeOwned + Revisioned,
    {
        let Some(meta) = state.items.get_mut(id) else {
            return Ok(true);
        };
        if meta.revision == 0 {
            meta.revision = self
                .ctx
                .driver
                .load_record::<T>(&meta.hash, true)?
                .map_or(0, |stored| stored.revision());
        }
        Ok(incoming > meta.revision)
    }

    /// Copy this node, every item blob and every child subtree into `to`.
    ///
    /// Returns `true` only if every copy succeeded.
    pub fn migrate(&self, to: &dyn Driver) -> StoreResult<bool> {
        let state = self.lock();
        if state.root.is_blank() {
            return Ok(true);
        }
        if K::ITEM_LIST && state.items.is_empty() && state.kind.is_empty() {
            return Err(StoreError::corrupt(
                &state.root,
                format!("{} index is non-blank but has no items", K::NAME),
            ));
        }
        let mut complete = self.ctx.driver.migrate(&state.root, to)?;
        for (id, meta) in &state.items {
            if !self.ctx.driver.migrate(&meta.hash, to)? {
                warn!(node = K::NAME, item = %id, "item missing during migration");
                complete = false;
            }
        }
        complete &= state.kind.migrate_children(&self.ctx, &state.items, to)?;
        Ok(complete)
    }

    /// The child in `pick`, loaded on first access and cached.
    pub(crate) fn child<C: NodeKind>(&self, pick: Pick<K, C>) -> StoreResult<Arc<Node<C>>> {
        let mut state = self.lock();
        pick(&mut state.kind).get(&self.ctx)
    }

    /// The item-keyed child `id`, or `None` if no such item exists.
    pub(crate) fn item_child<C: NodeKind>(&self, id: &str, pick: PickMap<K, C>) -> StoreResult<Option<Arc<Node<C>>>> {
        let mut state = self.lock();
        let Some(hash) = state.items.get(id).map(|meta| meta.hash.clone()) else {
            return Ok(None);
        };
        self.cached_item_child(&mut state, id, &hash, pick).map(Some)
    }

    fn cached_item_child<C: NodeKind>(
        &self,
        state: &mut NodeState<K>,
        id: &str,
        hash: &ContentHash,
        pick: PickMap<K, C>,
    ) -> StoreResult<Arc<Node<C>>> {
        let cache = pick(&mut state.kind);
        if let Some(node) = cache.get(id) {
            return Ok(node.clone());
        }
        let node = Arc::new(Node::open(&self.ctx, hash)?);
        cache.insert(id.to_string(), node.clone());
        Ok(node)
    }

    /// Editor for the child in `pick`. Committing it stores the child's new
    /// hash in this node, saves this node, then commits `parent`.
    pub(crate) fn child_editor<C: NodeKind>(parent: Editor<Node<K>>, pick: Pick<K, C>) -> StoreResult<Editor<Node<C>>> {
        let child = parent.child(pick)?;
        Ok(Editor::new(child, move |child: &Node<C>| {
            let hash = child.root_hash();
            {
                let mut state = parent.lock();
                pick(&mut state.kind).set_hash(hash);
                parent.save(&mut state)?;
            }
            parent.commit()
        }))
    }

    /// Editor for the item-keyed child `id`, created if missing.
    pub(crate) fn item_child_editor<C: NodeKind>(
        parent: Editor<Node<K>>,
        id: &str,
        pick: PickMap<K, C>,
    ) -> StoreResult<Editor<Node<C>>> {
        let child = {
            let mut state = parent.lock();
            let hash = state
                .items
                .get(id)
                .map_or_else(ContentHash::blank, |meta| meta.hash.clone());
            parent.cached_item_child(&mut state, id, &hash, pick)?
        };
        let id = id.to_string();
        Ok(Editor::new(child, move |child: &Node<C>| {
            let hash = child.root_hash();
            {
                let mut state = parent.lock();
                state
                    .items
                    .entry(id)
                    .or_insert_with(|| Metadata::new(ContentHash::blank(), ""))
                    .hash = hash;
                parent.save(&mut state)?;
            }
            parent.commit()
        }))
    }
}

impl<K: NodeKind> Editable for Node<K> {
    fn edit_lock(&self) -> &Arc<Mutex<()>> {
        &self.edit
    }

    fn label(&self) -> &'static str {
        K::NAME
    }
}

impl<K: NodeKind> Editor<Node<K>> {
    /// Returns `false` if `id` is unknown.
    pub fn set_alias(&self, id: &str, alias: &str) -> StoreResult<bool> {
        self.target().set_alias(id, alias)
    }
}

impl<K: NodeKind> std::fmt::Debug for Node<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Node")
            .field("kind", &K::NAME)
            .field("root", &state.root)
            .field("items", &state.items.len())
            .finish()
    }
}

/// A lazily loaded child node, addressed by the hash its parent persists.
pub struct Slot<C: NodeKind> {
    hash: ContentHash,
    node: Option<Arc<Node<C>>>,
}

impl<C: NodeKind> Default for Slot<C> {
    fn default() -> Self {
        Self {
            hash: ContentHash::blank(),
            node: None,
        }
    }
}

impl<C: NodeKind> Slot<C> {
    pub(crate) fn new(hash: ContentHash) -> Self {
        Self { hash, node: None }
    }

    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    pub(crate) fn set_hash(&mut self, hash: ContentHash) {
        self.hash = hash;
    }

    pub(crate) fn get(&mut self, ctx: &NodeContext) -> StoreResult<Arc<Node<C>>> {
        if let Some(node) = &self.node {
            return Ok(node.clone());
        }
        let node = Arc::new(Node::open(ctx, &self.hash)?);
        self.node = Some(node.clone());
        Ok(node)
    }

    /// Migrate the persisted subtree, ignoring any cached instance.
    pub(crate) fn migrate(&self, ctx: &NodeContext, to: &dyn Driver) -> StoreResult<bool> {
        if self.hash.is_blank() {
            return Ok(true);
        }
        Node::<C>::open(ctx, &self.hash)?.migrate(to)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use cairn_store::{BucketFlag, MemoryDriver};

    pub(crate) fn context() -> NodeContext {
        NodeContext::new(Arc::new(MemoryDriver::new(BucketFlag::default())), HashBand::DEFAULT)
    }

    #[derive(Default)]
    struct Plain;

    impl NodeKind for Plain {
        const NAME: &'static str = "plain";
        const VERSION: u32 = 3;
        type Index = ();
    }

    #[derive(Serialize, Deserialize)]
    struct Note {
        id: String,
        revision: u64,
        body: String,
    }

    impl Revisioned for Note {
        fn id(&self) -> &str {
            &self.id
        }
        fn revision(&self) -> u64 {
            self.revision
        }
    }

    fn note(revision: u64, body: &str) -> Note {
        Note {
            id: "n1".into(),
            revision,
            body: body.into(),
        }
    }

    #[test]
    fn empty_item_list_saves_blank() {
        let ctx = context();
        let node = Node::<Plain>::blank(&ctx);
        node.store_raw("a", b"data", "alias").unwrap();
        assert!(!node.root_hash().is_blank());
        node.delete_item("a").unwrap();
        assert!(node.root_hash().is_blank());
    }

    #[test]
    fn reopen_restores_items_and_aliases() {
        let ctx = context();
        let node = Node::<Plain>::blank(&ctx);
        node.store_raw("a", b"alpha", "first").unwrap();
        node.store_raw("b", b"beta", "second").unwrap();
        node.set_alias("b", "renamed").unwrap();

        let reopened = Node::<Plain>::open(&ctx, &node.root_hash()).unwrap();
        assert_eq!(reopened.list(), node.list());
        let (data, alias) = reopened.load_raw("b", false).unwrap().unwrap();
        assert_eq!(data, b"beta");
        assert_eq!(alias, "renamed");
    }

    #[test]
    fn missing_index_is_corruption() {
        let ctx = context();
        let bogus = ContentHash::from_digest(&[1u8; 32]);
        let err = Node::<Plain>::open(&ctx, &bogus).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn out_of_band_hash_is_blank() {
        let ctx = context();
        let node = Node::<Plain>::open(&ctx, &ContentHash::normalize("short")).unwrap();
        assert!(node.root_hash().is_blank());
        assert!(node.is_empty());
    }

    #[test]
    fn foreign_guard_is_a_lock_violation() {
        let ctx = context();
        let a = Node::<Plain>::blank(&ctx);
        let b = Node::<Plain>::blank(&ctx);
        let mut guard = b.lock();
        let err = a.save(&mut guard).unwrap_err();
        assert!(matches!(err, StoreError::LockViolation { node: "plain" }));
    }

    #[test]
    fn stale_revision_is_a_successful_noop() {
        let ctx = context();
        let node = Node::<Plain>::blank(&ctx);
        assert!(node.store_record(&note(5, "five"), "").unwrap());
        let root = node.root_hash();
        assert!(node.store_record(&note(3, "three"), "").unwrap());
        assert!(node.store_record(&note(5, "five again"), "").unwrap());
        assert_eq!(node.root_hash(), root);
        let (stored, _): (Note, _) = node.load_record("n1", false).unwrap().unwrap();
        assert_eq!(stored.body, "five");
    }

    #[test]
    fn revision_cache_is_loaded_lazily() {
        let ctx = context();
        let node = Node::<Plain>::blank(&ctx);
        node.store_record(&note(7, "seven"), "").unwrap();

        let reopened = Node::<Plain>::open(&ctx, &node.root_hash()).unwrap();
        assert_eq!(reopened.metadata("n1").unwrap().revision, 0);
        reopened.store_record(&note(6, "six"), "").unwrap();
        assert_eq!(reopened.metadata("n1").unwrap().revision, 7);
        reopened.store_record(&note(8, "eight"), "").unwrap();
        let (stored, _): (Note, _) = reopened.load_record("n1", false).unwrap().unwrap();
        assert_eq!(stored.body, "eight");
    }

    #[test]
    fn version_is_only_written_on_save() {
        let ctx = context();
        let old = IndexRecord::<()> {
            version: 1,
            items: vec![StorageItem::new("a", ctx.driver().store_value(false, b"x").unwrap(), "")],
            index: (),
        };
        let hash = ctx.driver().store_record(false, &old).unwrap();

        let node = Node::<Plain>::open(&ctx, &hash).unwrap();
        assert_eq!(node.original_version(), 1);
        assert_eq!(node.version(), 3);
        assert_eq!(node.root_hash(), hash);

        node.set_alias("a", "touched").unwrap();
        let reopened = Node::<Plain>::open(&ctx, &node.root_hash()).unwrap();
        assert_eq!(reopened.original_version(), 3);
    }

    #[test]
    fn migrate_copies_items() {
        let ctx = context();
        let node = Node::<Plain>::blank(&ctx);
        node.store_raw("a", b"alpha", "").unwrap();
        let target = MemoryDriver::new(BucketFlag::default());
        assert!(node.migrate(&target).unwrap());
        assert!(target.load(&node.root_hash(), true).unwrap().is_some());
        let item = node.metadata("a").unwrap().hash;
        assert!(target.load(&item, true).unwrap().is_some());
    }

    #[test]
    fn empty_nonblank_index_is_corruption_on_migrate() {
        let ctx = context();
        let empty = IndexRecord::<()> {
            version: 3,
            items: Vec::new(),
            index: (),
        };
        let hash = ctx.driver().store_record(false, &empty).unwrap();
        let node = Node::<Plain>::open(&ctx, &hash).unwrap();
        let target = MemoryDriver::new(BucketFlag::default());
        assert!(node.migrate(&target).unwrap_err().is_fatal());
    }
}
