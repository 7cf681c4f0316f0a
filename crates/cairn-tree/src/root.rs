//! Top of the storage tree and the garbage collector.
//!
//! The root record names the current tree snapshot and carries the
//! collection bookkeeping. Collection is copy-on-write across two buckets:
//!
//! 1. Under the root edit lock, flip the bucket flag, remember the pre-flip
//!    tree hash as `gc_root`, set `gc_in_progress` and persist.
//! 2. On a background thread, copy everything reachable from `gc_root` into
//!    the new bucket while ordinary writes continue there.
//! 3. On success empty the old bucket, clear `gc_root` and
//!    `gc_in_progress`, record the time and persist.
//!
//! A cycle that fails or is interrupted keeps `gc_in_progress` and `gc_root`
//! on disk. The next cycle resumes it with the same bucket and snapshot
//! instead of flipping again.

use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cairn_store::{Bucket, BucketFlag, Driver, DriverExt, RootRecord, StoreError, StoreResult, ROOT_VERSION};
use cairn_types::ContentHash;
use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::editor::{Editable, Editor};
use crate::node::{Node, NodeContext};
use crate::tree::Tree;

pub struct RootState {
    hash: ContentHash,
    record: RootRecord,
    tree: Option<Arc<Node<Tree>>>,
}

/// Point-in-time view of the root bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootStatus {
    pub hash: ContentHash,
    pub tree: ContentHash,
    pub bucket: Bucket,
    pub sequence: u64,
    pub last_gc: u64,
    pub gc_in_progress: bool,
    pub gc_root: ContentHash,
    pub gc_running: bool,
}

pub struct Root {
    ctx: NodeContext,
    bucket: BucketFlag,
    gc_interval: Option<Duration>,
    edit: Arc<Mutex<()>>,
    state: Mutex<RootState>,
    gc_running: AtomicBool,
    /// Set when the persisted record showed an unfinished cycle at open.
    resume_pending: AtomicBool,
    gc_thread: Mutex<Option<JoinHandle<()>>>,
}

fn now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

impl Root {
    /// Load the root stored under `hash`, or start a new store if it is blank.
    ///
    /// The shared bucket flag is set from the persisted record. `None` for
    /// `gc_interval` disables automatic collection.
    pub fn open(
        ctx: NodeContext,
        bucket: BucketFlag,
        hash: &ContentHash,
        gc_interval: Option<Duration>,
    ) -> StoreResult<Arc<Self>> {
        let hash = ctx.normalize(hash);
        let record = if hash.is_blank() {
            RootRecord {
                last_gc: now(),
                alt_location: bucket.get().is_alt(),
                ..RootRecord::default()
            }
        } else {
            let mut record: RootRecord = ctx
                .driver()
                .load_record(&hash, false)?
                .ok_or_else(|| StoreError::corrupt(&hash, "root record is missing"))?;
            record.items = ctx.normalize(&record.items);
            record.gc_root = ctx.normalize(&record.gc_root);
            record
        };
        bucket.set(record.bucket());
        if record.gc_in_progress {
            info!(bucket = %record.bucket(), gc_root = %record.gc_root, "unfinished garbage collection will resume");
        }
        let resume = record.gc_in_progress;
        Ok(Arc::new(Self {
            ctx,
            bucket,
            gc_interval,
            edit: Arc::new(Mutex::new(())),
            state: Mutex::new(RootState {
                hash,
                record,
                tree: None,
            }),
            gc_running: AtomicBool::new(false),
            resume_pending: AtomicBool::new(resume),
            gc_thread: Mutex::new(None),
        }))
    }

    /// Persist the record under a new sequence number and move the root
    /// pointer to it. `state` must be this root's own guard.
    fn save(&self, state: &mut MutexGuard<'_, RootState>) -> StoreResult<()> {
        if !ptr::eq(MutexGuard::mutex(state), &self.state) {
            return Err(StoreError::LockViolation { node: "root" });
        }
        let mut next = state.record.clone();
        next.version = ROOT_VERSION;
        next.sequence += 1;
        let driver = self.ctx.driver();
        let hash = driver.store_record(true, &next)?;
        driver.store_root(true, &hash)?;
        state.record = next;
        state.hash = hash;
        Ok(())
    }

    pub fn ctx(&self) -> &NodeContext {
        &self.ctx
    }

    /// An editor over the root with nothing above it.
    pub fn editor(self: &Arc<Self>) -> Editor<Root> {
        Editor::detached(self.clone())
    }

    pub fn status(&self) -> RootStatus {
        let state = self.state.lock();
        RootStatus {
            hash: state.hash.clone(),
            tree: state.record.items.clone(),
            bucket: state.record.bucket(),
            sequence: state.record.sequence,
            last_gc: state.record.last_gc,
            gc_in_progress: state.record.gc_in_progress,
            gc_root: state.record.gc_root.clone(),
            gc_running: self.gc_running.load(Ordering::SeqCst),
        }
    }

    pub fn hash(&self) -> ContentHash {
        self.state.lock().hash.clone()
    }

    pub fn sequence(&self) -> u64 {
        self.state.lock().record.sequence
    }

    pub fn tree(&self) -> StoreResult<Arc<Node<Tree>>> {
        let mut state = self.state.lock();
        if let Some(tree) = &state.tree {
            return Ok(tree.clone());
        }
        let tree = Arc::new(Node::open(&self.ctx, &state.record.items)?);
        state.tree = Some(tree.clone());
        Ok(tree)
    }

    /// Editor for the tree. Committing it records the new tree hash, saves
    /// the root and moves the root pointer.
    pub fn mutable_tree(parent: Editor<Root>) -> StoreResult<Editor<Node<Tree>>> {
        let tree = parent.tree()?;
        Ok(Editor::new(tree, move |tree: &Node<Tree>| {
            let hash = tree.root_hash();
            {
                let mut state = parent.state.lock();
                if state.record.items != hash {
                    state.record.items = hash;
                    parent.save(&mut state)?;
                }
            }
            parent.commit()
        }))
    }

    /// Copy the root record, the current tree and any snapshot under
    /// collection into `to`.
    pub fn migrate(&self, to: &dyn Driver) -> StoreResult<bool> {
        let (hash, tree, gc_root) = {
            let state = self.state.lock();
            (state.hash.clone(), state.record.items.clone(), state.record.gc_root.clone())
        };
        let driver = self.ctx.driver();
        let mut complete = driver.migrate(&hash, to)?;
        complete &= Node::<Tree>::open(&self.ctx, &tree)?.migrate(to)?;
        if !gc_root.is_blank() && gc_root != tree {
            complete &= Node::<Tree>::open(&self.ctx, &gc_root)?.migrate(to)?;
        }
        Ok(complete)
    }

    /// Start a collection cycle if one is due or an unfinished one is
    /// pending. Returns `true` if a cycle was started.
    ///
    /// Never blocks: if an editor holds the root, the check is skipped.
    pub fn maybe_start_gc(self: &Arc<Self>) -> StoreResult<bool> {
        match self.gc_interval {
            Some(interval) => self.start_gc(Some(interval)),
            None => Ok(false),
        }
    }

    /// Start a collection cycle now, whatever the interval. Returns `false`
    /// if a cycle is already running or an editor holds the root.
    pub fn run_gc(self: &Arc<Self>) -> StoreResult<bool> {
        self.start_gc(None)
    }

    fn start_gc(self: &Arc<Self>, interval: Option<Duration>) -> StoreResult<bool> {
        if self
            .gc_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(false);
        }
        let prepared = match self.edit.try_lock() {
            Some(_edit) => {
                let mut state = self.state.lock();
                let resume = state.record.gc_in_progress && self.resume_pending.swap(false, Ordering::SeqCst);
                let due = interval.map_or(true, |interval| {
                    now().saturating_sub(state.record.last_gc) >= interval.as_secs()
                });
                if resume || due {
                    self.prepare_gc(&mut state).map(|()| true)
                } else {
                    Ok(false)
                }
            }
            None => Ok(false),
        };
        match prepared {
            Ok(true) => {}
            other => {
                self.gc_running.store(false, Ordering::SeqCst);
                return other;
            }
        }

        let root = self.clone();
        let spawned = thread::Builder::new()
            .name("cairn-gc".into())
            .spawn(move || root.collect_garbage());
        match spawned {
            Ok(handle) => {
                let previous = self.gc_thread.lock().replace(handle);
                if let Some(previous) = previous {
                    if previous.join().is_err() {
                        error!("previous garbage collection thread panicked");
                    }
                }
                Ok(true)
            }
            Err(e) => {
                self.gc_running.store(false, Ordering::SeqCst);
                Err(StoreError::Io(e))
            }
        }
    }

    /// Flip the bucket (unless resuming), record the snapshot to collect,
    /// and persist before any copying starts.
    pub(crate) fn prepare_gc(&self, state: &mut MutexGuard<'_, RootState>) -> StoreResult<()> {
        if state.record.gc_in_progress {
            self.bucket.set(state.record.bucket());
            if state.record.gc_root.is_blank() {
                state.record.gc_root = state.record.items.clone();
            }
            info!(bucket = %state.record.bucket(), gc_root = %state.record.gc_root, "resuming garbage collection");
        } else {
            let bucket = self.bucket.flip();
            state.record.alt_location = bucket.is_alt();
            state.record.gc_root = state.record.items.clone();
            state.record.gc_in_progress = true;
            info!(bucket = %bucket, gc_root = %state.record.gc_root, "starting garbage collection");
        }
        self.save(state)
    }

    fn collect_garbage(&self) {
        let (gc_root, current) = {
            let state = self.state.lock();
            (state.record.gc_root.clone(), state.record.bucket())
        };
        let old = current.flip();
        let driver = self.ctx.driver();

        let outcome = Node::<Tree>::open(&self.ctx, &gc_root)
            .and_then(|snapshot| snapshot.migrate(driver.as_ref()))
            .and_then(|complete| {
                if complete {
                    driver.empty_bucket(old).map(|()| true)
                } else {
                    Ok(false)
                }
            });

        let mut state = self.state.lock();
        match outcome {
            Ok(true) => {
                state.record.gc_root = ContentHash::blank();
                state.record.gc_in_progress = false;
                state.record.last_gc = now();
                debug!(emptied = %old, "garbage collection finished");
            }
            Ok(false) => warn!(gc_root = %gc_root, "garbage collection incomplete; old bucket kept"),
            Err(e) => error!(gc_root = %gc_root, error = %e, "garbage collection failed; old bucket kept"),
        }
        if let Err(e) = self.save(&mut state) {
            error!(error = %e, "could not persist garbage collection state");
        }
        self.gc_running.store(false, Ordering::SeqCst);
    }

    /// Wait for any running collection. Safe to call repeatedly.
    pub fn cleanup(&self) {
        let handle = self.gc_thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("garbage collection thread panicked");
            }
        }
    }
}

impl Editable for Root {
    fn edit_lock(&self) -> &Arc<Mutex<()>> {
        &self.edit
    }

    fn label(&self) -> &'static str {
        "root"
    }
}

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Root").field("status", &self.status()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_store::MemoryDriver;
    use cairn_types::HashBand;

    struct Fixture {
        flag: BucketFlag,
        memory: Arc<MemoryDriver>,
        ctx: NodeContext,
    }

    fn fixture() -> Fixture {
        let flag = BucketFlag::default();
        let memory = Arc::new(MemoryDriver::new(flag.clone()));
        let ctx = NodeContext::new(memory.clone(), HashBand::DEFAULT);
        Fixture { flag, memory, ctx }
    }

    fn reopen(fx: &Fixture, gc_interval: Option<Duration>) -> Arc<Root> {
        Root::open(fx.ctx.clone(), fx.flag.clone(), &fx.memory.load_root().unwrap(), gc_interval).unwrap()
    }

    fn add_server(root: &Arc<Root>, id: &str) {
        let tree = Root::mutable_tree(root.editor()).unwrap();
        let servers = Node::<Tree>::mutable_servers(tree).unwrap();
        servers.store(id, id.as_bytes(), "").unwrap();
        servers.commit().unwrap();
    }

    #[test]
    fn commits_advance_sequence_and_pointer() {
        let fx = fixture();
        let root = reopen(&fx, None);
        add_server(&root, "srv1");
        let first = root.status();
        add_server(&root, "srv2");
        let second = root.status();
        assert!(second.sequence > first.sequence);
        assert_eq!(fx.memory.load_root().unwrap(), second.hash);

        let fresh = reopen(&fx, None);
        assert_eq!(fresh.sequence(), second.sequence);
        assert!(fresh.tree().unwrap().servers().unwrap().exists("srv2"));
    }

    #[test]
    fn foreign_guard_is_a_lock_violation() {
        let fx = fixture();
        let a = reopen(&fx, None);
        let b = reopen(&fx, None);
        let mut guard = b.state.lock();
        assert!(matches!(a.save(&mut guard), Err(StoreError::LockViolation { node: "root" })));
    }

    #[test]
    fn completed_cycle_empties_old_bucket() {
        let fx = fixture();
        let root = reopen(&fx, Some(Duration::ZERO));
        add_server(&root, "srv");
        assert_eq!(fx.flag.get(), Bucket::A);

        assert!(root.maybe_start_gc().unwrap());
        root.cleanup();
        root.cleanup();

        let status = root.status();
        assert_eq!(status.bucket, Bucket::B);
        assert_eq!(fx.flag.get(), Bucket::B);
        assert!(!status.gc_in_progress);
        assert!(!status.gc_running);
        assert!(status.gc_root.is_blank());
        assert_eq!(fx.memory.len(Bucket::A), 0);

        let fresh = reopen(&fx, None);
        assert!(fresh.tree().unwrap().servers().unwrap().exists("srv"));
    }

    #[test]
    fn interval_not_elapsed_does_nothing() {
        let fx = fixture();
        let root = reopen(&fx, Some(Duration::from_secs(86_400)));
        add_server(&root, "srv");
        assert!(!root.maybe_start_gc().unwrap());
        assert_eq!(root.status().bucket, Bucket::A);
    }

    #[test]
    fn held_root_editor_defers_collection() {
        let fx = fixture();
        let root = reopen(&fx, Some(Duration::ZERO));
        let editor = root.editor();
        assert!(!root.maybe_start_gc().unwrap());
        drop(editor);
        assert!(root.maybe_start_gc().unwrap());
        root.cleanup();
    }

    #[test]
    fn interrupted_cycle_resumes_without_reflipping() {
        let fx = fixture();
        let root = reopen(&fx, None);
        add_server(&root, "srv1");
        {
            let mut state = root.state.lock();
            root.prepare_gc(&mut state).unwrap();
        }
        let crashed = root.status();
        assert_eq!(crashed.bucket, Bucket::B);
        assert!(crashed.gc_in_progress);
        assert!(!crashed.gc_root.is_blank());
        add_server(&root, "srv2");
        drop(root);

        // a new process starts on bucket A until the record says otherwise
        fx.flag.set(Bucket::A);
        let restarted = reopen(&fx, Some(Duration::from_secs(86_400)));
        assert_eq!(fx.flag.get(), Bucket::B);
        {
            let mut state = restarted.state.lock();
            restarted.prepare_gc(&mut state).unwrap();
        }
        let resumed = restarted.status();
        assert_eq!(resumed.bucket, Bucket::B);
        assert_eq!(resumed.gc_root, crashed.gc_root);

        assert!(restarted.maybe_start_gc().unwrap());
        restarted.cleanup();
        let done = restarted.status();
        assert_eq!(done.bucket, Bucket::B);
        assert!(!done.gc_in_progress);
        assert_eq!(fx.memory.len(Bucket::A), 0);
        let servers = restarted.tree().unwrap().servers().unwrap();
        assert!(servers.exists("srv1"));
        assert_eq!(servers.load("srv2", false).unwrap().unwrap().0, b"srv2");
    }

    #[test]
    fn failed_cycle_stays_resumable() {
        let fx = fixture();
        let root = reopen(&fx, Some(Duration::ZERO));
        add_server(&root, "srv");
        let blob = root.tree().unwrap().servers().unwrap().metadata("srv").unwrap().hash;
        assert!(fx.memory.forget(&blob));

        assert!(root.maybe_start_gc().unwrap());
        root.cleanup();
        let status = root.status();
        assert!(status.gc_in_progress);
        assert!(!status.gc_root.is_blank());
        assert!(!status.gc_running);

        let restarted = reopen(&fx, None);
        let persisted = restarted.status();
        assert!(persisted.gc_in_progress);
        assert_eq!(persisted.gc_root, status.gc_root);
        assert_eq!(persisted.bucket, Bucket::B);
    }
}
