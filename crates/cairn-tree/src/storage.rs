//! The storage facade.
//!
//! [`Storage`] opens the configured backends, reconciles the newest root
//! across them and exposes the tree. Reads go through shared node handles.
//! Writes go through [`Editor`] chains that re-save every ancestor up to the
//! root when released; the `store_*` helpers open such a chain, apply one
//! change and commit it.
//!
//! Corruption and lock violations are reported to the [`FatalHandler`]
//! before being returned. The default handler logs and aborts the process.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use cairn_store::{
    Driver, FsDriver, MemoryDriver, Multiplex, PluginKind, StorageConfig, StoreError, StoreResult,
};
use cairn_types::UnitType;
use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::editor::{Editable, Editor};
use crate::node::{Node, NodeContext, NodeKind};
use crate::nodes::{
    AccountBinding, Accounts, BlobBox, BlockchainTransactions, BoxMarker, ContactRecord, Contacts,
    Credentials, Mailbox, PeerReplies, PeerRequests, SeedRecord, Seeds, Servers, Units,
};
use crate::nym::{Nym, PeerBox};
use crate::nyms::Nyms;
use crate::root::{Root, RootStatus};
use crate::task::{BackgroundTask, CancelToken};
use crate::tree::Tree;

/// Called with every fatal error before it is returned.
pub type FatalHandler = Arc<dyn Fn(&StoreError) + Send + Sync>;

fn abort_on_fatal() -> FatalHandler {
    Arc::new(|e: &StoreError| {
        error!(error = %e, "fatal storage error; aborting");
        std::process::abort();
    })
}

/// Direction of a nym's mail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MailDirection {
    Inbox,
    Outbox,
}

pub struct Storage {
    config: StorageConfig,
    multiplex: Arc<Multiplex>,
    root: Arc<Root>,
    fatal: RwLock<FatalHandler>,
}

impl Storage {
    /// Open the backends described by `config`.
    pub fn open(config: StorageConfig) -> StoreResult<Self> {
        let multiplex = Multiplex::from_config(&config)?;
        Self::with_multiplex(config, multiplex)
    }

    /// Open over an already assembled multiplex.
    ///
    /// The root with the highest sequence number across all backends wins.
    /// Every backend that disagrees is brought up to that root, the primary
    /// included when it was behind.
    pub fn with_multiplex(config: StorageConfig, multiplex: Multiplex) -> StoreResult<Self> {
        let multiplex = Arc::new(multiplex);
        let best = multiplex.best_root()?;
        let driver: Arc<dyn Driver> = multiplex.clone();
        let ctx = NodeContext::new(driver, config.hash_band);
        let interval = config.gc_enabled.then(|| config.gc_interval());
        let root = Root::open(ctx, multiplex.bucket_flag().clone(), &best.hash, interval)?;

        if !best.hash.is_blank() {
            let migrate = |to: &dyn Driver| root.migrate(to);
            if !multiplex.synchronize_plugins(&best.hash, &migrate, best.primary_out_of_sync)? {
                warn!(root = %best.hash, "some backends could not be synchronized");
            }
        }
        info!(
            primary = %multiplex.primary_name(),
            backups = multiplex.backup_count(),
            sequence = best.sequence,
            "storage opened"
        );
        Ok(Self {
            config,
            multiplex,
            root,
            fatal: RwLock::new(abort_on_fatal()),
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn multiplex(&self) -> &Arc<Multiplex> {
        &self.multiplex
    }

    pub fn root(&self) -> &Arc<Root> {
        &self.root
    }

    pub fn status(&self) -> RootStatus {
        self.root.status()
    }

    pub fn set_fatal_handler(&self, handler: FatalHandler) {
        *self.fatal.write() = handler;
    }

    /// Pass fatal errors to the handler, then return the result unchanged.
    fn check<T>(&self, result: StoreResult<T>) -> StoreResult<T> {
        if let Err(e) = &result {
            if e.is_fatal() {
                let handler = self.fatal.read().clone();
                handler(e);
            }
        }
        result
    }

    fn maybe_gc(&self) {
        if let Err(e) = self.check(self.root.maybe_start_gc()) {
            warn!(error = %e, "could not start garbage collection");
        }
    }

    /// Apply `op` through `editor`, commit the chain, then check whether a
    /// collection is due.
    fn write<T: Editable, R>(
        &self,
        editor: StoreResult<Editor<T>>,
        op: impl FnOnce(&T) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let editor = self.check(editor)?;
        let result = op(&*editor);
        let committed = editor.commit();
        let value = self.check(result)?;
        self.check(committed)?;
        self.maybe_gc();
        Ok(value)
    }

    // read access

    pub fn tree(&self) -> StoreResult<Arc<Node<Tree>>> {
        self.check(self.root.tree())
    }

    pub fn accounts(&self) -> StoreResult<Arc<Node<Accounts>>> {
        self.check(self.tree()?.accounts())
    }

    pub fn contacts(&self) -> StoreResult<Arc<Node<Contacts>>> {
        self.check(self.tree()?.contacts())
    }

    pub fn credentials(&self) -> StoreResult<Arc<Node<Credentials>>> {
        self.check(self.tree()?.credentials())
    }

    pub fn nyms(&self) -> StoreResult<Arc<Node<Nyms>>> {
        self.check(self.tree()?.nyms())
    }

    pub fn seeds(&self) -> StoreResult<Arc<Node<Seeds>>> {
        self.check(self.tree()?.seeds())
    }

    /// Read handle. Writes go through [`Storage::mutable_servers`]:
    ///
    /// ```compile_fail
    /// # fn write_through_read_handle(storage: &cairn_tree::Storage) {
    /// storage.servers().unwrap().store("srv", b"contract", "").unwrap();
    /// # }
    /// ```
    pub fn servers(&self) -> StoreResult<Arc<Node<Servers>>> {
        self.check(self.tree()?.servers())
    }

    pub fn units(&self) -> StoreResult<Arc<Node<Units>>> {
        self.check(self.tree()?.units())
    }

    pub fn blockchain_transactions(&self) -> StoreResult<Arc<Node<BlockchainTransactions>>> {
        self.check(self.tree()?.blockchain_transactions())
    }

    pub fn nym(&self, id: &str) -> StoreResult<Option<Arc<Node<Nym>>>> {
        self.check(self.nyms()?.nym(id))
    }

    // editor chains

    pub fn mutable_tree(&self) -> StoreResult<Editor<Node<Tree>>> {
        self.check(Root::mutable_tree(self.root.editor()))
    }

    pub fn mutable_accounts(&self) -> StoreResult<Editor<Node<Accounts>>> {
        self.check(Node::<Tree>::mutable_accounts(self.mutable_tree()?))
    }

    pub fn mutable_contacts(&self) -> StoreResult<Editor<Node<Contacts>>> {
        self.check(Node::<Tree>::mutable_contacts(self.mutable_tree()?))
    }

    pub fn mutable_credentials(&self) -> StoreResult<Editor<Node<Credentials>>> {
        self.check(Node::<Tree>::mutable_credentials(self.mutable_tree()?))
    }

    pub fn mutable_nyms(&self) -> StoreResult<Editor<Node<Nyms>>> {
        self.check(Node::<Tree>::mutable_nyms(self.mutable_tree()?))
    }

    pub fn mutable_seeds(&self) -> StoreResult<Editor<Node<Seeds>>> {
        self.check(Node::<Tree>::mutable_seeds(self.mutable_tree()?))
    }

    pub fn mutable_servers(&self) -> StoreResult<Editor<Node<Servers>>> {
        self.check(Node::<Tree>::mutable_servers(self.mutable_tree()?))
    }

    pub fn mutable_units(&self) -> StoreResult<Editor<Node<Units>>> {
        self.check(Node::<Tree>::mutable_units(self.mutable_tree()?))
    }

    pub fn mutable_blockchain_transactions(&self) -> StoreResult<Editor<Node<BlockchainTransactions>>> {
        self.check(Node::<Tree>::mutable_blockchain_transactions(self.mutable_tree()?))
    }

    /// Editor for nym `id`, created if it does not exist.
    pub fn mutable_nym(&self, id: &str) -> StoreResult<Editor<Node<Nym>>> {
        self.check(Node::<Nyms>::mutable_nym(self.mutable_nyms()?, id))
    }

    pub fn mutable_mailbox(&self, nym: &str, direction: MailDirection) -> StoreResult<Editor<Node<Mailbox>>> {
        let parent = self.mutable_nym(nym)?;
        self.check(match direction {
            MailDirection::Inbox => Node::<Nym>::mutable_mail_inbox(parent),
            MailDirection::Outbox => Node::<Nym>::mutable_mail_outbox(parent),
        })
    }

    pub fn mutable_peer_requests(&self, nym: &str, which: PeerBox) -> StoreResult<Editor<Node<PeerRequests>>> {
        self.check(Node::<Nym>::mutable_peer_requests(self.mutable_nym(nym)?, which))
    }

    pub fn mutable_peer_replies(&self, nym: &str, which: PeerBox) -> StoreResult<Editor<Node<PeerReplies>>> {
        self.check(Node::<Nym>::mutable_peer_replies(self.mutable_nym(nym)?, which))
    }

    // single-change writes

    pub fn store_account(&self, id: &str, data: &[u8], alias: &str, binding: &AccountBinding) -> StoreResult<bool> {
        self.write(self.mutable_accounts(), |accounts| accounts.store(id, data, alias, binding))
    }

    pub fn store_contact(&self, record: &ContactRecord) -> StoreResult<bool> {
        self.write(self.mutable_contacts(), |contacts| contacts.store(record))
    }

    pub fn store_credential(&self, id: &str, data: &[u8], private: bool, alias: &str) -> StoreResult<bool> {
        self.write(self.mutable_credentials(), |creds| creds.store(id, data, private, alias))
    }

    pub fn load_credential(&self, id: &str, checking: bool) -> StoreResult<Option<(Vec<u8>, bool)>> {
        self.check(self.credentials()?.load(id, checking))
    }

    pub fn store_seed(&self, record: &SeedRecord, alias: &str) -> StoreResult<bool> {
        self.write(self.mutable_seeds(), |seeds| seeds.store(record, alias))
    }

    pub fn store_server(&self, id: &str, data: &[u8], alias: &str) -> StoreResult<bool> {
        self.write(self.mutable_servers(), |servers| servers.store(id, data, alias))
    }

    pub fn store_unit(&self, id: &str, data: &[u8], alias: &str) -> StoreResult<bool> {
        self.write(self.mutable_units(), |units| units.store(id, data, alias))
    }

    pub fn store_transaction(&self, txid: &str, data: &[u8], nyms: &[String]) -> StoreResult<bool> {
        self.write(self.mutable_blockchain_transactions(), |txs| txs.store(txid, data, nyms))
    }

    /// Store the serialized credential index of `id`, marking it local when
    /// it carries private keys.
    pub fn store_nym(&self, id: &str, data: &[u8], alias: &str, revision: u64, private: bool) -> StoreResult<bool> {
        let stored = self.write(self.mutable_nym(id), |nym| nym.store_credentials(data, alias, revision, private))?;
        self.write(self.mutable_nyms(), |nyms| {
            if private {
                nyms.set_local(id, true)?;
            }
            nyms.set_alias(id, alias)
        })?;
        Ok(stored)
    }

    pub fn load_nym(&self, id: &str, checking: bool) -> StoreResult<Option<(Vec<u8>, String)>> {
        match self.nym(id)? {
            Some(nym) => self.check(nym.load_credentials(checking)),
            None => Ok(None),
        }
    }

    pub fn local_nyms(&self) -> StoreResult<BTreeSet<String>> {
        Ok(self.nyms()?.local_nyms())
    }

    pub fn store_mail(&self, nym: &str, direction: MailDirection, id: &str, data: &[u8], alias: &str) -> StoreResult<bool> {
        self.write(self.mutable_mailbox(nym, direction), |mailbox| mailbox.store(id, data, alias))
    }

    pub fn store_peer_request(&self, nym: &str, which: PeerBox, id: &str, data: &[u8]) -> StoreResult<bool> {
        self.write(self.mutable_peer_requests(nym, which), |requests| requests.store(id, data, ""))
    }

    /// Move a peer request between two boxes of the same nym.
    pub fn move_peer_request(&self, nym: &str, id: &str, from: PeerBox, to: PeerBox) -> StoreResult<bool> {
        let source = match self.nym(nym)? {
            Some(node) => self.check(node.peer_requests(from))?,
            None => return Ok(false),
        };
        let Some((data, alias)) = self.check(source.load(id, true))? else {
            return Ok(false);
        };
        self.write(self.mutable_peer_requests(nym, to), |requests| requests.store(id, &data, &alias))?;
        self.write(self.mutable_peer_requests(nym, from), |requests| requests.delete(id))
    }

    pub fn store_peer_reply(&self, nym: &str, which: PeerBox, id: &str, data: &[u8]) -> StoreResult<bool> {
        self.write(self.mutable_peer_replies(nym, which), |replies| replies.store(id, data, ""))
    }

    pub fn accounts_by_unit(&self, unit: UnitType) -> StoreResult<BTreeSet<String>> {
        Ok(self.accounts()?.accounts_by_unit(unit))
    }

    // maintenance

    /// Run a collection cycle now and wait for it. Returns `false` if one
    /// could not be started.
    pub fn run_gc(&self) -> StoreResult<bool> {
        let started = self.check(self.root.run_gc())?;
        self.root.cleanup();
        Ok(started)
    }

    /// Copy the current snapshot to a new primary backend and switch to it.
    ///
    /// The root stays locked for the duration so no write can land on the
    /// old primary after the copy.
    pub fn migrate_primary(&self, kind: PluginKind, path: impl AsRef<Path>) -> StoreResult<bool> {
        self.root.cleanup();
        let bucket = self.multiplex.bucket_flag().clone();
        let new_primary: Box<dyn Driver> = match kind {
            PluginKind::Memory => Box::new(MemoryDriver::new(bucket)),
            PluginKind::Filesystem => Box::new(FsDriver::open(path.as_ref(), bucket)?),
        };
        let _root = self.root.editor();
        let hash = self.root.hash();
        let root = &self.root;
        let migrate = |to: &dyn Driver| root.migrate(to);
        self.check(self.multiplex.migrate_primary(new_primary, &hash, &migrate))
    }

    /// Call `f` with every nym's serialized credential index on a
    /// background thread.
    pub fn map_nyms<F>(&self, mut f: F) -> StoreResult<BackgroundTask>
    where
        F: FnMut(&str, &[u8]) + Send + 'static,
    {
        let nyms = self.nyms()?;
        BackgroundTask::spawn("map-nyms", move |cancel| {
            visit(&nyms, cancel, |id| {
                let data = nyms.nym(id)?.map(|nym| nym.load_credentials(true)).transpose()?.flatten();
                if let Some((data, _)) = data {
                    f(id, &data);
                }
                Ok(())
            })
        })
    }

    /// Call `f` with every server contract on a background thread.
    pub fn map_servers<F>(&self, f: F) -> StoreResult<BackgroundTask>
    where
        F: FnMut(&str, &[u8]) + Send + 'static,
    {
        let servers = self.servers()?;
        map_blobs("map-servers", servers, f)
    }

    /// Call `f` with every unit definition on a background thread.
    pub fn map_units<F>(&self, f: F) -> StoreResult<BackgroundTask>
    where
        F: FnMut(&str, &[u8]) + Send + 'static,
    {
        let units = self.units()?;
        map_blobs("map-units", units, f)
    }

    /// Wait for background collection. Safe to call repeatedly.
    pub fn cleanup(&self) {
        self.root.cleanup();
    }
}

/// Walk the items of `node`, stopping early on cancellation. Errors on one
/// item are logged and skipped.
fn visit<K: NodeKind>(
    node: &Node<K>,
    cancel: &CancelToken,
    mut each: impl FnMut(&str) -> StoreResult<()>,
) -> usize {
    let mut visited = 0;
    for (id, _) in node.list() {
        if cancel.is_cancelled() {
            break;
        }
        if let Err(e) = each(&id) {
            warn!(node = K::NAME, item = %id, error = %e, "skipping item");
        }
        visited += 1;
    }
    visited
}

fn map_blobs<M, F>(name: &'static str, node: Arc<Node<BlobBox<M>>>, mut f: F) -> StoreResult<BackgroundTask>
where
    M: BoxMarker,
    F: FnMut(&str, &[u8]) + Send + 'static,
{
    BackgroundTask::spawn(name, move |cancel| {
        visit(&node, cancel, |id| {
            if let Some((data, _)) = node.load(id, true)? {
                f(id, &data);
            }
            Ok(())
        })
    })
}

impl Drop for Storage {
    fn drop(&mut self) {
        self.root.cleanup();
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("primary", &self.multiplex.primary_name())
            .field("root", &self.root.status())
            .finish()
    }
}
