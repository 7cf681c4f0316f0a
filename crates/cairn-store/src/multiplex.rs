//! Fan-out/fan-in over one primary driver and any number of backups.

use std::thread;

use cairn_crypto::SymmetricKey;
use cairn_types::ContentHash;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::bucket::{Bucket, BucketFlag};
use crate::config::{PluginKind, StorageConfig};
use crate::driver::{Driver, DriverExt};
use crate::error::{StoreError, StoreResult};
use crate::fs::FsDriver;
use crate::memory::MemoryDriver;
use crate::record::RootRecord;
use crate::sealed::SealedDriver;

/// Result of reconciling root pointers across every backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BestRoot {
    /// Root record hash with the highest sequence number, blank if no backend
    /// holds a root.
    pub hash: ContentHash,
    pub sequence: u64,
    /// The primary's root pointer does not match `hash`.
    pub primary_out_of_sync: bool,
}

/// Copies a complete snapshot into the given driver. Supplied by the tree
/// layer, which knows how to walk every reachable hash.
pub type MigrateFn<'a> = dyn Fn(&dyn Driver) -> StoreResult<bool> + 'a;

/// Replicating driver.
///
/// Writes go to every backend; a write succeeds if any backend accepted it.
/// Reads go to the primary first, then each backup in order. A backup hit
/// is written back into the primary.
pub struct Multiplex {
    bucket: BucketFlag,
    primary: RwLock<Box<dyn Driver>>,
    backups: Vec<Box<dyn Driver>>,
}

impl Multiplex {
    pub fn new(bucket: BucketFlag, primary: Box<dyn Driver>, backups: Vec<Box<dyn Driver>>) -> Self {
        Self {
            bucket,
            primary: RwLock::new(primary),
            backups,
        }
    }

    /// Build the primary and backups described by `config`.
    ///
    /// Every driver shares one [`BucketFlag`].
    pub fn from_config(config: &StorageConfig) -> StoreResult<Self> {
        let bucket = BucketFlag::default();
        let primary: Box<dyn Driver> = match config.primary {
            PluginKind::Memory => Box::new(MemoryDriver::new(bucket.clone())),
            PluginKind::Filesystem => Box::new(FsDriver::open(&config.path, bucket.clone())?),
        };
        let mut backups: Vec<Box<dyn Driver>> = Vec::with_capacity(config.backups.len());
        for backup in &config.backups {
            let driver = FsDriver::open(&backup.path, bucket.clone())?;
            match &backup.encryption_key {
                Some(key_hex) => {
                    let key = SymmetricKey::from_hex(key_hex)?;
                    backups.push(Box::new(SealedDriver::new(Box::new(driver), key)));
                }
                None => backups.push(Box::new(driver)),
            }
        }
        info!(
            primary = ?config.primary,
            backups = backups.len(),
            "storage multiplex configured"
        );
        Ok(Self::new(bucket, primary, backups))
    }

    /// The flag every backend consults for the current bucket.
    pub fn bucket_flag(&self) -> &BucketFlag {
        &self.bucket
    }

    pub fn backup_count(&self) -> usize {
        self.backups.len()
    }

    pub fn primary_name(&self) -> String {
        self.primary.read_recursive().name().to_string()
    }

    /// Run `op` against every backend: backups on scoped threads, the primary
    /// on the calling thread. Succeeds if any backend succeeded.
    fn fan_out<F>(&self, what: &str, op: F) -> StoreResult<()>
    where
        F: Fn(&dyn Driver) -> StoreResult<()> + Sync,
    {
        let primary = self.primary.read_recursive();
        let total = self.backups.len() + 1;
        let op = &op;
        let accepted = thread::scope(|scope| {
            let pending: Vec<_> = self
                .backups
                .iter()
                .map(|backup| (backup.name(), scope.spawn(move || op(&**backup))))
                .collect();

            let mut accepted = report(what, primary.name(), op(&**primary));
            for (name, handle) in pending {
                let result = match handle.join() {
                    Ok(result) => result,
                    Err(_) => Err(StoreError::Io(std::io::Error::other("backend thread panicked"))),
                };
                accepted |= report(what, name, result);
            }
            accepted
        });

        if accepted {
            Ok(())
        } else {
            Err(StoreError::AllBackendsFailed(total))
        }
    }

    /// Find the root with the highest sequence number across all backends.
    ///
    /// Sequence number is the only tie-breaker; equal sequences keep the
    /// earliest backend, which makes the primary win ties.
    pub fn best_root(&self) -> StoreResult<BestRoot> {
        let primary = self.primary.read_recursive();
        let primary_hash = primary.load_root()?;

        let mut best: Option<(ContentHash, u64)> = None;
        let drivers = std::iter::once(&**primary).chain(self.backups.iter().map(|b| &**b));
        for driver in drivers {
            let hash = match driver.load_root() {
                Ok(hash) => hash,
                Err(e) => {
                    warn!(driver = driver.name(), error = %e, "unable to read root pointer");
                    continue;
                }
            };
            if hash.is_blank() {
                continue;
            }
            let record: RootRecord = match driver.load_record(&hash, true) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    warn!(driver = driver.name(), root = %hash, "root pointer refers to a missing record");
                    continue;
                }
                Err(e) => {
                    warn!(driver = driver.name(), root = %hash, error = %e, "unreadable root record");
                    continue;
                }
            };
            debug!(driver = driver.name(), root = %hash, sequence = record.sequence, "candidate root");
            if best.as_ref().map_or(true, |(_, seq)| record.sequence > *seq) {
                best = Some((hash, record.sequence));
            }
        }

        Ok(match best {
            Some((hash, sequence)) => BestRoot {
                primary_out_of_sync: primary_hash != hash,
                hash,
                sequence,
            },
            None => BestRoot {
                hash: ContentHash::blank(),
                sequence: 0,
                primary_out_of_sync: false,
            },
        })
    }

    /// Bring every backend whose root pointer differs from `hash` up to date.
    ///
    /// `migrate` copies the full snapshot into a backend; the root pointer is
    /// only moved after the copy succeeded. The primary is skipped unless
    /// `sync_primary` is set. Returns `false` if any backend could not be
    /// synchronized.
    pub fn synchronize_plugins(
        &self,
        hash: &ContentHash,
        migrate: &MigrateFn<'_>,
        sync_primary: bool,
    ) -> StoreResult<bool> {
        let mut complete = true;
        if sync_primary {
            let primary = self.primary.read_recursive();
            complete &= sync_one(&**primary, hash, migrate);
        }
        for backup in &self.backups {
            complete &= sync_one(&**backup, hash, migrate);
        }
        Ok(complete)
    }

    /// Copy the snapshot at `hash` into `new_primary`, then make it the
    /// primary. The old primary is dropped. Returns `false` and leaves the
    /// current primary in place if the copy failed.
    pub fn migrate_primary(
        &self,
        new_primary: Box<dyn Driver>,
        hash: &ContentHash,
        migrate: &MigrateFn<'_>,
    ) -> StoreResult<bool> {
        if !migrate(&*new_primary)? {
            warn!(to = new_primary.name(), "primary migration incomplete, keeping current primary");
            return Ok(false);
        }
        new_primary.store_root(true, hash)?;
        let mut primary = self.primary.write();
        info!(from = primary.name(), to = new_primary.name(), root = %hash, "primary migrated");
        *primary = new_primary;
        Ok(true)
    }
}

fn report(what: &str, driver: &str, result: StoreResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(driver, error = %e, "{what} failed on backend");
            false
        }
    }
}

fn sync_one(driver: &dyn Driver, hash: &ContentHash, migrate: &MigrateFn<'_>) -> bool {
    match driver.load_root() {
        Ok(current) if current == *hash => return true,
        Ok(_) => {}
        Err(e) => warn!(driver = driver.name(), error = %e, "unable to read root pointer"),
    }
    let copied = match migrate(driver) {
        Ok(copied) => copied,
        Err(e) => {
            warn!(driver = driver.name(), error = %e, "snapshot migration failed");
            false
        }
    };
    if !copied {
        return false;
    }
    match driver.store_root(true, hash) {
        Ok(()) => {
            info!(driver = driver.name(), root = %hash, "backend synchronized");
            true
        }
        Err(e) => {
            warn!(driver = driver.name(), error = %e, "unable to update root pointer");
            false
        }
    }
}

impl Driver for Multiplex {
    fn load_from_bucket(&self, key: &ContentHash, bucket: Bucket) -> StoreResult<Option<Vec<u8>>> {
        let primary = self.primary.read_recursive();
        if let Some(value) = primary.load_from_bucket(key, bucket)? {
            return Ok(Some(value));
        }
        for backup in &self.backups {
            if let Some(value) = backup.load_from_bucket(key, bucket)? {
                repair(&**primary, &**backup, key, &value, bucket);
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn store(
        &self,
        is_transaction: bool,
        key: &ContentHash,
        value: &[u8],
        bucket: Bucket,
    ) -> StoreResult<()> {
        self.fan_out("store", |driver| driver.store(is_transaction, key, value, bucket))
    }

    fn current_bucket(&self) -> Bucket {
        self.bucket.get()
    }

    /// Reclaim applies to the primary only. Backups are archives.
    fn empty_bucket(&self, bucket: Bucket) -> StoreResult<()> {
        self.primary.read_recursive().empty_bucket(bucket)
    }

    fn load_root(&self) -> StoreResult<ContentHash> {
        self.primary.read_recursive().load_root()
    }

    fn store_root(&self, commit: bool, hash: &ContentHash) -> StoreResult<()> {
        self.fan_out("store_root", |driver| driver.store_root(commit, hash))
    }

    fn name(&self) -> &str {
        "multiplex"
    }

    fn load(&self, key: &ContentHash, checking: bool) -> StoreResult<Option<Vec<u8>>> {
        if key.is_blank() {
            return Ok(None);
        }
        let primary = self.primary.read_recursive();
        if let Some(value) = primary.load(key, true)? {
            return Ok(Some(value));
        }
        for backup in &self.backups {
            if let Some(value) = backup.load(key, true)? {
                repair(&**primary, &**backup, key, &value, primary.current_bucket());
                return Ok(Some(value));
            }
        }
        if !checking {
            error!(key = %key, "object not found on any backend");
        }
        Ok(None)
    }
}

fn repair(primary: &dyn Driver, source: &dyn Driver, key: &ContentHash, value: &[u8], bucket: Bucket) {
    match primary.store(false, key, value, bucket) {
        Ok(()) => debug!(key = %key, from = source.name(), "repaired primary from backup"),
        Err(e) => warn!(key = %key, error = %e, "unable to repair primary"),
    }
}

impl std::fmt::Debug for Multiplex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplex")
            .field("bucket", &self.bucket.get())
            .field("primary", &self.primary_name())
            .field("backups", &self.backups.len())
            .finish()
    }
}
