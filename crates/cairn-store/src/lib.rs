//! Content-addressed blob storage for cairn.
//!
//! Everything cairn persists is an immutable blob keyed by the BLAKE3 hash of
//! its bytes. The single mutable value in a backend is the root pointer,
//! which names the current [`RootRecord`].
//!
//! # Drivers
//!
//! All backends implement [`Driver`]:
//!
//! - [`MemoryDriver`] -- `HashMap` buckets for tests and ephemeral wallets
//! - [`FsDriver`] -- one file per blob, atomic root-pointer replacement
//! - [`SealedDriver`] -- ChaCha20-Poly1305 wrapper for encrypted backups
//! - [`Multiplex`] -- replicates over a primary and any number of backups
//!
//! # Buckets
//!
//! Blobs live in one of two buckets. New writes go to the bucket selected by
//! the shared [`BucketFlag`]; garbage collection flips the flag, copies the
//! live snapshot into the new bucket, then empties the old one. A driver
//! never empties the bucket currently receiving writes.

pub mod bucket;
pub mod config;
pub mod driver;
pub mod error;
pub mod fs;
pub mod memory;
pub mod multiplex;
pub mod record;
pub mod sealed;

pub use bucket::{Bucket, BucketFlag};
pub use config::{BackupConfig, PluginKind, StorageConfig};
pub use driver::{Driver, DriverExt};
pub use error::{StoreError, StoreResult};
pub use fs::FsDriver;
pub use memory::MemoryDriver;
pub use multiplex::{BestRoot, MigrateFn, Multiplex};
pub use record::{HashType, RootRecord, StorageItem, ROOT_VERSION};
pub use sealed::SealedDriver;
