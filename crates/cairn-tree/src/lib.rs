//! Copy-on-write storage tree for cairn.
//!
//! The tree is a hierarchy of typed [`Node`]s, each persisted as a
//! serialized index blob in a [`cairn_store::Driver`]. A node's root hash is
//! the hash of its index, so every change produces a new hash that has to be
//! published into the parent. [`Editor`] does that publishing: releasing the
//! innermost editor re-saves every ancestor up to the [`Root`], whose record
//! is the only thing the root pointer names.
//!
//! ```text
//! Root ─ Tree ─┬─ Accounts, Contacts, Credentials, Seeds, Servers, Units
//!              ├─ BlockchainTransactions
//!              └─ Nyms ─ Nym ─┬─ Bip47Channels, Contexts, Issuers
//!                             ├─ mail inbox / outbox
//!                             ├─ peer requests / replies (4 boxes each)
//!                             ├─ PaymentWorkflows, Txos
//!                             └─ Threads ─ Thread
//! ```
//!
//! # Garbage collection
//!
//! Blobs are never rewritten, so superseded indexes accumulate. The root
//! periodically flips the write bucket, copies the live snapshot into it on a
//! background thread and empties the old bucket. An interrupted cycle is
//! persisted in the root record and resumed without flipping again.
//!
//! # Entry point
//!
//! [`Storage`] opens the configured backends, picks the newest root across
//! them and exposes read handles, editor chains and single-change helpers.

pub mod editor;
pub mod node;
pub mod nodes;
pub mod nym;
pub mod nyms;
pub mod root;
pub mod storage;
pub mod task;
pub mod tree;

pub use editor::{Editable, Editor};
pub use node::{ItemMap, Metadata, Node, NodeContext, NodeKind, Revisioned};
pub use nym::{Nym, NymIndexRecord, PeerBox};
pub use nyms::Nyms;
pub use root::{Root, RootStatus};
pub use storage::{FatalHandler, MailDirection, Storage};
pub use task::{BackgroundTask, CancelToken};
pub use tree::Tree;
