//! Concrete node kinds.

pub mod accounts;
pub mod bip47;
pub mod blobs;
pub mod contacts;
pub mod credentials;
pub mod seeds;
pub mod thread;
pub mod threads;
pub mod transactions;
pub mod txos;
pub mod workflows;

pub use accounts::{AccountBinding, Accounts};
pub use bip47::{Bip47Channels, ChannelRecord};
pub use blobs::{BlobBox, BoxMarker, Contexts, Issuers, Mailbox, PeerReplies, PeerRequests, Servers, Units};
pub use contacts::{ContactRecord, Contacts};
pub use credentials::Credentials;
pub use seeds::{SeedRecord, Seeds};
pub use thread::{ItemBox, Thread, ThreadItem};
pub use threads::Threads;
pub use transactions::BlockchainTransactions;
pub use txos::Txos;
pub use workflows::{PaymentWorkflows, WorkflowRecord, WorkflowState, WorkflowType};
