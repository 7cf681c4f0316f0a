//! Layered credentials for cairn identities.
//!
//! An identity's ID (its NymID) is derived from a [`NymIdSource`]: a raw
//! public key or a payment code. Everything else hangs off that anchor:
//!
//! ```text
//! NymIdSource ─ Primary (master credential, source-signed or self-keyed)
//!                 ├─ Secondary        sign / auth / encrypt keys
//!                 ├─ ContactCredential    published claims
//!                 └─ VerificationCredential   attestations about others
//! ```
//!
//! An [`Authority`] is one master plus its children. A [`Nym`] is a source
//! plus one or more authorities, with a revision counter that grows with
//! every published change.
//!
//! Message operations use secondary credentials only; the master's keys sign
//! children and nothing else. Verification walks the checks in a fixed
//! order and reports the first [`Check`] that failed.
//!
//! Persistence goes through [`CredentialStore`], implemented for
//! [`cairn_tree::Storage`] and for an in-memory map.

pub mod authority;
pub mod contact_data;
pub mod credential;
pub mod error;
pub mod nym;
pub mod source;
pub mod store;
pub mod verification;

pub use authority::{Authority, AuthorityMode, ChildEntry, NymParameters, SerializedAuthority};
pub use contact_data::{Claim, ClaimAttribute, ClaimType, ContactData, SectionType};
pub use credential::{
    Capability, ChildCredential, ContactCredential, CredentialRole, CredentialSignature, KeyMode, KeyRole,
    Primary, Secondary, SerializedCredential, SignatureRole, VerificationCredential,
};
pub use error::{Check, IdentityError, IdentityResult};
pub use nym::{Nym, SerializedNym};
pub use source::{NymIdSource, PaymentCode, SourceProof, SourceSecret, SourceType};
pub use store::{load_nym, save_nym, CredentialStore, MemoryCredentialStore};
pub use verification::{VerificationItem, VerificationSet};
