//! Foundation types for cairn.
//!
//! Every other cairn crate depends on `cairn-types`.
//!
//! # Key Types
//!
//! - [`Identifier`]: 32-byte BLAKE3 identifier for nyms, credentials and claims
//! - [`ContentHash`]: key of an immutable stored blob, with the [`BLANK_HASH`] sentinel
//! - [`UnitType`]: currency/unit classification with an explicit `Unknown` value

pub mod error;
pub mod hash;
pub mod identifier;
pub mod unit;

pub use error::TypeError;
pub use hash::{ContentHash, HashBand, BLANK_HASH};
pub use identifier::Identifier;
pub use unit::UnitType;
