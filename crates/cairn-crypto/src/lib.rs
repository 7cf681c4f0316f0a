//! Cryptographic primitives for cairn.
//!
//! Provides domain-separated BLAKE3 hashing, Ed25519 signing/verification,
//! X25519 key agreement, and ChaCha20-Poly1305 sealing for encrypted
//! storage backups.
//!
//! All crypto operations wrap established libraries.

pub mod agreement;
pub mod hasher;
pub mod seal;
pub mod signer;

pub use agreement::{AgreementPublic, AgreementSecret, SharedSecret};
pub use hasher::{ContentHasher, HasherError};
pub use seal::{SealError, SymmetricKey};
pub use signer::{Signature, SignatureError, SigningKey, VerifyingKey};
