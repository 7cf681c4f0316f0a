//! Symmetric sealing with ChaCha20-Poly1305.
//!
//! Used by encrypted storage backups. Sealed format is
//! `nonce (12 bytes) || ciphertext || tag (16 bytes)`, with a fresh random
//! nonce per call.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the ChaCha20-Poly1305 nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the key in bytes.
pub const KEY_SIZE: usize = 32;

/// Errors from sealing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SealError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("sealed data too short: {0} bytes")]
    Truncated(usize),
    #[error("decryption failed")]
    Open,
    #[error("encryption failed")]
    Seal,
}

/// 256-bit symmetric key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex key.
    pub fn from_hex(s: &str) -> Result<Self, SealError> {
        let bytes = hex::decode(s).map_err(|e| SealError::InvalidKey(e.to_string()))?;
        let arr: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| SealError::InvalidKey(format!("expected 32 bytes, got {}", v.len())))?;
        Ok(Self(arr))
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, SealError> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.0));
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| SealError::Seal)?;
        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, SealError> {
        if sealed.len() < NONCE_SIZE {
            return Err(SealError::Truncated(sealed.len()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.0));
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| SealError::Open)
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_and_open() {
        let key = SymmetricKey::generate();
        let sealed = key.seal(b"archived blob").unwrap();
        assert_ne!(&sealed[NONCE_SIZE..], b"archived blob");
        assert_eq!(key.open(&sealed).unwrap(), b"archived blob");
    }

    #[test]
    fn nonces_differ_per_call() {
        let key = SymmetricKey::generate();
        assert_ne!(key.seal(b"x").unwrap(), key.seal(b"x").unwrap());
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = SymmetricKey::generate().seal(b"data").unwrap();
        assert_eq!(SymmetricKey::generate().open(&sealed), Err(SealError::Open));
    }

    #[test]
    fn truncated_input_fails() {
        let key = SymmetricKey::generate();
        assert_eq!(key.open(&[1, 2, 3]), Err(SealError::Truncated(3)));
    }

    #[test]
    fn hex_key_parsing() {
        let key = SymmetricKey::from_hex(&"11".repeat(32)).unwrap();
        assert_eq!(key, SymmetricKey::from_bytes([0x11; 32]));
        assert!(SymmetricKey::from_hex("abcd").is_err());
    }
}
