//! X25519 key agreement for encryption keypairs.

use zeroize::Zeroizing;

/// X25519 private key.
#[derive(Clone)]
pub struct AgreementSecret(x25519_dalek::StaticSecret);

/// X25519 public key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AgreementPublic(x25519_dalek::PublicKey);

/// Output of a Diffie-Hellman exchange. Zeroed on drop.
pub struct SharedSecret(Zeroizing<[u8; 32]>);

impl AgreementSecret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        Self(x25519_dalek::StaticSecret::random_from_rng(rand::thread_rng()))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(x25519_dalek::StaticSecret::from(bytes))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn public(&self) -> AgreementPublic {
        AgreementPublic(x25519_dalek::PublicKey::from(&self.0))
    }

    /// Derive the shared secret with a peer.
    pub fn agree(&self, peer: &AgreementPublic) -> SharedSecret {
        let shared = self.0.diffie_hellman(&peer.0);
        SharedSecret(Zeroizing::new(*shared.as_bytes()))
    }
}

impl AgreementPublic {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(x25519_dalek::PublicKey::from(bytes))
    }

    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for AgreementSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AgreementSecret(<redacted>)")
    }
}

impl std::fmt::Debug for AgreementPublic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AgreementPublic({})", hex::encode(self.0.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_agree() {
        let alice = AgreementSecret::generate();
        let bob = AgreementSecret::generate();
        let ab = alice.agree(&bob.public());
        let ba = bob.agree(&alice.public());
        assert_eq!(ab.as_bytes(), ba.as_bytes());
    }

    #[test]
    fn bytes_roundtrip() {
        let secret = AgreementSecret::generate();
        let restored = AgreementSecret::from_bytes(secret.to_bytes());
        assert_eq!(secret.public(), restored.public());
        assert_eq!(AgreementPublic::from_bytes(secret.public().as_bytes()), secret.public());
    }
}
