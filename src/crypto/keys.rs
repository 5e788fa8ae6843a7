//! X25519 key management.
//!
//! Long-term node identity keys. Peers are addressed by [`NodeId`] but
//! authenticated and encrypted-to by their static public key.

use std::fmt;

use rand::{rngs::OsRng, RngCore};
use x25519_dalek::StaticSecret;
use zeroize::Zeroize;

use crate::core::{PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};

/// A peer's static X25519 public key.
///
/// Opaque 32-byte value; comparison and hashing are byte-wise.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Create a public key from raw bytes.
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", hex_preview(&self.0))
    }
}

/// A static X25519 keypair for long-term node identity.
///
/// The private key is zeroized on drop.
#[derive(Clone)]
pub struct Keypair {
    /// Private key (32 bytes), zeroized on drop.
    private: [u8; PRIVATE_KEY_SIZE],
    /// Public key (32 bytes).
    public: PublicKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut private = [0u8; PRIVATE_KEY_SIZE];
        OsRng.fill_bytes(&mut private);
        Self::from_private_bytes(private)
    }

    /// Create a keypair from existing private key material.
    ///
    /// The bytes are clamped per X25519, so any 32-byte value is acceptable.
    pub fn from_private_bytes(private: [u8; PRIVATE_KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(private);
        let public = PublicKey(*x25519_dalek::PublicKey::from(&secret).as_bytes());
        Self {
            private: secret.to_bytes(),
            public,
        }
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Compute the DH shared secret with a remote public key.
    pub(crate) fn diffie_hellman(&self, remote: &PublicKey) -> [u8; 32] {
        let secret = StaticSecret::from(self.private);
        let public = x25519_dalek::PublicKey::from(remote.0);
        *secret.diffie_hellman(&public).as_bytes()
    }
}

impl Drop for Keypair {
    fn drop(&mut self) {
        self.private.zeroize();
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public)
            .field("private", &"[REDACTED]")
            .finish()
    }
}

fn hex_preview(bytes: &[u8]) -> String {
    bytes[..4].iter().map(|b| format!("{b:02x}")).collect()
}
