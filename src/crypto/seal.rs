//! Asymmetric message sealing.
//!
//! Messages between peers are sealed to the recipient's static public key
//! using an ephemeral X25519 key, HKDF-SHA-256 and XChaCha20-Poly1305.
//!
//! Wire layout:
//! ```text
//! [ ephemeral_public (32) | nonce (24) | ciphertext + tag (len + 16) ]
//! ```

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use x25519_dalek::EphemeralSecret;
use zeroize::Zeroize;

use crate::core::{CryptoError, AEAD_NONCE_SIZE, AEAD_TAG_SIZE, PUBLIC_KEY_SIZE};

use super::keys::{Keypair, PublicKey};

/// Domain-separation label for the sealed-box key derivation.
const HKDF_INFO: &[u8] = b"rudp-mesh sealed message v1";

/// Sealed-message overhead on top of the plaintext length.
pub const SEAL_OVERHEAD: usize = PUBLIC_KEY_SIZE + AEAD_NONCE_SIZE + AEAD_TAG_SIZE;

/// Seal `plaintext` to `recipient`.
///
/// Each call uses a fresh ephemeral key and nonce, so sealing the same
/// plaintext twice yields different ciphertexts.
pub fn encrypt(plaintext: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral);

    let remote = x25519_dalek::PublicKey::from(*recipient.as_bytes());
    let mut shared = *ephemeral.diffie_hellman(&remote).as_bytes();
    let mut key = derive_key(&shared, ephemeral_public.as_bytes(), recipient.as_bytes());
    shared.zeroize();

    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let cipher = XChaCha20Poly1305::new((&key).into());
    let sealed = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;
    key.zeroize();

    let mut out = Vec::with_capacity(SEAL_OVERHEAD + plaintext.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Open a sealed message with this node's keypair.
pub fn decrypt(message: &[u8], keypair: &Keypair) -> Result<Vec<u8>, CryptoError> {
    if message.len() < SEAL_OVERHEAD {
        return Err(CryptoError::DecryptionFailed);
    }

    let mut ephemeral_public = [0u8; PUBLIC_KEY_SIZE];
    ephemeral_public.copy_from_slice(&message[..PUBLIC_KEY_SIZE]);
    let nonce = &message[PUBLIC_KEY_SIZE..PUBLIC_KEY_SIZE + AEAD_NONCE_SIZE];
    let sealed = &message[PUBLIC_KEY_SIZE + AEAD_NONCE_SIZE..];

    let mut shared = keypair.diffie_hellman(&PublicKey::from_bytes(ephemeral_public));
    let mut key = derive_key(
        &shared,
        &ephemeral_public,
        keypair.public_key().as_bytes(),
    );
    shared.zeroize();

    let cipher = XChaCha20Poly1305::new((&key).into());
    let plaintext = cipher
        .decrypt(XNonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::DecryptionFailed);
    key.zeroize();

    plaintext
}

/// Derive the AEAD key, binding both public keys into the derivation.
fn derive_key(shared: &[u8; 32], ephemeral_public: &[u8], recipient_public: &[u8]) -> [u8; 32] {
    let mut salt = Vec::with_capacity(PUBLIC_KEY_SIZE * 2);
    salt.extend_from_slice(ephemeral_public);
    salt.extend_from_slice(recipient_public);

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut okm = [0u8; 32];
    hk.expand(HKDF_INFO, &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    okm
}
