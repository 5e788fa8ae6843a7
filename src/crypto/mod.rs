//! Security layer: node identity keys and asymmetric message sealing.

pub mod keys;
pub mod seal;

pub use keys::{Keypair, PublicKey};
pub use seal::{decrypt, encrypt, SEAL_OVERHEAD};
