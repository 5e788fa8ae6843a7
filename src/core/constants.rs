//! Protocol constants and default tuning parameters.

use std::time::Duration;

// =============================================================================
// IDENTIFIERS & KEYS
// =============================================================================

/// Node identifier size (256-bit).
pub const NODE_ID_SIZE: usize = 32;

/// X25519 public key size.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// X25519 private key size.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Poly1305 authentication tag size.
pub const AEAD_TAG_SIZE: usize = 16;

/// XChaCha20 nonce size.
pub const AEAD_NONCE_SIZE: usize = 24;

// =============================================================================
// CONNECTION MANAGEMENT DEFAULTS
// =============================================================================

/// Default worker count for the owned execution context.
pub const DEFAULT_THREAD_COUNT: usize = 4;

/// Default soft cap on live transports when the NAT is not symmetric.
pub const DEFAULT_MAX_TRANSPORTS: usize = 10;

/// Default hard cap on peer connections multiplexed over one transport.
pub const DEFAULT_MAX_CONNECTIONS_PER_TRANSPORT: usize = 50;

/// Default interval from endpoint reservation to garbage collection of the
/// reservation, if the peer handshake never starts or never completes.
pub const DEFAULT_RENDEZVOUS_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Registry size beyond which `debug_string` stops reporting, to avoid
/// flooding logs on well-connected nodes.
pub const DEBUG_STRING_MAX_PEERS: usize = 8;
