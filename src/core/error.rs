//! Error types for the managed-connections API.

use thiserror::Error;

/// Errors surfaced across the public connection-management API.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RudpError {
    /// A required parameter was missing or invalid.
    #[error("invalid parameter")]
    InvalidParameter,

    /// The supplied bootstrap list was empty, or the node has no existing
    /// connections to bootstrap a new transport off.
    #[error("no bootstrap endpoints")]
    NoBootstrapEndpoints,

    /// None of the bootstrap contacts yielded a first connection.
    #[error("failed to bootstrap")]
    FailedToBootstrap,

    /// The outbound local IP address could not be determined.
    #[error("failed to get local address")]
    FailedToGetLocalAddress,

    /// The operation is not valid in the current state, e.g. targeting this
    /// node's own id, or adding a peer without a prior endpoint reservation.
    #[error("operation not supported")]
    OperationNotSupported,

    /// A managed connection to the peer already exists.
    #[error("already connected")]
    AlreadyConnected,

    /// A connection attempt to the peer is already in flight.
    #[error("connection already in progress")]
    ConnectionAlreadyInProgress,

    /// The peer has no managed connection, so nothing can be sent to it.
    #[error("not connected")]
    NotConnected,

    /// Every transport is at capacity and policy forbids starting another.
    #[error("no available endpoint")]
    NoAvailableEndpoint,
}

/// Convenience alias for results carrying [`RudpError`].
pub type RudpResult<T> = Result<T, RudpError>;

/// Errors from the crypto layer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Decryption failed: truncated input, invalid tag, or corrupted data.
    #[error("decryption failed (invalid tag or corrupted)")]
    DecryptionFailed,
}
