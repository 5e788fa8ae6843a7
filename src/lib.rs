//! # rudp-mesh
//!
//! Managed-connections core of a reliable-UDP peer-to-peer transport.
//!
//! A node multiplexes many logical peer connections over a small pool of UDP
//! endpoints ("transports"). This crate owns the node-level concurrency: the
//! peer lifecycle tables, NAT-type-aware endpoint allocation, the bootstrap
//! flow that derives the node's external address, and the dispatch of
//! message and lifecycle events to an upstream listener. It provides:
//!
//! - **Multiplexing**: peer-to-transport mapping with per-transport caps
//! - **Rendezvous**: endpoint reservation with deadline-bound attempts
//! - **NAT awareness**: transport fan-out policy driven by the NAT estimate
//! - **Reuse**: idle transports retained to amortize NAT-punch cost
//! - **Security**: messages sealed to the recipient's static key
//!
//! The reliable-delivery state machine of a single UDP endpoint is *not*
//! implemented here; it is consumed through the [`transport::Transport`]
//! contract.
//!
//! ## Modules
//!
//! - [`core`]: Constants, error types, node identifiers
//! - [`crypto`]: Identity keys and asymmetric message sealing
//! - [`transport`]: Endpoint model, NAT classification, transport contract
//! - [`manager`]: The connection manager itself
//!
//! ## Example Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use rudp_mesh::prelude::*;
//!
//! let manager = ConnectionManager::new(Config::default(), factory)?;
//! let chosen = manager
//!     .bootstrap(bootstrap_contacts, listener, Keypair::generate(), my_id, None)
//!     .await?;
//!
//! // Reserve an endpoint for a new peer, exchange pairs out of band, then:
//! let (our_pair, exists) = manager.get_available_endpoint(peer.id, peer_pair).await?;
//! if !exists {
//!     manager.add(peer).await?;
//! }
//! manager.send(peer_id, sealed_message).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod core;
pub mod crypto;
pub mod manager;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{NodeId, RudpError, RudpResult};
    pub use crate::crypto::{Keypair, PublicKey};
    pub use crate::manager::{Config, ConfigBuilder, ConnectionManager, Listener};
    pub use crate::transport::{
        Contact, EndpointPair, NatCell, NatType, Transport, TransportFactory,
    };
}

// Re-export commonly used items at crate root
pub use crate::core::{NodeId, RudpError, RudpResult};
pub use crate::crypto::{Keypair, PublicKey};
pub use crate::manager::{Config, ConfigBuilder, ConnectionManager, Listener};
pub use crate::transport::{Contact, EndpointPair, NatType};
