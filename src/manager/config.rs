//! Connection-manager configuration.

use std::time::Duration;

use crate::core::{
    DEFAULT_MAX_CONNECTIONS_PER_TRANSPORT, DEFAULT_MAX_TRANSPORTS,
    DEFAULT_RENDEZVOUS_CONNECT_TIMEOUT, DEFAULT_THREAD_COUNT,
};
use crate::transport::PacketLoss;

/// Tuning parameters for a [`ConnectionManager`](super::ConnectionManager).
#[derive(Debug, Clone)]
pub struct Config {
    /// Worker threads in the owned execution context.
    pub thread_count: usize,

    /// Soft cap on live transports while the NAT is not symmetric. A
    /// symmetric NAT needs one source port per destination, so there the cap
    /// becomes `max_transports * max_connections_per_transport`.
    pub max_transports: usize,

    /// Hard cap on peer connections multiplexed over one transport.
    pub max_connections_per_transport: usize,

    /// How long an endpoint reservation survives without a completed
    /// connection before it is garbage-collected.
    pub rendezvous_connect_timeout: Duration,

    /// Seal and open messages with the node keypair. Disabled only in tests
    /// that want to inspect payloads on the wire.
    pub encrypt_messages: bool,

    /// Debug packet-loss rates forwarded to every transport, if set.
    pub packet_loss: Option<PacketLoss>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thread_count: DEFAULT_THREAD_COUNT,
            max_transports: DEFAULT_MAX_TRANSPORTS,
            max_connections_per_transport: DEFAULT_MAX_CONNECTIONS_PER_TRANSPORT,
            rendezvous_connect_timeout: DEFAULT_RENDEZVOUS_CONNECT_TIMEOUT,
            encrypt_messages: true,
            packet_loss: None,
        }
    }
}

/// Builder for [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a builder preloaded with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker thread count.
    pub fn thread_count(mut self, count: usize) -> Self {
        self.config.thread_count = count;
        self
    }

    /// Set the transport cap for non-symmetric NATs.
    pub fn max_transports(mut self, max: usize) -> Self {
        self.config.max_transports = max;
        self
    }

    /// Set the per-transport connection cap.
    pub fn max_connections_per_transport(mut self, max: usize) -> Self {
        self.config.max_connections_per_transport = max;
        self
    }

    /// Set the reservation deadline.
    pub fn rendezvous_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.rendezvous_connect_timeout = timeout;
        self
    }

    /// Enable or disable message sealing.
    pub fn encrypt_messages(mut self, enabled: bool) -> Self {
        self.config.encrypt_messages = enabled;
        self
    }

    /// Set debug packet-loss rates.
    pub fn packet_loss(mut self, loss: PacketLoss) -> Self {
        self.config.packet_loss = Some(loss);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Config {
        self.config
    }
}
