//! Transport contract consumed by the connection manager.
//!
//! A transport owns one UDP endpoint and multiplexes up to a configured
//! number of peer connections over it. The manager never sees inside the
//! reliable-delivery state machine; it drives transports through the
//! [`Transport`] trait and hears back through [`TransportObserver`].

pub mod endpoint;
pub mod nat;

use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::runtime::Handle;

use crate::core::{NodeId, RudpResult};
use crate::crypto::PublicKey;

pub use endpoint::{Contact, EndpointPair};
pub use nat::{NatCell, NatType};

/// Lifecycle state of one logical connection, as reported by its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// First-contact connection made while joining the overlay; not yet
    /// validated by the upper layer.
    Bootstrapping,
    /// Handshake done, peer identity not yet confirmed.
    Unvalidated,
    /// Fully validated managed connection.
    Permanent,
    /// A second normal connection to an already-registered peer.
    Duplicate,
    /// Short-lived helper connection (e.g. NAT detection); never registered.
    Temporary,
}

/// Snapshot of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// The peer's remote endpoint for this connection.
    pub peer_endpoint: SocketAddr,
    /// The peer's identity.
    pub peer_node_id: NodeId,
    /// The peer's static public key.
    pub peer_public_key: PublicKey,
}

/// Debug-only packet-loss injection rates, applied at a transport's
/// multiplexer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketLoss {
    /// Probability of dropping any single packet.
    pub constant: f64,
    /// Probability of entering a bursty-loss episode.
    pub bursty: f64,
}

/// Everything a factory needs to construct a transport wired to the manager.
#[derive(Clone)]
pub struct TransportContext {
    /// Handle onto the manager's owned runtime; transports spawn their I/O
    /// and timer tasks here.
    pub handle: Handle,
    /// Shared NAT estimate, refined by the transport during traversal.
    pub nat_cell: Arc<NatCell>,
    /// Debug packet-loss rates, if configured.
    pub packet_loss: Option<PacketLoss>,
}

/// Events flowing back from a transport into the connection manager.
///
/// Transports hold only a weak reference to their observer; an expired
/// observer means the manager is gone and the event is dropped.
pub trait TransportObserver: Send + Sync {
    /// A complete message arrived from `peer_id`.
    fn on_message(&self, peer_id: NodeId, message: Vec<u8>);

    /// A connection to `peer_id` was established on `transport`.
    ///
    /// Returns `true` if the peer already had a registered normal connection
    /// elsewhere, in which case the transport should treat this one as a
    /// duplicate and tear it down.
    fn on_connection_added(
        &self,
        peer_id: NodeId,
        transport: &Arc<dyn Transport>,
        temporary: bool,
    ) -> bool;

    /// The connection to `peer_id` on `transport` went away.
    fn on_connection_lost(&self, peer_id: NodeId, transport: &Arc<dyn Transport>, temporary: bool);

    /// A peer asked for help detecting its NAT type.
    ///
    /// Returns the external port of another transport of this node, or 0 if
    /// no transport on a different local endpoint can assist.
    fn on_nat_detection_requested(
        &self,
        this_local_endpoint: SocketAddr,
        peer_id: NodeId,
        peer_endpoint: SocketAddr,
    ) -> u16;
}

/// One UDP endpoint multiplexing up to a fixed number of peer connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Join the overlay through one of `bootstrap_list`, wiring all transport
    /// events to `observer`. Resolves with the contact actually used.
    ///
    /// `bootstrap_off_existing_connection` marks lists synthesized from live
    /// connections rather than supplied by the caller; transports skip the
    /// expensive external-address discovery in that mode.
    #[allow(clippy::too_many_arguments)]
    async fn bootstrap(
        &self,
        bootstrap_list: Vec<Contact>,
        this_node_id: NodeId,
        this_public_key: PublicKey,
        local_endpoint: SocketAddr,
        bootstrap_off_existing_connection: bool,
        observer: Weak<dyn TransportObserver>,
    ) -> RudpResult<Contact>;

    /// Open a connection to `peer_id`, rendezvous-style. Resolves once the
    /// attempt is accepted or rejected; registration happens via
    /// [`TransportObserver::on_connection_added`].
    async fn connect(
        &self,
        peer_id: NodeId,
        peer_endpoint_pair: EndpointPair,
        peer_public_key: PublicKey,
    ) -> RudpResult<()>;

    /// Queue `message` for `peer_id`. Returns whether the transport accepted
    /// responsibility for it.
    async fn send(&self, peer_id: NodeId, message: Vec<u8>) -> bool;

    /// Fire a ping at `peer_endpoint` on the peer's behalf; used to assist
    /// the peer's NAT detection. The result is not interesting to this node.
    async fn ping(&self, peer_id: NodeId, peer_endpoint: SocketAddr, peer_public_key: PublicKey);

    /// Tear down every connection and release the UDP endpoint.
    fn close(&self);

    /// Tear down the single connection to `peer_id`, if present.
    fn close_connection(&self, peer_id: NodeId);

    /// Endpoint bound on this host.
    fn local_endpoint(&self) -> SocketAddr;

    /// Endpoint as seen from outside the NAT; may be invalid before
    /// traversal settles.
    fn external_endpoint(&self) -> SocketAddr;

    /// Record a best-guess external endpoint when traversal could not
    /// observe one directly (symmetric or unknown NAT).
    fn set_best_guess_external_endpoint(&self, endpoint: SocketAddr);

    /// Whether the transport can accept another connection.
    fn is_available(&self) -> bool;

    /// Whether the transport has no live peer connections at all.
    fn is_idle(&self) -> bool;

    /// Number of normal (non-temporary) connections multiplexed here.
    fn normal_connection_count(&self) -> usize;

    /// This node's endpoint as observed by `peer_id`, if connected here.
    fn endpoint_as_seen_by_peer(&self, peer_id: NodeId) -> Option<SocketAddr>;

    /// Snapshot of the connection to `peer_id`, if present.
    fn connection_info(&self, peer_id: NodeId) -> Option<ConnectionInfo>;

    /// Human-readable summary of this transport and its connections.
    fn debug_string(&self) -> String {
        String::new()
    }
}

/// Seam through which the manager constructs transports.
///
/// Production factories build real UDP transports; tests inject scripted
/// fakes.
pub trait TransportFactory: Send + Sync {
    /// Construct a fresh transport bound to the manager's runtime and
    /// NAT-estimate cell.
    fn create(&self, context: TransportContext) -> Arc<dyn Transport>;
}
