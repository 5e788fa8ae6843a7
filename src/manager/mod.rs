//! Managed connections: the node-level connection-management core.
//!
//! A [`ConnectionManager`] multiplexes many logical peer connections over a
//! small pool of UDP transports. It coordinates bootstrap into an existing
//! overlay, tracks in-flight connection attempts against a rendezvous
//! deadline, allocates endpoints with awareness of this node's NAT type, and
//! surfaces message and lifecycle events to an upstream [`Listener`].

mod bootstrap;
mod config;
mod events;
mod service;
mod state;

#[cfg(test)]
pub(crate) mod testing;

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use crate::core::{NodeId, RudpError, RudpResult, DEBUG_STRING_MAX_PEERS};
use crate::crypto::Keypair;
use crate::transport::{
    endpoint, Contact, EndpointPair, NatCell, NatType, Transport, TransportFactory,
};

use service::AsyncService;
use state::{transport_endpoints, PendingConnection, State};

pub use config::{Config, ConfigBuilder};

/// Upstream consumer of message and lifecycle events.
///
/// Held by weak reference; once the listener is dropped, events are silently
/// discarded.
pub trait Listener: Send + Sync {
    /// A message arrived from `peer_id`, already decrypted.
    fn message_received(&self, peer_id: NodeId, message: Vec<u8>);

    /// The managed connection to `peer_id` was lost.
    fn connection_lost(&self, peer_id: NodeId);
}

/// Connection-management core of the node.
///
/// Owns the execution context that transport callbacks and reservation
/// deadlines run on; dropping the manager closes every transport and stops
/// the context.
pub struct ConnectionManager {
    inner: Arc<Inner>,
    service: AsyncService,
}

/// Shared manager state reachable from transport callbacks.
///
/// Transports hold only a `Weak<Inner>` (as their observer), so callbacks
/// arriving after the manager is gone resolve to no-ops instead of keeping
/// it alive.
pub(crate) struct Inner {
    pub(crate) config: Config,
    pub(crate) factory: Arc<dyn TransportFactory>,
    pub(crate) handle: Handle,
    pub(crate) nat_cell: Arc<NatCell>,
    pub(crate) state: Mutex<State>,
    /// Back-reference handed to transports and deadline tasks.
    pub(crate) weak_self: Weak<Inner>,
}

impl ConnectionManager {
    /// Construct the manager with its own execution context and an unknown
    /// NAT estimate. No transport exists until [`bootstrap`](Self::bootstrap).
    pub fn new(config: Config, factory: Arc<dyn TransportFactory>) -> io::Result<Self> {
        let service = AsyncService::new(config.thread_count)?;
        let handle = service.handle();
        let inner = Arc::new_cyclic(|weak_self| Inner {
            handle,
            config,
            factory,
            nat_cell: Arc::new(NatCell::new(NatType::Unknown)),
            state: Mutex::new(State::new()),
            weak_self: weak_self.clone(),
        });
        Ok(Self { inner, service })
    }

    /// Join an overlay through one of `bootstrap_list`.
    ///
    /// Starts the first transport, records this node's identity and keypair,
    /// and resolves with the contact actually used. Any state left over from
    /// a previous bootstrap is torn down first.
    pub async fn bootstrap(
        &self,
        bootstrap_list: Vec<Contact>,
        listener: Weak<dyn Listener>,
        keypair: Keypair,
        this_node_id: NodeId,
        local_endpoint: Option<SocketAddr>,
    ) -> RudpResult<Contact> {
        if !this_node_id.is_valid() {
            error!("bootstrap requires a valid node id");
            return Err(RudpError::InvalidParameter);
        }
        if bootstrap_list.is_empty() {
            error!("bootstrap requires at least one contact");
            return Err(RudpError::NoBootstrapEndpoints);
        }

        self.inner.clear_connections_and_idle_transports();

        // A caller-supplied valid endpoint pins the interface (zero-state
        // network setup); otherwise take the OS's outbound route.
        let local_endpoint = match local_endpoint {
            Some(ep) if endpoint::is_valid(ep) => ep,
            _ => {
                let ip = endpoint::discover_local_ip().map_err(|e| {
                    error!("failed to determine local address: {e}");
                    RudpError::FailedToGetLocalAddress
                })?;
                SocketAddr::new(ip, 0)
            }
        };

        {
            let mut state = self.inner.state.lock();
            state.this_node_id = this_node_id;
            state.keypair = Some(keypair);
            state.listener = Some(listener);
            state.local_ip = Some(local_endpoint.ip());
        }

        let (_, chosen_contact) = self
            .inner
            .start_new_transport(bootstrap_list, local_endpoint)
            .await?;
        Ok(chosen_contact)
    }

    /// Pick the endpoint pair a peer should rendezvous with, reserving a
    /// transport for it.
    ///
    /// Returns the pair together with a flag telling the caller a managed
    /// connection already exists, in which case [`add`](Self::add) must not
    /// be called. `peer_endpoint_pair` is the peer's own advertised pair,
    /// consulted only by the fan-out policy.
    pub async fn get_available_endpoint(
        &self,
        peer_id: NodeId,
        peer_endpoint_pair: EndpointPair,
    ) -> RudpResult<(EndpointPair, bool)> {
        let local_endpoint = {
            let mut state = self.inner.state.lock();
            if peer_id == state.this_node_id {
                error!("cannot get an endpoint towards this node's own id {peer_id}");
                return Err(RudpError::OperationNotSupported);
            }

            // An earlier reservation for this peer stands.
            if let Some(pending) = state.pendings.get(&peer_id) {
                debug_assert!(pending.transport.is_available());
                return Ok((transport_endpoints(&pending.transport), false));
            }

            if let Some(result) = self.inner.existing_connection(&mut state, peer_id) {
                return Ok(result);
            }

            if let Some(pair) = self.inner.select_idle_transport(&mut state, peer_id) {
                return Ok((pair, false));
            }

            if let Some(pair) = self.inner.select_least_loaded(&mut state, peer_id) {
                return Ok((pair, false));
            }

            if state.connections.is_empty() && state.idle_transports.is_empty() {
                warn!("no endpoint for {peer_id}: node has not bootstrapped");
                return Err(RudpError::NoBootstrapEndpoints);
            }

            let nat_type = self.inner.nat_cell.get();
            if !state.should_start_new_transport(&peer_endpoint_pair, nat_type, &self.inner.config)
            {
                debug!("refusing new transport for {peer_id} ({nat_type} NAT, at capacity)");
                return Err(RudpError::NoAvailableEndpoint);
            }

            let ip = state.local_ip.ok_or(RudpError::FailedToGetLocalAddress)?;
            SocketAddr::new(ip, 0)
        };

        // Fan out: bootstrap one more transport off the existing connections.
        let (transport, _) = self
            .inner
            .start_new_transport(Vec::new(), local_endpoint)
            .await?;

        let mut state = self.inner.state.lock();
        if let Some(pending) = state.pendings.get(&peer_id) {
            return Ok((transport_endpoints(&pending.transport), false));
        }
        if transport.is_available() {
            let pair = transport_endpoints(&transport);
            self.inner.reserve(&mut state, peer_id, transport);
            return Ok((pair, false));
        }
        // A racing caller filled the fresh transport already; fall back to
        // whatever capacity is left.
        if let Some(pair) = self.inner.select_idle_transport(&mut state, peer_id) {
            return Ok((pair, false));
        }
        if let Some(pair) = self.inner.select_least_loaded(&mut state, peer_id) {
            return Ok((pair, false));
        }
        Err(RudpError::NoAvailableEndpoint)
    }

    /// Start the handshake towards `peer`, using the transport reserved by a
    /// prior [`get_available_endpoint`](Self::get_available_endpoint).
    ///
    /// Resolves once the attempt is accepted or rejected; promotion into the
    /// registry happens through the transport's events.
    pub async fn add(&self, peer: Contact) -> RudpResult<()> {
        let transport = {
            let mut state = self.inner.state.lock();
            if peer.id == state.this_node_id {
                error!("cannot add this node's own id {} as a peer", peer.id);
                return Err(RudpError::OperationNotSupported);
            }

            let chosen_bootstrap_id = state.chosen_bootstrap_id();
            let already_registered = state.connections.contains_key(&peer.id);
            let Some(pending) = state.pendings.get_mut(&peer.id) else {
                if already_registered {
                    warn!("managed connection to {} already exists", peer.id);
                    return Err(RudpError::AlreadyConnected);
                }
                error!(
                    "no connection attempt towards {} - get_available_endpoint first",
                    peer.id
                );
                return Err(RudpError::OperationNotSupported);
            };

            if pending.connecting {
                warn!("connection attempt towards {} already in progress", peer.id);
                return Err(RudpError::ConnectionAlreadyInProgress);
            }
            pending.connecting = true;
            let transport = pending.transport.clone();

            if let Some(info) = transport.connection_info(peer.id) {
                use crate::transport::ConnectionState::{Bootstrapping, Permanent};
                // A live connection here is normally the bootstrap one. If
                // this node bootstrapped off the peer, validation may already
                // have promoted it to permanent before add was called; that
                // race is a success, not a duplicate.
                if info.state == Bootstrapping {
                    return Ok(());
                }
                if chosen_bootstrap_id == Some(peer.id) && info.state == Permanent {
                    // Fully established: no further event will consume the
                    // reservation, so retire it here.
                    state.pendings.remove(&peer.id);
                    return Ok(());
                }
                warn!(
                    "managed connection to {} already exists on the reserved transport",
                    peer.id
                );
                state.pendings.remove(&peer.id);
                return Err(RudpError::AlreadyConnected);
            }

            transport
        };

        transport
            .connect(peer.id, peer.endpoint_pair, peer.public_key)
            .await
    }

    /// Close the managed connection to `peer_id`, if any.
    ///
    /// The close is issued outside the lock; the resulting lost-event takes
    /// care of the tables. Removing an unknown peer is a no-op.
    pub fn remove(&self, peer_id: NodeId) {
        let transport = {
            let state = self.inner.state.lock();
            if peer_id == state.this_node_id {
                error!("cannot remove this node's own id {peer_id}");
                return;
            }
            match state.connections.get(&peer_id) {
                Some(transport) => transport.clone(),
                None => {
                    warn!("cannot remove connection to {peer_id} - not in registry");
                    return;
                }
            }
        };
        transport.close_connection(peer_id);
    }

    /// Queue `message` for delivery to `peer_id`.
    ///
    /// Fails with [`RudpError::NotConnected`] if the peer has no managed
    /// connection or its transport refuses the payload.
    pub async fn send(&self, peer_id: NodeId, message: Vec<u8>) -> RudpResult<()> {
        let transport = {
            let state = self.inner.state.lock();
            if peer_id == state.this_node_id {
                error!("cannot send to this node's own id {peer_id}");
                return Err(RudpError::OperationNotSupported);
            }
            state.connections.get(&peer_id).cloned()
        };

        if let Some(transport) = transport {
            if transport.send(peer_id, message).await {
                return Ok(());
            }
        }
        error!("cannot send to {peer_id} - not connected");
        Err(RudpError::NotConnected)
    }

    /// Current NAT estimate.
    pub fn nat_type(&self) -> NatType {
        self.inner.nat_cell.get()
    }

    /// Human-readable summary of transports, idle pool and reservations.
    ///
    /// Returns an empty string once the registry has grown past
    /// [`DEBUG_STRING_MAX_PEERS`] peers, to keep logs bounded.
    pub fn debug_string(&self) -> String {
        let state = self.inner.state.lock();
        if state.connections.len() > DEBUG_STRING_MAX_PEERS {
            return String::new();
        }

        let mut transports: Vec<Arc<dyn Transport>> = Vec::new();
        for transport in state.connections.values() {
            if !transports.iter().any(|t| Arc::ptr_eq(t, transport)) {
                transports.push(transport.clone());
            }
        }

        let mut out = String::from("This node's own transports and their peer connections:\n");
        for transport in &transports {
            out.push_str(&transport.debug_string());
        }

        out.push_str("\nThis node's idle transports:\n");
        for transport in state.idle_transports.iter() {
            out.push_str(&transport.debug_string());
        }

        out.push_str("\nThis node's pending connections:\n");
        for (peer_id, pending) in &state.pendings {
            out.push_str(&format!(
                "\tPending to peer {} on this node's transport {} / {}\n",
                peer_id,
                pending.transport.external_endpoint(),
                pending.transport.local_endpoint(),
            ));
        }
        out.push('\n');
        out
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let transports = self.inner.state.lock().drain_transports();
        for transport in transports {
            transport.close();
        }
        self.service.stop();
    }
}

impl Inner {
    /// Reserve `transport` for `peer_id` and arm the rendezvous deadline.
    ///
    /// The deadline task holds only a weak back-reference, so it cannot fire
    /// against a destroyed manager; removal of the record aborts it.
    fn reserve(&self, state: &mut State, peer_id: NodeId, transport: Arc<dyn Transport>) {
        let weak = self.weak_self.clone();
        let timeout = self.config.rendezvous_connect_timeout;
        let deadline = self.handle.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                if inner.state.lock().pendings.remove(&peer_id).is_some() {
                    debug!("reservation for {peer_id} expired before the connection completed");
                }
            }
        });

        let previous = state
            .pendings
            .insert(peer_id, PendingConnection::new(transport, deadline));
        debug_assert!(previous.is_none(), "one reservation per peer");
    }

    /// Policy step for a peer already in the registry.
    ///
    /// Bootstrap-state and unvalidated connections get re-offered (with a
    /// fresh reservation for the bootstrap case, awaiting promotion by
    /// `add`); anything else reports `connection_exists`.
    fn existing_connection(
        &self,
        state: &mut State,
        peer_id: NodeId,
    ) -> Option<(EndpointPair, bool)> {
        use crate::transport::ConnectionState::{Bootstrapping, Unvalidated};

        let transport = state.connections.get(&peer_id)?.clone();
        let Some(info) = transport.connection_info(peer_id) else {
            error!("registry names {peer_id} but its transport disowns it; healing");
            debug_assert!(false, "registry out of sync with transport");
            state.connections.remove(&peer_id);
            return None;
        };

        let pair = transport_endpoints(&transport);
        match info.state {
            Bootstrapping | Unvalidated => {
                debug_assert!(transport.is_available());
                debug_assert!(!state.pendings.contains_key(&peer_id));
                if info.state == Bootstrapping {
                    self.reserve(state, peer_id, transport);
                }
                Some((pair, false))
            }
            _ => Some((pair, true)),
        }
    }

    /// Reuse the oldest idle transport that is still available, evicting
    /// dead pool entries along the way.
    fn select_idle_transport(&self, state: &mut State, peer_id: NodeId) -> Option<EndpointPair> {
        while let Some(transport) = state.idle_transports.first() {
            if transport.is_available() {
                debug_assert!(!state.pendings.contains_key(&peer_id));
                let pair = transport_endpoints(&transport);
                self.reserve(state, peer_id, transport);
                return Some(pair);
            }
            state.idle_transports.remove(&transport);
        }
        None
    }

    /// Reserve the registered transport with the fewest normal connections,
    /// if one is below its cap.
    fn select_least_loaded(&self, state: &mut State, peer_id: NodeId) -> Option<EndpointPair> {
        let transport = state.least_loaded_transport(&self.config)?;
        debug_assert!(transport.is_available());
        debug_assert!(!state.pendings.contains_key(&peer_id));
        let pair = transport_endpoints(&transport);
        self.reserve(state, peer_id, transport);
        Some(pair)
    }

    /// Tear down everything a previous bootstrap left behind.
    pub(crate) fn clear_connections_and_idle_transports(&self) {
        let transports = {
            let mut state = self.state.lock();
            state.chosen_bootstrap_contact = None;
            state.drain_transports()
        };
        for transport in transports {
            transport.close();
        }
    }
}
