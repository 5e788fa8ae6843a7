//! Tables guarded by the manager's single internal lock.
//!
//! One mutex covers the connection registry, the pending-reservation table,
//! the idle-transport pool, the chosen bootstrap contact, the node identity
//! and the local IP. Cross-table invariants (a peer is pending XOR
//! registered, an idle transport carries no registered peers) only need to
//! hold at the edges of one critical section, which is why a single lock is
//! used instead of finer-grained ones.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;

use crate::core::NodeId;
use crate::crypto::Keypair;
use crate::transport::{endpoint, Contact, EndpointPair, NatType, Transport};

use super::{Config, Listener};

/// A reservation linking a future peer to the transport chosen for it.
///
/// Created when endpoint allocation picks a transport for the peer; destroyed
/// on promotion into the registry, on rejection, on connection loss, or when
/// the rendezvous deadline fires. Dropping the record aborts the deadline
/// task, so every removal path also cancels the timer.
pub(crate) struct PendingConnection {
    /// The transport reserved for the peer.
    pub transport: Arc<dyn Transport>,
    /// Set once `add` has started the handshake, to reject concurrent adds.
    pub connecting: bool,
    /// Deadline task; aborted on drop.
    deadline: JoinHandle<()>,
}

impl PendingConnection {
    /// Create a record owning `deadline`.
    pub fn new(transport: Arc<dyn Transport>, deadline: JoinHandle<()>) -> Self {
        Self {
            transport,
            connecting: false,
            deadline,
        }
    }
}

impl Drop for PendingConnection {
    fn drop(&mut self) {
        self.deadline.abort();
    }
}

/// Transports with no live peers, retained for reuse.
///
/// Membership is by transport identity (`Arc` pointer), since two transports
/// can transiently report equal endpoints while rebinding.
#[derive(Default)]
pub(crate) struct IdleSet {
    transports: Vec<Arc<dyn Transport>>,
}

impl IdleSet {
    /// Insert `transport` unless already present.
    pub fn insert(&mut self, transport: Arc<dyn Transport>) {
        if !self.contains(&transport) {
            self.transports.push(transport);
        }
    }

    /// Remove `transport` if present.
    pub fn remove(&mut self, transport: &Arc<dyn Transport>) {
        self.transports.retain(|t| !Arc::ptr_eq(t, transport));
    }

    /// Whether `transport` is a member.
    pub fn contains(&self, transport: &Arc<dyn Transport>) -> bool {
        self.transports.iter().any(|t| Arc::ptr_eq(t, transport))
    }

    /// The oldest member, if any.
    pub fn first(&self) -> Option<Arc<dyn Transport>> {
        self.transports.first().cloned()
    }

    /// Iterate over members.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Transport>> {
        self.transports.iter()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.transports.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }

    /// Remove and return every member.
    pub fn drain(&mut self) -> Vec<Arc<dyn Transport>> {
        std::mem::take(&mut self.transports)
    }

    /// Evict members that can no longer accept connections.
    #[cfg(debug_assertions)]
    pub fn evict_unavailable(&mut self) {
        self.transports.retain(|t| t.is_available());
    }
}

/// Everything the manager mutates under its single lock.
pub(crate) struct State {
    /// This node's identity; [`NodeId::UNSET`] until bootstrap.
    pub this_node_id: NodeId,
    /// This node's keypair; set at bootstrap.
    pub keypair: Option<Keypair>,
    /// Upstream event consumer; expired listeners drop events.
    pub listener: Option<Weak<dyn Listener>>,
    /// Local IP recorded when the first transport started.
    pub local_ip: Option<IpAddr>,
    /// The contact through which this node joined the overlay.
    pub chosen_bootstrap_contact: Option<Contact>,
    /// Registry of established managed connections: peer to owning transport.
    pub connections: HashMap<NodeId, Arc<dyn Transport>>,
    /// In-flight endpoint reservations, at most one per peer.
    pub pendings: HashMap<NodeId, PendingConnection>,
    /// Transports with no peers, kept to amortize NAT-punch cost.
    pub idle_transports: IdleSet,
}

impl State {
    /// Fresh, un-bootstrapped state.
    pub fn new() -> Self {
        Self {
            this_node_id: NodeId::UNSET,
            keypair: None,
            listener: None,
            local_ip: None,
            chosen_bootstrap_contact: None,
            connections: HashMap::new(),
            pendings: HashMap::new(),
            idle_transports: IdleSet::default(),
        }
    }

    /// Id of the chosen bootstrap contact, if still connected.
    pub fn chosen_bootstrap_id(&self) -> Option<NodeId> {
        self.chosen_bootstrap_contact.as_ref().map(|c| c.id)
    }

    /// Recompute `transport`'s idle-pool membership after a connection was
    /// added or lost on it.
    pub fn update_idle_transports(&mut self, transport: &Arc<dyn Transport>) {
        if transport.is_idle() {
            debug_assert!(transport.is_available());
            self.idle_transports.insert(transport.clone());
        } else {
            self.idle_transports.remove(transport);
        }
    }

    /// The registered transport with the fewest normal connections, strictly
    /// below `max_connections_per_transport`.
    pub fn least_loaded_transport(&self, config: &Config) -> Option<Arc<dyn Transport>> {
        let mut least = config.max_connections_per_transport;
        let mut selected = None;
        for transport in self.connections.values() {
            let count = transport.normal_connection_count();
            if count < least {
                least = count;
                selected = Some(transport.clone());
            }
        }
        selected
    }

    /// Whether endpoint allocation may start another transport for a peer
    /// advertising `peer_endpoint_pair`.
    ///
    /// A symmetric NAT maps each destination to its own source port, so the
    /// node fans out transports up to `max_transports *
    /// max_connections_per_transport` peers, but only when the peer is
    /// reachable externally (or has no usable endpoints at all, in which
    /// case rendezvous decides). A cone NAT reuses one port for many peers,
    /// so the plain transport cap applies.
    pub fn should_start_new_transport(
        &self,
        peer_endpoint_pair: &EndpointPair,
        nat_type: NatType,
        config: &Config,
    ) -> bool {
        if nat_type == NatType::Symmetric
            && self.connections.len() < config.max_transports * config.max_connections_per_transport
        {
            if endpoint::is_valid(peer_endpoint_pair.external) {
                true
            } else {
                !endpoint::is_valid(peer_endpoint_pair.local)
            }
        } else {
            self.connections.len() < config.max_transports
        }
    }

    /// Remove every transport reference from every table, deduplicated by
    /// identity, so the caller can close them outside the lock.
    pub fn drain_transports(&mut self) -> Vec<Arc<dyn Transport>> {
        let mut drained: Vec<Arc<dyn Transport>> = Vec::new();
        let mut push = |transport: Arc<dyn Transport>, drained: &mut Vec<Arc<dyn Transport>>| {
            if !drained.iter().any(|t| Arc::ptr_eq(t, &transport)) {
                drained.push(transport);
            }
        };
        for (_, transport) in self.connections.drain() {
            push(transport, &mut drained);
        }
        for (_, pending) in self.pendings.drain() {
            push(pending.transport.clone(), &mut drained);
        }
        for transport in self.idle_transports.drain() {
            push(transport, &mut drained);
        }
        drained
    }
}

/// Both endpoints of a transport as an [`EndpointPair`].
pub(crate) fn transport_endpoints(transport: &Arc<dyn Transport>) -> EndpointPair {
    EndpointPair::new(transport.local_endpoint(), transport.external_endpoint())
}
