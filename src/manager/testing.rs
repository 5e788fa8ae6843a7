//! Scripted test doubles for the transport and listener contracts.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{NodeId, RudpError, RudpResult};
use crate::crypto::PublicKey;
use crate::transport::{
    endpoint, Contact, ConnectionInfo, ConnectionState, EndpointPair, Transport,
    TransportContext, TransportFactory, TransportObserver,
};

use super::Listener;

/// What a [`FakeTransport`] should do when asked to bootstrap.
#[derive(Clone)]
pub(crate) enum BootstrapPlan {
    /// Resolve with `contact`; when `register` is set, also report a
    /// bootstrap-state connection to it through the observer.
    Succeed { contact: Contact, register: bool },
    /// Fail outright.
    Fail,
}

/// In-memory transport whose behavior is scripted by the test.
pub(crate) struct FakeTransport {
    local: SocketAddr,
    external: Mutex<SocketAddr>,
    max_connections: usize,
    observer: Mutex<Option<Weak<dyn TransportObserver>>>,
    connections: Mutex<HashMap<NodeId, ConnectionInfo>>,
    seen_by: Mutex<HashMap<NodeId, SocketAddr>>,
    bootstrap_plan: Mutex<Option<BootstrapPlan>>,
    connect_delay: Mutex<Option<Duration>>,
    closed: AtomicBool,
    sent: Mutex<Vec<(NodeId, Vec<u8>)>>,
    pings: Mutex<Vec<(NodeId, SocketAddr)>>,
    weak_self: Weak<FakeTransport>,
}

static NEXT_SCRIPTED_PORT: AtomicU16 = AtomicU16::new(40000);

impl FakeTransport {
    pub fn with_endpoints(
        local: SocketAddr,
        external: SocketAddr,
        max_connections: usize,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            local,
            external: Mutex::new(external),
            max_connections,
            observer: Mutex::new(None),
            connections: Mutex::new(HashMap::new()),
            seen_by: Mutex::new(HashMap::new()),
            bootstrap_plan: Mutex::new(None),
            connect_delay: Mutex::new(None),
            closed: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            pings: Mutex::new(Vec::new()),
            weak_self: weak_self.clone(),
        })
    }

    pub fn plan_bootstrap(&self, plan: BootstrapPlan) {
        *self.bootstrap_plan.lock() = Some(plan);
    }

    /// Wire the observer without going through a bootstrap call.
    pub fn set_observer(&self, observer: Weak<dyn TransportObserver>) {
        *self.observer.lock() = Some(observer);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = Some(delay);
    }

    /// Insert a connection without reporting any event.
    pub fn script_connection(&self, peer_id: NodeId, state: ConnectionState) {
        let port = NEXT_SCRIPTED_PORT.fetch_add(1, Ordering::Relaxed);
        let peer_endpoint = format!("203.0.113.50:{port}").parse().unwrap();
        self.script_connection_at(peer_id, state, peer_endpoint);
    }

    /// Insert a connection at a specific peer endpoint, without events.
    pub fn script_connection_at(
        &self,
        peer_id: NodeId,
        state: ConnectionState,
        peer_endpoint: SocketAddr,
    ) {
        self.connections.lock().insert(
            peer_id,
            ConnectionInfo {
                state,
                peer_endpoint,
                peer_node_id: peer_id,
                peer_public_key: test_public_key(0xaa),
            },
        );
    }

    pub fn set_connection_state(&self, peer_id: NodeId, state: ConnectionState) {
        if let Some(info) = self.connections.lock().get_mut(&peer_id) {
            info.state = state;
        }
    }

    /// Script what the peer reports this node's endpoint as.
    pub fn set_seen_by(&self, peer_id: NodeId, seen_as: SocketAddr) {
        self.seen_by.lock().insert(peer_id, seen_as);
    }

    /// Report an inbound message through the observer.
    pub fn deliver(&self, peer_id: NodeId, message: Vec<u8>) {
        if let Some(observer) = self.observer() {
            observer.on_message(peer_id, message);
        }
    }

    /// Drop a connection and report it lost.
    pub fn drop_connection(&self, peer_id: NodeId, temporary: bool) {
        self.connections.lock().remove(&peer_id);
        self.fire_lost(peer_id, temporary);
    }

    pub fn sent(&self) -> Vec<(NodeId, Vec<u8>)> {
        self.sent.lock().clone()
    }

    pub fn pings(&self) -> Vec<(NodeId, SocketAddr)> {
        self.pings.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    fn observer(&self) -> Option<Arc<dyn TransportObserver>> {
        self.observer.lock().clone().and_then(|weak| weak.upgrade())
    }

    fn as_transport(&self) -> Arc<dyn Transport> {
        self.weak_self.upgrade().expect("fake transport alive")
    }

    fn fire_added(&self, peer_id: NodeId, temporary: bool) -> bool {
        match self.observer() {
            Some(observer) => {
                observer.on_connection_added(peer_id, &self.as_transport(), temporary)
            }
            None => false,
        }
    }

    fn fire_lost(&self, peer_id: NodeId, temporary: bool) {
        if let Some(observer) = self.observer() {
            observer.on_connection_lost(peer_id, &self.as_transport(), temporary);
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn bootstrap(
        &self,
        bootstrap_list: Vec<Contact>,
        _this_node_id: NodeId,
        _this_public_key: PublicKey,
        _local_endpoint: SocketAddr,
        _bootstrap_off_existing_connection: bool,
        observer: Weak<dyn TransportObserver>,
    ) -> RudpResult<Contact> {
        *self.observer.lock() = Some(observer);
        let plan = self.bootstrap_plan.lock().take();
        match plan {
            Some(BootstrapPlan::Fail) => Err(RudpError::FailedToBootstrap),
            Some(BootstrapPlan::Succeed { contact, register }) => {
                if register {
                    let peer_endpoint = contact_endpoint(&contact);
                    self.connections.lock().insert(
                        contact.id,
                        ConnectionInfo {
                            state: ConnectionState::Bootstrapping,
                            peer_endpoint,
                            peer_node_id: contact.id,
                            peer_public_key: contact.public_key,
                        },
                    );
                    self.fire_added(contact.id, false);
                }
                Ok(contact)
            }
            None => bootstrap_list
                .into_iter()
                .next()
                .ok_or(RudpError::FailedToBootstrap),
        }
    }

    async fn connect(
        &self,
        peer_id: NodeId,
        peer_endpoint_pair: EndpointPair,
        peer_public_key: PublicKey,
    ) -> RudpResult<()> {
        if self.is_closed() {
            return Err(RudpError::NotConnected);
        }
        let delay = *self.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let peer_endpoint = if endpoint::is_valid(peer_endpoint_pair.external) {
            peer_endpoint_pair.external
        } else {
            peer_endpoint_pair.local
        };
        self.connections.lock().insert(
            peer_id,
            ConnectionInfo {
                state: ConnectionState::Unvalidated,
                peer_endpoint,
                peer_node_id: peer_id,
                peer_public_key,
            },
        );

        if self.fire_added(peer_id, false) {
            self.connections.lock().remove(&peer_id);
            self.fire_lost(peer_id, true);
        }
        Ok(())
    }

    async fn send(&self, peer_id: NodeId, message: Vec<u8>) -> bool {
        let accepted = !self.is_closed() && self.connections.lock().contains_key(&peer_id);
        if accepted {
            self.sent.lock().push((peer_id, message));
        }
        accepted
    }

    async fn ping(&self, peer_id: NodeId, peer_endpoint: SocketAddr, _peer_public_key: PublicKey) {
        self.pings.lock().push((peer_id, peer_endpoint));
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.connections.lock().clear();
    }

    fn close_connection(&self, peer_id: NodeId) {
        if self.connections.lock().remove(&peer_id).is_some() {
            self.fire_lost(peer_id, false);
        }
    }

    fn local_endpoint(&self) -> SocketAddr {
        self.local
    }

    fn external_endpoint(&self) -> SocketAddr {
        *self.external.lock()
    }

    fn set_best_guess_external_endpoint(&self, endpoint: SocketAddr) {
        *self.external.lock() = endpoint;
    }

    fn is_available(&self) -> bool {
        !self.is_closed() && self.normal_connection_count() < self.max_connections
    }

    fn is_idle(&self) -> bool {
        self.connections.lock().is_empty()
    }

    fn normal_connection_count(&self) -> usize {
        self.connections
            .lock()
            .values()
            .filter(|info| info.state != ConnectionState::Temporary)
            .count()
    }

    fn endpoint_as_seen_by_peer(&self, peer_id: NodeId) -> Option<SocketAddr> {
        if !self.connections.lock().contains_key(&peer_id) {
            return None;
        }
        Some(
            self.seen_by
                .lock()
                .get(&peer_id)
                .copied()
                .unwrap_or_else(|| self.external_endpoint()),
        )
    }

    fn connection_info(&self, peer_id: NodeId) -> Option<ConnectionInfo> {
        self.connections.lock().get(&peer_id).cloned()
    }

    fn debug_string(&self) -> String {
        format!(
            "\tfake transport {} / {} with {} connections\n",
            self.external_endpoint(),
            self.local,
            self.connections.lock().len(),
        )
    }
}

/// Factory producing [`FakeTransport`]s with sequential ports.
pub(crate) struct FakeFactory {
    max_connections: usize,
    external_valid: bool,
    next_port: AtomicU16,
    plans: Mutex<VecDeque<BootstrapPlan>>,
    created: Mutex<Vec<Arc<FakeTransport>>>,
}

impl FakeFactory {
    pub fn new(max_connections: usize) -> Arc<Self> {
        Self::with_external(max_connections, true)
    }

    /// `external_valid: false` produces transports that never learn an
    /// external endpoint on their own.
    pub fn with_external(max_connections: usize, external_valid: bool) -> Arc<Self> {
        Arc::new(Self {
            max_connections,
            external_valid,
            next_port: AtomicU16::new(5000),
            plans: Mutex::new(VecDeque::new()),
            created: Mutex::new(Vec::new()),
        })
    }

    /// Queue the bootstrap plan for the next transport created.
    pub fn queue_plan(&self, plan: BootstrapPlan) {
        self.plans.lock().push_back(plan);
    }

    pub fn created(&self) -> Vec<Arc<FakeTransport>> {
        self.created.lock().clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }
}

impl TransportFactory for FakeFactory {
    fn create(&self, _context: TransportContext) -> Arc<dyn Transport> {
        let port = self.next_port.fetch_add(1, Ordering::Relaxed);
        let local = format!("192.168.1.100:{port}").parse().unwrap();
        let external = if self.external_valid {
            format!("203.0.113.10:{port}").parse().unwrap()
        } else {
            "0.0.0.0:0".parse().unwrap()
        };
        let transport = FakeTransport::with_endpoints(local, external, self.max_connections);
        if let Some(plan) = self.plans.lock().pop_front() {
            transport.plan_bootstrap(plan);
        }
        self.created.lock().push(transport.clone());
        transport
    }
}

/// Listener recording everything it hears.
#[derive(Default)]
pub(crate) struct RecordingListener {
    messages: Mutex<Vec<(NodeId, Vec<u8>)>>,
    lost: Mutex<Vec<NodeId>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<(NodeId, Vec<u8>)> {
        self.messages.lock().clone()
    }

    pub fn lost(&self) -> Vec<NodeId> {
        self.lost.lock().clone()
    }
}

impl Listener for RecordingListener {
    fn message_received(&self, peer_id: NodeId, message: Vec<u8>) {
        self.messages.lock().push((peer_id, message));
    }

    fn connection_lost(&self, peer_id: NodeId) {
        self.lost.lock().push(peer_id);
    }
}

/// Deterministic node id from a seed byte.
pub(crate) fn node_id(seed: u8) -> NodeId {
    let mut bytes = [0u8; 32];
    bytes[0] = seed;
    bytes[31] = 1;
    NodeId::new(bytes)
}

/// Deterministic public key from a seed byte.
pub(crate) fn test_public_key(seed: u8) -> PublicKey {
    PublicKey::from_bytes([seed; 32])
}

/// Contact with a public endpoint derived from the seed.
pub(crate) fn test_contact(seed: u8) -> Contact {
    let endpoint: SocketAddr = format!("198.51.100.{seed}:7000").parse().unwrap();
    Contact {
        id: node_id(seed),
        endpoint_pair: EndpointPair::from_single(endpoint),
        public_key: test_public_key(seed),
    }
}

fn contact_endpoint(contact: &Contact) -> SocketAddr {
    if endpoint::is_valid(contact.endpoint_pair.external) {
        contact.endpoint_pair.external
    } else {
        contact.endpoint_pair.local
    }
}
