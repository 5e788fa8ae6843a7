//! Bootstrap coordination: starting transports and synthesizing bootstrap
//! lists from live connections.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Weak};

use rand::seq::SliceRandom;
use tracing::{debug, error};

use crate::core::{RudpError, RudpResult};
use crate::transport::{
    endpoint, Contact, EndpointPair, Transport, TransportContext, TransportObserver,
};

use super::Inner;

impl Inner {
    /// Construct a transport through the factory and bootstrap it.
    ///
    /// An empty `bootstrap_list` means "bootstrap off existing connections":
    /// the list is synthesized from the registry, which also yields a
    /// candidate external address for the fresh transport. On success the
    /// chosen bootstrap contact is recorded if not already set; on failure
    /// the transport is closed again.
    pub(crate) async fn start_new_transport(
        &self,
        mut bootstrap_list: Vec<Contact>,
        local_endpoint: SocketAddr,
    ) -> RudpResult<(Arc<dyn Transport>, Contact)> {
        let transport = self.factory.create(TransportContext {
            handle: self.handle.clone(),
            nat_cell: self.nat_cell.clone(),
            packet_loss: self.config.packet_loss,
        });

        let bootstrap_off_existing = bootstrap_list.is_empty();
        let mut external_address = None;
        if bootstrap_off_existing {
            let (list, address) = self.gather_bootstrap_endpoints();
            bootstrap_list = list;
            external_address = address;
        }

        let (this_node_id, this_public_key) = {
            let state = self.state.lock();
            // A node must not bootstrap off itself: strip contacts whose
            // local endpoint belongs to one of our own idle transports.
            bootstrap_list.retain(|contact| {
                !state
                    .idle_transports
                    .iter()
                    .any(|t| t.local_endpoint() == contact.endpoint_pair.local)
            });
            (
                state.this_node_id,
                state.keypair.as_ref().map(|k| k.public_key()),
            )
        };
        let Some(this_public_key) = this_public_key else {
            transport.close();
            return Err(RudpError::InvalidParameter);
        };

        let observer: Weak<dyn TransportObserver> = self.weak_self.clone();
        let chosen_contact = match transport
            .bootstrap(
                bootstrap_list,
                this_node_id,
                this_public_key,
                local_endpoint,
                bootstrap_off_existing,
                observer,
            )
            .await
        {
            Ok(contact) => contact,
            Err(e) => {
                transport.close();
                error!("new transport failed to bootstrap: {e}");
                return Err(RudpError::FailedToBootstrap);
            }
        };

        {
            let mut state = self.state.lock();
            if state.chosen_bootstrap_contact.is_none() {
                state.chosen_bootstrap_contact = Some(chosen_contact.clone());
            }
        }

        if !endpoint::is_valid(transport.external_endpoint()) {
            if let Some(address) = external_address {
                // Traversal learned nothing (symmetric or unknown NAT), but
                // the peers agree on our external address: guess that it maps
                // to this transport's local port too.
                let guess = SocketAddr::new(address, transport.local_endpoint().port());
                debug!("assuming external endpoint {guess} for new transport");
                transport.set_best_guess_external_endpoint(guess);
            }
        }

        Ok((transport, chosen_contact))
    }

    /// Synthesize a bootstrap list from the registry.
    ///
    /// Connections are deduplicated by peer endpoint. Peers on other
    /// networks go first, since only they let the fresh transport observe
    /// this node's external address; same-network peers follow as fallback.
    /// Both groups are shuffled to spread bootstrap load. Additionally
    /// returns the external address every off-network peer agrees on, or
    /// `None` if they disagree.
    pub(crate) fn gather_bootstrap_endpoints(&self) -> (Vec<Contact>, Option<IpAddr>) {
        let mut primary = Vec::new();
        let mut secondary = Vec::new();
        let mut seen_endpoints = HashSet::new();
        let mut external_address: Option<IpAddr> = None;
        let mut consistent = true;

        {
            let state = self.state.lock();
            for (peer_id, transport) in &state.connections {
                let Some(info) = transport.connection_info(*peer_id) else {
                    continue;
                };
                if !seen_endpoints.insert(info.peer_endpoint) {
                    continue;
                }
                let contact = Contact {
                    id: info.peer_node_id,
                    endpoint_pair: EndpointPair::from_single(info.peer_endpoint),
                    public_key: info.peer_public_key,
                };
                if endpoint::on_private_network(info.peer_endpoint) {
                    secondary.push(contact);
                } else {
                    if let Some(seen_as) = transport.endpoint_as_seen_by_peer(*peer_id) {
                        match external_address {
                            None => external_address = Some(seen_as.ip()),
                            Some(address) if address != seen_as.ip() => consistent = false,
                            Some(_) => {}
                        }
                    }
                    primary.push(contact);
                }
            }
        }

        if !consistent {
            external_address = None;
        }

        let mut rng = rand::thread_rng();
        primary.shuffle(&mut rng);
        secondary.shuffle(&mut rng);
        primary.append(&mut secondary);
        (primary, external_address)
    }
}
