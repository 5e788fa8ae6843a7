//! Event sink: transport callbacks mutating the locked tables.
//!
//! Every slot here may be invoked concurrently from the execution context's
//! workers. Each acquires the single internal lock, performs its table
//! transition atomically, and defers listener notification until after the
//! lock is released.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::core::NodeId;
use crate::crypto;
use crate::transport::{NatType, Transport, TransportObserver};

use super::Inner;

impl TransportObserver for Inner {
    fn on_message(&self, peer_id: NodeId, message: Vec<u8>) {
        let (keypair, listener) = {
            let state = self.state.lock();
            (state.keypair.clone(), state.listener.clone())
        };

        let plaintext = if self.config.encrypt_messages {
            let Some(keypair) = keypair else {
                warn!("dropping message from {peer_id}: node has no keypair yet");
                return;
            };
            match crypto::decrypt(&message, &keypair) {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    // Corrupt or hostile peer, not a local bug: drop it.
                    error!("failed to decrypt message from {peer_id}: {e}");
                    return;
                }
            }
        } else {
            message
        };

        if let Some(listener) = listener.and_then(|weak| weak.upgrade()) {
            listener.message_received(peer_id, plaintext);
        }
    }

    fn on_connection_added(
        &self,
        peer_id: NodeId,
        transport: &Arc<dyn Transport>,
        temporary: bool,
    ) -> bool {
        let mut is_duplicate = false;
        let mut state = self.state.lock();

        if temporary {
            state.update_idle_transports(transport);
        } else {
            state.pendings.remove(&peer_id);

            if state.connections.contains_key(&peer_id) {
                is_duplicate = true;
                state.update_idle_transports(transport);
                error!(
                    "already connected to {peer_id}; refusing duplicate normal connection on {}",
                    transport.local_endpoint()
                );
            } else {
                state.connections.insert(peer_id, transport.clone());
                state.idle_transports.remove(transport);
            }
        }

        #[cfg(debug_assertions)]
        state.idle_transports.evict_unavailable();

        is_duplicate
    }

    fn on_connection_lost(&self, peer_id: NodeId, transport: &Arc<dyn Transport>, temporary: bool) {
        let notify = {
            let mut state = self.state.lock();
            state.update_idle_transports(transport);

            if temporary {
                None
            } else {
                // A bootstrap connection may have had an endpoint reserved
                // but add never called; in every other case the peer is
                // absent from the reservation table already.
                state.pendings.remove(&peer_id);

                match state.connections.get(&peer_id).cloned() {
                    None => None,
                    Some(registered) => {
                        if !Arc::ptr_eq(&registered, transport) {
                            error!(
                                "{peer_id} is connected via {} not {}",
                                registered.local_endpoint(),
                                transport.local_endpoint()
                            );
                            debug_assert!(
                                false,
                                "lost-event from a transport not matching the registry"
                            );
                        }
                        state.connections.remove(&peer_id);
                        if state.chosen_bootstrap_id() == Some(peer_id) {
                            state.chosen_bootstrap_contact = None;
                        }
                        state.listener.clone()
                    }
                }
            }
        };

        if let Some(listener) = notify.and_then(|weak| weak.upgrade()) {
            listener.connection_lost(peer_id);
        }
    }

    fn on_nat_detection_requested(
        &self,
        this_local_endpoint: SocketAddr,
        peer_id: NodeId,
        peer_endpoint: SocketAddr,
    ) -> u16 {
        let nat_type = self.nat_cell.get();
        if nat_type == NatType::Unknown || nat_type == NatType::Symmetric {
            // Our own mappings are unpredictable; we cannot help.
            return 0;
        }

        let (transport, peer_public_key) = {
            let state = self.state.lock();
            let Some(transport) = state
                .connections
                .values()
                .find(|t| t.local_endpoint() != this_local_endpoint)
                .cloned()
            else {
                return 0;
            };
            let peer_public_key = state
                .connections
                .get(&peer_id)
                .and_then(|t| t.connection_info(peer_id))
                .map(|info| info.peer_public_key);
            (transport, peer_public_key)
        };

        let another_external_port = transport.external_endpoint().port();

        // The ping result is of no interest to this node; it only has to
        // arrive at the peer from a second external port.
        match peer_public_key {
            Some(key) => {
                self.handle.spawn(async move {
                    transport.ping(peer_id, peer_endpoint, key).await;
                });
            }
            None => {
                debug!("skipping detection ping towards {peer_id}: no public key on record");
            }
        }

        another_external_port
    }
}
