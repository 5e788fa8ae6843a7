//! Endpoint model and address classification.
//!
//! An endpoint is a plain `SocketAddr`; validity and network classification
//! are free predicates so they can be applied to either half of an
//! [`EndpointPair`] without wrapping the type.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use crate::core::NodeId;
use crate::crypto::PublicKey;

/// Whether an endpoint can actually be dialled: non-zero port and a
/// specified address.
pub fn is_valid(endpoint: SocketAddr) -> bool {
    endpoint.port() != 0 && !endpoint.ip().is_unspecified()
}

/// Whether an endpoint sits on a private network (RFC 1918 or link-local
/// for IPv4; unique-local or link-local for IPv6).
pub fn on_private_network(endpoint: SocketAddr) -> bool {
    match endpoint.ip() {
        IpAddr::V4(ip) => ip.is_private() || ip.is_link_local(),
        IpAddr::V6(ip) => {
            let segments = ip.segments();
            // fc00::/7 unique-local, fe80::/10 link-local
            (segments[0] & 0xfe00) == 0xfc00 || (segments[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Discover the local IP used for outbound traffic.
///
/// Binds an ephemeral UDP socket and connects it to a public address; no
/// packet is sent, the OS merely selects the outbound interface.
pub fn discover_local_ip() -> io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect("8.8.8.8:53")?;
    Ok(socket.local_addr()?.ip())
}

/// A transport's local endpoint together with its externally visible one.
///
/// Either half may be invalid (unspecified address, zero port); a transport
/// is only useable if at least one half is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointPair {
    /// Endpoint as bound on this host.
    pub local: SocketAddr,
    /// Endpoint as seen from outside the NAT.
    pub external: SocketAddr,
}

impl EndpointPair {
    /// Create a pair from both halves.
    pub fn new(local: SocketAddr, external: SocketAddr) -> Self {
        Self { local, external }
    }

    /// Create a pair where both halves are the same endpoint, for contacts
    /// known only by a single observed address.
    pub fn from_single(endpoint: SocketAddr) -> Self {
        Self {
            local: endpoint,
            external: endpoint,
        }
    }

    /// Whether at least one half can be dialled.
    pub fn is_usable(&self) -> bool {
        is_valid(self.local) || is_valid(self.external)
    }
}

impl Default for EndpointPair {
    /// Both halves invalid.
    fn default() -> Self {
        let unspecified = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
        Self {
            local: unspecified,
            external: unspecified,
        }
    }
}

/// Everything needed to reach and authenticate one peer.
#[derive(Debug, Clone)]
pub struct Contact {
    /// The peer's identity.
    pub id: NodeId,
    /// Where the peer can be reached.
    pub endpoint_pair: EndpointPair,
    /// The peer's static public key.
    pub public_key: PublicKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_endpoint_validity() {
        assert!(is_valid(addr("192.0.2.1:5000")));
        assert!(!is_valid(addr("192.0.2.1:0")));
        assert!(!is_valid(addr("0.0.0.0:5000")));
        assert!(!is_valid(addr("[::]:5000")));
    }

    #[test]
    fn test_private_network_classification() {
        assert!(on_private_network(addr("10.0.0.1:1")));
        assert!(on_private_network(addr("172.16.4.4:1")));
        assert!(on_private_network(addr("192.168.1.10:1")));
        assert!(on_private_network(addr("169.254.0.9:1")));
        assert!(on_private_network(addr("[fe80::1]:1")));
        assert!(on_private_network(addr("[fd00::1]:1")));

        assert!(!on_private_network(addr("8.8.8.8:1")));
        assert!(!on_private_network(addr("172.32.0.1:1")));
        assert!(!on_private_network(addr("[2001:db8::1]:1")));
    }

    #[test]
    fn test_endpoint_pair_usability() {
        let valid = addr("192.0.2.1:5000");
        let invalid = addr("0.0.0.0:0");

        assert!(EndpointPair::new(valid, invalid).is_usable());
        assert!(EndpointPair::new(invalid, valid).is_usable());
        assert!(!EndpointPair::default().is_usable());
    }

    #[test]
    fn test_from_single_sets_both_halves() {
        let endpoint = addr("192.0.2.7:4444");
        let pair = EndpointPair::from_single(endpoint);

        assert_eq!(pair.local, endpoint);
        assert_eq!(pair.external, endpoint);
    }
}
