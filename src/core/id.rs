//! Node identifiers.

use std::fmt;

use rand::{rngs::OsRng, RngCore};

use super::constants::NODE_ID_SIZE;

/// Opaque 256-bit node identifier.
///
/// Two values are distinguished: the id of this node (fixed at bootstrap) and
/// [`NodeId::UNSET`], which never identifies a live peer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId([u8; NODE_ID_SIZE]);

impl NodeId {
    /// The all-zero sentinel; not a valid peer identity.
    pub const UNSET: NodeId = NodeId([0; NODE_ID_SIZE]);

    /// Create an id from raw bytes.
    pub const fn new(bytes: [u8; NODE_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Generate a uniformly random id.
    pub fn random() -> Self {
        let mut bytes = [0u8; NODE_ID_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Whether this id can identify a peer (i.e. it is not [`NodeId::UNSET`]).
    pub fn is_valid(&self) -> bool {
        *self != Self::UNSET
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; NODE_ID_SIZE] {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::UNSET
    }
}

impl fmt::Display for NodeId {
    /// Prints an 8-hex-digit prefix, enough to tell peers apart in logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self}..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_is_invalid() {
        assert!(!NodeId::UNSET.is_valid());
        assert!(!NodeId::default().is_valid());
        assert!(!NodeId::new([0; NODE_ID_SIZE]).is_valid());
    }

    #[test]
    fn test_random_ids_differ() {
        let a = NodeId::random();
        let b = NodeId::random();

        assert!(a.is_valid());
        assert!(b.is_valid());
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_prefix() {
        let mut bytes = [0u8; NODE_ID_SIZE];
        bytes[0] = 0xab;
        bytes[1] = 0xcd;
        let id = NodeId::new(bytes);

        assert_eq!(format!("{id}"), "abcd0000");
    }
}
