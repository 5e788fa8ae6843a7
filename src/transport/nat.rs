//! NAT classification shared between the manager and its transports.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// NAT classification of this node, as estimated during traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatType {
    /// No estimate yet.
    Unknown,
    /// Any external host can reach the mapped port.
    FullCone,
    /// Only hosts we have sent to can reach the mapped port.
    Restricted,
    /// Only host:port pairs we have sent to can reach the mapped port.
    PortRestricted,
    /// Every destination gets its own mapping; one source port per peer.
    Symmetric,
}

impl NatType {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => NatType::FullCone,
            2 => NatType::Restricted,
            3 => NatType::PortRestricted,
            4 => NatType::Symmetric,
            _ => NatType::Unknown,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            NatType::Unknown => 0,
            NatType::FullCone => 1,
            NatType::Restricted => 2,
            NatType::PortRestricted => 3,
            NatType::Symmetric => 4,
        }
    }
}

impl fmt::Display for NatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NatType::Unknown => "unknown",
            NatType::FullCone => "full-cone",
            NatType::Restricted => "restricted",
            NatType::PortRestricted => "port-restricted",
            NatType::Symmetric => "symmetric",
        };
        f.write_str(name)
    }
}

/// Shared cell holding the current NAT estimate.
///
/// The manager creates one cell and hands a clone of the `Arc` to every
/// transport it constructs; transports refine the estimate as traversal
/// progresses and the manager reads it when allocating endpoints.
#[derive(Debug)]
pub struct NatCell(AtomicU8);

impl NatCell {
    /// Create a cell with the given initial estimate.
    pub fn new(initial: NatType) -> Self {
        Self(AtomicU8::new(initial.as_u8()))
    }

    /// Current estimate.
    pub fn get(&self) -> NatType {
        NatType::from_u8(self.0.load(Ordering::Relaxed))
    }

    /// Replace the estimate.
    pub fn set(&self, nat_type: NatType) {
        self.0.store(nat_type.as_u8(), Ordering::Relaxed);
    }
}

impl Default for NatCell {
    fn default() -> Self {
        Self::new(NatType::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_starts_unknown() {
        assert_eq!(NatCell::default().get(), NatType::Unknown);
    }

    #[test]
    fn test_cell_roundtrips_every_variant() {
        let cell = NatCell::default();
        for nat_type in [
            NatType::Unknown,
            NatType::FullCone,
            NatType::Restricted,
            NatType::PortRestricted,
            NatType::Symmetric,
        ] {
            cell.set(nat_type);
            assert_eq!(cell.get(), nat_type);
        }
    }

    #[test]
    fn test_display_names() {
        assert_eq!(NatType::Symmetric.to_string(), "symmetric");
        assert_eq!(NatType::PortRestricted.to_string(), "port-restricted");
    }
}
