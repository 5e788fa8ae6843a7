//! Core types shared by every layer: constants, errors, node identifiers.

pub mod constants;
pub mod error;
pub mod id;

pub use constants::*;
pub use error::{CryptoError, RudpError, RudpResult};
pub use id::NodeId;
