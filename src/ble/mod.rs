//! BLE communication module.
//!
//! This module provides the Bluetooth Low Energy side of the crate:
//! the transport abstraction, its btleplug implementation, device
//! matching and the connection state machine.

pub mod btle;
pub mod connection;
pub mod scanner;
pub mod transport;
pub mod uuids;

pub use btle::BtleTransport;
pub use connection::{ConnectionManager, ConnectionPhase};
pub use scanner::{DeviceMatcher, MatchReason};
pub use transport::{Advertisement, Transport, TransportEvent};
pub use uuids::*;
