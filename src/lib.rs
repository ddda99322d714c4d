// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # smart-mask-ble
//!
//! A cross-platform Rust library for controlling the SMART massage mask
//! over Bluetooth Low Energy.
//!
//! The mask speaks a newline-terminated ASCII protocol on a single
//! read/write/notify characteristic. This crate finds the mask, keeps the
//! link up, sends mode/timer/status commands and keeps a local mirror of
//! the session in step with what the mask reports.
//!
//! ## Features
//!
//! - **Discovery**: Match the mask by name, service UUID or name hints
//! - **Optimistic Control**: Commands update the local session at once and
//!   are reconciled against the next status report
//! - **Status Polling**: Faster while a pattern runs, slower while idle
//! - **Events**: Typed broadcast events with callback handles
//! - **Auto-reconnect**: Optional reconnection after the link drops
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smart_mask_ble::{MaskController, MaskMode, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let controller = MaskController::new().await?;
//!     controller.connect().await?;
//!
//!     controller.set_mode(MaskMode::Wave, 50).await?;
//!     controller.set_timer(15 * 60).await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(2)).await;
//!     println!("Session: {:?}", controller.session());
//!
//!     controller.stop_session().await?;
//!     controller.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod config;
pub mod data;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod mask;
pub mod polling;
pub mod protocol;
pub mod store;
pub mod utils;

// Re-exports for convenience
pub use config::MaskConfig;
pub use error::{Error, ErrorKind, Result};
pub use events::{CallbackHandle, EventKind, MaskEvent};
pub use mask::MaskController;
pub use utils::{format_time_left, normalize_service_id};

// Re-export commonly used types from submodules
pub use ble::connection::ConnectionPhase;
pub use ble::transport::{Advertisement, Transport, TransportEvent};
pub use ble::BtleTransport;
pub use data::{DeviceSession, MaskMode};
pub use protocol::{Command, Response, StatusRecord};
pub use store::{CommandState, InFlightCommand};
