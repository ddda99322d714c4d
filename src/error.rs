//! Error types for the smart-mask-ble crate.

use std::time::Duration;
use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth permissions were denied by the platform or the user.
    #[error("Bluetooth permission denied")]
    PermissionDenied,

    /// Bluetooth is not available or the adapter is powered off.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// No matching mask was seen before the scan timed out.
    #[error("Mask not found within {timeout:?}")]
    DeviceNotFound {
        /// The scan timeout that elapsed.
        timeout: Duration,
    },

    /// Connecting, discovering, subscribing or writing failed.
    #[error("Transport error: {reason}")]
    Transport {
        /// Description of what failed.
        reason: String,
    },

    /// Operation requires a connection but the mask is not connected.
    #[error("Mask not connected")]
    NotConnected,

    /// A connection attempt is already scanning or connecting.
    #[error("Connection already in progress")]
    ConnectionInProgress,

    /// The mask answered with an `ERROR:` line.
    #[error("Mask reported error: {message}")]
    DeviceReported {
        /// The error message from the mask.
        message: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// Invalid data was received from the mask.
    #[error("Invalid data received: {context}")]
    InvalidData {
        /// Description of what was invalid about the data.
        context: String,
    },

    /// The requested operation is not supported by this transport.
    #[error("Operation not supported: {operation}")]
    NotSupported {
        /// Description of the unsupported operation.
        operation: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// Service not found on the device.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of [`Error`], carried by error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    /// Bluetooth permissions denied.
    Permission,
    /// Adapter missing or powered off.
    Unavailable,
    /// Scan timed out without a match.
    DeviceNotFound,
    /// Connect, discovery, write or link failure.
    Transport,
    /// Command issued outside the connected phase.
    NotConnected,
    /// The mask sent an `ERROR:` line.
    DeviceReported,
    /// Caller supplied an invalid argument or the mask sent unusable data.
    InvalidInput,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Bluetooth(btleplug::Error::PermissionDenied) | Self::PermissionDenied => {
                ErrorKind::Permission
            }
            Self::BluetoothUnavailable => ErrorKind::Unavailable,
            Self::DeviceNotFound { .. } => ErrorKind::DeviceNotFound,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::DeviceReported { .. } => ErrorKind::DeviceReported,
            Self::InvalidParameter { .. } | Self::InvalidData { .. } => ErrorKind::InvalidInput,
            Self::Bluetooth(_)
            | Self::Transport { .. }
            | Self::ConnectionInProgress
            | Self::NotSupported { .. }
            | Self::CharacteristicNotFound { .. }
            | Self::ServiceNotFound { .. }
            | Self::Internal(_) => ErrorKind::Transport,
        }
    }

    /// Fold any failure during connection setup into [`Error::Transport`].
    pub(crate) fn into_transport(self) -> Self {
        match self {
            Self::Transport { .. } => self,
            other => Self::Transport {
                reason: other.to_string(),
            },
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
