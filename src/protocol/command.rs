//! Outbound commands and their ASCII encoding.
//!
//! Command grammar (each line terminated by `\n`):
//! - `M<mode><intensity>`: set pattern and intensity, e.g. `M250`
//! - `T<seconds>`: start the session timer, e.g. `T900`
//! - `S`: request a status line
//!
//! The mode and intensity digits are not delimited. The firmware reads
//! exactly one digit of mode and parses the remainder as intensity, so
//! modes are limited to `0..=9`.

use crate::error::{Error, Result};

/// Command type byte for set-mode.
pub const CMD_MODE: char = 'M';
/// Command type byte for set-timer.
pub const CMD_TIMER: char = 'T';
/// Command type byte for status request.
pub const CMD_STATUS: char = 'S';

/// Highest mode value that still encodes as a single digit.
pub const MAX_MODE: u8 = 9;
/// Highest intensity accepted by the mask.
pub const MAX_INTENSITY: u8 = 100;

/// A command sent to the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// Select a pattern (raw mode value) and intensity.
    SetMode {
        /// Raw mode value, single digit.
        mode: u8,
        /// Intensity percentage.
        intensity: u8,
    },
    /// Run the session for the given number of seconds.
    SetTimer {
        /// Session length in seconds.
        seconds: u32,
    },
    /// Ask the mask to report its status.
    RequestStatus,
    /// Stop the session. Encoded as `SetMode { mode: 0, intensity: 0 }`.
    Stop,
}

impl Command {
    /// Build a validated set-mode command.
    pub fn set_mode(mode: u8, intensity: u8) -> Result<Self> {
        if mode > MAX_MODE {
            return Err(Error::InvalidParameter {
                name: "mode".to_string(),
                value: mode.to_string(),
            });
        }

        if intensity > MAX_INTENSITY {
            return Err(Error::InvalidParameter {
                name: "intensity".to_string(),
                value: intensity.to_string(),
            });
        }

        Ok(Self::SetMode { mode, intensity })
    }

    /// Build a validated set-timer command.
    pub fn set_timer(seconds: u32) -> Result<Self> {
        if seconds == 0 {
            return Err(Error::InvalidParameter {
                name: "seconds".to_string(),
                value: seconds.to_string(),
            });
        }

        Ok(Self::SetTimer { seconds })
    }

    /// Encode as a newline-terminated ASCII line.
    pub fn encode(&self) -> String {
        match self {
            Self::SetMode { mode, intensity } => format!("{CMD_MODE}{mode}{intensity}\n"),
            Self::SetTimer { seconds } => format!("{CMD_TIMER}{seconds}\n"),
            Self::RequestStatus => format!("{CMD_STATUS}\n"),
            Self::Stop => format!("{CMD_MODE}00\n"),
        }
    }

    /// Encode as bytes ready for a characteristic write.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode().into_bytes()
    }

    /// Whether the command changes session state and gets an optimistic write.
    pub fn is_state_changing(&self) -> bool {
        !matches!(self, Self::RequestStatus)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode().trim_end())
    }
}
