//! Status line parsing.
//!
//! The mask reports its state in one of two textual encodings:
//! - CSV: `S:<mode>,<intensity>,<timeLeft>,<battery>`
//! - key/value: `STATUS: M=1 I=70 T=900 B=60` (compact keys) or
//!   `STATUS: Mode=1 Intensity=70 TimeLeft=900` (verbose keys)
//!
//! Each line is parsed on its own. Fields that are missing or fail integer
//! parsing come back as 0; the store decides what a 0 means.

use tracing::trace;

use crate::error::{Error, Result};

/// Prefix of a CSV status line.
pub const CSV_PREFIX: &str = "S:";
/// Prefix of a key/value status line.
pub const KEY_VALUE_PREFIX: &str = "STATUS:";

/// Number of fields in a CSV status line.
const CSV_FIELDS: usize = 4;

/// One decoded status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusRecord {
    /// Raw mode value (0 = off).
    pub mode: u8,
    /// Intensity percentage.
    pub intensity: u8,
    /// Remaining session time in seconds.
    pub time_left: u32,
    /// Battery percentage.
    pub battery: u8,
}

impl StatusRecord {
    /// Create a record from its four fields.
    pub fn new(mode: u8, intensity: u8, time_left: u32, battery: u8) -> Self {
        Self {
            mode,
            intensity,
            time_left,
            battery,
        }
    }

    /// Parse a status line in either encoding.
    ///
    /// The line must start with [`CSV_PREFIX`] or [`KEY_VALUE_PREFIX`].
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();

        if let Some(body) = line.strip_prefix(KEY_VALUE_PREFIX) {
            Ok(Self::parse_key_value(body))
        } else if let Some(body) = line.strip_prefix(CSV_PREFIX) {
            Self::parse_csv(body)
        } else {
            Err(Error::InvalidData {
                context: format!("Not a status line: {:?}", line),
            })
        }
    }

    /// Parse the body of a CSV status line (after `S:`).
    pub fn parse_csv(body: &str) -> Result<Self> {
        let fields: Vec<&str> = body.split(',').collect();

        if fields.len() != CSV_FIELDS {
            return Err(Error::InvalidData {
                context: format!(
                    "CSV status has {} fields (need {}): {:?}",
                    fields.len(),
                    CSV_FIELDS,
                    body
                ),
            });
        }

        Ok(Self {
            mode: parse_field(fields[0]),
            intensity: parse_field(fields[1]),
            time_left: parse_field(fields[2]),
            battery: parse_field(fields[3]),
        })
    }

    /// Parse the body of a key/value status line (after `STATUS:`).
    pub fn parse_key_value(body: &str) -> Self {
        let mut record = Self::default();

        for token in body.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                trace!("Ignoring status token without '=': {:?}", token);
                continue;
            };

            match key {
                "M" | "Mode" => record.mode = parse_field(value),
                "I" | "Intensity" => record.intensity = parse_field(value),
                "T" | "TimeLeft" => record.time_left = parse_field(value),
                "B" | "Battery" => record.battery = parse_field(value),
                _ => trace!("Ignoring unknown status key: {:?}", key),
            }
        }

        record
    }

    /// Whether the reported mode is anything other than off.
    pub fn is_active(&self) -> bool {
        self.mode != 0
    }
}

/// Parse an integer field, falling back to 0.
fn parse_field<T: std::str::FromStr + Default>(value: &str) -> T {
    value.trim().parse().unwrap_or_default()
}
