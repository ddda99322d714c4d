//! Inbound response decoding.
//!
//! Response grammar, one per line:
//! - `READY`
//! - `OK:<echo>`
//! - `ERROR:<message>`
//! - `STATUS:<kv-pairs>` or `S:<csv>`
//! - `TIMER_COMPLETE`
//!
//! Unrecognized and malformed lines are dropped so newer firmware can add
//! responses without breaking older clients.

use tracing::debug;

use crate::protocol::status::{StatusRecord, CSV_PREFIX, KEY_VALUE_PREFIX};

/// Line sent by the mask once its BLE service is up.
pub const READY: &str = "READY";
/// Prefix of an acknowledgement line.
pub const ACK_PREFIX: &str = "OK:";
/// Prefix of an error line.
pub const ERROR_PREFIX: &str = "ERROR:";
/// Line sent when the session timer runs out.
pub const TIMER_COMPLETE: &str = "TIMER_COMPLETE";

/// A decoded line from the mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The mask is ready for commands.
    Ready,
    /// A command was accepted. Carries the full line.
    Ack(String),
    /// The mask rejected a command. Carries the text after `ERROR:`.
    DeviceError(String),
    /// A status report.
    Status(StatusRecord),
    /// The session timer finished and the mask stopped itself.
    TimerComplete,
}

impl Response {
    /// Decode one line. Returns `None` for anything unrecognized.
    pub fn decode(line: &str) -> Option<Self> {
        let line = line.trim();

        if line == READY {
            Some(Self::Ready)
        } else if line.starts_with(ACK_PREFIX) {
            Some(Self::Ack(line.to_string()))
        } else if let Some(message) = line.strip_prefix(ERROR_PREFIX) {
            Some(Self::DeviceError(message.trim().to_string()))
        } else if line.starts_with(KEY_VALUE_PREFIX) || line.starts_with(CSV_PREFIX) {
            match StatusRecord::parse(line) {
                Ok(record) => Some(Self::Status(record)),
                Err(e) => {
                    debug!("Dropping malformed status line: {}", e);
                    None
                }
            }
        } else if line == TIMER_COMPLETE {
            Some(Self::TimerComplete)
        } else {
            if !line.is_empty() {
                debug!("Dropping unrecognized line: {:?}", line);
            }
            None
        }
    }

    /// Decode every line carried by one notification payload.
    ///
    /// The firmware usually sends one message per notification without a
    /// trailing newline, but several newline-separated lines are accepted.
    pub fn decode_notification(payload: &[u8]) -> Vec<Self> {
        let text = String::from_utf8_lossy(payload);
        text.split('\n').filter_map(Self::decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_simple_lines() {
        assert_eq!(Response::decode("READY"), Some(Response::Ready));
        assert_eq!(Response::decode("TIMER_COMPLETE\r"), Some(Response::TimerComplete));
        assert_eq!(
            Response::decode("OK: Mode=2 Intensity=50"),
            Some(Response::Ack("OK: Mode=2 Intensity=50".to_string()))
        );
        assert_eq!(
            Response::decode("ERROR: Invalid mode value"),
            Some(Response::DeviceError("Invalid mode value".to_string()))
        );
    }

    #[test]
    fn test_decode_status_lines() {
        assert_eq!(
            Response::decode("S:2,50,300,87"),
            Some(Response::Status(StatusRecord::new(2, 50, 300, 87)))
        );
        assert_eq!(
            Response::decode("STATUS: M=1 I=70 T=900 B=60"),
            Some(Response::Status(StatusRecord::new(1, 70, 900, 60)))
        );
    }

    #[test]
    fn test_unknown_and_malformed_lines_are_dropped() {
        assert_eq!(Response::decode("HELLO"), None);
        assert_eq!(Response::decode("ready"), None);
        assert_eq!(Response::decode("TIMER_COMPLETE_SOON"), None);
        assert_eq!(Response::decode("S:1,2"), None);
        assert_eq!(Response::decode(""), None);
    }

    #[test]
    fn test_decode_notification_multiple_lines() {
        let responses = Response::decode_notification(b"OK: Timer set for 60 seconds\nS:1,40,60,90\n");
        assert_eq!(
            responses,
            vec![
                Response::Ack("OK: Timer set for 60 seconds".to_string()),
                Response::Status(StatusRecord::new(1, 40, 60, 90)),
            ]
        );
    }

    #[test]
    fn test_decode_notification_single_unterminated() {
        assert_eq!(Response::decode_notification(b"READY"), vec![Response::Ready]);
        assert!(Response::decode_notification(b"\n\n").is_empty());
    }
}
