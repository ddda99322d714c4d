//! Controller configuration.
//!
//! All timings default to the values the mask firmware and the companion
//! app were tuned for. Use the `with_*` setters to override individual
//! values.

use std::time::Duration;

use crate::ble::uuids::{DEVICE_NAME, NAME_HINTS};
use crate::error::{Error, Result};

/// Tunables for scanning, polling, reconciliation and reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MaskConfig {
    /// Exact advertised name of the mask.
    pub device_name: String,
    /// Case-insensitive name fragments accepted as a weak match.
    pub name_hints: Vec<String>,
    /// How long to scan before giving up.
    pub scan_timeout: Duration,
    /// How long a weak (name hint) match waits for a stronger one.
    pub fuzzy_match_grace: Duration,
    /// MTU requested after connecting.
    pub preferred_mtu: u16,
    /// Delay between a command write and its reconciling status request.
    pub reconcile_delay: Duration,
    /// Poll interval while a session is running.
    pub active_poll_interval: Duration,
    /// Poll interval while the mask is idle.
    pub idle_poll_interval: Duration,
    /// How long a stop keeps late "active" status lines from reviving the session.
    pub stop_guard: Duration,
    /// Reconnect automatically after the link drops unexpectedly.
    pub auto_reconnect: bool,
    /// Reconnect attempts made after an unexpected disconnect.
    pub max_reconnect_attempts: u32,
    /// Pause before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            device_name: DEVICE_NAME.to_string(),
            name_hints: NAME_HINTS.iter().map(|h| h.to_string()).collect(),
            scan_timeout: Duration::from_secs(20),
            fuzzy_match_grace: Duration::from_millis(1500),
            preferred_mtu: 512,
            reconcile_delay: Duration::from_millis(100),
            active_poll_interval: Duration::from_secs(5),
            idle_poll_interval: Duration::from_secs(15),
            stop_guard: Duration::from_secs(3),
            auto_reconnect: false,
            max_reconnect_attempts: 3,
            reconnect_delay: Duration::from_secs(1),
            event_capacity: 64,
        }
    }
}

impl MaskConfig {
    /// Set the scan timeout.
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the grace window for weak name matches.
    pub fn with_fuzzy_match_grace(mut self, grace: Duration) -> Self {
        self.fuzzy_match_grace = grace;
        self
    }

    /// Set the advertised name to look for.
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Set the poll intervals for active and idle sessions.
    pub fn with_poll_intervals(mut self, active: Duration, idle: Duration) -> Self {
        self.active_poll_interval = active;
        self.idle_poll_interval = idle;
        self
    }

    /// Set the delay before the reconciling status request.
    pub fn with_reconcile_delay(mut self, delay: Duration) -> Self {
        self.reconcile_delay = delay;
        self
    }

    /// Set the stop guard window.
    pub fn with_stop_guard(mut self, guard: Duration) -> Self {
        self.stop_guard = guard;
        self
    }

    /// Enable automatic reconnection.
    pub fn with_auto_reconnect(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.auto_reconnect = true;
        self.max_reconnect_attempts = max_attempts;
        self.reconnect_delay = delay;
        self
    }

    /// Check that every duration and capacity is usable.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("scan_timeout", self.scan_timeout),
            ("fuzzy_match_grace", self.fuzzy_match_grace),
            ("reconcile_delay", self.reconcile_delay),
            ("active_poll_interval", self.active_poll_interval),
            ("idle_poll_interval", self.idle_poll_interval),
            ("stop_guard", self.stop_guard),
            ("reconnect_delay", self.reconnect_delay),
        ];

        for (name, value) in durations {
            if value.is_zero() {
                return Err(Error::InvalidParameter {
                    name: name.to_string(),
                    value: format!("{:?}", value),
                });
            }
        }

        if self.event_capacity == 0 {
            return Err(Error::InvalidParameter {
                name: "event_capacity".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MaskConfig::default();
        assert_eq!(config.device_name, "SMART_MassageMask");
        assert_eq!(config.scan_timeout, Duration::from_secs(20));
        assert_eq!(config.active_poll_interval, Duration::from_secs(5));
        assert_eq!(config.idle_poll_interval, Duration::from_secs(15));
        assert_eq!(config.reconcile_delay, Duration::from_millis(100));
        assert!(!config.auto_reconnect);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = MaskConfig::default()
            .with_scan_timeout(Duration::from_secs(10))
            .with_auto_reconnect(5, Duration::from_millis(250));
        assert_eq!(config.scan_timeout, Duration::from_secs(10));
        assert!(config.auto_reconnect);
        assert_eq!(config.max_reconnect_attempts, 5);
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = MaskConfig::default().with_poll_intervals(Duration::ZERO, Duration::from_secs(1));
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidParameter { ref name, .. }) if name == "active_poll_interval"
        ));

        let config = MaskConfig::default().with_auto_reconnect(3, Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidParameter { ref name, .. }) if name == "reconnect_delay"
        ));

        let config = MaskConfig::default().with_reconcile_delay(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = MaskConfig {
            event_capacity: 0,
            ..MaskConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
