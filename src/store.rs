//! Session state store.
//!
//! Owns the single mirrored [`DeviceSession`]. It has two write paths:
//!
//! - [`SessionStore::begin`] applies a command's intended values before the
//!   mask has seen it (optimistic write).
//! - [`SessionStore::apply_status`] merges a decoded status report using
//!   [`DeviceSession::reconcile`] (reconciling write).
//!
//! The most recent state-changing command is tracked as an
//! [`InFlightCommand`] moving through [`CommandState`].
//!
//! After a stop, a guard window keeps late status lines that still report an
//! active mode from reviving the session. Only the battery level is taken
//! from such lines. The guard ends when the window expires, a new mode is
//! set, the stop write fails, or the session is reset.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::data::DeviceSession;
use crate::protocol::{Command, StatusRecord};

/// Progress of an optimistically applied command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandState {
    /// Written locally, not yet confirmed by the mask.
    Pending,
    /// The mask acknowledged the command or reported matching state.
    Confirmed,
    /// The write failed or the mask rejected it; waiting for a status report.
    Resyncing,
    /// A status report replaced the optimistic values after a failure.
    Resynced,
}

/// The most recent state-changing command and how far it got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlightCommand {
    /// Sequence number, increasing per command.
    pub id: u64,
    /// The command that was applied.
    pub command: Command,
    /// Current state.
    pub state: CommandState,
}

impl InFlightCommand {
    /// Whether a status report agrees with what this command asked for.
    fn matches(&self, record: &StatusRecord) -> bool {
        match self.command {
            Command::SetMode { mode, intensity } => {
                record.mode == mode && (mode == 0 || record.intensity == intensity)
            }
            Command::Stop => record.mode == 0,
            // Time left counts down, so any running timer confirms it.
            Command::SetTimer { .. } => record.time_left > 0,
            Command::RequestStatus => true,
        }
    }
}

/// Internal state for the store.
#[derive(Debug, Default)]
struct StoreState {
    /// The mirrored session.
    session: DeviceSession,
    /// Most recent state-changing command.
    in_flight: Option<InFlightCommand>,
    /// Next command sequence number.
    next_id: u64,
    /// End of the stop guard window.
    stop_guard_until: Option<Instant>,
    /// When the last status report was merged.
    last_status_at: Option<DateTime<Utc>>,
}

/// Holder of the mirrored session and its reconciliation rules.
#[derive(Debug)]
pub struct SessionStore {
    /// Internal state.
    state: RwLock<StoreState>,
    /// Length of the stop guard window.
    stop_guard: Duration,
}

impl SessionStore {
    /// Create a store with an all-zero session.
    pub fn new(stop_guard: Duration) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            stop_guard,
        }
    }

    /// Snapshot of the mirrored session.
    pub fn session(&self) -> DeviceSession {
        self.state.read().session
    }

    /// The most recent state-changing command.
    pub fn last_command(&self) -> Option<InFlightCommand> {
        self.state.read().in_flight
    }

    /// When the last status report was merged.
    pub fn last_status_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_status_at
    }

    /// Whether the stop guard is currently armed.
    pub fn stop_guard_active(&self) -> bool {
        Self::guard_active(&self.state.read(), Instant::now())
    }

    /// Apply the optimistic write for `command` and start tracking it.
    ///
    /// Returns the command ID. Status requests are not tracked and return
    /// `None`.
    pub fn begin(&self, command: Command) -> Option<u64> {
        if !command.is_state_changing() {
            return None;
        }

        let mut state = self.state.write();

        match command {
            Command::SetMode { mode, intensity } => {
                state.session.mode = mode;
                state.session.intensity = intensity;
                if mode != 0 {
                    state.stop_guard_until = None;
                }
            }
            Command::SetTimer { seconds } => {
                state.session.time_left = seconds;
            }
            Command::Stop => {
                state.session.mode = 0;
                state.session.intensity = 0;
                state.session.time_left = 0;
                state.stop_guard_until = Some(Instant::now() + self.stop_guard);
            }
            Command::RequestStatus => {}
        }

        let id = state.next_id;
        state.next_id += 1;
        state.in_flight = Some(InFlightCommand {
            id,
            command,
            state: CommandState::Pending,
        });

        debug!("Optimistic write for {} (#{}): {:?}", command, id, state.session);

        Some(id)
    }

    /// Record that the write for command `id` failed.
    ///
    /// The optimistic values stay in place until a status report arrives.
    pub fn fail(&self, id: u64) {
        let mut state = self.state.write();

        let Some(in_flight) = state.in_flight.as_mut() else {
            return;
        };
        if in_flight.id != id {
            return;
        }

        in_flight.state = CommandState::Resyncing;
        if in_flight.command == Command::Stop {
            state.stop_guard_until = None;
        }
    }

    /// Record that the mask rejected the latest command.
    pub fn reject(&self) {
        let mut state = self.state.write();

        let Some(in_flight) = state.in_flight.as_mut() else {
            return;
        };
        if in_flight.state != CommandState::Pending {
            return;
        }

        in_flight.state = CommandState::Resyncing;
        if in_flight.command == Command::Stop {
            state.stop_guard_until = None;
        }
    }

    /// Record an `OK:` acknowledgement for the latest command.
    pub fn acknowledge(&self) {
        let mut state = self.state.write();

        if let Some(in_flight) = state.in_flight.as_mut() {
            if in_flight.state == CommandState::Pending {
                in_flight.state = CommandState::Confirmed;
            }
        }
    }

    /// Merge a status report and return the resulting session.
    pub fn apply_status(&self, record: &StatusRecord) -> DeviceSession {
        let mut state = self.state.write();
        let now = Instant::now();

        if Self::guard_active(&state, now) && record.is_active() {
            debug!(
                "Stop guard active, ignoring reported mode {} (battery {})",
                record.mode, record.battery
            );
            state.session.battery = record.battery;
        } else {
            state.session.reconcile(record);
        }

        if let Some(in_flight) = state.in_flight.as_mut() {
            match in_flight.state {
                CommandState::Pending if in_flight.matches(record) => {
                    in_flight.state = CommandState::Confirmed;
                }
                CommandState::Resyncing => {
                    in_flight.state = CommandState::Resynced;
                }
                _ => {}
            }
        }

        state.last_status_at = Some(Utc::now());
        state.session
    }

    /// Zero the session and forget in-flight commands.
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.session = DeviceSession::default();
        state.in_flight = None;
        state.stop_guard_until = None;
        state.last_status_at = None;
    }

    fn guard_active(state: &StoreState, now: Instant) -> bool {
        state.stop_guard_until.map(|until| now < until).unwrap_or(false)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_optimistic_set_mode() {
        let store = SessionStore::default();
        let id = store.begin(Command::SetMode { mode: 2, intensity: 50 });

        assert_eq!(id, Some(0));
        assert_eq!(store.session(), DeviceSession::new(2, 50, 0, 0));
        assert_eq!(store.last_command().unwrap().state, CommandState::Pending);
    }

    #[test]
    fn test_request_status_is_not_tracked() {
        let store = SessionStore::default();
        assert_eq!(store.begin(Command::RequestStatus), None);
        assert!(store.last_command().is_none());
    }

    #[test]
    fn test_matching_status_confirms() {
        let store = SessionStore::default();
        store.begin(Command::SetMode { mode: 1, intensity: 70 });
        store.apply_status(&StatusRecord::new(1, 70, 0, 90));
        assert_eq!(store.last_command().unwrap().state, CommandState::Confirmed);
        assert!(store.last_status_at().is_some());
    }

    #[test]
    fn test_acknowledge_confirms() {
        let store = SessionStore::default();
        store.begin(Command::SetTimer { seconds: 600 });
        store.acknowledge();
        assert_eq!(store.last_command().unwrap().state, CommandState::Confirmed);
        assert_eq!(store.session().time_left, 600);
    }

    #[test]
    fn test_failed_command_resyncs_without_rollback() {
        let store = SessionStore::default();
        store.begin(Command::SetMode { mode: 3, intensity: 30 });
        store.apply_status(&StatusRecord::new(3, 30, 0, 88));

        let id = store.begin(Command::SetMode { mode: 1, intensity: 90 }).unwrap();
        store.fail(id);
        assert_eq!(store.session(), DeviceSession::new(1, 90, 0, 88));
        assert_eq!(store.last_command().unwrap().state, CommandState::Resyncing);

        store.apply_status(&StatusRecord::new(3, 30, 0, 88));
        assert_eq!(store.session(), DeviceSession::new(3, 30, 0, 88));
        assert_eq!(store.last_command().unwrap().state, CommandState::Resynced);
    }

    #[test]
    fn test_stale_fail_is_ignored() {
        let store = SessionStore::default();
        let first = store.begin(Command::SetTimer { seconds: 60 }).unwrap();
        store.begin(Command::SetTimer { seconds: 120 });
        store.fail(first);
        assert_eq!(store.last_command().unwrap().state, CommandState::Pending);
    }

    #[test]
    fn test_stop_guard_blocks_late_active_status() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.begin(Command::SetMode { mode: 2, intensity: 50 });
        store.apply_status(&StatusRecord::new(2, 50, 300, 80));

        store.begin(Command::Stop);
        assert_eq!(store.session(), DeviceSession::new(0, 0, 0, 80));

        let session = store.apply_status(&StatusRecord::new(0, 0, 0, 79));
        assert_eq!(session.mode, 0);

        let session = store.apply_status(&StatusRecord::new(2, 50, 290, 78));
        assert_eq!(session, DeviceSession::new(0, 0, 0, 78));
        assert!(store.stop_guard_active());
    }

    #[test]
    fn test_stop_guard_expires() {
        let store = SessionStore::new(Duration::ZERO);
        store.begin(Command::Stop);
        let session = store.apply_status(&StatusRecord::new(2, 50, 290, 78));
        assert_eq!(session, DeviceSession::new(2, 50, 290, 78));
    }

    #[test]
    fn test_set_mode_clears_stop_guard() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.begin(Command::Stop);
        store.begin(Command::SetMode { mode: 1, intensity: 40 });
        assert!(!store.stop_guard_active());
        let session = store.apply_status(&StatusRecord::new(1, 40, 0, 70));
        assert_eq!(session.mode, 1);
    }

    #[test]
    fn test_failed_stop_clears_guard() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.apply_status(&StatusRecord::new(2, 50, 100, 70));
        let id = store.begin(Command::Stop).unwrap();
        store.fail(id);
        assert!(!store.stop_guard_active());

        let session = store.apply_status(&StatusRecord::new(2, 50, 95, 70));
        assert_eq!(session, DeviceSession::new(2, 50, 95, 70));
    }

    #[test]
    fn test_reject_moves_to_resyncing() {
        let store = SessionStore::default();
        store.begin(Command::SetTimer { seconds: 30 });
        store.reject();
        assert_eq!(store.last_command().unwrap().state, CommandState::Resyncing);
    }

    #[test]
    fn test_reset() {
        let store = SessionStore::default();
        store.begin(Command::SetMode { mode: 2, intensity: 50 });
        store.apply_status(&StatusRecord::new(2, 50, 300, 80));
        store.reset();
        assert_eq!(store.session(), DeviceSession::default());
        assert!(store.last_command().is_none());
        assert!(store.last_status_at().is_none());
    }
}
