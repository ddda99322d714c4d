//! Session data structures.
//!
//! Contains the mirrored mask session and the field-by-field merge rule
//! applied when a status report arrives.

use crate::protocol::StatusRecord;

/// Massage pattern selected on the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MaskMode {
    /// Motors off, no session.
    #[default]
    Off = 0,
    /// Short bursts on all motors.
    Pulse = 1,
    /// Activation travelling around the motor ring.
    Wave = 2,
    /// Steady output.
    Constant = 3,
    /// Double-beat rhythm (newer firmware).
    Heartbeat = 4,
    /// Random taps (newer firmware).
    Raindrops = 5,
}

impl MaskMode {
    /// Create from raw mode value.
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Off),
            1 => Some(Self::Pulse),
            2 => Some(Self::Wave),
            3 => Some(Self::Constant),
            4 => Some(Self::Heartbeat),
            5 => Some(Self::Raindrops),
            _ => None,
        }
    }

    /// Convert to raw mode value.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }

    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Pulse => "Pulse",
            Self::Wave => "Wave",
            Self::Constant => "Constant",
            Self::Heartbeat => "Heartbeat",
            Self::Raindrops => "Raindrops",
        }
    }
}

impl std::fmt::Display for MaskMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The application's mirror of the mask's operating state.
///
/// When `mode` is 0 the session is inactive and `intensity`/`time_left`
/// are stale: the mask does not necessarily zero them on stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceSession {
    /// Raw mode value (0 = off).
    pub mode: u8,
    /// Intensity percentage (0-100).
    pub intensity: u8,
    /// Remaining session time in seconds.
    pub time_left: u32,
    /// Battery percentage (0-100).
    pub battery: u8,
}

impl DeviceSession {
    /// Create a session with the given fields.
    pub fn new(mode: u8, intensity: u8, time_left: u32, battery: u8) -> Self {
        Self {
            mode,
            intensity,
            time_left,
            battery,
        }
    }

    /// Whether a session is running.
    pub fn is_active(&self) -> bool {
        self.mode != 0
    }

    /// The typed pattern, if the raw mode is a known one.
    pub fn pattern(&self) -> Option<MaskMode> {
        MaskMode::from_raw(self.mode)
    }

    /// Merge a status report into this session.
    ///
    /// A reported 0 means both "off" and "not supplied", so mode and
    /// battery are always taken while intensity and time left are only
    /// taken when nonzero.
    pub fn reconcile(&mut self, record: &StatusRecord) {
        self.mode = record.mode;
        if record.intensity > 0 {
            self.intensity = record.intensity;
        }
        if record.time_left > 0 {
            self.time_left = record.time_left;
        }
        self.battery = record.battery;
    }

    /// Return this session with `record` merged in.
    pub fn reconciled(mut self, record: &StatusRecord) -> Self {
        self.reconcile(record);
        self
    }
}
