//! Data structures for mask state.
//!
//! This module contains the mirrored session record and the pattern enum.

pub mod session;

pub use session::{DeviceSession, MaskMode};
