//! Protocol module for encoding commands and decoding responses.
//!
//! This module contains the implementations for:
//! - Command encoding (`M`, `T`, `S` lines)
//! - Response decoding (`READY`, `OK:`, `ERROR:`, status, `TIMER_COMPLETE`)
//! - Status line parsing in both CSV and key/value form

pub mod command;
pub mod response;
pub mod status;

pub use command::Command;
pub use response::Response;
pub use status::StatusRecord;
