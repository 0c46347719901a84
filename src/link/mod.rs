//! # Link Module
//!
//! Multiplexes MSP telemetry and the text CLI over one serial connection.
//!
//! This module handles:
//! - The telemetry/command mode state machine and its handshakes
//! - Routing received bytes to the MSP decoder or the CLI correlator
//! - Per-connection ownership of all protocol state

pub mod mode;
pub mod connection;

pub use connection::FcConnection;
pub use mode::{LinkMode, ModeArbiter};
