//! # FC Link Library
//!
//! Host-side link to a flight controller over a serial port.
//!
//! The same connection carries two protocols: binary MSP polling for live
//! telemetry and the line-oriented CLI for configuration. This library
//! provides the MSP codec, the mode arbiter that hands the link to one
//! protocol at a time, and the capture logic that turns CLI output into
//! request/response pairs.

pub mod config;
pub mod error;
pub mod msp;
pub mod link;
pub mod cli;
pub mod serial;
pub mod telemetry;
