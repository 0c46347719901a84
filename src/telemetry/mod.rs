//! # Telemetry Module
//!
//! Turns MSP responses into typed telemetry and records it.
//!
//! This module handles:
//! - Decoding attitude, raw IMU and analog responses
//! - Formatting samples as JSONL (JSON Lines)
//! - Writing to rotating log files (max N records per file)
//! - Retaining only the last M files

pub mod decode;
pub mod recorder;

pub use decode::{decode_telemetry, Analog, Attitude, RawImu, Telemetry};
pub use recorder::TelemetryRecorder;
