//! # Error Types
//!
//! Custom error types for FC Link using `thiserror`.
//!
//! Framing and checksum problems on the MSP stream are never surfaced here:
//! the decoder resynchronizes silently. These variants cover the outer
//! surfaces (transport, configuration, cross-mode sends).

use thiserror::Error;

use crate::link::mode::LinkMode;

/// Main error type for FC Link
#[derive(Debug, Error)]
pub enum FcLinkError {
    /// MSP protocol errors (payload too large, short telemetry payloads)
    #[error("MSP protocol error: {0}")]
    Protocol(String),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate serial ports could be opened
    #[error("No flight controller found (tried: {0})")]
    SerialPortNotFound(String),

    /// A send was attempted while the link was in the other protocol's mode
    #[error("Link is in {actual} mode, operation requires {expected} mode")]
    WrongMode {
        expected: LinkMode,
        actual: LinkMode,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for FC Link
pub type Result<T> = std::result::Result<T, FcLinkError>;
