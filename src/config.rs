//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; missing values take the defaults
//! below.
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyACM0"
//! baud_rate = 115200
//!
//! [msp]
//! poll_interval_ms = 50
//! poll_commands = [108, 110]
//!
//! [cli]
//! enter_settle_ms = 100
//! exit_settle_ms = 1000
//! capture_timeout_ms = 3000
//!
//! [link]
//! strict_mode = true
//!
//! [telemetry]
//! enabled = false
//! log_dir = "./logs"
//! ```

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{FcLinkError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub msp: MspConfig,
    #[serde(default)]
    pub cli: CliConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// MSP polling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MspConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Command codes requested every poll cycle
    #[serde(default = "default_poll_commands")]
    pub poll_commands: Vec<u8>,
}

/// CLI handshake and capture timing
#[derive(Debug, Deserialize, Clone)]
pub struct CliConfig {
    #[serde(default = "default_enter_settle_ms")]
    pub enter_settle_ms: u64,

    #[serde(default = "default_exit_settle_ms")]
    pub exit_settle_ms: u64,

    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
}

/// Link behavior
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    /// Reject MSP polls in CLI mode and CLI commands in telemetry mode
    #[serde(default = "default_strict_mode")]
    pub strict_mode: bool,
}

/// Telemetry recording configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyACM0".to_string() }
fn default_baud_rate() -> u32 { 115200 }

fn default_poll_interval_ms() -> u64 { 50 }
fn default_poll_commands() -> Vec<u8> { vec![crate::msp::protocol::MSP_ATTITUDE] }

fn default_enter_settle_ms() -> u64 { 100 }
fn default_exit_settle_ms() -> u64 { 1000 }
fn default_capture_timeout_ms() -> u64 { 3000 }

fn default_strict_mode() -> bool { true }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl Default for MspConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            poll_commands: default_poll_commands(),
        }
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            enter_settle_ms: default_enter_settle_ms(),
            exit_settle_ms: default_exit_settle_ms(),
            capture_timeout_ms: default_capture_timeout_ms(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            strict_mode: default_strict_mode(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> FcLinkError {
    FcLinkError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use fc_link::config::Config;
    ///
    /// let config = Config::load("fc-link.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if ![9600, 19200, 38400, 57600, 115200, 230400, 250000, 460800, 921600]
            .contains(&self.serial.baud_rate)
        {
            return Err(invalid(
                "baud_rate must be one of: 9600, 19200, 38400, 57600, 115200, 230400, 250000, 460800, 921600",
            ));
        }

        if self.msp.poll_interval_ms == 0 || self.msp.poll_interval_ms > 10000 {
            return Err(invalid("poll_interval_ms must be between 1 and 10000"));
        }

        if self.msp.poll_commands.is_empty() {
            return Err(invalid("poll_commands cannot be empty"));
        }

        if self.cli.enter_settle_ms > 10000 {
            return Err(invalid("enter_settle_ms must be at most 10000"));
        }

        // The device tears its console down on exit, which takes longer
        if self.cli.exit_settle_ms <= self.cli.enter_settle_ms || self.cli.exit_settle_ms > 30000 {
            return Err(invalid(
                "exit_settle_ms must be greater than enter_settle_ms and at most 30000",
            ));
        }

        if self.cli.capture_timeout_ms == 0 || self.cli.capture_timeout_ms > 60000 {
            return Err(invalid("capture_timeout_ms must be between 1 and 60000"));
        }

        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        Ok(())
    }
}
