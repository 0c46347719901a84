//! # Link Mode Arbiter
//!
//! Decides which protocol owns the connection: MSP telemetry polling or the
//! text CLI. The device offers no acknowledgement for either switch, so each
//! handshake is followed by a fixed settle delay and is best-effort.
//!
//! ```text
//!             '#' + enter settle
//! Telemetry ───────────────────────▶ Command
//!     ▲                                 │
//!     └─────────────────────────────────┘
//!          "exit\r\n" + exit settle
//! ```

use std::fmt;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use crate::config::CliConfig;
use crate::error::Result;
use crate::serial::SerialPortIO;

/// Byte that switches the device from MSP into its text console
pub const CLI_ENTER_TRIGGER: u8 = b'#';

/// Text command that leaves the console (the device reboots back into MSP)
pub const CLI_EXIT_COMMAND: &[u8] = b"exit\r\n";

/// Which decoder currently owns the inbound byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    /// Binary MSP polling
    #[default]
    Telemetry,
    /// Text CLI
    Command,
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkMode::Telemetry => f.write_str("telemetry"),
            LinkMode::Command => f.write_str("command"),
        }
    }
}

/// Two-state machine performing the mode-switch handshakes
///
/// `reroute` callbacks passed to the transitions are the only way the inbound
/// routing slot changes; they receive the mode that now owns incoming bytes.
#[derive(Debug, Clone)]
pub struct ModeArbiter {
    mode: LinkMode,
    enter_settle: Duration,
    exit_settle: Duration,
}

impl ModeArbiter {
    /// Create an arbiter in `Telemetry` mode
    ///
    /// # Arguments
    ///
    /// * `enter_settle` - Wait after sending the trigger byte
    /// * `exit_settle` - Wait after sending `exit`, normally the longer of the two
    pub fn new(enter_settle: Duration, exit_settle: Duration) -> Self {
        Self {
            mode: LinkMode::Telemetry,
            enter_settle,
            exit_settle,
        }
    }

    /// Create an arbiter using the `[cli]` settle delays
    pub fn from_config(config: &CliConfig) -> Self {
        Self::new(
            Duration::from_millis(config.enter_settle_ms),
            Duration::from_millis(config.exit_settle_ms),
        )
    }

    /// Current mode
    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    /// Switch into the text CLI
    ///
    /// No-op when already in `Command` mode. Otherwise the mode flips and
    /// inbound routing moves to the text path before the trigger byte goes
    /// out, so the device's first console output is not fed to the MSP decoder.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the trigger byte cannot be written.
    pub async fn enter_command<P, F>(&mut self, port: &mut P, reroute: F) -> Result<()>
    where
        P: SerialPortIO + ?Sized,
        F: FnOnce(LinkMode),
    {
        if self.mode == LinkMode::Command {
            debug!("Already in command mode");
            return Ok(());
        }

        self.mode = LinkMode::Command;
        reroute(LinkMode::Command);

        port.write_all(&[CLI_ENTER_TRIGGER]).await?;
        port.flush().await?;

        sleep(self.enter_settle).await;
        info!("Entered CLI mode");
        Ok(())
    }

    /// Leave the text CLI
    ///
    /// No-op when already in `Telemetry` mode. The caller must reset the MSP
    /// decoder afterwards; it may still hold a partial frame from before the
    /// switch.
    ///
    /// # Errors
    ///
    /// Returns the transport error if `exit` cannot be written; the mode is
    /// left unchanged in that case.
    pub async fn exit_command<P, F>(&mut self, port: &mut P, reroute: F) -> Result<()>
    where
        P: SerialPortIO + ?Sized,
        F: FnOnce(LinkMode),
    {
        if self.mode == LinkMode::Telemetry {
            debug!("Already in telemetry mode");
            return Ok(());
        }

        port.write_all(CLI_EXIT_COMMAND).await?;
        port.flush().await?;

        sleep(self.exit_settle).await;

        self.mode = LinkMode::Telemetry;
        reroute(LinkMode::Telemetry);
        info!("Left CLI mode");
        Ok(())
    }

    /// Force `Telemetry` without sending anything
    ///
    /// Resynchronizes local state only (e.g. after a disconnect); it says
    /// nothing about the device's actual mode.
    pub fn reset<F>(&mut self, reroute: F)
    where
        F: FnOnce(LinkMode),
    {
        self.mode = LinkMode::Telemetry;
        reroute(LinkMode::Telemetry);
    }
}
