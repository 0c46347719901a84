//! # Flight Controller Connection
//!
//! One [`FcConnection`] per open port. It owns the transport, the MSP
//! decoder, the mode arbiter and the CLI correlator, plus the inbound routing
//! slot that decides which of the two decoders sees received bytes. Dropping
//! or disconnecting the connection discards all protocol state with it.
//!
//! All methods take `&mut self`, so MSP polls, CLI commands and mode
//! switches can never overlap.

use tokio::time::{timeout_at, Duration, Instant};
use tracing::{debug, trace, warn};

use super::mode::{LinkMode, ModeArbiter};
use crate::cli::capture::{TextCorrelator, CLI_LINE_ENDING};
use crate::config::Config;
use crate::error::{FcLinkError, Result};
use crate::msp::decoder::MspDecoder;
use crate::msp::encoder::encode_request;
use crate::msp::protocol::MspFrame;
use crate::serial::SerialPortIO;

/// Size of a single transport read
pub const READ_BUFFER_SIZE: usize = 512;

/// Protocol state for one open flight controller port
pub struct FcConnection<P: SerialPortIO> {
    port: P,
    decoder: MspDecoder,
    arbiter: ModeArbiter,
    correlator: TextCorrelator,
    /// Which path receives inbound bytes; written only through arbiter callbacks
    route: LinkMode,
    strict_mode: bool,
}

impl<P: SerialPortIO> std::fmt::Debug for FcConnection<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FcConnection")
            .field("decoder", &self.decoder)
            .field("arbiter", &self.arbiter)
            .field("correlator", &self.correlator)
            .field("route", &self.route)
            .field("strict_mode", &self.strict_mode)
            .finish_non_exhaustive()
    }
}

impl<P: SerialPortIO> FcConnection<P> {
    /// Wrap an open transport
    ///
    /// # Arguments
    ///
    /// * `port` - Connected transport
    /// * `arbiter` - Mode arbiter (starts in telemetry mode)
    /// * `correlator` - CLI correlator
    /// * `strict_mode` - Reject sends that do not match the current mode
    pub fn new(port: P, arbiter: ModeArbiter, correlator: TextCorrelator, strict_mode: bool) -> Self {
        Self {
            port,
            decoder: MspDecoder::new(),
            route: arbiter.mode(),
            arbiter,
            correlator,
            strict_mode,
        }
    }

    /// Wrap an open transport using the `[cli]` and `[link]` settings
    pub fn from_config(port: P, config: &Config) -> Self {
        Self::new(
            port,
            ModeArbiter::from_config(&config.cli),
            TextCorrelator::from_config(&config.cli),
            config.link.strict_mode,
        )
    }

    /// Current link mode
    pub fn mode(&self) -> LinkMode {
        self.arbiter.mode()
    }

    /// Path currently receiving inbound bytes
    pub fn route(&self) -> LinkMode {
        self.route
    }

    /// The MSP decoder, for state and counters
    pub fn decoder(&self) -> &MspDecoder {
        &self.decoder
    }

    /// Register the consumer of decoded MSP frames
    pub fn on_frame<F>(&mut self, handler: F)
    where
        F: FnMut(MspFrame) + Send + 'static,
    {
        self.decoder.set_frame_handler(handler);
    }

    /// Register the live console observer
    pub fn set_text_observer<F>(&mut self, observer: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.correlator.set_text_observer(observer);
    }

    /// Register the consumer of cleaned capture results
    pub fn set_result_consumer<F>(&mut self, consumer: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.correlator.set_result_consumer(consumer);
    }

    /// Run `request` as a capture once the console next shows its prompt
    ///
    /// The capture runs from [`FcConnection::receive`] after the chunk holding
    /// the prompt has reached the observer. Its result goes to the result
    /// consumer.
    pub fn arm_auto_capture(&mut self, request: &str, silent: bool) {
        self.correlator.arm_auto_capture(request, silent);
    }

    /// Send an MSP request
    ///
    /// # Errors
    ///
    /// `WrongMode` in strict mode while the CLI is active; transport errors
    pub async fn poll(&mut self, command: u8) -> Result<()> {
        self.check_mode(LinkMode::Telemetry)?;
        trace!("Polling MSP command {}", command);
        self.write(&encode_request(command)).await
    }

    /// Send one MSP request per command, in order
    pub async fn poll_all(&mut self, commands: &[u8]) -> Result<()> {
        for &command in commands {
            self.poll(command).await?;
        }
        Ok(())
    }

    /// Send a raw CLI command line without waiting for its output
    ///
    /// # Errors
    ///
    /// `WrongMode` in strict mode while in telemetry mode; transport errors
    pub async fn send_cli_command(&mut self, text: &str) -> Result<()> {
        self.check_mode(LinkMode::Command)?;
        let line = format!("{}{}", text, CLI_LINE_ENDING);
        self.write(line.as_bytes()).await
    }

    /// Switch the device into its CLI
    pub async fn enter_cli(&mut self) -> Result<()> {
        let route = &mut self.route;
        self.arbiter
            .enter_command(&mut self.port, |mode| *route = mode)
            .await
    }

    /// Leave the CLI and return to MSP telemetry
    ///
    /// Any open capture is cancelled first, and the MSP decoder is reset
    /// afterwards so stale partial-frame state cannot leak into the new
    /// session.
    pub async fn exit_cli(&mut self) -> Result<()> {
        self.correlator.cancel();

        let route = &mut self.route;
        self.arbiter
            .exit_command(&mut self.port, |mode| *route = mode)
            .await?;

        self.decoder.reset();
        Ok(())
    }

    /// Send a CLI command and collect its output
    ///
    /// Completes when the device prints its prompt, or when the capture
    /// timeout elapses, in which case whatever arrived is returned (possibly
    /// empty). The result also goes to the result consumer.
    ///
    /// # Errors
    ///
    /// `WrongMode` in strict mode while in telemetry mode; transport errors
    pub async fn capture(&mut self, request: &str, silent: bool) -> Result<String> {
        self.check_mode(LinkMode::Command)?;

        let line = self.correlator.begin(request, silent);
        if let Err(e) = self.write(&line).await {
            self.correlator.cancel();
            return Err(e);
        }

        let mut buf = [0u8; READ_BUFFER_SIZE];

        while let Some(deadline) = self.correlator.deadline() {
            match timeout_at(deadline, self.port.read(&mut buf)).await {
                Err(_elapsed) => {
                    return Ok(self.correlator.expire(deadline).unwrap_or_default());
                }
                Ok(Ok(0)) => {
                    warn!("Port closed while capturing '{}'", request);
                    return Ok(self.correlator.finish().unwrap_or_default());
                }
                Ok(Ok(n)) => {
                    if let Some(text) = self.handle_incoming(&buf[..n]) {
                        debug!("Captured {} bytes for '{}'", text.len(), request);
                        return Ok(text);
                    }
                }
                Ok(Err(e)) => {
                    self.correlator.cancel();
                    return Err(e.into());
                }
            }
        }

        Ok(String::new())
    }

    /// Wait for the console prompt, then capture `request`
    ///
    /// Console output is routed as usual while waiting. `wait` bounds only
    /// the wait for the prompt; once it shows up, the capture runs under its
    /// own deadline. If no prompt appears in time, the request is sent anyway.
    /// Either way it is sent exactly once.
    ///
    /// # Errors
    ///
    /// `WrongMode` in strict mode while in telemetry mode; transport errors,
    /// including the port closing before the prompt
    pub async fn capture_at_prompt(
        &mut self,
        request: &str,
        silent: bool,
        wait: Duration,
    ) -> Result<String> {
        self.check_mode(LinkMode::Command)?;
        self.correlator.arm_auto_capture(request, silent);

        let deadline = Instant::now() + wait;
        let mut buf = [0u8; READ_BUFFER_SIZE];

        let pending = loop {
            if let Some(pending) = self.correlator.take_deferred() {
                break Some(pending);
            }

            match timeout_at(deadline, self.port.read(&mut buf)).await {
                Err(_elapsed) => break None,
                Ok(Ok(0)) => {
                    self.correlator.cancel();
                    return Err(FcLinkError::Serial(
                        "Port closed before the CLI prompt appeared".to_string(),
                    ));
                }
                Ok(Ok(n)) => {
                    self.handle_incoming(&buf[..n]);
                }
                Ok(Err(e)) => {
                    self.correlator.cancel();
                    return Err(e.into());
                }
            }
        };

        match pending {
            Some(pending) => self.capture(&pending.request, pending.silent).await,
            None => {
                warn!("No CLI prompt within {:?}, sending '{}' anyway", wait, request);
                self.correlator.cancel();
                self.capture(request, silent).await
            }
        }
    }

    /// Read one chunk from the transport and route it
    ///
    /// Runs a deferred capture if this chunk triggered one.
    ///
    /// # Returns
    ///
    /// * `Result<usize>` - Bytes read; `0` means the port was closed
    pub async fn receive(&mut self) -> Result<usize> {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        let n = self.port.read(&mut buf).await?;
        if n == 0 {
            return Ok(0);
        }

        self.handle_incoming(&buf[..n]);

        if let Some(pending) = self.correlator.take_deferred() {
            debug!("Running deferred capture '{}'", pending.request);
            self.capture(&pending.request, pending.silent).await?;
        }

        Ok(n)
    }

    /// Route received bytes to the decoder owning the link
    ///
    /// # Returns
    ///
    /// * `Option<String>` - Cleaned text if these bytes completed a capture
    pub fn handle_incoming(&mut self, bytes: &[u8]) -> Option<String> {
        match self.route {
            LinkMode::Telemetry => {
                self.decoder.feed(bytes);
                None
            }
            LinkMode::Command => {
                let text = String::from_utf8_lossy(bytes);
                self.correlator.feed_text(&text)
            }
        }
    }

    /// Tear down protocol state and hand back the transport
    ///
    /// Nothing is sent to the device.
    pub fn disconnect(mut self) -> P {
        self.correlator.cancel();
        self.decoder.reset();

        let route = &mut self.route;
        self.arbiter.reset(|mode| *route = mode);

        self.port
    }

    fn check_mode(&self, expected: LinkMode) -> Result<()> {
        let actual = self.arbiter.mode();
        if actual == expected {
            return Ok(());
        }

        if self.strict_mode {
            return Err(FcLinkError::WrongMode { expected, actual });
        }

        warn!("Sending {} traffic while link is in {} mode", expected, actual);
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes).await?;
        self.port.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msp::encoder::encode_response;
    use crate::msp::protocol::{MSP_ANALOG, MSP_ATTITUDE};
    use crate::serial::port_trait::mocks::MockSerialPort;
    use std::sync::{Arc, Mutex};
    use tokio::time::{Duration, Instant};

    fn connection(port: MockSerialPort, strict_mode: bool) -> FcConnection<MockSerialPort> {
        FcConnection::new(
            port,
            ModeArbiter::new(Duration::from_millis(100), Duration::from_millis(1000)),
            TextCorrelator::new(Duration::from_millis(3000)),
            strict_mode,
        )
    }

    fn text_sink() -> (Arc<Mutex<Vec<String>>>, impl FnMut(&str) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |text: &str| sink.lock().unwrap().push(text.to_string()))
    }

    #[tokio::test]
    async fn test_poll_writes_request() {
        let port = MockSerialPort::new();
        let mut conn = connection(port.clone(), true);

        conn.poll_all(&[MSP_ATTITUDE, MSP_ANALOG]).await.unwrap();

        assert_eq!(
            port.get_written_data(),
            vec![
                vec![0x24, 0x4D, 0x3C, 0x00, 0x6C, 0x6C],
                vec![0x24, 0x4D, 0x3C, 0x00, 0x6E, 0x6E],
            ]
        );
    }

    #[tokio::test]
    async fn test_frames_reach_handler_in_telemetry_mode() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);

        let port = MockSerialPort::new();
        let mut response = encode_response(MSP_ATTITUDE, &[1, 0, 2, 0, 3, 0]).unwrap();
        response.extend(encode_response(MSP_ANALOG, &[120, 0, 0, 0, 0, 0, 0]).unwrap());
        port.push_incoming(&response[..8]);
        port.push_incoming(&response[8..]);

        let mut conn = connection(port, true);
        conn.on_frame(move |frame| sink.lock().unwrap().push(frame));

        conn.receive().await.unwrap();
        assert!(frames.lock().unwrap().is_empty());
        conn.receive().await.unwrap();

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, MSP_ATTITUDE);
        assert_eq!(frames[0].payload, vec![1, 0, 2, 0, 3, 0]);
        assert_eq!(frames[1].command, MSP_ANALOG);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_exit_round_trip() {
        let port = MockSerialPort::new();
        let mut conn = connection(port.clone(), true);

        conn.enter_cli().await.unwrap();
        assert_eq!(conn.mode(), LinkMode::Command);
        assert_eq!(conn.route(), LinkMode::Command);

        conn.exit_cli().await.unwrap();
        assert_eq!(conn.mode(), LinkMode::Telemetry);
        assert_eq!(conn.route(), LinkMode::Telemetry);

        assert_eq!(
            port.get_written_data(),
            vec![vec![b'#'], b"exit\r\n".to_vec()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_resets_partial_frame() {
        let port = MockSerialPort::new();
        let mut conn = connection(port, true);

        let response = encode_response(MSP_ATTITUDE, &[1, 2, 3, 4, 5, 6]).unwrap();
        conn.handle_incoming(&response[..7]);
        assert!(!conn.decoder().is_idle());

        conn.enter_cli().await.unwrap();
        conn.exit_cli().await.unwrap();
        assert!(conn.decoder().is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_goes_to_observer_in_command_mode() {
        let (seen, observer) = text_sink();
        let port = MockSerialPort::new();
        let mut conn = connection(port, true);
        conn.set_text_observer(observer);

        conn.enter_cli().await.unwrap();
        conn.handle_incoming(b"\r\nEntering CLI Mode, type 'exit' to return\r\n# ");

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["\r\nEntering CLI Mode, type 'exit' to return\r\n# ".to_string()]
        );
        assert_eq!(conn.decoder().frames_decoded(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_finishes_on_prompt() {
        let port = MockSerialPort::new();
        let mut conn = connection(port.clone(), true);
        conn.enter_cli().await.unwrap();

        port.push_incoming(b"ok\r\n# ");
        let start = Instant::now();
        let text = conn.capture("status", true).await.unwrap();

        assert_eq!(text, "ok\r\n");
        assert!(start.elapsed() < Duration::from_millis(3000));
        assert_eq!(port.get_written_data()[1], b"status\r\n".to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_strips_echo_across_chunks() {
        let port = MockSerialPort::new();
        let mut conn = connection(port.clone(), true);
        conn.enter_cli().await.unwrap();

        port.push_incoming(b"get roll_rate\r\n");
        port.push_incoming(b"roll_rate = 70\r\n");
        port.push_incoming(b"# ");

        let text = conn.capture("get roll_rate", true).await.unwrap();
        assert_eq!(text, "roll_rate = 70\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_times_out_with_partial_text() {
        let port = MockSerialPort::new();
        let mut conn = connection(port.clone(), true);
        conn.enter_cli().await.unwrap();

        port.push_incoming(b"partial");
        let start = Instant::now();
        let text = conn.capture("dump", true).await.unwrap();

        assert_eq!(text, "partial");
        assert!(start.elapsed() >= Duration::from_millis(3000));
        assert!(conn.correlator.deadline().is_none());
        assert!(!conn.correlator.is_capturing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_with_closed_port_returns_partial() {
        let port = MockSerialPort::new();
        let mut conn = connection(port.clone(), true);
        conn.enter_cli().await.unwrap();

        port.push_incoming(b"half");
        port.close();

        assert_eq!(conn.capture("status", true).await.unwrap(), "half");
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_write_error_cancels_session() {
        let port = MockSerialPort::new();
        let mut conn = connection(port.clone(), true);
        conn.enter_cli().await.unwrap();

        port.set_write_error(std::io::ErrorKind::BrokenPipe);
        assert!(conn.capture("status", true).await.is_err());
        assert!(!conn.correlator.is_capturing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_mode_rejects_cross_mode_sends() {
        let port = MockSerialPort::new();
        let mut conn = connection(port.clone(), true);

        let err = conn.send_cli_command("status").await.unwrap_err();
        assert!(matches!(
            err,
            FcLinkError::WrongMode {
                expected: LinkMode::Command,
                actual: LinkMode::Telemetry
            }
        ));
        assert!(conn.capture("status", true).await.is_err());

        conn.enter_cli().await.unwrap();
        assert!(conn.poll(MSP_ATTITUDE).await.is_err());

        // Only the trigger byte went out
        assert_eq!(port.get_written_data(), vec![vec![b'#']]);
    }

    #[tokio::test]
    async fn test_lenient_mode_sends_anyway() {
        let port = MockSerialPort::new();
        let mut conn = connection(port.clone(), false);

        conn.send_cli_command("status").await.unwrap();
        assert_eq!(port.get_written_data(), vec![b"status\r\n".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_capture_runs_after_prompt() {
        let (live, observer) = text_sink();
        let (results, consumer) = text_sink();

        let port = MockSerialPort::new();
        let mut conn = connection(port.clone(), true);
        conn.set_text_observer(observer);
        conn.set_result_consumer(consumer);

        conn.enter_cli().await.unwrap();
        conn.arm_auto_capture("version", true);

        port.push_incoming(b"\r\nEntering CLI Mode\r\n# ");
        port.push_incoming(b"version\r\n# Betaflight / STM32F405 4.5.1\r\n# ");
        conn.receive().await.unwrap();

        assert_eq!(*live.lock().unwrap(), vec!["\r\nEntering CLI Mode\r\n# ".to_string()]);
        assert_eq!(
            *results.lock().unwrap(),
            vec!["# Betaflight / STM32F405 4.5.1\r\n".to_string()]
        );
        assert_eq!(port.get_written_data()[1], b"version\r\n".to_vec());
    }

    fn times_written(port: &MockSerialPort, line: &[u8]) -> usize {
        port.get_written_data().iter().filter(|w| w.as_slice() == line).count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_captures_stay_paired() {
        let port = MockSerialPort::new();
        let mut conn = connection(port.clone(), true);
        conn.enter_cli().await.unwrap();

        port.push_incoming(b"diff\r\n# version\r\n# Betaflight 4.5\r\n");
        port.push_incoming(b"set roll_rate = 70\r\n\r\n# ");
        port.push_incoming(b"get pitch_rate\r\npitch_rate = 68\r\n# ");

        let diff = conn.capture("diff", true).await.unwrap();
        assert_eq!(diff, "# version\r\n# Betaflight 4.5\r\nset roll_rate = 70\r\n\r\n");

        let get = conn.capture("get pitch_rate", true).await.unwrap();
        assert_eq!(get, "pitch_rate = 68\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_read_error_cancels_session() {
        let port = MockSerialPort::new();
        let mut conn = connection(port.clone(), true);
        conn.enter_cli().await.unwrap();

        port.push_incoming(b"status\r\n");
        port.set_read_error(std::io::ErrorKind::BrokenPipe);

        let err = conn.capture("status", true).await.unwrap_err();
        assert!(matches!(err, FcLinkError::Io(_)));
        assert!(!conn.correlator.is_capturing());
        assert!(conn.correlator.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_banner_sends_first_command_once() {
        let port = MockSerialPort::new();
        let mut conn = connection(port.clone(), true);
        conn.enter_cli().await.unwrap();

        let device = port.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2900)).await;
            device.push_incoming(b"\r\nEntering CLI Mode\r\n# ");
            // save reboots the board without printing a prompt
            device.push_incoming(b"save\r\nRebooting");
        });

        let start = Instant::now();
        let text = conn
            .capture_at_prompt("save", true, Duration::from_millis(3000))
            .await
            .unwrap();

        assert_eq!(text, "Rebooting");
        // The capture got its full deadline after the prompt
        assert!(start.elapsed() >= Duration::from_millis(5900));
        assert_eq!(times_written(&port, b"save\r\n"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_banner_sends_request_after_wait() {
        let port = MockSerialPort::new();
        let mut conn = connection(port.clone(), true);
        conn.enter_cli().await.unwrap();

        let device = port.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            device.push_incoming(b"status\r\nok\r\n# ");
        });

        let text = conn
            .capture_at_prompt("status", true, Duration::from_millis(1000))
            .await
            .unwrap();

        assert_eq!(text, "ok\r\n");
        assert_eq!(times_written(&port, b"status\r\n"), 1);
        assert!(conn.correlator.take_deferred().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_at_prompt_fails_when_port_closes() {
        let port = MockSerialPort::new();
        let mut conn = connection(port.clone(), true);
        conn.enter_cli().await.unwrap();

        port.push_incoming(b"\r\nEntering");
        port.close();

        let err = conn
            .capture_at_prompt("status", true, Duration::from_millis(1000))
            .await
            .unwrap_err();
        assert!(matches!(err, FcLinkError::Serial(_)));
        assert_eq!(times_written(&port, b"status\r\n"), 0);
    }

    #[tokio::test]
    async fn test_poll_flush_error_is_reported() {
        let port = MockSerialPort::new();
        let mut conn = connection(port.clone(), true);

        port.set_flush_error(std::io::ErrorKind::TimedOut);
        assert!(matches!(conn.poll(MSP_ATTITUDE).await, Err(FcLinkError::Io(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_resets_without_sending() {
        let port = MockSerialPort::new();
        let mut conn = connection(port.clone(), true);
        conn.enter_cli().await.unwrap();

        let returned = conn.disconnect();
        assert_eq!(returned.get_written_data(), vec![vec![b'#']]);
    }
}
