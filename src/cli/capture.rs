//! # CLI Capture and Response Correlation
//!
//! The CLI is a free-running console: the device echoes input, prints output
//! and finishes with its idle prompt `"# "`. [`TextCorrelator`] turns that
//! stream into discrete request/response units. A capture ends as soon as the
//! received text ends with the prompt on a line of its own, or at its deadline
//! with whatever arrived. `# ` inside the output (the comment lines of `diff`
//! and `dump`) does not end a capture.
//!
//! The correlator does no I/O. It returns the bytes to send and the cleaned
//! results; the connection drives the transport and the clock.

use std::fmt;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::CliConfig;

/// Idle prompt printed by the device when the console is ready
pub const CLI_PROMPT: &str = "# ";

/// Line terminator for CLI commands
pub const CLI_LINE_ENDING: &str = "\r\n";

/// Default time to wait for the prompt before giving up on a capture
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Idle text kept for prompt detection across chunk boundaries (`"\n# "`)
const IDLE_TAIL_CHARS: usize = 3;

/// Callback receiving text (live console output or cleaned capture results)
pub type TextObserver = Box<dyn FnMut(&str) + Send>;

/// A capture requested ahead of time, started once the prompt appears
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCapture {
    pub request: String,
    pub silent: bool,
}

/// One in-flight request awaiting the prompt
///
/// The active flag and the deadline live and die together: a session either
/// exists with its deadline armed, or does not exist at all.
#[derive(Debug)]
struct CaptureSession {
    request: String,
    buffer: String,
    deadline: Instant,
}

/// Request/response correlator over CLI text
pub struct TextCorrelator {
    session: Option<CaptureSession>,
    timeout: Duration,
    observer: Option<TextObserver>,
    result_consumer: Option<TextObserver>,
    /// Armed by `arm_auto_capture`, waiting for a prompt
    auto_capture: Option<PendingCapture>,
    /// Prompt seen, ready for the connection to run
    deferred: Option<PendingCapture>,
    /// Last few characters of text seen outside a capture
    idle_tail: String,
}

impl fmt::Debug for TextCorrelator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextCorrelator")
            .field("session", &self.session)
            .field("timeout", &self.timeout)
            .field("auto_capture", &self.auto_capture)
            .field("deferred", &self.deferred)
            .finish_non_exhaustive()
    }
}

impl Default for TextCorrelator {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_TIMEOUT)
    }
}

impl TextCorrelator {
    /// Create an idle correlator
    ///
    /// # Arguments
    ///
    /// * `timeout` - Deadline applied to every capture
    pub fn new(timeout: Duration) -> Self {
        Self {
            session: None,
            timeout,
            observer: None,
            result_consumer: None,
            auto_capture: None,
            deferred: None,
            idle_tail: String::new(),
        }
    }

    /// Create a correlator using `[cli] capture_timeout_ms`
    pub fn from_config(config: &CliConfig) -> Self {
        Self::new(Duration::from_millis(config.capture_timeout_ms))
    }

    /// Register the live-display observer
    pub fn set_text_observer<F>(&mut self, observer: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    /// Register the consumer of cleaned capture results
    pub fn set_result_consumer<F>(&mut self, consumer: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.result_consumer = Some(Box::new(consumer));
    }

    /// True while a capture is waiting for the prompt
    pub fn is_capturing(&self) -> bool {
        self.session.is_some()
    }

    /// Deadline of the open capture, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.session.as_ref().map(|s| s.deadline)
    }

    /// Start a capture
    ///
    /// Clears any previous buffer, echoes the request to the observer unless
    /// `silent`, and arms the deadline.
    ///
    /// # Returns
    ///
    /// * `Vec<u8>` - The request line to write to the device
    pub fn begin(&mut self, request: &str, silent: bool) -> Vec<u8> {
        if let Some(old) = self.session.take() {
            debug!("Abandoning unfinished capture of '{}'", old.request);
        }

        self.idle_tail.clear();
        let line = format!("{}{}", request, CLI_LINE_ENDING);

        if !silent {
            self.emit(&line);
        }

        self.session = Some(CaptureSession {
            request: request.to_string(),
            buffer: String::new(),
            deadline: Instant::now() + self.timeout,
        });

        line.into_bytes()
    }

    /// Handle a chunk of console text
    ///
    /// # Returns
    ///
    /// * `Option<String>` - The cleaned result when this chunk completed a capture
    pub fn feed_text(&mut self, chunk: &str) -> Option<String> {
        if let Some(session) = self.session.as_mut() {
            session.buffer.push_str(chunk);
            if ends_with_prompt(&session.buffer) {
                return self.finish();
            }
            return None;
        }

        self.emit(chunk);

        self.idle_tail.push_str(chunk);
        if let Some((idx, _)) = self.idle_tail.char_indices().rev().nth(IDLE_TAIL_CHARS - 1) {
            self.idle_tail.drain(..idx);
        }

        if self.auto_capture.is_some() && ends_with_prompt(&self.idle_tail) {
            self.deferred = self.auto_capture.take();
        }

        None
    }

    /// Finish the open capture if its deadline has passed
    pub fn expire(&mut self, now: Instant) -> Option<String> {
        match &self.session {
            Some(session) if now >= session.deadline => {
                warn!(
                    "CLI prompt not seen for '{}' within {:?}, returning partial output ({} bytes)",
                    session.request,
                    self.timeout,
                    session.buffer.len()
                );
                self.finish()
            }
            _ => None,
        }
    }

    /// Close the open capture and produce its cleaned result
    ///
    /// The result is also handed to the result consumer. Returns `None` when no
    /// capture is open.
    pub fn finish(&mut self) -> Option<String> {
        let session = self.session.take()?;
        let cleaned = clean_capture(&session.buffer, &session.request);

        if let Some(consumer) = self.result_consumer.as_mut() {
            consumer(&cleaned);
        }

        Some(cleaned)
    }

    /// Drop the open capture without producing a result
    pub fn cancel(&mut self) {
        if let Some(session) = self.session.take() {
            debug!("Cancelled capture of '{}'", session.request);
        }
        self.auto_capture = None;
        self.deferred = None;
    }

    /// Schedule a capture to start after the next prompt seen outside a capture
    pub fn arm_auto_capture(&mut self, request: &str, silent: bool) {
        self.auto_capture = Some(PendingCapture {
            request: request.to_string(),
            silent,
        });
    }

    /// Take a deferred capture whose triggering prompt has been seen
    pub fn take_deferred(&mut self) -> Option<PendingCapture> {
        self.deferred.take()
    }

    fn emit(&mut self, text: &str) {
        if let Some(observer) = self.observer.as_mut() {
            observer(text);
        }
    }
}

/// True when `text` ends with the prompt at the start of a line
///
/// ```
/// use fc_link::cli::capture::ends_with_prompt;
///
/// assert!(ends_with_prompt("ok\r\n# "));
/// assert!(ends_with_prompt("# "));
/// assert!(!ends_with_prompt("# version\r\n"));
/// assert!(!ends_with_prompt("value 5# "));
/// ```
pub fn ends_with_prompt(text: &str) -> bool {
    text.strip_suffix(CLI_PROMPT)
        .is_some_and(|head| head.is_empty() || head.ends_with('\n'))
}

/// Strip the trailing prompt and a leading echo of the request
///
/// Everything from the last prompt onward is dropped. If the first remaining
/// line is the request itself (optionally behind a `#`), that line goes too.
///
/// # Examples
///
/// ```
/// use fc_link::cli::capture::clean_capture;
///
/// assert_eq!(clean_capture("version\r\n# Betaflight 4.5\r\n# ", "version"), "# Betaflight 4.5\r\n");
/// assert_eq!(clean_capture("ok\r\n# ", "status"), "ok\r\n");
/// ```
pub fn clean_capture(buffer: &str, request: &str) -> String {
    let mut body = match buffer.rfind(CLI_PROMPT) {
        Some(idx) => &buffer[..idx],
        None => buffer,
    };

    let request = request.trim();
    if !request.is_empty() {
        let (first, rest) = match body.find('\n') {
            Some(end) => (&body[..end], &body[end + 1..]),
            None => (body, ""),
        };
        if first.trim().trim_start_matches('#').trim() == request {
            body = rest;
        }
    }

    body.to_string()
}
