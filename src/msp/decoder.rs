//! # MSP Frame Decoder
//!
//! Incremental, byte-at-a-time decoder for MSP v1 response frames.
//!
//! The decoder keeps no buffer beyond the frame currently being assembled
//! and never backtracks. A bad sync sequence or a checksum mismatch costs
//! only the misframed bytes; the next `$M>` header is picked up normally.
//!
//! ## Usage
//!
//! ```
//! use fc_link::msp::decoder::MspDecoder;
//! use fc_link::msp::encoder::encode_response;
//!
//! let mut decoder = MspDecoder::new();
//! let bytes = encode_response(108, &[1, 0, 2, 0, 90, 0]).unwrap();
//!
//! // Chunk boundaries do not matter
//! assert!(decoder.push(&bytes[..4]).is_empty());
//! let frames = decoder.push(&bytes[4..]);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].command, 108);
//! ```

use std::fmt;

use tracing::trace;

use super::checksum::xor_step;
use super::protocol::*;

/// Callback receiving each successfully decoded frame
pub type FrameHandler = Box<dyn FnMut(MspFrame) + Send>;

/// Decoder state, named after what the next byte is expected to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Scanning for the sync byte
    Idle,
    /// Sync seen, expecting the protocol marker
    SawStart,
    /// Marker seen, expecting the response direction byte
    SawDirection,
    /// Expecting the payload length
    HaveLength,
    /// Expecting the command code
    HaveCommand,
    /// Filling the payload buffer
    InPayload,
    /// Expecting the checksum byte
    AwaitingChecksum,
}

/// Incremental MSP response decoder
///
/// One instance per connection. All state is mutated by [`MspDecoder::feed_byte`]
/// only, and [`MspDecoder::reset`] discards a partially received frame.
pub struct MspDecoder {
    state: DecoderState,
    /// Declared payload length
    length: usize,
    command: u8,
    /// Running XOR of length, command and payload bytes
    checksum: u8,
    payload: Vec<u8>,
    handler: Option<FrameHandler>,
    frames_decoded: u64,
    checksum_errors: u64,
}

impl fmt::Debug for MspDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MspDecoder")
            .field("state", &self.state)
            .field("length", &self.length)
            .field("received", &self.payload.len())
            .field("frames_decoded", &self.frames_decoded)
            .field("checksum_errors", &self.checksum_errors)
            .finish_non_exhaustive()
    }
}

impl Default for MspDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MspDecoder {
    /// Create an idle decoder with no handler registered
    pub fn new() -> Self {
        Self {
            state: DecoderState::Idle,
            length: 0,
            command: 0,
            checksum: 0,
            payload: Vec::new(),
            handler: None,
            frames_decoded: 0,
            checksum_errors: 0,
        }
    }

    /// Register the consumer for decoded frames, replacing any previous one
    pub fn set_frame_handler<F>(&mut self, handler: F)
    where
        F: FnMut(MspFrame) + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
    }

    /// Current decoder state
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// True when no partial frame is held
    pub fn is_idle(&self) -> bool {
        self.state == DecoderState::Idle
    }

    /// Number of frames that passed the checksum
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Number of frames dropped for a checksum mismatch
    pub fn checksum_errors(&self) -> u64 {
        self.checksum_errors
    }

    /// Force the decoder back to `Idle`, discarding any partial frame
    pub fn reset(&mut self) {
        if self.state != DecoderState::Idle {
            trace!("Discarding partial MSP frame in state {:?}", self.state);
        }
        self.state = DecoderState::Idle;
        self.length = 0;
        self.command = 0;
        self.checksum = 0;
        self.payload.clear();
    }

    /// Feed a chunk of bytes, delivering each completed frame to the handler
    ///
    /// Frames are delivered in arrival order. Without a registered handler,
    /// completed frames are dropped.
    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if let Some(frame) = self.feed_byte(byte) {
                match self.handler.as_mut() {
                    Some(handler) => handler(frame),
                    None => trace!("No frame handler registered, dropping command {}", frame.command),
                }
            }
        }
    }

    /// Feed a chunk of bytes and return the completed frames in order
    ///
    /// Pull-style alternative to [`MspDecoder::feed`]; the registered handler
    /// is not called.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<MspFrame> {
        bytes.iter().filter_map(|&byte| self.feed_byte(byte)).collect()
    }

    /// Advance the state machine by one byte
    ///
    /// # Returns
    ///
    /// * `Option<MspFrame>` - A frame when this byte was a matching checksum
    pub fn feed_byte(&mut self, byte: u8) -> Option<MspFrame> {
        match self.state {
            DecoderState::Idle => {
                if byte == MSP_SYNC_BYTE {
                    self.state = DecoderState::SawStart;
                }
            }
            DecoderState::SawStart => {
                self.state = if byte == MSP_PROTOCOL_MARKER {
                    DecoderState::SawDirection
                } else {
                    DecoderState::Idle
                };
            }
            DecoderState::SawDirection => {
                self.state = if byte == MSP_DIRECTION_RESPONSE {
                    DecoderState::HaveLength
                } else {
                    DecoderState::Idle
                };
            }
            DecoderState::HaveLength => {
                self.length = byte as usize;
                self.checksum = byte;
                self.payload = Vec::with_capacity(self.length);
                self.state = DecoderState::HaveCommand;
            }
            DecoderState::HaveCommand => {
                self.command = byte;
                self.checksum = xor_step(self.checksum, byte);
                self.state = if self.length == 0 {
                    DecoderState::AwaitingChecksum
                } else {
                    DecoderState::InPayload
                };
            }
            DecoderState::InPayload => {
                self.payload.push(byte);
                self.checksum = xor_step(self.checksum, byte);
                if self.payload.len() == self.length {
                    self.state = DecoderState::AwaitingChecksum;
                }
            }
            DecoderState::AwaitingChecksum => {
                self.state = DecoderState::Idle;

                if byte == self.checksum {
                    self.frames_decoded += 1;
                    return Some(MspFrame {
                        command: self.command,
                        payload: std::mem::take(&mut self.payload),
                    });
                }

                self.checksum_errors += 1;
                trace!(
                    "MSP checksum mismatch for command {}: expected 0x{:02X}, got 0x{:02X}",
                    self.command,
                    self.checksum,
                    byte
                );
                self.payload.clear();
            }
        }

        None
    }
}
