//! # MSP Protocol Constants and Types
//!
//! Core protocol definitions for MSP v1 communication.
//!
//! ```text
//! request:  $ M < [len=0] [cmd] [checksum]
//! response: $ M > [len] [cmd] [payload; len] [checksum]
//! ```

use crate::error::{FcLinkError, Result};

/// MSP frame sync byte (always '$')
pub const MSP_SYNC_BYTE: u8 = 0x24;

/// Protocol marker following the sync byte ('M' for MSP v1)
pub const MSP_PROTOCOL_MARKER: u8 = b'M';

/// Direction byte for host → device requests ('<')
pub const MSP_DIRECTION_REQUEST: u8 = 0x3C;

/// Direction byte for device → host responses ('>')
pub const MSP_DIRECTION_RESPONSE: u8 = 0x3E;

/// Maximum MSP v1 payload size (length is a single byte)
pub const MSP_MAX_PAYLOAD_SIZE: usize = 255;

/// Request frame size: sync + marker + direction + length + command + checksum
pub const MSP_REQUEST_FRAME_SIZE: usize = 6;

/// Header size preceding the payload: sync + marker + direction + length + command
pub const MSP_HEADER_SIZE: usize = 5;

/// Flight controller status
pub const MSP_STATUS: u8 = 101;

/// Raw accelerometer, gyro and magnetometer readings
pub const MSP_RAW_IMU: u8 = 102;

/// Roll, pitch and heading
pub const MSP_ATTITUDE: u8 = 108;

/// Battery voltage, consumed capacity, RSSI and current
pub const MSP_ANALOG: u8 = 110;

/// One decoded (or to-be-encoded) MSP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MspFrame {
    /// Command code identifying the message type
    pub command: u8,

    /// Payload data (0-255 bytes, command specific)
    pub payload: Vec<u8>,
}

impl MspFrame {
    /// Create a new MSP frame
    ///
    /// # Arguments
    ///
    /// * `command` - Command code
    /// * `payload` - Payload data (max 255 bytes)
    ///
    /// # Errors
    ///
    /// Returns error if payload exceeds MSP_MAX_PAYLOAD_SIZE (255 bytes)
    pub fn new(command: u8, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MSP_MAX_PAYLOAD_SIZE {
            return Err(FcLinkError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                payload.len(),
                MSP_MAX_PAYLOAD_SIZE
            )));
        }

        Ok(Self { command, payload })
    }

    /// Payload length as carried in the length byte
    ///
    /// Cannot truncate since payload is validated to be ≤ 255 bytes
    pub fn length(&self) -> u8 {
        self.payload.len() as u8
    }
}
