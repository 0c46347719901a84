//! # MSP Frame Encoder
//!
//! Encodes MSP polling requests, plus response-shaped frames for device
//! simulation.

use super::checksum::msp_checksum;
use super::protocol::*;
use crate::error::Result;

/// Encode a payload-less polling request
///
/// # Arguments
///
/// * `command` - MSP command code (0-255)
///
/// # Returns
///
/// * `[u8; 6]` - `$ M < 0x00 command checksum`, where checksum equals the command
///
/// # Examples
///
/// ```
/// use fc_link::msp::encoder::encode_request;
/// use fc_link::msp::protocol::MSP_ATTITUDE;
///
/// let frame = encode_request(MSP_ATTITUDE);
/// assert_eq!(frame, [0x24, 0x4D, 0x3C, 0x00, 0x6C, 0x6C]);
/// ```
pub fn encode_request(command: u8) -> [u8; MSP_REQUEST_FRAME_SIZE] {
    [
        MSP_SYNC_BYTE,
        MSP_PROTOCOL_MARKER,
        MSP_DIRECTION_REQUEST,
        0,
        command,
        msp_checksum(0, command, &[]),
    ]
}

/// Encode a response frame as the flight controller would send it
///
/// # Errors
///
/// Returns error if payload exceeds MSP_MAX_PAYLOAD_SIZE (255 bytes)
pub fn encode_response(command: u8, payload: &[u8]) -> Result<Vec<u8>> {
    encode_frame(MSP_DIRECTION_RESPONSE, command, payload)
}

/// Encode a complete frame for either direction
///
/// # Arguments
///
/// * `direction` - MSP_DIRECTION_REQUEST or MSP_DIRECTION_RESPONSE
/// * `command` - Command code
/// * `payload` - Payload bytes (max 255)
///
/// # Returns
///
/// * `Result<Vec<u8>>` - Frame bytes: header + payload + checksum
pub fn encode_frame(direction: u8, command: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let frame = MspFrame::new(command, payload.to_vec())?;
    let length = frame.length();

    let mut bytes = Vec::with_capacity(MSP_HEADER_SIZE + frame.payload.len() + 1);
    bytes.push(MSP_SYNC_BYTE);
    bytes.push(MSP_PROTOCOL_MARKER);
    bytes.push(direction);
    bytes.push(length);
    bytes.push(frame.command);
    bytes.extend_from_slice(&frame.payload);
    bytes.push(msp_checksum(length, frame.command, &frame.payload));

    Ok(bytes)
}
