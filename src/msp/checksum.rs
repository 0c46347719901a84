//! # MSP v1 Checksum
//!
//! Running XOR over the length byte, command byte and every payload byte.
//! Sync, marker and direction bytes are not covered.

/// Fold one more byte into a running checksum
#[inline]
pub fn xor_step(checksum: u8, byte: u8) -> u8 {
    checksum ^ byte
}

/// Calculate the checksum of a frame body
///
/// # Arguments
///
/// * `length` - Length byte
/// * `command` - Command byte
/// * `payload` - Payload bytes
///
/// # Examples
///
/// ```
/// use fc_link::msp::checksum::msp_checksum;
///
/// // Empty requests checksum to their own command code
/// assert_eq!(msp_checksum(0, 108, &[]), 108);
/// ```
pub fn msp_checksum(length: u8, command: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(xor_step(length, command), |acc, &byte| xor_step(acc, byte))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_empty_payload() {
        for command in 0..=255u8 {
            assert_eq!(msp_checksum(0, command, &[]), command);
        }
    }

    #[test]
    fn test_checksum_known_vector() {
        // 0x06 ^ 0x6C ^ 0x01 ^ 0x02 ^ 0x03 ^ 0x04 ^ 0x05 ^ 0x06
        let payload = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        assert_eq!(msp_checksum(6, 0x6C, &payload), 0x06 ^ 0x6C ^ 0x07);
    }

    #[test]
    fn test_checksum_changes_with_data() {
        let a = msp_checksum(2, 101, &[0x00, 0x04]);
        let b = msp_checksum(2, 101, &[0x00, 0x05]);
        assert_ne!(a, b, "Checksum should change when data changes");
    }
}
