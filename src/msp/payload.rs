//! # Payload Field Accessors
//!
//! Little-endian readers over an MSP payload. Offsets come from fixed,
//! known message layouts, so an out-of-range offset is a caller bug and
//! panics on slice indexing rather than returning an error.

/// Read an unsigned byte at `offset`
pub fn read_u8(payload: &[u8], offset: usize) -> u8 {
    payload[offset]
}

/// Read a little-endian u16 at `offset`
pub fn read_u16(payload: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([payload[offset], payload[offset + 1]])
}

/// Read a little-endian i16 at `offset`
///
/// Values above 32767 wrap to their two's-complement negative.
pub fn read_i16(payload: &[u8], offset: usize) -> i16 {
    read_u16(payload, offset) as i16
}

/// Read a little-endian u32 at `offset`
pub fn read_u32(payload: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u8() {
        assert_eq!(read_u8(&[0x01, 0xFE], 1), 0xFE);
    }

    #[test]
    fn test_read_u16_little_endian() {
        assert_eq!(read_u16(&[0x34, 0x12], 0), 0x1234);
        assert_eq!(read_u16(&[0x00, 0xFF, 0xFF], 1), 0xFFFF);
    }

    #[test]
    fn test_read_i16_wraps_above_32767() {
        assert_eq!(read_i16(&[0xFF, 0x7F], 0), 32767);
        assert_eq!(read_i16(&[0x00, 0x80], 0), -32768);
        assert_eq!(read_i16(&[0xF6, 0xFF], 0), -10);
    }

    #[test]
    fn test_read_u32_little_endian() {
        assert_eq!(read_u32(&[0x00, 0x78, 0x56, 0x34, 0x12], 1), 0x1234_5678);
    }

    #[test]
    #[should_panic]
    fn test_out_of_range_offset_panics() {
        read_u16(&[0x01], 0);
    }
}
