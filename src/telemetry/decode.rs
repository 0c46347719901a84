//! # Telemetry Decoders
//!
//! Typed views of the MSP responses polled for live telemetry.

use serde::Serialize;

use crate::error::{FcLinkError, Result};
use crate::msp::payload::{read_i16, read_u16, read_u8};
use crate::msp::protocol::*;

/// MSP_ATTITUDE payload size
pub const MSP_ATTITUDE_PAYLOAD_SIZE: usize = 6;

/// MSP_RAW_IMU payload size (three 3-axis sensors, i16 each)
pub const MSP_RAW_IMU_PAYLOAD_SIZE: usize = 18;

/// MSP_ANALOG payload size
pub const MSP_ANALOG_PAYLOAD_SIZE: usize = 7;

/// Craft attitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Attitude {
    /// Roll in degrees
    pub roll: f32,

    /// Pitch in degrees
    pub pitch: f32,

    /// Heading in degrees
    pub yaw: i16,
}

/// Raw sensor readings, in sensor units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RawImu {
    pub accelerometer: [i16; 3],
    pub gyroscope: [i16; 3],
    pub magnetometer: [i16; 3],
}

/// Power and link readings
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Analog {
    /// Battery voltage in volts
    pub voltage: f32,

    /// Capacity drawn in mAh
    pub mah_drawn: u16,

    /// RSSI (0-1023)
    pub rssi: u16,

    /// Current draw in amperes
    pub amperage: f32,
}

/// Any decoded telemetry sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Telemetry {
    Attitude(Attitude),
    RawImu(RawImu),
    Analog(Analog),
}

fn check_len(name: &str, payload: &[u8], required: usize) -> Result<()> {
    if payload.len() < required {
        return Err(FcLinkError::Protocol(format!(
            "{} payload too short: {} bytes",
            name,
            payload.len()
        )));
    }
    Ok(())
}

/// Decode an MSP_ATTITUDE payload
///
/// Roll and pitch arrive in tenths of a degree, heading in whole degrees.
pub fn decode_attitude(payload: &[u8]) -> Result<Attitude> {
    check_len("Attitude", payload, MSP_ATTITUDE_PAYLOAD_SIZE)?;

    Ok(Attitude {
        roll: read_i16(payload, 0) as f32 / 10.0,
        pitch: read_i16(payload, 2) as f32 / 10.0,
        yaw: read_i16(payload, 4),
    })
}

/// Decode an MSP_RAW_IMU payload
pub fn decode_raw_imu(payload: &[u8]) -> Result<RawImu> {
    check_len("Raw IMU", payload, MSP_RAW_IMU_PAYLOAD_SIZE)?;

    let axis = |sensor: usize| {
        let base = sensor * 6;
        [
            read_i16(payload, base),
            read_i16(payload, base + 2),
            read_i16(payload, base + 4),
        ]
    };

    Ok(RawImu {
        accelerometer: axis(0),
        gyroscope: axis(1),
        magnetometer: axis(2),
    })
}

/// Decode an MSP_ANALOG payload
///
/// Voltage arrives in tenths of a volt and current in hundredths of an amp.
pub fn decode_analog(payload: &[u8]) -> Result<Analog> {
    check_len("Analog", payload, MSP_ANALOG_PAYLOAD_SIZE)?;

    Ok(Analog {
        voltage: read_u8(payload, 0) as f32 / 10.0,
        mah_drawn: read_u16(payload, 1),
        rssi: read_u16(payload, 3),
        amperage: read_i16(payload, 5) as f32 / 100.0,
    })
}

/// Decode a frame if it carries known telemetry
///
/// # Returns
///
/// * `Ok(None)` - The command is not a telemetry message
/// * `Ok(Some(_))` - Decoded sample
///
/// # Errors
///
/// Returns error if a telemetry payload is shorter than its layout
pub fn decode_telemetry(frame: &MspFrame) -> Result<Option<Telemetry>> {
    let sample = match frame.command {
        MSP_ATTITUDE => Telemetry::Attitude(decode_attitude(&frame.payload)?),
        MSP_RAW_IMU => Telemetry::RawImu(decode_raw_imu(&frame.payload)?),
        MSP_ANALOG => Telemetry::Analog(decode_analog(&frame.payload)?),
        _ => return Ok(None),
    };
    Ok(Some(sample))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_attitude() {
        // roll 30.0°, pitch -1.0°, yaw 90°
        let payload = [0x2C, 0x01, 0xF6, 0xFF, 0x5A, 0x00];
        let attitude = decode_attitude(&payload).unwrap();

        assert!((attitude.roll - 30.0).abs() < 0.01);
        assert!((attitude.pitch - (-1.0)).abs() < 0.01);
        assert_eq!(attitude.yaw, 90);
    }

    #[test]
    fn test_decode_attitude_too_short() {
        assert!(decode_attitude(&[0u8; 5]).is_err());
    }

    #[test]
    fn test_decode_raw_imu() {
        let mut payload = Vec::new();
        for value in [1i16, -2, 512, 10, 20, -30, 0, 0, -1] {
            payload.extend_from_slice(&value.to_le_bytes());
        }

        let imu = decode_raw_imu(&payload).unwrap();
        assert_eq!(imu.accelerometer, [1, -2, 512]);
        assert_eq!(imu.gyroscope, [10, 20, -30]);
        assert_eq!(imu.magnetometer, [0, 0, -1]);
    }

    #[test]
    fn test_decode_analog() {
        let payload = [
            126, // 12.6V
            0xE8, 0x03, // 1000 mAh
            0xFF, 0x03, // RSSI 1023
            0xC4, 0x09, // 2500 → 25.00A
        ];

        let analog = decode_analog(&payload).unwrap();
        assert!((analog.voltage - 12.6).abs() < 0.01);
        assert_eq!(analog.mah_drawn, 1000);
        assert_eq!(analog.rssi, 1023);
        assert!((analog.amperage - 25.0).abs() < 0.01);
    }

    #[test]
    fn test_decode_telemetry_dispatch() {
        let frame = MspFrame::new(MSP_ATTITUDE, vec![0; 6]).unwrap();
        assert!(matches!(
            decode_telemetry(&frame).unwrap(),
            Some(Telemetry::Attitude(_))
        ));

        let frame = MspFrame::new(MSP_STATUS, vec![0; 11]).unwrap();
        assert!(decode_telemetry(&frame).unwrap().is_none());

        let frame = MspFrame::new(MSP_ANALOG, vec![0; 2]).unwrap();
        assert!(decode_telemetry(&frame).is_err());
    }

    #[test]
    fn test_telemetry_serializes_with_type_tag() {
        let sample = Telemetry::Attitude(Attitude {
            roll: 1.5,
            pitch: 0.0,
            yaw: 180,
        });
        let json = serde_json::to_value(sample).unwrap();

        assert_eq!(json["type"], "attitude");
        assert_eq!(json["yaw"], 180);
    }
}
