//! Linak Desk Protocol
//!
//! Wire-level definitions for the desk's GATT surface: the three fixed
//! characteristics, the two-byte command codes, and the four-byte
//! position/speed telemetry frame.

use crate::models::TelemetrySample;
use thiserror::Error;
use uuid::{uuid, Uuid};

/// Position/speed telemetry characteristic (read + notify).
pub const UUID_HEIGHT: Uuid = uuid!("99fa0021-338a-1024-8a49-009c0215f78a");

/// Command characteristic (write wake/stop codes).
pub const UUID_COMMAND: Uuid = uuid!("99fa0002-338a-1024-8a49-009c0215f78a");

/// Reference-input characteristic (write raw target position).
pub const UUID_REFERENCE_INPUT: Uuid = uuid!("99fa0031-338a-1024-8a49-009c0215f78a");

/// Wake command code. The motor controller sleeps after inactivity and
/// ignores movement requests until woken.
pub const WAKE_CODE: u16 = 254;

/// Stop command code.
pub const STOP_CODE: u16 = 255;

/// Interval between target writes / telemetry polls while moving.
pub const MOVE_POLL_INTERVAL_MS: u64 = 500;

/// Expected length of a telemetry frame.
pub const TELEMETRY_FRAME_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("telemetry frame has {len} bytes, expected {TELEMETRY_FRAME_LEN}")]
    BadTelemetryFrame { len: usize },
}

/// Encode a command code as the desk expects it: little-endian u16.
pub fn command_frame(code: u16) -> [u8; 2] {
    code.to_le_bytes()
}

/// Encode a raw target position for the reference-input characteristic.
pub fn encode_target(raw: u16) -> [u8; 2] {
    raw.to_le_bytes()
}

/// Decode a telemetry frame: unsigned 16-bit position ticks followed by a
/// signed 16-bit speed, both little-endian. Any other frame size is
/// malformed.
pub fn decode_telemetry(data: &[u8]) -> Result<TelemetrySample, ProtocolError> {
    if data.len() != TELEMETRY_FRAME_LEN {
        return Err(ProtocolError::BadTelemetryFrame { len: data.len() });
    }

    Ok(TelemetrySample {
        position: u16::from_le_bytes([data[0], data[1]]),
        speed: i16::from_le_bytes([data[2], data[3]]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_frames_are_little_endian() {
        assert_eq!(command_frame(WAKE_CODE), [0xFE, 0x00]);
        assert_eq!(command_frame(STOP_CODE), [0xFF, 0x00]);
    }

    #[test]
    fn encodes_target() {
        assert_eq!(encode_target(0), [0x00, 0x00]);
        assert_eq!(encode_target(6500), [0x64, 0x19]);
    }

    #[test]
    fn decodes_telemetry_frame() {
        let sample = decode_telemetry(&[0x54, 0x01, 0x64, 0x00]).unwrap();
        assert_eq!(sample.position, 340);
        assert_eq!(sample.speed, 100);
    }

    #[test]
    fn decodes_negative_speed() {
        let sample = decode_telemetry(&[0x00, 0x00, 0xFF, 0xFF]).unwrap();
        assert_eq!(sample.position, 0);
        assert_eq!(sample.speed, -1);
    }

    #[test]
    fn rejects_wrong_size_frames() {
        assert!(decode_telemetry(&[0x54, 0x01]).is_err());
        assert!(decode_telemetry(&[]).is_err());
        assert!(decode_telemetry(&[0x54, 0x01, 0x64, 0x00, 0x00]).is_err());
    }
}
