use crate::constants::{Unit, HEADER1, HEADER2, SIGN_MINUS, SIGN_NONE, SIGN_PLUS, TELEMETRY_LEN};
use crate::error::DecodeError;

/// One weight notification from the scale, decoded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryFrame {
    pub timer_seconds: f64,
    pub unit: Unit,
    pub weight_grams: f64,
    pub flow_rate: f64,
    pub battery_percent: u8,
    pub standby_minutes: u16,
    pub buzzer_gear: u8,
    pub flow_smoothing: u8,
    pub stop_condition: u8,
}

/// Decode a raw notification.
///
/// Buffers that are exactly 20 bytes long but do not start with the telemetry
/// header are not part of the protocol and yield `Ok(None)`. Field checks run
/// in a fixed order (unit, weight sign, flow sign, checksum) and only the first
/// failure is reported.
pub fn decode(buffer: &[u8]) -> Result<Option<TelemetryFrame>, DecodeError> {
    if buffer.len() < TELEMETRY_LEN {
        return Err(DecodeError::FrameTooShort { len: buffer.len() });
    }
    if buffer.len() > TELEMETRY_LEN {
        return Err(DecodeError::FrameTooLong { len: buffer.len() });
    }
    if buffer[0] != HEADER1 || buffer[1] != HEADER2 {
        return Ok(None);
    }

    let unit = Unit::try_from(buffer[5]).map_err(DecodeError::InvalidUnitByte)?;
    let weight_sign = decode_sign("weight", buffer[6])?;
    let flow_sign = decode_sign("flow", buffer[10])?;

    let expected = checksum(&buffer[..TELEMETRY_LEN - 1]);
    let actual = buffer[TELEMETRY_LEN - 1];
    if expected != actual {
        return Err(DecodeError::ChecksumMismatch { expected, actual });
    }

    Ok(Some(TelemetryFrame {
        timer_seconds: be_uint(&buffer[2..5]) as f64 / 1000.0,
        unit,
        weight_grams: weight_sign * be_uint(&buffer[7..10]) as f64 / 100.0,
        flow_rate: flow_sign * be_uint(&buffer[11..13]) as f64 / 100.0,
        battery_percent: buffer[13],
        standby_minutes: u16::from_be_bytes([buffer[14], buffer[15]]),
        buzzer_gear: buffer[16],
        flow_smoothing: buffer[17],
        stop_condition: buffer[18],
    }))
}

/// XOR of every byte.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, &byte| acc ^ byte)
}

fn decode_sign(field: &'static str, byte: u8) -> Result<f64, DecodeError> {
    match byte {
        SIGN_PLUS | SIGN_NONE => Ok(1.0),
        SIGN_MINUS => Ok(-1.0),
        _ => Err(DecodeError::InvalidSignByte { field, byte }),
    }
}

fn be_uint(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &byte| acc << 8 | byte as u32)
}
