//! Fixed-point angle and location encodings used on the wire.
//!
//! Precise angles are a fraction of a full turn written as 8 upper-case hex
//! digits. Only the top 24 bits carry information; the low byte is sent as
//! zero, matching what hand controllers emit.

use crate::coordinates::{wrap, GeographicLocation};
use crate::error::{MountError, MountResult};

const FULL_TURN: f64 = 4_294_967_296.0;
const SIGNIFICANT_STEPS: f64 = 16_777_216.0;

/// Smallest angle the precise encoding can distinguish.
pub const PRECISE_RESOLUTION_DEGREES: f64 = 360.0 / SIGNIFICANT_STEPS;

pub fn encode_angle(degrees: f64) -> String {
    let steps = (wrap(degrees, 360.0) / 360.0 * SIGNIFICANT_STEPS).round() as u64 % SIGNIFICANT_STEPS as u64;
    format!("{:08X}", (steps as u32) << 8)
}

/// Decodes to [0, 360).
pub fn decode_angle(hex: &str) -> MountResult<f64> {
    if hex.len() != 8 {
        return Err(MountError::CommandError(format!("Angle field '{}' is not 8 hex digits", hex)));
    }
    let raw = u32::from_str_radix(hex, 16)
        .map_err(|e| MountError::CommandError(format!("Angle field '{}': {}", hex, e)))?;
    Ok(f64::from(raw) / FULL_TURN * 360.0)
}

/// Maps (180, 360) onto (-180, 0) for declination and altitude fields.
pub fn signed_degrees(degrees: f64) -> f64 {
    if degrees > 180.0 { degrees - 360.0 } else { degrees }
}

pub fn encode_pair(first_degrees: f64, second_degrees: f64) -> String {
    format!("{},{}", encode_angle(first_degrees), encode_angle(second_degrees))
}

pub fn decode_pair(payload: &[u8]) -> MountResult<(f64, f64)> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| MountError::CommandError("Angle pair is not ASCII".to_string()))?;
    let (first, second) = text
        .split_once(',')
        .ok_or_else(|| MountError::CommandError(format!("Angle pair '{}' has no separator", text)))?;
    Ok((decode_angle(first)?, decode_angle(second)?))
}

/// Degrees, minutes, seconds, hemisphere flag (1 = south/west).
pub fn encode_location(location: &GeographicLocation) -> [u8; 8] {
    let (lat_d, lat_m, lat_s) = split_dms(location.latitude());
    let (lon_d, lon_m, lon_s) = split_dms(location.longitude());
    [
        lat_d,
        lat_m,
        lat_s,
        u8::from(location.latitude() < 0.0),
        lon_d,
        lon_m,
        lon_s,
        u8::from(location.longitude() < 0.0),
    ]
}

pub fn decode_location(payload: &[u8]) -> MountResult<GeographicLocation> {
    let bytes: [u8; 8] = payload
        .try_into()
        .map_err(|_| MountError::CommandError(format!("Location needs 8 bytes, got {}", payload.len())))?;
    let join = |d: u8, m: u8, s: u8, negative: u8| {
        let value = f64::from(d) + f64::from(m) / 60.0 + f64::from(s) / 3600.0;
        if negative == 1 { -value } else { value }
    };
    if bytes[3] > 1 || bytes[7] > 1 || bytes[1] >= 60 || bytes[2] >= 60 || bytes[5] >= 60 || bytes[6] >= 60 {
        return Err(MountError::CommandError(format!("Location bytes {:?} out of range", bytes)));
    }
    GeographicLocation::new(
        join(bytes[0], bytes[1], bytes[2], bytes[3]),
        join(bytes[4], bytes[5], bytes[6], bytes[7]),
    )
    .map_err(|e| MountError::CommandError(e.to_string()))
}

fn split_dms(value: f64) -> (u8, u8, u8) {
    let total = (value.abs() * 3600.0).round() as u32;
    ((total / 3600) as u8, ((total / 60) % 60) as u8, (total % 60) as u8)
}
