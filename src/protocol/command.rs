// src/protocol/command.rs - Typed command catalog and reply parsing
use super::codec::{decode_location, decode_pair, encode_location, encode_pair, signed_degrees};
use super::types::{Direction, Model, Motor, Rate, TrackingMode, Version};
use crate::coordinates::{EquatorialCoordinate, GeographicLocation, HorizontalCoordinate};
use crate::error::{MountError, MountResult};

/// Passthrough message length byte for a two-payload-byte motor command.
const PASSTHROUGH_LEN: u8 = 2;
const MC_MOVE_POSITIVE: u8 = 36;
const MC_MOVE_NEGATIVE: u8 = 37;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Echo(u8),
    GetVersion,
    GetModel,
    GetPositionRaDec,
    GetPositionAltAz,
    GotoRaDec(EquatorialCoordinate),
    GetTrackingMode,
    SetTrackingMode(TrackingMode),
    GetLocation,
    SetLocation(GeographicLocation),
    Move { direction: Direction, rate: Rate },
    StopMotor(Motor),
    IsSlewing,
    CancelGoto,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Ack,
    Echo(u8),
    Version(Version),
    Model(Model),
    Equatorial(EquatorialCoordinate),
    Horizontal(HorizontalCoordinate),
    Tracking(TrackingMode),
    Location(GeographicLocation),
    Slewing(bool),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Echo(_) => "Echo",
            Command::GetVersion => "GetVersion",
            Command::GetModel => "GetModel",
            Command::GetPositionRaDec => "GetPositionRaDec",
            Command::GetPositionAltAz => "GetPositionAltAz",
            Command::GotoRaDec(_) => "GotoRaDec",
            Command::GetTrackingMode => "GetTrackingMode",
            Command::SetTrackingMode(_) => "SetTrackingMode",
            Command::GetLocation => "GetLocation",
            Command::SetLocation(_) => "SetLocation",
            Command::Move { .. } => "Move",
            Command::StopMotor(_) => "StopMotor",
            Command::IsSlewing => "IsSlewing",
            Command::CancelGoto => "CancelGoto",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::Echo(byte) => vec![b'K', *byte],
            Command::GetVersion => vec![b'V'],
            Command::GetModel => vec![b'm'],
            Command::GetPositionRaDec => vec![b'e'],
            Command::GetPositionAltAz => vec![b'z'],
            Command::GotoRaDec(target) => {
                let mut frame = vec![b'r'];
                frame.extend_from_slice(encode_pair(target.ra_degrees(), target.dec_degrees()).as_bytes());
                frame
            }
            Command::GetTrackingMode => vec![b't'],
            Command::SetTrackingMode(mode) => vec![b'T', mode.code()],
            Command::GetLocation => vec![b'w'],
            Command::SetLocation(location) => {
                let mut frame = vec![b'W'];
                frame.extend_from_slice(&encode_location(location));
                frame
            }
            Command::Move { direction, rate } => passthrough(
                direction.motor(),
                if direction.is_positive() { MC_MOVE_POSITIVE } else { MC_MOVE_NEGATIVE },
                rate.value(),
            ),
            Command::StopMotor(motor) => passthrough(*motor, MC_MOVE_POSITIVE, 0),
            Command::IsSlewing => vec![b'L'],
            Command::CancelGoto => vec![b'M'],
        }
    }

    /// Reply length in bytes, terminator included.
    pub fn reply_len(&self) -> usize {
        match self {
            Command::Echo(_) | Command::GetModel | Command::GetTrackingMode | Command::IsSlewing => 2,
            Command::GetVersion => 3,
            Command::GetPositionRaDec | Command::GetPositionAltAz => 18,
            Command::GetLocation => 9,
            Command::GotoRaDec(_)
            | Command::SetTrackingMode(_)
            | Command::SetLocation(_)
            | Command::Move { .. }
            | Command::StopMotor(_)
            | Command::CancelGoto => 1,
        }
    }

    /// Parse a reply payload (terminator already stripped).
    pub fn parse_reply(&self, payload: &[u8]) -> MountResult<Response> {
        let expected = self.reply_len() - 1;
        if payload.len() != expected {
            return Err(self.unexpected(format!("{} payload bytes, expected {}", payload.len(), expected)));
        }
        match self {
            Command::Echo(sent) => {
                if payload[0] == *sent {
                    Ok(Response::Echo(payload[0]))
                } else {
                    Err(self.unexpected(format!("echoed {:#04x} for {:#04x}", payload[0], sent)))
                }
            }
            Command::GetVersion => Ok(Response::Version(Version { major: payload[0], minor: payload[1] })),
            Command::GetModel => Ok(Response::Model(Model(payload[0]))),
            Command::GetPositionRaDec => {
                let (ra, dec) = decode_pair(payload)?;
                EquatorialCoordinate::from_degrees(ra, signed_degrees(dec))
                    .map(Response::Equatorial)
                    .map_err(|e| self.unexpected(e.to_string()))
            }
            Command::GetPositionAltAz => {
                let (az, alt) = decode_pair(payload)?;
                HorizontalCoordinate::new(az, signed_degrees(alt))
                    .map(Response::Horizontal)
                    .map_err(|e| self.unexpected(e.to_string()))
            }
            Command::GetTrackingMode => TrackingMode::from_code(payload[0])
                .map(Response::Tracking)
                .ok_or_else(|| self.unexpected(format!("tracking mode code {}", payload[0]))),
            Command::GetLocation => decode_location(payload).map(Response::Location),
            Command::IsSlewing => match payload[0] {
                b'0' => Ok(Response::Slewing(false)),
                b'1' => Ok(Response::Slewing(true)),
                other => Err(self.unexpected(format!("slewing flag {:#04x}", other))),
            },
            Command::GotoRaDec(_)
            | Command::SetTrackingMode(_)
            | Command::SetLocation(_)
            | Command::Move { .. }
            | Command::StopMotor(_)
            | Command::CancelGoto => Ok(Response::Ack),
        }
    }

    fn unexpected(&self, detail: String) -> MountError {
        MountError::CommandError(format!("{}: unexpected reply ({})", self.name(), detail))
    }
}

fn passthrough(motor: Motor, message: u8, rate: u8) -> Vec<u8> {
    vec![b'P', PASSTHROUGH_LEN, motor.device_id(), message, rate, 0, 0, 0]
}

/// Decoded fixed-rate motor passthrough: (motor, positive, rate).
pub fn decode_passthrough(frame: &[u8]) -> Option<(Motor, bool, u8)> {
    match frame {
        [b'P', PASSTHROUGH_LEN, id, message, rate, 0, 0, 0] => {
            let motor = Motor::from_device_id(*id)?;
            let positive = match *message {
                MC_MOVE_POSITIVE => true,
                MC_MOVE_NEGATIVE => false,
                _ => return None,
            };
            Some((motor, positive, *rate))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_frames() {
        let up = Command::Move { direction: Direction::Up, rate: Rate::new(5) };
        assert_eq!(up.encode(), vec![b'P', 2, 17, 36, 5, 0, 0, 0]);
        let left = Command::Move { direction: Direction::Left, rate: Rate::new(9) };
        assert_eq!(left.encode(), vec![b'P', 2, 16, 37, 9, 0, 0, 0]);
        assert_eq!(decode_passthrough(&left.encode()), Some((Motor::Azimuth, false, 9)));
        let stop = Command::StopMotor(Motor::Altitude).encode();
        assert_eq!(decode_passthrough(&stop), Some((Motor::Altitude, true, 0)));
    }

    #[test]
    fn test_goto_frame() {
        let target = EquatorialCoordinate::new(12.0, -90.0).unwrap();
        let frame = Command::GotoRaDec(target).encode();
        assert_eq!(frame, b"r80000000,C0000000".to_vec());
    }

    #[test]
    fn test_parse_position_reply() {
        let reply = Command::GetPositionRaDec.parse_reply(b"80000000,C0000000").unwrap();
        match reply {
            Response::Equatorial(c) => {
                assert_eq!(c.ra_hours(), 12.0);
                assert_eq!(c.dec_degrees(), -90.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_wrong_shapes() {
        assert!(matches!(
            Command::GetVersion.parse_reply(&[4]),
            Err(MountError::CommandError(_))
        ));
        assert!(Command::IsSlewing.parse_reply(b"7").is_err());
        assert!(Command::GetTrackingMode.parse_reply(&[9]).is_err());
        assert!(Command::Echo(b'x').parse_reply(b"y").is_err());
        // 100 degrees of declination cannot be a real position.
        assert!(Command::GetPositionRaDec.parse_reply(b"00000000,471C7100").is_err());
    }

    #[test]
    fn test_parse_simple_replies() {
        assert_eq!(
            Command::GetVersion.parse_reply(&[4, 21]).unwrap(),
            Response::Version(Version { major: 4, minor: 21 })
        );
        assert_eq!(Command::IsSlewing.parse_reply(b"1").unwrap(), Response::Slewing(true));
        assert_eq!(Command::CancelGoto.parse_reply(b"").unwrap(), Response::Ack);
    }
}
