// src/protocol/types.rs - Wire-level enums shared by the protocol and motion layers
use crate::error::MountError;
use std::fmt;
use std::str::FromStr;

/// Fixed slew rate, always within 0..=9. Rate 0 halts the motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Rate(u8);

impl Rate {
    pub const MIN: Rate = Rate(0);
    pub const MAX: Rate = Rate(9);

    /// Clamps into 0..=9.
    pub fn new(value: u8) -> Self {
        Rate(value.min(Self::MAX.0))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn increased(self) -> Self {
        Rate::new(self.0.saturating_add(1))
    }

    pub fn decreased(self) -> Self {
        Rate(self.0.saturating_sub(1))
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A physically driven axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Motor {
    Azimuth,
    Altitude,
}

impl Motor {
    pub const ALL: [Motor; 2] = [Motor::Azimuth, Motor::Altitude];

    /// Passthrough device id of the motor controller.
    pub fn device_id(self) -> u8 {
        match self {
            Motor::Azimuth => 16,
            Motor::Altitude => 17,
        }
    }

    pub fn from_device_id(id: u8) -> Option<Self> {
        match id {
            16 => Some(Motor::Azimuth),
            17 => Some(Motor::Altitude),
            _ => None,
        }
    }
}

/// Axis grouping addressed by stop commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Az,
    Alt,
    Both,
}

impl Axis {
    pub fn motors(self) -> &'static [Motor] {
        match self {
            Axis::Az => &[Motor::Azimuth],
            Axis::Alt => &[Motor::Altitude],
            Axis::Both => &Motor::ALL,
        }
    }
}

impl From<Motor> for Axis {
    fn from(motor: Motor) -> Self {
        match motor {
            Motor::Azimuth => Axis::Az,
            Motor::Altitude => Axis::Alt,
        }
    }
}

impl FromStr for Axis {
    type Err = MountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "az" | "azimuth" | "ra" => Ok(Axis::Az),
            "alt" | "altitude" | "dec" => Ok(Axis::Alt),
            "both" | "all" => Ok(Axis::Both),
            other => Err(MountError::CommandError(format!("Unknown axis '{}'", other))),
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Axis::Az => "az",
            Axis::Alt => "alt",
            Axis::Both => "both",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn motor(self) -> Motor {
        match self {
            Direction::Up | Direction::Down => Motor::Altitude,
            Direction::Left | Direction::Right => Motor::Azimuth,
        }
    }

    pub fn is_positive(self) -> bool {
        matches!(self, Direction::Up | Direction::Right)
    }
}

impl FromStr for Direction {
    type Err = MountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" | "north" | "n" => Ok(Direction::Up),
            "down" | "south" | "s" => Ok(Direction::Down),
            "left" | "west" | "w" => Ok(Direction::Left),
            "right" | "east" | "e" => Ok(Direction::Right),
            other => Err(MountError::CommandError(format!("Unknown direction '{}'", other))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackingMode {
    Off,
    AltAz,
    EqNorth,
    EqSouth,
}

impl TrackingMode {
    pub fn code(self) -> u8 {
        match self {
            TrackingMode::Off => 0,
            TrackingMode::AltAz => 1,
            TrackingMode::EqNorth => 2,
            TrackingMode::EqSouth => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TrackingMode::Off),
            1 => Some(TrackingMode::AltAz),
            2 => Some(TrackingMode::EqNorth),
            3 => Some(TrackingMode::EqSouth),
            _ => None,
        }
    }
}

impl FromStr for TrackingMode {
    type Err = MountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(TrackingMode::Off),
            "altaz" | "alt-az" => Ok(TrackingMode::AltAz),
            "eq-north" | "eqnorth" => Ok(TrackingMode::EqNorth),
            "eq-south" | "eqsouth" => Ok(TrackingMode::EqSouth),
            other => Err(MountError::CommandError(format!("Unknown tracking mode '{}'", other))),
        }
    }
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrackingMode::Off => "off",
            TrackingMode::AltAz => "altaz",
            TrackingMode::EqNorth => "eq-north",
            TrackingMode::EqSouth => "eq-south",
        })
    }
}

/// Hand controller firmware version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Mount model code as reported by the hand controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Model(pub u8);

impl Model {
    pub fn name(self) -> &'static str {
        match self.0 {
            1 => "GPS Series",
            3 => "i-Series",
            4 => "i-Series SE",
            5 => "CGE",
            6 => "Advanced GT",
            7 => "SLT",
            9 => "CPC",
            10 => "GT",
            11 => "4/5 SE",
            12 => "6/8 SE",
            13 => "CGE Pro",
            14 => "CGEM DX",
            15 => "LCM",
            16 => "Sky Prodigy",
            17 => "CPC Deluxe",
            18 => "GT 16",
            19 => "StarSeeker",
            20 => "Advanced VX",
            21 => "Cosmos",
            22 => "Evolution",
            23 => "CGX",
            24 => "CGXL",
            25 => "Astrofi",
            26 => "SkyWatcher",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_clamps() {
        assert_eq!(Rate::new(42), Rate::MAX);
        assert_eq!(Rate::MAX.increased(), Rate::MAX);
        assert_eq!(Rate::MIN.decreased(), Rate::MIN);
        assert_eq!(Rate::new(4).increased().value(), 5);
    }

    #[test]
    fn test_direction_axis_mapping() {
        assert_eq!(Direction::Up.motor(), Motor::Altitude);
        assert_eq!(Direction::Left.motor(), Motor::Azimuth);
        assert!(Direction::Right.is_positive());
        assert!(!Direction::Down.is_positive());
        assert_eq!(Axis::Both.motors().len(), 2);
        assert_eq!(Axis::from(Motor::Altitude), Axis::Alt);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("UP".parse::<Direction>().unwrap(), Direction::Up);
        assert_eq!("both".parse::<Axis>().unwrap(), Axis::Both);
        assert_eq!("eq-north".parse::<TrackingMode>().unwrap(), TrackingMode::EqNorth);
        assert!("sideways".parse::<Direction>().is_err());
        for mode in [TrackingMode::Off, TrackingMode::AltAz, TrackingMode::EqNorth, TrackingMode::EqSouth] {
            assert_eq!(TrackingMode::from_code(mode.code()), Some(mode));
            assert_eq!(mode.to_string().parse::<TrackingMode>().unwrap(), mode);
        }
    }
}
