//! Coordinate value types and angular math.
//!
//! All constructors validate their ranges; a value that exists is a valid
//! value. Frame conversions go through local sidereal time.

use crate::error::{MountError, MountResult};
use chrono::{DateTime, Utc};
use std::fmt;

/// Below this, cos(latitude-like angle) is treated as a pole.
const POLE_EPSILON: f64 = 1e-7;
const J2000_JD: f64 = 2_451_545.0;
const UNIX_EPOCH_JD: f64 = 2_440_587.5;

/// Sky position: right ascension in hours, declination in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquatorialCoordinate {
    ra_hours: f64,
    dec_degrees: f64,
}

impl EquatorialCoordinate {
    pub fn new(ra_hours: f64, dec_degrees: f64) -> MountResult<Self> {
        if !(0.0..24.0).contains(&ra_hours) {
            return Err(MountError::InvalidCoordinate(format!(
                "RA {} h outside [0, 24)",
                ra_hours
            )));
        }
        if !(-90.0..=90.0).contains(&dec_degrees) {
            return Err(MountError::InvalidCoordinate(format!(
                "Dec {}° outside [-90, 90]",
                dec_degrees
            )));
        }
        Ok(Self { ra_hours, dec_degrees })
    }

    /// Build from an RA given in degrees; RA wraps, Dec is still validated.
    pub fn from_degrees(ra_degrees: f64, dec_degrees: f64) -> MountResult<Self> {
        if !ra_degrees.is_finite() {
            return Err(MountError::InvalidCoordinate(format!("RA {}° is not finite", ra_degrees)));
        }
        Self::new(wrap(wrap(ra_degrees, 360.0) / 15.0, 24.0), dec_degrees)
    }

    pub fn ra_hours(&self) -> f64 {
        self.ra_hours
    }

    pub fn ra_degrees(&self) -> f64 {
        self.ra_hours * 15.0
    }

    pub fn dec_degrees(&self) -> f64 {
        self.dec_degrees
    }
}

/// Local horizon position: azimuth from north through east, altitude above the horizon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizontalCoordinate {
    azimuth_degrees: f64,
    altitude_degrees: f64,
}

impl HorizontalCoordinate {
    pub fn new(azimuth_degrees: f64, altitude_degrees: f64) -> MountResult<Self> {
        if !(0.0..360.0).contains(&azimuth_degrees) {
            return Err(MountError::InvalidCoordinate(format!(
                "Azimuth {}° outside [0, 360)",
                azimuth_degrees
            )));
        }
        if !(-90.0..=90.0).contains(&altitude_degrees) {
            return Err(MountError::InvalidCoordinate(format!(
                "Altitude {}° outside [-90, 90]",
                altitude_degrees
            )));
        }
        Ok(Self { azimuth_degrees, altitude_degrees })
    }

    pub fn azimuth_degrees(&self) -> f64 {
        self.azimuth_degrees
    }

    pub fn altitude_degrees(&self) -> f64 {
        self.altitude_degrees
    }
}

/// Observer position. Longitude is east-positive. Defaults to 0°N 0°E.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeographicLocation {
    latitude: f64,
    longitude: f64,
}

impl GeographicLocation {
    pub fn new(latitude: f64, longitude: f64) -> MountResult<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(MountError::InvalidCoordinate(format!(
                "Latitude {}° outside [-90, 90]",
                latitude
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(MountError::InvalidCoordinate(format!(
                "Longitude {}° outside [-180, 180]",
                longitude
            )));
        }
        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// A point on a sphere given as (longitude-like, latitude-like) degrees.
pub trait SphericalPoint {
    fn spherical_degrees(&self) -> (f64, f64);
}

impl SphericalPoint for EquatorialCoordinate {
    fn spherical_degrees(&self) -> (f64, f64) {
        (self.ra_degrees(), self.dec_degrees)
    }
}

impl SphericalPoint for HorizontalCoordinate {
    fn spherical_degrees(&self) -> (f64, f64) {
        (self.azimuth_degrees, self.altitude_degrees)
    }
}

/// Great-circle distance in degrees (spherical law of cosines).
pub fn angular_separation<P: SphericalPoint>(a: &P, b: &P) -> f64 {
    let (l1, b1) = a.spherical_degrees();
    let (l2, b2) = b.spherical_degrees();
    if l1 == l2 && b1 == b2 {
        return 0.0;
    }
    let (b1, b2) = (b1.to_radians(), b2.to_radians());
    let dl = (l1 - l2).abs().to_radians();
    let cos_d = b1.sin() * b2.sin() + b1.cos() * b2.cos() * dl.cos();
    cos_d.clamp(-1.0, 1.0).acos().to_degrees()
}

/// Wrap into [0, period). Guards the rounding case where rem_euclid returns `period`.
pub fn wrap(value: f64, period: f64) -> f64 {
    let w = value.rem_euclid(period);
    if w >= period { 0.0 } else { w }
}

fn julian_date(time: &DateTime<Utc>) -> f64 {
    let seconds = time.timestamp() as f64 + f64::from(time.timestamp_subsec_nanos()) * 1e-9;
    seconds / 86_400.0 + UNIX_EPOCH_JD
}

/// Greenwich mean sidereal time in degrees, IAU 1982 expression.
fn greenwich_sidereal_degrees(time: &DateTime<Utc>) -> f64 {
    let d = julian_date(time) - J2000_JD;
    let t = d / 36_525.0;
    let theta = 280.460_618_37 + 360.985_647_366_29 * d + 0.000_387_933 * t * t
        - t * t * t / 38_710_000.0;
    wrap(theta, 360.0)
}

/// Local sidereal time in hours, [0, 24).
pub fn local_sidereal_time(location: &GeographicLocation, time: &DateTime<Utc>) -> f64 {
    wrap(greenwich_sidereal_degrees(time) + location.longitude, 360.0) / 15.0
}

pub fn to_horizontal(
    equatorial: &EquatorialCoordinate,
    location: &GeographicLocation,
    time: &DateTime<Utc>,
) -> MountResult<HorizontalCoordinate> {
    let lst_degrees = local_sidereal_time(location, time) * 15.0;
    let hour_angle = (lst_degrees - equatorial.ra_degrees()).to_radians();
    let dec = equatorial.dec_degrees.to_radians();
    let lat = location.latitude.to_radians();

    let sin_alt = dec.sin() * lat.sin() + dec.cos() * lat.cos() * hour_angle.cos();
    let alt = sin_alt.clamp(-1.0, 1.0).asin();
    // Zenith and nadir have no azimuth.
    let azimuth = if alt.cos() < POLE_EPSILON {
        0.0
    } else {
        let y = -hour_angle.sin() * dec.cos();
        let x = dec.sin() * lat.cos() - dec.cos() * lat.sin() * hour_angle.cos();
        wrap(y.atan2(x).to_degrees(), 360.0)
    };
    HorizontalCoordinate::new(azimuth, alt.to_degrees().clamp(-90.0, 90.0))
}

pub fn to_equatorial(
    horizontal: &HorizontalCoordinate,
    location: &GeographicLocation,
    time: &DateTime<Utc>,
) -> MountResult<EquatorialCoordinate> {
    let az = horizontal.azimuth_degrees.to_radians();
    let alt = horizontal.altitude_degrees.to_radians();
    let lat = location.latitude.to_radians();

    let sin_dec = alt.sin() * lat.sin() + alt.cos() * lat.cos() * az.cos();
    let dec = sin_dec.clamp(-1.0, 1.0).asin();
    // RA is undefined at the celestial poles.
    let ra_degrees = if dec.cos() < POLE_EPSILON {
        0.0
    } else {
        let y = -az.sin() * alt.cos();
        let x = alt.sin() * lat.cos() - alt.cos() * lat.sin() * az.cos();
        let hour_angle = y.atan2(x).to_degrees();
        local_sidereal_time(location, time) * 15.0 - hour_angle
    };
    EquatorialCoordinate::from_degrees(ra_degrees, dec.to_degrees().clamp(-90.0, 90.0))
}

/// Split into (negative, whole, minutes, sub-minute steps), rounding once so carries propagate.
fn sexagesimal(value: f64, steps_per_second: u64) -> (bool, u64, u64, u64) {
    let per_minute = 60 * steps_per_second;
    let total = (value.abs() * 3600.0 * steps_per_second as f64).round() as u64;
    (value < 0.0, total / (60 * per_minute), (total / per_minute) % 60, total % per_minute)
}

fn sign(negative: bool) -> char {
    if negative { '-' } else { '+' }
}

impl fmt::Display for EquatorialCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (_, h, m, tenths) = sexagesimal(self.ra_hours, 10);
        let (neg, d, dm, ds) = sexagesimal(self.dec_degrees, 1);
        write!(
            f,
            "RA {:02}h{:02}m{:04.1}s Dec {}{:02}°{:02}'{:02}\"",
            h % 24,
            m,
            tenths as f64 / 10.0,
            sign(neg),
            d,
            dm,
            ds
        )
    }
}

impl fmt::Display for HorizontalCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (_, d, m, s) = sexagesimal(self.azimuth_degrees, 1);
        let (neg, ad, am, as_) = sexagesimal(self.altitude_degrees, 1);
        write!(
            f,
            "Az {:03}°{:02}'{:02}\" Alt {}{:02}°{:02}'{:02}\"",
            d % 360,
            m,
            s,
            sign(neg),
            ad,
            am,
            as_
        )
    }
}

impl fmt::Display for GeographicLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.4}°{} {:.4}°{}",
            self.latitude.abs(),
            if self.latitude < 0.0 { 'S' } else { 'N' },
            self.longitude.abs(),
            if self.longitude < 0.0 { 'W' } else { 'E' }
        )
    }
}
