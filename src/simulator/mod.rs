// src/simulator/mod.rs - In-process hand controller answering the serial command set
use crate::communication::{Transport, TERMINATOR};
use crate::coordinates::{to_horizontal, wrap, EquatorialCoordinate, GeographicLocation};
use crate::error::MountResult;
use crate::protocol::codec::{decode_location, decode_pair, encode_location, encode_pair, signed_degrees};
use crate::protocol::command::decode_passthrough;
use crate::protocol::{Model, Motor, TrackingMode, Version};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

/// Degrees per second for fixed rates 0..=9.
const RATE_TABLE: [f64; 10] = [0.0, 0.008, 0.017, 0.033, 0.067, 0.133, 0.5, 1.0, 2.0, 4.0];
const DEFAULT_SLEW_SPEED: f64 = 5.0;
/// Oldest frames are dropped past this many.
pub const FRAME_LOG_LIMIT: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Slew {
    from: [f64; 3],
    to: [f64; 3],
    started: Instant,
    seconds: f64,
}

#[derive(Debug)]
struct SimState {
    ra_degrees: f64,
    dec_degrees: f64,
    slew: Option<Slew>,
    /// Per motor: (positive, rate). Azimuth drives RA, altitude drives Dec.
    motors: [Option<(bool, u8)>; 2],
    updated: Instant,
    slew_speed: f64,
    tracking: TrackingMode,
    location: GeographicLocation,
    version: Version,
    model: Model,
    silent: bool,
    corrupt_next: bool,
    frames: VecDeque<Vec<u8>>,
    pending: Vec<u8>,
}

impl SimState {
    fn advance(&mut self, now: Instant) {
        let dt = now.saturating_duration_since(self.updated).as_secs_f64();
        self.updated = now;
        if let Some(slew) = self.slew {
            let t = now.saturating_duration_since(slew.started).as_secs_f64() / slew.seconds;
            let (ra, dec) = if t >= 1.0 {
                self.slew = None;
                from_vector(slew.to)
            } else {
                from_vector(slerp(slew.from, slew.to, t))
            };
            self.ra_degrees = ra;
            self.dec_degrees = dec;
        }
        for (index, motor) in self.motors.iter().enumerate() {
            if let Some((positive, rate)) = motor {
                let delta = RATE_TABLE[usize::from(*rate).min(9)] * dt * if *positive { 1.0 } else { -1.0 };
                if index == 0 {
                    self.ra_degrees = wrap(self.ra_degrees + delta, 360.0);
                } else {
                    self.dec_degrees = (self.dec_degrees + delta).clamp(-90.0, 90.0);
                }
            }
        }
    }

    fn equatorial(&self) -> MountResult<EquatorialCoordinate> {
        EquatorialCoordinate::from_degrees(self.ra_degrees, self.dec_degrees)
    }

    /// Reply payload for `frame`, or `None` for frames a controller ignores.
    fn respond(&mut self, frame: &[u8]) -> MountResult<Option<Vec<u8>>> {
        let reply = match frame {
            [b'K', probe] => vec![*probe],
            [b'V'] => vec![self.version.major, self.version.minor],
            [b'm'] => vec![self.model.0],
            [b'e'] => encode_pair(self.ra_degrees, self.dec_degrees).into_bytes(),
            [b'z'] => {
                let now = chrono::Utc::now();
                let horizontal = to_horizontal(&self.equatorial()?, &self.location, &now)?;
                encode_pair(horizontal.azimuth_degrees(), horizontal.altitude_degrees()).into_bytes()
            }
            [b'r', rest @ ..] => {
                let (ra, dec) = decode_pair(rest)?;
                self.start_slew(ra, signed_degrees(dec));
                vec![]
            }
            [b't'] => vec![self.tracking.code()],
            [b'T', code] => match TrackingMode::from_code(*code) {
                Some(mode) => {
                    self.tracking = mode;
                    vec![]
                }
                None => return Ok(None),
            },
            [b'w'] => encode_location(&self.location).to_vec(),
            [b'W', rest @ ..] => {
                self.location = decode_location(rest)?;
                vec![]
            }
            [b'L'] => vec![if self.slew.is_some() { b'1' } else { b'0' }],
            [b'M'] => {
                self.slew = None;
                vec![]
            }
            [b'P', ..] => match decode_passthrough(frame) {
                Some((motor, positive, rate)) => {
                    let slot = &mut self.motors[motor_index(motor)];
                    *slot = if rate == 0 { None } else { Some((positive, rate)) };
                    vec![]
                }
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
        Ok(Some(reply))
    }

    fn start_slew(&mut self, ra_degrees: f64, dec_degrees: f64) {
        let from = to_vector(self.ra_degrees, self.dec_degrees);
        let to = to_vector(ra_degrees, dec_degrees);
        let distance = dot(from, to).clamp(-1.0, 1.0).acos().to_degrees();
        if distance < 1e-9 {
            self.slew = None;
            return;
        }
        self.slew = Some(Slew {
            from,
            to,
            started: self.updated,
            seconds: distance / self.slew_speed,
        });
    }
}

fn motor_index(motor: Motor) -> usize {
    match motor {
        Motor::Azimuth => 0,
        Motor::Altitude => 1,
    }
}

fn to_vector(ra_degrees: f64, dec_degrees: f64) -> [f64; 3] {
    let (ra, dec) = (ra_degrees.to_radians(), dec_degrees.to_radians());
    [dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin()]
}

fn from_vector(v: [f64; 3]) -> (f64, f64) {
    let dec = v[2].clamp(-1.0, 1.0).asin().to_degrees();
    let ra = if v[0].abs() < 1e-12 && v[1].abs() < 1e-12 {
        0.0
    } else {
        wrap(v[1].atan2(v[0]).to_degrees(), 360.0)
    };
    (ra, dec)
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Constant-speed interpolation along the great circle from `a` to `b`.
fn slerp(a: [f64; 3], b: [f64; 3], t: f64) -> [f64; 3] {
    let omega = dot(a, b).clamp(-1.0, 1.0).acos();
    if omega.sin().abs() < 1e-9 {
        return if t < 0.5 { a } else { b };
    }
    let wa = ((1.0 - t) * omega).sin() / omega.sin();
    let wb = (t * omega).sin() / omega.sin();
    [wa * a[0] + wb * b[0], wa * a[1] + wb * b[1], wa * a[2] + wb * b[2]]
}

/// A simulated mount. Clones share one controller: hand one to a
/// `DeviceHandle` as its transport and keep another to inspect traffic.
#[derive(Debug, Clone)]
pub struct SimulatedMount {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedMount {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedMount {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                ra_degrees: 0.0,
                dec_degrees: 0.0,
                slew: None,
                motors: [None, None],
                updated: Instant::now(),
                slew_speed: DEFAULT_SLEW_SPEED,
                tracking: TrackingMode::Off,
                location: GeographicLocation::default(),
                version: Version { major: 4, minor: 21 },
                model: Model(12),
                silent: false,
                corrupt_next: false,
                frames: VecDeque::with_capacity(FRAME_LOG_LIMIT),
                pending: Vec::new(),
            })),
        }
    }

    /// Goto speed in degrees per second.
    pub fn with_slew_speed(self, degrees_per_second: f64) -> Self {
        self.lock().slew_speed = degrees_per_second.max(f64::EPSILON);
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop answering; every exchange from now on times out.
    pub fn set_silent(&self, silent: bool) {
        self.lock().silent = silent;
    }

    /// Send the next reply with a bad terminator.
    pub fn corrupt_next_reply(&self) {
        self.lock().corrupt_next = true;
    }

    pub fn set_position(&self, position: &EquatorialCoordinate) {
        let mut state = self.lock();
        state.advance(Instant::now());
        state.ra_degrees = position.ra_degrees();
        state.dec_degrees = position.dec_degrees();
        state.slew = None;
    }

    pub fn position(&self) -> MountResult<EquatorialCoordinate> {
        let mut state = self.lock();
        state.advance(Instant::now());
        state.equatorial()
    }

    pub fn is_slewing(&self) -> bool {
        let mut state = self.lock();
        state.advance(Instant::now());
        state.slew.is_some()
    }

    /// (positive, rate) of a running fixed-rate move.
    pub fn motor(&self, motor: Motor) -> Option<(bool, u8)> {
        self.lock().motors[motor_index(motor)]
    }

    pub fn tracking_mode(&self) -> TrackingMode {
        self.lock().tracking
    }

    /// The most recent frames received (at most `FRAME_LOG_LIMIT`), oldest first.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.lock().frames.iter().cloned().collect()
    }

    /// Fixed-rate moves with a non-zero rate.
    pub fn moves(&self) -> usize {
        self.count_passthrough(|rate| rate > 0)
    }

    /// Fixed-rate moves with rate 0.
    pub fn stops(&self) -> usize {
        self.count_passthrough(|rate| rate == 0)
    }

    fn count_passthrough(&self, pred: impl Fn(u8) -> bool) -> usize {
        self.lock()
            .frames
            .iter()
            .filter_map(|frame| decode_passthrough(frame))
            .filter(|(_, _, rate)| pred(*rate))
            .count()
    }

    pub fn clear_log(&self) {
        self.lock().frames.clear();
    }
}

#[async_trait]
impl Transport for SimulatedMount {
    async fn send(&mut self, frame: &[u8]) -> MountResult<()> {
        let mut state = self.lock();
        state.advance(Instant::now());
        if state.frames.len() == FRAME_LOG_LIMIT {
            state.frames.pop_front();
        }
        state.frames.push_back(frame.to_vec());
        if state.silent {
            return Ok(());
        }
        let mut reply = match state.respond(frame) {
            Ok(Some(reply)) => reply,
            Ok(None) | Err(_) => {
                tracing::debug!("Simulator ignoring {}", frame.escape_ascii());
                return Ok(());
            }
        };
        reply.push(if std::mem::take(&mut state.corrupt_next) { b'!' } else { TERMINATOR });
        state.pending.extend_from_slice(&reply);
        Ok(())
    }

    async fn receive(&mut self, len: usize) -> MountResult<Vec<u8>> {
        let ready = {
            let mut state = self.lock();
            if state.pending.len() >= len {
                Some(state.pending.drain(..len).collect::<Vec<u8>>())
            } else {
                None
            }
        };
        match ready {
            Some(reply) => Ok(reply),
            // Like a controller that never answers; the caller's timeout ends the wait.
            None => std::future::pending().await,
        }
    }

    async fn discard_input(&mut self) -> MountResult<()> {
        self.lock().pending.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        "simulated mount".to_string()
    }
}
