// nexstar_rs: serial control of NexStar-protocol telescope mounts

pub mod communication;
pub mod config;
pub mod coordinates;
pub mod error;
pub mod monitor;
pub mod motion;
pub mod mount;
pub mod protocol;
pub mod simulator;

// --- Public API ---
pub use config::{load_config, Config, ConfigError};
pub use coordinates::{
    angular_separation, local_sidereal_time, to_equatorial, to_horizontal, EquatorialCoordinate,
    GeographicLocation, HorizontalCoordinate,
};
pub use error::{MountError, MountResult};
pub use monitor::{CancelPolicy, MonitorHandle, MonitorOutcome, PositionMonitor, PositionSample};
pub use motion::{AxisState, ConnectionProvider, MotionController, MotionState};
pub use mount::Mount;
pub use protocol::{Axis, Direction, Model, Motor, MountProtocol, Rate, TrackingMode, Version};
pub use simulator::SimulatedMount;
