// src/motion/mod.rs - Client-side motion control
pub mod controller;
pub mod state;

pub use controller::{ConnectionProvider, MotionController};
pub use state::{AxisState, MotionState};

pub use crate::protocol::{Axis, Direction, Motor, Rate};
