// src/communication/mod.rs
pub mod device;
pub mod serial;

pub use device::{DeviceHandle, Session, TERMINATOR};
pub use serial::{PortLease, SerialTransport, Transport};
