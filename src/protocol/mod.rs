//! Typed operations over the hand controller's serial command set.
//!
//! `MountProtocol` owns the `DeviceHandle`; each operation is one exchange,
//! except the step pulse and multi-axis stops, which hold a single session
//! so nothing can slip in between their frames.

pub mod codec;
pub mod command;
pub mod types;

pub use codec::PRECISE_RESOLUTION_DEGREES;
pub use command::{Command, Response};
pub use types::{Axis, Direction, Model, Motor, Rate, TrackingMode, Version};

use crate::communication::{DeviceHandle, Session};
use crate::coordinates::{EquatorialCoordinate, GeographicLocation, HorizontalCoordinate};
use crate::error::{MountError, MountResult};
use std::time::Duration;

const ECHO_PROBE: u8 = b'x';

#[derive(Debug)]
pub struct MountProtocol {
    device: DeviceHandle,
}

impl MountProtocol {
    pub fn new(device: DeviceHandle) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    pub fn is_connected(&self) -> bool {
        self.device.is_connected()
    }

    pub async fn execute(&self, command: Command) -> MountResult<Response> {
        let mut session = self.device.session().await?;
        run(&mut session, &command).await
    }

    /// Round-trip a probe byte; confirms the controller is answering.
    pub async fn ping(&self) -> MountResult<()> {
        match self.execute(Command::Echo(ECHO_PROBE)).await? {
            Response::Echo(_) => Ok(()),
            other => Err(mismatch("Echo", other)),
        }
    }

    pub async fn get_version(&self) -> MountResult<Version> {
        match self.execute(Command::GetVersion).await? {
            Response::Version(version) => Ok(version),
            other => Err(mismatch("GetVersion", other)),
        }
    }

    pub async fn get_model(&self) -> MountResult<Model> {
        match self.execute(Command::GetModel).await? {
            Response::Model(model) => Ok(model),
            other => Err(mismatch("GetModel", other)),
        }
    }

    pub async fn get_position_ra_dec(&self) -> MountResult<EquatorialCoordinate> {
        match self.execute(Command::GetPositionRaDec).await? {
            Response::Equatorial(position) => Ok(position),
            other => Err(mismatch("GetPositionRaDec", other)),
        }
    }

    pub async fn get_position_alt_az(&self) -> MountResult<HorizontalCoordinate> {
        match self.execute(Command::GetPositionAltAz).await? {
            Response::Horizontal(position) => Ok(position),
            other => Err(mismatch("GetPositionAltAz", other)),
        }
    }

    pub async fn goto_ra_dec(&self, target: &EquatorialCoordinate) -> MountResult<()> {
        tracing::info!("Goto {}", target);
        self.acknowledge(Command::GotoRaDec(*target)).await
    }

    pub async fn get_tracking_mode(&self) -> MountResult<TrackingMode> {
        match self.execute(Command::GetTrackingMode).await? {
            Response::Tracking(mode) => Ok(mode),
            other => Err(mismatch("GetTrackingMode", other)),
        }
    }

    pub async fn set_tracking_mode(&self, mode: TrackingMode) -> MountResult<()> {
        self.acknowledge(Command::SetTrackingMode(mode)).await
    }

    pub async fn get_location(&self) -> MountResult<GeographicLocation> {
        match self.execute(Command::GetLocation).await? {
            Response::Location(location) => Ok(location),
            other => Err(mismatch("GetLocation", other)),
        }
    }

    pub async fn set_location(&self, location: &GeographicLocation) -> MountResult<()> {
        self.acknowledge(Command::SetLocation(*location)).await
    }

    pub async fn move_fixed(&self, direction: Direction, rate: Rate) -> MountResult<()> {
        self.acknowledge(Command::Move { direction, rate }).await
    }

    /// Drive one motor for `pulse`, then stop it, without releasing the link in between.
    pub async fn move_step(&self, direction: Direction, rate: Rate, pulse: Duration) -> MountResult<()> {
        let mut session = self.device.session().await?;
        run(&mut session, &Command::Move { direction, rate }).await?;
        session.pause(pulse).await?;
        run(&mut session, &Command::StopMotor(direction.motor())).await?;
        Ok(())
    }

    /// Stop every motor of `axis`. All motors are attempted; the first failure is returned.
    pub async fn stop_motion(&self, axis: Axis) -> MountResult<()> {
        let mut session = self.device.session().await?;
        let mut first_error = None;
        for motor in axis.motors() {
            if let Err(e) = run(&mut session, &Command::StopMotor(*motor)).await {
                tracing::warn!("Stopping {:?} failed: {}", motor, e);
                if matches!(e, MountError::NotConnected) {
                    return Err(e);
                }
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub async fn is_slewing(&self) -> MountResult<bool> {
        match self.execute(Command::IsSlewing).await? {
            Response::Slewing(slewing) => Ok(slewing),
            other => Err(mismatch("IsSlewing", other)),
        }
    }

    pub async fn cancel_goto(&self) -> MountResult<()> {
        self.acknowledge(Command::CancelGoto).await
    }

    pub async fn close(&self) {
        self.device.close().await;
    }

    async fn acknowledge(&self, command: Command) -> MountResult<()> {
        let name = command.name();
        match self.execute(command).await? {
            Response::Ack => Ok(()),
            other => Err(mismatch(name, other)),
        }
    }
}

async fn run(session: &mut Session<'_>, command: &Command) -> MountResult<Response> {
    let payload = session
        .exchange(&command.encode(), command.reply_len())
        .await
        .map_err(|e| match e {
            MountError::MalformedResponse(detail) => {
                MountError::CommandError(format!("{}: {}", command.name(), detail))
            }
            other => other,
        })?;
    command.parse_reply(&payload)
}

fn mismatch(command: &str, response: Response) -> MountError {
    MountError::CommandError(format!("{}: unexpected response {:?}", command, response))
}
