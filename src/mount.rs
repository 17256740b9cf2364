// src/mount.rs - Facade used by front-ends: connection lifecycle plus every mount operation
use crate::communication::{DeviceHandle, Transport};
use crate::config::Config;
use crate::coordinates::{EquatorialCoordinate, GeographicLocation, HorizontalCoordinate};
use crate::error::{MountError, MountResult};
use crate::monitor::{CancelPolicy, GotoTarget, MonitorHandle, PositionMonitor};
use crate::motion::{ConnectionProvider, MotionController};
use crate::protocol::{Axis, Direction, Model, MountProtocol, Rate, TrackingMode, Version};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;

/// Holds the active link, if any. Shared with the controller and monitors.
#[derive(Debug, Default)]
pub struct LinkSlot {
    link: RwLock<Option<Arc<MountProtocol>>>,
}

impl LinkSlot {
    fn set(&self, link: Option<Arc<MountProtocol>>) -> Option<Arc<MountProtocol>> {
        let mut slot = self.link.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, link)
    }

    fn current(&self) -> Option<Arc<MountProtocol>> {
        self.link.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl ConnectionProvider for LinkSlot {
    fn connection(&self) -> MountResult<Arc<MountProtocol>> {
        self.current()
            .filter(|link| link.is_connected())
            .ok_or(MountError::NotConnected)
    }
}

pub struct Mount {
    slot: Arc<LinkSlot>,
    controller: MotionController,
    config: Config,
    /// Serializes connect and disconnect.
    lifecycle: Mutex<()>,
}

impl Mount {
    pub fn new(config: Config) -> Self {
        let slot = Arc::new(LinkSlot::default());
        let controller = MotionController::new(
            slot.clone(),
            config.motion.rate(),
            config.motion.step_pulse(),
        );
        Self {
            slot,
            controller,
            config,
            lifecycle: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn controller(&self) -> &MotionController {
        &self.controller
    }

    pub fn is_connected(&self) -> bool {
        self.slot.connection().is_ok()
    }

    pub async fn connect(&self, port: &str, baud: u32) -> MountResult<()> {
        let timeout = self.config.serial.timeout();
        self.install(|| DeviceHandle::connect(port, baud, timeout)).await
    }

    /// Connect using the `[serial]` section of the configuration.
    pub async fn connect_configured(&self) -> MountResult<()> {
        let serial = &self.config.serial;
        self.connect(&serial.port, serial.baud).await
    }

    pub async fn connect_with(&self, transport: Box<dyn Transport>) -> MountResult<()> {
        let timeout = self.config.serial.timeout();
        self.install(move || Ok(DeviceHandle::with_transport(transport, timeout))).await
    }

    async fn install(&self, open: impl FnOnce() -> MountResult<DeviceHandle>) -> MountResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_connected() {
            return Err(MountError::ConnectionFailure("already connected".to_string()));
        }
        let device = open()?;
        self.controller.reset().await;
        self.slot.set(Some(Arc::new(MountProtocol::new(device))));
        Ok(())
    }

    /// Stop anything this client set moving, then release the link. A no-op when not connected.
    pub async fn disconnect(&self) -> MountResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.slot.current().is_none() {
            return Ok(());
        }
        if self.controller.is_moving().await {
            if let Err(e) = self.controller.stop(Axis::Both).await {
                tracing::warn!("Stop before disconnect failed: {}", e);
            }
        }
        self.controller.reset().await;
        if let Some(link) = self.slot.set(None) {
            link.close().await;
        }
        Ok(())
    }

    fn link(&self) -> MountResult<Arc<MountProtocol>> {
        self.slot.connection()
    }

    fn observe<T>(&self, result: MountResult<T>) -> MountResult<T> {
        if let Err(e) = &result {
            if e.is_link_failure() {
                tracing::warn!("{}; the link may be out of step, consider reconnecting", e);
            }
        }
        result
    }

    pub async fn ping(&self) -> MountResult<()> {
        let result = self.link()?.ping().await;
        self.observe(result)
    }

    pub async fn get_version(&self) -> MountResult<Version> {
        let result = self.link()?.get_version().await;
        self.observe(result)
    }

    pub async fn get_model(&self) -> MountResult<Model> {
        let result = self.link()?.get_model().await;
        self.observe(result)
    }

    pub async fn get_position_ra_dec(&self) -> MountResult<EquatorialCoordinate> {
        let result = self.link()?.get_position_ra_dec().await;
        self.observe(result)
    }

    pub async fn get_position_alt_az(&self) -> MountResult<HorizontalCoordinate> {
        let result = self.link()?.get_position_alt_az().await;
        self.observe(result)
    }

    /// Validates before anything is sent. Returns true once the mount accepted the target.
    pub async fn goto_ra_dec(&self, ra_hours: f64, dec_degrees: f64) -> MountResult<bool> {
        let target = EquatorialCoordinate::new(ra_hours, dec_degrees)?;
        self.goto(&target).await
    }

    pub async fn goto(&self, target: &EquatorialCoordinate) -> MountResult<bool> {
        let result = self.link()?.goto_ra_dec(target).await;
        self.observe(result).map(|()| true)
    }

    /// Start a goto and watch it. Cancelling the returned handle applies `policy`.
    pub async fn monitor_goto(
        &self,
        target: &EquatorialCoordinate,
        policy: CancelPolicy,
    ) -> MountResult<MonitorHandle> {
        let start = self.get_position_ra_dec().await?;
        self.goto(target).await?;
        Ok(PositionMonitor::spawn(
            self.slot.clone(),
            &self.config.monitor,
            Some(GotoTarget { start, target: *target }),
            policy,
        ))
    }

    /// Poll position until cancelled.
    pub fn monitor(&self) -> MonitorHandle {
        PositionMonitor::spawn(
            self.slot.clone(),
            &self.config.monitor,
            None,
            CancelPolicy::KeepSlewing,
        )
    }

    pub async fn cancel_goto(&self) -> MountResult<()> {
        let result = self.link()?.cancel_goto().await;
        self.observe(result)
    }

    pub async fn is_slewing(&self) -> MountResult<bool> {
        let result = self.link()?.is_slewing().await;
        self.observe(result)
    }

    /// Continuous move. True once the mount is moving that way, including when
    /// it already was; `controller().start` tells the two apart.
    pub async fn move_fixed(&self, direction: Direction, rate: Option<Rate>) -> MountResult<bool> {
        let result = self.controller.start(direction, rate).await;
        self.observe(result).map(|_| true)
    }

    pub async fn move_step(&self, direction: Direction, rate: Option<Rate>) -> MountResult<bool> {
        let result = self.controller.step(direction, rate).await;
        self.observe(result).map(|()| true)
    }

    /// Move for `seconds`, then stop. True once the axis is stopped, whether by
    /// the timer or by an explicit stop that got there first.
    pub async fn move_for_time(
        &self,
        direction: Direction,
        seconds: f64,
        rate: Option<Rate>,
    ) -> MountResult<bool> {
        let duration = Duration::try_from_secs_f64(seconds)
            .map_err(|e| MountError::CommandError(format!("Move duration {}: {}", seconds, e)))?;
        let result = self.controller.move_for_duration(direction, duration, rate).await;
        self.observe(result).map(|_| true)
    }

    /// True once the axis is stopped. Stopping an idle axis succeeds too.
    pub async fn stop_motion(&self, axis: Axis) -> MountResult<bool> {
        let result = self.controller.stop(axis).await;
        self.observe(result).map(|_| true)
    }

    pub async fn is_moving(&self) -> bool {
        self.controller.is_moving().await
    }

    pub async fn direction(&self) -> Option<Direction> {
        self.controller.direction().await
    }

    pub async fn get_tracking_mode(&self) -> MountResult<TrackingMode> {
        let result = self.link()?.get_tracking_mode().await;
        self.observe(result)
    }

    pub async fn set_tracking_mode(&self, mode: TrackingMode) -> MountResult<()> {
        let result = self.link()?.set_tracking_mode(mode).await;
        self.observe(result)
    }

    pub async fn get_location(&self) -> MountResult<GeographicLocation> {
        let result = self.link()?.get_location().await;
        self.observe(result)
    }

    pub async fn set_location(&self, location: &GeographicLocation) -> MountResult<()> {
        let result = self.link()?.set_location(location).await;
        self.observe(result)
    }
}

impl std::fmt::Debug for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount")
            .field("link", &self.slot.current())
            .field("controller", &self.controller)
            .finish()
    }
}
