// src/motion/controller.rs - Continuous, step and timed movement on top of the protocol
use super::state::{AxisState, MotionState};
use crate::error::{MountError, MountResult};
use crate::protocol::{Axis, Direction, Motor, MountProtocol, Rate};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Hands out the currently active link. Fails `NotConnected` when there is none.
pub trait ConnectionProvider: Send + Sync {
    fn connection(&self) -> MountResult<Arc<MountProtocol>>;
}

struct ControllerInner {
    provider: Arc<dyn ConnectionProvider>,
    /// Held across each movement exchange so state and wire never disagree.
    state: Mutex<MotionState>,
    rate: AtomicU8,
    step_pulse: Duration,
}

/// Tracks what the motors were told to do. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MotionController {
    inner: Arc<ControllerInner>,
}

impl MotionController {
    pub fn new(provider: Arc<dyn ConnectionProvider>, rate: Rate, step_pulse: Duration) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                provider,
                state: Mutex::new(MotionState::default()),
                rate: AtomicU8::new(rate.value()),
                step_pulse,
            }),
        }
    }

    /// Rate used by the next start that does not name one.
    pub fn rate(&self) -> Rate {
        Rate::new(self.inner.rate.load(Ordering::SeqCst))
    }

    pub fn set_rate(&self, rate: Rate) {
        self.inner.rate.store(rate.value(), Ordering::SeqCst);
    }

    pub fn increase_rate(&self) -> Rate {
        self.update_rate(Rate::increased)
    }

    pub fn decrease_rate(&self) -> Rate {
        self.update_rate(Rate::decreased)
    }

    fn update_rate(&self, f: fn(Rate) -> Rate) -> Rate {
        let previous = self
            .inner
            .rate
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some(f(Rate::new(v)).value()))
            .unwrap_or_else(|v| v);
        let rate = f(Rate::new(previous));
        tracing::debug!("Slew rate now {}", rate);
        rate
    }

    pub fn step_pulse(&self) -> Duration {
        self.inner.step_pulse
    }

    pub async fn state(&self) -> MotionState {
        self.inner.state.lock().await.clone()
    }

    pub async fn is_moving(&self) -> bool {
        self.inner.state.lock().await.is_moving()
    }

    pub async fn direction(&self) -> Option<Direction> {
        self.inner.state.lock().await.direction()
    }

    /// Begin a continuous move. Returns false when that direction was already running.
    pub async fn start(&self, direction: Direction, rate: Option<Rate>) -> MountResult<bool> {
        let mut state = self.inner.state.lock().await;
        Ok(self.start_locked(&mut state, direction, rate).await?.is_some())
    }

    /// Returns the generation of the move now running on the direction's motor,
    /// or `None` if nothing new was sent.
    async fn start_locked(
        &self,
        state: &mut MotionState,
        direction: Direction,
        rate: Option<Rate>,
    ) -> MountResult<Option<u64>> {
        let motor = direction.motor();
        if let AxisState::Moving { direction: current, .. } = state.axis(motor) {
            if current == direction {
                tracing::debug!("{} already moving {}", Axis::from(motor), direction);
                return Ok(None);
            }
        }
        let rate = rate.unwrap_or_else(|| self.rate());
        let result = match self.inner.provider.connection() {
            Ok(link) => link.move_fixed(direction, rate).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            return Err(self.fail_safe(state, "start", e).await);
        }
        if rate == Rate::MIN {
            state.set_halted(motor);
            return Ok(Some(state.generation_of(motor)));
        }
        tracing::info!("Moving {} at rate {}", direction, rate);
        Ok(Some(state.set_moving(direction, rate)))
    }

    /// One short pulse. A continuous move already running on that motor is resumed afterwards.
    pub async fn step(&self, direction: Direction, rate: Option<Rate>) -> MountResult<()> {
        let rate = rate.unwrap_or_else(|| self.rate());
        let mut state = self.inner.state.lock().await;
        let resume = state.axis(direction.motor());
        let result = match self.inner.provider.connection() {
            Ok(link) => {
                let mut result = link.move_step(direction, rate, self.inner.step_pulse).await;
                if result.is_ok() {
                    if let AxisState::Moving { direction, rate } = resume {
                        result = link.move_fixed(direction, rate).await;
                    }
                }
                result
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail_safe(&mut state, "step", e).await),
        }
    }

    /// Stop the named motors and return whether any of them was moving.
    /// Sends unless the timer of a timed move already stopped them.
    pub async fn stop(&self, axis: Axis) -> MountResult<bool> {
        let mut state = self.inner.state.lock().await;
        if state.stopped_by_timer(axis) {
            tracing::debug!("{} already stopped by its timer", axis);
            return Ok(false);
        }
        self.stop_locked(&mut state, axis).await
    }

    async fn stop_locked(&self, state: &mut MotionState, axis: Axis) -> MountResult<bool> {
        let was_moving = state.is_axis_moving(axis);
        let result = match self.inner.provider.connection() {
            Ok(link) => link.stop_motion(axis).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            return Err(self.fail_safe(state, "stop", e).await);
        }
        state.set_idle(axis);
        if was_moving {
            tracing::info!("Stopped {}", axis);
        }
        Ok(was_moving)
    }

    /// `start` plus a stop after `duration`. The stop runs on its own task and
    /// fires even if this future is dropped; it is skipped if the motor was
    /// stopped or restarted in the meantime. Returns whether the timed stop was sent.
    pub async fn move_for_duration(
        &self,
        direction: Direction,
        duration: Duration,
        rate: Option<Rate>,
    ) -> MountResult<bool> {
        let motor = direction.motor();
        let generation = {
            let mut state = self.inner.state.lock().await;
            match self.start_locked(&mut state, direction, rate).await? {
                Some(generation) => generation,
                None => state.generation_of(motor),
            }
        };
        let controller = self.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            controller.stop_if_current(motor, generation).await
        });
        timer.await.map_err(|e| MountError::TaskFailed(e.to_string()))?
    }

    async fn stop_if_current(&self, motor: Motor, generation: u64) -> MountResult<bool> {
        let mut state = self.inner.state.lock().await;
        if !state.axis(motor).is_moving() || state.generation_of(motor) != generation {
            tracing::debug!("Timed move on {:?} already ended", motor);
            return Ok(false);
        }
        let stopped = self.stop_locked(&mut state, motor.into()).await?;
        state.mark_timed_stop(motor);
        Ok(stopped)
    }

    /// Forget all tracked motion without touching the hardware.
    pub async fn reset(&self) {
        self.inner.state.lock().await.reset();
    }

    /// After a failed movement command: one best-effort stop of everything,
    /// then report Idle. Returns the original error.
    async fn fail_safe(&self, state: &mut MotionState, operation: &str, error: MountError) -> MountError {
        tracing::warn!("{} failed: {}; stopping all motors", operation, error);
        match self.inner.provider.connection() {
            Ok(link) => {
                if let Err(e) = link.stop_motion(Axis::Both).await {
                    tracing::warn!("Defensive stop failed: {}", e);
                }
            }
            Err(e) => tracing::warn!("Defensive stop skipped: {}", e),
        }
        state.reset();
        error
    }
}

impl std::fmt::Debug for MotionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionController")
            .field("rate", &self.rate())
            .field("step_pulse", &self.inner.step_pulse)
            .finish()
    }
}
