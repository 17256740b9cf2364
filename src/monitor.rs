//! Background position polling and goto progress.
//!
//! A [`PositionMonitor`] task queries the mount at a fixed interval and
//! publishes each [`PositionSample`] into a single-slot `watch` channel.
//! Readers take the latest sample without blocking the poller; a sample that
//! nobody read is simply replaced.

use crate::config::MonitorSettings;
use crate::coordinates::{angular_separation, EquatorialCoordinate};
use crate::error::{MountError, MountResult};
use crate::motion::ConnectionProvider;
use crate::protocol::PRECISE_RESOLUTION_DEGREES;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GotoTarget {
    pub start: EquatorialCoordinate,
    pub target: EquatorialCoordinate,
}

/// What cancelling a goto monitor does to the slew itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelPolicy {
    /// Send CancelGoto so the mount halts.
    #[default]
    AbortGoto,
    /// Stop watching only; the mount keeps slewing.
    KeepSlewing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionSample {
    pub position: EquatorialCoordinate,
    pub slewing: bool,
    /// Percent of the goto covered; `None` when not watching a goto.
    pub progress: Option<f64>,
    pub taken_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The mount reported the goto finished.
    Completed,
    Cancelled,
}

/// Share of the way from `start` to `target` that `current` has covered, in [0, 100].
pub fn progress_percent(
    start: &EquatorialCoordinate,
    current: &EquatorialCoordinate,
    target: &EquatorialCoordinate,
) -> f64 {
    let total = angular_separation(start, target);
    if total <= PRECISE_RESOLUTION_DEGREES {
        return 100.0;
    }
    (angular_separation(start, current) / total * 100.0).clamp(0.0, 100.0)
}

pub struct PositionMonitor {
    provider: Arc<dyn ConnectionProvider>,
    interval: Duration,
    max_failures: u32,
    goto: Option<GotoTarget>,
    policy: CancelPolicy,
}

impl PositionMonitor {
    /// Start polling. With a goto target the task ends by itself once the
    /// mount stops slewing; without one it runs until cancelled.
    pub fn spawn(
        provider: Arc<dyn ConnectionProvider>,
        settings: &MonitorSettings,
        goto: Option<GotoTarget>,
        policy: CancelPolicy,
    ) -> MonitorHandle {
        let monitor = PositionMonitor {
            provider,
            interval: settings.poll_interval(),
            max_failures: settings.max_consecutive_failures.max(1),
            goto,
            policy,
        };
        let (sample_tx, sample_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(monitor.run(sample_tx, shutdown_rx));
        MonitorHandle {
            samples: sample_rx,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    async fn run(
        self,
        samples: watch::Sender<Option<PositionSample>>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> MountResult<MonitorOutcome> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = 0;
        tracing::debug!("Position monitor polling every {:?}", self.interval);

        loop {
            let polled = tokio::select! {
                biased;
                _ = &mut shutdown => return Ok(self.cancelled().await),
                polled = async {
                    ticker.tick().await;
                    self.poll().await
                } => polled,
            };

            match polled {
                Ok(sample) => {
                    failures = 0;
                    let finished = self.goto.is_some() && !sample.slewing;
                    samples.send_replace(Some(sample));
                    if finished {
                        tracing::info!("Goto complete");
                        return Ok(MonitorOutcome::Completed);
                    }
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!("Position poll failed ({}/{}): {}", failures, self.max_failures, e);
                    if failures >= self.max_failures {
                        return Err(e);
                    }
                }
            }
        }
    }

    async fn poll(&self) -> MountResult<PositionSample> {
        let link = self.provider.connection()?;
        let position = link.get_position_ra_dec().await?;
        let slewing = link.is_slewing().await?;
        let progress = self.goto.map(|goto| {
            if slewing {
                progress_percent(&goto.start, &position, &goto.target)
            } else {
                100.0
            }
        });
        Ok(PositionSample {
            position,
            slewing,
            progress,
            taken_at: Instant::now(),
        })
    }

    async fn cancelled(&self) -> MonitorOutcome {
        if self.goto.is_some() && self.policy == CancelPolicy::AbortGoto {
            let result = match self.provider.connection() {
                Ok(link) => link.cancel_goto().await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => tracing::info!("Goto cancelled"),
                Err(e) => tracing::warn!("Could not cancel goto: {}", e),
            }
        }
        MonitorOutcome::Cancelled
    }
}

/// Owner's end of a running [`PositionMonitor`].
#[derive(Debug)]
pub struct MonitorHandle {
    samples: watch::Receiver<Option<PositionSample>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<MountResult<MonitorOutcome>>,
}

impl MonitorHandle {
    pub fn latest(&self) -> Option<PositionSample> {
        self.samples.borrow().clone()
    }

    /// Wait for a sample newer than the last one seen here. `None` once the task has ended.
    pub async fn changed(&mut self) -> Option<PositionSample> {
        self.samples.changed().await.ok()?;
        self.samples.borrow_and_update().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PositionSample>> {
        self.samples.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the task to stop. No further queries are started after this.
    pub fn cancel(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }

    pub async fn join(self) -> MountResult<MonitorOutcome> {
        self.task
            .await
            .map_err(|e| MountError::TaskFailed(e.to_string()))?
    }

    pub async fn cancel_and_join(mut self) -> MountResult<MonitorOutcome> {
        self.cancel();
        self.join().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bounds() {
        let start = EquatorialCoordinate::new(10.0, 20.0).unwrap();
        let target = EquatorialCoordinate::new(12.0, 20.0).unwrap();
        assert_eq!(progress_percent(&start, &start, &target), 0.0);
        assert!((progress_percent(&start, &target, &target) - 100.0).abs() < 1e-9);
        let beyond = EquatorialCoordinate::new(13.0, 20.0).unwrap();
        assert_eq!(progress_percent(&start, &beyond, &target), 100.0);
        let midway = progress_percent(&start, &EquatorialCoordinate::new(11.0, 20.5).unwrap(), &target);
        assert!(midway > 40.0 && midway < 60.0, "{}", midway);
    }

    #[test]
    fn test_progress_for_zero_length_goto() {
        let here = EquatorialCoordinate::new(5.5, -12.0).unwrap();
        assert_eq!(progress_percent(&here, &here, &here), 100.0);
    }
}
