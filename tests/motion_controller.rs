// Integration tests for the motion controller state machine
mod common;

use common::connected_mount;
use nexstar_rs::{Axis, AxisState, Direction, Motor, MountError, Rate};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test]
async fn test_start_is_idempotent() {
    let (mount, sim) = connected_mount().await;
    let controller = mount.controller();

    assert!(controller.start(Direction::Up, Some(Rate::new(5))).await.unwrap());
    assert!(!controller.start(Direction::Up, Some(Rate::new(5))).await.unwrap());
    assert_eq!(sim.moves(), 1);

    // Same direction at another rate is still the move already running.
    assert!(!controller.start(Direction::Up, Some(Rate::new(8))).await.unwrap());
    assert_eq!(sim.moves(), 1);
}

#[tokio::test]
async fn test_reversing_sends_a_new_move() {
    let (mount, sim) = connected_mount().await;
    let controller = mount.controller();
    controller.start(Direction::Left, None).await.unwrap();
    controller.start(Direction::Right, None).await.unwrap();
    assert_eq!(sim.moves(), 2);
    assert_eq!(sim.motor(Motor::Azimuth), Some((true, 5)));
    assert_eq!(controller.direction().await, Some(Direction::Right));
}

#[tokio::test]
async fn test_stop_when_idle_is_safe() {
    let (mount, sim) = connected_mount().await;
    let controller = mount.controller();
    assert!(!controller.stop(Axis::Both).await.unwrap());
    assert!(!controller.stop(Axis::Alt).await.unwrap());
    assert!(!controller.is_moving().await);
    assert_eq!(sim.stops(), 3);
}

#[tokio::test]
async fn test_stop_one_axis_leaves_the_other_moving() {
    let (mount, _sim) = connected_mount().await;
    let controller = mount.controller();
    controller.start(Direction::Up, None).await.unwrap();
    controller.start(Direction::Left, None).await.unwrap();

    assert!(controller.stop(Axis::Az).await.unwrap());
    let state = controller.state().await;
    assert_eq!(state.axis(Motor::Azimuth), AxisState::Idle);
    assert_eq!(
        state.axis(Motor::Altitude),
        AxisState::Moving { direction: Direction::Up, rate: Rate::new(5) }
    );
    assert_eq!(controller.direction().await, Some(Direction::Up));
}

#[tokio::test]
async fn test_rate_changes_apply_to_next_start_only() {
    let (mount, sim) = connected_mount().await;
    let controller = mount.controller();
    controller.set_rate(Rate::new(8));
    controller.start(Direction::Down, None).await.unwrap();

    assert_eq!(controller.increase_rate(), Rate::MAX);
    assert_eq!(controller.increase_rate(), Rate::MAX);
    assert_eq!(sim.motor(Motor::Altitude), Some((false, 8)));

    controller.set_rate(Rate::MIN);
    assert_eq!(controller.decrease_rate(), Rate::MIN);

    controller.start(Direction::Right, Some(Rate::new(4))).await.unwrap();
    assert_eq!(sim.motor(Motor::Azimuth), Some((true, 4)));
}

#[tokio::test]
async fn test_start_at_rate_zero_leaves_axis_idle() {
    let (mount, sim) = connected_mount().await;
    let controller = mount.controller();
    controller.start(Direction::Up, Some(Rate::MIN)).await.unwrap();
    assert!(!controller.is_moving().await);
    assert_eq!(sim.stops(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_step_does_not_change_state() {
    let (mount, sim) = connected_mount().await;
    let controller = mount.controller();
    controller.step(Direction::Up, None).await.unwrap();
    assert!(!controller.is_moving().await);
    assert_eq!((sim.moves(), sim.stops()), (1, 1));
    assert_eq!(sim.motor(Motor::Altitude), None);
}

#[tokio::test(start_paused = true)]
async fn test_step_resumes_running_move() {
    let (mount, sim) = connected_mount().await;
    let controller = mount.controller();
    controller.start(Direction::Right, Some(Rate::new(3))).await.unwrap();
    controller.step(Direction::Left, Some(Rate::new(6))).await.unwrap();

    assert_eq!((sim.moves(), sim.stops()), (3, 1));
    assert_eq!(sim.motor(Motor::Azimuth), Some((true, 3)));
    assert_eq!(controller.direction().await, Some(Direction::Right));
}

#[tokio::test(start_paused = true)]
async fn test_timed_move_stops_after_duration() {
    let (mount, sim) = connected_mount().await;
    let controller = mount.controller();

    let started = Instant::now();
    let fired = controller
        .move_for_duration(Direction::Up, Duration::from_secs(1), Some(Rate::new(5)))
        .await
        .unwrap();

    assert!(fired);
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_millis(1050));
    assert_eq!((sim.moves(), sim.stops()), (1, 1));
    assert!(!controller.is_moving().await);
}

#[tokio::test(start_paused = true)]
async fn test_timed_move_racing_explicit_stop_sends_one_stop() {
    let (mount, sim) = connected_mount().await;
    let timed = {
        let controller = mount.controller().clone();
        tokio::spawn(async move {
            controller
                .move_for_duration(Direction::Up, Duration::from_secs(1), Some(Rate::new(5)))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(mount.controller().stop(Axis::Alt).await.unwrap());

    let fired = timed.await.unwrap().unwrap();
    assert!(!fired);
    assert_eq!((sim.moves(), sim.stops()), (1, 1));
    assert!(!mount.controller().is_moving().await);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_stop_after_timed_stop_sends_nothing() {
    let (mount, sim) = connected_mount().await;
    let timed = {
        let controller = mount.controller().clone();
        tokio::spawn(async move {
            controller
                .move_for_duration(Direction::Up, Duration::from_secs(1), Some(Rate::new(5)))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(!mount.controller().stop(Axis::Alt).await.unwrap());

    assert!(timed.await.unwrap().unwrap());
    assert_eq!((sim.moves(), sim.stops()), (1, 1));

    // A later start re-arms the explicit stop.
    mount.controller().start(Direction::Down, None).await.unwrap();
    assert!(mount.controller().stop(Axis::Alt).await.unwrap());
    assert_eq!(sim.stops(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timed_stop_fires_when_caller_is_dropped() {
    let (mount, sim) = connected_mount().await;
    let timed = {
        let controller = mount.controller().clone();
        tokio::spawn(async move {
            controller
                .move_for_duration(Direction::Left, Duration::from_secs(1), None)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    timed.abort();
    assert!(mount.controller().is_moving().await);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(sim.stops(), 1);
    assert_eq!(sim.motor(Motor::Azimuth), None);
    assert!(!mount.controller().is_moving().await);
}

#[tokio::test(start_paused = true)]
async fn test_timed_stop_skipped_after_newer_start() {
    let (mount, sim) = connected_mount().await;
    let timed = {
        let controller = mount.controller().clone();
        tokio::spawn(async move {
            controller
                .move_for_duration(Direction::Up, Duration::from_secs(1), None)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;
    mount.controller().start(Direction::Down, None).await.unwrap();

    assert!(!timed.await.unwrap().unwrap());
    assert_eq!(sim.stops(), 0);
    assert_eq!(mount.controller().direction().await, Some(Direction::Down));
}

#[tokio::test]
async fn test_failed_start_stops_everything_and_reports_idle() {
    let (mount, sim) = connected_mount().await;
    let controller = mount.controller();
    controller.start(Direction::Left, None).await.unwrap();

    sim.corrupt_next_reply();
    let err = controller.start(Direction::Up, None).await.unwrap_err();
    assert!(matches!(err, MountError::CommandError(_)));

    assert!(!controller.is_moving().await);
    assert_eq!(controller.direction().await, None);
    assert_eq!(sim.moves(), 2);
    assert_eq!(sim.stops(), 2);
    assert_eq!(sim.motor(Motor::Azimuth), None);
    assert_eq!(sim.motor(Motor::Altitude), None);
}

#[tokio::test(start_paused = true)]
async fn test_failed_defensive_stop_is_not_escalated() {
    let (mount, sim) = connected_mount().await;
    let controller = mount.controller();
    sim.set_silent(true);

    let err = controller.start(Direction::Right, None).await.unwrap_err();
    assert!(matches!(err, MountError::Timeout(_)));
    assert!(!controller.is_moving().await);
    // The move, then one stop attempt per motor.
    assert_eq!((sim.moves(), sim.stops()), (1, 2));
}

#[tokio::test]
async fn test_start_without_connection_sends_nothing() {
    let (mount, sim) = connected_mount().await;
    mount.disconnect().await.unwrap();
    sim.clear_log();

    let err = mount.controller().start(Direction::Up, None).await.unwrap_err();
    assert!(matches!(err, MountError::NotConnected));
    assert!(!mount.controller().is_moving().await);
    assert!(sim.frames().is_empty());
}
