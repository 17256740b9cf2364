// src/motion/state.rs - Client-side record of what each motor was told to do
use crate::protocol::{Axis, Direction, Motor, Rate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisState {
    #[default]
    Idle,
    Moving { direction: Direction, rate: Rate },
}

impl AxisState {
    pub fn is_moving(&self) -> bool {
        matches!(self, AxisState::Moving { .. })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    state: AxisState,
    /// Which start put this motor into its current move.
    generation: u64,
    /// Idled by the timer of a timed move, with no start since.
    timed_stop: bool,
}

/// Only `MotionController` can change this; everyone else gets copies.
#[derive(Debug, Clone, Default)]
pub struct MotionState {
    azimuth: Slot,
    altitude: Slot,
    last_started: Option<Direction>,
    generation: u64,
}

impl MotionState {
    pub fn axis(&self, motor: Motor) -> AxisState {
        self.slot(motor).state
    }

    pub fn is_moving(&self) -> bool {
        self.azimuth.state.is_moving() || self.altitude.state.is_moving()
    }

    pub fn is_axis_moving(&self, axis: Axis) -> bool {
        axis.motors().iter().any(|m| self.axis(*m).is_moving())
    }

    /// Direction of the most recently started move still running, else of any running move.
    pub fn direction(&self) -> Option<Direction> {
        if let Some(last) = self.last_started {
            if matches!(self.axis(last.motor()), AxisState::Moving { direction, .. } if direction == last) {
                return Some(last);
            }
        }
        Motor::ALL.iter().find_map(|m| match self.axis(*m) {
            AxisState::Moving { direction, .. } => Some(direction),
            AxisState::Idle => None,
        })
    }

    pub(super) fn generation_of(&self, motor: Motor) -> u64 {
        self.slot(motor).generation
    }

    pub(super) fn set_moving(&mut self, direction: Direction, rate: Rate) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        let slot = self.slot_mut(direction.motor());
        slot.state = AxisState::Moving { direction, rate };
        slot.generation = generation;
        slot.timed_stop = false;
        self.last_started = Some(direction);
        generation
    }

    pub(super) fn set_idle(&mut self, axis: Axis) {
        for motor in axis.motors() {
            self.slot_mut(*motor).state = AxisState::Idle;
        }
    }

    /// A start at rate 0: the motor was told to stop by a fresh command.
    pub(super) fn set_halted(&mut self, motor: Motor) {
        let slot = self.slot_mut(motor);
        slot.state = AxisState::Idle;
        slot.timed_stop = false;
    }

    pub(super) fn mark_timed_stop(&mut self, motor: Motor) {
        self.slot_mut(motor).timed_stop = true;
    }

    /// Every motor of `axis` was last idled by its timer.
    pub(super) fn stopped_by_timer(&self, axis: Axis) -> bool {
        axis.motors().iter().all(|m| {
            let slot = self.slot(*m);
            slot.timed_stop && !slot.state.is_moving()
        })
    }

    pub(super) fn reset(&mut self) {
        self.set_idle(Axis::Both);
        self.azimuth.timed_stop = false;
        self.altitude.timed_stop = false;
        self.last_started = None;
    }

    fn slot(&self, motor: Motor) -> &Slot {
        match motor {
            Motor::Azimuth => &self.azimuth,
            Motor::Altitude => &self.altitude,
        }
    }

    fn slot_mut(&mut self, motor: Motor) -> &mut Slot {
        match motor {
            Motor::Azimuth => &mut self.azimuth,
            Motor::Altitude => &mut self.altitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_prefers_latest_running_move() {
        let mut state = MotionState::default();
        assert_eq!(state.direction(), None);
        state.set_moving(Direction::Up, Rate::new(3));
        state.set_moving(Direction::Left, Rate::new(3));
        assert_eq!(state.direction(), Some(Direction::Left));
        state.set_idle(Axis::Az);
        assert_eq!(state.direction(), Some(Direction::Up));
        assert!(state.is_axis_moving(Axis::Alt));
        assert!(!state.is_axis_moving(Axis::Az));
        state.reset();
        assert!(!state.is_moving());
        assert_eq!(state.direction(), None);
    }

    #[test]
    fn test_generation_advances_per_start() {
        let mut state = MotionState::default();
        let first = state.set_moving(Direction::Right, Rate::new(2));
        let second = state.set_moving(Direction::Left, Rate::new(2));
        assert!(second > first);
        assert_eq!(state.generation_of(Motor::Azimuth), second);
    }

    #[test]
    fn test_timed_stop_mark_cleared_by_next_start() {
        let mut state = MotionState::default();
        state.set_moving(Direction::Up, Rate::new(4));
        state.set_idle(Axis::Alt);
        state.mark_timed_stop(Motor::Altitude);
        assert!(state.stopped_by_timer(Axis::Alt));
        assert!(!state.stopped_by_timer(Axis::Both));

        state.set_moving(Direction::Down, Rate::new(4));
        assert!(!state.stopped_by_timer(Axis::Alt));

        state.set_idle(Axis::Alt);
        state.mark_timed_stop(Motor::Altitude);
        state.set_halted(Motor::Altitude);
        assert!(!state.stopped_by_timer(Axis::Alt));
    }
}
