//! Wall-clock sources for [`PhysicsWorld::update`](crate::PhysicsWorld::update).

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Elapsed-time source. The world re-arms it once per frame.
pub trait Clock {
    /// Seconds since the last [`Clock::rearm`].
    fn elapsed_seconds(&self) -> f32;
    fn rearm(&mut self);
}

#[derive(Debug, Clone, Copy)]
pub struct RealtimeClock {
    last: Instant,
}

impl RealtimeClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }
}

impl Default for RealtimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for RealtimeClock {
    fn elapsed_seconds(&self) -> f32 {
        self.last.elapsed().as_secs_f32()
    }

    fn rearm(&mut self) {
        self.last = Instant::now();
    }
}

/// Clock driven by hand through a [`ClockHandle`].
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    pending: Rc<Cell<f32>>,
}

/// Host-side handle of a [`ManualClock`].
#[derive(Debug, Clone)]
pub struct ClockHandle {
    pending: Rc<Cell<f32>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> (Self, ClockHandle) {
        let clock = Self::default();
        let handle = ClockHandle {
            pending: Rc::clone(&clock.pending),
        };
        (clock, handle)
    }
}

impl ClockHandle {
    /// Lets `seconds` of wall-clock time pass.
    pub fn advance(&self, seconds: f32) {
        self.pending.set(self.pending.get() + seconds);
    }

    #[must_use]
    pub fn pending(&self) -> f32 {
        self.pending.get()
    }
}

impl Clock for ManualClock {
    fn elapsed_seconds(&self) -> f32 {
        self.pending.get()
    }

    fn rearm(&mut self) {
        self.pending.set(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_accumulates_until_rearmed() {
        let (mut clock, handle) = ManualClock::new();
        handle.advance(0.25);
        handle.advance(0.25);
        assert!((clock.elapsed_seconds() - 0.5).abs() < f32::EPSILON);
        clock.rearm();
        assert_eq!(handle.pending(), 0.0);
    }

    #[test]
    fn realtime_clock_moves_forward() {
        let mut clock = RealtimeClock::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(clock.elapsed_seconds() > 0.0);
        clock.rearm();
        assert!(clock.elapsed_seconds() < 1.0);
    }
}
