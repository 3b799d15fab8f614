//! Timeout supervision for the waiting-for-pose phase.
//!
//! The supervisor owns the deadline bookkeeping; actually scheduling the
//! wake-up belongs to the runtime. Every arm hands out a fresh generation,
//! and a fire is honored at most once and only for the current generation,
//! so superseded timers and post-stop stragglers are inert.

use crate::speed::Speed;

/// Base timeout for reaching the expected pose, at 1.0x speed.
pub const BASE_POSE_TIMEOUT_MS: f64 = 15_000.0;

/// Timeout duration in milliseconds at the given speed, computed at arm time.
pub fn pose_timeout_ms(speed: Speed) -> f64 {
    BASE_POSE_TIMEOUT_MS / speed.multiplier()
}

/// Single-shot deadline bookkeeping with at-most-once firing.
#[derive(Debug, Default)]
pub struct TimeoutSupervisor {
    deadline_ms: Option<f64>,
    generation: u64,
}

impl TimeoutSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the deadline and returns the generation the runtime must tag the
    /// scheduled fire with. An already-armed timer is superseded, never
    /// duplicated.
    pub fn arm(&mut self, now_ms: f64, duration_ms: f64) -> u64 {
        self.generation += 1;
        self.deadline_ms = Some(now_ms + duration_ms);
        self.generation
    }

    /// Cancels any pending deadline and invalidates in-flight fires.
    pub fn disarm(&mut self) {
        self.generation += 1;
        self.deadline_ms = None;
    }

    /// Whether a fire for `generation` should be honored. Accepting consumes
    /// the arm; the timer must be explicitly re-armed to fire again.
    pub fn accept(&mut self, generation: u64) -> bool {
        if self.deadline_ms.is_some() && generation == self.generation {
            self.deadline_ms = None;
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline_ms.is_some()
    }

    /// Time left until the deadline, clamped at zero. `None` if unarmed.
    pub fn remaining_ms(&self, now_ms: f64) -> Option<f64> {
        self.deadline_ms.map(|deadline| (deadline - now_ms).max(0.0))
    }
}
