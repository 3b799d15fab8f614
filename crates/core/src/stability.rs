//! Stability debouncing over per-frame classification results.
//!
//! A single noisy frame must never advance the routine. The filter keeps a
//! tentative candidate label and only reports a match once that label has
//! been held with high confidence for the full, speed-scaled duration.

use crate::speed::Speed;

/// Minimum confidence for an observation to count toward stability.
pub const PROB_THRESHOLD: f32 = 0.85;

/// Seconds a valid label must persist before it is promoted, at 1.0x speed.
pub const BASE_STABLE_SECONDS: f64 = 5.0;

/// Required hold duration in milliseconds at the given speed.
pub fn required_hold_ms(speed: Speed) -> f64 {
    BASE_STABLE_SECONDS * 1000.0 / speed.multiplier()
}

/// The currently accumulating hypothesis for which label is being held.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub label: String,
    pub since_ms: f64,
}

/// Conditions under which the filter may accumulate and promote.
///
/// Accumulation is only meaningful while a cue is animating or the session is
/// expecting a pose; promotion additionally requires the waiting state. The
/// gate keeps an idle or completed session from ever building stability.
#[derive(Debug, Clone, Copy)]
pub struct Gate<'a> {
    /// A cue is currently playing. The hold keeps accumulating, but no
    /// promotion happens until playback ends.
    pub cue_playing: bool,
    /// The session is waiting for the next pose.
    pub waiting_for_pose: bool,
    /// The pose expected at the current routine position, if any.
    pub expected: Option<&'a str>,
    /// Hold duration required for promotion, in milliseconds.
    pub required_hold_ms: f64,
}

/// Debounces classification ticks into at most one promotion per hold.
#[derive(Debug, Default)]
pub struct StabilityFilter {
    candidate: Option<Candidate>,
}

impl StabilityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one classification tick.
    ///
    /// Returns `true` exactly when the incoming label equals the expected
    /// pose and has been confidently held for the required duration while
    /// the session was waiting for it. The caller owns the resulting phase
    /// change, which closes the gate and makes further identical ticks inert.
    pub fn update(&mut self, label: &str, confidence: f32, now_ms: f64, gate: &Gate<'_>) -> bool {
        let valid = confidence >= PROB_THRESHOLD;
        if !valid || !(gate.cue_playing || gate.waiting_for_pose) {
            self.candidate = None;
            return false;
        }

        let since_ms = match &self.candidate {
            Some(candidate) if candidate.label == label => candidate.since_ms,
            _ => {
                self.candidate = Some(Candidate {
                    label: label.to_owned(),
                    since_ms: now_ms,
                });
                return false;
            }
        };

        if gate.cue_playing {
            return false;
        }

        gate.expected == Some(label) && now_ms - since_ms >= gate.required_hold_ms
    }

    /// Drops the current hypothesis.
    pub fn reset(&mut self) {
        self.candidate = None;
    }

    pub fn candidate(&self) -> Option<&Candidate> {
        self.candidate.as_ref()
    }
}
