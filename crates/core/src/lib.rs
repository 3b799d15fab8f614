pub mod classifier;
pub mod routine;
pub mod session;
pub mod speed;
pub mod stability;
pub mod timeout;

/// Represents effects that the core logic issues to an external runtime.
///
/// This enum is the primary API for decoupling the session's decision-making
/// from the runtime's execution of side effects (like scheduling a timer or
/// starting cue playback).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Schedule a single-shot timeout. The runtime must deliver a
    /// `SessionEvent::TimeoutFired` carrying the same generation when it
    /// expires; fires for superseded generations are ignored.
    ArmTimeout { duration_ms: f64, generation: u64 },
    /// Cancel any pending timeout.
    DisarmTimeout,
    /// Play the audio cue for a recognized pose at the given playback rate.
    PlayCue {
        label: String,
        cue: String,
        rate: f64,
    },
    /// Apply a new playback rate to the currently loaded cue.
    SetCueRate { rate: f64 },
    /// Command indicating every pose in the routine has been matched.
    RoutineComplete,
}
