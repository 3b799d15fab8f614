//! Defines the WebSocket message protocol between the browser client and the API server.
//!
//! Camera frames travel as binary WebSocket messages; everything else is
//! tagged JSON. The client owns the camera and the audio element, so cue
//! playback and camera release happen client-side, driven by these messages.

use posecoach_core::{routine::PoseStep, session::Snapshot, speed::Speed};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Begins a training session. A no-op while one is already running.
    Start,
    /// Ends the session; the client releases the camera and pauses audio.
    Stop,
    /// Selects a new speed multiplier.
    SetSpeed { speed: Speed },
    /// The current cue finished playing.
    CueEnded,
    /// The current cue could not be played (autoplay/permission restrictions).
    CueError { message: String },
    /// Periodic playback progress for the current cue, for display.
    CueProgress {
        position_secs: f64,
        duration_secs: f64,
    },
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the session has started and echoes the configuration.
    Started {
        session_id: Uuid,
        routine: Vec<PoseStep>,
        speed: Speed,
    },
    /// Confirms the session has stopped; the client must release the camera.
    Stopped,
    /// Asks the client for the next camera frame (as a binary message).
    /// Sent only after the previous frame's prediction settled.
    FrameRequest,
    /// Instructs the client to play the cue for a recognized pose.
    PlayCue { label: String, cue: String, rate: f64 },
    /// Applies a new playback rate to the currently loaded cue.
    SetCueRate { rate: f64 },
    /// Pushes a fresh presentation snapshot.
    Snapshot { state: Snapshot },
    /// Every pose in the routine has been matched.
    Complete,
    /// Reports a fatal error to the client.
    Error { message: String },
}
