//! REST API Models
//!
//! This module defines the data structures the REST surface exposes and the
//! `utoipa` schemas used to generate OpenAPI documentation.

use posecoach_core::{routine::Routine, speed::Speed};
use serde::Serialize;
use utoipa::ToSchema;

/// One step of the configured pose routine.
#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct PoseInfo {
    #[schema(example = "Oben")]
    pub name: String,
    /// Audio cue resource played when the pose is recognized, if any.
    #[schema(example = "audio/oben.mp3")]
    pub cue: Option<String>,
}

/// The configured pose routine, in training order.
#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct RoutineResponse {
    pub poses: Vec<PoseInfo>,
}

impl RoutineResponse {
    pub fn from_routine(routine: &Routine) -> Self {
        Self {
            poses: routine
                .steps()
                .iter()
                .map(|step| PoseInfo {
                    name: step.name.clone(),
                    cue: step.cue.clone(),
                })
                .collect(),
        }
    }
}

/// One selectable training speed.
#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct SpeedOption {
    /// Identifier accepted by the WebSocket `set_speed` message.
    #[schema(example = "super_fast")]
    pub speed: String,
    #[schema(example = 3.0)]
    pub multiplier: f64,
}

impl SpeedOption {
    pub fn all() -> Vec<Self> {
        Speed::ALL
            .iter()
            .map(|speed| Self {
                speed: speed.as_str().to_string(),
                multiplier: speed.multiplier(),
            })
            .collect()
    }
}
