//! User-selectable training speed.
//!
//! The speed multiplier scales the required hold duration, the pose timeout,
//! and the cue playback rate. Computations re-read the multiplier when they
//! run; a deadline that is already armed is not rescaled retroactively.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The enumerated set of speed settings offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speed {
    Slow,
    Normal,
    Fast,
    SuperFast,
}

impl Speed {
    /// Every selectable speed, in menu order.
    pub const ALL: [Speed; 4] = [Speed::Slow, Speed::Normal, Speed::Fast, Speed::SuperFast];

    /// The multiplier applied to all timing computations and cue playback.
    pub fn multiplier(self) -> f64 {
        match self {
            Speed::Slow => 0.8,
            Speed::Normal => 1.0,
            Speed::Fast => 1.3,
            Speed::SuperFast => 3.0,
        }
    }

    /// Identifier used in the wire protocol and the REST surface.
    pub fn as_str(self) -> &'static str {
        match self {
            Speed::Slow => "slow",
            Speed::Normal => "normal",
            Speed::Fast => "fast",
            Speed::SuperFast => "super_fast",
        }
    }
}

impl Default for Speed {
    fn default() -> Self {
        Speed::Normal
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}x", self.multiplier())
    }
}
