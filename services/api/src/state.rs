//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the classifier client and the configured routine.

use crate::config::Config;
use posecoach_core::{classifier::PoseClassifier, routine::Routine};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<dyn PoseClassifier>,
    pub routine: Routine,
    pub config: Arc<Config>,
}
