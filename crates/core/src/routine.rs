//! Pose routine configuration: the ordered sequence and its audio cues.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One step of the routine: a pose identifier and its optional audio cue.
///
/// Steps without a cue advance immediately on recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseStep {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cue: Option<String>,
}

impl PoseStep {
    pub fn new(name: impl Into<String>, cue: Option<String>) -> Self {
        Self {
            name: name.into(),
            cue,
        }
    }
}

/// The ordered list of expected poses. Static configuration, loaded once at
/// startup and never renegotiated at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Routine {
    steps: Vec<PoseStep>,
}

impl Routine {
    pub fn new(steps: Vec<PoseStep>) -> Self {
        Self { steps }
    }

    /// Loads a routine from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read routine file '{}'", path.display()))?;
        let routine: Routine = serde_json::from_str(&raw)
            .with_context(|| format!("Routine file '{}' is not valid JSON", path.display()))?;
        Ok(routine)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[PoseStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&PoseStep> {
        self.steps.get(index)
    }

    /// The pose name expected at `index`, `None` once the routine is done.
    pub fn expected(&self, index: usize) -> Option<&str> {
        self.steps.get(index).map(|step| step.name.as_str())
    }
}

/// File-name portion of a cue resource path, for display.
pub fn cue_file_name(cue: &str) -> &str {
    cue.rsplit('/').next().unwrap_or(cue)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> Routine {
        Routine::new(vec![
            PoseStep::new("Oben", Some("audio/oben.mp3".into())),
            PoseStep::new("Links", Some("audio/links.mp3".into())),
            PoseStep::new("Rechts", None),
        ])
    }

    #[test]
    fn expected_follows_the_step_order() {
        let routine = demo();
        assert_eq!(routine.expected(0), Some("Oben"));
        assert_eq!(routine.expected(1), Some("Links"));
        assert_eq!(routine.expected(2), Some("Rechts"));
        assert_eq!(routine.expected(3), None);
        assert_eq!(routine.len(), 3);
    }

    #[test]
    fn steps_without_a_cue_deserialize() {
        let json = r#"{"steps": [{"name": "Oben", "cue": "audio/oben.mp3"}, {"name": "Links"}]}"#;
        let routine: Routine = serde_json::from_str(json).unwrap();
        assert_eq!(routine.step(0).unwrap().cue.as_deref(), Some("audio/oben.mp3"));
        assert_eq!(routine.step(1).unwrap().cue, None);
    }

    #[test]
    fn serialization_round_trips() {
        let routine = demo();
        let json = serde_json::to_string(&routine).unwrap();
        let back: Routine = serde_json::from_str(&json).unwrap();
        assert_eq!(back, routine);
    }

    #[test]
    fn cue_file_name_strips_directories() {
        assert_eq!(cue_file_name("audio/oben.mp3"), "oben.mp3");
        assert_eq!(cue_file_name("./audio/links.mp3"), "links.mp3");
        assert_eq!(cue_file_name("rechts.mp3"), "rechts.mp3");
    }

    #[test]
    fn missing_routine_file_is_an_error() {
        let result = Routine::from_file(Path::new("/nonexistent/routine.json"));
        assert!(result.is_err());
    }
}
