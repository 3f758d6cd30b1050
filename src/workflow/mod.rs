//! Workflow state machine for the content pipeline.
//!
//! Stages run in a fixed order and each one gates the next:
//!
//! ```text
//! topic > blog > seo > visual > social > cms
//! ```
//!
//! A stage flag can only become true when the stage before it is true, and a
//! reset always clears the named stage together with everything after it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::pipeline::PipelineError;

/// One step of the fixed pipeline
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Topic,
    Blog,
    Seo,
    Visual,
    Social,
    Cms,
}

impl Stage {
    /// All stages in gating order
    pub const ALL: [Stage; 6] = [
        Stage::Topic,
        Stage::Blog,
        Stage::Seo,
        Stage::Visual,
        Stage::Social,
        Stage::Cms,
    ];

    /// Position of this stage in the gating order
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Topic => "topic",
            Stage::Blog => "blog",
            Stage::Seo => "seo",
            Stage::Visual => "visual",
            Stage::Social => "social",
            Stage::Cms => "cms",
        }
    }

    /// The stage that must be complete before this one can unlock
    pub fn prerequisite(self) -> Option<Stage> {
        match self.index() {
            0 => None,
            i => Some(Stage::ALL[i - 1]),
        }
    }

    /// The stage unlocked by completing this one
    pub fn next(self) -> Option<Stage> {
        Stage::ALL.get(self.index() + 1).copied()
    }

    /// This stage followed by every later stage
    pub fn downstream_of(self) -> impl Iterator<Item = Stage> {
        Stage::ALL.into_iter().skip(self.index())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PipelineError::validation(format!("unknown stage '{}'", s)))
    }
}

/// Completion flags for every stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkflowState {
    flags: [bool; 6],
}

impl WorkflowState {
    /// A fresh state for a newly selected topic: only `topic` is complete
    pub fn for_selected_topic() -> Self {
        let mut state = Self::default();
        state.flags[Stage::Topic.index()] = true;
        state
    }

    pub fn is_complete(&self, stage: Stage) -> bool {
        self.flags[stage.index()]
    }

    /// True once the final stage is complete
    pub fn is_terminal(&self) -> bool {
        self.is_complete(Stage::Cms)
    }

    /// Whether `stage` may run now (its prerequisite is complete)
    pub fn is_unlocked(&self, stage: Stage) -> bool {
        stage
            .prerequisite()
            .map(|prev| self.is_complete(prev))
            .unwrap_or(true)
    }

    /// Stages currently marked complete, in order
    pub fn completed(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|s| self.is_complete(*s))
            .collect()
    }

    /// Mark `stage` complete. Rejected unless the preceding stage is complete.
    pub fn unlock(&mut self, stage: Stage) -> Result<(), PipelineError> {
        if let Some(requires) = stage.prerequisite() {
            if !self.is_complete(requires) {
                return Err(PipelineError::PrerequisiteNotMet { stage, requires });
            }
        }
        self.flags[stage.index()] = true;
        Ok(())
    }

    /// Clear `stage` and every later stage. Earlier stages are untouched.
    pub fn reset_from(&mut self, stage: Stage) {
        for s in stage.downstream_of() {
            self.flags[s.index()] = false;
        }
    }

    /// True when no stage is complete ahead of an incomplete one
    pub fn check_invariant(&self) -> bool {
        self.flags.windows(2).all(|pair| pair[0] || !pair[1])
    }
}

// Serialized as `{"topic": true, "blog": false, ...}`
impl Serialize for WorkflowState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(Stage::ALL.len()))?;
        for stage in Stage::ALL {
            map.serialize_entry(stage.as_str(), &self.is_complete(stage))?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_complete() -> WorkflowState {
        let mut state = WorkflowState::for_selected_topic();
        for stage in Stage::ALL.into_iter().skip(1) {
            state.unlock(stage).unwrap();
        }
        state
    }

    #[test]
    fn test_stage_order_and_prerequisites() {
        assert_eq!(Stage::Topic.prerequisite(), None);
        assert_eq!(Stage::Blog.prerequisite(), Some(Stage::Topic));
        assert_eq!(Stage::Social.prerequisite(), Some(Stage::Visual));
        assert_eq!(Stage::Cms.prerequisite(), Some(Stage::Social));
        assert_eq!(Stage::Cms.next(), None);
        assert_eq!(Stage::Seo.next(), Some(Stage::Visual));
    }

    #[test]
    fn test_downstream_of() {
        let stages: Vec<Stage> = Stage::Visual.downstream_of().collect();
        assert_eq!(stages, vec![Stage::Visual, Stage::Social, Stage::Cms]);
    }

    #[test]
    fn test_stage_from_str() {
        assert_eq!("SEO".parse::<Stage>().unwrap(), Stage::Seo);
        assert_eq!(" cms ".parse::<Stage>().unwrap(), Stage::Cms);
        assert!("publish-now".parse::<Stage>().is_err());
    }

    #[test]
    fn test_unlock_requires_previous_stage() {
        let mut state = WorkflowState::for_selected_topic();
        let err = state.unlock(Stage::Seo).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::PrerequisiteNotMet {
                stage: Stage::Seo,
                requires: Stage::Blog
            }
        ));
        assert!(!state.is_complete(Stage::Seo));

        state.unlock(Stage::Blog).unwrap();
        state.unlock(Stage::Seo).unwrap();
        assert!(state.is_complete(Stage::Seo));
        assert!(state.check_invariant());
    }

    #[test]
    fn test_unlock_topic_on_empty_state_is_allowed() {
        let mut state = WorkflowState::default();
        assert!(state.unlock(Stage::Blog).is_err());
        state.unlock(Stage::Topic).unwrap();
        assert!(state.is_complete(Stage::Topic));
    }

    #[test]
    fn test_reset_from_seo() {
        let mut state = all_complete();
        assert!(state.is_terminal());

        state.reset_from(Stage::Seo);

        assert!(state.is_complete(Stage::Topic));
        assert!(state.is_complete(Stage::Blog));
        assert!(!state.is_complete(Stage::Seo));
        assert!(!state.is_complete(Stage::Visual));
        assert!(!state.is_complete(Stage::Social));
        assert!(!state.is_complete(Stage::Cms));
        assert!(state.check_invariant());
    }

    #[test]
    fn test_completed_and_unlocked() {
        let mut state = WorkflowState::for_selected_topic();
        state.unlock(Stage::Blog).unwrap();
        assert_eq!(state.completed(), vec![Stage::Topic, Stage::Blog]);
        assert!(state.is_unlocked(Stage::Seo));
        assert!(!state.is_unlocked(Stage::Visual));
    }

    #[test]
    fn test_serializes_as_named_flags() {
        let state = WorkflowState::for_selected_topic();
        let json = serde_json::to_value(state).unwrap();
        assert_eq!(json["topic"], true);
        assert_eq!(json["cms"], false);
    }
}
