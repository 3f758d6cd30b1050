//! Error taxonomy for pipeline operations

use thiserror::Error;

use crate::api::ApiError;
use crate::workflow::Stage;

/// Errors surfaced by the topic store, workflow and stage executors
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// Malformed input or collaborator response at a stage boundary
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("stage '{stage}' requires '{requires}' to be complete")]
    PrerequisiteNotMet { stage: Stage, requires: Stage },

    #[error("stage '{0}' already has a request in flight")]
    AlreadyInFlight(Stage),

    /// Completed stages must be reset before they run again
    #[error("stage '{0}' is already complete; reset it to run again")]
    AlreadyComplete(Stage),

    #[error(transparent)]
    Collaborator(#[from] ApiError),

    /// The response arrived after a topic switch or reset and was dropped
    #[error("response for stage '{0}' arrived after its session changed; discarded")]
    Stale(Stage),

    #[error("no topic is selected")]
    NoActiveTopic,

    #[error("topic '{0}' not found")]
    UnknownTopic(String),

    #[error("the topic stage cannot be reset directly; select a topic instead")]
    TopicResetNotAllowed,
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        PipelineError::Validation(message.into())
    }

    /// Failures from an external call, eligible for placeholder fallback
    pub fn is_collaborator(&self) -> bool {
        matches!(self, PipelineError::Collaborator(_))
    }

    /// Whether retrying the same stage can succeed without other changes
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Collaborator(_) | PipelineError::Stale(_)
        )
    }
}
