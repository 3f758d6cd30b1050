//! Data Transfer Objects for the REST API.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::pipeline::{StageOutcome, VisualHints};
use crate::session::StageOutput;
use crate::topics::{AmplifyResult, Topic};
use crate::workflow::Stage;

// =============================================================================
// Health DTOs
// =============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Service status with pipeline summary
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub topic_count: usize,
    pub active_topic: Option<String>,
    pub completed: Vec<Stage>,
    pub in_flight: Vec<Stage>,
}

// =============================================================================
// Topic DTOs
// =============================================================================

/// Topic list as CSV text
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImportTopicsRequest {
    pub csv: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImportTopicsResponse {
    pub loaded: usize,
    /// Stages whose content was dropped because the active topic changed
    pub cleared: Vec<Stage>,
    pub topics: Vec<Topic>,
}

/// `?confirm=true` acknowledges that existing content will be discarded
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ConfirmParams {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AmplifyRequest {
    pub keyword: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AmplifyResponse {
    /// Pending candidates; accept them to add them to the topic list
    pub candidates: Vec<Topic>,
    pub rejected: usize,
}

impl From<AmplifyResult> for AmplifyResponse {
    fn from(result: AmplifyResult) -> Self {
        Self {
            candidates: result.candidates,
            rejected: result.rejected,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AcceptCandidatesRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExportTopicsResponse {
    pub exported: usize,
}

// =============================================================================
// Stage DTOs
// =============================================================================

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct RunStageRequest {
    /// Only used by the visual stage
    #[serde(default)]
    pub hints: VisualHints,
}

/// Result of running a stage
#[derive(Debug, Serialize, ToSchema)]
pub struct StageRunResponse {
    pub stage: Stage,
    /// `completed`, or `fallback` when the collaborator failed
    pub status: String,
    /// Committed output, or the display-only placeholder on fallback
    pub output: StageOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageRunResponse {
    pub fn new(stage: Stage, outcome: StageOutcome<StageOutput>) -> Self {
        match outcome {
            StageOutcome::Completed { output } => Self {
                stage,
                status: "completed".to_string(),
                output,
                error: None,
            },
            StageOutcome::Fallback { placeholder, error } => Self {
                stage,
                status: "fallback".to_string(),
                output: placeholder,
                error: Some(error.to_string()),
            },
        }
    }
}
