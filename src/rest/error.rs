//! API error types and responses.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::pipeline::PipelineError;
use crate::workflow::Stage;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found
    NotFound(String),
    /// Validation error
    ValidationError(String),
    /// Request conflicts with the current pipeline state
    Conflict { code: &'static str, message: String },
    /// The action would discard content and was not confirmed
    ConfirmationRequired(Vec<Stage>),
    /// An external collaborator failed
    BadGateway(String),
    /// Too many requests from this client
    RateLimited { retry_after_secs: u64 },
    /// Internal server error
    InternalError(String),
    /// Bad request
    BadRequest(String),
}

/// Error response body
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut retry_after = None;
        let (status, error, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            ApiError::Conflict { code, message } => (StatusCode::CONFLICT, code, message),
            ApiError::ConfirmationRequired(stages) => {
                let names: Vec<&str> = stages.iter().map(|s| s.as_str()).collect();
                (
                    StatusCode::CONFLICT,
                    "confirmation_required",
                    format!(
                        "this would discard content for: {}; repeat with confirm=true",
                        names.join(", ")
                    ),
                )
            }
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "collaborator_error", msg),
            ApiError::RateLimited { retry_after_secs } => {
                retry_after = Some(retry_after_secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limited",
                    format!("too many requests; retry in {}s", retry_after_secs),
                )
            }
            ApiError::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: error.to_string(),
                message,
            }),
        )
            .into_response();

        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let message = err.to_string();
        match err {
            PipelineError::Validation(_) | PipelineError::TopicResetNotAllowed => {
                ApiError::ValidationError(message)
            }
            PipelineError::UnknownTopic(_) => ApiError::NotFound(message),
            PipelineError::PrerequisiteNotMet { .. } => ApiError::Conflict {
                code: "prerequisite_not_met",
                message,
            },
            PipelineError::AlreadyInFlight(_) => ApiError::Conflict {
                code: "already_in_flight",
                message,
            },
            PipelineError::AlreadyComplete(_) => ApiError::Conflict {
                code: "already_complete",
                message,
            },
            PipelineError::Stale(_) => ApiError::Conflict {
                code: "stale_response",
                message,
            },
            PipelineError::NoActiveTopic => ApiError::Conflict {
                code: "no_active_topic",
                message,
            },
            PipelineError::Collaborator(_) => ApiError::BadGateway(message),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError as CollaboratorError;
    use http_body_util::BodyExt;

    async fn body_of(response: Response) -> ErrorResponse {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_topic_is_not_found() {
        let error: ApiError = PipelineError::UnknownTopic("t9".to_string()).into();
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(response).await.error, "not_found");
    }

    #[tokio::test]
    async fn test_prerequisite_is_conflict() {
        let error: ApiError = PipelineError::PrerequisiteNotMet {
            stage: Stage::Seo,
            requires: Stage::Blog,
        }
        .into();
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_of(response).await.error, "prerequisite_not_met");
    }

    #[tokio::test]
    async fn test_collaborator_is_bad_gateway() {
        let error: ApiError =
            PipelineError::from(CollaboratorError::http("sanity", 500, "down")).into();
        assert_eq!(error.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_confirmation_lists_stages() {
        let response = ApiError::ConfirmationRequired(vec![Stage::Blog, Stage::Seo]).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_of(response).await;
        assert_eq!(body.error, "confirmation_required");
        assert!(body.message.contains("blog, seo"));
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited {
            retry_after_secs: 12,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "12");
    }

    #[tokio::test]
    async fn test_validation_error_response() {
        let error: ApiError = PipelineError::validation("keyword must not be empty").into();
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
