//! Pipeline session and stage endpoints.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures_util::Stream;
use tokio::sync::watch;

use crate::pipeline::{descriptions_to_csv, BlogProgress};
use crate::rest::dto::{ConfirmParams, RunStageRequest, StageRunResponse};
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;
use crate::session::{ResetOutcome, SessionSnapshot, StageOutput};
use crate::workflow::Stage;

fn parse_stage(raw: &str) -> Result<Stage, ApiError> {
    raw.parse::<Stage>().map_err(ApiError::from)
}

/// Current topic, workflow flags, stage content and in-flight stages
#[utoipa::path(
    get,
    path = "/api/v1/session",
    tag = "Pipeline",
    responses(
        (status = 200, description = "Session snapshot", body = SessionSnapshot)
    )
)]
pub async fn session(State(state): State<ApiState>) -> Json<SessionSnapshot> {
    let session = state.pipeline.session().lock().await;
    Json(session.snapshot())
}

/// Run one stage
#[utoipa::path(
    post,
    path = "/api/v1/stages/{stage}/run",
    tag = "Pipeline",
    params(
        ("stage" = String, Path, description = "blog, seo, visual, social or cms")
    ),
    request_body = RunStageRequest,
    responses(
        (status = 200, description = "Stage completed or fell back to a placeholder", body = StageRunResponse),
        (status = 400, description = "Unknown stage or invalid collaborator response", body = ErrorResponse),
        (status = 409, description = "Prerequisite missing, stage busy or already complete", body = ErrorResponse),
        (status = 502, description = "Collaborator failed", body = ErrorResponse)
    )
)]
pub async fn run(
    State(state): State<ApiState>,
    Path(stage): Path<String>,
    request: Option<Json<RunStageRequest>>,
) -> Result<Json<StageRunResponse>, ApiError> {
    let stage = parse_stage(&stage)?;
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let outcome = state.pipeline.run_stage(stage, request.hints).await?;
    Ok(Json(StageRunResponse::new(stage, outcome)))
}

/// Reset a stage and every stage after it
#[utoipa::path(
    post,
    path = "/api/v1/stages/{stage}/reset",
    tag = "Pipeline",
    params(
        ("stage" = String, Path, description = "blog, seo, visual, social or cms"),
        ConfirmParams
    ),
    responses(
        (status = 200, description = "Stages cleared", body = ResetOutcome),
        (status = 400, description = "Unknown stage, or the topic stage", body = ErrorResponse),
        (status = 409, description = "Reset would discard content", body = ErrorResponse)
    )
)]
pub async fn reset(
    State(state): State<ApiState>,
    Path(stage): Path<String>,
    Query(params): Query<ConfirmParams>,
) -> Result<Json<ResetOutcome>, ApiError> {
    let stage = parse_stage(&stage)?;
    let mut session = state.pipeline.session().lock().await;

    match session.reset(stage, params.confirm.into())? {
        ResetOutcome::NeedsConfirmation { discarding } => {
            Err(ApiError::ConfirmationRequired(discarding))
        }
        outcome => Ok(Json(outcome)),
    }
}

/// Visual descriptions of the current topic as CSV
#[utoipa::path(
    get,
    path = "/api/v1/visuals.csv",
    tag = "Pipeline",
    responses(
        (status = 200, description = "Visual descriptions", content_type = "text/csv", body = String),
        (status = 409, description = "Visual stage not complete", body = ErrorResponse)
    )
)]
pub async fn visual_csv(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let session = state.pipeline.session().lock().await;
    let visual = session.visual().ok_or_else(|| ApiError::Conflict {
        code: "stage_incomplete",
        message: "the visual stage has not completed".to_string(),
    })?;

    let body = descriptions_to_csv(&visual.descriptions)?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], body))
}

/// Run the blog stage, streaming partial documents as server-sent events.
///
/// Emits `progress` events with `BlogProgress` snapshots and ends with one
/// `result` event (`StageRunResponse`) or one `error` event (`ErrorResponse`).
#[utoipa::path(
    post,
    path = "/api/v1/blog/stream",
    tag = "Pipeline",
    responses(
        (status = 200, description = "Event stream of blog snapshots", content_type = "text/event-stream", body = String)
    )
)]
pub async fn stream_blog(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, mut rx) = watch::channel(BlogProgress::default());
    let pipeline = state.pipeline.clone();
    let task = tokio::spawn(async move { pipeline.run_blog_streaming(tx).await });

    let events = async_stream::stream! {
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            if let Ok(event) = Event::default().event("progress").json_data(&snapshot) {
                yield Ok(event);
            }
        }

        let last = match task.await {
            Ok(Ok(outcome)) => {
                let response = StageRunResponse::new(Stage::Blog, outcome.map(StageOutput::Blog));
                Event::default().event("result").json_data(&response)
            }
            Ok(Err(e)) => Event::default().event("error").json_data(&ErrorResponse {
                error: "stage_failed".to_string(),
                message: e.to_string(),
            }),
            Err(e) => Event::default().event("error").json_data(&ErrorResponse {
                error: "internal_error".to_string(),
                message: e.to_string(),
            }),
        };
        if let Ok(event) = last {
            yield Ok(event);
        }
    };

    Sse::new(events).keep_alive(KeepAlive::default())
}
