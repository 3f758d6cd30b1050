//! Topic list, selection and amplification endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::rest::dto::{
    AcceptCandidatesRequest, AmplifyRequest, AmplifyResponse, ConfirmParams,
    ExportTopicsResponse, ImportTopicsRequest, ImportTopicsResponse,
};
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;
use crate::session::{ImportOutcome, SelectOutcome};
use crate::topics::{csv, Topic};

/// List loaded topics
#[utoipa::path(
    get,
    path = "/api/v1/topics",
    tag = "Topics",
    responses(
        (status = 200, description = "Loaded topics", body = Vec<Topic>)
    )
)]
pub async fn list(State(state): State<ApiState>) -> Json<Vec<Topic>> {
    let session = state.pipeline.session().lock().await;
    Json(session.topics().topics().to_vec())
}

/// Replace the topic list from CSV
#[utoipa::path(
    post,
    path = "/api/v1/topics/import",
    tag = "Topics",
    params(ConfirmParams),
    request_body = ImportTopicsRequest,
    responses(
        (status = 200, description = "Topics loaded; malformed CSV loads none", body = ImportTopicsResponse),
        (status = 409, description = "Import would discard content for the active topic", body = ErrorResponse)
    )
)]
pub async fn import(
    State(state): State<ApiState>,
    Query(params): Query<ConfirmParams>,
    Json(request): Json<ImportTopicsRequest>,
) -> Result<Json<ImportTopicsResponse>, ApiError> {
    let mut session = state.pipeline.session().lock().await;
    match session.import_topics(&request.csv, params.confirm.into()) {
        ImportOutcome::NeedsConfirmation { discarding } => {
            Err(ApiError::ConfirmationRequired(discarding))
        }
        ImportOutcome::Imported { loaded, cleared } => Ok(Json(ImportTopicsResponse {
            loaded,
            cleared,
            topics: session.topics().topics().to_vec(),
        })),
    }
}

/// Download the topic list as CSV
#[utoipa::path(
    get,
    path = "/api/v1/topics/export.csv",
    tag = "Topics",
    responses(
        (status = 200, description = "Topic list as CSV", content_type = "text/csv", body = String)
    )
)]
pub async fn export_csv(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let session = state.pipeline.session().lock().await;
    let body = csv::serialize_topics(session.topics().topics())?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], body))
}

/// Append the topic list to the configured spreadsheet
#[utoipa::path(
    post,
    path = "/api/v1/topics/export-sheet",
    tag = "Topics",
    responses(
        (status = 200, description = "Rows appended", body = ExportTopicsResponse),
        (status = 502, description = "Spreadsheet unavailable or not configured", body = ErrorResponse)
    )
)]
pub async fn export_sheet(
    State(state): State<ApiState>,
) -> Result<Json<ExportTopicsResponse>, ApiError> {
    let exported = state.pipeline.export_topics_to_sheet().await?;
    Ok(Json(ExportTopicsResponse { exported }))
}

/// Make a topic active, restarting the pipeline
#[utoipa::path(
    put,
    path = "/api/v1/topics/{id}/select",
    tag = "Topics",
    params(
        ("id" = String, Path, description = "Topic id"),
        ConfirmParams
    ),
    responses(
        (status = 200, description = "Topic selected or already active", body = SelectOutcome),
        (status = 404, description = "Topic not found", body = ErrorResponse),
        (status = 409, description = "Selection would discard content", body = ErrorResponse)
    )
)]
pub async fn select(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(params): Query<ConfirmParams>,
) -> Result<Json<SelectOutcome>, ApiError> {
    let mut session = state.pipeline.session().lock().await;
    match session.select_topic(&id, params.confirm.into())? {
        SelectOutcome::NeedsConfirmation { discarding } => {
            Err(ApiError::ConfirmationRequired(discarding))
        }
        outcome => Ok(Json(outcome)),
    }
}

/// Generate topic ideas for a keyword
#[utoipa::path(
    post,
    path = "/api/v1/topics/amplify",
    tag = "Topics",
    request_body = AmplifyRequest,
    responses(
        (status = 200, description = "Pending candidates", body = AmplifyResponse),
        (status = 400, description = "Empty keyword or unusable response", body = ErrorResponse),
        (status = 502, description = "Text collaborator failed", body = ErrorResponse)
    )
)]
pub async fn amplify(
    State(state): State<ApiState>,
    Json(request): Json<AmplifyRequest>,
) -> Result<Json<AmplifyResponse>, ApiError> {
    let result = state.pipeline.amplify(&request.keyword).await?;
    Ok(Json(result.into()))
}

/// List candidates awaiting acceptance
#[utoipa::path(
    get,
    path = "/api/v1/topics/candidates",
    tag = "Topics",
    responses(
        (status = 200, description = "Pending candidates", body = Vec<Topic>)
    )
)]
pub async fn candidates(State(state): State<ApiState>) -> Json<Vec<Topic>> {
    let session = state.pipeline.session().lock().await;
    Json(session.topics().candidates().to_vec())
}

/// Move candidates into the topic list
#[utoipa::path(
    post,
    path = "/api/v1/topics/candidates/accept",
    tag = "Topics",
    request_body = AcceptCandidatesRequest,
    responses(
        (status = 200, description = "Topics added", body = Vec<Topic>)
    )
)]
pub async fn accept(
    State(state): State<ApiState>,
    Json(request): Json<AcceptCandidatesRequest>,
) -> Json<Vec<Topic>> {
    let mut session = state.pipeline.session().lock().await;
    Json(session.topics_mut().accept(&request.ids))
}

/// Drop every pending candidate
#[utoipa::path(
    delete,
    path = "/api/v1/topics/candidates",
    tag = "Topics",
    responses(
        (status = 204, description = "Candidates discarded")
    )
)]
pub async fn discard_candidates(State(state): State<ApiState>) -> StatusCode {
    let mut session = state.pipeline.session().lock().await;
    session.topics_mut().discard_candidates();
    StatusCode::NO_CONTENT
}
