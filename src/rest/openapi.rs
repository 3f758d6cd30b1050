//! OpenAPI specification builder using utoipa.

use utoipa::OpenApi;

use crate::api::ImageAsset;
use crate::pipeline::{
    BlogDocument, BlogProgress, PublishReceipt, SeoData, SocialPosts, VisualDescription,
    VisualHints, VisualOutput,
};
use crate::rest::dto::{
    AcceptCandidatesRequest, AmplifyRequest, AmplifyResponse, ExportTopicsResponse,
    HealthResponse, ImportTopicsRequest, ImportTopicsResponse, RunStageRequest,
    StageRunResponse, StatusResponse,
};
use crate::rest::error::ErrorResponse;
use crate::richtext::{Block, BlockStyle, Span};
use crate::session::{ResetOutcome, SelectOutcome, SessionSnapshot, StageOutput};
use crate::topics::Topic;
use crate::workflow::Stage;

/// OpenAPI documentation for the marketflow REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "marketflow API",
        version = "0.1.0",
        description = "REST API for driving the content pipeline: topics, blog, SEO, visuals, social posts and CMS publication.",
        license(name = "MIT")
    ),
    paths(
        // Health endpoints
        crate::rest::routes::health::health,
        crate::rest::routes::health::status,
        // Topic endpoints
        crate::rest::routes::topics::list,
        crate::rest::routes::topics::import,
        crate::rest::routes::topics::export_csv,
        crate::rest::routes::topics::export_sheet,
        crate::rest::routes::topics::select,
        crate::rest::routes::topics::amplify,
        crate::rest::routes::topics::candidates,
        crate::rest::routes::topics::accept,
        crate::rest::routes::topics::discard_candidates,
        // Pipeline endpoints
        crate::rest::routes::stages::session,
        crate::rest::routes::stages::run,
        crate::rest::routes::stages::reset,
        crate::rest::routes::stages::visual_csv,
        crate::rest::routes::stages::stream_blog,
    ),
    components(
        schemas(
            // Response types
            HealthResponse,
            StatusResponse,
            ImportTopicsResponse,
            AmplifyResponse,
            ExportTopicsResponse,
            StageRunResponse,
            SelectOutcome,
            ResetOutcome,
            SessionSnapshot,
            ErrorResponse,
            // Domain types
            Topic,
            Stage,
            StageOutput,
            BlogDocument,
            BlogProgress,
            Block,
            BlockStyle,
            Span,
            SeoData,
            VisualOutput,
            VisualDescription,
            VisualHints,
            ImageAsset,
            SocialPosts,
            PublishReceipt,
            // Request types
            ImportTopicsRequest,
            AmplifyRequest,
            AcceptCandidatesRequest,
            RunStageRequest,
        )
    ),
    tags(
        (name = "Health", description = "Health check and status endpoints"),
        (name = "Topics", description = "Topic list, selection and amplification"),
        (name = "Pipeline", description = "Stage execution, resets and session state"),
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI specification as a JSON string
    pub fn json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
