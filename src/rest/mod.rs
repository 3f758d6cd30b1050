//! REST API for driving the content pipeline.
//!
//! Serves the single in-memory session: topic import and selection, stage
//! runs and resets, and the session snapshot. Every request except the health
//! check counts against the per-client rate limit.

use std::net::SocketAddr;

use anyhow::Result;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::ApiState;

use error::ApiError;

const HEALTH_PATH: &str = "/api/v1/health";

/// Identify the caller: forwarded address when trusted, then peer address
fn client_key(request: &Request, trust_forwarded_for: bool) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(forwarded) = forwarded.filter(|_| trust_forwarded_for) {
        return forwarded.to_string();
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}

async fn rate_limit(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    if request.uri().path() == HEALTH_PATH {
        return next.run(request).await;
    }

    let client = client_key(&request, state.trusts_forwarded_for());
    let Some(decision) = state.check_rate_limit(&client) else {
        return next.run(request).await;
    };

    if !decision.allowed {
        tracing::warn!(%client, "rate limit exceeded");
        return ApiError::RateLimited {
            retry_after_secs: decision.retry_after_secs(),
        }
        .into_response();
    }

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        response.headers_mut().insert("x-ratelimit-remaining", value);
    }
    response
}

/// Build the API router with all routes
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health endpoints
        .route(HEALTH_PATH, get(routes::health::health))
        .route("/api/v1/status", get(routes::health::status))
        // Topic endpoints
        .route("/api/v1/topics", get(routes::topics::list))
        .route("/api/v1/topics/import", post(routes::topics::import))
        .route("/api/v1/topics/export.csv", get(routes::topics::export_csv))
        .route(
            "/api/v1/topics/export-sheet",
            post(routes::topics::export_sheet),
        )
        .route("/api/v1/topics/:id/select", put(routes::topics::select))
        .route("/api/v1/topics/amplify", post(routes::topics::amplify))
        .route(
            "/api/v1/topics/candidates",
            get(routes::topics::candidates).delete(routes::topics::discard_candidates),
        )
        .route(
            "/api/v1/topics/candidates/accept",
            post(routes::topics::accept),
        )
        // Pipeline endpoints
        .route("/api/v1/session", get(routes::stages::session))
        .route(
            "/api/v1/blog/stream",
            post(routes::stages::stream_blog),
        )
        .route(
            "/api/v1/visuals.csv",
            get(routes::stages::visual_csv),
        )
        .route("/api/v1/stages/:stage/run", post(routes::stages::run))
        .route("/api/v1/stages/:stage/reset", post(routes::stages::reset))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the REST API server and run until Ctrl-C
pub async fn serve(state: ApiState, port: u16) -> Result<()> {
    let pruner = state.spawn_rate_limit_pruner();
    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!("REST API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutting down REST API");
    })
    .await?;

    if let Some(pruner) = pruner {
        pruner.abort();
    }
    Ok(())
}
