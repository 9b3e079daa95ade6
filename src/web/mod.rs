// Web server: Axum-based JSON API over the moderation pipeline.
//
// Every route except /health requires an `X-API-Key` header matching one of
// the configured keys. Errors share one body shape:
// `{"error": {"code": "...", "message": "..."}}`.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ModerationError;
use crate::jobs::JobQueue;
use crate::pipeline::Moderator;

pub mod auth;
pub mod handlers;

/// Request bodies carry base64 images (4/3 of the 5 MiB image limit) plus
/// JSON framing; batches carry several.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Shared application state threaded through all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub moderator: Arc<Moderator>,
    pub jobs: Arc<JobQueue>,
    /// Accepted API keys. Empty disables authentication.
    pub api_keys: Arc<HashSet<String>>,
}

impl AppState {
    pub fn new(moderator: Arc<Moderator>, jobs: Arc<JobQueue>, api_keys: Vec<String>) -> Self {
        Self {
            moderator,
            jobs,
            api_keys: Arc::new(api_keys.into_iter().collect()),
        }
    }
}

/// Start the Axum web server and block until it exits.
pub async fn run_server(state: AppState, port: u16, bind: &str) -> Result<()> {
    if state.api_keys.is_empty() {
        tracing::warn!("SIFT_API_KEYS is empty, the API is unauthenticated");
    }
    let app = build_router(state);

    let addr = format!("{bind}:{port}");
    info!("sift API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let protected_api = Router::new()
        .route("/moderate/text", post(handlers::moderate::moderate_text))
        .route("/moderate/image", post(handlers::moderate::moderate_image))
        .route("/moderate/batch", post(handlers::moderate::moderate_batch))
        .route("/jobs", post(handlers::jobs::submit_jobs))
        .route("/jobs/{id}", get(handlers::jobs::get_job))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    let public_api = Router::new().route("/health", get(handlers::health::health));

    Router::new()
        .merge(protected_api)
        .merge(public_api)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::HeaderName::from_static(auth::API_KEY_HEADER),
                ]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Typed JSON error response helper.
pub fn api_error(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        axum::Json(serde_json::json!({
            "error": { "code": code, "message": message }
        })),
    )
        .into_response()
}

/// A pipeline error on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ModerationError);

impl From<ModerationError> for ApiError {
    fn from(e: ModerationError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            ModerationError::Validation(_) | ModerationError::UnsupportedContentType(_) => {
                StatusCode::BAD_REQUEST
            }
            ModerationError::DedupTimeout | ModerationError::ShuttingDown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ModerationError::Analysis => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        api_error(self.status(), self.0.code(), &self.0.to_string())
    }
}

/// Marker type indicating the request passed API key authentication.
/// Inserted into request extensions by `require_api_key` middleware.
#[derive(Clone)]
pub struct ApiClient;
