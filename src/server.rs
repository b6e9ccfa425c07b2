//! Axum router construction.
//!
//! The [`app`] function wires the blob endpoints, health probe, metrics and
//! OpenAPI document to their handlers and returns a ready-to-serve
//! [`axum::Router`].

use axum::{
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::errors::{generate_request_id, ApiError, REQUEST_ID_HEADER};
use crate::handlers::blob::ReadBlobQuery;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the blob-quickstart API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "blob-quickstart API",
        version = "0.1.0",
        description = "Read and write Azure Blob Storage files using a managed identity"
    ),
    paths(
        health_check,
        crate::handlers::blob::read_blob,
        crate::handlers::blob::write_blob,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Blob", description = "Blob read and write operations"),
    )
)]
pub struct ApiDoc;

/// Build the axum [`Router`] with all routes.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/openapi.json", get(openapi_json))
        .route("/", get(handle_read).post(handle_write));

    if state.config.observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .with_state(state)
        // Inner layers run first, outer layers wrap them.
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .layer(middleware::from_fn(common_headers_middleware))
        // Outermost so it sees the final status, timeouts included.
        .layer(middleware::from_fn(metrics_middleware))
        // Bodies are buffered whole and not size-checked.
        .layer(DefaultBodyLimit::disable())
}

// -- Common headers middleware -----------------------------------------------

/// Middleware that adds common response headers to every response:
/// - `x-request-id`: 16-character uppercase hex string
/// - `Server`: `blob-quickstart`
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    // Error responses already carry the ID they logged.
    if !headers.contains_key(REQUEST_ID_HEADER) {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert(REQUEST_ID_HEADER, value);
        }
    }

    headers.insert("server", HeaderValue::from_static("blob-quickstart"));

    response
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

/// `GET /openapi.json` -- The OpenAPI document.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

// -- Dispatch ----------------------------------------------------------------

/// `GET /?fileName=...` -- ReadBlob
async fn handle_read(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReadBlobQuery>,
) -> Result<Response, ApiError> {
    crate::handlers::blob::read_blob(state, query).await
}

/// `POST /` -- WriteBlob
async fn handle_write(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<Response, ApiError> {
    crate::handlers::blob::write_blob(state, body).await
}

// -- Tests --------------------------------------------------------------------
