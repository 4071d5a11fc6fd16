//! HTTP routing and middleware
//!
//! Routes:
//! - `POST /upload` stores multipart file uploads
//! - `GET /uploaded/*` serves stored files from the upload directory
//! - everything else is served from the static asset directory

use crate::api;
use crate::config::UPLOADED_ROUTE;
use crate::state::AppState;
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use std::time::Instant;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    Router::new()
        .route(
            "/upload",
            post(api::upload_files).layer(DefaultBodyLimit::max(config.limits.max_body_bytes)),
        )
        .nest_service(UPLOADED_ROUTE, ServeDir::new(&config.storage.upload_dir))
        .fallback_service(ServeDir::new(&config.storage.static_dir))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            uploaded_access_middleware,
        ))
        // Middleware (order matters - request_id should be first)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .with_state(state)
}

/// Request ID middleware - adds unique ID to each request for tracing
async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    let response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}

/// Logs reads of uploaded files and hides dot-prefixed entries
async fn uploaded_access_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if let Some(rest) = path
        .strip_prefix(UPLOADED_ROUTE)
        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
    {
        if rest.split('/').any(is_hidden_name) {
            return StatusCode::NOT_FOUND.into_response();
        }

        if request.method() == Method::GET && state.config.log_uploaded_access {
            info!(path = %path, "GET request to uploaded file");
        }
    }

    next.run(request).await
}

/// Stored files always start with an alphanumeric prefix, so a path segment
/// starting with a dot (literal or percent-encoded) is never ours.
fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.') || name.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("%2e"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_hidden_name() {
        assert!(is_hidden_name(".upload-AbC123"));
        assert!(is_hidden_name("%2Eupload-AbC123"));
        assert!(is_hidden_name("%2eanything"));
        assert!(!is_hidden_name("aB3xY9_report.pdf"));
        assert!(!is_hidden_name(""));
    }

    #[test]
    fn test_hidden_segments_anywhere_in_path() {
        let hidden = |rest: &str| rest.split('/').any(is_hidden_name);
        assert!(hidden("//.upload-AbC123"));
        assert!(hidden("/./.upload-AbC123"));
        assert!(hidden("/%2e/x.txt"));
        assert!(hidden("/sub/.secret"));
        assert!(!hidden("/aB3xY9_report.pdf"));
        assert!(!hidden("/"));
        assert!(!hidden(""));
    }
}
