//! Request metrics middleware.
//!
//! Records `http_requests_total` and `http_request_duration_ms` for every
//! request, labelled with the matched route rather than the raw URI so that
//! path parameters do not explode label cardinality.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::{logging, metrics};

/// Middleware recording request count and latency
///
/// # Example
///
/// ```rust,no_run
/// use axum::{Router, routing::get, middleware};
/// use bonus_server::api::middleware::track_metrics;
///
/// let app: Router = Router::new()
///     .route("/health", get(|| async { "ok" }))
///     .layer(middleware::from_fn(track_metrics));
/// # let _ = app;
/// ```
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();
    metrics::http_requests_total(&method, &path, status);
    metrics::http_request_duration_ms(&method, &path, elapsed.as_secs_f64() * 1000.0);
    logging::log_performance(
        &format!("{method} {path}"),
        elapsed.as_millis() as u64,
        None,
    );

    response
}
