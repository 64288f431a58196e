//! HTTP admin API for the bonus engine.
//!
//! Backs the bonus administration screens: template authoring, cashback
//! level management, player bonus oversight, plus the claim and settlement
//! entry points used by the player flow.
//!
//! # Modules
//!
//! - [`admin`]: Dashboard views, template CRUD and admin actions
//! - [`players`]: Claims, bet settlements, cashback quotes and bonus detail
//! - [`error`]: Error to HTTP status mapping
//! - [`middleware`]: Request metrics
//! - [`request_id`]: `x-request-id` propagation
//!
//! # Endpoints Overview
//!
//! ```text
//! GET    /health
//! GET    /bonus-engine?view=overview|templates|player-bonuses|cashback-levels
//! POST   /bonus-engine                      {action: ...}
//! POST   /bonus-engine/templates
//! PUT    /bonus-engine/templates/{id}
//! DELETE /bonus-engine/templates/{id}
//! POST   /bonus-engine/claims
//! POST   /bonus-engine/settlements
//! GET    /bonus-engine/players/{player_id}/cashback?period=day|week|month
//! GET    /bonus-engine/bonuses/{id}
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively for development. In production, configure
//! appropriate origins, methods, and headers.

pub mod admin;
pub mod error;
pub mod middleware;
pub mod players;
pub mod request_id;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post, put},
};
use bonus_engine::{SettlementHandle, db::Database};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::engine::Engine;

pub use error::{ApiError, ApiResult, ErrorResponse};

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    /// Producer side of the settlement worker pool
    pub settlements: SettlementHandle,
    /// Name of the storage backend, reported by `/health`
    pub store: String,
    /// Connection pool when running on PostgreSQL
    pub database: Option<Database>,
    /// Page size of dashboard listings
    pub page_size: u32,
}

/// Create the complete API router with all endpoints and middleware.
///
/// # Example
///
/// ```rust,no_run
/// # use bonus_server::api::{create_router, AppState};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let state: AppState = unimplemented!();
/// let app = create_router(state);
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:7070").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub fn create_router(state: AppState) -> Router {
    let bonus_routes = Router::new()
        .route("/templates", post(admin::create_template))
        .route(
            "/templates/{template_id}",
            put(admin::update_template).delete(admin::delete_template),
        )
        .route("/claims", post(players::claim_bonus))
        .route("/settlements", post(players::submit_settlement))
        .route(
            "/players/{player_id}/cashback",
            get(players::cashback_quote),
        )
        .route("/bonuses/{bonus_id}", get(players::get_bonus));

    Router::new()
        .route("/health", get(health_check))
        .route("/bonus-engine", get(admin::dashboard).post(admin::perform_action))
        .nest("/bonus-engine", bonus_routes)
        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the store is reachable, `503 Service Unavailable`
/// when the database check fails.
///
/// ```bash
/// curl http://localhost:7070/health
/// # {"status":"healthy","version":"0.1.0","store":"memory","timestamp":"2025-03-01T12:00:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let healthy = match &state.database {
        Some(db) => db.health_check().await.is_ok(),
        None => true,
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.store,
        "timestamp": state.engine.orchestrator.clock().now().to_rfc3339(),
    });

    (status_code, Json(response))
}
