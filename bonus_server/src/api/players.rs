//! Player flow endpoints: claims, bet settlements, cashback quotes and
//! bonus detail.
//!
//! Claim a welcome bonus against a deposit:
//! ```bash
//! curl -X POST http://localhost:7070/bonus-engine/claims \
//!   -H "Content-Type: application/json" \
//!   -d '{"player_id": 42, "template_id": "…", "deposit_amount": 10000}'
//! ```

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use bonus_engine::{
    BetSettlement, BonusError, CashbackPeriod, CashbackQuote, ClaimRequest, LedgerEntry,
    PlayerBonus, workers::WorkerError,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, ApiResult, AppState};
use crate::metrics;

#[derive(Debug, Serialize)]
pub struct SettlementAccepted {
    pub queued: bool,
    pub bet_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CashbackQuery {
    #[serde(default)]
    pub period: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BonusDetail {
    pub bonus: PlayerBonus,
    pub entries: Vec<LedgerEntry>,
}

fn claim_result(err: &BonusError) -> &'static str {
    match err {
        BonusError::Validation(_)
        | BonusError::TemplateNotFound(_)
        | BonusError::TemplateInactive { .. }
        | BonusError::EligibilityNotMet(_)
        | BonusError::AlreadyClaimed { .. } => "rejected",
        _ => "error",
    }
}

/// Claim a bonus from an active template.
///
/// # Response
///
/// `201 Created` with the new bonus, already `completed` when the template
/// carries no wagering requirement.
///
/// # Errors
///
/// - `404 Not Found`: Template does not exist
/// - `409 Conflict`: Template inactive, player not eligible, or an open
///   bonus from the same template already exists
pub async fn claim_bonus(
    State(state): State<AppState>,
    payload: Result<Json<ClaimRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PlayerBonus>)> {
    let Json(request) = payload?;

    match state.engine.orchestrator.claim(request).await {
        Ok(bonus) => {
            metrics::bonus_claims_total("claimed");
            metrics::bonus_transitions_total(bonus.status);
            Ok((StatusCode::CREATED, Json(bonus)))
        }
        Err(e) => {
            metrics::bonus_claims_total(claim_result(&e));
            Err(e.into())
        }
    }
}

/// Queue a settled bet for the worker pool.
///
/// # Response
///
/// `202 Accepted` once queued. `503 Service Unavailable` when the queue is
/// full or the server is shutting down; the caller should retry, replays
/// are harmless.
pub async fn submit_settlement(
    State(state): State<AppState>,
    payload: Result<Json<BetSettlement>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SettlementAccepted>)> {
    let Json(bet) = payload?;

    if bet.bet_id.trim().is_empty() {
        return Err(ApiError::BadRequest("bet_id is required".to_string()));
    }
    if bet.player_id <= 0 {
        return Err(ApiError::BadRequest("player_id must be positive".to_string()));
    }

    let bet_id = bet.bet_id.clone();
    match state.settlements.try_submit(bet) {
        Ok(()) => {
            metrics::bet_settlements_total("queued");
            Ok((
                StatusCode::ACCEPTED,
                Json(SettlementAccepted {
                    queued: true,
                    bet_id,
                }),
            ))
        }
        Err(e) => {
            metrics::bet_settlements_total("rejected");
            if e == WorkerError::QueueFull {
                metrics::settlement_queue_rejections_total();
                tracing::warn!(bet_id = %bet_id, "Settlement queue full");
            }
            Err(e.into())
        }
    }
}

/// Cashback owed to a player for the period ending now (`month` by default).
pub async fn cashback_quote(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    query: Result<Query<CashbackQuery>, QueryRejection>,
) -> ApiResult<Json<CashbackQuote>> {
    let Path(player_id) = path?;
    let Query(query) = query?;

    let period = match query.period.as_deref() {
        None | Some("") => CashbackPeriod::Month,
        Some(p) => p.parse().map_err(ApiError::BadRequest)?,
    };

    let quote = state
        .engine
        .cashback
        .compute_cashback(player_id, period)
        .await?;
    Ok(Json(quote))
}

/// Bonus with its ledger entries.
pub async fn get_bonus(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<BonusDetail>> {
    let Path(bonus_id) = path?;
    let (bonus, entries) = state
        .engine
        .orchestrator
        .bonus_with_entries(bonus_id)
        .await?;
    Ok(Json(BonusDetail { bonus, entries }))
}
