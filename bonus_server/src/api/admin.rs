//! Admin dashboard, template CRUD and admin actions.
//!
//! # Examples
//!
//! Templates page, second page of active templates:
//! ```bash
//! curl 'http://localhost:7070/bonus-engine?view=templates&status=active&page=2'
//! ```
//!
//! Cancel a player bonus:
//! ```bash
//! curl -X POST http://localhost:7070/bonus-engine \
//!   -H "Content-Type: application/json" \
//!   -d '{"action": "cancel_bonus", "bonus_id": "…", "reason": "Duplicate account"}'
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
    BonusStatus, BonusType, CashbackLevel,
    catalog::{BonusTemplate, NewTemplate, TemplateFilter, TemplatePatch, TemplateStatus},
    db::Page,
    ledger::BonusFilter,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{str::FromStr, time::Instant};
use uuid::Uuid;

use super::{ApiError, ApiResult, AppState, request_id::RequestId};
use crate::{logging, metrics};

/// Actor recorded when a request does not name one
pub const DEFAULT_ADMIN_ACTOR: &str = "admin";

fn default_actor() -> String {
    DEFAULT_ADMIN_ACTOR.to_string()
}

/// Query string of `GET /bonus-engine`
#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    #[serde(default)]
    pub view: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "type")]
    pub bonus_type: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub player_id: Option<i64>,
}

/// Body of `POST /bonus-engine`
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminAction {
    CancelBonus {
        bonus_id: Uuid,
        reason: String,
        #[serde(default = "default_actor")]
        actor: String,
    },
    ForfeitBonus {
        bonus_id: Uuid,
        reason: String,
        #[serde(default = "default_actor")]
        actor: String,
    },
    ReconcileBonus {
        bonus_id: Uuid,
    },
    ProcessExpired,
    CreateCashbackLevel {
        level: CashbackLevel,
    },
    UpdateCashbackLevel {
        level: CashbackLevel,
    },
}

/// Body of `PUT /bonus-engine/templates/{id}`.
///
/// Field edits and a status change may be combined; edits apply first.
#[derive(Debug, Default, Deserialize)]
pub struct TemplateUpdate {
    #[serde(default)]
    pub status: Option<TemplateStatus>,
    #[serde(flatten)]
    pub patch: TemplatePatch,
}

#[derive(Debug, Serialize)]
struct ListResponse<T> {
    view: &'static str,
    items: Vec<T>,
    total: u64,
    page: u32,
    page_size: u32,
    total_pages: u64,
}

impl<T> ListResponse<T> {
    fn new(view: &'static str, page: Page<T>) -> Self {
        let total_pages = page.total_pages();
        Self {
            view,
            items: page.items,
            total: page.total,
            page: page.page,
            page_size: page.page_size,
            total_pages,
        }
    }
}

/// Treat an absent, empty or `all` filter as no filter.
fn parse_filter<T>(value: Option<&str>) -> ApiResult<Option<T>>
where
    T: FromStr<Err = String>,
{
    match value.map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(v) => v.parse().map(Some).map_err(ApiError::BadRequest),
    }
}

/// Dashboard views.
///
/// `view` is one of `overview` (default), `templates`, `player-bonuses`
/// and `cashback-levels`. The listing views accept `status`, `type` and
/// `page`; `player-bonuses` also accepts `player_id`.
///
/// # Errors
///
/// - `400 Bad Request`: Unknown view or filter value
pub async fn dashboard(
    State(state): State<AppState>,
    query: Result<Query<DashboardQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(state.page_size);
    let bonus_type: Option<BonusType> = parse_filter(query.bonus_type.as_deref())?;

    match query.view.as_deref().unwrap_or("overview") {
        "overview" => overview(&state).await,
        "templates" => {
            let filter = TemplateFilter {
                status: parse_filter(query.status.as_deref())?,
                bonus_type,
                category: None,
                page,
                page_size,
            };
            let templates = state.engine.catalog.list(&filter).await?;
            Ok(Json(json!(ListResponse::new("templates", templates))))
        }
        "player-bonuses" => {
            let filter = BonusFilter {
                player_id: query.player_id,
                status: parse_filter::<BonusStatus>(query.status.as_deref())?,
                bonus_type,
                page,
                page_size,
            };
            let bonuses = state.engine.orchestrator.list_bonuses(&filter).await?;
            Ok(Json(json!(ListResponse::new("player-bonuses", bonuses))))
        }
        "cashback-levels" => {
            let levels = state.engine.cashback.levels().await?;
            Ok(Json(json!({ "view": "cashback-levels", "levels": levels })))
        }
        other => Err(ApiError::BadRequest(format!("unknown view '{other}'"))),
    }
}

async fn overview(state: &AppState) -> ApiResult<Json<Value>> {
    let stats = state.engine.orchestrator.stats().await?;

    let count = |status: Option<TemplateStatus>| TemplateFilter {
        status,
        page: 1,
        page_size: 1,
        ..Default::default()
    };
    let all_templates = state.engine.catalog.list(&count(None)).await?.total;
    let active_templates = state
        .engine
        .catalog
        .list(&count(Some(TemplateStatus::Active)))
        .await?
        .total;
    let levels = state.engine.cashback.levels().await?.len();

    let (processed, failed, rejected) = state.settlements.stats().snapshot();

    Ok(Json(json!({
        "view": "overview",
        "stats": stats,
        "templates": { "total": all_templates, "active": active_templates },
        "cashback_levels": levels,
        "settlement_queue": {
            "free_capacity": state.settlements.capacity(),
            "processed": processed,
            "failed": failed,
            "rejected": rejected,
        },
    })))
}

/// Admin actions: cancel, forfeit or reconcile a bonus, run the expiry
/// sweep now, create or update a cashback level.
///
/// # Errors
///
/// - `400 Bad Request`: Unknown action, missing reason, invalid level
/// - `404 Not Found`: Bonus or level does not exist
/// - `409 Conflict`: Bonus already terminal or mid-transition, tier clash
/// - `502 Bad Gateway`: Wallet unavailable; the bonus is flagged for reconciliation
pub async fn perform_action(
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<AdminAction>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(action) = payload?;
    let orchestrator = &state.engine.orchestrator;

    match action {
        AdminAction::CancelBonus {
            bonus_id,
            reason,
            actor,
        } => {
            let bonus = orchestrator.cancel(bonus_id, &reason, &actor).await?;
            metrics::bonus_transitions_total(bonus.status);
            logging::log_admin_action(
                "cancel_bonus",
                &actor,
                &bonus_id.to_string(),
                &format!("{} [{}]", reason.trim(), request_id.as_str()),
            );
            Ok(Json(json!({ "bonus": bonus })))
        }
        AdminAction::ForfeitBonus {
            bonus_id,
            reason,
            actor,
        } => {
            let bonus = orchestrator.forfeit(bonus_id, &reason, &actor).await?;
            metrics::bonus_transitions_total(bonus.status);
            logging::log_admin_action(
                "forfeit_bonus",
                &actor,
                &bonus_id.to_string(),
                &format!("{} [{}]", reason.trim(), request_id.as_str()),
            );
            Ok(Json(json!({ "bonus": bonus })))
        }
        AdminAction::ReconcileBonus { bonus_id } => {
            let bonus = orchestrator.reconcile(bonus_id).await?;
            if bonus.status.is_terminal() {
                metrics::bonus_transitions_total(bonus.status);
            }
            logging::log_admin_action(
                "reconcile_bonus",
                DEFAULT_ADMIN_ACTOR,
                &bonus_id.to_string(),
                &format!("now {} [{}]", bonus.status, request_id.as_str()),
            );
            Ok(Json(json!({ "bonus": bonus })))
        }
        AdminAction::ProcessExpired => {
            let start = Instant::now();
            let report = state.engine.sweeper.tick().await?;
            logging::log_performance(
                "process_expired",
                start.elapsed().as_millis() as u64,
                Some(request_id.as_str()),
            );
            logging::log_sweep(&report);
            metrics::record_sweep(&report);
            Ok(Json(json!({ "report": report })))
        }
        AdminAction::CreateCashbackLevel { level } => {
            let level = state.engine.cashback.create_level(level).await?;
            logging::log_admin_action(
                "create_cashback_level",
                DEFAULT_ADMIN_ACTOR,
                &level.tier.to_string(),
                &level.name,
            );
            Ok(Json(json!({ "level": level })))
        }
        AdminAction::UpdateCashbackLevel { level } => {
            let level = state.engine.cashback.update_level(level).await?;
            logging::log_admin_action(
                "update_cashback_level",
                DEFAULT_ADMIN_ACTOR,
                &level.tier.to_string(),
                &level.name,
            );
            Ok(Json(json!({ "level": level })))
        }
    }
}

/// Create a template in `draft` status.
///
/// # Response
///
/// `201 Created` with the stored template.
pub async fn create_template(
    State(state): State<AppState>,
    payload: Result<Json<NewTemplate>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<BonusTemplate>)> {
    let Json(new) = payload?;
    let template = state.engine.catalog.create(new).await?;
    logging::log_admin_action(
        "create_template",
        DEFAULT_ADMIN_ACTOR,
        &template.id.to_string(),
        &template.name,
    );
    Ok((StatusCode::CREATED, Json(template)))
}

/// Edit a template and/or change its status.
///
/// # Errors
///
/// - `409 Conflict`: Financial fields of a claimed template, or a status
///   change outside draft -> active <-> paused
pub async fn update_template(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<TemplateUpdate>, JsonRejection>,
) -> ApiResult<Json<BonusTemplate>> {
    let Path(template_id) = path?;
    let Json(update) = payload?;

    if update.status.is_none() && update.patch.is_empty() {
        return Err(ApiError::BadRequest("nothing to update".to_string()));
    }

    let template = state
        .engine
        .catalog
        .edit(template_id, update.patch, update.status)
        .await?;

    logging::log_admin_action(
        "update_template",
        DEFAULT_ADMIN_ACTOR,
        &template_id.to_string(),
        &format!("{} is {}", template.name, template.status),
    );
    Ok(Json(template))
}

/// Delete a template nobody has claimed.
///
/// # Response
///
/// `204 No Content`; `409 Conflict` when bonuses reference the template.
pub async fn delete_template(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(template_id) = path?;
    state.engine.catalog.delete(template_id).await?;
    logging::log_admin_action(
        "delete_template",
        DEFAULT_ADMIN_ACTOR,
        &template_id.to_string(),
        "Deleted",
    );
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter_treats_all_as_none() {
        assert_eq!(parse_filter::<BonusStatus>(None).unwrap(), None);
        assert_eq!(parse_filter::<BonusStatus>(Some("all")).unwrap(), None);
        assert_eq!(parse_filter::<BonusStatus>(Some("")).unwrap(), None);
        assert_eq!(
            parse_filter::<BonusStatus>(Some("wagering")).unwrap(),
            Some(BonusStatus::Wagering)
        );
        assert!(parse_filter::<BonusType>(Some("jackpot")).is_err());
    }

    #[test]
    fn test_admin_action_parsing() {
        let action: AdminAction = serde_json::from_value(json!({
            "action": "cancel_bonus",
            "bonus_id": "6f1c9a1e-93c4-4c8e-9d1f-1b8e7c3f0a11",
            "reason": "Duplicate account",
        }))
        .unwrap();
        match action {
            AdminAction::CancelBonus { actor, reason, .. } => {
                assert_eq!(actor, "admin");
                assert_eq!(reason, "Duplicate account");
            }
            other => panic!("unexpected action {other:?}"),
        }

        let action: AdminAction =
            serde_json::from_value(json!({ "action": "process_expired" })).unwrap();
        assert!(matches!(action, AdminAction::ProcessExpired));

        assert!(serde_json::from_value::<AdminAction>(json!({ "action": "delete_all" })).is_err());
    }

    #[test]
    fn test_template_update_splits_status_from_patch() {
        let update: TemplateUpdate =
            serde_json::from_value(json!({ "status": "paused" })).unwrap();
        assert_eq!(update.status, Some(TemplateStatus::Paused));
        assert!(update.patch.is_empty());

        let update: TemplateUpdate =
            serde_json::from_value(json!({ "name": "Spring reload" })).unwrap();
        assert_eq!(update.status, None);
        assert!(!update.patch.is_empty());
        assert_eq!(update.patch.name.as_deref(), Some("Spring reload"));
    }
}
