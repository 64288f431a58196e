//! HTTP error mapping.
//!
//! Engine errors become `{"error": <message>}` bodies. Messages are the
//! engines' client-safe texts; storage failures never leak details.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bonus_engine::{
    BonusError, CashbackError, CatalogError, wallet::WalletError, workers::WorkerError,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error returned by every handler
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Bonus(#[from] BonusError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Cashback(#[from] CashbackError),

    #[error(transparent)]
    Queue(#[from] WorkerError),
}

fn catalog_status(e: &CatalogError) -> StatusCode {
    match e {
        CatalogError::Validation(_) => StatusCode::BAD_REQUEST,
        CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
        CatalogError::InvalidStatusTransition { .. }
        | CatalogError::TemplateImmutableFieldsLocked { .. }
        | CatalogError::TemplateInUse { .. } => StatusCode::CONFLICT,
        CatalogError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn cashback_status(e: &CashbackError) -> StatusCode {
    match e {
        CashbackError::Validation(_) | CashbackError::LevelOrderViolation(_) => {
            StatusCode::BAD_REQUEST
        }
        CashbackError::LevelNotFound(_) => StatusCode::NOT_FOUND,
        CashbackError::NoLevelsConfigured | CashbackError::DuplicateTier(_) => StatusCode::CONFLICT,
        CashbackError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn wallet_status(e: &WalletError) -> StatusCode {
    match e {
        WalletError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        WalletError::IdempotencyMismatch(_) => StatusCode::CONFLICT,
        WalletError::Database(_) | WalletError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        WalletError::Timeout(_) | WalletError::Unavailable(_) => StatusCode::BAD_GATEWAY,
    }
}

fn bonus_status(e: &BonusError) -> StatusCode {
    match e {
        BonusError::Validation(_) => StatusCode::BAD_REQUEST,
        BonusError::TemplateNotFound(_) | BonusError::BonusNotFound(_) => StatusCode::NOT_FOUND,
        BonusError::TemplateInactive { .. }
        | BonusError::EligibilityNotMet(_)
        | BonusError::AlreadyClaimed { .. }
        | BonusError::InvalidTransition { .. }
        | BonusError::TransitionInProgress { .. }
        | BonusError::ConcurrentModification(_) => StatusCode::CONFLICT,
        BonusError::Ledger(_) => StatusCode::CONFLICT,
        BonusError::ReconciliationRequired { .. } => StatusCode::BAD_GATEWAY,
        BonusError::Wallet(e) => wallet_status(e),
        BonusError::Catalog(e) => catalog_status(e),
        BonusError::Cashback(e) => cashback_status(e),
        BonusError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Bonus(e) => bonus_status(e),
            ApiError::Catalog(e) => catalog_status(e),
            ApiError::Cashback(e) => cashback_status(e),
            ApiError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn client_message(&self) -> String {
        match self {
            ApiError::BadRequest(message) => message.clone(),
            ApiError::Bonus(e) => e.client_message(),
            ApiError::Catalog(e) => e.client_message(),
            ApiError::Cashback(e) => e.client_message(),
            ApiError::Queue(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, "Request failed: {}", self);
        } else {
            tracing::debug!(status = %status, "Request rejected: {}", self);
        }
        let body = ErrorResponse {
            error: self.client_message(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use bonus_engine::{BonusStatus, db::StoreError, ledger::TransitionKind};
    use uuid::Uuid;

    #[test]
    fn test_validation_is_bad_request() {
        let err = ApiError::from(BonusError::Validation("reason is required".to_string()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.client_message(), "Invalid request: reason is required");
    }

    #[test]
    fn test_state_errors_are_conflicts() {
        let id = Uuid::new_v4();
        let err = ApiError::from(BonusError::AlreadyClaimed {
            existing: id,
            status: BonusStatus::Wagering,
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert!(err.client_message().contains("wagering"));
    }

    #[test]
    fn test_reconciliation_is_bad_gateway() {
        let err = ApiError::from(BonusError::ReconciliationRequired {
            bonus_id: Uuid::new_v4(),
            transition: TransitionKind::Completed,
            reason: "timed out".to_string(),
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_storage_errors_are_sanitised() {
        let err = ApiError::from(BonusError::Store(StoreError::Corrupt(
            "row 42 has bad json".to_string(),
        )));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.client_message(), "Internal server error");
    }

    #[test]
    fn test_nested_catalog_error_keeps_mapping() {
        let err = ApiError::from(BonusError::Catalog(CatalogError::NotFound(Uuid::new_v4())));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_queue_full_is_unavailable() {
        let err = ApiError::from(WorkerError::QueueFull);
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
