//! Ledger error types with HTTP status code mapping.
//!
//! [`LedgerError`] is the central error type for the engine. Each variant
//! maps to a specific HTTP status code and structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{AccountId, TransactionId};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 4001,
///     "message": "insufficient funds in account ...: available 20, requested 500",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional machine-readable details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Engine-wide error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category           | HTTP Status                    |
/// |-----------|--------------------|--------------------------------|
/// | 1000–1999 | Validation         | 400 Bad Request                |
/// | 2000–2999 | Not Found / State  | 404 Not Found / 409 Conflict   |
/// | 3000–3999 | Server / Auth      | 401 / 403 / 500                |
/// | 4000–4999 | Ledger rules       | 422 Unprocessable / 429        |
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Malformed or missing input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Amount was zero or otherwise unusable.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Sender and recipient are the same account.
    #[error("sender and recipient must differ")]
    SameAccount,

    /// The debited account cannot cover the amount.
    #[error("insufficient funds in account {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Account that would have been overdrawn.
        account: AccountId,
        /// Balance at the time of the check.
        available: u64,
        /// Amount that was requested.
        requested: u64,
    },

    /// Operation is not legal for the current transaction or account state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// No account with the given ID exists.
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// No transaction with the given ID exists.
    #[error("transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// Daily mint cooldown has not elapsed yet.
    #[error("daily mint already claimed; next claim in {remaining_secs} s")]
    AlreadyClaimed {
        /// Seconds until the account becomes eligible again.
        remaining_secs: i64,
        /// Instant at which the account becomes eligible again.
        next_claim_at: DateTime<Utc>,
    },

    /// No usable identity was supplied with the request.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The caller's role or identity does not permit the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Transient contention; the caller may retry with the same key.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::InvalidAmount(_) => 1002,
            Self::SameAccount => 1003,
            Self::AccountNotFound(_) => 2001,
            Self::TransactionNotFound(_) => 2002,
            Self::InvalidState(_) => 2101,
            Self::Conflict(_) => 2102,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::Unauthenticated(_) => 3101,
            Self::Unauthorized(_) => 3102,
            Self::InsufficientFunds { .. } => 4001,
            Self::AlreadyClaimed { .. } => 4002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidAmount(_) | Self::SameAccount => {
                StatusCode::BAD_REQUEST
            }
            Self::AccountNotFound(_) | Self::TransactionNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::AlreadyClaimed { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` for errors that say nothing about the request itself.
    ///
    /// Transient outcomes are never cached under an idempotency key.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_) | Self::Persistence(_) | Self::Internal(_)
        )
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InsufficientFunds {
                account,
                available,
                requested,
            } => Some(serde_json::json!({
                "account_id": account,
                "available": available,
                "requested": requested,
            })),
            Self::AlreadyClaimed {
                remaining_secs,
                next_claim_at,
            } => Some(serde_json::json!({
                "remaining_secs": remaining_secs,
                "next_claim_at": next_claim_at,
            })),
            _ => None,
        }
    }
}

impl From<&LedgerError> for ErrorBody {
    fn from(err: &LedgerError) -> Self {
        Self {
            code: err.error_code(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody::from(&self),
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_funds_maps_to_422_with_details() {
        let err = LedgerError::InsufficientFunds {
            account: AccountId::new(),
            available: 20,
            requested: 500,
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.error_code(), 4001);
        let details = err.details().unwrap_or_default();
        assert_eq!(details["available"], 20);
        assert_eq!(details["requested"], 500);
    }

    #[test]
    fn role_mismatch_is_forbidden() {
        let err = LedgerError::Unauthorized("admin role required".to_string());
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn only_contention_and_server_errors_are_transient() {
        assert!(LedgerError::Conflict("lock timeout".to_string()).is_transient());
        assert!(LedgerError::Internal("boom".to_string()).is_transient());
        assert!(!LedgerError::SameAccount.is_transient());
        assert!(!LedgerError::InvalidState("x".to_string()).is_transient());
    }

    #[test]
    fn response_carries_status() {
        let response = LedgerError::TransactionNotFound(TransactionId::new()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
