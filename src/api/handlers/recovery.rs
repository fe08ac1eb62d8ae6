//! Recovery handlers: candidate listings and the balance sweep.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{AccountsResponse, RecoverRequest, SearchParams};
use crate::api::extract::{IdempotencyKey, Identity};
use crate::app_state::AppState;
use crate::domain::Transaction;
use crate::error::{ErrorResponse, LedgerError};

/// `GET /recovery/banned` — Banned accounts holding chips (admin).
///
/// # Errors
///
/// Returns [`LedgerError`] for non-admin callers.
#[utoipa::path(
    get,
    path = "/api/v1/recovery/banned",
    tag = "Recovery",
    summary = "List recoverable accounts",
    params(SearchParams),
    responses(
        (status = 200, description = "Banned accounts with a positive balance", body = AccountsResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
    )
)]
pub async fn list_recoverable(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, LedgerError> {
    let data = state.recovery.list_recoverable(actor, params.term()).await?;
    Ok(Json(AccountsResponse { data }))
}

/// `GET /recovery/verified` — Accounts eligible to receive chips (admin).
///
/// # Errors
///
/// Returns [`LedgerError`] for non-admin callers.
#[utoipa::path(
    get,
    path = "/api/v1/recovery/verified",
    tag = "Recovery",
    summary = "List recovery targets",
    params(SearchParams),
    responses(
        (status = 200, description = "Verified, active accounts", body = AccountsResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
    )
)]
pub async fn list_verified(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, LedgerError> {
    let data = state.recovery.list_verified(actor, params.term()).await?;
    Ok(Json(AccountsResponse { data }))
}

/// `POST /recovery` — Sweep a banned account into a verified one (admin).
///
/// # Errors
///
/// Returns [`LedgerError`] when the accounts do not meet the recovery
/// preconditions.
#[utoipa::path(
    post,
    path = "/api/v1/recovery",
    tag = "Recovery",
    summary = "Recover chips",
    description = "Moves the entire current balance of a banned account to a verified account. The amount is read at execution time.",
    request_body = RecoverRequest,
    responses(
        (status = 201, description = "Recovery transaction", body = Transaction),
        (status = 400, description = "Missing reason or same account", body = ErrorResponse),
        (status = 409, description = "Preconditions not met", body = ErrorResponse),
    )
)]
pub async fn recover(
    State(state): State<AppState>,
    Identity(actor): Identity,
    IdempotencyKey(key): IdempotencyKey,
    Json(req): Json<RecoverRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let tx = state
        .recovery
        .recover_chips(
            actor,
            req.banned_account_id,
            req.verified_account_id,
            req.reason,
            key,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// Recovery routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/recovery", post(recover))
        .route("/recovery/banned", get(list_recoverable))
        .route("/recovery/verified", get(list_verified))
}
