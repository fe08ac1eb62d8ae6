//! Account handlers: profile, listing, ban management and verification.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{AccountListParams, AccountListResponse, BanRequest, PaginationMeta};
use crate::api::extract::{IdempotencyKey, Identity};
use crate::app_state::AppState;
use crate::domain::{Account, AccountId};
use crate::error::{ErrorResponse, LedgerError};

/// `GET /accounts/me` — Caller's own account.
///
/// # Errors
///
/// Returns [`LedgerError`] if the caller has no account.
#[utoipa::path(
    get,
    path = "/api/v1/accounts/me",
    tag = "Accounts",
    summary = "Get own account",
    description = "Returns the caller's account, including its authoritative balance and daily mint window.",
    responses(
        (status = 200, description = "Caller's account", body = Account),
        (status = 401, description = "Missing identity", body = ErrorResponse),
        (status = 404, description = "No account for this identity", body = ErrorResponse),
    )
)]
pub async fn me(
    State(state): State<AppState>,
    Identity(actor): Identity,
) -> Result<impl IntoResponse, LedgerError> {
    Ok(Json(state.queries.me(actor).await?))
}

/// `GET /accounts` — List accounts (admin).
///
/// # Errors
///
/// Returns [`LedgerError`] for non-admin callers.
#[utoipa::path(
    get,
    path = "/api/v1/accounts",
    tag = "Accounts",
    summary = "List accounts",
    description = "Returns every account with its balance from one consistent snapshot, optionally filtered by name or e-mail.",
    params(AccountListParams),
    responses(
        (status = 200, description = "Paginated account list", body = AccountListResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
    )
)]
pub async fn list_accounts(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Query(params): Query<AccountListParams>,
) -> Result<impl IntoResponse, LedgerError> {
    let page = state
        .queries
        .list_accounts(actor, params.term(), params.page_request())
        .await?;
    let (data, pagination) = PaginationMeta::split(page);
    Ok(Json(AccountListResponse { data, pagination }))
}

/// `GET /accounts/{id}` — One account (owner or admin).
///
/// # Errors
///
/// Returns [`LedgerError`] if not found or not visible to the caller.
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{id}",
    tag = "Accounts",
    summary = "Get account",
    params(("id" = AccountId, Path, description = "Account ID")),
    responses(
        (status = 200, description = "Account", body = Account),
        (status = 403, description = "Not the owner or an admin", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
    )
)]
pub async fn get_account(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Path(id): Path<AccountId>,
) -> Result<impl IntoResponse, LedgerError> {
    Ok(Json(state.queries.account(actor, id).await?))
}

/// `POST /accounts/{id}/ban` — Ban an account (admin).
///
/// # Errors
///
/// Returns [`LedgerError`] on a blank reason, unknown account or if the
/// account is already banned.
#[utoipa::path(
    post,
    path = "/api/v1/accounts/{id}/ban",
    tag = "Accounts",
    summary = "Ban account",
    description = "Suspends the account. Its balance stays in place; use recovery to move it.",
    params(("id" = AccountId, Path, description = "Account ID")),
    request_body = BanRequest,
    responses(
        (status = 200, description = "Banned account", body = Account),
        (status = 400, description = "Missing reason", body = ErrorResponse),
        (status = 409, description = "Already banned", body = ErrorResponse),
    )
)]
pub async fn ban_account(
    State(state): State<AppState>,
    Identity(actor): Identity,
    IdempotencyKey(key): IdempotencyKey,
    Path(id): Path<AccountId>,
    Json(req): Json<BanRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    Ok(Json(
        state.recovery.ban_account(actor, id, req.reason, key).await?,
    ))
}

/// `POST /accounts/{id}/unban` — Lift a ban (admin).
///
/// # Errors
///
/// Returns [`LedgerError`] if the account is unknown or not banned.
#[utoipa::path(
    post,
    path = "/api/v1/accounts/{id}/unban",
    tag = "Accounts",
    summary = "Unban account",
    params(("id" = AccountId, Path, description = "Account ID")),
    responses(
        (status = 200, description = "Reactivated account", body = Account),
        (status = 409, description = "Account is not banned", body = ErrorResponse),
    )
)]
pub async fn unban_account(
    State(state): State<AppState>,
    Identity(actor): Identity,
    IdempotencyKey(key): IdempotencyKey,
    Path(id): Path<AccountId>,
) -> Result<impl IntoResponse, LedgerError> {
    Ok(Json(state.recovery.unban_account(actor, id, key).await?))
}

/// `POST /accounts/{id}/verify` — Mark an account verified (admin).
///
/// # Errors
///
/// Returns [`LedgerError`] if the account is unknown.
#[utoipa::path(
    post,
    path = "/api/v1/accounts/{id}/verify",
    tag = "Accounts",
    summary = "Verify account",
    description = "Marks the account verified. Verifying an already verified account changes nothing.",
    params(("id" = AccountId, Path, description = "Account ID")),
    responses(
        (status = 200, description = "Verified account", body = Account),
        (status = 404, description = "Account not found", body = ErrorResponse),
    )
)]
pub async fn verify_account(
    State(state): State<AppState>,
    Identity(actor): Identity,
    IdempotencyKey(key): IdempotencyKey,
    Path(id): Path<AccountId>,
) -> Result<impl IntoResponse, LedgerError> {
    Ok(Json(state.recovery.verify_account(actor, id, key).await?))
}

/// Account routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/accounts", get(list_accounts))
        .route("/accounts/me", get(me))
        .route("/accounts/{id}", get(get_account))
        .route("/accounts/{id}/ban", post(ban_account))
        .route("/accounts/{id}/unban", post(unban_account))
        .route("/accounts/{id}/verify", post(verify_account))
}
