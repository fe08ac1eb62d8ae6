//! Daily mint handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{BatchMintRequest, MintReportResponse, MintStatusResponse, MintTargetParams};
use crate::api::extract::{IdempotencyKey, Identity};
use crate::app_state::AppState;
use crate::domain::Transaction;
use crate::error::{ErrorResponse, LedgerError};

/// `POST /daily-mint/claim` — Claim the daily credit.
///
/// # Errors
///
/// Returns [`LedgerError`] inside the cooldown window or for banned
/// accounts.
#[utoipa::path(
    post,
    path = "/api/v1/daily-mint/claim",
    tag = "Daily Mint",
    summary = "Claim daily mint",
    description = "Credits the daily amount once per rolling window. The cooldown is enforced from server state; a refused claim reports the remaining wait in `details`.",
    params(MintTargetParams),
    responses(
        (status = 201, description = "Mint transaction", body = Transaction),
        (status = 409, description = "Account banned or not a player", body = ErrorResponse),
        (status = 429, description = "Already claimed in this window", body = ErrorResponse),
    )
)]
pub async fn claim(
    State(state): State<AppState>,
    Identity(actor): Identity,
    IdempotencyKey(key): IdempotencyKey,
    Query(params): Query<MintTargetParams>,
) -> Result<impl IntoResponse, LedgerError> {
    let account = params.account_id.unwrap_or(actor.id);
    let tx = state.mint.claim_daily_mint(actor, account, key).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// `GET /daily-mint/status` — Eligibility and remaining wait.
///
/// # Errors
///
/// Returns [`LedgerError`] if the account is unknown or not visible.
#[utoipa::path(
    get,
    path = "/api/v1/daily-mint/status",
    tag = "Daily Mint",
    summary = "Daily mint status",
    params(MintTargetParams),
    responses(
        (status = 200, description = "Eligibility", body = MintStatusResponse),
        (status = 403, description = "Not the owner or an admin", body = ErrorResponse),
    )
)]
pub async fn status(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Query(params): Query<MintTargetParams>,
) -> Result<impl IntoResponse, LedgerError> {
    let account = params.account_id.unwrap_or(actor.id);
    let status = state.mint.status(actor, account).await?;
    Ok(Json(MintStatusResponse::from(status)))
}

/// `POST /daily-mint/batch` — Credit every eligible player (admin).
///
/// # Errors
///
/// Returns [`LedgerError`] for non-admin callers or a zero amount;
/// per-account failures are reported in the body.
#[utoipa::path(
    post,
    path = "/api/v1/daily-mint/batch",
    tag = "Daily Mint",
    summary = "Batch daily mint",
    description = "Credits each eligible player independently. Ineligible or failing accounts are listed under `skipped` with the reason.",
    request_body = BatchMintRequest,
    responses(
        (status = 200, description = "Mint report", body = MintReportResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
    )
)]
pub async fn batch(
    State(state): State<AppState>,
    Identity(actor): Identity,
    IdempotencyKey(key): IdempotencyKey,
    Json(req): Json<BatchMintRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let report = state
        .mint
        .mint_for_all_eligible(actor, req.amount, key)
        .await?;
    Ok(Json(MintReportResponse::from(report)))
}

/// Daily mint routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/daily-mint/claim", post(claim))
        .route("/daily-mint/status", get(status))
        .route("/daily-mint/batch", post(batch))
}
