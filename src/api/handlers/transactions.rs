//! Transaction handlers: history and request / reversal decisions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    PaginationMeta, RejectRequest, ReverseRequest, TransactionDto, TransactionListParams,
    TransactionListResponse,
};
use crate::api::extract::{IdempotencyKey, Identity};
use crate::app_state::AppState;
use crate::domain::{Transaction, TransactionId};
use crate::error::{ErrorResponse, LedgerError};

/// `GET /transactions` — Transaction history, newest first.
///
/// # Errors
///
/// Returns [`LedgerError`] if a player asks for another account.
#[utoipa::path(
    get,
    path = "/api/v1/transactions",
    tag = "Transactions",
    summary = "List transactions",
    description = "Players see only transactions involving their own account. Admins see everything and may narrow to one account with `account_id`.",
    params(TransactionListParams),
    responses(
        (status = 200, description = "Paginated history", body = TransactionListResponse),
        (status = 403, description = "Account not visible to caller", body = ErrorResponse),
    )
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Query(params): Query<TransactionListParams>,
) -> Result<impl IntoResponse, LedgerError> {
    let page = state
        .queries
        .list_transactions(actor, params.into())
        .await?;
    let (items, pagination) = PaginationMeta::split(page);
    Ok(Json(TransactionListResponse {
        data: items.into_iter().map(TransactionDto::from).collect(),
        pagination,
    }))
}

/// `GET /transactions/{id}` — One transaction.
///
/// # Errors
///
/// Returns [`LedgerError`] if unknown or not visible to the caller.
#[utoipa::path(
    get,
    path = "/api/v1/transactions/{id}",
    tag = "Transactions",
    summary = "Get transaction",
    params(("id" = TransactionId, Path, description = "Transaction ID")),
    responses(
        (status = 200, description = "Transaction", body = TransactionDto),
        (status = 404, description = "Transaction not found", body = ErrorResponse),
    )
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Path(id): Path<TransactionId>,
) -> Result<impl IntoResponse, LedgerError> {
    let view = state.queries.transaction(actor, id).await?;
    Ok(Json(TransactionDto::from(view)))
}

/// `POST /transactions/{id}/approve` — Approve a pending request (admin).
///
/// # Errors
///
/// Returns [`LedgerError`] if the request is not pending or the requester
/// can no longer cover it.
#[utoipa::path(
    post,
    path = "/api/v1/transactions/{id}/approve",
    tag = "Transactions",
    summary = "Approve transfer request",
    description = "Re-checks the requester's current balance, moves the chips and marks the request approved. On insufficient funds the request stays pending.",
    params(("id" = TransactionId, Path, description = "Transaction ID")),
    responses(
        (status = 200, description = "Approved request", body = Transaction),
        (status = 404, description = "Transaction not found", body = ErrorResponse),
        (status = 409, description = "Not a pending request", body = ErrorResponse),
        (status = 422, description = "Insufficient funds", body = ErrorResponse),
    )
)]
pub async fn approve_request(
    State(state): State<AppState>,
    Identity(actor): Identity,
    IdempotencyKey(key): IdempotencyKey,
    Path(id): Path<TransactionId>,
) -> Result<impl IntoResponse, LedgerError> {
    Ok(Json(state.transfers.approve_request(actor, id, key).await?))
}

/// `POST /transactions/{id}/reject` — Reject a pending request (admin).
///
/// # Errors
///
/// Returns [`LedgerError`] if the request is not pending.
#[utoipa::path(
    post,
    path = "/api/v1/transactions/{id}/reject",
    tag = "Transactions",
    summary = "Reject transfer request",
    params(("id" = TransactionId, Path, description = "Transaction ID")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Rejected request", body = Transaction),
        (status = 409, description = "Not a pending request", body = ErrorResponse),
    )
)]
pub async fn reject_request(
    State(state): State<AppState>,
    Identity(actor): Identity,
    IdempotencyKey(key): IdempotencyKey,
    Path(id): Path<TransactionId>,
    Json(req): Json<RejectRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    Ok(Json(
        state
            .transfers
            .reject_request(actor, id, req.reason, key)
            .await?,
    ))
}

/// `POST /transactions/{id}/reverse` — Undo a manual transfer (admin).
///
/// # Errors
///
/// Returns [`LedgerError`] if the transfer cannot be reversed or the
/// recipient no longer holds the chips.
#[utoipa::path(
    post,
    path = "/api/v1/transactions/{id}/reverse",
    tag = "Transactions",
    summary = "Reverse manual transfer",
    description = "Moves the amount back from the recipient to the original sender (burning it if the transfer was a mint) and records a linked reversal. A transfer can be reversed once.",
    params(("id" = TransactionId, Path, description = "Transaction ID")),
    request_body = ReverseRequest,
    responses(
        (status = 201, description = "Reversal transaction", body = Transaction),
        (status = 400, description = "Missing reason", body = ErrorResponse),
        (status = 409, description = "Not reversible", body = ErrorResponse),
        (status = 422, description = "Recipient cannot cover the reversal", body = ErrorResponse),
    )
)]
pub async fn reverse_transaction(
    State(state): State<AppState>,
    Identity(actor): Identity,
    IdempotencyKey(key): IdempotencyKey,
    Path(id): Path<TransactionId>,
    Json(req): Json<ReverseRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let reversal = state
        .transfers
        .reverse_transaction(actor, id, req.reason, key)
        .await?;
    Ok((StatusCode::CREATED, Json(reversal)))
}

/// Transaction routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/transactions", get(list_transactions))
        .route("/transactions/{id}", get(get_transaction))
        .route("/transactions/{id}/approve", post(approve_request))
        .route("/transactions/{id}/reject", post(reject_request))
        .route("/transactions/{id}/reverse", post(reverse_transaction))
}
