//! Transfer creation handlers: manual, bulk and player requests.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{
    BulkTransferRequest, BulkTransferResponse, ManualTransferRequest, TransferRequestBody,
};
use crate::api::extract::{IdempotencyKey, Identity};
use crate::app_state::AppState;
use crate::domain::Transaction;
use crate::error::{ErrorResponse, LedgerError};

/// `POST /transfers` — Admin transfer, applied immediately.
///
/// # Errors
///
/// Returns [`LedgerError`] on invalid input, unknown accounts or
/// insufficient funds.
#[utoipa::path(
    post,
    path = "/api/v1/transfers",
    tag = "Transfers",
    summary = "Create manual transfer",
    description = "Moves chips between accounts (or mints them when `from_account_id` is omitted) and journals the transfer as approved. Send an `Idempotency-Key` header to make retries safe.",
    request_body = ManualTransferRequest,
    responses(
        (status = 201, description = "Transfer applied", body = Transaction),
        (status = 400, description = "Invalid amount or same account", body = ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
        (status = 422, description = "Insufficient funds", body = ErrorResponse),
    )
)]
pub async fn create_manual_transfer(
    State(state): State<AppState>,
    Identity(actor): Identity,
    IdempotencyKey(key): IdempotencyKey,
    Json(req): Json<ManualTransferRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let tx = state
        .transfers
        .create_manual_transfer(actor, req.into(), key)
        .await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// `POST /transfers/bulk` — Several admin transfers, each independent.
///
/// # Errors
///
/// Returns [`LedgerError`] for non-admin callers or an empty batch; item
/// failures are reported in the body.
#[utoipa::path(
    post,
    path = "/api/v1/transfers/bulk",
    tag = "Transfers",
    summary = "Create bulk transfers",
    description = "Applies each item as a manual transfer. A failing item does not stop the others; the response lists both outcomes by index.",
    request_body = BulkTransferRequest,
    responses(
        (status = 200, description = "Per-item report", body = BulkTransferResponse),
        (status = 400, description = "Empty or oversized batch", body = ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
    )
)]
pub async fn create_bulk_transfers(
    State(state): State<AppState>,
    Identity(actor): Identity,
    IdempotencyKey(key): IdempotencyKey,
    Json(req): Json<BulkTransferRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let items = req.items.into_iter().map(Into::into).collect();
    let report = state
        .transfers
        .create_bulk_transfers(actor, items, key)
        .await?;
    Ok(Json(BulkTransferResponse::from(report)))
}

/// `POST /transfer-requests` — Player asks to send chips.
///
/// # Errors
///
/// Returns [`LedgerError`] on invalid input or if the caller is banned.
#[utoipa::path(
    post,
    path = "/api/v1/transfer-requests",
    tag = "Transfers",
    summary = "Create transfer request",
    description = "Files a pending transfer from the caller's account. No chips move until an admin approves it.",
    request_body = TransferRequestBody,
    responses(
        (status = 201, description = "Pending request", body = Transaction),
        (status = 400, description = "Invalid amount or same account", body = ErrorResponse),
        (status = 404, description = "Recipient not found", body = ErrorResponse),
        (status = 409, description = "Caller is banned", body = ErrorResponse),
    )
)]
pub async fn create_transfer_request(
    State(state): State<AppState>,
    Identity(actor): Identity,
    IdempotencyKey(key): IdempotencyKey,
    Json(req): Json<TransferRequestBody>,
) -> Result<impl IntoResponse, LedgerError> {
    let tx = state
        .transfers
        .create_transfer_request(actor, req.to_account_id, req.amount, req.note, key)
        .await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// Transfer routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/transfers", post(create_manual_transfer))
        .route("/transfers/bulk", post(create_bulk_transfers))
        .route("/transfer-requests", post(create_transfer_request))
}
