//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use crate::api::dto;
use crate::api::handlers::{accounts, daily_mint, recovery, system, transactions, transfers};
use crate::domain::{
    Account, AccountId, AccountStatus, DailyMintWindow, Role, Transaction, TransactionId,
    TransactionStatus, TransactionType,
};
use crate::error::{ErrorBody, ErrorResponse};

/// Generated OpenAPI specification, served by Swagger UI when the
/// `swagger-ui` feature is enabled.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "chip-ledger",
        description = "Ledger and transfer workflow for a chip economy. Every request carries `X-Account-Id` and `X-Account-Role` headers set by the upstream identity provider; mutating requests accept an optional `Idempotency-Key`."
    ),
    paths(
        system::health_handler,
        accounts::me,
        accounts::list_accounts,
        accounts::get_account,
        accounts::ban_account,
        accounts::unban_account,
        accounts::verify_account,
        transfers::create_manual_transfer,
        transfers::create_bulk_transfers,
        transfers::create_transfer_request,
        transactions::list_transactions,
        transactions::get_transaction,
        transactions::approve_request,
        transactions::reject_request,
        transactions::reverse_transaction,
        recovery::list_recoverable,
        recovery::list_verified,
        recovery::recover,
        daily_mint::claim,
        daily_mint::status,
        daily_mint::batch,
    ),
    components(schemas(
        AccountId,
        TransactionId,
        Account,
        AccountStatus,
        Role,
        DailyMintWindow,
        Transaction,
        TransactionType,
        TransactionStatus,
        ErrorResponse,
        ErrorBody,
        system::HealthResponse,
        dto::PaginationMeta,
        dto::AccountListResponse,
        dto::ManualTransferRequest,
        dto::BulkTransferRequest,
        dto::TransferRequestBody,
        dto::RejectRequest,
        dto::ReverseRequest,
        dto::BulkSuccessDto,
        dto::BulkFailureDto,
        dto::BulkTransferResponse,
        dto::DirectionDto,
        dto::TransactionDto,
        dto::TransactionListResponse,
        dto::RecoverRequest,
        dto::BanRequest,
        dto::AccountsResponse,
        dto::MintStatusResponse,
        dto::BatchMintRequest,
        dto::MintCreditDto,
        dto::MintSkipDto,
        dto::MintReportResponse,
    )),
    tags(
        (name = "System", description = "Service health"),
        (name = "Accounts", description = "Profiles, bans and verification"),
        (name = "Transfers", description = "Manual, bulk and requested transfers"),
        (name = "Transactions", description = "History, approvals and reversals"),
        (name = "Recovery", description = "Moving chips out of banned accounts"),
        (name = "Daily Mint", description = "Once-per-window chip credit"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/health",
            "/api/v1/accounts/me",
            "/api/v1/transfers/bulk",
            "/api/v1/transactions/{id}/reverse",
            "/api/v1/recovery",
            "/api/v1/daily-mint/claim",
        ] {
            assert!(paths.contains(&expected), "missing {expected}");
        }
    }
}
