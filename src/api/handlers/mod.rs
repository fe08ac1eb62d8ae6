//! REST endpoint handlers organized by resource.

pub mod accounts;
pub mod daily_mint;
pub mod recovery;
pub mod system;
pub mod transactions;
pub mod transfers;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(accounts::routes())
        .merge(transfers::routes())
        .merge(transactions::routes())
        .merge(recovery::routes())
        .merge(daily_mint::routes())
}
