//! Read paths: accounts and transaction history.
//!
//! Reads go straight to the stores and never touch the idempotency caches.
//! Players only ever see their own account and the transactions it is a
//! party to.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::LedgerEngine;
use crate::domain::{
    Account, AccountId, Actor, Transaction, TransactionFilter, TransactionId, TransactionStatus,
    TransactionType,
};
use crate::error::LedgerError;

/// Largest page size served.
pub const MAX_PER_PAGE: u32 = 100;

/// Requested page (1-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Page number, starting at 1.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl PageRequest {
    /// Clamps `page` to at least 1 and `per_page` to `1..=MAX_PER_PAGE`.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, MAX_PER_PAGE),
        }
    }
}

/// One page of results with its position in the full list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Page number served.
    pub page: u32,
    /// Page size served.
    pub per_page: u32,
    /// Total matching items.
    pub total: u32,
    /// Total number of pages.
    pub total_pages: u32,
}

impl<T> Page<T> {
    fn slice(all: Vec<T>, request: PageRequest) -> Self {
        let request = request.clamped();
        let total = u32::try_from(all.len()).unwrap_or(u32::MAX);
        let total_pages = total.div_ceil(request.per_page);
        let skip = (request.page as usize - 1).saturating_mul(request.per_page as usize);
        let items = all
            .into_iter()
            .skip(skip)
            .take(request.per_page as usize)
            .collect();
        Self {
            items,
            page: request.page,
            per_page: request.per_page,
            total,
            total_pages,
        }
    }
}

/// Side of a transaction relative to the account it is viewed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The account was debited.
    Sent,
    /// The account was credited.
    Received,
}

/// A transaction with the parties' names resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionView {
    /// The journal entry.
    pub transaction: Transaction,
    /// Sender's display name; `None` for minted chips.
    pub from_display_name: Option<String>,
    /// Recipient's display name; `None` for burned chips.
    pub to_display_name: Option<String>,
    /// Direction relative to the viewing account, when there is one.
    pub direction: Option<Direction>,
}

/// History query parameters.
#[derive(Debug, Clone, Default)]
pub struct TransactionQuery {
    /// Only this type.
    pub kind: Option<TransactionType>,
    /// Only this status.
    pub status: Option<TransactionStatus>,
    /// Created at or after.
    pub from_date: Option<DateTime<Utc>>,
    /// Created at or before.
    pub to_date: Option<DateTime<Utc>>,
    /// Case-insensitive match on party names, reason or ID.
    pub search: Option<String>,
    /// Only transactions involving this account (admins).
    pub account_id: Option<AccountId>,
    /// Page to return.
    pub page: PageRequest,
}

/// Read-only queries over accounts and the journal.
#[derive(Debug, Clone)]
pub struct QueryService {
    engine: Arc<LedgerEngine>,
}

impl QueryService {
    /// Creates the service.
    #[must_use]
    pub fn new(engine: Arc<LedgerEngine>) -> Self {
        Self { engine }
    }

    /// The caller's own account.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountNotFound`] if the identity has no account.
    pub async fn me(&self, actor: Actor) -> Result<Account, LedgerError> {
        self.engine.accounts().snapshot(actor.id).await
    }

    /// One account, for its owner or an admin.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] or [`LedgerError::AccountNotFound`].
    pub async fn account(&self, actor: Actor, id: AccountId) -> Result<Account, LedgerError> {
        actor.require_owner_or_admin(id)?;
        self.engine.accounts().snapshot(id).await
    }

    /// All accounts from one consistent snapshot, filtered and paginated.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] for non-admin callers, or
    /// [`LedgerError::Conflict`] if the snapshot cannot be taken.
    pub async fn list_accounts(
        &self,
        actor: Actor,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<Account>, LedgerError> {
        actor.require_admin()?;
        let accounts: Vec<Account> = self
            .engine
            .accounts()
            .list()
            .await?
            .into_iter()
            .filter(|a| search.is_none_or(|s| a.matches_search(s)))
            .collect();
        Ok(Page::slice(accounts, page))
    }

    /// Transaction history, newest first.
    ///
    /// Players are confined to their own account; asking for someone
    /// else's is refused.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] or [`LedgerError::Conflict`].
    pub async fn list_transactions(
        &self,
        actor: Actor,
        query: TransactionQuery,
    ) -> Result<Page<TransactionView>, LedgerError> {
        let perspective = match query.account_id {
            Some(id) => {
                actor.require_owner_or_admin(id)?;
                Some(id)
            }
            None if actor.is_admin() => None,
            None => Some(actor.id),
        };

        let filter = TransactionFilter {
            kind: query.kind,
            status: query.status,
            from_date: query.from_date,
            to_date: query.to_date,
            involving: perspective,
        };
        let transactions = self.engine.journal().query(&filter).await?;
        let names = self.display_names().await?;
        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let views: Vec<TransactionView> = transactions
            .into_iter()
            .map(|tx| view(tx, &names, perspective))
            .filter(|v| needle.as_deref().is_none_or(|n| matches_search(v, n)))
            .collect();
        Ok(Page::slice(views, query.page))
    }

    /// One transaction, if the caller may see it.
    ///
    /// # Errors
    ///
    /// [`LedgerError::TransactionNotFound`] for unknown IDs and for
    /// transactions a player is not party to.
    pub async fn transaction(
        &self,
        actor: Actor,
        id: TransactionId,
    ) -> Result<TransactionView, LedgerError> {
        let tx = self.engine.journal().get(id).await?;
        if !actor.is_admin() && !tx.involves(actor.id) {
            return Err(LedgerError::TransactionNotFound(id));
        }
        let names = self.display_names().await?;
        let perspective = (!actor.is_admin()).then_some(actor.id);
        Ok(view(tx, &names, perspective))
    }

    async fn display_names(&self) -> Result<HashMap<AccountId, String>, LedgerError> {
        Ok(self
            .engine
            .accounts()
            .list()
            .await?
            .into_iter()
            .map(|a| (a.id, a.display_name))
            .collect())
    }
}

fn view(
    transaction: Transaction,
    names: &HashMap<AccountId, String>,
    perspective: Option<AccountId>,
) -> TransactionView {
    let name = |id: Option<AccountId>| id.and_then(|id| names.get(&id).cloned());
    let direction = perspective.and_then(|p| {
        if transaction.from_account_id == Some(p) {
            Some(Direction::Sent)
        } else if transaction.to_account_id == Some(p) {
            Some(Direction::Received)
        } else {
            None
        }
    });
    TransactionView {
        from_display_name: name(transaction.from_account_id),
        to_display_name: name(transaction.to_account_id),
        direction,
        transaction,
    }
}

fn matches_search(view: &TransactionView, needle: &str) -> bool {
    let hit = |s: Option<&str>| s.is_some_and(|s| s.to_lowercase().contains(needle));
    hit(view.from_display_name.as_deref())
        || hit(view.to_display_name.as_deref())
        || hit(view.transaction.reason.as_deref())
        || view.transaction.id.to_string().contains(needle)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::service::fixtures::Fixture;
    use crate::service::{ManualTransfer, TransferService};

    async fn seeded() -> (Fixture, QueryService, Actor, Actor) {
        let fx = Fixture::new().await;
        let transfers = TransferService::new(Arc::clone(&fx.engine), Fixture::retention());
        let p = fx.player("Penny", 1_000).await;
        let q = fx.player("Quinn", 0).await;
        let r = fx.player("Rex", 0).await;
        for (from, to, amount, reason) in [
            (p.id, q.id, 100, "lunch"),
            (q.id, p.id, 30, "change"),
            (p.id, r.id, 50, "gift"),
        ] {
            fx.clock.advance(TimeDelta::seconds(1));
            let _ = transfers
                .create_manual_transfer(
                    fx.admin,
                    ManualTransfer {
                        from: Some(from),
                        to,
                        amount,
                        reason: Some(reason.to_string()),
                    },
                    None,
                )
                .await;
        }
        let svc = QueryService::new(Arc::clone(&fx.engine));
        (fx, svc, p, q)
    }

    #[tokio::test]
    async fn player_sees_only_own_transactions_with_direction() {
        let (_fx, svc, _p, q) = seeded().await;
        let Ok(page) = svc.list_transactions(q, TransactionQuery::default()).await else {
            panic!("query failed");
        };
        assert_eq!(page.total, 2);
        let dirs: Vec<_> = page.items.iter().map(|v| v.direction).collect();
        // Newest first.
        assert_eq!(dirs, vec![Some(Direction::Sent), Some(Direction::Received)]);
        let Some(first) = page.items.first() else {
            panic!("empty page");
        };
        assert_eq!(first.from_display_name.as_deref(), Some("Quinn"));
        assert_eq!(first.to_display_name.as_deref(), Some("Penny"));
    }

    #[tokio::test]
    async fn player_cannot_query_another_account() {
        let (_fx, svc, p, q) = seeded().await;
        let query = TransactionQuery {
            account_id: Some(p.id),
            ..TransactionQuery::default()
        };
        assert!(matches!(
            svc.list_transactions(q, query).await,
            Err(LedgerError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn admin_sees_everything_and_can_search() {
        let (fx, svc, _p, _q) = seeded().await;
        let Ok(all) = svc
            .list_transactions(fx.admin, TransactionQuery::default())
            .await
        else {
            panic!("query failed");
        };
        assert_eq!(all.total, 3);
        assert!(all.items.iter().all(|v| v.direction.is_none()));

        let query = TransactionQuery {
            search: Some("REX".to_string()),
            ..TransactionQuery::default()
        };
        let Ok(found) = svc.list_transactions(fx.admin, query).await else {
            panic!("query failed");
        };
        assert_eq!(found.total, 1);
    }

    #[tokio::test]
    async fn pagination_slices_newest_first() {
        let (fx, svc, _p, _q) = seeded().await;
        let query = TransactionQuery {
            page: PageRequest {
                page: 2,
                per_page: 2,
            },
            ..TransactionQuery::default()
        };
        let Ok(page) = svc.list_transactions(fx.admin, query).await else {
            panic!("query failed");
        };
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.items.len(), 1);
        let reason = page
            .items
            .first()
            .and_then(|v| v.transaction.reason.clone());
        assert_eq!(reason.as_deref(), Some("lunch"));
    }

    #[tokio::test]
    async fn hidden_transaction_looks_missing_to_players() {
        let (fx, svc, _p, q) = seeded().await;
        let filter = TransactionQuery {
            search: Some("gift".to_string()),
            ..TransactionQuery::default()
        };
        let Ok(page) = svc.list_transactions(fx.admin, filter).await else {
            panic!("query failed");
        };
        let Some(gift) = page.items.first() else {
            panic!("gift missing");
        };
        let id = gift.transaction.id;
        assert_eq!(
            svc.transaction(q, id).await,
            Err(LedgerError::TransactionNotFound(id))
        );
        assert!(svc.transaction(fx.admin, id).await.is_ok());
    }

    #[tokio::test]
    async fn account_listing_is_admin_only_and_searchable() {
        let (fx, svc, p, q) = seeded().await;
        assert!(matches!(
            svc.list_accounts(p, None, PageRequest::default()).await,
            Err(LedgerError::Unauthorized(_))
        ));
        let Ok(page) = svc
            .list_accounts(fx.admin, Some("quinn"), PageRequest::default())
            .await
        else {
            panic!("list failed");
        };
        assert_eq!(page.total, 1);
        assert!(matches!(
            svc.account(p, q.id).await,
            Err(LedgerError::Unauthorized(_))
        ));
        assert_eq!(svc.me(q).await.map(|a| a.balance), Ok(70));
    }

    #[test]
    fn page_request_is_clamped() {
        let clamped = PageRequest {
            page: 0,
            per_page: 1_000,
        }
        .clamped();
        assert_eq!(clamped.page, 1);
        assert_eq!(clamped.per_page, MAX_PER_PAGE);
    }
}
