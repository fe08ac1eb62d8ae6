#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;

use super::LedgerEngine;
use crate::domain::{
    Account, AccountId, AccountStore, Actor, Clock, ManualClock, Role, TransactionJournal,
};

#[derive(Debug)]
pub(crate) struct Fixture {
    pub engine: Arc<LedgerEngine>,
    pub clock: Arc<ManualClock>,
    pub admin: Actor,
}

impl Fixture {
    pub async fn new() -> Self {
        let clock = Arc::new(ManualClock::default());
        let engine = Arc::new(LedgerEngine::new(
            Arc::new(AccountStore::new(Duration::from_secs(2))),
            Arc::new(TransactionJournal::new(Duration::from_secs(2))),
            Arc::clone(&clock) as Arc<dyn Clock>,
            None,
        ));
        let fixture = Self {
            engine,
            clock,
            admin: Actor::new(AccountId::new(), Role::Admin),
        };
        fixture.insert(fixture.admin.id, "Admin", Role::Admin, 0).await;
        fixture
    }

    pub fn retention() -> TimeDelta {
        TimeDelta::hours(24)
    }

    pub async fn player(&self, name: &str, balance: u64) -> Actor {
        let id = AccountId::new();
        self.insert(id, name, Role::Player, balance).await;
        Actor::new(id, Role::Player)
    }

    async fn insert(&self, id: AccountId, name: &str, role: Role, balance: u64) {
        let mut account = Account::new(
            id,
            name.to_string(),
            format!("{}@casino.test", name.to_lowercase()),
            role,
        );
        account.balance = balance;
        let _ = self.engine.accounts().insert(account).await;
    }

    pub async fn account(&self, id: AccountId) -> Account {
        match self.engine.accounts().snapshot(id).await {
            Ok(account) => account,
            Err(e) => panic!("account {id} missing: {e}"),
        }
    }

    pub async fn balance(&self, id: AccountId) -> u64 {
        self.account(id).await.balance
    }

    pub async fn total(&self) -> u128 {
        self.engine.accounts().total_balance().await.unwrap_or(u128::MAX)
    }

    pub async fn mark(&self, id: AccountId, banned: bool, verified: bool) {
        let Ok(entry) = self.engine.accounts().get(id).await else {
            panic!("account {id} missing");
        };
        let mut account = entry.write().await;
        if banned {
            account.status = crate::domain::AccountStatus::Banned;
            account.ban_reason = Some("test".to_string());
        }
        account.verified = verified;
    }
}
