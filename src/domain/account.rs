//! Account records and the request-scoped actor identity.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::AccountId;
use crate::error::LedgerError;

/// Role attached to an account and to the authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Back-office operator.
    Admin,
    /// Regular player.
    Player,
}

impl Role {
    /// Returns the wire string of this role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Player => "player",
        }
    }

    /// Parses a wire string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "player" => Some(Self::Player),
            _ => None,
        }
    }
}

/// Whether an account may act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Normal account.
    Active,
    /// Account suspended by an admin.
    Banned,
}

impl AccountStatus {
    /// Returns the wire string of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Banned => "banned",
        }
    }

    /// Parses a wire string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "banned" => Some(Self::Banned),
            _ => None,
        }
    }
}

/// Per-account daily mint cooldown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DailyMintWindow {
    /// Last successful claim, if any.
    pub last_claimed_at: Option<DateTime<Utc>>,
}

impl DailyMintWindow {
    /// Returns the first instant at which a new claim is allowed, or `None`
    /// if the account has never claimed.
    #[must_use]
    pub fn next_claim_at(&self, window: TimeDelta) -> Option<DateTime<Utc>> {
        self.last_claimed_at.map(|last| last + window)
    }

    /// Checks eligibility at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AlreadyClaimed`] with the remaining wait when
    /// less than `window` has passed since the last claim.
    pub fn check(&self, now: DateTime<Utc>, window: TimeDelta) -> Result<(), LedgerError> {
        match self.next_claim_at(window) {
            Some(next) if now < next => Err(LedgerError::AlreadyClaimed {
                remaining_secs: remaining_secs(now, next),
                next_claim_at: next,
            }),
            _ => Ok(()),
        }
    }
}

/// Whole seconds from `now` until `next`, rounded up so a caller told
/// "0 seconds" can always claim.
fn remaining_secs(now: DateTime<Utc>, next: DateTime<Utc>) -> i64 {
    let delta = next - now;
    let secs = delta.num_seconds();
    if delta > TimeDelta::seconds(secs) {
        secs + 1
    } else {
        secs
    }
}

/// Authoritative account record.
///
/// Balances are integers in the smallest chip unit and can never go
/// negative; the type makes that unrepresentable. Only the ledger engine
/// and the ban/verification operations mutate an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Account {
    /// Unique account identifier.
    pub id: AccountId,
    /// Human-readable name.
    pub display_name: String,
    /// Contact e-mail, also used for search.
    pub email: String,
    /// Account role.
    pub role: Role,
    /// Current balance in chips.
    pub balance: u64,
    /// Active or banned.
    pub status: AccountStatus,
    /// Whether the account passed verification.
    pub verified: bool,
    /// When the account was verified.
    pub verified_at: Option<DateTime<Utc>>,
    /// Reason given for the current ban.
    pub ban_reason: Option<String>,
    /// When the current ban started.
    pub banned_at: Option<DateTime<Utc>>,
    /// Daily mint cooldown state.
    pub mint_window: DailyMintWindow,
    /// Provisioning timestamp.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Creates an active, unverified account with a zero balance.
    #[must_use]
    pub fn new(id: AccountId, display_name: String, email: String, role: Role) -> Self {
        Self {
            id,
            display_name,
            email,
            role,
            balance: 0,
            status: AccountStatus::Active,
            verified: false,
            verified_at: None,
            ban_reason: None,
            banned_at: None,
            mint_window: DailyMintWindow::default(),
            created_at: Utc::now(),
        }
    }

    /// Returns `true` if the account is banned.
    #[must_use]
    pub fn is_banned(&self) -> bool {
        self.status == AccountStatus::Banned
    }

    /// Case-insensitive match of `needle` against name and e-mail.
    #[must_use]
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.display_name.to_lowercase().contains(&needle)
            || self.email.to_lowercase().contains(&needle)
    }
}

/// Provisioning record as read from the seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountSeed {
    /// Fixed account ID; generated when absent.
    #[serde(default)]
    pub id: Option<AccountId>,
    /// Display name.
    pub display_name: String,
    /// E-mail address.
    pub email: String,
    /// Role.
    pub role: Role,
    /// Opening balance.
    #[serde(default)]
    pub balance: u64,
    /// Whether the account starts verified.
    #[serde(default)]
    pub verified: bool,
}

impl AccountSeed {
    /// Builds the account this seed describes.
    #[must_use]
    pub fn into_account(self, now: DateTime<Utc>) -> Account {
        let mut account = Account::new(
            self.id.unwrap_or_default(),
            self.display_name,
            self.email,
            self.role,
        );
        account.balance = self.balance;
        account.created_at = now;
        if self.verified {
            account.verified = true;
            account.verified_at = Some(now);
        }
        account
    }
}

/// The authenticated caller of a request.
///
/// Built per request from the identity headers and passed explicitly into
/// every service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    /// Caller's account.
    pub id: AccountId,
    /// Caller's role.
    pub role: Role,
}

impl Actor {
    /// Creates an actor.
    #[must_use]
    pub const fn new(id: AccountId, role: Role) -> Self {
        Self { id, role }
    }

    /// Returns `true` for admins.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fails unless the caller is an admin.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] for non-admin callers.
    pub fn require_admin(&self) -> Result<(), LedgerError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized("admin role required".to_string()))
        }
    }

    /// Fails unless the caller is an admin or owns `account`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] otherwise.
    pub fn require_owner_or_admin(&self, account: AccountId) -> Result<(), LedgerError> {
        if self.is_admin() || self.id == account {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized(
                "only the account owner or an admin may do this".to_string(),
            ))
        }
    }
}
