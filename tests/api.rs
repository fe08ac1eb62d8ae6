//! End-to-end tests: a real server on an ephemeral port, driven over HTTP.

#![allow(clippy::panic, clippy::indexing_slicing)]

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{Value, json};

use chip_ledger::api::build_app;
use chip_ledger::app_state::AppState;
use chip_ledger::config::LedgerConfig;
use chip_ledger::domain::{
    Account, AccountId, AccountStore, Clock, Role, SystemClock, TransactionJournal,
};
use chip_ledger::service::LedgerEngine;

struct TestServer {
    base: String,
    client: reqwest::Client,
    admin: AccountId,
    alice: AccountId,
    bob: AccountId,
}

impl TestServer {
    async fn start() -> Self {
        let config = LedgerConfig::default();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let accounts = Arc::new(AccountStore::new(config.lock_timeout()));
        let journal = Arc::new(TransactionJournal::new(config.lock_timeout()));

        let admin = insert(&accounts, "Admin", Role::Admin, 0).await;
        let alice = insert(&accounts, "Alice", Role::Player, 100).await;
        let bob = insert(&accounts, "Bob", Role::Player, 20).await;

        let engine = Arc::new(LedgerEngine::new(accounts, journal, clock, None));
        let app = build_app(AppState::new(engine, &config), &config);

        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            admin,
            alice,
            bob,
        }
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        caller: AccountId,
        role: &str,
    ) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base))
            .header("x-account-id", caller.to_string())
            .header("x-account-role", role)
    }

    async fn balance(&self, id: AccountId) -> u64 {
        let body = send(self.request(
            reqwest::Method::GET,
            &format!("/api/v1/accounts/{id}"),
            self.admin,
            "admin",
        ))
        .await
        .1;
        body["balance"].as_u64().unwrap_or_default()
    }
}

async fn insert(store: &AccountStore, name: &str, role: Role, balance: u64) -> AccountId {
    let mut account = Account::new(
        AccountId::new(),
        name.to_string(),
        format!("{}@casino.test", name.to_lowercase()),
        role,
    );
    account.balance = balance;
    let Ok(id) = store.insert(account).await else {
        panic!("insert failed");
    };
    id
}

async fn send(req: reqwest::RequestBuilder) -> (StatusCode, Value) {
    let Ok(resp) = req.send().await else {
        panic!("request failed");
    };
    let status = resp.status();
    let body = resp.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_needs_no_identity() {
    let server = TestServer::start().await;
    let (status, body) = send(server.client.get(format!("{}/health", server.base))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["accounts"], 3);
}

#[tokio::test]
async fn missing_identity_is_rejected() {
    let server = TestServer::start().await;
    let (status, body) = send(
        server
            .client
            .get(format!("{}/api/v1/accounts/me", server.base)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], 3101);
}

#[tokio::test]
async fn manual_transfer_shows_up_in_both_histories() {
    let server = TestServer::start().await;
    let (status, tx) = send(
        server
            .request(reqwest::Method::POST, "/api/v1/transfers", server.admin, "admin")
            .json(&json!({
                "from_account_id": server.alice,
                "to_account_id": server.bob,
                "amount": 30,
                "reason": "table win"
            })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tx["type"], "manual");
    assert_eq!(tx["status"], "approved");
    assert_eq!(server.balance(server.alice).await, 70);
    assert_eq!(server.balance(server.bob).await, 50);

    let (status, page) = send(server.request(
        reqwest::Method::GET,
        "/api/v1/transactions",
        server.bob,
        "player",
    ))
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["pagination"]["total"], 1);
    assert_eq!(page["data"][0]["id"], tx["id"]);
    assert_eq!(page["data"][0]["direction"], "received");
    assert_eq!(page["data"][0]["from_display_name"], "Alice");
}

#[tokio::test]
async fn overdraft_is_refused_with_details() {
    let server = TestServer::start().await;
    let (status, body) = send(
        server
            .request(reqwest::Method::POST, "/api/v1/transfers", server.admin, "admin")
            .json(&json!({
                "from_account_id": server.bob,
                "to_account_id": server.alice,
                "amount": 500
            })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], 4001);
    assert_eq!(server.balance(server.bob).await, 20);
    assert_eq!(server.balance(server.alice).await, 100);
}

#[tokio::test]
async fn players_cannot_move_chips_directly() {
    let server = TestServer::start().await;
    let (status, _) = send(
        server
            .request(reqwest::Method::POST, "/api/v1/transfers", server.alice, "player")
            .json(&json!({ "to_account_id": server.alice, "amount": 1_000 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn retried_transfer_is_applied_once() {
    let server = TestServer::start().await;
    let body = json!({
        "from_account_id": server.alice,
        "to_account_id": server.bob,
        "amount": 10
    });
    let mut ids = Vec::new();
    for _ in 0..3 {
        let (status, tx) = send(
            server
                .request(reqwest::Method::POST, "/api/v1/transfers", server.admin, "admin")
                .header("idempotency-key", "retry-1")
                .json(&body),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(tx.get("idempotency_key").is_none());
        ids.push(tx["id"].clone());
    }
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(server.balance(server.alice).await, 90);
    assert_eq!(server.balance(server.bob).await, 30);
}

#[tokio::test]
async fn request_approval_round_trip() {
    let server = TestServer::start().await;
    let (status, request) = send(
        server
            .request(
                reqwest::Method::POST,
                "/api/v1/transfer-requests",
                server.alice,
                "player",
            )
            .json(&json!({ "to_account_id": server.bob, "amount": 40, "note": "loan" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(request["status"], "pending");
    assert_eq!(server.balance(server.alice).await, 100);

    let id = request["id"].as_str().unwrap_or_default().to_string();
    let (status, approved) = send(server.request(
        reqwest::Method::POST,
        &format!("/api/v1/transactions/{id}/approve"),
        server.admin,
        "admin",
    ))
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "approved");
    assert_eq!(server.balance(server.alice).await, 60);
    assert_eq!(server.balance(server.bob).await, 60);

    let (status, body) = send(server.request(
        reqwest::Method::POST,
        &format!("/api/v1/transactions/{id}/approve"),
        server.admin,
        "admin",
    ))
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], 2101);
}

#[tokio::test]
async fn second_mint_claim_reports_remaining_wait() {
    let server = TestServer::start().await;
    let claim = || {
        server.request(
            reqwest::Method::POST,
            "/api/v1/daily-mint/claim",
            server.alice,
            "player",
        )
    };
    let (status, tx) = send(claim()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tx["type"], "daily-mint");

    let (status, body) = send(claim()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], 4002);
    assert!(body["error"]["details"]["remaining_secs"].as_i64() > Some(0));

    let (status, status_body) = send(server.request(
        reqwest::Method::GET,
        "/api/v1/daily-mint/status",
        server.alice,
        "player",
    ))
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(status_body["eligible"], false);
}

#[tokio::test]
async fn blank_idempotency_key_is_rejected() {
    let server = TestServer::start().await;
    let result = server
        .request(
            reqwest::Method::POST,
            "/api/v1/daily-mint/claim",
            server.alice,
            "player",
        )
        .header("idempotency-key", "")
        .send()
        .await;
    let resp = tokio_test::assert_ok!(result);
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
