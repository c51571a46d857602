//! Common test utilities for in-process API testing.
//!
//! This module provides a test fixture that builds the full router over a
//! file-backed database in a temp dir, with the audit writer running, so
//! requests exercise the same stack the binary does.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use bountyboard_core::{
    create_audit_system, AuditStore, ClaimsConfig, Config, DatabaseConfig, LifecycleConfig,
    LifecycleEngine, OrderCoordinator, SqliteAuditStore, SqliteOrderStore, StatsAggregator,
};

/// Test fixture for in-process API testing.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_order_creation() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/orders", json!({
///         "title": "Scrape prices",
///         "description": "Daily",
///         "category": "web_scraping",
///         "payment_amount": 100,
///         "created_by": "alice"
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Coordinator behind the router, for direct setup
    pub coordinator: Arc<OrderCoordinator>,
    /// Audit store shared with the writer task
    pub audit_store: Arc<dyn AuditStore>,
    /// Temporary directory holding the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default lifecycle settings.
    pub fn new() -> Self {
        Self::with_lifecycle(LifecycleConfig::default())
    }

    /// Create a test fixture with custom lifecycle settings.
    pub fn with_lifecycle(lifecycle: LifecycleConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            lifecycle,
            claims: ClaimsConfig {
                sweeper_enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };

        let audit_store: Arc<dyn AuditStore> = Arc::new(
            SqliteAuditStore::new(&db_path).expect("Failed to create audit store"),
        );
        let order_store =
            Arc::new(SqliteOrderStore::new(&db_path).expect("Failed to create order store"));

        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let engine = LifecycleEngine::new(config.lifecycle.clone(), config.claims.timeout());
        let stats = Arc::new(StatsAggregator::new(order_store.clone()));
        let coordinator = Arc::new(OrderCoordinator::new(
            order_store.clone(),
            order_store,
            engine,
            stats,
            Some(audit_handle),
        ));

        let state = Arc::new(bountyboard_server::state::AppState::new(
            config,
            Arc::clone(&coordinator),
            Arc::clone(&audit_store),
        ));
        let router = bountyboard_server::api::create_router(state);

        Self {
            router,
            coordinator,
            audit_store,
            temp_dir,
        }
    }

    /// Post an order and return its id.
    pub async fn create_order(&self, payment_amount: Value, category: &str) -> String {
        let response = self
            .post(
                "/api/orders",
                json!({
                    "title": "Automate invoice import",
                    "description": "Pull invoices from the mailbox into the ledger",
                    "category": category,
                    "payment_amount": payment_amount,
                    "requirements": ["Runs on cron"],
                    "created_by": "requester"
                }),
            )
            .await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "create failed: {}",
            response.body
        );
        response.body["id"]
            .as_str()
            .expect("order id missing")
            .to_string()
    }

    /// Create an order and move it to `submitted` as `dev`.
    pub async fn submitted_order(&self, dev: &str) -> String {
        let id = self.create_order(json!(100), "web_scraping").await;
        let claim = self
            .post(&format!("/api/orders/{}/claim", id), json!({ "claimed_by": dev }))
            .await;
        assert_eq!(claim.status, StatusCode::OK, "claim failed: {}", claim.body);
        let submit = self
            .post(
                &format!("/api/orders/{}/submit", id),
                json!({
                    "delivery_url": format!("https://github.com/{}/importer", dev),
                    "delivery_description": "Importer with tests",
                    "submitted_by": dev
                }),
            )
            .await;
        assert_eq!(submit.status, StatusCode::OK, "submit failed: {}", submit.body);
        id
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Send a GET request and return the raw body as text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
