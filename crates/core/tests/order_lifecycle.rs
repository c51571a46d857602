//! Order lifecycle integration tests.
//!
//! These tests drive orders through the coordinator against a file-backed
//! database with the audit writer running:
//! open -> claimed -> (in_progress) -> submitted -> completed | rejected

use std::sync::{Arc, Barrier};
use std::thread;

use rust_decimal::Decimal;
use tempfile::TempDir;

use bountyboard_core::{
    create_audit_system, AuditFilter, AuditStore, LifecycleConfig, LifecycleEngine, OrderAction,
    OrderCategory, OrderCoordinator, OrderDraft, OrderError, OrderFilter, OrderStatus,
    SqliteAuditStore, SqliteOrderStore, StatsAggregator,
};

/// Test helper wiring a coordinator to a database in a temp dir.
struct TestHarness {
    coordinator: Arc<OrderCoordinator>,
    audit_store: Arc<SqliteAuditStore>,
    writer: Option<tokio::task::JoinHandle<()>>,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let audit_store =
            Arc::new(SqliteAuditStore::new(&db_path).expect("Failed to create audit store"));
        let (audit, writer) = create_audit_system(audit_store.clone(), 100);
        let writer = tokio::spawn(writer.run());

        let coordinator = Self::coordinator_for(&temp_dir, Some(audit));

        Self {
            coordinator,
            audit_store,
            writer: Some(writer),
            temp_dir,
        }
    }

    /// A second, independent coordinator over the same database file.
    fn coordinator_for(
        temp_dir: &TempDir,
        audit: Option<bountyboard_core::AuditHandle>,
    ) -> Arc<OrderCoordinator> {
        let db_path = temp_dir.path().join("test.db");
        let store = Arc::new(SqliteOrderStore::new(&db_path).expect("Failed to create store"));
        let stats = Arc::new(StatsAggregator::new(store.clone()));
        let engine = LifecycleEngine::new(
            LifecycleConfig::default(),
            Some(chrono::Duration::days(7)),
        );
        Arc::new(OrderCoordinator::new(
            store.clone(),
            store,
            engine,
            stats,
            audit,
        ))
    }

    /// Drop the coordinator's audit handle and wait for the writer to drain.
    async fn flush_audit(&mut self) {
        self.coordinator = Self::coordinator_for(&self.temp_dir, None);
        if let Some(writer) = self.writer.take() {
            tokio::time::timeout(std::time::Duration::from_secs(2), writer)
                .await
                .expect("audit writer did not finish")
                .unwrap();
        }
    }
}

fn draft(amount: i64, category: OrderCategory) -> OrderDraft {
    OrderDraft {
        title: "Automate invoice import".to_string(),
        description: "Pull invoices from the mailbox into the ledger".to_string(),
        category,
        payment_amount: Decimal::new(amount, 0),
        requirements: vec!["Runs on cron".to_string(), "Logs failures".to_string()],
        created_by: "requester".to_string(),
    }
}

fn claim(by: &str) -> OrderAction {
    OrderAction::Claim {
        claimed_by: by.to_string(),
    }
}

fn submit(by: &str) -> OrderAction {
    OrderAction::Submit {
        delivery_url: format!("https://github.com/{}/importer", by),
        delivery_description: "Importer with tests".to_string(),
        submitted_by: Some(by.to_string()),
    }
}

fn rate(score: i64, by: &str) -> OrderAction {
    OrderAction::Rate {
        rating: score,
        comment: None,
        rated_by: by.to_string(),
    }
}

#[tokio::test]
async fn test_end_to_end_completion() {
    let mut harness = TestHarness::new();
    let c = Arc::clone(&harness.coordinator);

    let order = c.create(draft(100, OrderCategory::WebScraping)).unwrap();
    assert_eq!(order.status(), OrderStatus::Open);

    c.apply(&order.id, claim("dev1")).unwrap();
    c.apply(
        &order.id,
        OrderAction::StartWork {
            started_by: "dev1".to_string(),
        },
    )
    .unwrap();
    c.apply(&order.id, submit("dev1")).unwrap();

    for (score, by) in [(5, "r1"), (5, "r2")] {
        let o = c.apply(&order.id, rate(score, by)).unwrap();
        assert_eq!(o.status(), OrderStatus::Submitted);
    }
    let done = c.apply(&order.id, rate(3, "r3")).unwrap();

    assert_eq!(done.status(), OrderStatus::Completed);
    assert_eq!(done.ratings.count, 3);
    assert!((done.ratings.average() - 4.333).abs() < 0.001);
    assert!(done.deliverable_public());
    assert!(done.payment_releasable());
    assert_eq!(done.payment_amount, Decimal::new(100, 0));

    let stats = c.stats().snapshot().unwrap();
    assert_eq!(stats.total_orders, 1);
    assert_eq!(stats.completed_orders, 1);
    assert_eq!(stats.total_value, Decimal::new(100, 0));

    drop(c);
    harness.flush_audit().await;

    let filter = AuditFilter::new().with_order_id(order.id.clone());
    let records = harness.audit_store.query(&filter).unwrap();
    let mut types: Vec<&str> = records.iter().map(|r| r.event_type.as_str()).collect();
    types.reverse();
    assert_eq!(
        types,
        vec![
            "order_created",
            "order_claimed",
            "work_started",
            "work_submitted",
            "order_rated",
            "order_rated",
            "order_rated",
            "order_completed",
        ]
    );
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let harness = TestHarness::new();
    let order = harness
        .coordinator
        .create(draft(250, OrderCategory::DataProcessing))
        .unwrap();
    harness.coordinator.apply(&order.id, claim("dev1")).unwrap();
    harness
        .coordinator
        .apply(&order.id, submit("dev1"))
        .unwrap();
    harness
        .coordinator
        .apply(&order.id, rate(4, "r1"))
        .unwrap();

    let reopened = TestHarness::coordinator_for(&harness.temp_dir, None);
    let stored = reopened.get(&order.id).unwrap();
    assert_eq!(stored.status(), OrderStatus::Submitted);
    assert_eq!(stored.claimed_by(), Some("dev1"));
    assert_eq!(stored.ratings.count, 1);
    assert_eq!(stored.requirements.len(), 2);
    assert_eq!(stored.version, 4);

    // the ledger still refuses a second vote after restart
    let result = reopened.apply(&order.id, rate(5, "r1"));
    assert!(matches!(result, Err(OrderError::Validation(_))));
}

#[tokio::test]
async fn test_out_of_range_ratings_leave_aggregate_untouched() {
    let harness = TestHarness::new();
    let c = &harness.coordinator;
    let order = c.create(draft(100, OrderCategory::Other)).unwrap();
    c.apply(&order.id, claim("dev1")).unwrap();
    c.apply(&order.id, submit("dev1")).unwrap();
    c.apply(&order.id, rate(4, "r1")).unwrap();

    for score in [0, 6] {
        let result = c.apply(&order.id, rate(score, "r2"));
        assert!(matches!(result, Err(OrderError::Validation(_))));
    }

    let stored = c.get(&order.id).unwrap();
    assert_eq!(stored.ratings.count, 1);
    assert_eq!(stored.ratings.average(), 4.0);
}

#[tokio::test]
async fn test_poor_ratings_reject_submission() {
    let harness = TestHarness::new();
    let c = &harness.coordinator;
    let order = c.create(draft(60, OrderCategory::EmailAutomation)).unwrap();
    c.apply(&order.id, claim("dev1")).unwrap();
    c.apply(&order.id, submit("dev1")).unwrap();

    for by in ["r1", "r2", "r3", "r4"] {
        c.apply(&order.id, rate(1, by)).unwrap();
    }
    let rejected = c.apply(&order.id, rate(1, "r5")).unwrap();
    assert_eq!(rejected.status(), OrderStatus::Rejected);
    assert!(!rejected.deliverable_public());

    let filter = OrderFilter::new().with_status(OrderStatus::Rejected);
    assert_eq!(c.list(&filter).unwrap().len(), 1);
}

#[tokio::test]
async fn test_claim_race_across_processes() {
    let harness = TestHarness::new();
    let order = harness
        .coordinator
        .create(draft(100, OrderCategory::ApiIntegration))
        .unwrap();

    // Independent coordinators do not share locks; the version check decides.
    let coordinators: Vec<_> = (0..4)
        .map(|_| TestHarness::coordinator_for(&harness.temp_dir, None))
        .collect();
    let barrier = Arc::new(Barrier::new(coordinators.len()));

    let handles: Vec<_> = coordinators
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            let barrier = Arc::clone(&barrier);
            let id = order.id.clone();
            thread::spawn(move || {
                barrier.wait();
                c.apply(&id, claim(&format!("dev{}", i)))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(
            result,
            Err(OrderError::InvalidTransition { .. }) | Err(OrderError::Conflict(_))
        ));
    }

    let stored = harness.coordinator.get(&order.id).unwrap();
    assert_eq!(stored.status(), OrderStatus::Claimed);
    assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn test_list_filters_and_ordering() {
    let harness = TestHarness::new();
    let c = &harness.coordinator;

    let first = c.create(draft(10, OrderCategory::WebScraping)).unwrap();
    let second = c.create(draft(20, OrderCategory::FileProcessing)).unwrap();
    let third = c.create(draft(30, OrderCategory::WebScraping)).unwrap();
    c.apply(&second.id, claim("dev1")).unwrap();

    let all = c.list(&OrderFilter::new()).unwrap();
    let ids: Vec<_> = all.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec![third.id.as_str(), second.id.as_str(), first.id.as_str()]);

    let scraping = c
        .list(&OrderFilter::new().with_category(OrderCategory::WebScraping))
        .unwrap();
    assert_eq!(scraping.len(), 2);

    let open = c
        .list(&OrderFilter::new().with_status(OrderStatus::Open))
        .unwrap();
    assert_eq!(open.len(), 2);

    let mine = c.list(&OrderFilter::new().with_claimed_by("dev1")).unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, second.id);

    let stats = c.stats().snapshot().unwrap();
    assert_eq!(stats.total_orders, 3);
    assert_eq!(stats.open_orders, 2);
    assert_eq!(stats.total_value, Decimal::new(60, 0));
}
