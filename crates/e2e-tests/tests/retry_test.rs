//! Retry ledger lifecycle: failure, scheduled retry, expiry, dead letter,
//! requeue.

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;

use directory_indexer::{MockResponse, ProcessOutcome, SweepStats};
use directory_types::{ActionType, WorkItem};
use e2e_tests::{business_card, participant, TestHarness};

#[tokio::test(flavor = "multi_thread")]
async fn test_retry_until_success() {
    let harness = TestHarness::new();
    let pid = participant("9915:flaky");
    harness
        .source
        .set_response(&pid, MockResponse::Transient("HTTP 503".to_string()));

    let item = WorkItem::new(pid.clone(), ActionType::CreateOrUpdate, "owner", "host");
    let outcome = harness.manager.process_work_item(&item).await.unwrap();
    assert!(!outcome.is_success());

    let first = harness.manager.ledger_entries().await.remove(0);
    let t1 = first.next_retry_at;

    // Not yet due
    let stats = harness
        .manager
        .run_sweep_at(t1 - Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(stats, SweepStats::default());

    // Due, still failing
    let stats = harness.manager.run_sweep_at(t1).await.unwrap();
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.failed, 1);
    let second = harness.manager.ledger_entries().await.remove(0);
    assert_eq!(second.id, first.id);
    assert_eq!(second.retry_count, 1);
    assert_eq!(second.previous_retry_at, Some(t1));
    assert!(second.next_retry_at > first.next_retry_at);

    // Publisher recovers
    harness.publish(&pid, &business_card("9915:flaky", &[("Flaky Ltd", "IE")]));
    let stats = harness.manager.run_sweep_at(second.next_retry_at).await.unwrap();
    assert_eq!(stats.succeeded, 1);
    assert!(harness.manager.ledger_entries().await.is_empty());
    assert!(harness.store.contains_entry(&pid).unwrap());
    assert_eq!(harness.source.calls_for(&pid), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_expiry_moves_to_dead_letter_and_requeue() {
    let harness = TestHarness::new();
    let pid = participant("9915:gone");
    harness
        .source
        .set_response(&pid, MockResponse::Transient("timeout".to_string()));

    let item = WorkItem::new(pid.clone(), ActionType::CreateOrUpdate, "owner", "host");
    harness.manager.process_work_item(&item).await.unwrap();
    let entry = harness.manager.ledger_entries().await.remove(0);

    // Expired entries are never retried
    let stats = harness.manager.run_sweep_at(entry.max_retry_at).await.unwrap();
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.retried, 0);
    assert_eq!(harness.source.calls_for(&pid), 1);
    assert!(harness.manager.ledger_entries().await.is_empty());

    let dead = harness.manager.dead_letter_entries().unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id(), entry.id);
    assert_eq!(dead[0].expired_at, entry.max_retry_at);

    // Operator requeues after the publisher is back
    harness.publish(&pid, &business_card("9915:gone", &[("Back Again", "FR")]));
    harness.start();
    harness
        .manager
        .requeue_dead_letter(&entry.id, "ops", "host")
        .unwrap();
    harness.wait_idle().await;

    assert!(harness.manager.dead_letter_entries().unwrap().is_empty());
    assert!(harness.store.contains_entry(&pid).unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_new_failure_supersedes_entry() {
    let harness = TestHarness::new();
    let pid = participant("9915:twice");
    harness
        .source
        .set_response(&pid, MockResponse::Transient("down".to_string()));

    let create = WorkItem::new(pid.clone(), ActionType::CreateOrUpdate, "owner", "host");
    harness.manager.process_work_item(&create).await.unwrap();
    let old = harness.manager.ledger_entries().await;
    let again = WorkItem::with_created_at(
        pid.clone(),
        ActionType::CreateOrUpdate,
        "owner",
        "host",
        Utc::now() + Duration::minutes(1),
    );
    let outcome = harness.manager.process_work_item(&again).await.unwrap();
    assert!(matches!(outcome, ProcessOutcome::RetryScheduled { .. }));

    let entries = harness.manager.ledger_entries().await;
    assert_eq!(entries.len(), 1);
    assert_ne!(entries[0].id, old[0].id);
    assert_eq!(entries[0].work_item, again);
}
