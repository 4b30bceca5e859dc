//! Dedup of concurrent requests for the same participant and action.

use std::time::Duration;

use pretty_assertions::assert_eq;

use directory_indexer::{MockResponse, QueueResult};
use directory_types::ActionType;
use e2e_tests::{business_card, participant, TestHarness};

#[tokio::test(flavor = "multi_thread")]
async fn test_requests_in_flight_are_deduplicated() {
    let harness = TestHarness::new();
    let pid = participant("9915:slow");
    harness.source.set_response(
        &pid,
        MockResponse::Delayed(
            Duration::from_millis(300),
            Box::new(MockResponse::card(&business_card(
                "9915:slow",
                &[("Slow Corp", "DE")],
            ))),
        ),
    );
    harness.start();

    let mut results = Vec::new();
    for _ in 0..5 {
        results.push(
            harness
                .manager
                .queue_work_item(pid.clone(), ActionType::CreateOrUpdate, "owner", "host")
                .unwrap(),
        );
    }
    assert_eq!(results[0], QueueResult::Queued);
    assert!(results[1..].iter().all(|r| *r == QueueResult::Unchanged));

    // A different action is a different key
    assert_eq!(
        harness
            .manager
            .queue_work_item(pid.clone(), ActionType::Sync, "owner", "host")
            .unwrap(),
        QueueResult::Queued
    );

    harness.wait_idle().await;
    assert_eq!(harness.source.calls_for(&pid), 2);
    assert!(harness.store.contains_entry(&pid).unwrap());

    // Idle again: the same request is accepted anew
    assert_eq!(
        harness
            .manager
            .queue_work_item(pid.clone(), ActionType::CreateOrUpdate, "owner", "host")
            .unwrap(),
        QueueResult::Queued
    );
    harness.wait_idle().await;
    assert_eq!(harness.source.calls_for(&pid), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_encoded_and_canonical_ids_share_a_key() {
    let harness = TestHarness::new();
    // Not started: items stay queued
    harness
        .service
        .put_participant("iso6523-actorid-upis%3A%3A9915%3Aabc", "owner", "host")
        .unwrap();
    harness
        .service
        .put_participant("iso6523-actorid-upis::9915:ABC", "other", "host")
        .unwrap();

    let pending = harness.storage.get_pending_items().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].owner_id, "owner");
}
