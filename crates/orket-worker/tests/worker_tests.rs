// SPDX-License-Identifier: MIT OR Apache-2.0
//! Worker loop tests over the in-process transport, on a paused runtime so
//! every interleaving is deterministic.

use orket_coordinator::{Card, CardState, CoordinatorStore, ManualClock};
use orket_worker::{seeded_delay, LocalCoordinator, Worker, WorkerConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn setup(cards: Vec<Card>) -> (Arc<ManualClock>, Arc<CoordinatorStore>, Arc<LocalCoordinator>) {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(CoordinatorStore::new(clock.clone()));
    store.reset(cards);
    let api = Arc::new(LocalCoordinator::new(store.clone()));
    (clock, store, api)
}

#[tokio::test(start_paused = true)]
async fn run_once_reports_idle_when_nothing_is_open() {
    let (_clock, _store, api) = setup(vec![]);
    let worker = Worker::new(api, WorkerConfig::new("node-a"));
    assert!(!worker.run_once(0.1).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn run_once_claims_works_and_completes() {
    let (_clock, store, api) = setup(vec![Card::open("card-1", json!({"task": "demo"}))]);
    let worker = Worker::new(api, WorkerConfig::new("node-a"));

    assert!(worker.run_once(0.1).await.unwrap());

    let card = store.get("card-1").unwrap();
    assert_eq!(card.state, CardState::Done);
    assert_eq!(card.attempts, 1);
    assert_eq!(
        card.result,
        Some(json!({"worker": "node-a", "state": "done"}))
    );
    assert_eq!(card.claimed_by, None);
    assert_eq!(card.lease_expires_at, None);
}

#[tokio::test(start_paused = true)]
async fn renewer_observes_lease_loss_and_never_resurrects() {
    let (clock, store, api) = setup(vec![Card::open("card-1", json!({}))]);
    let mut config = WorkerConfig::new("node-a");
    config.lease_duration = 0.25;
    let worker = Worker::new(api, config);

    store.claim("card-1", "node-a", 0.25).unwrap();
    // Expire the lease before the first renewal tick fires.
    clock.advance(0.3);

    let outcome = worker
        .run_claimed_work("card-1", 0.5, json!({"worker": "node-a"}))
        .await
        .unwrap();
    assert!(outcome.lease_lost);
    // Nobody superseded us, so our completion still committed.
    assert!(outcome.response.ok());
    let card = store.get("card-1").unwrap();
    assert_eq!(card.state, CardState::Done);
}

#[tokio::test(start_paused = true)]
async fn renewal_extends_the_lease_while_working() {
    let (clock, store, api) = setup(vec![Card::open("card-1", json!({}))]);
    let mut config = WorkerConfig::new("node-a");
    config.lease_duration = 0.3;
    config.renew_interval = Some(0.05);
    let worker = Worker::new(api, config);

    store.claim("card-1", "node-a", 0.3).unwrap();

    // Let the coordinator clock creep while renewals fire; each tick
    // rebases the deadline from the current reading, so the lease stays
    // live for the whole job.
    clock.advance(0.1);
    let outcome = worker
        .run_claimed_work("card-1", 0.2, json!({"worker": "node-a"}))
        .await
        .unwrap();
    assert!(outcome.response.ok());
    assert!(!outcome.lease_lost);
    assert_eq!(store.get("card-1").unwrap().state, CardState::Done);
}

#[tokio::test(start_paused = true)]
async fn hedged_first_completion_wins_and_loser_accepts_it() {
    let (_clock, store, api) = setup(vec![Card::open("hedged-card", json!({})).hedged()]);
    let worker_a = Worker::new(api.clone(), WorkerConfig::new("node-a"));
    let worker_b = Worker::new(api.clone(), WorkerConfig::new("node-b"));

    store.claim("hedged-card", "node-a", 1.0).unwrap();
    store.claim("hedged-card", "node-b", 1.0).unwrap();

    // B finishes first; A's later completion must surface B's payload.
    let (outcome_a, outcome_b) = tokio::join!(
        worker_a.run_claimed_work("hedged-card", 0.05, json!({"winner": "a"})),
        worker_b.run_claimed_work("hedged-card", 0.02, json!({"winner": true})),
    );
    let outcome_a = outcome_a.unwrap();
    let outcome_b = outcome_b.unwrap();

    assert!(outcome_b.response.ok());
    assert_eq!(
        outcome_b.response.card.as_ref().unwrap().result,
        Some(json!({"winner": true}))
    );

    assert!(outcome_a.response.ok());
    assert_eq!(
        outcome_a.response.card.as_ref().unwrap().result,
        Some(json!({"winner": true})),
        "the losing claimant must accept the committed outcome"
    );

    let card = store.get("hedged-card").unwrap();
    assert_eq!(card.state, CardState::Done);
    assert_eq!(card.result, Some(json!({"winner": true})));
}

#[tokio::test(start_paused = true)]
async fn workers_with_delays_still_converge() {
    let (_clock, store, api) = setup(vec![Card::open("card-1", json!({}))]);
    let worker = Worker::new(api, WorkerConfig::new("node-a")).with_delay(seeded_delay(
        7,
        Duration::from_millis(1),
        Duration::from_millis(5),
    ));

    assert!(worker.run_once(0.05).await.unwrap());
    assert_eq!(store.get("card-1").unwrap().state, CardState::Done);
}

#[test]
fn seeded_delays_are_reproducible() {
    let a = seeded_delay(42, Duration::from_millis(0), Duration::from_millis(20));
    let b = seeded_delay(42, Duration::from_millis(0), Duration::from_millis(20));
    let series_a: Vec<Duration> = (0..8).map(|_| a()).collect();
    let series_b: Vec<Duration> = (0..8).map(|_| b()).collect();
    assert_eq!(series_a, series_b);

    let c = seeded_delay(43, Duration::from_millis(0), Duration::from_millis(20));
    let series_c: Vec<Duration> = (0..8).map(|_| c()).collect();
    assert_ne!(series_a, series_c);
}
