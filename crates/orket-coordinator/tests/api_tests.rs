// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP surface tests driven in-process through the router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use orket_coordinator::{build_app, AppState, Card, CoordinatorStore, ManualClock};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_state(cards: Vec<Card>) -> (Arc<ManualClock>, AppState) {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(CoordinatorStore::new(clock.clone()));
    store.reset(cards);
    (clock, AppState { store })
}

async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = build_app(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(path: &str, body: Value) -> Request<Body> {
    Request::post(path)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::get(path).body(Body::empty()).unwrap()
}

fn claim_body(node_id: &str, lease_duration: f64) -> Value {
    json!({"node_id": node_id, "lease_duration": lease_duration})
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn open_listing_returns_full_cards() {
    let (_clock, state) = make_state(vec![Card::open("card-1", json!({"task": "demo"}))]);
    let (status, body) = send(&state, get("/cards?state=open")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], json!("card-1"));
    assert_eq!(body[0]["state"], json!("OPEN"));
    assert_eq!(body[0]["attempts"], json!(0));
    // Terminal fields are serialized, not omitted.
    assert!(body[0].get("result").is_some());
}

#[tokio::test]
async fn unsupported_state_filter_is_bad_request() {
    let (_clock, state) = make_state(vec![]);
    let (status, body) = send(&state, get("/cards?state=done")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("state=open"));
}

#[tokio::test]
async fn default_state_filter_is_open() {
    let (_clock, state) = make_state(vec![Card::open("card-1", json!({}))]);
    let (status, body) = send(&state, get("/cards")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Claim / renew status mapping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn claim_conflicts_map_to_409_and_unknown_to_404() {
    let (_clock, state) = make_state(vec![Card::open("card-1", json!({}))]);

    let (status, card) = send(
        &state,
        post_json("/cards/card-1/claim", claim_body("node-a", 1.0)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(card["state"], json!("CLAIMED"));
    assert_eq!(card["claimed_by"], json!("node-a"));

    let (status, _) = send(
        &state,
        post_json("/cards/card-1/claim", claim_body("node-b", 1.0)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &state,
        post_json("/cards/ghost/claim", claim_body("node-a", 1.0)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn renew_by_non_owner_is_403_and_expired_is_409() {
    let (clock, state) = make_state(vec![Card::open("card-1", json!({}))]);
    send(
        &state,
        post_json("/cards/card-1/claim", claim_body("node-a", 0.25)),
    )
    .await;

    let (status, _) = send(
        &state,
        post_json("/cards/card-1/renew", claim_body("node-b", 0.25)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    clock.advance(0.35);
    let (status, _) = send(
        &state,
        post_json("/cards/card-1/renew", claim_body("node-a", 0.25)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_fields_are_rejected() {
    let (_clock, state) = make_state(vec![Card::open("card-1", json!({}))]);
    let (status, _) = send(
        &state,
        post_json(
            "/cards/card-1/claim",
            json!({"node_id": "node-a", "lease_duration": 1.0, "extra": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// ---------------------------------------------------------------------------
// Terminal idempotency over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_completion_returns_the_committed_result_with_200() {
    let (_clock, state) = make_state(vec![Card::open("card-1", json!({})).hedged()]);
    send(
        &state,
        post_json("/cards/card-1/claim", claim_body("node-a", 1.0)),
    )
    .await;
    send(
        &state,
        post_json("/cards/card-1/claim", claim_body("node-b", 1.0)),
    )
    .await;

    let (status, winner) = send(
        &state,
        post_json(
            "/cards/card-1/complete",
            json!({"node_id": "node-b", "result": {"winner": true}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(winner["result"], json!({"winner": true}));

    let (status, loser) = send(
        &state,
        post_json(
            "/cards/card-1/complete",
            json!({"node_id": "node-a", "result": {"winner": false}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loser["state"], json!("DONE"));
    assert_eq!(loser["result"], json!({"winner": true}));
}

#[tokio::test]
async fn fail_commits_a_failed_outcome() {
    let (_clock, state) = make_state(vec![Card::open("card-1", json!({}))]);
    send(
        &state,
        post_json("/cards/card-1/claim", claim_body("node-a", 1.0)),
    )
    .await;
    let (status, card) = send(
        &state,
        post_json("/cards/card-1/fail", json!({"node_id": "node-a"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(card["state"], json!("FAILED"));
    assert_eq!(card["result"]["status"], json!("failed"));
}

// ---------------------------------------------------------------------------
// Administrative reset
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reset_replaces_the_card_set() {
    let (_clock, state) = make_state(vec![Card::open("old", json!({}))]);
    let fresh = vec![
        Card::open("new-1", json!({"task": "one"})),
        Card::open("new-2", json!({"task": "two"})).hedged(),
    ];
    let (status, body) = send(
        &state,
        post_json("/admin/reset", serde_json::to_value(&fresh).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reset"], json!(2));

    let (_, cards) = send(&state, get("/cards?state=open")).await;
    let ids: Vec<&str> = cards
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["new-1", "new-2"]);
}
