// SPDX-License-Identifier: MIT OR Apache-2.0
//! The in-memory card state machine.

use crate::clock::Clock;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Card lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardState {
    /// Claimable.
    Open,
    /// Leased to a worker.
    Claimed,
    /// Terminal: completed.
    Done,
    /// Terminal: failed.
    Failed,
}

impl CardState {
    /// Whether this state admits no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// The atomic unit of work handed to workers.
///
/// Cards are created by the coordinator seed and never destroyed; only
/// their state transitions. Exactly one `result` ever persists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Card {
    /// Primary key.
    pub id: String,
    /// Opaque work description.
    pub payload: Value,
    /// Current lifecycle state.
    pub state: CardState,
    /// Worker currently holding the lease.
    pub claimed_by: Option<String>,
    /// Monotonic deadline of the current lease (absent unless claimed).
    pub lease_expires_at: Option<f64>,
    /// The committed outcome, set on the first terminal transition only.
    pub result: Option<Value>,
    /// Count of successful claim acquisitions.
    pub attempts: u32,
    /// Whether concurrent claimants are allowed.
    pub hedged_execution: bool,
}

impl Card {
    /// A fresh open card.
    pub fn open(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
            state: CardState::Open,
            claimed_by: None,
            lease_expires_at: None,
            result: None,
            attempts: 0,
            hedged_execution: false,
        }
    }

    /// Enable hedged execution on this card.
    #[must_use]
    pub fn hedged(mut self) -> Self {
        self.hedged_execution = true;
        self
    }

    fn lease_expired(&self, now: f64) -> bool {
        self.lease_expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Rejections from the state machine, mapped to HTTP statuses by the API
/// layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    /// No card with that id. (404)
    #[error("unknown card: {0}")]
    NotFound(String),
    /// The card is claimed, the lease is valid, and hedging is off. (409)
    #[error("card {0} already claimed with a valid lease")]
    AlreadyClaimed(String),
    /// Renewal by a node that does not own the lease. (403)
    #[error("card {0} is not leased to this node")]
    NotOwner(String),
    /// Renewal after the lease expired, or of an unclaimed card. (409)
    #[error("lease on card {0} is not renewable")]
    LeaseLost(String),
}

/// Mutex-protected in-memory card store.
///
/// Every operation is linearizable per card: the whole map sits behind one
/// mutex and each call completes under it.
pub struct CoordinatorStore {
    cards: Mutex<BTreeMap<String, Card>>,
    clock: Arc<dyn Clock>,
}

impl CoordinatorStore {
    /// An empty store reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            cards: Mutex::new(BTreeMap::new()),
            clock,
        }
    }

    /// Replace the entire card set. Administrative surface, kept for test
    /// harnesses and seeding.
    pub fn reset(&self, cards: Vec<Card>) {
        let mut guard = self.cards.lock().expect("store poisoned");
        guard.clear();
        for card in cards {
            guard.insert(card.id.clone(), card);
        }
    }

    /// Snapshot one card.
    pub fn get(&self, card_id: &str) -> Result<Card, CoordinatorError> {
        let guard = self.cards.lock().expect("store poisoned");
        guard
            .get(card_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::NotFound(card_id.to_string()))
    }

    /// Cards whose effective state is OPEN: open, or claimed with an
    /// expired lease on a non-hedged card. Sorted by id.
    pub fn list_open_cards(&self) -> Vec<Card> {
        let now = self.clock.now();
        let guard = self.cards.lock().expect("store poisoned");
        guard
            .values()
            .filter(|card| match card.state {
                CardState::Open => true,
                CardState::Claimed => !card.hedged_execution && card.lease_expired(now),
                CardState::Done | CardState::Failed => false,
            })
            .cloned()
            .collect()
    }

    /// Acquire (or supersede, or hedge into) a lease.
    ///
    /// Succeeds iff the card is effectively open, or claimed by a
    /// *different* node whose lease expired, or hedged. On success the
    /// lease is rebound to `node_id` and `attempts` increments.
    pub fn claim(
        &self,
        card_id: &str,
        node_id: &str,
        lease_duration: f64,
    ) -> Result<Card, CoordinatorError> {
        let now = self.clock.now();
        let mut guard = self.cards.lock().expect("store poisoned");
        let card = guard
            .get_mut(card_id)
            .ok_or_else(|| CoordinatorError::NotFound(card_id.to_string()))?;

        let allowed = match card.state {
            CardState::Open => true,
            CardState::Claimed => {
                card.hedged_execution
                    || (card.lease_expired(now) && card.claimed_by.as_deref() != Some(node_id))
            }
            CardState::Done | CardState::Failed => false,
        };
        if !allowed {
            return Err(CoordinatorError::AlreadyClaimed(card_id.to_string()));
        }

        card.state = CardState::Claimed;
        card.claimed_by = Some(node_id.to_string());
        card.lease_expires_at = Some(now + lease_duration);
        card.attempts += 1;
        Ok(card.clone())
    }

    /// Extend a held lease.
    ///
    /// Only the owner may renew, and only while the lease is still live —
    /// renewal never resurrects an expired lease.
    pub fn renew(
        &self,
        card_id: &str,
        node_id: &str,
        lease_duration: f64,
    ) -> Result<Card, CoordinatorError> {
        let now = self.clock.now();
        let mut guard = self.cards.lock().expect("store poisoned");
        let card = guard
            .get_mut(card_id)
            .ok_or_else(|| CoordinatorError::NotFound(card_id.to_string()))?;

        if card.state != CardState::Claimed {
            return Err(CoordinatorError::LeaseLost(card_id.to_string()));
        }
        if card.claimed_by.as_deref() != Some(node_id) {
            return Err(CoordinatorError::NotOwner(card_id.to_string()));
        }
        if card.lease_expired(now) {
            return Err(CoordinatorError::LeaseLost(card_id.to_string()));
        }
        card.lease_expires_at = Some(now + lease_duration);
        Ok(card.clone())
    }

    /// Commit a successful outcome. First terminal transition wins; later
    /// calls from any node return the already-committed card unchanged.
    pub fn complete(
        &self,
        card_id: &str,
        node_id: &str,
        result: Option<Value>,
    ) -> Result<Card, CoordinatorError> {
        self.terminal(card_id, node_id, result, CardState::Done, "done")
    }

    /// Commit a failed outcome with the same idempotency rules as
    /// [`complete`](Self::complete).
    pub fn fail(
        &self,
        card_id: &str,
        node_id: &str,
        result: Option<Value>,
    ) -> Result<Card, CoordinatorError> {
        self.terminal(card_id, node_id, result, CardState::Failed, "failed")
    }

    fn terminal(
        &self,
        card_id: &str,
        node_id: &str,
        result: Option<Value>,
        state: CardState,
        status: &str,
    ) -> Result<Card, CoordinatorError> {
        let mut guard = self.cards.lock().expect("store poisoned");
        let card = guard
            .get_mut(card_id)
            .ok_or_else(|| CoordinatorError::NotFound(card_id.to_string()))?;

        if card.state.is_terminal() {
            // The published outcome is permanent; callers accept it as-is.
            return Ok(card.clone());
        }
        card.state = state;
        card.result = Some(result.unwrap_or_else(|| json!({"worker": node_id, "status": status})));
        card.claimed_by = None;
        card.lease_expires_at = None;
        Ok(card.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store_with(cards: Vec<Card>) -> (Arc<ManualClock>, CoordinatorStore) {
        let clock = Arc::new(ManualClock::new());
        let store = CoordinatorStore::new(clock.clone());
        store.reset(cards);
        (clock, store)
    }

    #[test]
    fn claim_moves_open_to_claimed_and_counts_attempts() {
        let (_clock, store) = store_with(vec![Card::open("c1", json!({"task": "demo"}))]);
        let card = store.claim("c1", "node-a", 1.0).unwrap();
        assert_eq!(card.state, CardState::Claimed);
        assert_eq!(card.claimed_by.as_deref(), Some("node-a"));
        assert_eq!(card.lease_expires_at, Some(1.0));
        assert_eq!(card.attempts, 1);
    }

    #[test]
    fn valid_lease_blocks_other_claimants() {
        let (_clock, store) = store_with(vec![Card::open("c1", json!({}))]);
        store.claim("c1", "node-a", 1.0).unwrap();
        assert_eq!(
            store.claim("c1", "node-b", 1.0),
            Err(CoordinatorError::AlreadyClaimed("c1".to_string()))
        );
    }

    #[test]
    fn expired_lease_is_superseded_by_a_different_node() {
        let (clock, store) = store_with(vec![Card::open("c1", json!({}))]);
        store.claim("c1", "node-a", 0.25).unwrap();
        clock.advance(0.35);
        let card = store.claim("c1", "node-b", 1.0).unwrap();
        assert_eq!(card.claimed_by.as_deref(), Some("node-b"));
        assert_eq!(card.attempts, 2);
    }

    #[test]
    fn expired_lease_is_not_reclaimable_by_the_same_node() {
        let (clock, store) = store_with(vec![Card::open("c1", json!({}))]);
        store.claim("c1", "node-a", 0.25).unwrap();
        clock.advance(0.35);
        assert_eq!(
            store.claim("c1", "node-a", 1.0),
            Err(CoordinatorError::AlreadyClaimed("c1".to_string()))
        );
    }

    #[test]
    fn hedged_cards_admit_concurrent_claimants() {
        let (_clock, store) = store_with(vec![Card::open("c1", json!({})).hedged()]);
        store.claim("c1", "node-a", 1.0).unwrap();
        let card = store.claim("c1", "node-b", 1.0).unwrap();
        assert_eq!(card.attempts, 2);
        assert_eq!(card.claimed_by.as_deref(), Some("node-b"));
    }

    #[test]
    fn renewal_is_owner_only_and_never_resurrects() {
        let (clock, store) = store_with(vec![Card::open("c1", json!({}))]);
        store.claim("c1", "node-a", 1.0).unwrap();

        assert_eq!(
            store.renew("c1", "node-b", 1.0),
            Err(CoordinatorError::NotOwner("c1".to_string()))
        );

        clock.advance(0.5);
        let card = store.renew("c1", "node-a", 1.0).unwrap();
        assert_eq!(card.lease_expires_at, Some(1.5));

        clock.advance(1.5);
        assert_eq!(
            store.renew("c1", "node-a", 1.0),
            Err(CoordinatorError::LeaseLost("c1".to_string()))
        );
    }

    #[test]
    fn renewing_an_unclaimed_card_is_a_lease_error() {
        let (_clock, store) = store_with(vec![Card::open("c1", json!({}))]);
        assert_eq!(
            store.renew("c1", "node-a", 1.0),
            Err(CoordinatorError::LeaseLost("c1".to_string()))
        );
    }

    #[test]
    fn first_terminal_transition_wins_and_later_calls_are_noops() {
        let (_clock, store) = store_with(vec![Card::open("c1", json!({})).hedged()]);
        store.claim("c1", "node-a", 1.0).unwrap();
        store.claim("c1", "node-b", 1.0).unwrap();

        let won = store
            .complete("c1", "node-b", Some(json!({"winner": true})))
            .unwrap();
        assert_eq!(won.state, CardState::Done);
        assert_eq!(won.result, Some(json!({"winner": true})));
        assert_eq!(won.claimed_by, None);
        assert_eq!(won.lease_expires_at, None);

        // Loser's completion and even a fail return the committed outcome.
        let later = store
            .complete("c1", "node-a", Some(json!({"winner": false})))
            .unwrap();
        assert_eq!(later.result, Some(json!({"winner": true})));
        let failed = store.fail("c1", "node-a", None).unwrap();
        assert_eq!(failed.state, CardState::Done);
        assert_eq!(failed.result, Some(json!({"winner": true})));
    }

    #[test]
    fn complete_defaults_a_result_payload() {
        let (_clock, store) = store_with(vec![Card::open("c1", json!({}))]);
        store.claim("c1", "node-a", 1.0).unwrap();
        let card = store.complete("c1", "node-a", None).unwrap();
        assert_eq!(card.result, Some(json!({"worker": "node-a", "status": "done"})));
    }

    #[test]
    fn open_listing_reflects_lease_expiry_but_hides_hedged_claims() {
        let (clock, store) = store_with(vec![
            Card::open("plain", json!({})),
            Card::open("hedged", json!({})).hedged(),
        ]);
        store.claim("plain", "node-a", 0.25).unwrap();
        store.claim("hedged", "node-a", 0.25).unwrap();
        assert!(store.list_open_cards().is_empty());

        clock.advance(0.5);
        let open: Vec<String> = store.list_open_cards().into_iter().map(|c| c.id).collect();
        assert_eq!(open, vec!["plain"]);
    }

    #[test]
    fn terminal_cards_are_not_claimable() {
        let (_clock, store) = store_with(vec![Card::open("c1", json!({}))]);
        store.claim("c1", "node-a", 1.0).unwrap();
        store.complete("c1", "node-a", None).unwrap();
        assert_eq!(
            store.claim("c1", "node-b", 1.0),
            Err(CoordinatorError::AlreadyClaimed("c1".to_string()))
        );
    }

    #[test]
    fn unknown_cards_are_not_found() {
        let (_clock, store) = store_with(vec![]);
        assert_eq!(
            store.claim("ghost", "node-a", 1.0),
            Err(CoordinatorError::NotFound("ghost".to_string()))
        );
        assert_eq!(
            store.get("ghost"),
            Err(CoordinatorError::NotFound("ghost".to_string()))
        );
    }
}
