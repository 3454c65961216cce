// SPDX-License-Identifier: MIT OR Apache-2.0
//! Coordinator transports: HTTP and in-process.

use async_trait::async_trait;
use orket_coordinator::{
    ApiError, Card, ClaimRequest, CompleteRequest, CoordinatorStore, RenewRequest,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Transport-level failures (connectivity, serialization). Protocol-level
/// rejections come back as a [`CardResponse`] status instead.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// HTTP transport failed.
    #[error("coordinator request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Status plus the card body the coordinator returned (when it returned
/// one).
#[derive(Clone, Debug)]
pub struct CardResponse {
    /// HTTP status code.
    pub status: u16,
    /// The full card, present on 200 responses.
    pub card: Option<Card>,
}

impl CardResponse {
    /// Whether the call succeeded.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.status == 200
    }
}

/// The coordinator wire contract as seen by a worker.
#[async_trait]
pub trait CoordinatorApi: Send + Sync {
    /// `GET /cards?state=open`.
    async fn poll_open_cards(&self) -> Result<Vec<Card>, TransportError>;
    /// `POST /cards/{id}/claim`.
    async fn claim(&self, card_id: &str, req: &ClaimRequest)
        -> Result<CardResponse, TransportError>;
    /// `POST /cards/{id}/renew`.
    async fn renew(&self, card_id: &str, req: &RenewRequest)
        -> Result<CardResponse, TransportError>;
    /// `POST /cards/{id}/complete`.
    async fn complete(
        &self,
        card_id: &str,
        req: &CompleteRequest,
    ) -> Result<CardResponse, TransportError>;
    /// `POST /cards/{id}/fail`.
    async fn fail(&self, card_id: &str, req: &CompleteRequest)
        -> Result<CardResponse, TransportError>;
}

/// Injectable pre-request delay, seeded for reproducible race windows.
pub type DelayFn = Arc<dyn Fn() -> Duration + Send + Sync>;

/// A seeded uniform delay in `[minimum, maximum)`.
///
/// Two workers built with different seeds interleave differently but
/// reproducibly, which is how the race tests pin down their windows.
#[must_use]
pub fn seeded_delay(seed: u64, minimum: Duration, maximum: Duration) -> DelayFn {
    let rng = Mutex::new(StdRng::seed_from_u64(seed));
    Arc::new(move || {
        let mut rng = rng.lock().expect("rng poisoned");
        let span = maximum.saturating_sub(minimum);
        let t: f64 = rng.gen_range(0.0..1.0);
        minimum + span.mul_f64(t)
    })
}

// ---------------------------------------------------------------------------
// HTTP transport
// ---------------------------------------------------------------------------

/// Reqwest-backed transport for a remote coordinator.
pub struct HttpCoordinator {
    base_url: String,
    client: reqwest::Client,
}

impl HttpCoordinator {
    /// Transport against `base_url` (no trailing slash needed).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn post_card(
        &self,
        path: &str,
        body: &impl serde::Serialize,
    ) -> Result<CardResponse, TransportError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let card = if status == 200 {
            Some(response.json::<Card>().await?)
        } else {
            None
        };
        Ok(CardResponse { status, card })
    }
}

#[async_trait]
impl CoordinatorApi for HttpCoordinator {
    async fn poll_open_cards(&self) -> Result<Vec<Card>, TransportError> {
        let response = self
            .client
            .get(format!("{}/cards?state=open", self.base_url))
            .send()
            .await?;
        if response.status().as_u16() != 200 {
            return Ok(Vec::new());
        }
        Ok(response.json::<Vec<Card>>().await?)
    }

    async fn claim(
        &self,
        card_id: &str,
        req: &ClaimRequest,
    ) -> Result<CardResponse, TransportError> {
        self.post_card(&format!("/cards/{card_id}/claim"), req).await
    }

    async fn renew(
        &self,
        card_id: &str,
        req: &RenewRequest,
    ) -> Result<CardResponse, TransportError> {
        self.post_card(&format!("/cards/{card_id}/renew"), req).await
    }

    async fn complete(
        &self,
        card_id: &str,
        req: &CompleteRequest,
    ) -> Result<CardResponse, TransportError> {
        self.post_card(&format!("/cards/{card_id}/complete"), req)
            .await
    }

    async fn fail(
        &self,
        card_id: &str,
        req: &CompleteRequest,
    ) -> Result<CardResponse, TransportError> {
        self.post_card(&format!("/cards/{card_id}/fail"), req).await
    }
}

// ---------------------------------------------------------------------------
// In-process transport
// ---------------------------------------------------------------------------

/// Direct-store transport for simulations and tests.
///
/// Goes through the same state machine and the same status mapping as the
/// HTTP surface, without a socket in between.
pub struct LocalCoordinator {
    store: Arc<CoordinatorStore>,
}

impl LocalCoordinator {
    /// Transport over an in-process store.
    pub fn new(store: Arc<CoordinatorStore>) -> Self {
        Self { store }
    }

    fn to_response(result: Result<Card, orket_coordinator::CoordinatorError>) -> CardResponse {
        match result {
            Ok(card) => CardResponse {
                status: 200,
                card: Some(card),
            },
            Err(err) => CardResponse {
                status: ApiError::from(err).status.as_u16(),
                card: None,
            },
        }
    }
}

#[async_trait]
impl CoordinatorApi for LocalCoordinator {
    async fn poll_open_cards(&self) -> Result<Vec<Card>, TransportError> {
        Ok(self.store.list_open_cards())
    }

    async fn claim(
        &self,
        card_id: &str,
        req: &ClaimRequest,
    ) -> Result<CardResponse, TransportError> {
        Ok(Self::to_response(self.store.claim(
            card_id,
            &req.node_id,
            req.lease_duration,
        )))
    }

    async fn renew(
        &self,
        card_id: &str,
        req: &RenewRequest,
    ) -> Result<CardResponse, TransportError> {
        Ok(Self::to_response(self.store.renew(
            card_id,
            &req.node_id,
            req.lease_duration,
        )))
    }

    async fn complete(
        &self,
        card_id: &str,
        req: &CompleteRequest,
    ) -> Result<CardResponse, TransportError> {
        Ok(Self::to_response(self.store.complete(
            card_id,
            &req.node_id,
            req.result.clone(),
        )))
    }

    async fn fail(
        &self,
        card_id: &str,
        req: &CompleteRequest,
    ) -> Result<CardResponse, TransportError> {
        Ok(Self::to_response(self.store.fail(
            card_id,
            &req.node_id,
            req.result.clone(),
        )))
    }
}
