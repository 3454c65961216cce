// SPDX-License-Identifier: MIT OR Apache-2.0
//! The worker loop.

use crate::transport::{CardResponse, CoordinatorApi, DelayFn, TransportError};
use orket_coordinator::{ClaimRequest, CompleteRequest, RenewRequest};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Worker tuning.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// This worker's identity at the coordinator.
    pub node_id: String,
    /// Lease length requested on claim and renewal, in seconds.
    pub lease_duration: f64,
    /// Sleep between empty polls, in seconds.
    pub poll_interval: f64,
    /// Renewal cadence in seconds; defaults to a third of the lease.
    pub renew_interval: Option<f64>,
}

impl WorkerConfig {
    /// Config with the production defaults for `node_id`.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            lease_duration: 1.0,
            poll_interval: 0.05,
            renew_interval: None,
        }
    }

    fn renew_interval(&self) -> f64 {
        self.renew_interval
            .unwrap_or(self.lease_duration / 3.0)
            .max(0.001)
    }
}

/// What one unit of claimed work ended with.
#[derive(Clone, Debug)]
pub struct WorkOutcome {
    /// The coordinator's response to our terminal call. On 200 the card
    /// carries the *committed* result, which may belong to another worker.
    pub response: CardResponse,
    /// Whether the renewal loop observed a lost lease before completion.
    pub lease_lost: bool,
}

/// A polling worker bound to one coordinator transport.
pub struct Worker<A: CoordinatorApi> {
    api: Arc<A>,
    config: WorkerConfig,
    delay: Option<DelayFn>,
}

impl<A: CoordinatorApi + 'static> Worker<A> {
    /// Worker over `api` with `config`.
    pub fn new(api: Arc<A>, config: WorkerConfig) -> Self {
        Self {
            api,
            config,
            delay: None,
        }
    }

    /// Install a pre-request delay (see [`crate::seeded_delay`]).
    #[must_use]
    pub fn with_delay(mut self, delay: DelayFn) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn pre_request(&self) {
        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay()).await;
        }
    }

    /// Poll once and, if a claim succeeds, run one unit of work to its
    /// terminal transition. Returns `false` when no card was claimed.
    pub async fn run_once(&self, work_duration: f64) -> Result<bool, TransportError> {
        self.pre_request().await;
        let cards = self.api.poll_open_cards().await?;
        if cards.is_empty() {
            tokio::time::sleep(Duration::from_secs_f64(self.config.poll_interval)).await;
            return Ok(false);
        }

        for card in &cards {
            self.pre_request().await;
            let claim = self
                .api
                .claim(
                    &card.id,
                    &ClaimRequest {
                        node_id: self.config.node_id.clone(),
                        lease_duration: self.config.lease_duration,
                    },
                )
                .await?;
            if !claim.ok() {
                continue;
            }
            debug!(card_id = %card.id, node_id = %self.config.node_id, "claim won");
            self.run_claimed_work(
                &card.id,
                work_duration,
                json!({"worker": self.config.node_id, "state": "done"}),
            )
            .await?;
            return Ok(true);
        }

        tokio::time::sleep(Duration::from_secs_f64(self.config.poll_interval)).await;
        Ok(false)
    }

    /// Hold the lease while the work runs, then post completion.
    ///
    /// The renewal task ticks every `renew_interval`. Any non-200 renewal
    /// terminates it — the lease is gone and must not be fought over; the
    /// final `complete` still goes out and its 200 body is authoritative.
    pub async fn run_claimed_work(
        &self,
        card_id: &str,
        work_duration: f64,
        completion_result: Value,
    ) -> Result<WorkOutcome, TransportError> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let lease_lost = Arc::new(AtomicBool::new(false));
        let renewer = tokio::spawn(renew_loop(
            self.api.clone(),
            card_id.to_string(),
            self.config.node_id.clone(),
            self.config.lease_duration,
            self.config.renew_interval(),
            stop_rx,
            lease_lost.clone(),
        ));

        tokio::time::sleep(Duration::from_secs_f64(work_duration)).await;

        // Cooperative stop with a bounded join.
        let _ = stop_tx.send(true);
        if tokio::time::timeout(Duration::from_secs(2), renewer)
            .await
            .is_err()
        {
            warn!(card_id, "renewal task did not stop in time");
        }

        let response = self
            .complete(card_id, Some(completion_result))
            .await?;
        Ok(WorkOutcome {
            response,
            lease_lost: lease_lost.load(Ordering::SeqCst),
        })
    }

    /// Post a completion; the returned card carries the committed result.
    pub async fn complete(
        &self,
        card_id: &str,
        result: Option<Value>,
    ) -> Result<CardResponse, TransportError> {
        self.pre_request().await;
        self.api
            .complete(
                card_id,
                &CompleteRequest {
                    node_id: self.config.node_id.clone(),
                    result,
                },
            )
            .await
    }

    /// Post a failure; same idempotency rules as completion.
    pub async fn fail(
        &self,
        card_id: &str,
        result: Option<Value>,
    ) -> Result<CardResponse, TransportError> {
        self.pre_request().await;
        self.api
            .fail(
                card_id,
                &CompleteRequest {
                    node_id: self.config.node_id.clone(),
                    result,
                },
            )
            .await
    }
}

async fn renew_loop<A: CoordinatorApi>(
    api: Arc<A>,
    card_id: String,
    node_id: String,
    lease_duration: f64,
    renew_interval: f64,
    mut stop_rx: watch::Receiver<bool>,
    lease_lost: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    return;
                }
            }
            () = tokio::time::sleep(Duration::from_secs_f64(renew_interval)) => {
                let renewed = api
                    .renew(
                        &card_id,
                        &RenewRequest {
                            node_id: node_id.clone(),
                            lease_duration,
                        },
                    )
                    .await;
                match renewed {
                    Ok(response) if response.ok() => {
                        debug!(card_id = %card_id, "lease renewed");
                    }
                    Ok(response) => {
                        // Lost lease: stop renewing, never resurrect.
                        warn!(card_id = %card_id, status = response.status, "lease lost");
                        lease_lost.store(true, Ordering::SeqCst);
                        return;
                    }
                    Err(err) => {
                        warn!(card_id = %card_id, error = %err, "renewal transport error");
                        lease_lost.store(true, Ordering::SeqCst);
                        return;
                    }
                }
            }
        }
    }
}
