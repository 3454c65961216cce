// SPDX-License-Identifier: MIT OR Apache-2.0
//! Worker client and renewal loop for the lease coordinator.
//!
//! A worker polls for open cards, claims the first one it wins, keeps the
//! lease alive from a background renewal task, does the work, and posts the
//! terminal transition. The renewer stops permanently on the first non-200
//! renewal — a lost lease is never resurrected — and the caller must accept
//! whatever outcome the coordinator has committed, even when it belongs to
//! a hedged sibling.
//!
//! Transport is abstracted behind [`CoordinatorApi`] so simulations can run
//! fully in-process and drive race windows deterministically by seed.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod transport;
mod worker;

pub use transport::{
    seeded_delay, CardResponse, CoordinatorApi, DelayFn, HttpCoordinator, LocalCoordinator,
    TransportError,
};
pub use worker::{Worker, WorkerConfig, WorkOutcome};
