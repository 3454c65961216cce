// SPDX-License-Identifier: MIT OR Apache-2.0
//! The lease coordinator.
//!
//! Hands out time-bounded leases on units of work ("cards") to remote
//! workers, supports renewal, detects expiry, allows hedged concurrent
//! execution, and guarantees at-most-one committed outcome per card. All
//! mutations serialize through one mutex; deadlines compare against an
//! injectable monotonic clock, never wall time.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod clock;
mod store;

pub use api::{build_app, ApiError, AppState, ClaimRequest, CompleteRequest, RenewRequest};
pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{Card, CardState, CoordinatorError, CoordinatorStore};
