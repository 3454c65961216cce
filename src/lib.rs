// SPDX-License-Identifier: MIT OR Apache-2.0
//! Orket kernel — the deterministic execution core of the Orket
//! multi-agent orchestration platform.
//!
//! This facade re-exports the member crates under stable names:
//!
//! - [`canon`] — canonical JSON encoding and structural digests;
//! - [`events`] — the issue taxonomy and single-line event contract;
//! - [`store`] — the content-addressed object store;
//! - [`lsi`] — the Local Sovereign Index and promotion engine;
//! - [`odr`] — the deterministic refinement reactor;
//! - [`coordinator`] — the lease coordinator and its HTTP surface;
//! - [`worker`] — the worker client and renewal loop;
//! - [`validator`] — the kernel API v1 front-end.

#![deny(unsafe_code)]

pub use orket_canon as canon;
pub use orket_coordinator as coordinator;
pub use orket_events as events;
pub use orket_lsi as lsi;
pub use orket_odr as odr;
pub use orket_store as store;
pub use orket_validator as validator;
pub use orket_worker as worker;
