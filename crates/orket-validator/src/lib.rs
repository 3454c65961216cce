// SPDX-License-Identifier: MIT OR Apache-2.0
//! Kernel API v1: the front-end gluing canonicalization, the index, the
//! promotion engine, and the capability gate into one in-process contract.
//!
//! Requests and responses are dict-shaped JSON values carrying
//! `contract_version: "kernel_api/v1"`. Operations that reject a request
//! shape return a [`KernelIssue`] as the error arm; `execute_turn` itself
//! never fails — it reports everything through the turn result.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod capability;
mod replay;
mod turn;

pub use capability::{authorize_tool_call, resolve_capability, CapabilityPolicy};
pub use replay::{compare_runs, replay_run};
pub use turn::{execute_turn, finish_run, start_run};

/// Contract version tag carried by every kernel API request and response.
pub const CONTRACT_VERSION: &str = "kernel_api/v1";

/// Default visibility mode for new runs.
pub const DEFAULT_VISIBILITY_MODE: &str = "local_only";

/// Default workspace root for new runs.
pub const DEFAULT_WORKSPACE_ROOT: &str = ".orket_kernel";
