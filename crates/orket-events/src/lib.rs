// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime event formatting and the kernel issue taxonomy.
//!
//! Every component of the kernel reports through two surfaces:
//!
//! - **events** — deterministic single-line strings,
//!   `[LEVEL] [STAGE:<stage>] [CODE:<CODE>] [LOC:<rfc6901>] <message> | k=v …`.
//!   The line format is a contract: replay parity extracts codes from it.
//! - **issues** — structured [`KernelIssue`] records carried inside
//!   [`KernelResult`]-shaped responses.
//!
//! Codes are stable strings from the registered taxonomy in [`codes`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod issue;
mod line;

pub mod codes;

pub use issue::{KernelIssue, KernelResult, Level, Outcome, sort_issues};
pub use line::{event_code, event_line, Detail};
