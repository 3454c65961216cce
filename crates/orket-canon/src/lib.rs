// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical JSON encoding and structural digests for the Orket kernel.
//!
//! Everything the kernel writes to disk or hashes goes through this crate.
//! The profile is RFC 8785 (JCS) narrowed by the Orket digest rules:
//!
//! - object keys sorted lexicographically, compact separators;
//! - strings normalized (`\r\n` and `\r` become `\n`), non-ASCII kept as
//!   UTF-8 literals;
//! - numbers are integers only, inside the JS-safe 53-bit range — floats,
//!   NaN and infinities are rejected;
//! - arrays keep their order except under the unordered-list keys, where
//!   elements sort by their canonical byte form;
//! - a fixed set of non-semantic keys is stripped before digesting.
//!
//! The same bytes must come out on every OS and every re-run; the replay
//! parity checks depend on it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod canonical;
mod diff;
mod error;
mod token;

pub use canonical::{
    canonical_bytes, canonicalize, digest_of, structural_digest, turn_result_digest,
    JS_SAFE_INT_MAX, JS_SAFE_INT_MIN, NON_SEMANTIC_KEYS, UNORDERED_LIST_KEYS,
};
pub use diff::{first_diff_path, raw_signature};
pub use error::CanonicalizationError;
pub use token::{fs_token, pointer_token};
