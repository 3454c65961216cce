// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonicalization failure type.

/// Returned when a value cannot be encoded under the Orket digest profile.
///
/// Carries the RFC-6901 pointer of the offending node so callers can surface
/// a stable `location` in issues and events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("canonicalization failed at {path}: {reason}")]
pub struct CanonicalizationError {
    /// RFC-6901 pointer to the node that violated the profile (`$`-rooted).
    pub path: String,
    /// Human-readable description of the violation.
    pub reason: String,
}

impl CanonicalizationError {
    pub(crate) fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
