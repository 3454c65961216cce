// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structured issues and kernel results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Severity of an issue or event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Level {
    /// Informational; never affects an outcome.
    Info,
    /// Advisory; never affects an outcome.
    Warn,
    /// Failure; at least one `Fail` issue forces outcome `FAIL`.
    Fail,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
        })
    }
}

/// Binary outcome of any kernel operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// The operation completed with no failing issues.
    Pass,
    /// The operation failed; `issues` explains why.
    Fail,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        })
    }
}

/// One structured finding.
///
/// The `(location, code, message)` triple is stable across re-runs for the
/// same inputs; `details` carries code-specific context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KernelIssue {
    /// Severity.
    pub level: Level,
    /// Pipeline stage that produced the issue (`base_shape`, `lsi`, …).
    pub stage: String,
    /// Registered code from [`crate::codes`].
    pub code: String,
    /// RFC-6901 pointer to the offending node.
    pub location: String,
    /// Human-readable description.
    pub message: String,
    /// Code-specific context, canonical-JSON-sortable.
    pub details: Map<String, Value>,
}

impl KernelIssue {
    /// A `FAIL`-level issue with empty details.
    pub fn fail(
        stage: impl Into<String>,
        code: impl Into<String>,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level: Level::Fail,
            stage: stage.into(),
            code: code.into(),
            location: location.into(),
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Attach a detail entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

/// Result shape shared by every public kernel operation.
///
/// The kernel never propagates errors across its API surface; failures are
/// reported here with a sorted issue list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KernelResult {
    /// PASS iff no failing issues.
    pub outcome: Outcome,
    /// Sorted issues (see [`sort_issues`]).
    pub issues: Vec<KernelIssue>,
    /// Single-line events in emission order.
    pub events: Vec<String>,
}

impl KernelResult {
    /// A passing result carrying only events.
    #[must_use]
    pub fn pass(events: Vec<String>) -> Self {
        Self {
            outcome: Outcome::Pass,
            issues: Vec::new(),
            events,
        }
    }

    /// A failing result.
    #[must_use]
    pub fn fail(issues: Vec<KernelIssue>, events: Vec<String>) -> Self {
        Self {
            outcome: Outcome::Fail,
            issues,
            events,
        }
    }
}

/// Sort issues deterministically by `(location, code, canonical details)`.
pub fn sort_issues(issues: &mut [KernelIssue]) {
    issues.sort_by(|a, b| {
        let a_details = serde_json::to_string(&a.details).unwrap_or_default();
        let b_details = serde_json::to_string(&b.details).unwrap_or_default();
        (&a.location, &a.code, a_details).cmp(&(&b.location, &b.code, b_details))
    });
}
