// SPDX-License-Identifier: MIT OR Apache-2.0
//! Refinement-convergence diagnostics.
//!
//! Pure helpers over requirement markdown and its embedded
//! `orket-constraints` ledger: section completeness, constraint
//! carry-forward, auditor incorporation, and issue lifecycle checks.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Sections every accepted requirement document must contain.
pub const REQUIRED_REQUIREMENT_SECTIONS: [&str; 7] = [
    "## Scope",
    "## Definitions",
    "## Non-goals",
    "## Invariants",
    "## Failure Codes",
    "## Acceptance Tests",
    "## Change Log",
];

static CONSTRAINTS_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```orket-constraints\s*(\{.*?\})\s*```").expect("static pattern")
});

/// Extract the `orket-constraints` fenced ledger from requirement markdown.
///
/// Empty map when no block is present.
///
/// # Errors
///
/// Propagates the JSON error when the block is present but malformed.
pub fn extract_constraints_ledger(
    requirement_markdown: &str,
) -> Result<Map<String, Value>, serde_json::Error> {
    let Some(captures) = CONSTRAINTS_BLOCK_RE.captures(requirement_markdown) else {
        return Ok(Map::new());
    };
    let payload = captures.get(1).expect("group 1 present").as_str();
    let value: Value = serde_json::from_str(payload)?;
    Ok(value.as_object().cloned().unwrap_or_default())
}

/// Remove the constraints block from requirement markdown.
#[must_use]
pub fn strip_constraints_block(requirement_markdown: &str) -> String {
    CONSTRAINTS_BLOCK_RE
        .replace_all(requirement_markdown, "")
        .into_owned()
}

/// Required sections absent from the requirement text.
#[must_use]
pub fn missing_required_sections(requirement_markdown: &str) -> Vec<String> {
    REQUIRED_REQUIREMENT_SECTIONS
        .iter()
        .filter(|section| !requirement_markdown.contains(**section))
        .map(|s| (*s).to_string())
        .collect()
}

fn as_list(value: Option<&Value>) -> &[Value] {
    value.and_then(Value::as_array).map_or(&[], Vec::as_slice)
}

fn ids_with_field(ledger: &Map<String, Value>, key: &str, require_reason: bool) -> BTreeSet<String> {
    let mut identifiers = BTreeSet::new();
    for row in as_list(ledger.get(key)) {
        let Some(row) = row.as_object() else {
            continue;
        };
        let id = row
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        if id.is_empty() {
            continue;
        }
        if require_reason {
            let reason = row
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim();
            if reason.is_empty() {
                continue;
            }
        }
        identifiers.insert(id);
    }
    identifiers
}

fn must_have_ids(ledger: &Map<String, Value>) -> BTreeSet<String> {
    ids_with_field(ledger, "must_have", false)
}

fn removed_ids(ledger: &Map<String, Value>) -> BTreeSet<String> {
    ids_with_field(ledger, "removed", true)
}

fn decision_required_id_set(ledger: &Map<String, Value>) -> BTreeSet<String> {
    ids_with_field(ledger, "decision_required", false)
}

/// Sorted decision-required clause ids of a ledger.
#[must_use]
pub fn decision_required_ids(ledger: &Map<String, Value>) -> Vec<String> {
    decision_required_id_set(ledger).into_iter().collect()
}

/// Must-have clauses of the previous ledger that the next ledger neither
/// kept nor explicitly removed (with a reason).
#[must_use]
pub fn carry_forward_gaps(
    previous_ledger: &Map<String, Value>,
    next_ledger: &Map<String, Value>,
) -> Vec<String> {
    let previous = must_have_ids(previous_ledger);
    let next = must_have_ids(next_ledger);
    let removed = removed_ids(next_ledger);
    previous
        .into_iter()
        .filter(|id| !next.contains(id) && !removed.contains(id))
        .collect()
}

/// Auditor issues the next ledger failed to incorporate.
///
/// Every auditor issue must resolve as `addressed` (pointing at a kept
/// clause), `decision_required` (pointing at a recorded decision), or
/// `declined` (with a rationale).
#[must_use]
pub fn auditor_incorporation_gaps(
    auditor_issues: &[Value],
    next_ledger: &Map<String, Value>,
) -> Vec<String> {
    let mut resolution_by_issue: std::collections::BTreeMap<String, &Map<String, Value>> =
        std::collections::BTreeMap::new();
    for row in as_list(next_ledger.get("auditor_resolution")) {
        let Some(row) = row.as_object() else {
            continue;
        };
        let issue_id = row
            .get("issue_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        if !issue_id.is_empty() {
            resolution_by_issue.insert(issue_id, row);
        }
    }

    let must_have = must_have_ids(next_ledger);
    let decision_required = decision_required_id_set(next_ledger);
    let mut missing = BTreeSet::new();
    for issue in auditor_issues {
        let issue_id = issue
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        if issue_id.is_empty() {
            continue;
        }
        let Some(resolution) = resolution_by_issue.get(&issue_id) else {
            missing.insert(issue_id);
            continue;
        };
        let status = resolution
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        match status.as_str() {
            "addressed" => {
                let clause_id = resolution
                    .get("clause_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                if clause_id.is_empty() || !must_have.contains(&clause_id) {
                    missing.insert(issue_id);
                }
            }
            "decision_required" => {
                let decision_id = resolution
                    .get("decision_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                if decision_id.is_empty() || !decision_required.contains(&decision_id) {
                    missing.insert(issue_id);
                }
            }
            "declined" => {
                let rationale = resolution
                    .get("rationale")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                if rationale.is_empty() {
                    missing.insert(issue_id);
                }
            }
            _ => {
                missing.insert(issue_id);
            }
        }
    }
    missing.into_iter().collect()
}

/// Forbidden patterns (case-insensitive) matched by the requirement text,
/// with the constraints block stripped first.
#[must_use]
pub fn forbidden_pattern_hits(requirement_markdown: &str, forbidden_patterns: &[String]) -> Vec<String> {
    let text = strip_constraints_block(requirement_markdown);
    let mut hits = BTreeSet::new();
    for pattern in forbidden_patterns {
        let matched = Regex::new(&format!("(?i){pattern}"))
            .map(|re| re.is_match(&text))
            .unwrap_or(false);
        if matched {
            hits.insert(pattern.clone());
        }
    }
    hits.into_iter().collect()
}

/// Count issues whose status is open, unresolved, or missing.
#[must_use]
pub fn unresolved_issue_count(issues: &[Value]) -> usize {
    issues
        .iter()
        .filter(|issue| {
            let status = issue
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_lowercase();
            matches!(status.as_str(), "" | "open" | "unresolved")
        })
        .count()
}

/// Issue ids that were resolved in one snapshot and later reopened without
/// a `reopened_from` justification.
#[must_use]
pub fn reopened_issues(issue_series: &[Vec<Value>]) -> Vec<String> {
    let mut resolved_once: BTreeSet<String> = BTreeSet::new();
    let mut reopened: BTreeSet<String> = BTreeSet::new();
    for snapshot in issue_series {
        for issue in snapshot {
            let issue_id = issue
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string();
            if issue_id.is_empty() {
                continue;
            }
            let status = issue
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_lowercase();
            let reopened_from = issue
                .get("reopened_from")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string();
            if status == "resolved" {
                resolved_once.insert(issue_id.clone());
            }
            if matches!(status.as_str(), "open" | "unresolved")
                && resolved_once.contains(&issue_id)
                && reopened_from.is_empty()
            {
                reopened.insert(issue_id);
            }
        }
    }
    reopened.into_iter().collect()
}

/// Whether a sequence never increases.
#[must_use]
pub fn non_increasing(values: &[usize]) -> bool {
    values.windows(2).all(|pair| pair[1] <= pair[0])
}

/// Sorted distinct `N days` phrases in the text.
#[must_use]
pub fn numeric_day_values(text: &str) -> Vec<String> {
    static DAYS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)\b\d+\s*days?\b").expect("static pattern"));
    let hits: BTreeSet<String> = DAYS_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();
    hits.into_iter().collect()
}
