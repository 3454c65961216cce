// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Orket canonicalization profile.

use crate::error::CanonicalizationError;
use crate::token::pointer_token;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Largest integer representable without drift across JSON runtimes.
pub const JS_SAFE_INT_MAX: i64 = (1_i64 << 53) - 1;
/// Smallest integer representable without drift across JSON runtimes.
pub const JS_SAFE_INT_MIN: i64 = -JS_SAFE_INT_MAX;

/// Keys stripped before digesting. These carry run-local or wall-clock
/// information that must not influence structural identity.
pub const NON_SEMANTIC_KEYS: &[&str] = &[
    "timestamp",
    "timestamps",
    "created_at",
    "updated_at",
    "recorded_at",
    "run_id",
    "run_ids",
    "run_path",
    "path",
    "paths",
    "temp_path",
    "elapsed_ms",
    "duration_ms",
    "latency_ms",
    "perf",
    "metrics_runtime",
];

/// Keys whose array values are treated as unordered sets: elements are
/// sorted by their canonical byte form.
pub const UNORDERED_LIST_KEYS: &[&str] = &["nodes", "edges", "relationships", "links", "refs"];

/// Turn-result fields excluded from [`turn_result_digest`] wholesale.
const TURN_RESULT_VOLATILE_KEYS: &[&str] = &["events", "trace", "turn_result_digest"];

/// The per-issue fields that participate in the turn-result digest.
const ISSUE_SEMANTIC_KEYS: &[&str] = &["level", "stage", "code", "location"];

/// Per-decision fields excluded from the turn-result digest. `decision_id`
/// hashes over the run id, and `reason` is free-form diagnostic text.
const DECISION_VOLATILE_KEYS: &[&str] = &["decision_id", "reason"];

pub(crate) fn normalize_string(value: &str) -> String {
    value.replace("\r\n", "\n").replace('\r', "\n")
}

fn is_non_semantic(key: &str) -> bool {
    NON_SEMANTIC_KEYS.contains(&key)
}

fn is_unordered_list(parent_key: &str) -> bool {
    UNORDERED_LIST_KEYS.contains(&parent_key)
}

/// Reduce `value` to its canonical form.
///
/// Strips non-semantic keys, normalizes strings, validates the integer-only
/// number domain, and sorts unordered-list arrays. The returned [`Value`]
/// serializes to canonical bytes with plain `serde_json::to_string` (object
/// keys sort because the underlying map is ordered).
///
/// # Errors
///
/// [`CanonicalizationError`] naming the offending path when a float, an
/// out-of-range integer, or a non-finite number is encountered.
pub fn canonicalize(value: &Value) -> Result<Value, CanonicalizationError> {
    canonicalize_at(value, "", "$")
}

fn canonicalize_at(
    value: &Value,
    parent_key: &str,
    path: &str,
) -> Result<Value, CanonicalizationError> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut cleaned = Map::new();
            for key in keys {
                if is_non_semantic(key) {
                    continue;
                }
                let child_path = format!("{path}/{}", pointer_token(key));
                let child = canonicalize_at(&map[key.as_str()], key, &child_path)?;
                cleaned.insert(key.clone(), child);
            }
            Ok(Value::Object(cleaned))
        }
        Value::Array(items) => {
            let mut canonical_items = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                let child_path = format!("{path}/{idx}");
                canonical_items.push(canonicalize_at(item, parent_key, &child_path)?);
            }
            if is_unordered_list(parent_key) {
                let mut keyed: Vec<(Vec<u8>, Value)> = canonical_items
                    .into_iter()
                    .map(|item| (serialize_canonical(&item), item))
                    .collect();
                keyed.sort_by(|a, b| a.0.cmp(&b.0));
                canonical_items = keyed.into_iter().map(|(_, item)| item).collect();
            }
            Ok(Value::Array(canonical_items))
        }
        Value::String(s) => Ok(Value::String(normalize_string(s))),
        Value::Number(n) => {
            if n.is_f64() {
                return Err(CanonicalizationError::new(
                    path,
                    "non-integer number (float); the Orket digest profile forbids floats",
                ));
            }
            if let Some(v) = n.as_i64() {
                if !(JS_SAFE_INT_MIN..=JS_SAFE_INT_MAX).contains(&v) {
                    return Err(CanonicalizationError::new(
                        path,
                        format!(
                            "integer {v} outside the safe range [{JS_SAFE_INT_MIN}, {JS_SAFE_INT_MAX}]"
                        ),
                    ));
                }
            } else if let Some(v) = n.as_u64() {
                if v > JS_SAFE_INT_MAX as u64 {
                    return Err(CanonicalizationError::new(
                        path,
                        format!("integer {v} outside the safe range [{JS_SAFE_INT_MIN}, {JS_SAFE_INT_MAX}]"),
                    ));
                }
            }
            Ok(value.clone())
        }
        Value::Bool(_) | Value::Null => Ok(value.clone()),
    }
}

/// Serialize an already-canonical [`Value`]. Compact separators, sorted
/// keys, non-ASCII as literal UTF-8.
fn serialize_canonical(value: &Value) -> Vec<u8> {
    // A canonical Value contains only shapes serde_json can always encode.
    serde_json::to_string(value)
        .expect("canonical value serializes")
        .into_bytes()
}

/// Canonical UTF-8 bytes of `value` under the Orket profile.
///
/// No BOM, no trailing newline.
///
/// # Errors
///
/// See [`canonicalize`].
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>, CanonicalizationError> {
    Ok(serialize_canonical(&canonicalize(value)?))
}

/// Hex-encoded SHA-256 of already-canonical bytes.
#[must_use]
pub fn structural_digest(canonical: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical);
    format!("{:x}", hasher.finalize())
}

/// `structural_digest(canonical_bytes(value))`.
///
/// # Errors
///
/// See [`canonicalize`].
pub fn digest_of(value: &Value) -> Result<String, CanonicalizationError> {
    Ok(structural_digest(&canonical_bytes(value)?))
}

/// Digest of a turn result over its semantic surface only.
///
/// Excludes the event log, the trace, the stored digest itself, free-text
/// issue diagnostics, and per-decision volatile fields, then digests the
/// remainder under the canonical profile (which also drops `run_id` as a
/// non-semantic key). Two turns that differ only in log noise produce the
/// same digest; any structural change produces a different one.
///
/// # Errors
///
/// See [`canonicalize`].
pub fn turn_result_digest(result: &Value) -> Result<String, CanonicalizationError> {
    let mut reduced = result.clone();
    if let Value::Object(map) = &mut reduced {
        for key in TURN_RESULT_VOLATILE_KEYS {
            map.remove(*key);
        }
        if let Some(Value::Array(issues)) = map.get_mut("issues") {
            for issue in issues.iter_mut() {
                if let Value::Object(issue_map) = issue {
                    issue_map.retain(|key, _| ISSUE_SEMANTIC_KEYS.contains(&key.as_str()));
                }
            }
        }
        if let Some(Value::Object(caps)) = map.get_mut("capabilities") {
            for decisions_key in ["decisions", "decisions_v1_2_1"] {
                if let Some(Value::Array(decisions)) = caps.get_mut(decisions_key) {
                    for decision in decisions.iter_mut() {
                        if let Value::Object(decision_map) = decision {
                            for key in DECISION_VOLATILE_KEYS {
                                decision_map.remove(*key);
                            }
                        }
                    }
                }
            }
        }
    }
    digest_of(&reduced)
}
