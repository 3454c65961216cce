// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structural diff pointers and raw signatures.

use crate::canonical::normalize_string;
use crate::token::pointer_token;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Pointer to the first node where two JSON byte sequences differ.
///
/// Both inputs are parsed as JSON; `"$"` is returned when they are equal or
/// when either side fails to parse. Otherwise the result is a `$`-rooted
/// RFC-6901 pointer: object keys are compared in sorted order, arrays by
/// index (a length mismatch points at the array itself).
#[must_use]
pub fn first_diff_path(a: &[u8], b: &[u8]) -> String {
    let (Ok(left), Ok(right)) = (
        serde_json::from_slice::<Value>(a),
        serde_json::from_slice::<Value>(b),
    ) else {
        return "$".to_string();
    };

    if left == right {
        return "$".to_string();
    }
    first_diff_path_value(&left, &right, "$")
}

fn first_diff_path_value(left: &Value, right: &Value, path: &str) -> String {
    match (left, right) {
        (Value::Object(lm), Value::Object(rm)) => {
            let mut left_keys: Vec<&String> = lm.keys().collect();
            let mut right_keys: Vec<&String> = rm.keys().collect();
            left_keys.sort();
            right_keys.sort();
            if left_keys != right_keys {
                let mut union: Vec<&String> = lm.keys().chain(rm.keys()).collect();
                union.sort();
                union.dedup();
                for key in union {
                    if !lm.contains_key(key.as_str()) || !rm.contains_key(key.as_str()) {
                        return format!("{path}/{}", pointer_token(key));
                    }
                }
            }
            for key in left_keys {
                let (lv, rv) = (&lm[key.as_str()], &rm[key.as_str()]);
                if lv != rv {
                    return first_diff_path_value(lv, rv, &format!("{path}/{}", pointer_token(key)));
                }
            }
            path.to_string()
        }
        (Value::Array(la), Value::Array(ra)) => {
            if la.len() != ra.len() {
                return path.to_string();
            }
            for (idx, (lv, rv)) in la.iter().zip(ra.iter()).enumerate() {
                if lv != rv {
                    return first_diff_path_value(lv, rv, &format!("{path}/{idx}"));
                }
            }
            path.to_string()
        }
        _ => path.to_string(),
    }
}

/// Structural signature of a value *before* canonicalization.
///
/// Streams `path|kind|payload` lines for every node in document order and
/// digests the joined stream. Used by refinement diagnostics to tell "same
/// structure, different ordering" apart from genuine edits.
#[must_use]
pub fn raw_signature(value: &Value) -> String {
    let mut stream: Vec<String> = Vec::new();
    walk_raw(value, &mut stream, "$");
    let mut hasher = Sha256::new();
    hasher.update(stream.join("\n").as_bytes());
    format!("{:x}", hasher.finalize())
}

fn walk_raw(value: &Value, stream: &mut Vec<String>, path: &str) {
    match value {
        Value::Object(map) => {
            stream.push(format!("{path}|dict|{}", map.len()));
            for (key, item) in map {
                stream.push(format!("{path}|key|{key}"));
                walk_raw(item, stream, &format!("{path}/{}", pointer_token(key)));
            }
        }
        Value::Array(items) => {
            stream.push(format!("{path}|list|{}", items.len()));
            for (idx, item) in items.iter().enumerate() {
                walk_raw(item, stream, &format!("{path}/{idx}"));
            }
        }
        Value::String(s) => stream.push(format!("{path}|str|{}", normalize_string(s))),
        Value::Number(n) => stream.push(format!("{path}|num|{n}")),
        Value::Bool(b) => stream.push(format!("{path}|bool|{b}")),
        Value::Null => stream.push(format!("{path}|null|null")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equal_documents_return_root() {
        assert_eq!(first_diff_path(b"{\"a\":1}", b"{\"a\":1}"), "$");
    }

    #[test]
    fn unparsable_input_returns_root() {
        assert_eq!(first_diff_path(b"{", b"{\"a\":1}"), "$");
    }

    #[test]
    fn nested_difference_is_pointed_at() {
        let a = serde_json::to_vec(&json!({"outer": {"inner": [1, 2, 3]}})).unwrap();
        let b = serde_json::to_vec(&json!({"outer": {"inner": [1, 9, 3]}})).unwrap();
        assert_eq!(first_diff_path(&a, &b), "$/outer/inner/1");
    }

    #[test]
    fn missing_key_is_pointed_at() {
        let a = serde_json::to_vec(&json!({"a": 1, "b": 2})).unwrap();
        let b = serde_json::to_vec(&json!({"a": 1})).unwrap();
        assert_eq!(first_diff_path(&a, &b), "$/b");
    }

    #[test]
    fn array_length_mismatch_points_at_array() {
        let a = serde_json::to_vec(&json!({"xs": [1, 2]})).unwrap();
        let b = serde_json::to_vec(&json!({"xs": [1]})).unwrap();
        assert_eq!(first_diff_path(&a, &b), "$/xs");
    }

    #[test]
    fn escaped_keys_use_pointer_tokens() {
        let a = serde_json::to_vec(&json!({"a/b": 1})).unwrap();
        let b = serde_json::to_vec(&json!({"a/b": 2})).unwrap();
        assert_eq!(first_diff_path(&a, &b), "$/a~1b");
    }

    #[test]
    fn raw_signature_is_order_sensitive() {
        let a = json!({"xs": [1, 2]});
        let b = json!({"xs": [2, 1]});
        assert_ne!(raw_signature(&a), raw_signature(&b));
        assert_eq!(raw_signature(&a), raw_signature(&a.clone()));
    }
}
