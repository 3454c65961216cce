// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ref extraction from `links` graphs.
//!
//! A link graph is non-owning: a ref is a lookup by `(type, id)`, never a
//! pointer. Extraction is purely structural, so arbitrary dict-shaped
//! payloads stay valid — values that do not match the ref shape are
//! ignored.

use orket_canon::pointer_token;
use serde_json::Value;

/// One reference discovered inside a `links` object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkRef {
    /// Target type (`skill`, `invocation`, …).
    pub ref_type: String,
    /// Target identifier.
    pub ref_id: String,
    /// RFC-6901 pointer to the ref object, rooted at `/links`.
    pub pointer: String,
    /// Optional relationship tag carried on the ref object.
    pub relationship: Option<String>,
}

/// Structural predicate: an object with string `type` and string `id`.
#[must_use]
pub fn is_ref_object(value: &Value) -> bool {
    let Value::Object(map) = value else {
        return false;
    };
    matches!(map.get("type"), Some(Value::String(_)))
        && matches!(map.get("id"), Some(Value::String(_)))
}

fn ref_at(value: &Value, pointer: String) -> Option<LinkRef> {
    let map = value.as_object()?;
    let ref_type = map.get("type")?.as_str()?.to_string();
    let ref_id = map.get("id")?.as_str()?.to_string();
    let relationship = match map.get("relationship") {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    };
    Some(LinkRef {
        ref_type,
        ref_id,
        pointer,
        relationship,
    })
}

/// Enumerate every ref in `links`, keys in sorted order.
///
/// An object value matching the ref shape yields one ref at
/// `/links/<escaped-key>`; an array value yields one ref per matching
/// element at `/links/<escaped-key>/<index>`. Everything else is skipped.
#[must_use]
pub fn refs_from_links(links: &serde_json::Map<String, Value>) -> Vec<LinkRef> {
    let mut keys: Vec<&String> = links.keys().collect();
    keys.sort();

    let mut refs = Vec::new();
    for key in keys {
        let value = &links[key.as_str()];
        let key_pointer = format!("/links/{}", pointer_token(key));
        match value {
            Value::Array(items) => {
                for (idx, item) in items.iter().enumerate() {
                    if !is_ref_object(item) {
                        continue;
                    }
                    if let Some(link) = ref_at(item, format!("{key_pointer}/{idx}")) {
                        refs.push(link);
                    }
                }
            }
            _ if is_ref_object(value) => {
                if let Some(link) = ref_at(value, key_pointer) {
                    refs.push(link);
                }
            }
            _ => {}
        }
    }
    refs
}
