// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property tests for the canonical profile.

use orket_canon::{canonical_bytes, digest_of, fs_token};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Strategy producing JSON values inside the Orket digest profile
/// (integer-only numbers, string/bool/null leaves).
fn profile_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-9_007_199_254_740_991_i64..=9_007_199_254_740_991_i64).prop_map(|n| json!(n)),
        "[a-zA-Z0-9 /:_.-]{0,24}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,8}", inner, 0..5)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn canonical_bytes_are_idempotent(value in profile_value()) {
        let first = canonical_bytes(&value).unwrap();
        let reparsed: Value = serde_json::from_slice(&first).unwrap();
        let second = canonical_bytes(&reparsed).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn digest_is_stable_across_calls(value in profile_value()) {
        prop_assert_eq!(digest_of(&value).unwrap(), digest_of(&value).unwrap());
    }

    #[test]
    fn canonical_bytes_have_no_trailing_newline(value in profile_value()) {
        let bytes = canonical_bytes(&value).unwrap();
        prop_assert!(!bytes.ends_with(b"\n"));
    }

    #[test]
    fn fs_token_roundtrips_safe_alphabet(s in "[A-Za-z0-9._~-]{0,32}") {
        prop_assert_eq!(fs_token(&s), s);
    }

    #[test]
    fn fs_token_output_is_always_safe(s in ".{0,32}") {
        let token = fs_token(&s);
        prop_assert!(token.bytes().all(|b| matches!(
            b,
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'~' | b'-' | b'%'
        )));
    }
}

#[test]
fn unordered_graph_permutations_share_a_digest() {
    let a = json!({
        "nodes": [{"id": "n2"}, {"id": "n1"}],
        "edges": [{"from": "n1", "to": "n2"}],
    });
    let b = json!({
        "edges": [{"from": "n1", "to": "n2"}],
        "nodes": [{"id": "n1"}, {"id": "n2"}],
    });
    assert_eq!(digest_of(&a).unwrap(), digest_of(&b).unwrap());
}
