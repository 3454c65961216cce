// SPDX-License-Identifier: MIT OR Apache-2.0
//! Convergence metrics: shingle similarity and length-based diff ratio.

use crate::parsers::normalize_newlines;
use std::collections::BTreeSet;

/// Lowercase, strip everything outside `[a-z0-9\s]`, collapse whitespace.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let lowered = normalize_newlines(text).to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    for ch in lowered.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            out.push(ch);
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace tokens of the normalized text.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return Vec::new();
    }
    normalized.split(' ').map(str::to_string).collect()
}

/// The set of `k`-token shingles. Empty when fewer than `k` tokens.
#[must_use]
pub fn shingles(tokens: &[String], k: usize) -> BTreeSet<String> {
    if k == 0 || tokens.len() < k {
        return BTreeSet::new();
    }
    tokens.windows(k).map(|window| window.join(" ")).collect()
}

/// Jaccard similarity of the `k`-shingle sets of `a` and `b`.
///
/// `0.0` when either side has no shingles.
#[must_use]
pub fn jaccard_sim(a: &str, b: &str, k: usize) -> f64 {
    let sa = shingles(&tokenize(a), k);
    let sb = shingles(&tokenize(b), k);
    if sa.is_empty() || sb.is_empty() {
        return 0.0;
    }
    let intersection = sa.intersection(&sb).count() as f64;
    let union = sa.union(&sb).count() as f64;
    intersection / union
}

/// Relative length change between consecutive requirement versions.
///
/// Lengths count Unicode codepoints, not bytes, so non-ASCII text weighs
/// the same regardless of encoding width.
#[must_use]
pub fn diff_ratio(curr: &str, prev: &str) -> f64 {
    let curr_len = curr.chars().count() as f64;
    let prev_len = prev.chars().count() as f64;
    (curr_len - prev_len).abs() / prev_len.max(1.0)
}
