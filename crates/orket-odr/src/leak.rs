// SPDX-License-Identifier: MIT OR Apache-2.0
//! The code-leak gate.
//!
//! Architect and auditor text must stay at the requirements level; code
//! slipping into either side poisons the refinement loop. Two modes:
//!
//! - `strict` — any configured regex over the combined text is a hard leak;
//! - `balanced_v1` — fenced code blocks, anchored Python/JS/TS structural
//!   patterns, and tooling tokens in CLI context are hard leaks; weak
//!   tokens only warn; a structural-signal fallback catches code-shaped
//!   text that dodges the anchors.

use crate::parsers::normalize_newlines;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Default hard-leak regexes for `strict` mode.
pub const DEFAULT_CODE_LEAK_PATTERNS: [&str; 3] = [
    r"(?s)```(?:[^\n]*)\n.*?\n```",
    r"\b(def|class|import|fn|let|const|interface|type)\b",
    r"\b(npm|pip|cargo|docker|venv|node_modules)\b",
];

const WEAK_TOKENS: [&str; 6] = ["type", "interface", "schema", "contract", "signature", "struct"];
const WEAK_STRICT_TOKENS: [&str; 2] = ["type", "interface"];

static PY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?m)^\s*(?:[-*]\s+)?def\s+[A-Za-z_]\w*\s*\(",
        r"(?m)^\s*(?:[-*]\s+)?class\s+[A-Za-z_]\w*\s*[:(]",
        r"(?m)^\s*(?:[-*]\s+)?(from\s+\w[\w.]*\s+import|import\s+\w)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

static JS_TS_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?m)^\s*(?:[-*]\s+)?interface\s+[A-Za-z_]\w*\b",
        r"(?m)^\s*(?:[-*]\s+)?type\s+[A-Za-z_]\w*\s*=",
        r"(?m)^\s*(?:[-*]\s+)?(const|let|var)\s+[A-Za-z_]\w*\s*=",
        r"(?m)^\s*(?:[-*]\s+)?function\s+[A-Za-z_]\w*\s*\(",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

static TOOLING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(npm|pip|cargo|docker|venv|node_modules|node|bash|sh)\b")
        .expect("static pattern")
});

static CLI_MARKER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"--\w",
        r"-\w",
        r"&&|\|\||\|",
        r"\$\s*\w",
        r"(?i)\bpython\s+-m\b",
        r"(?i)\b(node|bash|sh)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

static EXEC_VERB_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(run|install|execute)\b").expect("static pattern"));
static INDENT_BLOCK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?: {4,}|\t).+\n(?: {4,}|\t).+").expect("static pattern"));
static CALL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w+\s*\([^)]*\)").expect("static pattern"));

/// Gate mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakGateMode {
    /// Configured regexes only; any match is a hard leak.
    Strict,
    /// Structural detectors plus weak-token warnings.
    #[default]
    BalancedV1,
}

/// A weak-token observation (warning only).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeakMatch {
    /// The observed token.
    pub token: String,
    /// Which detector produced it.
    pub detector: String,
    /// Up to 120 characters of context, newline-escaped.
    pub context_snippet: String,
}

/// The gate's verdict for one round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakDetection {
    /// Whether the round must stop with `CODE_LEAK`.
    pub hard_leak: bool,
    /// Deduplicated hard-match labels in detection order.
    pub matches_hard: Vec<String>,
    /// Weak observations (never stop the round).
    pub matches_weak: Vec<WeakMatch>,
    /// Leak classes observed (`FENCE`, `CODE`, `TOOLING`).
    pub classes: Vec<String>,
    /// Deduplicated warning strings.
    pub warnings: Vec<String>,
}

/// Simple any-match check used by strict configurations.
///
/// Unparsable patterns count as non-matching.
#[must_use]
pub fn check_code_leak(text: &str, patterns: &[String]) -> bool {
    let normalized = normalize_newlines(text);
    patterns
        .iter()
        .any(|p| Regex::new(p).map(|re| re.is_match(&normalized)).unwrap_or(false))
}

/// Character index of a byte offset (clamped to the text length).
fn char_index(text: &str, byte_idx: usize) -> usize {
    text[..byte_idx.min(text.len())].chars().count()
}

/// Byte offset of a character index (clamped to the text length).
fn byte_index(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map_or(text.len(), |(idx, _)| idx)
}

fn snippet(text: &str, start: usize, end: usize) -> String {
    const MAX_CHARS: usize = 120;
    let chars: Vec<char> = text.chars().collect();
    let center = (char_index(text, start) + char_index(text, end)) / 2;
    let half = MAX_CHARS / 2;
    let lo = center.saturating_sub(half);
    let hi = (center + half).min(chars.len());
    let raw: String = chars[lo.min(chars.len())..hi].iter().collect();
    let escaped = normalize_newlines(raw.trim()).replace('\n', "\\n");
    escaped.chars().take(MAX_CHARS).collect()
}

fn strip_list_prefix(line: &str) -> &str {
    let stripped = line.trim_start();
    if let Some(rest) = stripped.strip_prefix("- ").or_else(|| stripped.strip_prefix("* ")) {
        rest.trim_start()
    } else {
        stripped
    }
}

fn is_fence_open(line: &str) -> bool {
    let stripped = strip_list_prefix(line);
    stripped.starts_with("```") && !stripped.starts_with("````")
}

fn is_fence_close(line: &str) -> bool {
    let stripped = strip_list_prefix(line);
    if !stripped.starts_with("```") || stripped.starts_with("````") {
        return false;
    }
    stripped[3..].trim().is_empty()
}

fn has_fence_block(text: &str) -> bool {
    let normalized = normalize_newlines(text);
    let lines: Vec<&str> = normalized.split('\n').collect();
    for (index, line) in lines.iter().enumerate() {
        if !is_fence_open(line) {
            continue;
        }
        if lines[index + 1..].iter().any(|candidate| is_fence_close(candidate)) {
            return true;
        }
    }
    false
}

fn has_cli_context(fragment: &str) -> bool {
    CLI_MARKER_PATTERNS.iter().any(|re| re.is_match(fragment))
        || EXEC_VERB_PATTERN.is_match(fragment)
}

fn tooling_matches(text: &str) -> (Vec<String>, Vec<WeakMatch>) {
    let mut hard = Vec::new();
    let mut weak = Vec::new();
    for captures in TOOLING_PATTERN.captures_iter(text) {
        let m = captures.get(1).expect("group 1 always present");
        let token = m.as_str().to_lowercase();
        let line_start = text[..m.start()].rfind('\n').map_or(0, |i| i + 1);
        let line_end = text[m.end()..]
            .find('\n')
            .map_or(text.len(), |i| m.end() + i);
        let same_line = &text[line_start..line_end];
        // The 80-wide context window counts characters, not bytes.
        let start_char = char_index(text, m.start());
        let end_char = char_index(text, m.end());
        let around_start = byte_index(text, start_char.saturating_sub(80));
        let around_end = byte_index(text, end_char + 80);
        let around = &text[around_start..around_end];
        if has_cli_context(same_line) || has_cli_context(around) {
            hard.push(format!("tooling_context:{token}"));
        } else {
            weak.push(WeakMatch {
                token,
                detector: "tooling_without_context".to_string(),
                context_snippet: snippet(text, m.start(), m.end()),
            });
        }
    }
    (hard, weak)
}

fn weak_token_matches(text: &str) -> Vec<WeakMatch> {
    let mut matches = Vec::new();
    for token in WEAK_TOKENS {
        let re = Regex::new(&format!(r"(?i)\b{token}\b")).expect("static token pattern");
        for m in re.find_iter(text) {
            matches.push(WeakMatch {
                token: token.to_string(),
                detector: "weak_token".to_string(),
                context_snippet: snippet(text, m.start(), m.end()),
            });
        }
    }
    matches
}

fn fallback_signal_count(text: &str) -> (usize, bool) {
    let braces_pair = text.contains('{') && text.contains('}');
    let semicolons_ge_two = text.matches(';').count() >= 2;
    let equals_ge_two = text.matches('=').count() >= 2;
    let call_like = CALL_PATTERN.is_match(text);
    let arrow = text.contains("->") || text.contains("=>");
    let indent_block = INDENT_BLOCK_PATTERN.is_match(text);
    let signals = [
        braces_pair,
        semicolons_ge_two,
        equals_ge_two,
        call_like,
        arrow,
        indent_block,
    ];
    let structural = indent_block || braces_pair || semicolons_ge_two;
    (signals.iter().filter(|s| **s).count(), structural)
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Run the gate over one round's architect and auditor text.
#[must_use]
pub fn detect_code_leak(
    architect_raw: &str,
    auditor_raw: &str,
    mode: LeakGateMode,
    patterns: Option<&[String]>,
) -> LeakDetection {
    let combined = format!(
        "{}\n{}",
        normalize_newlines(architect_raw),
        normalize_newlines(auditor_raw)
    );

    if mode == LeakGateMode::Strict {
        let configured: Vec<String> = match patterns {
            Some(patterns) => patterns.to_vec(),
            None => DEFAULT_CODE_LEAK_PATTERNS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
        };
        let hard: Vec<String> = configured
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                Regex::new(p).map(|re| re.is_match(&combined)).unwrap_or(false)
            })
            .map(|(index, _)| format!("strict_pattern_{index}"))
            .collect();
        return LeakDetection {
            hard_leak: !hard.is_empty(),
            classes: if hard.is_empty() {
                vec![]
            } else {
                vec!["CODE".to_string()]
            },
            matches_hard: hard,
            matches_weak: Vec::new(),
            warnings: Vec::new(),
        };
    }

    let mut hard: Vec<String> = Vec::new();
    let mut weak = weak_token_matches(&combined);
    let mut classes: Vec<String> = Vec::new();

    if has_fence_block(&combined) {
        hard.push("fence_block".to_string());
        classes.push("FENCE".to_string());
    }

    for re in PY_PATTERNS.iter() {
        if re.is_match(&combined) {
            hard.push(format!("python_struct:{}", re.as_str()));
        }
    }
    for re in JS_TS_PATTERNS.iter() {
        if re.is_match(&combined) {
            hard.push(format!("js_ts_struct:{}", re.as_str()));
        }
    }
    if hard
        .iter()
        .any(|item| item.starts_with("python_struct:") || item.starts_with("js_ts_struct:"))
    {
        classes.push("CODE".to_string());
    }

    let (tooling_hard, tooling_weak) = tooling_matches(&combined);
    if !tooling_hard.is_empty() {
        hard.extend(tooling_hard);
        classes.push("TOOLING".to_string());
    }
    weak.extend(tooling_weak);

    // Fallback only when no hard signal fired yet.
    if hard.is_empty() {
        let (signal_count, structural) = fallback_signal_count(&combined);
        if signal_count >= 3 && structural {
            hard.push("fallback_structural_signals".to_string());
            classes.push("CODE".to_string());
        }
    }

    let warnings = dedup_preserving_order(
        weak.iter()
            .map(|row| {
                if WEAK_STRICT_TOKENS.contains(&row.token.as_str()) {
                    format!("WARN_LEAK_WEAK_TOKEN:{}", row.token)
                } else {
                    format!("WARN_LEAK_OBSERVED_TOKEN:{}", row.token)
                }
            })
            .collect(),
    );

    LeakDetection {
        hard_leak: !hard.is_empty(),
        matches_hard: dedup_preserving_order(hard),
        matches_weak: weak,
        classes: dedup_preserving_order(classes),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balanced(architect: &str, auditor: &str) -> LeakDetection {
        detect_code_leak(architect, auditor, LeakGateMode::BalancedV1, None)
    }

    #[test]
    fn fenced_block_is_a_hard_leak() {
        let detection = balanced("before\n```python\nprint('x')\n```\nafter", "clean");
        assert!(detection.hard_leak);
        assert!(detection.matches_hard.contains(&"fence_block".to_string()));
        assert!(detection.classes.contains(&"FENCE".to_string()));
    }

    #[test]
    fn anchored_python_def_is_a_hard_leak() {
        let detection = balanced("requirements:\ndef handler(event):", "clean");
        assert!(detection.hard_leak);
        assert!(detection
            .matches_hard
            .iter()
            .any(|m| m.starts_with("python_struct:")));
    }

    #[test]
    fn tooling_token_without_cli_context_only_warns() {
        let detection = balanced("The docker image metaphor is apt here.", "clean");
        assert!(!detection.hard_leak);
        assert!(detection
            .matches_weak
            .iter()
            .any(|m| m.token == "docker" && m.detector == "tooling_without_context"));
    }

    #[test]
    fn tooling_token_in_cli_context_is_hard() {
        let detection = balanced("Then run docker --rm to verify.", "clean");
        assert!(detection.hard_leak);
        assert!(detection
            .matches_hard
            .contains(&"tooling_context:docker".to_string()));
        assert!(detection.classes.contains(&"TOOLING".to_string()));
    }

    #[test]
    fn context_window_counts_characters_across_non_ascii_text() {
        // The CLI marker sits 71 characters (142 bytes) before the token:
        // inside an 80-character window, outside an 80-byte one.
        let text = format!("--force\n{}\ndocker", "é".repeat(70));
        let detection = balanced(&text, "clean");
        assert!(detection.hard_leak);
        assert!(detection
            .matches_hard
            .contains(&"tooling_context:docker".to_string()));
    }

    #[test]
    fn weak_tokens_warn_without_stopping() {
        let detection = balanced("The interface between teams is the type of contract we need.", "clean");
        assert!(!detection.hard_leak);
        assert!(detection
            .warnings
            .contains(&"WARN_LEAK_WEAK_TOKEN:interface".to_string()));
        assert!(detection
            .warnings
            .contains(&"WARN_LEAK_WEAK_TOKEN:type".to_string()));
        assert!(detection
            .warnings
            .contains(&"WARN_LEAK_OBSERVED_TOKEN:contract".to_string()));
    }

    #[test]
    fn structural_fallback_catches_code_shaped_text() {
        let text = "x = compute(a, b); y = combine(x); result { stored }";
        let detection = balanced(text, "clean");
        assert!(detection.hard_leak);
        assert!(detection
            .matches_hard
            .contains(&"fallback_structural_signals".to_string()));
    }

    #[test]
    fn prose_passes_clean() {
        let detection = balanced(
            "The requirement covers retries and backoff budgets.",
            "Critique: tighten the retry budget wording.",
        );
        assert!(!detection.hard_leak);
        assert!(detection.matches_hard.is_empty());
    }

    #[test]
    fn strict_mode_uses_configured_patterns_only() {
        let patterns: Vec<String> = vec![r"\bforbidden\b".to_string()];
        let detection = detect_code_leak(
            "nothing to see",
            "totally forbidden text",
            LeakGateMode::Strict,
            Some(&patterns),
        );
        assert!(detection.hard_leak);
        assert_eq!(detection.matches_hard, vec!["strict_pattern_0"]);
    }

    #[test]
    fn check_code_leak_ignores_unparsable_patterns() {
        let patterns = vec!["(".to_string(), r"\bdef\b".to_string()];
        assert!(check_code_leak("a def b", &patterns));
        assert!(!check_code_leak("clean", &patterns));
    }
}
