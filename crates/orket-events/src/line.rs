// SPDX-License-Identifier: MIT OR Apache-2.0
//! The single-line event format.

use crate::issue::Level;
use serde_json::Value;

/// One `key=value` detail pair for [`event_line`].
pub type Detail = (&'static str, Value);

fn escape_newlines(text: &str) -> String {
    text.replace('\r', "\\r").replace('\n', "\\n")
}

fn format_detail_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => escape_newlines(s),
        Value::Number(n) => n.to_string(),
        // Composite values render as compact sorted JSON so the line stays
        // byte-identical across re-runs.
        Value::Object(_) | Value::Array(_) => {
            escape_newlines(&serde_json::to_string(value).unwrap_or_default())
        }
    }
}

/// Render one event line.
///
/// `[LEVEL] [STAGE:<stage>] [CODE:<CODE>] [LOC:<rfc6901>] <message> | k=v …`
///
/// Detail keys are emitted in sorted order; newlines in the message and in
/// string values are escaped so the line never spans rows. This format is
/// the parity surface consumed by `compare_runs`.
#[must_use]
pub fn event_line(
    level: Level,
    stage: &str,
    code: &str,
    location: &str,
    message: &str,
    details: &[Detail],
) -> String {
    let mut sorted: Vec<&Detail> = details.iter().collect();
    sorted.sort_by_key(|detail| detail.0);
    let detail_text = sorted
        .iter()
        .map(|(key, value)| format!("{key}={}", format_detail_value(value)))
        .collect::<Vec<_>>()
        .join(" ");

    let head = format!(
        "[{level}] [STAGE:{stage}] [CODE:{code}] [LOC:{location}] {} |",
        escape_newlines(message)
    );
    if detail_text.is_empty() {
        head
    } else {
        format!("{head} {detail_text}")
    }
}

/// Extract the `CODE` token from an event line, if present.
#[must_use]
pub fn event_code(line: &str) -> Option<&str> {
    let start = line.find("[CODE:")? + "[CODE:".len();
    let end = line[start..].find(']')? + start;
    Some(&line[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn line_has_fixed_shape_and_sorted_details() {
        let line = event_line(
            Level::Info,
            "promotion",
            "I_PROMOTION_PASS",
            "/index/committed",
            "Promotion completed.",
            &[
                ("turn_id", json!("turn-0001")),
                ("run_id", json!("run-0001")),
                ("stems", json!(["a", "b"])),
            ],
        );
        assert_eq!(
            line,
            "[INFO] [STAGE:promotion] [CODE:I_PROMOTION_PASS] [LOC:/index/committed] \
             Promotion completed. | run_id=run-0001 stems=[\"a\",\"b\"] turn_id=turn-0001"
        );
    }

    #[test]
    fn newlines_never_split_the_line() {
        let line = event_line(
            Level::Fail,
            "base_shape",
            "E_BASE_SHAPE_INVALID_LINKS_VALUE",
            "/links",
            "multi\nline\r\nmessage",
            &[("text", json!("a\nb"))],
        );
        assert_eq!(line.lines().count(), 1);
        assert!(line.contains("multi\\nline"));
        assert!(line.contains("text=a\\nb"));
    }

    #[test]
    fn empty_details_end_with_bare_pipe() {
        let line = event_line(Level::Info, "replay", "I_GATEKEEPER_PASS", "/x", "ok", &[]);
        assert!(line.ends_with("ok |"));
    }

    #[test]
    fn event_code_extraction() {
        let line = event_line(Level::Info, "lsi", "I_REF_VISIBLE", "/links/a/id", "ok", &[]);
        assert_eq!(event_code(&line), Some("I_REF_VISIBLE"));
        assert_eq!(event_code("no code here"), None);
    }
}
