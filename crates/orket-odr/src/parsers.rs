// SPDX-License-Identifier: MIT OR Apache-2.0
//! Strict section parsers for architect and auditor output.
//!
//! Both roles must emit exactly the required `###` headers, in order, each
//! at most once. Header matching is case-insensitive on trimmed lines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const ARCHITECT_HEADERS: [&str; 4] = [
    "### REQUIREMENT",
    "### CHANGELOG",
    "### ASSUMPTIONS",
    "### OPEN_QUESTIONS",
];

const AUDITOR_HEADERS: [&str; 4] = [
    "### CRITIQUE",
    "### PATCHES",
    "### EDGE_CASES",
    "### TEST_GAPS",
];

/// Replace `\r\n` and `\r` with `\n`.
#[must_use]
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// A contract violation found while parsing a role's output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    /// Stable code: `EMPTY_INPUT`, `DUPLICATE_HEADER`, `MISSING_HEADER`,
    /// `HEADER_OUT_OF_ORDER`, or `EMPTY_REQUIREMENT`.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl ParseError {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Parsed architect sections.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectDoc {
    /// The requirement text (non-empty by contract).
    pub requirement: String,
    /// Changelog bullet items.
    pub changelog: Vec<String>,
    /// Assumption bullet items.
    pub assumptions: Vec<String>,
    /// Open-question bullet items.
    pub open_questions: Vec<String>,
}

/// Parsed auditor sections.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditorDoc {
    /// Critique bullet items.
    pub critique: Vec<String>,
    /// Patch bullet items.
    pub patches: Vec<String>,
    /// Edge-case bullet items.
    pub edge_cases: Vec<String>,
    /// Test-gap bullet items.
    pub test_gaps: Vec<String>,
}

fn extract_sections(
    text: &str,
    required_headers: &[&str],
) -> Result<BTreeMap<String, String>, ParseError> {
    let normalized = normalize_newlines(text);
    if normalized.trim().is_empty() {
        return Err(ParseError::new("EMPTY_INPUT", "Input text is empty."));
    }

    let lines: Vec<&str> = normalized.split('\n').collect();
    let mut positions: BTreeMap<&str, Vec<usize>> = required_headers
        .iter()
        .map(|header| (*header, Vec::new()))
        .collect();

    for (idx, line) in lines.iter().enumerate() {
        let stripped = line.trim().to_lowercase();
        for header in required_headers {
            if stripped == header.to_lowercase() {
                positions.get_mut(header).expect("seeded above").push(idx);
            }
        }
    }

    for header in required_headers {
        if positions[header].len() > 1 {
            return Err(ParseError::new(
                "DUPLICATE_HEADER",
                format!("Duplicate header detected: {header}"),
            ));
        }
    }

    let missing: Vec<&str> = required_headers
        .iter()
        .filter(|header| positions[**header].is_empty())
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(ParseError::new(
            "MISSING_HEADER",
            format!("Missing required header(s): {}", missing.join(", ")),
        ));
    }

    let mut found_by_position: Vec<(usize, &str)> = required_headers
        .iter()
        .map(|header| (positions[header][0], *header))
        .collect();
    found_by_position.sort_by_key(|(pos, _)| *pos);
    let found_sequence: Vec<&str> = found_by_position.iter().map(|(_, h)| *h).collect();
    if found_sequence != required_headers {
        return Err(ParseError::new(
            "HEADER_OUT_OF_ORDER",
            format!(
                "Required headers are out of order. expected={required_headers:?} found={found_sequence:?}"
            ),
        ));
    }

    let mut sections = BTreeMap::new();
    for (idx, header) in required_headers.iter().enumerate() {
        let start = positions[header][0] + 1;
        let end = if idx == required_headers.len() - 1 {
            lines.len()
        } else {
            positions[required_headers[idx + 1]][0]
        };
        let chunk = lines[start..end].join("\n").trim().to_string();
        sections.insert((*header).to_string(), chunk);
    }
    Ok(sections)
}

/// Flatten a section body into bullet items; bare lines count as items.
fn to_list(section_text: &str) -> Vec<String> {
    let mut rows = Vec::new();
    for line in normalize_newlines(section_text).split('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix('-') {
            let item = rest.trim();
            if !item.is_empty() {
                rows.push(item.to_string());
            }
            continue;
        }
        rows.push(trimmed.to_string());
    }
    rows
}

/// Parse architect output: `### REQUIREMENT / CHANGELOG / ASSUMPTIONS /
/// OPEN_QUESTIONS`, in that order. The requirement must be non-empty.
pub fn parse_architect(text: &str) -> Result<ArchitectDoc, ParseError> {
    let sections = extract_sections(text, &ARCHITECT_HEADERS)?;
    let requirement = sections["### REQUIREMENT"].trim().to_string();
    if requirement.is_empty() {
        return Err(ParseError::new(
            "EMPTY_REQUIREMENT",
            "### REQUIREMENT section must contain non-whitespace text.",
        ));
    }
    Ok(ArchitectDoc {
        requirement,
        changelog: to_list(&sections["### CHANGELOG"]),
        assumptions: to_list(&sections["### ASSUMPTIONS"]),
        open_questions: to_list(&sections["### OPEN_QUESTIONS"]),
    })
}

/// Parse auditor output: `### CRITIQUE / PATCHES / EDGE_CASES / TEST_GAPS`.
pub fn parse_auditor(text: &str) -> Result<AuditorDoc, ParseError> {
    let sections = extract_sections(text, &AUDITOR_HEADERS)?;
    Ok(AuditorDoc {
        critique: to_list(&sections["### CRITIQUE"]),
        patches: to_list(&sections["### PATCHES"]),
        edge_cases: to_list(&sections["### EDGE_CASES"]),
        test_gaps: to_list(&sections["### TEST_GAPS"]),
    })
}
