// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link-integrity validation with visibility layering.

use crate::index::{LocalSovereignIndex, LsiError};
use crate::layout::{self, Scope};
use crate::links::refs_from_links;
use orket_events::{codes, event_line, sort_issues, KernelIssue, KernelResult, Level};
use serde_json::{json, Value};

/// The layer at which a ref target became visible.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Visibility {
    /// A staging source whose stem is the validating stem itself.
    Self_,
    /// Any other staging source.
    Staging,
    /// A committed source.
    Committed,
}

impl Visibility {
    fn as_str(self) -> &'static str {
        match self {
            Self::Self_ => "Self",
            Self::Staging => "Staging",
            Self::Committed => "Committed",
        }
    }
}

/// Validate every ref of a staged stem against the index.
///
/// For each `(type, id)` extracted from the staged links blob, visibility is
/// probed in strict order: **Self** (a staging source from this stem), then
/// **Staging** (any staging source), then **Committed**. A target visible at
/// no layer is an orphan: `E_RELATIONSHIP_ORPHAN` at the ref's `/id`
/// pointer. Issues come back sorted by `(location, code, details)`; outcome
/// is `PASS` iff there are none.
pub fn validate_links_against_index(
    lsi: &LocalSovereignIndex,
    run_id: &str,
    turn_id: &str,
    stem: &str,
) -> Result<KernelResult, LsiError> {
    let stem = normalize(stem);
    let staging = Scope::staging(run_id, turn_id);
    let staging_root = lsi.paths().scope_root(&staging);
    let mut events: Vec<String> = Vec::new();

    let Some(triplet) = lsi.read_triplet_record(&staging, &stem)? else {
        let issue = KernelIssue::fail(
            "relationship_vocabulary",
            codes::E_RELATIONSHIP_ORPHAN,
            "/ci/schema",
            "Triplet not found in staging for validation.",
        )
        .with_detail("stem", json!(stem))
        .with_detail("run_id", json!(run_id))
        .with_detail("turn_id", json!(turn_id));
        events.push(event_line(
            Level::Fail,
            "relationship_vocabulary",
            codes::E_RELATIONSHIP_ORPHAN,
            "/ci/schema",
            "Triplet missing in staging.",
            &[("stem", json!(stem))],
        ));
        return Ok(KernelResult::fail(vec![issue], events));
    };

    let Some(links_digest) = triplet.get("links_digest").and_then(Value::as_str) else {
        let issue = KernelIssue::fail(
            "base_shape",
            codes::E_BASE_SHAPE_INVALID_MANIFEST_VALUE,
            "/manifest",
            "Triplet record missing links_digest.",
        )
        .with_detail("stem", json!(stem));
        events.push(event_line(
            Level::Fail,
            "base_shape",
            codes::E_BASE_SHAPE_INVALID_MANIFEST_VALUE,
            "/manifest",
            "Triplet record missing links_digest.",
            &[("stem", json!(stem))],
        ));
        return Ok(KernelResult::fail(vec![issue], events));
    };

    let links = lsi.staged_object_json(&staging_root, links_digest)?;
    let Some(Value::Object(links)) = links else {
        let issue = KernelIssue::fail(
            "base_shape",
            codes::E_BASE_SHAPE_INVALID_LINKS_VALUE,
            "/links",
            "Links object must be a JSON object.",
        )
        .with_detail("stem", json!(stem));
        events.push(event_line(
            Level::Fail,
            "base_shape",
            codes::E_BASE_SHAPE_INVALID_LINKS_VALUE,
            "/links",
            "Links object must be a JSON object.",
            &[("stem", json!(stem))],
        ));
        return Ok(KernelResult::fail(vec![issue], events));
    };

    // Deterministic evaluation order: (pointer, type, id).
    let mut refs = refs_from_links(&links);
    refs.sort_by(|a, b| {
        (&a.pointer, &a.ref_type, &a.ref_id).cmp(&(&b.pointer, &b.ref_type, &b.ref_id))
    });

    let mut issues: Vec<KernelIssue> = Vec::new();
    for link in &refs {
        let id_pointer = format!("{}/id", link.pointer);
        match lookup_visibility(lsi, &staging, &stem, &link.ref_type, &link.ref_id)? {
            Some(layer) => {
                events.push(event_line(
                    Level::Info,
                    "relationship_vocabulary",
                    codes::I_REF_VISIBLE,
                    &id_pointer,
                    "Reference target resolved.",
                    &[
                        ("layer", json!(layer.as_str())),
                        ("type", json!(link.ref_type)),
                        ("id", json!(link.ref_id)),
                    ],
                ));
            }
            None => {
                issues.push(
                    KernelIssue::fail(
                        "relationship_vocabulary",
                        codes::E_RELATIONSHIP_ORPHAN,
                        id_pointer,
                        "Reference target not found in Self/Staging/Committed visibility.",
                    )
                    .with_detail("type", json!(link.ref_type))
                    .with_detail("id", json!(link.ref_id))
                    .with_detail("relationship", json!(link.relationship)),
                );
            }
        }
    }

    sort_issues(&mut issues);
    if issues.is_empty() {
        return Ok(KernelResult::pass(events));
    }
    for issue in &issues {
        let mut details: Vec<(&'static str, Value)> = Vec::new();
        for key in ["type", "id", "relationship"] {
            if let Some(value) = issue.details.get(key) {
                details.push((key, value.clone()));
            }
        }
        events.push(event_line(
            Level::Fail,
            &issue.stage,
            &issue.code,
            &issue.location,
            &issue.message,
            &details,
        ));
    }
    Ok(KernelResult::fail(issues, events))
}

fn lookup_visibility(
    lsi: &LocalSovereignIndex,
    staging: &Scope,
    stem: &str,
    ref_type: &str,
    ref_id: &str,
) -> Result<Option<Visibility>, LsiError> {
    let staging_sources = lsi.read_refs_sources(staging, ref_type, ref_id)?;
    if staging_sources
        .iter()
        .any(|s| s.get("stem").and_then(Value::as_str) == Some(stem))
    {
        return Ok(Some(Visibility::Self_));
    }
    if !staging_sources.is_empty() {
        return Ok(Some(Visibility::Staging));
    }
    let committed_sources = lsi.read_refs_sources(&Scope::Committed, ref_type, ref_id)?;
    if !committed_sources.is_empty() {
        return Ok(Some(Visibility::Committed));
    }
    Ok(None)
}

fn normalize(stem: &str) -> String {
    layout::normalize_stem(stem)
}
