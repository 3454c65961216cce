// SPDX-License-Identifier: MIT OR Apache-2.0
//! Replay validation and structural run parity.

use crate::CONTRACT_VERSION;
use orket_events::{codes, event_code, event_line, KernelIssue, Level};
use serde_json::{json, Map, Value};

const REQUIRED_DESCRIPTOR_FIELDS: [&str; 9] = [
    "run_id",
    "workflow_id",
    "contract_version",
    "schema_version",
    "policy_profile_ref",
    "model_profile_ref",
    "runtime_profile_ref",
    "trace_ref",
    "state_ref",
];

/// The six parity surfaces compared by [`compare_runs`], in report order.
const PARITY_SURFACES: [&str; 6] = [
    "contract_version",
    "event_codes",
    "issue_codes",
    "schema_version",
    "stage_outcomes",
    "turn_digests",
];

fn check_contract(request: &Value) -> Result<(), KernelIssue> {
    if request.get("contract_version").and_then(Value::as_str) == Some(CONTRACT_VERSION) {
        return Ok(());
    }
    Err(KernelIssue::fail(
        "base_shape",
        codes::E_BASE_SHAPE_INVALID_MANIFEST_VALUE,
        "/contract_version",
        format!("contract_version must be {CONTRACT_VERSION}."),
    ))
}

fn issue_value(issue: &KernelIssue) -> Value {
    json!({
        "contract_version": CONTRACT_VERSION,
        "level": issue.level.to_string(),
        "stage": issue.stage,
        "code": issue.code,
        "location": issue.location,
        "message": issue.message,
        "details": issue.details,
    })
}

fn default_parity(run_a: &str, run_b: &str) -> Value {
    json!({
        "kind": "structural_parity",
        "matches": 0,
        "mismatches": 0,
        "expected": {"run_id": run_a, "turn_digests": []},
        "actual": {"run_id": run_b, "turn_digests": []},
    })
}

fn replay_report(
    mode: &str,
    outcome: &str,
    issues: Vec<Value>,
    events: Vec<String>,
    parity: Value,
    runs_compared: usize,
    turns_compared: usize,
) -> Value {
    json!({
        "contract_version": CONTRACT_VERSION,
        "mode": mode,
        "outcome": outcome,
        "runs_compared": runs_compared,
        "turns_compared": turns_compared,
        "issues": issues,
        "events": events,
        "parity": parity,
    })
}

// ---------------------------------------------------------------------------
// Surface normalization
// ---------------------------------------------------------------------------

fn normalize_turn_digests(value: Option<&Value>) -> Vec<Value> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    let mut out: Vec<Value> = Vec::new();
    for item in items {
        let Some(item) = item.as_object() else {
            continue;
        };
        let Some(turn_id) = item.get("turn_id").and_then(Value::as_str).filter(|s| !s.is_empty())
        else {
            continue;
        };
        let Some(digest) = item
            .get("turn_result_digest")
            .and_then(Value::as_str)
            .filter(|s| s.len() == 64)
        else {
            continue;
        };
        let mut entry = Map::new();
        entry.insert("turn_id".into(), json!(turn_id));
        entry.insert("turn_result_digest".into(), json!(digest));
        if let Some(evidence) = item
            .get("evidence_digest")
            .and_then(Value::as_str)
            .filter(|s| s.len() == 64)
        {
            entry.insert("evidence_digest".into(), json!(evidence));
        }
        out.push(Value::Object(entry));
    }
    out.sort_by_key(|entry| {
        entry
            .get("turn_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    });
    out
}

fn normalize_stage_outcomes(run_payload: &Value) -> Vec<Value> {
    let Some(Value::Array(items)) = run_payload.get("stage_outcomes") else {
        return Vec::new();
    };
    let mut out: Vec<Value> = Vec::new();
    for item in items {
        let Some(item) = item.as_object() else {
            continue;
        };
        let fields: Option<Vec<&str>> = ["turn_id", "stage", "outcome"]
            .iter()
            .map(|key| item.get(*key).and_then(Value::as_str).filter(|s| !s.is_empty()))
            .collect();
        if let Some(fields) = fields {
            out.push(json!({
                "turn_id": fields[0],
                "stage": fields[1],
                "outcome": fields[2],
            }));
        }
    }
    out.sort_by_key(|entry| {
        entry
            .get("turn_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    });
    out
}

fn normalize_issue_codes(run_payload: &Value) -> Vec<Value> {
    let Some(Value::Array(items)) = run_payload.get("issues") else {
        return Vec::new();
    };
    let mut out: Vec<(String, String, String)> = Vec::new();
    for item in items {
        let Some(item) = item.as_object() else {
            continue;
        };
        let get = |key: &str| {
            item.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        if let (Some(code), Some(stage), Some(location)) =
            (get("code"), get("stage"), get("location"))
        {
            out.push((stage, location, code));
        }
    }
    out.sort();
    out.into_iter()
        .map(|(stage, location, code)| json!({"code": code, "stage": stage, "location": location}))
        .collect()
}

fn normalize_event_codes(run_payload: &Value) -> Vec<String> {
    let Some(Value::Array(events)) = run_payload.get("events") else {
        return Vec::new();
    };
    let mut out: Vec<String> = events
        .iter()
        .filter_map(Value::as_str)
        .filter_map(event_code)
        .map(str::to_string)
        .collect();
    out.sort();
    out
}

fn contract_surface(run_payload: &Value) -> Map<String, Value> {
    let mut surface = Map::new();
    surface.insert(
        "contract_version".into(),
        json!(run_payload
            .get("contract_version")
            .and_then(Value::as_str)
            .unwrap_or_default()),
    );
    surface.insert(
        "schema_version".into(),
        json!(run_payload
            .get("schema_version")
            .and_then(Value::as_str)
            .unwrap_or_default()),
    );
    surface.insert(
        "turn_digests".into(),
        Value::Array(normalize_turn_digests(run_payload.get("turn_digests"))),
    );
    surface.insert(
        "stage_outcomes".into(),
        Value::Array(normalize_stage_outcomes(run_payload)),
    );
    surface.insert(
        "issue_codes".into(),
        Value::Array(normalize_issue_codes(run_payload)),
    );
    surface.insert(
        "event_codes".into(),
        json!(normalize_event_codes(run_payload)),
    );
    surface
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Validate a replay descriptor: shape and contract version.
///
/// # Errors
///
/// A base-shape [`KernelIssue`] when the outer request is malformed.
pub fn replay_run(request: &Value) -> Result<Value, KernelIssue> {
    check_contract(request)?;
    let empty = Map::new();
    let descriptor = request
        .get("run_descriptor")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let missing: Vec<&str> = REQUIRED_DESCRIPTOR_FIELDS
        .iter()
        .filter(|field| {
            descriptor
                .get(**field)
                .and_then(Value::as_str)
                .is_none_or(str::is_empty)
        })
        .copied()
        .collect();
    let run_id = descriptor
        .get("run_id")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let parity = default_parity(run_id, run_id);

    if let Some(first_missing) = missing.first() {
        let location = format!("/run_descriptor/{first_missing}");
        let issue = KernelIssue::fail(
            "replay",
            codes::E_REPLAY_INPUT_MISSING,
            &location,
            "Replay input descriptor is incomplete.",
        )
        .with_detail("missing_fields", json!(missing));
        return Ok(replay_report(
            "replay_run",
            "FAIL",
            vec![issue_value(&issue)],
            vec![event_line(
                Level::Fail,
                "replay",
                codes::E_REPLAY_INPUT_MISSING,
                &location,
                "Replay input missing.",
                &[],
            )],
            parity,
            1,
            0,
        ));
    }

    if descriptor.get("contract_version").and_then(Value::as_str) != Some(CONTRACT_VERSION) {
        let issue = KernelIssue::fail(
            "replay",
            codes::E_REPLAY_VERSION_MISMATCH,
            "/run_descriptor/contract_version",
            "Replay descriptor contract_version mismatch.",
        )
        .with_detail("expected", json!(CONTRACT_VERSION))
        .with_detail("actual", descriptor.get("contract_version").cloned().unwrap_or(Value::Null));
        return Ok(replay_report(
            "replay_run",
            "FAIL",
            vec![issue_value(&issue)],
            vec![event_line(
                Level::Fail,
                "replay",
                codes::E_REPLAY_VERSION_MISMATCH,
                "/run_descriptor/contract_version",
                "Replay version mismatch.",
                &[],
            )],
            parity,
            1,
            0,
        ));
    }

    Ok(replay_report(
        "replay_run",
        "PASS",
        vec![],
        vec![event_line(
            Level::Info,
            "replay",
            codes::I_GATEKEEPER_PASS,
            "/run_descriptor",
            "Replay input accepted.",
            &[],
        )],
        parity,
        1,
        0,
    ))
}

/// Compare two run payloads over the six structural parity surfaces.
///
/// # Errors
///
/// A base-shape [`KernelIssue`] when the outer request is malformed.
pub fn compare_runs(request: &Value) -> Result<Value, KernelIssue> {
    check_contract(request)?;
    let run_a = request.get("run_a").and_then(Value::as_object);
    let run_b = request.get("run_b").and_then(Value::as_object);
    let (Some(run_a), Some(run_b)) = (run_a, run_b) else {
        let issue = KernelIssue::fail(
            "replay",
            codes::E_REPLAY_INPUT_MISSING,
            "/run_a",
            "compare_runs requires run_a and run_b objects.",
        );
        return Ok(replay_report(
            "compare_runs",
            "FAIL",
            vec![issue_value(&issue)],
            vec![event_line(
                Level::Fail,
                "replay",
                codes::E_REPLAY_INPUT_MISSING,
                "/run_a",
                "compare_runs input missing.",
                &[],
            )],
            default_parity("unknown", "unknown"),
            2,
            0,
        ));
    };

    let run_a = Value::Object(run_a.clone());
    let run_b = Value::Object(run_b.clone());
    let run_a_id = run_a.get("run_id").and_then(Value::as_str).unwrap_or("run-a");
    let run_b_id = run_b.get("run_id").and_then(Value::as_str).unwrap_or("run-b");
    let mut parity = default_parity(run_a_id, run_b_id);

    let surface_a = contract_surface(&run_a);
    let surface_b = contract_surface(&run_b);
    parity["expected"]["turn_digests"] = surface_a["turn_digests"].clone();
    parity["actual"]["turn_digests"] = surface_b["turn_digests"].clone();

    let mismatch_fields: Vec<&str> = PARITY_SURFACES
        .iter()
        .filter(|field| surface_a[**field] != surface_b[**field])
        .copied()
        .collect();
    let matches = PARITY_SURFACES.len() - mismatch_fields.len();
    parity["matches"] = json!(matches);
    parity["mismatches"] = json!(mismatch_fields.len());

    let turns_a = surface_a["stage_outcomes"].as_array().map_or(0, Vec::len);
    let turns_b = surface_b["stage_outcomes"].as_array().map_or(0, Vec::len);
    let digests_a = surface_a["turn_digests"].as_array().map_or(0, Vec::len);
    let digests_b = surface_b["turn_digests"].as_array().map_or(0, Vec::len);

    if !mismatch_fields.is_empty() {
        let issue = KernelIssue::fail(
            "replay",
            codes::E_REPLAY_EQUIVALENCE_FAILED,
            "/run_a/turn_digests",
            "Run parity mismatch.",
        )
        .with_detail("matches", json!(matches))
        .with_detail("mismatches", json!(mismatch_fields.len()))
        .with_detail("mismatch_fields", json!(mismatch_fields));
        return Ok(replay_report(
            "compare_runs",
            "FAIL",
            vec![issue_value(&issue)],
            vec![event_line(
                Level::Fail,
                "replay",
                codes::E_REPLAY_EQUIVALENCE_FAILED,
                "/run_a/turn_digests",
                "Replay equivalence failed.",
                &[],
            )],
            parity,
            2,
            turns_a.max(turns_b).max(digests_a).max(digests_b),
        ));
    }

    Ok(replay_report(
        "compare_runs",
        "PASS",
        vec![],
        vec![event_line(
            Level::Info,
            "replay",
            codes::I_GATEKEEPER_PASS,
            "/run_a/turn_digests",
            "Replay equivalence passed.",
            &[],
        )],
        parity,
        2,
        digests_a,
    ))
}
