// SPDX-License-Identifier: MIT OR Apache-2.0
//! Run lifecycle: `start_run`, `execute_turn`, `finish_run`.

use crate::capability::{
    capability_decision, capability_decision_record, capability_evidence, evaluate_gate,
};
use crate::{CONTRACT_VERSION, DEFAULT_VISIBILITY_MODE, DEFAULT_WORKSPACE_ROOT};
use orket_canon::turn_result_digest;
use orket_events::{codes, event_line, KernelIssue, Level};
use orket_lsi::{promote_turn, LocalSovereignIndex};
use serde_json::{json, Map, Value};
use std::path::Path;
use uuid::Uuid;

/// Allocate a run handle.
///
/// # Errors
///
/// A base-shape [`KernelIssue`] when the contract version or
/// `workflow_id` is missing.
pub fn start_run(request: &Value) -> Result<Value, KernelIssue> {
    check_contract(request)?;
    let workflow_id = request.get("workflow_id").and_then(Value::as_str);
    if workflow_id.is_none_or(str::is_empty) {
        return Err(KernelIssue::fail(
            "base_shape",
            codes::E_BASE_SHAPE_INVALID_MANIFEST_VALUE,
            "/workflow_id",
            "workflow_id is required.",
        ));
    }

    let run_id = format!("run-{}", &Uuid::new_v4().simple().to_string()[..8]);
    let visibility_mode = request
        .get("visibility_mode")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_VISIBILITY_MODE);
    let workspace_root = request
        .get("workspace_root")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_WORKSPACE_ROOT);

    Ok(json!({
        "contract_version": CONTRACT_VERSION,
        "run_handle": {
            "contract_version": CONTRACT_VERSION,
            "run_id": run_id,
            "visibility_mode": visibility_mode,
            "workspace_root": workspace_root,
        },
    }))
}

/// Close a run with an explicit outcome.
///
/// # Errors
///
/// A base-shape [`KernelIssue`] when the request is malformed.
pub fn finish_run(request: &Value) -> Result<Value, KernelIssue> {
    check_contract(request)?;
    let run_handle = request
        .get("run_handle")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            KernelIssue::fail(
                "base_shape",
                codes::E_BASE_SHAPE_INVALID_MANIFEST_VALUE,
                "/run_handle",
                "run_handle must be an object.",
            )
        })?;
    let run_id = run_handle
        .get("run_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            KernelIssue::fail(
                "base_shape",
                codes::E_BASE_SHAPE_MISSING_RUN_ID,
                "/run_handle/run_id",
                "run_handle.run_id is required.",
            )
        })?;
    let outcome = request.get("outcome").and_then(Value::as_str);
    if !matches!(outcome, Some("PASS") | Some("FAIL")) {
        return Err(KernelIssue::fail(
            "base_shape",
            codes::E_BASE_SHAPE_INVALID_MANIFEST_VALUE,
            "/outcome",
            "outcome must be PASS or FAIL.",
        ));
    }

    Ok(json!({
        "contract_version": CONTRACT_VERSION,
        "run_id": run_id,
        "outcome": outcome,
        "turns_executed": 0,
        "events": [],
    }))
}

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

fn default_capabilities() -> Value {
    json!({
        "mode": "disabled",
        "decisions": [],
        "decisions_v1_2_1": [],
        "denied_count": 0,
        "granted_count": 0,
    })
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

struct TurnOutput {
    run_id: String,
    turn_id: String,
    outcome: &'static str,
    stage: &'static str,
    issues: Vec<Value>,
    events: Vec<String>,
    capabilities: Value,
}

impl TurnOutput {
    fn failed(run_id: &str, turn_id: &str, stage: &'static str, issue: KernelIssue) -> Self {
        let event = event_line(
            Level::Fail,
            &issue.stage,
            &issue.code,
            &issue.location,
            &issue.message,
            &[],
        );
        Self {
            run_id: run_id.to_string(),
            turn_id: turn_id.to_string(),
            outcome: "FAIL",
            stage,
            issues: vec![issue_value(&issue)],
            events: vec![event],
            capabilities: default_capabilities(),
        }
    }

    fn into_result(self) -> Value {
        let errors = self
            .issues
            .iter()
            .filter(|issue| issue.get("level").and_then(Value::as_str) == Some("FAIL"))
            .count();
        let mut result = json!({
            "contract_version": CONTRACT_VERSION,
            "run_id": self.run_id,
            "turn_id": self.turn_id,
            "outcome": self.outcome,
            "stage": self.stage,
            "errors": errors,
            "warnings": 0,
            "issues": self.issues,
            "events": self.events,
            "transition": {
                "prior_state_digest": null,
                "proposed_state_digest": "0".repeat(64),
                "inputs_digest": "0".repeat(64),
                "diff_summary": {
                    "kind": "host_supplied",
                    "changed_count": 0,
                    "triplet_stems": [],
                    "solo_json_paths": [],
                },
                "artifacts": [],
            },
            "capabilities": self.capabilities,
            "trace": null,
        });
        let digest = turn_result_digest(&result).unwrap_or_else(|_| "0".repeat(64));
        result["turn_result_digest"] = json!(digest);
        result
    }
}

/// Execute one turn: optional capability-gated tool call, optional triplet
/// staging, optional promotion.
///
/// Never fails — every rejection is reported inside the returned turn
/// result, and the result always carries a `turn_result_digest` over its
/// semantic surface.
#[must_use]
pub fn execute_turn(request: &Value) -> Value {
    if check_contract(request).is_err() {
        let turn_id = request
            .get("turn_id")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        return TurnOutput::failed(
            "unknown",
            turn_id,
            "base_shape",
            KernelIssue::fail(
                "base_shape",
                codes::E_BASE_SHAPE_INVALID_MANIFEST_VALUE,
                "/contract_version",
                format!("contract_version must be {CONTRACT_VERSION}."),
            ),
        )
        .into_result();
    }

    let turn_id = request.get("turn_id").and_then(Value::as_str);
    let Some(run_handle) = request.get("run_handle").and_then(Value::as_object) else {
        return TurnOutput::failed(
            "unknown",
            turn_id.unwrap_or("unknown"),
            "base_shape",
            KernelIssue::fail(
                "base_shape",
                codes::E_BASE_SHAPE_INVALID_MANIFEST_VALUE,
                "/run_handle",
                "run_handle must be an object.",
            ),
        )
        .into_result();
    };
    let Some(run_id) = run_handle
        .get("run_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    else {
        return TurnOutput::failed(
            "unknown",
            turn_id.unwrap_or("unknown"),
            "base_shape",
            KernelIssue::fail(
                "base_shape",
                codes::E_BASE_SHAPE_MISSING_RUN_ID,
                "/run_handle/run_id",
                "run_id is required.",
            ),
        )
        .into_result();
    };
    let Some(turn_id) = turn_id.filter(|s| !s.is_empty()) else {
        return TurnOutput::failed(
            run_id,
            "unknown",
            "base_shape",
            KernelIssue::fail(
                "base_shape",
                codes::E_BASE_SHAPE_INVALID_MANIFEST_VALUE,
                "/turn_id",
                "turn_id is required.",
            ),
        )
        .into_result();
    };

    let workspace_root = run_handle
        .get("workspace_root")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_WORKSPACE_ROOT);
    let root = Path::new(workspace_root);
    let lsi = LocalSovereignIndex::new(root);

    let turn_input = request.get("turn_input").and_then(Value::as_object);
    let commit_intent = request
        .get("commit_intent")
        .and_then(Value::as_str)
        .unwrap_or("stage_only");

    let mut output = TurnOutput {
        run_id: run_id.to_string(),
        turn_id: turn_id.to_string(),
        outcome: "PASS",
        stage: "base_shape",
        issues: Vec::new(),
        events: Vec::new(),
        capabilities: default_capabilities(),
    };

    if let Some(input) = turn_input {
        if input.contains_key("tool_call") {
            run_tool_call_gate(&mut output, input);
        }
        if output.outcome == "PASS" && input.contains_key("stage_triplet") {
            run_staging(&mut output, &lsi, input);
        }
    }

    if output.outcome == "PASS" && commit_intent == "stage_and_request_promotion" {
        let promotion = promote_turn(root, &output.run_id, &output.turn_id);
        output.events.extend(promotion.events);
        output
            .issues
            .extend(promotion.issues.iter().map(issue_value));
        output.outcome = match promotion.outcome {
            orket_events::Outcome::Pass => "PASS",
            orket_events::Outcome::Fail => "FAIL",
        };
        output.stage = "promotion";
    }

    output.into_result()
}

fn run_tool_call_gate(output: &mut TurnOutput, input: &Map<String, Value>) {
    let empty = Map::new();
    let context = input
        .get("context")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let tool_call = input
        .get("tool_call")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let action = tool_call
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or("tool.call")
        .to_string();
    let resource = tool_call
        .get("resource")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    let enforcement = context
        .get("capability_enforcement")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    if !enforcement {
        output.stage = "capability";
        let record = capability_decision_record(
            &output.run_id,
            &output.turn_id,
            &resource,
            &action,
            0,
            "skipped",
            None,
            Some(codes::I_CAPABILITY_SKIPPED),
            "Capability module disabled for this request.",
            None,
        );
        output.capabilities["decisions_v1_2_1"] = json!([record]);
        output.events.push(event_line(
            Level::Info,
            "capability",
            codes::I_CAPABILITY_SKIPPED,
            "/turn_input/context",
            "Capability module disabled.",
            &[],
        ));
        return;
    }

    output.capabilities["mode"] = json!("enabled");
    output.stage = "capability";
    let subject = context
        .get("subject")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let evidence = capability_evidence(context);
    let verdict = evaluate_gate(context, tool_call);
    let decision = capability_decision(
        subject,
        &action,
        &resource,
        verdict.result,
        verdict.reason_code,
        &evidence,
    );
    output.capabilities["decisions"] = json!([decision.clone()]);

    let denied = verdict.result == "DENY";
    let record_outcome = if denied {
        if verdict.reason_code == codes::E_CAPABILITY_NOT_RESOLVED {
            "unresolved"
        } else {
            "denied"
        }
    } else {
        "allowed"
    };
    let record = capability_decision_record(
        &output.run_id,
        &output.turn_id,
        &resource,
        &action,
        0,
        record_outcome,
        denied.then_some(verdict.reason_code),
        None,
        &format!("Capability decision outcome: {record_outcome}."),
        (!denied).then_some(&evidence),
    );
    let record_location = "/capabilities/decisions_v1_2_1/0".to_string();
    output.capabilities["decisions_v1_2_1"] = json!([record.clone()]);

    if denied {
        output.capabilities["denied_count"] = json!(1);
        output.outcome = "FAIL";
        let issue = KernelIssue::fail(
            "capability",
            verdict.reason_code,
            record_location.clone(),
            "Capability policy denied tool execution.",
        )
        .with_detail("decision", decision)
        .with_detail("decision_record", record);
        output.issues.push(issue_value(&issue));
        output.events.push(event_line(
            Level::Fail,
            "capability",
            verdict.reason_code,
            &record_location,
            "Tool execution denied by capability policy.",
            &[],
        ));
    } else {
        output.capabilities["granted_count"] = json!(1);
        output.events.push(event_line(
            Level::Info,
            "capability",
            verdict.reason_code,
            "/turn_input/tool_call",
            "Tool execution authorized by capability policy.",
            &[],
        ));
    }
}

fn run_staging(output: &mut TurnOutput, lsi: &LocalSovereignIndex, input: &Map<String, Value>) {
    let Some(triplet) = input.get("stage_triplet").and_then(Value::as_object) else {
        fail_staging_shape(output, "stage_triplet must be an object.");
        return;
    };
    let stem = triplet.get("stem").and_then(Value::as_str);
    let body = triplet.get("body").and_then(Value::as_object);
    let links = triplet.get("links").and_then(Value::as_object);
    let default_manifest = Map::new();
    let manifest = match triplet.get("manifest") {
        None => Some(&default_manifest),
        Some(value) => value.as_object(),
    };
    let (Some(stem), Some(body), Some(links), Some(manifest)) = (stem, body, links, manifest)
    else {
        fail_staging_shape(output, "stage_triplet requires stem/body/links/manifest shapes.");
        return;
    };

    match lsi.stage_triplet(&output.run_id, &output.turn_id, stem, body, links, manifest) {
        Ok(_) => {
            output.stage = "lsi";
            output.events.push(event_line(
                Level::Info,
                "lsi",
                codes::I_GATEKEEPER_PASS,
                "/turn_input/stage_triplet",
                "Triplet staged.",
                &[],
            ));
        }
        Err(err) => {
            // Canonical-profile or I/O failures surface as shape issues;
            // the turn-local staging directory stays as-is for purge.
            let issue = KernelIssue::fail(
                "base_shape",
                codes::E_BASE_SHAPE_INVALID_MANIFEST_VALUE,
                "/turn_input/stage_triplet",
                format!("stage_triplet failed: {err}"),
            );
            output.issues.push(issue_value(&issue));
            output.events.push(event_line(
                Level::Fail,
                "base_shape",
                codes::E_BASE_SHAPE_INVALID_MANIFEST_VALUE,
                "/turn_input/stage_triplet",
                "stage_triplet failed.",
                &[],
            ));
            output.outcome = "FAIL";
            output.stage = "base_shape";
        }
    }
}

fn fail_staging_shape(output: &mut TurnOutput, message: &str) {
    let issue = KernelIssue::fail(
        "base_shape",
        codes::E_BASE_SHAPE_INVALID_MANIFEST_VALUE,
        "/turn_input/stage_triplet",
        message,
    );
    output.issues.push(issue_value(&issue));
    output.events.push(event_line(
        Level::Fail,
        "base_shape",
        codes::E_BASE_SHAPE_INVALID_MANIFEST_VALUE,
        "/turn_input/stage_triplet",
        "stage_triplet invalid.",
        &[],
    ));
    output.outcome = "FAIL";
    output.stage = "base_shape";
}
