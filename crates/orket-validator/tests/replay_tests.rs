// SPDX-License-Identifier: MIT OR Apache-2.0
//! Replay descriptor validation and structural run parity.

use orket_validator::{compare_runs, replay_run, CONTRACT_VERSION};
use serde_json::{json, Value};

fn descriptor() -> Value {
    json!({
        "run_id": "run-1",
        "workflow_id": "wf-build",
        "contract_version": CONTRACT_VERSION,
        "schema_version": "turn_result/v1",
        "policy_profile_ref": "policy://default",
        "model_profile_ref": "model://default",
        "runtime_profile_ref": "runtime://default",
        "trace_ref": "trace://run-1",
        "state_ref": "state://run-1",
    })
}

fn run_payload(run_id: &str, digest: &str) -> Value {
    json!({
        "run_id": run_id,
        "contract_version": CONTRACT_VERSION,
        "schema_version": "turn_result/v1",
        "turn_digests": [
            {"turn_id": "turn-0001", "turn_result_digest": digest},
            {"turn_id": "turn-0002", "turn_result_digest": "b".repeat(64)},
        ],
        "stage_outcomes": [
            {"turn_id": "turn-0001", "stage": "lsi", "outcome": "PASS"},
            {"turn_id": "turn-0002", "stage": "promotion", "outcome": "PASS"},
        ],
        "issues": [],
        "events": [
            "[INFO] [STAGE:promotion] [CODE:I_PROMOTION_PASS] [LOC:/index/committed] Promotion completed. |",
        ],
    })
}

// ---------------------------------------------------------------------------
// replay_run
// ---------------------------------------------------------------------------

#[test]
fn complete_descriptor_passes() {
    let report = replay_run(&json!({
        "contract_version": CONTRACT_VERSION,
        "run_descriptor": descriptor(),
    }))
    .unwrap();
    assert_eq!(report["outcome"], json!("PASS"));
    assert_eq!(report["mode"], json!("replay_run"));
    assert_eq!(report["runs_compared"], json!(1));
}

#[test]
fn missing_descriptor_fields_fail_with_the_first_location() {
    let mut incomplete = descriptor();
    incomplete.as_object_mut().unwrap().remove("workflow_id");
    incomplete.as_object_mut().unwrap().remove("trace_ref");

    let report = replay_run(&json!({
        "contract_version": CONTRACT_VERSION,
        "run_descriptor": incomplete,
    }))
    .unwrap();
    assert_eq!(report["outcome"], json!("FAIL"));
    let issue = &report["issues"][0];
    assert_eq!(issue["code"], json!("E_REPLAY_INPUT_MISSING"));
    assert_eq!(issue["location"], json!("/run_descriptor/workflow_id"));
    assert_eq!(
        issue["details"]["missing_fields"],
        json!(["workflow_id", "trace_ref"])
    );
}

#[test]
fn descriptor_version_mismatch_is_reported() {
    let mut wrong = descriptor();
    wrong["contract_version"] = json!("kernel_api/v0");
    let report = replay_run(&json!({
        "contract_version": CONTRACT_VERSION,
        "run_descriptor": wrong,
    }))
    .unwrap();
    assert_eq!(report["outcome"], json!("FAIL"));
    assert_eq!(
        report["issues"][0]["code"],
        json!("E_REPLAY_VERSION_MISMATCH")
    );
}

// ---------------------------------------------------------------------------
// compare_runs
// ---------------------------------------------------------------------------

#[test]
fn identical_surfaces_pass_with_six_matches() {
    let digest = "a".repeat(64);
    let report = compare_runs(&json!({
        "contract_version": CONTRACT_VERSION,
        "run_a": run_payload("run-a", &digest),
        "run_b": run_payload("run-b", &digest),
    }))
    .unwrap();
    assert_eq!(report["outcome"], json!("PASS"));
    assert_eq!(report["parity"]["matches"], json!(6));
    assert_eq!(report["parity"]["mismatches"], json!(0));
    assert_eq!(report["turns_compared"], json!(2));
}

#[test]
fn single_digest_change_fails_on_turn_digests_only() {
    let report = compare_runs(&json!({
        "contract_version": CONTRACT_VERSION,
        "run_a": run_payload("run-a", &"a".repeat(64)),
        "run_b": run_payload("run-b", &"c".repeat(64)),
    }))
    .unwrap();
    assert_eq!(report["outcome"], json!("FAIL"));
    let issue = &report["issues"][0];
    assert_eq!(issue["code"], json!("E_REPLAY_EQUIVALENCE_FAILED"));
    assert_eq!(issue["details"]["mismatch_fields"], json!(["turn_digests"]));
    assert_eq!(report["parity"]["matches"], json!(5));
}

#[test]
fn event_code_surface_ignores_messages_but_not_codes() {
    let mut run_b = run_payload("run-b", &"a".repeat(64));
    run_b["events"] = json!([
        "[INFO] [STAGE:promotion] [CODE:I_PROMOTION_PASS] [LOC:/elsewhere] different words |",
    ]);
    let same_codes = compare_runs(&json!({
        "contract_version": CONTRACT_VERSION,
        "run_a": run_payload("run-a", &"a".repeat(64)),
        "run_b": run_b,
    }))
    .unwrap();
    assert_eq!(same_codes["outcome"], json!("PASS"));

    let mut run_c = run_payload("run-c", &"a".repeat(64));
    run_c["events"] = json!([
        "[INFO] [STAGE:promotion] [CODE:I_NOOP_PROMOTION] [LOC:/index/staging] different code |",
    ]);
    let different_codes = compare_runs(&json!({
        "contract_version": CONTRACT_VERSION,
        "run_a": run_payload("run-a", &"a".repeat(64)),
        "run_b": run_c,
    }))
    .unwrap();
    assert_eq!(different_codes["outcome"], json!("FAIL"));
    assert_eq!(
        different_codes["issues"][0]["details"]["mismatch_fields"],
        json!(["event_codes"])
    );
}

#[test]
fn missing_run_payloads_fail_as_input_missing() {
    let report = compare_runs(&json!({
        "contract_version": CONTRACT_VERSION,
        "run_a": run_payload("run-a", &"a".repeat(64)),
    }))
    .unwrap();
    assert_eq!(report["outcome"], json!("FAIL"));
    assert_eq!(report["issues"][0]["code"], json!("E_REPLAY_INPUT_MISSING"));
}

#[test]
fn malformed_digest_entries_are_dropped_from_the_surface() {
    let mut run_a = run_payload("run-a", &"a".repeat(64));
    run_a["turn_digests"]
        .as_array_mut()
        .unwrap()
        .push(json!({"turn_id": "turn-0003", "turn_result_digest": "short"}));
    let report = compare_runs(&json!({
        "contract_version": CONTRACT_VERSION,
        "run_a": run_a,
        "run_b": run_payload("run-b", &"a".repeat(64)),
    }))
    .unwrap();
    // The malformed entry normalizes away, so the surfaces still match.
    assert_eq!(report["outcome"], json!("PASS"));
}
