// SPDX-License-Identifier: MIT OR Apache-2.0
//! The capability gate: a static policy table plus per-request context
//! overrides.

use crate::CONTRACT_VERSION;
use orket_canon::structural_digest;
use orket_events::{codes, event_line, KernelIssue, Level};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::LazyLock;

/// Where the built-in policy table claims to come from.
pub const DEFAULT_CAPABILITY_POLICY_SOURCE: &str = "policy://orket/kernel/v1/default";
/// Version tag of the built-in policy table.
pub const DEFAULT_CAPABILITY_POLICY_VERSION: &str = "v1";
const DEFAULT_CAPABILITY_POLICY_PATH: &str = "model/core/contracts/kernel_capability_policy_v1.json";

/// The static capability policy table.
///
/// Maps `role → task → permissions`; `default_permissions` applies when a
/// role/task pair is absent. A missing or malformed policy file yields an
/// empty table (deny by default).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityPolicy {
    /// Provenance tag reported in decision evidence.
    pub policy_source: Option<String>,
    /// Version tag reported in decision evidence.
    pub policy_version: Option<String>,
    /// Per-role, per-task permission grants.
    pub role_task_permissions: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    /// Fallback grants.
    pub default_permissions: Vec<String>,
}

impl CapabilityPolicy {
    /// Load a policy file; empty policy when absent or malformed.
    pub fn load(path: &Path) -> Self {
        let Ok(bytes) = std::fs::read(path) else {
            return Self::default();
        };
        serde_json::from_slice(&bytes).unwrap_or_default()
    }

    /// Permissions for `(role, task)`: explicit grants, else the default
    /// set. Sorted and deduplicated.
    #[must_use]
    pub fn permissions(&self, role: &str, task: &str) -> Vec<String> {
        let explicit = self
            .role_task_permissions
            .get(role)
            .and_then(|tasks| tasks.get(task));
        let granted = explicit.unwrap_or(&self.default_permissions);
        let set: BTreeSet<String> = granted.iter().filter(|p| !p.is_empty()).cloned().collect();
        set.into_iter().collect()
    }
}

static CACHED_POLICY: LazyLock<CapabilityPolicy> =
    LazyLock::new(|| CapabilityPolicy::load(Path::new(DEFAULT_CAPABILITY_POLICY_PATH)));

fn cached_policy() -> &'static CapabilityPolicy {
    &CACHED_POLICY
}

fn context_str(context: &Map<String, Value>, key: &str, default: &str) -> String {
    context
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn context_flag(context: &Map<String, Value>, key: &str, default: bool) -> bool {
    context.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Decision evidence: which policy answered and under which version.
pub(crate) fn capability_evidence(context: &Map<String, Value>) -> Map<String, Value> {
    let policy = cached_policy();
    let source = context
        .get("policy_source")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| policy.policy_source.clone())
        .or_else(|| {
            context
                .get("policy_ref")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_CAPABILITY_POLICY_SOURCE.to_string());
    let version = context
        .get("policy_version")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| policy.policy_version.clone())
        .unwrap_or_else(|| DEFAULT_CAPABILITY_POLICY_VERSION.to_string());

    let mut evidence = Map::new();
    evidence.insert(
        "policy_ref".into(),
        json!(context_str(context, "policy_ref", &source)),
    );
    evidence.insert("capability_source".into(), json!(source));
    evidence.insert("capability_version".into(), json!(version));
    evidence
}

/// Effective permissions: a `permissions` list in the context overrides the
/// static table.
pub(crate) fn policy_permissions(
    role: &str,
    task: &str,
    context: &Map<String, Value>,
) -> Vec<String> {
    if let Some(Value::Array(items)) = context.get("permissions") {
        let set: BTreeSet<String> = items
            .iter()
            .filter_map(Value::as_str)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        return set.into_iter().collect();
    }
    cached_policy().permissions(role, task)
}

/// One capability decision.
pub(crate) fn capability_decision(
    subject: &str,
    action: &str,
    resource: &str,
    result: &str,
    reason_code: &str,
    evidence: &Map<String, Value>,
) -> Value {
    json!({
        "contract_version": CONTRACT_VERSION,
        "subject": subject,
        "action": action,
        "resource": resource,
        "result": result,
        "reason_code": reason_code,
        "evidence": evidence,
    })
}

/// The v1.2.1 decision record, addressed by a content hash of itself.
#[allow(clippy::too_many_arguments)]
pub(crate) fn capability_decision_record(
    run_id: &str,
    turn_id: &str,
    tool_name: &str,
    action: &str,
    ordinal: u64,
    outcome: &str,
    deny_code: Option<&str>,
    info_code: Option<&str>,
    reason: &str,
    provenance: Option<&Map<String, Value>>,
) -> Value {
    let mut payload = json!({
        "contract_version": CONTRACT_VERSION,
        "run_id": run_id,
        "turn_id": turn_id,
        "tool_name": tool_name,
        "action": action,
        "ordinal": ordinal,
        "outcome": outcome,
        "stage": "capability",
        "deny_code": deny_code,
        "info_code": info_code,
        "reason": reason,
        "provenance": provenance,
    });
    // Compact sorted JSON of the payload minus the id itself.
    let encoded = serde_json::to_string(&payload).unwrap_or_default();
    let decision_id = structural_digest(encoded.as_bytes());
    payload["decision_id"] = json!(decision_id);
    payload
}

/// The DENY/GRANT outcome of one gate evaluation.
pub(crate) struct GateVerdict {
    pub result: &'static str,
    pub reason_code: &'static str,
}

/// Evaluate the gate rules for a tool request under a context.
pub(crate) fn evaluate_gate(
    context: &Map<String, Value>,
    tool_request: &Map<String, Value>,
) -> GateVerdict {
    let side_effects_declared = tool_request
        .get("side_effects_declared")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let requested = tool_request.get("requested_permissions").and_then(Value::as_array);
    let declared = tool_request.get("declared_permissions").and_then(Value::as_array);
    let action = context_str(tool_request, "action", "tool.call");
    let allowed = policy_permissions(
        &context_str(context, "role", ""),
        &context_str(context, "task", ""),
        context,
    );

    if !context_flag(context, "capability_resolved", true) {
        return GateVerdict {
            result: "DENY",
            reason_code: codes::E_CAPABILITY_NOT_RESOLVED,
        };
    }
    if !side_effects_declared {
        return GateVerdict {
            result: "DENY",
            reason_code: codes::E_SIDE_EFFECT_UNDECLARED,
        };
    }
    if let (Some(requested), Some(declared)) = (requested, declared) {
        let declared: BTreeSet<&str> = declared.iter().filter_map(Value::as_str).collect();
        let escalates = requested
            .iter()
            .filter_map(Value::as_str)
            .any(|permission| !declared.contains(permission));
        if escalates {
            return GateVerdict {
                result: "DENY",
                reason_code: codes::E_PERMISSION_DENIED,
            };
        }
    }
    if context_flag(context, "allow_tool_call", false) || allowed.iter().any(|p| p == &action) {
        return GateVerdict {
            result: "GRANT",
            reason_code: codes::I_GATEKEEPER_PASS,
        };
    }
    GateVerdict {
        result: "DENY",
        reason_code: codes::E_CAPABILITY_DENIED,
    }
}

fn require_contract(request: &Value) -> Result<(), KernelIssue> {
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

fn require_object<'a>(
    request: &'a Value,
    key: &str,
) -> Result<&'a Map<String, Value>, KernelIssue> {
    request
        .get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| {
            KernelIssue::fail(
                "base_shape",
                codes::E_BASE_SHAPE_INVALID_MANIFEST_VALUE,
                format!("/{key}"),
                format!("{key} must be an object."),
            )
        })
}

fn require_str(request: &Value, key: &str) -> Result<String, KernelIssue> {
    match request.get(key).and_then(Value::as_str) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(KernelIssue::fail(
            "base_shape",
            codes::E_BASE_SHAPE_INVALID_MANIFEST_VALUE,
            format!("/{key}"),
            format!("{key} is required."),
        )),
    }
}

/// Resolve the capability plan for `(role, task)`.
///
/// # Errors
///
/// A base-shape [`KernelIssue`] when the request is malformed.
pub fn resolve_capability(request: &Value) -> Result<Value, KernelIssue> {
    require_contract(request)?;
    let role = require_str(request, "role")?;
    let task = require_str(request, "task")?;
    let empty = Map::new();
    let context = request
        .get("context")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let evidence = capability_evidence(context);
    if !context_flag(context, "capability_enforcement", true) {
        return Ok(json!({
            "contract_version": CONTRACT_VERSION,
            "capability_plan": {
                "mode": "disabled",
                "role": role,
                "task": task,
                "permissions": [],
                "policy_source": evidence["capability_source"],
                "policy_version": evidence["capability_version"],
            },
            "events": [event_line(
                Level::Info,
                "capability",
                codes::I_CAPABILITY_SKIPPED,
                "/context",
                "Capability module disabled.",
                &[],
            )],
        }));
    }

    let permissions = policy_permissions(&role, &task, context);
    Ok(json!({
        "contract_version": CONTRACT_VERSION,
        "capability_plan": {
            "mode": "enabled",
            "role": role,
            "task": task,
            "permissions": permissions,
            "policy_source": evidence["capability_source"],
            "policy_version": evidence["capability_version"],
        },
        "events": [event_line(
            Level::Info,
            "capability",
            codes::I_GATEKEEPER_PASS,
            "/context",
            "Capability resolved.",
            &[],
        )],
    }))
}

/// Authorize one tool call against the policy table and context overrides.
///
/// # Errors
///
/// A base-shape [`KernelIssue`] when the request is malformed.
pub fn authorize_tool_call(request: &Value) -> Result<Value, KernelIssue> {
    require_contract(request)?;
    let context = require_object(request, "context")?;
    let tool_request = require_object(request, "tool_request")?;

    let subject = context_str(context, "subject", "unknown");
    let action = context_str(tool_request, "action", "tool.call");
    let resource = context_str(tool_request, "resource", "unknown");
    let evidence = capability_evidence(context);

    if !context_flag(context, "capability_enforcement", true) {
        let decision = capability_decision(
            &subject,
            &action,
            &resource,
            "GRANT",
            codes::I_CAPABILITY_SKIPPED,
            &evidence,
        );
        return Ok(json!({"contract_version": CONTRACT_VERSION, "decision": decision}));
    }

    let verdict = evaluate_gate(context, tool_request);
    let decision = capability_decision(
        &subject,
        &action,
        &resource,
        verdict.result,
        verdict.reason_code,
        &evidence,
    );
    Ok(json!({"contract_version": CONTRACT_VERSION, "decision": decision}))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(context: Value, tool_request: Value) -> Value {
        json!({
            "contract_version": CONTRACT_VERSION,
            "context": context,
            "tool_request": tool_request,
        })
    }

    #[test]
    fn context_permissions_override_grants() {
        let response = authorize_tool_call(&request(
            json!({"subject": "agent:one", "permissions": ["tool.call"]}),
            json!({"action": "tool.call", "resource": "tool://shell"}),
        ))
        .unwrap();
        assert_eq!(response["decision"]["result"], json!("GRANT"));
        assert_eq!(response["decision"]["reason_code"], json!("I_GATEKEEPER_PASS"));
    }

    #[test]
    fn unlisted_action_is_denied() {
        let response = authorize_tool_call(&request(
            json!({"subject": "agent:one", "permissions": ["tool.other"]}),
            json!({"action": "tool.call", "resource": "tool://shell"}),
        ))
        .unwrap();
        assert_eq!(response["decision"]["result"], json!("DENY"));
        assert_eq!(response["decision"]["reason_code"], json!("E_CAPABILITY_DENIED"));
    }

    #[test]
    fn unresolved_capability_denies_first() {
        let response = authorize_tool_call(&request(
            json!({"capability_resolved": false, "permissions": ["tool.call"]}),
            json!({"action": "tool.call", "side_effects_declared": false}),
        ))
        .unwrap();
        assert_eq!(
            response["decision"]["reason_code"],
            json!("E_CAPABILITY_NOT_RESOLVED")
        );
    }

    #[test]
    fn undeclared_side_effects_deny() {
        let response = authorize_tool_call(&request(
            json!({"permissions": ["tool.call"]}),
            json!({"action": "tool.call", "side_effects_declared": false}),
        ))
        .unwrap();
        assert_eq!(
            response["decision"]["reason_code"],
            json!("E_SIDE_EFFECT_UNDECLARED")
        );
    }

    #[test]
    fn permission_escalation_denies() {
        let response = authorize_tool_call(&request(
            json!({"permissions": ["tool.call"]}),
            json!({
                "action": "tool.call",
                "requested_permissions": ["fs.write"],
                "declared_permissions": ["fs.read"],
            }),
        ))
        .unwrap();
        assert_eq!(response["decision"]["reason_code"], json!("E_PERMISSION_DENIED"));
    }

    #[test]
    fn disabled_enforcement_grants_with_skip_code() {
        let response = authorize_tool_call(&request(
            json!({"capability_enforcement": false}),
            json!({"action": "tool.call"}),
        ))
        .unwrap();
        assert_eq!(response["decision"]["result"], json!("GRANT"));
        assert_eq!(
            response["decision"]["reason_code"],
            json!("I_CAPABILITY_SKIPPED")
        );
    }

    #[test]
    fn allow_tool_call_override_wins() {
        let response = authorize_tool_call(&request(
            json!({"allow_tool_call": true}),
            json!({"action": "tool.nonexistent"}),
        ))
        .unwrap();
        assert_eq!(response["decision"]["result"], json!("GRANT"));
    }

    #[test]
    fn resolve_reports_plan_mode_and_permissions() {
        let response = resolve_capability(&json!({
            "contract_version": CONTRACT_VERSION,
            "role": "builder",
            "task": "implement",
            "context": {"permissions": ["tool.call", "fs.read", "tool.call"]},
        }))
        .unwrap();
        let plan = &response["capability_plan"];
        assert_eq!(plan["mode"], json!("enabled"));
        assert_eq!(plan["permissions"], json!(["fs.read", "tool.call"]));
    }

    #[test]
    fn resolve_requires_role_and_task() {
        let err = resolve_capability(&json!({
            "contract_version": CONTRACT_VERSION,
            "role": "",
            "task": "implement",
        }))
        .unwrap_err();
        assert_eq!(err.location, "/role");
    }

    #[test]
    fn decision_record_id_is_content_addressed() {
        let a = capability_decision_record(
            "run-1", "turn-0001", "tool://shell", "tool.call", 0, "allowed", None, None,
            "Capability decision outcome: allowed.", None,
        );
        let b = capability_decision_record(
            "run-1", "turn-0001", "tool://shell", "tool.call", 0, "allowed", None, None,
            "Capability decision outcome: allowed.", None,
        );
        assert_eq!(a["decision_id"], b["decision_id"]);
        assert_eq!(a["decision_id"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn policy_table_resolves_role_task_then_default() {
        let policy: CapabilityPolicy = serde_json::from_value(json!({
            "role_task_permissions": {"builder": {"implement": ["tool.call"]}},
            "default_permissions": ["fs.read"],
        }))
        .unwrap();
        assert_eq!(policy.permissions("builder", "implement"), vec!["tool.call"]);
        assert_eq!(policy.permissions("builder", "review"), vec!["fs.read"]);
        assert_eq!(policy.permissions("ghost", "implement"), vec!["fs.read"]);
    }
}
