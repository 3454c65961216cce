// SPDX-License-Identifier: MIT OR Apache-2.0
//! The registered code taxonomy.
//!
//! `E_*` codes are failures, `I_*` codes are informational. Codes are part
//! of the replay parity surface and must never change spelling.

/// A link target resolved at none of the Self/Staging/Committed layers.
pub const E_RELATIONSHIP_ORPHAN: &str = "E_RELATIONSHIP_ORPHAN";
/// A link target resolved; details name the layer.
pub const I_REF_VISIBLE: &str = "I_REF_VISIBLE";
/// A ref record ended up with sources from more than one stem.
pub const I_REF_MULTISOURCE: &str = "I_REF_MULTISOURCE";

/// Promotion turn is not the ledger successor.
pub const E_PROMOTION_OUT_OF_ORDER: &str = "E_PROMOTION_OUT_OF_ORDER";
/// Promotion turn is at or behind the ledger.
pub const E_PROMOTION_ALREADY_APPLIED: &str = "E_PROMOTION_ALREADY_APPLIED";
/// Promotion aborted; committed state was left untouched (or a backup remains).
pub const E_PROMOTION_FAILED: &str = "E_PROMOTION_FAILED";
/// Promotion completed and the ledger advanced.
pub const I_PROMOTION_PASS: &str = "I_PROMOTION_PASS";
/// Promotion ran with nothing staged.
pub const I_NOOP_PROMOTION: &str = "I_NOOP_PROMOTION";

/// Tombstone payload failed shape or turn validation.
pub const E_TOMBSTONE_INVALID: &str = "E_TOMBSTONE_INVALID";
/// Tombstone stem disagrees with its filename-derived stem.
pub const E_TOMBSTONE_STEM_MISMATCH: &str = "E_TOMBSTONE_STEM_MISMATCH";

/// A request arrived without a run id.
pub const E_BASE_SHAPE_MISSING_RUN_ID: &str = "E_BASE_SHAPE_MISSING_RUN_ID";
/// A manifest-level field failed shape validation.
pub const E_BASE_SHAPE_INVALID_MANIFEST_VALUE: &str = "E_BASE_SHAPE_INVALID_MANIFEST_VALUE";
/// A links blob failed shape validation.
pub const E_BASE_SHAPE_INVALID_LINKS_VALUE: &str = "E_BASE_SHAPE_INVALID_LINKS_VALUE";

/// Capability policy denied the action.
pub const E_CAPABILITY_DENIED: &str = "E_CAPABILITY_DENIED";
/// Tool call arrived before capability resolution.
pub const E_CAPABILITY_NOT_RESOLVED: &str = "E_CAPABILITY_NOT_RESOLVED";
/// Requested permissions exceed the declared set.
pub const E_PERMISSION_DENIED: &str = "E_PERMISSION_DENIED";
/// Tool call did not declare its side effects.
pub const E_SIDE_EFFECT_UNDECLARED: &str = "E_SIDE_EFFECT_UNDECLARED";
/// Capability (or replay/validation) gate passed.
pub const I_GATEKEEPER_PASS: &str = "I_GATEKEEPER_PASS";
/// Capability enforcement was disabled for the request.
pub const I_CAPABILITY_SKIPPED: &str = "I_CAPABILITY_SKIPPED";

/// Replay descriptor is missing required fields.
pub const E_REPLAY_INPUT_MISSING: &str = "E_REPLAY_INPUT_MISSING";
/// Replay descriptor carries a foreign contract version.
pub const E_REPLAY_VERSION_MISMATCH: &str = "E_REPLAY_VERSION_MISMATCH";
/// Structural parity between two runs failed.
pub const E_REPLAY_EQUIVALENCE_FAILED: &str = "E_REPLAY_EQUIVALENCE_FAILED";

/// Every registered code, sorted.
pub const REGISTERED: &[&str] = &[
    E_BASE_SHAPE_INVALID_LINKS_VALUE,
    E_BASE_SHAPE_INVALID_MANIFEST_VALUE,
    E_BASE_SHAPE_MISSING_RUN_ID,
    E_CAPABILITY_DENIED,
    E_CAPABILITY_NOT_RESOLVED,
    E_PERMISSION_DENIED,
    E_PROMOTION_ALREADY_APPLIED,
    E_PROMOTION_FAILED,
    E_PROMOTION_OUT_OF_ORDER,
    E_RELATIONSHIP_ORPHAN,
    E_REPLAY_EQUIVALENCE_FAILED,
    E_REPLAY_INPUT_MISSING,
    E_REPLAY_VERSION_MISMATCH,
    E_SIDE_EFFECT_UNDECLARED,
    E_TOMBSTONE_INVALID,
    E_TOMBSTONE_STEM_MISMATCH,
    I_CAPABILITY_SKIPPED,
    I_GATEKEEPER_PASS,
    I_NOOP_PROMOTION,
    I_PROMOTION_PASS,
    I_REF_MULTISOURCE,
    I_REF_VISIBLE,
];

/// Whether `code` belongs to the registered taxonomy.
#[must_use]
pub fn is_registered(code: &str) -> bool {
    REGISTERED.binary_search(&code).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_sorted_for_binary_search() {
        let mut sorted = REGISTERED.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, REGISTERED);
    }

    #[test]
    fn known_codes_resolve() {
        assert!(is_registered(E_RELATIONSHIP_ORPHAN));
        assert!(is_registered(I_PROMOTION_PASS));
        assert!(!is_registered("E_NOT_A_CODE"));
    }
}
