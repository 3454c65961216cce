// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sequential turn promotion with an atomic directory swap.
//!
//! Promotion is the only writer of `committed/`. The protocol builds a
//! complete replacement tree under `committed.__new/`, then swaps:
//!
//! 1. seed `committed.__new/` from the current `committed/`;
//! 2. copy staged objects (content-addressed, skip if present);
//! 3. copy staged triplet records for promoted non-tombstoned stems;
//! 4. stem-scoped pruning across every committed refs-by-id record;
//! 5. delete triplet records for tombstoned (and deletion-only) stems;
//! 6. re-inject sources derived from the staged links blobs;
//! 7. `committed` → `committed.__bak`, `committed.__new` → `committed`,
//!    write the ledger, drop the backup, purge the staging turn dir.
//!
//! Any failure in steps 1–6 leaves `committed/` untouched. A failure
//! between the two renames of step 7 leaves `committed.__bak/` behind for
//! operator recovery; the turn reports `E_PROMOTION_FAILED` either way.

use crate::index::{source_value_sort_key, LocalSovereignIndex, RefSource};
use crate::layout::{
    self, ledger_path, parse_turn_index, refs_record_path, triplet_path, Scope, ScopePaths,
    DIR_REFS, DIR_BY_ID, DIR_TRIPLETS, LSI_VERSION, TOMBSTONE_SUFFIX,
};
use crate::links::refs_from_links;
use orket_canon::pointer_token;
use orket_events::{codes, event_line, KernelIssue, Level, Outcome};
use orket_store::{atomic_write_json, read_json, DIR_OBJECTS};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const LEDGER_LOC: &str = "/index/committed/index/run_ledger.json";

/// Outcome of one promotion attempt.
#[derive(Clone, Debug)]
pub struct PromotionResult {
    /// PASS iff the swap completed and the ledger advanced.
    pub outcome: Outcome,
    /// Sorted union of staged and tombstoned stems (empty on failure).
    pub promoted_stems: Vec<String>,
    /// Single-line events in emission order.
    pub events: Vec<String>,
    /// Failing issues, when any.
    pub issues: Vec<KernelIssue>,
}

impl PromotionResult {
    fn fail(issues: Vec<KernelIssue>, events: Vec<String>) -> Self {
        Self {
            outcome: Outcome::Fail,
            promoted_stems: Vec::new(),
            events,
            issues,
        }
    }
}

/// Crash-simulation points inside the swap protocol, named after the step
/// they interrupt. Used by atomicity tests; production callers pass `None`
/// via [`promote_turn`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultPoint {
    /// After seeding `committed.__new/` (step 1).
    AfterSeed,
    /// After copying staged objects (step 2).
    AfterObjects,
    /// After copying staged triplet records (step 3).
    AfterTriplets,
    /// After stem-scoped ref pruning (step 4).
    AfterPruning,
    /// After source re-injection (step 6), before the swap.
    AfterInjection,
}

/// Promote `(run_id, turn_id)` into the committed scope.
pub fn promote_turn(root: &Path, run_id: &str, turn_id: &str) -> PromotionResult {
    promote_turn_with_fault(root, run_id, turn_id, None)
}

/// [`promote_turn`] with an injected crash point for atomicity tests.
pub fn promote_turn_with_fault(
    root: &Path,
    run_id: &str,
    turn_id: &str,
    fault: Option<FaultPoint>,
) -> PromotionResult {
    let paths = ScopePaths::new(root);
    let committed_root = paths.scope_root(&Scope::Committed);
    let staging_root = paths.scope_root(&Scope::staging(run_id, turn_id));

    // Sequential ledger preflight.
    let Some(requested) = parse_turn_index(turn_id) else {
        let issue = KernelIssue::fail(
            "promotion",
            codes::E_PROMOTION_FAILED,
            LEDGER_LOC,
            "Failed to parse promotion ledger or turn id.",
        )
        .with_detail("turn_id", json!(turn_id));
        let event = event_line(
            Level::Fail,
            "promotion",
            codes::E_PROMOTION_FAILED,
            LEDGER_LOC,
            "Failed to parse promotion ledger or turn id.",
            &[("turn_id", json!(turn_id))],
        );
        return PromotionResult::fail(vec![issue], vec![event]);
    };
    let last_id = load_last_promoted_turn_id(&committed_root);
    let last = parse_turn_index(&last_id).unwrap_or(0);

    if requested <= last {
        let issue = KernelIssue::fail(
            "promotion",
            codes::E_PROMOTION_ALREADY_APPLIED,
            LEDGER_LOC,
            "Promotion turn already applied or older than ledger state.",
        )
        .with_detail("turn_id", json!(turn_id))
        .with_detail("last_promoted_turn_id", json!(last_id));
        let event = event_line(
            Level::Fail,
            "promotion",
            codes::E_PROMOTION_ALREADY_APPLIED,
            LEDGER_LOC,
            "Promotion turn already applied or stale.",
            &[
                ("turn_id", json!(turn_id)),
                ("last_promoted_turn_id", json!(last_id)),
            ],
        );
        return PromotionResult::fail(vec![issue], vec![event]);
    }
    if requested != last + 1 {
        let issue = KernelIssue::fail(
            "promotion",
            codes::E_PROMOTION_OUT_OF_ORDER,
            LEDGER_LOC,
            "Promotion turn is out of sequence.",
        )
        .with_detail("turn_id", json!(turn_id))
        .with_detail("last_promoted_turn_id", json!(last_id));
        let event = event_line(
            Level::Fail,
            "promotion",
            codes::E_PROMOTION_OUT_OF_ORDER,
            LEDGER_LOC,
            "Promotion turn is out of sequence.",
            &[
                ("turn_id", json!(turn_id)),
                ("last_promoted_turn_id", json!(last_id)),
            ],
        );
        return PromotionResult::fail(vec![issue], vec![event]);
    }

    // Plan: staged stems plus validated tombstones.
    let mut promoted_stems = if staging_root.exists() {
        list_staged_stems(&staging_root)
    } else {
        Vec::new()
    };
    let mut tombstoned: BTreeSet<String> = BTreeSet::new();
    if staging_root.exists() {
        let (stems, issues, events) = load_tombstone_stems(&staging_root, turn_id);
        if !issues.is_empty() {
            return PromotionResult::fail(issues, events);
        }
        tombstoned = stems;
        let mut union: BTreeSet<String> = promoted_stems.into_iter().collect();
        union.extend(tombstoned.iter().cloned());
        promoted_stems = union.into_iter().collect();
    }

    // A missing staging turn directory is a deletion-only promotion: every
    // committed stem is retired and the ledger still advances.
    let deletion_only = !staging_root.exists();
    if deletion_only {
        promoted_stems = list_committed_stems(&committed_root);
    }

    let new_root = paths.committed_new();
    let bak_root = paths.committed_bak();

    let mut events: Vec<String> = Vec::new();
    let applied = apply_swap(SwapPlan {
        committed_root: &committed_root,
        staging_root: &staging_root,
        new_root: &new_root,
        bak_root: &bak_root,
        promoted_stems: &promoted_stems,
        tombstoned: &tombstoned,
        deletion_only,
        turn_id,
        fault,
        events: &mut events,
    });

    match applied {
        Ok(()) => {
            if promoted_stems.is_empty() {
                events.push(event_line(
                    Level::Info,
                    "promotion",
                    codes::I_NOOP_PROMOTION,
                    "/index/staging",
                    "No staged stems to promote.",
                    &[("run_id", json!(run_id)), ("turn_id", json!(turn_id))],
                ));
            }
            events.push(event_line(
                Level::Info,
                "promotion",
                codes::I_PROMOTION_PASS,
                "/index/committed",
                "Promotion completed.",
                &[
                    ("run_id", json!(run_id)),
                    ("turn_id", json!(turn_id)),
                    ("stems", json!(promoted_stems)),
                ],
            ));
            PromotionResult {
                outcome: Outcome::Pass,
                promoted_stems,
                events,
                issues: Vec::new(),
            }
        }
        Err(message) => {
            let issue = KernelIssue::fail(
                "promotion",
                codes::E_PROMOTION_FAILED,
                "/index/committed",
                "Promotion failed; committed state not guaranteed updated.",
            )
            .with_detail("error", json!(message))
            .with_detail("run_id", json!(run_id))
            .with_detail("turn_id", json!(turn_id));
            events.push(event_line(
                Level::Fail,
                "promotion",
                codes::E_PROMOTION_FAILED,
                "/index/committed",
                "Promotion failed.",
                &[
                    ("error", json!(message)),
                    ("run_id", json!(run_id)),
                    ("turn_id", json!(turn_id)),
                ],
            ));
            // Fail closed: drop the transient tree, keep any backup for
            // operator recovery.
            if new_root.exists() {
                let _ = fs::remove_dir_all(&new_root);
            }
            PromotionResult::fail(vec![issue], events)
        }
    }
}

struct SwapPlan<'a> {
    committed_root: &'a Path,
    staging_root: &'a Path,
    new_root: &'a Path,
    bak_root: &'a Path,
    promoted_stems: &'a [String],
    tombstoned: &'a BTreeSet<String>,
    deletion_only: bool,
    turn_id: &'a str,
    fault: Option<FaultPoint>,
    events: &'a mut Vec<String>,
}

fn apply_swap(plan: SwapPlan<'_>) -> Result<(), String> {
    let fail = |context: &str, e: &dyn std::fmt::Display| format!("{context}: {e}");
    let fault_at = |point: FaultPoint| -> Result<(), String> {
        if plan.fault == Some(point) {
            return Err(format!("injected fault: {point:?}"));
        }
        Ok(())
    };

    // Clean transient trees from an earlier crashed attempt.
    if plan.new_root.exists() {
        fs::remove_dir_all(plan.new_root).map_err(|e| fail("clean committed.__new", &e))?;
    }
    if plan.bak_root.exists() {
        fs::remove_dir_all(plan.bak_root).map_err(|e| fail("clean committed.__bak", &e))?;
    }

    // 1) Seed from current committed.
    if plan.committed_root.exists() {
        copy_dir_all(plan.committed_root, plan.new_root)
            .map_err(|e| fail("seed committed.__new", &e))?;
    } else {
        fs::create_dir_all(plan.new_root).map_err(|e| fail("create committed.__new", &e))?;
    }
    fault_at(FaultPoint::AfterSeed)?;

    // 2) Staged objects, content-addressed: skip blobs already present.
    if plan.staging_root.exists() {
        let staged_objects = plan.staging_root.join(DIR_OBJECTS);
        if staged_objects.exists() {
            for entry in sorted_files(&staged_objects) {
                let rel = entry.strip_prefix(&staged_objects).expect("under objects");
                let dest = plan.new_root.join(DIR_OBJECTS).join(rel);
                if dest.exists() {
                    continue;
                }
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| fail("create objects dir", &e))?;
                }
                fs::copy(&entry, &dest).map_err(|e| fail("copy staged object", &e))?;
            }
        }
    }
    fault_at(FaultPoint::AfterObjects)?;

    // 3) Staged triplet records for promoted, non-tombstoned stems.
    if plan.staging_root.exists() {
        for stem in plan.promoted_stems {
            if plan.tombstoned.contains(stem) {
                continue;
            }
            let src = triplet_path(plan.staging_root, stem);
            if !src.exists() {
                continue;
            }
            let dst = triplet_path(plan.new_root, stem);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent).map_err(|e| fail("create triplets dir", &e))?;
            }
            fs::copy(&src, &dst).map_err(|e| fail("copy triplet record", &e))?;
        }
    }
    fault_at(FaultPoint::AfterTriplets)?;

    // 4) Stem-scoped pruning across every refs-by-id record.
    let refs_dir = plan.new_root.join(DIR_REFS).join(DIR_BY_ID);
    if refs_dir.exists() {
        for ref_file in sorted_files(&refs_dir) {
            let Some(Value::Object(mut record)) =
                read_json(&ref_file).map_err(|e| fail("read ref record", &e))?
            else {
                continue;
            };
            prune_sources(&mut record, plan.promoted_stems);
            record
                .entry("lsi_version")
                .or_insert_with(|| json!(LSI_VERSION));
            atomic_write_json(&ref_file, &Value::Object(record))
                .map_err(|e| fail("write pruned ref record", &e))?;
        }
    }
    fault_at(FaultPoint::AfterPruning)?;

    // 5) Retire tombstoned (or, deletion-only, every promoted) records.
    if plan.deletion_only || !plan.tombstoned.is_empty() {
        let to_remove: BTreeSet<&String> = if plan.deletion_only {
            plan.promoted_stems.iter().collect()
        } else {
            plan.tombstoned.iter().collect()
        };
        for stem in to_remove {
            let dst = triplet_path(plan.new_root, stem);
            if dst.exists() {
                fs::remove_file(&dst).map_err(|e| fail("remove tombstoned record", &e))?;
            }
        }
    }

    // 6) Re-inject sources from the staged links blobs.
    let mut grouped: BTreeMap<(String, String), Vec<RefSource>> = BTreeMap::new();
    if plan.staging_root.exists() {
        for stem in plan.promoted_stems {
            if plan.tombstoned.contains(stem) {
                continue;
            }
            let Some(record) = read_json(&triplet_path(plan.staging_root, stem))
                .map_err(|e| fail("read staged triplet", &e))?
            else {
                continue;
            };
            let Some(links_digest) = record.get("links_digest").and_then(Value::as_str) else {
                continue;
            };
            let Some(Value::Object(links)) =
                orket_store::get_json(plan.staging_root, links_digest)
                    .map_err(|e| fail("read staged links blob", &e))?
            else {
                continue;
            };
            for link in refs_from_links(&links) {
                grouped
                    .entry((link.ref_type.clone(), link.ref_id.clone()))
                    .or_default()
                    .push(RefSource {
                        stem: stem.clone(),
                        location: link.pointer,
                        relationship: link.relationship,
                        artifact_digest: links_digest.to_string(),
                    });
            }
        }
    }

    for ((ref_type, ref_id), mut sources) in grouped {
        let path = refs_record_path(plan.new_root, &ref_type, &ref_id);
        let mut record = match read_json(&path).map_err(|e| fail("read ref record", &e))? {
            Some(Value::Object(mut existing)) => {
                existing
                    .entry("lsi_version")
                    .or_insert_with(|| json!(LSI_VERSION));
                existing.entry("type").or_insert_with(|| json!(ref_type));
                existing.entry("id").or_insert_with(|| json!(ref_id));
                existing
            }
            _ => {
                let mut fresh = Map::new();
                fresh.insert("lsi_version".into(), json!(LSI_VERSION));
                fresh.insert("type".into(), json!(ref_type));
                fresh.insert("id".into(), json!(ref_id));
                fresh.insert("sources".into(), json!([]));
                fresh
            }
        };
        LocalSovereignIndex::sort_sources(&mut sources);
        inject_sources(&mut record, &sources);
        atomic_write_json(&path, &Value::Object(record.clone()))
            .map_err(|e| fail("write ref record", &e))?;

        // Collision observation: more than one distinct source stem.
        let stems: BTreeSet<String> = record
            .get("sources")
            .and_then(Value::as_array)
            .map(|sources| {
                sources
                    .iter()
                    .filter_map(|s| s.get("stem").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if stems.len() > 1 {
            let loc = format!(
                "/index/refs/by_id/{}/{}",
                pointer_token(&ref_type),
                pointer_token(&ref_id)
            );
            plan.events.push(event_line(
                Level::Info,
                "promotion",
                codes::I_REF_MULTISOURCE,
                &loc,
                "Multiple stems reference the same {type,id}.",
                &[
                    ("type", json!(ref_type)),
                    ("id", json!(ref_id)),
                    ("stems", json!(stems.iter().collect::<Vec<_>>())),
                ],
            ));
        }
    }
    fault_at(FaultPoint::AfterInjection)?;

    // 7) The swap itself.
    if plan.committed_root.exists() {
        fs::rename(plan.committed_root, plan.bak_root)
            .map_err(|e| fail("swap committed to backup", &e))?;
    }
    fs::rename(plan.new_root, plan.committed_root)
        .map_err(|e| fail("swap committed.__new into place", &e))?;
    atomic_write_json(
        &ledger_path(plan.committed_root),
        &json!({
            "lsi_version": LSI_VERSION,
            "last_promoted_turn_id": plan.turn_id,
        }),
    )
    .map_err(|e| fail("write run ledger", &e))?;
    if plan.bak_root.exists() {
        fs::remove_dir_all(plan.bak_root).map_err(|e| fail("drop committed.__bak", &e))?;
    }
    if plan.staging_root.exists() {
        fs::remove_dir_all(plan.staging_root).map_err(|e| fail("purge staging turn", &e))?;
    }
    Ok(())
}

fn load_last_promoted_turn_id(committed_root: &Path) -> String {
    let fallback = || "turn-0000".to_string();
    let Ok(Some(ledger)) = read_json(&ledger_path(committed_root)) else {
        return fallback();
    };
    match ledger.get("last_promoted_turn_id").and_then(Value::as_str) {
        Some(value) if parse_turn_index(value).is_some() => value.to_string(),
        _ => fallback(),
    }
}

fn prune_sources(record: &mut Map<String, Value>, stems: &[String]) {
    let sources = record
        .get("sources")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let pruned: Vec<Value> = sources
        .into_iter()
        .filter(|source| {
            source
                .get("stem")
                .and_then(Value::as_str)
                .is_none_or(|stem| !stems.iter().any(|s| s == stem))
        })
        .collect();
    record.insert("sources".into(), Value::Array(pruned));
}

fn inject_sources(record: &mut Map<String, Value>, new_sources: &[RefSource]) {
    let mut sources: Vec<Value> = record
        .get("sources")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter(|s| s.is_object())
        .collect();
    sources.extend(new_sources.iter().map(|s| {
        json!({
            "stem": s.stem,
            "location": s.location,
            "relationship": s.relationship,
            "artifact_digest": s.artifact_digest,
        })
    }));
    sources.sort_by_key(|source| {
        source
            .as_object()
            .map(source_value_sort_key)
            .unwrap_or_default()
    });
    record.insert("sources".into(), Value::Array(sources));
}

/// Staged stems: every `triplets/**/*.json` that is not a tombstone, sorted.
fn list_staged_stems(staging_root: &Path) -> Vec<String> {
    stems_under(&staging_root.join(DIR_TRIPLETS))
}

/// Every committed stem, for deletion-only promotions.
fn list_committed_stems(committed_root: &Path) -> Vec<String> {
    stems_under(&committed_root.join(DIR_TRIPLETS))
}

fn stems_under(triplets_dir: &Path) -> Vec<String> {
    if !triplets_dir.exists() {
        return Vec::new();
    }
    let mut stems: Vec<String> = sorted_files(triplets_dir)
        .into_iter()
        .filter_map(|path| {
            let rel = path
                .strip_prefix(triplets_dir)
                .ok()?
                .to_string_lossy()
                .replace('\\', "/");
            if rel.ends_with(TOMBSTONE_SUFFIX) {
                return None;
            }
            rel.strip_suffix(".json").map(str::to_string)
        })
        .collect();
    stems.sort();
    stems
}

/// Tombstone stems with full payload validation.
fn load_tombstone_stems(
    staging_root: &Path,
    turn_id: &str,
) -> (BTreeSet<String>, Vec<KernelIssue>, Vec<String>) {
    let triplets_dir = staging_root.join(DIR_TRIPLETS);
    let mut stems: BTreeSet<String> = BTreeSet::new();
    let mut issues: Vec<KernelIssue> = Vec::new();
    let mut events: Vec<String> = Vec::new();
    if !triplets_dir.exists() {
        return (stems, issues, events);
    }

    for path in sorted_files(&triplets_dir) {
        let rel = path
            .strip_prefix(&triplets_dir)
            .expect("under triplets")
            .to_string_lossy()
            .replace('\\', "/");
        let Some(stem_from_filename) = rel.strip_suffix(TOMBSTONE_SUFFIX) else {
            continue;
        };
        let loc_base = format!("/index/staging/triplets/{}", pointer_token(&rel));

        let payload = match read_json(&path) {
            Ok(Some(payload)) => payload,
            Ok(None) | Err(_) => {
                issues.push(
                    KernelIssue::fail(
                        "promotion",
                        codes::E_TOMBSTONE_INVALID,
                        &loc_base,
                        "Tombstone JSON parse failed.",
                    )
                    .with_detail("file", json!(rel)),
                );
                events.push(event_line(
                    Level::Fail,
                    "promotion",
                    codes::E_TOMBSTONE_INVALID,
                    &loc_base,
                    "Tombstone JSON parse failed.",
                    &[("file", json!(rel))],
                ));
                continue;
            }
        };

        let valid_shape = payload.get("kind").and_then(Value::as_str) == Some("tombstone")
            && payload.get("stem").and_then(Value::as_str).is_some()
            && payload.get("dto_type").and_then(Value::as_str).is_some()
            && payload.get("id").and_then(Value::as_str).is_some()
            && payload
                .get("deleted_by_turn_id")
                .and_then(Value::as_str)
                .is_some();
        if !valid_shape {
            let required = json!(["kind", "stem", "dto_type", "id", "deleted_by_turn_id"]);
            issues.push(
                KernelIssue::fail(
                    "promotion",
                    codes::E_TOMBSTONE_INVALID,
                    &loc_base,
                    "Tombstone payload is invalid.",
                )
                .with_detail("required", required.clone()),
            );
            events.push(event_line(
                Level::Fail,
                "promotion",
                codes::E_TOMBSTONE_INVALID,
                &loc_base,
                "Tombstone payload is invalid.",
                &[("required", required)],
            ));
            continue;
        }

        let payload_stem =
            layout::normalize_stem(payload["stem"].as_str().expect("checked above"));
        if payload_stem != stem_from_filename {
            let loc = format!("{loc_base}/stem");
            issues.push(
                KernelIssue::fail(
                    "promotion",
                    codes::E_TOMBSTONE_STEM_MISMATCH,
                    &loc,
                    "Tombstone stem does not match filename-derived stem.",
                )
                .with_detail("expected", json!(stem_from_filename))
                .with_detail("actual", json!(payload_stem)),
            );
            events.push(event_line(
                Level::Fail,
                "promotion",
                codes::E_TOMBSTONE_STEM_MISMATCH,
                &loc,
                "Tombstone stem does not match filename-derived stem.",
                &[
                    ("expected", json!(stem_from_filename)),
                    ("actual", json!(payload_stem)),
                ],
            ));
            continue;
        }

        let deleted_by = payload["deleted_by_turn_id"].as_str().expect("checked above");
        if deleted_by != turn_id {
            let loc = format!("{loc_base}/deleted_by_turn_id");
            issues.push(
                KernelIssue::fail(
                    "promotion",
                    codes::E_TOMBSTONE_INVALID,
                    &loc,
                    "Tombstone deleted_by_turn_id must match promotion turn.",
                )
                .with_detail("expected", json!(turn_id))
                .with_detail("actual", json!(deleted_by)),
            );
            events.push(event_line(
                Level::Fail,
                "promotion",
                codes::E_TOMBSTONE_INVALID,
                &loc,
                "Tombstone deleted_by_turn_id must match promotion turn.",
                &[("expected", json!(turn_id)), ("actual", json!(deleted_by))],
            ));
            continue;
        }

        stems.insert(stem_from_filename.to_string());
    }

    (stems, issues, events)
}

/// Files under `root`, depth-first, sorted by path for determinism.
fn sorted_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
