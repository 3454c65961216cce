// SPDX-License-Identifier: MIT OR Apache-2.0
//! Triplet staging and the refs-by-id symbol table.

use crate::layout::{self, Scope, ScopePaths, LSI_VERSION};
use crate::links::refs_from_links;
use orket_store::{atomic_write_json, read_json, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Errors from index operations.
///
/// These are environment failures (I/O, malformed stored JSON, profile
/// violations), not semantic findings — those surface as issues.
#[derive(Debug, thiserror::Error)]
pub enum LsiError {
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Digests produced by staging one triplet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TripletDigests {
    /// Lower-cased `dto_type` tag extracted from the body, if present.
    pub dto_type: Option<String>,
    /// Digest of the canonical body bytes.
    pub body_digest: String,
    /// Digest of the canonical links bytes.
    pub links_digest: String,
    /// Digest of the canonical manifest bytes.
    pub manifest_digest: String,
}

/// One source entry in a refs-by-id record.
///
/// Non-owning: it records *where* a `(type, id)` pair is referenced, keyed
/// by the referencing stem and the pointer into its links blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefSource {
    /// Stem of the triplet whose links carry the ref.
    pub stem: String,
    /// RFC-6901 pointer to the ref object, rooted at `/links`.
    pub location: String,
    /// Relationship tag, when the ref object declared one.
    pub relationship: Option<String>,
    /// Digest of the links blob the ref was extracted from.
    pub artifact_digest: String,
}

impl RefSource {
    fn sort_key(&self) -> (String, String, String, String) {
        (
            self.stem.clone(),
            self.location.clone(),
            self.relationship.clone().unwrap_or_default(),
            self.artifact_digest.clone(),
        )
    }

    fn to_value(&self) -> Value {
        json!({
            "stem": self.stem,
            "location": self.location,
            "relationship": self.relationship,
            "artifact_digest": self.artifact_digest,
        })
    }
}

/// Sort key for source entries stored as raw JSON objects.
pub(crate) fn source_value_sort_key(source: &Map<String, Value>) -> (String, String, String, String) {
    let field = |key: &str| {
        source
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    (
        field("stem"),
        field("location"),
        field("relationship"),
        field("artifact_digest"),
    )
}

/// The staging/committed triplet index.
pub struct LocalSovereignIndex {
    paths: ScopePaths,
}

impl LocalSovereignIndex {
    /// Index rooted at `<root>/index/`.
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            paths: ScopePaths::new(root),
        }
    }

    /// Path resolver for this index.
    #[must_use]
    pub fn paths(&self) -> &ScopePaths {
        &self.paths
    }

    /// Stage one triplet into `(run_id, turn_id)`.
    ///
    /// Canonicalizes body/links/manifest, stores the blobs content-addressed,
    /// writes the triplet record atomically, and updates the refs-by-id
    /// records for every ref in the links graph. Sources belonging to this
    /// stem are pruned before the new ones are injected, so restaging the
    /// same stem within a turn never duplicates entries.
    pub fn stage_triplet(
        &self,
        run_id: &str,
        turn_id: &str,
        stem: &str,
        body: &Map<String, Value>,
        links: &Map<String, Value>,
        manifest: &Map<String, Value>,
    ) -> Result<TripletDigests, LsiError> {
        let stem = layout::normalize_stem(stem);
        let scope_root = self.paths.scope_root(&Scope::staging(run_id, turn_id));

        let body_digest = orket_store::put_json(&scope_root, &Value::Object(body.clone()))?;
        let links_digest = orket_store::put_json(&scope_root, &Value::Object(links.clone()))?;
        let manifest_digest = orket_store::put_json(&scope_root, &Value::Object(manifest.clone()))?;

        let dto_type = body
            .get("dto_type")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_lowercase());

        let record = json!({
            "lsi_version": LSI_VERSION,
            "stem": stem,
            "dto_type": dto_type,
            "body_digest": body_digest,
            "links_digest": links_digest,
            "manifest_digest": manifest_digest,
            "updated_at_turn": turn_id,
        });
        atomic_write_json(&layout::triplet_path(&scope_root, &stem), &record)?;

        let mut grouped: BTreeMap<(String, String), Vec<RefSource>> = BTreeMap::new();
        for link in refs_from_links(links) {
            grouped
                .entry((link.ref_type.clone(), link.ref_id.clone()))
                .or_default()
                .push(RefSource {
                    stem: stem.clone(),
                    location: link.pointer,
                    relationship: link.relationship,
                    artifact_digest: links_digest.clone(),
                });
        }
        self.update_refs_grouped(&scope_root, &grouped)?;

        Ok(TripletDigests {
            dto_type,
            body_digest,
            links_digest,
            manifest_digest,
        })
    }

    /// Stage a tombstone requesting deletion of `stem` at the next
    /// promotion. The payload must name the promoting turn.
    pub fn stage_tombstone(
        &self,
        run_id: &str,
        turn_id: &str,
        stem: &str,
        dto_type: &str,
        id: &str,
    ) -> Result<(), LsiError> {
        let stem = layout::normalize_stem(stem);
        let scope_root = self.paths.scope_root(&Scope::staging(run_id, turn_id));
        let payload = json!({
            "kind": "tombstone",
            "stem": stem,
            "dto_type": dto_type,
            "id": id,
            "deleted_by_turn_id": turn_id,
        });
        atomic_write_json(&layout::tombstone_path(&scope_root, &stem), &payload)?;
        Ok(())
    }

    /// Read a triplet record exactly as stored. `None` when absent.
    pub fn read_triplet_record(
        &self,
        scope: &Scope,
        stem: &str,
    ) -> Result<Option<Value>, LsiError> {
        let stem = layout::normalize_stem(stem);
        let scope_root = self.paths.scope_root(scope);
        Ok(read_json(&layout::triplet_path(&scope_root, &stem))?)
    }

    /// Read the sources of a refs-by-id record exactly as stored — no
    /// re-sorting at read time. Empty when the record is absent.
    pub fn read_refs_sources(
        &self,
        scope: &Scope,
        ref_type: &str,
        ref_id: &str,
    ) -> Result<Vec<Map<String, Value>>, LsiError> {
        let scope_root = self.paths.scope_root(scope);
        let Some(record) = read_json(&layout::refs_record_path(&scope_root, ref_type, ref_id))?
        else {
            return Ok(Vec::new());
        };
        let Some(sources) = record.get("sources").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };
        Ok(sources
            .iter()
            .filter_map(Value::as_object)
            .cloned()
            .collect())
    }

    /// Load a staged object blob as JSON by digest.
    pub(crate) fn staged_object_json(
        &self,
        scope_root: &Path,
        digest: &str,
    ) -> Result<Option<Value>, LsiError> {
        Ok(orket_store::get_json(scope_root, digest)?)
    }

    /// Update refs-by-id records for a batch of sources grouped by
    /// `(type, id)`, pruning existing sources with the same stems first and
    /// re-sorting deterministically.
    pub(crate) fn update_refs_grouped(
        &self,
        scope_root: &Path,
        grouped: &BTreeMap<(String, String), Vec<RefSource>>,
    ) -> Result<(), LsiError> {
        for ((ref_type, ref_id), new_sources) in grouped {
            let path = layout::refs_record_path(scope_root, ref_type, ref_id);
            let existing_sources: Vec<Map<String, Value>> = read_json(&path)?
                .and_then(|record| record.get("sources").and_then(Value::as_array).cloned())
                .map(|sources| {
                    sources
                        .iter()
                        .filter_map(Value::as_object)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            let stems_to_replace: Vec<&str> =
                new_sources.iter().map(|s| s.stem.as_str()).collect();
            let mut merged: Vec<Value> = existing_sources
                .into_iter()
                .filter(|source| {
                    source
                        .get("stem")
                        .and_then(Value::as_str)
                        .is_none_or(|stem| !stems_to_replace.contains(&stem))
                })
                .map(Value::Object)
                .collect();
            merged.extend(new_sources.iter().map(RefSource::to_value));

            merged.sort_by_key(|source| {
                source
                    .as_object()
                    .map(source_value_sort_key)
                    .unwrap_or_default()
            });

            let record = json!({
                "lsi_version": LSI_VERSION,
                "type": ref_type,
                "id": ref_id,
                "sources": merged,
            });
            atomic_write_json(&path, &record)?;
        }
        Ok(())
    }

    /// Sort a mutable source list the way records are stored.
    pub(crate) fn sort_sources(sources: &mut [RefSource]) {
        sources.sort_by_key(RefSource::sort_key);
    }
}
