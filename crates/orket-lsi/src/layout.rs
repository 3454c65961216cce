// SPDX-License-Identifier: MIT OR Apache-2.0
//! Path anatomy of the index tree.

use orket_canon::fs_token;
use std::path::{Path, PathBuf};

/// Index layout version tag written into every record.
pub const LSI_VERSION: &str = "lsi/v1";

pub(crate) const DIR_INDEX: &str = "index";
pub(crate) const DIR_COMMITTED: &str = "committed";
pub(crate) const DIR_STAGING: &str = "staging";
pub(crate) const DIR_TRIPLETS: &str = "triplets";
pub(crate) const DIR_REFS: &str = "refs";
pub(crate) const DIR_BY_ID: &str = "by_id";
pub(crate) const RUN_LEDGER_FILE: &str = "run_ledger.json";
pub(crate) const TOMBSTONE_SUFFIX: &str = ".tombstone.json";

/// Which tier of the index a read or write targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    /// The atomically-swapped truth directory.
    Committed,
    /// The per-turn staging area.
    Staging {
        /// Run the turn belongs to.
        run_id: String,
        /// Turn whose directory owns the writes.
        turn_id: String,
    },
}

impl Scope {
    /// Staging scope for `(run_id, turn_id)`.
    pub fn staging(run_id: impl Into<String>, turn_id: impl Into<String>) -> Self {
        Self::Staging {
            run_id: run_id.into(),
            turn_id: turn_id.into(),
        }
    }
}

/// Resolves scope-relative paths under a workspace root.
#[derive(Clone, Debug)]
pub struct ScopePaths {
    root: PathBuf,
}

impl ScopePaths {
    /// Paths rooted at `<root>/index/`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/index/`.
    #[must_use]
    pub fn index_root(&self) -> PathBuf {
        self.root.join(DIR_INDEX)
    }

    /// Root directory of `scope`.
    #[must_use]
    pub fn scope_root(&self, scope: &Scope) -> PathBuf {
        match scope {
            Scope::Committed => self.index_root().join(DIR_COMMITTED),
            Scope::Staging { run_id, turn_id } => self
                .index_root()
                .join(DIR_STAGING)
                .join(fs_token(run_id))
                .join(fs_token(turn_id)),
        }
    }

    /// Transient promotion target, `committed.__new`.
    #[must_use]
    pub fn committed_new(&self) -> PathBuf {
        self.index_root().join(format!("{DIR_COMMITTED}.__new"))
    }

    /// Transient promotion backup, `committed.__bak`.
    #[must_use]
    pub fn committed_bak(&self) -> PathBuf {
        self.index_root().join(format!("{DIR_COMMITTED}.__bak"))
    }
}

/// `triplets/<stem>.json` under a scope root. Stems mirror as directories.
#[must_use]
pub(crate) fn triplet_path(scope_root: &Path, stem: &str) -> PathBuf {
    scope_root.join(DIR_TRIPLETS).join(format!("{stem}.json"))
}

/// `triplets/<stem>.tombstone.json` under a scope root.
#[must_use]
pub(crate) fn tombstone_path(scope_root: &Path, stem: &str) -> PathBuf {
    scope_root
        .join(DIR_TRIPLETS)
        .join(format!("{stem}{TOMBSTONE_SUFFIX}"))
}

/// `refs/by_id/<fs_token(type)>/<fs_token(id)>.json` under a scope root.
#[must_use]
pub(crate) fn refs_record_path(scope_root: &Path, ref_type: &str, ref_id: &str) -> PathBuf {
    scope_root
        .join(DIR_REFS)
        .join(DIR_BY_ID)
        .join(fs_token(ref_type))
        .join(format!("{}.json", fs_token(ref_id)))
}

/// `committed/index/run_ledger.json` relative to the committed root.
#[must_use]
pub(crate) fn ledger_path(committed_root: &Path) -> PathBuf {
    committed_root.join(DIR_INDEX).join(RUN_LEDGER_FILE)
}

/// Normalize a stem: forward slashes, no leading/trailing separator.
#[must_use]
pub(crate) fn normalize_stem(stem: &str) -> String {
    stem.replace('\\', "/").trim_matches('/').to_string()
}

/// Parse a `turn-NNNN` identifier into its sequence index.
///
/// The format is strict: lowercase prefix and a zero-padded 4-digit
/// counter. Anything else is `None`.
#[must_use]
pub fn parse_turn_index(turn_id: &str) -> Option<u32> {
    let digits = turn_id.trim().strip_prefix("turn-")?;
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
