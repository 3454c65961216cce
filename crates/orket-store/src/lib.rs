// SPDX-License-Identifier: MIT OR Apache-2.0
//! Write-once content-addressed object store.
//!
//! Blobs live at `objects/<digest[..2]>/<digest>` under a scope root. Every
//! write in the kernel funnels through [`atomic_write_bytes`]: temp file
//! plus rename, so a partial write is never visible to a reader. The
//! two-level prefix directory is created on demand.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use orket_canon::{canonical_bytes, structural_digest, CanonicalizationError};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Directory name for the content-addressed area inside a scope.
pub const DIR_OBJECTS: &str = "objects";

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("store I/O failed at {path}: {source}")]
    Io {
        /// Path the operation targeted.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// A stored blob did not parse as JSON.
    #[error("stored blob at {path} is not valid JSON: {source}")]
    Json {
        /// Path of the malformed blob.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// The value violated the canonical profile.
    #[error(transparent)]
    Canonical(#[from] CanonicalizationError),
}

fn io_err(path: &Path, source: io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `payload` to `path` atomically: parent dirs on demand, temp file
/// in the same directory, then rename. Rename replaces atomically on POSIX,
/// so readers observe either the old content or the new, never a prefix.
pub fn atomic_write_bytes(path: &Path, payload: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = match path.file_name() {
        Some(name) => path.with_file_name(format!("{}.tmp", name.to_string_lossy())),
        None => path.with_extension("tmp"),
    };
    fs::write(&tmp, payload).map_err(|e| io_err(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| io_err(path, e))
}

/// Canonicalize `value` and write its bytes atomically.
pub fn atomic_write_json(path: &Path, value: &Value) -> Result<(), StoreError> {
    atomic_write_bytes(path, &canonical_bytes(value)?)
}

/// Read and parse a JSON file. `Ok(None)` when the file does not exist.
pub fn read_json(path: &Path) -> Result<Option<Value>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })
}

/// Path of the blob for `digest_hex` under `scope_root`.
#[must_use]
pub fn object_path(scope_root: &Path, digest_hex: &str) -> PathBuf {
    let prefix = &digest_hex[..digest_hex.len().min(2)];
    scope_root.join(DIR_OBJECTS).join(prefix).join(digest_hex)
}

/// Store `bytes` under its digest.
///
/// A pre-existing blob with the same name is a successful put: content is
/// assumed equal because names collide only on a SHA-256 collision.
pub fn put(scope_root: &Path, digest_hex: &str, bytes: &[u8]) -> Result<(), StoreError> {
    let path = object_path(scope_root, digest_hex);
    if path.exists() {
        return Ok(());
    }
    atomic_write_bytes(&path, bytes)
}

/// Fetch a blob. `Ok(None)` when absent.
pub fn get(scope_root: &Path, digest_hex: &str) -> Result<Option<Vec<u8>>, StoreError> {
    let path = object_path(scope_root, digest_hex);
    match fs::read(&path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(&path, e)),
    }
}

/// Canonicalize `value`, store the bytes, return the digest.
pub fn put_json(scope_root: &Path, value: &Value) -> Result<String, StoreError> {
    let bytes = canonical_bytes(value)?;
    let digest = structural_digest(&bytes);
    put(scope_root, &digest, &bytes)?;
    Ok(digest)
}

/// Fetch a blob and parse it as JSON. `Ok(None)` when absent.
pub fn get_json(scope_root: &Path, digest_hex: &str) -> Result<Option<Value>, StoreError> {
    let Some(bytes) = get(scope_root, digest_hex)? else {
        return Ok(None);
    };
    let path = object_path(scope_root, digest_hex);
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Json { path, source })
}
