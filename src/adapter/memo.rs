//! Optional on-disk memoization of reader selection.
//!
//! Probing every candidate reader is the expensive part of opening a slide.
//! [`MemoizedOpener`] decorates any [`ReaderOpener`] with a sidecar record
//! per file remembering which reader succeeded, so a later open of the same
//! file skips the probe walk. The heavyweight probe-result cache itself
//! stays with the external engine; this layer persists only the selection.
//!
//! The decorator is chosen once at construction from the configured cache
//! directory. A directory that is absent, missing, not a directory,
//! unreadable or unwritable disables memoization silently (logged), and the
//! bridge runs against the plain opener.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{FormatAdapter, ReaderOpener};
use crate::error::AdapterError;

// =============================================================================
// Cache Directory Resolution
// =============================================================================

/// Validate the configured cache directory, returning it only if usable.
///
/// Each rejection is logged and memoization is skipped; the bridge never
/// fails to construct because of a bad cache directory.
pub fn resolve_cache_dir(candidate: Option<&Path>) -> Option<PathBuf> {
    let dir = match candidate {
        Some(dir) => dir,
        None => {
            debug!("no reader memo cache directory configured, skipping");
            return None;
        }
    };
    if !dir.exists() {
        warn!(path = %dir.display(), "memo cache directory does not exist, skipping");
        return None;
    }
    if !dir.is_dir() {
        warn!(path = %dir.display(), "memo cache path is not a directory, skipping");
        return None;
    }
    if fs::read_dir(dir).is_err() {
        warn!(path = %dir.display(), "cannot read from the memo cache directory, skipping");
        return None;
    }
    let probe = dir.join(".slide-bridge-write-probe");
    match fs::write(&probe, b"") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
        }
        Err(_) => {
            warn!(path = %dir.display(), "cannot write to the memo cache directory, skipping");
            return None;
        }
    }
    info!(path = %dir.display(), "activating reader memo cache");
    Some(dir.to_path_buf())
}

/// Select the opener once at construction: memoizing when the cache
/// directory is usable, the plain opener otherwise.
pub fn select_opener(
    inner: Box<dyn ReaderOpener>,
    cache_dir: Option<&Path>,
) -> Box<dyn ReaderOpener> {
    match resolve_cache_dir(cache_dir) {
        Some(dir) => Box::new(MemoizedOpener::new(inner, dir)),
        None => inner,
    }
}

// =============================================================================
// Memo Records
// =============================================================================

/// Sidecar record remembering which reader opened a file.
///
/// Keyed by file identity; a record whose size or mtime no longer matches
/// the file is stale and ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoRecord {
    path: String,
    file_size: u64,
    modified_ms: u64,
    format: String,
}

/// Size and mtime of the file, the staleness key.
fn file_identity(path: &Path) -> Option<(u64, u64)> {
    let meta = fs::metadata(path).ok()?;
    let modified_ms = meta
        .modified()
        .ok()?
        .duration_since(UNIX_EPOCH)
        .ok()?
        .as_millis() as u64;
    Some((meta.len(), modified_ms))
}

/// Memo file name: SHA-256 of the slide path, hex-encoded.
fn memo_file_name(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    format!("{}.memo.json", hex::encode(digest))
}

fn read_record(memo_path: &Path) -> Option<MemoRecord> {
    let text = fs::read_to_string(memo_path).ok()?;
    serde_json::from_str(&text).ok()
}

fn write_record(memo_path: &Path, record: &MemoRecord) {
    match serde_json::to_vec(record) {
        Ok(json) => {
            if let Err(e) = fs::write(memo_path, json) {
                warn!(path = %memo_path.display(), error = %e, "failed to write memo record");
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize memo record"),
    }
}

// =============================================================================
// Memoized Opener
// =============================================================================

/// [`ReaderOpener`] decorator that persists reader selection per file.
pub struct MemoizedOpener {
    inner: Box<dyn ReaderOpener>,
    cache_dir: PathBuf,
}

impl MemoizedOpener {
    /// Wrap `inner` with memo records stored in `cache_dir`.
    ///
    /// The directory must already be validated, see [`resolve_cache_dir`].
    pub fn new(inner: Box<dyn ReaderOpener>, cache_dir: PathBuf) -> Self {
        Self { inner, cache_dir }
    }

    fn memo_path(&self, path: &Path) -> PathBuf {
        self.cache_dir.join(memo_file_name(path))
    }

    /// Load the remembered format name, if fresh.
    fn load_hint(&self, path: &Path) -> Option<String> {
        let record = read_record(&self.memo_path(path))?;
        let (size, modified_ms) = file_identity(path)?;
        if record.file_size == size && record.modified_ms == modified_ms {
            debug!(path = %path.display(), format = %record.format, "memo hit");
            Some(record.format)
        } else {
            debug!(path = %path.display(), "memo record is stale, reprobing");
            None
        }
    }

    fn remember(&self, path: &Path, format: &str) {
        if let Some((file_size, modified_ms)) = file_identity(path) {
            let record = MemoRecord {
                path: path.to_string_lossy().into_owned(),
                file_size,
                modified_ms,
                format: format.to_string(),
            };
            write_record(&self.memo_path(path), &record);
        }
    }
}

impl ReaderOpener for MemoizedOpener {
    fn is_compatible(&self, path: &Path) -> Result<bool, AdapterError> {
        self.inner.is_compatible(path)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn FormatAdapter>, AdapterError> {
        let hint = self.load_hint(path);
        let adapter = self.inner.open_with_hint(path, hint.as_deref())?;
        self.remember(path, adapter.format_name());
        Ok(adapter)
    }

    fn open_with_hint(
        &self,
        path: &Path,
        hint: Option<&str>,
    ) -> Result<Box<dyn FormatAdapter>, AdapterError> {
        match hint {
            Some(_) => self.inner.open_with_hint(path, hint),
            None => self.open(path),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
