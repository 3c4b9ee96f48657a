//! Content-addressed activity file cache
//!
//! Blobs live flat under one cache root, named `<fingerprint>.<format>`, so a
//! file downloaded once from a source can be fanned out to every target. The
//! registry owns the index rows pointing here; a cache hit requires both the
//! row and the blob (see `SyncDatabase::get_cached_file`).

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::models::FileFormat;

/// Blob store under a single cache root directory
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Open the cache, creating the root directory if needed
    pub fn new<P: AsRef<Path>>(root: P) -> std::io::Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the blob for (fingerprint, format) lives or would live
    pub fn path_for(&self, fingerprint: &str, format: FileFormat) -> PathBuf {
        self.root.join(format!("{}.{}", fingerprint, format.extension()))
    }

    /// First blob present on disk for the fingerprint, in preference order.
    ///
    /// Bypasses the registry index; used only for diagnostics and tests. The
    /// orchestrator resolves hits through the registry so row and blob are
    /// checked together.
    pub fn existing_blob(&self, fingerprint: &str) -> Option<(FileFormat, PathBuf)> {
        FileFormat::all().iter().find_map(|format| {
            let path = self.path_for(fingerprint, *format);
            path.exists().then_some((*format, path))
        })
    }

    /// Best-effort removal; a missing blob is fine, a stuck one logs
    pub fn remove_blob(&self, fingerprint: &str, format: FileFormat) {
        let path = self.path_for(fingerprint, format);
        if !path.exists() {
            return;
        }
        match fs::remove_file(&path) {
            Ok(()) => debug!("removed cache blob {}", path.display()),
            Err(e) => warn!("failed to remove cache blob {}: {}", path.display(), e),
        }
    }

    /// Number of blobs and total bytes currently on disk
    pub fn disk_usage(&self) -> std::io::Result<(usize, u64)> {
        let mut files = 0usize;
        let mut bytes = 0u64;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if metadata.is_file() {
                files += 1;
                bytes += metadata.len();
            }
        }
        Ok((files, bytes))
    }
}
