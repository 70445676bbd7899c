//! Scoped staging directories
//!
//! A [`StagingDir`] is removed when it goes out of scope, on success, on any
//! error path and while unwinding. [`StagingDir::close`] removes it eagerly
//! and reports the failure instead of swallowing it.

use crate::error::{CleanupError, StagingError};
use std::fs::{self, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir};

const STAGING_PREFIX: &str = "build-";

#[derive(Debug)]
pub struct StagingDir {
    dir: TempDir,
}

impl StagingDir {
    /// Create a fresh, uniquely named directory under `root`
    pub fn create(root: &Path) -> Result<Self, StagingError> {
        let dir = Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(root)
            .map_err(|source| StagingError {
                root: root.to_path_buf(),
                source,
            })?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn close(self) -> Result<(), CleanupError> {
        let path: PathBuf = self.dir.path().to_path_buf();
        unlock_dirs(&path);
        self.dir
            .close()
            .map_err(|source| CleanupError { path, source })
    }
}

/// Give the owner full access to every directory below `dir`.
///
/// Extracted directories keep their archived modes, and a read-only one
/// would stop an unprivileged process from removing its children.
fn unlock_dirs(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = fs::symlink_metadata(&path) else {
            continue;
        };
        if meta.is_dir() {
            let mode = meta.permissions().mode() | 0o700;
            let _ = fs::set_permissions(&path, Permissions::from_mode(mode));
            unlock_dirs(&path);
        }
    }
}
