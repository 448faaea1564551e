//! Test fixtures and environment helpers.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tempfile::TempDir;

/// A temporary directory tree removed on drop.
#[derive(Debug)]
pub struct TreeFixture {
    dir: TempDir,
}

impl TreeFixture {
    /// Create an empty temporary tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("failed to create temporary tree")?;
        Ok(Self { dir })
    }

    /// Root of the tree.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of `relative` inside the tree.
    #[must_use]
    pub fn join(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write `contents` to `relative`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory or the file cannot be written.
    pub fn write(&self, relative: &str, contents: &str) -> Result<PathBuf> {
        let path = self.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Create `relative` and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn mkdir(&self, relative: &str) -> Result<PathBuf> {
        let path = self.join(relative);
        fs::create_dir_all(&path).with_context(|| format!("failed to create {}", path.display()))?;
        Ok(path)
    }

    /// Set permission bits on `relative`.
    ///
    /// # Errors
    ///
    /// Returns an error if the permissions cannot be changed.
    pub fn chmod(&self, relative: &str, mode: u32) -> Result<()> {
        let path = self.join(relative);
        fs::set_permissions(&path, fs::Permissions::from_mode(mode))
            .with_context(|| format!("failed to chmod {}", path.display()))
    }

    /// Read `relative` as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read(&self, relative: &str) -> Result<String> {
        let path = self.join(relative);
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))
    }

    /// Permission bits of `relative`.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata cannot be read.
    pub fn mode(&self, relative: &str) -> Result<u32> {
        let path = self.join(relative);
        let metadata =
            fs::metadata(&path).with_context(|| format!("failed to stat {}", path.display()))?;
        Ok(metadata.permissions().mode() & 0o7777)
    }

    /// Returns `true` if `relative` exists (symlinks are not followed).
    #[must_use]
    pub fn exists(&self, relative: &str) -> bool {
        fs::symlink_metadata(self.join(relative)).is_ok()
    }
}

/// Returns `true` if `program` can be spawned from `PATH`.
#[must_use]
pub fn command_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .output()
        .is_ok()
}
