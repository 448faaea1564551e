//! Verbatim copy of source entries into the destination tree.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use tracing::debug;

use crate::error::{FsOpsError, FsOpsResult};

/// Directory mode used when neither the entry nor the operation supplies one.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Copy strategy with no-clobber semantics unless `force` is set.
#[derive(Clone, Copy, Debug)]
pub struct Replicator {
    force: bool,
    dir_mode: u32,
    file_mode: u32,
}

impl Replicator {
    /// Create a replicator. A mode of `0` means "no override".
    #[must_use]
    pub const fn new(force: bool, dir_mode: u32, file_mode: u32) -> Self {
        Self {
            force,
            dir_mode,
            file_mode,
        }
    }

    /// Whether existing destinations are overwritten and missing directories created.
    #[must_use]
    pub const fn force(&self) -> bool {
        self.force
    }

    /// Operation-level default directory mode (`0` = unset).
    #[must_use]
    pub const fn dir_mode(&self) -> u32 {
        self.dir_mode
    }

    /// Operation-level default file mode (`0` = unset).
    #[must_use]
    pub const fn file_mode(&self) -> u32 {
        self.file_mode
    }

    /// Create `dst` (and parents) when absent and `force` is set. Returns `true` if created.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Io`] if the directory cannot be created.
    pub fn mkdir(&self, dst: &Path, mode: u32) -> FsOpsResult<bool> {
        if !self.force || fs::symlink_metadata(dst).is_ok() {
            return Ok(false);
        }
        let mode = if self.dir_mode == 0 { mode } else { self.dir_mode };
        DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(dst)
            .map_err(|source_err| FsOpsError::io("replicate.mkdir", dst, source_err))?;
        fs::set_permissions(dst, fs::Permissions::from_mode(mode))
            .map_err(|source_err| FsOpsError::io("replicate.mkdir_chmod", dst, source_err))?;
        debug!(path = %dst.display(), mode = format_args!("{mode:o}"), "created directory");
        Ok(true)
    }

    /// Copy `src` to `dst`, returning the number of bytes written.
    ///
    /// An existing destination is left untouched (0 bytes) unless `force` is set; with `force` it is
    /// truncated and rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Io`] if the parent, the source or the destination cannot be accessed.
    pub fn copy_file(&self, src: &Path, dst: &Path, dir_mode: u32, file_mode: u32) -> FsOpsResult<u64> {
        if let Some(parent) = dst.parent() {
            self.mkdir(parent, dir_mode)?;
        }
        if !self.force && fs::symlink_metadata(dst).is_ok() {
            debug!(path = %dst.display(), "destination exists, skipping copy");
            return Ok(0);
        }
        let mode = if self.file_mode == 0 { file_mode } else { self.file_mode };

        let mut source =
            File::open(src).map_err(|source_err| FsOpsError::io("replicate.open", src, source_err))?;
        let mut destination = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(dst)
            .map_err(|source_err| FsOpsError::io("replicate.create", dst, source_err))?;
        let bytes = io::copy(&mut source, &mut destination)
            .map_err(|source_err| FsOpsError::io("replicate.copy", dst, source_err))?;
        fs::set_permissions(dst, fs::Permissions::from_mode(mode))
            .map_err(|source_err| FsOpsError::io("replicate.chmod", dst, source_err))?;
        debug!(
            source = %src.display(),
            destination = %dst.display(),
            bytes,
            "copied file"
        );
        Ok(bytes)
    }
}
