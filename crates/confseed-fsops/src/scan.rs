//! Single-pass source tree scanner producing an immutable inventory.
//!
//! # Design
//! - Directories are filtered before descent: a skipped directory prunes its subtree.
//! - Exclude patterns always win over include patterns.
//! - Only directories, regular files and symlinks are inventoried; other node types are ignored.

use std::collections::BTreeMap;
use std::fs::Metadata;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{FsOpsError, FsOpsResult};
use crate::pattern::Pattern;

const S_IFMT: u32 = 0o170_000;
const S_IFLNK: u32 = 0o120_000;

/// Classification of an inventoried node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// A directory.
    Directory,
    /// A regular file or a symlink.
    File,
    /// Anything else (sockets, devices, fifos).
    Other,
}

impl EntryKind {
    /// Stable label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::File => "file",
            Self::Other => "other",
        }
    }
}

/// Metadata retained for every inventoried path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InventoryEntry {
    kind: EntryKind,
    mode: u32,
    size: u64,
}

impl InventoryEntry {
    /// Build an entry from its parts.
    #[must_use]
    pub const fn new(kind: EntryKind, mode: u32, size: u64) -> Self {
        Self { kind, mode, size }
    }

    fn from_metadata(metadata: &Metadata) -> Self {
        let file_type = metadata.file_type();
        let kind = if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() || file_type.is_symlink() {
            EntryKind::File
        } else {
            EntryKind::Other
        };
        Self::new(kind, metadata.mode(), metadata.len())
    }

    /// Kind of node.
    #[must_use]
    pub const fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Returns `true` for directories.
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    /// Returns `true` when the node was a symlink at scan time.
    #[must_use]
    pub const fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    /// Raw `st_mode`, file type bits included.
    #[must_use]
    pub const fn mode(&self) -> u32 {
        self.mode
    }

    /// Permission bits only (`0o7777` mask).
    #[must_use]
    pub const fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    /// Size in bytes at scan time.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// `ls`-style mode string, e.g. `drwxr-xr-x` or `-rw-r--r--`.
    #[must_use]
    pub fn mode_string(&self) -> String {
        let type_char = match self.kind {
            EntryKind::Directory => 'd',
            EntryKind::File if self.is_symlink() => 'L',
            EntryKind::File => '-',
            EntryKind::Other => '?',
        };
        let mut out = String::with_capacity(10);
        out.push(type_char);
        for shift in [6u32, 3, 0] {
            let bits = (self.mode >> shift) & 0o7;
            out.push(if bits & 0o4 == 0 { '-' } else { 'r' });
            out.push(if bits & 0o2 == 0 { '-' } else { 'w' });
            out.push(if bits & 0o1 == 0 { '-' } else { 'x' });
        }
        out
    }
}

/// Include/exclude filters applied while scanning.
#[derive(Clone, Debug, Default)]
pub struct ScanFilters {
    /// Directories must match to be kept (and descended into).
    pub include_dirs: Option<Pattern>,
    /// Directories matching are skipped and pruned.
    pub exclude_dirs: Option<Pattern>,
    /// Files must match to be kept.
    pub include_files: Option<Pattern>,
    /// Files matching are skipped.
    pub exclude_files: Option<Pattern>,
}

impl ScanFilters {
    /// Compile filters from optional glob strings; empty strings mean "no filter".
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Glob`] if any glob fails to compile.
    pub fn from_globs(
        include_dirs: Option<&str>,
        exclude_dirs: Option<&str>,
        include_files: Option<&str>,
        exclude_files: Option<&str>,
    ) -> FsOpsResult<Self> {
        Ok(Self {
            include_dirs: Pattern::optional(include_dirs)?,
            exclude_dirs: Pattern::optional(exclude_dirs)?,
            include_files: Pattern::optional(include_files)?,
            exclude_files: Pattern::optional(exclude_files)?,
        })
    }

    fn keep(include: Option<&Pattern>, exclude: Option<&Pattern>, path: &str) -> Result<(), String> {
        if let Some(pattern) = exclude.filter(|pattern| pattern.matches(path)) {
            return Err(format!("matches exclude glob '{pattern}'"));
        }
        if let Some(pattern) = include.filter(|pattern| !pattern.matches(path)) {
            return Err(format!("does not match include glob '{pattern}'"));
        }
        Ok(())
    }
}

/// Walks a root directory and classifies its entries.
#[derive(Clone, Debug, Default)]
pub struct Scanner {
    filters: ScanFilters,
}

impl Scanner {
    /// Construct a scanner with the supplied filters.
    #[must_use]
    pub const fn new(filters: ScanFilters) -> Self {
        Self { filters }
    }

    /// Walk `root` once, pre-order, and build a fresh inventory.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Scan`] on the first node that cannot be visited.
    pub fn scan(&self, root: &Path) -> FsOpsResult<Inventory> {
        let mut inventory = Inventory::empty(root);
        let mut walker = WalkDir::new(root).min_depth(1).follow_links(false).into_iter();

        while let Some(entry) = walker.next() {
            let entry = entry.map_err(|source_err| {
                let path = source_err
                    .path()
                    .map_or_else(|| root.to_path_buf(), Path::to_path_buf);
                FsOpsError::scan("scan.walk", path, source_err)
            })?;
            let relative = relative_path(root, entry.path())?;
            let file_type = entry.file_type();

            if file_type.is_dir() {
                if let Err(reason) = ScanFilters::keep(
                    self.filters.include_dirs.as_ref(),
                    self.filters.exclude_dirs.as_ref(),
                    &relative,
                ) {
                    debug!(path = %relative, reason = %reason, "skipping directory");
                    inventory.skipped_dirs.push(relative);
                    walker.skip_current_dir();
                    continue;
                }
                let metadata = entry
                    .metadata()
                    .map_err(|source_err| FsOpsError::scan("scan.metadata", entry.path(), source_err))?;
                debug!(path = %relative, "adding directory");
                inventory
                    .dirs
                    .insert(relative, InventoryEntry::from_metadata(&metadata));
            } else if file_type.is_file() || file_type.is_symlink() {
                if let Err(reason) = ScanFilters::keep(
                    self.filters.include_files.as_ref(),
                    self.filters.exclude_files.as_ref(),
                    &relative,
                ) {
                    debug!(path = %relative, reason = %reason, "skipping file");
                    inventory.skipped_files.push(relative);
                    continue;
                }
                let metadata = entry
                    .metadata()
                    .map_err(|source_err| FsOpsError::scan("scan.metadata", entry.path(), source_err))?;
                debug!(path = %relative, "adding file");
                inventory
                    .files
                    .insert(relative, InventoryEntry::from_metadata(&metadata));
            } else {
                debug!(
                    path = %relative,
                    socket = file_type.is_socket(),
                    "skipping non regular file"
                );
            }
        }

        Ok(inventory)
    }
}

/// Immutable snapshot of a scanned tree, keyed by `/`-separated relative paths.
#[derive(Clone, Debug)]
pub struct Inventory {
    root: PathBuf,
    pub(crate) dirs: BTreeMap<String, InventoryEntry>,
    pub(crate) files: BTreeMap<String, InventoryEntry>,
    skipped_dirs: Vec<String>,
    skipped_files: Vec<String>,
}

impl Inventory {
    fn empty(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            dirs: BTreeMap::new(),
            files: BTreeMap::new(),
            skipped_dirs: Vec::new(),
            skipped_files: Vec::new(),
        }
    }

    /// Root the inventory was scanned from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up an inventoried directory or file.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&InventoryEntry> {
        self.dirs.get(path).or_else(|| self.files.get(path))
    }

    /// Sorted relative paths of kept directories.
    #[must_use]
    pub fn list_dirs(&self) -> Vec<String> {
        self.dirs.keys().cloned().collect()
    }

    /// Sorted relative paths of kept files.
    #[must_use]
    pub fn list_files(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    /// Sorted relative paths skipped by the filters.
    #[must_use]
    pub fn list_skipped(&self, dirs: bool) -> Vec<String> {
        let mut items = if dirs {
            self.skipped_dirs.clone()
        } else {
            self.skipped_files.clone()
        };
        items.sort();
        items
    }
}

fn relative_path(root: &Path, path: &Path) -> FsOpsResult<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| FsOpsError::InvalidInput {
            field: "scan_path",
            reason: "strip_prefix",
            value: Some(path.to_string_lossy().into_owned()),
        })?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use confseed_test_support::fixtures::TreeFixture;
    use std::error::Error;

    type TestResult<T> = Result<T, Box<dyn Error>>;

    fn sample_tree() -> TestResult<TreeFixture> {
        let tree = TreeFixture::new()?;
        tree.write("app.conf.tpl", "a")?;
        tree.write("readme.md", "b")?;
        tree.write("nested/inner.conf.tpl", "c")?;
        tree.write("secret/key.tpl", "d")?;
        tree.write("secret/deeper/other.tpl", "e")?;
        tree.mkdir("empty")?;
        Ok(tree)
    }

    #[test]
    fn scan_without_filters_inventories_everything() -> TestResult<()> {
        let tree = sample_tree()?;
        let inventory = Scanner::default().scan(tree.path())?;
        assert_eq!(
            inventory.list_dirs(),
            vec!["empty", "nested", "secret", "secret/deeper"]
        );
        assert_eq!(
            inventory.list_files(),
            vec![
                "app.conf.tpl",
                "nested/inner.conf.tpl",
                "readme.md",
                "secret/deeper/other.tpl",
                "secret/key.tpl"
            ]
        );
        assert!(inventory.list_skipped(true).is_empty());
        Ok(())
    }

    #[test]
    fn excluded_directory_is_pruned_even_when_files_match() -> TestResult<()> {
        let tree = sample_tree()?;
        let filters = ScanFilters::from_globs(None, Some("secret"), Some("*.tpl"), None)?;
        let inventory = Scanner::new(filters).scan(tree.path())?;

        assert_eq!(inventory.list_skipped(true), vec!["secret"]);
        assert!(
            inventory
                .list_files()
                .iter()
                .all(|path| !path.starts_with("secret/")),
            "pruned directory must not contribute files"
        );
        assert!(inventory.get("secret/deeper").is_none());
        assert_eq!(inventory.list_skipped(false), vec!["readme.md"]);
        Ok(())
    }

    #[test]
    fn exclude_takes_precedence_over_include() -> TestResult<()> {
        let tree = sample_tree()?;
        let filters =
            ScanFilters::from_globs(None, None, Some("*.tpl"), Some("nested/*"))?;
        let inventory = Scanner::new(filters).scan(tree.path())?;
        assert!(inventory.get("nested/inner.conf.tpl").is_none());
        assert!(inventory.get("app.conf.tpl").is_some());
        Ok(())
    }

    #[test]
    fn include_dir_filter_prunes_non_matching_directories() -> TestResult<()> {
        let tree = sample_tree()?;
        let filters = ScanFilters::from_globs(Some("nested"), None, None, None)?;
        let inventory = Scanner::new(filters).scan(tree.path())?;
        assert_eq!(inventory.list_dirs(), vec!["nested"]);
        assert_eq!(inventory.list_skipped(true), vec!["empty", "secret"]);
        assert!(inventory.get("nested/inner.conf.tpl").is_some());
        Ok(())
    }

    #[test]
    fn entries_capture_metadata() -> TestResult<()> {
        let tree = sample_tree()?;
        let inventory = Scanner::default().scan(tree.path())?;
        let file = inventory
            .get("readme.md")
            .ok_or_else(|| std::io::Error::other("missing readme"))?;
        assert_eq!(file.kind(), EntryKind::File);
        assert_eq!(file.size(), 1);
        assert!(file.mode_string().starts_with('-'));
        let dir = inventory
            .get("nested")
            .ok_or_else(|| std::io::Error::other("missing nested"))?;
        assert!(dir.is_dir());
        assert!(dir.mode_string().starts_with('d'));
        Ok(())
    }

    #[test]
    fn scanning_missing_root_fails() -> TestResult<()> {
        let tree = TreeFixture::new()?;
        let result = Scanner::default().scan(&tree.path().join("missing"));
        assert!(matches!(result, Err(FsOpsError::Scan { .. })));
        Ok(())
    }

    #[test]
    fn mode_string_renders_permission_bits() {
        let entry = InventoryEntry::new(EntryKind::File, 0o100_640, 0);
        assert_eq!(entry.mode_string(), "-rw-r-----");
        assert_eq!(entry.permissions(), 0o640);
        let link = InventoryEntry::new(EntryKind::File, 0o120_777, 0);
        assert!(link.is_symlink());
        assert_eq!(link.mode_string(), "Lrwxrwxrwx");
    }
}
