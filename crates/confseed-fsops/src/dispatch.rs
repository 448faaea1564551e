//! Generic per-entry dispatch over a scanned inventory.
//!
//! # Design
//! - Strategies embed a [`Selection`] (selector + accounting) and implement [`ItemAction`].
//! - A failing entry is recorded and the pass continues; the aggregate error is returned at the end.
//! - Directories are visited before files, each in sorted path order.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use regex::Regex;
use tracing::error;

use crate::error::{FsOpsError, FsOpsResult};
use crate::scan::{Inventory, InventoryEntry};

/// Which inventory kinds an action is interested in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ItemKind {
    /// Directories and files.
    Any,
    /// Files only.
    #[default]
    File,
    /// Directories only.
    Directory,
}

impl ItemKind {
    const fn wants_dirs(self) -> bool {
        matches!(self, Self::Any | Self::Directory)
    }

    const fn wants_files(self) -> bool {
        matches!(self, Self::Any | Self::File)
    }
}

/// Regex selection plus an explicit exclusion set.
#[derive(Clone, Debug)]
pub struct Selector {
    regex: Regex,
    exclusions: HashSet<String>,
    kind: ItemKind,
}

impl Selector {
    /// Compile `regex` (an unanchored regular expression, not a glob).
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Pattern`] if the expression does not compile.
    pub fn new<I>(regex: &str, exclusions: I, kind: ItemKind) -> FsOpsResult<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let compiled = Regex::new(regex)
            .map_err(|source_err| FsOpsError::pattern("selector.compile", regex, source_err))?;
        Ok(Self {
            regex: compiled,
            exclusions: exclusions.into_iter().collect(),
            kind,
        })
    }

    /// Kind filter of this selector.
    #[must_use]
    pub const fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Returns `true` if `path` is not excluded and matches the regex.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        !self.exclusions.contains(path) && self.regex.is_match(path)
    }
}

/// Per-pass bookkeeping of processed paths and failures.
#[derive(Debug, Default)]
pub struct Accounting {
    processed: Vec<String>,
    failures: BTreeMap<String, FsOpsError>,
}

impl Accounting {
    /// Record that `path` was handed to the action.
    pub fn record_processed(&mut self, path: &str) {
        self.processed.push(path.to_string());
    }

    /// Record a failure for `path`.
    pub fn record_failure(&mut self, path: &str, err: FsOpsError) {
        self.failures.insert(path.to_string(), err);
    }

    /// Paths handed to the action, in visit order (failures included).
    #[must_use]
    pub fn processed(&self) -> &[String] {
        &self.processed
    }

    /// Failures keyed by relative path.
    #[must_use]
    pub const fn failures(&self) -> &BTreeMap<String, FsOpsError> {
        &self.failures
    }

    /// Consume the accounting, returning processed paths and failures.
    #[must_use]
    pub fn into_parts(self) -> (Vec<String>, BTreeMap<String, FsOpsError>) {
        (self.processed, self.failures)
    }
}

/// Selector and accounting shared by every strategy.
#[derive(Debug)]
pub struct Selection {
    selector: Selector,
    accounting: Accounting,
}

impl Selection {
    /// Wrap a selector with empty accounting.
    #[must_use]
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            accounting: Accounting::default(),
        }
    }

    /// The selector.
    #[must_use]
    pub const fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Accumulated accounting.
    #[must_use]
    pub const fn accounting(&self) -> &Accounting {
        &self.accounting
    }

    /// Mutable accounting.
    pub const fn accounting_mut(&mut self) -> &mut Accounting {
        &mut self.accounting
    }

    /// Take the accounting, leaving it empty.
    pub fn take_accounting(&mut self) -> Accounting {
        std::mem::take(&mut self.accounting)
    }
}

/// Capability interface implemented by dispatch strategies.
pub trait ItemAction {
    /// Shared selection state.
    fn selection(&self) -> &Selection;

    /// Mutable shared selection state.
    fn selection_mut(&mut self) -> &mut Selection;

    /// Decide whether the entry at `path` is handed to [`ItemAction::apply`].
    fn matches(&self, path: &str, _entry: &InventoryEntry) -> bool {
        self.selection().selector().matches(path)
    }

    /// Act on one entry.
    ///
    /// # Errors
    ///
    /// Any error is recorded against `path`; the pass continues.
    fn apply(&mut self, root: &Path, path: &str, entry: &InventoryEntry) -> FsOpsResult<()>;

    /// Called after a successful [`ItemAction::apply`].
    fn on_success(&mut self, path: &str) {
        self.selection_mut().accounting_mut().record_processed(path);
    }

    /// Called after a failed [`ItemAction::apply`].
    fn on_failure(&mut self, path: &str, err: FsOpsError) {
        let accounting = self.selection_mut().accounting_mut();
        accounting.record_failure(path, err);
        accounting.record_processed(path);
    }
}

impl Inventory {
    /// Hand every selected entry to `action`, directories first.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Dispatch`] naming every failing path when at least one entry failed.
    pub fn dispatch<A>(&self, action: &mut A) -> FsOpsResult<()>
    where
        A: ItemAction + ?Sized,
    {
        let kind = action.selection().selector().kind();
        let mut failed = Vec::new();
        let groups = [
            (kind.wants_dirs(), &self.dirs),
            (kind.wants_files(), &self.files),
        ];
        for (wanted, entries) in groups {
            if !wanted {
                continue;
            }
            for (path, entry) in entries {
                if !action.matches(path, entry) {
                    continue;
                }
                match action.apply(self.root(), path, entry) {
                    Ok(()) => action.on_success(path),
                    Err(err) => {
                        error!(
                            path = %path,
                            kind = entry.kind().as_str(),
                            error = %err,
                            "action failed for entry"
                        );
                        failed.push(path.clone());
                        action.on_failure(path, err);
                    }
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            failed.sort();
            Err(FsOpsError::Dispatch { failed })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::Scanner;
    use confseed_test_support::fixtures::TreeFixture;
    use std::error::Error;

    type TestResult<T> = Result<T, Box<dyn Error>>;

    struct Recorder {
        selection: Selection,
        seen: Vec<String>,
        fail_on: Option<&'static str>,
    }

    impl Recorder {
        fn new(selector: Selector) -> Self {
            Self {
                selection: Selection::new(selector),
                seen: Vec::new(),
                fail_on: None,
            }
        }
    }

    impl ItemAction for Recorder {
        fn selection(&self) -> &Selection {
            &self.selection
        }

        fn selection_mut(&mut self) -> &mut Selection {
            &mut self.selection
        }

        fn apply(&mut self, _root: &Path, path: &str, _entry: &InventoryEntry) -> FsOpsResult<()> {
            self.seen.push(path.to_string());
            if self.fail_on == Some(path) {
                return Err(FsOpsError::InvalidInput {
                    field: "path",
                    reason: "forced failure",
                    value: Some(path.to_string()),
                });
            }
            Ok(())
        }
    }

    fn sample_inventory(tree: &TreeFixture) -> TestResult<Inventory> {
        tree.write("a.conf", "")?;
        tree.write("b.conf", "")?;
        tree.write("sub/c.conf", "")?;
        tree.write("sub/d.txt", "")?;
        Ok(Scanner::default().scan(tree.path())?)
    }

    #[test]
    fn excluded_paths_are_never_applied() -> TestResult<()> {
        let tree = TreeFixture::new()?;
        let inventory = sample_inventory(&tree)?;
        let selector = Selector::new(
            ".*",
            ["a.conf".to_string(), "sub".to_string()],
            ItemKind::Any,
        )?;
        let mut recorder = Recorder::new(selector);
        inventory.dispatch(&mut recorder)?;

        assert_eq!(recorder.seen, vec!["b.conf", "sub/c.conf", "sub/d.txt"]);
        assert_eq!(recorder.selection.accounting().processed().len(), 3);
        Ok(())
    }

    #[test]
    fn kind_filter_limits_visited_entries() -> TestResult<()> {
        let tree = TreeFixture::new()?;
        let inventory = sample_inventory(&tree)?;

        let mut dirs = Recorder::new(Selector::new(".*", Vec::new(), ItemKind::Directory)?);
        inventory.dispatch(&mut dirs)?;
        assert_eq!(dirs.seen, vec!["sub"]);

        let mut files = Recorder::new(Selector::new(r"\.conf$", Vec::new(), ItemKind::File)?);
        inventory.dispatch(&mut files)?;
        assert_eq!(files.seen, vec!["a.conf", "b.conf", "sub/c.conf"]);
        Ok(())
    }

    #[test]
    fn failures_are_aggregated_and_pass_continues() -> TestResult<()> {
        let tree = TreeFixture::new()?;
        let inventory = sample_inventory(&tree)?;
        let mut recorder = Recorder::new(Selector::new(".*", Vec::new(), ItemKind::File)?);
        recorder.fail_on = Some("b.conf");

        let result = inventory.dispatch(&mut recorder);
        match result {
            Err(FsOpsError::Dispatch { failed }) => assert_eq!(failed, vec!["b.conf"]),
            other => return Err(format!("unexpected dispatch result: {other:?}").into()),
        }
        assert_eq!(recorder.seen.len(), 4);
        let accounting = recorder.selection.take_accounting();
        assert!(accounting.failures().contains_key("b.conf"));
        assert_eq!(accounting.processed().len(), 4);
        Ok(())
    }

    #[test]
    fn invalid_selector_regex_is_rejected() {
        let result = Selector::new("(", Vec::new(), ItemKind::Any);
        assert!(matches!(result, Err(FsOpsError::Pattern { .. })));
    }
}
