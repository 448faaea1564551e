//! Shell-glob patterns matched against relative paths.
//!
//! Supported syntax: `*` (any run, slashes included), `?` (one character), classes
//! `[...]` / `[!...]`, brace groups `{a,b}` and backslash escapes. Matching is
//! case-sensitive and always evaluated against `/`-separated relative paths.

use std::fmt;

use globset::{GlobBuilder, GlobMatcher};

use crate::error::{FsOpsError, FsOpsResult};

/// A compiled glob. Two patterns are equal when their source globs are equal.
#[derive(Clone)]
pub struct Pattern {
    glob: String,
    matcher: GlobMatcher,
}

impl Pattern {
    /// Compile `glob`; `*` also crosses `/` boundaries.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Glob`] when the glob is malformed, for example with an
    /// unbalanced character class.
    pub fn new(glob: &str) -> FsOpsResult<Self> {
        let matcher = GlobBuilder::new(glob)
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .map_err(|source_err| FsOpsError::glob("pattern.compile", glob, source_err))?
            .compile_matcher();
        Ok(Self {
            glob: glob.to_string(),
            matcher,
        })
    }

    /// Compile an optional glob, treating empty or whitespace-only input as "no pattern".
    ///
    /// # Errors
    ///
    /// Propagates compilation failures from [`Pattern::new`].
    pub fn optional(glob: Option<&str>) -> FsOpsResult<Option<Self>> {
        match glob {
            Some(value) if !value.trim().is_empty() => Self::new(value).map(Some),
            _ => Ok(None),
        }
    }

    /// Returns `true` when the whole of `path` matches the glob.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }

    /// The source glob.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.glob
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.glob == other.glob
    }
}

impl Eq for Pattern {}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.glob).finish()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.glob)
    }
}
