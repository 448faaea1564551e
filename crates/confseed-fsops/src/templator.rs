//! Template rendering of conditions, command lines and file contents.
//!
//! # Design
//! - A single [`TemplateEngine`] carries the registered function library for every render site.
//! - File output is rendered to a temporary file beside the destination and renamed into place, so a
//!   failed render never leaves a truncated destination behind.

use std::fs::{self, DirBuilder};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::Path;

use minijinja::value::{Value, ValueKind};
use minijinja::{AutoEscape, Environment, ErrorKind, Output, State};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::context::TemplateContext;
use crate::error::{FsOpsError, FsOpsResult};
use crate::functions::register_functions;
use crate::replicator::DEFAULT_DIR_MODE;

/// Template environment with the function library registered.
#[derive(Debug)]
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Build an engine: no auto-escaping, trailing newlines preserved, booleans in lowercase.
    #[must_use]
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);
        env.set_formatter(format_value);
        register_functions(&mut env);
        Self { env }
    }

    /// Render `source` under `name` against `ctx`.
    ///
    /// # Errors
    ///
    /// Returns the template error on a parse or execution failure.
    pub fn render_str<S>(&self, name: &str, source: &str, ctx: &S) -> Result<String, minijinja::Error>
    where
        S: serde::Serialize,
    {
        self.env.render_named_str(name, source, ctx)
    }

    /// Render a condition, command line or other inline template for one entry.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Render`] carrying the entry's source path.
    pub fn render_inline(
        &self,
        name: &'static str,
        source: &str,
        ctx: &TemplateContext<'_>,
    ) -> FsOpsResult<String> {
        self.render_str(name, source, ctx)
            .map_err(|source_err| FsOpsError::render(name, ctx.source_full(), source_err))
    }
}

/// Output formatter: `true`/`false` for booleans, the stock formatting for everything else.
fn format_value(
    out: &mut Output<'_>,
    state: &State<'_, '_>,
    value: &Value,
) -> Result<(), minijinja::Error> {
    if value.kind() == ValueKind::Bool {
        out.write_str(if value.is_true() { "true" } else { "false" })?;
        return Ok(());
    }
    minijinja::escape_formatter(out, state, value)
}

/// Writes rendered files into the destination tree.
#[derive(Clone, Copy, Debug)]
pub struct Templator {
    dir_mode: u32,
    file_mode: u32,
}

impl Templator {
    /// Create a templator. A mode of `0` means "no override".
    #[must_use]
    pub const fn new(dir_mode: u32, file_mode: u32) -> Self {
        Self {
            dir_mode,
            file_mode,
        }
    }

    fn effective_dir_mode(&self) -> u32 {
        if self.dir_mode == 0 {
            DEFAULT_DIR_MODE
        } else {
            self.dir_mode
        }
    }

    /// Create the destination directory for a directory entry using the default mode.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Io`] if the directory cannot be created.
    pub fn create_dir(&self, dst: &Path) -> FsOpsResult<bool> {
        if fs::symlink_metadata(dst).is_ok() {
            return Ok(false);
        }
        let mode = self.effective_dir_mode();
        DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(dst)
            .map_err(|source_err| FsOpsError::io("render.mkdir", dst, source_err))?;
        fs::set_permissions(dst, fs::Permissions::from_mode(mode))
            .map_err(|source_err| FsOpsError::io("render.mkdir_chmod", dst, source_err))?;
        debug!(path = %dst.display(), "created directory");
        Ok(true)
    }

    /// Render the source file of `ctx` to its destination, returning the bytes written.
    ///
    /// The destination is always replaced; `source_mode` is used unless a default file mode is set.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Render`] on template failures and [`FsOpsError::Io`] on filesystem
    /// failures. The destination is untouched in both cases.
    pub fn render_file(
        &self,
        engine: &TemplateEngine,
        ctx: &TemplateContext<'_>,
        source_mode: u32,
    ) -> FsOpsResult<u64> {
        let Some(destination) = ctx.destination_full() else {
            return Err(FsOpsError::InvalidInput {
                field: "destination",
                reason: "render requires a destination",
                value: Some(ctx.source_full_path.clone()),
            });
        };
        let source = ctx.source_full();
        let raw =
            fs::read(source).map_err(|source_err| FsOpsError::io("render.read", source, source_err))?;
        let body = String::from_utf8(raw).map_err(|utf8_err| {
            let reason = minijinja::Error::new(
                ErrorKind::InvalidOperation,
                "template source is not valid UTF-8",
            )
            .with_source(utf8_err);
            FsOpsError::render("render.decode", source, reason)
        })?;
        let rendered = engine
            .render_str(&ctx.source, &body, ctx)
            .map_err(|source_err| FsOpsError::render("render.file", source, source_err))?;

        let parent = destination.parent().unwrap_or_else(|| Path::new("."));
        self.create_dir(parent)?;
        let mode = if self.file_mode == 0 {
            source_mode
        } else {
            self.file_mode
        };

        let mut staged = NamedTempFile::new_in(parent)
            .map_err(|source_err| FsOpsError::io("render.stage", parent, source_err))?;
        staged
            .write_all(rendered.as_bytes())
            .map_err(|source_err| FsOpsError::io("render.write", staged.path(), source_err))?;
        fs::set_permissions(staged.path(), fs::Permissions::from_mode(mode))
            .map_err(|source_err| FsOpsError::io("render.chmod", staged.path(), source_err))?;
        staged
            .persist(destination)
            .map_err(|persist_err| FsOpsError::io("render.persist", destination, persist_err.error))?;

        debug!(
            source = %source.display(),
            destination = %destination.display(),
            bytes = rendered.len(),
            "rendered template"
        );
        Ok(rendered.len() as u64)
    }
}
