//! Ownership and mode rules applied to produced destinations.
//!
//! Rules are resolved to numeric ids when registered and kept in declaration order. Every rule whose
//! glob matches a path applies: chown always, chmod only when the rule carries a non-zero mode.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use nix::unistd::{Gid, Group, Uid, User, chown, getgid, getuid};
use tracing::{debug, warn};

use crate::error::{FsOpsError, FsOpsResult};
use crate::pattern::Pattern;

/// Parse an octal permission string such as `"0644"`, `"0o755"` or `"0"`.
///
/// # Errors
///
/// Returns [`FsOpsError::InvalidInput`] when the value is not octal or exceeds `0o7777`.
pub fn parse_octal_mode(field: &'static str, value: &str) -> FsOpsResult<u32> {
    let trimmed = value.trim();
    let digits = trimmed.trim_start_matches("0o");
    let digits = if digits.is_empty() { "0" } else { digits };
    let mode = u32::from_str_radix(digits, 8).map_err(|_| FsOpsError::InvalidInput {
        field,
        reason: "invalid_octal",
        value: Some(value.to_string()),
    })?;
    if mode > 0o7777 {
        return Err(FsOpsError::InvalidInput {
            field,
            reason: "mode_out_of_range",
            value: Some(value.to_string()),
        });
    }
    Ok(mode)
}

/// Resolved numeric owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ownership {
    /// Owning user id.
    pub uid: Uid,
    /// Owning group id.
    pub gid: Gid,
}

impl Ownership {
    /// Resolve user and group specifications; empty strings mean the current process ids.
    ///
    /// Numeric specifications are looked up as ids first and as names second.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::UserLookup`] or [`FsOpsError::GroupLookup`] when neither lookup succeeds.
    pub fn resolve(user: &str, group: &str) -> FsOpsResult<Self> {
        Ok(Self {
            uid: resolve_user(user.trim())?,
            gid: resolve_group(group.trim())?,
        })
    }
}

fn resolve_user(spec: &str) -> FsOpsResult<Uid> {
    if spec.is_empty() {
        return Ok(getuid());
    }
    let lookup_err = |source| FsOpsError::UserLookup {
        user: spec.to_string(),
        source,
    };
    if let Ok(id) = spec.parse::<u32>() {
        if let Ok(Some(user)) = User::from_uid(Uid::from_raw(id)) {
            return Ok(user.uid);
        }
    }
    match User::from_name(spec) {
        Ok(Some(user)) => Ok(user.uid),
        Ok(None) => Err(lookup_err(None)),
        Err(source_err) => Err(lookup_err(Some(source_err))),
    }
}

fn resolve_group(spec: &str) -> FsOpsResult<Gid> {
    if spec.is_empty() {
        return Ok(getgid());
    }
    let lookup_err = |source| FsOpsError::GroupLookup {
        group: spec.to_string(),
        source,
    };
    if let Ok(id) = spec.parse::<u32>() {
        if let Ok(Some(group)) = Group::from_gid(Gid::from_raw(id)) {
            return Ok(group.gid);
        }
    }
    match Group::from_name(spec) {
        Ok(Some(group)) => Ok(group.gid),
        Ok(None) => Err(lookup_err(None)),
        Err(source_err) => Err(lookup_err(Some(source_err))),
    }
}

/// A glob plus the ownership and mode to enforce on matching paths.
#[derive(Clone, Debug)]
pub struct PermissionRule {
    pattern: Pattern,
    ownership: Ownership,
    mode: u32,
}

impl PermissionRule {
    /// Build a rule from already-resolved parts. A `mode` of zero leaves permission bits alone.
    #[must_use]
    pub const fn new(pattern: Pattern, ownership: Ownership, mode: u32) -> Self {
        Self {
            pattern,
            ownership,
            mode,
        }
    }

    /// The rule's glob.
    #[must_use]
    pub const fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Mode applied by the rule (`0` = unchanged).
    #[must_use]
    pub const fn mode(&self) -> u32 {
        self.mode
    }

    fn apply(&self, full_path: &Path) -> FsOpsResult<()> {
        chown(full_path, Some(self.ownership.uid), Some(self.ownership.gid)).map_err(
            |source_err| FsOpsError::Chown {
                path: full_path.to_path_buf(),
                source: source_err,
            },
        )?;
        if self.mode != 0 {
            fs::set_permissions(full_path, fs::Permissions::from_mode(self.mode)).map_err(
                |source_err| FsOpsError::io("permissions.chmod", full_path, source_err),
            )?;
        }
        Ok(())
    }
}

/// Ordered rule set applied after each successful copy, render or directory creation.
#[derive(Clone, Debug, Default)]
pub struct PermissionEnforcer {
    rules: Vec<PermissionRule>,
}

impl PermissionEnforcer {
    /// Create an enforcer with no rules.
    #[must_use]
    pub const fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Compile `glob`, resolve `user`/`group` and append the rule.
    ///
    /// # Errors
    ///
    /// Fails fast on an invalid glob, mode or unknown user/group; no rule is added in that case.
    pub fn register(&mut self, glob: &str, user: &str, group: &str, mode: u32) -> FsOpsResult<()> {
        let pattern = Pattern::new(glob)?;
        let ownership = Ownership::resolve(user, group)?;
        debug!(
            glob = %pattern,
            uid = ownership.uid.as_raw(),
            gid = ownership.gid.as_raw(),
            mode = format_args!("{mode:o}"),
            "registered permission rule"
        );
        self.rules.push(PermissionRule::new(pattern, ownership, mode));
        Ok(())
    }

    /// Append an already-built rule.
    pub fn push(&mut self, rule: PermissionRule) {
        self.rules.push(rule);
    }

    /// Registered rules in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[PermissionRule] {
        &self.rules
    }

    /// Returns `true` when no rules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule matching `relative` to `full_path`, returning how many applied.
    ///
    /// Failing rules do not stop the remaining ones and successful applications are kept.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Permissions`] with the number of failed rules when any rule failed.
    pub fn apply(&self, relative: &str, full_path: &Path) -> FsOpsResult<usize> {
        let mut applied = 0usize;
        let mut failed = 0usize;
        for rule in self.rules.iter().filter(|rule| rule.pattern.matches(relative)) {
            match rule.apply(full_path) {
                Ok(()) => {
                    applied += 1;
                    debug!(
                        path = %full_path.display(),
                        glob = %rule.pattern,
                        "applied permission rule"
                    );
                }
                Err(err) => {
                    failed += 1;
                    warn!(
                        path = %full_path.display(),
                        glob = %rule.pattern,
                        error = %err,
                        "failed to apply permission rule"
                    );
                }
            }
        }
        if failed > 0 {
            return Err(FsOpsError::Permissions {
                path: full_path.to_path_buf(),
                failed,
            });
        }
        Ok(applied)
    }
}
