//! Include/exclude path scoping
//!
//! Membership is path-segment exact match or descendance, never substring
//! matching: excluding `etc/os` covers `etc/os` and `etc/os/release` but not
//! `etc/os-release`.

use std::path::{Component, Path, PathBuf};

/// Two sets of normalized relative paths limiting what an operation may
/// touch. An empty include set puts the whole tree in scope.
#[derive(Debug, Clone, Default)]
pub struct PathScope {
    include: Vec<PathBuf>,
    exclude: Vec<PathBuf>,
}

impl PathScope {
    /// Build a scope from include and exclude sets. Entries are normalized:
    /// leading slashes and `.` components are stripped.
    #[must_use]
    pub fn new(include: &[PathBuf], exclude: &[PathBuf]) -> Self {
        Self {
            include: include.iter().filter_map(|p| normalize(p)).collect(),
            exclude: exclude.iter().filter_map(|p| normalize(p)).collect(),
        }
    }

    /// Scope with only exclusions; everything else is in scope
    #[must_use]
    pub fn exclude_only(exclude: &[PathBuf]) -> Self {
        Self::new(&[], exclude)
    }

    /// Whether `path` equals or descends from an exclude entry
    #[must_use]
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.exclude.iter().any(|e| path.starts_with(e))
    }

    /// Whether `path` equals or descends from an include entry (or the
    /// include set is empty)
    #[must_use]
    pub fn is_included(&self, path: &Path) -> bool {
        self.include.is_empty() || self.include.iter().any(|i| path.starts_with(i))
    }

    /// Whether an operation may read or mutate `path`
    #[must_use]
    pub fn in_scope(&self, path: &Path) -> bool {
        self.is_included(path) && !self.is_excluded(path)
    }

    /// Whether a tree walk may descend into `path`: true for in-scope paths
    /// and for ancestors of include entries (the walk has to pass through
    /// them to reach the scope).
    #[must_use]
    pub fn may_descend(&self, path: &Path) -> bool {
        if self.is_excluded(path) {
            return false;
        }
        self.include.is_empty()
            || self
                .include
                .iter()
                .any(|i| path.starts_with(i) || i.starts_with(path))
    }
}

/// Strip root and `.` components; drop entries that normalize to nothing
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for comp in path.components() {
        if let Component::Normal(c) = comp {
            out.push(c);
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}
