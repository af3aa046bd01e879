//! Ignore rules shared by the tree builder, the selector and the loader.
//!
//! The built-in rules use gitignore semantics: a trailing `/` marks a
//! directory pattern that excludes everything beneath a matching directory
//! at any depth. Extra caller patterns are plain globs.

use crate::error::{Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

/// Version-control, build, dependency and temp-file patterns.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "node_modules/",
    "target/",
    "__pycache__/",
    ".git/",
    "*.pyc",
    "*.pyo",
    "*.pyd",
    ".Python",
    "build/",
    "develop-eggs/",
    "dist/",
    "downloads/",
    "eggs/",
    ".eggs/",
    "lib/",
    "lib64/",
    "*.so",
    "*.dylib",
    "*.dll",
    ".venv/",
    "venv/",
    "ENV/",
    ".DS_Store",
    "Thumbs.db",
    "*.log",
    "*.tmp",
    "*.temp",
];

/// Compiled ignore rules.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    rules: Gitignore,
    extra: Option<GlobSet>,
}

impl IgnoreFilter {
    /// Builds a filter from gitignore-style lines plus extra glob patterns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if any line or glob fails to compile.
    pub fn new<S: AsRef<str>>(ignore_lines: &[S], extra_globs: &[S]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(".");
        for line in ignore_lines {
            let line = line.as_ref();
            builder
                .add_line(None, line)
                .map_err(|e| Error::invalid_pattern(line, e.to_string()))?;
        }
        let rules = builder
            .build()
            .map_err(|e| Error::invalid_pattern("<ignore rules>", e.to_string()))?;

        let extra = if extra_globs.is_empty() {
            None
        } else {
            Some(Self::build_globset(extra_globs)?)
        };

        Ok(Self { rules, extra })
    }

    /// Builds the filter with [`DEFAULT_IGNORE_PATTERNS`] and extra globs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if an extra glob fails to compile.
    pub fn with_defaults<S: AsRef<str>>(extra_globs: &[S]) -> Result<Self> {
        let extra: Vec<&str> = extra_globs.iter().map(AsRef::as_ref).collect();
        Self::new(DEFAULT_IGNORE_PATTERNS, extra.as_slice())
    }

    fn build_globset<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob =
                Glob::new(pattern).map_err(|e| Error::invalid_pattern(pattern, e.to_string()))?;
            builder.add(glob);
        }

        builder
            .build()
            .map_err(|e| Error::invalid_pattern("<glob set>", e.to_string()))
    }

    /// Returns true if a relative file path is excluded.
    ///
    /// The path is normalized first, so `./src\\a.js` and `src/a.js` agree.
    #[must_use]
    pub fn is_ignored(&self, path: &str) -> bool {
        let normalized = normalize_path(path);
        if normalized.is_empty() {
            return true;
        }
        let candidate = Path::new(&normalized);

        if self
            .rules
            .matched_path_or_any_parents(candidate, false)
            .is_ignore()
        {
            return true;
        }

        self.extra
            .as_ref()
            .is_some_and(|set| set.is_match(candidate))
    }
}

impl Default for IgnoreFilter {
    fn default() -> Self {
        // The built-in list is static and known to compile.
        Self::new::<&str>(DEFAULT_IGNORE_PATTERNS, &[]).unwrap_or_else(|_| Self {
            rules: Gitignore::empty(),
            extra: None,
        })
    }
}

/// Normalizes a snapshot path to `/`-separated relative form.
///
/// Backslashes become `/`; empty and `.` segments are dropped, which also
/// removes any leading `./` or `/`.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}
