//! Eligible source file discovery
//!
//! A [`FileFilter`] decides which files under a root take part in the bulk
//! rewrite. Include and exclude entries are root-relative, `/`-separated
//! paths; a `*` component matches any single path component. Excludes
//! without a `/` match a directory or file name anywhere below the matched
//! include prefix, so `exclude = ["node_modules"]` does not hide an explicit
//! `include = ["node_modules/@stdlib/*/lib"]`.

use std::{
    ffi::OsStr,
    path::{Component, Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, trace};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct FileFilter {
    root: PathBuf,
    extensions: Vec<String>,
    includes: Vec<Vec<String>>,
    excluded_names: Vec<String>,
    excluded_prefixes: Vec<Vec<String>>,
}

/// Relation between a directory and the include patterns
enum IncludeMatch {
    /// The path lies below a pattern; carries the components after the match
    Inside(Vec<String>),
    /// The path is an ancestor of at least one pattern
    Ancestor,
    Outside,
}

impl FileFilter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: Vec::new(),
            includes: Vec::new(),
            excluded_names: Vec::new(),
            excluded_prefixes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_extensions<'a>(mut self, extensions: impl IntoIterator<Item = &'a str>) -> Self {
        self.extensions.extend(
            extensions
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_owned()),
        );
        self
    }

    #[must_use]
    pub fn with_includes(mut self, includes: impl IntoIterator<Item = PathBuf>) -> Self {
        self.includes
            .extend(includes.into_iter().map(|path| components(&path)));
        self
    }

    #[must_use]
    pub fn with_excludes<'a>(mut self, excludes: impl IntoIterator<Item = &'a str>) -> Self {
        for exclude in excludes {
            let trimmed = exclude.trim_start_matches("./").trim_end_matches('/');
            if trimmed.contains('/') {
                self.excluded_prefixes
                    .push(components(Path::new(trimmed)));
            } else if !trimmed.is_empty() {
                self.excluded_names.push(trimmed.to_owned());
            }
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the root and return every eligible file, sorted by path
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                if !entry.file_type().is_dir() || entry.depth() == 0 {
                    return true;
                }
                let rel = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
                let keep = self.accepts_dir(rel);
                if !keep {
                    trace!("Pruning directory {}", rel.display());
                }
                keep
            });

        for entry in walker {
            let entry = entry
                .with_context(|| format!("Failed to walk {}", self.root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            if self.accepts_file(rel) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        debug!(
            "Discovered {} eligible files under {}",
            files.len(),
            self.root.display()
        );
        Ok(files)
    }

    /// Check whether a root-relative file path is eligible
    pub fn accepts_file(&self, rel: &Path) -> bool {
        let has_extension = rel
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| self.extensions.iter().any(|allowed| allowed == ext));
        if !has_extension {
            return false;
        }
        match self.include_match(rel) {
            IncludeMatch::Inside(remainder) => !self.is_excluded(&remainder),
            IncludeMatch::Ancestor | IncludeMatch::Outside => false,
        }
    }

    fn accepts_dir(&self, rel: &Path) -> bool {
        match self.include_match(rel) {
            IncludeMatch::Inside(remainder) => !self.is_excluded(&remainder),
            IncludeMatch::Ancestor => true,
            IncludeMatch::Outside => false,
        }
    }

    fn include_match(&self, rel: &Path) -> IncludeMatch {
        let parts = components(rel);
        if self.includes.is_empty() {
            return IncludeMatch::Inside(parts);
        }

        let mut ancestor = false;
        for pattern in &self.includes {
            if parts.len() >= pattern.len() {
                if prefix_matches(pattern, &parts) {
                    return IncludeMatch::Inside(parts[pattern.len()..].to_vec());
                }
            } else if prefix_matches(&pattern[..parts.len()], &parts) {
                ancestor = true;
            }
        }
        if ancestor {
            IncludeMatch::Ancestor
        } else {
            IncludeMatch::Outside
        }
    }

    fn is_excluded(&self, parts: &[String]) -> bool {
        parts
            .iter()
            .any(|part| self.excluded_names.iter().any(|name| name == part))
            || self
                .excluded_prefixes
                .iter()
                .any(|prefix| parts.len() >= prefix.len() && prefix_matches(prefix, parts))
    }
}

fn prefix_matches(pattern: &[String], parts: &[String]) -> bool {
    pattern
        .iter()
        .zip(parts)
        .all(|(expected, actual)| expected == "*" || expected == actual)
}

fn components(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}
