//! Layered configuration
//!
//! Values are resolved in order of increasing precedence: built-in defaults,
//! an `esmify.toml` file, `ESMIFY_*` environment variables, and finally the
//! command line (applied by the binary on top of the loaded [`Config`]).

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::source_files::FileFilter;

/// Name of the configuration file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "esmify.toml";

/// Default CDN base used for `@stdlib/*` ESM URLs
pub const DEFAULT_ESM_CDN: &str = "https://cdn.jsdelivr.net/gh";

/// Version suffix used when no `-esm` tag can be found for a package
pub const DEFAULT_FALLBACK_VERSION: &str = "esm";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// File extensions (without the dot) eligible for the bulk rewrite
    pub extensions: Vec<String>,

    /// Root-relative path prefixes to restrict discovery to; empty means everything
    ///
    /// Defaults to the package's own `lib` and the `lib` of every hoisted
    /// `@stdlib` dependency.
    pub include: Vec<String>,

    /// Directory names or root-relative path prefixes skipped during discovery
    pub exclude: Vec<String>,

    /// Module ids exempt from synthesized named exports
    pub ignore: Vec<String>,

    /// Callee names recognized as registration calls
    pub registration_functions: Vec<String>,

    /// Write a `<file>.map` next to every file changed by the export transformer
    pub source_maps: bool,

    /// Base URL used when resolving `@stdlib/*` specifiers to ESM bundles
    pub esm_cdn: String,

    /// Version used when the tag lookup finds nothing or fails
    pub fallback_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extensions: vec!["js".to_owned(), "ts".to_owned()],
            include: vec!["lib".to_owned(), "node_modules/@stdlib/*/lib".to_owned()],
            exclude: vec![
                "node_modules".to_owned(),
                ".git".to_owned(),
                "dist".to_owned(),
            ],
            ignore: Vec::new(),
            registration_functions: vec!["setReadOnly".to_owned()],
            source_maps: false,
            esm_cdn: DEFAULT_ESM_CDN.to_owned(),
            fallback_version: DEFAULT_FALLBACK_VERSION.to_owned(),
        }
    }
}

impl Config {
    /// Load configuration from an explicit file, or from `esmify.toml` in
    /// `cwd` when it exists, then apply environment overrides
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let candidate = cwd.join(CONFIG_FILE_NAME);
                if candidate.is_file() {
                    Self::from_file(&candidate)?
                } else {
                    debug!("No {CONFIG_FILE_NAME} found in {}", cwd.display());
                    Self::default()
                }
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply `ESMIFY_*` environment variables
    ///
    /// List-valued variables are comma separated. `ESMIFY_SOURCE_MAPS` accepts
    /// `1`/`true`/`yes` (case-insensitive); anything else disables maps.
    pub fn apply_env_overrides(&mut self) {
        if let Some(list) = env_list("ESMIFY_EXTENSIONS") {
            self.extensions = list;
        }
        if let Some(list) = env_list("ESMIFY_INCLUDE") {
            self.include = list;
        }
        if let Some(list) = env_list("ESMIFY_EXCLUDE") {
            self.exclude = list;
        }
        if let Some(list) = env_list("ESMIFY_IGNORE") {
            self.ignore = list;
        }
        if let Some(list) = env_list("ESMIFY_REGISTRATION_FUNCTIONS") {
            self.registration_functions = list;
        }
        if let Ok(value) = env::var("ESMIFY_SOURCE_MAPS") {
            self.source_maps = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            );
        }
        if let Ok(value) = env::var("ESMIFY_ESM_CDN") {
            self.esm_cdn = value.trim().trim_end_matches('/').to_owned();
        }
        if let Ok(value) = env::var("ESMIFY_FALLBACK_VERSION") {
            self.fallback_version = value.trim().to_owned();
        }
    }

    /// Build the discovery filter for a tree rooted at `root`
    pub fn file_filter(&self, root: &Path) -> FileFilter {
        FileFilter::new(root)
            .with_extensions(self.extensions.iter().map(String::as_str))
            .with_includes(self.include.iter().map(PathBuf::from))
            .with_excludes(self.exclude.iter().map(String::as_str))
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    let value = env::var(key).ok()?;
    Some(
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect(),
    )
}
