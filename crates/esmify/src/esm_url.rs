//! CDN URL resolution for `@stdlib/*` specifiers
//!
//! When building the `esm` target every `@stdlib/*` dependency stays
//! external and is loaded from the per-package ESM branch on a CDN, e.g.
//! `@stdlib/math/base/special/gamma` becomes
//! `https://cdn.jsdelivr.net/gh/stdlib-js/math-base-special-gamma@v0.1.0-esm/index.mjs`.
//!
//! The latest `-esm` tag of each repository is looked up once per build and
//! memoized in a [`TagCache`] owned by the caller. Lookup failures degrade to
//! the configured fallback version instead of failing the build.

use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use log::{debug, warn};
use reqwest::blocking::Client;
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::config::Config;

/// Default GitHub API base
pub const GITHUB_API: &str = "https://api.github.com";

const STDLIB_SCOPE: &str = "@stdlib/";
const STDLIB_ORG: &str = "stdlib-js";
const ESM_TAG_SUFFIX: &str = "-esm";

/// Source of the tag names of a repository
pub trait TagFetcher {
    /// Tag names of `slug` (`owner/repo`), newest first
    fn fetch_tags(&self, slug: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

/// Fetches tags from the GitHub REST API
#[derive(Debug)]
pub struct GithubTagFetcher {
    client: Client,
    api_base: String,
}

impl GithubTagFetcher {
    pub fn new() -> Result<Self> {
        Self::with_api_base(GITHUB_API)
    }

    pub fn with_api_base(api_base: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("esmify/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_owned(),
        })
    }
}

impl TagFetcher for GithubTagFetcher {
    fn fetch_tags(&self, slug: &str) -> Result<Vec<String>> {
        let url = format!("{}/repos/{slug}/tags", self.api_base);
        let response = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("Request to {url} failed"))?;
        if !response.status().is_success() {
            bail!("{url} returned status {}", response.status());
        }
        let tags: Vec<Tag> = response
            .json()
            .with_context(|| format!("Unexpected response body from {url}"))?;
        Ok(tags.into_iter().map(|tag| tag.name).collect())
    }
}

/// Resolved versions keyed by repository slug, scoped to one build
#[derive(Debug, Default)]
pub struct TagCache {
    versions: Mutex<FxHashMap<String, String>>,
}

impl TagCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slug: &str) -> Option<String> {
        self.versions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(slug)
            .cloned()
    }

    pub fn insert(&self, slug: &str, version: &str) {
        self.versions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slug.to_owned(), version.to_owned());
    }

    pub fn len(&self) -> usize {
        self.versions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An id the bundler should treat as external
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalModule {
    pub id: String,
    pub external: bool,
}

#[derive(Debug)]
pub struct EsmUrlResolver<'a, F> {
    fetcher: F,
    cache: &'a TagCache,
    cdn: String,
    fallback_version: String,
}

impl<'a, F: TagFetcher> EsmUrlResolver<'a, F> {
    pub fn new(fetcher: F, cache: &'a TagCache, config: &Config) -> Self {
        Self {
            fetcher,
            cache,
            cdn: config.esm_cdn.trim_end_matches('/').to_owned(),
            fallback_version: config.fallback_version.clone(),
        }
    }

    /// Resolve a specifier; `None` for anything outside the `@stdlib` scope
    pub fn resolve(&self, specifier: &str) -> Option<ExternalModule> {
        let slug = package_slug(specifier)?;
        let version = self.version_for(&slug);
        let url = format!("{}/{slug}@{version}/index.mjs", self.cdn);
        debug!("Resolved {specifier} to {url}");
        Some(ExternalModule {
            id: url,
            external: true,
        })
    }

    fn version_for(&self, slug: &str) -> String {
        if let Some(version) = self.cache.get(slug) {
            return version;
        }

        let version = match self.fetcher.fetch_tags(slug) {
            Ok(tags) => tags
                .into_iter()
                .find(|tag| tag.ends_with(ESM_TAG_SUFFIX))
                .unwrap_or_else(|| {
                    debug!("No {ESM_TAG_SUFFIX} tag for {slug}; using {}", self.fallback_version);
                    self.fallback_version.clone()
                }),
            Err(err) => {
                warn!(
                    "Tag lookup for {slug} failed, falling back to @{}: {err:#}",
                    self.fallback_version
                );
                self.fallback_version.clone()
            }
        };
        self.cache.insert(slug, &version);
        version
    }
}

/// `@stdlib/math/base/special/gamma` -> `stdlib-js/math-base-special-gamma`
pub fn package_slug(specifier: &str) -> Option<String> {
    let package = specifier.strip_prefix(STDLIB_SCOPE)?;
    let package = package.trim_matches('/');
    if package.is_empty() {
        return None;
    }
    Some(format!("{STDLIB_ORG}/{}", package.replace('/', "-")))
}
