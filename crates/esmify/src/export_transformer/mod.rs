//! Per-module named export synthesis
//!
//! Runs on source that the bulk rewriter has already converted to ESM. A
//! module can declare extra named exports in two ways:
//!
//! - an exports annotation, `// exports: { "name": "container.property" }`
//! - registration calls, `setReadOnly( ns, 'name', identifier );`
//!
//! The annotation is authoritative: when present, registration calls in the
//! same module are ignored. Registration calls are only honored when their
//! namespace argument is the module's default export (if it has one), so
//! sibling namespaces built in the same file do not leak into its exports.
//!
//! The synthesized statements are appended after the original text and the
//! returned map covers the original region only.

mod scanner;
mod synthesis;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::{debug, trace};
use rustc_hash::FxHashSet;

pub use self::{
    scanner::{ImportDeclaration, RegistrationCall},
    synthesis::{DestructureRecord, ExportRecord, SynthesizedExports},
};
use crate::{config::Config, edit_buffer::AppendOnlyBuffer, source_map::SourceMap};

/// Transformed module text plus its source map
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub code: String,
    pub map: SourceMap,
    pub exports: SynthesizedExports,
}

/// Stateless apart from read-only configuration, so one instance can serve
/// many modules concurrently
#[derive(Debug, Clone)]
pub struct ExportTransformer {
    ignore: FxHashSet<String>,
    registration_functions: FxHashSet<String>,
    include_sources_content: bool,
}

impl Default for ExportTransformer {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

impl ExportTransformer {
    pub fn new<I, S>(ignore: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            ignore: ignore
                .into_iter()
                .map(|id| normalize_module_id(id.as_ref()))
                .collect(),
            registration_functions: std::iter::once("setReadOnly".to_owned()).collect(),
            include_sources_content: true,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.ignore).with_registration_functions(&config.registration_functions)
    }

    /// Replace the callee names recognized as registration calls
    #[must_use]
    pub fn with_registration_functions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.registration_functions = names
            .into_iter()
            .map(|name| name.as_ref().to_owned())
            .collect();
        self
    }

    #[must_use]
    pub fn with_sources_content(mut self, include: bool) -> Self {
        self.include_sources_content = include;
        self
    }

    pub fn is_ignored(&self, module_id: &str) -> bool {
        self.ignore.contains(&normalize_module_id(module_id))
    }

    /// Synthesize the named exports of one module
    ///
    /// Returns `Ok(None)` when the module is ignored, declares nothing, or
    /// everything it declares is already exported. A malformed exports
    /// annotation is an error.
    pub fn transform(&self, code: &str, module_id: &str) -> Result<Option<TransformOutput>> {
        if self.is_ignored(module_id) {
            debug!("Skipping ignored module {module_id}");
            return Ok(None);
        }

        let exports = self.collect_exports(code, module_id)?;
        if exports.is_empty() {
            return Ok(None);
        }

        let trailer = exports.render();
        let mut buffer = AppendOnlyBuffer::new(code);
        buffer.append(&trailer);
        let map = buffer.generate_map(module_id, self.include_sources_content)?;

        debug!(
            "Synthesized {} named exports for {module_id}: {:?}",
            exports.len(),
            exports.exported_names().collect::<Vec<_>>()
        );
        Ok(Some(TransformOutput {
            code: buffer.to_string(),
            map,
            exports,
        }))
    }

    /// Classify the module and build the export records it is missing
    pub fn collect_exports(&self, code: &str, module_id: &str) -> Result<SynthesizedExports> {
        let annotations = scanner::annotations(code);
        let imports = scanner::imports(code);
        let registrations = if annotations.is_empty() {
            self.honored_registrations(code, &imports, module_id)
        } else {
            trace!("Exports annotation present in {module_id}; ignoring registration calls");
            Vec::new()
        };

        if annotations.is_empty() && registrations.is_empty() {
            return Ok(SynthesizedExports::default());
        }

        let already_exported = scanner::existing_exports(code);
        let mut exports = SynthesizedExports::default();

        if annotations.is_empty() {
            let mut seen = FxHashSet::default();
            for call in registrations {
                if already_exported.contains(&call.name) || !seen.insert(call.name.clone()) {
                    trace!("{module_id} already exports {}", call.name);
                    continue;
                }
                exports
                    .reexports
                    .push(ExportRecord::new(call.name, call.identifier));
            }
            return Ok(exports);
        }

        let imported: FxHashSet<&str> = imports
            .iter()
            .flat_map(|import| import.bindings.iter().map(String::as_str))
            .collect();

        for (name, value) in parse_annotations(&annotations, module_id)? {
            if already_exported.contains(&name) {
                trace!("{module_id} already exports {name}");
                continue;
            }
            let Some(record) = DestructureRecord::from_annotation(&name, &value) else {
                debug!("Skipping annotation entry {name:?} in {module_id}: {value:?} is not a container.property binding");
                continue;
            };
            if imported.contains(name.as_str()) {
                exports.reexports.push(ExportRecord::new(name.clone(), name));
            } else {
                exports.destructures.push(record);
            }
        }

        Ok(exports)
    }

    fn honored_registrations(
        &self,
        code: &str,
        imports: &[ImportDeclaration],
        module_id: &str,
    ) -> Vec<RegistrationCall> {
        let calls = scanner::registration_calls(code);
        if calls.is_empty() {
            return calls;
        }

        let helper_aliases: FxHashSet<&str> = imports
            .iter()
            .filter(|import| import.imports_read_only_helper())
            .filter_map(|import| import.default_binding.as_deref())
            .collect();
        let default_export = scanner::default_export(code);

        calls
            .into_iter()
            .filter(|call| {
                self.registration_functions.contains(&call.callee)
                    || helper_aliases.contains(call.callee.as_str())
            })
            .filter(|call| match default_export {
                Some(target) if call.namespace != target => {
                    trace!(
                        "Skipping registration of {} on {} in {module_id}: default export is {target}",
                        call.name, call.namespace
                    );
                    false
                }
                _ => true,
            })
            .collect()
    }
}

/// Merge every annotation of a module, first occurrence of a name wins
fn parse_annotations(annotations: &[&str], module_id: &str) -> Result<IndexMap<String, String>> {
    let mut merged = IndexMap::new();
    for raw in annotations {
        let entries: IndexMap<String, String> = serde_json::from_str(raw)
            .with_context(|| format!("Invalid exports annotation in {module_id}: {raw}"))?;
        for (name, value) in entries {
            if merged.contains_key(&name) {
                debug!("Duplicate exports annotation entry {name} in {module_id}");
                continue;
            }
            merged.insert(name, value);
        }
    }
    Ok(merged)
}

fn normalize_module_id(module_id: &str) -> String {
    let normalized = module_id.replace('\\', "/");
    normalized
        .strip_prefix("./")
        .unwrap_or(&normalized)
        .to_owned()
}

#[cfg(test)]
mod tests;
