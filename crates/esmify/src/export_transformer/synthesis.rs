//! Synthesized export records and their rendering

use std::fmt::Write;

use super::scanner::is_identifier;

/// `bound_identifier as exported_name` inside an `export { ... }` list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    pub exported_name: String,
    pub bound_identifier: String,
}

impl ExportRecord {
    pub fn new(exported_name: impl Into<String>, bound_identifier: impl Into<String>) -> Self {
        Self {
            exported_name: exported_name.into(),
            bound_identifier: bound_identifier.into(),
        }
    }

    fn render(&self) -> String {
        if self.exported_name == self.bound_identifier {
            self.exported_name.clone()
        } else {
            format!("{} as {}", self.bound_identifier, self.exported_name)
        }
    }
}

/// `export const { source_key: bound_name } = container_expression;`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestructureRecord {
    pub container_expression: String,
    pub source_key: String,
    pub bound_name: String,
}

impl DestructureRecord {
    /// Split a `container.property` annotation value on its last `.`
    ///
    /// `None` unless both the exported name and the property are identifiers
    /// and the container is non-empty.
    pub fn from_annotation(name: &str, value: &str) -> Option<Self> {
        let (container, property) = value.trim().rsplit_once('.')?;
        let (container, property) = (container.trim(), property.trim());
        if container.is_empty() || !is_identifier(property) || !is_identifier(name) {
            return None;
        }
        Some(Self {
            container_expression: container.to_owned(),
            source_key: property.to_owned(),
            bound_name: name.to_owned(),
        })
    }
}

/// Everything one module needs appended
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SynthesizedExports {
    pub destructures: Vec<DestructureRecord>,
    pub reexports: Vec<ExportRecord>,
}

impl SynthesizedExports {
    pub fn is_empty(&self) -> bool {
        self.destructures.is_empty() && self.reexports.is_empty()
    }

    pub fn len(&self) -> usize {
        self.destructures.len() + self.reexports.len()
    }

    pub fn exported_names(&self) -> impl Iterator<Item = &str> {
        self.destructures
            .iter()
            .map(|record| record.bound_name.as_str())
            .chain(
                self.reexports
                    .iter()
                    .map(|record| record.exported_name.as_str()),
            )
    }

    /// Render the trailer: destructuring declarations first, one per record,
    /// then a single aggregated `export { ... };`
    pub fn render(&self) -> String {
        let mut out = String::new();
        for record in &self.destructures {
            let _ = write!(
                out,
                "\nexport const {{ {}: {} }} = {};",
                record.source_key, record.bound_name, record.container_expression
            );
        }
        if !self.reexports.is_empty() {
            let list = self
                .reexports
                .iter()
                .map(ExportRecord::render)
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(out, "\nexport {{ {list} }};");
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}
