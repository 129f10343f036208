//! Whole-tree pipeline
//!
//! Runs the bulk require rewrite over the tree, then the export transformer
//! over every eligible file. The second stage never starts unless the first
//! one completed for the whole tree.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::{
    config::Config,
    export_transformer::ExportTransformer,
    require_rewriter::{RewriteSummary, rewrite_tree},
};

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub rewrite: RewriteSummary,
    /// Files that received synthesized exports
    pub transformed: Vec<PathBuf>,
    pub maps_written: usize,
}

/// Run both stages over `root`, rewriting files in place
pub fn run(config: &Config, root: &Path) -> Result<PipelineReport> {
    let filter = config.file_filter(root);
    let rewrite = rewrite_tree(&filter)
        .context("Bulk require rewrite failed; export synthesis was not started")?;

    let transformer = ExportTransformer::from_config(config);
    let mut report = PipelineReport {
        rewrite,
        ..PipelineReport::default()
    };

    for path in filter.discover()? {
        let module_id = module_id(root, &path);
        let code = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read source file: {}", path.display()))?;
        let Some(output) = transformer.transform(&code, &module_id)? else {
            continue;
        };

        fs::write(&path, &output.code)
            .with_context(|| format!("Failed to write transformed file: {}", path.display()))?;
        if config.source_maps {
            let map_path = map_path(&path);
            fs::write(&map_path, output.map.to_json()?)
                .with_context(|| format!("Failed to write source map: {}", map_path.display()))?;
            report.maps_written += 1;
        }
        debug!("Synthesized exports for {module_id}");
        report.transformed.push(path);
    }

    info!(
        "Synthesized named exports for {} files under {}",
        report.transformed.len(),
        root.display()
    );
    Ok(report)
}

/// Root-relative, `/`-separated id with a leading `./`
pub fn module_id(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let rel = rel.to_string_lossy().replace('\\', "/");
    format!("./{}", rel.trim_start_matches("./"))
}

fn map_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".map");
    PathBuf::from(name)
}
