//! Rewrites CommonJS module trees into ESM-compatible source ahead of bundling
//!
//! Two stages, run in this order:
//!
//! 1. [`require_rewriter`]: ordered whole-file substitutions turning
//!    `require`/`module.exports` into `import`/`export default`.
//! 2. [`export_transformer`]: per-module synthesis of the named exports a
//!    package declares through registration calls or exports annotations.

pub mod config;
pub mod edit_buffer;
pub mod esm_url;
pub mod export_transformer;
pub mod pipeline;
pub mod require_rewriter;
pub mod source_files;
pub mod source_map;

pub use config::Config;
pub use export_transformer::{ExportTransformer, TransformOutput};
