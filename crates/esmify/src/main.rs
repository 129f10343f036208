use std::{
    env, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use esmify::{
    Config, ExportTransformer,
    esm_url::{EsmUrlResolver, GithubTagFetcher, TagCache},
    pipeline,
    require_rewriter::rewrite_tree,
};
use log::{LevelFilter, info};

#[derive(Parser, Debug)]
#[command(name = "esmify", version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (defaults to ./esmify.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rewrite `require` calls and `module.exports` across a tree, in place
    Rewrite {
        /// Root directory of the tree
        root: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Synthesize named exports for one module and print the result
    Transform {
        /// Module to transform
        file: PathBuf,

        /// Module id used for the ignore list and the map (defaults to the path)
        #[arg(long)]
        module_id: Option<String>,

        /// Write the source map to this file
        #[arg(long)]
        map: Option<PathBuf>,
    },

    /// Rewrite a tree, then synthesize named exports for every module, in place
    Run {
        /// Root directory of the tree
        root: PathBuf,

        #[command(flatten)]
        filter: FilterArgs,

        /// Module ids exempt from export synthesis
        #[arg(long = "ignore", value_name = "MODULE_ID")]
        ignore: Vec<String>,

        /// Write `<file>.map` next to every transformed file
        #[arg(long)]
        source_maps: bool,
    },

    /// Print the ESM CDN URL of an `@stdlib/*` specifier
    Resolve {
        specifier: String,
    },
}

#[derive(clap::Args, Debug)]
struct FilterArgs {
    /// Eligible file extension (repeatable; replaces the configured list)
    #[arg(long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// Root-relative path prefix to restrict discovery to (repeatable)
    #[arg(long = "include", value_name = "PATH")]
    include: Vec<String>,

    /// Directory name or root-relative path prefix to skip (repeatable)
    #[arg(long = "exclude", value_name = "PATH")]
    exclude: Vec<String>,
}

impl FilterArgs {
    fn apply(self, config: &mut Config) {
        if !self.extensions.is_empty() {
            config.extensions = self.extensions;
        }
        if !self.include.is_empty() {
            config.include = self.include;
        }
        config.exclude.extend(self.exclude);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cwd = env::current_dir().context("Failed to determine the working directory")?;
    let mut config = Config::load(cli.config.as_deref(), &cwd)?;

    match cli.command {
        Command::Rewrite { root, filter } => {
            filter.apply(&mut config);
            let summary = rewrite_tree(&config.file_filter(&root))?;
            for (rule, hits) in &summary.rule_hits {
                info!("{rule}: {hits}");
            }
            writeln!(
                io::stdout().lock(),
                "Rewrote {} of {} files",
                summary.files_changed.len(),
                summary.files_scanned
            )?;
        }
        Command::Transform {
            file,
            module_id,
            map,
        } => transform_file(&config, &file, module_id, map.as_deref())?,
        Command::Run {
            root,
            filter,
            ignore,
            source_maps,
        } => {
            filter.apply(&mut config);
            config.ignore.extend(ignore);
            config.source_maps |= source_maps;
            let report = pipeline::run(&config, &root)?;
            writeln!(
                io::stdout().lock(),
                "Rewrote {} files, synthesized exports for {} files, wrote {} source maps",
                report.rewrite.files_changed.len(),
                report.transformed.len(),
                report.maps_written
            )?;
        }
        Command::Resolve { specifier } => {
            let cache = TagCache::new();
            let resolver = EsmUrlResolver::new(GithubTagFetcher::new()?, &cache, &config);
            let mut stdout = io::stdout().lock();
            match resolver.resolve(&specifier) {
                Some(module) => writeln!(stdout, "{}", module.id)?,
                None => writeln!(stdout, "{specifier} is not an @stdlib package")?,
            }
        }
    }

    Ok(())
}

fn transform_file(
    config: &Config,
    file: &Path,
    module_id: Option<String>,
    map: Option<&Path>,
) -> Result<()> {
    let code = fs::read_to_string(file)
        .with_context(|| format!("Failed to read source file: {}", file.display()))?;
    let module_id = module_id.unwrap_or_else(|| file.to_string_lossy().into_owned());
    let transformer = ExportTransformer::from_config(config);

    let mut stdout = io::stdout().lock();
    let Some(output) = transformer.transform(&code, &module_id)? else {
        info!("No named exports to synthesize for {module_id}");
        stdout.write_all(code.as_bytes())?;
        return Ok(());
    };

    stdout.write_all(output.code.as_bytes())?;
    if let Some(map) = map {
        fs::write(map, output.map.to_json()?)
            .with_context(|| format!("Failed to write source map: {}", map.display()))?;
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}
