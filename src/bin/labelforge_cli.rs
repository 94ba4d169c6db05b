//! Labelforge CLI
//!
//! Commands: generate, plan, check, palette, normalize, xml2csv, colors
//! Outputs JSON to stdout, logs to stderr
//! Exit codes: 0 success, 2 some products/rows failed, 1 fatal

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use labelforge_core::{
    colors::{convert_xml_file, ColorTable},
    pipeline::normalize_output,
    BarcodePipeline, LabelforgeConfig, NormalizationScope, OutputLayout, PrintSpec,
    ProductCatalog, SystemRunner,
};

#[derive(Parser)]
#[command(name = "labelforge-cli")]
#[command(about = "Labelforge CLI - EAN-13 artwork and CMYK color tables")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON config file (built-in tables when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct BatchArgs {
    /// Product catalog (JSON array)
    #[arg(long, default_value = "products.json")]
    catalog: PathBuf,

    /// Output root; SVGs go to <root>/svg, PNGs to <root>/png
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Module width override in millimetres
    #[arg(long)]
    x_dimension: Option<f64>,

    /// Reference resolution override
    #[arg(long)]
    dpi: Option<u32>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    Produced,
    Directory,
}

impl From<ScopeArg> for NormalizationScope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Produced => Self::Produced,
            ScopeArg::Directory => Self::Directory,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Encode, normalize and optionally rasterize every product
    Generate {
        #[command(flatten)]
        batch: BatchArgs,

        /// Also export PNGs
        #[arg(long)]
        raster: bool,

        /// Which SVGs to normalize
        #[arg(long, value_enum)]
        normalize: Option<ScopeArg>,
    },

    /// Print encoder invocations without running them
    Plan {
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Validate catalog, color tables and EAN payloads
    Check {
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// List every variant with its resolved colors
    Palette,

    /// Normalize fonts in every SVG under <output>/svg
    Normalize {
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Convert color XML files to CSV next to each input
    Xml2csv {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show how a CSV color table applies to a document palette
    Colors {
        /// CSV color table
        csv: PathBuf,

        /// Color names present in the document
        #[arg(long = "document-color")]
        document_colors: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    match cli.command {
        Commands::Generate { batch, raster, normalize } => {
            let mut config = match with_scale(config, &batch) {
                Ok(c) => c,
                Err(e) => return fail(e),
            };
            config.raster.enabled |= raster;
            if let Some(scope) = normalize {
                config.normalization = scope.into();
            }

            let (pipeline, catalog) = match open_batch(config, &batch) {
                Ok(pair) => pair,
                Err(e) => return fail(e),
            };

            match pipeline.run(&catalog, &mut SystemRunner) {
                Ok(report) => {
                    let failed: Vec<_> = report
                        .failed()
                        .map(|(codename, reason)| serde_json::json!({
                            "codename": codename,
                            "reason": reason,
                        }))
                        .collect();
                    emit(&serde_json::json!({
                        "success": report.all_succeeded(),
                        "failed": failed,
                        "report": report,
                    }));
                    if report.all_succeeded() {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::from(2)
                    }
                }
                Err(e) => fail(e),
            }
        }

        Commands::Plan { batch } => {
            let planned = with_scale(config, &batch)
                .and_then(|config| open_batch(config, &batch))
                .and_then(|(pipeline, catalog)| {
                    pipeline.commands(&catalog).map_err(|e| e.to_string())
                });
            match planned {
                Ok(commands) => {
                    emit(&commands);
                    ExitCode::SUCCESS
                }
                Err(e) => fail(e),
            }
        }

        Commands::Check { batch } => {
            let checked = with_scale(config, &batch)
                .and_then(|config| open_batch(config, &batch))
                .and_then(|(pipeline, catalog)| {
                    let jobs = pipeline.plan(&catalog).map_err(|e| e.to_string())?;
                    Ok(jobs.iter().map(|job| pipeline.validate_job(job)).collect::<Vec<_>>())
                });
            match checked {
                Ok(results) => {
                    let valid = results.iter().all(|r| r.valid);
                    emit(&serde_json::json!({ "valid": valid, "products": results }));
                    if valid {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::from(2)
                    }
                }
                Err(e) => fail(e),
            }
        }

        Commands::Palette => match config.resolver().resolve_all() {
            Ok(pairs) => {
                let variants: serde_json::Map<_, _> = pairs
                    .into_iter()
                    .map(|(variant, pair)| (variant.to_string(), serde_json::json!(pair)))
                    .collect();
                emit(&variants);
                ExitCode::SUCCESS
            }
            Err(e) => fail(e),
        },

        Commands::Normalize { output } => {
            match normalize_output(&config, &OutputLayout::new(output)) {
                Ok(report) => {
                    emit(&report);
                    ExitCode::SUCCESS
                }
                Err(e) => fail(e),
            }
        }

        Commands::Xml2csv { files } => {
            let mut converted = vec![];
            let mut errors = vec![];
            for file in &files {
                match convert_xml_file(file) {
                    Ok(csv) => converted.push(csv),
                    Err(e) => {
                        tracing::warn!(file = %file.display(), error = %e, "conversion failed");
                        errors.push(e.to_string());
                    }
                }
            }
            emit(&serde_json::json!({
                "success": errors.is_empty(),
                "converted": converted,
                "errors": errors,
            }));
            if errors.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }

        Commands::Colors { csv, document_colors } => match ColorTable::load(&csv) {
            Ok(table) => {
                let plan = table.replacement_plan(&document_colors);
                emit(&plan);
                if plan.rejected.is_empty() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::from(2)
                }
            }
            Err(e) => fail(e),
        },
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<LabelforgeConfig, String> {
    match path {
        Some(path) => LabelforgeConfig::load(path).map_err(|e| e.to_string()),
        None => Ok(LabelforgeConfig::default()),
    }
}

/// Apply command line scale overrides, range checked
fn with_scale(mut config: LabelforgeConfig, batch: &BatchArgs) -> Result<LabelforgeConfig, String> {
    if batch.x_dimension.is_none() && batch.dpi.is_none() {
        return Ok(config);
    }
    config.print = PrintSpec::from_user(
        batch.x_dimension.unwrap_or(config.print.x_dimension_mm),
        batch.dpi.unwrap_or(config.print.reference_dpi),
    )?;
    Ok(config)
}

fn open_batch(
    config: LabelforgeConfig,
    batch: &BatchArgs,
) -> Result<(BarcodePipeline, ProductCatalog), String> {
    let catalog = ProductCatalog::load(&batch.catalog).map_err(|e| e.to_string())?;
    let pipeline = BarcodePipeline::new(config, OutputLayout::new(&batch.output))
        .map_err(|e| e.to_string())?;
    Ok((pipeline, catalog))
}

fn emit<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to serialize output: {e}"),
    }
}

fn fail(error: impl ToString) -> ExitCode {
    let output = serde_json::json!({
        "success": false,
        "error": error.to_string(),
    });
    println!("{output}");
    ExitCode::FAILURE
}
