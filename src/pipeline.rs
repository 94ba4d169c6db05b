//! Barcode Pipeline - Single Entry Point
//!
//! catalog -> plan (palette) -> per product: validate, encode, normalize,
//! [rasterize] -> batch report.
//!
//! Every job is planned before anything is spawned: a broken palette or
//! variant table aborts the run with no artwork touched. After that, a
//! failing product only fails itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::{CatalogError, Product, ProductCatalog};
use crate::config::{ConfigError, LabelforgeConfig};
use crate::encoder::{ensure_dir, BarcodeEncoder, EncodeError, RenderJob};
use crate::hashing::{compute_job_hash, compute_manifest_hash, svg_geometry_hash};
use crate::palette::PaletteError;
use crate::postprocess::{FontNormalizer, NormalizationReport, NormalizationScope, PostProcessError};
use crate::process::{CommandRunner, CommandSpec};
use crate::raster::RasterExporter;
use crate::validation::{ValidationResult, Validator};
use crate::ENGINE_VERSION;

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static VALIDATION_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_validation_call_count() -> u32 {
    VALIDATION_CALL_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_validation_call_count() {
    VALIDATION_CALL_COUNT.store(0, Ordering::SeqCst);
}

/// Errors that stop the whole run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Broken color tables for product {codename}: {source}")]
    Palette {
        codename: String,
        #[source]
        source: PaletteError,
    },

    #[error("Post-processing failed, output may be partially normalized: {0}")]
    PostProcess(#[from] PostProcessError),

    #[error("Failed to create output directory {}: {source}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// `<root>/svg/<codename>.svg` and `<root>/png/<codename>.png`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn svg_dir(&self) -> PathBuf {
        self.root.join("svg")
    }

    pub fn png_dir(&self) -> PathBuf {
        self.root.join("png")
    }

    pub fn svg_path(&self, codename: &str) -> PathBuf {
        self.svg_dir().join(format!("{codename}.svg"))
    }
}

/// Where a product ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStage {
    Loaded,
    PaletteResolved,
    Encoded,
    Normalized,
    RasterExported,
    Done,
    Failed { reason: String },
}

impl ProductStage {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductOutcome {
    pub codename: String,
    pub stage: ProductStage,
    pub job_hash: String,
    pub svg: Option<PathBuf>,
    pub png: Option<PathBuf>,
    pub geometry_hash: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ProductOutcome {
    /// A catalog record the run has not planned yet
    pub fn loaded(codename: impl Into<String>) -> Self {
        Self {
            codename: codename.into(),
            stage: ProductStage::Loaded,
            job_hash: String::new(),
            svg: None,
            png: None,
            geometry_hash: None,
            warnings: vec![],
        }
    }

    fn fail(&mut self, reason: impl Into<String>) {
        self.stage = ProductStage::Failed { reason: reason.into() };
    }

    pub fn failure(&self) -> Option<&str> {
        match &self.stage {
            ProductStage::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: String,
    pub engine_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub output_root: PathBuf,
    pub normalization: NormalizationReport,
    pub outcomes: Vec<ProductOutcome>,
    /// Hash over the outcomes only; equal across identical reruns
    pub outcomes_hash: String,
}

impl BatchReport {
    pub fn failed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.failure().map(|reason| (o.codename.as_str(), reason)))
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.stage == ProductStage::Done).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed().next().is_none()
    }

    pub fn outcome(&self, codename: &str) -> Option<&ProductOutcome> {
        self.outcomes.iter().find(|o| o.codename == codename)
    }
}

/// The barcode pipeline - single entry point for batch generation
pub struct BarcodePipeline {
    config: LabelforgeConfig,
    layout: OutputLayout,
    encoder: BarcodeEncoder,
    normalizer: FontNormalizer,
    validator: Validator,
}

impl BarcodePipeline {
    pub fn new(config: LabelforgeConfig, layout: OutputLayout) -> Result<Self, PipelineError> {
        let normalizer = FontNormalizer::new(config.fonts.clone())?;
        let encoder = BarcodeEncoder::new(config.encoder.clone());
        Ok(Self {
            config,
            layout,
            encoder,
            normalizer,
            validator: Validator::new(),
        })
    }

    pub fn config(&self) -> &LabelforgeConfig {
        &self.config
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Build the render job for one product.
    pub fn job_for(&self, product: &Product) -> Result<RenderJob, PipelineError> {
        let colors = self
            .config
            .resolver()
            .resolve(&product.variant)
            .map_err(|source| PipelineError::Palette {
                codename: product.codename.clone(),
                source,
            })?;

        Ok(RenderJob {
            codename: product.codename.clone(),
            ean13: product.ean13.clone(),
            print: self.config.print.clone(),
            colors,
            output: self.layout.svg_path(&product.codename),
        })
    }

    /// Jobs for the whole catalog in catalog order; the first palette miss aborts.
    pub fn plan(&self, catalog: &ProductCatalog) -> Result<Vec<RenderJob>, PipelineError> {
        catalog.products().iter().map(|p| self.job_for(p)).collect()
    }

    /// Encoder invocations for the whole catalog, without running them.
    pub fn commands(&self, catalog: &ProductCatalog) -> Result<Vec<CommandSpec>, PipelineError> {
        Ok(self
            .plan(catalog)?
            .iter()
            .map(|job| self.encoder.command(job))
            .collect())
    }

    /// Pre-flight checks for one job
    pub fn validate_job(&self, job: &RenderJob) -> ValidationResult {
        #[cfg(feature = "test-hooks")]
        VALIDATION_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

        self.validator.validate(job)
    }

    /// Run the batch. Only configuration, output-directory and
    /// post-processing problems return `Err`; product failures are in the report.
    pub fn run(
        &self,
        catalog: &ProductCatalog,
        runner: &mut dyn CommandRunner,
    ) -> Result<BatchReport, PipelineError> {
        let started_at = Utc::now();
        let loaded: Vec<_> = catalog
            .products()
            .iter()
            .map(|p| ProductOutcome::loaded(&p.codename))
            .collect();
        let jobs = self.plan(catalog)?;

        let svg_dir = self.layout.svg_dir();
        ensure_dir(&svg_dir).map_err(|source| PipelineError::OutputDir {
            path: svg_dir.clone(),
            source,
        })?;

        let mut normalization = NormalizationReport::default();
        let mut outcomes = Vec::with_capacity(jobs.len());

        for (job, mut outcome) in jobs.iter().zip(loaded) {
            info!(codename = %job.codename, "encoding");
            outcome.job_hash = compute_job_hash(job, ENGINE_VERSION)?;
            outcome.stage = ProductStage::PaletteResolved;

            match self.encode_one(runner, job, &mut outcome) {
                Ok(svg) => {
                    outcome.stage = ProductStage::Encoded;
                    if self.config.normalization == NormalizationScope::Produced {
                        normalization.merge(self.normalizer.normalize_file(&svg)?);
                        outcome.stage = ProductStage::Normalized;
                    }
                    outcome.svg = Some(svg);
                }
                Err(err) => {
                    warn!(codename = %job.codename, error = %err, "product failed");
                    outcome.fail(err.to_string());
                }
            }
            outcomes.push(outcome);
        }

        if self.config.normalization == NormalizationScope::Directory {
            normalization = self.normalizer.normalize_dir(&svg_dir)?;
            for outcome in outcomes.iter_mut().filter(|o| o.stage == ProductStage::Encoded) {
                outcome.stage = ProductStage::Normalized;
            }
        }

        if self.config.raster.enabled {
            self.rasterize(runner, &mut outcomes);
        }

        for outcome in outcomes.iter_mut().filter(|o| !o.stage.is_failed()) {
            if let Some(svg) = &outcome.svg {
                match read_geometry_hash(svg) {
                    Ok(hash) => outcome.geometry_hash = Some(hash),
                    Err(reason) => outcome.warnings.push(reason),
                }
            }
            outcome.stage = ProductStage::Done;
        }

        let outcomes_hash = compute_manifest_hash(&outcomes)?;
        let report = BatchReport {
            run_id: Uuid::new_v4().to_string(),
            engine_version: ENGINE_VERSION.to_string(),
            started_at,
            finished_at: Utc::now(),
            output_root: self.layout.root().to_path_buf(),
            normalization,
            outcomes,
            outcomes_hash,
        };

        info!(
            succeeded = report.succeeded(),
            failed = report.outcomes.len() - report.succeeded(),
            "batch finished"
        );
        for (codename, reason) in report.failed() {
            warn!(%codename, %reason, "failed");
        }

        Ok(report)
    }

    fn encode_one(
        &self,
        runner: &mut dyn CommandRunner,
        job: &RenderJob,
        outcome: &mut ProductOutcome,
    ) -> Result<PathBuf, EncodeError> {
        let validation = self.validate_job(job);
        for warning in validation.warnings() {
            warn!(codename = %job.codename, rule = %warning.rule, "{}", warning.message);
            outcome.warnings.push(warning.message.clone());
        }
        if !validation.valid {
            return Err(EncodeError::InvalidPayload {
                codename: job.codename.clone(),
                reason: validation.error_summary(),
            });
        }
        self.encoder.encode(runner, job)
    }

    fn rasterize(&self, runner: &mut dyn CommandRunner, outcomes: &mut [ProductOutcome]) {
        let exporter = RasterExporter::new(&self.config.raster.program, self.layout.png_dir());
        for outcome in outcomes.iter_mut().filter(|o| o.stage == ProductStage::Normalized) {
            let Some(svg) = outcome.svg.clone() else { continue };
            match exporter.export(runner, &svg) {
                Ok(png) => {
                    outcome.png = Some(png);
                    outcome.stage = ProductStage::RasterExported;
                }
                Err(err) => {
                    warn!(codename = %outcome.codename, error = %err, "raster export failed");
                    outcome.warnings.push(format!("raster export failed: {err}"));
                }
            }
        }
    }
}

/// Normalize every SVG under a layout root without encoding anything.
pub fn normalize_output(
    config: &LabelforgeConfig,
    layout: &OutputLayout,
) -> Result<NormalizationReport, PipelineError> {
    let normalizer = FontNormalizer::new(config.fonts.clone())?;
    Ok(normalizer.normalize_dir(&layout.svg_dir())?)
}

fn read_geometry_hash(svg: &Path) -> Result<String, String> {
    let text = fs::read_to_string(svg)
        .map_err(|e| format!("cannot read {}: {e}", svg.display()))?;
    svg_geometry_hash(&text).map_err(|e| format!("cannot hash {}: {e}", svg.display()))
}

impl Default for BarcodePipeline {
    fn default() -> Self {
        Self {
            config: LabelforgeConfig::default(),
            layout: OutputLayout::new("."),
            encoder: BarcodeEncoder::default(),
            normalizer: FontNormalizer::default(),
            validator: Validator::new(),
        }
    }
}
