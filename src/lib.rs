//! Labelforge Core - print production toolkit
//!
//! # Guarantees
//! 1. Broken color tables stop the run before any artwork is touched
//! 2. One bad product never blocks the rest of the batch
//! 3. Normalization is idempotent; reruns are always safe
//! 4. External tools get argument vectors, never shell strings
//! 5. SVG is the deliverable; raster output is opt-in

pub mod catalog;
pub mod colors;
pub mod config;
pub mod encoder;
pub mod hashing;
pub mod palette;
pub mod pipeline;
pub mod postprocess;
pub mod print;
pub mod process;
pub mod raster;
pub mod validation;

pub use catalog::{CatalogError, Product, ProductCatalog};
pub use colors::{CmykColor, ColorTable, ColorTableError, ReplacementPlan};
pub use config::{ConfigError, LabelforgeConfig};
pub use encoder::{BarcodeEncoder, EncodeError, RenderJob};
pub use hashing::{canonical_json, compute_job_hash, svg_geometry_hash};
pub use palette::{ColorPair, HexColor, PaletteError, PaletteResolver};
pub use pipeline::{BarcodePipeline, BatchReport, OutputLayout, PipelineError, ProductOutcome, ProductStage};
pub use postprocess::{FontNormalizer, NormalizationScope, PostProcessError};
pub use print::{PrintAuthority, PrintSpec};
pub use process::{CommandRunner, CommandSpec, ProcessOutput, SystemRunner};
pub use validation::{ValidationResult, ValidationRule, ValidationViolation, ViolationSeverity};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const MIN_CONFIG_VERSION: &str = "1.0.0";
