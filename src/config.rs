//! Run configuration: scale calibration, color tables, font fixes, tools.
//!
//! Loaded once at start-up and passed explicitly; `Default` carries the
//! built-in production values.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::encoder::EncoderConfig;
use crate::palette::{default_palette, default_variants, Palette, PaletteResolver, VariantTable};
use crate::postprocess::{default_substitutions, NormalizationScope, TokenSubstitution};
use crate::print::PrintSpec;
use crate::raster::RasterConfig;
use crate::{ENGINE_VERSION, MIN_CONFIG_VERSION};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Config requires engine >= {required}, current is {current}")]
    EngineVersionMismatch { required: String, current: String },

    #[error("Invalid version: {0}")]
    InvalidVersion(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelforgeConfig {
    #[serde(default = "default_min_version")]
    pub engine_min_version: String,
    #[serde(default)]
    pub print: PrintSpec,
    #[serde(default = "default_palette")]
    pub palette: Palette,
    #[serde(default = "default_variants")]
    pub variants: VariantTable,
    #[serde(default = "default_substitutions")]
    pub fonts: Vec<TokenSubstitution>,
    #[serde(default)]
    pub normalization: NormalizationScope,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub raster: RasterConfig,
}

fn default_min_version() -> String {
    MIN_CONFIG_VERSION.to_string()
}

impl Default for LabelforgeConfig {
    fn default() -> Self {
        Self {
            engine_min_version: default_min_version(),
            print: PrintSpec::default(),
            palette: default_palette(),
            variants: default_variants(),
            fonts: default_substitutions(),
            normalization: NormalizationScope::default(),
            encoder: EncoderConfig::default(),
            raster: RasterConfig::default(),
        }
    }
}

impl LabelforgeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and check engine compatibility. A `print` block read from a
    /// file is attributed to the config unless it names another authority.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        let explicit_authority = value
            .get("print")
            .and_then(|p| p.get("authority"))
            .is_some();

        let mut config: Self = serde_json::from_value(value)?;
        if !explicit_authority && config.print != PrintSpec::default() {
            config.print =
                PrintSpec::from_config(config.print.x_dimension_mm, config.print.reference_dpi);
        }
        config.check_engine_version()?;
        Ok(config)
    }

    pub fn resolver(&self) -> PaletteResolver<'_> {
        PaletteResolver::new(&self.palette, &self.variants)
    }

    fn check_engine_version(&self) -> Result<(), ConfigError> {
        let engine_ver = semver::Version::parse(ENGINE_VERSION)
            .map_err(|_| ConfigError::InvalidVersion(ENGINE_VERSION.to_string()))?;
        let min_ver = semver::Version::parse(&self.engine_min_version)
            .map_err(|_| ConfigError::InvalidVersion(self.engine_min_version.clone()))?;

        if engine_ver < min_ver {
            return Err(ConfigError::EngineVersionMismatch {
                required: self.engine_min_version.clone(),
                current: ENGINE_VERSION.to_string(),
            });
        }
        Ok(())
    }
}
