//! Barcode Encoder Invoker
//!
//! Builds the encoder argument list for one [`RenderJob`] and runs it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::palette::ColorPair;
use crate::print::PrintSpec;
use crate::process::{CommandRunner, CommandSpec};

pub const DEFAULT_ENCODER: &str = "zint";

/// zint's selector for EAN-13 (and the other EAN/UPC family members)
pub const EAN_SYMBOLOGY: &str = "EANX";

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("{codename}: invalid EAN-13 payload: {reason}")]
    InvalidPayload { codename: String, reason: String },

    #[error("{codename}: failed to run {program}: {source}")]
    Spawn {
        codename: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{codename}: encoder exited with {}: {diagnostics}", exit_label(.status))]
    Rejected {
        codename: String,
        status: Option<i32>,
        diagnostics: String,
    },

    #[error("{codename}: encoder reported success but {} was not written", .path.display())]
    MissingOutput { codename: String, path: PathBuf },

    #[error("{codename}: {source}")]
    Io {
        codename: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "signal".to_string(),
    }
}

impl EncodeError {
    pub fn codename(&self) -> &str {
        match self {
            Self::InvalidPayload { codename, .. }
            | Self::Spawn { codename, .. }
            | Self::Rejected { codename, .. }
            | Self::MissingOutput { codename, .. }
            | Self::Io { codename, .. } => codename,
        }
    }
}

/// Everything needed to render one product. Built fresh per product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
    pub codename: String,
    pub ean13: String,
    pub print: PrintSpec,
    pub colors: ColorPair,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderConfig {
    #[serde(default = "default_encoder")]
    pub program: String,
}

fn default_encoder() -> String {
    DEFAULT_ENCODER.to_string()
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self { program: default_encoder() }
    }
}

pub struct BarcodeEncoder {
    config: EncoderConfig,
}

impl BarcodeEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Argument list for one job. Nothing is executed.
    pub fn command(&self, job: &RenderJob) -> CommandSpec {
        CommandSpec::new(&self.config.program)
            .arg(format!("--barcode={EAN_SYMBOLOGY}"))
            .arg(format!("--data={}", job.ean13))
            .arg(format!("--scalexdimdp={}", job.print.scale_argument()))
            .arg("--quietzones")
            .arg("--compliantheight")
            .arg(format!("--fg={}", job.colors.foreground))
            .arg(format!("--bg={}", job.colors.background))
            .arg(format!("--output={}", job.output.display()))
    }

    /// Render one job, overwriting any previous artifact.
    pub fn encode(
        &self,
        runner: &mut dyn CommandRunner,
        job: &RenderJob,
    ) -> Result<PathBuf, EncodeError> {
        if let Some(parent) = job.output.parent() {
            ensure_dir(parent).map_err(|source| EncodeError::Io {
                codename: job.codename.clone(),
                source,
            })?;
        }

        let command = self.command(job);
        debug!(codename = %job.codename, args = ?command.args, "encoding");

        let output = runner.run(&command).map_err(|source| EncodeError::Spawn {
            codename: job.codename.clone(),
            program: command.program.clone(),
            source,
        })?;

        if !output.success {
            return Err(EncodeError::Rejected {
                codename: job.codename.clone(),
                status: output.status,
                diagnostics: output.diagnostics(),
            });
        }

        if !job.output.is_file() {
            return Err(EncodeError::MissingOutput {
                codename: job.codename.clone(),
                path: job.output.clone(),
            });
        }

        Ok(job.output.clone())
    }
}

impl Default for BarcodeEncoder {
    fn default() -> Self {
        Self::new(EncoderConfig::default())
    }
}

/// Create a directory tree; no-op when it already exists.
pub fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}
