//! Raster Exporter - optional SVG to PNG stage
//!
//! Off unless the caller opts in. SVG stays the primary deliverable, so a
//! failure here is reported but never undoes or blocks SVG generation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::encoder::ensure_dir;
use crate::process::{CommandRunner, CommandSpec};

pub const DEFAULT_RASTERIZER: &str = "magick";

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Rasterizer failed on {}: {diagnostics}", .svg.display())]
    Failed { svg: PathBuf, diagnostics: String },

    #[error("Cannot derive a PNG name from {}", .0.display())]
    BadSource(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RasterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_rasterizer")]
    pub program: String,
}

fn default_rasterizer() -> String {
    DEFAULT_RASTERIZER.to_string()
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self { enabled: false, program: default_rasterizer() }
    }
}

pub struct RasterExporter {
    program: String,
    png_dir: PathBuf,
}

impl RasterExporter {
    pub fn new(program: impl Into<String>, png_dir: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), png_dir: png_dir.into() }
    }

    /// `<png_dir>/<stem>.png` for an SVG artifact
    pub fn target_for(&self, svg: &Path) -> Result<PathBuf, RasterError> {
        let stem = svg.file_stem().ok_or_else(|| RasterError::BadSource(svg.to_path_buf()))?;
        let mut name = stem.to_os_string();
        name.push(".png");
        Ok(self.png_dir.join(name))
    }

    /// Conversion keeps the SVG's intrinsic size; no density or resize flags.
    pub fn command(&self, svg: &Path, png: &Path) -> CommandSpec {
        CommandSpec::new(&self.program)
            .arg(svg.display().to_string())
            .arg(png.display().to_string())
    }

    pub fn export(
        &self,
        runner: &mut dyn CommandRunner,
        svg: &Path,
    ) -> Result<PathBuf, RasterError> {
        let png = self.target_for(svg)?;
        ensure_dir(&self.png_dir)?;

        let command = self.command(svg, &png);
        let output = runner.run(&command).map_err(|source| RasterError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !output.success {
            return Err(RasterError::Failed {
                svg: svg.to_path_buf(),
                diagnostics: output.diagnostics(),
            });
        }
        Ok(png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_lands_in_png_dir_with_same_stem() {
        let exporter = RasterExporter::new("magick", "out/png");
        let png = exporter.target_for(Path::new("out/svg/jabsok330.svg")).unwrap();
        assert_eq!(png, PathBuf::from("out/png/jabsok330.png"));

        let cmd = exporter.command(Path::new("out/svg/jabsok330.svg"), &png);
        assert_eq!(cmd.program, "magick");
        assert_eq!(cmd.args, ["out/svg/jabsok330.svg", "out/png/jabsok330.png"]);
    }

    #[test]
    fn disabled_by_default() {
        assert!(!RasterConfig::default().enabled);
    }
}
