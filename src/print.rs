//! Print Authority System
//!
//! Defines where the physical scale of a barcode comes from.

use serde::{Deserialize, Serialize};

/// Nominal EAN-13 module width at 100% magnification.
pub const NOMINAL_X_DIMENSION_MM: f64 = 0.33;

/// Module width used by default: 80% magnification.
pub const DEFAULT_X_DIMENSION_MM: f64 = 0.264;

/// Reference resolution the layout tool assumes when importing SVG.
///
/// Found empirically: at 72 dpi one SVG unit imports as one point, so the
/// encoder's module width lands on the intended millimetre value. A
/// different consumer needs its own calibration.
pub const DEFAULT_REFERENCE_DPI: u32 = 72;

/// PrintAuthority determines where print specifications come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintAuthority {
    /// Built-in calibration
    #[default]
    System,
    /// Values from a configuration file
    Config,
    /// Command line overrides (range checked)
    User,
}

/// Physical scale of the generated symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintSpec {
    #[serde(default)]
    pub authority: PrintAuthority,
    pub x_dimension_mm: f64,
    pub reference_dpi: u32,
}

impl Default for PrintSpec {
    fn default() -> Self {
        Self {
            authority: PrintAuthority::System,
            x_dimension_mm: DEFAULT_X_DIMENSION_MM,
            reference_dpi: DEFAULT_REFERENCE_DPI,
        }
    }
}

impl PrintSpec {
    /// Create from a configuration file
    pub fn from_config(x_dimension_mm: f64, reference_dpi: u32) -> Self {
        Self {
            authority: PrintAuthority::Config,
            x_dimension_mm,
            reference_dpi,
        }
    }

    /// Create from user with validation
    pub fn from_user(x_dimension_mm: f64, reference_dpi: u32) -> Result<Self, &'static str> {
        if !(72..=1200).contains(&reference_dpi) {
            return Err("Reference DPI must be between 72 and 1200");
        }
        if !(0.1..=1.0).contains(&x_dimension_mm) {
            return Err("X-dimension must be between 0.1 and 1.0 mm");
        }
        Ok(Self {
            authority: PrintAuthority::User,
            x_dimension_mm,
            reference_dpi,
        })
    }

    /// Magnification relative to the nominal EAN-13 module, in percent.
    pub fn magnification_percent(&self) -> f64 {
        self.x_dimension_mm / NOMINAL_X_DIMENSION_MM * 100.0
    }

    /// Encoder scale argument value, e.g. `0.264mm,72dpi`.
    pub fn scale_argument(&self) -> String {
        format!("{}mm,{}dpi", self.x_dimension_mm, self.reference_dpi)
    }
}
