//! Palette Resolver - variant key to concrete ink/background colors
//!
//! Two lookups: variant -> semantic color names -> hex values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaletteError {
    #[error("Unknown color variant: {0}")]
    UnknownVariant(String),

    #[error("Variant {variant} references unknown color: {color}")]
    UnknownColor { variant: String, color: String },

    #[error("Invalid hex color {0:?}: expected 6 hex digits without '#'")]
    InvalidHex(String),
}

/// 6-digit RGB hex value without `#`, e.g. `270e02`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor(String);

impl HexColor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for HexColor {
    type Error = PaletteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.len() == 6 && value.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(value))
        } else {
            Err(PaletteError::InvalidHex(value))
        }
    }
}

impl TryFrom<&str> for HexColor {
    type Error = PaletteError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

impl From<HexColor> for String {
    fn from(value: HexColor) -> Self {
        value.0
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Semantic color name to hex value
pub type Palette = BTreeMap<String, HexColor>;

/// Variant key to semantic color pair
pub type VariantTable = BTreeMap<String, ColorVariant>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorVariant {
    pub fg: String,
    pub bg: String,
}

/// Resolved colors for one variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorPair {
    pub foreground: HexColor,
    pub background: HexColor,
}

pub struct PaletteResolver<'a> {
    palette: &'a Palette,
    variants: &'a VariantTable,
}

impl<'a> PaletteResolver<'a> {
    pub fn new(palette: &'a Palette, variants: &'a VariantTable) -> Self {
        Self { palette, variants }
    }

    pub fn resolve(&self, variant: &str) -> Result<ColorPair, PaletteError> {
        let names = self
            .variants
            .get(variant)
            .ok_or_else(|| PaletteError::UnknownVariant(variant.to_string()))?;

        Ok(ColorPair {
            foreground: self.lookup(variant, &names.fg)?,
            background: self.lookup(variant, &names.bg)?,
        })
    }

    /// Resolve every variant in the table, in key order.
    pub fn resolve_all(&self) -> Result<Vec<(&'a str, ColorPair)>, PaletteError> {
        let variants: &'a VariantTable = self.variants;
        variants
            .keys()
            .map(|key| Ok((key.as_str(), self.resolve(key)?)))
            .collect()
    }

    fn lookup(&self, variant: &str, color: &str) -> Result<HexColor, PaletteError> {
        self.palette
            .get(color)
            .cloned()
            .ok_or_else(|| PaletteError::UnknownColor {
                variant: variant.to_string(),
                color: color.to_string(),
            })
    }
}

/// Built-in palette
pub fn default_palette() -> Palette {
    [
        ("amber10", "fffdf5"),
        ("amber990", "270e02"),
        ("yellow10", "fefef6"),
        ("yellow990", "271102"),
        ("rose10", "fffafa"),
        ("rose990", "26030b"),
    ]
    .into_iter()
    .map(|(name, hex)| (name.to_string(), HexColor(hex.to_string())))
    .collect()
}

/// Built-in product variants
pub fn default_variants() -> VariantTable {
    [
        ("sntolj100", "rose990", "rose10"),
        ("sntolj500", "rose990", "rose10"),
        ("jabsok330", "amber990", "amber10"),
        ("jabsok750", "amber990", "amber10"),
        ("jabkis500", "amber990", "amber10"),
        ("bzgkis500", "yellow990", "yellow10"),
    ]
    .into_iter()
    .map(|(key, fg, bg)| {
        (
            key.to_string(),
            ColorVariant { fg: fg.to_string(), bg: bg.to_string() },
        )
    })
    .collect()
}
