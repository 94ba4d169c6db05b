//! Color Tables - RGB spot color to CMYK replacement data
//!
//! The layout document keeps RGB spot colors; print needs hand-picked CMYK
//! definitions. Definitions are exported from the editor as XML
//! (`<COLOR NAME="x_cmyk" C=".." M=".." Y=".." K=".."/>`), converted here to a
//! six column CSV (`rgb_name,cmyk_name,c,m,y,k`), and the CSV drives the
//! replacement inside the editor.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use xmltree::{Element, XMLNode};

/// Suffix that marks the CMYK twin of an RGB color name
pub const CMYK_SUFFIX: &str = "_cmyk";

#[derive(Debug, Error)]
pub enum ColorTableError {
    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed color XML: {0}")]
    Xml(#[from] xmltree::ParseError),

    #[error("COLOR element {index} is missing attribute {attribute}")]
    MissingAttribute { index: usize, attribute: &'static str },

    #[error("COLOR {name}: {attribute}={value:?} is not a number")]
    InvalidNumber { name: String, attribute: &'static str, value: String },

    #[error("Not an .xml file: {}", .0.display())]
    NotXml(PathBuf),
}

/// One CMYK replacement; percentages 0..=100
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmykColor {
    pub rgb_name: String,
    pub cmyk_name: String,
    pub c: f64,
    pub m: f64,
    pub y: f64,
    pub k: f64,
}

impl CmykColor {
    /// RGB name is the CMYK name without its `_cmyk` suffix (every occurrence).
    pub fn from_cmyk_name(cmyk_name: &str, c: f64, m: f64, y: f64, k: f64) -> Self {
        Self {
            rgb_name: cmyk_name.replace(CMYK_SUFFIX, ""),
            cmyk_name: cmyk_name.to_string(),
            c,
            m,
            y,
            k,
        }
    }

    /// CSV row with two decimals per channel, no line terminator.
    pub fn csv_row(&self) -> String {
        format!(
            "{},{},{:.2},{:.2},{:.2},{:.2}",
            csv_field(&self.rgb_name),
            csv_field(&self.cmyk_name),
            self.c,
            self.m,
            self.y,
            self.k
        )
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Top-level `COLOR` children of the document root, in document order.
pub fn colors_from_xml(xml: &str) -> Result<Vec<CmykColor>, ColorTableError> {
    let root = Element::parse(xml.as_bytes())?;
    root.children
        .iter()
        .filter_map(|node| match node {
            XMLNode::Element(e) if e.name == "COLOR" => Some(e),
            _ => None,
        })
        .enumerate()
        .map(|(index, element)| parse_color(index, element))
        .collect()
}

fn parse_color(index: usize, element: &Element) -> Result<CmykColor, ColorTableError> {
    let attr = |attribute: &'static str| {
        element
            .attributes
            .get(attribute)
            .ok_or(ColorTableError::MissingAttribute { index, attribute })
    };
    let name = attr("NAME")?;
    let number = |attribute: &'static str| -> Result<f64, ColorTableError> {
        let value = attr(attribute)?;
        value.trim().parse().map_err(|_| ColorTableError::InvalidNumber {
            name: name.clone(),
            attribute,
            value: value.clone(),
        })
    };
    Ok(CmykColor::from_cmyk_name(
        name,
        number("C")?,
        number("M")?,
        number("Y")?,
        number("K")?,
    ))
}

/// Convert color XML to CSV text, one `\r\n`-terminated row per COLOR,
/// the line ending spreadsheet tools and the editor script expect.
pub fn xml_to_csv(xml: &str) -> Result<String, ColorTableError> {
    let mut csv = String::new();
    for color in colors_from_xml(xml)? {
        csv.push_str(&color.csv_row());
        csv.push_str("\r\n");
    }
    Ok(csv)
}

/// `colors.xml` -> `colors.csv`
pub fn csv_path_for(xml_path: &Path) -> Result<PathBuf, ColorTableError> {
    let is_xml = xml_path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("xml"));
    if !is_xml {
        return Err(ColorTableError::NotXml(xml_path.to_path_buf()));
    }
    Ok(xml_path.with_extension("csv"))
}

/// Convert one XML file, writing the CSV next to it. Returns the CSV path.
pub fn convert_xml_file(xml_path: &Path) -> Result<PathBuf, ColorTableError> {
    let csv_path = csv_path_for(xml_path)?;
    let xml = fs::read_to_string(xml_path).map_err(|source| ColorTableError::Io {
        path: xml_path.to_path_buf(),
        source,
    })?;
    let csv = xml_to_csv(&xml)?;
    fs::write(&csv_path, csv).map_err(|source| ColorTableError::Io {
        path: csv_path.clone(),
        source,
    })?;
    info!(csv = %csv_path.display(), "conversion completed");
    Ok(csv_path)
}

/// A CSV row that had six columns but unparseable numbers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRow {
    pub line: usize,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorTable {
    pub colors: Vec<CmykColor>,
    pub rejected: Vec<RejectedRow>,
}

impl ColorTable {
    /// Lenient reader: comment lines and rows without exactly six columns are skipped,
    /// rows with bad numbers are kept aside in `rejected`.
    pub fn from_csv(text: &str) -> Self {
        let mut table = Self::default();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            let fields = split_csv_line(line);
            if fields.len() != 6 {
                debug!(line = i + 1, columns = fields.len(), "skipping row");
                continue;
            }
            let numbers: Result<Vec<f64>, _> =
                fields[2..].iter().map(|f| f.trim().parse::<f64>()).collect();
            match numbers.as_deref() {
                Ok([c, m, y, k]) => table.colors.push(CmykColor {
                    rgb_name: fields[0].clone(),
                    cmyk_name: fields[1].clone(),
                    c: *c,
                    m: *m,
                    y: *y,
                    k: *k,
                }),
                _ => table.rejected.push(RejectedRow { line: i + 1, fields }),
            }
        }
        table
    }

    pub fn load(path: &Path) -> Result<Self, ColorTableError> {
        let text = fs::read_to_string(path).map_err(|source| ColorTableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_csv(&text))
    }

    /// What the editor should do given the names in the document's palette.
    ///
    /// Every CMYK color is defined; only RGB names present in the document
    /// are replaced.
    pub fn replacement_plan(&self, document_colors: &[String]) -> ReplacementPlan {
        let mut plan = ReplacementPlan {
            rejected: self.rejected.clone(),
            ..Default::default()
        };
        for color in &self.colors {
            plan.define.push(color.clone());
            if document_colors.iter().any(|name| name == &color.rgb_name) {
                plan.replace.push(Replacement {
                    rgb_name: color.rgb_name.clone(),
                    cmyk_name: color.cmyk_name.clone(),
                });
            } else {
                plan.absent.push(color.rgb_name.clone());
            }
        }
        plan
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub rgb_name: String,
    pub cmyk_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplacementPlan {
    pub define: Vec<CmykColor>,
    pub replace: Vec<Replacement>,
    /// RGB names from the table the document does not use
    pub absent: Vec<String>,
    pub rejected: Vec<RejectedRow>,
}

/// Split one CSV line, honouring double-quoted fields.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = vec![];
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(ch),
        }
    }
    fields.push(field);
    fields
}
