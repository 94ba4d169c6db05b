//! Product Catalog - ordered list of products to render

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Codename = String;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed catalog: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Catalog record {index} is missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("Catalog record {index} has unusable codename {codename:?}")]
    InvalidCodename { index: usize, codename: String },

    #[error("Duplicate codename in catalog: {0}")]
    DuplicateCodename(Codename),
}

/// One catalog entry. Immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub codename: Codename,
    pub ean13: String,
    pub variant: String,
}

/// Wire form; every field optional so a missing one can be named.
#[derive(Debug, Deserialize)]
struct RawProduct {
    codename: Option<String>,
    ean13: Option<String>,
    variant: Option<String>,
}

/// Products in file order
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: Vec<Product>,
}

impl ProductCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, CatalogError> {
        let raw: Vec<RawProduct> = serde_json::from_str(content)?;
        let mut seen = HashSet::new();
        let mut products = Vec::with_capacity(raw.len());

        for (index, record) in raw.into_iter().enumerate() {
            let codename = record
                .codename
                .ok_or(CatalogError::MissingField { index, field: "codename" })?;
            let ean13 = record
                .ean13
                .ok_or(CatalogError::MissingField { index, field: "ean13" })?;
            let variant = record
                .variant
                .ok_or(CatalogError::MissingField { index, field: "variant" })?;

            if !is_valid_stem(&codename) {
                return Err(CatalogError::InvalidCodename { index, codename });
            }
            if !seen.insert(codename.clone()) {
                return Err(CatalogError::DuplicateCodename(codename));
            }

            products.push(Product { codename, ean13, variant });
        }

        Ok(Self { products })
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn get(&self, codename: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.codename == codename)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Codenames become file stems, so they must stay inside the output directory.
fn is_valid_stem(codename: &str) -> bool {
    !codename.is_empty()
        && codename != "."
        && codename != ".."
        && !codename.contains(['/', '\\', '\0'])
}
