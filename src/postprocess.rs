//! Post-Processor - font token normalization for generated SVG
//!
//! The encoder names its human-readable font `OCRB, monospace` at 7.5 units;
//! the layout tool knows the face as `OCR B` and renders it slightly larger,
//! so both tokens are rewritten after encoding.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PostProcessError {
    #[error("Substitution token must not be empty")]
    EmptyToken,

    #[error("Replacing {find:?} with {replace:?} would not be idempotent")]
    NotIdempotent { find: String, replace: String },

    #[error("Failed to normalize {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Literal whole-file replacement of one token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSubstitution {
    pub find: String,
    pub replace: String,
}

impl TokenSubstitution {
    pub fn new(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self { find: find.into(), replace: replace.into() }
    }
}

/// Font family and size fixes for the layout tool
pub fn default_substitutions() -> Vec<TokenSubstitution> {
    vec![
        TokenSubstitution::new("OCRB, monospace", "OCR B"),
        TokenSubstitution::new(r#"font-size="7.5""#, r#"font-size="7""#),
    ]
}

/// Which files are normalized during a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationScope {
    /// Only the file each product just produced
    Produced,
    /// Every SVG in the output directory, once after encoding
    #[default]
    Directory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationReport {
    pub files_scanned: usize,
    pub files_rewritten: usize,
    /// Replacement count per search token
    pub replacements: BTreeMap<String, usize>,
}

impl NormalizationReport {
    pub fn total_replacements(&self) -> usize {
        self.replacements.values().sum()
    }

    pub fn merge(&mut self, other: NormalizationReport) {
        self.files_scanned += other.files_scanned;
        self.files_rewritten += other.files_rewritten;
        for (token, count) in other.replacements {
            *self.replacements.entry(token).or_default() += count;
        }
    }

    fn absorb(&mut self, counts: &[usize], substitutions: &[TokenSubstitution]) {
        self.files_scanned += 1;
        if counts.iter().any(|&c| c > 0) {
            self.files_rewritten += 1;
        }
        for (sub, count) in substitutions.iter().zip(counts) {
            *self.replacements.entry(sub.find.clone()).or_default() += count;
        }
    }
}

#[derive(Debug, Clone)]
pub struct FontNormalizer {
    substitutions: Vec<TokenSubstitution>,
}

impl FontNormalizer {
    /// Rejects any set where a replacement would reintroduce a search token,
    /// either on its own or together with the bytes around it.
    pub fn new(substitutions: Vec<TokenSubstitution>) -> Result<Self, PostProcessError> {
        if substitutions.iter().any(|sub| sub.find.is_empty()) {
            return Err(PostProcessError::EmptyToken);
        }
        for sub in &substitutions {
            if substitutions.iter().any(|other| reintroduces(&sub.replace, &other.find)) {
                return Err(PostProcessError::NotIdempotent {
                    find: sub.find.clone(),
                    replace: sub.replace.clone(),
                });
            }
        }
        Ok(Self { substitutions })
    }

    pub fn substitutions(&self) -> &[TokenSubstitution] {
        &self.substitutions
    }

    /// Apply every substitution; returns the new bytes and per-substitution counts.
    ///
    /// Works on raw bytes so SVGs in foreign encodings pass through untouched.
    pub fn normalize_bytes(&self, bytes: &[u8]) -> (Vec<u8>, Vec<usize>) {
        let mut out = bytes.to_vec();
        let mut counts = Vec::with_capacity(self.substitutions.len());
        for sub in &self.substitutions {
            let (replaced, count) = replace_bytes(&out, sub.find.as_bytes(), sub.replace.as_bytes());
            if count > 0 {
                out = replaced;
            }
            counts.push(count);
        }
        (out, counts)
    }

    pub fn normalize_text(&self, text: &str) -> (String, Vec<usize>) {
        let (out, counts) = self.normalize_bytes(text.as_bytes());
        (String::from_utf8_lossy(&out).into_owned(), counts)
    }

    /// Normalize one file in place. Untouched files are not rewritten, and a
    /// result that a second pass would still change is refused unwritten.
    pub fn normalize_file(&self, path: &Path) -> Result<NormalizationReport, PostProcessError> {
        let io_err = |source| PostProcessError::Io { path: path.to_path_buf(), source };

        let bytes = fs::read(path).map_err(io_err)?;
        let (normalized, counts) = self.normalize_bytes(&bytes);

        if normalized != bytes {
            self.ensure_settled(&normalized)?;
            write_replacing(path, &normalized).map_err(io_err)?;
        }
        debug!(path = %path.display(), ?counts, "normalized");

        let mut report = NormalizationReport::default();
        report.absorb(&counts, &self.substitutions);
        Ok(report)
    }

    fn ensure_settled(&self, normalized: &[u8]) -> Result<(), PostProcessError> {
        let (_, counts) = self.normalize_bytes(normalized);
        match self.substitutions.iter().zip(counts).find(|(_, count)| *count > 0) {
            Some((sub, _)) => Err(PostProcessError::NotIdempotent {
                find: sub.find.clone(),
                replace: sub.replace.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Normalize every `*.svg` directly inside `dir`. A missing directory has nothing to do.
    pub fn normalize_dir(&self, dir: &Path) -> Result<NormalizationReport, PostProcessError> {
        let mut report = NormalizationReport::default();
        for path in svg_files(dir).map_err(|source| PostProcessError::Io {
            path: dir.to_path_buf(),
            source,
        })? {
            report.merge(self.normalize_file(&path)?);
        }
        Ok(report)
    }
}

impl Default for FontNormalizer {
    fn default() -> Self {
        Self { substitutions: default_substitutions() }
    }
}

/// True when `replace` contains `find`, or its edges could complete a
/// partial `find` with the neighbouring bytes.
fn reintroduces(replace: &str, find: &str) -> bool {
    let (replace, find) = (replace.as_bytes(), find.as_bytes());
    if contains_bytes(replace, find) {
        return true;
    }
    (1..find.len()).any(|n| {
        replace.ends_with(&find[..n]) || replace.starts_with(&find[find.len() - n..])
    })
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Leftmost, non-overlapping literal replacement. `find` must not be empty.
fn replace_bytes(haystack: &[u8], find: &[u8], replace: &[u8]) -> (Vec<u8>, usize) {
    let mut out = Vec::with_capacity(haystack.len());
    let mut count = 0;
    let mut rest = haystack;
    while !rest.is_empty() {
        if rest.starts_with(find) {
            out.extend_from_slice(replace);
            rest = &rest[find.len()..];
            count += 1;
        } else {
            out.push(rest[0]);
            rest = &rest[1..];
        }
    }
    (out, count)
}

/// SVG files in `dir`, sorted by path
pub fn svg_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }
    let mut files = vec![];
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_svg = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("svg"));
        if is_svg && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Write next to the target then rename, so an interrupted run never leaves a truncated SVG.
fn write_replacing(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCODER_TEXT: &str =
        r#"<text x="10" y="40" font-family="OCRB, monospace" font-size="7.5">4</text>"#;

    #[test]
    fn rewrites_both_tokens() {
        let (out, counts) = FontNormalizer::default().normalize_text(ENCODER_TEXT);
        assert_eq!(counts, [1, 1]);
        assert!(out.contains(r#"font-family="OCR B" font-size="7""#));
        assert!(!out.contains("OCRB, monospace"));
        assert!(!out.contains(r#"font-size="7.5""#));
    }

    #[test]
    fn second_pass_is_noop() {
        let normalizer = FontNormalizer::default();
        let (once, _) = normalizer.normalize_text(ENCODER_TEXT);
        let (twice, counts) = normalizer.normalize_text(&once);
        assert_eq!(once, twice);
        assert_eq!(counts, [0, 0]);
    }

    #[test]
    fn rejects_self_reintroducing_substitution() {
        let err = FontNormalizer::new(vec![TokenSubstitution::new("7", "7.5")]).unwrap_err();
        assert!(matches!(err, PostProcessError::NotIdempotent { .. }));
        assert!(matches!(
            FontNormalizer::new(vec![TokenSubstitution::new("", "x")]),
            Err(PostProcessError::EmptyToken)
        ));
    }

    #[test]
    fn rejects_replacement_that_completes_a_token_with_its_neighbours() {
        // "a   b" -> "a  b" -> "a b" would keep changing
        let err = FontNormalizer::new(vec![TokenSubstitution::new("  ", " ")]).unwrap_err();
        assert!(matches!(err, PostProcessError::NotIdempotent { .. }));

        // across two rules: "XY" ends with the start of "YZ"
        let err = FontNormalizer::new(vec![
            TokenSubstitution::new("Q", "XY"),
            TokenSubstitution::new("YZ", "W"),
        ])
        .unwrap_err();
        assert!(matches!(err, PostProcessError::NotIdempotent { .. }));

        assert!(FontNormalizer::new(default_substitutions()).is_ok());
    }

    #[test]
    fn unsettled_result_is_refused_unwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.svg");
        fs::write(&path, "aabb").unwrap();

        // deleting "ab" from "aabb" leaves another "ab"
        let normalizer = FontNormalizer::new(vec![TokenSubstitution::new("ab", "")]).unwrap();
        let err = normalizer.normalize_file(&path).unwrap_err();

        assert!(matches!(err, PostProcessError::NotIdempotent { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "aabb");
    }

    #[test]
    fn non_utf8_file_is_normalized_bytewise() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.svg");
        let mut contents = b"<text font-family=\"OCRB, monospace\">Caf\xe9 \xff</text>".to_vec();
        contents.extend_from_slice(br#" font-size="7.5""#);
        fs::write(&path, &contents).unwrap();

        let report = FontNormalizer::default().normalize_file(&path).unwrap();

        assert_eq!(report.files_rewritten, 1);
        assert_eq!(report.total_replacements(), 2);
        assert_eq!(
            fs::read(&path).unwrap(),
            b"<text font-family=\"OCR B\">Caf\xe9 \xff</text> font-size=\"7\"".to_vec()
        );
    }

    #[test]
    fn directory_sweep_counts_and_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.svg"), ENCODER_TEXT).unwrap();
        fs::write(dir.path().join("b.svg"), "<svg/>").unwrap();
        fs::write(dir.path().join("notes.txt"), ENCODER_TEXT).unwrap();

        let report = FontNormalizer::default().normalize_dir(dir.path()).unwrap();
        assert_eq!(report.files_scanned, 2);
        assert_eq!(report.files_rewritten, 1);
        assert_eq!(report.total_replacements(), 2);

        let untouched = fs::read_to_string(dir.path().join("notes.txt")).unwrap();
        assert_eq!(untouched, ENCODER_TEXT);
        assert!(!dir.path().join("a.svg.tmp").exists());
    }

    #[test]
    fn missing_directory_is_empty() {
        let report = FontNormalizer::default()
            .normalize_dir(Path::new("/nonexistent/svg"))
            .unwrap();
        assert_eq!(report, NormalizationReport::default());
    }
}
