//! Hashing System - SHA-256 for jobs, reports and artwork geometry
//!
//! Provides deterministic hashes so reruns can be compared.

use sha2::{Sha256, Digest};
use serde::Serialize;
use serde_json::{Value, to_string};
use xmltree::{Element, XMLNode};

use crate::encoder::RenderJob;

/// Elements that carry no geometry (tool names, dates, titles)
const NON_GEOMETRY_ELEMENTS: [&str; 3] = ["metadata", "desc", "title"];

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    let sorted = sort_value(&v);
    to_string(&sorted)
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let sorted_map: serde_json::Map<String, Value> = sorted
                .into_iter()
                .map(|(k, v)| (k.clone(), sort_value(v)))
                .collect();
            Value::Object(sorted_map)
        }
        Value::Array(arr) => {
            Value::Array(arr.iter().map(sort_value).collect())
        }
        _ => v.clone()
    }
}

/// Compute manifest hash for a report
pub fn compute_manifest_hash<T: Serialize>(manifest: &T) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(manifest)?;
    Ok(sha256_hex(canonical.as_bytes()))
}

/// job_hash = sha256(codename + canonical_job + engine_version)
pub fn compute_job_hash(job: &RenderJob, engine_version: &str) -> Result<String, serde_json::Error> {
    let canonical_job = canonical_json(job)?;
    let combined = format!("{}:{}:{}", job.codename, canonical_job, engine_version);
    Ok(sha256_hex(combined.as_bytes()))
}

/// Hash of an SVG's drawing content.
///
/// Comments, processing instructions and metadata elements are dropped,
/// attributes are sorted and whitespace-only text is ignored, so two files
/// with the same bars and text hash equally.
pub fn svg_geometry_hash(svg: &str) -> Result<String, xmltree::ParseError> {
    let root = Element::parse(svg.as_bytes())?;
    let mut canonical = String::new();
    write_geometry(&root, &mut canonical);
    Ok(sha256_hex(canonical.as_bytes()))
}

fn write_geometry(element: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&element.name);

    let mut attributes: Vec<_> = element.attributes.iter().collect();
    attributes.sort();
    for (name, value) in attributes {
        out.push_str(&format!(" {name}={value:?}"));
    }
    out.push('>');

    for child in &element.children {
        match child {
            XMLNode::Element(child) if !NON_GEOMETRY_ELEMENTS.contains(&child.name.as_str()) => {
                write_geometry(child, out);
            }
            XMLNode::Text(text) | XMLNode::CData(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    out.push_str(&format!("{text:?}"));
                }
            }
            _ => {}
        }
    }

    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

// We need hex encoding
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BARS: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20">
<desc>Zint Generated Symbol</desc>
<g id="barcode" fill="#270E02"><rect x="2" y="0" width="1" height="20"/></g>
</svg>"##;

    #[test]
    fn test_canonical_json_sorted() {
        let obj = json!({"z": 1, "a": 2, "m": 3});
        let canonical = canonical_json(&obj).unwrap();
        assert_eq!(canonical, r#"{"a":2,"m":3,"z":1}"#);
    }

    #[test]
    fn test_hash_deterministic() {
        let data = b"test data";
        let h1 = sha256_hex(data);
        let h2 = sha256_hex(data);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn geometry_hash_ignores_metadata_and_comments() {
        let annotated = BARS
            .replace("<desc>Zint Generated Symbol</desc>", "<desc>Generated 2026-10-16</desc><!-- run 7 -->")
            .replace(r#"<rect x="2" y="0""#, r#"<rect y="0" x="2""#);
        assert_eq!(
            svg_geometry_hash(BARS).unwrap(),
            svg_geometry_hash(&annotated).unwrap()
        );
    }

    #[test]
    fn geometry_hash_sees_bar_changes() {
        let moved = BARS.replace(r#"x="2""#, r#"x="3""#);
        assert_ne!(svg_geometry_hash(BARS).unwrap(), svg_geometry_hash(&moved).unwrap());
        assert!(svg_geometry_hash("<svg").is_err());
    }
}
