//! Validation System - Rule/Policy Separation
//!
//! Rules produce structured violations for a render job.
//! Errors block the encoder from running; warnings are only recorded.

use serde::{Deserialize, Serialize};
use crate::encoder::RenderJob;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<ValidationViolation>,
    pub codename: String,
}

impl ValidationResult {
    pub fn errors(&self) -> impl Iterator<Item = &ValidationViolation> {
        self.violations.iter().filter(|v| v.severity == ViolationSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationViolation> {
        self.violations.iter().filter(|v| v.severity == ViolationSeverity::Warning)
    }

    /// Error messages joined for a one-line failure cause
    pub fn error_summary(&self) -> String {
        self.errors()
            .map(|v| v.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validation rule trait - produces violations
pub trait ValidationRule {
    fn name(&self) -> &'static str;
    fn validate(&self, job: &RenderJob) -> Vec<ValidationViolation>;
}

/// EAN-13 check digit for the first 12 digits, or `None` if they are not 12 ASCII digits.
pub fn ean13_check_digit(first_twelve: &str) -> Option<u8> {
    if first_twelve.len() != 12 || !first_twelve.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let sum: u32 = first_twelve
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let digit = u32::from(b - b'0');
            if i % 2 == 0 { digit } else { digit * 3 }
        })
        .sum();
    Some(((10 - sum % 10) % 10) as u8)
}

/// True for 13 ASCII digits with a correct GTIN check digit.
pub fn is_valid_ean13(payload: &str) -> bool {
    if payload.len() != 13 {
        return false;
    }
    let body = payload.get(..12).and_then(ean13_check_digit);
    match (body, payload.as_bytes().get(12).copied()) {
        (Some(expected), Some(actual)) if actual.is_ascii_digit() => expected == actual - b'0',
        _ => false,
    }
}

// --- Concrete Rules ---

pub struct Ean13DigitsRule;

impl ValidationRule for Ean13DigitsRule {
    fn name(&self) -> &'static str { "ean13_digits" }

    fn validate(&self, job: &RenderJob) -> Vec<ValidationViolation> {
        let payload = &job.ean13;
        if payload.len() == 13 && payload.bytes().all(|b| b.is_ascii_digit()) {
            return vec![];
        }
        vec![ValidationViolation {
            rule: self.name().to_string(),
            severity: ViolationSeverity::Error,
            message: format!("EAN-13 payload must be exactly 13 digits, got {payload:?}"),
            expected: Some("13 digits".to_string()),
            actual: Some(payload.clone()),
        }]
    }
}

pub struct Ean13CheckDigitRule;

impl ValidationRule for Ean13CheckDigitRule {
    fn name(&self) -> &'static str { "ean13_check_digit" }

    fn validate(&self, job: &RenderJob) -> Vec<ValidationViolation> {
        // Shape problems are reported by Ean13DigitsRule
        if job.ean13.len() != 13 || is_valid_ean13(&job.ean13) {
            return vec![];
        }
        let Some(expected) = job.ean13.get(..12).and_then(ean13_check_digit) else {
            return vec![];
        };
        vec![ValidationViolation {
            rule: self.name().to_string(),
            severity: ViolationSeverity::Error,
            message: format!("Invalid check digit in {}, expected {expected}", job.ean13),
            expected: Some(expected.to_string()),
            actual: job.ean13.get(12..).map(str::to_string),
        }]
    }
}

pub struct ColorContrastRule;

impl ValidationRule for ColorContrastRule {
    fn name(&self) -> &'static str { "color_contrast" }

    fn validate(&self, job: &RenderJob) -> Vec<ValidationViolation> {
        let fg = job.colors.foreground.as_str();
        let bg = job.colors.background.as_str();
        if !fg.eq_ignore_ascii_case(bg) {
            return vec![];
        }
        vec![ValidationViolation {
            rule: self.name().to_string(),
            severity: ViolationSeverity::Warning,
            message: format!("Foreground and background are both {fg}; bars will not scan"),
            expected: Some("distinct colors".to_string()),
            actual: Some(fg.to_string()),
        }]
    }
}

/// Validator runs every rule; any error makes the job invalid.
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(Ean13DigitsRule),
                Box::new(Ean13CheckDigitRule),
                Box::new(ColorContrastRule),
            ],
        }
    }

    pub fn validate(&self, job: &RenderJob) -> ValidationResult {
        let violations: Vec<_> = self.rules.iter()
            .flat_map(|rule| rule.validate(job))
            .collect();

        let valid = !violations.iter().any(|v| v.severity == ViolationSeverity::Error);

        ValidationResult {
            valid,
            violations,
            codename: job.codename.clone(),
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}
