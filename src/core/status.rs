//! PASS/FAIL derivation for inspection results
//!
//! Status is never stored as truth. It is re-derived from the raw result text
//! and the feature's current limits every time it is displayed, so editing a
//! feature's limits re-judges existing results without rewriting them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Derived judgement of a single result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Fail,
    /// No value, or a numeric value without both limits
    Unset,
    /// Text that is neither a keyword nor a number
    Invalid,
}

impl Status {
    /// Label used in tables and exports
    pub fn label(&self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
            Status::Unset => "-",
            Status::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Keyword a result may be entered as instead of a number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Pass,
    Fail,
}

/// Recognize `p`/`pass` and `f`/`fail`, case-insensitively
pub fn keyword(value: &str) -> Option<Keyword> {
    match value.trim().to_ascii_lowercase().as_str() {
        "p" | "pass" => Some(Keyword::Pass),
        "f" | "fail" => Some(Keyword::Fail),
        _ => None,
    }
}

/// Canonical stored form of a typed result: keywords become `Pass`/`Fail`,
/// everything else is trimmed
pub fn normalize_entry(value: &str) -> String {
    match keyword(value) {
        Some(Keyword::Pass) => "Pass".to_string(),
        Some(Keyword::Fail) => "Fail".to_string(),
        None => value.trim().to_string(),
    }
}

/// Parse a numeric result; non-finite values are not measurements
pub fn numeric(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Judge a result value against optional limits
pub fn evaluate(value: Option<&str>, lsl: Option<f64>, usl: Option<f64>) -> Status {
    let text = match value.map(str::trim) {
        Some(text) if !text.is_empty() => text,
        _ => return Status::Unset,
    };

    match keyword(text) {
        Some(Keyword::Pass) => return Status::Pass,
        Some(Keyword::Fail) => return Status::Fail,
        None => {}
    }

    let Some(measured) = numeric(text) else {
        return Status::Invalid;
    };

    match (lsl, usl) {
        (Some(lower), Some(upper)) if lower <= measured && measured <= upper => Status::Pass,
        (Some(_), Some(_)) => Status::Fail,
        _ => Status::Unset,
    }
}
