//! Feature identity
//!
//! Feature ids are small positive integers, unique within one drawing and
//! never reused. They display zero-padded to three digits ("007"), the form
//! the legacy balloon files use.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Stable identifier of a feature within a drawing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(u32);

impl FeatureId {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Id following this one
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

impl From<FeatureId> for i64 {
    fn from(id: FeatureId) -> Self {
        i64::from(id.0)
    }
}

impl TryFrom<i64> for FeatureId {
    type Error = IdParseError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .ok()
            .filter(|v| *v > 0)
            .map(FeatureId)
            .ok_or(IdParseError::OutOfRange(value))
    }
}

impl FromStr for FeatureId {
    type Err = IdParseError;

    /// Accepts "7", "007" and legacy labels such as "B007" (trailing digits)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits_start = trimmed
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i)
            .ok_or_else(|| IdParseError::NoDigits(trimmed.to_string()))?;

        let value: u64 = trimmed[digits_start..]
            .parse()
            .map_err(|_| IdParseError::NoDigits(trimmed.to_string()))?;

        i64::try_from(value)
            .map_err(|_| IdParseError::OutOfRange(i64::MAX))
            .and_then(FeatureId::try_from)
    }
}

/// Errors from parsing a feature id
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdParseError {
    #[error("'{0}' does not end in a numeric feature id")]
    NoDigits(String),

    #[error("feature id {0} is out of range")]
    OutOfRange(i64),
}
