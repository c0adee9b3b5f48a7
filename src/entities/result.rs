//! Result entity - one measurement for a (feature, work order) pair

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::identity::FeatureId;
use crate::core::status::Status;
use crate::entities::feature::Feature;

/// Live measurement entry
///
/// The status is not stored; derive it with [`InspectionResult::status`]
/// against the feature's current limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionResult {
    pub feature_id: FeatureId,

    /// Work order or serial the measurement belongs to
    pub work_order: String,

    /// Raw entered text, normalized (`Pass`, `Fail` or the typed number)
    pub value: String,

    /// Time of the last write
    pub recorded_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_by: Option<String>,
}

impl InspectionResult {
    pub fn status(&self, feature: &Feature) -> Status {
        feature.judge(Some(&self.value))
    }
}

/// A superseded result value from the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRevision {
    pub feature_id: FeatureId,
    pub work_order: String,
    pub value: String,
    pub recorded_at: DateTime<Utc>,
    pub superseded_at: DateTime<Utc>,
}

/// Work order with a summary of its results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkOrderSummary {
    pub work_order: String,
    pub results: usize,
    pub last_recorded: Option<DateTime<Utc>>,
}

/// Validate and trim a work order identifier
pub fn normalize_work_order(work_order: &str) -> Option<String> {
    let trimmed = work_order.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_work_order() {
        assert_eq!(normalize_work_order(" WO1 ").as_deref(), Some("WO1"));
        assert_eq!(normalize_work_order("   "), None);
    }
}
