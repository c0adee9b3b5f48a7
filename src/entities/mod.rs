//! Persisted record types

pub mod feature;
pub mod result;

pub use feature::{Feature, FeaturePatch, FeatureSpec, NewFeature};
pub use result::{InspectionResult, ResultRevision, WorkOrderSummary};
