//! Feature entity - one ballooned location on a drawing page

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::geometry::{self, Point, Rect};
use crate::core::identity::FeatureId;
use crate::core::status::{self, Status};
use crate::core::tolerance::Tolerance;

/// Inspection specification attached to a feature
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Measuring method (caliper, CMM, visual, ...)
    #[serde(default)]
    pub method: String,

    /// Display marker from the tolerance expression, e.g. "Ø"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nominal: Option<f64>,

    /// Lower specification limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lsl: Option<f64>,

    /// Upper specification limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usl: Option<f64>,
}

impl FeatureSpec {
    /// No nominal and no limits defined yet
    pub fn is_blank(&self) -> bool {
        self.nominal.is_none() && self.lsl.is_none() && self.usl.is_none()
    }

    pub fn from_tolerance(tolerance: &Tolerance) -> Self {
        Self {
            method: String::new(),
            marker: tolerance.marker.clone(),
            nominal: Some(tolerance.nominal),
            lsl: tolerance.lsl,
            usl: tolerance.usl,
        }
    }
}

/// A feature as persisted in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Immutable once assigned
    pub id: FeatureId,

    /// 1-based page index
    pub page: u32,

    /// Picked rectangle in document space
    pub rect: Rect,

    /// Balloon center relative to the rect center, document space
    pub balloon_offset: Point,

    pub balloon_radius: f64,

    #[serde(flatten)]
    pub spec: FeatureSpec,

    /// Zoom last used to focus this feature (view convenience only)
    pub last_zoom: f64,

    pub author: String,

    pub created: DateTime<Utc>,
}

impl Feature {
    /// Document-space center of the balloon
    pub fn balloon_anchor(&self) -> Point {
        geometry::balloon_anchor(&self.rect, self.balloon_offset)
    }

    /// Judge a raw result value against this feature's current limits
    pub fn judge(&self, value: Option<&str>) -> Status {
        status::evaluate(value, self.spec.lsl, self.spec.usl)
    }

    /// Merge the fields present in `patch`
    pub fn apply(&mut self, patch: &FeaturePatch) {
        if let Some(page) = patch.page {
            self.page = page;
        }
        if let Some(rect) = patch.rect {
            self.rect = rect;
        }
        if let Some(offset) = patch.balloon_offset {
            self.balloon_offset = offset;
        }
        if let Some(radius) = patch.balloon_radius {
            self.balloon_radius = radius;
        }
        if let Some(ref method) = patch.method {
            self.spec.method = method.clone();
        }
        if let Some(ref marker) = patch.marker {
            self.spec.marker = marker.clone();
        }
        if let Some(nominal) = patch.nominal {
            self.spec.nominal = nominal;
        }
        if let Some(lsl) = patch.lsl {
            self.spec.lsl = lsl;
        }
        if let Some(usl) = patch.usl {
            self.spec.usl = usl;
        }
        if let Some(zoom) = patch.last_zoom {
            self.last_zoom = zoom;
        }
    }

    /// Current values of exactly the fields `patch` touches
    ///
    /// Applying the returned patch after `patch` restores this feature.
    pub fn capture(&self, patch: &FeaturePatch) -> FeaturePatch {
        FeaturePatch {
            page: patch.page.map(|_| self.page),
            rect: patch.rect.map(|_| self.rect),
            balloon_offset: patch.balloon_offset.map(|_| self.balloon_offset),
            balloon_radius: patch.balloon_radius.map(|_| self.balloon_radius),
            method: patch.method.as_ref().map(|_| self.spec.method.clone()),
            marker: patch.marker.as_ref().map(|_| self.spec.marker.clone()),
            nominal: patch.nominal.map(|_| self.spec.nominal),
            lsl: patch.lsl.map(|_| self.spec.lsl),
            usl: patch.usl.map(|_| self.spec.usl),
            last_zoom: patch.last_zoom.map(|_| self.last_zoom),
        }
    }
}

/// Input for creating a feature from a picked rectangle
#[derive(Debug, Clone, PartialEq)]
pub struct NewFeature {
    pub page: u32,
    pub rect: Rect,
    pub spec: FeatureSpec,
    /// Defaults to the top-left placement for the radius
    pub balloon_offset: Option<Point>,
    /// Defaults to the configured balloon radius
    pub balloon_radius: Option<f64>,
    pub zoom: f64,
}

impl NewFeature {
    pub fn new(page: u32, rect: Rect) -> Self {
        Self {
            page,
            rect,
            spec: FeatureSpec::default(),
            balloon_offset: None,
            balloon_radius: None,
            zoom: 1.0,
        }
    }

    pub fn with_spec(mut self, spec: FeatureSpec) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = zoom;
        self
    }
}

/// Partial update; `None` leaves a field unchanged
///
/// Optional spec fields use `Option<Option<_>>` so a patch can clear them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeaturePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rect: Option<Rect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balloon_offset: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balloon_radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nominal: Option<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lsl: Option<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usl: Option<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_zoom: Option<f64>,
}

impl FeaturePatch {
    pub fn is_empty(&self) -> bool {
        *self == FeaturePatch::default()
    }

    /// Replace nominal, limits and marker with a parsed tolerance
    pub fn tolerance(tolerance: &Tolerance) -> Self {
        Self {
            marker: Some(tolerance.marker.clone()),
            nominal: Some(Some(tolerance.nominal)),
            lsl: Some(tolerance.lsl),
            usl: Some(tolerance.usl),
            ..Self::default()
        }
    }

    pub fn rect(rect: Rect) -> Self {
        Self {
            rect: Some(rect),
            ..Self::default()
        }
    }

    pub fn balloon_offset(offset: Point) -> Self {
        Self {
            balloon_offset: Some(offset),
            ..Self::default()
        }
    }

    pub fn balloon_radius(radius: f64) -> Self {
        Self {
            balloon_radius: Some(radius),
            ..Self::default()
        }
    }

    pub fn method(method: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            ..Self::default()
        }
    }

    pub fn last_zoom(zoom: f64) -> Self {
        Self {
            last_zoom: Some(zoom),
            ..Self::default()
        }
    }

    /// True when the patch changes anything besides `last_zoom`
    pub fn is_structural(&self) -> bool {
        let without_zoom = FeaturePatch {
            last_zoom: None,
            ..self.clone()
        };
        !without_zoom.is_empty()
    }
}
