//! Document-space geometry and the view transform
//!
//! Feature geometry is stored once, in document units (PDF points). Zoom and
//! pan only change the [`ViewTransform`] used to draw it; nothing here mutates
//! stored rects or balloon offsets.

use serde::{Deserialize, Serialize};

use crate::core::error::{AxisError, Result};

/// Smallest zoom the view allows
pub const MIN_ZOOM: f64 = 0.2;

/// Largest zoom the view allows
pub const MAX_ZOOM: f64 = 40.0;

/// Per-notch multiplier base for wheel zoom
const WHEEL_ZOOM_BASE: f64 = 1.0015;

/// A point (or offset) in one coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset_by(&self, delta: Point) -> Point {
        Point::new(self.x + delta.x, self.y + delta.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned rectangle, origin at top-left
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Rectangle spanned by two opposite corners, in any order
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            w: (a.x - b.x).abs(),
            h: (a.y - b.y).abs(),
        }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.w.is_finite() && self.h.is_finite()
    }

    /// Reject rects smaller than `min_size` in either dimension
    pub fn validate_pick(&self, min_size: f64) -> Result<()> {
        if !self.is_finite() {
            return Err(AxisError::validation("pick rectangle has non-finite coordinates"));
        }
        if self.w < min_size || self.h < min_size {
            return Err(AxisError::validation(format!(
                "pick rectangle {:.1}x{:.1} is smaller than the minimum {:.1}x{:.1}",
                self.w, self.h, min_size, min_size
            )));
        }
        Ok(())
    }
}

/// Uniform scale plus pan, mapping document space to view space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewTransform {
    zoom: f64,
    /// View-space position of the document origin
    pan: Point,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan: Point::default(),
        }
    }
}

impl ViewTransform {
    /// Transform with the given zoom, clamped to the allowed range
    pub fn new(zoom: f64) -> Result<Self> {
        Self::with_pan(zoom, Point::default())
    }

    pub fn with_pan(zoom: f64, pan: Point) -> Result<Self> {
        if !(zoom.is_finite() && zoom > 0.0) {
            return Err(AxisError::validation(format!(
                "zoom must be a positive number, got {zoom}"
            )));
        }
        Ok(Self {
            zoom: clamp_zoom(zoom),
            pan,
        })
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn pan(&self) -> Point {
        self.pan
    }

    pub fn to_view(&self, p: Point) -> Point {
        Point::new(p.x * self.zoom + self.pan.x, p.y * self.zoom + self.pan.y)
    }

    pub fn to_document(&self, p: Point) -> Point {
        Point::new((p.x - self.pan.x) / self.zoom, (p.y - self.pan.y) / self.zoom)
    }

    pub fn rect_to_view(&self, r: &Rect) -> Rect {
        let origin = self.to_view(r.origin());
        Rect::new(origin.x, origin.y, r.w * self.zoom, r.h * self.zoom)
    }

    pub fn rect_to_document(&self, r: &Rect) -> Rect {
        let origin = self.to_document(r.origin());
        Rect::new(origin.x, origin.y, r.w / self.zoom, r.h / self.zoom)
    }

    pub fn length_to_view(&self, length: f64) -> f64 {
        length * self.zoom
    }

    /// New transform after `delta` wheel units, keeping the pan
    pub fn wheel(&self, delta: f64) -> Self {
        Self {
            zoom: clamp_zoom(self.zoom * WHEEL_ZOOM_BASE.powf(delta)),
            pan: self.pan,
        }
    }

    /// Largest zoom that fits a `page` of document size into a `viewport`
    pub fn fit(page: (f64, f64), viewport: (f64, f64)) -> Result<Self> {
        let (pw, ph) = page;
        let (vw, vh) = viewport;
        if pw <= 0.0 || ph <= 0.0 || vw <= 0.0 || vh <= 0.0 {
            return Err(AxisError::validation("page and viewport sizes must be positive"));
        }
        let zoom = clamp_zoom((vw / pw).min(vh / ph));
        let pan = Point::new((vw - pw * zoom) / 2.0, (vh - ph * zoom) / 2.0);
        Ok(Self { zoom, pan })
    }
}

pub fn clamp_zoom(zoom: f64) -> f64 {
    zoom.clamp(MIN_ZOOM, MAX_ZOOM)
}

/// Document-space anchor of a balloon: rect center plus offset
pub fn balloon_anchor(rect: &Rect, offset: Point) -> Point {
    rect.center().offset_by(offset)
}

/// Offset placing a new balloon inside the rect's top-left corner
///
/// The balloon center sits one radius in from each edge, or at the middle of
/// that edge when the rect is smaller than the balloon.
pub fn default_balloon_offset(rect: &Rect, radius: f64) -> Point {
    let inset_x = if rect.w >= radius * 2.0 { radius } else { rect.w / 2.0 };
    let inset_y = if rect.h >= radius * 2.0 { radius } else { rect.h / 2.0 };
    Point::new(inset_x - rect.w / 2.0, inset_y - rect.h / 2.0)
}

/// Convert a device-pixel drag into a document rect, rejecting tiny drags
pub fn pick_from_drag(
    start: Point,
    end: Point,
    transform: &ViewTransform,
    min_device_px: f64,
) -> Result<Rect> {
    let device = Rect::from_corners(start, end);
    if device.w < min_device_px || device.h < min_device_px {
        return Err(AxisError::validation(format!(
            "drag of {:.0}x{:.0} px is below the {:.0}x{:.0} px minimum",
            device.w, device.h, min_device_px, min_device_px
        )));
    }
    Ok(transform.rect_to_document(&device))
}
