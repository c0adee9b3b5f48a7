//! Debounced page rendering with balloon overlays
//!
//! Rasterization belongs to an external [`PageRenderer`]. The queue only
//! decides *what* to render: requests are coalesced so that a flush renders
//! the newest one, superseded requests are dropped, and a failed render is
//! reported without retry while the previous frame stays current.

use std::fmt;

use log::{error, warn};

use crate::core::geometry::{Point, Rect, ViewTransform};
use crate::core::identity::FeatureId;
use crate::entities::Feature;

/// Source of page rasters
pub trait PageRenderer {
    type Surface;
    type Error: fmt::Display;

    /// Rasterize a 1-based page at the given zoom
    fn render_page(&mut self, page: u32, zoom: f64) -> Result<Self::Surface, Self::Error>;
}

/// A queued render of one page at one zoom
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub seq: u64,
    pub page: u32,
    pub zoom: f64,
}

/// Balloon geometry in view space, ready to draw over the raster
#[derive(Debug, Clone, PartialEq)]
pub struct BalloonOverlay {
    pub id: FeatureId,
    pub rect: Rect,
    pub anchor: Point,
    pub radius: f64,
    pub label: String,
}

/// Overlays for the features on `page` under `transform`
pub fn overlays(features: &[Feature], page: u32, transform: &ViewTransform) -> Vec<BalloonOverlay> {
    features
        .iter()
        .filter(|f| f.page == page)
        .map(|f| BalloonOverlay {
            id: f.id,
            rect: transform.rect_to_view(&f.rect),
            anchor: transform.to_view(f.balloon_anchor()),
            radius: transform.length_to_view(f.balloon_radius),
            label: f.id.to_string(),
        })
        .collect()
}

/// A rendered page with its overlays
#[derive(Debug, Clone)]
pub struct Frame<S> {
    pub request: RenderRequest,
    pub surface: S,
    pub overlays: Vec<BalloonOverlay>,
}

/// What a flush did
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    /// Nothing was pending
    Idle,
    Rendered(RenderRequest),
    /// Renderer failed; the previous frame is kept
    Failed { request: RenderRequest, reason: String },
}

/// Coalescing render scheduler
pub struct RenderQueue<R: PageRenderer> {
    renderer: R,
    pending: Option<RenderRequest>,
    next_seq: u64,
    superseded: u64,
    frame: Option<Frame<R::Surface>>,
}

impl<R: PageRenderer> RenderQueue<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            pending: None,
            next_seq: 1,
            superseded: 0,
            frame: None,
        }
    }

    /// Queue a render, replacing any request not yet flushed
    pub fn request(&mut self, page: u32, zoom: f64) -> RenderRequest {
        let request = RenderRequest {
            seq: self.next_seq,
            page,
            zoom,
        };
        self.next_seq += 1;

        if let Some(dropped) = self.pending.replace(request) {
            self.superseded += 1;
            warn!(
                "render #{} (page {}, zoom {:.2}) superseded by #{}",
                dropped.seq, dropped.page, dropped.zoom, request.seq
            );
        }
        request
    }

    /// Render the newest pending request against the current feature list
    pub fn flush(&mut self, features: &[Feature], pan: Point) -> RenderOutcome {
        let Some(request) = self.pending.take() else {
            return RenderOutcome::Idle;
        };

        let transform = match ViewTransform::with_pan(request.zoom, pan) {
            Ok(t) => t,
            Err(e) => {
                return RenderOutcome::Failed {
                    request,
                    reason: e.to_string(),
                }
            }
        };

        match self.renderer.render_page(request.page, transform.zoom()) {
            Ok(surface) => {
                self.frame = Some(Frame {
                    request,
                    surface,
                    overlays: overlays(features, request.page, &transform),
                });
                RenderOutcome::Rendered(request)
            }
            Err(e) => {
                error!("render of page {} failed: {}", request.page, e);
                RenderOutcome::Failed {
                    request,
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Last successfully rendered frame
    pub fn frame(&self) -> Option<&Frame<R::Surface>> {
        self.frame.as_ref()
    }

    /// Number of requests dropped in favor of newer ones
    pub fn superseded(&self) -> u64 {
        self.superseded
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }
}

/// Page dimensions of a blank raster
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlankSurface {
    pub width: f64,
    pub height: f64,
}

/// Headless renderer producing blank pages of a fixed document size
#[derive(Debug, Clone)]
pub struct BlankRenderer {
    page_size: (f64, f64),
    pages: u32,
}

impl BlankRenderer {
    pub fn new(page_size: (f64, f64), pages: u32) -> Self {
        Self { page_size, pages }
    }
}

impl PageRenderer for BlankRenderer {
    type Surface = BlankSurface;
    type Error = String;

    fn render_page(&mut self, page: u32, zoom: f64) -> Result<BlankSurface, String> {
        if page == 0 || page > self.pages {
            return Err(format!("page {page} out of range 1..={}", self.pages));
        }
        Ok(BlankSurface {
            width: self.page_size.0 * zoom,
            height: self.page_size.1 * zoom,
        })
    }
}
