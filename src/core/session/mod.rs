//! Session controller
//!
//! A [`Session`] owns the loaded drawing's store, the undo log and an
//! in-memory mirror of the features plus the active work order's results.
//! Every mutation goes to the store first; the mirror is re-read from the
//! store only after the write committed, then observers receive one
//! notification carrying the complete new view state.

mod phase;

pub use phase::{transition, ChangeKind, Effect, Event, Mode, Phase};

use std::collections::BTreeMap;

use log::{info, warn};

use crate::core::config::Config;
use crate::core::drawing::Drawing;
use crate::core::error::{AxisError, ErrorKind, Result};
use crate::core::geometry::{clamp_zoom, pick_from_drag, Point, Rect, ViewTransform};
use crate::core::history::{FieldChange, Operation, UndoLog};
use crate::core::identity::FeatureId;
use crate::core::report::{self, InspectionRow, RowFilter};
use crate::core::status::Status;
use crate::core::store::{FeatureStore, RemovedFeature, StoreOptions};
use crate::core::tolerance::parse_tolerance;
use crate::entities::{Feature, FeaturePatch, InspectionResult, NewFeature};

/// Smallest drag, in device pixels, accepted as a pick
pub const MIN_DRAG_PX: f64 = 5.0;

/// Session settings
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub store: StoreOptions,
    pub undo_depth: usize,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            store: StoreOptions::from_config(config),
            undo_depth: config.undo_depth(),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Complete view state sent to observers after a change
#[derive(Debug, Clone, PartialEq)]
pub struct SessionChange {
    pub kind: ChangeKind,
    pub phase: Phase,
    pub features: Vec<Feature>,
    pub rows: Vec<InspectionRow>,
}

/// Receives one notification per applied change
pub trait SessionObserver {
    fn on_change(&mut self, change: &SessionChange);
}

impl<F: FnMut(&SessionChange)> SessionObserver for F {
    fn on_change(&mut self, change: &SessionChange) {
        self(change)
    }
}

/// Where to look when focusing a feature
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Focus {
    pub id: FeatureId,
    pub page: u32,
    pub zoom: f64,
    /// Document-space center of the feature's rect
    pub center: Point,
}

/// Outcome of typing into a feature's result slot
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// A result was recorded for the active work order
    Recorded {
        result: InspectionResult,
        status: Status,
    },
    /// Ballooning mode: the text was taken as the feature's tolerance
    SpecFilled(Feature),
}

/// Interactive editing session over one drawing at a time
pub struct Session {
    options: SessionOptions,
    phase: Phase,
    drawing: Option<Drawing>,
    store: Option<FeatureStore>,
    log: UndoLog,
    features: Vec<Feature>,
    results: BTreeMap<FeatureId, InspectionResult>,
    filter: RowFilter,
    view: ViewTransform,
    page: u32,
    observers: Vec<Box<dyn SessionObserver>>,
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        let log = UndoLog::new(options.undo_depth);
        Self {
            options,
            phase: Phase::NoDrawingLoaded,
            drawing: None,
            store: None,
            log,
            features: Vec::new(),
            results: BTreeMap::new(),
            filter: RowFilter::default(),
            view: ViewTransform::default(),
            page: 1,
            observers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: impl SessionObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    // ---- phase ---------------------------------------------------------

    /// Open a drawing's store, replacing any loaded drawing
    ///
    /// The new store is opened before anything else changes, so a failed
    /// open (including a failed legacy import) keeps the current drawing.
    pub fn open(&mut self, drawing: Drawing) -> Result<()> {
        let store = FeatureStore::open(&drawing, self.options.store.clone())?;
        let (phase, effects) = transition(&self.phase, &Event::Load)?;

        if let Some(previous) = self.drawing.take() {
            info!("closing {}", previous.path().display());
        }
        info!("opened {}", drawing.path().display());
        self.store = Some(store);
        self.drawing = Some(drawing);
        self.phase = phase;
        self.run(&effects)
    }

    /// Close the drawing; every edit is already committed
    pub fn close(&mut self) -> Result<()> {
        self.apply_event(Event::Close)
    }

    pub fn enter_ballooning(&mut self) -> Result<()> {
        self.apply_event(Event::EnterBallooning)
    }

    pub fn enter_inspection(&mut self, work_order: &str) -> Result<()> {
        self.apply_event(Event::EnterInspection(work_order.to_string()))
    }

    fn apply_event(&mut self, event: Event) -> Result<()> {
        let (phase, effects) = transition(&self.phase, &event)?;
        let previous = std::mem::replace(&mut self.phase, phase);
        if let Err(e) = self.run(&effects) {
            self.phase = previous;
            if let Err(reload) = self.reload() {
                warn!("could not restore view state: {}", reload);
            }
            return Err(e);
        }
        Ok(())
    }

    fn run(&mut self, effects: &[Effect]) -> Result<()> {
        for effect in effects {
            match effect {
                Effect::ResetHistory => self.log.clear(),
                Effect::ResetView => {
                    self.view = ViewTransform::default();
                    self.page = 1;
                }
                Effect::ReleaseStore => {
                    self.store = None;
                    if let Some(drawing) = self.drawing.take() {
                        info!("closed {}", drawing.path().display());
                    }
                }
                Effect::ReloadMirror => self.reload()?,
                Effect::ClearMirror => {
                    self.features.clear();
                    self.results.clear();
                }
                Effect::Notify(kind) => self.notify(*kind),
            }
        }
        Ok(())
    }

    // ---- structural edits (undoable) -----------------------------------

    /// Create a feature from a document-space rectangle
    pub fn pick(&mut self, page: u32, rect: Rect) -> Result<Feature> {
        if !matches!(self.phase, Phase::DrawingLoaded(Mode::Ballooning)) {
            return Err(AxisError::validation("features can only be picked in ballooning mode"));
        }
        let draft = NewFeature::new(page, rect).with_zoom(self.view.zoom());
        let outcome = self.store_mut()?.create_feature(draft);
        let outcome = outcome.map(|feature| {
            self.log.push(Operation::Create {
                feature: feature.clone(),
                results: Vec::new(),
            });
            feature
        });
        self.settle(outcome, ChangeKind::FeaturesChanged)
    }

    /// Create a feature from a device-pixel drag on the current page
    pub fn pick_drag(&mut self, start: Point, end: Point) -> Result<Feature> {
        let rect = pick_from_drag(start, end, &self.view, MIN_DRAG_PX)?;
        self.pick(self.page, rect)
    }

    /// Apply a patch; structural patches are recorded for undo
    pub fn edit_feature(&mut self, id: FeatureId, patch: FeaturePatch) -> Result<Feature> {
        let store = self.store_mut()?;
        let outcome = match store.get_feature(id) {
            Ok(current) => {
                let change = FieldChange::capture(&current, patch);
                store.update_feature(id, &change.new).map(|f| (f, change))
            }
            Err(e) => Err(e),
        };
        let outcome = outcome.map(|(feature, change)| {
            if change.new.is_structural() {
                self.log.push(Operation::UpdateFields(change));
            }
            feature
        });
        self.settle(outcome, ChangeKind::FeaturesChanged)
    }

    /// Parse a tolerance expression into the feature's nominal and limits
    ///
    /// An unrecognized expression changes nothing.
    pub fn enter_tolerance(&mut self, id: FeatureId, expression: &str) -> Result<Feature> {
        let tolerance = parse_tolerance(expression)?;
        self.edit_feature(id, FeaturePatch::tolerance(&tolerance))
    }

    pub fn set_method(&mut self, id: FeatureId, method: &str) -> Result<Feature> {
        self.edit_feature(id, FeaturePatch::method(method.trim()))
    }

    pub fn move_balloon(&mut self, id: FeatureId, offset: Point) -> Result<Feature> {
        self.edit_feature(id, FeaturePatch::balloon_offset(offset))
    }

    pub fn resize_balloon(&mut self, id: FeatureId, radius: f64) -> Result<Feature> {
        self.edit_feature(id, FeaturePatch::balloon_radius(radius))
    }

    /// Give every feature the same balloon radius as one undoable step
    pub fn resize_all_balloons(&mut self, radius: f64) -> Result<usize> {
        let store = self.store_mut()?;
        let outcome = store.list_features(None).and_then(|features| {
            let changes: Vec<FieldChange> = features
                .iter()
                .filter(|f| f.balloon_radius != radius)
                .map(|f| FieldChange::capture(f, FeaturePatch::balloon_radius(radius)))
                .collect();
            if changes.is_empty() {
                return Ok(changes);
            }
            let forward: Vec<_> = changes.iter().map(|c| (c.id, c.new.clone())).collect();
            store.update_features(&forward).map(|_| changes)
        });
        let outcome = outcome.map(|changes| {
            let count = changes.len();
            if count > 0 {
                info!("resized {} balloon(s) to {}", count, radius);
                self.log.push(Operation::BulkUpdate(changes));
            }
            count
        });
        self.settle(outcome, ChangeKind::FeaturesChanged)
    }

    /// Delete a feature and its results
    pub fn delete_feature(&mut self, id: FeatureId) -> Result<RemovedFeature> {
        let outcome = self.store_mut()?.delete_feature(id);
        let outcome = outcome.map(|removed| {
            self.log.push(Operation::Delete {
                feature: removed.feature.clone(),
                results: removed.results.clone(),
            });
            removed
        });
        self.settle(outcome, ChangeKind::FeaturesChanged)
    }

    pub fn undo(&mut self) -> Result<Option<Operation>> {
        let store = self.store.as_mut().ok_or_else(no_drawing)?;
        let outcome = self.log.undo(store);
        self.settle(outcome, ChangeKind::FeaturesChanged)
    }

    pub fn redo(&mut self) -> Result<Option<Operation>> {
        let store = self.store.as_mut().ok_or_else(no_drawing)?;
        let outcome = self.log.redo(store);
        self.settle(outcome, ChangeKind::FeaturesChanged)
    }

    // ---- results (not undoable) ----------------------------------------

    /// Handle text typed into a feature's result slot
    ///
    /// In inspection mode the text is recorded for the active work order.
    /// In ballooning mode it fills the tolerance of a feature that has no
    /// nominal or limits yet.
    pub fn enter_result(&mut self, id: FeatureId, text: &str) -> Result<Entry> {
        match self.phase.mode().cloned() {
            None => Err(no_drawing()),
            Some(Mode::Inspection { work_order }) => {
                let outcome = self.store_mut()?.upsert_result(id, &work_order, text);
                let result = self.settle(outcome, ChangeKind::ResultsChanged)?;
                let status = self
                    .feature(id)
                    .map(|f| result.status(f))
                    .unwrap_or(Status::Unset);
                Ok(Entry::Recorded { result, status })
            }
            Some(Mode::Ballooning) => {
                let outcome = self.store()?.get_feature(id);
                let feature = self.settle_quiet(outcome)?;
                if !feature.spec.is_blank() {
                    return Err(AxisError::validation(
                        "switch to inspection mode to record results",
                    ));
                }
                self.enter_tolerance(id, text).map(Entry::SpecFilled)
            }
        }
    }

    // ---- view ----------------------------------------------------------

    /// Jump to a feature at its remembered (or the given) zoom
    ///
    /// The zoom used is written back as the feature's `last_zoom` without an
    /// undo entry.
    pub fn focus(&mut self, id: FeatureId, zoom: Option<f64>) -> Result<Focus> {
        let outcome = self.store()?.get_feature(id);
        let feature = self.settle_quiet(outcome)?;

        let zoom = clamp_zoom(zoom.unwrap_or(feature.last_zoom));
        let view = ViewTransform::with_pan(zoom, self.view.pan())?;

        if feature.last_zoom != zoom {
            let outcome = self
                .store_mut()?
                .update_feature(id, &FeaturePatch::last_zoom(zoom));
            self.settle_quiet(outcome)?;
            self.reload()?;
        }

        self.view = view;
        self.page = feature.page;
        self.notify(ChangeKind::ViewChanged);

        Ok(Focus {
            id,
            page: feature.page,
            zoom,
            center: feature.rect.center(),
        })
    }

    pub fn set_zoom(&mut self, zoom: f64) -> Result<()> {
        self.view = ViewTransform::with_pan(zoom, self.view.pan())?;
        self.notify(ChangeKind::ViewChanged);
        Ok(())
    }

    pub fn wheel(&mut self, delta: f64) -> Result<()> {
        if !delta.is_finite() {
            return Err(AxisError::validation(format!(
                "wheel delta must be a finite number, got {delta}"
            )));
        }
        self.view = self.view.wheel(delta);
        self.notify(ChangeKind::ViewChanged);
        Ok(())
    }

    pub fn fit(&mut self, page_size: (f64, f64), viewport: (f64, f64)) -> Result<()> {
        self.view = ViewTransform::fit(page_size, viewport)?;
        self.notify(ChangeKind::ViewChanged);
        Ok(())
    }

    pub fn set_page(&mut self, page: u32) -> Result<()> {
        if page == 0 {
            return Err(AxisError::validation("page numbers start at 1"));
        }
        self.page = page;
        self.notify(ChangeKind::ViewChanged);
        Ok(())
    }

    pub fn set_filter(&mut self, filter: RowFilter) {
        self.filter = filter;
        self.notify(ChangeKind::ViewChanged);
    }

    // ---- read access ---------------------------------------------------

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn mode(&self) -> Option<&Mode> {
        self.phase.mode()
    }

    pub fn work_order(&self) -> Option<&str> {
        match self.phase.mode() {
            Some(Mode::Inspection { work_order }) => Some(work_order),
            _ => None,
        }
    }

    pub fn drawing(&self) -> Option<&Drawing> {
        self.drawing.as_ref()
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn feature(&self, id: FeatureId) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }

    /// Results of the active work order
    pub fn results(&self) -> &BTreeMap<FeatureId, InspectionResult> {
        &self.results
    }

    pub fn filter(&self) -> &RowFilter {
        &self.filter
    }

    /// Inspection table rows under the current filter
    pub fn rows(&self) -> Vec<InspectionRow> {
        report::build_rows(&self.features, &self.results, &self.filter)
    }

    /// CSV of the rows currently shown
    pub fn export_rows(&self) -> Result<Vec<u8>> {
        report::export_filtered(&self.rows())
    }

    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn can_undo(&self) -> bool {
        self.log.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.log.can_redo()
    }

    pub fn history(&self) -> &UndoLog {
        &self.log
    }

    pub fn store(&self) -> Result<&FeatureStore> {
        self.store.as_ref().ok_or_else(no_drawing)
    }

    fn store_mut(&mut self) -> Result<&mut FeatureStore> {
        self.store.as_mut().ok_or_else(no_drawing)
    }

    // ---- mirror --------------------------------------------------------

    /// Re-read the mirror from the store
    fn reload(&mut self) -> Result<()> {
        let Some(store) = self.store.as_ref() else {
            self.features.clear();
            self.results.clear();
            return Ok(());
        };
        let features = store.list_features(None)?;
        let results = match self.phase.mode() {
            Some(Mode::Inspection { work_order }) => store.get_results(work_order)?,
            _ => BTreeMap::new(),
        };
        self.features = features;
        self.results = results;
        Ok(())
    }

    /// Refresh and notify after a successful write; on a desync, refresh
    /// the mirror so it matches the store again
    fn settle<T>(&mut self, outcome: Result<T>, kind: ChangeKind) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.reload()?;
                self.notify(kind);
                Ok(value)
            }
            Err(e) => Err(self.recover(e)),
        }
    }

    /// Like [`Session::settle`] but without a notification on success
    fn settle_quiet<T>(&mut self, outcome: Result<T>) -> Result<T> {
        outcome.map_err(|e| self.recover(e))
    }

    fn recover(&mut self, e: AxisError) -> AxisError {
        if e.kind() == ErrorKind::NotFound {
            warn!("{}; refreshing from store", e);
            match self.reload() {
                Ok(()) => self.notify(ChangeKind::Refreshed),
                Err(reload) => warn!("refresh failed: {}", reload),
            }
        }
        e
    }

    fn notify(&mut self, kind: ChangeKind) {
        if self.observers.is_empty() {
            return;
        }
        let change = SessionChange {
            kind,
            phase: self.phase.clone(),
            features: self.features.clone(),
            rows: self.rows(),
        };
        for observer in &mut self.observers {
            observer.on_change(&change);
        }
    }
}

fn no_drawing() -> AxisError {
    AxisError::validation("no drawing is loaded")
}
