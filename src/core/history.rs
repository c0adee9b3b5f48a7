//! Undo/redo log of structural feature edits
//!
//! Each [`Operation`] is a recipe that can be replayed forward or backward
//! through the [`FeatureStore`]; the log never touches feature data directly.
//! Replays return a refreshed copy of the operation, because a replay can
//! capture new state (deleting a feature on undo-of-create also removes the
//! results recorded since, and those must come back on redo).

use std::collections::VecDeque;

use log::debug;

use crate::core::error::Result;
use crate::core::identity::FeatureId;
use crate::core::store::FeatureStore;
use crate::entities::{Feature, FeaturePatch, InspectionResult};

/// One field edit of one feature
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub id: FeatureId,
    /// Values before the edit, exactly the fields `new` touches
    pub old: FeaturePatch,
    pub new: FeaturePatch,
}

impl FieldChange {
    /// Record an edit of `feature` by `patch`, capturing the old values
    pub fn capture(feature: &Feature, patch: FeaturePatch) -> Self {
        Self {
            id: feature.id,
            old: feature.capture(&patch),
            new: patch,
        }
    }
}

/// An invertible structural mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// A feature was created
    Create {
        feature: Feature,
        /// Results removed when the creation was undone
        results: Vec<InspectionResult>,
    },
    /// A feature was deleted together with its results
    Delete {
        feature: Feature,
        results: Vec<InspectionResult>,
    },
    /// Fields of one feature were edited
    UpdateFields(FieldChange),
    /// Fields of several features were edited at once
    BulkUpdate(Vec<FieldChange>),
}

impl Operation {
    /// Short human-readable description
    pub fn label(&self) -> String {
        match self {
            Operation::Create { feature, .. } => format!("create feature {}", feature.id),
            Operation::Delete { feature, .. } => format!("delete feature {}", feature.id),
            Operation::UpdateFields(change) => format!("edit feature {}", change.id),
            Operation::BulkUpdate(changes) => format!("edit {} features", changes.len()),
        }
    }

    /// Perform the operation through the store
    pub fn apply(&self, store: &mut FeatureStore) -> Result<Operation> {
        match self {
            Operation::Create { feature, results } => {
                store.restore_feature(feature, results)?;
                Ok(self.clone())
            }
            Operation::Delete { feature, .. } => {
                let removed = store.delete_feature(feature.id)?;
                Ok(Operation::Delete {
                    feature: removed.feature,
                    results: removed.results,
                })
            }
            Operation::UpdateFields(change) => {
                store.update_feature(change.id, &change.new)?;
                Ok(self.clone())
            }
            Operation::BulkUpdate(changes) => {
                let forward: Vec<_> = changes.iter().map(|c| (c.id, c.new.clone())).collect();
                store.update_features(&forward)?;
                Ok(self.clone())
            }
        }
    }

    /// Reverse the operation through the store
    pub fn revert(&self, store: &mut FeatureStore) -> Result<Operation> {
        match self {
            Operation::Create { feature, .. } => {
                let removed = store.delete_feature(feature.id)?;
                Ok(Operation::Create {
                    feature: removed.feature,
                    results: removed.results,
                })
            }
            Operation::Delete { feature, results } => {
                store.restore_feature(feature, results)?;
                Ok(self.clone())
            }
            Operation::UpdateFields(change) => {
                store.update_feature(change.id, &change.old)?;
                Ok(self.clone())
            }
            Operation::BulkUpdate(changes) => {
                let backward: Vec<_> = changes.iter().map(|c| (c.id, c.old.clone())).collect();
                store.update_features(&backward)?;
                Ok(self.clone())
            }
        }
    }
}

/// Bounded undo stack with a parallel redo stack
#[derive(Debug, Clone)]
pub struct UndoLog {
    undo: VecDeque<Operation>,
    redo: Vec<Operation>,
    depth: usize,
}

impl UndoLog {
    pub fn new(depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            depth: depth.max(1),
        }
    }

    /// Record a mutation that already happened; discards the redo branch
    pub fn push(&mut self, op: Operation) {
        self.redo.clear();
        self.push_undo(op);
    }

    fn push_undo(&mut self, op: Operation) {
        if self.undo.len() == self.depth {
            self.undo.pop_front();
        }
        self.undo.push_back(op);
    }

    /// Reverse the latest operation
    ///
    /// Returns `Ok(None)` when there is nothing to undo. If the store rejects
    /// the replay, the error is returned and both stacks stay as they were.
    pub fn undo(&mut self, store: &mut FeatureStore) -> Result<Option<Operation>> {
        let Some(op) = self.undo.back() else {
            return Ok(None);
        };
        let reverted = op.revert(store)?;
        self.undo.pop_back();
        debug!("undo: {}", reverted.label());
        self.redo.push(reverted.clone());
        Ok(Some(reverted))
    }

    /// Re-apply the latest undone operation
    pub fn redo(&mut self, store: &mut FeatureStore) -> Result<Option<Operation>> {
        let Some(op) = self.redo.last() else {
            return Ok(None);
        };
        let applied = op.apply(store)?;
        self.redo.pop();
        debug!("redo: {}", applied.label());
        self.push_undo(applied.clone());
        Ok(Some(applied))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Label of the operation `undo` would reverse
    pub fn peek_undo(&self) -> Option<String> {
        self.undo.back().map(Operation::label)
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::geometry::{Point, Rect};
    use crate::core::status::Status;
    use crate::core::store::StoreOptions;
    use crate::core::tolerance::parse_tolerance;
    use crate::entities::NewFeature;

    fn store() -> FeatureStore {
        FeatureStore::open_in_memory(StoreOptions {
            author: "qa".into(),
            ..StoreOptions::default()
        })
        .unwrap()
    }

    fn create(store: &mut FeatureStore, log: &mut UndoLog, x: f64) -> Feature {
        let feature = store
            .create_feature(NewFeature::new(1, Rect::new(x, 10.0, 20.0, 20.0)))
            .unwrap();
        log.push(Operation::Create {
            feature: feature.clone(),
            results: Vec::new(),
        });
        feature
    }

    fn edit(store: &mut FeatureStore, log: &mut UndoLog, id: FeatureId, patch: FeaturePatch) {
        let feature = store.get_feature(id).unwrap();
        let change = FieldChange::capture(&feature, patch);
        store.update_feature(id, &change.new).unwrap();
        log.push(Operation::UpdateFields(change));
    }

    fn delete(store: &mut FeatureStore, log: &mut UndoLog, id: FeatureId) {
        let removed = store.delete_feature(id).unwrap();
        log.push(Operation::Delete {
            feature: removed.feature,
            results: removed.results,
        });
    }

    #[test]
    fn test_delete_undo_restores_feature_and_results() {
        let mut store = store();
        let mut log = UndoLog::new(10);

        let f = create(&mut store, &mut log, 10.0);
        let tol = parse_tolerance("1.25 ±0.05").unwrap();
        edit(&mut store, &mut log, f.id, FeaturePatch::tolerance(&tol));

        store.upsert_result(f.id, "WO1", "1.22").unwrap();
        let feature = store.get_feature(f.id).unwrap();
        assert_eq!(feature.spec.lsl, Some(1.2));
        assert_eq!(feature.spec.usl, Some(1.3));
        assert_eq!(store.get_results("WO1").unwrap()[&f.id].status(&feature), Status::Pass);

        store.upsert_result(f.id, "WO1", "1.35").unwrap();
        assert_eq!(store.get_results("WO1").unwrap()[&f.id].status(&feature), Status::Fail);

        store.upsert_result(f.id, "WO1", "p").unwrap();
        assert_eq!(store.get_results("WO1").unwrap()[&f.id].status(&feature), Status::Pass);

        let before = store.snapshot().unwrap();
        delete(&mut store, &mut log, f.id);
        assert!(!store.get_results("WO1").unwrap().contains_key(&f.id));

        log.undo(&mut store).unwrap();
        assert_eq!(store.snapshot().unwrap(), before);
    }

    #[test]
    fn test_undo_all_then_redo_all_reproduces_state() {
        let mut store = store();
        let mut log = UndoLog::new(50);

        let a = create(&mut store, &mut log, 0.0);
        let b = create(&mut store, &mut log, 40.0);
        edit(&mut store, &mut log, a.id, FeaturePatch::balloon_offset(Point::new(3.0, -2.0)));
        edit(&mut store, &mut log, b.id, FeaturePatch::method("CMM"));
        store.upsert_result(b.id, "WO9", "2.0").unwrap();
        let bulk = vec![
            FieldChange::capture(&store.get_feature(a.id).unwrap(), FeaturePatch::balloon_radius(9.0)),
            FieldChange::capture(&store.get_feature(b.id).unwrap(), FeaturePatch::balloon_radius(9.0)),
        ];
        store
            .update_features(&bulk.iter().map(|c| (c.id, c.new.clone())).collect::<Vec<_>>())
            .unwrap();
        log.push(Operation::BulkUpdate(bulk));
        delete(&mut store, &mut log, a.id);

        let final_state = store.snapshot().unwrap();
        let steps = log.undo_len();
        assert_eq!(steps, 6);

        for _ in 0..steps {
            assert!(log.undo(&mut store).unwrap().is_some());
        }
        let empty = store.snapshot().unwrap();
        assert!(empty.features.is_empty());
        assert!(empty.results.is_empty());
        assert!(log.undo(&mut store).unwrap().is_none());

        for _ in 0..steps {
            assert!(log.redo(&mut store).unwrap().is_some());
        }
        assert_eq!(store.snapshot().unwrap(), final_state);
    }

    #[test]
    fn test_new_push_discards_redo_branch() {
        let mut store = store();
        let mut log = UndoLog::new(10);
        let a = create(&mut store, &mut log, 0.0);
        edit(&mut store, &mut log, a.id, FeaturePatch::method("CMM"));

        log.undo(&mut store).unwrap();
        assert!(log.can_redo());
        edit(&mut store, &mut log, a.id, FeaturePatch::method("Visual"));
        assert!(!log.can_redo());
    }

    #[test]
    fn test_failed_replay_leaves_stacks_unchanged() {
        let mut store = store();
        let mut log = UndoLog::new(10);
        let a = create(&mut store, &mut log, 0.0);
        edit(&mut store, &mut log, a.id, FeaturePatch::method("CMM"));

        // feature removed behind the log's back
        store.delete_feature(a.id).unwrap();

        let err = log.undo(&mut store).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(log.undo_len(), 2);
        assert_eq!(log.redo_len(), 0);
    }

    #[test]
    fn test_depth_is_bounded() {
        let mut store = store();
        let mut log = UndoLog::new(2);
        for x in [0.0, 30.0, 60.0] {
            create(&mut store, &mut log, x);
        }
        assert_eq!(log.undo_len(), 2);
        assert_eq!(log.peek_undo().as_deref(), Some("create feature 003"));
    }
}
