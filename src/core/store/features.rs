//! Feature writes and lookups

use chrono::Utc;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    feature_from_row, insert_feature, insert_result, next_feature_id, reserve_feature_id,
    result_from_row, set_meta, FeatureStore, FEATURE_COLUMNS, META_NEXT_ID, RESULT_COLUMNS,
};
use crate::core::error::{AxisError, Result};
use crate::core::geometry::default_balloon_offset;
use crate::core::identity::FeatureId;
use crate::entities::{Feature, FeaturePatch, InspectionResult, NewFeature};

/// A deleted feature together with the results removed with it
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedFeature {
    pub feature: Feature,
    pub results: Vec<InspectionResult>,
}

impl FeatureStore {
    /// Insert a feature under a freshly assigned id
    pub fn create_feature(&mut self, draft: NewFeature) -> Result<Feature> {
        draft.rect.validate_pick(self.options.min_pick_size)?;

        let radius = draft.balloon_radius.unwrap_or(self.options.balloon_radius);
        let author = self.options.author.clone();

        let tx = self.conn.transaction()?;
        let id = next_feature_id(&tx)?;
        let feature = Feature {
            id,
            page: draft.page,
            rect: draft.rect,
            balloon_offset: draft
                .balloon_offset
                .unwrap_or_else(|| default_balloon_offset(&draft.rect, radius)),
            balloon_radius: radius,
            spec: draft.spec,
            last_zoom: draft.zoom,
            author,
            created: Utc::now(),
        };
        validate_fields(&feature, None)?;

        insert_feature(&tx, &feature)?;
        set_meta(&tx, META_NEXT_ID, &id.next().value().to_string())?;
        tx.commit()?;

        debug!("created feature {} on page {}", feature.id, feature.page);
        Ok(feature)
    }

    /// Apply a partial update to one feature
    pub fn update_feature(&mut self, id: FeatureId, patch: &FeaturePatch) -> Result<Feature> {
        let mut updated = self.update_features(&[(id, patch.clone())])?;
        updated
            .pop()
            .ok_or(AxisError::FeatureNotFound(id))
    }

    /// Apply several partial updates atomically
    ///
    /// If any id is unknown or any result is invalid, nothing is written.
    pub fn update_features(&mut self, changes: &[(FeatureId, FeaturePatch)]) -> Result<Vec<Feature>> {
        let min_pick = self.options.min_pick_size;
        let tx = self.conn.transaction()?;
        let mut updated = Vec::with_capacity(changes.len());

        for (id, patch) in changes {
            let mut feature =
                find_feature(&tx, *id)?.ok_or(AxisError::FeatureNotFound(*id))?;
            if let Some(rect) = patch.rect {
                rect.validate_pick(min_pick)?;
            }
            feature.apply(patch);
            validate_fields(&feature, Some(patch))?;
            write_feature(&tx, &feature)?;
            updated.push(feature);
        }

        tx.commit()?;
        debug!("updated {} feature(s)", updated.len());
        Ok(updated)
    }

    /// Remove a feature and its results
    pub fn delete_feature(&mut self, id: FeatureId) -> Result<RemovedFeature> {
        let tx = self.conn.transaction()?;
        let feature = find_feature(&tx, id)?.ok_or(AxisError::FeatureNotFound(id))?;
        let results = results_of(&tx, id)?;

        tx.execute("DELETE FROM results WHERE feature_id = ?1", params![i64::from(id)])?;
        tx.execute("DELETE FROM features WHERE id = ?1", params![i64::from(id)])?;
        reserve_feature_id(&tx, id)?;
        tx.commit()?;

        debug!("deleted feature {} with {} result(s)", id, results.len());
        Ok(RemovedFeature { feature, results })
    }

    /// Re-insert a previously deleted feature under its original id
    pub fn restore_feature(&mut self, feature: &Feature, results: &[InspectionResult]) -> Result<()> {
        let tx = self.conn.transaction()?;
        if find_feature(&tx, feature.id)?.is_some() {
            return Err(AxisError::validation(format!(
                "feature {} already exists",
                feature.id
            )));
        }

        insert_feature(&tx, feature)?;
        for result in results {
            insert_result(&tx, result)?;
        }
        reserve_feature_id(&tx, feature.id)?;
        tx.commit()?;

        debug!("restored feature {} with {} result(s)", feature.id, results.len());
        Ok(())
    }

    pub fn get_feature(&self, id: FeatureId) -> Result<Feature> {
        find_feature(&self.conn, id)?.ok_or(AxisError::FeatureNotFound(id))
    }

    /// Features ordered by id, optionally restricted to one page
    pub fn list_features(&self, page: Option<u32>) -> Result<Vec<Feature>> {
        let sql = match page {
            Some(_) => format!("SELECT {FEATURE_COLUMNS} FROM features WHERE page = ?1 ORDER BY id"),
            None => format!("SELECT {FEATURE_COLUMNS} FROM features ORDER BY id"),
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match page {
            Some(page) => stmt.query_map(params![page], feature_from_row)?,
            None => stmt.query_map([], feature_from_row)?,
        };
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Results recorded for one feature across all work orders
    pub fn results_for_feature(&self, id: FeatureId) -> Result<Vec<InspectionResult>> {
        results_of(&self.conn, id)
    }
}

fn find_feature(conn: &Connection, id: FeatureId) -> Result<Option<Feature>> {
    Ok(conn
        .query_row(
            &format!("SELECT {FEATURE_COLUMNS} FROM features WHERE id = ?1"),
            params![i64::from(id)],
            feature_from_row,
        )
        .optional()?)
}

fn results_of(conn: &Connection, id: FeatureId) -> Result<Vec<InspectionResult>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RESULT_COLUMNS} FROM results WHERE feature_id = ?1 ORDER BY work_order"
    ))?;
    let rows = stmt.query_map(params![i64::from(id)], result_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn write_feature(conn: &Connection, f: &Feature) -> Result<()> {
    conn.execute(
        "UPDATE features SET
            page = ?2, x = ?3, y = ?4, w = ?5, h = ?6, bx = ?7, by = ?8, br = ?9,
            zoom = ?10, method = ?11, marker = ?12, nominal = ?13, lsl = ?14, usl = ?15
         WHERE id = ?1",
        params![
            i64::from(f.id),
            f.page,
            f.rect.x,
            f.rect.y,
            f.rect.w,
            f.rect.h,
            f.balloon_offset.x,
            f.balloon_offset.y,
            f.balloon_radius,
            f.last_zoom,
            f.spec.method,
            f.spec.marker,
            f.spec.nominal,
            f.spec.lsl,
            f.spec.usl,
        ],
    )?;
    Ok(())
}

/// Field checks shared by create and update
///
/// With a patch, only the fields it touches are checked. Imported legacy
/// rows may already break a rule, and an unrelated edit must still go through.
fn validate_fields(f: &Feature, touched: Option<&FeaturePatch>) -> Result<()> {
    if touches(touched, |p| p.page.is_some()) && f.page == 0 {
        return Err(AxisError::validation("page numbers start at 1"));
    }
    if touches(touched, |p| p.rect.is_some())
        && (!f.rect.is_finite() || f.rect.w <= 0.0 || f.rect.h <= 0.0)
    {
        return Err(AxisError::validation("feature rectangle must have a positive size"));
    }
    if touches(touched, |p| p.balloon_radius.is_some())
        && !(f.balloon_radius.is_finite() && f.balloon_radius > 0.0)
    {
        return Err(AxisError::validation(format!(
            "balloon radius must be positive, got {}",
            f.balloon_radius
        )));
    }
    if touches(touched, |p| p.balloon_offset.is_some()) && !f.balloon_offset.is_finite() {
        return Err(AxisError::validation("balloon offset must be finite"));
    }
    if touches(touched, |p| p.last_zoom.is_some())
        && !(f.last_zoom.is_finite() && f.last_zoom > 0.0)
    {
        return Err(AxisError::validation("zoom must be a positive number"));
    }
    if !touches(touched, |p| p.nominal.is_some() || p.lsl.is_some() || p.usl.is_some()) {
        return Ok(());
    }
    for (name, value) in [("nominal", f.spec.nominal), ("LSL", f.spec.lsl), ("USL", f.spec.usl)] {
        if value.is_some_and(|v| !v.is_finite()) {
            return Err(AxisError::validation(format!("{name} must be a finite number")));
        }
    }
    if let (Some(lsl), Some(usl)) = (f.spec.lsl, f.spec.usl) {
        if lsl > usl {
            return Err(AxisError::validation(format!(
                "LSL {lsl} is above USL {usl}"
            )));
        }
    }
    Ok(())
}

fn touches(touched: Option<&FeaturePatch>, field: impl Fn(&FeaturePatch) -> bool) -> bool {
    touched.map_or(true, field)
}
