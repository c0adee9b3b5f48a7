//! Result writes, lookups and the audit trail

use std::collections::BTreeMap;

use chrono::Utc;
use log::{debug, info};
use rusqlite::{params, OptionalExtension};

use super::{insert_result, parse_datetime, result_from_row, FeatureStore, RESULT_COLUMNS};
use crate::core::error::{AxisError, Result};
use crate::core::identity::FeatureId;
use crate::core::status::normalize_entry;
use crate::entities::result::normalize_work_order;
use crate::entities::{InspectionResult, ResultRevision, WorkOrderSummary};

impl FeatureStore {
    /// Record (or overwrite) the result of one feature for one work order
    ///
    /// The value is stored in normalized form. When auditing is on, an
    /// overwritten value is appended to the result history first.
    pub fn upsert_result(
        &mut self,
        feature_id: FeatureId,
        work_order: &str,
        value: &str,
    ) -> Result<InspectionResult> {
        let work_order = normalize_work_order(work_order)
            .ok_or_else(|| AxisError::validation("work order must not be empty"))?;
        let result = InspectionResult {
            feature_id,
            work_order,
            value: normalize_entry(value),
            recorded_at: Utc::now(),
            recorded_by: Some(self.options.author.clone()),
        };
        let audit = self.options.audit;

        let tx = self.conn.transaction()?;
        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM features WHERE id = ?1",
                params![i64::from(feature_id)],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(AxisError::FeatureNotFound(feature_id));
        }

        if audit {
            let previous: Option<(String, String)> = tx
                .query_row(
                    "SELECT value, recorded_at FROM results WHERE feature_id = ?1 AND work_order = ?2",
                    params![i64::from(feature_id), result.work_order],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            if let Some((old_value, old_recorded_at)) = previous {
                if old_value != result.value {
                    tx.execute(
                        "INSERT INTO result_history (feature_id, work_order, value, recorded_at, superseded_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            i64::from(feature_id),
                            result.work_order,
                            old_value,
                            old_recorded_at,
                            result.recorded_at.to_rfc3339(),
                        ],
                    )?;
                }
            }
        }

        insert_result(&tx, &result)?;
        tx.commit()?;

        debug!(
            "result {} / {} = {:?}",
            feature_id, result.work_order, result.value
        );
        Ok(result)
    }

    /// Live results of one work order, keyed by feature id
    ///
    /// An unknown work order simply has no results yet.
    pub fn get_results(&self, work_order: &str) -> Result<BTreeMap<FeatureId, InspectionResult>> {
        let Some(work_order) = normalize_work_order(work_order) else {
            return Ok(BTreeMap::new());
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RESULT_COLUMNS} FROM results WHERE work_order = ?1 ORDER BY feature_id"
        ))?;
        let rows = stmt.query_map(params![work_order], result_from_row)?;

        let mut results = BTreeMap::new();
        for row in rows {
            let result = row?;
            results.insert(result.feature_id, result);
        }
        Ok(results)
    }

    /// Every live result grouped by work order
    pub fn export_all_results(
        &self,
    ) -> Result<BTreeMap<String, BTreeMap<FeatureId, InspectionResult>>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RESULT_COLUMNS} FROM results ORDER BY work_order, feature_id"
        ))?;
        let rows = stmt.query_map([], result_from_row)?;

        let mut all: BTreeMap<String, BTreeMap<FeatureId, InspectionResult>> = BTreeMap::new();
        for row in rows {
            let result = row?;
            all.entry(result.work_order.clone())
                .or_default()
                .insert(result.feature_id, result);
        }
        Ok(all)
    }

    /// Work orders with results, ordered case-insensitively
    pub fn list_work_orders(&self) -> Result<Vec<WorkOrderSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT work_order, COUNT(*), MAX(recorded_at) FROM results
             GROUP BY work_order
             ORDER BY work_order COLLATE NOCASE, work_order",
        )?;
        let rows = stmt.query_map([], |row| {
            let count: i64 = row.get(1)?;
            let last: Option<String> = row.get(2)?;
            Ok(WorkOrderSummary {
                work_order: row.get(0)?,
                results: usize::try_from(count).unwrap_or(0),
                last_recorded: last.map(parse_datetime),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Superseded values for one (feature, work order), oldest first
    pub fn result_history(
        &self,
        feature_id: FeatureId,
        work_order: &str,
    ) -> Result<Vec<ResultRevision>> {
        let Some(work_order) = normalize_work_order(work_order) else {
            return Ok(Vec::new());
        };
        let mut stmt = self.conn.prepare(
            "SELECT value, recorded_at, superseded_at FROM result_history
             WHERE feature_id = ?1 AND work_order = ?2
             ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![i64::from(feature_id), work_order], |row| {
            Ok(ResultRevision {
                feature_id,
                work_order: work_order.clone(),
                value: row.get(0)?,
                recorded_at: parse_datetime(row.get(1)?),
                superseded_at: parse_datetime(row.get(2)?),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Delete every live result of one work order; returns how many went
    pub fn reset_results(&mut self, work_order: &str) -> Result<usize> {
        let work_order = normalize_work_order(work_order)
            .ok_or_else(|| AxisError::validation("work order must not be empty"))?;

        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM results WHERE work_order = ?1",
            params![work_order],
        )?;
        if removed == 0 {
            return Err(AxisError::WorkOrderNotFound(work_order));
        }
        tx.commit()?;

        info!("reset {} result(s) of work order {}", removed, work_order);
        Ok(removed)
    }
}
