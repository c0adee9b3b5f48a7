//! One-time import of the legacy flat files
//!
//! The whole dataset is read and validated before anything is written, then
//! inserted inside the caller's transaction. Any malformed row aborts the
//! import with [`AxisError::Migration`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use csv::StringRecord;
use log::{info, warn};
use rusqlite::Connection;
use sha2::{Digest, Sha256};

use super::{
    insert_feature, insert_result, set_meta, StoreOptions, META_IMPORTED_AT, META_MASTER_SHA256,
    META_NEXT_ID, META_RESULT_FILES, META_SKIPPED_ROWS,
};
use crate::core::drawing::Drawing;
use crate::core::error::{AxisError, Result};
use crate::core::geometry::{Point, Rect};
use crate::core::identity::FeatureId;
use crate::core::status::normalize_entry;
use crate::entities::{Feature, FeatureSpec, InspectionResult};

/// Everything read from the legacy files of one drawing
#[derive(Debug, Clone)]
pub(crate) struct LegacyDataset {
    pub features: Vec<Feature>,
    pub results: Vec<InspectionResult>,
    pub master_sha256: Option<String>,
    pub result_files: usize,
    /// Result rows whose feature id is absent from the master file
    pub skipped_rows: usize,
}

/// Read and validate all legacy files beside `drawing`
pub(crate) fn read(drawing: &Drawing, options: &StoreOptions) -> Result<LegacyDataset> {
    let master = drawing.legacy_master_path();
    let (features, master_sha256) = if master.is_file() {
        let bytes = fs::read(&master)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = format!("{:x}", hasher.finalize());
        (read_master(&master, &bytes, options)?, Some(digest))
    } else {
        (Vec::new(), None)
    };

    let known: BTreeSet<FeatureId> = features.iter().map(|f| f.id).collect();
    let files = drawing.legacy_result_files();
    let mut results = Vec::new();
    let mut skipped_rows = 0;

    for (work_order, path) in &files {
        let (rows, skipped) = read_results(path, work_order, &known)?;
        results.extend(rows);
        skipped_rows += skipped;
    }

    Ok(LegacyDataset {
        features,
        results,
        master_sha256,
        result_files: files.len(),
        skipped_rows,
    })
}

/// Insert a validated dataset; the caller owns the transaction
pub(crate) fn import(conn: &Connection, dataset: &LegacyDataset) -> Result<()> {
    for feature in &dataset.features {
        insert_feature(conn, feature)?;
    }
    for result in &dataset.results {
        insert_result(conn, result)?;
    }

    let next = dataset
        .features
        .iter()
        .map(|f| f.id)
        .max()
        .map(|id| id.next())
        .unwrap_or(FeatureId::new(1));
    set_meta(conn, META_NEXT_ID, &next.value().to_string())?;
    set_meta(conn, META_IMPORTED_AT, &Utc::now().to_rfc3339())?;
    set_meta(conn, META_RESULT_FILES, &dataset.result_files.to_string())?;
    set_meta(conn, META_SKIPPED_ROWS, &dataset.skipped_rows.to_string())?;
    if let Some(ref digest) = dataset.master_sha256 {
        set_meta(conn, META_MASTER_SHA256, digest)?;
    }

    info!(
        "imported {} legacy feature(s) and {} result(s) from {} work order file(s)",
        dataset.features.len(),
        dataset.results.len(),
        dataset.result_files
    );
    Ok(())
}

fn read_master(path: &Path, bytes: &[u8], options: &StoreOptions) -> Result<Vec<Feature>> {
    let created = modified_time(path);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = build_header_map(reader.headers().map_err(|e| fail(path, 1, e))?);
    if !headers.contains_key("id") {
        return Err(fail(path, 1, "missing 'id' column"));
    }

    let mut by_id: BTreeMap<FeatureId, Feature> = BTreeMap::new();
    for (index, record) in reader.records().enumerate() {
        let line = index + 2;
        let record = record.map_err(|e| fail(path, line, e))?;
        let row = MasterRow {
            record: &record,
            headers: &headers,
            path,
            line,
        };

        let Some(raw_id) = row.text("id") else {
            continue;
        };
        let id: FeatureId = raw_id.parse().map_err(|e| fail(path, line, e))?;

        let feature = Feature {
            id,
            page: row.number::<u32>("page")?.unwrap_or(1).max(1),
            rect: Rect::new(
                row.required("x")?,
                row.required("y")?,
                row.required("w")?,
                row.required("h")?,
            ),
            balloon_offset: Point::new(
                row.number("bx")?.unwrap_or(0.0),
                row.number("by")?.unwrap_or(0.0),
            ),
            balloon_radius: row
                .number::<f64>("br")?
                .filter(|r| *r > 0.0)
                .unwrap_or(options.balloon_radius),
            spec: FeatureSpec {
                method: row.text("method").unwrap_or_default(),
                marker: None,
                nominal: row.spec_value("nominal"),
                lsl: row.spec_value("lsl"),
                usl: row.spec_value("usl"),
            },
            last_zoom: row
                .number::<f64>("zoom")?
                .filter(|z| z.is_finite() && *z > 0.0)
                .unwrap_or(1.0),
            author: row.text("username").unwrap_or_else(|| options.author.clone()),
            created,
        };

        if by_id.insert(id, feature).is_some() {
            warn!("{}:{}: duplicate feature id {}, keeping the later row", path.display(), line, id);
        }
    }

    Ok(by_id.into_values().collect())
}

fn read_results(
    path: &Path,
    work_order: &str,
    known: &BTreeSet<FeatureId>,
) -> Result<(Vec<InspectionResult>, usize)> {
    let recorded_at = modified_time(path);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| fail(path, 0, e))?;

    let headers = build_header_map(reader.headers().map_err(|e| fail(path, 1, e))?);
    if !headers.contains_key("id") {
        return Err(fail(path, 1, "missing 'id' column"));
    }

    let mut rows: BTreeMap<FeatureId, InspectionResult> = BTreeMap::new();
    let mut skipped = 0;
    for (index, record) in reader.records().enumerate() {
        let line = index + 2;
        let record = record.map_err(|e| fail(path, line, e))?;
        let Some(raw_id) = get_field(&record, &headers, "id") else {
            continue;
        };
        let feature_id: FeatureId = raw_id.parse().map_err(|e| fail(path, line, e))?;
        if !known.contains(&feature_id) {
            warn!(
                "{}:{}: result for unknown feature {} skipped",
                path.display(),
                line,
                feature_id
            );
            skipped += 1;
            continue;
        }

        let value = get_field(&record, &headers, "result")
            .map(|v| normalize_entry(&v))
            .unwrap_or_default();
        rows.insert(
            feature_id,
            InspectionResult {
                feature_id,
                work_order: work_order.to_string(),
                value,
                recorded_at,
                recorded_by: None,
            },
        );
    }

    Ok((rows.into_values().collect(), skipped))
}

/// One master record with its header lookup
struct MasterRow<'a> {
    record: &'a StringRecord,
    headers: &'a HashMap<String, usize>,
    path: &'a Path,
    line: usize,
}

impl MasterRow<'_> {
    fn text(&self, column: &str) -> Option<String> {
        get_field(self.record, self.headers, column)
    }

    /// Optional numeric column; blank means absent, garbage is an error
    fn number<T: std::str::FromStr>(&self, column: &str) -> Result<Option<T>> {
        match self.text(column) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
                fail(
                    self.path,
                    self.line,
                    format!("column '{column}' is not a number: {raw:?}"),
                )
            }),
        }
    }

    /// Spec columns held free text in the legacy tool; anything that is
    /// not a finite number is read as absent
    fn spec_value(&self, column: &str) -> Option<f64> {
        let raw = self.text(column)?;
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Some(value),
            _ => {
                warn!(
                    "{}:{}: column '{}' is not a number ({:?}), leaving it empty",
                    self.path.display(),
                    self.line,
                    column,
                    raw
                );
                None
            }
        }
    }

    fn required(&self, column: &str) -> Result<f64> {
        self.number::<f64>(column)?
            .filter(|v| v.is_finite())
            .ok_or_else(|| fail(self.path, self.line, format!("column '{column}' is required")))
    }
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_lowercase(), i))
        .collect()
}

fn get_field(record: &StringRecord, headers: &HashMap<String, usize>, column: &str) -> Option<String> {
    headers
        .get(column)
        .and_then(|&idx| record.get(idx))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn modified_time(path: &Path) -> DateTime<Utc> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

fn fail(path: &Path, line: usize, reason: impl std::fmt::Display) -> AxisError {
    AxisError::migration(format!("{}:{}: {}", path.display(), line, reason))
}
