//! Inspection rows and tabular exports
//!
//! Both exports are pure functions of store state: they read features and
//! results and produce CSV bytes, never writing anything back.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;

use crate::core::error::{AxisError, Result};
use crate::core::identity::FeatureId;
use crate::core::status::Status;
use crate::core::tolerance::format_optional;
use crate::entities::{Feature, InspectionResult};

/// Header of the filtered row export
pub const ROW_HEADER: [&str; 8] = ["ID", "Page", "Method", "Result", "Nominal", "LSL", "USL", "Status"];

/// Header of the all-results export
pub const ALL_RESULTS_HEADER: [&str; 10] = [
    "Work Order",
    "ID",
    "Page",
    "Method",
    "Result",
    "Nominal",
    "LSL",
    "USL",
    "Status",
    "Recorded At",
];

/// One line of the inspection table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectionRow {
    pub id: FeatureId,
    pub page: u32,
    pub method: String,
    /// Raw result text, empty when nothing was entered
    pub result: String,
    pub nominal: Option<f64>,
    pub lsl: Option<f64>,
    pub usl: Option<f64>,
    pub status: Status,
}

impl InspectionRow {
    /// Row for a feature and its (optional) result in the active work order
    pub fn new(feature: &Feature, result: Option<&InspectionResult>) -> Self {
        let value = result.map(|r| r.value.as_str());
        Self {
            id: feature.id,
            page: feature.page,
            method: feature.spec.method.clone(),
            result: value.unwrap_or_default().to_string(),
            nominal: feature.spec.nominal,
            lsl: feature.spec.lsl,
            usl: feature.spec.usl,
            status: feature.judge(value),
        }
    }

    /// Cells in [`ROW_HEADER`] order
    pub fn cells(&self) -> [String; 8] {
        [
            self.id.to_string(),
            self.page.to_string(),
            self.method.clone(),
            self.result.clone(),
            format_optional(self.nominal),
            format_optional(self.lsl),
            format_optional(self.usl),
            self.status.label().to_string(),
        ]
    }
}

/// Status selection of the inspection table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(Status),
}

impl FromStr for StatusFilter {
    type Err = AxisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(StatusFilter::All),
            "pass" => Ok(StatusFilter::Only(Status::Pass)),
            "fail" => Ok(StatusFilter::Only(Status::Fail)),
            "-" | "unset" | "none" => Ok(StatusFilter::Only(Status::Unset)),
            "invalid" => Ok(StatusFilter::Only(Status::Invalid)),
            other => Err(AxisError::validation(format!(
                "unknown status filter '{other}' (expected all, pass, fail, unset or invalid)"
            ))),
        }
    }
}

/// Filter applied to inspection rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowFilter {
    pub status: StatusFilter,
    /// Case-insensitive substring of the method
    pub method: Option<String>,
}

impl RowFilter {
    pub fn matches(&self, row: &InspectionRow) -> bool {
        if let StatusFilter::Only(status) = self.status {
            if row.status != status {
                return false;
            }
        }
        match self.method.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => row
                .method
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => true,
        }
    }
}

/// Rows for all features, joined with one work order's results
pub fn build_rows(
    features: &[Feature],
    results: &BTreeMap<FeatureId, InspectionResult>,
    filter: &RowFilter,
) -> Vec<InspectionRow> {
    features
        .iter()
        .map(|f| InspectionRow::new(f, results.get(&f.id)))
        .filter(|row| filter.matches(row))
        .collect()
}

/// CSV of exactly the given rows, with [`ROW_HEADER`]
pub fn export_filtered(rows: &[InspectionRow]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(ROW_HEADER)?;
    for row in rows {
        writer.write_record(row.cells())?;
    }
    finish(writer)
}

/// CSV of every live result, grouped by work order then feature id
///
/// Status is derived from each feature's current limits.
pub fn export_all_results(
    features: &[Feature],
    all: &BTreeMap<String, BTreeMap<FeatureId, InspectionResult>>,
) -> Result<Vec<u8>> {
    let by_id: BTreeMap<FeatureId, &Feature> = features.iter().map(|f| (f.id, f)).collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(ALL_RESULTS_HEADER)?;
    for (work_order, results) in all {
        for (id, result) in results {
            let Some(feature) = by_id.get(id) else {
                continue;
            };
            let row = InspectionRow::new(feature, Some(result));
            let [id, page, method, value, nominal, lsl, usl, status] = row.cells();
            writer.write_record([
                work_order.clone(),
                id,
                page,
                method,
                value,
                nominal,
                lsl,
                usl,
                status,
                result.recorded_at.to_rfc3339(),
            ])?;
        }
    }
    finish(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| AxisError::Io(e.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::{Point, Rect};
    use crate::entities::FeatureSpec;
    use chrono::{TimeZone, Utc};

    fn feature(id: u32, method: &str, limits: Option<(f64, f64)>) -> Feature {
        Feature {
            id: FeatureId::new(id),
            page: 1,
            rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            balloon_offset: Point::default(),
            balloon_radius: 14.0,
            spec: FeatureSpec {
                method: method.to_string(),
                marker: None,
                nominal: limits.map(|(l, u)| (l + u) / 2.0),
                lsl: limits.map(|(l, _)| l),
                usl: limits.map(|(_, u)| u),
            },
            last_zoom: 1.0,
            author: "qa".into(),
            created: Utc::now(),
        }
    }

    fn result(id: u32, work_order: &str, value: &str) -> InspectionResult {
        InspectionResult {
            feature_id: FeatureId::new(id),
            work_order: work_order.into(),
            value: value.into(),
            recorded_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            recorded_by: None,
        }
    }

    #[test]
    fn test_rows_filter_by_status_and_method() {
        let features = vec![
            feature(1, "Caliper", Some((1.2, 1.3))),
            feature(2, "CMM", Some((1.2, 1.3))),
            feature(3, "caliper", None),
        ];
        let results: BTreeMap<_, _> = [result(1, "WO1", "1.25"), result(2, "WO1", "1.5")]
            .into_iter()
            .map(|r| (r.feature_id, r))
            .collect();

        let all = build_rows(&features, &results, &RowFilter::default());
        let statuses: Vec<Status> = all.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![Status::Pass, Status::Fail, Status::Unset]);

        let calipers = RowFilter {
            method: Some("CALI".into()),
            ..RowFilter::default()
        };
        assert_eq!(build_rows(&features, &results, &calipers).len(), 2);

        let failing = RowFilter {
            status: "fail".parse().unwrap(),
            method: None,
        };
        let rows = build_rows(&features, &results, &failing);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, FeatureId::new(2));
    }

    #[test]
    fn test_status_filter_parse() {
        assert_eq!("ALL".parse::<StatusFilter>().unwrap(), StatusFilter::All);
        assert_eq!(
            "-".parse::<StatusFilter>().unwrap(),
            StatusFilter::Only(Status::Unset)
        );
        assert!("maybe".parse::<StatusFilter>().is_err());
    }

    #[test]
    fn test_export_filtered_writes_header_and_rows() {
        let features = vec![feature(1, "Caliper", Some((1.2, 1.3)))];
        let results: BTreeMap<_, _> = [(FeatureId::new(1), result(1, "WO1", "1.25"))].into();
        let rows = build_rows(&features, &results, &RowFilter::default());

        let csv = String::from_utf8(export_filtered(&rows).unwrap()).unwrap();
        assert_eq!(
            csv,
            "ID,Page,Method,Result,Nominal,LSL,USL,Status\n001,1,Caliper,1.25,1.25,1.2,1.3,PASS\n"
        );
    }

    #[test]
    fn test_export_all_results_groups_by_work_order() {
        let features = vec![feature(1, "Caliper", Some((1.2, 1.3)))];
        let mut all = BTreeMap::new();
        all.insert(
            "WO2".to_string(),
            BTreeMap::from([(FeatureId::new(1), result(1, "WO2", "Fail"))]),
        );
        all.insert(
            "WO1".to_string(),
            BTreeMap::from([
                (FeatureId::new(1), result(1, "WO1", "1.22")),
                (FeatureId::new(9), result(9, "WO1", "1.0")),
            ]),
        );

        let csv = String::from_utf8(export_all_results(&features, &all).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("WO1,001,1,Caliper,1.22,"));
        assert!(lines[1].contains(",PASS,"));
        assert!(lines[2].starts_with("WO2,001,"));
        assert!(lines[2].contains(",FAIL,"));
    }
}
