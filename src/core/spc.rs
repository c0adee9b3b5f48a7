//! Statistical process control over recorded results
//!
//! Only numeric results count as measurements; `Pass`/`Fail` keywords and
//! unparseable text are skipped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::{builder::Builder, settings::Style};

use crate::core::error::Result;
use crate::core::identity::FeatureId;
use crate::core::status::numeric;
use crate::core::store::FeatureStore;
use crate::core::tolerance::format_optional;

/// One numeric result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub value: f64,
    pub work_order: String,
    pub recorded_at: DateTime<Utc>,
}

/// Summary statistics of a feature's measurements
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureStats {
    pub count: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation; zero for a single measurement
    pub stdev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub cp: Option<f64>,
    pub cpk: Option<f64>,
}

/// A feature with its measurements across all work orders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSpc {
    pub id: FeatureId,
    pub method: String,
    pub nominal: Option<f64>,
    pub lsl: Option<f64>,
    pub usl: Option<f64>,
    pub measurements: Vec<Measurement>,
    pub stats: FeatureStats,
}

/// Compute statistics; Cp/Cpk need both limits and a positive deviation
pub fn compute_stats(values: &[f64], lsl: Option<f64>, usl: Option<f64>) -> FeatureStats {
    if values.is_empty() {
        return FeatureStats::default();
    }

    let count = values.len();
    let n = count as f64;
    let mean = values.iter().sum::<f64>() / n;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let stdev = if count > 1 {
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        variance.max(0.0).sqrt()
    } else {
        0.0
    };

    let (cp, cpk) = match (lsl, usl) {
        (Some(lsl), Some(usl)) if stdev > 0.0 => {
            let cp = (usl - lsl) / (6.0 * stdev);
            let upper = (usl - mean) / (3.0 * stdev);
            let lower = (mean - lsl) / (3.0 * stdev);
            (Some(cp), Some(upper.min(lower)))
        }
        _ => (None, None),
    };

    FeatureStats {
        count,
        mean: Some(mean),
        stdev: Some(stdev),
        min: Some(min),
        max: Some(max),
        cp,
        cpk,
    }
}

/// Features that have at least one numeric result, ordered by id
pub fn load_dataset(store: &FeatureStore) -> Result<Vec<FeatureSpc>> {
    let features = store.list_features(None)?;
    let all = store.export_all_results()?;

    let dataset = features
        .into_iter()
        .filter_map(|feature| {
            let measurements: Vec<Measurement> = all
                .values()
                .filter_map(|results| results.get(&feature.id))
                .filter_map(|r| {
                    numeric(&r.value).map(|value| Measurement {
                        value,
                        work_order: r.work_order.clone(),
                        recorded_at: r.recorded_at,
                    })
                })
                .collect();
            if measurements.is_empty() {
                return None;
            }

            let values: Vec<f64> = measurements.iter().map(|m| m.value).collect();
            let stats = compute_stats(&values, feature.spec.lsl, feature.spec.usl);
            Some(FeatureSpc {
                id: feature.id,
                method: feature.spec.method,
                nominal: feature.spec.nominal,
                lsl: feature.spec.lsl,
                usl: feature.spec.usl,
                measurements,
                stats,
            })
        })
        .collect();

    Ok(dataset)
}

/// Fixed-precision value, `-` when absent
pub fn format_stat(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", decimals, v),
        None => "-".to_string(),
    }
}

/// Markdown report with one row per feature
pub fn markdown_report(title: &str, dataset: &[FeatureSpc]) -> String {
    let mut output = String::new();
    output.push_str(&format!("# SPC Report: {}\n\n", title));

    if dataset.is_empty() {
        output.push_str("No numeric results recorded.\n");
        return output;
    }

    let mut builder = Builder::default();
    builder.push_record([
        "ID", "Method", "Nominal", "LSL", "USL", "n", "Mean", "StDev", "Min", "Max", "Cp", "Cpk",
    ]);
    for feature in dataset {
        let s = &feature.stats;
        builder.push_record([
            feature.id.to_string(),
            feature.method.clone(),
            format_optional(feature.nominal),
            format_optional(feature.lsl),
            format_optional(feature.usl),
            s.count.to_string(),
            format_stat(s.mean, 4),
            format_stat(s.stdev, 4),
            format_stat(s.min, 4),
            format_stat(s.max, 4),
            format_stat(s.cp, 2),
            format_stat(s.cpk, 2),
        ]);
    }
    output.push_str(&builder.build().with(Style::markdown()).to_string());
    output.push('\n');

    let capable = dataset
        .iter()
        .filter(|f| f.stats.cpk.is_some_and(|cpk| cpk >= 1.33))
        .count();
    let rated = dataset.iter().filter(|f| f.stats.cpk.is_some()).count();
    output.push_str(&format!(
        "\n{} feature(s) with data; {} of {} with limits have Cpk >= 1.33\n",
        dataset.len(),
        capable,
        rated
    ));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::Rect;
    use crate::core::store::StoreOptions;
    use crate::entities::{FeaturePatch, NewFeature};

    fn close(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn test_stats_with_limits() {
        let stats = compute_stats(&[1.0, 2.0, 3.0], Some(0.0), Some(4.0));
        assert_eq!(stats.count, 3);
        assert!(close(stats.mean, 2.0));
        assert!(close(stats.stdev, 1.0));
        assert!(close(stats.min, 1.0));
        assert!(close(stats.max, 3.0));
        assert!(close(stats.cp, 4.0 / 6.0));
        assert!(close(stats.cpk, 2.0 / 3.0));
    }

    #[test]
    fn test_single_value_has_no_capability() {
        let stats = compute_stats(&[5.0], Some(4.0), Some(6.0));
        assert!(close(stats.stdev, 0.0));
        assert_eq!(stats.cp, None);
        assert_eq!(stats.cpk, None);
        assert_eq!(compute_stats(&[], None, None), FeatureStats::default());
    }

    #[test]
    fn test_dataset_skips_keywords_and_empty_features() {
        let mut store = FeatureStore::open_in_memory(StoreOptions::default()).unwrap();
        let a = store
            .create_feature(NewFeature::new(1, Rect::new(0.0, 0.0, 10.0, 10.0)))
            .unwrap();
        let b = store
            .create_feature(NewFeature::new(1, Rect::new(20.0, 0.0, 10.0, 10.0)))
            .unwrap();
        store
            .update_feature(
                a.id,
                &FeaturePatch {
                    lsl: Some(Some(0.9)),
                    usl: Some(Some(1.1)),
                    ..FeaturePatch::default()
                },
            )
            .unwrap();
        store.upsert_result(a.id, "WO1", "1.0").unwrap();
        store.upsert_result(a.id, "WO2", "1.02").unwrap();
        store.upsert_result(a.id, "WO3", "pass").unwrap();
        store.upsert_result(b.id, "WO1", "Fail").unwrap();

        let dataset = load_dataset(&store).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset[0].id, a.id);
        assert_eq!(dataset[0].stats.count, 2);
        assert!(dataset[0].stats.cpk.is_some());

        let report = markdown_report("part.pdf", &dataset);
        assert!(report.starts_with("# SPC Report: part.pdf"));
        assert!(report.contains("| 001"));
    }

    #[test]
    fn test_format_stat() {
        assert_eq!(format_stat(Some(1.23456), 3), "1.235");
        assert_eq!(format_stat(None, 3), "-");
    }
}
