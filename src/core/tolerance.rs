//! Tolerance expression parser
//!
//! Turns the short text an inspector types next to a balloon into a nominal
//! value and optional specification limits:
//!
//! | Input               | Nominal | LSL   | USL   |
//! |---------------------|---------|-------|-------|
//! | `1.25 ±0.05`        | 1.25    | 1.20  | 1.30  |
//! | `10 +0.1/-0.05`     | 10      | 9.95  | 10.1  |
//! | `10 -0.05 +0.1`     | 10      | 9.95  | 10.1  |
//! | `Ø6.5 +/- .1`       | 6.5     | 6.4   | 6.6   |
//! | `42`                | 42      | -     | -     |
//!
//! Whitespace is ignored everywhere. A leading diameter or shape marker is
//! kept for display only. Parsing is pure; applying the result to a feature
//! is the caller's job.

use serde::{Deserialize, Serialize};

use crate::core::error::{AxisError, Result};

/// Display markers that may precede the nominal, longest first
const MARKERS: &[&str] = &["2X", "SR", "Ø", "ø", "⌀", "□", "R", "M"];

/// Derived limits are snapped to this grid so decimal input compares
/// exactly at the boundaries (1.25 - 0.05 == 1.2)
const LIMIT_GRID: f64 = 1e9;

const OUT_OF_RANGE: &str = "limits are out of range";

/// Parsed tolerance expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// Leading marker such as "Ø", kept for display
    pub marker: Option<String>,
    pub nominal: f64,
    pub lsl: Option<f64>,
    pub usl: Option<f64>,
}

impl Tolerance {
    /// True when both limits are defined
    pub fn has_limits(&self) -> bool {
        self.lsl.is_some() && self.usl.is_some()
    }
}

/// Parse a tolerance expression
pub fn parse_tolerance(input: &str) -> Result<Tolerance> {
    let fail = |reason: &str| AxisError::Parse {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let compact = normalize(input);
    if compact.is_empty() {
        return Err(fail("expression is empty"));
    }

    let (marker, body) = split_marker(&compact);

    let (nominal, rest) = scan_number(body, true).ok_or_else(|| fail("expected a nominal value"))?;

    if rest.is_empty() {
        return Ok(Tolerance {
            marker,
            nominal,
            lsl: None,
            usl: None,
        });
    }

    if let Some(after) = strip_symmetric(rest) {
        let (deviation, tail) =
            scan_number(after, true).ok_or_else(|| fail("expected a deviation after '±'"))?;
        if !tail.is_empty() {
            return Err(fail("unexpected text after the deviation"));
        }
        let deviation = deviation.abs();
        return Ok(Tolerance {
            marker,
            nominal,
            lsl: Some(snap(nominal - deviation).ok_or_else(|| fail(OUT_OF_RANGE))?),
            usl: Some(snap(nominal + deviation).ok_or_else(|| fail(OUT_OF_RANGE))?),
        });
    }

    let (first, tail) = scan_signed(rest).ok_or_else(|| fail("expected '±' or a signed deviation"))?;
    // A lone "+D" is shorthand for "±D"
    if tail.is_empty() && rest.starts_with('+') {
        return Ok(Tolerance {
            marker,
            nominal,
            lsl: Some(snap(nominal - first).ok_or_else(|| fail(OUT_OF_RANGE))?),
            usl: Some(snap(nominal + first).ok_or_else(|| fail(OUT_OF_RANGE))?),
        });
    }
    let tail = tail.strip_prefix('/').unwrap_or(tail);
    let (second, tail) = match scan_signed(tail) {
        Some(found) => found,
        // "+0.2/0": an unsigned second deviation is only meaningful as zero
        None => match scan_number(tail, false) {
            Some((value, rest)) if value == 0.0 => (0.0, rest),
            _ => return Err(fail("expected a second signed deviation")),
        },
    };
    if !tail.is_empty() {
        return Err(fail("unexpected text after the deviations"));
    }

    let (lsl, usl) = if first >= 0.0 && second <= 0.0 {
        (nominal - second.abs(), nominal + first)
    } else if second >= 0.0 && first <= 0.0 {
        (nominal - first.abs(), nominal + second)
    } else {
        // Both deviations carry the same sign: the band is shifted off nominal
        (nominal + first.min(second), nominal + first.max(second))
    };

    Ok(Tolerance {
        marker,
        nominal,
        lsl: Some(snap(lsl).ok_or_else(|| fail(OUT_OF_RANGE))?),
        usl: Some(snap(usl).ok_or_else(|| fail(OUT_OF_RANGE))?),
    })
}

/// Format a number for display, trimming trailing zeros ("1.200000" -> "1.2")
pub fn format_number(value: f64) -> String {
    let text = format!("{:.6}", value);
    let text = if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    };
    if text == "-0" {
        "0".to_string()
    } else {
        text
    }
}

/// Format an optional number, empty when absent
pub fn format_optional(value: Option<f64>) -> String {
    value.map(format_number).unwrap_or_default()
}

fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '\u{2212}' | '\u{FF0D}' | '\u{2013}' => '-',
            '\u{FF0B}' => '+',
            other => other,
        })
        .collect()
}

fn split_marker(s: &str) -> (Option<String>, &str) {
    for marker in MARKERS {
        if let Some(rest) = s.strip_prefix(marker) {
            return (Some((*marker).to_string()), rest);
        }
    }
    (None, s)
}

fn strip_symmetric(s: &str) -> Option<&str> {
    ["±", "+/-", "-/+", "+-"]
        .iter()
        .find_map(|token| s.strip_prefix(token))
}

/// Scan a signed deviation; the sign is mandatory
fn scan_signed(s: &str) -> Option<(f64, &str)> {
    if s.starts_with('+') || s.starts_with('-') {
        scan_number(s, true)
    } else {
        None
    }
}

/// Scan `[sign] digits [. digits]` from the front of `s`
fn scan_number(s: &str, allow_sign: bool) -> Option<(f64, &str)> {
    let bytes = s.as_bytes();
    let mut end = 0;

    if allow_sign && matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }

    let mut digits = 0;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
        digits += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
            digits += 1;
        }
    }

    if digits == 0 {
        return None;
    }

    let value: f64 = s[..end].parse().ok()?;
    value.is_finite().then_some((value, &s[end..]))
}

/// `None` when the limit leaves the finite range
fn snap(value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    let scaled = value * LIMIT_GRID;
    if scaled.is_finite() {
        Some(scaled.round() / LIMIT_GRID)
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: Option<f64>, expected: f64) {
        let actual = actual.expect("limit should be present");
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_symmetric() {
        let tol = parse_tolerance("1.25 ±0.05").unwrap();
        assert_eq!(tol.nominal, 1.25);
        assert_eq!(tol.lsl, Some(1.2));
        assert_eq!(tol.usl, Some(1.3));
        assert_eq!(tol.marker, None);
    }

    #[test]
    fn test_symmetric_spellings() {
        for expr in ["10±0.1", "10 +/- 0.1", "10+-0.1", "10 ± -0.1", "10 ±.1"] {
            let tol = parse_tolerance(expr).unwrap();
            assert_close(tol.lsl, 9.9);
            assert_close(tol.usl, 10.1);
        }
    }

    #[test]
    fn test_symmetric_property_over_many_values() {
        for n in [-5.0, 0.0, 0.5, 1.25, 12.7, 250.0] {
            for d in [0.001, 0.05, 0.1, 2.0] {
                let tol = parse_tolerance(&format!("{n} ± {d}")).unwrap();
                assert_close(tol.lsl, n - d);
                assert_close(tol.usl, n + d);
            }
        }
    }

    #[test]
    fn test_asymmetric_is_order_independent() {
        let a = parse_tolerance("10 +0.1/-0.05").unwrap();
        let b = parse_tolerance("10 -0.05/+0.1").unwrap();
        let c = parse_tolerance("10 -0.05 +0.1").unwrap();
        for tol in [a, b, c] {
            assert_close(tol.lsl, 9.95);
            assert_close(tol.usl, 10.1);
        }
    }

    #[test]
    fn test_asymmetric_with_zero_side() {
        let tol = parse_tolerance("5 +0.2/0").unwrap();
        assert_close(tol.lsl, 5.0);
        assert_close(tol.usl, 5.2);
    }

    #[test]
    fn test_same_sign_deviations_shift_band() {
        let tol = parse_tolerance("20 +0.3 +0.1").unwrap();
        assert_close(tol.lsl, 20.1);
        assert_close(tol.usl, 20.3);
    }

    #[test]
    fn test_marker_is_kept_for_display() {
        let tol = parse_tolerance("Ø6.5 ±0.1").unwrap();
        assert_eq!(tol.marker.as_deref(), Some("Ø"));
        assert_eq!(tol.nominal, 6.5);

        let tol = parse_tolerance("R3").unwrap();
        assert_eq!(tol.marker.as_deref(), Some("R"));
        assert_eq!(tol.nominal, 3.0);
    }

    #[test]
    fn test_unicode_minus_is_accepted() {
        let tol = parse_tolerance("4 +0.1 \u{2212}0.2").unwrap();
        assert_close(tol.lsl, 3.8);
        assert_close(tol.usl, 4.1);
    }

    #[test]
    fn test_bare_number_has_no_limits() {
        let tol = parse_tolerance("  42.0 ").unwrap();
        assert_eq!(tol.nominal, 42.0);
        assert!(!tol.has_limits());
        assert_eq!(tol.lsl, None);
        assert_eq!(tol.usl, None);
    }

    #[test]
    fn test_unrecognized_expressions_fail() {
        for expr in ["", "abc", "1,000", "10 ±", "10 -0.1", "10 ±0.1mm", "1.2.3", "nan", "inf"] {
            let err = parse_tolerance(expr).unwrap_err();
            assert!(
                matches!(err, AxisError::Parse { .. }),
                "'{expr}' should not parse"
            );
        }
    }

    #[test]
    fn test_single_plus_deviation_is_symmetric() {
        let tol = parse_tolerance("10 +0.1").unwrap();
        assert_eq!(tol.nominal, 10.0);
        assert_close(tol.lsl, 9.9);
        assert_close(tol.usl, 10.1);
    }

    #[test]
    fn test_huge_values_stay_finite() {
        let nominal = format!("4{}", "0".repeat(298));
        let tol = parse_tolerance(&format!("{nominal} ±1")).unwrap();
        assert!(tol.lsl.is_some_and(f64::is_finite));
        assert!(tol.usl.is_some_and(f64::is_finite));

        let near_max = format!("17{}", "0".repeat(307));
        let wide = format!("1{}", "0".repeat(308));
        let err = parse_tolerance(&format!("{near_max} ±{wide}")).unwrap_err();
        assert!(matches!(err, AxisError::Parse { .. }));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1.2), "1.2");
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(-0.0000001), "0");
        assert_eq!(format_optional(None), "");
    }
}
