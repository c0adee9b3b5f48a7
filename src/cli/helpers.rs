//! Shared helper functions for CLI commands
//!
//! Drawing lookup, store opening and the small text parsers that several
//! command modules need.

use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};
use miette::{IntoDiagnostic, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::OutputFormat;
use crate::core::config::Config;
use crate::core::drawing::Drawing;
use crate::core::geometry::{Point, Rect};
use crate::core::store::{FeatureStore, StoreOptions};

/// A drawing with its configuration and opened store
pub struct Workspace {
    pub drawing: Drawing,
    pub config: Config,
    pub store: FeatureStore,
}

impl Workspace {
    /// Output format for a command, honoring the configured default
    pub fn format(&self, requested: OutputFormat, fallback: OutputFormat) -> OutputFormat {
        requested.resolve(self.config.default_format.as_deref(), fallback)
    }
}

/// Locate a drawing and open (or initialize) its store
pub fn open_workspace(path: &Path) -> Result<Workspace> {
    let drawing = Drawing::new(path).into_diagnostic()?;
    let config = Config::load(Some(drawing.dir()));
    let store = FeatureStore::open(&drawing, StoreOptions::from_config(&config))?;
    Ok(Workspace {
        drawing,
        config,
        store,
    })
}

/// Parse `x,y,w,h` into a rectangle
pub fn parse_rect(s: &str) -> std::result::Result<Rect, String> {
    match parse_numbers(s)?.as_slice() {
        [x, y, w, h] => Ok(Rect::new(*x, *y, *w, *h)),
        _ => Err(format!("expected x,y,w,h but got '{}'", s)),
    }
}

/// Parse `x,y` into a point
pub fn parse_point(s: &str) -> std::result::Result<Point, String> {
    match parse_numbers(s)?.as_slice() {
        [x, y] => Ok(Point::new(*x, *y)),
        _ => Err(format!("expected x,y but got '{}'", s)),
    }
}

fn parse_numbers(s: &str) -> std::result::Result<Vec<f64>, String> {
    s.split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| format!("'{}' is not a number", part))
        })
        .collect()
}

/// Write to a file, or to stdout when no path is given
pub fn write_output(content: &[u8], output_path: Option<&PathBuf>, quiet: bool) -> Result<()> {
    match output_path {
        Some(path) => {
            fs::write(path, content).into_diagnostic()?;
            if !quiet {
                eprintln!(
                    "{} Written to {}",
                    style("✓").green(),
                    style(path.display()).cyan()
                );
            }
        }
        None => {
            use std::io::Write;
            std::io::stdout().write_all(content).into_diagnostic()?;
        }
    }
    Ok(())
}

/// Ask before a destructive action; `yes` skips the prompt
pub fn confirm(prompt: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()
        .into_diagnostic()
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Escape a string for CSV output
///
/// Handles commas, quotes, and newlines according to RFC 4180.
pub fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
