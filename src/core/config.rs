//! Configuration management with layered hierarchy

use log::warn;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Drawing-local configuration file, looked up beside the drawing
pub const LOCAL_CONFIG_FILE: &str = "axis.yaml";

const DEFAULT_MIN_PICK_SIZE: f64 = 5.0;
const DEFAULT_BALLOON_RADIUS: f64 = 14.0;
const DEFAULT_UNDO_DEPTH: usize = 100;

/// Axis configuration with layered hierarchy
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name recorded on new features and results
    pub author: Option<String>,

    /// Smallest accepted pick rectangle side, in document units
    pub min_pick_size: Option<f64>,

    /// Balloon radius for new features, in document units
    pub balloon_radius: Option<f64>,

    /// Number of undoable operations kept per session
    pub undo_depth: Option<usize>,

    /// Keep superseded result values in an audit table
    pub audit: Option<bool>,

    /// Default output format
    pub default_format: Option<String>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load(drawing_dir: Option<&Path>) -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (accessors below)

        // 2. Global user config (~/.config/axis/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::read_file(&global_path) {
                config.merge(global);
            }
        }

        // 3. Drawing-local config (axis.yaml next to the drawing)
        if let Some(dir) = drawing_dir {
            if let Some(local) = Self::read_file(&dir.join(LOCAL_CONFIG_FILE)) {
                config.merge(local);
            }
        }

        // 4. Environment variables
        config.merge_env();

        config
    }

    /// Parse a YAML configuration document
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }

    fn read_file(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = std::fs::read_to_string(path).ok()?;
        match Self::from_yaml(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("ignoring malformed config {}: {}", path.display(), e);
                None
            }
        }
    }

    fn merge_env(&mut self) {
        if let Ok(author) = std::env::var("AXIS_AUTHOR") {
            self.author = Some(author);
        }
        if let Some(size) = env_number("AXIS_MIN_PICK_SIZE") {
            self.min_pick_size = Some(size);
        }
        if let Some(radius) = env_number("AXIS_BALLOON_RADIUS") {
            self.balloon_radius = Some(radius);
        }
        if let Some(depth) = env_number("AXIS_UNDO_DEPTH") {
            self.undo_depth = Some(depth);
        }
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "axis")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.author.is_some() {
            self.author = other.author;
        }
        if other.min_pick_size.is_some() {
            self.min_pick_size = other.min_pick_size;
        }
        if other.balloon_radius.is_some() {
            self.balloon_radius = other.balloon_radius;
        }
        if other.undo_depth.is_some() {
            self.undo_depth = other.undo_depth;
        }
        if other.audit.is_some() {
            self.audit = other.audit;
        }
        if other.default_format.is_some() {
            self.default_format = other.default_format;
        }
    }

    /// Get the author name, falling back to the login name
    pub fn author(&self) -> String {
        if let Some(ref author) = self.author {
            return author.clone();
        }

        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string())
    }

    pub fn min_pick_size(&self) -> f64 {
        self.min_pick_size
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(DEFAULT_MIN_PICK_SIZE)
    }

    pub fn balloon_radius(&self) -> f64 {
        self.balloon_radius
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(DEFAULT_BALLOON_RADIUS)
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_depth
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_UNDO_DEPTH)
    }

    pub fn audit(&self) -> bool {
        self.audit.unwrap_or(true)
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring {}={:?}: not a number", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.min_pick_size(), 5.0);
        assert_eq!(config.balloon_radius(), 14.0);
        assert_eq!(config.undo_depth(), 100);
        assert!(config.audit());
    }

    #[test]
    fn test_yaml_layer_overrides_defaults() {
        let mut config = Config::default();
        let local = Config::from_yaml("balloon_radius: 20\nundo_depth: 5\naudit: false\n").unwrap();
        config.merge(local);
        assert_eq!(config.balloon_radius(), 20.0);
        assert_eq!(config.undo_depth(), 5);
        assert!(!config.audit());
        assert_eq!(config.min_pick_size(), 5.0);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_yaml("balloon_radius: -3\nundo_depth: 0\n").unwrap();
        assert_eq!(config.balloon_radius(), 14.0);
        assert_eq!(config.undo_depth(), 100);
    }

    #[test]
    fn test_local_file_is_read() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(LOCAL_CONFIG_FILE), "min_pick_size: 2.5\n").unwrap();
        let config = Config::load(Some(tmp.path()));
        assert_eq!(config.min_pick_size(), 2.5);
    }
}
