//! Drawing discovery and the files kept beside it
//!
//! For a drawing `part.pdf` the engine uses:
//!
//! - `part.pdf.axis.db` - the feature/result store
//! - `part.pdf.balloons.csv` - legacy master feature file (import only)
//! - `part.pdf.<WO>.csv` - legacy results per work order, `/` written as `_`

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Store file suffix appended to the drawing file name
pub const STORE_SUFFIX: &str = ".axis.db";

/// Suffix of the temporary store built during initialization
const STAGING_SUFFIX: &str = ".axis.db.partial";

/// Legacy master file suffix
pub const LEGACY_MASTER_SUFFIX: &str = ".balloons.csv";

/// A drawing file and its sibling data files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drawing {
    path: PathBuf,
}

impl Drawing {
    /// Locate a drawing; its directory must exist, the drawing itself need not
    pub fn new(path: impl AsRef<Path>) -> Result<Self, DrawingError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .ok_or_else(|| DrawingError::NotAFile(path.to_path_buf()))?;

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let parent = parent
            .canonicalize()
            .map_err(|_| DrawingError::MissingDirectory(parent.clone()))?;

        Ok(Self {
            path: parent.join(file_name),
        })
    }

    /// Full path of the drawing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the drawing
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Drawing file name, e.g. `part.pdf`
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        self.dir().join(format!("{}{}", self.file_name(), suffix))
    }

    pub fn store_path(&self) -> PathBuf {
        self.sibling(STORE_SUFFIX)
    }

    pub(crate) fn staging_path(&self) -> PathBuf {
        self.sibling(STAGING_SUFFIX)
    }

    pub fn legacy_master_path(&self) -> PathBuf {
        self.sibling(LEGACY_MASTER_SUFFIX)
    }

    /// Legacy result file for a work order
    pub fn legacy_result_path(&self, work_order: &str) -> PathBuf {
        self.sibling(&format!(".{}.csv", work_order.replace('/', "_")))
    }

    /// Legacy per-work-order result files, sorted by file name
    pub fn legacy_result_files(&self) -> Vec<(String, PathBuf)> {
        let prefix = format!("{}.", self.file_name());
        let master = format!("{}{}", self.file_name(), LEGACY_MASTER_SUFFIX);

        let mut files: Vec<(String, PathBuf)> = WalkDir::new(self.dir())
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                if name == master || !name.starts_with(&prefix) || !name.ends_with(".csv") {
                    return None;
                }
                let middle = &name[prefix.len()..name.len() - ".csv".len()];
                if middle.is_empty() {
                    return None;
                }
                Some((middle.replace('_', "/"), e.path().to_path_buf()))
            })
            .collect();

        files.dedup_by(|a, b| a.0 == b.0);
        files
    }

    /// True when any legacy flat file sits beside the drawing
    pub fn has_legacy_data(&self) -> bool {
        self.legacy_master_path().is_file() || !self.legacy_result_files().is_empty()
    }
}

/// Errors locating a drawing
#[derive(Debug, Error)]
pub enum DrawingError {
    #[error("{0:?} does not name a drawing file")]
    NotAFile(PathBuf),

    #[error("drawing directory {0:?} does not exist")]
    MissingDirectory(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sibling_paths() {
        let tmp = tempdir().unwrap();
        let drawing = Drawing::new(tmp.path().join("part.pdf")).unwrap();
        assert!(drawing.store_path().ends_with("part.pdf.axis.db"));
        assert!(drawing.legacy_master_path().ends_with("part.pdf.balloons.csv"));
        assert!(drawing
            .legacy_result_path("WO/12")
            .ends_with("part.pdf.WO_12.csv"));
    }

    #[test]
    fn test_legacy_result_files_skip_master_and_other_drawings() {
        let tmp = tempdir().unwrap();
        for name in [
            "part.pdf.balloons.csv",
            "part.pdf.WO_1.csv",
            "part.pdf.SN2.csv",
            "other.pdf.WO3.csv",
            "part.pdf.axis.db",
        ] {
            std::fs::write(tmp.path().join(name), "id,result\n").unwrap();
        }
        let drawing = Drawing::new(tmp.path().join("part.pdf")).unwrap();
        let orders: Vec<String> = drawing
            .legacy_result_files()
            .into_iter()
            .map(|(wo, _)| wo)
            .collect();
        assert_eq!(orders, vec!["SN2".to_string(), "WO/1".to_string()]);
        assert!(drawing.has_legacy_data());
    }

    #[test]
    fn test_missing_directory_is_rejected() {
        let tmp = tempdir().unwrap();
        let err = Drawing::new(tmp.path().join("nope/part.pdf")).unwrap_err();
        assert!(matches!(err, DrawingError::MissingDirectory(_)));
    }
}
