//! Error taxonomy for the feature/result engine
//!
//! Every fallible operation in the engine returns [`AxisError`]. Callers that
//! only need to decide how to react (re-prompt, refresh, abort) should match
//! on [`AxisError::kind`] rather than on individual variants.

use miette::Diagnostic;
use thiserror::Error;

use crate::core::identity::FeatureId;

/// Coarse error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Tolerance expression not recognized; nothing was changed
    ParseFailure,
    /// A feature or work order id is unknown to the store
    NotFound,
    /// Input rejected before any store write
    ValidationFailure,
    /// Disk or transaction error; the operation was not applied
    StorageFailure,
    /// Legacy import could not complete; no store was created
    MigrationFailure,
}

/// Errors raised by the store, session and parsers
#[derive(Debug, Error, Diagnostic)]
pub enum AxisError {
    #[error("unrecognized tolerance expression '{input}': {reason}")]
    #[diagnostic(
        code(axis::parse),
        help("use forms like '1.25 ±0.05', '1.25 +0.1/-0.05' or 'Ø10'")
    )]
    Parse { input: String, reason: String },

    #[error("feature {0} not found")]
    #[diagnostic(code(axis::not_found), help("list features with 'axis feat list'"))]
    FeatureNotFound(FeatureId),

    #[error("work order '{0}' has no results")]
    #[diagnostic(code(axis::not_found))]
    WorkOrderNotFound(String),

    #[error("{0}")]
    #[diagnostic(code(axis::validation))]
    Validation(String),

    #[error("storage failure: {0}")]
    #[diagnostic(code(axis::storage))]
    Storage(#[from] rusqlite::Error),

    #[error("I/O failure: {0}")]
    #[diagnostic(code(axis::storage::io))]
    Io(#[from] std::io::Error),

    #[error("CSV failure: {0}")]
    #[diagnostic(code(axis::storage::csv))]
    Csv(#[from] csv::Error),

    #[error("store at {path} uses schema version {found}, newer than supported {supported}")]
    #[diagnostic(code(axis::storage::schema), help("upgrade axis to open this drawing"))]
    SchemaTooNew {
        path: String,
        found: i32,
        supported: i32,
    },

    #[error("legacy import failed: {reason}")]
    #[diagnostic(
        code(axis::migration),
        help("fix the legacy CSV files; the import is retried on the next open")
    )]
    Migration { reason: String },
}

impl AxisError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AxisError::Parse { .. } => ErrorKind::ParseFailure,
            AxisError::FeatureNotFound(_) | AxisError::WorkOrderNotFound(_) => ErrorKind::NotFound,
            AxisError::Validation(_) => ErrorKind::ValidationFailure,
            AxisError::Storage(_)
            | AxisError::Io(_)
            | AxisError::Csv(_)
            | AxisError::SchemaTooNew { .. } => ErrorKind::StorageFailure,
            AxisError::Migration { .. } => ErrorKind::MigrationFailure,
        }
    }

    /// Recoverable errors are handled locally; the others abort the operation
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ParseFailure | ErrorKind::NotFound | ErrorKind::ValidationFailure
        )
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        AxisError::Validation(message.into())
    }

    pub(crate) fn migration(reason: impl std::fmt::Display) -> Self {
        AxisError::Migration {
            reason: reason.to_string(),
        }
    }
}

/// Result alias for engine operations
pub type Result<T, E = AxisError> = std::result::Result<T, E>;
