//! Core module - the feature/result engine

pub mod config;
pub mod drawing;
pub mod error;
pub mod geometry;
pub mod history;
pub mod identity;
pub mod render;
pub mod report;
pub mod session;
pub mod spc;
pub mod status;
pub mod store;
pub mod tolerance;

pub use config::Config;
pub use drawing::{Drawing, DrawingError};
pub use error::{AxisError, ErrorKind};
pub use history::{FieldChange, Operation, UndoLog};
pub use identity::{FeatureId, IdParseError};
pub use session::{Mode, Phase, Session, SessionOptions};
pub use status::Status;
pub use store::{FeatureStore, StoreOptions, StoreOrigin};
pub use tolerance::{parse_tolerance, Tolerance};
