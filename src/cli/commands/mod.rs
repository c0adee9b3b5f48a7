//! CLI command implementations

pub mod completions;
pub mod export;
pub mod feat;
pub mod init;
pub mod rslt;
pub mod session;
pub mod spc;
pub mod tol;
