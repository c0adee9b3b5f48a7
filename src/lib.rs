//! Axis: drawing balloons and inspection results
//!
//! A feature/result engine for ballooning engineering drawings and recording
//! per-work-order measurements, with a SQLite store kept beside each drawing.

pub mod cli;
pub mod core;
pub mod entities;
