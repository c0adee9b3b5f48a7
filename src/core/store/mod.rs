//! SQLite-backed feature/result store
//!
//! One store file lives beside each drawing (`<drawing>.axis.db`). It holds
//! the ballooned features, the live result per (feature, work order), an
//! audit trail of superseded results and a small metadata table.
//!
//! The store is created in a staging file and renamed into place only after
//! schema creation and any legacy import have committed. The presence of the
//! store file is therefore the "migration done" marker: a failed import
//! leaves no store behind and is retried on the next open.

mod features;
mod legacy;
mod results;
mod schema;


use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::core::config::Config;
use crate::core::drawing::Drawing;
use crate::core::error::{AxisError, Result};
use crate::core::geometry::{Point, Rect};
use crate::core::identity::FeatureId;
use crate::entities::{Feature, FeatureSpec, InspectionResult};

pub use features::RemovedFeature;
pub use schema::SCHEMA_VERSION;

const META_ORIGIN: &str = "origin";
const META_CREATED_AT: &str = "created_at";
const META_NEXT_ID: &str = "next_feature_id";
const META_IMPORTED_AT: &str = "imported_at";
const META_MASTER_SHA256: &str = "legacy_master_sha256";
const META_RESULT_FILES: &str = "legacy_result_files";
pub const META_SKIPPED_ROWS: &str = "legacy_skipped_rows";

/// Columns selected for a [`Feature`], in [`feature_from_row`] order
const FEATURE_COLUMNS: &str =
    "id, page, x, y, w, h, bx, by, br, zoom, method, marker, nominal, lsl, usl, author, created";

/// Columns selected for an [`InspectionResult`], in [`result_from_row`] order
const RESULT_COLUMNS: &str = "feature_id, work_order, value, recorded_at, recorded_by";

/// Settings the store applies to new records
#[derive(Debug, Clone, PartialEq)]
pub struct StoreOptions {
    /// Smallest accepted pick rectangle side, in document units
    pub min_pick_size: f64,
    /// Radius given to features that do not specify one
    pub balloon_radius: f64,
    /// Recorded on new features and results
    pub author: String,
    /// Keep superseded result values
    pub audit: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl StoreOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_pick_size: config.min_pick_size(),
            balloon_radius: config.balloon_radius(),
            author: config.author(),
            audit: config.audit(),
        }
    }
}

/// How a store came into existence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOrigin {
    /// Created empty
    Fresh,
    /// Populated from legacy flat files
    LegacyImport,
}

impl StoreOrigin {
    fn as_str(&self) -> &'static str {
        match self {
            StoreOrigin::Fresh => "fresh",
            StoreOrigin::LegacyImport => "legacy_import",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "fresh" => Some(StoreOrigin::Fresh),
            "legacy_import" => Some(StoreOrigin::LegacyImport),
            _ => None,
        }
    }
}

/// Every feature and every result in a store
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub features: Vec<Feature>,
    pub results: BTreeMap<String, BTreeMap<FeatureId, InspectionResult>>,
}

/// The feature/result store for one drawing
pub struct FeatureStore {
    conn: Connection,
    path: PathBuf,
    options: StoreOptions,
}

impl FeatureStore {
    /// Open the store for a drawing, creating or importing it on first use
    ///
    /// Returns [`AxisError::Migration`] when legacy files exist but cannot be
    /// imported; in that case no store file is created.
    pub fn open(drawing: &Drawing, options: StoreOptions) -> Result<Self> {
        let path = drawing.store_path();

        if !path.exists() {
            let origin = Self::initialize(drawing, &options)?;
            info!(
                "created store {} ({})",
                path.display(),
                origin.as_str()
            );
        }

        let mut conn = Self::connect(&path)?;
        schema::migrate(&mut conn, &path)?;

        Ok(Self {
            conn,
            path,
            options,
        })
    }

    /// Open an in-memory store; used by tests and dry runs
    pub fn open_in_memory(options: StoreOptions) -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        schema::migrate(&mut conn, Path::new(":memory:"))?;
        set_meta(&conn, META_ORIGIN, StoreOrigin::Fresh.as_str())?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
            options,
        })
    }

    fn connect(path: &Path) -> Result<Connection> {
        let conn = Connection::open(path)?;
        // WAL keeps committed rows intact if the process dies mid-write
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(conn)
    }

    /// Build the store in a staging file, then rename it into place
    fn initialize(drawing: &Drawing, options: &StoreOptions) -> Result<StoreOrigin> {
        let staging = drawing.staging_path();
        if staging.exists() {
            warn!("removing stale staging store {}", staging.display());
            fs::remove_file(&staging)?;
        }

        match Self::build_staging(drawing, options, &staging) {
            Ok(origin) => {
                fs::rename(&staging, drawing.store_path())?;
                Ok(origin)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&staging) {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!("could not remove {}: {}", staging.display(), cleanup);
                    }
                }
                Err(e)
            }
        }
    }

    fn build_staging(drawing: &Drawing, options: &StoreOptions, staging: &Path) -> Result<StoreOrigin> {
        let mut conn = Connection::open(staging)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        schema::migrate(&mut conn, staging)?;

        let dataset = if drawing.has_legacy_data() {
            Some(legacy::read(drawing, options).map_err(into_migration)?)
        } else {
            None
        };

        let tx = conn.transaction()?;
        set_meta(&tx, META_CREATED_AT, &Utc::now().to_rfc3339())?;
        let origin = match dataset {
            Some(dataset) => {
                legacy::import(&tx, &dataset).map_err(into_migration)?;
                StoreOrigin::LegacyImport
            }
            None => StoreOrigin::Fresh,
        };
        set_meta(&tx, META_ORIGIN, origin.as_str())?;
        tx.commit()?;

        conn.close().map_err(|(_, e)| AxisError::Storage(e))?;
        Ok(origin)
    }

    /// Path of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// How this store was created
    pub fn origin(&self) -> Result<StoreOrigin> {
        let origin = get_meta(&self.conn, META_ORIGIN)?;
        Ok(origin
            .as_deref()
            .and_then(StoreOrigin::parse)
            .unwrap_or(StoreOrigin::Fresh))
    }

    /// Raw metadata value
    pub fn meta(&self, key: &str) -> Result<Option<String>> {
        get_meta(&self.conn, key)
    }

    /// All features and results
    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        Ok(StoreSnapshot {
            features: self.list_features(None)?,
            results: self.export_all_results()?,
        })
    }
}

/// Any failure while importing legacy data is a migration failure
fn into_migration(e: AxisError) -> AxisError {
    match e {
        AxisError::Migration { .. } => e,
        other => AxisError::migration(other),
    }
}

fn set_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?)
}

/// Next unused feature id; ids are never reused, even after deletion
fn next_feature_id(conn: &Connection) -> Result<FeatureId> {
    let counter = get_meta(conn, META_NEXT_ID)?
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(1);
    let max: Option<i64> = conn.query_row("SELECT MAX(id) FROM features", [], |row| row.get(0))?;
    let after_max = max
        .and_then(|m| u32::try_from(m).ok())
        .map(|m| m.saturating_add(1))
        .unwrap_or(1);
    Ok(FeatureId::new(counter.max(after_max).max(1)))
}

/// Raise the id counter so `id` is never handed out again
fn reserve_feature_id(conn: &Connection, id: FeatureId) -> Result<()> {
    let next = next_feature_id(conn)?;
    if id >= next {
        set_meta(conn, META_NEXT_ID, &id.next().value().to_string())?;
    } else {
        set_meta(conn, META_NEXT_ID, &next.value().to_string())?;
    }
    Ok(())
}

fn insert_feature(conn: &Connection, f: &Feature) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO features ({FEATURE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
        ),
        params![
            i64::from(f.id),
            f.page,
            f.rect.x,
            f.rect.y,
            f.rect.w,
            f.rect.h,
            f.balloon_offset.x,
            f.balloon_offset.y,
            f.balloon_radius,
            f.last_zoom,
            f.spec.method,
            f.spec.marker,
            f.spec.nominal,
            f.spec.lsl,
            f.spec.usl,
            f.author,
            f.created.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn insert_result(conn: &Connection, r: &InspectionResult) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO results ({RESULT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(feature_id, work_order) DO UPDATE SET
                value = excluded.value,
                recorded_at = excluded.recorded_at,
                recorded_by = excluded.recorded_by"
        ),
        params![
            i64::from(r.feature_id),
            r.work_order,
            r.value,
            r.recorded_at.to_rfc3339(),
            r.recorded_by,
        ],
    )?;
    Ok(())
}

fn feature_id_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<FeatureId> {
    let raw: i64 = row.get(idx)?;
    FeatureId::try_from(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn feature_from_row(row: &Row<'_>) -> rusqlite::Result<Feature> {
    Ok(Feature {
        id: feature_id_column(row, 0)?,
        page: row.get(1)?,
        rect: Rect::new(row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?),
        balloon_offset: Point::new(row.get(6)?, row.get(7)?),
        balloon_radius: row.get(8)?,
        last_zoom: row.get(9)?,
        spec: FeatureSpec {
            method: row.get(10)?,
            marker: row.get(11)?,
            nominal: row.get(12)?,
            lsl: row.get(13)?,
            usl: row.get(14)?,
        },
        author: row.get(15)?,
        created: parse_datetime(row.get(16)?),
    })
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<InspectionResult> {
    Ok(InspectionResult {
        feature_id: feature_id_column(row, 0)?,
        work_order: row.get(1)?,
        value: row.get(2)?,
        recorded_at: parse_datetime(row.get(3)?),
        recorded_by: row.get(4)?,
    })
}

/// Parse a stored timestamp; unreadable values map to the epoch
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            debug!("unreadable timestamp {:?} in store", s);
            DateTime::<Utc>::default()
        })
}
