//! Store schema and stepwise upgrades
//!
//! The schema version lives in `PRAGMA user_version`. Each step runs inside
//! one transaction together with the version bump, so an interrupted upgrade
//! leaves the previous version intact.

use rusqlite::{Connection, Transaction};
use std::path::Path;

use crate::core::error::{AxisError, Result};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

const SCHEMA_V1: &str = r#"
    -- One row per ballooned feature; geometry in document units
    CREATE TABLE IF NOT EXISTS features (
        id INTEGER PRIMARY KEY,
        page INTEGER NOT NULL CHECK (page >= 1),
        x REAL NOT NULL,
        y REAL NOT NULL,
        w REAL NOT NULL,
        h REAL NOT NULL,
        bx REAL NOT NULL DEFAULT 0,
        by REAL NOT NULL DEFAULT 0,
        br REAL NOT NULL,
        zoom REAL NOT NULL DEFAULT 1.0,
        method TEXT NOT NULL DEFAULT '',
        marker TEXT,
        nominal REAL,
        lsl REAL,
        usl REAL,
        author TEXT NOT NULL DEFAULT '',
        created TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_features_page ON features(page);

    -- At most one live result per (feature, work order)
    CREATE TABLE IF NOT EXISTS results (
        feature_id INTEGER NOT NULL,
        work_order TEXT NOT NULL,
        value TEXT NOT NULL,
        recorded_at TEXT NOT NULL,
        recorded_by TEXT,
        PRIMARY KEY (feature_id, work_order),
        FOREIGN KEY (feature_id) REFERENCES features(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_results_work_order ON results(work_order);

    -- Store metadata: origin marker, id counter, import provenance
    CREATE TABLE IF NOT EXISTS store_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
"#;

const SCHEMA_V2: &str = r#"
    -- Append-only trail of superseded result values
    CREATE TABLE IF NOT EXISTS result_history (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        feature_id INTEGER NOT NULL,
        work_order TEXT NOT NULL,
        value TEXT NOT NULL,
        recorded_at TEXT NOT NULL,
        superseded_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_result_history_key ON result_history(feature_id, work_order);
"#;

/// Bring the schema up to [`SCHEMA_VERSION`]
pub(crate) fn migrate(conn: &mut Connection, path: &Path) -> Result<()> {
    let mut version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version > SCHEMA_VERSION {
        return Err(AxisError::SchemaTooNew {
            path: path.display().to_string(),
            found: version,
            supported: SCHEMA_VERSION,
        });
    }

    if version == SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    while version < SCHEMA_VERSION {
        let next = version + 1;
        apply(&tx, next)?;
        log::debug!("store {} upgraded to schema v{}", path.display(), next);
        version = next;
    }
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;

    Ok(())
}

fn apply(tx: &Transaction<'_>, version: i32) -> Result<()> {
    match version {
        1 => tx.execute_batch(SCHEMA_V1)?,
        2 => tx.execute_batch(SCHEMA_V2)?,
        _ => unreachable!("no schema step for version {version}"),
    }
    Ok(())
}
