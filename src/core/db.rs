//! Connection handling and on-disk layout for a store instance.
//!
//! Each store instance owns two files under its root directory: the SQLite
//! database `<storeId>.db` and the compressed audit trail `<storeId>-log`.

use crate::core::error::TandemError;
use crate::core::schema;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::{Path, PathBuf};

/// Store ids name files on disk; restrict them to a file-name-safe shape.
pub fn validate_store_id(store_id: &str) -> Result<(), TandemError> {
    let re = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap();
    if !re.is_match(store_id) {
        return Err(TandemError::ValidationError(format!(
            "Invalid store id '{}'. Must match [A-Za-z0-9][A-Za-z0-9._-]*",
            store_id
        )));
    }
    Ok(())
}

pub fn assertion_db_path(root: &Path, store_id: &str) -> PathBuf {
    root.join(format!("{}.db", store_id))
}

pub fn fact_log_path(root: &Path, store_id: &str) -> PathBuf {
    root.join(format!("{}-log", store_id))
}

pub fn db_connect(db_path: &Path) -> Result<Connection, TandemError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(TandemError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(TandemError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(TandemError::RusqliteError)?;
    Ok(conn)
}

/// Creates the store directory, opens the database, and bootstraps the
/// schema. Safe to call on an existing store; refuses stores written by a
/// newer schema version.
pub fn open_store_db(root: &Path, store_id: &str) -> Result<Connection, TandemError> {
    validate_store_id(store_id)?;
    fs::create_dir_all(root).map_err(TandemError::IoError)?;
    let conn = db_connect(&assertion_db_path(root, store_id))?;
    initialize_schema(&conn)?;
    Ok(conn)
}

pub fn initialize_schema(conn: &Connection) -> Result<(), TandemError> {
    conn.execute(&schema::create_table_sql(&schema::meta_table_spec()), [])?;
    conn.execute(
        &schema::create_table_sql(&schema::assertions_table_spec()),
        [],
    )?;
    for sql in schema::assertions_index_sql() {
        conn.execute(&sql, [])?;
    }
    ensure_schema_version(conn)
}

fn ensure_schema_version(conn: &Connection) -> Result<(), TandemError> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(raw) => {
            let version: u32 = raw.parse().map_err(|_| {
                TandemError::ValidationError(format!("unreadable schema_version '{}'", raw))
            })?;
            if version > schema::SCHEMA_VERSION {
                return Err(TandemError::ValidationError(format!(
                    "store schema version {} is newer than this build ({})",
                    version,
                    schema::SCHEMA_VERSION
                )));
            }
            Ok(())
        }
        None => {
            conn.execute(
                "INSERT INTO meta(key, value) VALUES('schema_version', ?1)",
                params![schema::SCHEMA_VERSION.to_string()],
            )?;
            Ok(())
        }
    }
}
