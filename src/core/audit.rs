//! Append-only fact log.
//!
//! Every newly-asserted fact is serialized and appended to a compressed
//! log file keyed by store id. The log is an independent durability channel
//! that survives a corrupted database; the engine writes it and never reads
//! it back.

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use ulid::Ulid;

use crate::core::error::TandemError;
use crate::core::model::Assertion;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FactRecord {
    pub record_id: String,
    pub store_id: String,
    /// Server-assigned save time, distinct from the opinion's observed_at.
    pub saved_at: DateTime<Utc>,
    pub assertion: Assertion,
}

pub struct FactLog {
    store_id: String,
    path: PathBuf,
}

impl FactLog {
    pub fn new(store_id: impl Into<String>, path: PathBuf) -> Self {
        Self {
            store_id: store_id.into(),
            path,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Appends one record as a complete gzip member. Concatenated members
    /// decompress as a single line-delimited stream.
    pub fn append(&self, assertion: &Assertion, saved_at: DateTime<Utc>) -> Result<(), TandemError> {
        let record = FactRecord {
            record_id: Ulid::new().to_string(),
            store_id: self.store_id.clone(),
            saved_at,
            assertion: assertion.clone(),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(TandemError::IoError)?;
        let mut encoder = GzEncoder::new(file, Compression::default());
        let line = serde_json::to_string(&record).map_err(|e| {
            TandemError::ValidationError(format!("fact record serialization failed: {}", e))
        })?;
        writeln!(encoder, "{}", line).map_err(TandemError::IoError)?;
        encoder.finish().map_err(TandemError::IoError)?;
        Ok(())
    }
}
