//! SQLite-backed attendance store.
//!
//! Uses WAL mode and a `PRIMARY KEY (identity, day)` constraint; the
//! append-if-absent is an `INSERT ... ON CONFLICT DO NOTHING` plus a
//! read-back inside a single connection call. All calls go through
//! tokio-rusqlite's connection actor (one writer thread), which is what
//! makes check-then-write atomic per key.

use crate::{AttendanceRecord, AttendanceStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use tokio_rusqlite::Connection;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS attendance (
    identity   TEXT NOT NULL,
    day        TEXT NOT NULL,
    first_seen TEXT NOT NULL,
    PRIMARY KEY (identity, day)
);
";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the attendance database at `path`.
    /// Parent directories are created as well.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path.to_path_buf()).await?;
        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.execute_batch(SCHEMA_SQL)?;
            Ok(())
        })
        .await?;

        tracing::info!(path = %path.display(), "attendance database open");
        Ok(Self { conn })
    }
}

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let identity: String = row.get(0)?;
    let day: String = row.get(1)?;
    let first_seen: String = row.get(2)?;

    let day: NaiveDate = day.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let first_seen = DateTime::parse_from_rfc3339(&first_seen)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);

    Ok(AttendanceRecord {
        identity,
        day,
        first_seen,
    })
}

#[async_trait]
impl AttendanceStore for SqliteStore {
    async fn insert_if_absent(
        &self,
        record: &AttendanceRecord,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let record = record.clone();
        let existing = self
            .conn
            .call(move |conn| {
                let inserted = conn.execute(
                    "INSERT INTO attendance (identity, day, first_seen) VALUES (?1, ?2, ?3)
                     ON CONFLICT (identity, day) DO NOTHING",
                    params![
                        record.identity,
                        record.day.to_string(),
                        record.first_seen.to_rfc3339()
                    ],
                )?;
                if inserted > 0 {
                    return Ok(None);
                }
                let existing = conn
                    .query_row(
                        "SELECT identity, day, first_seen FROM attendance
                         WHERE identity = ?1 AND day = ?2",
                        params![record.identity, record.day.to_string()],
                        row_to_record,
                    )
                    .optional()?;
                Ok(existing)
            })
            .await?;
        Ok(existing)
    }

    async fn get(
        &self,
        identity: &str,
        day: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let identity = identity.to_string();
        let record = self
            .conn
            .call(move |conn| {
                let record = conn
                    .query_row(
                        "SELECT identity, day, first_seen FROM attendance
                         WHERE identity = ?1 AND day = ?2",
                        params![identity, day.to_string()],
                        row_to_record,
                    )
                    .optional()?;
                Ok(record)
            })
            .await?;
        Ok(record)
    }

    async fn list_day(&self, day: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        let records = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT identity, day, first_seen FROM attendance
                     WHERE day = ?1 ORDER BY first_seen ASC, identity ASC",
                )?;
                let records = stmt
                    .query_map(params![day.to_string()], row_to_record)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(records)
            })
            .await?;
        Ok(records)
    }
}
