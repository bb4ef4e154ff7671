//! SQLite outcome store.
//!
//! One row per period. `period_id` is the primary key, which makes the
//! store the authority on duplicates. rusqlite is synchronous, so every
//! call runs on the blocking pool behind a shared connection.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Error, Face, Outcome, Result};
use rusqlite::{params, Connection, OptionalExtension};
use streak_engine::OutcomeStore;
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS outcomes (
    period_id     TEXT PRIMARY KEY,
    source_id     TEXT NOT NULL,
    source_name   TEXT NOT NULL,
    face          INTEGER NOT NULL,
    observed_at   INTEGER NOT NULL,
    sequence_hint INTEGER
);
CREATE INDEX IF NOT EXISTS idx_outcomes_source_recent
    ON outcomes(source_id, observed_at DESC, sequence_hint DESC);
";

fn storage_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

/// A row as stored, before the face is validated.
struct StoredRow {
    period_id: String,
    source_id: String,
    source_name: String,
    face: i64,
    observed_at_ms: i64,
    sequence_hint: Option<i64>,
}

impl StoredRow {
    fn into_outcome(self) -> Result<Outcome> {
        let face = u8::try_from(self.face)
            .ok()
            .and_then(Face::new)
            .ok_or_else(|| {
                Error::Storage(format!(
                    "period {} has invalid face {}",
                    self.period_id, self.face
                ))
            })?;
        let observed_at = DateTime::<Utc>::from_timestamp_millis(self.observed_at_ms)
            .ok_or_else(|| {
                Error::Storage(format!(
                    "period {} has invalid timestamp {}",
                    self.period_id, self.observed_at_ms
                ))
            })?;
        Ok(Outcome {
            period_id: self.period_id,
            face,
            source_id: self.source_id,
            source_name: self.source_name,
            observed_at,
            sequence_hint: self.sequence_hint,
        })
    }
}

pub struct SqliteOutcomeStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteOutcomeStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(storage_err)?;
        let mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(storage_err)?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")
            .map_err(storage_err)?;
        Self::init(&conn)?;

        info!("outcome store opened at {} (journal={})", path.display(), mode);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Private in-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA).map_err(storage_err)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&guard)
        })
        .await
        .map_err(|e| Error::Storage(format!("storage task failed: {}", e)))?
    }

    /// Total stored outcomes.
    pub async fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM outcomes", [], |row| row.get::<_, i64>(0))
                .map(|n| n.max(0) as u64)
                .map_err(storage_err)
        })
        .await
    }

    /// Look up one period.
    pub async fn get(&self, period_id: &str) -> Result<Option<Outcome>> {
        let period_id = period_id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT period_id, source_id, source_name, face, observed_at, sequence_hint
                     FROM outcomes WHERE period_id = ?1",
                    params![period_id],
                    read_row,
                )
                .optional()
                .map_err(storage_err)?;
            row.map(StoredRow::into_outcome).transpose()
        })
        .await
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        period_id: row.get(0)?,
        source_id: row.get(1)?,
        source_name: row.get(2)?,
        face: row.get(3)?,
        observed_at_ms: row.get(4)?,
        sequence_hint: row.get(5)?,
    })
}

#[async_trait]
impl OutcomeStore for SqliteOutcomeStore {
    async fn insert_if_absent(&self, outcome: &Outcome) -> Result<bool> {
        let outcome = outcome.clone();
        self.with_conn(move |conn| {
            let changed = conn
                .execute(
                    "INSERT OR IGNORE INTO outcomes
                     (period_id, source_id, source_name, face, observed_at, sequence_hint)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        outcome.period_id,
                        outcome.source_id,
                        outcome.source_name,
                        outcome.face.value(),
                        outcome.observed_at.timestamp_millis(),
                        outcome.sequence_hint,
                    ],
                )
                .map_err(storage_err)?;
            if changed == 0 {
                debug!("period {} already stored", outcome.period_id);
            }
            Ok(changed > 0)
        })
        .await
    }

    async fn load_recent(&self, source_id: &str, limit: usize) -> Result<Vec<Outcome>> {
        let source_id = source_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT period_id, source_id, source_name, face, observed_at, sequence_hint
                     FROM outcomes
                     WHERE source_id = ?1
                     ORDER BY observed_at DESC, sequence_hint DESC
                     LIMIT ?2",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![source_id, limit], read_row)
                .map_err(storage_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage_err)?;
            rows.into_iter().map(StoredRow::into_outcome).collect()
        })
        .await
    }
}
