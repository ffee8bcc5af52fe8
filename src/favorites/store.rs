// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! SQLite favorites table.
//!
//! All statements are synchronous; callers on the async runtime go through
//! `spawn_blocking`. The connection is serialised behind a mutex. Busy and
//! locked errors are retried with a short backoff before giving up.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::{normalize_icao, FavoriteRecord, NewFavorite};
use crate::config::APP_NAME;
use crate::metadata::Enrichment;

/// Retries after the first attempt when SQLite reports busy/locked.
const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(50);
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

const DB_FILE: &str = "favorites.db";

const SELECT_COLUMNS: &str =
    "SELECT id, icao24, name, origin_country, photo, metadata, added_at FROM favorites";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode column: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no data directory available")]
    NoDataDir,

    #[error("storage task failed: {0}")]
    Task(String),

    #[error("'{0}' is not a 6-digit hex ICAO address")]
    InvalidIcao(String),
}

/// Favorites database.
pub struct FavoritesStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for FavoritesStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FavoritesStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FavoritesStore {
    /// Default database location in the platform data directory.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_NAME).join(DB_FILE))
            .ok_or(StoreError::NoDataDir)
    }

    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::init_schema(&conn)?;
        debug!("Opened favorites database at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS favorites (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                icao24 TEXT NOT NULL,
                name TEXT,
                origin_country TEXT,
                photo TEXT,              -- JSON
                metadata TEXT,           -- JSON
                added_at TEXT NOT NULL   -- RFC 3339
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_favorites_icao24 ON favorites(icao24);
            ",
        )
    }

    /// Insert unless a favorite with the same `icao24` exists.
    ///
    /// Returns the new record id, or `None` when the aircraft was already a favorite.
    pub fn insert(&self, favorite: &NewFavorite) -> Result<Option<i64>, StoreError> {
        let icao24 = normalize_icao(&favorite.icao24);
        let added_at = Utc::now().to_rfc3339();

        self.with_retry("insert", |conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO favorites (icao24, name, origin_country, added_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![icao24, favorite.name, favorite.origin_country, added_at],
            )?;
            Ok((changed > 0).then(|| conn.last_insert_rowid()))
        })
    }

    /// Store enrichment results. Returns `false` if the record no longer exists.
    pub fn set_enrichment(&self, id: i64, enrichment: &Enrichment) -> Result<bool, StoreError> {
        let photo = enrichment
            .photo
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let metadata = enrichment
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.with_retry("set_enrichment", |conn| {
            let changed = conn.execute(
                "UPDATE favorites SET photo = ?1, metadata = ?2 WHERE id = ?3",
                params![photo, metadata, id],
            )?;
            Ok(changed > 0)
        })
    }

    /// All favorites in insertion order.
    pub fn list(&self) -> Result<Vec<FavoriteRecord>, StoreError> {
        self.with_retry("list", |conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id"))?;
            let records = stmt
                .query_map([], record_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<FavoriteRecord>, StoreError> {
        self.with_retry("get", |conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                record_from_row,
            )
            .optional()
        })
    }

    pub fn get_by_icao(&self, icao24: &str) -> Result<Option<FavoriteRecord>, StoreError> {
        let icao24 = normalize_icao(icao24);
        self.with_retry("get_by_icao", |conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE icao24 = ?1"),
                params![icao24],
                record_from_row,
            )
            .optional()
        })
    }

    /// Delete by record id. Returns `false` if nothing matched.
    pub fn delete(&self, id: i64) -> Result<bool, StoreError> {
        self.with_retry("delete", |conn| {
            Ok(conn.execute("DELETE FROM favorites WHERE id = ?1", params![id])? > 0)
        })
    }

    /// Delete every favorite, returning how many were removed.
    pub fn clear(&self) -> Result<usize, StoreError> {
        self.with_retry("clear", |conn| conn.execute("DELETE FROM favorites", []))
    }

    fn with_retry<T>(
        &self,
        operation: &str,
        mut f: impl FnMut(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut attempt = 0;

        loop {
            match f(&conn) {
                Ok(value) => return Ok(value),
                Err(e) if is_contention(&e) && attempt < MAX_RETRIES => {
                    attempt += 1;
                    warn!(
                        "Favorites {} hit a busy database (attempt {}/{}): {}",
                        operation, attempt, MAX_RETRIES, e
                    );
                    thread::sleep(RETRY_BACKOFF * attempt);
                }
                Err(e) => {
                    error!("Favorites {} failed: {}", operation, e);
                    return Err(e.into());
                }
            }
        }
    }
}

fn is_contention(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FavoriteRecord> {
    let id: i64 = row.get(0)?;
    let added_at: String = row.get(6)?;

    Ok(FavoriteRecord {
        id,
        icao24: row.get(1)?,
        name: row.get(2)?,
        origin_country: row.get(3)?,
        photo: json_column(id, "photo", row.get(4)?),
        metadata: json_column(id, "metadata", row.get(5)?),
        added_at: DateTime::parse_from_rfc3339(&added_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default(),
    })
}

/// Decode a JSON column. A corrupt value is logged and treated as empty.
fn json_column<T: DeserializeOwned>(id: i64, column: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring unreadable {} for favorite {}: {}", column, id, e);
            None
        }
    }
}
