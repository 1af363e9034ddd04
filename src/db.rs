use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::store::{Selection, SelectionStore, parse_day};

/// Selection state kept in a single-row SQLite table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        store.migrate()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.connection()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS daily_pick (
                slot INTEGER PRIMARY KEY CHECK (slot = 1),
                day TEXT NOT NULL,
                video_id INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn connection(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }
}

impl SelectionStore for SqliteStore {
    fn read(&self) -> Result<Option<Selection>> {
        let conn = self.connection()?;
        let row = conn
            .query_row(
                "SELECT day, video_id FROM daily_pick WHERE slot = 1",
                [],
                |row| Ok((row.get::<_, Value>(0)?, row.get::<_, Value>(1)?)),
            )
            .optional()
            .context("failed to read selection state")?;

        let Some((day, id)) = row else {
            return Ok(None);
        };
        let selection = match (day, id) {
            (Value::Text(day), Value::Integer(id)) => parse_day(&day)
                .zip(u64::try_from(id).ok())
                .map(|(day, id)| Selection { day, id }),
            _ => None,
        };
        if selection.is_none() {
            debug!("ignoring malformed selection row");
        }
        Ok(selection)
    }

    fn write(&self, selection: Selection) -> Result<()> {
        let id = i64::try_from(selection.id)
            .with_context(|| format!("video id {} does not fit in SQLite", selection.id))?;
        self.connection()?
            .execute(
                r#"
                INSERT INTO daily_pick (slot, day, video_id)
                VALUES (1, ?1, ?2)
                ON CONFLICT(slot) DO UPDATE SET
                    day = excluded.day,
                    video_id = excluded.video_id
                "#,
                params![selection.day.format("%Y-%m-%d").to_string(), id],
            )
            .context("failed to write selection state")?;
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("sqlite:{}", path.display()),
            None => "sqlite::memory:".to_string(),
        }
    }
}
