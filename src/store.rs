use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use tracing::debug;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// The single persisted record of which video was picked on which day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub day: NaiveDate,
    pub id: u64,
}

impl Selection {
    pub fn new(day: NaiveDate, id: u64) -> Self {
        Self { day, id }
    }
}

/// Persistence for the one global [`Selection`]. Unreadable content is
/// reported as `Ok(None)`; only storage failures are errors.
pub trait SelectionStore: Send + Sync {
    fn read(&self) -> Result<Option<Selection>>;
    fn write(&self, selection: Selection) -> Result<()>;
    fn describe(&self) -> String;
}

/// Parses a zero-padded `YYYY-MM-DD` day. Shorter spellings such as
/// `2024-1-2` are rejected so stored days compare exactly.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let day = NaiveDate::parse_from_str(raw, DAY_FORMAT).ok()?;
    (day.format(DAY_FORMAT).to_string() == raw).then_some(day)
}

/// Parses `<YYYY-MM-DD>|<id>`.
pub fn parse_selection(raw: &str) -> Option<Selection> {
    let mut fields = raw.trim().split('|');
    let day = fields.next()?.trim();
    let id = fields.next()?.trim();
    if fields.next().is_some() {
        return None;
    }
    let day = parse_day(day)?;
    let id = id.parse::<u64>().ok()?;
    Some(Selection { day, id })
}

pub fn format_selection(selection: &Selection) -> String {
    format!("{}|{}", selection.day.format(DAY_FORMAT), selection.id)
}

/// Text file holding `<day>|<id>`.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl SelectionStore for FileStore {
    fn read(&self) -> Result<Option<Selection>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read selection state {}", self.path.display())
                });
            }
        };

        let selection = String::from_utf8(raw)
            .ok()
            .and_then(|raw| parse_selection(&raw));
        if selection.is_none() {
            debug!(
                path = %self.path.display(),
                "ignoring malformed selection state"
            );
        }
        Ok(selection)
    }

    fn write(&self, selection: Selection) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create state directory {}", parent.display())
            })?;
        }
        fs::write(&self.path, format_selection(&selection)).with_context(|| {
            format!("failed to write selection state {}", self.path.display())
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    selection: Mutex<Option<Selection>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    #[cfg(test)]
    pub fn with_selection(selection: Selection) -> Self {
        Self {
            selection: Mutex::new(Some(selection)),
            writes: AtomicUsize::new(0),
        }
    }

    #[cfg(test)]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl SelectionStore for MemoryStore {
    fn read(&self) -> Result<Option<Selection>> {
        let selection = self
            .selection
            .lock()
            .map_err(|_| anyhow!("selection lock poisoned"))?;
        Ok(*selection)
    }

    fn write(&self, selection: Selection) -> Result<()> {
        let mut current = self
            .selection
            .lock()
            .map_err(|_| anyhow!("selection lock poisoned"))?;
        *current = Some(selection);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
