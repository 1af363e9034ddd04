use std::collections::{BTreeMap, BTreeSet};
use std::collections::btree_map::Entry;
use std::fs::{self, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

pub const CANDIDATE_PREFIX: &str = "espen";
pub const CANDIDATE_EXTENSION: &str = ".mp4";
/// Ids must fit the signed integer column of the SQLite store.
pub const MAX_CANDIDATE_ID: u64 = i64::MAX as u64;

/// Returned by [`Catalog::insert`] when something already occupies the name
/// for `id`, whether or not it is a candidate.
#[derive(Debug, Error)]
#[error("the name for video {0} is already taken")]
pub struct SlotTaken(pub u64);

/// A numbered video eligible for the daily pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: u64,
    pub file_name: String,
    pub locator: PathBuf,
}

/// Source of candidate videos. Listing is never cached: every call reflects
/// the backing storage as it is right now.
pub trait Catalog: Send + Sync {
    /// Candidates in ascending id order, one per id.
    fn list(&self) -> Result<Vec<Candidate>>;

    /// Stores new content under `id`. Fails with [`SlotTaken`] before reading
    /// any content if that name is already in use.
    fn insert(&self, id: u64, content: &mut dyn Read) -> Result<Candidate>;

    fn remove(&self, candidate: &Candidate) -> Result<()>;

    /// Human readable location, used in messages.
    fn describe(&self) -> String;
}

/// Parses `espen<digits>.mp4`. Anything else, including ids above
/// [`MAX_CANDIDATE_ID`], is not a candidate.
pub fn parse_candidate_name(name: &str) -> Option<u64> {
    let digits = name
        .strip_prefix(CANDIDATE_PREFIX)?
        .strip_suffix(CANDIDATE_EXTENSION)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits
        .parse::<u64>()
        .ok()
        .filter(|id| *id <= MAX_CANDIDATE_ID)
}

pub fn candidate_file_name(id: u64) -> String {
    format!("{CANDIDATE_PREFIX}{id}{CANDIDATE_EXTENSION}")
}

/// Smallest id >= 1 not in `taken`.
pub fn first_available_id(taken: &BTreeSet<u64>) -> u64 {
    let mut next = 1;
    for id in taken.range(1..) {
        if *id != next {
            break;
        }
        next += 1;
    }
    next
}

/// Upload names are checked case-insensitively, unlike candidate names.
pub fn has_mp4_extension(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(CANDIDATE_EXTENSION)
}

/// Candidates backed by files in a single directory.
pub struct DirCatalog {
    dir: PathBuf,
}

impl DirCatalog {
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create video directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }
}

impl Catalog for DirCatalog {
    fn list(&self) -> Result<Vec<Candidate>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read video directory {}", self.dir.display()))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| {
                format!("failed to read entry in {}", self.dir.display())
            })?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if parse_candidate_name(&name).is_some() && entry.path().is_file() {
                names.push(name);
            }
        }
        names.sort();

        // `espen01.mp4` and `espen1.mp4` share an id; the canonical spelling wins,
        // otherwise the first name in sort order.
        let mut by_id = BTreeMap::new();
        for name in names {
            let Some(id) = parse_candidate_name(&name) else {
                continue;
            };
            let candidate = Candidate {
                id,
                locator: self.dir.join(&name),
                file_name: name,
            };
            match by_id.entry(id) {
                Entry::Vacant(slot) => {
                    slot.insert(candidate);
                }
                Entry::Occupied(mut slot) => {
                    if candidate.file_name == candidate_file_name(id) {
                        slot.insert(candidate);
                    }
                }
            }
        }

        Ok(by_id.into_values().collect())
    }

    fn insert(&self, id: u64, content: &mut dyn Read) -> Result<Candidate> {
        let file_name = candidate_file_name(id);
        let locator = self.dir.join(&file_name);
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&locator)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SlotTaken(id).into());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to create {}", locator.display()));
            }
        };
        io::copy(content, &mut file)
            .with_context(|| format!("failed to write {}", locator.display()))?;
        Ok(Candidate {
            id,
            file_name,
            locator,
        })
    }

    fn remove(&self, candidate: &Candidate) -> Result<()> {
        fs::remove_file(&candidate.locator)
            .with_context(|| format!("failed to delete {}", candidate.locator.display()))
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

#[cfg(test)]
pub use memory::MemoryCatalog;

#[cfg(test)]
mod memory {
    use std::collections::BTreeMap;
    use std::io::Read;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use anyhow::{Result, anyhow};

    use super::{Candidate, Catalog, SlotTaken, candidate_file_name};

    /// In-memory catalog for exercising the resolver without a filesystem.
    #[derive(Default)]
    pub struct MemoryCatalog {
        videos: Mutex<BTreeMap<u64, Vec<u8>>>,
    }

    impl MemoryCatalog {
        pub fn with_ids(ids: &[u64]) -> Self {
            let videos = ids.iter().map(|id| (*id, Vec::new())).collect();
            Self {
                videos: Mutex::new(videos),
            }
        }

        pub fn set_ids(&self, ids: &[u64]) {
            let mut videos = self.videos.lock().expect("catalog lock");
            *videos = ids.iter().map(|id| (*id, Vec::new())).collect();
        }

        fn candidate(id: u64) -> Candidate {
            let file_name = candidate_file_name(id);
            Candidate {
                id,
                locator: PathBuf::from(format!("memory://{file_name}")),
                file_name,
            }
        }
    }

    impl Catalog for MemoryCatalog {
        fn list(&self) -> Result<Vec<Candidate>> {
            let videos = self
                .videos
                .lock()
                .map_err(|_| anyhow!("catalog lock poisoned"))?;
            Ok(videos.keys().map(|id| Self::candidate(*id)).collect())
        }

        fn insert(&self, id: u64, content: &mut dyn Read) -> Result<Candidate> {
            let mut videos = self
                .videos
                .lock()
                .map_err(|_| anyhow!("catalog lock poisoned"))?;
            if videos.contains_key(&id) {
                return Err(SlotTaken(id).into());
            }
            let mut bytes = Vec::new();
            content.read_to_end(&mut bytes)?;
            videos.insert(id, bytes);
            Ok(Self::candidate(id))
        }

        fn remove(&self, candidate: &Candidate) -> Result<()> {
            let mut videos = self
                .videos
                .lock()
                .map_err(|_| anyhow!("catalog lock poisoned"))?;
            videos.remove(&candidate.id);
            Ok(())
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }
}
