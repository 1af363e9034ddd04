use std::collections::BTreeSet;
use std::io::Read;
use std::ops::Bound::{Excluded, Unbounded};

use anyhow::{Result, bail};
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::{Candidate, Catalog, SlotTaken, first_available_id, parse_candidate_name};
use crate::store::{Selection, SelectionStore};

/// Conditions callers branch on. Everything else is an unexpected failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no candidate videos available")]
    NoCandidates,
    #[error("video {0} is not a current candidate")]
    UnknownCandidate(u64),
    #[error("'{0}' is not a candidate video")]
    UnknownFile(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Today's selection is still valid.
    Keep(u64),
    /// Move the cursor and persist.
    Advance(u64),
}

impl Decision {
    pub fn id(self) -> u64 {
        match self {
            Self::Keep(id) | Self::Advance(id) => id,
        }
    }
}

/// Round-robin cursor over `ids`, moved at most once per `today`.
///
/// A previous selection for today that is still a candidate is kept. Otherwise
/// the next id strictly greater than the previous one is chosen, wrapping to
/// the smallest id. A previous id that is no longer a candidate restarts the
/// cursor before the smallest id, so ids added below the cursor wait for the
/// wrap.
pub fn decide(
    ids: &BTreeSet<u64>,
    previous: Option<Selection>,
    today: NaiveDate,
) -> Result<Decision, SelectionError> {
    let first = *ids.first().ok_or(SelectionError::NoCandidates)?;

    let live = previous.filter(|selection| ids.contains(&selection.id));
    if let Some(selection) = live.filter(|selection| selection.day == today) {
        return Ok(Decision::Keep(selection.id));
    }

    let next = match live {
        Some(last) => ids.range((Excluded(last.id), Unbounded)).next().copied(),
        None => Some(first),
    };
    Ok(Decision::Advance(next.unwrap_or(first)))
}

const MAX_INSERT_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pick {
    pub day: NaiveDate,
    pub candidate: Candidate,
    pub advanced: bool,
}

/// Binds the rotation to a catalog and a store.
pub struct DailyResolver {
    catalog: Box<dyn Catalog>,
    store: Box<dyn SelectionStore>,
}

impl DailyResolver {
    pub fn new(catalog: Box<dyn Catalog>, store: Box<dyn SelectionStore>) -> Self {
        Self { catalog, store }
    }

    /// Today's pick, advancing and persisting the cursor when the stored
    /// selection is missing, stale or from another day.
    pub fn resolve(&self, today: NaiveDate) -> Result<Pick> {
        let candidates = self.catalog.list()?;
        let ids: BTreeSet<u64> = candidates.iter().map(|c| c.id).collect();
        let previous = self.store.read()?;

        let decision = decide(&ids, previous, today)?;
        if let Decision::Advance(id) = decision {
            self.store.write(Selection::new(today, id))?;
            info!(
                %today,
                id,
                previous = ?previous.map(|s| s.id),
                "advanced daily video"
            );
        }

        let candidate = find(candidates, decision.id())?;
        Ok(Pick {
            day: today,
            candidate,
            advanced: matches!(decision, Decision::Advance(_)),
        })
    }

    /// Today's pick if one is already settled. Never writes.
    pub fn peek(&self, today: NaiveDate) -> Result<Option<Pick>> {
        let Some(selection) = self.store.read()? else {
            return Ok(None);
        };
        if selection.day != today {
            return Ok(None);
        }
        Ok(self
            .catalog
            .list()?
            .into_iter()
            .find(|c| c.id == selection.id)
            .map(|candidate| Pick {
                day: today,
                candidate,
                advanced: false,
            }))
    }

    /// Overrides today's pick without moving through the rotation.
    pub fn pin(&self, today: NaiveDate, id: u64) -> Result<Pick> {
        let candidate = find(self.catalog.list()?, id)?;
        self.store.write(Selection::new(today, id))?;
        info!(%today, id, "pinned daily video");
        Ok(Pick {
            day: today,
            candidate,
            advanced: false,
        })
    }

    pub fn selection(&self) -> Result<Option<Selection>> {
        self.store.read()
    }

    pub fn candidates(&self) -> Result<Vec<Candidate>> {
        self.catalog.list()
    }

    /// Stores new content under the lowest free number. Names held by
    /// something other than a candidate are skipped.
    pub fn add(&self, content: &mut dyn Read) -> Result<Candidate> {
        let mut taken: BTreeSet<u64> = self.catalog.list()?.iter().map(|c| c.id).collect();
        for _ in 0..MAX_INSERT_ATTEMPTS {
            let id = first_available_id(&taken);
            match self.catalog.insert(id, content) {
                Ok(candidate) => {
                    info!(id, file = %candidate.file_name, "added video");
                    return Ok(candidate);
                }
                Err(err) if err.downcast_ref::<SlotTaken>().is_some() => {
                    warn!(id, "video name already in use, trying the next number");
                    taken.insert(id);
                }
                Err(err) => return Err(err),
            }
        }
        bail!("no free video name after {MAX_INSERT_ATTEMPTS} attempts")
    }

    /// Looks a candidate up by its exact file name.
    pub fn locate(&self, file_name: &str) -> Result<Candidate> {
        if parse_candidate_name(file_name).is_none() {
            return Err(SelectionError::UnknownFile(file_name.to_string()).into());
        }
        self.catalog
            .list()?
            .into_iter()
            .find(|c| c.file_name == file_name)
            .ok_or_else(|| SelectionError::UnknownFile(file_name.to_string()).into())
    }

    pub fn remove(&self, file_name: &str) -> Result<Candidate> {
        let candidate = self.locate(file_name)?;
        self.catalog.remove(&candidate)?;
        info!(id = candidate.id, file = %candidate.file_name, "removed video");
        Ok(candidate)
    }

    pub fn describe(&self) -> (String, String) {
        (self.catalog.describe(), self.store.describe())
    }
}

fn find(candidates: Vec<Candidate>, id: u64) -> Result<Candidate> {
    candidates
        .into_iter()
        .find(|c| c.id == id)
        .ok_or_else(|| SelectionError::UnknownCandidate(id).into())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::store::MemoryStore;

    fn day(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid day")
    }

    fn ids(values: &[u64]) -> BTreeSet<u64> {
        values.iter().copied().collect()
    }

    // Shares the catalog and store with the test so both can be inspected.
    struct Shared<T>(Arc<T>);

    impl Catalog for Shared<MemoryCatalog> {
        fn list(&self) -> Result<Vec<Candidate>> {
            self.0.list()
        }
        fn insert(&self, id: u64, content: &mut dyn Read) -> Result<Candidate> {
            self.0.insert(id, content)
        }
        fn remove(&self, candidate: &Candidate) -> Result<()> {
            self.0.remove(candidate)
        }
        fn describe(&self) -> String {
            self.0.describe()
        }
    }

    impl SelectionStore for Shared<MemoryStore> {
        fn read(&self) -> Result<Option<Selection>> {
            self.0.read()
        }
        fn write(&self, selection: Selection) -> Result<()> {
            self.0.write(selection)
        }
        fn describe(&self) -> String {
            self.0.describe()
        }
    }

    fn resolver(
        catalog_ids: &[u64],
        state: Option<Selection>,
    ) -> (DailyResolver, Arc<MemoryCatalog>, Arc<MemoryStore>) {
        let catalog = Arc::new(MemoryCatalog::with_ids(catalog_ids));
        let store = Arc::new(match state {
            Some(selection) => MemoryStore::with_selection(selection),
            None => MemoryStore::default(),
        });
        let resolver = DailyResolver::new(
            Box::new(Shared(Arc::clone(&catalog))),
            Box::new(Shared(Arc::clone(&store))),
        );
        (resolver, catalog, store)
    }

    #[test]
    fn decide_fails_without_candidates() {
        assert_eq!(
            decide(&ids(&[]), None, day("2024-01-01")),
            Err(SelectionError::NoCandidates)
        );
        let previous = Selection::new(day("2024-01-01"), 1);
        assert_eq!(
            decide(&ids(&[]), Some(previous), day("2024-01-01")),
            Err(SelectionError::NoCandidates)
        );
    }

    #[test]
    fn decide_starts_at_the_smallest_id() {
        assert_eq!(
            decide(&ids(&[3, 1, 2]), None, day("2024-01-01")),
            Ok(Decision::Advance(1))
        );
    }

    #[test]
    fn decide_keeps_a_live_selection_for_today() {
        let previous = Selection::new(day("2024-01-01"), 2);
        assert_eq!(
            decide(&ids(&[1, 2, 3]), Some(previous), day("2024-01-01")),
            Ok(Decision::Keep(2))
        );
    }

    #[test]
    fn decide_advances_to_the_next_greater_id() {
        let previous = Selection::new(day("2024-01-01"), 4);
        assert_eq!(
            decide(&ids(&[4, 9, 12]), Some(previous), day("2024-01-02")),
            Ok(Decision::Advance(9))
        );
    }

    #[test]
    fn decide_wraps_after_the_largest_id() {
        let previous = Selection::new(day("2024-01-01"), 3);
        assert_eq!(
            decide(&ids(&[1, 2, 3]), Some(previous), day("2024-01-02")),
            Ok(Decision::Advance(1))
        );
    }

    #[test]
    fn decide_restarts_when_the_previous_video_vanished() {
        let previous = Selection::new(day("2024-01-01"), 7);
        assert_eq!(
            decide(&ids(&[2, 5]), Some(previous), day("2024-01-02")),
            Ok(Decision::Advance(2))
        );

        // Same day, but the pick was deleted: recompute instead of keeping it.
        let previous = Selection::new(day("2024-01-02"), 7);
        assert_eq!(
            decide(&ids(&[2, 5]), Some(previous), day("2024-01-02")),
            Ok(Decision::Advance(2))
        );
    }

    #[test]
    fn decide_skips_new_lower_ids_until_the_wrap() {
        let previous = Selection::new(day("2024-01-01"), 5);
        assert_eq!(
            decide(&ids(&[1, 5, 6]), Some(previous), day("2024-01-02")),
            Ok(Decision::Advance(6))
        );
    }

    #[test]
    fn decide_handles_id_zero() {
        assert_eq!(
            decide(&ids(&[0, 1]), None, day("2024-01-01")),
            Ok(Decision::Advance(0))
        );
        let previous = Selection::new(day("2024-01-01"), 1);
        assert_eq!(
            decide(&ids(&[0, 1]), Some(previous), day("2024-01-02")),
            Ok(Decision::Advance(0))
        );
    }

    #[test]
    fn decide_always_returns_a_candidate() {
        let sets: [&[u64]; 4] = [&[1], &[1, 2, 3], &[2, 5], &[0, 10, 11, 400]];
        let days = [day("2024-01-01"), day("2024-01-02")];
        for set in sets {
            let candidates = ids(set);
            for previous_id in 0..=12 {
                for previous_day in days {
                    let previous = Selection::new(previous_day, previous_id);
                    for today in days {
                        let decision =
                            decide(&candidates, Some(previous), today).expect("non-empty set");
                        assert!(candidates.contains(&decision.id()));
                    }
                }
            }
        }
    }

    #[test]
    fn first_resolution_persists_the_smallest_id() {
        let (resolver, _, store) = resolver(&[1, 2, 3], None);
        let pick = resolver.resolve(day("2024-01-01")).expect("resolve");
        assert_eq!(pick.candidate.id, 1);
        assert_eq!(pick.candidate.file_name, "espen1.mp4");
        assert!(pick.advanced);
        assert_eq!(
            store.read().expect("read"),
            Some(Selection::new(day("2024-01-01"), 1))
        );
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn same_day_resolution_writes_once() {
        let (resolver, _, store) = resolver(&[1, 2, 3], None);
        let first = resolver.resolve(day("2024-01-01")).expect("resolve");
        let second = resolver.resolve(day("2024-01-01")).expect("resolve again");
        assert_eq!(first.candidate, second.candidate);
        assert!(!second.advanced);
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn existing_selection_for_today_is_not_rewritten() {
        let state = Selection::new(day("2024-01-01"), 1);
        let (resolver, _, store) = resolver(&[1, 2, 3], Some(state));
        let pick = resolver.resolve(day("2024-01-01")).expect("resolve");
        assert_eq!(pick.candidate.id, 1);
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn next_day_wraps_and_persists() {
        let state = Selection::new(day("2024-01-01"), 3);
        let (resolver, _, store) = resolver(&[1, 2, 3], Some(state));
        let pick = resolver.resolve(day("2024-01-02")).expect("resolve");
        assert_eq!(pick.candidate.id, 1);
        assert_eq!(
            store.read().expect("read"),
            Some(Selection::new(day("2024-01-02"), 1))
        );
    }

    #[test]
    fn rotation_follows_catalog_changes_between_days() {
        let (resolver, catalog, _) = resolver(&[1, 2, 3], None);
        let picks: Vec<u64> = ["2024-01-01", "2024-01-02"]
            .into_iter()
            .map(|d| resolver.resolve(day(d)).expect("resolve").candidate.id)
            .collect();
        assert_eq!(picks, vec![1, 2]);

        catalog.set_ids(&[1, 3, 8]);
        assert_eq!(
            resolver.resolve(day("2024-01-03")).expect("resolve").candidate.id,
            1
        );
        assert_eq!(
            resolver.resolve(day("2024-01-04")).expect("resolve").candidate.id,
            3
        );
    }

    #[test]
    fn empty_catalog_is_reported_and_nothing_is_written() {
        let (resolver, _, store) = resolver(&[], None);
        let err = resolver.resolve(day("2024-01-01")).expect_err("no videos");
        assert_eq!(
            err.downcast_ref::<SelectionError>(),
            Some(&SelectionError::NoCandidates)
        );
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn peek_never_advances() {
        let (resolver, _, store) = resolver(&[1, 2], None);
        assert_eq!(resolver.peek(day("2024-01-01")).expect("peek"), None);
        assert_eq!(store.writes(), 0);

        resolver.resolve(day("2024-01-01")).expect("resolve");
        let peeked = resolver.peek(day("2024-01-01")).expect("peek");
        assert_eq!(peeked.map(|p| p.candidate.id), Some(1));
        assert_eq!(resolver.peek(day("2024-01-02")).expect("peek"), None);
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn pin_overrides_today_and_rotation_continues_from_it() {
        let (resolver, _, _) = resolver(&[1, 2, 3], None);
        resolver.resolve(day("2024-01-01")).expect("resolve");

        let pinned = resolver.pin(day("2024-01-01"), 3).expect("pin");
        assert_eq!(pinned.candidate.id, 3);
        assert!(!pinned.advanced);
        assert_eq!(
            resolver.resolve(day("2024-01-01")).expect("resolve").candidate.id,
            3
        );
        assert_eq!(
            resolver.resolve(day("2024-01-02")).expect("resolve").candidate.id,
            1
        );
    }

    #[test]
    fn pin_rejects_unknown_ids() {
        let (resolver, _, store) = resolver(&[1, 2], None);
        let err = resolver.pin(day("2024-01-01"), 9).expect_err("unknown id");
        assert_eq!(
            err.downcast_ref::<SelectionError>(),
            Some(&SelectionError::UnknownCandidate(9))
        );
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn add_uses_the_first_free_number() {
        let (resolver, catalog, _) = resolver(&[1, 2, 4], None);
        let added = resolver.add(&mut &b"clip"[..]).expect("add");
        assert_eq!(added.file_name, "espen3.mp4");
        let ids: Vec<u64> = catalog.list().expect("list").iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn add_skips_names_held_by_non_candidates() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        std::fs::write(tmp.path().join("espen1.mp4"), b"one").expect("video fixture");
        std::fs::create_dir(tmp.path().join("espen2.mp4")).expect("dir fixture");
        std::fs::create_dir(tmp.path().join("espen3.mp4")).expect("dir fixture");
        let catalog = crate::catalog::DirCatalog::open(tmp.path()).expect("open catalog");
        let resolver = DailyResolver::new(Box::new(catalog), Box::new(MemoryStore::default()));

        let added = resolver.add(&mut &b"clip"[..]).expect("add");
        assert_eq!(added.file_name, "espen4.mp4");
        assert_eq!(
            std::fs::read(tmp.path().join("espen4.mp4")).expect("read"),
            b"clip"
        );
    }

    #[test]
    fn locate_and_remove_validate_names() {
        let (resolver, catalog, _) = resolver(&[1, 2], None);
        for name in ["../etc/passwd", "espen3.mp4", "espen1.mov"] {
            let err = resolver.locate(name).expect_err("not a candidate");
            assert_eq!(
                err.downcast_ref::<SelectionError>(),
                Some(&SelectionError::UnknownFile(name.to_string()))
            );
        }

        let removed = resolver.remove("espen2.mp4").expect("remove");
        assert_eq!(removed.id, 2);
        assert_eq!(catalog.list().expect("list").len(), 1);
    }
}
