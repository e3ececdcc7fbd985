use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::StudentRecord;

/// Issued when a reload request goes out; handed back with its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReloadTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Applied,
    /// A reload issued later has already been applied.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftState {
    Saving,
    Unsaved,
}

/// A score the user typed that the service has not confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreDraft {
    pub value: u8,
    pub state: DraftState,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub total: usize,
    pub updated: usize,
    pub class_average: f64,
}

/// Canonical snapshot of student records plus the input drafts layered
/// over it. Only the event loop holds a mutable reference.
#[derive(Debug, Default)]
pub struct DataStore {
    records: Vec<StudentRecord>,
    index: HashMap<String, usize>,
    drafts: HashMap<(String, usize), ScoreDraft>,
    issued: u64,
    applied: Option<u64>,
    loaded_at: Option<DateTime<Utc>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole snapshot. A snapshot that repeats a name is
    /// refused and the previous snapshot stays in place.
    pub fn load(&mut self, snapshot: Vec<StudentRecord>) -> Result<(), StoreError> {
        let mut index = HashMap::with_capacity(snapshot.len());
        for (position, record) in snapshot.iter().enumerate() {
            if index.insert(record.name.clone(), position).is_some() {
                return Err(StoreError::DuplicateName(record.name.clone()));
            }
        }

        let mut records = snapshot;
        for record in &mut records {
            record.recompute_average();
        }
        self.records = records;
        self.index = index;
        self.drafts.clear();
        self.loaded_at = Some(Utc::now());
        info!(records = self.records.len(), "snapshot loaded");
        Ok(())
    }

    pub fn begin_reload(&mut self) -> ReloadTicket {
        self.issued += 1;
        ReloadTicket(self.issued)
    }

    pub fn complete_reload(
        &mut self,
        ticket: ReloadTicket,
        snapshot: Vec<StudentRecord>,
    ) -> Result<ReloadOutcome, StoreError> {
        if self.applied.is_some_and(|applied| ticket.0 < applied) {
            debug!(ticket = ticket.0, "discarding stale reload");
            return Ok(ReloadOutcome::Stale);
        }
        self.load(snapshot)?;
        self.applied = Some(ticket.0);
        Ok(ReloadOutcome::Applied)
    }

    pub fn get(&self, name: &str) -> Option<&StudentRecord> {
        self.index.get(name).map(|&i| &self.records[i])
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut StudentRecord> {
        let position = *self.index.get(name)?;
        self.records.get_mut(position)
    }

    pub fn records(&self) -> &[StudentRecord] {
        &self.records
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    pub fn draft(&self, name: &str, phase: usize) -> Option<ScoreDraft> {
        self.drafts.get(&(name.to_string(), phase)).copied()
    }

    pub(crate) fn set_draft(&mut self, name: &str, phase: usize, draft: ScoreDraft) {
        self.drafts.insert((name.to_string(), phase), draft);
    }

    pub(crate) fn clear_draft(&mut self, name: &str, phase: usize) {
        self.drafts.remove(&(name.to_string(), phase));
    }

    pub fn stats(&self) -> Stats {
        let total = self.records.len();
        let updated = self.records.iter().filter(|r| r.updated_since_view).count();
        let class_average = if total == 0 {
            0.0
        } else {
            self.records.iter().map(|r| r.avg_score).sum::<f64>() / total as f64
        };
        Stats {
            total,
            updated,
            class_average,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> StudentRecord {
        StudentRecord::new(name, format!("https://github.com/{name}/homework"))
    }

    #[test]
    fn reload_replaces_instead_of_merging() {
        let mut store = DataStore::new();
        store.load(vec![record("alice"), record("bob")]).unwrap();
        store.load(vec![record("bob"), record("carol")]).unwrap();

        assert!(store.get("alice").is_none());
        assert!(store.get("bob").is_some());
        let names: Vec<&str> = store.records().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["bob", "carol"]);
    }

    #[test]
    fn duplicate_names_leave_previous_snapshot() {
        let mut store = DataStore::new();
        store.load(vec![record("alice")]).unwrap();
        let err = store.load(vec![record("bob"), record("bob")]).unwrap_err();
        assert_eq!(err, StoreError::DuplicateName("bob".into()));
        assert!(store.get("alice").is_some());
        assert!(store.get("bob").is_none());
    }

    #[test]
    fn load_recomputes_average_from_scores() {
        let mut row = record("alice");
        row.scores = [100, 100, 50, 50, 0];
        row.avg_score = 12.0;
        let mut store = DataStore::new();
        store.load(vec![row]).unwrap();
        assert_eq!(store.get("alice").unwrap().avg_score, 60.0);
    }

    #[test]
    fn older_reload_finishing_last_is_discarded() {
        let mut store = DataStore::new();
        let first = store.begin_reload();
        let second = store.begin_reload();

        let outcome = store.complete_reload(second, vec![record("new")]).unwrap();
        assert_eq!(outcome, ReloadOutcome::Applied);
        let outcome = store.complete_reload(first, vec![record("old")]).unwrap();
        assert_eq!(outcome, ReloadOutcome::Stale);
        assert!(store.get("new").is_some());
        assert!(store.get("old").is_none());
    }

    #[test]
    fn reload_clears_unconfirmed_drafts() {
        let mut store = DataStore::new();
        store.load(vec![record("alice")]).unwrap();
        store.set_draft(
            "alice",
            1,
            ScoreDraft {
                value: 90,
                state: DraftState::Unsaved,
            },
        );
        assert!(store.draft("alice", 1).is_some());

        let ticket = store.begin_reload();
        store.complete_reload(ticket, vec![record("alice")]).unwrap();
        assert!(store.draft("alice", 1).is_none());
    }

    #[test]
    fn stats_count_updated_and_average() {
        let mut alice = record("alice").with_scores([80, 80, 80, 80, 80]);
        alice.updated_since_view = true;
        let bob = record("bob").with_scores([60, 60, 60, 60, 60]);
        let mut store = DataStore::new();
        store.load(vec![alice, bob]).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.class_average, 70.0);
    }
}
