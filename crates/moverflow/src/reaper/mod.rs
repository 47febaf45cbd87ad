//! Recovery of jobs abandoned in IN_PROGRESS.
//!
//! A dispatcher that crashes mid-generation leaves its records
//! IN_PROGRESS forever, which would block every later start. The reaper
//! fails such records once they are older than the stale timeout.

pub mod scheduler;

pub use scheduler::ReaperScheduler;

use std::time::Duration;

use chrono::Utc;

use crate::db::DatabaseError;
use crate::jobs::JobRecordStore;

/// Error message written to reaped records.
pub const STALE_MESSAGE: &str = "stale: exceeded timeout";

/// Fails IN_PROGRESS records whose generation has outlived its timeout.
#[derive(Clone)]
pub struct Reaper {
    store: JobRecordStore,
}

impl Reaper {
    pub fn new(store: JobRecordStore) -> Self {
        Self { store }
    }

    /// Fails every IN_PROGRESS record that started more than `timeout` ago
    /// and returns how many were failed.
    ///
    /// Each record is failed with its own conditional write, so a record
    /// that completes or restarts between the scan and the write is left
    /// alone and not counted. A failed scan is returned as an error; a
    /// failed per-record write is logged and skipped.
    pub fn reap(&self, timeout: Duration) -> Result<usize, DatabaseError> {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(timeout)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        let stale = self.store.list_stale(cutoff)?;
        if stale.is_empty() {
            return Ok(0);
        }

        let mut reaped = 0;
        for record in &stale {
            match self.store.fail_if_stale(
                &record.entity_id,
                record.category_key,
                cutoff,
                STALE_MESSAGE,
            ) {
                Ok(true) => {
                    log::warn!(
                        "Reaped stale job {}/{} (started {:?})",
                        record.entity_id,
                        record.category_key,
                        record.started_at
                    );
                    reaped += 1;
                }
                Ok(false) => {
                    log::debug!(
                        "Job {}/{} changed before it could be reaped",
                        record.entity_id,
                        record.category_key
                    );
                }
                Err(e) => {
                    log::error!(
                        "Failed to reap job {}/{}: {}",
                        record.entity_id,
                        record.category_key,
                        e
                    );
                }
            }
        }

        log::info!("Reaper failed {} of {} stale job(s)", reaped, stale.len());
        Ok(reaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::jobs::{CategoryKey, EntityId, JobStatus, OutputRef, TransitionFields};

    const TIMEOUT: Duration = Duration::from_secs(600);

    fn store() -> JobRecordStore {
        JobRecordStore::new(Database::open_in_memory().expect("Failed to create test database"))
    }

    fn start_at(store: &JobRecordStore, entity: &EntityId, category: CategoryKey, ago: Duration) {
        let started = Utc::now() - chrono::Duration::from_std(ago).unwrap();
        assert!(store
            .transition(
                entity,
                category,
                &JobStatus::STARTABLE,
                JobStatus::InProgress,
                TransitionFields::started(started),
            )
            .unwrap());
    }

    #[test]
    fn test_reaps_only_stale_in_progress() {
        let store = store();
        let entity = EntityId::new("NYSE:IBM:2026-01-02");
        start_at(&store, &entity, CategoryKey::Competition, TIMEOUT * 2);
        start_at(&store, &entity, CategoryKey::FutureRisk, TIMEOUT / 2);

        let reaped = Reaper::new(store.clone()).reap(TIMEOUT).unwrap();
        assert_eq!(reaped, 1);

        let stale = store.get(&entity, CategoryKey::Competition).unwrap().unwrap();
        assert_eq!(stale.status, JobStatus::Failed);
        assert_eq!(stale.error_message.as_deref(), Some(STALE_MESSAGE));
        assert!(stale.ended_at.is_some());

        assert_eq!(
            store.status(&entity, CategoryKey::FutureRisk).unwrap(),
            JobStatus::InProgress
        );
    }

    #[test]
    fn test_never_touches_completed_or_not_started() {
        let store = store();
        let entity = EntityId::new("NYSE:IBM:2026-01-02");
        start_at(&store, &entity, CategoryKey::FinalSummary, TIMEOUT * 3);
        assert!(store
            .transition(
                &entity,
                CategoryKey::FinalSummary,
                &[JobStatus::InProgress],
                JobStatus::Completed,
                TransitionFields::completed(Utc::now(), OutputRef("done".into())),
            )
            .unwrap());
        store
            .ensure_records(&entity, &[CategoryKey::BusinessAndMoat])
            .unwrap();

        assert_eq!(Reaper::new(store.clone()).reap(TIMEOUT).unwrap(), 0);
        assert_eq!(
            store.status(&entity, CategoryKey::FinalSummary).unwrap(),
            JobStatus::Completed
        );
        assert_eq!(
            store.status(&entity, CategoryKey::BusinessAndMoat).unwrap(),
            JobStatus::NotStarted
        );
    }

    #[test]
    fn test_empty_store_reaps_nothing() {
        assert_eq!(Reaper::new(store()).reap(TIMEOUT).unwrap(), 0);
    }
}
