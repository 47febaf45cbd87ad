//! Typed job record store on top of [`crate::db::job_repo`].
//!
//! Every status change goes through [`JobRecordStore::transition`], a
//! compare-and-swap that only writes when the stored status is one of the
//! expected sources. This is the only guard against two writers claiming
//! the same (entity, category) pair.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::category::{CategoryKey, EntityId};
use super::events::{JobEvent, JobEventBroadcaster};
use super::record::{JobRecord, JobStatus, OutputRef, TransitionFields};
use crate::db::job_repo::{self, CasUpdate, JobRow};
use crate::db::{format_timestamp, parse_timestamp, Database, DatabaseError};

// ─── Helpers ────────────────────────────────────────────────────────────────

fn parse_optional_timestamp(
    column: &'static str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    value.map(|s| parse_timestamp(column, s)).transpose()
}

/// Converts a raw row. Rows with a category this build does not know are
/// skipped with a warning; an unknown status is a decode error.
fn record_from_row(row: JobRow) -> Result<Option<JobRecord>, DatabaseError> {
    let category_key = match row.category.parse::<CategoryKey>() {
        Ok(category) => category,
        Err(_) => {
            log::warn!(
                "Skipping job record {} with unknown category '{}'",
                row.entity_id,
                row.category
            );
            return Ok(None);
        }
    };
    let status = row
        .status
        .parse::<JobStatus>()
        .map_err(|_| DatabaseError::Decode {
            column: "status",
            value: row.status.clone(),
        })?;

    Ok(Some(JobRecord {
        entity_id: EntityId::from(row.entity_id),
        category_key,
        status,
        started_at: parse_optional_timestamp("started_at", row.started_at.as_deref())?,
        ended_at: parse_optional_timestamp("ended_at", row.ended_at.as_deref())?,
        error_message: row.error_message,
        output_ref: row.output_ref.map(OutputRef),
        attempts: u32::try_from(row.attempts).unwrap_or(u32::MAX),
        updated_at: parse_timestamp("updated_at", &row.updated_at)?,
    }))
}

fn records_from_rows(rows: Vec<JobRow>) -> Result<Vec<JobRecord>, DatabaseError> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(record) = record_from_row(row)? {
            records.push(record);
        }
    }
    Ok(records)
}

// ─── Counts ─────────────────────────────────────────────────────────────────

/// Number of stored records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub not_started: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.not_started + self.in_progress + self.completed + self.failed
    }
}

// ─── JobRecordStore ─────────────────────────────────────────────────────────

/// Durable per-(entity, category) job state with conditional transitions.
#[derive(Clone)]
pub struct JobRecordStore {
    db: Database,
    events: Option<JobEventBroadcaster>,
}

impl JobRecordStore {
    pub fn new(db: Database) -> Self {
        Self { db, events: None }
    }

    /// Publishes every successful transition on `events`.
    pub fn with_events(db: Database, events: JobEventBroadcaster) -> Self {
        Self {
            db,
            events: Some(events),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn events(&self) -> Option<&JobEventBroadcaster> {
        self.events.as_ref()
    }

    /// Reads one record. `None` means the pair has never been touched,
    /// which callers treat as NOT_STARTED.
    pub fn get(
        &self,
        entity: &EntityId,
        category: CategoryKey,
    ) -> Result<Option<JobRecord>, DatabaseError> {
        match job_repo::find(&self.db, entity.as_str(), category.as_str())? {
            Some(row) => record_from_row(row),
            None => Ok(None),
        }
    }

    /// Current status of a pair, defaulting to NOT_STARTED.
    pub fn status(
        &self,
        entity: &EntityId,
        category: CategoryKey,
    ) -> Result<JobStatus, DatabaseError> {
        Ok(self
            .get(entity, category)?
            .map(|r| r.status)
            .unwrap_or(JobStatus::NotStarted))
    }

    pub fn list_by_entity(&self, entity: &EntityId) -> Result<Vec<JobRecord>, DatabaseError> {
        records_from_rows(job_repo::list_by_entity(&self.db, entity.as_str())?)
    }

    /// Moves a record to `to` if and only if its current status is in
    /// `from`. A missing row counts as NOT_STARTED.
    ///
    /// Source states without a state-machine edge to `to` are dropped from
    /// `from` before the write. Returns false, without writing, when no
    /// allowed source matches.
    pub fn transition(
        &self,
        entity: &EntityId,
        category: CategoryKey,
        from: &[JobStatus],
        to: JobStatus,
        fields: TransitionFields,
    ) -> Result<bool, DatabaseError> {
        let allowed: Vec<JobStatus> = from
            .iter()
            .copied()
            .filter(|s| s.can_transition_to(to))
            .collect();
        if allowed.len() != from.len() {
            log::warn!(
                "Ignoring illegal source states for {}/{} -> {}: {:?}",
                entity,
                category,
                to,
                from.iter().filter(|s| !s.can_transition_to(to)).collect::<Vec<_>>()
            );
        }
        if allowed.is_empty() {
            return Ok(false);
        }

        let from_names: Vec<&str> = allowed.iter().map(JobStatus::as_str).collect();
        let now = format_timestamp(Utc::now());
        let started_at = fields.started_at.map(format_timestamp);
        let ended_at = fields.ended_at.map(format_timestamp);

        let moved = job_repo::compare_and_set(
            &self.db,
            &CasUpdate {
                entity_id: entity.as_str(),
                category: category.as_str(),
                from: &from_names,
                to: to.as_str(),
                started_at: started_at.as_deref(),
                ended_at: ended_at.as_deref(),
                error_message: fields.error_message.as_deref(),
                output_ref: fields.output_ref.as_ref().map(OutputRef::as_str),
                updated_at: &now,
                materialize_missing: allowed.contains(&JobStatus::NotStarted),
                count_attempt: to == JobStatus::InProgress,
            },
        )?;

        if moved {
            log::debug!("Job {}/{} -> {}", entity, category, to);
            if let Some(events) = &self.events {
                let source = match allowed.as_slice() {
                    [single] => Some(*single),
                    _ => None,
                };
                let mut event = JobEvent::new(entity, category, source, to);
                if let Some(message) = fields.error_message {
                    event = event.with_error(message);
                }
                events.send(event);
            }
        }

        Ok(moved)
    }

    /// Creates NOT_STARTED records for every category that has none.
    /// Existing records are left untouched. Returns the number created.
    pub fn ensure_records(
        &self,
        entity: &EntityId,
        categories: &[CategoryKey],
    ) -> Result<usize, DatabaseError> {
        let names: Vec<&str> = categories.iter().map(CategoryKey::as_str).collect();
        let now = format_timestamp(Utc::now());
        job_repo::insert_not_started(&self.db, entity.as_str(), &names, &now)
    }

    /// Records with `status`, most recently updated first.
    pub fn list_by_status(
        &self,
        status: JobStatus,
        limit: Option<u64>,
    ) -> Result<Vec<JobRecord>, DatabaseError> {
        records_from_rows(job_repo::list_by_status(&self.db, status.as_str(), limit)?)
    }

    /// IN_PROGRESS records that started strictly before `cutoff`.
    pub fn list_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<JobRecord>, DatabaseError> {
        records_from_rows(job_repo::list_in_progress_before(
            &self.db,
            &format_timestamp(cutoff),
        )?)
    }

    /// Fails a record only if it is still IN_PROGRESS and started before
    /// `cutoff`. A record that was restarted after the scan is left alone.
    pub fn fail_if_stale(
        &self,
        entity: &EntityId,
        category: CategoryKey,
        cutoff: DateTime<Utc>,
        message: &str,
    ) -> Result<bool, DatabaseError> {
        let failed = job_repo::fail_if_stale(
            &self.db,
            entity.as_str(),
            category.as_str(),
            &format_timestamp(cutoff),
            message,
            &format_timestamp(Utc::now()),
        )?;

        if failed {
            if let Some(events) = &self.events {
                events.send(
                    JobEvent::new(
                        entity,
                        category,
                        Some(JobStatus::InProgress),
                        JobStatus::Failed,
                    )
                    .with_error(message),
                );
            }
        }
        Ok(failed)
    }

    pub fn counts_by_status(&self) -> Result<StatusCounts, DatabaseError> {
        Ok(StatusCounts {
            not_started: job_repo::count_by_status(&self.db, JobStatus::NotStarted.as_str())?,
            in_progress: job_repo::count_by_status(&self.db, JobStatus::InProgress.as_str())?,
            completed: job_repo::count_by_status(&self.db, JobStatus::Completed.as_str())?,
            failed: job_repo::count_by_status(&self.db, JobStatus::Failed.as_str())?,
        })
    }
}
