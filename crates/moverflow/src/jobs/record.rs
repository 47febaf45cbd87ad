//! Job record lifecycle types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::category::{CategoryKey, EntityId, UnknownName};

/// Lifecycle state of one (entity, category) job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    /// States from which the dispatcher may start a job.
    pub const STARTABLE: [JobStatus; 3] =
        [JobStatus::NotStarted, JobStatus::Failed, JobStatus::Completed];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::NotStarted => "not_started",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether the state machine has an edge from `self` to `to`.
    ///
    /// ```text
    /// NOT_STARTED ─┐
    /// FAILED ──────┼─► IN_PROGRESS ─┬─► COMPLETED
    /// COMPLETED ───┘                └─► FAILED
    /// ```
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        match (self, to) {
            (JobStatus::InProgress, JobStatus::Completed | JobStatus::Failed) => true,
            (
                JobStatus::NotStarted | JobStatus::Failed | JobStatus::Completed,
                JobStatus::InProgress,
            ) => true,
            _ => false,
        }
    }

    /// Returns true for COMPLETED and FAILED.
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(JobStatus::NotStarted),
            "in_progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(UnknownName(other.to_string())),
        }
    }
}

/// Opaque pointer to a persisted generation result (report id, URL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputRef(pub String);

impl OutputRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the job record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub entity_id: EntityId,
    pub category_key: CategoryKey,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Set only while the record is FAILED.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<OutputRef>,
    /// Number of times this pair has entered IN_PROGRESS.
    pub attempts: u32,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Time spent in the last run, if it has finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) if self.status.is_finished() => Some(end - start),
            _ => None,
        }
    }
}

/// Column values written alongside a status transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionFields {
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub output_ref: Option<OutputRef>,
}

impl TransitionFields {
    /// Fields for entering IN_PROGRESS.
    pub fn started(at: DateTime<Utc>) -> Self {
        Self {
            started_at: Some(at),
            ..Default::default()
        }
    }

    /// Fields for resolving into COMPLETED.
    pub fn completed(at: DateTime<Utc>, output_ref: OutputRef) -> Self {
        Self {
            ended_at: Some(at),
            output_ref: Some(output_ref),
            ..Default::default()
        }
    }

    /// Fields for resolving into FAILED.
    pub fn failed(at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            ended_at: Some(at),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}
