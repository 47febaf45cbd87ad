//! Completeness roll-ups over job records.
//!
//! [`summarize`] is pure; [`CompletenessService`] feeds it from the store.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::db::DatabaseError;
use crate::jobs::{CategoryKey, EntityId, EntityKind, JobRecord, JobRecordStore, JobStatus};

/// How much of an entity's expected report set is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Missing,
    Partial,
    Complete,
}

impl Classification {
    fn from_counts(completed: usize, expected: usize) -> Option<Self> {
        if expected == 0 {
            None
        } else if completed == 0 {
            Some(Classification::Missing)
        } else if completed < expected {
            Some(Classification::Partial)
        } else {
            Some(Classification::Complete)
        }
    }
}

/// Per-entity completeness.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletenessSummary {
    pub entity_id: EntityId,
    /// Expected category -> whether it is COMPLETED.
    pub categories: BTreeMap<CategoryKey, bool>,
    pub completed_count: usize,
    pub missing_count: usize,
    pub expected_count: usize,
    /// `None` when nothing is expected for the entity.
    pub classification: Option<Classification>,
}

/// Computes completeness for one entity.
///
/// Only COMPLETED counts; IN_PROGRESS and FAILED records are missing.
/// Records for categories outside `expected` are ignored, and so are
/// duplicate expected keys. The result does not depend on record order.
pub fn summarize(
    entity: &EntityId,
    expected: &[CategoryKey],
    records: &[JobRecord],
) -> CompletenessSummary {
    let done: HashSet<CategoryKey> = records
        .iter()
        .filter(|r| r.status == JobStatus::Completed)
        .map(|r| r.category_key)
        .collect();

    let categories: BTreeMap<CategoryKey, bool> = expected
        .iter()
        .map(|c| (*c, done.contains(c)))
        .collect();

    let expected_count = categories.len();
    let completed_count = categories.values().filter(|done| **done).count();

    CompletenessSummary {
        entity_id: entity.clone(),
        categories,
        completed_count,
        missing_count: expected_count - completed_count,
        expected_count,
        classification: Classification::from_counts(completed_count, expected_count),
    }
}

/// Summaries for a set of entities plus counts per classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletenessReport {
    pub entities: Vec<CompletenessSummary>,
    pub missing_count: usize,
    pub partial_count: usize,
    pub complete_count: usize,
    /// Entities with no expected categories.
    pub undefined_count: usize,
}

impl CompletenessReport {
    fn push(&mut self, summary: CompletenessSummary) {
        match summary.classification {
            Some(Classification::Missing) => self.missing_count += 1,
            Some(Classification::Partial) => self.partial_count += 1,
            Some(Classification::Complete) => self.complete_count += 1,
            None => self.undefined_count += 1,
        }
        self.entities.push(summary);
    }
}

/// Read-side service that computes summaries from stored records.
#[derive(Clone)]
pub struct CompletenessService {
    store: JobRecordStore,
}

impl CompletenessService {
    pub fn new(store: JobRecordStore) -> Self {
        Self { store }
    }

    pub fn summary(
        &self,
        entity: &EntityId,
        kind: EntityKind,
    ) -> Result<CompletenessSummary, DatabaseError> {
        let records = self.store.list_by_entity(entity)?;
        Ok(summarize(entity, kind.expected_categories(), &records))
    }

    pub fn report(
        &self,
        entities: &[(EntityId, EntityKind)],
    ) -> Result<CompletenessReport, DatabaseError> {
        let mut report = CompletenessReport::default();
        for (entity, kind) in entities {
            report.push(self.summary(entity, *kind)?);
        }
        Ok(report)
    }
}
