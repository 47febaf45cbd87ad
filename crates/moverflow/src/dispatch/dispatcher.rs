//! Fan-out of generation requests into independent per-category jobs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::Instrument;
use uuid::Uuid;

use super::generator::{GenerationContext, ReportGenerator};
use super::request::GenerationRequest;
use crate::db::{run_blocking, stats_repo};
use crate::error::GenerationError;
use crate::jobs::{
    CategoryKey, EntityId, EntityKind, JobRecordStore, JobStatus, OutputRef, TransitionFields,
};

/// Tuning for a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Generations running at once across all requests.
    pub max_concurrency: usize,
    /// Upper bound on one generator call.
    pub generation_timeout: Duration,
    /// Upper bound on one store call, lock waits included.
    pub store_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: num_cpus::get().max(1),
            generation_timeout: Duration::from_secs(300),
            store_timeout: Duration::from_secs(10),
        }
    }
}

/// A category that produced an error instead of a clean outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryError {
    pub category: CategoryKey,
    pub message: String,
}

/// Result of dispatching one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub entity_id: EntityId,
    /// Categories this call moved into IN_PROGRESS.
    pub triggered: Vec<CategoryKey>,
    /// Categories already IN_PROGRESS elsewhere.
    pub skipped: Vec<CategoryKey>,
    pub completed: Vec<CategoryKey>,
    pub failed: Vec<CategoryKey>,
    /// Generation failures, store errors and lost ownership.
    pub errors: Vec<CategoryError>,
}

impl DispatchReport {
    fn new(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            triggered: Vec::new(),
            skipped: Vec::new(),
            completed: Vec::new(),
            failed: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn record(&mut self, category: CategoryKey, outcome: CategoryOutcome) {
        match outcome {
            CategoryOutcome::Skipped => self.skipped.push(category),
            CategoryOutcome::Completed => {
                self.triggered.push(category);
                self.completed.push(category);
            }
            CategoryOutcome::Failed(message) => {
                self.triggered.push(category);
                self.failed.push(category);
                self.errors.push(CategoryError { category, message });
            }
            CategoryOutcome::LostOwnership(message) | CategoryOutcome::Unrecorded(message) => {
                self.triggered.push(category);
                self.errors.push(CategoryError { category, message });
            }
            CategoryOutcome::StoreError(message) => {
                self.errors.push(CategoryError { category, message });
            }
        }
    }

    /// True when every requested category completed.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.errors.is_empty()
    }
}

enum CategoryOutcome {
    Skipped,
    Completed,
    Failed(String),
    /// Started, but the closing write found the record no longer ours.
    LostOwnership(String),
    /// Started, but the closing write failed or timed out. The record stays
    /// IN_PROGRESS until the reaper fails it.
    Unrecorded(String),
    /// The start itself could not be recorded.
    StoreError(String),
}

/// Runs per-category generation jobs with bounded concurrency.
///
/// Each category is claimed with a conditional write before the generator
/// runs and resolved with another conditional write after it returns, so
/// a category is never generated twice at once and never overwritten by a
/// worker that has lost it to the reaper.
pub struct Dispatcher {
    store: JobRecordStore,
    generator: Arc<dyn ReportGenerator>,
    config: DispatchConfig,
    semaphore: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        store: JobRecordStore,
        generator: Arc<dyn ReportGenerator>,
        config: DispatchConfig,
    ) -> Self {
        let permits = config.max_concurrency.max(1);
        Self {
            store,
            generator,
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn store(&self) -> &JobRecordStore {
        &self.store
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Dispatches every requested category and waits for all of them.
    ///
    /// Never fails as a whole: per-category problems are reported in the
    /// returned [`DispatchReport`] and do not affect sibling categories.
    pub async fn dispatch(&self, request: &GenerationRequest) -> DispatchReport {
        let categories = request.unique_categories();
        let span = tracing::info_span!(
            "dispatch",
            run_id = %Uuid::new_v4(),
            entity = %request.entity_id,
            categories = categories.len()
        );

        async {
            let context = Arc::new(request.context.clone());
            let runs = categories.iter().map(|category| {
                let context = Arc::clone(&context);
                async move {
                    let outcome = self
                        .run_category(&request.entity_id, request.kind, *category, context)
                        .await;
                    (*category, outcome)
                }
            });

            let mut report = DispatchReport::new(request.entity_id.clone());
            for (category, outcome) in join_all(runs).await {
                report.record(category, outcome);
            }

            tracing::info!(
                triggered = report.triggered.len(),
                skipped = report.skipped.len(),
                completed = report.completed.len(),
                failed = report.failed.len(),
                errors = report.errors.len(),
                "Dispatch finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    async fn run_category(
        &self,
        entity: &EntityId,
        kind: EntityKind,
        category: CategoryKey,
        context: Arc<serde_json::Value>,
    ) -> CategoryOutcome {
        let _permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return CategoryOutcome::StoreError("dispatcher is shut down".to_string()),
        };

        let store = self.store.clone();
        let owned = entity.clone();
        let started = run_blocking(self.config.store_timeout, move || {
            store.transition(
                &owned,
                category,
                &JobStatus::STARTABLE,
                JobStatus::InProgress,
                TransitionFields::started(Utc::now()),
            )
        })
        .await;

        match started {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(%category, "Already in progress, skipping");
                return CategoryOutcome::Skipped;
            }
            Err(e) => {
                tracing::error!(%category, error = %e, "Failed to start job");
                return CategoryOutcome::StoreError(format!("failed to start: {}", e));
            }
        }

        let ctx = GenerationContext {
            entity_id: entity.clone(),
            kind,
            category,
            context: (*context).clone(),
        };
        let timer = Instant::now();
        let result = match tokio::time::timeout(
            self.config.generation_timeout,
            self.generator.generate(&ctx),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(self.config.generation_timeout)),
        };
        let elapsed = timer.elapsed();

        self.finish(entity, category, result, elapsed).await
    }

    /// Writes the terminal status for a category this dispatcher started.
    async fn finish(
        &self,
        entity: &EntityId,
        category: CategoryKey,
        result: Result<OutputRef, GenerationError>,
        elapsed: Duration,
    ) -> CategoryOutcome {
        let ended = Utc::now();
        let (to, fields, outcome) = match result {
            Ok(output_ref) => {
                tracing::info!(%category, output_ref = %output_ref, "Generation completed");
                (
                    JobStatus::Completed,
                    TransitionFields::completed(ended, output_ref),
                    CategoryOutcome::Completed,
                )
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(%category, error = %message, "Generation failed");
                (
                    JobStatus::Failed,
                    TransitionFields::failed(ended, message.clone()),
                    CategoryOutcome::Failed(message),
                )
            }
        };

        let store = self.store.clone();
        let owned = entity.clone();
        let closed = run_blocking(self.config.store_timeout, move || {
            store.transition(&owned, category, &[JobStatus::InProgress], to, fields)
        })
        .await;

        match closed {
            Ok(true) => {
                self.record_stats(category, to == JobStatus::Completed, elapsed)
                    .await;
                outcome
            }
            Ok(false) => {
                tracing::warn!(%category, "Record changed while generating, result discarded");
                CategoryOutcome::LostOwnership(format!(
                    "lost ownership: record for {} left IN_PROGRESS before {} could be written",
                    category, to
                ))
            }
            Err(e) => {
                tracing::error!(%category, error = %e, "Failed to record outcome");
                CategoryOutcome::Unrecorded(format!("failed to record {}: {}", to, e))
            }
        }
    }

    async fn record_stats(&self, category: CategoryKey, succeeded: bool, elapsed: Duration) {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let duration_ms = i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX);
        let db = self.store.database().clone();
        let recorded = run_blocking(self.config.store_timeout, move || {
            stats_repo::record_generation(&db, &date, category.as_str(), succeeded, duration_ms)
        })
        .await;
        if let Err(e) = recorded {
            log::warn!("Failed to record generation stats: {}", e);
        }
    }
}
