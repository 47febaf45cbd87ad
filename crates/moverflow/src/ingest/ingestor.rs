//! Batch ingestion: reap, persist-if-new, dispatch, invalidate.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::Instrument;

use super::batch::{MoverBatch, ValidCandidate};
use crate::db::mover_repo::{self, MoverRow};
use crate::db::{format_timestamp, run_blocking, Database, DatabaseError};
use crate::dispatch::{DispatchReport, Dispatcher, GenerationRequest};
use crate::error::IngestError;
use crate::invalidate::{CacheInvalidator, InvalidationKey};
use crate::jobs::{EntityId, EntityKind};
use crate::reaper::Reaper;

/// Tuning for an [`Ingestor`].
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Upper bound on persisting one candidate.
    pub persist_timeout: Duration,
    /// IN_PROGRESS records older than this are reaped before each batch.
    pub stale_timeout: Duration,
    /// Country for batches that do not carry one.
    pub country: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            persist_timeout: Duration::from_secs(10),
            stale_timeout: Duration::from_secs(900),
            country: "US".to_string(),
        }
    }
}

/// Outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    pub saved_count: usize,
    pub saved_entities: Vec<EntityId>,
    pub duplicate_count: usize,
    pub triggered_count: usize,
    pub skipped_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    /// Stale records failed by the inline reaper run.
    pub reaped: usize,
    /// Scraper, persistence and generation errors, in that order.
    pub errors: Vec<String>,
}

impl IngestionReport {
    fn absorb(&mut self, dispatch: DispatchReport) {
        self.triggered_count += dispatch.triggered.len();
        self.skipped_count += dispatch.skipped.len();
        self.completed_count += dispatch.completed.len();
        self.failed_count += dispatch.failed.len();
        for error in dispatch.errors {
            self.errors.push(format!(
                "{}/{}: {}",
                dispatch.entity_id, error.category, error.message
            ));
        }
    }
}

/// Turns screener batches into stored movers and generation jobs.
pub struct Ingestor {
    dispatcher: Arc<Dispatcher>,
    reaper: Reaper,
    invalidator: Arc<dyn CacheInvalidator>,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        invalidator: Arc<dyn CacheInvalidator>,
        config: IngestConfig,
    ) -> Self {
        let reaper = Reaper::new(dispatcher.store().clone());
        Self {
            dispatcher,
            reaper,
            invalidator,
            config,
        }
    }

    fn database(&self) -> &Database {
        self.dispatcher.store().database()
    }

    fn store_timeout(&self) -> Duration {
        self.dispatcher.config().store_timeout
    }

    /// Ingests one batch.
    ///
    /// A store that cannot be used (reaper scan, lost tables, lock or I/O
    /// failures, store timeouts outside persistence) aborts the batch with
    /// `Err`. Problems confined to one candidate or category are collected
    /// in [`IngestionReport::errors`] and the batch carries on. An empty
    /// batch returns an empty report without touching the store.
    pub async fn ingest(&self, batch: &MoverBatch) -> Result<IngestionReport, IngestError> {
        let mut report = IngestionReport {
            errors: batch.scraper_errors.iter().map(ToString::to_string).collect(),
            ..Default::default()
        };

        if batch.is_empty() {
            log::info!(
                "Empty {} batch for {}, nothing to ingest",
                batch.mover_type,
                batch.as_of_date
            );
            return Ok(report);
        }

        let country = batch
            .country
            .clone()
            .unwrap_or_else(|| self.config.country.clone());
        let span = tracing::info_span!(
            "ingest",
            mover_type = %batch.mover_type,
            as_of_date = %batch.as_of_date,
            country = %country,
            candidates = batch.candidates.len()
        );

        async move {
            let reaper = self.reaper.clone();
            let stale_timeout = self.config.stale_timeout;
            report.reaped =
                run_blocking(self.store_timeout(), move || reaper.reap(stale_timeout)).await?;

            let mut saved: Vec<(EntityId, ValidCandidate)> = Vec::new();
            for candidate in &batch.candidates {
                let valid = match candidate.validate() {
                    Ok(valid) => valid,
                    Err(e) => {
                        tracing::warn!(symbol = %candidate.symbol, error = %e, "Rejected candidate");
                        report.errors.push(e.to_string());
                        continue;
                    }
                };

                match self.persist(batch, &country, &valid).await {
                    Ok(Some(entity)) => saved.push((entity, valid)),
                    Ok(None) => report.duplicate_count += 1,
                    Err(e) if e.is_per_item() => {
                        tracing::warn!(symbol = %valid.symbol, error = %e, "Failed to persist candidate");
                        report.errors.push(format!("{}: {}", valid.symbol, e));
                    }
                    Err(e) => {
                        tracing::error!(symbol = %valid.symbol, error = %e, "Store failure, aborting batch");
                        return Err(e);
                    }
                }
            }

            report.saved_count = saved.len();
            report.saved_entities = saved.iter().map(|(entity, _)| entity.clone()).collect();

            let dispatches = saved
                .iter()
                .map(|(entity, candidate)| self.trigger(batch, &country, entity, candidate));
            let mut fatal = None;
            for (result, (entity, _)) in join_all(dispatches).await.into_iter().zip(&saved) {
                match result {
                    Ok(dispatch) => report.absorb(dispatch),
                    Err(e) if e.is_per_item() => report
                        .errors
                        .push(format!("{}: failed to create job records: {}", entity, e)),
                    Err(e) => {
                        tracing::error!(entity = %entity, error = %e, "Store failure, aborting batch");
                        fatal.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = fatal {
                return Err(e);
            }

            if report.saved_count > 0 {
                self.invalidator
                    .invalidate(&InvalidationKey::new(country.clone(), batch.mover_type));
            }

            tracing::info!(
                saved = report.saved_count,
                duplicates = report.duplicate_count,
                triggered = report.triggered_count,
                errors = report.errors.len(),
                "Ingestion finished"
            );
            Ok::<_, IngestError>(report)
        }
        .instrument(span)
        .await
    }

    /// Writes the mover row unless one exists for the same symbol,
    /// exchange and date. Returns the new entity id, or `None` for a
    /// duplicate.
    async fn persist(
        &self,
        batch: &MoverBatch,
        country: &str,
        candidate: &ValidCandidate,
    ) -> Result<Option<EntityId>, IngestError> {
        let entity = candidate.entity_id(batch.as_of_date);
        let row = MoverRow {
            id: entity.as_str().to_string(),
            symbol: candidate.symbol.clone(),
            exchange: candidate.exchange.clone(),
            as_of_date: batch.as_of_date.format("%Y-%m-%d").to_string(),
            mover_type: batch.mover_type.as_str().to_string(),
            country: country.to_string(),
            percent_change: candidate.percent_change,
            raw: if candidate.raw.is_null() {
                None
            } else {
                Some(candidate.raw.to_string())
            },
            created_at: format_timestamp(Utc::now()),
        };

        let db = self.database().clone();
        let timeout = self.config.persist_timeout;
        match run_blocking(timeout, move || mover_repo::insert_if_new(&db, &row)).await {
            Ok(inserted) => Ok(inserted.then_some(entity)),
            Err(DatabaseError::Timeout(_)) => Err(IngestError::PersistTimeout {
                id: entity.to_string(),
                timeout,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Creates the mover's job records and dispatches all of them.
    async fn trigger(
        &self,
        batch: &MoverBatch,
        country: &str,
        entity: &EntityId,
        candidate: &ValidCandidate,
    ) -> Result<DispatchReport, IngestError> {
        let kind = EntityKind::DailyMover;
        let store = self.dispatcher.store().clone();
        let owned = entity.clone();
        run_blocking(self.store_timeout(), move || {
            store.ensure_records(&owned, kind.expected_categories())
        })
        .await?;

        let context = serde_json::json!({
            "symbol": candidate.symbol,
            "exchange": candidate.exchange,
            "percentChange": candidate.percent_change,
            "moverType": batch.mover_type,
            "asOfDate": batch.as_of_date,
            "country": country,
            "raw": candidate.raw,
        });
        let request = GenerationRequest::all(entity.clone(), kind, context);
        Ok(self.dispatcher.dispatch(&request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchConfig, GenerationContext, ReportGenerator};
    use crate::error::GenerationError;
    use crate::ingest::{MoverCandidate, MoverType};
    use crate::invalidate::BroadcastInvalidator;
    use crate::jobs::{JobRecordStore, OutputRef};
    use async_trait::async_trait;
    use chrono::NaiveDate;

    struct EchoGenerator;

    #[async_trait]
    impl ReportGenerator for EchoGenerator {
        async fn generate(&self, ctx: &GenerationContext) -> Result<OutputRef, GenerationError> {
            Ok(OutputRef(format!("{}/{}", ctx.entity_id, ctx.category)))
        }
    }

    fn ingestor(invalidator: Arc<dyn CacheInvalidator>) -> Ingestor {
        let store = JobRecordStore::new(Database::open_in_memory().unwrap());
        let dispatcher = Arc::new(Dispatcher::new(
            store,
            Arc::new(EchoGenerator),
            DispatchConfig {
                max_concurrency: 4,
                generation_timeout: Duration::from_secs(5),
                store_timeout: Duration::from_secs(5),
            },
        ));
        Ingestor::new(dispatcher, invalidator, IngestConfig::default())
    }

    fn batch(symbols: &[&str]) -> MoverBatch {
        let mut batch =
            MoverBatch::new(MoverType::Gainers, NaiveDate::from_ymd_opt(2026, 1, 2).unwrap());
        for symbol in symbols {
            batch = batch.with_candidate(MoverCandidate {
                symbol: symbol.to_string(),
                exchange: "NASDAQ".to_string(),
                percent_change: 5.0,
                raw: serde_json::Value::Null,
            });
        }
        batch
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let invalidator = BroadcastInvalidator::default();
        let mut rx = invalidator.subscribe();
        let ingestor = ingestor(Arc::new(invalidator));

        let report = ingestor.ingest(&batch(&[])).await.unwrap();
        assert_eq!(report, IngestionReport::default());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_saves_and_dispatches() {
        let invalidator = BroadcastInvalidator::default();
        let mut rx = invalidator.subscribe();
        let ingestor = ingestor(Arc::new(invalidator));

        let report = ingestor.ingest(&batch(&["AAPL", "MSFT"])).await.unwrap();
        assert_eq!(report.saved_count, 2);
        assert_eq!(report.triggered_count, 10);
        assert_eq!(report.completed_count, 10);
        assert!(report.errors.is_empty());

        let key = rx.try_recv().unwrap();
        assert_eq!(key, InvalidationKey::new("US", MoverType::Gainers));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reingest_saves_nothing() {
        let invalidator = BroadcastInvalidator::default();
        let mut rx = invalidator.subscribe();
        let ingestor = ingestor(Arc::new(invalidator));

        ingestor.ingest(&batch(&["AAPL"])).await.unwrap();
        let _ = rx.try_recv();

        let again = ingestor.ingest(&batch(&["AAPL"])).await.unwrap();
        assert_eq!(again.saved_count, 0);
        assert_eq!(again.duplicate_count, 1);
        assert_eq!(again.triggered_count, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_candidate_is_reported_not_fatal() {
        let ingestor = ingestor(Arc::new(crate::invalidate::NoopInvalidator));
        let mut batch = batch(&["AAPL", "BAD SYMBOL"]);
        batch
            .scraper_errors
            .push(crate::ingest::ScraperError::Message("page 3 timed out".into()));

        let report = ingestor.ingest(&batch).await.unwrap();
        assert_eq!(report.saved_count, 1);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0], "scraper: page 3 timed out");
    }

    #[tokio::test]
    async fn test_batch_country_overrides_configured_one() {
        let invalidator = BroadcastInvalidator::default();
        let mut rx = invalidator.subscribe();
        let ingestor = ingestor(Arc::new(invalidator));

        let report = ingestor
            .ingest(&batch(&["SAP"]).with_country("DE"))
            .await
            .unwrap();
        assert_eq!(report.saved_count, 1);
        assert_eq!(rx.try_recv().unwrap(), InvalidationKey::new("DE", MoverType::Gainers));
    }
}
