pub mod completeness;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod invalidate;
pub mod jobs;
pub mod reaper;
pub mod telemetry;

pub use completeness::{
    summarize, Classification, CompletenessReport, CompletenessService, CompletenessSummary,
};
pub use config::{load_config, Config};
pub use db::{Database, DatabaseError};
pub use dispatch::{
    DispatchConfig, DispatchReport, Dispatcher, GenerationContext, GenerationRequest,
    HttpReportGenerator, ReportGenerator,
};
pub use error::{ConfigError, GenerationError, IngestError, MoverflowError, Result};
pub use ingest::{IngestConfig, IngestionReport, Ingestor, MoverBatch, MoverCandidate, MoverType};
pub use invalidate::{
    BroadcastInvalidator, CacheInvalidator, InvalidationKey, NoopInvalidator, WebhookInvalidator,
};
pub use jobs::{
    CategoryKey, EntityId, EntityKind, JobEvent, JobEventBroadcaster, JobRecord, JobRecordStore,
    JobStatus, OutputRef, TransitionFields,
};
pub use reaper::{Reaper, ReaperScheduler, STALE_MESSAGE};
