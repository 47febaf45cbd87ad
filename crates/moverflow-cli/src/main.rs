//! Command-line driver for moverflow.
//!
//! Every subcommand prints its result as JSON on stdout; logs go to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use moverflow::db::{mover_repo, stats_repo};
use moverflow::telemetry::init_logging;
use moverflow::{
    load_config, CacheInvalidator, CategoryKey, CompletenessService, Config, Database,
    Dispatcher, EntityId, EntityKind, GenerationRequest, HttpReportGenerator, Ingestor,
    JobEvent, JobEventBroadcaster, JobRecordStore, JobStatus, MoverBatch, MoverType,
    NoopInvalidator, Reaper, ReaperScheduler, ReportGenerator, WebhookInvalidator,
};

#[derive(Parser)]
#[command(name = "moverflow")]
#[command(about = "Ingest market movers and drive their report generation jobs")]
#[command(version)]
struct Cli {
    /// Path to a JSON config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the database path from the config.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Stream job status changes to stderr as JSON lines.
    #[arg(long, global = true)]
    events: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a screener batch from a JSON file
    Ingest { batch: PathBuf },

    /// Generate report categories for one entity
    Generate {
        entity: String,
        #[arg(long, default_value = "ticker")]
        kind: EntityKind,
        /// Category to generate; repeat for several. All expected categories when omitted.
        #[arg(long = "category")]
        categories: Vec<CategoryKey>,
        /// Flag object such as '{"regenerateFinalSummary": true}'
        #[arg(long, conflicts_with = "categories")]
        flags: Option<String>,
        /// JSON context forwarded to the generator
        #[arg(long)]
        context: Option<String>,
    },

    /// Fail jobs stuck in progress longer than the stale timeout
    Reap {
        /// Overrides ingestion.stale_timeout_secs
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Show every job record of an entity
    Status { entity: String },

    /// Summarize completeness for one or more entities
    Completeness {
        #[arg(required = true)]
        entities: Vec<String>,
        #[arg(long, default_value = "ticker")]
        kind: EntityKind,
    },

    /// List job records by status, or count them per status
    Jobs {
        #[arg(long)]
        status: Option<JobStatus>,
        #[arg(long)]
        limit: Option<u64>,
    },

    /// List the movers stored for a trading day
    Movers {
        /// Trading day, YYYY-MM-DD
        date: NaiveDate,
        #[arg(long = "type")]
        mover_type: Option<MoverType>,
    },

    /// Show daily generation statistics
    Stats {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        category: Option<CategoryKey>,
    },

    /// Run the periodic reaper until interrupted
    WatchReaper,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReapResponse {
    reaped: usize,
    timeout_secs: u64,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    init_logging(&config.logging).context("Failed to initialise logging")?;
    info!("Starting moverflow v{}", env!("CARGO_PKG_VERSION"));

    let db_path = cli
        .db
        .clone()
        .or_else(|| config.resolved_database_path())
        .context("Could not determine a database path; pass --db")?;
    let (store, printer) = open_store(&db_path, cli.events)?;

    let result = run(cli.command, &config, store).await;

    // The stream closes once the last store clone is gone.
    if let Some(printer) = printer {
        let _ = printer.await;
    }
    result
}

async fn run(command: Commands, config: &Config, store: JobRecordStore) -> Result<()> {
    match command {
        Commands::Ingest { batch } => {
            let content = std::fs::read_to_string(&batch)
                .with_context(|| format!("Failed to read batch {}", batch.display()))?;
            let batch = MoverBatch::from_json(&content).context("Invalid batch")?;

            let dispatcher = Arc::new(build_dispatcher(config, store)?);
            let ingestor = Ingestor::new(
                dispatcher,
                build_invalidator(config)?,
                config.ingest_config(),
            );
            let report = ingestor.ingest(&batch).await?;
            print_json(&report)?;
        }

        Commands::Generate {
            entity,
            kind,
            categories,
            flags,
            context,
        } => {
            let entity = EntityId::new(entity);
            let context = match context {
                Some(raw) => serde_json::from_str(&raw).context("--context is not valid JSON")?,
                None => serde_json::Value::Null,
            };

            let request = if let Some(raw) = flags {
                let flags: serde_json::Map<String, serde_json::Value> =
                    serde_json::from_str(&raw).context("--flags must be a JSON object")?;
                GenerationRequest::from_flags(entity, kind, &flags, context)?
            } else if categories.is_empty() {
                GenerationRequest::all(entity, kind, context)
            } else {
                GenerationRequest::new(entity, kind, categories, context)
            };

            let dispatcher = build_dispatcher(config, store)?;
            let report = dispatcher.dispatch(&request).await;
            print_json(&report)?;
        }

        Commands::Reap { timeout_secs } => {
            let timeout = timeout_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.stale_timeout());
            let reaped = Reaper::new(store).reap(timeout)?;
            print_json(&ReapResponse {
                reaped,
                timeout_secs: timeout.as_secs(),
            })?;
        }

        Commands::Status { entity } => {
            let records = store.list_by_entity(&EntityId::new(entity))?;
            print_json(&records)?;
        }

        Commands::Completeness { entities, kind } => {
            let entities: Vec<(EntityId, EntityKind)> = entities
                .into_iter()
                .map(|id| (EntityId::new(id), kind))
                .collect();
            let report = CompletenessService::new(store).report(&entities)?;
            print_json(&report)?;
        }

        Commands::Jobs { status, limit } => match status {
            Some(status) => print_json(&store.list_by_status(status, limit)?)?,
            None => print_json(&store.counts_by_status()?)?,
        },

        Commands::Movers { date, mover_type } => {
            let rows = mover_repo::list_by_date(
                store.database(),
                &date.format("%Y-%m-%d").to_string(),
                mover_type.as_ref().map(MoverType::as_str),
            )?;
            print_json(&rows)?;
        }

        Commands::Stats { from, to, category } => {
            let from = from.map(|d| d.format("%Y-%m-%d").to_string());
            let to = to.map(|d| d.format("%Y-%m-%d").to_string());
            let rows = stats_repo::query(
                store.database(),
                from.as_deref(),
                to.as_deref(),
                category.as_ref().map(CategoryKey::as_str),
            )?;
            print_json(&rows)?;
        }

        Commands::WatchReaper => {
            let scheduler = ReaperScheduler::new(
                Reaper::new(store),
                Duration::from_secs(config.reaper.interval_secs),
                config.stale_timeout(),
            );
            let (trigger_tx, trigger_rx) = broadcast::channel(1);
            let handle = scheduler.start(trigger_rx);
            info!(
                "Reaper running every {}s; press Ctrl-C to stop",
                config.reaper.interval_secs
            );

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;

            info!("Stopping reaper");
            scheduler.stop();
            // Wakes the loop so it observes the stop flag.
            let _ = trigger_tx.send(());
            tokio::task::spawn_blocking(move || handle.join())
                .await?
                .map_err(|_| anyhow::anyhow!("Reaper thread panicked"))?;
        }
    }

    Ok(())
}

// ============================================================================
// Wiring
// ============================================================================

fn open_store(
    path: &Path,
    stream_events: bool,
) -> Result<(JobRecordStore, Option<JoinHandle<()>>)> {
    let db = Database::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    if !stream_events {
        return Ok((JobRecordStore::new(db), None));
    }

    let store = JobRecordStore::with_events(db, JobEventBroadcaster::default());
    let printer = store
        .events()
        .map(|events| tokio::spawn(print_events(events.subscribe())));
    Ok((store, printer))
}

async fn print_events(mut rx: broadcast::Receiver<JobEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => eprintln!("{}", line),
                Err(e) => log::warn!("Failed to serialize job event: {}", e),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::warn!("Event stream lagged, {} events dropped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn build_dispatcher(config: &Config, store: JobRecordStore) -> Result<Dispatcher> {
    let Some(endpoint) = config.generator.endpoint.as_deref() else {
        bail!("generator.endpoint is not configured");
    };
    let generator = HttpReportGenerator::new(
        endpoint,
        Duration::from_secs(config.generator.request_timeout_secs),
    )?;
    info!("Report generator at {}", generator.endpoint());
    let generator: Arc<dyn ReportGenerator> = Arc::new(generator);
    Ok(Dispatcher::new(store, generator, config.dispatch_config()))
}

fn build_invalidator(config: &Config) -> Result<Arc<dyn CacheInvalidator>> {
    match config.invalidation.webhook_url.as_deref() {
        Some(url) => Ok(Arc::new(
            WebhookInvalidator::new(url).context("Failed to build webhook client")?,
        )),
        None => Ok(Arc::new(NoopInvalidator)),
    }
}
