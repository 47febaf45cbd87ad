//! Test harness for isolated pipeline runs.
//!
//! Every harness owns a temp directory with its own SQLite file, so tests
//! can open a second handle on the same database to exercise cross
//! connection behavior.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use moverflow::{
    CacheInvalidator, CategoryKey, Database, DispatchConfig, Dispatcher, EntityId,
    GenerationContext, GenerationError, IngestConfig, Ingestor, InvalidationKey, JobRecordStore,
    OutputRef, ReportGenerator,
};

/// Generator whose per-category behavior is set up by the test.
#[derive(Default)]
pub struct ScriptedGenerator {
    failures: Mutex<HashMap<CategoryKey, String>>,
    delays: Mutex<HashMap<CategoryKey, Duration>>,
    calls: Mutex<Vec<(EntityId, CategoryKey)>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `category` fail with `message` until cleared.
    pub fn fail_on(&self, category: CategoryKey, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(category, message.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Makes every call for `category` sleep first.
    pub fn delay(&self, category: CategoryKey, delay: Duration) {
        self.delays.lock().unwrap().insert(category, delay);
    }

    pub fn calls(&self) -> Vec<(EntityId, CategoryKey)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, category: CategoryKey) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, c)| *c == category)
            .count()
    }
}

#[async_trait]
impl ReportGenerator for ScriptedGenerator {
    async fn generate(&self, ctx: &GenerationContext) -> Result<OutputRef, GenerationError> {
        self.calls
            .lock()
            .unwrap()
            .push((ctx.entity_id.clone(), ctx.category));

        let delay = self.delays.lock().unwrap().get(&ctx.category).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().unwrap().get(&ctx.category).cloned();
        match failure {
            Some(message) => Err(GenerationError::Failed(message)),
            None => Ok(OutputRef(format!(
                "reports/{}/{}",
                ctx.entity_id,
                ctx.category.as_str().to_ascii_lowercase()
            ))),
        }
    }
}

/// Invalidator that remembers every key it was asked to invalidate.
#[derive(Default)]
pub struct RecordingInvalidator {
    keys: Mutex<Vec<InvalidationKey>>,
}

impl RecordingInvalidator {
    pub fn keys(&self) -> Vec<InvalidationKey> {
        self.keys.lock().unwrap().clone()
    }

    pub fn tags(&self) -> Vec<String> {
        self.keys().iter().map(InvalidationKey::tag).collect()
    }
}

impl CacheInvalidator for RecordingInvalidator {
    fn invalidate(&self, key: &InvalidationKey) {
        self.keys.lock().unwrap().push(key.clone());
    }
}

/// Test harness providing an isolated database and pipeline wiring.
pub struct TestHarness {
    /// Keeps the database directory alive for the harness lifetime.
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub store: JobRecordStore,
    pub generator: Arc<ScriptedGenerator>,
    pub invalidator: Arc<RecordingInvalidator>,
    pub dispatch_config: DispatchConfig,
    pub ingest_config: IngestConfig,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("data").join("moverflow.db");
        let db = Database::open(&db_path).expect("Failed to open test database");

        Self {
            temp_dir,
            db_path,
            store: JobRecordStore::new(db),
            generator: Arc::new(ScriptedGenerator::new()),
            invalidator: Arc::new(RecordingInvalidator::default()),
            dispatch_config: DispatchConfig {
                max_concurrency: 4,
                generation_timeout: Duration::from_secs(2),
                store_timeout: Duration::from_secs(5),
            },
            ingest_config: IngestConfig {
                persist_timeout: Duration::from_secs(5),
                stale_timeout: Duration::from_secs(900),
                country: "US".to_string(),
            },
        }
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(
            self.store.clone(),
            self.generator.clone(),
            self.dispatch_config.clone(),
        ))
    }

    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(
            self.dispatcher(),
            self.invalidator.clone(),
            self.ingest_config.clone(),
        )
    }

    /// A second store on its own connection to the same file.
    pub fn second_store(&self) -> JobRecordStore {
        let db = Database::open(&self.db_path).expect("Failed to reopen test database");
        JobRecordStore::new(db)
    }

    /// Takes the database write lock on a second connection and keeps it
    /// for `hold`. Returns once the lock is held.
    pub fn hold_write_lock(&self, hold: Duration) -> JoinHandle<()> {
        let second = self.second_store();
        let (locked_tx, locked_rx) = mpsc::channel();
        let handle = std::thread::spawn(move || {
            second
                .database()
                .with_conn(|conn| {
                    conn.execute_batch("BEGIN IMMEDIATE")?;
                    locked_tx.send(()).expect("test thread gone");
                    std::thread::sleep(hold);
                    conn.execute_batch("COMMIT")?;
                    Ok(())
                })
                .expect("Failed to hold write lock");
        });
        locked_rx.recv().expect("lock holder exited early");
        handle
    }
}
