use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::dispatch::DispatchConfig;
use crate::ingest::IngestConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub ingestion: IngestionSection,
    #[serde(default)]
    pub generator: GeneratorSection,
    #[serde(default)]
    pub invalidation: InvalidationSection,
    #[serde(default)]
    pub reaper: ReaperSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            dispatch: DispatchSection::default(),
            ingestion: IngestionSection::default(),
            generator: GeneratorSection::default(),
            invalidation: InvalidationSection::default(),
            reaper: ReaperSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl Config {
    /// Configured database path, or the per-user default.
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        self.database_path
            .clone()
            .or_else(crate::db::default_database_path)
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            max_concurrency: self.dispatch.max_concurrency,
            generation_timeout: Duration::from_secs(self.dispatch.generation_timeout_secs),
            store_timeout: Duration::from_secs(self.dispatch.store_timeout_secs),
        }
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            persist_timeout: Duration::from_secs(self.ingestion.persist_timeout_secs),
            stale_timeout: self.stale_timeout(),
            country: self.ingestion.country.clone(),
        }
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.ingestion.stale_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSection {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,
}

fn default_max_concurrency() -> usize {
    num_cpus::get()
}

fn default_generation_timeout_secs() -> u64 {
    300
}

fn default_store_timeout_secs() -> u64 {
    10
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            generation_timeout_secs: default_generation_timeout_secs(),
            store_timeout_secs: default_store_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionSection {
    #[serde(default = "default_persist_timeout_secs")]
    pub persist_timeout_secs: u64,
    /// Must exceed `dispatch.generation_timeout_secs`.
    #[serde(default = "default_stale_timeout_secs")]
    pub stale_timeout_secs: u64,
    /// Used for batches that do not carry their own country.
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_persist_timeout_secs() -> u64 {
    10
}

fn default_stale_timeout_secs() -> u64 {
    900
}

fn default_country() -> String {
    "US".to_string()
}

impl Default for IngestionSection {
    fn default() -> Self {
        Self {
            persist_timeout_secs: default_persist_timeout_secs(),
            stale_timeout_secs: default_stale_timeout_secs(),
            country: default_country(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSection {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvalidationSection {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperSection {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    60
}

impl Default for ReaperSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_defaults() {
        let config: Config = serde_json::from_str(r#"{"version": "1.0"}"#).unwrap();
        assert!(config.database_path.is_none());
        assert_eq!(config.dispatch.generation_timeout_secs, 300);
        assert_eq!(config.ingestion.stale_timeout_secs, 900);
        assert_eq!(config.ingestion.country, "US");
        assert_eq!(config.reaper.interval_secs, 60);
        assert_eq!(config.logging.level, "info");
        assert!(config.dispatch.max_concurrency > 0);
    }

    #[test]
    fn test_conversions() {
        let mut config = Config::default();
        config.dispatch.max_concurrency = 3;
        config.ingestion.persist_timeout_secs = 2;
        config.ingestion.country = "CA".to_string();

        let dispatch = config.dispatch_config();
        assert_eq!(dispatch.max_concurrency, 3);
        assert_eq!(dispatch.generation_timeout, Duration::from_secs(300));
        assert_eq!(dispatch.store_timeout, Duration::from_secs(10));

        let ingest = config.ingest_config();
        assert_eq!(ingest.persist_timeout, Duration::from_secs(2));
        assert_eq!(ingest.stale_timeout, Duration::from_secs(900));
        assert_eq!(ingest.country, "CA");
    }

    #[test]
    fn test_resolved_database_path() {
        let mut config = Config::default();
        assert!(config
            .resolved_database_path()
            .unwrap()
            .ends_with("moverflow.db"));

        config.database_path = Some(PathBuf::from("/tmp/custom.db"));
        assert_eq!(
            config.resolved_database_path(),
            Some(PathBuf::from("/tmp/custom.db"))
        );
    }
}
