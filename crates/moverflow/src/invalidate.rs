//! Fire-and-forget cache invalidation after a productive ingestion batch.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::ingest::MoverType;

/// Coarse cache key: everything listed for one country and mover list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationKey {
    pub country: String,
    pub mover_type: MoverType,
}

impl InvalidationKey {
    pub fn new(country: impl Into<String>, mover_type: MoverType) -> Self {
        Self {
            country: country.into(),
            mover_type,
        }
    }

    /// Tag form, e.g. `movers:US:GAINERS`.
    pub fn tag(&self) -> String {
        format!("movers:{}:{}", self.country, self.mover_type)
    }
}

/// Signals downstream caches that a key's contents changed.
///
/// Must not block and must not fail the caller; delivery problems are
/// logged by the implementation.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, key: &InvalidationKey);
}

/// Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInvalidator;

impl CacheInvalidator for NoopInvalidator {
    fn invalidate(&self, key: &InvalidationKey) {
        log::debug!("Cache invalidation skipped for {}", key.tag());
    }
}

/// Publishes keys to in-process subscribers.
#[derive(Clone)]
pub struct BroadcastInvalidator {
    sender: Arc<broadcast::Sender<InvalidationKey>>,
}

impl BroadcastInvalidator {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InvalidationKey> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastInvalidator {
    fn default() -> Self {
        Self::new(64)
    }
}

impl CacheInvalidator for BroadcastInvalidator {
    fn invalidate(&self, key: &InvalidationKey) {
        // No active receivers is fine
        let _ = self.sender.send(key.clone());
    }
}

/// POSTs `{"country", "moverType", "tag"}` to a webhook on a spawned task.
pub struct WebhookInvalidator {
    url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookBody<'a> {
    #[serde(flatten)]
    key: &'a InvalidationKey,
    tag: String,
}

impl WebhookInvalidator {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

impl CacheInvalidator for WebhookInvalidator {
    fn invalidate(&self, key: &InvalidationKey) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::warn!(
                    "No async runtime, dropping cache invalidation for {}",
                    key.tag()
                );
                return;
            }
        };

        let client = self.client.clone();
        let url = self.url.clone();
        let key = key.clone();
        handle.spawn(async move {
            let body = WebhookBody {
                key: &key,
                tag: key.tag(),
            };
            match client.post(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    log::debug!("Cache invalidated for {}", key.tag());
                }
                Ok(response) => {
                    log::warn!(
                        "Cache invalidation for {} returned HTTP {}",
                        key.tag(),
                        response.status()
                    );
                }
                Err(e) => log::warn!("Cache invalidation for {} failed: {}", key.tag(), e),
            }
        });
    }
}
