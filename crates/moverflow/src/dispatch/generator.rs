//! The report generator seam and its HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::jobs::{CategoryKey, EntityId, EntityKind, OutputRef};

/// Maximum length for error bodies echoed into job records.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Everything a generator needs for one (entity, category) job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationContext {
    pub entity_id: EntityId,
    pub kind: EntityKind,
    pub category: CategoryKey,
    /// Caller-supplied data (prices, fundamentals) passed through verbatim.
    pub context: serde_json::Value,
}

/// Produces one report category for one entity.
///
/// Implementations do the actual work (an LLM call, a template render) and
/// return a reference to the persisted result. They must not touch job
/// records; the dispatcher owns every status change.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(&self, ctx: &GenerationContext) -> Result<OutputRef, GenerationError>;
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    entity_id: &'a EntityId,
    kind: EntityKind,
    category: CategoryKey,
    context: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    output_ref: String,
}

/// Posts generation requests to a remote service.
///
/// Request body: `{"entityId", "kind", "category", "context"}`.
/// Expected response: `{"outputRef": "..."}` with a 2xx status.
pub struct HttpReportGenerator {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpReportGenerator {
    /// `timeout` bounds a single HTTP exchange; the dispatcher applies its
    /// own generation timeout on top.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ReportGenerator for HttpReportGenerator {
    async fn generate(&self, ctx: &GenerationContext) -> Result<OutputRef, GenerationError> {
        let request = GenerateRequest {
            entity_id: &ctx.entity_id,
            kind: ctx.kind,
            category: ctx.category,
            context: &ctx.context,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Failed(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate_body(&body)
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        if parsed.output_ref.trim().is_empty() {
            return Err(GenerationError::InvalidResponse(
                "empty outputRef".to_string(),
            ));
        }
        Ok(OutputRef(parsed.output_ref))
    }
}
