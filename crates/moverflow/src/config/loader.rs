//! Reading and validating JSON config files.

use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.dispatch.max_concurrency == 0 {
        return Err(ConfigError::Validation {
            message: "dispatch.max_concurrency must be greater than 0".to_string(),
        });
    }

    if config.ingestion.stale_timeout_secs <= config.dispatch.generation_timeout_secs {
        return Err(ConfigError::Validation {
            message: format!(
                "ingestion.stale_timeout_secs ({}) must exceed dispatch.generation_timeout_secs ({})",
                config.ingestion.stale_timeout_secs, config.dispatch.generation_timeout_secs
            ),
        });
    }

    if let Some(endpoint) = &config.generator.endpoint {
        validate_url("generator.endpoint", endpoint)?;
    }
    if let Some(url) = &config.invalidation.webhook_url {
        validate_url("invalidation.webhook_url", url)?;
    }

    Ok(())
}

fn validate_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        field,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidUrl {
            field,
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}
