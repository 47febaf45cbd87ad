//! Inbound screener batches and their validation.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::jobs::{EntityId, UnknownName};

static RE_SYMBOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9.\-]{0,14}$").unwrap());
static RE_EXCHANGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z0-9_]{1,16}$").unwrap());

/// Which screener list a batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoverType {
    Gainers,
    Losers,
    Actives,
}

impl MoverType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoverType::Gainers => "GAINERS",
            MoverType::Losers => "LOSERS",
            MoverType::Actives => "ACTIVES",
        }
    }
}

impl fmt::Display for MoverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MoverType {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GAINERS" => Ok(MoverType::Gainers),
            "LOSERS" => Ok(MoverType::Losers),
            "ACTIVES" => Ok(MoverType::Actives),
            _ => Err(UnknownName(s.to_string())),
        }
    }
}

/// One scraped mover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoverCandidate {
    pub symbol: String,
    pub exchange: String,
    pub percent_change: f64,
    /// Remaining scraped fields, kept verbatim.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub raw: serde_json::Value,
}

/// A candidate after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidCandidate {
    pub symbol: String,
    pub exchange: String,
    pub percent_change: f64,
    pub raw: serde_json::Value,
}

impl ValidCandidate {
    pub fn entity_id(&self, as_of_date: NaiveDate) -> EntityId {
        EntityId::new(crate::db::mover_repo::make_id(
            &self.exchange,
            &self.symbol,
            &as_of_date.format("%Y-%m-%d").to_string(),
        ))
    }
}

impl MoverCandidate {
    /// Trims and upper-cases the identifiers and checks them.
    pub fn validate(&self) -> Result<ValidCandidate, IngestError> {
        let symbol = self.symbol.trim().to_ascii_uppercase();
        let exchange = self.exchange.trim().to_ascii_uppercase();
        let invalid = |reason: String| IngestError::InvalidCandidate {
            symbol: self.symbol.clone(),
            reason,
        };

        if !RE_SYMBOL.is_match(&symbol) {
            return Err(invalid(format!("malformed symbol '{}'", self.symbol)));
        }
        if !RE_EXCHANGE.is_match(&exchange) {
            return Err(invalid(format!("malformed exchange '{}'", self.exchange)));
        }
        if !self.percent_change.is_finite() {
            return Err(invalid("percent change is not a finite number".to_string()));
        }

        Ok(ValidCandidate {
            symbol,
            exchange,
            percent_change: self.percent_change,
            raw: self.raw.clone(),
        })
    }
}

/// An error reported by the screener itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScraperError {
    Message(String),
    Detailed {
        #[serde(default)]
        symbol: Option<String>,
        message: String,
    },
}

impl fmt::Display for ScraperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScraperError::Message(message) => write!(f, "scraper: {}", message),
            ScraperError::Detailed {
                symbol: Some(symbol),
                message,
            } => write!(f, "scraper: {}: {}", symbol, message),
            ScraperError::Detailed {
                symbol: None,
                message,
            } => write!(f, "scraper: {}", message),
        }
    }
}

/// One screener callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoverBatch {
    #[serde(default)]
    pub candidates: Vec<MoverCandidate>,
    pub mover_type: MoverType,
    pub as_of_date: NaiveDate,
    /// Falls back to the ingestor's configured country when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// Passed through into the ingestion report, never fatal.
    #[serde(default, rename = "errors")]
    pub scraper_errors: Vec<ScraperError>,
}

impl MoverBatch {
    pub fn new(mover_type: MoverType, as_of_date: NaiveDate) -> Self {
        Self {
            candidates: Vec::new(),
            mover_type,
            as_of_date,
            country: None,
            scraper_errors: Vec::new(),
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_candidate(mut self, candidate: MoverCandidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn from_json(json: &str) -> Result<Self, IngestError> {
        Ok(serde_json::from_str(json)?)
    }
}
