//! Builders for screener input.

#![allow(dead_code)]

use chrono::NaiveDate;

use moverflow::{MoverBatch, MoverCandidate, MoverType};

pub fn candidate(symbol: &str, exchange: &str, percent_change: f64) -> MoverCandidate {
    MoverCandidate {
        symbol: symbol.to_string(),
        exchange: exchange.to_string(),
        percent_change,
        raw: serde_json::json!({ "name": format!("{} Inc.", symbol) }),
    }
}

pub fn trading_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 13).expect("valid date")
}

/// Builder for `MoverBatch` instances.
pub struct BatchBuilder {
    batch: MoverBatch,
}

impl BatchBuilder {
    pub fn gainers() -> Self {
        Self {
            batch: MoverBatch::new(MoverType::Gainers, trading_day()).with_country("US"),
        }
    }

    pub fn losers() -> Self {
        Self {
            batch: MoverBatch::new(MoverType::Losers, trading_day()).with_country("US"),
        }
    }

    pub fn candidate(mut self, symbol: &str, exchange: &str, percent_change: f64) -> Self {
        self.batch = self
            .batch
            .with_candidate(candidate(symbol, exchange, percent_change));
        self
    }

    /// Leaves the country to the ingestor's configuration.
    pub fn without_country(mut self) -> Self {
        self.batch.country = None;
        self
    }

    pub fn build(self) -> MoverBatch {
        self.batch
    }
}
