//! Entity identifiers, entity kinds and the category catalogue.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque identifier of the subject a job works on.
///
/// Daily movers use `EXCHANGE:SYMBOL:YYYY-MM-DD`; tickers use whatever
/// identifier the caller keys its reports by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The kind of entity, which fixes the categories expected for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A listed ticker with the full analysis and persona report set.
    Ticker,
    /// A single day's mover row.
    DailyMover,
}

const DAILY_MOVER_CATEGORIES: &[CategoryKey] = &[
    CategoryKey::BusinessAndMoat,
    CategoryKey::FinancialAnalysis,
    CategoryKey::Competition,
    CategoryKey::FutureRisk,
    CategoryKey::FinalSummary,
];

impl EntityKind {
    /// The fixed set of categories a complete entity of this kind has.
    pub fn expected_categories(&self) -> &'static [CategoryKey] {
        match self {
            EntityKind::Ticker => &CategoryKey::ALL,
            EntityKind::DailyMover => DAILY_MOVER_CATEGORIES,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Ticker => "ticker",
            EntityKind::DailyMover => "daily_mover",
        }
    }
}

impl FromStr for EntityKind {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "ticker" => Ok(EntityKind::Ticker),
            "daily_mover" | "mover" => Ok(EntityKind::DailyMover),
            _ => Err(UnknownName(s.to_string())),
        }
    }
}

/// One independent unit of report work for an entity.
///
/// Categories carry no ordering or dependency between each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CategoryKey {
    BusinessAndMoat,
    FinancialAnalysis,
    PastPerformance,
    FutureGrowth,
    FairValue,
    Competition,
    FutureRisk,
    FinalSummary,
    WarrenBuffett,
    CharlieMunger,
    BillAckman,
}

impl CategoryKey {
    pub const ALL: [CategoryKey; 11] = [
        CategoryKey::BusinessAndMoat,
        CategoryKey::FinancialAnalysis,
        CategoryKey::PastPerformance,
        CategoryKey::FutureGrowth,
        CategoryKey::FairValue,
        CategoryKey::Competition,
        CategoryKey::FutureRisk,
        CategoryKey::FinalSummary,
        CategoryKey::WarrenBuffett,
        CategoryKey::CharlieMunger,
        CategoryKey::BillAckman,
    ];

    /// Storage and wire name, e.g. `FINAL_SUMMARY`.
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKey::BusinessAndMoat => "BUSINESS_AND_MOAT",
            CategoryKey::FinancialAnalysis => "FINANCIAL_ANALYSIS",
            CategoryKey::PastPerformance => "PAST_PERFORMANCE",
            CategoryKey::FutureGrowth => "FUTURE_GROWTH",
            CategoryKey::FairValue => "FAIR_VALUE",
            CategoryKey::Competition => "COMPETITION",
            CategoryKey::FutureRisk => "FUTURE_RISK",
            CategoryKey::FinalSummary => "FINAL_SUMMARY",
            CategoryKey::WarrenBuffett => "WARREN_BUFFETT",
            CategoryKey::CharlieMunger => "CHARLIE_MUNGER",
            CategoryKey::BillAckman => "BILL_ACKMAN",
        }
    }

    /// Name used by the legacy `regenerateX` request flags.
    fn flag_suffix(&self) -> &'static str {
        match self {
            CategoryKey::BusinessAndMoat => "BusinessAndMoat",
            CategoryKey::FinancialAnalysis => "FinancialAnalysis",
            CategoryKey::PastPerformance => "PastPerformance",
            CategoryKey::FutureGrowth => "FutureGrowth",
            CategoryKey::FairValue => "FairValue",
            CategoryKey::Competition => "Competition",
            CategoryKey::FutureRisk => "FutureRisk",
            CategoryKey::FinalSummary => "FinalSummary",
            CategoryKey::WarrenBuffett => "WarrenBuffett",
            CategoryKey::CharlieMunger => "CharlieMunger",
            CategoryKey::BillAckman => "BillAckman",
        }
    }

    /// Maps a legacy flag name such as `regenerateFinalSummary`.
    pub fn from_flag(flag: &str) -> Option<Self> {
        let suffix = flag.strip_prefix("regenerate")?;
        Self::ALL.into_iter().find(|c| c.flag_suffix() == suffix)
    }

    /// Whether this category is an investor-persona report.
    pub fn is_persona(&self) -> bool {
        matches!(
            self,
            CategoryKey::WarrenBuffett | CategoryKey::CharlieMunger | CategoryKey::BillAckman
        )
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryKey {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| UnknownName(s.to_string()))
    }
}

/// A name that does not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown name '{0}'")]
pub struct UnknownName(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trips_through_name() {
        for category in CategoryKey::ALL {
            assert_eq!(category.as_str().parse::<CategoryKey>().unwrap(), category);
        }
    }

    #[test]
    fn test_category_parse_is_lenient_on_case() {
        assert_eq!(
            "final-summary".parse::<CategoryKey>().unwrap(),
            CategoryKey::FinalSummary
        );
        assert!("MARKET_SENTIMENT".parse::<CategoryKey>().is_err());
    }

    #[test]
    fn test_category_serde_name() {
        let json = serde_json::to_string(&CategoryKey::BusinessAndMoat).unwrap();
        assert_eq!(json, "\"BUSINESS_AND_MOAT\"");
    }

    #[test]
    fn test_from_flag() {
        assert_eq!(
            CategoryKey::from_flag("regenerateFinalSummary"),
            Some(CategoryKey::FinalSummary)
        );
        assert_eq!(
            CategoryKey::from_flag("regenerateWarrenBuffett"),
            Some(CategoryKey::WarrenBuffett)
        );
        assert_eq!(CategoryKey::from_flag("FinalSummary"), None);
        assert_eq!(CategoryKey::from_flag("regenerateEverything"), None);
    }

    #[test]
    fn test_expected_categories() {
        assert_eq!(EntityKind::DailyMover.expected_categories().len(), 5);
        assert_eq!(EntityKind::Ticker.expected_categories().len(), 11);
        assert!(EntityKind::Ticker
            .expected_categories()
            .iter()
            .any(CategoryKey::is_persona));
        assert!(!EntityKind::DailyMover
            .expected_categories()
            .iter()
            .any(CategoryKey::is_persona));
    }

    #[test]
    fn test_entity_kind_parse() {
        assert_eq!("daily-mover".parse::<EntityKind>().unwrap(), EntityKind::DailyMover);
        assert_eq!("Ticker".parse::<EntityKind>().unwrap(), EntityKind::Ticker);
        assert!("etf".parse::<EntityKind>().is_err());
    }
}
