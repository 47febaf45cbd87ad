//! Generation requests and the flag-object form used for targeted regeneration.

use serde::{Deserialize, Serialize};

use crate::jobs::{CategoryKey, EntityId, EntityKind, UnknownName};

/// A request to (re)generate some categories of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub entity_id: EntityId,
    pub kind: EntityKind,
    pub categories: Vec<CategoryKey>,
    #[serde(default)]
    pub context: serde_json::Value,
}

impl GenerationRequest {
    pub fn new(
        entity_id: EntityId,
        kind: EntityKind,
        categories: Vec<CategoryKey>,
        context: serde_json::Value,
    ) -> Self {
        Self {
            entity_id,
            kind,
            categories,
            context,
        }
    }

    /// Requests every category expected for `kind`.
    pub fn all(entity_id: EntityId, kind: EntityKind, context: serde_json::Value) -> Self {
        Self::new(entity_id, kind, kind.expected_categories().to_vec(), context)
    }

    /// Builds a request from the boolean flag shape, e.g.
    /// `{"regenerateFinalSummary": true, "regenerateCompetition": false}`.
    ///
    /// Only flags set to `true` are requested. Keys without the
    /// `regenerate` prefix are ignored; a `regenerate` key naming an
    /// unknown category is an error.
    pub fn from_flags(
        entity_id: EntityId,
        kind: EntityKind,
        flags: &serde_json::Map<String, serde_json::Value>,
        context: serde_json::Value,
    ) -> Result<Self, UnknownName> {
        let mut categories = Vec::new();
        for (key, value) in flags {
            if !key.starts_with("regenerate") {
                continue;
            }
            let category = CategoryKey::from_flag(key).ok_or_else(|| UnknownName(key.clone()))?;
            if value.as_bool() == Some(true) {
                categories.push(category);
            }
        }
        categories.sort();
        Ok(Self::new(entity_id, kind, categories, context))
    }

    /// Requested categories with duplicates removed, first occurrence kept.
    pub fn unique_categories(&self) -> Vec<CategoryKey> {
        let mut seen = Vec::with_capacity(self.categories.len());
        for category in &self.categories {
            if !seen.contains(category) {
                seen.push(*category);
            }
        }
        seen
    }
}
