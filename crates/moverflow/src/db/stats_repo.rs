//! Generation statistics repository: records and queries daily
//! per-category outcome counts.

use rusqlite::params;
use serde::Serialize;

use super::{Database, DatabaseError};

/// Records one finished generation into the daily statistics.
///
/// Uses UPSERT to increment counters for the matching `(date, category)`.
pub fn record_generation(
    db: &Database,
    date: &str,
    category: &str,
    succeeded: bool,
    duration_ms: i64,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let success_val: i64 = if succeeded { 1 } else { 0 };
        let failure_val: i64 = if succeeded { 0 } else { 1 };

        // Right-hand column references in DO UPDATE see the pre-update row,
        // so the running average is (A * N + x) / (N + 1).
        conn.execute(
            "INSERT INTO generation_stats (date, category,
             total_processed, total_succeeded, total_failed, avg_duration_ms)
             VALUES (?1, ?2, 1, ?3, ?4, ?5)
             ON CONFLICT(date, category) DO UPDATE SET
               total_processed = total_processed + 1,
               total_succeeded = total_succeeded + ?3,
               total_failed = total_failed + ?4,
               avg_duration_ms = (avg_duration_ms * total_processed + ?5) / (total_processed + 1)",
            params![date, category, success_val, failure_val, duration_ms],
        )?;
        Ok(())
    })
}

/// A single statistics row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStatRow {
    pub date: String,
    pub category: String,
    pub total_processed: i64,
    pub total_succeeded: i64,
    pub total_failed: i64,
    pub avg_duration_ms: i64,
}

/// Queries statistics rows with optional filters, newest date first.
pub fn query(
    db: &Database,
    from_date: Option<&str>,
    to_date: Option<&str>,
    category: Option<&str>,
) -> Result<Vec<GenerationStatRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(from) = from_date {
            conditions.push(format!("date >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(from.to_string()));
        }
        if let Some(to) = to_date {
            conditions.push(format!("date <= ?{}", param_values.len() + 1));
            param_values.push(Box::new(to.to_string()));
        }
        if let Some(cat) = category {
            conditions.push(format!("category = ?{}", param_values.len() + 1));
            param_values.push(Box::new(cat.to_string()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT date, category, total_processed, total_succeeded, total_failed,
             avg_duration_ms
             FROM generation_stats {} ORDER BY date DESC, category ASC",
            where_clause
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<GenerationStatRow> = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok(GenerationStatRow {
                    date: row.get(0)?,
                    category: row.get(1)?,
                    total_processed: row.get(2)?,
                    total_succeeded: row.get(3)?,
                    total_failed: row.get(4)?,
                    avg_duration_ms: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
