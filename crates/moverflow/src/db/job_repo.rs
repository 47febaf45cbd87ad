//! Job record repository: raw access to the `job_records` table.
//!
//! Rows are keyed by `(entity_id, category)`. Status and category values
//! are stored as plain strings; typed conversion happens in
//! [`crate::jobs::JobRecordStore`].

use rusqlite::{params, Row, Transaction, TransactionBehavior};

use super::{Database, DatabaseError};

/// A raw job record row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub entity_id: String,
    pub category: String,
    pub status: String,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub error_message: Option<String>,
    pub output_ref: Option<String>,
    pub attempts: i64,
    pub updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            entity_id: row.get("entity_id")?,
            category: row.get("category")?,
            status: row.get("status")?,
            started_at: row.get("started_at")?,
            ended_at: row.get("ended_at")?,
            error_message: row.get("error_message")?,
            output_ref: row.get("output_ref")?,
            attempts: row.get("attempts")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// A conditional status update.
///
/// `started_at` and `output_ref` keep their stored value when `None`;
/// `ended_at` and `error_message` are always overwritten.
#[derive(Debug, Clone)]
pub struct CasUpdate<'a> {
    pub entity_id: &'a str,
    pub category: &'a str,
    pub from: &'a [&'a str],
    pub to: &'a str,
    pub started_at: Option<&'a str>,
    pub ended_at: Option<&'a str>,
    pub error_message: Option<&'a str>,
    pub output_ref: Option<&'a str>,
    pub updated_at: &'a str,
    /// Treat a missing row as `not_started` by inserting it first.
    pub materialize_missing: bool,
    /// Increment the attempt counter.
    pub count_attempt: bool,
}

/// Applies a compare-and-swap status update.
///
/// Returns true when exactly one row moved from one of `from` to `to`.
/// The optional insert and the conditional update share one immediate
/// transaction, so two connections racing on the same pair serialize on
/// the SQLite write lock and only one of them observes a matching status.
pub fn compare_and_set(db: &Database, update: &CasUpdate<'_>) -> Result<bool, DatabaseError> {
    if update.from.is_empty() {
        return Ok(false);
    }

    db.with_conn(|conn| {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

        if update.materialize_missing {
            tx.execute(
                "INSERT OR IGNORE INTO job_records (entity_id, category, status, updated_at)
                 VALUES (?1, ?2, 'not_started', ?3)",
                params![update.entity_id, update.category, update.updated_at],
            )?;
        }

        let placeholders: Vec<String> = (0..update.from.len())
            .map(|i| format!("?{}", i + 10))
            .collect();
        let sql = format!(
            "UPDATE job_records SET status = ?3,
             started_at = COALESCE(?4, started_at),
             ended_at = ?5,
             error_message = ?6,
             output_ref = COALESCE(?7, output_ref),
             attempts = attempts + ?8,
             updated_at = ?9
             WHERE entity_id = ?1 AND category = ?2 AND status IN ({})",
            placeholders.join(", ")
        );

        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![
            Box::new(update.entity_id.to_string()),
            Box::new(update.category.to_string()),
            Box::new(update.to.to_string()),
            Box::new(update.started_at.map(str::to_string)),
            Box::new(update.ended_at.map(str::to_string)),
            Box::new(update.error_message.map(str::to_string)),
            Box::new(update.output_ref.map(str::to_string)),
            Box::new(i64::from(update.count_attempt)),
            Box::new(update.updated_at.to_string()),
        ];
        for status in update.from {
            param_values.push(Box::new(status.to_string()));
        }

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let changed = tx.execute(&sql, params_ref.as_slice())?;
        tx.commit()?;

        Ok(changed == 1)
    })
}

/// Inserts `not_started` rows for every category that has no row yet.
/// Returns the number of rows created.
pub fn insert_not_started(
    db: &Database,
    entity_id: &str,
    categories: &[&str],
    now: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        let mut created = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO job_records (entity_id, category, status, updated_at)
                 VALUES (?1, ?2, 'not_started', ?3)",
            )?;
            for category in categories {
                created += stmt.execute(params![entity_id, category, now])?;
            }
        }
        tx.commit()?;
        Ok(created)
    })
}

/// Fails an `in_progress` row whose `started_at` is older than `cutoff`.
///
/// The staleness guard is part of the `WHERE` clause, so a job that was
/// restarted after the scan is left alone.
pub fn fail_if_stale(
    db: &Database,
    entity_id: &str,
    category: &str,
    cutoff: &str,
    message: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE job_records SET status = 'failed', error_message = ?4,
             ended_at = ?5, updated_at = ?5
             WHERE entity_id = ?1 AND category = ?2
               AND status = 'in_progress' AND started_at < ?3",
            params![entity_id, category, cutoff, message, now],
        )?;
        Ok(changed == 1)
    })
}

/// Finds the row for one (entity, category) pair.
pub fn find(
    db: &Database,
    entity_id: &str,
    category: &str,
) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM job_records WHERE entity_id = ?1 AND category = ?2")?;
        let mut rows = stmt.query_map(params![entity_id, category], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists all rows for an entity, ordered by category.
pub fn list_by_entity(db: &Database, entity_id: &str) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM job_records WHERE entity_id = ?1 ORDER BY category")?;
        let rows = stmt
            .query_map(params![entity_id], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Lists all rows with the given status, most recently updated first.
pub fn list_by_status(
    db: &Database,
    status: &str,
    limit: Option<u64>,
) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(
            "SELECT * FROM job_records WHERE status = ?1
             ORDER BY updated_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![status, limit], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Lists `in_progress` rows that started before `cutoff`, oldest first.
pub fn list_in_progress_before(
    db: &Database,
    cutoff: &str,
) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM job_records
             WHERE status = 'in_progress' AND started_at < ?1
             ORDER BY started_at ASC",
        )?;
        let rows = stmt
            .query_map(params![cutoff], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts rows with the given status.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM job_records WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
