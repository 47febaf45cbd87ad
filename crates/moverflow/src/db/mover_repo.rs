//! Mover repository: persistence for ingested daily-mover rows.
//!
//! A mover row is written once and never updated; the next trading day's
//! appearance of the same ticker is a new row with a new id.

use rusqlite::{params, Row};
use serde::Serialize;

use super::{Database, DatabaseError};

/// A raw mover row from the database.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoverRow {
    pub id: String,
    pub symbol: String,
    pub exchange: String,
    pub as_of_date: String,
    pub mover_type: String,
    pub country: String,
    pub percent_change: f64,
    pub raw: Option<String>,
    pub created_at: String,
}

impl MoverRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            symbol: row.get("symbol")?,
            exchange: row.get("exchange")?,
            as_of_date: row.get("as_of_date")?,
            mover_type: row.get("mover_type")?,
            country: row.get("country")?,
            percent_change: row.get("percent_change")?,
            raw: row.get("raw")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Creates the deterministic id of a mover row.
pub fn make_id(exchange: &str, symbol: &str, as_of_date: &str) -> String {
    format!("{}:{}:{}", exchange, symbol, as_of_date)
}

/// Inserts a mover row unless one already exists for the same
/// symbol, exchange and date.
///
/// Returns `Ok(false)` for a duplicate. Uniqueness conflicts are absorbed
/// by `ON CONFLICT DO NOTHING`; other constraint failures surface as errors.
pub fn insert_if_new(db: &Database, row: &MoverRow) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let inserted = conn.execute(
            "INSERT INTO movers (id, symbol, exchange, as_of_date, mover_type, country,
             percent_change, raw, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT DO NOTHING",
            params![
                row.id,
                row.symbol,
                row.exchange,
                row.as_of_date,
                row.mover_type,
                row.country,
                row.percent_change,
                row.raw,
                row.created_at,
            ],
        )?;
        Ok(inserted == 1)
    })
}

/// Finds a mover by id.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<MoverRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM movers WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], MoverRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists movers for a date, optionally restricted to one mover type,
/// largest absolute move first.
pub fn list_by_date(
    db: &Database,
    as_of_date: &str,
    mover_type: Option<&str>,
) -> Result<Vec<MoverRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM movers
             WHERE as_of_date = ?1 AND (?2 IS NULL OR mover_type = ?2)
             ORDER BY ABS(percent_change) DESC",
        )?;
        let rows = stmt
            .query_map(params![as_of_date, mover_type], MoverRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_mover(symbol: &str, exchange: &str, date: &str, change: f64) -> MoverRow {
        MoverRow {
            id: make_id(exchange, symbol, date),
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            as_of_date: date.to_string(),
            mover_type: "GAINERS".to_string(),
            country: "US".to_string(),
            percent_change: change,
            raw: Some(r#"{"price":"101.20"}"#.to_string()),
            created_at: "2026-01-02T21:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn test_make_id() {
        assert_eq!(make_id("NASDAQ", "AAPL", "2026-01-02"), "NASDAQ:AAPL:2026-01-02");
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        let row = sample_mover("AAPL", "NASDAQ", "2026-01-02", 4.2);
        assert!(insert_if_new(&db, &row).unwrap());

        let found = find_by_id(&db, &row.id).unwrap().unwrap();
        assert_eq!(found.symbol, "AAPL");
        assert_eq!(found.percent_change, 4.2);
        assert_eq!(found.raw.as_deref(), Some(r#"{"price":"101.20"}"#));
    }

    #[test]
    fn test_same_day_duplicate_is_skipped() {
        let db = test_db();
        let row = sample_mover("AAPL", "NASDAQ", "2026-01-02", 4.2);
        assert!(insert_if_new(&db, &row).unwrap());

        let mut again = row.clone();
        again.percent_change = 5.0;
        again.mover_type = "ACTIVES".to_string();
        assert!(!insert_if_new(&db, &again).unwrap());

        let stored = find_by_id(&db, &row.id).unwrap().unwrap();
        assert_eq!(stored.percent_change, 4.2);
    }

    #[test]
    fn test_next_day_is_a_new_row() {
        let db = test_db();
        assert!(insert_if_new(&db, &sample_mover("AAPL", "NASDAQ", "2026-01-02", 4.2)).unwrap());
        assert!(insert_if_new(&db, &sample_mover("AAPL", "NASDAQ", "2026-01-03", 1.1)).unwrap());
        assert_eq!(list_by_date(&db, "2026-01-03", None).unwrap().len(), 1);
    }

    #[test]
    fn test_check_violation_is_an_error() {
        let db = test_db();
        let row = sample_mover("", "NASDAQ", "2026-01-02", 1.0);
        let err = insert_if_new(&db, &row).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_list_by_date_orders_by_magnitude() {
        let db = test_db();
        insert_if_new(&db, &sample_mover("AAPL", "NASDAQ", "2026-01-02", 2.0)).unwrap();
        let mut loser = sample_mover("TSLA", "NASDAQ", "2026-01-02", -9.5);
        loser.mover_type = "LOSERS".to_string();
        insert_if_new(&db, &loser).unwrap();

        let all = list_by_date(&db, "2026-01-02", None).unwrap();
        assert_eq!(all[0].symbol, "TSLA");

        let gainers = list_by_date(&db, "2026-01-02", Some("GAINERS")).unwrap();
        assert_eq!(gainers.len(), 1);
        assert_eq!(gainers[0].symbol, "AAPL");
    }
}
