// SQLite Warehouse - embedded analytical store behind the warehouse traits
// WAL mode so the server can read while an upload job writes

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params, Connection, OpenFlags, ToSql};

use crate::records::{FinancialRecord, TourismRecord};
use crate::warehouse::{ConnectionManager, QueryError, Row, SqlParam, WarehouseConnection};

// ============================================================================
// CONNECTION MANAGER
// ============================================================================

/// Opens connections to an existing warehouse file.
///
/// The file is never created here: a missing warehouse is a connection
/// failure, not an empty database.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteManager {
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            busy_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConnectionManager for SqliteManager {
    type Connection = Connection;

    fn connect(&self) -> Result<Connection, QueryError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags).map_err(|e| {
            QueryError::from(e).prefixed(&format!("cannot open warehouse {}", self.path.display()))
        })?;
        conn.busy_timeout(self.busy_timeout)?;

        Ok(conn)
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

impl WarehouseConnection for Connection {
    fn query(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>, QueryError> {
        let mut stmt = self.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut out = Vec::new();

        while let Some(row) = rows.next()? {
            let mut map = Row::new();
            for (i, name) in columns.iter().enumerate() {
                map.insert(name.clone(), json_value(row.get_ref(i)?));
            }
            out.push(map);
        }

        Ok(out)
    }
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlParam::Null => ToSqlOutput::Owned(Value::Null),
            SqlParam::Bool(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            SqlParam::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlParam::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SqlParam::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl From<rusqlite::Error> for QueryError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, message) => QueryError::new(err.to_string())
                .with_diagnostics(failure.extended_code.to_string(), message.clone()),
            _ => QueryError::new(err.to_string()),
        }
    }
}

impl QueryError {
    fn prefixed(mut self, context: &str) -> Self {
        self.message = format!("{}: {}", context, self.message);
        self
    }
}

fn json_value(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(bytes) => serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => serde_json::Value::String(hex::encode(bytes)),
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // Enable WAL mode for concurrent readers
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ART_CULTURE_FINANCIAL_DATA (
            STATE_UT TEXT NOT NULL,
            FINANCIAL_YEAR TEXT NOT NULL,
            NO_OF_ORGS INTEGER NOT NULL DEFAULT 0,
            AMOUNT_RS_IN_LAKHS REAL NOT NULL DEFAULT 0,
            CREATED_AT TEXT DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS TOURISM_DATA (
            STATE TEXT NOT NULL,
            DOMESTIC_TOURIST_VISITS_MILLION REAL NOT NULL DEFAULT 0,
            FOREIGN_TOURIST_VISITS_MILLION REAL NOT NULL DEFAULT 0,
            HAS_ART BOOLEAN NOT NULL DEFAULT 0,
            HAS_CULTURE BOOLEAN NOT NULL DEFAULT 0,
            HAS_TOURISM BOOLEAN NOT NULL DEFAULT 0,
            CREATED_AT TEXT DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_financial_state ON ART_CULTURE_FINANCIAL_DATA(STATE_UT)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tourism_state ON TOURISM_DATA(STATE)",
        [],
    )?;

    Ok(())
}

/// Append financial rows; `CREATED_AT` falls back to the column default
pub fn insert_financial(conn: &mut Connection, records: &[FinancialRecord]) -> rusqlite::Result<usize> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO ART_CULTURE_FINANCIAL_DATA (
                STATE_UT, FINANCIAL_YEAR, NO_OF_ORGS, AMOUNT_RS_IN_LAKHS, CREATED_AT
            ) VALUES (?1, ?2, ?3, ?4, COALESCE(?5, CURRENT_TIMESTAMP))",
        )?;
        for record in records {
            stmt.execute(params![
                record.state_ut,
                record.financial_year,
                record.no_of_orgs,
                record.amount_rs_in_lakhs,
                record.created_at,
            ])?;
        }
    }
    tx.commit()?;

    Ok(records.len())
}

/// Append tourism rows; `CREATED_AT` falls back to the column default
pub fn insert_tourism(conn: &mut Connection, records: &[TourismRecord]) -> rusqlite::Result<usize> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO TOURISM_DATA (
                STATE, DOMESTIC_TOURIST_VISITS_MILLION, FOREIGN_TOURIST_VISITS_MILLION,
                HAS_ART, HAS_CULTURE, HAS_TOURISM, CREATED_AT
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, COALESCE(?7, CURRENT_TIMESTAMP))",
        )?;
        for record in records {
            stmt.execute(params![
                record.state,
                record.domestic_visits_million,
                record.foreign_visits_million,
                record.has_art,
                record.has_culture,
                record.has_tourism,
                record.created_at,
            ])?;
        }
    }
    tx.commit()?;

    Ok(records.len())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::records::{from_rows, FINANCIAL_TABLE, TOURISM_TABLE};
    use tempfile::TempDir;

    /// Warehouse file with both tables and a small Kerala/Goa fixture
    pub(crate) fn seeded_warehouse() -> (TempDir, SqliteManager) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warehouse.db");

        let mut conn = Connection::open(&path).unwrap();
        setup_database(&conn).unwrap();
        insert_financial(
            &mut conn,
            &[
                FinancialRecord {
                    state_ut: "Kerala".to_string(),
                    financial_year: "2020-21".to_string(),
                    no_of_orgs: 3,
                    amount_rs_in_lakhs: 40.0,
                    created_at: None,
                },
                FinancialRecord {
                    state_ut: "Kerala".to_string(),
                    financial_year: "2021-22".to_string(),
                    no_of_orgs: 5,
                    amount_rs_in_lakhs: 100.0,
                    created_at: None,
                },
                FinancialRecord {
                    state_ut: "Goa".to_string(),
                    financial_year: "2021-22".to_string(),
                    no_of_orgs: 1,
                    amount_rs_in_lakhs: 7.5,
                    created_at: None,
                },
            ],
        )
        .unwrap();
        insert_tourism(
            &mut conn,
            &[
                TourismRecord {
                    state: "kerala".to_string(),
                    domestic_visits_million: 10.0,
                    foreign_visits_million: 1.0,
                    has_art: true,
                    has_culture: false,
                    has_tourism: true,
                    created_at: None,
                },
                TourismRecord {
                    state: "Rajasthan".to_string(),
                    domestic_visits_million: 52.3,
                    foreign_visits_million: 0.15,
                    has_art: false,
                    has_culture: true,
                    has_tourism: true,
                    created_at: None,
                },
            ],
        )
        .unwrap();

        (dir, SqliteManager::new(path, Duration::from_millis(500)))
    }

    #[test]
    fn test_setup_is_idempotent() {
        let (_dir, manager) = seeded_warehouse();
        let conn = manager.connect().unwrap();

        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();
    }

    #[test]
    fn test_query_returns_named_columns() {
        let (_dir, manager) = seeded_warehouse();
        let mut conn = manager.connect().unwrap();

        let rows = conn
            .query(
                "SELECT * FROM ART_CULTURE_FINANCIAL_DATA WHERE LOWER(STATE_UT) = LOWER(?1) ORDER BY FINANCIAL_YEAR DESC",
                &[SqlParam::from("KERALA")],
            )
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["FINANCIAL_YEAR"], "2021-22");
        assert_eq!(rows[0]["NO_OF_ORGS"], 5);
        assert!(rows[0]["CREATED_AT"].is_string());

        let records: Vec<FinancialRecord> = from_rows(FINANCIAL_TABLE, rows).unwrap();
        assert_eq!(records[1].amount_rs_in_lakhs, 40.0);
    }

    #[test]
    fn test_boolean_columns_decode_as_flags() {
        let (_dir, manager) = seeded_warehouse();
        let mut conn = manager.connect().unwrap();

        let rows = conn.query("SELECT * FROM TOURISM_DATA ORDER BY STATE", &[]).unwrap();
        assert_eq!(rows[0]["HAS_ART"], 0);

        let records: Vec<TourismRecord> = from_rows(TOURISM_TABLE, rows).unwrap();
        assert_eq!(records[0].state, "Rajasthan");
        assert!(!records[0].has_art);
        assert!(records[0].has_culture);
    }

    #[test]
    fn test_zero_rows_is_empty_not_error() {
        let (_dir, manager) = seeded_warehouse();
        let mut conn = manager.connect().unwrap();

        let rows = conn
            .query("SELECT * FROM TOURISM_DATA WHERE STATE = ?1", &[SqlParam::from("ladakh")])
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_bad_sql_carries_diagnostics() {
        let (_dir, manager) = seeded_warehouse();
        let mut conn = manager.connect().unwrap();

        let err = conn.query("SELECT * FROM MISSING_TABLE", &[]).unwrap_err();
        assert!(err.message.contains("MISSING_TABLE"));
        assert!(err.sql_state.is_some());
        assert!(err.sql_message.unwrap().contains("no such table"));
    }

    #[test]
    fn test_missing_file_fails_to_connect() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SqliteManager::new(dir.path().join("absent.db"), Duration::from_millis(100));

        let err = manager.connect().unwrap_err();
        assert!(err.message.starts_with("cannot open warehouse"));
        assert!(!dir.path().join("absent.db").exists());
    }

    #[test]
    fn test_blob_renders_as_hex() {
        assert_eq!(json_value(ValueRef::Blob(&[0x0a, 0xff])), serde_json::json!("0aff"));
        assert_eq!(json_value(ValueRef::Blob(&[])), serde_json::json!(""));
        assert_eq!(json_value(ValueRef::Real(f64::NAN)), serde_json::Value::Null);
    }
}
