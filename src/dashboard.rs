// Dashboard Queries - what each endpoint asks the warehouse, minus the HTTP

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::categorizer::{
    categorize, category_statistics, state_statistics, CategorizedData, CategoryStatistics, StateFlags,
    StateMap,
};
use crate::executor::{ExecuteError, QueryExecutor};
use crate::records::{from_rows, FinancialRecord, RecordError, TourismRecord, FINANCIAL_TABLE, TOURISM_TABLE};
use crate::states::is_valid_state;
use crate::warehouse::{ConnectionManager, Row, SqlParam};

// ============================================================================
// QUERIES
// ============================================================================

pub const ALL_FINANCIAL_SQL: &str =
    "SELECT * FROM ART_CULTURE_FINANCIAL_DATA ORDER BY STATE_UT, FINANCIAL_YEAR DESC";
pub const ALL_TOURISM_SQL: &str = "SELECT * FROM TOURISM_DATA ORDER BY STATE";
pub const STATE_FINANCIAL_SQL: &str =
    "SELECT * FROM ART_CULTURE_FINANCIAL_DATA WHERE LOWER(STATE_UT) = LOWER(?) ORDER BY FINANCIAL_YEAR DESC";
pub const STATE_TOURISM_SQL: &str = "SELECT * FROM TOURISM_DATA WHERE LOWER(STATE) = LOWER(?)";
pub const TABLE_CHECK_SQL: &str = "SELECT \
    (SELECT COUNT(*) FROM ART_CULTURE_FINANCIAL_DATA) AS FINANCIAL_COUNT, \
    (SELECT COUNT(*) FROM TOURISM_DATA) AS TOURISM_COUNT";
pub const PING_SQL: &str = "SELECT CURRENT_TIMESTAMP AS TIMESTAMP";
pub const TOURISM_STATE_COUNTS_SQL: &str =
    "SELECT STATE, COUNT(*) AS ROW_COUNT FROM TOURISM_DATA GROUP BY STATE ORDER BY STATE";

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("State parameter is required")]
    MissingState,

    #[error("Invalid state name. Please provide a valid state name.")]
    InvalidState(String),

    #[error(transparent)]
    Execute(#[from] ExecuteError),

    #[error(transparent)]
    Decode(#[from] RecordError),
}

// ============================================================================
// RESPONSES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub states: StateMap<StateFlags>,
    pub categories: CategoryStatistics,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub categorized_data: CategorizedData,
    pub statistics: Statistics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateData {
    pub financial: Vec<FinancialRecord>,
    pub tourism: Vec<TourismRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub count: i64,
    pub sample: Option<Row>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    #[serde(rename = "ART_CULTURE_FINANCIAL_DATA")]
    pub financial: TableSummary,
    #[serde(rename = "TOURISM_DATA")]
    pub tourism: TableSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateRowCount {
    pub state: String,
    pub rows: i64,
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Every row of both tables, categorized, with per-state and per-category statistics
pub async fn overview<M: ConnectionManager>(executor: &QueryExecutor<M>) -> Result<Overview, DashboardError> {
    let financial_rows = executor.execute(ALL_FINANCIAL_SQL, &[], true).await?;
    let tourism_rows = executor.execute(ALL_TOURISM_SQL, &[], true).await?;

    let financial: Vec<FinancialRecord> = from_rows(FINANCIAL_TABLE, financial_rows)?;
    let tourism: Vec<TourismRecord> = from_rows(TOURISM_TABLE, tourism_rows)?;

    let categorized_data = categorize(&financial, &tourism);
    let statistics = Statistics {
        states: state_statistics(&categorized_data),
        categories: category_statistics(&categorized_data),
    };

    Ok(Overview {
        categorized_data,
        statistics,
    })
}

/// Both tables' rows for one state; the name is checked before any query runs
pub async fn state_data<M: ConnectionManager>(
    executor: &QueryExecutor<M>,
    state: &str,
) -> Result<StateData, DashboardError> {
    if state.trim().is_empty() {
        return Err(DashboardError::MissingState);
    }
    if !is_valid_state(state) {
        return Err(DashboardError::InvalidState(state.to_string()));
    }

    // Fails fast with a clear "no such table" if the upload never ran
    let tables = executor.execute(TABLE_CHECK_SQL, &[], true).await?;
    debug!(state, counts = ?tables.first(), "table check");

    let param = [SqlParam::from(state)];
    let financial_rows = executor.execute(STATE_FINANCIAL_SQL, &param, true).await?;
    let tourism_rows = executor.execute(STATE_TOURISM_SQL, &param, true).await?;
    debug!(state, financial = financial_rows.len(), tourism = tourism_rows.len(), "state data fetched");

    Ok(StateData {
        financial: from_rows(FINANCIAL_TABLE, financial_rows)?,
        tourism: from_rows(TOURISM_TABLE, tourism_rows)?,
    })
}

/// Live row counts and one sample row per table, bypassing the cache
pub async fn table_report<M: ConnectionManager>(executor: &QueryExecutor<M>) -> Result<TableReport, DashboardError> {
    let mut summaries = Vec::with_capacity(2);
    for table in [FINANCIAL_TABLE, TOURISM_TABLE] {
        let count_rows = executor
            .execute(&format!("SELECT COUNT(*) AS COUNT FROM {}", table), &[], false)
            .await?;
        let sample = executor
            .execute(&format!("SELECT * FROM {} LIMIT 1", table), &[], false)
            .await?;

        let count = count_rows
            .first()
            .and_then(|row| row.get("COUNT"))
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(0);
        summaries.push(TableSummary {
            count,
            sample: sample.into_iter().next(),
        });
    }

    let tourism = summaries.pop().unwrap_or(TableSummary { count: 0, sample: None });
    let financial = summaries.pop().unwrap_or(TableSummary { count: 0, sample: None });
    Ok(TableReport { financial, tourism })
}

/// Tourism rows per state, to spot states the upload missed or duplicated
pub async fn tourism_state_counts<M: ConnectionManager>(
    executor: &QueryExecutor<M>,
) -> Result<Vec<StateRowCount>, DashboardError> {
    let rows = executor.execute(TOURISM_STATE_COUNTS_SQL, &[], false).await?;
    Ok(rows
        .iter()
        .map(|row| StateRowCount {
            state: row.get("STATE").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            rows: row.get("ROW_COUNT").and_then(serde_json::Value::as_i64).unwrap_or(0),
        })
        .collect())
}

/// Round-trip to the warehouse; returns its current timestamp
pub async fn ping<M: ConnectionManager>(executor: &QueryExecutor<M>) -> Result<serde_json::Value, DashboardError> {
    let rows = executor.execute(PING_SQL, &[], false).await?;
    Ok(rows
        .into_iter()
        .next()
        .and_then(|mut row| row.remove("TIMESTAMP"))
        .unwrap_or(serde_json::Value::Null))
}
