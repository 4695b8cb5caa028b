// Warehouse Seam - connection traits, bound parameters and result rows
// Everything above this layer talks to the warehouse only through these types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One result row: column name → value, exactly as the warehouse named the columns
pub type Row = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// BOUND PARAMETERS
// ============================================================================

/// Scalar value bound to a `?` placeholder.
///
/// Serialized untagged, so `[SqlParam::from("kerala")]` becomes `["kerala"]`.
/// That JSON form is what goes into cache keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Integer(value)
    }
}

impl From<f64> for SqlParam {
    fn from(value: f64) -> Self {
        SqlParam::Real(value)
    }
}

impl From<bool> for SqlParam {
    fn from(value: bool) -> Self {
        SqlParam::Bool(value)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlParam::Null)
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Failure reported by the warehouse (or the driver talking to it).
///
/// `sql_state` / `sql_message` carry the warehouse-native diagnostics when the
/// driver exposes them; they are surfaced verbatim in HTTP 500 bodies.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct QueryError {
    pub message: String,
    pub sql_state: Option<String>,
    pub sql_message: Option<String>,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql_state: None,
            sql_message: None,
        }
    }

    pub fn with_diagnostics(mut self, sql_state: impl Into<String>, sql_message: Option<String>) -> Self {
        self.sql_state = Some(sql_state.into());
        self.sql_message = sql_message;
        self
    }
}

// ============================================================================
// CONNECTION TRAITS
// ============================================================================

/// A live warehouse session able to run one parameterized query at a time.
///
/// Calls are blocking; the executor moves the connection onto the blocking
/// thread pool for the duration of a query.
pub trait WarehouseConnection: Send + 'static {
    fn query(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>, QueryError>;
}

/// Opens new warehouse connections on behalf of the pool.
pub trait ConnectionManager: Send + Sync + 'static {
    type Connection: WarehouseConnection;

    fn connect(&self) -> Result<Self::Connection, QueryError>;

    /// Short human-readable description of the target, for logs and `/api/config`.
    fn describe(&self) -> String {
        "warehouse".to_string()
    }
}
