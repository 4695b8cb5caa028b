// Test support - manual clock and a counting in-memory warehouse

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::cache::Clock;
use crate::warehouse::{ConnectionManager, QueryError, Row, SqlParam, WarehouseConnection};

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Default)]
pub struct FakeState {
    pub rows: Mutex<HashMap<String, Vec<Row>>>,
    pub fail_queries: AtomicBool,
    pub fail_connects: AtomicBool,
    pub connects: AtomicUsize,
    pub queries: AtomicUsize,
}

/// Warehouse that answers from a sql → rows table and counts every call
#[derive(Clone, Default)]
pub struct FakeManager {
    pub state: Arc<FakeState>,
}

impl FakeManager {
    pub fn with_rows(self, sql: &str, rows: Vec<Row>) -> Self {
        self.state.rows.lock().unwrap().insert(sql.to_string(), rows);
        self
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.state.queries.load(Ordering::SeqCst)
    }

    pub fn fail_queries(&self, fail: bool) {
        self.state.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_connects(&self, fail: bool) {
        self.state.fail_connects.store(fail, Ordering::SeqCst);
    }
}

pub struct FakeConnection {
    state: Arc<FakeState>,
}

impl WarehouseConnection for FakeConnection {
    fn query(&mut self, sql: &str, _params: &[SqlParam]) -> Result<Vec<Row>, QueryError> {
        self.state.queries.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_queries.load(Ordering::SeqCst) {
            return Err(QueryError::new("warehouse unavailable")
                .with_diagnostics("08001", Some("connection refused".to_string())));
        }
        Ok(self.state.rows.lock().unwrap().get(sql).cloned().unwrap_or_default())
    }
}

impl ConnectionManager for FakeManager {
    type Connection = FakeConnection;

    fn connect(&self) -> Result<FakeConnection, QueryError> {
        if self.state.fail_connects.load(Ordering::SeqCst) {
            return Err(QueryError::new("authentication failed"));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConnection {
            state: Arc::clone(&self.state),
        })
    }

    fn describe(&self) -> String {
        "fake".to_string()
    }
}

/// Build a row from a JSON object literal
pub fn row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("row fixture must be an object, got {}", other),
    }
}
