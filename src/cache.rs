// Query Cache - read-through result cache keyed by (sql, params)
// Entries expire by age only; nothing is deleted per key

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::warehouse::{Row, SqlParam};

/// Results older than this are never served.
pub const DEFAULT_TTL_SECS: i64 = 5 * 60;

/// Time source, injected so tests can move time forward by hand
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Exact query text plus the JSON form of its bound parameters.
///
/// No normalization: `select 1` and `SELECT 1` are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(sql: &str, params: &[SqlParam]) -> Self {
        let params: Vec<serde_json::Value> = params.iter().map(key_value).collect();
        CacheKey(format!("{}-{}", sql, serde_json::Value::Array(params)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// JSON has no NaN or infinity, so those reals get an object form no scalar param can produce
fn key_value(param: &SqlParam) -> serde_json::Value {
    match param {
        SqlParam::Real(v) if !v.is_finite() => serde_json::json!({ "real": v.to_string() }),
        other => serde_json::to_value(other).unwrap_or(serde_json::Value::Null),
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    rows: Vec<Row>,
    fetched_at: DateTime<Utc>,
}

pub struct QueryCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl QueryCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cache with the default five minute TTL on the system clock
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::seconds(DEFAULT_TTL_SECS), Arc::new(SystemClock))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Rows for `key` if they were fetched less than one TTL ago
    pub fn get(&self, key: &CacheKey) -> Option<Vec<Row>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key)?;

        let age = self.clock.now() - entry.fetched_at;
        if age < self.ttl {
            Some(entry.rows.clone())
        } else {
            debug!(key = key.as_str(), age_secs = age.num_seconds(), "cache entry expired");
            None
        }
    }

    /// Store rows stamped with the current time, replacing any previous entry
    pub fn put(&self, key: CacheKey, rows: Vec<Row>) {
        let entry = CacheEntry {
            rows,
            fetched_at: self.clock.now(),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entry);
    }

    /// Drop every entry, returning how many were present
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let count = entries.len();
        entries.clear();
        count
    }

    /// Physically present entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::with_default_ttl()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;
    use serde_json::json;

    fn rows(state: &str) -> Vec<Row> {
        let mut row = Row::new();
        row.insert("STATE".to_string(), json!(state));
        vec![row]
    }

    fn cache_with_clock() -> (QueryCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cache = QueryCache::new(Duration::minutes(5), clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_key_includes_sql_and_params() {
        let key = CacheKey::new("SELECT * FROM TOURISM_DATA WHERE STATE = ?", &[SqlParam::from("goa")]);
        assert_eq!(key.as_str(), r#"SELECT * FROM TOURISM_DATA WHERE STATE = ?-["goa"]"#);
    }

    #[test]
    fn test_keys_are_not_normalized() {
        let a = CacheKey::new("SELECT 1", &[]);
        let b = CacheKey::new("select 1", &[]);
        let c = CacheKey::new("SELECT ?, ?", &[SqlParam::from(1i64), SqlParam::from(2i64)]);
        let d = CacheKey::new("SELECT ?, ?", &[SqlParam::from(2i64), SqlParam::from(1i64)]);

        assert_ne!(a, b);
        assert_ne!(c, d);
    }

    #[test]
    fn test_non_finite_reals_do_not_share_a_key_with_null() {
        let sql = "SELECT ?";
        let null = CacheKey::new(sql, &[SqlParam::Null]);
        let nan = CacheKey::new(sql, &[SqlParam::from(f64::NAN)]);
        let inf = CacheKey::new(sql, &[SqlParam::from(f64::INFINITY)]);
        let neg_inf = CacheKey::new(sql, &[SqlParam::from(f64::NEG_INFINITY)]);

        assert_eq!(null.as_str(), "SELECT ?-[null]");
        assert_eq!(nan.as_str(), r#"SELECT ?-[{"real":"NaN"}]"#);
        assert_ne!(nan, null);
        assert_ne!(inf, null);
        assert_ne!(inf, neg_inf);
        assert_ne!(nan, CacheKey::new(sql, &[SqlParam::from("NaN")]));
        assert_eq!(CacheKey::new(sql, &[SqlParam::from(1.5)]).as_str(), "SELECT ?-[1.5]");
    }

    #[test]
    fn test_fresh_entry_is_served() {
        let (cache, clock) = cache_with_clock();
        let key = CacheKey::new("SELECT * FROM TOURISM_DATA", &[]);

        cache.put(key.clone(), rows("kerala"));
        clock.advance(Duration::minutes(4));

        assert_eq!(cache.get(&key), Some(rows("kerala")));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let (cache, clock) = cache_with_clock();
        let key = CacheKey::new("SELECT * FROM TOURISM_DATA", &[]);

        cache.put(key.clone(), rows("kerala"));
        clock.advance(Duration::minutes(5));
        assert_eq!(cache.get(&key), None);

        clock.advance(Duration::milliseconds(1));
        assert_eq!(cache.get(&key), None);

        // Still physically present until overwritten or cleared
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_put_overwrites_and_restamps() {
        let (cache, clock) = cache_with_clock();
        let key = CacheKey::new("SELECT * FROM TOURISM_DATA", &[]);

        cache.put(key.clone(), rows("kerala"));
        clock.advance(Duration::minutes(6));
        cache.put(key.clone(), rows("goa"));

        assert_eq!(cache.get(&key), Some(rows("goa")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear_evicts_everything() {
        let (cache, _clock) = cache_with_clock();
        cache.put(CacheKey::new("SELECT 1", &[]), rows("a"));
        cache.put(CacheKey::new("SELECT 2", &[]), rows("b"));

        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.get(&CacheKey::new("SELECT 1", &[])), None);
    }
}
