// Query Executor - the one entry point for running warehouse queries
// Order per call: cache lookup, then pool acquire, query, release, cache store

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::cache::{CacheKey, QueryCache};
use crate::pool::{Pool, PoolError, PoolStatus};
use crate::warehouse::{ConnectionManager, QueryError, Row, SqlParam};

/// Everything that can go wrong inside `execute`, tagged with the query that failed
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("could not run `{sql}` with params {params:?}: {source}")]
    Pool {
        sql: String,
        params: Vec<SqlParam>,
        #[source]
        source: PoolError,
    },

    #[error("query `{sql}` with params {params:?} failed: {source}")]
    Query {
        sql: String,
        params: Vec<SqlParam>,
        #[source]
        source: QueryError,
    },

    #[error("query `{sql}` with params {params:?} was aborted: {reason}")]
    Aborted {
        sql: String,
        params: Vec<SqlParam>,
        reason: String,
    },
}

impl ExecuteError {
    pub fn sql(&self) -> &str {
        match self {
            ExecuteError::Pool { sql, .. }
            | ExecuteError::Query { sql, .. }
            | ExecuteError::Aborted { sql, .. } => sql,
        }
    }

    /// Warehouse-native diagnostics, when the warehouse produced the error
    pub fn query_error(&self) -> Option<&QueryError> {
        match self {
            ExecuteError::Query { source, .. } => Some(source),
            ExecuteError::Pool {
                source: PoolError::Connect(source),
                ..
            } => Some(source),
            _ => None,
        }
    }

    pub fn sql_state(&self) -> Option<&str> {
        self.query_error().and_then(|e| e.sql_state.as_deref())
    }

    pub fn sql_message(&self) -> Option<&str> {
        self.query_error().and_then(|e| e.sql_message.as_deref())
    }
}

pub struct QueryExecutor<M: ConnectionManager> {
    pool: Pool<M>,
    cache: Arc<QueryCache>,
}

impl<M: ConnectionManager> Clone for QueryExecutor<M> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<M: ConnectionManager> QueryExecutor<M> {
    pub fn new(pool: Pool<M>, cache: Arc<QueryCache>) -> Self {
        Self { pool, cache }
    }

    pub fn pool(&self) -> &Pool<M> {
        &self.pool
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Run `sql` with `params`, serving and filling the cache when `use_cache` is set.
    ///
    /// A cache hit never touches the pool. On a miss the connection is
    /// released before this returns, whether the query succeeded or not, and
    /// only successful results are cached. Zero rows is `Ok(vec![])`.
    pub async fn execute(&self, sql: &str, params: &[SqlParam], use_cache: bool) -> Result<Vec<Row>, ExecuteError> {
        let key = use_cache.then(|| CacheKey::new(sql, params));

        if let Some(key) = &key {
            if let Some(rows) = self.cache.get(key) {
                debug!(sql, rows = rows.len(), "returning cached result");
                return Ok(rows);
            }
        }

        debug!(sql, ?params, "executing query");

        let mut conn = self.pool.acquire().await.map_err(|source| ExecuteError::Pool {
            sql: sql.to_string(),
            params: params.to_vec(),
            source,
        })?;

        let task_sql = sql.to_string();
        let task_params = params.to_vec();
        let outcome = tokio::task::spawn_blocking(move || {
            let result = conn.query(&task_sql, &task_params);
            conn.release();
            result
        })
        .await;

        let rows = match outcome {
            Ok(Ok(rows)) => rows,
            Ok(Err(source)) => {
                debug!(sql, error = %source, "query failed");
                return Err(ExecuteError::Query {
                    sql: sql.to_string(),
                    params: params.to_vec(),
                    source,
                });
            }
            // The guard was dropped while unwinding, which already released the connection
            Err(join_err) => {
                return Err(ExecuteError::Aborted {
                    sql: sql.to_string(),
                    params: params.to_vec(),
                    reason: join_err.to_string(),
                })
            }
        };

        debug!(sql, rows = rows.len(), "query executed");

        if let Some(key) = key {
            self.cache.put(key, rows.clone());
        }

        Ok(rows)
    }

    /// Drop every cached result
    pub fn clear_cache(&self) -> usize {
        let cleared = self.cache.clear();
        tracing::info!(cleared, "query cache cleared");
        cleared
    }
}
