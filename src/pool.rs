// Connection Pool - bounded set of warehouse connections
// A semaphore bounds how many are checked out; idle ones wait in a FIFO queue

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::retry::RetryPolicy;
use crate::warehouse::{ConnectionManager, QueryError, Row, SqlParam, WarehouseConnection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 10,
            idle_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no warehouse connection became available within {waited:?}")]
    Exhausted { waited: Duration },

    #[error("could not open warehouse connection: {0}")]
    Connect(#[source] QueryError),

    #[error("connection pool is closed")]
    Closed,
}

/// Point-in-time accounting, mostly for health checks and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    pub max_size: usize,
    pub live: usize,
    pub idle: usize,
    pub in_use: usize,
    pub acquired: u64,
    pub released: u64,
}

struct IdleConnection<C> {
    conn: C,
    since: Instant,
}

struct PoolInner<M: ConnectionManager> {
    manager: M,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConnection<M::Connection>>>,
    live: AtomicUsize,
    acquired: AtomicU64,
    released: AtomicU64,
}

impl<M: ConnectionManager> PoolInner<M> {
    fn idle_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<IdleConnection<M::Connection>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Oldest idle connection still worth keeping; stale ones above min_size are closed
    fn take_idle(&self) -> Option<M::Connection> {
        let mut idle = self.idle_queue();
        while let Some(entry) = idle.pop_front() {
            let stale = entry.since.elapsed() > self.config.idle_timeout;
            if stale && self.live.load(Ordering::SeqCst) > self.config.min_size {
                self.live.fetch_sub(1, Ordering::SeqCst);
                debug!(idle_for = ?entry.since.elapsed(), "closing idle warehouse connection");
                continue;
            }
            return Some(entry.conn);
        }
        None
    }

    fn put_back(&self, conn: M::Connection) {
        self.idle_queue().push_back(IdleConnection {
            conn,
            since: Instant::now(),
        });
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Pool<M: ConnectionManager> {
    inner: Arc<PoolInner<M>>,
}

impl<M: ConnectionManager> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ConnectionManager> Pool<M> {
    pub fn new(manager: M, config: PoolConfig) -> Self {
        let max_size = config.max_size.max(1);
        Self {
            inner: Arc::new(PoolInner {
                manager,
                config: PoolConfig { max_size, ..config },
                permits: Arc::new(Semaphore::new(max_size)),
                idle: Mutex::new(VecDeque::new()),
                live: AtomicUsize::new(0),
                acquired: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn manager(&self) -> &M {
        &self.inner.manager
    }

    /// Check out a connection, waiting up to `acquire_timeout` for a free slot.
    pub async fn acquire(&self) -> Result<PooledConnection<M>, PoolError> {
        let waited = self.inner.config.acquire_timeout;
        let permit = tokio::time::timeout(waited, Arc::clone(&self.inner.permits).acquire_owned())
            .await
            .map_err(|_| PoolError::Exhausted { waited })?
            .map_err(|_| PoolError::Closed)?;

        let conn = match self.inner.take_idle() {
            Some(conn) => conn,
            None => self.open().await?,
        };

        self.inner.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Open `min_size` connections up front so the first request does not pay for them
    pub async fn warm_up(&self, retry: RetryPolicy) -> Result<(), PoolError> {
        let target = self.inner.config.min_size.min(self.inner.config.max_size);
        let mut opened = Vec::with_capacity(target);

        for _ in 0..target {
            let conn = retry.run("warehouse connect", || self.acquire()).await?;
            opened.push(conn);
        }
        for conn in opened {
            conn.release();
        }

        info!(
            connections = target,
            warehouse = %self.inner.manager.describe(),
            "connection pool warmed up"
        );
        Ok(())
    }

    pub fn status(&self) -> PoolStatus {
        let idle = self.inner.idle_queue().len();
        let live = self.inner.live.load(Ordering::SeqCst);
        PoolStatus {
            max_size: self.inner.config.max_size,
            live,
            idle,
            in_use: live.saturating_sub(idle),
            acquired: self.inner.acquired.load(Ordering::SeqCst),
            released: self.inner.released.load(Ordering::SeqCst),
        }
    }

    async fn open(&self) -> Result<M::Connection, PoolError> {
        let inner = Arc::clone(&self.inner);
        let conn = tokio::task::spawn_blocking(move || inner.manager.connect())
            .await
            .map_err(|e| PoolError::Connect(QueryError::new(format!("connect task failed: {}", e))))?
            .map_err(|e| {
                warn!(error = %e, "warehouse connect failed");
                PoolError::Connect(e)
            })?;

        let live = self.inner.live.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(live, "opened warehouse connection");
        Ok(conn)
    }
}

/// A checked-out connection.
///
/// Goes back to the pool exactly once: through `release`, or on drop if the
/// holder bails out early (error, panic, cancelled task).
pub struct PooledConnection<M: ConnectionManager> {
    conn: Option<M::Connection>,
    pool: Arc<PoolInner<M>>,
    _permit: OwnedSemaphorePermit,
}

impl<M: ConnectionManager> PooledConnection<M> {
    pub fn query(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>, QueryError> {
        match self.conn.as_mut() {
            Some(conn) => conn.query(sql, params),
            None => Err(QueryError::new("connection already released")),
        }
    }

    pub fn release(mut self) {
        self.return_to_pool();
    }

    fn return_to_pool(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_back(conn);
        }
    }
}

impl<M: ConnectionManager> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        // Permit is dropped after this runs, so the slot frees only once the connection is queued
        self.return_to_pool();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeManager;

    fn config(min_size: usize, max_size: usize) -> PoolConfig {
        PoolConfig {
            min_size,
            max_size,
            idle_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_reuses_released_connection() {
        let manager = FakeManager::default();
        let pool = Pool::new(manager.clone(), config(1, 4));

        pool.acquire().await.unwrap().release();
        pool.acquire().await.unwrap().release();

        assert_eq!(manager.connects(), 1);
        let status = pool.status();
        assert_eq!(status.acquired, 2);
        assert_eq!(status.released, 2);
        assert_eq!(status.in_use, 0);
        assert_eq!(status.idle, 1);
    }

    #[tokio::test]
    async fn test_concurrent_holders_get_distinct_connections() {
        let manager = FakeManager::default();
        let pool = Pool::new(manager.clone(), config(1, 3));

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_eq!(manager.connects(), 2);
        assert_eq!(pool.status().in_use, 2);

        a.release();
        b.release();
        assert_eq!(pool.status().idle, 2);
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_exhausted() {
        let pool = Pool::new(FakeManager::default(), config(1, 1));

        let held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.err().unwrap();
        assert!(matches!(err, PoolError::Exhausted { .. }));

        held.release();
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_gets_connection_once_released() {
        let pool = Pool::new(
            FakeManager::default(),
            PoolConfig {
                acquire_timeout: Duration::from_secs(5),
                ..config(1, 1)
            },
        );

        let held = pool.acquire().await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|c| c.release()) })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        held.release();

        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(pool.status().acquired, 2);
    }

    #[tokio::test]
    async fn test_drop_releases_connection() {
        let pool = Pool::new(FakeManager::default(), config(1, 1));

        {
            let _conn = pool.acquire().await.unwrap();
        }

        let status = pool.status();
        assert_eq!(status.acquired, status.released);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_failure_frees_slot() {
        let manager = FakeManager::default();
        let pool = Pool::new(manager.clone(), config(1, 1));

        manager.fail_connects(true);
        assert!(matches!(pool.acquire().await, Err(PoolError::Connect(_))));

        manager.fail_connects(false);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_stale_idle_connection_closed_above_min() {
        let manager = FakeManager::default();
        let pool = Pool::new(
            manager.clone(),
            PoolConfig {
                idle_timeout: Duration::from_millis(5),
                ..config(1, 4)
            },
        );

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        a.release();
        b.release();
        assert_eq!(pool.status().live, 2);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let c = pool.acquire().await.unwrap();

        // One stale connection closed, the other kept to honour min_size
        assert_eq!(pool.status().live, 1);
        assert_eq!(manager.connects(), 2);
        c.release();
    }

    #[tokio::test]
    async fn test_warm_up_opens_min_connections() {
        let manager = FakeManager::default();
        let pool = Pool::new(manager.clone(), config(2, 4));

        pool.warm_up(RetryPolicy::none()).await.unwrap();

        assert_eq!(manager.connects(), 2);
        let status = pool.status();
        assert_eq!(status.idle, 2);
        assert_eq!(status.acquired, status.released);
    }

    #[tokio::test]
    async fn test_warm_up_surfaces_connect_error() {
        let manager = FakeManager::default();
        manager.fail_connects(true);
        let pool = Pool::new(manager, config(1, 2));

        let err = pool
            .warm_up(RetryPolicy::new(2, Duration::from_millis(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::Connect(_)));
    }
}
