// State Atlas - Core Library
// Art, culture and tourism statistics for Indian states, served from a warehouse
// through a pooled, cached query executor

pub mod cache;
pub mod categorizer;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod executor;
pub mod logging;
pub mod pool;
pub mod records;
pub mod retry;
pub mod states;
pub mod warehouse;

#[cfg(feature = "server")]
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use cache::{CacheKey, Clock, QueryCache, SystemClock};
pub use categorizer::{
    categorize, category_statistics, state_statistics, CategorizedData, Category, CategoryStatistics,
    CategorySummary, StateBucket, StateFlags, StateMap,
};
pub use config::{AppConfig, ConfigError, WarehouseConfig};
pub use dashboard::{DashboardError, Overview, StateData, TableReport};
pub use db::{setup_database, SqliteManager};
pub use executor::{ExecuteError, QueryExecutor};
pub use pool::{Pool, PoolConfig, PoolError, PoolStatus, PooledConnection};
pub use records::{FinancialRecord, RecordError, TourismRecord};
pub use retry::RetryPolicy;
pub use states::{is_valid_state, state_key, STATES};
pub use warehouse::{ConnectionManager, QueryError, Row, SqlParam, WarehouseConnection};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
