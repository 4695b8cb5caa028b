// State Atlas - Web Server
// REST API with Axum over the pooled, cached warehouse executor

use anyhow::Result;
use state_atlas::logging::init_tracing;
use state_atlas::server::serve;
use state_atlas::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info,tower_http=info").ok();

    let config = AppConfig::from_env()?;
    tracing::info!(
        warehouse = %config.warehouse.path.display(),
        pool_min = config.pool.min_size,
        pool_max = config.pool.max_size,
        cache_ttl_secs = config.cache_ttl_secs,
        "starting state-atlas server"
    );

    serve(config).await
}
