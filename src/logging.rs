// Logging - tracing subscriber shared by the CLI and the server

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Compact console logging; RUST_LOG overrides `default_filter`
pub fn init_tracing(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow!(err))
}
