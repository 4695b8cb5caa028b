use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;

// Use library instead of local modules
use state_atlas::dashboard::{table_report, tourism_state_counts};
use state_atlas::logging::init_tracing;
use state_atlas::{setup_database, AppConfig, Pool, QueryCache, QueryExecutor, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("warn").ok();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("setup") => run_setup()?,
        Some("check") => run_check().await?,
        _ => {
            print_usage();
            std::process::exit(2);
        }
    }

    Ok(())
}

fn print_usage() {
    eprintln!("state-atlas {}", state_atlas::VERSION);
    eprintln!();
    eprintln!("Usage: state-atlas <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  setup   Create the warehouse tables (WAL mode)");
    eprintln!("  check   Show row counts and sample rows");
    eprintln!();
    eprintln!("The warehouse file is read from ATLAS_WAREHOUSE_PATH (.env is honoured).");
}

fn run_setup() -> Result<()> {
    let config = AppConfig::from_env()?;
    let path = &config.warehouse.path;

    println!("🗄️  Warehouse setup");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = Connection::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    setup_database(&conn).context("Failed to create tables")?;

    println!("✓ Tables ready in {}", path.display());
    Ok(())
}

async fn run_check() -> Result<()> {
    let config = AppConfig::from_env()?;

    println!("🔍 Warehouse check: {}", config.warehouse.path.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let pool = Pool::new(config.warehouse.manager(), config.pool);
    pool.warm_up(config.retry_policy())
        .await
        .context("Failed to connect to warehouse")?;
    println!("✓ Connected");

    let cache = Arc::new(QueryCache::new(config.cache_ttl(), Arc::new(SystemClock)));
    let executor = QueryExecutor::new(pool, cache);

    let report = table_report(&executor).await?;
    for (table, summary) in [
        ("ART_CULTURE_FINANCIAL_DATA", &report.financial),
        ("TOURISM_DATA", &report.tourism),
    ] {
        println!("\n📊 {}: {} rows", table, summary.count);
        if let Some(sample) = &summary.sample {
            println!("   Sample: {}", serde_json::to_string(sample)?);
        }
    }

    println!("\n🗺️  Tourism rows per state:");
    let counts = tourism_state_counts(&executor).await?;
    if counts.is_empty() {
        println!("   (none)");
    }
    for count in counts {
        let marker = if count.rows > 1 { "  ⚠ duplicate" } else { "" };
        println!("   {:<45} {}{}", count.state, count.rows, marker);
    }

    Ok(())
}
