//! reelcache server entry point.
//!
//! Loads configuration, opens the cache index, starts the periodic cleanup
//! cycle and serves the admin tools over MCP stdio. Logging goes to stderr to
//! avoid interfering with the JSON-RPC protocol on stdout.

use anyhow::{Context, Result};
use reelcache_core::{AppConfig, BlockingPool, CacheIndex, Janitor, Maintenance};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    config.ensure_dirs()?;

    tracing::info!(
        db_path = %config.db_path.display(),
        temp_dir = %config.temp_dir.display(),
        processed_dir = %config.processed_dir.display(),
        workers = config.worker_threads,
        "Starting reelcache server on stdio transport"
    );

    let pool = BlockingPool::new(config.worker_threads);
    let index = CacheIndex::open(&config.db_path, config.retention_policy(), pool.clone()).await?;
    let janitor = Janitor::new(&config.temp_dir, &config.processed_dir, pool)?;

    let cleanup = Maintenance::new(index.clone(), janitor.clone(), config.temp_max_age())
        .spawn_periodic(config.cleanup_interval());

    let handler = handler::ReelcacheServer::new(index, janitor, config.temp_max_age());
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;
    cleanup.abort();

    Ok(())
}
