//! blob-cache - command line access to a blob cache directory
//!
//! Useful for seeding a cache, pulling a blob out of it, or checking its
//! size without running the service that owns it. The service must not have
//! the directory open at the same time.

mod cli;
mod commands;
mod error;

use crate::cli::Cli;
use crate::error::Result;
use clap::Parser;
use file_blob_cache::BlobCache;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging. Text logs go to stderr so stdout stays clean for blob output
    let env_filter = EnvFilter::from_default_env()
        .add_directive("blob_cache_cli=info".parse()?)
        .add_directive("disk_lru_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    };

    let cli = Cli::parse();
    let config = cli.config();
    info!("Cache dir: {:?}", config.directory);
    info!("Max cache size: {} MB", config.max_size / (1024 * 1024));

    let cache = BlobCache::open(config)?;
    let mut stdout = std::io::stdout().lock();
    let result = commands::run(&cache, cli.command, &mut stdout).await;

    // Final trim and journal compaction before exit
    cache.close()?;
    result
}
