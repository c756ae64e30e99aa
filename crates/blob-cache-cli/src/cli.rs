//! Command line arguments

use clap::{Parser, Subcommand};
use disk_lru_cache::DiskCacheConfig;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "blob-cache", about = "Inspect and populate a blob cache directory")]
pub struct Cli {
    /// Cache directory (defaults to CACHE_DIR or ./cache/blobs)
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Maximum cache size in bytes (defaults to MAX_CACHE_SIZE or 250MB)
    #[arg(long, global = true)]
    pub max_size: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the contents of a file under a name
    Put { name: String, file: PathBuf },
    /// Print the bytes stored under a name
    Get {
        name: String,
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the path of the cached file for a name
    Path { name: String },
    /// Remove a name from the cache
    Remove { name: String },
    /// Remove everything
    Clear,
    /// Print cache statistics as JSON
    Stats,
}

impl Cli {
    /// Environment configuration with command line overrides applied
    pub fn config(&self) -> DiskCacheConfig {
        let mut config = DiskCacheConfig::from_env();
        if let Some(dir) = &self.cache_dir {
            config.directory = dir.clone();
        }
        if let Some(max_size) = self.max_size {
            config.max_size = max_size;
        }
        config
    }
}
