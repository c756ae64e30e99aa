//! Subcommand execution

use crate::cli::Command;
use crate::error::{CliError, Result};
use file_blob_cache::BlobCache;
use std::io::Write;
use tracing::info;

/// Run one subcommand, writing its output to `out`
pub async fn run(cache: &BlobCache, command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Put { name, file } => {
            let data = tokio::fs::read(&file).await?;
            match cache.save(&name, &data).await? {
                Some(path) => {
                    info!(name = %name, size = data.len(), "Stored blob");
                    writeln!(out, "{}", path.display())?;
                }
                None => writeln!(out, "busy: {} is being written", name)?,
            }
        }
        Command::Get { name, out: target } => {
            let data = cache
                .load(&name)
                .await
                .ok_or_else(|| CliError::NotFound(name.clone()))?;
            match target {
                Some(path) => tokio::fs::write(path, &data).await?,
                None => out.write_all(&data)?,
            }
        }
        Command::Path { name } => {
            let path = cache.path(&name).ok_or(CliError::NotFound(name))?;
            writeln!(out, "{}", path.display())?;
        }
        Command::Remove { name } => {
            let removed = cache.remove(&name)?;
            writeln!(out, "{}", if removed { "removed" } else { "absent" })?;
        }
        Command::Clear => {
            cache.clear()?;
            writeln!(out, "cleared")?;
        }
        Command::Stats => {
            serde_json::to_writer_pretty(&mut *out, &cache.stats())?;
            writeln!(out)?;
        }
    }
    Ok(())
}
