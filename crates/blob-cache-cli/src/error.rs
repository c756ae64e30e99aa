//! Error types for the blob cache CLI

use std::fmt;

#[derive(Debug)]
pub enum CliError {
    Cache(file_blob_cache::BlobCacheError),
    Io(Box<std::io::Error>),
    Config(String),
    NotFound(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Cache(err) => write!(f, "Cache error: {}", err),
            CliError::Io(err) => write!(f, "IO error: {}", err),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::NotFound(name) => write!(f, "Not cached: {}", name),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Cache(err) => Some(err),
            CliError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<file_blob_cache::BlobCacheError> for CliError {
    fn from(err: file_blob_cache::BlobCacheError) -> Self {
        CliError::Cache(err)
    }
}

impl From<disk_lru_cache::DiskCacheError> for CliError {
    fn from(err: disk_lru_cache::DiskCacheError) -> Self {
        CliError::Cache(err.into())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Io(Box::new(err.into()))
    }
}

impl From<tracing_subscriber::filter::ParseError> for CliError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        CliError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = CliError::NotFound("https://example.com/a.png".to_string());
        assert_eq!(format!("{}", err), "Not cached: https://example.com/a.png");
    }

    #[test]
    fn test_config_error_display() {
        let err = CliError::Config("bad directive".to_string());
        assert_eq!(format!("{}", err), "Configuration error: bad directive");
    }

    #[test]
    fn test_disk_error_converts() {
        let err: CliError = disk_lru_cache::DiskCacheError::Closed.into();
        assert!(format!("{}", err).contains("Cache is closed"));
    }
}
