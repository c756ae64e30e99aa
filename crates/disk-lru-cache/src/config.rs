use std::env;
use std::path::PathBuf;

/// Configuration for a [`crate::DiskLruCache`]
#[derive(Debug, Clone)]
pub struct DiskCacheConfig {
    /// Directory holding the journal and entry files. Owned exclusively by the cache.
    pub directory: PathBuf,
    /// Target upper bound for the total size of committed entries, in bytes
    pub max_size: u64,
    /// Stored in the journal header; changing it discards the cache on open
    pub app_version: u32,
    /// Number of value slots per entry
    pub value_count: usize,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./cache/blobs"),
            max_size: 250 * 1024 * 1024, // 250MB
            app_version: 1,
            value_count: 1,
        }
    }
}

impl DiskCacheConfig {
    pub fn new(directory: impl Into<PathBuf>, max_size: u64) -> Self {
        Self {
            directory: directory.into(),
            max_size,
            ..Self::default()
        }
    }

    pub fn with_value_count(mut self, value_count: usize) -> Self {
        self.value_count = value_count;
        self
    }

    pub fn with_app_version(mut self, app_version: u32) -> Self {
        self.app_version = app_version;
        self
    }

    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let directory = env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.directory);

        let max_size = env::var("MAX_CACHE_SIZE")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.max_size);

        let app_version = env::var("CACHE_APP_VERSION")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.app_version);

        Self {
            directory,
            max_size,
            app_version,
            value_count: defaults.value_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DiskCacheConfig::default();
        assert_eq!(config.directory, PathBuf::from("./cache/blobs"));
        assert_eq!(config.max_size, 250 * 1024 * 1024);
        assert_eq!(config.app_version, 1);
        assert_eq!(config.value_count, 1);
    }

    #[test]
    fn test_builder_methods() {
        let config = DiskCacheConfig::new("/tmp/c", 10)
            .with_value_count(3)
            .with_app_version(7);
        assert_eq!(config.directory, PathBuf::from("/tmp/c"));
        assert_eq!(config.max_size, 10);
        assert_eq!(config.value_count, 3);
        assert_eq!(config.app_version, 7);
    }
}
