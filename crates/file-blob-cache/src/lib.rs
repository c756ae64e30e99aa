//! Byte-array blob cache on top of [`disk_lru_cache`]
//!
//! Callers address blobs by arbitrary logical names (URLs, content ids). Each
//! name is hashed with SHA-256 into a key the disk cache accepts, and values
//! are read and written whole.

mod cache;
mod error;
mod types;

pub use cache::BlobCache;
pub use error::{BlobCacheError, Result};
pub use types::CacheStats;
