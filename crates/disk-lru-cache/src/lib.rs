//! Journaled, size-bounded LRU cache of files on local disk
//!
//! Stores opaque byte values under string keys in a single directory. A
//! write-ahead journal records every edit, commit and removal, so the cache
//! can be reopened after a crash without serving half-written data or
//! leaking files. Least recently used entries are evicted once the total size
//! exceeds the configured limit.

mod cache;
mod cleanup;
mod config;
mod engine;
mod entry;
mod error;
pub mod fs;
mod journal;

pub use cache::{DiskLruCache, Editor, Snapshot};
pub use config::DiskCacheConfig;
pub use error::{DiskCacheError, Recovery, Result};
pub use fs::{FileSystem, LocalFileSystem};
pub use journal::{JOURNAL_FILE, JOURNAL_FILE_BACKUP, JOURNAL_FILE_TMP};
