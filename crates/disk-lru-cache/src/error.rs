//! Error types for the disk cache engine

use std::fmt;

#[derive(Debug)]
pub enum DiskCacheError {
    /// The cache was closed before the operation.
    Closed,
    /// Keys must match `[a-z0-9_-]{1,120}`.
    InvalidKey(String),
    /// The journal could not be parsed.
    CorruptJournal(String),
    Io(Box<std::io::Error>),
}

/// How the engine reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Discard the cache directory and start from an empty journal.
    Rebuild,
    /// Keep running with reduced functionality and record a sticky flag.
    Degrade,
    /// Caller bug; hand the error back.
    Propagate,
}

impl DiskCacheError {
    pub fn recovery(&self) -> Recovery {
        match self {
            DiskCacheError::CorruptJournal(_) => Recovery::Rebuild,
            DiskCacheError::Io(_) => Recovery::Degrade,
            DiskCacheError::Closed | DiskCacheError::InvalidKey(_) => Recovery::Propagate,
        }
    }
}

impl fmt::Display for DiskCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskCacheError::Closed => write!(f, "Cache is closed"),
            DiskCacheError::InvalidKey(key) => {
                write!(f, "Invalid key: keys must match [a-z0-9_-]{{1,120}}: \"{}\"", key)
            }
            DiskCacheError::CorruptJournal(msg) => write!(f, "Corrupt journal: {}", msg),
            DiskCacheError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for DiskCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiskCacheError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DiskCacheError {
    fn from(err: std::io::Error) -> Self {
        DiskCacheError::Io(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, DiskCacheError>;
