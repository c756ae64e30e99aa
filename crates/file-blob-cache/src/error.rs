//! Error types for the blob cache

use disk_lru_cache::DiskCacheError;
use std::fmt;

#[derive(Debug)]
pub enum BlobCacheError {
    Disk(DiskCacheError),
    Io(Box<std::io::Error>),
}

impl fmt::Display for BlobCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobCacheError::Disk(err) => write!(f, "Disk cache error: {}", err),
            BlobCacheError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for BlobCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BlobCacheError::Disk(err) => Some(err),
            BlobCacheError::Io(err) => Some(err.as_ref()),
        }
    }
}

impl From<DiskCacheError> for BlobCacheError {
    fn from(err: DiskCacheError) -> Self {
        BlobCacheError::Disk(err)
    }
}

impl From<std::io::Error> for BlobCacheError {
    fn from(err: std::io::Error) -> Self {
        BlobCacheError::Io(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, BlobCacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_error_display() {
        let err = BlobCacheError::Disk(DiskCacheError::Closed);
        assert_eq!(format!("{}", err), "Disk cache error: Cache is closed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: BlobCacheError = io.into();
        assert!(format!("{}", err).contains("disk full"));
    }
}
