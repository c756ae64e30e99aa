//! In-memory state of one cache key

use crate::error::{DiskCacheError, Result};
use std::path::{Path, PathBuf};

pub(crate) const MAX_KEY_LEN: usize = 120;

/// Identifies the editor that currently owns an entry.
pub(crate) type EditorId = u64;

/// Placeholder editor for a `DIRTY` record seen during journal replay.
pub(crate) const REPLAY_EDITOR: EditorId = 0;

pub(crate) fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .bytes()
            .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(DiskCacheError::InvalidKey(key.to_string()))
    }
}

#[derive(Debug)]
pub(crate) struct Entry {
    /// Committed length of each slot.
    pub lengths: Vec<u64>,
    pub clean_files: Vec<PathBuf>,
    pub dirty_files: Vec<PathBuf>,
    /// True once the entry has been committed at least once.
    pub readable: bool,
    /// Removed while still held; files go away with the last holder.
    pub zombie: bool,
    pub current_editor: Option<EditorId>,
    pub locking_snapshot_count: usize,
}

impl Entry {
    pub fn new(directory: &Path, key: &str, value_count: usize) -> Self {
        let clean_files = (0..value_count)
            .map(|i| directory.join(format!("{}.{}", key, i)))
            .collect();
        let dirty_files = (0..value_count)
            .map(|i| directory.join(format!("{}.{}.tmp", key, i)))
            .collect();
        Self {
            lengths: vec![0; value_count],
            clean_files,
            dirty_files,
            readable: false,
            zombie: false,
            current_editor: None,
            locking_snapshot_count: 0,
        }
    }

    pub fn total_length(&self) -> u64 {
        self.lengths.iter().sum()
    }
}
