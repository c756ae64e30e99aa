//! Entry table, journal replay and the edit/commit state machine
//!
//! Everything here runs with the cache lock held. Payload bytes are never read
//! or written in this module; callers write into dirty files outside the lock.

use crate::config::DiskCacheConfig;
use crate::entry::{validate_key, EditorId, Entry, REPLAY_EDITOR};
use crate::error::{DiskCacheError, Recovery, Result};
use crate::fs::FileSystem;
use crate::journal::{
    write_header, JournalReader, JournalWriter, Record, JOURNAL_FILE, JOURNAL_FILE_BACKUP,
    JOURNAL_FILE_TMP,
};
use lru::LruCache;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Journal operations tolerated before the journal is compacted.
pub(crate) const REDUNDANT_OP_COMPACT_THRESHOLD: usize = 2000;

/// Handed to a new editor.
pub(crate) struct EditGrant {
    pub id: EditorId,
    pub dirty_files: Vec<PathBuf>,
}

enum SnapshotOpen {
    Opened(Vec<PathBuf>),
    Unavailable,
    Damaged,
}

pub(crate) struct Engine {
    fs: Arc<dyn FileSystem>,
    directory: PathBuf,
    journal_file: PathBuf,
    journal_file_tmp: PathBuf,
    journal_file_backup: PathBuf,
    max_size: u64,
    app_version: u32,
    value_count: usize,
    /// Iteration runs from most to least recently used.
    entries: LruCache<String, Entry>,
    size: u64,
    operations_since_rewrite: usize,
    journal: Option<JournalWriter>,
    closed: bool,
    most_recent_trim_failed: bool,
    most_recent_rebuild_failed: bool,
    next_editor_id: EditorId,
    cleanup_requested: bool,
}

impl Engine {
    /// Build the entry table from whatever is in the cache directory.
    pub fn open(fs: Arc<dyn FileSystem>, config: &DiskCacheConfig) -> Result<Self> {
        assert!(config.value_count > 0, "value_count must be at least 1");
        fs.create_dir_all(&config.directory)?;

        let directory = config.directory.clone();
        let mut engine = Self {
            fs,
            journal_file: directory.join(JOURNAL_FILE),
            journal_file_tmp: directory.join(JOURNAL_FILE_TMP),
            journal_file_backup: directory.join(JOURNAL_FILE_BACKUP),
            directory,
            max_size: config.max_size,
            app_version: config.app_version,
            value_count: config.value_count,
            entries: LruCache::unbounded(),
            size: 0,
            operations_since_rewrite: 0,
            journal: None,
            closed: false,
            most_recent_trim_failed: false,
            most_recent_rebuild_failed: false,
            next_editor_id: REPLAY_EDITOR + 1,
            cleanup_requested: false,
        };
        engine.initialize()?;
        Ok(engine)
    }

    fn initialize(&mut self) -> Result<()> {
        self.fs.delete(&self.journal_file_tmp)?;

        // A backup without a journal means a rewrite crashed mid-swap.
        if self.fs.exists(&self.journal_file_backup) {
            if self.fs.exists(&self.journal_file) {
                self.fs.delete(&self.journal_file_backup)?;
            } else {
                info!(directory = ?self.directory, "Restoring journal from backup");
                self.fs
                    .atomic_move(&self.journal_file_backup, &self.journal_file)?;
            }
        }

        if self.fs.exists(&self.journal_file) {
            match self.replay() {
                Ok(()) => {
                    info!(
                        directory = ?self.directory,
                        entries = self.entries.len(),
                        size = self.size,
                        "Disk cache opened"
                    );
                    if self.journal_rewrite_required() {
                        self.rewrite_or_degrade();
                    }
                    return Ok(());
                }
                Err(e) if e.recovery() == Recovery::Propagate => return Err(e),
                Err(e) => {
                    warn!(
                        directory = ?self.directory,
                        error = %e,
                        "Journal unusable, discarding cache contents"
                    );
                    self.journal = None;
                    self.entries.clear();
                    self.size = 0;
                    self.fs.delete_contents(&self.directory)?;
                }
            }
        }

        self.write_journal()?;
        info!(directory = ?self.directory, "Disk cache created");
        Ok(())
    }

    fn replay(&mut self) -> Result<()> {
        let reader = self.fs.reader(&self.journal_file)?;
        let mut journal = JournalReader::open(reader, self.app_version, self.value_count)?;
        while let Some(record) = journal.next_record()? {
            self.apply_record(record);
        }
        self.operations_since_rewrite = journal.line_count().saturating_sub(self.entries.len());

        // A torn last line must not have more records appended after it.
        if journal.truncated() {
            warn!("Journal ends with a partial line, rewriting");
            self.write_journal()?;
        } else {
            self.journal = Some(JournalWriter::new(
                self.fs.appending_writer(&self.journal_file)?,
            ));
        }

        self.prune_incomplete_edits()
    }

    fn apply_record(&mut self, record: Record) {
        let key = match &record {
            Record::Remove { key } => {
                self.entries.pop(key);
                return;
            }
            Record::Read { key } if !self.entries.contains(key) => return,
            other => other.key().to_string(),
        };
        if !self.entries.contains(&key) {
            let entry = Entry::new(&self.directory, &key, self.value_count);
            self.entries.put(key.clone(), entry);
        }
        let Some(entry) = self.entries.get_mut(&key) else {
            return;
        };
        match record {
            Record::Clean { lengths, .. } => {
                entry.readable = true;
                entry.current_editor = None;
                entry.lengths = lengths;
            }
            Record::Dirty { .. } => entry.current_editor = Some(REPLAY_EDITOR),
            Record::Read { .. } | Record::Remove { .. } => {}
        }
    }

    /// Drop entries whose last edit never completed and total up the rest.
    fn prune_incomplete_edits(&mut self) -> Result<()> {
        let incomplete: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.current_editor.is_some())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &incomplete {
            if let Some(entry) = self.entries.pop(key) {
                for file in entry.clean_files.iter().chain(entry.dirty_files.iter()) {
                    self.fs.delete(file)?;
                }
                debug!(key = %key, "Discarded incomplete edit");
            }
        }

        self.size = self.entries.iter().map(|(_, e)| e.total_length()).sum();
        Ok(())
    }

    /// Replace the journal with a compact one describing the current table.
    fn write_journal(&mut self) -> Result<()> {
        if let Some(mut journal) = self.journal.take() {
            let _ = journal.flush();
        }

        {
            let mut out = BufWriter::new(self.fs.truncating_writer(&self.journal_file_tmp)?);
            write_header(&mut out, self.app_version, self.value_count)?;
            for (key, entry) in self.entries.iter().rev() {
                let record = if entry.readable && !entry.zombie && entry.current_editor.is_none()
                {
                    Record::Clean {
                        key: key.clone(),
                        lengths: entry.lengths.clone(),
                    }
                } else {
                    Record::Dirty { key: key.clone() }
                };
                writeln!(out, "{}", record)?;
            }
            out.flush()?;
        }

        if self.fs.exists(&self.journal_file) {
            self.fs
                .atomic_move(&self.journal_file, &self.journal_file_backup)?;
            self.fs
                .atomic_move(&self.journal_file_tmp, &self.journal_file)?;
            self.fs.delete(&self.journal_file_backup)?;
        } else {
            self.fs
                .atomic_move(&self.journal_file_tmp, &self.journal_file)?;
        }

        self.journal = Some(JournalWriter::new(
            self.fs.appending_writer(&self.journal_file)?,
        ));
        self.operations_since_rewrite = 0;
        self.most_recent_rebuild_failed = false;
        info!(entries = self.entries.len(), "Rewrote journal");
        Ok(())
    }

    fn rewrite_or_degrade(&mut self) {
        if let Err(e) = self.write_journal() {
            warn!(error = %e, "Journal rewrite failed, journaling suspended");
            self.most_recent_rebuild_failed = true;
            self.journal = Some(JournalWriter::discard());
        }
    }

    fn journal_rewrite_required(&self) -> bool {
        self.operations_since_rewrite >= REDUNDANT_OP_COMPACT_THRESHOLD
    }

    fn append(&mut self, record: Record) {
        if let Some(journal) = self.journal.as_mut() {
            journal.append(&record);
        }
    }

    fn has_journal_errors(&self) -> bool {
        self.journal.as_ref().is_some_and(|j| j.has_errors())
    }

    fn check_open(&self, key: &str) -> Result<()> {
        if self.closed {
            return Err(DiskCacheError::Closed);
        }
        validate_key(key)
    }

    /// Whether an operation since the last call asked for cleanup.
    pub fn take_cleanup_request(&mut self) -> bool {
        std::mem::take(&mut self.cleanup_requested)
    }

    pub fn get(&mut self, key: &str) -> Result<Option<Vec<PathBuf>>> {
        self.check_open(key)?;

        let opened = match self.entries.get_mut(key) {
            Some(entry) => open_snapshot(self.fs.as_ref(), entry),
            None => return Ok(None),
        };

        match opened {
            SnapshotOpen::Opened(files) => {
                self.operations_since_rewrite += 1;
                self.append(Record::Read {
                    key: key.to_string(),
                });
                if self.journal_rewrite_required() {
                    self.cleanup_requested = true;
                }
                debug!(key, "Cache hit");
                Ok(Some(files))
            }
            SnapshotOpen::Unavailable => Ok(None),
            SnapshotOpen::Damaged => {
                warn!(key, "Entry files missing or resized, removing entry");
                if let Err(e) = self.remove_entry(key) {
                    warn!(key, error = %e, "Failed to remove damaged entry");
                }
                Ok(None)
            }
        }
    }

    pub fn edit(&mut self, key: &str) -> Result<Option<EditGrant>> {
        self.check_open(key)?;

        if let Some(entry) = self.entries.get_mut(key) {
            if entry.current_editor.is_some() {
                return Ok(None);
            }
            // Never write under a reader.
            if entry.locking_snapshot_count != 0 {
                return Ok(None);
            }
        }

        if self.most_recent_trim_failed || self.most_recent_rebuild_failed {
            debug!(key, "Declining edit until cleanup succeeds");
            self.cleanup_requested = true;
            return Ok(None);
        }

        self.append(Record::Dirty {
            key: key.to_string(),
        });
        if self.has_journal_errors() {
            return Ok(None);
        }

        if !self.entries.contains(key) {
            let entry = Entry::new(&self.directory, key, self.value_count);
            self.entries.put(key.to_string(), entry);
        }
        let id = self.next_editor_id;
        self.next_editor_id += 1;

        match self.entries.peek_mut(key) {
            Some(entry) => {
                entry.current_editor = Some(id);
                Ok(Some(EditGrant {
                    id,
                    dirty_files: entry.dirty_files.clone(),
                }))
            }
            None => Ok(None),
        }
    }

    /// Resolve an edit. `success` commits the written slots, otherwise the
    /// dirty files are discarded.
    pub fn complete_edit(
        &mut self,
        key: &str,
        editor: EditorId,
        written: &[bool],
        success: bool,
    ) -> Result<()> {
        let fs = self.fs.clone();
        let Some(entry) = self.entries.peek_mut(key) else {
            return Ok(());
        };
        if entry.current_editor != Some(editor) {
            return Ok(());
        }

        let mut committed = success && !entry.zombie;
        if committed {
            let missing = (0..written.len())
                .find(|&i| written[i] && !fs.exists(&entry.dirty_files[i]));
            if let Some(slot) = missing {
                warn!(key, slot, "Dirty file missing at commit, aborting edit");
                committed = false;
            }
        }

        let mut failure = None;
        if committed {
            for (dirty, clean) in entry.dirty_files.iter().zip(entry.clean_files.iter()) {
                let moved = if fs.exists(dirty) {
                    fs.atomic_move(dirty, clean)
                } else {
                    fs.create_file(clean)
                };
                if let Err(e) = moved {
                    warn!(key, error = %e, "Failed to publish dirty file");
                    failure = Some(e);
                    committed = false;
                    break;
                }
            }
        }

        if committed {
            let old_length = entry.total_length();
            for (length, clean) in entry.lengths.iter_mut().zip(entry.clean_files.iter()) {
                *length = fs.size(clean).unwrap_or(0);
            }
            self.size = self.size - old_length + entry.total_length();
        } else {
            for dirty in &entry.dirty_files {
                if let Err(e) = fs.delete(dirty) {
                    warn!(key, error = %e, "Failed to delete dirty file");
                }
            }
        }

        entry.current_editor = None;

        if entry.zombie {
            if let Err(e) = self.remove_entry(key) {
                warn!(key, error = %e, "Failed to remove zombie entry");
            }
        } else {
            let record = if committed || entry.readable {
                entry.readable = true;
                Record::Clean {
                    key: key.to_string(),
                    lengths: entry.lengths.clone(),
                }
            } else {
                Record::Remove {
                    key: key.to_string(),
                }
            };
            if matches!(record, Record::Remove { .. }) {
                self.entries.pop(key);
            }
            self.operations_since_rewrite += 1;
            self.append(record);

            if committed {
                self.entries.promote(key);
                debug!(key, size = self.size, "Committed edit");
            } else {
                debug!(key, "Aborted edit");
            }
            if self.size > self.max_size || self.journal_rewrite_required() {
                self.cleanup_requested = true;
            }
        }

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    pub fn remove(&mut self, key: &str) -> Result<bool> {
        self.check_open(key)?;
        if !self.entries.contains(key) {
            return Ok(false);
        }
        let removed = self.remove_entry(key)?;
        if removed && self.size <= self.max_size {
            self.most_recent_trim_failed = false;
        }
        Ok(removed)
    }

    /// Delete an entry, or mark it a zombie while something still holds it.
    fn remove_entry(&mut self, key: &str) -> Result<bool> {
        let fs = self.fs.clone();
        let Some(entry) = self.entries.peek_mut(key) else {
            return Ok(false);
        };

        // Readers may outlive this process; a crash must not resurrect the entry.
        if entry.locking_snapshot_count > 0 {
            if let Some(journal) = self.journal.as_mut() {
                journal.append(&Record::Dirty {
                    key: key.to_string(),
                });
            }
        }

        if entry.locking_snapshot_count > 0 || entry.current_editor.is_some() {
            if !entry.zombie {
                self.size -= entry.total_length();
                entry.lengths.iter_mut().for_each(|l| *l = 0);
                entry.zombie = true;
                debug!(key, "Entry in use, deferring removal");
            }
            return Ok(true);
        }

        for file in entry.clean_files.iter().chain(entry.dirty_files.iter()) {
            fs.delete(file)?;
        }
        self.size -= entry.total_length();

        self.entries.pop(key);
        self.operations_since_rewrite += 1;
        self.append(Record::Remove {
            key: key.to_string(),
        });
        if self.journal_rewrite_required() {
            self.cleanup_requested = true;
        }
        debug!(key, size = self.size, "Removed entry");
        Ok(true)
    }

    pub fn close_snapshot(&mut self, key: &str) {
        let reap = match self.entries.peek_mut(key) {
            Some(entry) => {
                entry.locking_snapshot_count = entry.locking_snapshot_count.saturating_sub(1);
                entry.locking_snapshot_count == 0 && entry.zombie
            }
            None => false,
        };
        if reap {
            if let Err(e) = self.remove_entry(key) {
                warn!(key, error = %e, "Failed to remove zombie entry");
            }
        }
    }

    /// Evict least recently used entries until the size fits. Only committed
    /// entries with no edit in flight are evicted, and the last of those is
    /// kept even when it alone exceeds the limit.
    pub fn trim_to_size(&mut self) -> Result<()> {
        while self.size > self.max_size {
            let mut evictable = self
                .entries
                .iter()
                .rev()
                .filter(|(_, e)| e.readable && !e.zombie && e.current_editor.is_none());
            let victim = match (evictable.next(), evictable.next()) {
                (Some((key, _)), Some(_)) => key.clone(),
                _ => break,
            };
            debug!(key = %victim, size = self.size, max_size = self.max_size, "Evicting entry");
            self.remove_entry(&victim)?;
        }
        self.most_recent_trim_failed = false;
        Ok(())
    }

    pub fn evict_all(&mut self) -> Result<()> {
        if self.closed {
            return Err(DiskCacheError::Closed);
        }
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.zombie)
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            self.remove_entry(&key)?;
        }
        self.most_recent_trim_failed = false;
        Ok(())
    }

    /// The background job: trim, then compact the journal if it has grown.
    pub fn cleanup(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.trim_to_size() {
            warn!(error = %e, "Trim failed");
            self.most_recent_trim_failed = true;
        }
        if self.journal_rewrite_required() || self.most_recent_rebuild_failed {
            self.rewrite_or_degrade();
        }
        self.cleanup_requested = false;
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(DiskCacheError::Closed);
        }
        if let Err(e) = self.trim_to_size() {
            self.most_recent_trim_failed = true;
            return Err(e);
        }
        if self.journal_rewrite_required() {
            if let Err(e) = self.write_journal() {
                self.most_recent_rebuild_failed = true;
                self.journal = Some(JournalWriter::discard());
                return Err(e);
            }
        }
        if let Some(journal) = self.journal.as_mut() {
            journal.flush()?;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        // Editors still running can't be stopped; their output is discarded.
        for (_, entry) in self.entries.iter_mut() {
            if entry.current_editor.is_some() && !entry.zombie {
                self.size -= entry.total_length();
                entry.lengths.iter_mut().for_each(|l| *l = 0);
                entry.zombie = true;
            }
        }

        let trimmed = self.trim_to_size();
        let rewritten = self.write_journal();
        if let Some(mut journal) = self.journal.take() {
            let _ = journal.flush();
        }
        self.closed = true;
        info!(directory = ?self.directory, size = self.size, "Disk cache closed");

        trimmed?;
        rewritten
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn entry_count(&self) -> usize {
        self.entries.iter().filter(|(_, e)| !e.zombie).count()
    }
}

/// Pin an entry for reading if it is committed and its files look intact.
fn open_snapshot(fs: &dyn FileSystem, entry: &mut Entry) -> SnapshotOpen {
    if !entry.readable || entry.current_editor.is_some() || entry.zombie {
        return SnapshotOpen::Unavailable;
    }
    let intact = entry
        .clean_files
        .iter()
        .zip(entry.lengths.iter())
        .all(|(file, &length)| fs.size(file) == Some(length));
    if !intact {
        return SnapshotOpen::Damaged;
    }
    entry.locking_snapshot_count += 1;
    SnapshotOpen::Opened(entry.clean_files.clone())
}
