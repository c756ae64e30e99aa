//! Public cache handle plus the snapshot and editor handles it hands out

use crate::cleanup::CleanupWorker;
use crate::config::DiskCacheConfig;
use crate::engine::{EditGrant, Engine};
use crate::entry::EditorId;
use crate::error::Result;
use crate::fs::{FileSystem, LocalFileSystem};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;

struct Shared {
    engine: Mutex<Engine>,
    cleanup: CleanupWorker,
    fs: Arc<dyn FileSystem>,
    directory: PathBuf,
    max_size: u64,
    value_count: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release the lock and start cleanup if the finished operation asked for it.
    fn release(self: &Arc<Self>, mut engine: MutexGuard<'_, Engine>) {
        let requested = engine.take_cleanup_request();
        drop(engine);
        if requested {
            let shared = Arc::clone(self);
            self.cleanup.schedule(move || {
                shared.cleanup.started();
                shared.lock().cleanup();
            });
        }
    }
}

/// A size-bounded cache of files in a single directory.
///
/// Each entry has a string key and a fixed number of values, stored as one
/// file per value. Values are written through an [`Editor`] and read through a
/// [`Snapshot`]; both hand out paths so payload I/O happens outside the cache
/// lock. A journal in the same directory records every change, so committed
/// entries survive restarts and crashes.
///
/// When the total size exceeds `max_size`, least recently used entries are
/// evicted in the background. The handle is cheap to clone.
#[derive(Clone)]
pub struct DiskLruCache {
    shared: Arc<Shared>,
}

impl DiskLruCache {
    /// Open a cache on the local filesystem.
    pub fn open(config: DiskCacheConfig) -> Result<Self> {
        Self::open_with(Arc::new(LocalFileSystem), config)
    }

    /// Open a cache on `fs`. Cleanup runs on the current tokio runtime if
    /// there is one, inline otherwise.
    pub fn open_with(fs: Arc<dyn FileSystem>, config: DiskCacheConfig) -> Result<Self> {
        Self::open_with_runtime(fs, config, Handle::try_current().ok())
    }

    pub fn open_with_runtime(
        fs: Arc<dyn FileSystem>,
        config: DiskCacheConfig,
        runtime: Option<Handle>,
    ) -> Result<Self> {
        let engine = Engine::open(Arc::clone(&fs), &config)?;
        Ok(Self {
            shared: Arc::new(Shared {
                engine: Mutex::new(engine),
                cleanup: CleanupWorker::new(runtime),
                fs,
                directory: config.directory,
                max_size: config.max_size,
                value_count: config.value_count,
            }),
        })
    }

    /// Open a snapshot of `key`, or `None` if it is absent, being edited or
    /// being removed.
    pub fn get(&self, key: &str) -> Result<Option<Snapshot>> {
        let mut engine = self.shared.lock();
        let files = engine.get(key);
        self.shared.release(engine);
        Ok(files?.map(|files| Snapshot::new(&self.shared, key, files)))
    }

    /// Start editing `key`, or `None` if another edit is in progress, the entry
    /// is being read, or the cache is recovering from a failed cleanup.
    pub fn edit(&self, key: &str) -> Result<Option<Editor>> {
        let mut engine = self.shared.lock();
        let grant = engine.edit(key);
        self.shared.release(engine);
        Ok(grant?.map(|grant| Editor::new(&self.shared, key, grant)))
    }

    /// Remove `key`. Returns false if it was not present.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut engine = self.shared.lock();
        let removed = engine.remove(key);
        self.shared.release(engine);
        removed
    }

    /// Remove every entry. Entries in use are deleted once released.
    pub fn evict_all(&self) -> Result<()> {
        let mut engine = self.shared.lock();
        let result = engine.evict_all();
        self.shared.release(engine);
        result
    }

    /// Total size of committed entries in bytes.
    pub fn size(&self) -> u64 {
        self.shared.lock().size()
    }

    pub fn max_size(&self) -> u64 {
        self.shared.max_size
    }

    pub fn entry_count(&self) -> usize {
        self.shared.lock().entry_count()
    }

    pub fn directory(&self) -> &Path {
        &self.shared.directory
    }

    /// Number of values stored per entry.
    pub fn value_count(&self) -> usize {
        self.shared.value_count
    }

    pub fn trim_to_size(&self) -> Result<()> {
        self.shared.lock().trim_to_size()
    }

    /// Trim, compact the journal if due, and flush it.
    pub fn flush(&self) -> Result<()> {
        self.shared.lock().flush()
    }

    /// Close the cache. Open editors are discarded when they complete; open
    /// snapshots stay valid until dropped.
    pub fn close(&self) -> Result<()> {
        self.shared.lock().close()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().is_closed()
    }

    /// Whether cleanup runs on a tokio runtime rather than inline.
    pub fn has_background_cleanup(&self) -> bool {
        self.shared.cleanup.is_background()
    }
}

impl std::fmt::Debug for DiskLruCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskLruCache")
            .field("directory", &self.shared.directory)
            .field("max_size", &self.shared.max_size)
            .finish()
    }
}

/// Read handle on a committed entry. The entry's files are kept until every
/// snapshot on it is closed or dropped.
pub struct Snapshot {
    shared: Arc<Shared>,
    key: String,
    files: Vec<PathBuf>,
    closed: bool,
}

impl Snapshot {
    fn new(shared: &Arc<Shared>, key: &str, files: Vec<PathBuf>) -> Self {
        Self {
            shared: Arc::clone(shared),
            key: key.to_string(),
            files,
            closed: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Path of the committed file for value `index`.
    ///
    /// # Panics
    ///
    /// If `index` is not below the cache's value count.
    pub fn file(&self, index: usize) -> &Path {
        &self.files[index]
    }

    pub fn close(self) {}

    /// Close this snapshot and start editing the same entry.
    pub fn close_and_edit(mut self) -> Result<Option<Editor>> {
        let mut engine = self.shared.lock();
        self.closed = true;
        engine.close_snapshot(&self.key);
        let grant = engine.edit(&self.key);
        self.shared.release(engine);
        Ok(grant?.map(|grant| Editor::new(&self.shared, &self.key, grant)))
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut engine = self.shared.lock();
        engine.close_snapshot(&self.key);
        self.shared.release(engine);
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("key", &self.key)
            .field("files", &self.files)
            .finish()
    }
}

/// Write handle on an entry.
///
/// Write the new values into the paths returned by [`Editor::file`], then call
/// [`Editor::commit`]. Values that are never requested keep their previous
/// contents. Dropping an editor without committing aborts the edit.
pub struct Editor {
    shared: Arc<Shared>,
    key: String,
    id: EditorId,
    dirty_files: Vec<PathBuf>,
    written: Vec<bool>,
    done: bool,
}

impl Editor {
    fn new(shared: &Arc<Shared>, key: &str, grant: EditGrant) -> Self {
        let written = vec![false; grant.dirty_files.len()];
        Self {
            shared: Arc::clone(shared),
            key: key.to_string(),
            id: grant.id,
            dirty_files: grant.dirty_files,
            written,
            done: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Path of the temporary file for value `index`, created empty if needed.
    ///
    /// # Panics
    ///
    /// If `index` is not below the cache's value count.
    pub fn file(&mut self, index: usize) -> Result<PathBuf> {
        let path = &self.dirty_files[index];
        self.shared.fs.create_file(path)?;
        self.written[index] = true;
        Ok(path.clone())
    }

    /// Publish the written values. If a written file has disappeared the edit
    /// is aborted instead.
    pub fn commit(mut self) -> Result<()> {
        self.complete(true)
    }

    /// Commit and open a snapshot of the result in one step.
    pub fn commit_and_open_snapshot(mut self) -> Result<Option<Snapshot>> {
        self.done = true;
        let mut engine = self.shared.lock();
        let files = engine
            .complete_edit(&self.key, self.id, &self.written, true)
            .and_then(|()| {
                if engine.is_closed() {
                    Ok(None)
                } else {
                    engine.get(&self.key)
                }
            });
        self.shared.release(engine);
        Ok(files?.map(|files| Snapshot::new(&self.shared, &self.key, files)))
    }

    /// Discard the written values.
    pub fn abort(mut self) {
        // Aborting only deletes files; failures are logged by the engine.
        let _ = self.complete(false);
    }

    fn complete(&mut self, success: bool) -> Result<()> {
        self.done = true;
        let mut engine = self.shared.lock();
        let result = engine.complete_edit(&self.key, self.id, &self.written, success);
        self.shared.release(engine);
        result
    }
}

impl Drop for Editor {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.complete(false);
        }
    }
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("key", &self.key)
            .field("written", &self.written)
            .finish()
    }
}
