use disk_lru_cache::{
    DiskCacheConfig, DiskLruCache, FileSystem, LocalFileSystem, JOURNAL_FILE, JOURNAL_FILE_BACKUP,
    JOURNAL_FILE_TMP,
};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

const HEADER: &str = "libcore.io.DiskLruCache\n1\n1\n1\n\n";

/// Local filesystem whose renames can be made to fail.
#[derive(Default)]
struct FaultyFileSystem {
    fail_moves: AtomicBool,
}

impl FileSystem for FaultyFileSystem {
    fn exists(&self, path: &Path) -> bool {
        LocalFileSystem.exists(path)
    }

    fn size(&self, path: &Path) -> Option<u64> {
        LocalFileSystem.size(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        LocalFileSystem.create_dir_all(path)
    }

    fn create_file(&self, path: &Path) -> io::Result<()> {
        LocalFileSystem.create_file(path)
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        LocalFileSystem.delete(path)
    }

    fn delete_contents(&self, dir: &Path) -> io::Result<()> {
        LocalFileSystem.delete_contents(dir)
    }

    fn atomic_move(&self, from: &Path, to: &Path) -> io::Result<()> {
        if self.fail_moves.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected rename failure"));
        }
        LocalFileSystem.atomic_move(from, to)
    }

    fn appending_writer(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        LocalFileSystem.appending_writer(path)
    }

    fn truncating_writer(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        LocalFileSystem.truncating_writer(path)
    }

    fn reader(&self, path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
        LocalFileSystem.reader(path)
    }
}

fn open(dir: &Path) -> DiskLruCache {
    open_on(Arc::new(LocalFileSystem), dir)
}

fn open_on(fs: Arc<dyn FileSystem>, dir: &Path) -> DiskLruCache {
    DiskLruCache::open_with_runtime(fs, DiskCacheConfig::new(dir, 1024 * 1024), None).unwrap()
}

fn put(cache: &DiskLruCache, key: &str, data: &[u8]) {
    let mut editor = cache.edit(key).unwrap().expect("editor");
    fs::write(editor.file(0).unwrap(), data).unwrap();
    editor.commit().unwrap();
}

fn read(cache: &DiskLruCache, key: &str) -> Option<Vec<u8>> {
    let snapshot = cache.get(key).unwrap()?;
    Some(fs::read(snapshot.file(0)).unwrap())
}

fn journal(dir: &Path) -> String {
    fs::read_to_string(dir.join(JOURNAL_FILE)).unwrap()
}

#[test]
fn test_reopen_restores_entries() {
    let dir = tempdir().unwrap();
    let cache = open(dir.path());
    put(&cache, "a", b"alpha");
    put(&cache, "b", b"beta");
    put(&cache, "c", b"gamma");
    cache.remove("b").unwrap();
    cache.close().unwrap();

    let cache = open(dir.path());
    assert_eq!(read(&cache, "a").unwrap(), b"alpha");
    assert!(cache.get("b").unwrap().is_none());
    assert_eq!(read(&cache, "c").unwrap(), b"gamma");
    assert_eq!(cache.size(), 10);
}

#[test]
fn test_reopen_without_close_restores_entries() {
    let dir = tempdir().unwrap();
    let cache = open(dir.path());
    put(&cache, "a", b"alpha");
    drop(cache);

    let cache = open(dir.path());
    assert_eq!(read(&cache, "a").unwrap(), b"alpha");
}

#[test]
fn test_reopen_preserves_lru_order() {
    let dir = tempdir().unwrap();
    let cache = open(dir.path());
    put(&cache, "a", &[1u8; 40]);
    put(&cache, "b", &[2u8; 40]);
    assert!(read(&cache, "a").is_some());
    drop(cache);

    let cache = DiskLruCache::open_with_runtime(
        Arc::new(LocalFileSystem),
        DiskCacheConfig::new(dir.path(), 100),
        None,
    )
    .unwrap();
    put(&cache, "c", &[3u8; 40]);
    assert!(cache.get("b").unwrap().is_none());
    assert!(cache.get("a").unwrap().is_some());
}

#[test]
fn test_crash_after_dirty_discards_edit() {
    let dir = tempdir().unwrap();
    let cache = open(dir.path());
    put(&cache, "a", b"committed");
    cache.close().unwrap();

    // Keep everything up to and including the DIRTY line of the new edit.
    let contents = journal(dir.path());
    fs::write(dir.path().join(JOURNAL_FILE), format!("{}DIRTY a\n", contents)).unwrap();
    fs::write(dir.path().join("a.0.tmp"), b"half written").unwrap();

    let cache = open(dir.path());
    assert!(cache.get("a").unwrap().is_none());
    assert!(!dir.path().join("a.0.tmp").exists());
    assert!(!dir.path().join("a.0").exists());
    assert_eq!(cache.size(), 0);
}

#[test]
fn test_crash_during_first_edit_discards_edit() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join(JOURNAL_FILE), format!("{}DIRTY a\n", HEADER)).unwrap();
    fs::write(dir.path().join("a.0.tmp"), b"partial").unwrap();

    let cache = open(dir.path());
    assert!(cache.get("a").unwrap().is_none());
    assert!(!dir.path().join("a.0.tmp").exists());
    assert_eq!(cache.entry_count(), 0);
}

#[test]
fn test_corrupt_header_discards_cache() {
    let dir = tempdir().unwrap();
    let cache = open(dir.path());
    put(&cache, "a", b"alpha");
    cache.close().unwrap();

    let contents = journal(dir.path()).replacen("libcore.io.DiskLruCache", "bogus", 1);
    fs::write(dir.path().join(JOURNAL_FILE), contents).unwrap();

    let cache = open(dir.path());
    assert!(cache.get("a").unwrap().is_none());
    assert!(!dir.path().join("a.0").exists());
    assert_eq!(cache.size(), 0);
    assert!(journal(dir.path()).starts_with(HEADER));
}

#[test]
fn test_app_version_change_discards_cache() {
    let dir = tempdir().unwrap();
    let cache = open(dir.path());
    put(&cache, "a", b"alpha");
    cache.close().unwrap();

    let cache = DiskLruCache::open_with_runtime(
        Arc::new(LocalFileSystem),
        DiskCacheConfig::new(dir.path(), 1024).with_app_version(2),
        None,
    )
    .unwrap();
    assert!(cache.get("a").unwrap().is_none());
    assert_eq!(cache.entry_count(), 0);
}

#[test]
fn test_unparsable_line_discards_cache() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.0"), b"abc").unwrap();
    fs::write(
        dir.path().join(JOURNAL_FILE),
        format!("{}CLEAN a 3\nCLEAN b x\n", HEADER),
    )
    .unwrap();

    let cache = open(dir.path());
    assert!(cache.get("a").unwrap().is_none());
    assert!(!dir.path().join("a.0").exists());
}

#[test]
fn test_journal_key_outside_key_rules_discards_cache() {
    let root = tempdir().unwrap();
    let dir = root.path().join("cache");
    fs::create_dir_all(&dir).unwrap();
    fs::write(root.path().join("victim.0"), b"keep").unwrap();
    fs::write(dir.join("a.0"), b"abc").unwrap();
    fs::write(
        dir.join(JOURNAL_FILE),
        format!("{}CLEAN a 3\nDIRTY ../victim\n", HEADER),
    )
    .unwrap();

    let cache = open(&dir);
    assert!(cache.get("a").unwrap().is_none());
    assert_eq!(cache.entry_count(), 0);
    assert_eq!(fs::read(root.path().join("victim.0")).unwrap(), b"keep");
}

#[test]
fn test_torn_last_line_is_ignored_and_rewritten() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.0"), b"abc").unwrap();
    fs::write(
        dir.path().join(JOURNAL_FILE),
        format!("{}CLEAN a 3\nCLEAN b 1", HEADER),
    )
    .unwrap();

    let cache = open(dir.path());
    assert_eq!(read(&cache, "a").unwrap(), b"abc");
    assert!(cache.get("b").unwrap().is_none());
    assert!(journal(dir.path()).starts_with(&format!("{}CLEAN a 3\n", HEADER)));
    assert!(!journal(dir.path()).contains("CLEAN b"));
}

#[test]
fn test_backup_promoted_when_journal_missing() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.0"), b"abc").unwrap();
    fs::write(
        dir.path().join(JOURNAL_FILE_BACKUP),
        format!("{}CLEAN a 3\n", HEADER),
    )
    .unwrap();

    let cache = open(dir.path());
    assert_eq!(read(&cache, "a").unwrap(), b"abc");
    assert!(!dir.path().join(JOURNAL_FILE_BACKUP).exists());
}

#[test]
fn test_stale_backup_and_tmp_are_deleted() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.0"), b"abc").unwrap();
    fs::write(dir.path().join(JOURNAL_FILE), format!("{}CLEAN a 3\n", HEADER)).unwrap();
    fs::write(dir.path().join(JOURNAL_FILE_BACKUP), format!("{}CLEAN z 9\n", HEADER)).unwrap();
    fs::write(dir.path().join(JOURNAL_FILE_TMP), "garbage").unwrap();

    let cache = open(dir.path());
    assert_eq!(read(&cache, "a").unwrap(), b"abc");
    assert!(!dir.path().join(JOURNAL_FILE_BACKUP).exists());
    assert!(!dir.path().join(JOURNAL_FILE_TMP).exists());
}

#[test]
fn test_missing_entry_file_heals_on_read() {
    let dir = tempdir().unwrap();
    let cache = open(dir.path());
    put(&cache, "a", b"abc");
    cache.close().unwrap();
    fs::remove_file(dir.path().join("a.0")).unwrap();

    let cache = open(dir.path());
    assert_eq!(cache.size(), 3);
    assert!(cache.get("a").unwrap().is_none());
    assert_eq!(cache.size(), 0);
    assert!(journal(dir.path()).ends_with("REMOVE a\n"));
}

#[test]
fn test_journal_compacts_after_many_operations() {
    let dir = tempdir().unwrap();
    let cache = open(dir.path());
    put(&cache, "a", b"abc");
    for _ in 0..2100 {
        assert!(cache.get("a").unwrap().is_some());
    }

    let lines = journal(dir.path()).lines().count();
    assert!(lines < 200, "journal has {} lines", lines);
    assert_eq!(read(&cache, "a").unwrap(), b"abc");
}

#[test]
fn test_long_journal_is_compacted_on_open() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.0"), b"abc").unwrap();
    let mut contents = format!("{}CLEAN a 3\n", HEADER);
    for _ in 0..2500 {
        contents.push_str("READ a\n");
    }
    fs::write(dir.path().join(JOURNAL_FILE), contents).unwrap();

    let cache = open(dir.path());
    assert_eq!(journal(dir.path()), format!("{}CLEAN a 3\n", HEADER));
    assert_eq!(read(&cache, "a").unwrap(), b"abc");
}

#[test]
fn test_failed_rewrite_degrades_until_cleanup_succeeds() {
    let dir = tempdir().unwrap();
    let fs_handle = Arc::new(FaultyFileSystem::default());
    let cache = open_on(fs_handle.clone(), dir.path());
    put(&cache, "a", b"abc");

    fs_handle.fail_moves.store(true, Ordering::SeqCst);
    for _ in 0..2100 {
        assert!(cache.get("a").unwrap().is_some());
    }

    // Reads keep working, writes are declined.
    assert_eq!(read(&cache, "a").unwrap(), b"abc");
    assert!(cache.edit("b").unwrap().is_none());

    // The declined edit retries the rewrite, which now succeeds.
    fs_handle.fail_moves.store(false, Ordering::SeqCst);
    assert!(cache.edit("b").unwrap().is_none());
    put(&cache, "b", b"bee");
    assert_eq!(read(&cache, "b").unwrap(), b"bee");

    drop(cache);
    let cache = open(dir.path());
    assert_eq!(read(&cache, "a").unwrap(), b"abc");
    assert_eq!(read(&cache, "b").unwrap(), b"bee");
}

#[test]
fn test_failed_rename_at_commit_is_reported() {
    let dir = tempdir().unwrap();
    let fs_handle = Arc::new(FaultyFileSystem::default());
    let cache = open_on(fs_handle.clone(), dir.path());

    let mut editor = cache.edit("a").unwrap().unwrap();
    fs::write(editor.file(0).unwrap(), b"abc").unwrap();
    fs_handle.fail_moves.store(true, Ordering::SeqCst);
    assert!(editor.commit().is_err());
    fs_handle.fail_moves.store(false, Ordering::SeqCst);

    assert!(cache.get("a").unwrap().is_none());
    assert!(!dir.path().join("a.0.tmp").exists());
    assert_eq!(cache.size(), 0);
}
