//! Filesystem access used by the cache engine
//!
//! The engine never touches `std::fs` directly so that tests can swap in a
//! filesystem that fails on demand.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    /// Size of a regular file, or `None` if it does not exist.
    fn size(&self, path: &Path) -> Option<u64>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Create an empty file unless one already exists.
    fn create_file(&self, path: &Path) -> io::Result<()>;

    /// Delete a file. A missing file is not an error.
    fn delete(&self, path: &Path) -> io::Result<()>;

    /// Recursively delete everything inside `dir`, keeping `dir` itself.
    fn delete_contents(&self, dir: &Path) -> io::Result<()>;

    /// Rename `from` to `to`, replacing `to` if it exists.
    fn atomic_move(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn appending_writer(&self, path: &Path) -> io::Result<Box<dyn Write + Send>>;

    fn truncating_writer(&self, path: &Path) -> io::Result<Box<dyn Write + Send>>;

    fn reader(&self, path: &Path) -> io::Result<Box<dyn BufRead + Send>>;
}

/// [`FileSystem`] backed by the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn size(&self, path: &Path) -> Option<u64> {
        fs::metadata(path)
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn create_file(&self, path: &Path) -> io::Result<()> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn delete_contents(&self, dir: &Path) -> io::Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    fn atomic_move(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn appending_writer(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Box::new(file))
    }

    fn truncating_writer(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(File::create(path)?))
    }

    fn reader(&self, path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}
