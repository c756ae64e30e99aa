//! Journal codec
//!
//! The journal is a line-oriented text log. It starts with a five line header:
//!
//! ```text
//! libcore.io.DiskLruCache
//! 1
//! 100
//! 1
//!
//! ```
//!
//! followed by one record per line:
//!
//! ```text
//! DIRTY 335c4c6028171cfddfbaae1a9c313c52
//! CLEAN 335c4c6028171cfddfbaae1a9c313c52 3934
//! REMOVE 335c4c6028171cfddfbaae1a9c313c52
//! DIRTY 1ab96a171faeeee38496d8b330771a7a
//! CLEAN 1ab96a171faeeee38496d8b330771a7a 1600
//! READ 335c4c6028171cfddfbaae1a9c313c52
//! ```
//!
//! A `DIRTY` record opens an edit; it must be followed by `CLEAN` or `REMOVE`
//! for the same key, otherwise the entry is discarded on replay.

use crate::entry::validate_key;
use crate::error::{DiskCacheError, Result};
use std::fmt;
use std::io::{self, BufRead, Write};
use tracing::warn;

pub const JOURNAL_FILE: &str = "journal";
pub const JOURNAL_FILE_TMP: &str = "journal.tmp";
pub const JOURNAL_FILE_BACKUP: &str = "journal.bkp";

pub(crate) const MAGIC: &str = "libcore.io.DiskLruCache";
pub(crate) const VERSION: &str = "1";

const CLEAN: &str = "CLEAN";
const DIRTY: &str = "DIRTY";
const REMOVE: &str = "REMOVE";
const READ: &str = "READ";

/// A single journal line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Record {
    Clean { key: String, lengths: Vec<u64> },
    Dirty { key: String },
    Remove { key: String },
    Read { key: String },
}

impl Record {
    pub fn key(&self) -> &str {
        match self {
            Record::Clean { key, .. }
            | Record::Dirty { key }
            | Record::Remove { key }
            | Record::Read { key } => key,
        }
    }

    /// Parse one line (without its trailing newline).
    pub fn parse(line: &str, value_count: usize) -> Result<Self> {
        let mut parts = line.split(' ');
        let op = parts.next().unwrap_or_default();
        let key = match parts.next() {
            Some(key) if validate_key(key).is_ok() => key.to_string(),
            _ => return Err(corrupt_line(line)),
        };
        let rest: Vec<&str> = parts.collect();

        match op {
            CLEAN => {
                if rest.len() != value_count {
                    return Err(corrupt_line(line));
                }
                let lengths = rest
                    .iter()
                    .map(|s| s.parse::<u64>())
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| corrupt_line(line))?;
                Ok(Record::Clean { key, lengths })
            }
            DIRTY if rest.is_empty() => Ok(Record::Dirty { key }),
            REMOVE if rest.is_empty() => Ok(Record::Remove { key }),
            READ if rest.is_empty() => Ok(Record::Read { key }),
            _ => Err(corrupt_line(line)),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Clean { key, lengths } => {
                write!(f, "{} {}", CLEAN, key)?;
                for length in lengths {
                    write!(f, " {}", length)?;
                }
                Ok(())
            }
            Record::Dirty { key } => write!(f, "{} {}", DIRTY, key),
            Record::Remove { key } => write!(f, "{} {}", REMOVE, key),
            Record::Read { key } => write!(f, "{} {}", READ, key),
        }
    }
}

fn corrupt_line(line: &str) -> DiskCacheError {
    DiskCacheError::CorruptJournal(format!("unexpected journal line: {}", line))
}

pub(crate) fn write_header(
    out: &mut dyn Write,
    app_version: u32,
    value_count: usize,
) -> io::Result<()> {
    write!(
        out,
        "{}\n{}\n{}\n{}\n\n",
        MAGIC, VERSION, app_version, value_count
    )
}

/// Streams records out of a journal after validating its header.
pub(crate) struct JournalReader<R> {
    reader: R,
    value_count: usize,
    line_count: usize,
    truncated: bool,
}

impl<R: BufRead> JournalReader<R> {
    pub fn open(mut reader: R, app_version: u32, value_count: usize) -> Result<Self> {
        let expected = [
            MAGIC.to_string(),
            VERSION.to_string(),
            app_version.to_string(),
            value_count.to_string(),
            String::new(),
        ];
        let mut header = Vec::with_capacity(expected.len());
        for _ in 0..expected.len() {
            match read_full_line(&mut reader)? {
                Some(line) => header.push(line),
                None => {
                    return Err(DiskCacheError::CorruptJournal(
                        "journal header is incomplete".to_string(),
                    ))
                }
            }
        }
        if header[..] != expected[..] {
            return Err(DiskCacheError::CorruptJournal(format!(
                "unexpected journal header: [{}]",
                header.join(", ")
            )));
        }

        Ok(Self {
            reader,
            value_count,
            line_count: 0,
            truncated: false,
        })
    }

    /// Next record, or `None` at end of input. A final line with no newline
    /// ends the stream and sets [`Self::truncated`].
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if !line.ends_with('\n') {
            self.truncated = true;
            return Ok(None);
        }
        line.pop();
        self.line_count += 1;
        Record::parse(&line, self.value_count).map(Some)
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Whether the journal ended on a torn write.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

fn read_full_line(reader: &mut impl BufRead) -> Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 || !line.ends_with('\n') {
        return Ok(None);
    }
    line.pop();
    Ok(Some(line))
}

/// Append-only journal sink.
///
/// Write failures are never reported to callers. The first failure sets
/// [`Self::has_errors`] and every later append is dropped, so a half-written
/// record is never followed by more records.
pub(crate) struct JournalWriter {
    sink: Box<dyn Write + Send>,
    has_errors: bool,
}

impl JournalWriter {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink,
            has_errors: false,
        }
    }

    /// Writer that accepts and drops everything.
    pub fn discard() -> Self {
        Self::new(Box::new(io::sink()))
    }

    /// Append a record and flush it.
    pub fn append(&mut self, record: &Record) {
        if self.has_errors {
            return;
        }
        let result = writeln!(self.sink, "{}", record).and_then(|_| self.sink.flush());
        if let Err(e) = result {
            warn!(error = %e, key = record.key(), "Journal write failed");
            self.has_errors = true;
        }
    }

    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}
