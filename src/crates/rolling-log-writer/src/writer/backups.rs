use crate::error::{PruneFailure, Result, WriterError};
use crate::storage::Storage;
use chrono::NaiveDateTime;
use std::cmp::Ordering;
use std::io;
use std::path::{Path, PathBuf};

#[allow(unused_imports)]
use tracing::{debug, error, info, instrument};

/// Timestamp embedded in backup names. Colons are avoided so the names are
/// valid on every file system.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";
const TIMESTAMP_LEN: usize = "YYYY-MM-DDTHH-MM-SS.mmm".len();

/// A rotated log file: `<file_name>-<timestamp>[-N]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub path: PathBuf,
    pub timestamp: NaiveDateTime,
    /// Disambiguator for backups created within the same millisecond.
    /// Zero when the name has no suffix.
    pub counter: u64,
}

impl Ord for Backup {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.counter.cmp(&other.counter))
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl PartialOrd for Backup {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Parses the timestamp and counter out of a backup file name, returning
/// `None` for names that do not belong to the stream.
fn parse_name(file_name: &str, name: &str) -> Option<(NaiveDateTime, u64)> {
    let rest = name.strip_prefix(file_name)?.strip_prefix('-')?;

    if !rest.is_char_boundary(TIMESTAMP_LEN) {
        return None;
    }
    let (timestamp, suffix) = rest.split_at(TIMESTAMP_LEN);
    let timestamp = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;

    let counter = if suffix.is_empty() {
        0
    } else {
        let digits = suffix.strip_prefix('-')?;
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse::<u64>().ok().filter(|n| *n > 0)?
    };

    Some((timestamp, counter))
}

/// Backups that belong to a single output path.
#[derive(Debug, Clone)]
pub(crate) struct BackupSet {
    dir: PathBuf,
    file_name: String,
}

impl BackupSet {
    pub(crate) fn new(output_path: &Path) -> Result<Self> {
        let file_name = output_path
            .file_name()
            .ok_or_else(|| {
                WriterError::ConfigInvalid(format!(
                    "output path {} does not name a file",
                    output_path.display()
                ))
            })?
            .to_str()
            .ok_or_else(|| {
                WriterError::ConfigInvalid("output path contains invalid UTF-8".to_string())
            })?
            .to_string();

        let dir = match output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Ok(Self { dir, file_name })
    }

    /// Lists the backups of the stream, newest first.
    pub(crate) fn list<S: Storage>(&self, storage: &S) -> io::Result<Vec<Backup>> {
        let mut backups: Vec<Backup> = storage
            .list(&self.dir)?
            .into_iter()
            .filter_map(|name| {
                let name = name.to_str()?;
                let (timestamp, counter) = parse_name(&self.file_name, name)?;

                Some(Backup {
                    path: self.dir.join(name),
                    timestamp,
                    counter,
                })
            })
            .collect();

        backups.sort_by(|a, b| b.cmp(a));
        Ok(backups)
    }

    /// Picks the name for a backup created at `now`.
    ///
    /// When backups with the same timestamp exist the name gets the next
    /// counter, so names never collide and sort in creation order.
    pub(crate) fn next_path<S: Storage>(
        &self,
        storage: &S,
        now: NaiveDateTime,
    ) -> io::Result<PathBuf> {
        let timestamp = now.format(TIMESTAMP_FORMAT).to_string();

        let counter = self
            .list(storage)?
            .iter()
            .filter(|b| b.timestamp.format(TIMESTAMP_FORMAT).to_string() == timestamp)
            .map(|b| b.counter + 1)
            .max();

        let name = match counter {
            None => format!("{}-{}", self.file_name, timestamp),
            Some(counter) => format!("{}-{}-{}", self.file_name, timestamp, counter),
        };

        Ok(self.dir.join(name))
    }

    /// Deletes every backup beyond the newest `retain`.
    ///
    /// A failed deletion does not stop the remaining ones; all failures are
    /// reported together. Returns the deleted paths.
    #[instrument(skip(self, storage))]
    pub(crate) fn prune<S: Storage>(&self, storage: &S, retain: usize) -> Result<Vec<PathBuf>> {
        let backups = self.list(storage)?;

        let mut removed = Vec::new();
        let mut failures = Vec::new();

        for backup in backups.into_iter().skip(retain) {
            match storage.remove(&backup.path) {
                Ok(()) => {
                    info!("deleted {}", backup.path.display());
                    removed.push(backup.path);
                }
                Err(e) => {
                    error!("failed to delete backup {}: {}", backup.path.display(), e);
                    failures.push(PruneFailure {
                        path: backup.path,
                        error: e,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(removed)
        } else {
            Err(WriterError::Prune { failures, removed })
        }
    }
}
