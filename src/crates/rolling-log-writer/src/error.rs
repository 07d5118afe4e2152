use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Step of the rotation sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStage {
    /// Pushing the pending buffer into the old file
    Drain,
    /// Syncing the old file before it is renamed
    Sync,
    /// Listing existing backups to pick the backup name
    Name,
    /// Renaming the old file to its backup name
    Rename,
    /// Opening the new active file
    Open,
}

impl fmt::Display for RotationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            RotationStage::Drain => "drain",
            RotationStage::Sync => "sync",
            RotationStage::Name => "name",
            RotationStage::Rename => "rename",
            RotationStage::Open => "open",
        };
        f.write_str(stage)
    }
}

/// A backup that could not be deleted during pruning.
#[derive(Debug)]
pub struct PruneFailure {
    pub path: PathBuf,
    pub error: std::io::Error,
}

/// Errors that can occur while writing to a rolling log.
#[derive(Error, Debug)]
pub enum WriterError {
    /// The configuration cannot describe a log file
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Pushing bytes to the active file failed. Bytes that were not pushed
    /// are still buffered.
    #[error("failed to write to {}: {source} ({accepted} bytes accepted)", .path.display())]
    Write {
        path: PathBuf,
        accepted: usize,
        #[source]
        source: std::io::Error,
    },

    /// Durability of already pushed bytes could not be confirmed
    #[error("failed to sync {}: {source}", .path.display())]
    Sync {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Rotation was aborted; the previous file is still the active one
    #[error("failed to rotate {} at {stage}: {source} ({accepted} bytes accepted)", .path.display())]
    Rotation {
        path: PathBuf,
        stage: RotationStage,
        accepted: usize,
        #[source]
        source: std::io::Error,
    },

    /// Some stale backups could not be deleted; `removed` lists the ones
    /// that were
    #[error("failed to delete {} stale backup(s), first: {}", .failures.len(), first_failure(.failures))]
    Prune {
        failures: Vec<PruneFailure>,
        removed: Vec<PathBuf>,
    },

    /// I/O error when interacting with filesystem
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn first_failure(failures: &[PruneFailure]) -> String {
    failures
        .first()
        .map(|f| format!("{}: {}", f.path.display(), f.error))
        .unwrap_or_default()
}

impl WriterError {
    /// Returns `false` for failures after which the writer keeps accepting
    /// writes without losing data (sync and prune failures).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, WriterError::Sync { .. } | WriterError::Prune { .. })
    }

    /// Number of bytes of the failed payload that the writer took ownership of.
    ///
    /// Only write and rotation failures interrupt a payload; for the other
    /// kinds every byte was accepted (or no payload was involved).
    pub fn accepted(&self) -> Option<usize> {
        match self {
            WriterError::Write { accepted, .. } | WriterError::Rotation { accepted, .. } => {
                Some(*accepted)
            }
            _ => None,
        }
    }

    pub(crate) fn with_accepted(mut self, n: usize) -> Self {
        match &mut self {
            WriterError::Write { accepted, .. } | WriterError::Rotation { accepted, .. } => {
                *accepted = n;
            }
            _ => {}
        }
        self
    }
}

pub type Result<T> = std::result::Result<T, WriterError>;
