mod backups;
pub use backups::Backup;
use backups::BackupSet;

mod buffer;
use buffer::{PushError, WriteBuffer, push_all};

mod config;
pub use config::{Config, Defaults, PAGE_SIZE, Settings, Thresholds, align_to_page};

mod durability;
use durability::SyncScheduler;

mod shared;
pub use shared::SharedWriter;
#[cfg(feature = "tracing-subscriber")]
pub use shared::WriterGuard;

use crate::error::{Result, RotationStage, WriterError};
use crate::storage::{LocalStorage, Storage};
use chrono::{Local, NaiveDateTime, Utc};
use std::io;
use std::path::Path;

#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};

/// Tracks how much of the rotation size the active file has used.
#[derive(Debug)]
struct RotationState {
    /// Bytes in the active file, including content it had when opened
    active_size: u64,
    rotation_size: u64,
}

impl RotationState {
    fn new(rotation_size: u64, active_size: u64) -> Self {
        Self {
            active_size,
            rotation_size,
        }
    }

    fn account(&mut self, pushed: u64) {
        self.active_size = self.active_size.saturating_add(pushed);
    }

    /// Bytes that still fit into the active file once `buffered` bytes are
    /// pushed.
    fn capacity(&self, buffered: usize) -> u64 {
        self.rotation_size
            .saturating_sub(self.active_size.saturating_add(buffered as u64))
    }

    fn should_rotate(&self, buffered: usize) -> bool {
        self.capacity(buffered) == 0
    }

    fn reset(&mut self, active_size: u64) {
        self.active_size = active_size;
    }
}

/// A buffered, size-rotated log file.
///
/// Bytes are buffered until the flush size is reached, pushed to the page
/// cache, synced every sync size bytes, and the file is rotated to a
/// timestamped backup once it holds exactly the rotation size. Payloads are
/// treated as opaque bytes and may be split across a file and its successor.
///
/// The writer is used through `&mut self`; wrap it in a [`SharedWriter`] to
/// share it between threads.
pub struct RollingWriter<S: Storage = LocalStorage> {
    storage: S,
    settings: Settings,
    backups: BackupSet,
    file: S::File,
    buffer: WriteBuffer,
    durability: SyncScheduler,
    rotation: RotationState,
    closed: bool,
}

impl RollingWriter<LocalStorage> {
    /// Opens a rolling log on the local file system.
    pub fn open(config: &Config) -> Result<Self> {
        Self::with_storage(config.normalize(), LocalStorage)
    }
}

impl<S: Storage> RollingWriter<S> {
    /// Opens a rolling log with already normalized settings.
    ///
    /// An existing file at the output path is appended to and its length
    /// counts toward the rotation size.
    pub fn with_storage(settings: Settings, storage: S) -> Result<Self> {
        let backups = BackupSet::new(settings.output_path())?;

        let (file, active_size) = storage.open_append(settings.output_path())?;
        debug!(
            "opened {} ({} bytes)",
            settings.output_path().display(),
            active_size
        );

        let flush_size = usize::try_from(settings.flush_size()).unwrap_or(usize::MAX);

        Ok(Self {
            buffer: WriteBuffer::new(flush_size),
            durability: SyncScheduler::new(settings.sync_size()),
            rotation: RotationState::new(settings.rotation_size(), active_size),
            storage,
            settings,
            backups,
            file,
            closed: false,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Path of the active file.
    pub fn path(&self) -> &Path {
        self.settings.output_path()
    }

    /// Bytes pushed into the active file.
    pub fn active_size(&self) -> u64 {
        self.rotation.active_size
    }

    /// Bytes waiting in the buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes pushed since the last sync.
    pub fn unsynced(&self) -> u64 {
        self.durability.dirty()
    }

    /// Appends a payload.
    ///
    /// On success every byte was accepted. A [`WriterError::Sync`] or
    /// [`WriterError::Prune`] error is also returned after every byte was
    /// accepted; the writer keeps working. On [`WriterError::Write`] and
    /// [`WriterError::Rotation`], [`WriterError::accepted`] tells how many
    /// bytes of the payload the writer took; the remainder was not written.
    pub fn append(&mut self, data: &[u8]) -> Result<usize> {
        let mut accepted = 0;
        let mut deferred = None;

        loop {
            if self.rotation.should_rotate(self.buffer.len()) {
                if let Some(e) = self
                    .rotate_now()
                    .map_err(|e| e.with_accepted(accepted))?
                {
                    deferred.get_or_insert(e);
                }
            }

            if accepted == data.len() {
                break;
            }

            let rest = &data[accepted..];
            let capacity = usize::try_from(self.rotation.capacity(self.buffer.len()))
                .unwrap_or(usize::MAX);

            if self.buffer.is_empty() && rest.len() >= self.buffer.capacity() {
                let chunk = &rest[..rest.len().min(capacity)];
                let pushed = self.push_direct(chunk, &mut deferred);
                accepted += match pushed {
                    Ok(n) => n,
                    Err((n, e)) => return Err(e.with_accepted(accepted + n)),
                };
            } else {
                accepted += self.buffer.fill(rest, capacity);

                if self.buffer.is_full() {
                    self.drain(&mut deferred)
                        .map_err(|e| e.with_accepted(accepted))?;
                }
            }
        }

        match deferred {
            Some(e) => Err(e),
            None => Ok(accepted),
        }
    }

    /// Pushes the buffered bytes to the active file.
    pub fn flush(&mut self) -> Result<()> {
        let mut deferred = None;
        self.drain(&mut deferred)?;

        match deferred {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Pushes the buffered bytes and syncs the active file.
    ///
    /// The sync is attempted even when pushing fails, so bytes that already
    /// reached the file are made durable; the push error is returned then.
    pub fn sync(&mut self) -> Result<()> {
        let mut deferred = None;
        let drained = self.drain(&mut deferred);
        let synced = self.durability.force(&mut self.file);

        drained?;
        synced.map_err(|source| WriterError::Sync {
            path: self.path().to_path_buf(),
            source,
        })?;
        debug!("synced {}", self.path().display());

        match deferred {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Rotates the active file now, regardless of its size.
    ///
    /// Does nothing while the active file and the buffer are both empty.
    pub fn rotate(&mut self) -> Result<()> {
        if self.rotation.active_size == 0 && self.buffer.is_empty() {
            debug!("{} is empty, not rotating", self.path().display());
            return Ok(());
        }

        match self.rotate_now()? {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Lists the backups of this log, newest first.
    pub fn backups(&self) -> Result<Vec<Backup>> {
        Ok(self.backups.list(&self.storage)?)
    }

    /// Pushes the buffered bytes, syncs, and closes the active file.
    ///
    /// Dropping the writer does the same but can only log failures.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.sync()
    }

    /// Records pushed bytes with the durability scheduler and the rotation
    /// state. Sync failures are kept in `deferred` so the write path goes on.
    fn account(&mut self, pushed: usize, deferred: &mut Option<WriterError>) {
        if pushed == 0 {
            return;
        }

        if let Err(source) = self.durability.account(&mut self.file, pushed as u64) {
            warn!("failed to sync {}: {}", self.path().display(), source);
            deferred.get_or_insert(WriterError::Sync {
                path: self.path().to_path_buf(),
                source,
            });
        }

        self.rotation.account(pushed as u64);
    }

    fn drain(&mut self, deferred: &mut Option<WriterError>) -> Result<()> {
        match self.buffer.drain_into(&mut self.file) {
            Ok(pushed) => {
                self.account(pushed, deferred);
                Ok(())
            }
            Err(PushError { pushed, source }) => {
                self.account(pushed, deferred);
                Err(self.write_error(source))
            }
        }
    }

    /// Pushes `chunk` without buffering it. On failure, returns how many of
    /// its bytes reached the file.
    fn push_direct(
        &mut self,
        chunk: &[u8],
        deferred: &mut Option<WriterError>,
    ) -> std::result::Result<usize, (usize, WriterError)> {
        match push_all(&mut self.file, chunk) {
            Ok(pushed) => {
                self.account(pushed, deferred);
                Ok(pushed)
            }
            Err(PushError { pushed, source }) => {
                self.account(pushed, deferred);
                Err((pushed, self.write_error(source)))
            }
        }
    }

    fn write_error(&self, source: io::Error) -> WriterError {
        WriterError::Write {
            path: self.path().to_path_buf(),
            accepted: 0,
            source,
        }
    }

    fn rotation_error(&self, stage: RotationStage, source: io::Error) -> WriterError {
        WriterError::Rotation {
            path: self.path().to_path_buf(),
            stage,
            accepted: 0,
            source,
        }
    }

    fn backup_timestamp(&self) -> NaiveDateTime {
        if self.settings.local_time() {
            Local::now().naive_local()
        } else {
            Utc::now().naive_utc()
        }
    }

    /// Moves the active file to a backup and starts a new one.
    ///
    /// Any failure before the new file is open leaves the old file active.
    /// The old handle is released only once its successor is open, so there
    /// is always exactly one open file. Returns the (non-fatal) pruning error.
    #[instrument(skip_all, fields(backup))]
    fn rotate_now(&mut self) -> Result<Option<WriterError>> {
        let path = self.path().to_path_buf();

        if let Err(PushError { pushed, source }) = self.buffer.drain_into(&mut self.file) {
            self.rotation.account(pushed as u64);
            return Err(self.rotation_error(RotationStage::Drain, source));
        }

        self.durability
            .force(&mut self.file)
            .map_err(|e| self.rotation_error(RotationStage::Sync, e))?;

        let backup = self
            .backups
            .next_path(&self.storage, self.backup_timestamp())
            .map_err(|e| self.rotation_error(RotationStage::Name, e))?;

        self.storage
            .rename(&path, &backup)
            .map_err(|e| self.rotation_error(RotationStage::Rename, e))?;

        let (file, active_size) = match self.storage.open_append(&path) {
            Ok(opened) => opened,
            Err(e) => {
                if let Err(undo) = self.storage.rename(&backup, &path) {
                    error!(
                        "failed to move {} back to {}: {}",
                        backup.display(),
                        path.display(),
                        undo
                    );
                }
                return Err(self.rotation_error(RotationStage::Open, e));
            }
        };

        drop(std::mem::replace(&mut self.file, file));
        self.rotation.reset(active_size);
        self.durability.reset();

        tracing::Span::current().record("backup", backup.display().to_string());
        info!("rotated {} to {}", path.display(), backup.display());

        match self.backups.prune(&self.storage, self.settings.max_backups()) {
            Ok(_) => Ok(None),
            Err(e) => {
                warn!("failed to prune backups of {}: {}", path.display(), e);
                Ok(Some(e))
            }
        }
    }
}

impl<S: Storage> io::Write for RollingWriter<S> {
    /// Appends `buf`. Sync and prune failures were already logged and do not
    /// fail the write; a fatal failure after part of `buf` was accepted
    /// reports the partial count.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.append(buf) {
            Ok(n) => Ok(n),
            Err(e) if !e.is_fatal() => Ok(buf.len()),
            Err(e) => match e.accepted() {
                Some(n) if n > 0 => Ok(n),
                _ => Err(io::Error::other(e)),
            },
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match RollingWriter::flush(self) {
            Err(e) if e.is_fatal() => Err(io::Error::other(e)),
            _ => Ok(()),
        }
    }
}

impl<S: Storage> Drop for RollingWriter<S> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        if let Err(e) = self.sync() {
            warn!("failed to close {}: {}", self.path().display(), e);
        }
    }
}
