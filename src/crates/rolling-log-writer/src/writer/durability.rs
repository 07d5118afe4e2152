use crate::storage::LogFile;
use std::io;
use tracing::debug;

/// Issues a sync every `sync_size` pushed bytes.
#[derive(Debug)]
pub(super) struct SyncScheduler {
    dirty: u64,
    sync_size: u64,
}

impl SyncScheduler {
    pub(super) fn new(sync_size: u64) -> Self {
        Self {
            dirty: 0,
            sync_size,
        }
    }

    /// Bytes pushed since the last sync.
    pub(super) fn dirty(&self) -> u64 {
        self.dirty
    }

    /// Records `pushed` bytes and syncs `file` once the threshold is reached.
    ///
    /// The counter restarts at zero after every attempt, successful or not;
    /// overshoot is not carried into the next cycle.
    pub(super) fn account<F: LogFile>(&mut self, file: &mut F, pushed: u64) -> io::Result<bool> {
        self.dirty = self.dirty.saturating_add(pushed);
        if self.dirty < self.sync_size {
            return Ok(false);
        }

        let dirty = self.dirty;
        self.dirty = 0;
        file.sync()?;
        debug!("synced {} bytes", dirty);

        Ok(true)
    }

    /// Syncs `file` regardless of the dirty count.
    pub(super) fn force<F: LogFile>(&mut self, file: &mut F) -> io::Result<()> {
        self.dirty = 0;
        file.sync()
    }

    pub(super) fn reset(&mut self) {
        self.dirty = 0;
    }
}
