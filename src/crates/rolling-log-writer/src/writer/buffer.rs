use crate::storage::LogFile;
use std::io;

/// A push that stopped before all bytes reached the file.
#[derive(Debug)]
pub(super) struct PushError {
    /// Bytes the file accepted before the failure
    pub(super) pushed: usize,
    pub(super) source: io::Error,
}

/// Writes all of `data` to `file`, retrying short writes.
///
/// On failure the error reports how many bytes made it into the file, so the
/// caller never pushes them twice.
pub(super) fn push_all<F: LogFile>(file: &mut F, mut data: &[u8]) -> Result<usize, PushError> {
    let mut pushed = 0;

    while !data.is_empty() {
        match file.write(data) {
            Ok(0) => {
                return Err(PushError {
                    pushed,
                    source: io::Error::from(io::ErrorKind::WriteZero),
                });
            }
            Ok(n) => {
                pushed += n;
                data = &data[n..];
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => return Err(PushError { pushed, source }),
        }
    }

    Ok(pushed)
}

/// Pending bytes that have not been pushed to the active file yet.
#[derive(Debug)]
pub(super) struct WriteBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl WriteBuffer {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub(super) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(super) fn is_full(&self) -> bool {
        self.buf.len() >= self.capacity
    }

    pub(super) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copies as much of `data` as fits, at most `limit` bytes.
    pub(super) fn fill(&mut self, data: &[u8], limit: usize) -> usize {
        let room = self.capacity.saturating_sub(self.buf.len());
        let n = data.len().min(room).min(limit);
        self.buf.extend_from_slice(&data[..n]);
        n
    }

    /// Pushes the pending bytes to `file` in one write.
    ///
    /// Bytes the file accepted are removed from the buffer even when the
    /// push fails half way; the rest stays pending.
    pub(super) fn drain_into<F: LogFile>(&mut self, file: &mut F) -> Result<usize, PushError> {
        if self.buf.is_empty() {
            return Ok(0);
        }

        let result = push_all(file, &self.buf);
        let pushed = match &result {
            Ok(n) => *n,
            Err(e) => e.pushed,
        };
        self.buf.drain(..pushed);

        result
    }
}
