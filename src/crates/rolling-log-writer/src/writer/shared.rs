use super::{Backup, RollingWriter};
use crate::error::Result;
use crate::storage::{LocalStorage, Storage};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::io::{self, Write};
use std::sync::Arc;

/// A [`RollingWriter`] that can be shared between threads.
///
/// Every operation holds a single lock for its whole duration, so buffering,
/// pushing, syncing and rotating never interleave between callers.
///
/// The lock is reentrant so that a thread which emits a tracing event while
/// it holds the writer (e.g. the rotation notice, when this writer backs the
/// global `fmt` layer) does not deadlock on itself. Such nested output is
/// discarded.
pub struct SharedWriter<S: Storage = LocalStorage> {
    inner: Arc<ReentrantMutex<RefCell<RollingWriter<S>>>>,
}

impl<S: Storage> Clone for SharedWriter<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Storage> SharedWriter<S> {
    pub fn new(writer: RollingWriter<S>) -> Self {
        Self {
            inner: Arc::new(ReentrantMutex::new(RefCell::new(writer))),
        }
    }

    /// See [`RollingWriter::append`].
    pub fn append(&self, data: &[u8]) -> Result<usize> {
        self.with(|writer| writer.append(data))
    }

    /// See [`RollingWriter::flush`].
    pub fn flush(&self) -> Result<()> {
        self.with(|writer| writer.flush())
    }

    /// See [`RollingWriter::sync`].
    pub fn sync(&self) -> Result<()> {
        self.with(|writer| writer.sync())
    }

    /// See [`RollingWriter::rotate`].
    pub fn rotate(&self) -> Result<()> {
        self.with(|writer| writer.rotate())
    }

    /// See [`RollingWriter::backups`].
    pub fn backups(&self) -> Result<Vec<Backup>> {
        self.with(|writer| writer.backups())
    }

    /// Runs `f` with exclusive access to the writer.
    ///
    /// # Panics
    ///
    /// If `f` calls back into this writer.
    pub fn with<R>(&self, f: impl FnOnce(&mut RollingWriter<S>) -> R) -> R {
        let guard = self.inner.lock();
        let mut writer = guard.borrow_mut();
        f(&mut writer)
    }

    /// Closes the writer if this is the last handle, otherwise syncs it.
    pub fn close(self) -> Result<()> {
        match Arc::try_unwrap(self.inner) {
            Ok(writer) => writer.into_inner().into_inner().close(),
            Err(inner) => Self { inner }.sync(),
        }
    }
}

impl<S: Storage> io::Write for &SharedWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with(|writer| writer.write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.with(|writer| writer.write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with(|writer| io::Write::flush(writer))
    }
}

#[cfg(feature = "tracing-subscriber")]
mod make_writer {
    use super::*;
    use parking_lot::ReentrantMutexGuard;

    /// Exclusive access to a shared writer for the duration of one event.
    ///
    /// Writes made while the same thread is already inside the writer are
    /// dropped.
    pub struct WriterGuard<'a, S: Storage>(ReentrantMutexGuard<'a, RefCell<RollingWriter<S>>>);

    impl<S: Storage> io::Write for WriterGuard<'_, S> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match self.0.try_borrow_mut() {
                Ok(mut writer) => writer.write(buf),
                Err(_) => Ok(buf.len()),
            }
        }

        fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
            match self.0.try_borrow_mut() {
                Ok(mut writer) => writer.write_all(buf),
                Err(_) => Ok(()),
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            match self.0.try_borrow_mut() {
                Ok(mut writer) => io::Write::flush(&mut *writer),
                Err(_) => Ok(()),
            }
        }
    }

    /// Lets a `tracing_subscriber::fmt` layer write into the rolling log.
    /// Each formatted event is written under one lock acquisition, so events
    /// from different threads never interleave.
    impl<'a, S: Storage + 'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedWriter<S> {
        type Writer = WriterGuard<'a, S>;

        fn make_writer(&'a self) -> Self::Writer {
            WriterGuard(self.inner.lock())
        }
    }
}

#[cfg(feature = "tracing-subscriber")]
pub use make_writer::WriterGuard;
