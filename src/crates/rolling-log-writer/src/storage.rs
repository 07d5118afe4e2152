//! File system operations used by the writer.
//!
//! The writer never touches `std::fs` directly; everything goes through
//! [`Storage`] so that failures of individual calls can be injected.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// An open, append-only log file.
pub trait LogFile {
    /// Pushes bytes to the file, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Blocks until previously written bytes are on stable storage.
    fn sync(&mut self) -> io::Result<()>;
}

/// The file system calls a rolling log depends on.
pub trait Storage {
    type File: LogFile;

    /// Opens `path` for appending, creating it (and its parent directory)
    /// when absent. Returns the file and its current length.
    fn open_append(&self, path: &Path) -> io::Result<(Self::File, u64)>;

    /// Atomically renames `from` to `to`.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Removes a file.
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Lists the names of the regular files in `dir`.
    fn list(&self, dir: &Path) -> io::Result<Vec<OsString>>;
}

/// [`Storage`] backed by the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorage;

impl LogFile for File {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(self, buf)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

impl Storage for LocalStorage {
    type File = File;

    fn open_append(&self, path: &Path) -> io::Result<(File, u64)> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();

        Ok((file, len))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<OsString>> {
        let mut names = Vec::new();

        for entry in fs::read_dir(dir)? {
            let Ok(entry) = entry else {
                continue;
            };

            if let Ok(file_type) = entry.file_type() {
                if !file_type.is_file() {
                    continue;
                }
            }

            names.push(entry.file_name());
        }

        Ok(names)
    }
}
