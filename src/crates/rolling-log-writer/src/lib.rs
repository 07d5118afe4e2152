//! Buffered, size-rotating log file writer
//!
//! This crate writes a continuous stream of already serialized log records to
//! a file, rotating it to a timestamped backup once it reaches a configured
//! size and keeping a bounded number of backups.
//!
//! Three thresholds control the I/O pattern:
//!
//! - **flush size**: records are buffered in memory and pushed to the page
//!   cache in writes of this size;
//! - **sync size**: after this many pushed bytes the file is synced to stable
//!   storage;
//! - **rotation size**: once the file holds this many bytes it is renamed to
//!   `<path>-<timestamp>` and a new file is started.
//!
//! Outside relaxed mode all three are aligned to 4 KiB pages.
//!
//! ## Usage
//!
//! ```no_run
//! use rolling_log_writer::{Config, RollingWriter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::new("/var/log/myapp/app.log")
//!     .with_max_size_mb(64) // rotate every 64 MiB
//!     .with_max_backups(8);
//!
//! let mut log = RollingWriter::open(&config)?;
//!
//! log.append(b"{\"msg\":\"hello\"}\n")?;
//! log.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! With the `tracing-subscriber` feature (on by default) a [`SharedWriter`]
//! can back a `tracing_subscriber::fmt` layer:
//!
//! ```no_run
//! use rolling_log_writer::{Config, RollingWriter, SharedWriter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let log = SharedWriter::new(RollingWriter::open(&Config::new("app.log"))?);
//!
//! tracing_subscriber::fmt().with_writer(log.clone()).init();
//! # Ok(())
//! # }
//! ```

mod error;
mod storage;
mod writer;

pub use error::{PruneFailure, Result, RotationStage, WriterError};
pub use storage::{LocalStorage, LogFile, Storage};
pub use writer::{
    Backup, Config, Defaults, PAGE_SIZE, RollingWriter, Settings, SharedWriter, Thresholds,
    align_to_page,
};

#[cfg(feature = "tracing-subscriber")]
pub use writer::WriterGuard;
