use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Granularity that thresholds are aligned to outside relaxed mode.
pub const PAGE_SIZE: u64 = 1 << 12;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;

/// Rounds `n` up to the next multiple of [`PAGE_SIZE`].
///
/// Values within a page of `u64::MAX` saturate to the largest aligned value.
pub fn align_to_page(n: u64) -> u64 {
    match n.checked_add(PAGE_SIZE - 1) {
        Some(n) => n & !(PAGE_SIZE - 1),
        None => u64::MAX & !(PAGE_SIZE - 1),
    }
}

/// Values used for thresholds that the user left unset.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Defaults {
    pub rotation_size: u64,
    pub flush_size: u64,
    pub sync_size: u64,
    pub max_backups: usize,
}

impl Defaults {
    pub const fn new() -> Self {
        Self {
            rotation_size: 128 * MB,
            flush_size: 64 * KB,
            sync_size: 16 * MB,
            // Log shippers collect the files, there is no point in keeping many.
            max_backups: 4,
        }
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self::new()
    }
}

/// Size thresholds in bytes, plus the retained backup count.
///
/// A zero field means "unset".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Thresholds {
    /// Size at which the active file is rotated
    pub rotation_size: u64,
    /// Number of buffered bytes that triggers a push to the file
    pub flush_size: u64,
    /// Number of pushed bytes that triggers a durability sync
    pub sync_size: u64,
    /// Number of backups to keep
    pub max_backups: usize,
}

impl Thresholds {
    /// Replaces unset fields with the given defaults.
    pub fn with_defaults(self, defaults: &Defaults) -> Self {
        fn or(value: u64, default: u64) -> u64 {
            if value == 0 { default } else { value }
        }

        Self {
            rotation_size: or(self.rotation_size, defaults.rotation_size),
            flush_size: or(self.flush_size, defaults.flush_size),
            sync_size: or(self.sync_size, defaults.sync_size),
            max_backups: if self.max_backups == 0 {
                defaults.max_backups.max(1)
            } else {
                self.max_backups
            },
        }
    }

    /// Derives the effective thresholds.
    ///
    /// After this call every size is positive, `flush_size <= rotation_size`
    /// and `sync_size >= 2 * flush_size`. Unless `relaxed` is set, all sizes
    /// are multiples of [`PAGE_SIZE`]. The operation is idempotent.
    pub fn normalize(self, defaults: &Defaults, relaxed: bool) -> Self {
        let mut t = self.with_defaults(defaults);

        t.flush_size = t.flush_size.min(t.rotation_size);

        if !relaxed {
            t.rotation_size = align_to_page(t.rotation_size);
            t.flush_size = align_to_page(t.flush_size);
        }

        let sync_floor = t.flush_size.saturating_mul(2);
        if t.sync_size < sync_floor {
            t.sync_size = sync_floor;
        }

        if !relaxed {
            t.sync_size = align_to_page(t.sync_size);
        }

        t
    }
}

/// User supplied configuration of a rolling log.
///
/// Sizes are expressed in the units of their field names. In relaxed mode
/// they are taken as plain bytes and are not page aligned, which allows tests
/// to use tiny thresholds. Zero or negative values select the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path of the active log file
    pub output_path: PathBuf,
    /// Maximum size of a log file before it gets rotated
    pub max_size_mb: i64,
    /// Maximum number of backups to retain
    pub max_backups: i64,
    /// Use local time instead of UTC in backup names
    pub local_time: bool,
    /// Number of bytes buffered before they are written to the page cache
    #[serde(rename = "per_write_size")]
    pub per_write_size_kb: i64,
    /// Number of written bytes after which the file is synced
    #[serde(rename = "per_sync_size")]
    pub per_sync_size_mb: i64,
    /// Skip unit conversion and page alignment
    #[serde(alias = "developed")]
    pub relaxed: bool,
}

impl Config {
    /// Creates a configuration with every threshold left to its default.
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            ..Default::default()
        }
    }

    /// Specifies the rotation size in megabytes.
    pub fn with_max_size_mb(mut self, max_size_mb: i64) -> Self {
        self.max_size_mb = max_size_mb;
        self
    }

    /// Specifies the number of retained backups.
    pub fn with_max_backups(mut self, max_backups: i64) -> Self {
        self.max_backups = max_backups;
        self
    }

    /// Specifies whether backup names use local time.
    pub fn with_local_time(mut self, local_time: bool) -> Self {
        self.local_time = local_time;
        self
    }

    /// Specifies the flush size in kilobytes.
    pub fn with_per_write_size_kb(mut self, per_write_size_kb: i64) -> Self {
        self.per_write_size_kb = per_write_size_kb;
        self
    }

    /// Specifies the sync size in megabytes.
    pub fn with_per_sync_size_mb(mut self, per_sync_size_mb: i64) -> Self {
        self.per_sync_size_mb = per_sync_size_mb;
        self
    }

    /// Specifies relaxed mode.
    pub fn with_relaxed(mut self, relaxed: bool) -> Self {
        self.relaxed = relaxed;
        self
    }

    /// Converts the configured sizes to bytes without applying defaults.
    pub fn to_bytes(&self) -> Thresholds {
        let (kb, mb) = if self.relaxed { (1, 1) } else { (KB, MB) };

        fn scale(value: i64, unit: u64) -> u64 {
            u64::try_from(value).unwrap_or(0).saturating_mul(unit)
        }

        Thresholds {
            rotation_size: scale(self.max_size_mb, mb),
            flush_size: scale(self.per_write_size_kb, kb),
            sync_size: scale(self.per_sync_size_mb, mb),
            max_backups: usize::try_from(self.max_backups).unwrap_or(0),
        }
    }

    /// Normalizes the configuration with the built-in defaults.
    pub fn normalize(&self) -> Settings {
        self.normalize_with(&Defaults::default())
    }

    /// Normalizes the configuration with the given defaults.
    pub fn normalize_with(&self, defaults: &Defaults) -> Settings {
        Settings {
            output_path: self.output_path.clone(),
            thresholds: self.to_bytes().normalize(defaults, self.relaxed),
            local_time: self.local_time,
            relaxed: self.relaxed,
        }
    }
}

/// Effective configuration of a rolling log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    output_path: PathBuf,
    thresholds: Thresholds,
    local_time: bool,
    relaxed: bool,
}

impl Settings {
    /// Creates settings from byte thresholds, normalizing them with the
    /// built-in defaults.
    pub fn new(output_path: impl Into<PathBuf>, thresholds: Thresholds, relaxed: bool) -> Self {
        Self {
            output_path: output_path.into(),
            thresholds: thresholds.normalize(&Defaults::default(), relaxed),
            local_time: false,
            relaxed,
        }
    }

    /// Specifies whether backup names use local time.
    pub fn with_local_time(mut self, local_time: bool) -> Self {
        self.local_time = local_time;
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn rotation_size(&self) -> u64 {
        self.thresholds.rotation_size
    }

    pub fn flush_size(&self) -> u64 {
        self.thresholds.flush_size
    }

    pub fn sync_size(&self) -> u64 {
        self.thresholds.sync_size
    }

    pub fn max_backups(&self) -> usize {
        self.thresholds.max_backups
    }

    pub fn local_time(&self) -> bool {
        self.local_time
    }

    pub fn relaxed(&self) -> bool {
        self.relaxed
    }
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        config.normalize()
    }
}
