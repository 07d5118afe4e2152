use anyhow::{Context, Result, bail};
use clap::Parser;
use rolling_log_writer::Config;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "rollcat")]
#[command(about = "Copy stdin into a size-rotated log file")]
#[command(version)]
pub struct CliArgs {
    /// Path to a YAML configuration file; flags override its values
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Path of the active log file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Rotate the log once it reaches this many megabytes
    #[arg(long)]
    pub max_size_mb: Option<i64>,

    /// Number of rotated files to keep
    #[arg(long)]
    pub max_backups: Option<i64>,

    /// Use local time instead of UTC in backup names
    #[arg(long)]
    pub local_time: bool,

    /// Buffer this many kilobytes before writing to the file
    #[arg(long)]
    pub per_write_size_kb: Option<i64>,

    /// Sync the file after this many megabytes were written
    #[arg(long)]
    pub per_sync_size_mb: Option<i64>,

    /// Treat sizes as bytes and skip page alignment
    #[arg(long)]
    pub relaxed: bool,
}

impl CliArgs {
    /// Builds the writer configuration from the config file (if any) and the
    /// command line flags.
    pub fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => from_yaml_file(path)
                .with_context(|| format!("Loading config from {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(output) = self.output {
            config.output_path = output;
        }
        if let Some(max_size_mb) = self.max_size_mb {
            config.max_size_mb = max_size_mb;
        }
        if let Some(max_backups) = self.max_backups {
            config.max_backups = max_backups;
        }
        if let Some(per_write_size_kb) = self.per_write_size_kb {
            config.per_write_size_kb = per_write_size_kb;
        }
        if let Some(per_sync_size_mb) = self.per_sync_size_mb {
            config.per_sync_size_mb = per_sync_size_mb;
        }
        config.local_time |= self.local_time;
        config.relaxed |= self.relaxed;

        if config.output_path.as_os_str().is_empty() {
            bail!("no output path given, use --output or set output_path in the config file");
        }

        Ok(config)
    }
}

fn from_yaml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)?;
    let config = serde_yaml::from_str(&contents)?;
    Ok(config)
}
