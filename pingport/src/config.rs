//! Configuration management
//!
//! Handles:
//! - Command-line flags (port, storage root, interval, timeout, input, verbosity)
//! - Optional TOML config file (explicit path, `PINGPORT_CONFIG`, or OS config dir)
//! - Validation into the scheduler settings

use crate::scheduler::ScheduleSettings;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_STORE_WORKERS: usize = 16;

/// Command-line flags; any flag given overrides the config file
#[derive(Debug, Default, Parser)]
#[command(name = "pingport")]
#[command(about = "Probe TCP reachability of a host list and record it as time series")]
#[command(long_about = None)]
pub struct Cli {
    /// TCP port to probe
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage root for the per-host series (default ./rrd)
    #[arg(long)]
    pub rrd: Option<PathBuf>,

    /// Round interval in seconds (default 300)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Connect timeout in seconds (default 30)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Host list, one per line ("-" reads stdin, the default)
    #[arg(long = "input-file", alias = "input_file")]
    pub input_file: Option<String>,

    /// Show per-probe progress messages
    #[arg(short, long)]
    pub verbose: bool,

    /// Maximum concurrent store writes
    #[arg(long)]
    pub store_workers: Option<usize>,

    /// TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("a TCP port is required (--port or `port` in the config file)")]
    MissingPort,
    #[error("interval must be at least one second")]
    ZeroInterval,
    #[error("timeout must be at least one second")]
    ZeroTimeout,
    #[error("timeout ({timeout}s) must be shorter than the interval ({interval}s)")]
    TimeoutTooLong { timeout: u64, interval: u64 },
    #[error("store_workers must be at least 1")]
    ZeroWorkers,
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingportConfig {
    pub port: Option<u16>,
    pub timeout_secs: u64,
    pub interval_secs: u64,
    pub storage_root: PathBuf,
    /// `None` reads the host list from stdin
    pub input: Option<PathBuf>,
    pub verbose: bool,
    pub store_workers: usize,
}

impl Default for PingportConfig {
    fn default() -> Self {
        Self {
            port: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            interval_secs: DEFAULT_INTERVAL_SECS,
            storage_root: PathBuf::from("rrd"),
            input: None,
            verbose: false,
            store_workers: DEFAULT_STORE_WORKERS,
        }
    }
}

impl PingportConfig {
    /// Load the config file. An explicit path (flag or `PINGPORT_CONFIG`) must
    /// exist; the OS default location is optional.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("PINGPORT_CONFIG").map(PathBuf::from));

        let path = match explicit {
            Some(path) => path,
            None => match Self::config_file_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        Self::parse(&content, &path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// OS-specific default config location
    pub fn config_file_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("pingport");
        path.push("config.toml");
        Some(path)
    }

    /// Flags given on the command line win over file values
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(port) = cli.port {
            self.port = Some(port);
        }
        if let Some(rrd) = &cli.rrd {
            self.storage_root = rrd.clone();
        }
        if let Some(interval) = cli.interval {
            self.interval_secs = interval;
        }
        if let Some(timeout) = cli.timeout {
            self.timeout_secs = timeout;
        }
        match cli.input_file.as_deref() {
            Some("-") => self.input = None,
            Some(path) => self.input = Some(PathBuf::from(path)),
            None => {}
        }
        if cli.verbose {
            self.verbose = true;
        }
        if let Some(workers) = cli.store_workers {
            self.store_workers = workers;
        }
    }

    pub fn settings(&self) -> Result<ScheduleSettings, ConfigError> {
        let port = self.port.ok_or(ConfigError::MissingPort)?;
        if self.interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.timeout_secs >= self.interval_secs {
            return Err(ConfigError::TimeoutTooLong {
                timeout: self.timeout_secs,
                interval: self.interval_secs,
            });
        }
        if self.store_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }

        Ok(ScheduleSettings {
            port,
            interval: Duration::from_secs(self.interval_secs),
            timeout: Duration::from_secs(self.timeout_secs),
            store_workers: self.store_workers,
        })
    }
}
