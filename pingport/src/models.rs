use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Location of one host's series inside the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey(PathBuf);

impl StoreKey {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A probe target, resolved once at startup and immutable afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    /// Line from the host list, used as the identity
    pub input: String,
    pub addr: IpAddr,
    pub key: StoreKey,
}

impl Host {
    /// `name:port (addr)` for names, `addr:port` for literal addresses
    pub fn display_name(&self, port: u16) -> String {
        if self.input == self.addr.to_string() {
            format!("{}:{}", self.input, port)
        } else {
            format!("{}:{} ({})", self.input, port, self.addr)
        }
    }
}

/// Why a connect attempt did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// Refused, unreachable or any other socket error
    Refused(String),
    /// Inner connect timeout expired
    TimedOut,
    /// Outer deadline expired before the inner timeout reported
    Deadline,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::Refused(reason) => write!(f, "{}", reason),
            ProbeFailure::TimedOut => write!(f, "connect timed out"),
            ProbeFailure::Deadline => write!(f, "probe deadline exceeded"),
        }
    }
}

/// Result of one probe for one round, never persisted as such
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub connected: bool,
    /// Zero when not connected
    pub elapsed: Duration,
    pub failure: Option<ProbeFailure>,
}

impl ProbeOutcome {
    pub fn success(elapsed: Duration) -> Self {
        Self {
            connected: true,
            elapsed,
            failure: None,
        }
    }

    pub fn failure(failure: ProbeFailure) -> Self {
        Self {
            connected: false,
            elapsed: Duration::ZERO,
            failure: Some(failure),
        }
    }

    /// Value written to the `connect` data source: the configured timeout on
    /// success, zero on failure.
    pub fn stored_connect(&self, timeout: Duration) -> f64 {
        if self.connected {
            timeout.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Persisted unit of a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub connect: f64,
    pub time: f64,
}

/// One consolidated slice of a series, `None` when no sample fell into it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub connect: Option<f64>,
    pub time: Option<f64>,
}

/// Health of a host for the current round, derived and never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Health {
    Ok,
    Failed,
    Flappy,
    Down,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Health::Ok => "ok",
            Health::Failed => "failed",
            Health::Flappy => "flappy",
            Health::Down => "down",
        };
        f.write_str(label)
    }
}
