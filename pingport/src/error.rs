//! Error types shared by the pingport modules
//!
//! A failed probe is not an error: it is a `ProbeOutcome` with `connected == false`.

use chrono::{DateTime, Utc};

/// Name resolution failure for a single host input
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no address found for {0}")]
    NoAddress(String),
    #[error("lookup of {name} failed: {source}")]
    Lookup {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by a time-series store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("series not created: {0}")]
    MissingSeries(String),
    #[error("update of {key} at {attempted} is not after last update {last}")]
    OutOfOrder {
        key: String,
        last: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },
    #[error("corrupt series {key} at line {line}: {reason}")]
    Corrupt {
        key: String,
        line: usize,
        reason: String,
    },
}

/// Unrecoverable scheduler failures
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("no resolvable host left to probe")]
    NoHosts,
    #[error("host task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}
