//! Pingport - periodic TCP reachability prober
//!
//! Probes a list of hosts on one TCP port every round, records each attempt in a
//! per-host time series and flags hosts that are flapping or down:
//! - Name resolution once at startup (`resolver`)
//! - Bounded-timeout TCP connects (`prober`)
//! - History-based health heuristics (`classifier`)
//! - Drift-corrected round loop (`scheduler`)
//! - Time-series persistence (`store`)

pub mod classifier;
pub mod config;
pub mod error;
pub mod input;
pub mod models;
pub mod prober;
pub mod resolver;
pub mod scheduler;
pub mod store;

pub use classifier::Classifier;
pub use error::{ResolveError, SchedulerError, StoreError};
pub use models::{Bucket, Health, Host, ProbeFailure, ProbeOutcome, Sample, StoreKey};
pub use prober::{Probe, TcpProber};
pub use resolver::{HostTable, Resolve, SystemResolver};
pub use scheduler::{Cadence, HostRound, RoundReport, ScheduleSettings, Scheduler};
pub use store::{file::FileStore, Reducer, SampleTime, SeriesSchema, TimeSeriesStore};
