//! Host health heuristics
//!
//! A failed probe is escalated by looking at the series history:
//! - previous sample connected -> flappy
//! - no connect in the last 5 buckets of the trailing window -> down
//! - anything else -> isolated failure
//!
//! At most two store reads per failed probe, none for a successful one.

use crate::error::StoreError;
use crate::models::{Health, Host, ProbeOutcome};
use crate::store::{Reducer, TimeSeriesStore};
use std::time::Duration;
use tracing::{error, warn};

/// Number of trailing buckets that must all be zero to call a host down
pub const DOWN_BUCKETS: usize = 5;

/// Trailing window, in rounds, read from the store
pub const HISTORY_ROUNDS: u32 = 6;

#[derive(Debug, Clone)]
pub struct Classifier {
    interval: Duration,
    port: u16,
}

impl Classifier {
    pub fn new(interval: Duration, port: u16) -> Self {
        Self { interval, port }
    }

    /// Classify the current round for `host`. Must run before the current
    /// outcome is appended: the last stored sample is the previous round.
    pub fn classify<S>(
        &self,
        host: &Host,
        outcome: &ProbeOutcome,
        store: &S,
    ) -> Result<Health, StoreError>
    where
        S: TimeSeriesStore + ?Sized,
    {
        if outcome.connected {
            return Ok(Health::Ok);
        }

        let name = host.display_name(self.port);

        if let Some(previous) = store.last_sample(&host.key)? {
            if previous.connect != 0.0 {
                warn!("{} is flappy", name);
                return Ok(Health::Flappy);
            }
        }

        let window = self.interval * HISTORY_ROUNDS;
        let mut connects: Vec<f64> = store
            .fetch_range(&host.key, Reducer::Min, window)?
            .into_iter()
            .filter_map(|bucket| bucket.connect)
            .collect();

        // Le round courant est le bucket le plus récent
        connects.push(0.0);

        let tail = &connects[connects.len().saturating_sub(DOWN_BUCKETS)..];
        if tail.len() == DOWN_BUCKETS && tail.iter().all(|c| *c == 0.0) {
            error!("{} is down", name);
            return Ok(Health::Down);
        }

        Ok(Health::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProbeFailure, StoreKey};
    use crate::store::file::FileStore;
    use crate::store::{SampleTime, SeriesSchema};
    use chrono::Utc;
    use tempfile::TempDir;

    const INTERVAL: Duration = Duration::from_secs(300);

    struct Fixture {
        _dir: TempDir,
        store: FileStore,
        host: Host,
    }

    /// Series whose samples are `history` (oldest first), one per round,
    /// the last one a round ago.
    fn fixture(history: &[f64]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let host = Host {
            input: "web-1".to_string(),
            addr: "10.0.0.1".parse().unwrap(),
            key: StoreKey::new(dir.path().join("10/0/0/1.series")),
        };
        store
            .create(&host.key, &SeriesSchema::for_probing(INTERVAL, Duration::from_secs(30)))
            .unwrap();

        let rounds = history.len() as i64;
        for (i, connect) in history.iter().enumerate() {
            let age = (rounds - i as i64) * INTERVAL.as_secs() as i64;
            let at = SampleTime::At(Utc::now() - chrono::Duration::seconds(age));
            store.update(&host.key, at, *connect, 0.0).unwrap();
        }

        Fixture { _dir: dir, store, host }
    }

    fn failed() -> ProbeOutcome {
        ProbeOutcome::failure(ProbeFailure::Refused("ConnectionRefused".to_string()))
    }

    fn classifier() -> Classifier {
        Classifier::new(INTERVAL, 443)
    }

    #[test]
    fn test_success_is_ok_without_store_reads() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let host = Host {
            input: "never-created".to_string(),
            addr: "10.9.9.9".parse().unwrap(),
            key: StoreKey::new(dir.path().join("missing.series")),
        };

        // Une lecture échouerait avec MissingSeries
        let health = classifier()
            .classify(&host, &ProbeOutcome::success(Duration::from_millis(3)), &store)
            .unwrap();
        assert_eq!(health, Health::Ok);
    }

    #[test]
    fn test_failure_after_success_is_flappy() {
        let f = fixture(&[0.0, 0.0, 0.0, 0.0, 30.0]);
        assert_eq!(classifier().classify(&f.host, &failed(), &f.store).unwrap(), Health::Flappy);
    }

    #[test]
    fn test_first_failure_on_empty_series() {
        let f = fixture(&[]);
        assert_eq!(classifier().classify(&f.host, &failed(), &f.store).unwrap(), Health::Failed);
    }

    #[test]
    fn test_four_failed_rounds_plus_current_is_down() {
        let f = fixture(&[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(classifier().classify(&f.host, &failed(), &f.store).unwrap(), Health::Down);
    }

    #[test]
    fn test_short_history_never_down() {
        let f = fixture(&[0.0, 0.0, 0.0]);
        assert_eq!(classifier().classify(&f.host, &failed(), &f.store).unwrap(), Health::Failed);
    }

    #[test]
    fn test_success_inside_window_prevents_down() {
        let f = fixture(&[0.0, 30.0, 0.0, 0.0]);
        assert_eq!(classifier().classify(&f.host, &failed(), &f.store).unwrap(), Health::Failed);
    }

    #[test]
    fn test_success_outside_window_is_ignored() {
        let f = fixture(&[30.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(classifier().classify(&f.host, &failed(), &f.store).unwrap(), Health::Down);
    }
}
