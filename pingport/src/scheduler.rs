//! Drift-corrected probe rounds
//!
//! Round `i` fans out one task per host. Each task probes, starts its own
//! `interval - drift` pause right after the probe, classifies and stores the
//! result on the blocking pool, then waits for the pause to end. The round is
//! over when every host task is; drift is then measured against
//! `start + i * interval` and fed into the next round.

use crate::classifier::Classifier;
use crate::error::SchedulerError;
use crate::models::{Health, Host, ProbeOutcome};
use crate::prober::Probe;
use crate::resolver::HostTable;
use crate::store::{SampleTime, SeriesSchema, TimeSeriesStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

/// Timing and sizing of the probe loop
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub port: u16,
    pub interval: Duration,
    pub timeout: Duration,
    /// Concurrent store calls allowed on the blocking pool
    pub store_workers: usize,
}

/// Round counter and drift carried from one round to the next
#[derive(Debug, Clone)]
pub struct Cadence {
    interval: Duration,
    started: Instant,
    round: u32,
    /// Seconds behind (positive) or ahead (negative) of the ideal schedule
    drift: f64,
}

impl Cadence {
    pub fn new(interval: Duration, started: Instant) -> Self {
        Self {
            interval,
            started,
            round: 0,
            drift: 0.0,
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn drift(&self) -> f64 {
        self.drift
    }

    /// Pause for the current round: `interval - drift`, never negative
    pub fn adjusted_interval(&self) -> Duration {
        Duration::from_secs_f64((self.interval.as_secs_f64() - self.drift).max(0.0))
    }

    /// Ideal start of `round` (1-indexed)
    pub fn ideal_start(&self, round: u32) -> Instant {
        self.started + self.interval * round.saturating_sub(1)
    }

    /// Open the next round and return its pause
    pub fn begin_round(&mut self) -> Duration {
        self.round += 1;
        self.adjusted_interval()
    }

    /// Close the current round at `now` and return the new drift
    pub fn finish_round(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        self.drift = elapsed - self.round as f64 * self.interval.as_secs_f64();
        self.drift
    }
}

/// What happened to one host during one round
#[derive(Debug, Clone, PartialEq)]
pub struct HostRound {
    pub input: String,
    pub health: Health,
    /// False when the sample could not be appended, even after the retry
    pub stored: bool,
}

/// Summary of a completed round
#[derive(Debug, Clone, Default)]
pub struct RoundReport {
    pub round: u32,
    pub hosts: Vec<HostRound>,
    pub drift: f64,
}

impl RoundReport {
    pub fn count(&self, health: Health) -> usize {
        self.hosts.iter().filter(|h| h.health == health).count()
    }

    pub fn store_errors(&self) -> usize {
        self.hosts.iter().filter(|h| !h.stored).count()
    }

    pub fn health_of(&self, input: &str) -> Option<Health> {
        self.hosts.iter().find(|h| h.input == input).map(|h| h.health)
    }
}

/// Periodic prober over an immutable host table
pub struct Scheduler<P, S> {
    hosts: Arc<HostTable>,
    prober: Arc<P>,
    store: Arc<S>,
    classifier: Classifier,
    settings: ScheduleSettings,
    store_permits: Arc<Semaphore>,
    cadence: Option<Cadence>,
}

impl<P: Probe, S: TimeSeriesStore> Scheduler<P, S> {
    /// Create every host's series and build the scheduler. Hosts whose series
    /// cannot be created are dropped; an empty table is an error.
    pub fn prepare(
        mut hosts: HostTable,
        prober: P,
        store: Arc<S>,
        settings: ScheduleSettings,
    ) -> Result<Self, SchedulerError> {
        let schema = SeriesSchema::for_probing(settings.interval, settings.timeout);

        hosts.retain(|host| match store.create(&host.key, &schema) {
            Ok(()) => true,
            Err(e) => {
                error!("Cannot create series {} for {}, host dropped: {}", host.key, host.input, e);
                false
            }
        });

        if hosts.is_empty() {
            return Err(SchedulerError::NoHosts);
        }

        Ok(Self {
            hosts: Arc::new(hosts),
            prober: Arc::new(prober),
            store,
            classifier: Classifier::new(settings.interval, settings.port),
            store_permits: Arc::new(Semaphore::new(settings.store_workers.max(1))),
            settings,
            cadence: None,
        })
    }

    pub fn hosts(&self) -> &HostTable {
        &self.hosts
    }

    pub fn cadence(&self) -> Option<&Cadence> {
        self.cadence.as_ref()
    }

    /// Probe forever. Only returns on an unrecoverable error; dropping the
    /// future aborts every in-flight host task.
    pub async fn run(mut self) -> Result<(), SchedulerError> {
        info!(
            "Probing {} hosts on port {} every {} (timeout {})",
            self.hosts.len(),
            self.settings.port,
            humantime::format_duration(self.settings.interval),
            humantime::format_duration(self.settings.timeout)
        );

        loop {
            self.next_round().await?;
        }
    }

    /// Run one full round and return once every host's cycle is complete
    pub async fn next_round(&mut self) -> Result<RoundReport, SchedulerError> {
        let interval = self.settings.interval;
        let cadence = self.cadence.get_or_insert_with(|| Cadence::new(interval, Instant::now()));
        let pause = cadence.begin_round();
        let round = cadence.round();
        debug!("Round {} starting, pause {:?} after each probe", round, pause);

        let mut tasks = JoinSet::new();
        for host in self.hosts.hosts() {
            tasks.spawn(host_cycle(
                host.clone(),
                self.prober.clone(),
                self.store.clone(),
                self.classifier.clone(),
                self.store_permits.clone(),
                self.settings.timeout,
                pause,
            ));
        }

        let mut report = RoundReport {
            round,
            ..Default::default()
        };
        while let Some(result) = tasks.join_next().await {
            report.hosts.push(result?);
        }

        if let Some(cadence) = self.cadence.as_mut() {
            report.drift = cadence.finish_round(Instant::now());
        }

        info!(
            "Round {} done - {} ok, {} failed, {} flappy, {} down, {} store errors, drift {:.3}s",
            round,
            report.count(Health::Ok),
            report.count(Health::Failed),
            report.count(Health::Flappy),
            report.count(Health::Down),
            report.store_errors(),
            report.drift
        );
        Ok(report)
    }
}

/// Probe, arm the pause, classify + store, then wait out the pause
async fn host_cycle<P, S>(
    host: Arc<Host>,
    prober: Arc<P>,
    store: Arc<S>,
    classifier: Classifier,
    permits: Arc<Semaphore>,
    timeout: Duration,
    pause: Duration,
) -> HostRound
where
    P: Probe,
    S: TimeSeriesStore,
{
    let outcome = prober.probe(&host).await;
    let wake = Instant::now() + pause;

    let permit = permits.acquire_owned().await.ok();
    let input = host.input.clone();
    let recorded = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        record(&*store, &classifier, &host, &outcome, timeout)
    })
    .await;

    let result = match recorded {
        Ok(result) => result,
        Err(e) => {
            error!("Store step for {} aborted: {}", input, e);
            HostRound {
                input,
                health: Health::Failed,
                stored: false,
            }
        }
    };

    time::sleep_until(wake).await;
    result
}

/// Classify then append one sample; the update is retried once before the
/// sample is reported lost.
fn record<S>(
    store: &S,
    classifier: &Classifier,
    host: &Host,
    outcome: &ProbeOutcome,
    timeout: Duration,
) -> HostRound
where
    S: TimeSeriesStore + ?Sized,
{
    let health = match classifier.classify(host, outcome, store) {
        Ok(health) => health,
        Err(e) => {
            warn!("Cannot read history of {}: {}", host.key, e);
            if outcome.connected {
                Health::Ok
            } else {
                Health::Failed
            }
        }
    };

    let connect = outcome.stored_connect(timeout);
    let elapsed = outcome.elapsed.as_secs_f64();

    let mut stored = store.update(&host.key, SampleTime::Now, connect, elapsed);
    if let Err(e) = &stored {
        warn!("Update of {} failed ({}), retrying once", host.key, e);
        stored = store.update(&host.key, SampleTime::Now, connect, elapsed);
    }
    if let Err(e) = &stored {
        error!("SAMPLE LOST for {} ({}): {}", host.input, host.key, e);
    }

    HostRound {
        input: host.input.clone(),
        health,
        stored: stored.is_ok(),
    }
}
