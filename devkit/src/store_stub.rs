/*!
Store de séries en mémoire pour tester sans disque

Implémente `TimeSeriesStore` avec la même consolidation que le backend
fichier. L'horloge suit `tokio::time::Instant`, donc les tests en temps
virtuel (`start_paused`) produisent des timestamps déterministes.
*/

use chrono::{DateTime, Utc};
use pingport::store::{consolidate, Reducer, SampleTime, SeriesSchema, TimeSeriesStore};
use pingport::{Bucket, Sample, StoreError, StoreKey};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Époque par défaut, 150s après une frontière de bucket de 300s
pub const DEFAULT_EPOCH_SECS: i64 = 1_800_000_150;

#[derive(Debug, Clone)]
struct MockSeries {
    schema: SeriesSchema,
    samples: Vec<Sample>,
}

/// Store mémoire qui enregistre les appels et accepte des pannes injectées
#[derive(Clone)]
pub struct MemoryStore {
    epoch: DateTime<Utc>,
    origin: Instant,
    series: Arc<Mutex<HashMap<StoreKey, MockSeries>>>,
    create_calls: Arc<Mutex<Vec<StoreKey>>>,
    failing_updates: Arc<Mutex<HashMap<StoreKey, usize>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let epoch = DateTime::<Utc>::from_timestamp(DEFAULT_EPOCH_SECS, 0).unwrap_or_else(Utc::now);
        Self::with_epoch(epoch)
    }

    /// `epoch` correspond à l'instant tokio de création du store
    pub fn with_epoch(epoch: DateTime<Utc>) -> Self {
        Self {
            epoch,
            origin: Instant::now(),
            series: Arc::new(Mutex::new(HashMap::new())),
            create_calls: Arc::new(Mutex::new(Vec::new())),
            failing_updates: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Horloge murale dérivée de l'horloge tokio
    pub fn now(&self) -> DateTime<Utc> {
        self.epoch + to_chrono(self.origin.elapsed())
    }

    /// Les `count` prochains updates sur `key` échoueront
    pub fn fail_next_updates(&self, key: &StoreKey, count: usize) {
        self.failing_updates.lock().unwrap().insert(key.clone(), count);
    }

    pub fn samples(&self, key: &StoreKey) -> Vec<Sample> {
        self.series
            .lock()
            .unwrap()
            .get(key)
            .map(|s| s.samples.clone())
            .unwrap_or_default()
    }

    pub fn sample_count(&self, key: &StoreKey) -> usize {
        self.series.lock().unwrap().get(key).map_or(0, |s| s.samples.len())
    }

    pub fn series_count(&self) -> usize {
        self.series.lock().unwrap().len()
    }

    pub fn has_series(&self, key: &StoreKey) -> bool {
        self.series.lock().unwrap().contains_key(key)
    }

    pub fn schema(&self, key: &StoreKey) -> Option<SeriesSchema> {
        self.series.lock().unwrap().get(key).map(|s| s.schema.clone())
    }

    /// Nombre d'appels à `create`, séries existantes comprises
    pub fn create_calls(&self) -> usize {
        self.create_calls.lock().unwrap().len()
    }

    pub fn total_samples(&self) -> usize {
        self.series.lock().unwrap().values().map(|s| s.samples.len()).sum()
    }

    fn injected_failure(&self, key: &StoreKey) -> bool {
        let mut failing = self.failing_updates.lock().unwrap();
        match failing.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSeriesStore for MemoryStore {
    fn create(&self, key: &StoreKey, schema: &SeriesSchema) -> Result<(), StoreError> {
        self.create_calls.lock().unwrap().push(key.clone());

        let mut series = self.series.lock().unwrap();
        if series.contains_key(key) {
            log::debug!("[MOCK] Series {} already exists", key);
            return Ok(());
        }
        series.insert(
            key.clone(),
            MockSeries {
                schema: schema.clone(),
                samples: Vec::new(),
            },
        );
        log::info!("[MOCK] Created series {}", key);
        Ok(())
    }

    fn update(
        &self,
        key: &StoreKey,
        at: SampleTime,
        connect: f64,
        time: f64,
    ) -> Result<(), StoreError> {
        if self.injected_failure(key) {
            log::warn!("[MOCK] Injected update failure on {}", key);
            return Err(StoreError::Io(io::Error::other("injected failure")));
        }

        let timestamp = at.resolve(self.now());
        let mut series = self.series.lock().unwrap();
        let entry = series
            .get_mut(key)
            .ok_or_else(|| StoreError::MissingSeries(key.to_string()))?;

        if let Some(last) = entry.samples.last() {
            if timestamp <= last.timestamp {
                return Err(StoreError::OutOfOrder {
                    key: key.to_string(),
                    last: last.timestamp,
                    attempted: timestamp,
                });
            }
        }

        entry.samples.push(Sample { timestamp, connect, time });
        log::debug!("[MOCK] {} <- connect={} time={:.3}", key, connect, time);
        Ok(())
    }

    fn last_sample(&self, key: &StoreKey) -> Result<Option<Sample>, StoreError> {
        let series = self.series.lock().unwrap();
        let entry = series.get(key).ok_or_else(|| StoreError::MissingSeries(key.to_string()))?;
        Ok(entry.samples.last().cloned())
    }

    fn fetch_range(
        &self,
        key: &StoreKey,
        reducer: Reducer,
        start_offset: Duration,
    ) -> Result<Vec<Bucket>, StoreError> {
        let series = self.series.lock().unwrap();
        let entry = series.get(key).ok_or_else(|| StoreError::MissingSeries(key.to_string()))?;

        let end = self.now();
        let start = end - to_chrono(start_offset);
        let width = entry.schema.bucket_width(start_offset);
        Ok(consolidate(&entry.samples, start, end, width, reducer))
    }
}
