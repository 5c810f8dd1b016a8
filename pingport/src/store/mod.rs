/**
 * TIME-SERIES STORE - Interface de persistence des sondes pingport
 *
 * RÔLE :
 * Chaque hôte sondé possède sa propre série (timestamp, connect, time).
 * Le scheduler y ajoute un échantillon par round, le classifier relit
 * le dernier échantillon et une fenêtre consolidée de l'historique.
 *
 * FONCTIONNEMENT :
 * - TimeSeriesStore = interface commune (create/update/last_sample/fetch_range)
 * - SeriesSchema = step + heartbeat + archives (consolidation, xff, steps, rows)
 * - consolidate() = découpage en buckets + réduction (MIN, MAX, AVERAGE, LAST)
 *
 * Les appels sont bloquants : le scheduler les exécute sur le pool bloquant
 * de tokio pour ne pas figer les sondes des autres hôtes.
 */

pub mod file;

use crate::error::StoreError;
use crate::models::{Bucket, Sample, StoreKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Horodatage d'un update : `Now` correspond au `N` des bases round-robin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleTime {
    Now,
    At(DateTime<Utc>),
}

impl SampleTime {
    pub fn resolve(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            SampleTime::Now => now,
            SampleTime::At(ts) => ts,
        }
    }
}

/// Fonction de consolidation appliquée à chaque bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Reducer {
    Min,
    Max,
    Average,
    Last,
}

impl Reducer {
    pub fn reduce<I: IntoIterator<Item = f64>>(self, values: I) -> Option<f64> {
        let mut iter = values.into_iter();
        let first = iter.next()?;
        let (acc, count) = iter.fold((first, 1usize), |(acc, count), v| {
            let acc = match self {
                Reducer::Min => acc.min(v),
                Reducer::Max => acc.max(v),
                Reducer::Average => acc + v,
                Reducer::Last => v,
            };
            (acc, count + 1)
        });
        match self {
            Reducer::Average => Some(acc / count as f64),
            _ => Some(acc),
        }
    }
}

/// Archive d'une série : `rows` lignes de `steps` pas de base chacune
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveSpec {
    pub consolidation: Reducer,
    pub xff: f64,
    pub steps: u32,
    pub rows: u32,
}

impl ArchiveSpec {
    /// Durée couverte par l'archive
    pub fn span(&self, step: Duration) -> Duration {
        step * self.steps * self.rows
    }
}

/// Définition d'une série, écrite une seule fois à la création
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSchema {
    pub step_secs: u64,
    pub heartbeat_secs: u64,
    pub data_sources: Vec<String>,
    pub archives: Vec<ArchiveSpec>,
}

const SECONDS_PER_DAY: u64 = 86_400;

impl SeriesSchema {
    /// Schéma standard d'une série de sondes : un pas par round, heartbeat
    /// `interval + timeout`, archives 1j, 5j, puis agrégats longs.
    pub fn for_probing(interval: Duration, timeout: Duration) -> Self {
        let step_secs = interval.as_secs().max(1);
        let rows_per_day = (SECONDS_PER_DAY / step_secs).max(1) as u32;
        let average = |steps: u32, rows: u32| ArchiveSpec {
            consolidation: Reducer::Average,
            xff: 0.5,
            steps,
            rows,
        };

        Self {
            step_secs,
            heartbeat_secs: step_secs + timeout.as_secs(),
            data_sources: vec!["connect".to_string(), "time".to_string()],
            archives: vec![
                average(1, rows_per_day),
                average(5, rows_per_day),
                average(60, 120),
                average(420, 840),
            ],
        }
    }

    pub fn step(&self) -> Duration {
        Duration::from_secs(self.step_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    /// Durée couverte par l'archive la plus fine (rétention des lectures rapides)
    pub fn finest_span(&self) -> Duration {
        self.archives
            .iter()
            .min_by_key(|a| a.steps)
            .map(|a| a.span(self.step()))
            .unwrap_or_else(|| self.step())
    }

    /// Largeur de bucket pour une fenêtre donnée : l'archive la plus fine qui
    /// couvre la fenêtre, sinon la plus grossière.
    pub fn bucket_width(&self, window: Duration) -> Duration {
        let mut archives: Vec<&ArchiveSpec> = self.archives.iter().collect();
        archives.sort_by_key(|a| a.steps);

        let chosen = archives
            .iter()
            .find(|a| a.span(self.step()) >= window)
            .or_else(|| archives.last());

        match chosen {
            Some(archive) => self.step() * archive.steps,
            None => self.step(),
        }
    }
}

/// Interface commune des backends de séries temporelles
pub trait TimeSeriesStore: Send + Sync + 'static {
    /// Crée la série si besoin ; une série existante est laissée intacte
    fn create(&self, key: &StoreKey, schema: &SeriesSchema) -> Result<(), StoreError>;

    /// Ajoute un échantillon (append only)
    fn update(&self, key: &StoreKey, at: SampleTime, connect: f64, time: f64)
        -> Result<(), StoreError>;

    /// Dernier échantillon enregistré, `None` pour une série vide
    fn last_sample(&self, key: &StoreKey) -> Result<Option<Sample>, StoreError>;

    /// Buckets consolidés couvrant `[now - start_offset, now]`, du plus ancien au plus récent
    fn fetch_range(
        &self,
        key: &StoreKey,
        reducer: Reducer,
        start_offset: Duration,
    ) -> Result<Vec<Bucket>, StoreError>;
}

/// Découpe `[start, end]` en buckets alignés de largeur `width` et réduit les
/// échantillons de chacun. Partagé par tous les backends.
pub fn consolidate<'a, I>(
    samples: I,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    width: Duration,
    reducer: Reducer,
) -> Vec<Bucket>
where
    I: IntoIterator<Item = &'a Sample>,
{
    let width = width.as_secs().max(1) as i64;
    let first = start.timestamp().div_euclid(width);
    let last = end.timestamp().div_euclid(width);
    if last < first {
        return Vec::new();
    }

    let len = (last - first + 1) as usize;
    let mut connect: Vec<Vec<f64>> = vec![Vec::new(); len];
    let mut time: Vec<Vec<f64>> = vec![Vec::new(); len];

    for sample in samples {
        let index = sample.timestamp.timestamp().div_euclid(width);
        if index < first || index > last {
            continue;
        }
        let slot = (index - first) as usize;
        connect[slot].push(sample.connect);
        time[slot].push(sample.time);
    }

    connect
        .into_iter()
        .zip(time)
        .enumerate()
        .map(|(slot, (connect, time))| {
            let bucket_start = (first + slot as i64) * width;
            Bucket {
                start: DateTime::<Utc>::from_timestamp(bucket_start, 0).unwrap_or(start),
                connect: reducer.reduce(connect),
                time: reducer.reduce(time),
            }
        })
        .collect()
}

/// Conversion std -> chrono, saturée pour les durées absurdes
pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365 * 100))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    fn sample(secs: i64, connect: f64) -> Sample {
        Sample { timestamp: at(secs), connect, time: connect / 100.0 }
    }

    #[test]
    fn test_reducers() {
        let values = [3.0, 1.0, 2.0];
        assert_eq!(Reducer::Min.reduce(values), Some(1.0));
        assert_eq!(Reducer::Max.reduce(values), Some(3.0));
        assert_eq!(Reducer::Average.reduce(values), Some(2.0));
        assert_eq!(Reducer::Last.reduce(values), Some(2.0));
        assert_eq!(Reducer::Min.reduce(Vec::new()), None);
    }

    #[test]
    fn test_probing_schema_matches_round_robin_layout() {
        let schema = SeriesSchema::for_probing(Duration::from_secs(300), Duration::from_secs(30));
        assert_eq!(schema.step_secs, 300);
        assert_eq!(schema.heartbeat_secs, 330);
        assert_eq!(schema.data_sources, vec!["connect", "time"]);
        assert_eq!(schema.archives.len(), 4);
        assert_eq!(schema.archives[0].rows, 288);
        assert_eq!(schema.archives[1].steps, 5);
        assert_eq!(schema.finest_span(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_bucket_width_picks_finest_covering_archive() {
        let schema = SeriesSchema::for_probing(Duration::from_secs(300), Duration::from_secs(30));
        assert_eq!(schema.bucket_width(Duration::from_secs(1800)), Duration::from_secs(300));
        assert_eq!(schema.bucket_width(Duration::from_secs(3 * 86_400)), Duration::from_secs(1500));
        // Au-delà de toutes les archives : la plus grossière
        assert_eq!(
            schema.bucket_width(Duration::from_secs(u32::MAX as u64)),
            Duration::from_secs(300 * 420)
        );
    }

    #[test]
    fn test_consolidate_min_with_gaps() {
        let samples = vec![sample(310, 30.0), sample(320, 0.0), sample(950, 30.0)];
        let width = Duration::from_secs(300);
        let buckets = consolidate(&samples, at(300), at(1000), width, Reducer::Min);

        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].start, at(300));
        assert_eq!(buckets[0].connect, Some(0.0));
        assert_eq!(buckets[1].connect, None);
        assert_eq!(buckets[2].connect, Some(30.0));
        assert_eq!(buckets[2].time, Some(0.3));
    }

    #[test]
    fn test_consolidate_ignores_samples_outside_window() {
        let samples = vec![sample(10, 0.0), sample(5000, 0.0)];
        let width = Duration::from_secs(300);
        let buckets = consolidate(&samples, at(300), at(900), width, Reducer::Min);
        assert!(buckets.iter().all(|b| b.connect.is_none()));
    }
}
