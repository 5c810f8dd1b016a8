/**
 * FILE STORE - Backend JSON-lines des séries pingport
 *
 * FONCTIONNEMENT :
 * - Un fichier par série, au chemin de la StoreKey (ex: rrd/10/0/0/1.series)
 * - Ligne 1 = SeriesSchema, lignes suivantes = un Sample JSON chacune
 * - Cache mémoire par série : dernier échantillon + échantillons récents
 *   (étendue de l'archive la plus fine) pour les lectures du classifier
 * - Un Mutex par série sérialise les appends d'une même série, les séries
 *   différentes s'écrivent en parallèle
 */

use super::{consolidate, to_chrono, Reducer, SampleTime, SeriesSchema, TimeSeriesStore};
use crate::error::StoreError;
use crate::models::{Bucket, Sample, StoreKey};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// État mémoire d'une série ouverte
struct SeriesState {
    schema: SeriesSchema,
    last: Option<Sample>,
    /// Échantillons plus récents que `last - retention`
    recent: VecDeque<Sample>,
    retention: chrono::Duration,
}

impl SeriesState {
    fn new(schema: SeriesSchema) -> Self {
        let retention = to_chrono(schema.finest_span());
        Self {
            schema,
            last: None,
            recent: VecDeque::new(),
            retention,
        }
    }

    fn push(&mut self, sample: Sample) {
        let horizon = sample.timestamp - self.retention;
        while self.recent.front().is_some_and(|s| s.timestamp < horizon) {
            self.recent.pop_front();
        }
        self.recent.push_back(sample.clone());
        self.last = Some(sample);
    }
}

/// Store de séries sur disque, une série JSON-lines par hôte
pub struct FileStore {
    series: Mutex<HashMap<StoreKey, Arc<Mutex<SeriesState>>>>,
}

impl FileStore {
    /// Ouvre (et crée si besoin) le répertoire racine du store
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        info!("File store ready at {}", root.display());
        Ok(Self {
            series: Mutex::new(HashMap::new()),
        })
    }

    /// Série ouverte depuis le cache, ou chargée depuis le disque
    fn open(&self, key: &StoreKey) -> Result<Arc<Mutex<SeriesState>>, StoreError> {
        if let Some(state) = self.series.lock().get(key) {
            return Ok(state.clone());
        }

        // Chargement hors du verrou global : les autres séries restent accessibles
        let loaded = Arc::new(Mutex::new(Self::load(key)?));
        let mut series = self.series.lock();
        Ok(series.entry(key.clone()).or_insert(loaded).clone())
    }

    fn load(key: &StoreKey) -> Result<SeriesState, StoreError> {
        let content = match fs::read_to_string(key.path()) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::MissingSeries(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut lines = content.split_inclusive('\n');
        let header = lines.next().ok_or_else(|| StoreError::Corrupt {
            key: key.to_string(),
            line: 1,
            reason: "missing schema header".to_string(),
        })?;
        let schema: SeriesSchema =
            serde_json::from_str(header.trim()).map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                line: 1,
                reason: e.to_string(),
            })?;

        let mut state = SeriesState::new(schema);
        let mut offset = header.len();
        for (index, raw) in lines.enumerate() {
            let line_start = offset;
            offset += raw.len();
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<Sample>(line) {
                Ok(sample) => state.push(sample),
                // Dernière ligne coupée par un arrêt brutal pendant un append
                Err(e) if offset == content.len() && !raw.ends_with('\n') => {
                    warn!("Series {}: dropping torn last line {} ({})", key, index + 2, e);
                    Self::truncate(key, line_start as u64)?;
                    debug!("Loaded series {} ({} recent samples)", key, state.recent.len());
                    return Ok(state);
                }
                Err(e) => {
                    return Err(StoreError::Corrupt {
                        key: key.to_string(),
                        line: index + 2,
                        reason: e.to_string(),
                    })
                }
            }
        }

        if !content.ends_with('\n') {
            // Ligne complète mais sans fin de ligne : le prochain append la collerait
            OpenOptions::new().append(true).open(key.path())?.write_all(b"\n")?;
        }

        debug!("Loaded series {} ({} recent samples)", key, state.recent.len());
        Ok(state)
    }

    fn truncate(key: &StoreKey, len: u64) -> Result<(), StoreError> {
        let file = OpenOptions::new().write(true).open(key.path())?;
        file.set_len(len)?;
        file.sync_all()?;
        Ok(())
    }

    /// Relit toute la série, pour les fenêtres plus longues que le cache
    fn read_all(key: &StoreKey) -> Result<Vec<Sample>, StoreError> {
        let file = fs::File::open(key.path())?;
        let mut samples = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate().skip(1) {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let sample = serde_json::from_str(&line).map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                line: index + 1,
                reason: e.to_string(),
            })?;
            samples.push(sample);
        }
        Ok(samples)
    }
}

impl TimeSeriesStore for FileStore {
    fn create(&self, key: &StoreKey, schema: &SeriesSchema) -> Result<(), StoreError> {
        if let Some(parent) = key.path().parent() {
            fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(key.path()) {
            Ok(mut file) => {
                let header = serde_json::to_string(schema)?;
                writeln!(file, "{}", header)?;
                self.series
                    .lock()
                    .insert(key.clone(), Arc::new(Mutex::new(SeriesState::new(schema.clone()))));
                debug!("Created series {}", key);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let state = self.open(key)?;
                if state.lock().schema != *schema {
                    debug!("Series {} already exists with another schema, keeping it", key);
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update(
        &self,
        key: &StoreKey,
        at: SampleTime,
        connect: f64,
        time: f64,
    ) -> Result<(), StoreError> {
        let state = self.open(key)?;
        let mut state = state.lock();

        let sample = Sample {
            timestamp: at.resolve(Utc::now()),
            connect,
            time,
        };

        if let Some(last) = &state.last {
            if sample.timestamp <= last.timestamp {
                return Err(StoreError::OutOfOrder {
                    key: key.to_string(),
                    last: last.timestamp,
                    attempted: sample.timestamp,
                });
            }
            let gap = sample.timestamp - last.timestamp;
            if gap > to_chrono(state.schema.heartbeat()) {
                debug!(
                    "Series {} silent for {}s, longer than its heartbeat",
                    key,
                    gap.num_seconds()
                );
            }
        }

        let line = serde_json::to_string(&sample)?;
        let mut file = OpenOptions::new().append(true).open(key.path())?;
        writeln!(file, "{}", line)?;

        state.push(sample);
        Ok(())
    }

    fn last_sample(&self, key: &StoreKey) -> Result<Option<Sample>, StoreError> {
        let state = self.open(key)?;
        let last = state.lock().last.clone();
        Ok(last)
    }

    fn fetch_range(
        &self,
        key: &StoreKey,
        reducer: Reducer,
        start_offset: Duration,
    ) -> Result<Vec<Bucket>, StoreError> {
        let state = self.open(key)?;
        let state = state.lock();

        let end: DateTime<Utc> = Utc::now();
        let start = end - to_chrono(start_offset);
        let width = state.schema.bucket_width(start_offset);

        if start_offset <= state.schema.finest_span() {
            Ok(consolidate(&state.recent, start, end, width, reducer))
        } else {
            let samples = Self::read_all(key)?;
            Ok(consolidate(&samples, start, end, width, reducer))
        }
    }
}
