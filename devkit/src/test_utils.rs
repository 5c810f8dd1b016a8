/*!
Test Harness pour le scheduler pingport

Facilite l'écriture de scénarios avec:
- Setup automatique du store mémoire, du prober scripté et du resolver
- Exécution round par round du vrai `Scheduler`
- Assertions sur les échantillons enregistrés et la santé des hôtes
*/

use crate::probe_stub::{ScriptedProber, StaticResolver};
use crate::store_stub::MemoryStore;
use anyhow::Result;
use pingport::resolver::storage_key;
use pingport::{Health, HostTable, RoundReport, ScheduleSettings, Scheduler, StoreKey};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const TEST_PORT: u16 = 443;
pub const TEST_INTERVAL: Duration = Duration::from_secs(300);
pub const TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Harness de test complet pour le scheduler
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub prober: ScriptedProber,
    pub resolver: StaticResolver,
    pub settings: ScheduleSettings,
    inputs: Vec<String>,
    storage: TempDir,
    scheduler: Option<Scheduler<ScriptedProber, MemoryStore>>,
    reports: Vec<RoundReport>,
    expectations: Vec<Expectation>,
}

#[derive(Debug)]
struct Expectation {
    host: String,
    expected_samples: usize,
}

impl TestHarness {
    /// Crée un nouveau harness ; à appeler dans un runtime tokio pour que
    /// l'horloge du store suive le temps virtuel
    pub fn new() -> Self {
        env_logger::try_init().ok(); // Init logging pour tests

        Self {
            store: Arc::new(MemoryStore::new()),
            prober: ScriptedProber::new(),
            resolver: StaticResolver::new(),
            settings: ScheduleSettings {
                port: TEST_PORT,
                interval: TEST_INTERVAL,
                timeout: TEST_TIMEOUT,
                store_workers: 4,
            },
            inputs: Vec::new(),
            storage: TempDir::new().expect("temp storage root"),
            scheduler: None,
            reports: Vec::new(),
            expectations: Vec::new(),
        }
    }

    /// Ajoute un hôte résolu vers `addr` à la liste d'entrée
    pub fn host(&mut self, name: &str, addr: &str) -> &mut Self {
        let addr: IpAddr = addr.parse().expect("valid test address");
        self.resolver.insert(name, addr);
        self.inputs.push(name.to_string());
        self
    }

    /// Ajoute un nom que le resolver ne connaît pas
    pub fn unresolvable(&mut self, name: &str) -> &mut Self {
        self.inputs.push(name.to_string());
        self
    }

    pub fn addr(&self, name: &str) -> IpAddr {
        self.resolver
            .get(name)
            .unwrap_or_else(|| panic!("unknown test host {}", name))
    }

    pub fn key(&self, name: &str) -> StoreKey {
        storage_key(self.storage.path(), self.addr(name)).expect("storage key")
    }

    /// Motif de sondes pour `name`, rejoué en boucle
    pub fn script(&mut self, name: &str, pattern: &[bool]) -> &mut Self {
        self.prober.script(self.addr(name), pattern);
        self
    }

    pub fn latency(&mut self, name: &str, latency: Duration) -> &mut Self {
        self.prober.latency(self.addr(name), latency);
        self
    }

    /// Résout les entrées, crée les séries et construit le scheduler
    pub async fn build(&mut self) -> Result<()> {
        let table = HostTable::resolve(&self.inputs, &self.resolver, self.storage.path()).await?;
        let scheduler = Scheduler::prepare(
            table,
            self.prober.clone(),
            self.store.clone(),
            self.settings.clone(),
        )?;
        log::info!("Harness ready with {} hosts", scheduler.hosts().len());
        self.scheduler = Some(scheduler);
        Ok(())
    }

    pub fn scheduler(&self) -> Option<&Scheduler<ScriptedProber, MemoryStore>> {
        self.scheduler.as_ref()
    }

    /// Exécute `rounds` rounds complets et renvoie leurs rapports
    pub async fn run_rounds(&mut self, rounds: usize) -> Result<&[RoundReport]> {
        if self.scheduler.is_none() {
            self.build().await?;
        }

        let first = self.reports.len();
        if let Some(scheduler) = self.scheduler.as_mut() {
            for _ in 0..rounds {
                let report = scheduler.next_round().await?;
                self.reports.push(report);
            }
        }
        Ok(&self.reports[first..])
    }

    pub fn reports(&self) -> &[RoundReport] {
        &self.reports
    }

    /// Santé de `name` pour chaque round exécuté
    pub fn health_history(&self, name: &str) -> Vec<Health> {
        self.reports.iter().filter_map(|r| r.health_of(name)).collect()
    }

    pub fn samples(&self, name: &str) -> usize {
        self.store.sample_count(&self.key(name))
    }

    /// Ajoute une expectation: `count` échantillons stockés pour `name`
    pub fn expect_samples(&mut self, name: &str, count: usize) -> &mut Self {
        self.expectations.push(Expectation {
            host: name.to_string(),
            expected_samples: count,
        });
        self
    }

    /// Vérifie toutes les expectations configurées
    pub fn verify_expectations(&self) -> Result<()> {
        log::info!("Verifying {} expectations...", self.expectations.len());

        for expectation in &self.expectations {
            let actual = match self.resolver.get(&expectation.host) {
                Some(_) => self.samples(&expectation.host),
                None => 0,
            };

            if actual != expectation.expected_samples {
                anyhow::bail!(
                    "Expectation failed for host '{}': expected {} samples, got {}",
                    expectation.host,
                    expectation.expected_samples,
                    actual
                );
            }

            log::info!("Host '{}': {} samples as expected", expectation.host, actual);
        }

        Ok(())
    }

    /// Stats sur les rounds exécutés
    pub fn get_stats(&self) -> TestStats {
        let mut samples_per_host = HashMap::new();
        for input in &self.inputs {
            if self.resolver.get(input).is_some() {
                samples_per_host.insert(input.clone(), self.samples(input));
            }
        }

        TestStats {
            rounds: self.reports.len(),
            total_probes: self.prober.total_probes(),
            total_samples: self.store.total_samples(),
            samples_per_host,
            last_drift: self.reports.last().map_or(0.0, |r| r.drift),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct TestStats {
    pub rounds: usize,
    pub total_probes: usize,
    pub total_samples: usize,
    pub samples_per_host: HashMap<String, usize>,
    pub last_drift: f64,
}

impl TestStats {
    pub fn print(&self) {
        println!("Test Statistics:");
        println!("  Rounds: {}", self.rounds);
        println!("  Probes: {}", self.total_probes);
        println!("  Samples: {}", self.total_samples);
        for (host, count) in &self.samples_per_host {
            println!("    {}: {} samples", host, count);
        }
        println!("  Last drift: {:.3}s", self.last_drift);
    }
}
