/*!
Prober et resolver simulés

`ScriptedProber` rejoue un motif de succès/échecs par adresse (cyclique) et
peut simuler une latence en temps tokio. `StaticResolver` remplace le DNS.
*/

use pingport::{Host, Probe, ProbeFailure, ProbeOutcome, Resolve, ResolveError};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct Script {
    pattern: Vec<bool>,
    latency: Duration,
}

/// Prober sans réseau ; un hôte sans script répond toujours
#[derive(Clone, Default)]
pub struct ScriptedProber {
    scripts: Arc<Mutex<HashMap<IpAddr, Script>>>,
    probes: Arc<Mutex<HashMap<IpAddr, usize>>>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Motif rejoué en boucle : `true` = connexion acceptée
    pub fn script(&self, addr: IpAddr, pattern: &[bool]) {
        self.scripts.lock().unwrap().entry(addr).or_default().pattern = pattern.to_vec();
    }

    pub fn always_up(&self, addr: IpAddr) {
        self.script(addr, &[true]);
    }

    pub fn always_refused(&self, addr: IpAddr) {
        self.script(addr, &[false]);
    }

    /// Durée simulée de chaque sonde vers `addr`
    pub fn latency(&self, addr: IpAddr, latency: Duration) {
        self.scripts.lock().unwrap().entry(addr).or_default().latency = latency;
    }

    pub fn probe_count(&self, addr: IpAddr) -> usize {
        self.probes.lock().unwrap().get(&addr).copied().unwrap_or(0)
    }

    pub fn total_probes(&self) -> usize {
        self.probes.lock().unwrap().values().sum()
    }

    /// Prochain résultat scripté et latence, compte la sonde
    fn next_step(&self, addr: IpAddr) -> (bool, Duration) {
        let round = {
            let mut probes = self.probes.lock().unwrap();
            let count = probes.entry(addr).or_insert(0);
            *count += 1;
            *count - 1
        };

        let scripts = self.scripts.lock().unwrap();
        match scripts.get(&addr) {
            Some(script) if !script.pattern.is_empty() => {
                (script.pattern[round % script.pattern.len()], script.latency)
            }
            Some(script) => (true, script.latency),
            None => (true, Duration::ZERO),
        }
    }
}

impl Probe for ScriptedProber {
    async fn probe(&self, host: &Host) -> ProbeOutcome {
        let (up, latency) = self.next_step(host.addr);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if up {
            log::debug!("[MOCK] Ping {} OK", host.input);
            ProbeOutcome::success(latency)
        } else {
            log::debug!("[MOCK] Ping {} refused", host.input);
            ProbeOutcome::failure(ProbeFailure::Refused("scripted refusal".to_string()))
        }
    }
}

/// Resolver à table fixe ; les noms absents échouent
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    names: HashMap<String, IpAddr>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, addr: IpAddr) -> Self {
        self.insert(name, addr);
        self
    }

    pub fn insert(&mut self, name: &str, addr: IpAddr) {
        self.names.insert(name.to_string(), addr);
    }

    pub fn get(&self, name: &str) -> Option<IpAddr> {
        self.names.get(name).copied()
    }
}

impl Resolve for StaticResolver {
    async fn resolve(&self, name: &str) -> Result<IpAddr, ResolveError> {
        self.get(name).ok_or_else(|| ResolveError::NoAddress(name.to_string()))
    }
}
