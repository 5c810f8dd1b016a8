//! Host resolution and storage key derivation
//!
//! This module handles:
//! - Resolving every host input once at startup (no periodic re-resolution)
//! - Skipping hosts that fail to resolve, logged once
//! - Deriving the per-host storage key from the resolved address
//! - Creating the storage directory for each key

use crate::error::ResolveError;
use crate::models::{Host, StoreKey};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name to address lookup
pub trait Resolve: Send + Sync {
    fn resolve(&self, name: &str) -> impl Future<Output = Result<IpAddr, ResolveError>> + Send;
}

/// System resolver, IPv4 preferred like `gethostbyname`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    async fn resolve(&self, name: &str) -> Result<IpAddr, ResolveError> {
        if let Ok(addr) = name.parse::<IpAddr>() {
            return Ok(addr);
        }

        let addrs: Vec<IpAddr> = tokio::net::lookup_host((name, 0))
            .await
            .map_err(|source| ResolveError::Lookup {
                name: name.to_string(),
                source,
            })?
            .map(|sa| sa.ip())
            .collect();

        addrs
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| ResolveError::NoAddress(name.to_string()))
    }
}

/// Immutable set of probe targets, built once and shared by reference
#[derive(Debug, Clone, Default)]
pub struct HostTable {
    hosts: Vec<Arc<Host>>,
    skipped: Vec<String>,
}

impl HostTable {
    /// Resolve every input, create its storage directory and keep the ones that worked
    pub async fn resolve<R: Resolve>(
        inputs: &[String],
        resolver: &R,
        storage_root: &Path,
    ) -> io::Result<Self> {
        info!("Resolving {} names...", inputs.len());

        let mut seen = HashSet::new();
        let mut owners: HashMap<IpAddr, &str> = HashMap::new();
        let mut table = HostTable::default();

        for (i, input) in inputs.iter().enumerate() {
            if !seen.insert(input.as_str()) {
                debug!("Duplicate host {} ignored", input);
                continue;
            }

            match resolver.resolve(input).await {
                Ok(addr) => match owners.get(&addr).copied() {
                    Some(owner) => {
                        // Une série par adresse : un seul hôte peut l'écrire
                        warn!(
                            "{} resolves to {}, already probed as {}, skipping...",
                            input, addr, owner
                        );
                        table.skipped.push(input.clone());
                    }
                    None => {
                        owners.insert(addr, input.as_str());
                        let key = storage_key(storage_root, addr)?;
                        table.hosts.push(Arc::new(Host {
                            input: input.clone(),
                            addr,
                            key,
                        }));
                    }
                },
                Err(e) => {
                    warn!("Unable to resolve {}, skipping... ({})", input, e);
                    table.skipped.push(input.clone());
                }
            }

            if i > 0 && i % 10 == 0 {
                debug!("Resolved {}/{} names", i, inputs.len());
            }
        }

        info!(
            "Resolution complete - {} hosts to probe, {} skipped",
            table.hosts.len(),
            table.skipped.len()
        );
        Ok(table)
    }

    pub fn hosts(&self) -> &[Arc<Host>] {
        &self.hosts
    }

    /// Inputs that failed to resolve or share an address with an earlier
    /// input; never probed
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Keep only the hosts accepted by `keep`
    pub fn retain<F: FnMut(&Host) -> bool>(&mut self, mut keep: F) {
        self.hosts.retain(|host| keep(host));
    }
}

/// Split an address on non-word characters into a directory hierarchy
/// (`10.1.2.3` -> `root/10/1/2/3.series`) and create the parent directories.
pub fn storage_key(root: &Path, addr: IpAddr) -> io::Result<StoreKey> {
    let text = addr.to_string();
    let mut parts: Vec<String> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();

    // "::" n'a aucun segment
    if parts.is_empty() {
        parts.push("0".to_string());
    }
    if let Some(last) = parts.last_mut() {
        last.push_str(".series");
    }

    let mut path = root.to_path_buf();
    path.extend(&parts);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    Ok(StoreKey::new(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct MapResolver(HashMap<&'static str, IpAddr>);

    impl Resolve for MapResolver {
        async fn resolve(&self, name: &str) -> Result<IpAddr, ResolveError> {
            self.0.get(name).copied().ok_or_else(|| ResolveError::NoAddress(name.to_string()))
        }
    }

    #[test]
    fn test_storage_key_ipv4() {
        let dir = TempDir::new().unwrap();
        let key = storage_key(dir.path(), "10.1.2.3".parse().unwrap()).unwrap();

        assert_eq!(key.path(), dir.path().join("10/1/2/3.series"));
        assert!(dir.path().join("10/1/2").is_dir());
    }

    #[test]
    fn test_storage_key_ipv6_drops_empty_segments() {
        let dir = TempDir::new().unwrap();
        let key = storage_key(dir.path(), "fe80::1".parse().unwrap()).unwrap();
        assert_eq!(key.path(), dir.path().join("fe80/1.series"));
    }

    #[test]
    fn test_storage_key_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let addr: IpAddr = "192.168.0.7".parse().unwrap();
        let first = storage_key(dir.path(), addr).unwrap();
        let second = storage_key(dir.path(), addr).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_system_resolver_literal_address() {
        let addr = SystemResolver.resolve("127.0.0.1").await.unwrap();
        assert_eq!(addr, "127.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_unresolvable_hosts_are_skipped_once() {
        let dir = TempDir::new().unwrap();
        let resolver = MapResolver(HashMap::from([("db.internal", "10.0.0.5".parse().unwrap())]));
        let inputs = vec![
            "db.internal".to_string(),
            "ghost.invalid".to_string(),
            "db.internal".to_string(),
        ];

        let table = HostTable::resolve(&inputs, &resolver, dir.path()).await.unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.hosts()[0].input, "db.internal");
        assert_eq!(table.skipped(), &["ghost.invalid".to_string()]);
    }

    #[tokio::test]
    async fn test_shared_address_keeps_first_input_only() {
        let dir = TempDir::new().unwrap();
        let shared: IpAddr = "10.0.0.1".parse().unwrap();
        let resolver =
            MapResolver(HashMap::from([("www.example.com", shared), ("blog.example.com", shared)]));
        let inputs = vec!["www.example.com".to_string(), "blog.example.com".to_string()];

        let table = HostTable::resolve(&inputs, &resolver, dir.path()).await.unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.hosts()[0].input, "www.example.com");
        assert_eq!(table.skipped(), &["blog.example.com".to_string()]);
    }
}
