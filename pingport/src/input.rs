//! Host list loading: one host per line, read once at startup

use std::collections::HashSet;
use std::io::{self, BufRead};
use std::path::Path;

/// Trimmed, non-empty, non-comment lines in input order, duplicates removed
pub fn read_hosts<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut hosts = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let host = line.trim();
        if host.is_empty() || host.starts_with('#') {
            continue;
        }
        if seen.insert(host.to_string()) {
            hosts.push(host.to_string());
        }
    }
    Ok(hosts)
}

/// Read the host list from `path`, or from stdin when `path` is `None`
pub async fn load_hosts(path: Option<&Path>) -> io::Result<Vec<String>> {
    match path {
        Some(path) => {
            let content = tokio::fs::read_to_string(path).await?;
            read_hosts(content.as_bytes())
        }
        None => tokio::task::spawn_blocking(|| read_hosts(io::stdin().lock()))
            .await
            .map_err(io::Error::other)?,
    }
}
