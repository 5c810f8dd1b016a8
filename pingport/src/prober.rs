//! TCP connect prober
//!
//! One probe = one TCP connect to `addr:port`, closed as soon as it succeeds.
//! The connect runs under two nested deadlines: the configured timeout, and an
//! outer `timeout + 1s` ceiling that wins if the inner one never reports.

use crate::models::{Host, ProbeFailure, ProbeOutcome};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::error::Elapsed;
use tokio::time::{self, Instant};
use tracing::debug;

/// Extra time granted to the outer deadline
pub const OUTER_GRACE: Duration = Duration::from_secs(1);

/// A reachability check against one host
pub trait Probe: Send + Sync + 'static {
    fn probe(&self, host: &Host) -> impl Future<Output = ProbeOutcome> + Send;
}

/// Plain TCP connect prober
#[derive(Debug, Clone)]
pub struct TcpProber {
    port: u16,
    timeout: Duration,
}

impl TcpProber {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

impl Probe for TcpProber {
    async fn probe(&self, host: &Host) -> ProbeOutcome {
        let addr = SocketAddr::new(host.addr, self.port);
        let outcome = bounded_connect(TcpStream::connect(addr), self.timeout).await;

        let name = host.display_name(self.port);
        match &outcome.failure {
            None => debug!("Ping {} OK... ({:?})", name, outcome.elapsed),
            Some(failure) => debug!("Ping {} failed... ({})", name, failure),
        }
        outcome
    }
}

/// Run `connect` under the inner `timeout` and the outer `timeout + OUTER_GRACE`
/// deadline. The stream is dropped (closed) right away on success.
pub async fn bounded_connect<F>(connect: F, timeout: Duration) -> ProbeOutcome
where
    F: Future<Output = io::Result<TcpStream>>,
{
    with_deadline(time::timeout(timeout, connect), timeout).await
}

/// Outer deadline around an attempt that already carries its own timeout
async fn with_deadline<F>(attempt: F, timeout: Duration) -> ProbeOutcome
where
    F: Future<Output = Result<io::Result<TcpStream>, Elapsed>>,
{
    let started = Instant::now();

    match time::timeout(timeout + OUTER_GRACE, attempt).await {
        Ok(Ok(Ok(stream))) => {
            drop(stream);
            ProbeOutcome::success(started.elapsed())
        }
        Ok(Ok(Err(e))) => ProbeOutcome::failure(ProbeFailure::Refused(describe(&e))),
        Ok(Err(_)) => ProbeOutcome::failure(ProbeFailure::TimedOut),
        Err(_) => ProbeOutcome::failure(ProbeFailure::Deadline),
    }
}

fn describe(error: &io::Error) -> String {
    format!("{:?}: {}", error.kind(), error)
}
