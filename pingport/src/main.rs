//! Pingport - TCP reachability prober daemon
//!
//! Reads a host list, resolves it once, then probes every host on one TCP
//! port each round, recording connect results per host and flagging hosts
//! that flap or stay down.
//!
//! Exit codes: 1 interrupted during setup, 2 setup failed, 3 probe loop
//! failed, 130 interrupted while probing.

use anyhow::{Context, Result};
use clap::Parser;
use pingport::config::{Cli, PingportConfig};
use pingport::{input, FileStore, HostTable, Scheduler, SystemResolver, TcpProber};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_SETUP_INTERRUPTED: i32 = 1;
const EXIT_SETUP_FAILED: i32 = 2;
const EXIT_LOOP_FAILED: i32 = 3;
const EXIT_INTERRUPTED: i32 = 130;

/// Initialize logging; `RUST_LOG` wins over the verbosity flag
fn init_logging(verbose: bool) {
    let default = if verbose { "pingport=debug" } else { "pingport=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Everything before the first round: config, host list, resolution, series
async fn setup(cli: &Cli) -> Result<Scheduler<TcpProber, FileStore>> {
    let mut config = PingportConfig::load(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    config.apply_cli(cli);
    init_logging(config.verbose);

    info!("Pingport v{} starting...", env!("CARGO_PKG_VERSION"));
    let settings = config.settings().context("Invalid configuration")?;

    let inputs = input::load_hosts(config.input.as_deref())
        .await
        .context("Failed to read host list")?;

    let store = Arc::new(
        FileStore::new(&config.storage_root).context("Failed to open storage root")?,
    );

    let hosts = HostTable::resolve(&inputs, &SystemResolver, &config.storage_root)
        .await
        .context("Failed to prepare storage directories")?;
    if !hosts.skipped().is_empty() {
        warn!(
            "{} host(s) will never be probed: {}",
            hosts.skipped().len(),
            hosts.skipped().join(", ")
        );
    }

    let prober = TcpProber::new(settings.port, settings.timeout);
    Scheduler::prepare(hosts, prober, store, settings).context("Nothing to probe")
}

#[tokio::main]
async fn main() {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let setup_result = tokio::select! {
        result = setup(&cli) => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted during setup");
            std::process::exit(EXIT_SETUP_INTERRUPTED);
        }
    };

    let scheduler = match setup_result {
        Ok(scheduler) => scheduler,
        Err(e) => {
            // Le subscriber n'est peut-être pas encore installé
            eprintln!("pingport: {:#}", e);
            std::process::exit(EXIT_SETUP_FAILED);
        }
    };

    tokio::select! {
        result = scheduler.run() => {
            if let Err(e) = result {
                error!("Probe loop stopped: {}", e);
                std::process::exit(EXIT_LOOP_FAILED);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Ok, boss, let's call it a day.");
            std::process::exit(EXIT_INTERRUPTED);
        }
    }
}
