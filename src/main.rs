//! cluster-balance
//!
//! Hosts the balancer table: loads the three config files, keeps them in
//! sync on change or SIGHUP, and reports balancer state.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!  routing layer  │                   BALANCER TABLE                      │
//!  ──────────────▶│  cluster ──▶ GSLB balancer ──▶ sub-cluster ──▶ pool  │──▶ Backend
//!  (cluster,req)  │                                                      │
//!                 │  ┌────────────┐  ┌─────────────┐  ┌───────────────┐  │
//!  on_fail ──────▶│  │   health   │  │   config    │  │ observability │  │
//!                 │  │  checkers  │  │  + watcher  │  │ logs/metrics  │  │
//!                 │  └────────────┘  └─────────────┘  └───────────────┘  │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use cluster_balance::config::{
    load_cluster_conf, load_service_config, ConfigFile, ConfigWatcher, ServiceConfig,
};
use cluster_balance::lifecycle::{spawn_signal_listener, SignalEvent};
use cluster_balance::observability::{logging, metrics};
use cluster_balance::{BalancerTable, ClusterConfStore, HealthMonitor, TableError};

#[derive(Parser, Debug)]
#[command(name = "cluster-balance", version, about = "Cluster backend balancer")]
struct Args {
    /// Service config file (TOML).
    #[arg(short, long, default_value = "conf/cluster_balance.toml")]
    config: PathBuf,

    /// Load and validate all config files, then exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_service_config(&args.config)?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = %args.config.display(), "cluster-balance starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = Arc::new(ClusterConfStore::new(load_cluster_conf(&config.cluster_conf_path)?));
    let table = BalancerTable::new(HealthMonitor::new(store.clone(), tokio::runtime::Handle::current())?);

    match table.init_from_files(&config.gslb_conf_path, &config.cluster_table_path) {
        Ok(()) => {}
        Err(TableError::Partial(failures)) => {
            for failure in &failures {
                tracing::warn!(cluster = %failure.cluster, error = %failure.error, "Cluster failed to initialize");
            }
        }
        Err(e) => return Err(e.into()),
    }

    if args.check {
        tracing::info!(state = ?table.get_state(), "Config check passed");
        return Ok(());
    }

    // Keep the watcher alive for the lifetime of main.
    let (mut file_rx, _watcher) = if config.watch {
        let (watcher, rx) = ConfigWatcher::new(vec![
            (ConfigFile::Gslb, config.gslb_conf_path.clone()),
            (ConfigFile::ClusterTable, config.cluster_table_path.clone()),
            (ConfigFile::ClusterConf, config.cluster_conf_path.clone()),
        ]);
        match watcher.run() {
            Ok(handle) => (Some(rx), Some(handle)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to start config watcher");
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let mut signals = spawn_signal_listener();

    let mut status = (config.status_interval_secs > 0)
        .then(|| tokio::time::interval(Duration::from_secs(config.status_interval_secs)));

    loop {
        tokio::select! {
            event = signals.recv() => match event {
                Some(SignalEvent::Reload) => {
                    reload_policies(&config, &store, &table);
                    reload_table(&config, &table);
                }
                Some(SignalEvent::Shutdown) | None => break,
            },
            Some(file) = recv_file(&mut file_rx) => match file {
                ConfigFile::ClusterConf => reload_policies(&config, &store, &table),
                ConfigFile::Gslb | ConfigFile::ClusterTable => reload_table(&config, &table),
            },
            _ = tick(&mut status) => {
                tracing::info!(
                    versions = ?table.get_versions(),
                    backends = table.get_state().backend_num,
                    health_checkers = table.monitor().active_checkers(),
                    "Balancer status"
                );
            }
        }
    }

    table.release();
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn recv_file(rx: &mut Option<tokio::sync::mpsc::UnboundedReceiver<ConfigFile>>) -> Option<ConfigFile> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn reload_table(config: &ServiceConfig, table: &BalancerTable) {
    match table.reload_from_files(&config.gslb_conf_path, &config.cluster_table_path) {
        Ok(()) => {}
        Err(TableError::Partial(failures)) => {
            for failure in &failures {
                tracing::warn!(cluster = %failure.cluster, error = %failure.error, "Cluster failed to reload");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Reload failed, keeping current configuration");
        }
    }
}

fn reload_policies(config: &ServiceConfig, store: &ClusterConfStore, table: &BalancerTable) {
    match load_cluster_conf(&config.cluster_conf_path) {
        Ok(conf) => {
            store.store(conf);
            table.refresh_policies();
        }
        Err(e) => {
            tracing::error!(error = %e, "Cluster policy reload failed, keeping current policy");
        }
    }
}
