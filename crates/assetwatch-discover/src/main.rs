//! CLI entry point for the assetwatch-discover engine.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use assetwatch_core::{
    AlertId, AlertStatus, DiscoveryStore, MemoryStore, RecordId, ResolutionStatus, Severity,
    NEW_IP_ALERT_TYPE,
};
use assetwatch_graph::GraphClient;

use assetwatch_discover::config::{self, DetailOptions, DiscoverConfig};
use assetwatch_discover::scanner::NmapScanner;
use assetwatch_discover::DiscoveryService;

#[derive(Parser)]
#[command(name = "assetwatch-discover")]
#[command(about = "Network discovery engine for Assetwatch")]
struct Cli {
    /// Config file prefix (default: assetwatch).
    #[arg(short, long, default_value = "assetwatch", global = true)]
    config: String,

    /// Keep everything in process memory instead of Neo4j.
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a one-shot liveness sweep.
    Scan {
        /// Range expression, e.g. "10.0.1.0/24, 10.0.2.1-40". Defaults to discover.default_ranges.
        #[arg(short, long)]
        ranges: Option<String>,
    },

    /// Run an nmap detail scan against one discovered address.
    Detail {
        #[arg(long)]
        address: IpAddr,

        #[arg(long)]
        record_id: Uuid,

        /// Enable OS fingerprinting (otherwise discover.os_detection decides).
        #[arg(long)]
        os_detection: bool,
    },

    /// Run the recurring scan scheduler until interrupted.
    Daemon,

    /// Show or change the recurring scan configuration.
    #[command(subcommand)]
    Config(ConfigAction),

    /// Inspect discovered addresses.
    #[command(subcommand)]
    Discovered(DiscoveredAction),

    /// Inspect and triage alerts.
    #[command(subcommand)]
    Alerts(AlertsAction),
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Set {
        #[arg(long)]
        ranges: Option<String>,

        /// Interval in minutes; 0 or less removes the recurring job.
        #[arg(long, allow_negative_numbers = true)]
        interval: Option<i64>,

        #[arg(long, conflicts_with = "disable")]
        enable: bool,

        #[arg(long)]
        disable: bool,
    },
}

#[derive(Subcommand)]
enum DiscoveredAction {
    List,
    /// Mark a discovered address as ignored.
    Ignore { id: Uuid },
}

#[derive(Subcommand)]
enum AlertsAction {
    List {
        /// new, read, investigating, resolved or ignored.
        #[arg(long)]
        status: Option<AlertStatus>,
    },
    SetStatus {
        id: Uuid,
        status: AlertStatus,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let discover_config = DiscoverConfig::load(&cli.config)?;
    let store = open_store(&cli).await?;
    let service = DiscoveryService::from_config(&discover_config, store.clone());

    match cli.command {
        Command::Scan { ranges } => {
            let outcome = service.start_manual_scan(ranges.as_deref()).await?;
            print_json(&outcome)?;
        }
        Command::Detail {
            address,
            record_id,
            os_detection,
        } => {
            let options = os_detection.then_some(DetailOptions { os_detection: true });
            let result = service
                .start_detail_scan(address, RecordId(record_id), options)
                .await?;
            print_json(&result)?;
        }
        Command::Daemon => run_daemon(&service, store.as_ref(), &discover_config).await?,
        Command::Config(ConfigAction::Show) => {
            print_json(&service.scan_configuration().await?)?;
        }
        Command::Config(ConfigAction::Set {
            ranges,
            interval,
            enable,
            disable,
        }) => {
            let mut scan_config = service.scan_configuration().await?;
            if let Some(ranges) = ranges {
                scan_config.address_ranges = Some(ranges).filter(|r| !r.trim().is_empty());
            }
            if let Some(interval) = interval {
                scan_config.interval_minutes = interval;
            }
            if enable {
                scan_config.enabled = true;
            }
            if disable {
                scan_config.enabled = false;
            }
            service.update_scan_configuration(&scan_config).await?;
            print_json(&scan_config)?;
        }
        Command::Discovered(DiscoveredAction::List) => {
            print_json(&service.list_discovered().await?)?;
        }
        Command::Discovered(DiscoveredAction::Ignore { id }) => {
            service
                .set_discovered_status(RecordId(id), &ResolutionStatus::Ignored)
                .await?;
        }
        Command::Alerts(AlertsAction::List { status }) => {
            print_json(&service.list_alerts(status).await?)?;
        }
        Command::Alerts(AlertsAction::SetStatus { id, status }) => {
            let alert = service.update_alert_status(AlertId(id), status).await?;
            print_json(&alert)?;
        }
    }

    Ok(())
}

async fn open_store(cli: &Cli) -> anyhow::Result<Arc<dyn DiscoveryStore>> {
    if cli.in_memory {
        let store = MemoryStore::new();
        store.add_alert_type(NEW_IP_ALERT_TYPE, Severity::Medium);
        tracing::info!("Using in-memory store");
        return Ok(Arc::new(store));
    }

    let graph_config = config::load_graph_config(&cli.config);
    let graph = GraphClient::connect(&graph_config).await?;
    graph.ensure_schema().await?;

    if graph.find_alert_type_by_name(NEW_IP_ALERT_TYPE).await?.is_none() {
        graph
            .upsert_alert_type(NEW_IP_ALERT_TYPE, Severity::Medium)
            .await?;
        tracing::info!(alert_type = NEW_IP_ALERT_TYPE, "Seeded alert type");
    }

    Ok(Arc::new(graph))
}

/// Arm the scheduler, then watch the persisted configuration until Ctrl-C.
async fn run_daemon(
    service: &DiscoveryService,
    store: &dyn DiscoveryStore,
    config: &DiscoverConfig,
) -> anyhow::Result<()> {
    match NmapScanner::from_config(config).verify_installation().await {
        Ok(version) => tracing::info!(nmap_version = %version, "Nmap verified"),
        Err(e) => tracing::warn!(error = %e, "Nmap unavailable; detail scans will fail"),
    }

    let state = service.scheduler().start().await?;
    tracing::info!(state = ?state, "Daemon running");

    let mut last_seen = store.get_scan_configuration().await.ok();
    let mut ticker = tokio::time::interval(Duration::from_secs(config.config_poll_secs.max(1)));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = service.reconcile_if_changed(&mut last_seen).await {
                    tracing::warn!(error = %e, "Configuration check failed");
                }
            }
        }
    }

    service.scheduler().stop().await;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
