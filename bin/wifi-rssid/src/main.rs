//! ---
//! section: "01-core-functionality"
//! subsection: "binary"
//! type: "source"
//! scope: "code"
//! description: "Binary entrypoint for the WiFi RSSI service daemon."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use prometheus::{Registry, TextEncoder};
use tokio::signal;
use tracing::{info, warn};
use wifi_rssi_common::config::AppConfig;
use wifi_rssi_common::logging::init_tracing;
use wifi_rssi_core::{open_channel, ServiceHandle, WifiService};
use wifi_rssi_msg::MessagingMetricsExporter;

const DEFAULT_REARM_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Simulated WiFi driver answering RSSI queries",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "DIR", help = "Override the socket directory")]
    socket_dir: Option<PathBuf>,

    #[arg(
        long,
        help = "Run the simulated interrupt once instead of re-arming it when the config sets no interval"
    )]
    one_shot: bool,

    #[arg(long, help = "Print Prometheus counters to stdout on shutdown")]
    dump_metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/wifi-rssi.toml"));
    candidates.push(PathBuf::from("/etc/wifi-rssi/wifi-rssi.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(dir) = cli.socket_dir {
        config.channel.socket_dir = dir;
    }
    if config.device.rearm_interval.is_none() && !cli.one_shot {
        config.device.rearm_interval = Some(DEFAULT_REARM_INTERVAL);
    }
    config.validate()?;
    init_tracing("wifi-rssid", &config.logging)?;
    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file found; running with defaults"),
    }

    let registry = Registry::new();
    let metrics = MessagingMetricsExporter::register(&registry)
        .context("failed to register messaging metrics")?;

    let channel = open_channel(&config.channel)?;
    let service = WifiService::new(config.device, channel)
        .with_metrics(metrics)
        .start()
        .await?;

    info!(address = %service.local_address(), "daemon running; waiting for termination signal");
    wait_for_shutdown(&service).await;
    info!("termination requested; shutting down");

    let report = service.shutdown().await;
    info!(
        received = report.server.received,
        replied = report.server.replied,
        ignored = report.server.ignored,
        dropped = report.server.dropped,
        spoofed = report.server.spoofed,
        updates = report.tasklet.runs,
        final_rssi_dbm = report.final_reading.rssi_dbm,
        "service stopped"
    );

    if cli.dump_metrics {
        let body = TextEncoder::new()
            .encode_to_string(&registry.gather())
            .context("failed to encode metrics")?;
        print!("{body}");
    }
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM. SIGUSR1 raises the simulated interrupt.
async fn wait_for_shutdown(service: &ServiceHandle) {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut irq = irq_signal();
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            raised = next_irq(&mut irq) => {
                if raised {
                    let scheduled = service.raise_irq();
                    info!(scheduled, "interrupt raised by signal");
                }
            }
        }
    }
}

async fn shutdown_signal() {
    tokio::select! {
        _ = ctrl_c() => {},
        _ = terminate() => {},
    }
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => {
            warn!(?err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

#[cfg(unix)]
type IrqSignal = Option<tokio::signal::unix::Signal>;
#[cfg(not(unix))]
type IrqSignal = Option<()>;

#[cfg(unix)]
fn irq_signal() -> IrqSignal {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::user_defined1()) {
        Ok(usr1) => Some(usr1),
        Err(err) => {
            warn!(?err, "failed to install SIGUSR1 handler");
            None
        }
    }
}

#[cfg(not(unix))]
fn irq_signal() -> IrqSignal {
    None
}

// Resolves `true` per delivered signal; never resolves without a handler.
#[cfg(unix)]
async fn next_irq(irq: &mut IrqSignal) -> bool {
    let Some(usr1) = irq.as_mut() else {
        return std::future::pending().await;
    };
    if usr1.recv().await.is_some() {
        return true;
    }
    *irq = None;
    false
}

#[cfg(not(unix))]
async fn next_irq(_irq: &mut IrqSignal) -> bool {
    std::future::pending().await
}
