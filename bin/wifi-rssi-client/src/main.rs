//! ---
//! section: "05-networking-external-interfaces"
//! subsection: "binary"
//! type: "source"
//! scope: "code"
//! description: "Command-line client performing one RSSI query."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::debug;
use wifi_rssi_common::config::{AppConfig, TransportKind};
use wifi_rssi_common::logging::init_cli_tracing;
use wifi_rssi_core::{open_channel, MessageClient};
use wifi_rssi_msg::types::Address;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Query the simulated WiFi driver for the current RSSI",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "DIR", help = "Override the socket directory")]
    socket_dir: Option<PathBuf>,

    #[arg(
        long,
        value_name = "MS",
        help = "Give up when no response arrives within this many milliseconds"
    )]
    timeout_ms: Option<u64>,

    #[arg(long, help = "Bind this address instead of the process id")]
    address: Option<u32>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_cli_tracing();
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
    config.validate()?;
    if config.channel.transport != TransportKind::UnixDatagram {
        bail!("the client needs the unix_datagram transport to reach the service");
    }
    debug!(source = ?loaded.source, "client configuration loaded");

    let timeout = cli
        .timeout_ms
        .map(Duration::from_millis)
        .or(config.client.receive_timeout);
    let address = cli
        .address
        .map(Address::new)
        .unwrap_or_else(Address::current_process);

    let channel = open_channel(&config.channel).context("failed to create channel")?;
    let client = MessageClient::open(&*channel, address)
        .with_context(|| format!("failed to bind address {address}"))?
        .with_receive_timeout(timeout);

    println!("Sending RSSI query to kernel (PID: {address})...");
    println!("Waiting for kernel response...");
    let report = client.query_rssi().await.context("RSSI query failed")?;
    println!("Received response from kernel: {}", report.text);
    Ok(())
}
