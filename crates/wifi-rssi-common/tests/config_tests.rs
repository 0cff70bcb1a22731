//! ---
//! section: "01-core-functionality"
//! subsection: "tests"
//! type: "source"
//! scope: "code"
//! description: "Shared primitives and utilities for the service and client."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::tempdir;
use wifi_rssi_common::config::{AppConfig, TransportKind};
use wifi_rssi_common::LogFormat;

fn sample_config() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs/wifi-rssi.toml")
}

#[test]
fn shipped_sample_config_is_valid() {
    let loaded = AppConfig::load_with_source(&[sample_config()]).expect("load sample");
    assert!(loaded.source.is_some());
    let config = loaded.config;
    config.validate().expect("sample validates");
    assert_eq!(config.channel.protocol, 30);
    assert_eq!(config.channel.transport, TransportKind::UnixDatagram);
    assert_eq!(config.device.initial_rssi_dbm, -50);
    assert_eq!(config.device.irq_band(), (-45, -36));
    assert_eq!(config.device.rearm_interval, Some(Duration::from_secs(1)));
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert!(
        config.client.receive_timeout.is_none(),
        "sample keeps the blocking receive"
    );
}

#[test]
fn first_existing_candidate_wins() {
    let dir = tempdir().expect("tempdir");
    let missing = dir.path().join("missing.toml");
    let present = dir.path().join("present.toml");
    fs::write(&present, "[channel]\nprotocol = 31\ntransport = \"in_memory\"\n").expect("write");

    let loaded = AppConfig::load_with_source(&[missing, present.clone()]).expect("load");
    assert_eq!(loaded.source.as_deref(), Some(present.as_path()));
    assert_eq!(loaded.config.channel.protocol, 31);
    assert_eq!(loaded.config.channel.transport, TransportKind::InMemory);
}

#[test]
fn no_candidate_falls_back_to_defaults() {
    let dir = tempdir().expect("tempdir");
    let loaded =
        AppConfig::load_with_source(&[dir.path().join("absent.toml")]).expect("defaults");
    assert!(loaded.source.is_none());
    assert_eq!(loaded.config.device.initial_rssi_dbm, -50);
    assert!(loaded.config.client.receive_timeout.is_none());
}

#[test]
fn invalid_file_is_reported_with_path() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[device]\nirq_window = 0\n").expect("write");

    let err = AppConfig::load_with_source(&[path.clone()]).expect_err("invalid window");
    assert!(format!("{err:#}").contains("broken.toml"));
}
