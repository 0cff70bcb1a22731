//! ---
//! section: "01-core-functionality"
//! subsection: "module"
//! type: "source"
//! scope: "code"
//! description: "Shared primitives and utilities for the service and client."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

/// Lowest RSSI the simulated radio can plausibly report.
pub const RSSI_FLOOR_DBM: i32 = -100;
/// Highest RSSI the simulated radio can plausibly report.
pub const RSSI_CEILING_DBM: i32 = 0;

/// Well-known channel identifier shared by the service and its clients.
pub const DEFAULT_PROTOCOL: u16 = 30;

// Linux assigns netlink protocol ids up to 22 and caps the family at MAX_LINKS (32).
const MIN_USER_PROTOCOL: u16 = 23;
const MAX_USER_PROTOCOL: u16 = 31;

fn default_protocol() -> u16 {
    DEFAULT_PROTOCOL
}

fn default_transport() -> TransportKind {
    TransportKind::UnixDatagram
}

fn default_socket_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_backlog() -> usize {
    64
}

fn default_initial_rssi() -> i32 {
    -50
}

fn default_irq_base() -> i32 {
    -45
}

fn default_irq_window() -> u32 {
    10
}

fn default_tick() -> Duration {
    Duration::from_millis(4)
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

/// Primary configuration object shared by the daemon and the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and built-in defaults are in effect.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "WIFI_RSSI_CONFIG";

    /// Load configuration from disk, respecting the `WIFI_RSSI_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration together with the effective source path.
    ///
    /// An explicit `WIFI_RSSI_CONFIG` path must exist. Candidate paths are
    /// optional; when none of them exists the defaults are returned.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        debug!(
            inspected = %candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            "no configuration file found; using defaults"
        );
        Ok(LoadedAppConfig {
            config: Self::default(),
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.channel.validate()?;
        self.device.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Channel implementations the service can be exposed on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Process-local hub; used by tests and single-process demos.
    InMemory,
    /// Unix datagram sockets, one per endpoint address.
    #[default]
    UnixDatagram,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_protocol")]
    pub protocol: u16,
    #[serde(default = "default_transport")]
    pub transport: TransportKind,
    #[serde(default = "default_socket_dir")]
    pub socket_dir: PathBuf,
    /// Per-endpoint receive queue depth.
    #[serde(default = "default_backlog")]
    pub backlog: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            transport: default_transport(),
            socket_dir: default_socket_dir(),
            backlog: default_backlog(),
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_USER_PROTOCOL..=MAX_USER_PROTOCOL).contains(&self.protocol) {
            return Err(anyhow!(
                "channel protocol {} outside user range {}..={}",
                self.protocol,
                MIN_USER_PROTOCOL,
                MAX_USER_PROTOCOL
            ));
        }
        if self.backlog == 0 {
            return Err(anyhow!("channel backlog must be at least 1"));
        }
        Ok(())
    }
}

/// Simulated radio parameters.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_initial_rssi")]
    pub initial_rssi_dbm: i32,
    /// Lower edge of the value produced by the simulated interrupt.
    #[serde(default = "default_irq_base")]
    pub irq_base_dbm: i32,
    /// Width of the simulated interrupt's output window, in dBm.
    #[serde(default = "default_irq_window")]
    pub irq_window: u32,
    /// Length of one clock tick.
    #[serde(default = "default_tick", rename = "tick_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub tick: Duration,
    /// Delay before the first deferred update runs.
    #[serde(default, rename = "irq_delay_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub irq_delay: Duration,
    /// Re-arm period for the deferred update. `None` runs it exactly once.
    #[serde(default, rename = "rearm_interval_ms")]
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub rearm_interval: Option<Duration>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            initial_rssi_dbm: default_initial_rssi(),
            irq_base_dbm: default_irq_base(),
            irq_window: default_irq_window(),
            tick: default_tick(),
            irq_delay: Duration::ZERO,
            rearm_interval: None,
        }
    }
}

impl DeviceConfig {
    /// Inclusive band of values the simulated interrupt can produce.
    pub fn irq_band(&self) -> (i32, i32) {
        let upper = i64::from(self.irq_base_dbm) + i64::from(self.irq_window) - 1;
        (self.irq_base_dbm, upper.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
    }

    pub fn validate(&self) -> Result<()> {
        let plausible = RSSI_FLOOR_DBM..=RSSI_CEILING_DBM;
        if !plausible.contains(&self.initial_rssi_dbm) {
            return Err(anyhow!(
                "initial_rssi_dbm {} outside plausible band {}..={}",
                self.initial_rssi_dbm,
                RSSI_FLOOR_DBM,
                RSSI_CEILING_DBM
            ));
        }
        if self.irq_window == 0 {
            return Err(anyhow!("irq_window must be at least 1"));
        }
        let (low, high) = self.irq_band();
        if !plausible.contains(&low) || !plausible.contains(&high) {
            return Err(anyhow!(
                "interrupt band {}..={} leaves plausible band {}..={}",
                low,
                high,
                RSSI_FLOOR_DBM,
                RSSI_CEILING_DBM
            ));
        }
        if self.tick.is_zero() {
            return Err(anyhow!("tick_ms must be non-zero"));
        }
        if matches!(self.rearm_interval, Some(period) if period.is_zero()) {
            return Err(anyhow!("rearm_interval_ms must be non-zero when set"));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Bound on the wait for a response. `None` blocks until one arrives.
    #[serde(default, rename = "receive_timeout_ms")]
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub receive_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for the rolling log file; stdout only when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            format: default_log_format(),
            file_prefix: None,
        }
    }
}
