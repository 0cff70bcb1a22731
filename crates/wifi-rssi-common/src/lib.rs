//! ---
//! section: "01-core-functionality"
//! subsection: "module"
//! type: "source"
//! scope: "code"
//! description: "Shared primitives and utilities for the service and client."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
//! Shared primitives for the WiFi RSSI workspace.
//! This crate exposes configuration loading, tracing initialisation, and the
//! monotonic tick clock consumed by the deferred update path.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    AppConfig, ChannelConfig, ClientConfig, DeviceConfig, LoadedAppConfig, LoggingConfig,
    TransportKind,
};
pub use logging::{init_cli_tracing, init_tracing, LogFormat};
pub use time::{Clock, ManualClock, MonotonicClock};
