//! ---
//! section: "01-core-functionality"
//! subsection: "module"
//! type: "source"
//! scope: "code"
//! description: "Service lifecycle, device state, and request handling."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
//! Simulated WiFi driver core: the RSSI device state, the deferred update
//! standing in for the radio interrupt, the message server answering RSSI
//! queries, and the client performing one query round trip.

pub mod client;
pub mod errors;
pub mod irq;
pub mod server;
pub mod service;
pub mod state;

pub use client::{MessageClient, RssiReport};
pub use errors::{ClientError, ServiceError};
pub use irq::RssiUpdate;
pub use server::{DispatchOutcome, MessageServer, ServerCounters, ServerStats};
pub use service::{open_channel, ServiceHandle, ShutdownReport, WifiService};
pub use state::{DeviceState, Reading};
