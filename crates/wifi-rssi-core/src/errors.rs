//! ---
//! section: "01-core-functionality"
//! subsection: "module"
//! type: "source"
//! scope: "code"
//! description: "Service lifecycle, device state, and request handling."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
use std::time::Duration;

use thiserror::Error;
use wifi_rssi_msg::MessagingError;

/// Failures that abort service start-up.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to create channel: {0}")]
    Channel(#[source] MessagingError),
    #[error("failed to bind service endpoint: {0}")]
    Endpoint(#[source] MessagingError),
}

/// Failures of a client round trip. Each one ends the request; there is no retry.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to open endpoint: {0}")]
    Open(#[source] MessagingError),
    #[error("send failed: {0}")]
    Send(#[source] MessagingError),
    #[error("receive failed: {0}")]
    Receive(#[source] MessagingError),
    #[error("malformed response: {0}")]
    Decode(#[source] MessagingError),
    #[error("no response within {0:?}")]
    Timeout(Duration),
}
