//! ---
//! section: "01-core-functionality"
//! subsection: "module"
//! type: "source"
//! scope: "code"
//! description: "Service lifecycle, device state, and request handling."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
//! Service side of the RSSI protocol.
//!
//! The server is stateless per request: each inbound datagram is decoded,
//! dispatched on its type and, for a query, answered with one response sent
//! to the address the channel observed as the sender.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use wifi_rssi_msg::types::{Address, MAX_REQUEST_PAYLOAD};
use wifi_rssi_msg::{
    log_frame, Datagram, Endpoint, FrameDirection, Message, MessageType, MessagingError,
    MessagingMetricsExporter,
};

use crate::state::DeviceState;

/// Pause after a failed receive before trying again.
const RECV_RETRY_DELAY: Duration = Duration::from_millis(50);
/// Consecutive receive failures after which the loop gives up.
const MAX_CONSECUTIVE_RECV_ERRORS: u32 = 20;

/// What the server did with one inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Replied { client: Address, rssi_dbm: i32 },
    /// Well-formed message of a type the server does not answer.
    Ignored { msg_type: u16 },
    /// Frame failed to decode.
    Dropped,
    SendFailed { client: Address },
}

/// Request handling counters, shared with the service handle.
#[derive(Debug, Default)]
pub struct ServerCounters {
    received: AtomicU64,
    replied: AtomicU64,
    ignored: AtomicU64,
    dropped: AtomicU64,
    send_failed: AtomicU64,
    spoofed: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServerStats {
    pub received: u64,
    pub replied: u64,
    pub ignored: u64,
    pub dropped: u64,
    pub send_failed: u64,
    pub spoofed: u64,
}

impl ServerCounters {
    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            received: self.received.load(Ordering::Relaxed),
            replied: self.replied.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            send_failed: self.send_failed.load(Ordering::Relaxed),
            spoofed: self.spoofed.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Owner of the service endpoint at address 0.
pub struct MessageServer {
    endpoint: Box<dyn Endpoint>,
    device: Arc<DeviceState>,
    counters: Arc<ServerCounters>,
    metrics: Option<MessagingMetricsExporter>,
}

impl MessageServer {
    pub fn new(endpoint: Box<dyn Endpoint>, device: Arc<DeviceState>) -> Self {
        Self {
            endpoint,
            device,
            counters: Arc::new(ServerCounters::default()),
            metrics: None,
        }
    }

    /// Mirror the counters into a Prometheus exporter.
    pub fn with_metrics(mut self, metrics: MessagingMetricsExporter) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn counters(&self) -> Arc<ServerCounters> {
        self.counters.clone()
    }

    pub fn local_address(&self) -> Address {
        self.endpoint.local_address()
    }

    /// Decode, dispatch and, for a query, answer one datagram.
    pub async fn handle(&self, datagram: Datagram) -> DispatchOutcome {
        bump(&self.counters.received);
        self.observe(MessagingMetricsExporter::observe_received);

        let request = match Message::decode(&datagram.frame, MAX_REQUEST_PAYLOAD) {
            Ok(message) => message,
            Err(err) => {
                warn!(client = %datagram.source, error = %err, "dropping malformed message");
                bump(&self.counters.dropped);
                self.observe(MessagingMetricsExporter::observe_dropped);
                return DispatchOutcome::Dropped;
            }
        };
        log_frame(FrameDirection::Inbound, datagram.source, request.header());

        match request.message_type() {
            Some(MessageType::QueryRssi) => self.reply_rssi(datagram.source, &request).await,
            _ => {
                let msg_type = request.header().msg_type;
                debug!(client = %datagram.source, msg_type, "ignoring message of unhandled type");
                bump(&self.counters.ignored);
                self.observe(MessagingMetricsExporter::observe_ignored);
                DispatchOutcome::Ignored { msg_type }
            }
        }
    }

    async fn reply_rssi(&self, client: Address, request: &Message) -> DispatchOutcome {
        let declared = request.header().declared_source();
        if declared != client {
            warn!(%client, %declared, "declared sender differs from verified sender");
            bump(&self.counters.spoofed);
            self.observe(MessagingMetricsExporter::observe_spoofed);
        }

        let rssi_dbm = self.device.read();
        let response = Message::rssi_response(rssi_dbm);
        log_frame(FrameDirection::Outbound, client, response.header());
        match self.endpoint.send_to(client, response.encode()).await {
            Ok(()) => {
                debug!(%client, rssi_dbm, "RSSI response sent");
                bump(&self.counters.replied);
                self.observe(MessagingMetricsExporter::observe_replied);
                DispatchOutcome::Replied { client, rssi_dbm }
            }
            Err(err) => {
                warn!(%client, error = %err, "failed to send RSSI response");
                bump(&self.counters.send_failed);
                self.observe(MessagingMetricsExporter::observe_send_failed);
                DispatchOutcome::SendFailed { client }
            }
        }
    }

    fn observe(&self, record: fn(&MessagingMetricsExporter)) {
        if let Some(metrics) = &self.metrics {
            record(metrics);
        }
    }

    /// Receive loop. Returns once `shutdown` fires, the endpoint closes, or
    /// receiving keeps failing; the endpoint is released when this future
    /// completes.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<()>) -> ServerStats {
        let mut recv_failures = 0u32;
        info!(
            address = %self.endpoint.local_address(),
            channel = self.endpoint.name(),
            "message server listening"
        );
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    debug!("message server shutdown");
                    break;
                }
                received = self.endpoint.recv_from() => match received {
                    Ok(datagram) => {
                        recv_failures = 0;
                        self.handle(datagram).await;
                    }
                    Err(MessagingError::Closed) => {
                        warn!("service endpoint closed");
                        break;
                    }
                    Err(err @ MessagingError::UnverifiableSource(_)) => {
                        warn!(error = %err, "dropping datagram from unverifiable sender");
                        bump(&self.counters.received);
                        bump(&self.counters.dropped);
                        self.observe(MessagingMetricsExporter::observe_received);
                        self.observe(MessagingMetricsExporter::observe_dropped);
                    }
                    Err(err) => {
                        recv_failures += 1;
                        if recv_failures >= MAX_CONSECUTIVE_RECV_ERRORS {
                            error!(
                                error = %err,
                                failures = recv_failures,
                                "receive keeps failing; stopping message server"
                            );
                            break;
                        }
                        warn!(error = %err, failures = recv_failures, "receive failed");
                        tokio::time::sleep(RECV_RETRY_DELAY).await;
                    }
                }
            }
        }
        self.counters.snapshot()
    }
}
