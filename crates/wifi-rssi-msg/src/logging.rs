//! ---
//! section: "02-messaging-ipc-data-model"
//! subsection: "module"
//! type: "source"
//! scope: "code"
//! description: "Message envelope, codec, and address-routed channels."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
use prometheus::{IntCounter, Opts, Registry};
use tracing::debug;

use crate::types::{Address, Header};

/// Direction of the message movement, used for consistent logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDirection {
    /// Message sent out via a channel.
    Outbound,
    /// Message received from a channel.
    Inbound,
}

/// Emit a structured log entry for one framed message.
pub fn log_frame(direction: FrameDirection, peer: Address, header: &Header) {
    debug!(
        direction = ?direction,
        %peer,
        msg_type = header.msg_type,
        len = header.len,
        flags = header.flags,
        declared_pid = header.pid,
        "message frame"
    );
}

/// Prometheus counters describing request handling on the service side.
#[derive(Clone)]
pub struct MessagingMetricsExporter {
    received: IntCounter,
    replied: IntCounter,
    ignored: IntCounter,
    dropped: IntCounter,
    send_failed: IntCounter,
    spoofed: IntCounter,
}

impl MessagingMetricsExporter {
    /// Register the counters with the provided registry.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let counter = IntCounter::with_opts(Opts::new(name, help))?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };
        Ok(Self {
            received: counter("rssi_messages_received_total", "Frames read from the channel")?,
            replied: counter("rssi_responses_sent_total", "RSSI responses handed to the channel")?,
            ignored: counter(
                "rssi_messages_ignored_total",
                "Well-formed messages of an unknown type",
            )?,
            dropped: counter("rssi_messages_dropped_total", "Frames that failed to decode")?,
            send_failed: counter("rssi_send_failures_total", "Responses the channel refused")?,
            spoofed: counter(
                "rssi_spoofed_headers_total",
                "Requests whose declared sender differs from the verified one",
            )?,
        })
    }

    /// Record an inbound frame.
    pub fn observe_received(&self) {
        self.received.inc();
    }

    /// Record a response handed to the channel.
    pub fn observe_replied(&self) {
        self.replied.inc();
    }

    /// Record a message of unknown type.
    pub fn observe_ignored(&self) {
        self.ignored.inc();
    }

    /// Record a frame that failed to decode.
    pub fn observe_dropped(&self) {
        self.dropped.inc();
    }

    /// Record a failed response send.
    pub fn observe_send_failed(&self) {
        self.send_failed.inc();
    }

    /// Record a header whose declared sender was not the verified one.
    pub fn observe_spoofed(&self) {
        self.spoofed.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exporter_registers_all_counters() {
        let registry = Registry::new();
        let metrics = MessagingMetricsExporter::register(&registry).expect("register metrics");
        metrics.observe_received();
        metrics.observe_replied();
        metrics.observe_ignored();
        metrics.observe_dropped();
        metrics.observe_send_failed();
        metrics.observe_spoofed();

        let families = registry.gather();
        assert_eq!(families.len(), 6);
        assert!(families
            .iter()
            .any(|f| f.get_name() == "rssi_responses_sent_total"));
    }

    #[test]
    fn double_registration_fails() {
        let registry = Registry::new();
        MessagingMetricsExporter::register(&registry).expect("first");
        assert!(MessagingMetricsExporter::register(&registry).is_err());
    }
}
