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

use tracing::debug;
use wifi_rssi_msg::types::{parse_rssi, Address, MAX_RESPONSE_PAYLOAD};
use wifi_rssi_msg::{
    log_frame, Channel, Endpoint, FrameDirection, Message, MessageType, MessagingError,
};

use crate::errors::ClientError;

/// Decoded RSSI response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RssiReport {
    /// Response text without the trailing NUL.
    pub text: String,
    /// Reading parsed from `text`, when it has the expected shape.
    pub rssi_dbm: Option<i32>,
}

/// Client side of one query/response round trip.
///
/// Without a receive timeout a query waits for as long as the service stays
/// silent, the same as a blocking socket read.
pub struct MessageClient {
    endpoint: Box<dyn Endpoint>,
    receive_timeout: Option<Duration>,
}

impl MessageClient {
    /// Bind an endpoint at `address` on `channel`.
    pub fn open(channel: &dyn Channel, address: Address) -> Result<Self, ClientError> {
        let endpoint = channel.bind(address).map_err(ClientError::Open)?;
        debug!(%address, protocol = channel.protocol(), "client endpoint open");
        Ok(Self {
            endpoint,
            receive_timeout: None,
        })
    }

    /// Bind at the address derived from the current process id.
    pub fn open_for_process(channel: &dyn Channel) -> Result<Self, ClientError> {
        Self::open(channel, Address::current_process())
    }

    pub fn with_receive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn local_address(&self) -> Address {
        self.endpoint.local_address()
    }

    /// Send one query to the service and wait for its response.
    pub async fn query_rssi(&self) -> Result<RssiReport, ClientError> {
        let request = Message::query_rssi(self.local_address());
        log_frame(FrameDirection::Outbound, Address::SERVICE, request.header());
        self.endpoint
            .send_to(Address::SERVICE, request.encode())
            .await
            .map_err(ClientError::Send)?;

        match self.receive_timeout {
            Some(limit) => tokio::time::timeout(limit, self.await_response())
                .await
                .map_err(|_| ClientError::Timeout(limit))?,
            None => self.await_response().await,
        }
    }

    async fn await_response(&self) -> Result<RssiReport, ClientError> {
        loop {
            let datagram = match self.endpoint.recv_from().await {
                Ok(datagram) => datagram,
                Err(err @ MessagingError::UnverifiableSource(_)) => {
                    debug!(error = %err, "discarding datagram from unverifiable sender");
                    continue;
                }
                Err(err) => return Err(ClientError::Receive(err)),
            };
            if !datagram.source.is_service() {
                debug!(source = %datagram.source, "discarding datagram not sent by the service");
                continue;
            }
            let response = Message::decode(&datagram.frame, MAX_RESPONSE_PAYLOAD)
                .map_err(ClientError::Decode)?;
            log_frame(FrameDirection::Inbound, datagram.source, response.header());
            if response.message_type() != Some(MessageType::RespRssi) {
                debug!(msg_type = response.header().msg_type, "discarding non-response message");
                continue;
            }
            let text = response.payload_text().map_err(ClientError::Decode)?;
            return Ok(RssiReport {
                text: text.to_owned(),
                rssi_dbm: parse_rssi(text),
            });
        }
    }
}
