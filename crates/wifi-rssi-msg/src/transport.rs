//! ---
//! section: "02-messaging-ipc-data-model"
//! subsection: "module"
//! type: "source"
//! scope: "code"
//! description: "Message envelope, codec, and address-routed channels."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::types::Address;
use crate::{MessagingError, Result};

/// A frame as delivered by a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Sender address as observed by the channel, not as claimed in the frame.
    pub source: Address,
    /// Encoded message bytes.
    pub frame: Bytes,
}

/// One bound participant on a channel.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Address this endpoint is bound to.
    fn local_address(&self) -> Address;
    /// Hand a frame to the channel for delivery to `destination`.
    ///
    /// Sending never waits for the receiver: a full queue is an error.
    async fn send_to(&self, destination: Address, frame: Bytes) -> Result<()>;
    /// Wait for the next inbound frame.
    async fn recv_from(&self) -> Result<Datagram>;
    /// Human-readable channel name for logging/metrics.
    fn name(&self) -> &'static str;
}

/// Connectionless, address-routed transport identified by a protocol id.
pub trait Channel: Send + Sync {
    /// Protocol identifier both sides agreed on out of band.
    fn protocol(&self) -> u16;
    /// Bind a new endpoint at `address`.
    fn bind(&self, address: Address) -> Result<Box<dyn Endpoint>>;
    /// Human-readable channel name for logging/metrics.
    fn name(&self) -> &'static str;
}

struct Hub {
    protocol: u16,
    backlog: usize,
    endpoints: Mutex<HashMap<Address, mpsc::Sender<Datagram>>>,
}

/// Process-local channel backed by one bounded queue per bound address.
#[derive(Clone)]
pub struct InMemoryChannel {
    hub: Arc<Hub>,
}

impl InMemoryChannel {
    /// Create a hub for `protocol` whose endpoints queue up to `backlog` frames.
    pub fn new(protocol: u16, backlog: usize) -> Self {
        Self {
            hub: Arc::new(Hub {
                protocol,
                backlog: backlog.max(1),
                endpoints: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Bind and return the concrete endpoint type.
    pub fn bind_endpoint(&self, address: Address) -> Result<InMemoryEndpoint> {
        let mut endpoints = self.hub.endpoints.lock();
        if endpoints.contains_key(&address) {
            return Err(MessagingError::AddressInUse(address));
        }
        let (tx, rx) = mpsc::channel(self.hub.backlog);
        endpoints.insert(address, tx.clone());
        tracing::trace!(protocol = self.hub.protocol, %address, "endpoint bound");
        Ok(InMemoryEndpoint {
            address,
            hub: self.hub.clone(),
            registration: tx,
            inbox: tokio::sync::Mutex::new(rx),
        })
    }

    /// Whether an endpoint currently owns `address`.
    pub fn is_bound(&self, address: Address) -> bool {
        self.hub.endpoints.lock().contains_key(&address)
    }
}

impl Channel for InMemoryChannel {
    fn protocol(&self) -> u16 {
        self.hub.protocol
    }

    fn bind(&self, address: Address) -> Result<Box<dyn Endpoint>> {
        Ok(Box::new(self.bind_endpoint(address)?))
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

/// Endpoint handed out by [`InMemoryChannel`]; unbinds itself on drop.
pub struct InMemoryEndpoint {
    address: Address,
    hub: Arc<Hub>,
    registration: mpsc::Sender<Datagram>,
    inbox: tokio::sync::Mutex<mpsc::Receiver<Datagram>>,
}

#[async_trait]
impl Endpoint for InMemoryEndpoint {
    fn local_address(&self) -> Address {
        self.address
    }

    async fn send_to(&self, destination: Address, frame: Bytes) -> Result<()> {
        let target = self.hub.endpoints.lock().get(&destination).cloned();
        let Some(target) = target else {
            return Err(MessagingError::Unreachable(destination));
        };
        let datagram = Datagram {
            source: self.address,
            frame,
        };
        target.try_send(datagram).map_err(|err| match err {
            TrySendError::Full(_) => MessagingError::Backlog(destination),
            TrySendError::Closed(_) => MessagingError::Unreachable(destination),
        })
    }

    async fn recv_from(&self) -> Result<Datagram> {
        let mut inbox = self.inbox.lock().await;
        inbox.recv().await.ok_or(MessagingError::Closed)
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

impl Drop for InMemoryEndpoint {
    fn drop(&mut self) {
        let mut endpoints = self.hub.endpoints.lock();
        if endpoints
            .get(&self.address)
            .is_some_and(|tx| tx.same_channel(&self.registration))
        {
            endpoints.remove(&self.address);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(text: &'static str) -> Bytes {
        Bytes::from_static(text.as_bytes())
    }

    #[tokio::test]
    async fn routes_by_address_and_stamps_source() {
        let channel = InMemoryChannel::new(30, 4);
        let service = channel.bind_endpoint(Address::SERVICE).expect("bind service");
        let client = channel.bind_endpoint(Address::new(77)).expect("bind client");

        client
            .send_to(Address::SERVICE, frame("ping"))
            .await
            .expect("send");
        let inbound = service.recv_from().await.expect("recv");
        assert_eq!(inbound.source, Address::new(77));
        assert_eq!(inbound.frame, frame("ping"));

        service
            .send_to(inbound.source, frame("pong"))
            .await
            .expect("reply");
        let reply = client.recv_from().await.expect("recv reply");
        assert_eq!(reply.source, Address::SERVICE);
    }

    #[tokio::test]
    async fn unbound_destination_is_unreachable() {
        let channel = InMemoryChannel::new(30, 4);
        let client = channel.bind_endpoint(Address::new(5)).expect("bind");
        let err = client
            .send_to(Address::SERVICE, frame("x"))
            .await
            .expect_err("nobody listening");
        assert!(matches!(err, MessagingError::Unreachable(a) if a.is_service()));
    }

    #[test]
    fn double_bind_is_rejected_and_drop_unbinds() {
        let channel = InMemoryChannel::new(30, 4);
        let first = channel.bind_endpoint(Address::new(9)).expect("bind");
        assert!(matches!(
            channel.bind_endpoint(Address::new(9)),
            Err(MessagingError::AddressInUse(_))
        ));
        drop(first);
        assert!(!channel.is_bound(Address::new(9)));
        channel.bind_endpoint(Address::new(9)).expect("rebind after drop");
    }

    #[tokio::test]
    async fn full_queue_reports_backlog() {
        let channel = InMemoryChannel::new(30, 1);
        let _service = channel.bind_endpoint(Address::SERVICE).expect("bind");
        let client = channel.bind_endpoint(Address::new(3)).expect("bind");
        client
            .send_to(Address::SERVICE, frame("a"))
            .await
            .expect("first fits");
        let err = client
            .send_to(Address::SERVICE, frame("b"))
            .await
            .expect_err("queue full");
        assert!(matches!(err, MessagingError::Backlog(_)));
    }
}
