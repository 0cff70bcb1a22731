//! ---
//! section: "02-messaging-ipc-data-model"
//! subsection: "tests"
//! type: "source"
//! scope: "code"
//! description: "Message envelope, codec, and address-routed channels."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
use std::time::Duration;

use wifi_rssi_msg::types::{
    parse_rssi, Address, MAX_REQUEST_PAYLOAD, MAX_RESPONSE_PAYLOAD,
};
#[cfg(unix)]
use wifi_rssi_msg::UnixDatagramChannel;
use wifi_rssi_msg::{Channel, Endpoint, InMemoryChannel, Message, MessageType, MessagingError};

#[tokio::test]
async fn query_and_response_cross_the_channel_intact() -> anyhow::Result<()> {
    let channel = InMemoryChannel::new(30, 8);
    let service = channel.bind(Address::SERVICE)?;
    let client = channel.bind(Address::new(1200))?;

    client
        .send_to(
            Address::SERVICE,
            Message::query_rssi(client.local_address()).encode(),
        )
        .await?;

    let inbound = service.recv_from().await?;
    let request = Message::decode(&inbound.frame, MAX_REQUEST_PAYLOAD)?;
    assert_eq!(request.message_type(), Some(MessageType::QueryRssi));
    assert_eq!(inbound.source, Address::new(1200));

    service
        .send_to(inbound.source, Message::rssi_response(-41).encode())
        .await?;

    let reply = client.recv_from().await?;
    assert!(reply.source.is_service());
    let response = Message::decode(&reply.frame, MAX_RESPONSE_PAYLOAD)?;
    assert_eq!(response.message_type(), Some(MessageType::RespRssi));
    assert_eq!(parse_rssi(response.payload_text()?), Some(-41));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn protocols_sharing_a_socket_dir_cannot_reach_each_other() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let rssi = UnixDatagramChannel::new(dir.path(), 30)?;
    let other = UnixDatagramChannel::new(dir.path(), 31)?;
    assert_ne!(rssi.root(), other.root());

    let service = rssi.bind_endpoint(Address::SERVICE)?;
    let stranger = other.bind_endpoint(Address::new(5))?;
    let outcome = stranger
        .send_to(Address::SERVICE, Message::query_rssi(Address::new(5)).encode())
        .await;
    assert!(matches!(outcome, Err(MessagingError::Unreachable(a)) if a.is_service()));

    // a peer on the same protocol still gets through
    let neighbour = rssi.bind_endpoint(Address::new(6))?;
    neighbour
        .send_to(Address::SERVICE, Message::query_rssi(Address::new(6)).encode())
        .await?;
    let inbound = tokio::time::timeout(Duration::from_secs(2), service.recv_from()).await??;
    assert_eq!(inbound.source, Address::new(6));
    Ok(())
}
