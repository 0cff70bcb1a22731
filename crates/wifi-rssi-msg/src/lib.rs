//! ---
//! section: "02-messaging-ipc-data-model"
//! subsection: "module"
//! type: "source"
//! scope: "code"
//! description: "Message envelope, codec, and address-routed channels."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Wire protocol shared by the RSSI service and its clients.
//!
//! A [`Message`] is a fixed 16-byte header followed by a bounded payload.
//! Messages travel over a [`Channel`]: a connectionless, address-routed
//! transport whose endpoints report the verified sender of every datagram.

pub mod logging;
pub mod transport;
pub mod types;
#[cfg(unix)]
pub mod unix;

use types::Address;

/// Shared result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;

/// Failures raised by the codec and the channels.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    /// The frame is shorter than the fixed header.
    #[error("frame truncated: {len} bytes, header needs {}", types::HEADER_LEN)]
    Truncated {
        /// Bytes actually received.
        len: usize,
    },
    /// The header's length field disagrees with the frame.
    #[error("declared length {declared} invalid for {available}-byte frame")]
    BadLength {
        /// Value of the header length field.
        declared: u32,
        /// Bytes actually received.
        available: usize,
    },
    /// The payload exceeds what the receiver accepts.
    #[error("payload of {len} bytes exceeds limit of {max}")]
    PayloadTooLarge {
        /// Payload length.
        len: usize,
        /// Accepted maximum.
        max: usize,
    },
    /// The payload is not NUL-terminated UTF-8 text.
    #[error("payload is not valid text")]
    NotText,
    /// Another endpoint already owns the address.
    #[error("address {0} already bound")]
    AddressInUse(Address),
    /// No endpoint is bound at the destination address.
    #[error("no endpoint bound at address {0}")]
    Unreachable(Address),
    /// The destination's receive queue is full.
    #[error("receive queue of address {0} is full")]
    Backlog(Address),
    /// The endpoint was closed underneath the caller.
    #[error("endpoint closed")]
    Closed,
    /// A datagram arrived from a peer whose address the channel cannot verify.
    #[error("sender address cannot be verified: {0}")]
    UnverifiableSource(String),
    /// Wrapper for IO errors raised by socket-backed channels.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub use logging::{log_frame, FrameDirection, MessagingMetricsExporter};
pub use transport::{Channel, Datagram, Endpoint, InMemoryChannel, InMemoryEndpoint};
pub use types::{Header, Message, MessageType};
#[cfg(unix)]
pub use unix::{UnixDatagramChannel, UnixDatagramEndpoint};
