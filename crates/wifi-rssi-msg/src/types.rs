//! ---
//! section: "02-messaging-ipc-data-model"
//! subsection: "module"
//! type: "source"
//! scope: "code"
//! description: "Message envelope, codec, and address-routed channels."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{MessagingError, Result};

/// Size of the fixed message header in bytes.
pub const HEADER_LEN: usize = 16;
/// Frames are padded to this boundary on the wire.
pub const ALIGN_TO: usize = 4;
/// Largest payload a request may carry; also the client's envelope size.
pub const MAX_REQUEST_PAYLOAD: usize = 1024;
/// Largest payload a response may carry.
pub const MAX_RESPONSE_PAYLOAD: usize = 64;
/// Largest encoded frame either side will accept.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_REQUEST_PAYLOAD;
/// Header flag marking a message as a request.
pub const FLAG_REQUEST: u16 = 0x1;

const QUERY_PLACEHOLDER: &[u8] = b"query_rssi";
const RESPONSE_PREFIX: &str = "WiFi RSSI: ";
const RESPONSE_SUFFIX: &str = " dBm";

/// Round `len` up to the wire alignment.
pub const fn align(len: usize) -> usize {
    (len + ALIGN_TO - 1) & !(ALIGN_TO - 1)
}

/// Identifier of a channel participant.
///
/// The service listens on [`Address::SERVICE`]; clients use a locally unique
/// value, by default their process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(u32);

impl Address {
    /// Well-known address of the service endpoint.
    pub const SERVICE: Address = Address(0);

    /// Wrap a raw address value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Address derived from the calling process id.
    pub fn current_process() -> Self {
        Self(std::process::id())
    }

    /// Raw address value.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Whether this is the service address.
    pub const fn is_service(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Address {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Application message types understood by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    /// Request for the current signal strength.
    QueryRssi = 1,
    /// Response carrying the rendered signal strength.
    RespRssi = 2,
}

impl MessageType {
    /// Wire value of the type.
    pub const fn as_raw(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for MessageType {
    type Error = u16;

    fn try_from(raw: u16) -> std::result::Result<Self, Self::Error> {
        match raw {
            1 => Ok(MessageType::QueryRssi),
            2 => Ok(MessageType::RespRssi),
            other => Err(other),
        }
    }
}

/// Fixed message header, little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Total message length, header included, padding excluded.
    pub len: u32,
    /// Raw message type; may name a type this build does not know.
    pub msg_type: u16,
    /// Flag bits; only [`FLAG_REQUEST`] is meaningful.
    pub flags: u16,
    /// Advisory sequence number, always 0 in this protocol.
    pub seq: u32,
    /// Sender address as declared by the sender. Never trusted for routing.
    pub pid: u32,
}

impl Header {
    /// Parsed message type, if known.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::try_from(self.msg_type).ok()
    }

    /// Whether the request flag is set.
    pub fn is_request(&self) -> bool {
        self.flags & FLAG_REQUEST != 0
    }

    /// Address the sender claims to have.
    pub fn declared_source(&self) -> Address {
        Address(self.pid)
    }

    /// Payload length implied by `len`.
    pub fn payload_len(&self) -> usize {
        (self.len as usize).saturating_sub(HEADER_LEN)
    }

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.len);
        buf.put_u16_le(self.msg_type);
        buf.put_u16_le(self.flags);
        buf.put_u32_le(self.seq);
        buf.put_u32_le(self.pid);
    }

    fn read(mut buf: &[u8]) -> Self {
        Self {
            len: buf.get_u32_le(),
            msg_type: buf.get_u16_le(),
            flags: buf.get_u16_le(),
            seq: buf.get_u32_le(),
            pid: buf.get_u32_le(),
        }
    }
}

/// A framed message: header plus payload.
///
/// The header's `len` is always derived from the payload, so the declared
/// length cannot disagree with the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: Header,
    payload: Bytes,
}

impl Message {
    /// Build a message around `payload`.
    pub fn new(
        msg_type: u16,
        flags: u16,
        declared_source: Address,
        payload: impl Into<Bytes>,
    ) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_REQUEST_PAYLOAD {
            return Err(MessagingError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_REQUEST_PAYLOAD,
            });
        }
        let header = Header {
            len: (HEADER_LEN + payload.len()) as u32,
            msg_type,
            flags,
            seq: 0,
            pid: declared_source.get(),
        };
        Ok(Self { header, payload })
    }

    /// RSSI query as sent by the client: a full request envelope with a
    /// placeholder string the service ignores.
    pub fn query_rssi(source: Address) -> Self {
        let mut payload = BytesMut::zeroed(MAX_REQUEST_PAYLOAD);
        payload[..QUERY_PLACEHOLDER.len()].copy_from_slice(QUERY_PLACEHOLDER);
        Self {
            header: Header {
                len: (HEADER_LEN + MAX_REQUEST_PAYLOAD) as u32,
                msg_type: MessageType::QueryRssi.as_raw(),
                flags: FLAG_REQUEST,
                seq: 0,
                pid: source.get(),
            },
            payload: payload.freeze(),
        }
    }

    /// Response rendering `rssi_dbm`, NUL-terminated, sized exactly to the text.
    pub fn rssi_response(rssi_dbm: i32) -> Self {
        let text = render_rssi(rssi_dbm);
        let mut payload = BytesMut::with_capacity(text.len() + 1);
        payload.put_slice(text.as_bytes());
        payload.put_u8(0);
        debug_assert!(payload.len() <= MAX_RESPONSE_PAYLOAD);
        Self {
            header: Header {
                len: (HEADER_LEN + payload.len()) as u32,
                msg_type: MessageType::RespRssi.as_raw(),
                flags: 0,
                seq: 0,
                pid: Address::SERVICE.get(),
            },
            payload: payload.freeze(),
        }
    }

    /// Message header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Parsed message type, if known.
    pub fn message_type(&self) -> Option<MessageType> {
        self.header.message_type()
    }

    /// Raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload up to the first NUL, as UTF-8.
    pub fn payload_text(&self) -> Result<&str> {
        let end = self
            .payload
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(self.payload.len());
        std::str::from_utf8(&self.payload[..end]).map_err(|_| MessagingError::NotText)
    }

    /// Encode into a wire frame, padded to [`ALIGN_TO`].
    pub fn encode(&self) -> Bytes {
        let len = self.header.len as usize;
        let mut buf = BytesMut::with_capacity(align(len));
        self.header.write(&mut buf);
        buf.put_slice(&self.payload);
        buf.resize(align(len), 0);
        buf.freeze()
    }

    /// Decode a wire frame, rejecting payloads above `max_payload`.
    pub fn decode(frame: &[u8], max_payload: usize) -> Result<Self> {
        if frame.len() < HEADER_LEN {
            return Err(MessagingError::Truncated { len: frame.len() });
        }
        let header = Header::read(&frame[..HEADER_LEN]);
        let declared = header.len as usize;
        if declared < HEADER_LEN || declared > frame.len() {
            return Err(MessagingError::BadLength {
                declared: header.len,
                available: frame.len(),
            });
        }
        let payload_len = declared - HEADER_LEN;
        if payload_len > max_payload {
            return Err(MessagingError::PayloadTooLarge {
                len: payload_len,
                max: max_payload,
            });
        }
        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(&frame[HEADER_LEN..declared]),
        })
    }
}

/// Render the response text for `rssi_dbm`.
pub fn render_rssi(rssi_dbm: i32) -> String {
    format!("{RESPONSE_PREFIX}{rssi_dbm}{RESPONSE_SUFFIX}")
}

/// Extract the reading from a rendered response text.
pub fn parse_rssi(text: &str) -> Option<i32> {
    text.strip_prefix(RESPONSE_PREFIX)?
        .strip_suffix(RESPONSE_SUFFIX)?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_carries_full_envelope() {
        let query = Message::query_rssi(Address::new(4242));
        let header = query.header();
        assert_eq!(header.len as usize, HEADER_LEN + MAX_REQUEST_PAYLOAD);
        assert_eq!(header.message_type(), Some(MessageType::QueryRssi));
        assert!(header.is_request());
        assert_eq!(header.declared_source(), Address::new(4242));
        assert_eq!(query.payload_text().expect("text"), "query_rssi");
    }

    #[test]
    fn response_is_sized_to_text() {
        let response = Message::rssi_response(-50);
        assert_eq!(response.payload(), b"WiFi RSSI: -50 dBm\0");
        assert_eq!(
            response.header().len as usize,
            HEADER_LEN + "WiFi RSSI: -50 dBm".len() + 1
        );
        assert_eq!(response.header().pid, 0);
        assert!(!response.header().is_request());

        let encoded = response.encode();
        assert_eq!(encoded.len() % ALIGN_TO, 0);
        let decoded = Message::decode(&encoded, MAX_RESPONSE_PAYLOAD).expect("decode");
        assert_eq!(decoded, response);
        assert_eq!(parse_rssi(decoded.payload_text().expect("text")), Some(-50));
    }

    #[test]
    fn worst_case_response_fits_limit() {
        let response = Message::rssi_response(i32::MIN);
        assert!(response.payload().len() <= MAX_RESPONSE_PAYLOAD);
    }

    #[test]
    fn decode_rejects_short_frames() {
        assert!(matches!(
            Message::decode(&[0u8; 7], MAX_REQUEST_PAYLOAD),
            Err(MessagingError::Truncated { len: 7 })
        ));
    }

    #[test]
    fn decode_rejects_lying_length() {
        let mut frame = Message::rssi_response(-40).encode().to_vec();
        frame[..4].copy_from_slice(&500u32.to_le_bytes());
        assert!(matches!(
            Message::decode(&frame, MAX_REQUEST_PAYLOAD),
            Err(MessagingError::BadLength { declared: 500, .. })
        ));

        frame[..4].copy_from_slice(&3u32.to_le_bytes());
        assert!(matches!(
            Message::decode(&frame, MAX_REQUEST_PAYLOAD),
            Err(MessagingError::BadLength { declared: 3, .. })
        ));
    }

    #[test]
    fn decode_enforces_payload_limit() {
        let frame = Message::query_rssi(Address::new(1)).encode();
        assert!(matches!(
            Message::decode(&frame, MAX_RESPONSE_PAYLOAD),
            Err(MessagingError::PayloadTooLarge { len: 1024, max: 64 })
        ));
    }

    #[test]
    fn unknown_types_survive_decoding() {
        let message = Message::new(0x7f, FLAG_REQUEST, Address::new(9), &b"hi\0"[..])
            .expect("message");
        let decoded =
            Message::decode(&message.encode(), MAX_REQUEST_PAYLOAD).expect("decode");
        assert_eq!(decoded.header().msg_type, 0x7f);
        assert_eq!(decoded.message_type(), None);
    }

    #[test]
    fn parse_rssi_rejects_foreign_text() {
        assert_eq!(parse_rssi("WiFi RSSI: -38 dBm"), Some(-38));
        assert_eq!(parse_rssi("RSSI -38"), None);
        assert_eq!(parse_rssi("WiFi RSSI: strong dBm"), None);
    }
}
