//! Request packet builders.
//!
//! Every request shares the same framing:
//! ```text
//! opcode (1) | total length (2, BE, backpatched) | fixed fields | headers
//! ```
//!
//! # Example
//!
//! ```
//! use obex_engine::protocol::{ConnectRequest, Request};
//!
//! let mut connect = ConnectRequest::new();
//! connect.set_max_packet_size(8192).set_count(4).set_length(0xF483);
//!
//! let bytes = connect.serialize().unwrap();
//! assert_eq!(bytes.len(), 17);
//! assert_eq!(&bytes[..7], &[0x80, 0x00, 0x11, 0x10, 0x00, 0x20, 0x00]);
//! ```

use bytes::Bytes;

use super::buffer::GrowableByteBuffer;
use super::header::{HeaderIdentifier, HeaderList, HeaderValue};
use super::wire_format::{
    opcode, DEFAULT_MAX_PACKET_SIZE, FINAL_BIT, FRAME_HEADER_SIZE, MAX_FRAME_SIZE, OBEX_VERSION,
};
use crate::error::{ObexError, Result};

/// A request that can be framed and sent.
pub trait Request {
    /// Opcode byte, final bit included.
    fn opcode(&self) -> u8;

    /// Headers appended after the fixed fields.
    fn headers(&self) -> &HeaderList;

    /// Write opcode-specific fixed fields. Most requests have none.
    fn write_fields(&self, _buf: &mut GrowableByteBuffer) {}

    /// Serialize the complete frame, backpatching the total length.
    fn serialize(&self) -> Result<Bytes> {
        let headers = self.headers();
        let mut buf = GrowableByteBuffer::with_capacity(FRAME_HEADER_SIZE + headers.encoded_len());
        buf.push_u8(self.opcode());
        buf.push_u16(0);
        self.write_fields(&mut buf);
        headers.serialize(&mut buf)?;

        let total = buf.len();
        if total > MAX_FRAME_SIZE {
            return Err(ObexError::OutOfRange(format!(
                "request of {} bytes exceeds the maximum frame size {}",
                total, MAX_FRAME_SIZE
            )));
        }
        buf.set_u16(1, total as u16)?;
        Ok(buf.freeze())
    }
}

/// Store a value whose kind is fixed by the identifier.
fn set_header(headers: &mut HeaderList, id: HeaderIdentifier, value: HeaderValue) {
    debug_assert_eq!(id.kind(), value.kind());
    headers.add(id).value = value;
}

/// Connect request (opcode 0x80).
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    max_packet_size: u16,
    headers: HeaderList,
}

impl ConnectRequest {
    /// Connect request announcing the default 255-byte packet size.
    pub fn new() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            headers: HeaderList::new(),
        }
    }

    pub fn max_packet_size(&self) -> u16 {
        self.max_packet_size
    }

    /// Largest packet this side is able to receive.
    pub fn set_max_packet_size(&mut self, size: u16) -> &mut Self {
        self.max_packet_size = size;
        self
    }

    /// Number of objects that will be sent.
    pub fn set_count(&mut self, count: u32) -> &mut Self {
        set_header(&mut self.headers, HeaderIdentifier::Count, HeaderValue::Int32(count));
        self
    }

    /// Total byte length of the objects that will be sent.
    pub fn set_length(&mut self, length: u32) -> &mut Self {
        set_header(&mut self.headers, HeaderIdentifier::Length, HeaderValue::Int32(length));
        self
    }

    /// Service to connect to.
    pub fn set_target(&mut self, target: impl Into<Bytes>) -> &mut Self {
        set_header(
            &mut self.headers,
            HeaderIdentifier::Target,
            HeaderValue::ByteSequence(target.into()),
        );
        self
    }

    pub fn headers_mut(&mut self) -> &mut HeaderList {
        &mut self.headers
    }
}

impl Default for ConnectRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl Request for ConnectRequest {
    fn opcode(&self) -> u8 {
        opcode::CONNECT
    }

    fn headers(&self) -> &HeaderList {
        &self.headers
    }

    fn write_fields(&self, buf: &mut GrowableByteBuffer) {
        buf.push_u8(OBEX_VERSION);
        buf.push_u8(0x00);
        buf.push_u16(self.max_packet_size);
    }
}

/// Disconnect request (opcode 0x81).
#[derive(Debug, Clone, Default)]
pub struct DisconnectRequest {
    headers: HeaderList,
}

impl DisconnectRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connection_id(&mut self, id: u32) -> &mut Self {
        set_header(&mut self.headers, HeaderIdentifier::ConnectionId, HeaderValue::Int32(id));
        self
    }
}

impl Request for DisconnectRequest {
    fn opcode(&self) -> u8 {
        opcode::DISCONNECT
    }

    fn headers(&self) -> &HeaderList {
        &self.headers
    }
}

/// Put request (opcode 0x02, or 0x82 when final).
///
/// Carries exactly one of Body or EndOfBody: setting one removes the other.
#[derive(Debug, Clone, Default)]
pub struct PutRequest {
    is_final: bool,
    headers: HeaderList,
}

impl PutRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// Mark this as the last packet of the object.
    pub fn set_final(&mut self, is_final: bool) -> &mut Self {
        self.is_final = is_final;
        self
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        set_header(&mut self.headers, HeaderIdentifier::Name, HeaderValue::Unicode(name.into()));
        self
    }

    /// Total object size; only sent with the first packet.
    pub fn set_length(&mut self, length: u32) -> &mut Self {
        set_header(&mut self.headers, HeaderIdentifier::Length, HeaderValue::Int32(length));
        self
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> &mut Self {
        set_header(
            &mut self.headers,
            HeaderIdentifier::Description,
            HeaderValue::Unicode(description.into()),
        );
        self
    }

    /// MIME type, sent as a byte sequence.
    pub fn set_type(&mut self, mime: impl Into<Bytes>) -> &mut Self {
        set_header(
            &mut self.headers,
            HeaderIdentifier::Type,
            HeaderValue::ByteSequence(mime.into()),
        );
        self
    }

    pub fn set_connection_id(&mut self, id: u32) -> &mut Self {
        set_header(&mut self.headers, HeaderIdentifier::ConnectionId, HeaderValue::Int32(id));
        self
    }

    /// Payload of a non-final packet.
    pub fn set_body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.headers.remove(HeaderIdentifier::EndOfBody);
        set_header(
            &mut self.headers,
            HeaderIdentifier::Body,
            HeaderValue::ByteSequence(body.into()),
        );
        self
    }

    /// Payload of the final packet.
    pub fn set_end_of_body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.headers.remove(HeaderIdentifier::Body);
        set_header(
            &mut self.headers,
            HeaderIdentifier::EndOfBody,
            HeaderValue::ByteSequence(body.into()),
        );
        self
    }

    pub fn headers_mut(&mut self) -> &mut HeaderList {
        &mut self.headers
    }
}

impl Request for PutRequest {
    fn opcode(&self) -> u8 {
        if self.is_final {
            opcode::PUT | FINAL_BIT
        } else {
            opcode::PUT
        }
    }

    fn headers(&self) -> &HeaderList {
        &self.headers
    }
}

/// Get request (opcode 0x03, or 0x83 when final).
#[derive(Debug, Clone, Default)]
pub struct GetRequest {
    is_final: bool,
    headers: HeaderList,
}

impl GetRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_final(&mut self, is_final: bool) -> &mut Self {
        self.is_final = is_final;
        self
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        set_header(&mut self.headers, HeaderIdentifier::Name, HeaderValue::Unicode(name.into()));
        self
    }

    pub fn set_type(&mut self, mime: impl Into<Bytes>) -> &mut Self {
        set_header(
            &mut self.headers,
            HeaderIdentifier::Type,
            HeaderValue::ByteSequence(mime.into()),
        );
        self
    }

    pub fn set_connection_id(&mut self, id: u32) -> &mut Self {
        set_header(&mut self.headers, HeaderIdentifier::ConnectionId, HeaderValue::Int32(id));
        self
    }

    pub fn headers_mut(&mut self) -> &mut HeaderList {
        &mut self.headers
    }
}

impl Request for GetRequest {
    fn opcode(&self) -> u8 {
        if self.is_final {
            opcode::GET | FINAL_BIT
        } else {
            opcode::GET
        }
    }

    fn headers(&self) -> &HeaderList {
        &self.headers
    }
}

/// Abort request (opcode 0xFF).
#[derive(Debug, Clone, Default)]
pub struct AbortRequest {
    headers: HeaderList,
}

impl AbortRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connection_id(&mut self, id: u32) -> &mut Self {
        set_header(&mut self.headers, HeaderIdentifier::ConnectionId, HeaderValue::Int32(id));
        self
    }
}

impl Request for AbortRequest {
    fn opcode(&self) -> u8 {
        opcode::ABORT
    }

    fn headers(&self) -> &HeaderList {
        &self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_scenario_is_17_bytes() {
        let mut connect = ConnectRequest::new();
        connect.set_count(4).set_length(0xF483).set_max_packet_size(8192);

        let bytes = connect.serialize().unwrap();
        assert_eq!(
            &bytes[..],
            &[
                0x80, 0x00, 0x11, // opcode, length 17
                0x10, 0x00, 0x20, 0x00, // version, flags, max packet 8192
                0xC0, 0x00, 0x00, 0x00, 0x04, // Count = 4
                0xC3, 0x00, 0x00, 0xF4, 0x83, // Length = 0xF483
            ]
        );
    }

    #[test]
    fn test_connect_default_packet_size() {
        let bytes = ConnectRequest::new().serialize().unwrap();
        assert_eq!(&bytes[..], &[0x80, 0x00, 0x07, 0x10, 0x00, 0x00, 0xFF]);
    }

    #[test]
    fn test_disconnect_is_bare_frame() {
        let bytes = DisconnectRequest::new().serialize().unwrap();
        assert_eq!(&bytes[..], &[0x81, 0x00, 0x03]);
    }

    #[test]
    fn test_put_final_bit() {
        let mut put = PutRequest::new();
        assert_eq!(put.opcode(), 0x02);
        put.set_final(true);
        assert_eq!(put.opcode(), 0x82);
    }

    #[test]
    fn test_put_body_and_end_of_body_are_exclusive() {
        let mut put = PutRequest::new();
        put.set_body(&b"abc"[..]);
        put.set_end_of_body(&b"def"[..]);
        assert!(!put.headers().contains(HeaderIdentifier::Body));
        assert!(put.headers().contains(HeaderIdentifier::EndOfBody));

        put.set_body(&b"ghi"[..]);
        assert!(put.headers().contains(HeaderIdentifier::Body));
        assert!(!put.headers().contains(HeaderIdentifier::EndOfBody));
    }

    #[test]
    fn test_put_serialization_layout() {
        let mut put = PutRequest::new();
        put.set_name("a").set_length(2).set_end_of_body(&b"hi"[..]).set_final(true);

        let bytes = put.serialize().unwrap();
        assert_eq!(
            &bytes[..],
            &[
                0x82, 0x00, 0x14, // PutFinal, length 20
                0x01, 0x00, 0x07, 0x00, b'a', 0x00, 0x00, // Name "a"
                0xC3, 0x00, 0x00, 0x00, 0x02, // Length 2
                0x49, 0x00, 0x05, b'h', b'i', // EndOfBody
            ][..]
        );
    }

    #[test]
    fn test_length_is_backpatched_from_headers() {
        let mut put = PutRequest::new();
        put.set_body(vec![7u8; 1000]);
        let bytes = put.serialize().unwrap();
        assert_eq!(u16::from_be_bytes([bytes[1], bytes[2]]) as usize, bytes.len());
        assert_eq!(bytes.len(), 3 + 3 + 1000);
    }

    #[test]
    fn test_oversized_request_is_rejected() {
        let mut put = PutRequest::new();
        put.set_name("big").set_body(vec![0u8; 65_530]);
        assert!(matches!(put.serialize(), Err(ObexError::OutOfRange(_))));
    }

    #[test]
    fn test_get_and_abort_opcodes() {
        let mut get = GetRequest::new();
        get.set_name("x").set_type(&b"x-obex/folder-listing\0"[..]);
        assert_eq!(get.opcode(), 0x03);
        get.set_final(true);
        assert_eq!(get.serialize().unwrap()[0], 0x83);

        let abort = AbortRequest::new().serialize().unwrap();
        assert_eq!(&abort[..], &[0xFF, 0x00, 0x03]);
    }

    #[test]
    fn test_connection_id_header() {
        let mut disconnect = DisconnectRequest::new();
        disconnect.set_connection_id(7);
        let bytes = disconnect.serialize().unwrap();
        assert_eq!(&bytes[..], &[0x81, 0x00, 0x08, 0xCF, 0, 0, 0, 7]);
    }
}
