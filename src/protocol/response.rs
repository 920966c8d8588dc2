//! Response frames with typed accessors.
//!
//! A response is `opcode | length | payload`, where the opcode's top bit is
//! the final flag and the low 7 bits are the response code. The payload is a
//! header list, except for Connect responses which prefix it with 4 fixed
//! bytes (version, flags, max packet size).
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use obex_engine::protocol::{HeaderIdentifier, ResponsePacket};
//!
//! let raw = Bytes::from_static(&[0xA0, 0x00, 0x08, 0xCF, 0x00, 0x00, 0x00, 0x01]);
//! let response = ResponsePacket::decode(raw).unwrap();
//!
//! assert!(response.is_final());
//! assert!(response.is_success());
//! let headers = response.headers().unwrap();
//! assert_eq!(headers.get_u32(HeaderIdentifier::ConnectionId).unwrap(), Some(1));
//! ```

use std::sync::OnceLock;

use bytes::Bytes;

use super::buffer::GrowableByteBuffer;
use super::header::{parse_headers, HeaderList};
use super::wire_format::{response_code, FrameHeader, FINAL_BIT, FRAME_HEADER_SIZE, MAX_FRAME_SIZE};
use crate::error::{ObexError, Result};

/// Fixed fields at the start of a Connect response payload.
pub const CONNECT_FIELDS_SIZE: usize = 4;

/// Header block parsed on first access and cached afterwards.
#[derive(Debug, Clone)]
struct LazyHeaders {
    raw: Bytes,
    parsed: OnceLock<HeaderList>,
}

impl LazyHeaders {
    fn new(raw: Bytes) -> Self {
        Self {
            raw,
            parsed: OnceLock::new(),
        }
    }

    fn get(&self) -> Result<&HeaderList> {
        if let Some(headers) = self.parsed.get() {
            return Ok(headers);
        }
        let headers = parse_headers(&self.raw)?;
        Ok(self.parsed.get_or_init(|| headers))
    }
}

/// One decoded response frame.
#[derive(Debug, Clone)]
pub struct ResponsePacket {
    /// Opcode and declared length.
    pub header: FrameHeader,
    /// Everything after the 3-byte frame header.
    pub payload: Bytes,
    headers: LazyHeaders,
}

impl ResponsePacket {
    /// Decode a slice known to hold exactly one frame.
    ///
    /// The declared length must match the slice length.
    pub fn decode(frame: Bytes) -> Result<Self> {
        let header = FrameHeader::decode(&frame).ok_or_else(|| {
            ObexError::ProtocolViolation(format!(
                "response of {} bytes is shorter than the frame header",
                frame.len()
            ))
        })?;
        header.validate()?;
        if header.length as usize != frame.len() {
            return Err(ObexError::ProtocolViolation(format!(
                "response declares {} bytes but {} were supplied",
                header.length,
                frame.len()
            )));
        }

        let payload = frame.slice(FRAME_HEADER_SIZE..);
        Ok(Self {
            header,
            headers: LazyHeaders::new(payload.clone()),
            payload,
        })
    }

    /// Raw opcode byte.
    #[inline]
    pub fn opcode(&self) -> u8 {
        self.header.opcode
    }

    /// Response code (opcode without the final bit).
    #[inline]
    pub fn code(&self) -> u8 {
        self.header.code()
    }

    #[inline]
    pub fn is_final(&self) -> bool {
        self.header.is_final()
    }

    /// Total frame length.
    #[inline]
    pub fn len(&self) -> usize {
        self.header.length as usize
    }

    /// Check if the frame carries no payload.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.code() == response_code::SUCCESS
    }

    #[inline]
    pub fn is_continue(&self) -> bool {
        self.code() == response_code::CONTINUE
    }

    /// Payload parsed as a header list.
    ///
    /// Not meaningful for Connect responses; use [`ConnectResponse`] there.
    pub fn headers(&self) -> Result<&HeaderList> {
        self.headers.get()
    }

    /// Display name of the response code, if known.
    pub fn code_name(&self) -> Option<&'static str> {
        response_code::name(self.code())
    }
}

/// Response to a Connect request.
#[derive(Debug, Clone)]
pub struct ConnectResponse {
    packet: ResponsePacket,
    headers: LazyHeaders,
}

impl ConnectResponse {
    /// Interpret a decoded frame as a Connect response.
    pub fn from_packet(packet: ResponsePacket) -> Result<Self> {
        if packet.payload.len() < CONNECT_FIELDS_SIZE {
            return Err(ObexError::ProtocolViolation(format!(
                "connect response payload of {} bytes lacks the {} fixed bytes",
                packet.payload.len(),
                CONNECT_FIELDS_SIZE
            )));
        }
        let headers = LazyHeaders::new(packet.payload.slice(CONNECT_FIELDS_SIZE..));
        Ok(Self { packet, headers })
    }

    /// Decode a single Connect response frame.
    pub fn decode(frame: Bytes) -> Result<Self> {
        Self::from_packet(ResponsePacket::decode(frame)?)
    }

    pub fn packet(&self) -> &ResponsePacket {
        &self.packet
    }

    pub fn code(&self) -> u8 {
        self.packet.code()
    }

    pub fn is_final(&self) -> bool {
        self.packet.is_final()
    }

    pub fn is_success(&self) -> bool {
        self.packet.is_success()
    }

    /// OBEX version announced by the peer.
    pub fn version(&self) -> u8 {
        self.packet.payload[0]
    }

    pub fn flags(&self) -> u8 {
        self.packet.payload[1]
    }

    /// Largest packet the peer accepts.
    pub fn max_packet_size(&self) -> u16 {
        u16::from_be_bytes([self.packet.payload[2], self.packet.payload[3]])
    }

    /// Headers following the fixed fields, parsed on first access.
    pub fn headers(&self) -> Result<&HeaderList> {
        self.headers.get()
    }
}

/// Encode a response frame: `code | FINAL_BIT`, length, fixed fields, headers.
///
/// Used by peers that answer requests (test servers, demos).
pub fn encode_response(code: u8, fields: &[u8], headers: &HeaderList) -> Result<Bytes> {
    let mut buf =
        GrowableByteBuffer::with_capacity(FRAME_HEADER_SIZE + fields.len() + headers.encoded_len());
    buf.push_u8(code | FINAL_BIT);
    buf.push_u16(0);
    buf.push_bytes(fields);
    headers.serialize(&mut buf)?;

    let total = buf.len();
    if total > MAX_FRAME_SIZE {
        return Err(ObexError::OutOfRange(format!(
            "response of {} bytes exceeds the maximum frame size {}",
            total, MAX_FRAME_SIZE
        )));
    }
    buf.set_u16(1, total as u16)?;
    Ok(buf.freeze())
}
