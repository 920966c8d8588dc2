//! Wire format constants and the 3-byte frame header.
//!
//! Every OBEX frame starts with:
//! ```text
//! ┌──────────┬──────────────┬──────────────────────┐
//! │ Opcode   │ Length       │ Payload              │
//! │ 1 byte   │ uint16 BE    │ Length - 3 bytes     │
//! └──────────┴──────────────┴──────────────────────┘
//! ```
//!
//! `Length` counts the whole frame, the 3 header bytes included.
//! The top bit of the opcode is the "final" flag.

use crate::error::{ObexError, Result};

/// Frame header size in bytes (opcode + length).
pub const FRAME_HEADER_SIZE: usize = 3;

/// Largest frame the 16-bit length field can describe.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// OBEX protocol version carried in Connect packets (1.0).
pub const OBEX_VERSION: u8 = 0x10;

/// Default maximum packet size announced in a Connect request.
pub const DEFAULT_MAX_PACKET_SIZE: u16 = 255;

/// Final bit of an opcode.
pub const FINAL_BIT: u8 = 0x80;

/// Request opcodes.
pub mod opcode {
    /// Connect (always final).
    pub const CONNECT: u8 = 0x80;
    /// Disconnect (always final).
    pub const DISCONNECT: u8 = 0x81;
    /// Put, more packets follow.
    pub const PUT: u8 = 0x02;
    /// Put, last packet of the object.
    pub const PUT_FINAL: u8 = 0x82;
    /// Get, more request packets follow.
    pub const GET: u8 = 0x03;
    /// Get, last request packet.
    pub const GET_FINAL: u8 = 0x83;
    /// Session.
    pub const SESSION: u8 = 0x87;
    /// Abort the current multi-packet operation.
    pub const ABORT: u8 = 0xFF;
}

/// Response codes (low 7 bits of a response opcode).
pub mod response_code {
    pub const CONTINUE: u8 = 0x10;
    pub const SUCCESS: u8 = 0x20;
    pub const CREATED: u8 = 0x21;
    pub const ACCEPTED: u8 = 0x22;
    pub const NO_CONTENT: u8 = 0x24;
    pub const MULTIPLE_CHOICE: u8 = 0x30;
    pub const BAD_REQUEST: u8 = 0x40;
    pub const UNAUTHORIZED: u8 = 0x41;
    pub const FORBIDDEN: u8 = 0x43;
    pub const NOT_FOUND: u8 = 0x44;
    pub const METHOD_NOT_ALLOWED: u8 = 0x45;
    pub const NOT_ACCEPTABLE: u8 = 0x46;
    pub const REQUEST_TIMEOUT: u8 = 0x48;
    pub const CONFLICT: u8 = 0x49;
    pub const LENGTH_REQUIRED: u8 = 0x4B;
    pub const ENTITY_TOO_LARGE: u8 = 0x4D;
    pub const UNSUPPORTED_MEDIA_TYPE: u8 = 0x4F;
    pub const INTERNAL_SERVER_ERROR: u8 = 0x50;
    pub const NOT_IMPLEMENTED: u8 = 0x51;
    pub const SERVICE_UNAVAILABLE: u8 = 0x53;
    pub const DATABASE_FULL: u8 = 0x60;

    /// Human readable name of a response code, if it is a known one.
    pub fn name(code: u8) -> Option<&'static str> {
        let name = match code {
            CONTINUE => "Continue",
            SUCCESS => "Success",
            CREATED => "Created",
            ACCEPTED => "Accepted",
            NO_CONTENT => "No Content",
            MULTIPLE_CHOICE => "Multiple Choice",
            BAD_REQUEST => "Bad Request",
            UNAUTHORIZED => "Unauthorized",
            FORBIDDEN => "Forbidden",
            NOT_FOUND => "Not Found",
            METHOD_NOT_ALLOWED => "Method Not Allowed",
            NOT_ACCEPTABLE => "Not Acceptable",
            REQUEST_TIMEOUT => "Request Timeout",
            CONFLICT => "Conflict",
            LENGTH_REQUIRED => "Length Required",
            ENTITY_TOO_LARGE => "Request Entity Too Large",
            UNSUPPORTED_MEDIA_TYPE => "Unsupported Media Type",
            INTERNAL_SERVER_ERROR => "Internal Server Error",
            NOT_IMPLEMENTED => "Not Implemented",
            SERVICE_UNAVAILABLE => "Service Unavailable",
            DATABASE_FULL => "Database Full",
            _ => return None,
        };
        Some(name)
    }

    /// Check if the code lets a multi-packet operation go on (Continue or Success).
    #[inline]
    pub fn is_progress(code: u8) -> bool {
        code == CONTINUE || code == SUCCESS
    }
}

/// Decoded 3-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw opcode byte, final bit included.
    pub opcode: u8,
    /// Total frame length in bytes, header included.
    pub length: u16,
}

impl FrameHeader {
    /// Create a new frame header.
    pub fn new(opcode: u8, length: u16) -> Self {
        Self { opcode, length }
    }

    /// Encode to bytes (Big Endian length).
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let len = self.length.to_be_bytes();
        [self.opcode, len[0], len[1]]
    }

    /// Decode from the start of `buf`.
    ///
    /// Returns `None` if fewer than 3 bytes are available.
    ///
    /// ```
    /// use obex_engine::protocol::FrameHeader;
    ///
    /// let header = FrameHeader::decode(&[0xA0, 0x00, 0x03]).unwrap();
    /// assert!(header.is_final());
    /// assert_eq!(header.code(), 0x20);
    /// assert_eq!(header.length, 3);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return None;
        }
        Some(Self {
            opcode: buf[0],
            length: u16::from_be_bytes([buf[1], buf[2]]),
        })
    }

    /// Reject a declared length that cannot even hold the header.
    pub fn validate(&self) -> Result<()> {
        if (self.length as usize) < FRAME_HEADER_SIZE {
            return Err(ObexError::ProtocolViolation(format!(
                "frame length {} is shorter than the {}-byte header",
                self.length, FRAME_HEADER_SIZE
            )));
        }
        Ok(())
    }

    /// Check the final bit.
    #[inline]
    pub fn is_final(&self) -> bool {
        self.opcode & FINAL_BIT != 0
    }

    /// Opcode without the final bit (the response code for responses).
    #[inline]
    pub fn code(&self) -> u8 {
        self.opcode & !FINAL_BIT
    }
}
