//! Reassembly of response frames from arbitrarily split transport chunks.
//!
//! Uses `bytes::BytesMut` for accumulation and a two-state machine:
//! - `WaitingForHeader`: need the 3-byte frame header
//! - `WaitingForBody`: length known, need the rest of the frame
//!
//! # Example
//!
//! ```
//! use obex_engine::protocol::ResponseReassembler;
//!
//! let mut reassembler = ResponseReassembler::new();
//!
//! assert!(reassembler.add_data(&[0xA0, 0x00]).unwrap().is_none());
//! let response = reassembler.add_data(&[0x03]).unwrap().unwrap();
//! assert!(response.is_success());
//! ```

use bytes::BytesMut;

use super::response::ResponsePacket;
use super::wire_format::{FrameHeader, FRAME_HEADER_SIZE};
use crate::error::Result;

/// Default initial capacity of the accumulation buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
enum State {
    WaitingForHeader,
    WaitingForBody { header: FrameHeader },
}

/// Accumulates incoming bytes and cuts them into [`ResponsePacket`]s.
pub struct ResponseReassembler {
    buffer: BytesMut,
    state: State,
}

impl ResponseReassembler {
    /// Create a reassembler with the default 64 KiB buffer.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_READ_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::WaitingForHeader,
        }
    }

    /// Append `chunk` and extract at most one complete frame.
    ///
    /// Bytes beyond the emitted frame stay buffered; calling again with an
    /// empty chunk yields the next buffered frame, if complete.
    pub fn add_data(&mut self, chunk: &[u8]) -> Result<Option<ResponsePacket>> {
        self.buffer.extend_from_slice(chunk);
        self.try_extract_one()
    }

    /// Append `chunk` and extract every complete frame, in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<ResponsePacket>> {
        self.buffer.extend_from_slice(chunk);

        let mut responses = Vec::new();
        while let Some(response) = self.try_extract_one()? {
            responses.push(response);
        }
        Ok(responses)
    }

    fn try_extract_one(&mut self) -> Result<Option<ResponsePacket>> {
        let header = match self.state {
            State::WaitingForHeader => {
                let Some(header) = FrameHeader::decode(&self.buffer) else {
                    return Ok(None);
                };
                if let Err(e) = header.validate() {
                    // The stream is out of step; drop what is buffered.
                    self.clear();
                    return Err(e);
                }
                self.state = State::WaitingForBody { header };
                header
            }
            State::WaitingForBody { header } => header,
        };

        let length = header.length as usize;
        if self.buffer.len() < length {
            return Ok(None);
        }

        let frame = self.buffer.split_to(length).freeze();
        self.state = State::WaitingForHeader;

        let response = ResponsePacket::decode(frame)?;
        tracing::trace!(
            opcode = response.opcode(),
            length,
            buffered = self.buffer.len(),
            "response frame reassembled"
        );
        Ok(Some(response))
    }

    /// Bytes buffered but not yet emitted.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop buffered bytes and reset to the header state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for ResponseReassembler {
    fn default() -> Self {
        Self::new()
    }
}
