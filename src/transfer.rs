//! Chunked PUT of one object.
//!
//! An object is split into fixed-size chunks, one PUT packet each. The first
//! packet carries the total Length (plus optional Type and Description), the
//! last one is marked final and carries its slice as EndOfBody instead of
//! Body. The next chunk is only sent once the previous one was acknowledged
//! with Continue or Success.
//!
//! Two ways to drive it:
//! - [`ChunkedPutTransfer::next_chunk`] / [`ChunkedPutTransfer::complete`] for
//!   callers that await responses themselves (the async client)
//! - [`ChunkedPutTransfer::send_next`] for callback-driven use on a
//!   [`RequestExchange`]

use bytes::Bytes;
use serde::Serialize;

use crate::error::{ObexError, Result};
use crate::exchange::{ErrorHandler, RequestExchange, Transport};
use crate::protocol::{
    response_code, PutRequest, Request, ResponsePacket, FRAME_HEADER_SIZE, MAX_FRAME_SIZE,
    VARIABLE_HEADER_PREFIX,
};

/// Default bytes of object data per PUT packet.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Bytes a first PUT packet spends outside the body with a one-character
/// name: frame header, ConnectionId, Name, Length and the Body prefix.
pub const PUT_FRAMING_OVERHEAD: usize = FRAME_HEADER_SIZE + 5 + 7 + 5 + VARIABLE_HEADER_PREFIX;

/// Snapshot of a transfer's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransferProgress {
    /// Bytes acknowledged by the peer.
    pub sent: usize,
    /// Object size.
    pub total: usize,
    /// The final chunk was acknowledged.
    pub is_final: bool,
}

/// One PUT packet ready to send.
#[derive(Debug, Clone)]
pub struct PutChunk {
    pub request: PutRequest,
    /// Object bytes carried by this packet.
    pub len: usize,
    pub is_final: bool,
}

/// State machine sending one object as a sequence of PUT packets.
pub struct ChunkedPutTransfer {
    name: String,
    data: Bytes,
    chunk_size: usize,
    offset: usize,
    finished: bool,
    halted: bool,
    mime_type: Option<Bytes>,
    description: Option<String>,
    connection_id: Option<u32>,
    error_handler: Option<ErrorHandler>,
}

impl ChunkedPutTransfer {
    /// Transfer of `data` under `name` with the default chunk size.
    ///
    /// Fails if the object is too large for the 32-bit Length header.
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if u32::try_from(data.len()).is_err() {
            return Err(ObexError::OutOfRange(format!(
                "object of {} bytes does not fit the Length header",
                data.len()
            )));
        }
        Ok(Self {
            name: name.into(),
            data,
            chunk_size: DEFAULT_CHUNK_SIZE,
            offset: 0,
            finished: false,
            halted: false,
            mime_type: None,
            description: None,
            connection_id: None,
            error_handler: None,
        })
    }

    /// Set the chunk size. Zero is rejected.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ObexError::OutOfRange("chunk size must be positive".into()));
        }
        self.chunk_size = chunk_size;
        Ok(self)
    }

    /// MIME type sent with the first chunk.
    pub fn with_type(mut self, mime: impl Into<Bytes>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    /// Description sent with the first chunk.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// ConnectionId attached to every chunk.
    pub fn set_connection_id(&mut self, id: u32) {
        self.connection_id = Some(id);
    }

    pub fn connection_id(&self) -> Option<u32> {
        self.connection_id
    }

    /// Register the error handler, replacing any previous one.
    pub fn on_error<F>(&mut self, handler: F)
    where
        F: FnMut(&ObexError) + Send + 'static,
    {
        self.error_handler = Some(Box::new(handler));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn total(&self) -> usize {
        self.data.len()
    }

    /// Bytes acknowledged so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The final chunk was acknowledged.
    pub fn is_complete(&self) -> bool {
        self.finished
    }

    /// A rejected chunk stopped the transfer.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn progress(&self) -> TransferProgress {
        TransferProgress {
            sent: self.offset,
            total: self.total(),
            is_final: self.finished,
        }
    }

    /// Build the packet for the current offset.
    ///
    /// Returns `None` once the transfer is complete or halted. An empty
    /// object still produces one final packet.
    pub fn next_chunk(&self) -> Option<PutChunk> {
        if self.finished || self.halted {
            return None;
        }

        let total = self.total();
        let is_first = self.offset == 0;
        let remaining = total - self.offset;

        let mut request = PutRequest::new();
        if let Some(id) = self.connection_id {
            request.set_connection_id(id);
        }
        request.set_name(self.name.as_str());
        if is_first {
            // Checked against u32 in `new`.
            request.set_length(total as u32);
            if let Some(mime) = &self.mime_type {
                request.set_type(mime.clone());
            }
            if let Some(description) = &self.description {
                request.set_description(description.as_str());
            }
        }

        // The body gets whatever the other headers leave of the frame. At
        // least one byte keeps the transfer moving; an oversized name then
        // fails at serialization.
        let room = MAX_FRAME_SIZE.saturating_sub(
            FRAME_HEADER_SIZE + request.headers().encoded_len() + VARIABLE_HEADER_PREFIX,
        );
        let len = remaining.min(self.chunk_size).min(room.max(1));
        let is_final = len == remaining;
        let slice = self.data.slice(self.offset..self.offset + len);

        request.set_final(is_final);
        if is_final {
            request.set_end_of_body(slice);
        } else {
            request.set_body(slice);
        }

        Some(PutChunk {
            request,
            len,
            is_final,
        })
    }

    /// Apply the peer's response to `chunk`.
    ///
    /// Continue and Success advance the offset and return whether this was
    /// the final chunk. Any other code halts the transfer with
    /// [`ObexError::ResponseError`].
    pub fn complete(&mut self, chunk: &PutChunk, response: &ResponsePacket) -> Result<bool> {
        let code = response.code();
        if !response_code::is_progress(code) {
            self.halted = true;
            tracing::warn!(
                name = %self.name,
                code,
                offset = self.offset,
                "put chunk rejected"
            );
            return Err(ObexError::ResponseError(code));
        }

        self.offset += chunk.len;
        if chunk.is_final {
            self.finished = true;
        }
        tracing::debug!(
            name = %self.name,
            sent = self.offset,
            total = self.total(),
            is_final = chunk.is_final,
            "put chunk acknowledged"
        );
        Ok(chunk.is_final)
    }

    /// Send the next chunk and hand the transfer to `completion` once the
    /// peer acknowledged it.
    ///
    /// `completion` receives the exchange, the transfer and whether the
    /// acknowledged chunk was the final one; the caller sends the following
    /// chunk by calling `send_next` again. A complete transfer invokes
    /// `completion` with `true` right away. A rejected chunk goes to the
    /// transfer's error handler and `completion` is not called.
    pub fn send_next<T, F>(mut self, exchange: &mut RequestExchange<T>, completion: F) -> Result<()>
    where
        T: Transport + 'static,
        F: FnOnce(&mut RequestExchange<T>, ChunkedPutTransfer, bool) + Send + 'static,
    {
        let Some(chunk) = self.next_chunk() else {
            if self.finished {
                completion(exchange, self, true);
            }
            return Ok(());
        };

        let request = chunk.request.clone();
        exchange.send_request(&request, move |exchange, response| {
            match self.complete(&chunk, &response) {
                Ok(is_final) => completion(exchange, self, is_final),
                Err(e) => self.report_error(&e),
            }
        })
    }

    fn report_error(&mut self, error: &ObexError) {
        if let Some(handler) = self.error_handler.as_mut() {
            handler(error);
        }
    }
}

impl std::fmt::Debug for ChunkedPutTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedPutTransfer")
            .field("name", &self.name)
            .field("total", &self.total())
            .field("chunk_size", &self.chunk_size)
            .field("offset", &self.offset)
            .field("finished", &self.finished)
            .field("halted", &self.halted)
            .finish()
    }
}
