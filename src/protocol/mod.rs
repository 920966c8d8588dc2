//! Protocol module - packet encoding and decoding.
//!
//! This module implements the OBEX wire format:
//! - growable buffer used to serialize packets
//! - typed headers and header lists
//! - request builders and response decoding
//! - response reassembly from split transport chunks

mod buffer;
mod header;
mod reassembler;
mod request;
mod response;
mod wire_format;

pub use buffer::{GrowableByteBuffer, MIN_CAPACITY};
pub use header::{
    parse_headers, HeaderEntry, HeaderIdentifier, HeaderList, HeaderValue, ValueKind,
    VARIABLE_HEADER_PREFIX,
};
pub use reassembler::{ResponseReassembler, DEFAULT_READ_BUFFER_SIZE};
pub use request::{
    AbortRequest, ConnectRequest, DisconnectRequest, GetRequest, PutRequest, Request,
};
pub use response::{encode_response, ConnectResponse, ResponsePacket, CONNECT_FIELDS_SIZE};
pub use wire_format::{
    opcode, response_code, FrameHeader, DEFAULT_MAX_PACKET_SIZE, FINAL_BIT, FRAME_HEADER_SIZE,
    MAX_FRAME_SIZE, OBEX_VERSION,
};
