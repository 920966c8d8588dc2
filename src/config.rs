//! Client configuration.
//!
//! Every field has a default, so a partial JSON document is enough:
//!
//! ```
//! use obex_engine::ClientConfig;
//!
//! let config = ClientConfig::from_json(r#"{ "chunk_size": 4096 }"#).unwrap();
//! assert_eq!(config.chunk_size, 4096);
//! assert_eq!(config.max_packet_size, 255);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ObexError, Result};
use crate::protocol::{DEFAULT_MAX_PACKET_SIZE, DEFAULT_READ_BUFFER_SIZE, MAX_FRAME_SIZE};
use crate::transfer::{DEFAULT_CHUNK_SIZE, PUT_FRAMING_OVERHEAD};
use crate::writer::DEFAULT_CHANNEL_CAPACITY;

/// Settings for an [`ObexClient`](crate::ObexClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Packet size announced in the Connect request.
    pub max_packet_size: u16,
    /// Object bytes per PUT packet.
    pub chunk_size: usize,
    /// Size of the read buffer and initial reassembly capacity.
    pub read_buffer_size: usize,
    /// Frames the writer queue holds before sends are refused.
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_packet_size < DEFAULT_MAX_PACKET_SIZE {
            return Err(ObexError::OutOfRange(format!(
                "max_packet_size {} is below the protocol minimum {}",
                self.max_packet_size, DEFAULT_MAX_PACKET_SIZE
            )));
        }
        if self.chunk_size == 0 {
            return Err(ObexError::OutOfRange("chunk_size must be positive".into()));
        }
        if self.chunk_size + PUT_FRAMING_OVERHEAD > MAX_FRAME_SIZE {
            return Err(ObexError::OutOfRange(format!(
                "chunk_size {} does not fit in a {}-byte frame",
                self.chunk_size, MAX_FRAME_SIZE
            )));
        }
        if self.read_buffer_size == 0 {
            return Err(ObexError::OutOfRange(
                "read_buffer_size must be positive".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ObexError::OutOfRange(
                "channel_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}
