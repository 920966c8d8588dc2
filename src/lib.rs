//! # obex-engine
//!
//! OBEX (Object Exchange) client packet engine.
//!
//! The crate builds OBEX request packets, reassembles response frames from
//! an arbitrarily chunked byte stream and matches them to requests, and
//! drives multi-packet PUT and GET operations. It runs over any reliable
//! byte stream: an RFCOMM socket, a TCP stream, or an in-memory pipe.
//!
//! ## Layers
//!
//! - **protocol**: wire format, typed headers, request builders, response
//!   decoding and reassembly. Pure and synchronous.
//! - **exchange** / **transfer**: FIFO request/response matching and the
//!   chunked PUT state machine, driven by bytes in and callbacks out.
//! - **client**: tokio driver with a writer task and a read loop.
//!
//! ## Example
//!
//! ```
//! use obex_engine::protocol::{HeaderIdentifier, HeaderList};
//!
//! let mut headers = HeaderList::new();
//! headers.set_u32(HeaderIdentifier::Count, 1).unwrap();
//! headers.set_str(HeaderIdentifier::Name, "toto").unwrap();
//!
//! let bytes = headers.to_bytes().unwrap();
//! let parsed = obex_engine::protocol::parse_headers(&bytes).unwrap();
//! assert_eq!(parsed.get_str(HeaderIdentifier::Name).unwrap(), Some("toto"));
//! ```

pub mod config;
pub mod error;
pub mod exchange;
pub mod protocol;
pub mod transfer;
pub mod writer;

mod client;

pub use client::{ClientBuilder, ObexClient};
pub use config::ClientConfig;
pub use error::{ObexError, Result};
pub use exchange::{RequestExchange, Transport};
pub use transfer::{ChunkedPutTransfer, TransferProgress};
