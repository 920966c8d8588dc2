//! OBEX headers: identifiers, typed values and the ordered header list.
//!
//! A header is an identifier byte followed by a kind-specific payload. The
//! upper 2 bits of the identifier select the value kind:
//!
//! ```text
//! 0x00  Unicode       id | len u16 BE | UTF-16BE text + 0x0000 (omitted when empty)
//! 0x40  ByteSequence  id | len u16 BE | raw bytes
//! 0x80  Int8          id | 1 byte
//! 0xC0  Int32         id | 4 bytes BE
//! ```
//!
//! `len` counts the identifier byte, the two length bytes and the payload.
//!
//! # Example
//!
//! ```
//! use obex_engine::protocol::{HeaderIdentifier, HeaderList};
//!
//! let mut headers = HeaderList::new();
//! headers.set_u32(HeaderIdentifier::Count, 1).unwrap();
//! headers.set_str(HeaderIdentifier::Name, "toto").unwrap();
//!
//! let bytes = headers.to_bytes().unwrap();
//! let parsed = HeaderList::parse(&bytes).unwrap();
//! assert_eq!(parsed, headers);
//! ```

use bytes::Bytes;

use super::buffer::GrowableByteBuffer;
use crate::error::{ObexError, Result};

/// Identifier byte + 2 length bytes of a Unicode/ByteSequence header.
pub const VARIABLE_HEADER_PREFIX: usize = 3;

/// Mask selecting the value kind bits of an identifier.
const KIND_MASK: u8 = 0xC0;

/// Value encoding selected by the upper 2 bits of a header identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueKind {
    /// Null terminated UTF-16BE text.
    Unicode = 0x00,
    /// Length-prefixed opaque bytes.
    ByteSequence = 0x40,
    /// Single byte quantity.
    Int8 = 0x80,
    /// Four byte big-endian quantity.
    Int32 = 0xC0,
}

impl ValueKind {
    /// Kind encoded in the upper 2 bits of `id`.
    #[inline]
    pub fn of(id: u8) -> Self {
        match id & KIND_MASK {
            0x00 => Self::Unicode,
            0x40 => Self::ByteSequence,
            0x80 => Self::Int8,
            _ => Self::Int32,
        }
    }
}

/// Header identifier.
///
/// Identifiers this crate works with have named variants; any other byte is
/// carried as `Other` so unknown headers survive a parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderIdentifier {
    /// Number of objects (Int32).
    Count,
    /// Object name, typically a file name (Unicode).
    Name,
    /// Object MIME type (ByteSequence).
    Type,
    /// Object length in bytes (Int32).
    Length,
    /// Text description of the object (Unicode).
    Description,
    /// Service the operation targets (ByteSequence).
    Target,
    /// A chunk of the object body (ByteSequence).
    Body,
    /// The final chunk of the object body (ByteSequence).
    EndOfBody,
    /// Identifies the responding service (ByteSequence).
    Who,
    /// Connection identifier used for multiplexing (Int32).
    ConnectionId,
    /// Application specific parameters (ByteSequence).
    ApplicationParameters,
    /// Any identifier without a named variant.
    Other(u8),
}

impl HeaderIdentifier {
    /// Raw identifier byte.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Count => 0xC0,
            Self::Name => 0x01,
            Self::Type => 0x42,
            Self::Length => 0xC3,
            Self::Description => 0x05,
            Self::Target => 0x46,
            Self::Body => 0x48,
            Self::EndOfBody => 0x49,
            Self::Who => 0x4A,
            Self::ConnectionId => 0xCF,
            Self::ApplicationParameters => 0x4C,
            Self::Other(id) => id,
        }
    }

    /// Value kind this identifier carries.
    #[inline]
    pub fn kind(self) -> ValueKind {
        ValueKind::of(self.as_u8())
    }
}

impl From<u8> for HeaderIdentifier {
    fn from(id: u8) -> Self {
        match id {
            0xC0 => Self::Count,
            0x01 => Self::Name,
            0x42 => Self::Type,
            0xC3 => Self::Length,
            0x05 => Self::Description,
            0x46 => Self::Target,
            0x48 => Self::Body,
            0x49 => Self::EndOfBody,
            0x4A => Self::Who,
            0xCF => Self::ConnectionId,
            0x4C => Self::ApplicationParameters,
            other => Self::Other(other),
        }
    }
}

impl From<HeaderIdentifier> for u8 {
    fn from(id: HeaderIdentifier) -> u8 {
        id.as_u8()
    }
}

/// A header value; the variant always matches the kind of its identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    Unicode(String),
    ByteSequence(Bytes),
    Int8(u8),
    Int32(u32),
}

impl HeaderValue {
    /// Zero value of a kind (empty text, no bytes, 0).
    pub fn empty(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Unicode => Self::Unicode(String::new()),
            ValueKind::ByteSequence => Self::ByteSequence(Bytes::new()),
            ValueKind::Int8 => Self::Int8(0),
            ValueKind::Int32 => Self::Int32(0),
        }
    }

    /// Kind of the held value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Unicode(_) => ValueKind::Unicode,
            Self::ByteSequence(_) => ValueKind::ByteSequence,
            Self::Int8(_) => ValueKind::Int8,
            Self::Int32(_) => ValueKind::Int32,
        }
    }

    pub fn as_u8(&self) -> Result<u8> {
        match self {
            Self::Int8(v) => Ok(*v),
            other => Err(other.mismatch(ValueKind::Int8)),
        }
    }

    pub fn as_u32(&self) -> Result<u32> {
        match self {
            Self::Int32(v) => Ok(*v),
            other => Err(other.mismatch(ValueKind::Int32)),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Self::Unicode(s) => Ok(s),
            other => Err(other.mismatch(ValueKind::Unicode)),
        }
    }

    pub fn as_bytes(&self) -> Result<&Bytes> {
        match self {
            Self::ByteSequence(b) => Ok(b),
            other => Err(other.mismatch(ValueKind::ByteSequence)),
        }
    }

    /// Replace an Int8 value.
    pub fn set_u8(&mut self, value: u8) -> Result<()> {
        self.replace(Self::Int8(value))
    }

    /// Replace an Int32 value.
    pub fn set_u32(&mut self, value: u32) -> Result<()> {
        self.replace(Self::Int32(value))
    }

    /// Replace a Unicode value.
    pub fn set_str(&mut self, value: impl Into<String>) -> Result<()> {
        self.replace(Self::Unicode(value.into()))
    }

    /// Replace a ByteSequence value.
    pub fn set_bytes(&mut self, value: impl Into<Bytes>) -> Result<()> {
        self.replace(Self::ByteSequence(value.into()))
    }

    /// Number of bytes this value occupies after the identifier byte.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Int8(_) => 1,
            Self::Int32(_) => 4,
            Self::ByteSequence(b) => VARIABLE_HEADER_PREFIX - 1 + b.len(),
            Self::Unicode(s) if s.is_empty() => VARIABLE_HEADER_PREFIX - 1,
            Self::Unicode(s) => VARIABLE_HEADER_PREFIX - 1 + 2 * (s.encode_utf16().count() + 1),
        }
    }

    /// Append the kind-specific payload (not the identifier) to `buf`.
    pub fn serialize(&self, buf: &mut GrowableByteBuffer) -> Result<()> {
        match self {
            Self::Int8(v) => buf.push_u8(*v),
            Self::Int32(v) => {
                buf.push_u16((v >> 16) as u16);
                buf.push_u16(*v as u16);
            }
            Self::ByteSequence(b) => {
                buf.push_u16(self.header_length()?);
                buf.push_bytes(b);
            }
            Self::Unicode(s) => {
                buf.push_u16(self.header_length()?);
                if !s.is_empty() {
                    for unit in s.encode_utf16() {
                        buf.push_u16(unit);
                    }
                    buf.push_u16(0);
                }
            }
        }
        Ok(())
    }

    /// Value of the 16-bit length field for variable-size kinds.
    fn header_length(&self) -> Result<u16> {
        let total = 1 + self.encoded_len();
        u16::try_from(total).map_err(|_| {
            ObexError::OutOfRange(format!(
                "{:?} header of {} bytes exceeds the 16-bit length field",
                self.kind(),
                total
            ))
        })
    }

    fn replace(&mut self, value: HeaderValue) -> Result<()> {
        if value.kind() != self.kind() {
            return Err(self.mismatch(value.kind()));
        }
        *self = value;
        Ok(())
    }

    fn mismatch(&self, expected: ValueKind) -> ObexError {
        ObexError::TypeMismatch {
            expected,
            actual: self.kind(),
        }
    }
}

/// One identifier paired with its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    pub identifier: HeaderIdentifier,
    pub value: HeaderValue,
}

impl HeaderEntry {
    /// Entry holding the zero value for the identifier's kind.
    pub fn new(identifier: HeaderIdentifier) -> Self {
        Self {
            identifier,
            value: HeaderValue::empty(identifier.kind()),
        }
    }

    /// Append identifier and payload to `buf`.
    pub fn serialize(&self, buf: &mut GrowableByteBuffer) -> Result<()> {
        buf.push_u8(self.identifier.as_u8());
        self.value.serialize(buf)
    }

    /// Encoded size including the identifier byte.
    pub fn encoded_len(&self) -> usize {
        1 + self.value.encoded_len()
    }
}

/// Ordered headers with unique identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    entries: Vec<HeaderEntry>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the entry for `id`, appending a zero-valued one if it is missing.
    pub fn add(&mut self, id: HeaderIdentifier) -> &mut HeaderEntry {
        let index = match self.position(id) {
            Some(index) => index,
            None => {
                self.entries.push(HeaderEntry::new(id));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index]
    }

    pub fn get(&self, id: HeaderIdentifier) -> Option<&HeaderEntry> {
        self.entries
            .iter()
            .find(|entry| entry.identifier.as_u8() == id.as_u8())
    }

    /// Value for `id`, if present.
    pub fn value(&self, id: HeaderIdentifier) -> Option<&HeaderValue> {
        self.get(id).map(|entry| &entry.value)
    }

    pub fn contains(&self, id: HeaderIdentifier) -> bool {
        self.position(id).is_some()
    }

    /// Remove the entry for `id`, returning its value.
    pub fn remove(&mut self, id: HeaderIdentifier) -> Option<HeaderValue> {
        self.position(id)
            .map(|index| self.entries.remove(index).value)
    }

    pub fn set_u8(&mut self, id: HeaderIdentifier, value: u8) -> Result<()> {
        self.set_value(id, HeaderValue::Int8(value))
    }

    pub fn set_u32(&mut self, id: HeaderIdentifier, value: u32) -> Result<()> {
        self.set_value(id, HeaderValue::Int32(value))
    }

    pub fn set_str(&mut self, id: HeaderIdentifier, value: impl Into<String>) -> Result<()> {
        self.set_value(id, HeaderValue::Unicode(value.into()))
    }

    pub fn set_bytes(&mut self, id: HeaderIdentifier, value: impl Into<Bytes>) -> Result<()> {
        self.set_value(id, HeaderValue::ByteSequence(value.into()))
    }

    /// Store `value` under `id`. A kind mismatch leaves the list untouched.
    fn set_value(&mut self, id: HeaderIdentifier, value: HeaderValue) -> Result<()> {
        if value.kind() != id.kind() {
            return Err(ObexError::TypeMismatch {
                expected: value.kind(),
                actual: id.kind(),
            });
        }
        self.add(id).value.replace(value)
    }

    /// Int32 value for `id`; `Ok(None)` when absent.
    pub fn get_u32(&self, id: HeaderIdentifier) -> Result<Option<u32>> {
        self.value(id).map(HeaderValue::as_u32).transpose()
    }

    /// Unicode value for `id`; `Ok(None)` when absent.
    pub fn get_str(&self, id: HeaderIdentifier) -> Result<Option<&str>> {
        self.value(id).map(HeaderValue::as_str).transpose()
    }

    /// ByteSequence value for `id`; `Ok(None)` when absent.
    pub fn get_bytes(&self, id: HeaderIdentifier) -> Result<Option<&Bytes>> {
        self.value(id).map(HeaderValue::as_bytes).transpose()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total encoded size of all entries.
    pub fn encoded_len(&self) -> usize {
        self.entries.iter().map(HeaderEntry::encoded_len).sum()
    }

    /// Append every entry, in insertion order, to `buf`.
    pub fn serialize(&self, buf: &mut GrowableByteBuffer) -> Result<()> {
        for entry in &self.entries {
            entry.serialize(buf)?;
        }
        Ok(())
    }

    /// Encode the list on its own.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = GrowableByteBuffer::with_capacity(self.encoded_len());
        self.serialize(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Parse a complete header block. See [`parse_headers`].
    pub fn parse(data: &[u8]) -> Result<Self> {
        parse_headers(data)
    }

    fn position(&self, id: HeaderIdentifier) -> Option<usize> {
        let raw = id.as_u8();
        self.entries
            .iter()
            .position(|entry| entry.identifier.as_u8() == raw)
    }
}

impl<'a> IntoIterator for &'a HeaderList {
    type Item = &'a HeaderEntry;
    type IntoIter = std::slice::Iter<'a, HeaderEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Parse `(identifier, payload)` pairs until `data` is exhausted.
///
/// A repeated identifier overwrites the earlier value in place.
pub fn parse_headers(data: &[u8]) -> Result<HeaderList> {
    let mut list = HeaderList::new();
    let mut offset = 0;

    while offset < data.len() {
        let id = HeaderIdentifier::from(data[offset]);
        let (value, consumed) = parse_value(id, &data[offset..])?;
        list.add(id).value = value;
        offset += consumed;
    }

    Ok(list)
}

/// Decode one header starting at `data[0]`; returns the value and bytes consumed.
fn parse_value(id: HeaderIdentifier, data: &[u8]) -> Result<(HeaderValue, usize)> {
    match id.kind() {
        ValueKind::Int8 => {
            let byte = *data
                .get(1)
                .ok_or_else(|| truncated(id, 2, data.len()))?;
            Ok((HeaderValue::Int8(byte), 2))
        }
        ValueKind::Int32 => {
            if data.len() < 5 {
                return Err(truncated(id, 5, data.len()));
            }
            let value = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
            Ok((HeaderValue::Int32(value), 5))
        }
        ValueKind::ByteSequence => {
            let length = variable_length(id, data)?;
            let payload = Bytes::copy_from_slice(&data[VARIABLE_HEADER_PREFIX..length]);
            Ok((HeaderValue::ByteSequence(payload), length))
        }
        ValueKind::Unicode => {
            let length = variable_length(id, data)?;
            let payload = &data[VARIABLE_HEADER_PREFIX..length];
            Ok((HeaderValue::Unicode(decode_unicode(id, payload)?), length))
        }
    }
}

/// Read and check the 16-bit length of a Unicode/ByteSequence header.
fn variable_length(id: HeaderIdentifier, data: &[u8]) -> Result<usize> {
    if data.len() < VARIABLE_HEADER_PREFIX {
        return Err(truncated(id, VARIABLE_HEADER_PREFIX, data.len()));
    }
    let length = u16::from_be_bytes([data[1], data[2]]) as usize;
    if length < VARIABLE_HEADER_PREFIX {
        return Err(ObexError::MalformedHeader(format!(
            "header {:#04x} declares length {} (minimum is {})",
            id.as_u8(),
            length,
            VARIABLE_HEADER_PREFIX
        )));
    }
    if length > data.len() {
        return Err(truncated(id, length, data.len()));
    }
    Ok(length)
}

/// Decode UTF-16BE text whose last code unit must be the 0 terminator.
fn decode_unicode(id: HeaderIdentifier, payload: &[u8]) -> Result<String> {
    if payload.is_empty() {
        return Ok(String::new());
    }
    if payload.len() % 2 != 0 {
        return Err(ObexError::MalformedHeader(format!(
            "unicode header {:#04x} has an odd payload of {} bytes",
            id.as_u8(),
            payload.len()
        )));
    }

    let units: Vec<u16> = payload
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    let (last, text) = match units.split_last() {
        Some(split) => split,
        None => return Ok(String::new()),
    };
    if *last != 0 {
        return Err(ObexError::MalformedHeader(format!(
            "unicode header {:#04x} is missing its null terminator",
            id.as_u8()
        )));
    }

    String::from_utf16(text).map_err(|e| {
        ObexError::MalformedHeader(format!("unicode header {:#04x}: {}", id.as_u8(), e))
    })
}

fn truncated(id: HeaderIdentifier, needed: usize, available: usize) -> ObexError {
    ObexError::MalformedHeader(format!(
        "header {:#04x} needs {} bytes, only {} available",
        id.as_u8(),
        needed,
        available
    ))
}
