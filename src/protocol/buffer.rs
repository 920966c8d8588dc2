//! Growable byte buffer used to build and hold packet bytes.
//!
//! The buffer tracks a logical `length` inside a physical `capacity`.
//! Capacity starts at [`MIN_CAPACITY`] and only ever doubles, which gives
//! amortized O(1) appends while packets are serialized field by field.
//!
//! # Example
//!
//! ```
//! use obex_engine::protocol::GrowableByteBuffer;
//!
//! let mut buf = GrowableByteBuffer::new();
//! buf.push_u8(0x80);
//! buf.push_u16(0x0007);
//! assert_eq!(buf.len(), 3);
//! assert_eq!(buf.capacity(), 8);
//! assert_eq!(&buf.to_immutable_bytes()[..], &[0x80, 0x00, 0x07]);
//! ```

use bytes::{Bytes, BytesMut};

use crate::error::{ObexError, Result};

/// Initial physical capacity in bytes.
pub const MIN_CAPACITY: usize = 8;

/// Mutable byte region with a logical length and a doubling capacity.
#[derive(Debug, Clone)]
pub struct GrowableByteBuffer {
    /// Backing storage; `data.len()` is the logical length.
    data: BytesMut,
    /// Logical capacity, always `MIN_CAPACITY * 2^k`.
    capacity: usize,
}

impl GrowableByteBuffer {
    /// Create an empty buffer with the minimum capacity.
    pub fn new() -> Self {
        Self {
            data: BytesMut::with_capacity(MIN_CAPACITY),
            capacity: MIN_CAPACITY,
        }
    }

    /// Create an empty buffer whose capacity is already large enough for `hint` bytes.
    pub fn with_capacity(hint: usize) -> Self {
        let mut buf = Self::new();
        buf.grow_to(hint);
        buf
    }

    /// Logical length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the logical length is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Physical capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Set the logical length to `n`.
    ///
    /// Capacity doubles until it can hold `n` bytes. Bytes exposed by
    /// growing the length are zero.
    pub fn set_length(&mut self, n: usize) {
        self.grow_to(n);
        self.data.resize(n, 0);
    }

    /// Write a single byte at `offset`.
    pub fn set_u8(&mut self, offset: usize, value: u8) -> Result<()> {
        self.check_range(offset, 1)?;
        self.data[offset] = value;
        Ok(())
    }

    /// Write a big-endian `u16` at `offset`.
    pub fn set_u16(&mut self, offset: usize, value: u16) -> Result<()> {
        self.set_bytes(offset, &value.to_be_bytes())
    }

    /// Write a big-endian `u32` at `offset` as two 16-bit halves.
    pub fn set_u32(&mut self, offset: usize, value: u32) -> Result<()> {
        self.set_u16(offset, (value >> 16) as u16)?;
        self.set_u16(offset + 2, value as u16)
    }

    /// Copy `src` into the buffer starting at `offset`.
    ///
    /// The whole destination range must already lie within the logical length.
    pub fn set_bytes(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        self.check_range(offset, src.len())?;
        self.data[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Read the byte at `offset`.
    pub fn get_u8(&self, offset: usize) -> Result<u8> {
        self.check_range(offset, 1)?;
        Ok(self.data[offset])
    }

    /// Append one byte.
    pub fn push_u8(&mut self, value: u8) {
        let offset = self.len();
        self.set_length(offset + 1);
        self.data[offset] = value;
    }

    /// Append a big-endian `u16`.
    pub fn push_u16(&mut self, value: u16) {
        self.push_bytes(&value.to_be_bytes());
    }

    /// Append a big-endian `u32`.
    pub fn push_u32(&mut self, value: u32) {
        self.push_bytes(&value.to_be_bytes());
    }

    /// Append a byte slice.
    pub fn push_bytes(&mut self, src: &[u8]) {
        let offset = self.len();
        self.set_length(offset + src.len());
        self.data[offset..].copy_from_slice(src);
    }

    /// View of the logical bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Independent copy of exactly `len()` bytes.
    pub fn to_immutable_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data)
    }

    /// Consume the buffer, yielding its bytes without copying.
    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }

    fn grow_to(&mut self, n: usize) {
        while self.capacity < n {
            self.capacity *= 2;
        }
        let additional = self.capacity.saturating_sub(self.data.len());
        self.data.reserve(additional);
    }

    fn check_range(&self, offset: usize, count: usize) -> Result<()> {
        let end = offset.checked_add(count);
        match end {
            Some(end) if end <= self.len() && (count > 0 || offset < self.len()) => Ok(()),
            _ => Err(ObexError::OutOfRange(format!(
                "offset {} (+{}) outside buffer length {}",
                offset,
                count,
                self.len()
            ))),
        }
    }
}

impl Default for GrowableByteBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<[u8]> for GrowableByteBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_empty_with_min_capacity() {
        let buf = GrowableByteBuffer::new();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), MIN_CAPACITY);
    }

    #[test]
    fn test_set_length_doubles_capacity() {
        let mut buf = GrowableByteBuffer::new();
        buf.set_length(9);
        assert_eq!(buf.capacity(), 16);
        buf.set_length(100);
        assert_eq!(buf.capacity(), 128);
        assert_eq!(buf.len(), 100);
    }

    #[test]
    fn test_capacity_never_shrinks() {
        let mut buf = GrowableByteBuffer::new();
        buf.set_length(40);
        buf.set_length(2);
        assert_eq!(buf.capacity(), 64);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_grown_bytes_are_zero() {
        let mut buf = GrowableByteBuffer::new();
        buf.set_length(4);
        buf.set_bytes(0, &[0xFF; 4]).unwrap();
        buf.set_length(2);
        buf.set_length(12);
        assert_eq!(&buf.as_slice()[..2], &[0xFF, 0xFF]);
        assert!(buf.as_slice()[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_set_u8_rejects_offset_at_length() {
        let mut buf = GrowableByteBuffer::new();
        buf.set_length(3);
        assert!(buf.set_u8(2, 7).is_ok());
        let err = buf.set_u8(3, 7).unwrap_err();
        assert!(matches!(err, ObexError::OutOfRange(_)));
    }

    #[test]
    fn test_set_bytes_rejects_overflowing_range() {
        let mut buf = GrowableByteBuffer::new();
        buf.set_length(4);
        assert!(buf.set_bytes(2, &[1, 2]).is_ok());
        assert!(matches!(
            buf.set_bytes(3, &[1, 2]),
            Err(ObexError::OutOfRange(_))
        ));
        assert!(matches!(
            buf.set_bytes(usize::MAX, &[1]),
            Err(ObexError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_set_u32_is_big_endian() {
        let mut buf = GrowableByteBuffer::new();
        buf.set_length(5);
        buf.set_u32(1, 0x0102_0304).unwrap();
        assert_eq!(buf.as_slice(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_backpatch_u16() {
        let mut buf = GrowableByteBuffer::new();
        buf.push_u8(0x81);
        buf.push_u16(0);
        buf.push_bytes(b"abc");
        let len = buf.len() as u16;
        buf.set_u16(1, len).unwrap();
        assert_eq!(buf.as_slice(), &[0x81, 0x00, 0x06, b'a', b'b', b'c']);
    }

    #[test]
    fn test_immutable_copy_is_independent() {
        let mut buf = GrowableByteBuffer::new();
        buf.push_bytes(&[1, 2, 3]);
        let frozen = buf.to_immutable_bytes();
        buf.set_u8(0, 9).unwrap();
        assert_eq!(&frozen[..], &[1, 2, 3]);
        assert_eq!(buf.get_u8(0).unwrap(), 9);
    }

    #[test]
    fn test_with_capacity_rounds_to_power_of_two_multiple() {
        let buf = GrowableByteBuffer::with_capacity(300);
        assert_eq!(buf.capacity(), 512);
        assert!(buf.is_empty());
    }
}
