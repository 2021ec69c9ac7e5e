//! Binary Codec
//!
//! Deterministic encode/decode of the primitive values that make up every
//! message on the wire.
//!
//! ## Layout Rules
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  u8 / u16 / u32 / u64   fixed width, big-endian             │
//! │  f32                    IEEE-754 bits, big-endian           │
//! │  type tag               one byte                            │
//! │  string                 fixed slot, NUL padded              │
//! │  message                u64 length prefix + payload         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Byte order never depends on the host. Anything the decoder does not
//! recognise is a [`CodecError`], and a codec error means the stream can no
//! longer be trusted.

use thiserror::Error;

/// Size of the length prefix written by [`prepend_size`].
pub const SIZE_PREFIX_LEN: usize = 8;

/// Protocol errors. All of them are fatal for the session that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Input ended before a value was complete.
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        /// Bytes the value required.
        needed: usize,
        /// Bytes left in the input.
        remaining: usize,
    },

    /// Entity type tag not present in the registry.
    #[error("unknown entity type tag: {0}")]
    UnknownTypeTag(u8),

    /// Command kind not known to this protocol version.
    #[error("unknown command kind: {0}")]
    UnknownCommandKind(u8),

    /// Target kind byte was neither point nor entity.
    #[error("unknown target kind: {0}")]
    UnknownTargetKind(u8),

    /// An enum field held a value outside its range.
    #[error("invalid value {value} for {field}")]
    InvalidEnum {
        /// Field being decoded.
        field: &'static str,
        /// Raw byte read.
        value: u8,
    },

    /// String does not fit in its slot.
    #[error("string of {len} bytes exceeds slot of {max} bytes")]
    StringTooLong {
        /// Length of the offending string.
        len: usize,
        /// Slot size.
        max: usize,
    },

    /// String slot did not contain valid UTF-8.
    #[error("string slot is not valid utf-8")]
    InvalidString,

    /// Message had bytes left over after decoding.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    /// Snapshot contained the null ref or a duplicate ref.
    #[error("invalid entity ref {0} in snapshot")]
    InvalidEntityRef(u16),

    /// Snapshot contained a unit owned by a player not in the roster.
    #[error("unit {entity} owned by unknown player {owner}")]
    InvalidOwner {
        /// Offending entity.
        entity: u16,
        /// Owner id read from the wire.
        owner: u16,
    },

    /// A count field does not fit this platform's address space.
    #[error("count {0} too large")]
    CountTooLarge(u64),
}

// =============================================================================
// ENCODING
// =============================================================================

/// Append-only encoder over a growable byte buffer.
#[derive(Debug, Default, Clone)]
pub struct Packer {
    buf: Vec<u8>,
}

impl Packer {
    /// Create an empty packer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Create a packer with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Write a u8.
    #[inline]
    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Write a u16.
    #[inline]
    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a u32.
    #[inline]
    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a u64.
    #[inline]
    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write an f32 as its IEEE bit pattern.
    #[inline]
    pub fn put_f32(&mut self, value: f32) {
        self.put_u32(value.to_bits());
    }

    /// Write a bool as a single byte.
    #[inline]
    pub fn put_bool(&mut self, value: bool) {
        self.put_u8(value as u8);
    }

    /// Write a one-byte type tag.
    #[inline]
    pub fn put_tag(&mut self, tag: u8) {
        self.put_u8(tag);
    }

    /// Write a string into a NUL-padded slot of exactly `slot` bytes.
    pub fn put_str(&mut self, value: &str, slot: usize) -> Result<(), CodecError> {
        let bytes = value.as_bytes();
        if bytes.len() > slot {
            return Err(CodecError::StringTooLong {
                len: bytes.len(),
                max: slot,
            });
        }
        self.buf.extend_from_slice(bytes);
        self.buf.resize(self.buf.len() + (slot - bytes.len()), 0);
        Ok(())
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// View the written bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Take the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

// =============================================================================
// DECODING
// =============================================================================

/// Cursor over an input slice.
///
/// Every read either consumes exactly the bytes of one value or fails
/// without moving the cursor.
#[derive(Debug, Clone)]
pub struct Unpacker<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Unpacker<'a> {
    /// Start reading at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Current cursor offset.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        if self.remaining() < N {
            return Err(CodecError::UnexpectedEof {
                needed: N,
                remaining: self.remaining(),
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    /// Read a u8.
    #[inline]
    pub fn get_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take::<1>()?[0])
    }

    /// Read a u16.
    #[inline]
    pub fn get_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    /// Read a u32.
    #[inline]
    pub fn get_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    /// Read a u64.
    #[inline]
    pub fn get_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.take()?))
    }

    /// Read an f32 from its IEEE bit pattern.
    #[inline]
    pub fn get_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_bits(self.get_u32()?))
    }

    /// Read a bool; any byte other than 0 or 1 is rejected.
    pub fn get_bool(&mut self, field: &'static str) -> Result<bool, CodecError> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(CodecError::InvalidEnum { field, value }),
        }
    }

    /// Read a one-byte type tag.
    #[inline]
    pub fn get_tag(&mut self) -> Result<u8, CodecError> {
        self.get_u8()
    }

    /// Read a u32 count and convert it to usize.
    pub fn get_count(&mut self) -> Result<usize, CodecError> {
        let count = self.get_u32()?;
        usize::try_from(count).map_err(|_| CodecError::CountTooLarge(count as u64))
    }

    /// Read a NUL-padded string slot of exactly `slot` bytes.
    pub fn get_str(&mut self, slot: usize) -> Result<String, CodecError> {
        if self.remaining() < slot {
            return Err(CodecError::UnexpectedEof {
                needed: slot,
                remaining: self.remaining(),
            });
        }
        let raw = &self.data[self.pos..self.pos + slot];
        let end = raw.iter().position(|b| *b == 0).unwrap_or(slot);
        let value = std::str::from_utf8(&raw[..end])
            .map_err(|_| CodecError::InvalidString)?
            .to_owned();
        self.pos += slot;
        Ok(value)
    }

    /// Require that the whole input was consumed.
    pub fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

// =============================================================================
// MESSAGE FRAMING
// =============================================================================

/// Prefix a payload with its length as a big-endian u64.
pub fn prepend_size(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(SIZE_PREFIX_LEN + payload.len());
    out.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Decode a length prefix written by [`prepend_size`].
#[inline]
pub fn read_size_prefix(prefix: [u8; SIZE_PREFIX_LEN]) -> u64 {
    u64::from_be_bytes(prefix)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_is_big_endian() {
        let mut p = Packer::new();
        p.put_u16(0x0102);
        p.put_u32(0x0304_0506);
        p.put_u64(0x0708_090a_0b0c_0d0e);
        assert_eq!(
            p.as_bytes(),
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14]
        );
    }

    #[test]
    fn test_read_back_primitives() {
        let mut p = Packer::new();
        p.put_u8(7);
        p.put_u16(u16::MAX);
        p.put_u32(123_456);
        p.put_u64(u64::MAX - 1);
        p.put_f32(-2.5);
        p.put_bool(true);
        let bytes = p.into_bytes();

        let mut u = Unpacker::new(&bytes);
        assert_eq!(u.get_u8().unwrap(), 7);
        assert_eq!(u.get_u16().unwrap(), u16::MAX);
        assert_eq!(u.get_u32().unwrap(), 123_456);
        assert_eq!(u.get_u64().unwrap(), u64::MAX - 1);
        assert_eq!(u.get_f32().unwrap(), -2.5);
        assert!(u.get_bool("flag").unwrap());
        assert!(u.finish().is_ok());
    }

    #[test]
    fn test_truncated_input_fails_without_moving() {
        let bytes = [0u8, 1, 2];
        let mut u = Unpacker::new(&bytes);
        assert_eq!(
            u.get_u32(),
            Err(CodecError::UnexpectedEof { needed: 4, remaining: 3 })
        );
        assert_eq!(u.position(), 0);
        assert_eq!(u.get_u16().unwrap(), 1);
    }

    #[test]
    fn test_string_slot() {
        let mut p = Packer::new();
        p.put_str("alice", 8).unwrap();
        assert_eq!(p.len(), 8);
        assert_eq!(&p.as_bytes()[5..], &[0, 0, 0]);

        let bytes = p.into_bytes();
        let mut u = Unpacker::new(&bytes);
        assert_eq!(u.get_str(8).unwrap(), "alice");
        assert!(u.finish().is_ok());
    }

    #[test]
    fn test_string_exactly_filling_slot() {
        let mut p = Packer::new();
        p.put_str("abcd", 4).unwrap();
        let bytes = p.into_bytes();
        assert_eq!(Unpacker::new(&bytes).get_str(4).unwrap(), "abcd");
    }

    #[test]
    fn test_string_too_long_rejected() {
        let mut p = Packer::new();
        assert_eq!(
            p.put_str("too long", 4),
            Err(CodecError::StringTooLong { len: 8, max: 4 })
        );
        assert!(p.is_empty());
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let bytes = [0xff, 0xfe, 0, 0];
        assert_eq!(Unpacker::new(&bytes).get_str(4), Err(CodecError::InvalidString));
    }

    #[test]
    fn test_bad_bool_rejected() {
        let bytes = [2u8];
        assert!(matches!(
            Unpacker::new(&bytes).get_bool("flag"),
            Err(CodecError::InvalidEnum { field: "flag", value: 2 })
        ));
    }

    #[test]
    fn test_trailing_bytes_detected() {
        let bytes = [1u8, 2];
        let mut u = Unpacker::new(&bytes);
        u.get_u8().unwrap();
        assert_eq!(u.finish(), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn test_size_prefix() {
        let framed = prepend_size(&[9, 9, 9]);
        assert_eq!(framed.len(), SIZE_PREFIX_LEN + 3);
        let mut prefix = [0u8; SIZE_PREFIX_LEN];
        prefix.copy_from_slice(&framed[..SIZE_PREFIX_LEN]);
        assert_eq!(read_size_prefix(prefix), 3);
        assert_eq!(&framed[SIZE_PREFIX_LEN..], &[9, 9, 9]);
    }
}
