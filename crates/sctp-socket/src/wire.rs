//! Native-endian encoding of the fixed-offset structures the kernel exchanges
//! through socket options, control messages and notification buffers.
//!
//! Kernel structures contain padding and, for some options, are packed, so
//! fields are addressed by byte offset rather than read sequentially. Every
//! read is bounds-checked against the slice it was given.

use crate::error::DecodeError;

/// Positional, bounds-checked reader over a kernel-supplied buffer.
#[derive(Debug, Clone, Copy)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    kind: &'static str,
}

impl<'a> WireReader<'a> {
    /// Wraps `buf`; `kind` names the record in decode errors.
    pub fn new(buf: &'a [u8], kind: &'static str) -> Self {
        Self { buf, kind }
    }

    /// Number of bytes available.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Fails with [`DecodeError::Truncated`] unless at least `needed` bytes are present.
    pub fn require(&self, needed: usize) -> Result<(), DecodeError> {
        if self.buf.len() < needed {
            return Err(DecodeError::Truncated {
                kind: self.kind,
                needed,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    fn array<const N: usize>(&self, offset: usize) -> Result<[u8; N], DecodeError> {
        let end = offset.checked_add(N).ok_or_else(|| DecodeError::Malformed {
            kind: self.kind,
            reason: format!("offset {} overflows", offset),
        })?;
        self.require(end)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[offset..end]);
        Ok(out)
    }

    /// Reads a `u16` at `offset`.
    pub fn u16_at(&self, offset: usize) -> Result<u16, DecodeError> {
        self.array::<2>(offset).map(u16::from_ne_bytes)
    }

    /// Reads a `u32` at `offset`.
    pub fn u32_at(&self, offset: usize) -> Result<u32, DecodeError> {
        self.array::<4>(offset).map(u32::from_ne_bytes)
    }

    /// Reads an `i32` at `offset`.
    pub fn i32_at(&self, offset: usize) -> Result<i32, DecodeError> {
        self.array::<4>(offset).map(i32::from_ne_bytes)
    }

    /// Borrows `len` bytes starting at `offset`.
    pub fn slice_at(&self, offset: usize, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = offset.saturating_add(len);
        self.require(end)?;
        Ok(&self.buf[offset..end])
    }

    /// Borrows whatever lies beyond `offset`, possibly nothing.
    pub fn rest(&self, offset: usize) -> &'a [u8] {
        self.buf.get(offset..).unwrap_or(&[])
    }
}

/// Positional writer producing a zero-initialised structure image.
#[derive(Debug, Clone, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    /// Creates a zeroed image of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self { buf: vec![0u8; len] }
    }

    fn reserve_to(&mut self, end: usize) {
        if self.buf.len() < end {
            self.buf.resize(end, 0);
        }
    }

    /// Writes a `u16` at `offset`.
    pub fn put_u16(&mut self, offset: usize, v: u16) -> &mut Self {
        self.put_bytes(offset, &v.to_ne_bytes())
    }

    /// Writes a `u32` at `offset`.
    pub fn put_u32(&mut self, offset: usize, v: u32) -> &mut Self {
        self.put_bytes(offset, &v.to_ne_bytes())
    }

    /// Writes an `i32` at `offset`.
    pub fn put_i32(&mut self, offset: usize, v: i32) -> &mut Self {
        self.put_bytes(offset, &v.to_ne_bytes())
    }

    /// Copies `data` to `offset`, growing the image if needed.
    pub fn put_bytes(&mut self, offset: usize, data: &[u8]) -> &mut Self {
        let end = offset + data.len();
        self.reserve_to(end);
        self.buf[offset..end].copy_from_slice(data);
        self
    }

    /// Current image length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the writer and returns the image.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_read_back() {
        let mut w = WireWriter::zeroed(12);
        w.put_u16(0, 0x8001).put_u32(4, 0xdead_beef).put_i32(8, -7);
        let buf = w.finish();
        assert_eq!(buf.len(), 12);

        let r = WireReader::new(&buf, "test");
        assert_eq!(r.u16_at(0).unwrap(), 0x8001);
        assert_eq!(r.u16_at(2).unwrap(), 0);
        assert_eq!(r.u32_at(4).unwrap(), 0xdead_beef);
        assert_eq!(r.i32_at(8).unwrap(), -7);
    }

    #[test]
    fn test_native_endian() {
        let mut w = WireWriter::zeroed(2);
        w.put_u16(0, 0x0102);
        assert_eq!(w.finish(), 0x0102u16.to_ne_bytes().to_vec());
    }

    #[test]
    fn test_writer_grows() {
        let mut w = WireWriter::zeroed(2);
        w.put_bytes(4, &[1, 2, 3]);
        assert_eq!(w.finish(), vec![0, 0, 0, 0, 1, 2, 3]);
    }

    #[test]
    fn test_read_past_end_is_truncated() {
        let buf = [0u8; 6];
        let r = WireReader::new(&buf, "shutdown");
        let err = r.u32_at(4).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                kind: "shutdown",
                needed: 8,
                available: 6,
            }
        );
    }

    #[test]
    fn test_huge_offset_does_not_panic() {
        let buf = [0u8; 4];
        let r = WireReader::new(&buf, "test");
        assert!(r.u32_at(usize::MAX - 1).is_err());
        assert!(r.slice_at(usize::MAX, 10).is_err());
        assert!(r.rest(100).is_empty());
    }

    #[test]
    fn test_slice_and_rest() {
        let buf = [1u8, 2, 3, 4, 5];
        let r = WireReader::new(&buf, "test");
        assert_eq!(r.slice_at(1, 3).unwrap(), &[2, 3, 4]);
        assert_eq!(r.rest(3), &[4, 5]);
        assert_eq!(r.len(), 5);
        assert!(!r.is_empty());
    }
}
