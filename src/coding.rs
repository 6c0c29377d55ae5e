//! Variable-length and fixed-width integer coding.
//!
//! LevelDB stores lengths, file numbers and block handles as base-128
//! varints (7 bits per byte, low bits first, high bit set on every byte
//! except the last). [`Decoder`] is a cursor over a byte slice that reads
//! these alongside fixed-width little-endian fields and reports the absolute
//! offset of anything it cannot read.
//!
//! Log fragments and table blocks are protected by CRC32C checksums stored
//! in masked form; [`unmask_crc`] recovers the raw checksum.

use crate::error::{Error, Result};
use bytes::Buf;

const MASK_DELTA: u32 = 0xa282_ead8;

/// Maximum encoded length of a 32-bit varint.
pub const MAX_VARINT32_LEN: usize = 5;

/// Maximum encoded length of a 64-bit varint.
pub const MAX_VARINT64_LEN: usize = 10;

/// Appends `value` as a varint.
pub fn put_varint32(dst: &mut Vec<u8>, value: u32) {
    put_varint64(dst, u64::from(value));
}

/// Appends `value` as a varint.
pub fn put_varint64(dst: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        dst.push((value as u8) | 0x80);
        value >>= 7;
    }
    dst.push(value as u8);
}

/// Appends a varint32 length followed by `data`.
#[cfg(any(test, feature = "fixtures"))]
pub fn put_length_prefixed_slice(dst: &mut Vec<u8>, data: &[u8]) {
    put_varint32(dst, data.len() as u32);
    dst.extend_from_slice(data);
}

/// Number of bytes `value` occupies as a varint.
pub fn varint_length(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Decodes a varint32 from the start of `data`, returning the value and the
/// number of bytes consumed.
pub fn decode_varint32(data: &[u8]) -> Result<(u32, usize)> {
    let mut decoder = Decoder::new(data);
    let value = decoder.read_varint32()?;
    Ok((value, decoder.position()))
}

/// Decodes a varint64 from the start of `data`, returning the value and the
/// number of bytes consumed.
pub fn decode_varint64(data: &[u8]) -> Result<(u64, usize)> {
    let mut decoder = Decoder::new(data);
    let value = decoder.read_varint64()?;
    Ok((value, decoder.position()))
}

/// Maps a zig-zag encoded value back to a signed integer.
pub fn zigzag_decode32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Maps a signed integer onto the unsigned zig-zag encoding.
pub fn zigzag_encode32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Masks a CRC32C the way it is stored on disk.
#[cfg(any(test, feature = "fixtures"))]
pub fn mask_crc(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Reverses [`mask_crc`].
pub fn unmask_crc(masked: u32) -> u32 {
    masked.wrapping_sub(MASK_DELTA).rotate_left(15)
}

/// CRC32C of `type_byte` followed by `data`, unmasked.
pub fn typed_crc(type_byte: u8, data: &[u8]) -> u32 {
    crc32c::crc32c_append(crc32c::crc32c(&[type_byte]), data)
}

/// Forward-only cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    data: &'a [u8],
    buf: &'a [u8],
    base_offset: u64,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder whose offsets start at zero.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base_offset(data, 0)
    }

    /// Creates a decoder whose reported offsets are shifted by `base_offset`,
    /// usually the file offset `data` was read from.
    pub fn with_base_offset(data: &'a [u8], base_offset: u64) -> Self {
        Self { data, buf: data, base_offset }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.data.len() - self.buf.len()
    }

    /// Absolute offset of the next byte.
    pub fn offset(&self) -> u64 {
        self.base_offset + self.position() as u64
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Returns true when every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    /// Looks at the next byte without consuming it.
    pub fn peek_u8(&self) -> Option<u8> {
        self.buf.first().copied()
    }

    /// Looks at the next `len` bytes without consuming them.
    pub fn peek_bytes(&self, len: usize) -> Option<&'a [u8]> {
        self.buf.get(..len)
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(Error::Truncated {
                offset: self.offset(),
                needed,
                available: self.buf.remaining(),
            });
        }
        Ok(())
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    /// Reads a little-endian u16.
    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    /// Reads a little-endian u32.
    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    /// Reads a little-endian u64.
    pub fn read_u64_le(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.buf.get_u64_le())
    }

    /// Reads a big-endian u32.
    pub fn read_u32_be(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    /// Reads a big-endian u64.
    pub fn read_u64_be(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.buf.get_u64())
    }

    /// Reads a little-endian IEEE-754 double.
    pub fn read_f64_le(&mut self) -> Result<f64> {
        self.ensure(8)?;
        Ok(self.buf.get_f64_le())
    }

    fn read_varint(&mut self, max_bytes: usize) -> Result<u64> {
        let start = self.offset();
        let mut result = 0u64;
        for i in 0..max_bytes {
            if !self.buf.has_remaining() {
                return Err(Error::Truncated { offset: start, needed: i + 1, available: i });
            }
            let byte = self.buf.get_u8();
            result |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(Error::corruption(format!(
            "varint at offset {} is longer than {} bytes",
            start, max_bytes
        )))
    }

    /// Reads a varint that must fit in 32 bits.
    pub fn read_varint32(&mut self) -> Result<u32> {
        let start = self.offset();
        let value = self.read_varint(MAX_VARINT32_LEN)?;
        u32::try_from(value)
            .map_err(|_| Error::corruption(format!("varint32 at offset {} overflows", start)))
    }

    /// Reads a varint of up to 64 bits.
    pub fn read_varint64(&mut self) -> Result<u64> {
        self.read_varint(MAX_VARINT64_LEN)
    }

    /// Reads a zig-zag encoded signed varint.
    pub fn read_zigzag32(&mut self) -> Result<i32> {
        self.read_varint32().map(zigzag_decode32)
    }

    /// Reads exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Reads a varint32 length followed by that many bytes.
    pub fn read_length_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint32()? as usize;
        self.read_bytes(len)
    }

    /// Skips `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    /// Consumes and returns everything that is left.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = self.buf;
        self.buf = &[];
        rest
    }
}
