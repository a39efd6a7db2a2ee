//! Endian-aware binary codec.
//!
//! [`EndianWriter`] and [`EndianReader`] wrap any `Write`/`Read` and encode
//! fixed-width integers and floats in a byte order chosen at construction.
//! Both track their byte position so that errors can point at the exact
//! offset of a short read. A short read is always reported as
//! [`SpatialError::TruncatedRecord`]; the reader never zero-fills.

use std::io::{ErrorKind, Read, Write};

use byteorder::{BigEndian, ByteOrder as _, LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::disk_quadtree::qtree_types::{SpatialError, SpatialResult};

/// Byte order used to encode multi-byte values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

/// Encodes a `u32` into a 4-byte array.
pub fn encode_u32(order: ByteOrder, value: u32) -> [u8; 4] {
    let mut buf = [0u8; 4];
    match order {
        ByteOrder::Big => BigEndian::write_u32(&mut buf, value),
        ByteOrder::Little => LittleEndian::write_u32(&mut buf, value),
    }
    buf
}

/// Decodes a `u32` from the first 4 bytes of `bytes`.
pub fn decode_u32(order: ByteOrder, bytes: &[u8]) -> SpatialResult<u32> {
    if bytes.len() < 4 {
        return Err(SpatialError::TruncatedRecord {
            offset: 0,
            needed: 4,
            available: bytes.len() as u64,
        });
    }
    Ok(match order {
        ByteOrder::Big => BigEndian::read_u32(bytes),
        ByteOrder::Little => LittleEndian::read_u32(bytes),
    })
}

/// Writes values in a fixed byte order.
pub struct EndianWriter<W> {
    inner: W,
    order: ByteOrder,
    position: u64,
}

impl<W: Write> EndianWriter<W> {
    pub fn new(inner: W, order: ByteOrder) -> Self {
        Self::with_position(inner, order, 0)
    }

    /// Creates a writer whose position counter starts at `position`.
    pub fn with_position(inner: W, order: ByteOrder, position: u64) -> Self {
        Self {
            inner,
            order,
            position,
        }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Number of bytes written so far, plus the starting position.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn write_u8(&mut self, value: u8) -> SpatialResult<()> {
        self.inner.write_u8(value)?;
        self.position += 1;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> SpatialResult<()> {
        match self.order {
            ByteOrder::Big => self.inner.write_u16::<BigEndian>(value)?,
            ByteOrder::Little => self.inner.write_u16::<LittleEndian>(value)?,
        }
        self.position += 2;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> SpatialResult<()> {
        match self.order {
            ByteOrder::Big => self.inner.write_u32::<BigEndian>(value)?,
            ByteOrder::Little => self.inner.write_u32::<LittleEndian>(value)?,
        }
        self.position += 4;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> SpatialResult<()> {
        match self.order {
            ByteOrder::Big => self.inner.write_u64::<BigEndian>(value)?,
            ByteOrder::Little => self.inner.write_u64::<LittleEndian>(value)?,
        }
        self.position += 8;
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> SpatialResult<()> {
        match self.order {
            ByteOrder::Big => self.inner.write_i32::<BigEndian>(value)?,
            ByteOrder::Little => self.inner.write_i32::<LittleEndian>(value)?,
        }
        self.position += 4;
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> SpatialResult<()> {
        match self.order {
            ByteOrder::Big => self.inner.write_i64::<BigEndian>(value)?,
            ByteOrder::Little => self.inner.write_i64::<LittleEndian>(value)?,
        }
        self.position += 8;
        Ok(())
    }

    /// Writes the IEEE-754 bit pattern, so NaN payloads survive unchanged.
    pub fn write_f64(&mut self, value: f64) -> SpatialResult<()> {
        self.write_u64(value.to_bits())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> SpatialResult<()> {
        self.inner.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> SpatialResult<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads values in a fixed byte order.
pub struct EndianReader<R> {
    inner: R,
    order: ByteOrder,
    position: u64,
}

impl<R: Read> EndianReader<R> {
    pub fn new(inner: R, order: ByteOrder) -> Self {
        Self::with_position(inner, order, 0)
    }

    /// Creates a reader whose position counter starts at `position`, for
    /// readers positioned somewhere inside a file.
    pub fn with_position(inner: R, order: ByteOrder, position: u64) -> Self {
        Self {
            inner,
            order,
            position,
        }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Fills `buf` completely or fails with `TruncatedRecord`.
    pub fn read_exact_into(&mut self, buf: &mut [u8]) -> SpatialResult<()> {
        let start = self.position;
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    self.position += filled as u64;
                    return Err(SpatialError::TruncatedRecord {
                        offset: start,
                        needed: buf.len() as u64,
                        available: filled as u64,
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.position += filled as u64;
        Ok(())
    }

    fn read_array<const N: usize>(&mut self) -> SpatialResult<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact_into(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> SpatialResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> SpatialResult<u16> {
        let buf = self.read_array::<2>()?;
        Ok(match self.order {
            ByteOrder::Big => BigEndian::read_u16(&buf),
            ByteOrder::Little => LittleEndian::read_u16(&buf),
        })
    }

    pub fn read_u32(&mut self) -> SpatialResult<u32> {
        let buf = self.read_array::<4>()?;
        Ok(match self.order {
            ByteOrder::Big => BigEndian::read_u32(&buf),
            ByteOrder::Little => LittleEndian::read_u32(&buf),
        })
    }

    pub fn read_u64(&mut self) -> SpatialResult<u64> {
        let buf = self.read_array::<8>()?;
        Ok(match self.order {
            ByteOrder::Big => BigEndian::read_u64(&buf),
            ByteOrder::Little => LittleEndian::read_u64(&buf),
        })
    }

    pub fn read_i32(&mut self) -> SpatialResult<i32> {
        let buf = self.read_array::<4>()?;
        Ok(match self.order {
            ByteOrder::Big => BigEndian::read_i32(&buf),
            ByteOrder::Little => LittleEndian::read_i32(&buf),
        })
    }

    pub fn read_i64(&mut self) -> SpatialResult<i64> {
        let buf = self.read_array::<8>()?;
        Ok(match self.order {
            ByteOrder::Big => BigEndian::read_i64(&buf),
            ByteOrder::Little => LittleEndian::read_i64(&buf),
        })
    }

    pub fn read_f64(&mut self) -> SpatialResult<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_bytes(&mut self, len: usize) -> SpatialResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact_into(&mut buf)?;
        Ok(buf)
    }

    /// Returns `true` if the underlying reader has no more bytes.
    pub fn is_at_end(&mut self) -> SpatialResult<bool> {
        let mut probe = [0u8; 1];
        loop {
            match self.inner.read(&mut probe) {
                Ok(0) => return Ok(true),
                Ok(_) => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
