use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use bytes::{Bytes, BytesMut};

use crate::errors::AmqpParseError;

/// Growable byte queue with a read cursor at the front and an append cursor
/// at the back.
///
/// All multi-byte values are big-endian. Reading past the end fails with
/// `AmqpParseError::BufferUnderflow` and leaves the buffer untouched.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    data: BytesMut,
}

macro_rules! buffer_read {
    ($read:ident, $consume:ident, $ty:ty, $size:expr, |$b:ident| $conv:expr) => {
        pub fn $read(&self, offset: usize) -> Result<$ty, AmqpParseError> {
            self.check(offset, $size)?;
            let $b = &self.data[offset..offset + $size];
            Ok($conv)
        }

        pub fn $consume(&mut self) -> Result<$ty, AmqpParseError> {
            let v = self.$read(0)?;
            let _ = self.data.split_to($size);
            Ok(v)
        }
    };
}

macro_rules! buffer_append {
    ($append:ident, $ty:ty, $size:expr, $write:path) => {
        pub fn $append(&mut self, value: $ty) -> &mut Self {
            let mut tmp = [0u8; $size];
            $write(&mut tmp, value);
            self.data.extend_from_slice(&tmp);
            self
        }
    };
}

impl Buffer {
    pub fn new() -> Buffer {
        Buffer {
            data: BytesMut::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Buffer {
        Buffer {
            data: BytesMut::with_capacity(capacity),
        }
    }

    /// Number of unconsumed bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear()
    }

    pub fn into_inner(self) -> BytesMut {
        self.data
    }

    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }

    fn check(&self, offset: usize, n: usize) -> Result<(), AmqpParseError> {
        match offset.checked_add(n) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(AmqpParseError::BufferUnderflow),
        }
    }

    /// Copy `n` bytes starting at `offset` without consuming them.
    pub fn read(&self, n: usize, offset: usize) -> Result<Bytes, AmqpParseError> {
        self.check(offset, n)?;
        Ok(Bytes::copy_from_slice(&self.data[offset..offset + n]))
    }

    /// Remove `n` bytes from the front and return them.
    pub fn consume(&mut self, n: usize) -> Result<Bytes, AmqpParseError> {
        self.check(0, n)?;
        Ok(self.data.split_to(n).freeze())
    }

    /// Remove `n` bytes from the front.
    pub fn discard(&mut self, n: usize) -> Result<&mut Self, AmqpParseError> {
        self.check(0, n)?;
        let _ = self.data.split_to(n);
        Ok(self)
    }

    /// Independent buffer over a copy of `n` bytes starting at `offset`.
    pub fn slice(&self, n: usize, offset: usize) -> Result<Buffer, AmqpParseError> {
        self.check(offset, n)?;
        Ok(Buffer::from(&self.data[offset..offset + n]))
    }

    /// Same as `slice` at offset 0, removing the bytes from this buffer.
    pub fn consume_slice(&mut self, n: usize) -> Result<Buffer, AmqpParseError> {
        self.check(0, n)?;
        Ok(Buffer {
            data: self.data.split_to(n),
        })
    }

    pub fn append(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self
    }

    buffer_read!(read_u8, consume_u8, u8, 1, |b| b[0]);
    buffer_read!(read_i8, consume_i8, i8, 1, |b| b[0] as i8);
    buffer_read!(read_u16, consume_u16, u16, 2, |b| BigEndian::read_u16(b));
    buffer_read!(read_i16, consume_i16, i16, 2, |b| BigEndian::read_i16(b));
    buffer_read!(read_u32, consume_u32, u32, 4, |b| BigEndian::read_u32(b));
    buffer_read!(read_i32, consume_i32, i32, 4, |b| BigEndian::read_i32(b));
    buffer_read!(read_u64, consume_u64, u64, 8, |b| BigEndian::read_u64(b));
    buffer_read!(read_i64, consume_i64, i64, 8, |b| BigEndian::read_i64(b));
    buffer_read!(read_f32, consume_f32, f32, 4, |b| BigEndian::read_f32(b));
    buffer_read!(read_f64, consume_f64, f64, 8, |b| BigEndian::read_f64(b));

    pub fn append_u8(&mut self, value: u8) -> &mut Self {
        self.data.extend_from_slice(&[value]);
        self
    }

    pub fn append_i8(&mut self, value: i8) -> &mut Self {
        self.append_u8(value as u8)
    }

    buffer_append!(append_u16, u16, 2, BigEndian::write_u16);
    buffer_append!(append_i16, i16, 2, BigEndian::write_i16);
    buffer_append!(append_u32, u32, 4, BigEndian::write_u32);
    buffer_append!(append_i32, i32, 4, BigEndian::write_i32);
    buffer_append!(append_u64, u64, 8, BigEndian::write_u64);
    buffer_append!(append_i64, i64, 8, BigEndian::write_i64);
    buffer_append!(append_f32, f32, 4, BigEndian::write_f32);
    buffer_append!(append_f64, f64, 8, BigEndian::write_f64);
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl From<BytesMut> for Buffer {
    fn from(data: BytesMut) -> Buffer {
        Buffer { data }
    }
}

impl<'a> From<&'a [u8]> for Buffer {
    fn from(data: &'a [u8]) -> Buffer {
        Buffer {
            data: BytesMut::from(data),
        }
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Buffer {
        Buffer::from(data.as_slice())
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Buffer").field(&self.data).finish()
    }
}
