//! Cursor-based decoding and size-predictive encoding
//!
//! Decoding reads from a [`Cursor`] over an immutable byte slice and fails
//! with [`Error::Malformed`] when a read would exceed the remaining bytes.
//! Encoding is size-predictive: [`Encode::size`] reports the exact number
//! of bytes [`Encode::encode`] will append, so callers can reserve a
//! buffer once and emit a whole frame without growth.

use bytes::{BufMut, BytesMut};

use crate::Error;

/// A value that can be written to the wire.
pub trait Encode {
    /// Exact number of bytes [`Encode::encode`] will append.
    fn size(&self) -> usize;

    /// Append the wire representation to `buf`.
    fn encode(&self, buf: &mut BytesMut);
}

/// A value that can be read off the wire.
pub trait Decode: Sized {
    /// Read one value, advancing the cursor past it.
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error>;
}

/// A non-owning read cursor over a byte slice.
///
/// Partial reads never occur: a getter either consumes the full width of
/// the value or fails leaving the cursor untouched.
#[derive(Debug)]
pub struct Cursor<'a> {
    slice: &'a [u8],
}

impl<'a> Cursor<'a> {
    /// Creates a cursor over `slice`.
    pub fn new(slice: &'a [u8]) -> Self {
        Self { slice }
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.slice.len()
    }

    /// Whether all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.slice.is_empty()
    }

    /// Consume and return the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.slice.len() < n {
            return Err(Error::Malformed("read past end of payload"));
        }
        let (read, rest) = self.slice.split_at(n);
        self.slice = rest;
        Ok(read)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let read = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(read);
        Ok(out)
    }

    /// Consume one byte.
    pub fn get_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    /// Consume one signed byte.
    pub fn get_i8(&mut self) -> Result<i8, Error> {
        Ok(self.get_u8()? as i8)
    }

    /// Consume a big-endian `u16`.
    pub fn get_u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    /// Consume a big-endian `i16`.
    pub fn get_i16(&mut self) -> Result<i16, Error> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    /// Consume a big-endian `u32`.
    pub fn get_u32(&mut self) -> Result<u32, Error> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    /// Consume a big-endian `i32`.
    pub fn get_i32(&mut self) -> Result<i32, Error> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    /// Consume a big-endian `u64`.
    pub fn get_u64(&mut self) -> Result<u64, Error> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    /// Consume a big-endian `i64`.
    pub fn get_i64(&mut self) -> Result<i64, Error> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    /// Consume a big-endian IEEE-754 single.
    pub fn get_f32(&mut self) -> Result<f32, Error> {
        Ok(f32::from_be_bytes(self.take_array()?))
    }

    /// Consume a big-endian IEEE-754 double.
    pub fn get_f64(&mut self) -> Result<f64, Error> {
        Ok(f64::from_be_bytes(self.take_array()?))
    }

    /// Consume a length-prefixed sub-region (`u32` byte length) and return
    /// a cursor over it. Tables and arrays decode through this.
    pub fn get_region(&mut self) -> Result<Cursor<'a>, Error> {
        let len = self.get_u32()? as usize;
        Ok(Cursor::new(self.take(len)?))
    }
}

impl Encode for bool {
    fn size(&self) -> usize {
        1
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(*self));
    }
}

impl Decode for bool {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(cursor.get_u8()? != 0)
    }
}

macro_rules! impl_scalar_codec {
    ($($ty:ident => $get:ident, $put:ident, $width:expr);* $(;)?) => {
        $(
            impl Encode for $ty {
                fn size(&self) -> usize {
                    $width
                }

                fn encode(&self, buf: &mut BytesMut) {
                    buf.$put(*self);
                }
            }

            impl Decode for $ty {
                fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
                    cursor.$get()
                }
            }
        )*
    };
}

impl_scalar_codec! {
    u8 => get_u8, put_u8, 1;
    i8 => get_i8, put_i8, 1;
    u16 => get_u16, put_u16, 2;
    i16 => get_i16, put_i16, 2;
    u32 => get_u32, put_u32, 4;
    i32 => get_i32, put_i32, 4;
    u64 => get_u64, put_u64, 8;
    i64 => get_i64, put_i64, 8;
    f32 => get_f32, put_f32, 4;
    f64 => get_f64, put_f64, 8;
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::{Cursor, Decode, Encode};
    use crate::Error;

    #[test]
    fn scalars_are_big_endian() {
        let mut buf = BytesMut::new();
        0x1234_5678_u32.encode(&mut buf);
        assert_eq!(&buf[..], &[0x12, 0x34, 0x56, 0x78]);
        // The first byte of an encoded u32 is its most significant byte
        assert_eq!(buf[0], 0x12);
    }

    #[test]
    fn size_matches_encoded_length() {
        let mut buf = BytesMut::new();
        let value = 42_u64;
        value.encode(&mut buf);
        assert_eq!(buf.len(), value.size());
    }

    #[test]
    fn overrun_leaves_cursor_untouched() {
        let mut cursor = Cursor::new(&[0x01, 0x02]);
        assert!(matches!(cursor.get_u32(), Err(Error::Malformed(_))));
        assert_eq!(cursor.remaining(), 2);
        assert_eq!(cursor.get_u16().unwrap(), 0x0102);
    }

    #[test]
    fn region_is_bounded() {
        // length prefix of 3, then 3 payload bytes and a trailing byte
        let bytes = [0, 0, 0, 3, 0xaa, 0xbb, 0xcc, 0xdd];
        let mut cursor = Cursor::new(&bytes);
        let mut region = cursor.get_region().unwrap();
        assert_eq!(region.remaining(), 3);
        assert!(region.take(4).is_err());
        assert_eq!(region.take(3).unwrap(), &[0xaa, 0xbb, 0xcc]);
        assert_eq!(cursor.remaining(), 1);
    }

    #[test]
    fn bool_roundtrip() {
        let mut buf = BytesMut::new();
        true.encode(&mut buf);
        false.encode(&mut buf);
        let mut cursor = Cursor::new(&buf);
        assert!(bool::decode(&mut cursor).unwrap());
        assert!(!bool::decode(&mut cursor).unwrap());
    }
}
