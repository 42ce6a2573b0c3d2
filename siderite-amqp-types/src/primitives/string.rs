//! Length-prefixed wire strings

use std::borrow::Borrow;
use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::codec::{Cursor, Decode, Encode};
use crate::Error;

/// A short string: a one-byte length prefix followed by at most 255 bytes
/// of UTF-8.
///
/// Queue names, exchange names, routing keys and consumer tags are all
/// short strings. The length bound is enforced at construction so that
/// encoding stays infallible.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShortStr(String);

impl ShortStr {
    /// Creates a short string, failing if the UTF-8 byte length exceeds
    /// the one-byte length prefix.
    pub fn new(value: impl Into<String>) -> Result<Self, Error> {
        let value = value.into();
        if value.len() > u8::MAX as usize {
            return Err(Error::ShortStringTooLong);
        }
        Ok(Self(value))
    }

    /// The string content.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Byte length of the content.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the string is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<&str> for ShortStr {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for ShortStr {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ShortStr> for String {
    fn from(value: ShortStr) -> Self {
        value.0
    }
}

impl AsRef<str> for ShortStr {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ShortStr {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ShortStr {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ShortStr {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for ShortStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Encode for ShortStr {
    fn size(&self) -> usize {
        1 + self.0.len()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.0.len() as u8);
        buf.put_slice(self.0.as_bytes());
    }
}

impl Decode for ShortStr {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        let len = cursor.get_u8()? as usize;
        let bytes = cursor.take(len)?;
        let value = std::str::from_utf8(bytes)?;
        Ok(Self(value.to_owned()))
    }
}

/// A long string: a four-byte length prefix followed by arbitrary bytes.
///
/// Long strings carry binary payloads on the wire (SASL responses,
/// mechanism lists); they are not required to be UTF-8.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LongStr(Vec<u8>);

impl LongStr {
    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Byte length of the content.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the content is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The content interpreted as UTF-8, if it is.
    pub fn as_str(&self) -> Result<&str, Error> {
        Ok(std::str::from_utf8(&self.0)?)
    }
}

impl From<Vec<u8>> for LongStr {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for LongStr {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl From<&str> for LongStr {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<String> for LongStr {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<LongStr> for Vec<u8> {
    fn from(value: LongStr) -> Self {
        value.0
    }
}

impl Encode for LongStr {
    fn size(&self) -> usize {
        4 + self.0.len()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.0.len() as u32);
        buf.put_slice(&self.0);
    }
}

impl Decode for LongStr {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        let len = cursor.get_u32()? as usize;
        Ok(Self(cursor.take(len)?.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::{LongStr, ShortStr};
    use crate::codec::{Cursor, Decode, Encode};
    use crate::Error;

    #[test]
    fn short_str_roundtrip() {
        let value = ShortStr::new("hello").unwrap();
        let mut buf = BytesMut::new();
        value.encode(&mut buf);
        assert_eq!(buf.len(), value.size());
        assert_eq!(&buf[..], b"\x05hello");

        let mut cursor = Cursor::new(&buf);
        assert_eq!(ShortStr::decode(&mut cursor).unwrap(), value);
        assert!(cursor.is_empty());
    }

    #[test]
    fn short_str_length_bound() {
        let long = "x".repeat(256);
        assert!(matches!(
            ShortStr::new(long),
            Err(Error::ShortStringTooLong)
        ));
        assert!(ShortStr::new("y".repeat(255)).is_ok());
    }

    #[test]
    fn short_str_rejects_truncated_input() {
        // claims 5 bytes, provides 3
        let mut cursor = Cursor::new(b"\x05abc");
        assert!(ShortStr::decode(&mut cursor).is_err());
    }

    #[test]
    fn short_str_rejects_invalid_utf8() {
        let mut cursor = Cursor::new(&[0x02, 0xff, 0xfe]);
        assert!(matches!(
            ShortStr::decode(&mut cursor),
            Err(Error::InvalidUtf8)
        ));
    }

    #[test]
    fn long_str_roundtrip() {
        let value = LongStr::from("PLAIN EXTERNAL");
        let mut buf = BytesMut::new();
        value.encode(&mut buf);
        assert_eq!(buf.len(), value.size());
        assert_eq!(&buf[..4], &[0, 0, 0, 14]);

        let mut cursor = Cursor::new(&buf);
        assert_eq!(LongStr::decode(&mut cursor).unwrap(), value);
    }
}
