//! The tagged field value union

use bytes::{BufMut, BytesMut};

use crate::codec::{Cursor, Decode, Encode};
use crate::Error;

use super::{Decimal, FieldArray, FieldTable, LongStr, ShortStr, Timestamp};

/// A value carried in a field table or field array, discriminated on the
/// wire by a one-byte type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Boolean
    ///
    /// type tag = `t`, one octet, zero is false
    Boolean(bool),

    /// Signed 8-bit integer
    ///
    /// type tag = `b`
    Int8(i8),

    /// Unsigned 8-bit integer
    ///
    /// type tag = `B`
    UInt8(u8),

    /// Signed 16-bit integer
    ///
    /// type tag = `U`, network byte order
    Int16(i16),

    /// Unsigned 16-bit integer
    ///
    /// type tag = `u`, network byte order
    UInt16(u16),

    /// Signed 32-bit integer
    ///
    /// type tag = `I`, network byte order
    Int32(i32),

    /// Unsigned 32-bit integer
    ///
    /// type tag = `i`, network byte order
    UInt32(u32),

    /// Signed 64-bit integer
    ///
    /// type tag = `L`, network byte order
    Int64(i64),

    /// Unsigned 64-bit integer
    ///
    /// type tag = `l`, network byte order
    UInt64(u64),

    /// IEEE-754 single-precision float
    ///
    /// type tag = `f`
    Float(f32),

    /// IEEE-754 double-precision float
    ///
    /// type tag = `d`
    Double(f64),

    /// Scaled decimal: exponent octet + signed 32-bit mantissa
    ///
    /// type tag = `D`
    Decimal(Decimal),

    /// Short string: one-byte length prefix + UTF-8 bytes
    ///
    /// type tag = `s`
    ShortString(ShortStr),

    /// Long string: four-byte length prefix + bytes
    ///
    /// type tag = `S`
    LongString(LongStr),

    /// Byte array: four-byte length prefix + opaque bytes
    ///
    /// type tag = `x`
    ByteArray(LongStr),

    /// Seconds since the POSIX epoch, 64-bit
    ///
    /// type tag = `T`
    Timestamp(Timestamp),

    /// No value
    ///
    /// type tag = `V`, zero octets
    Void,

    /// Field array: length-prefixed sequence of tagged values
    ///
    /// type tag = `A`
    Array(FieldArray),

    /// Field table: length-prefixed sequence of named tagged values
    ///
    /// type tag = `F`
    Table(FieldTable),
}

impl FieldValue {
    /// The one-byte wire tag for this value.
    pub fn tag(&self) -> u8 {
        match self {
            FieldValue::Boolean(_) => b't',
            FieldValue::Int8(_) => b'b',
            FieldValue::UInt8(_) => b'B',
            FieldValue::Int16(_) => b'U',
            FieldValue::UInt16(_) => b'u',
            FieldValue::Int32(_) => b'I',
            FieldValue::UInt32(_) => b'i',
            FieldValue::Int64(_) => b'L',
            FieldValue::UInt64(_) => b'l',
            FieldValue::Float(_) => b'f',
            FieldValue::Double(_) => b'd',
            FieldValue::Decimal(_) => b'D',
            FieldValue::ShortString(_) => b's',
            FieldValue::LongString(_) => b'S',
            FieldValue::ByteArray(_) => b'x',
            FieldValue::Timestamp(_) => b'T',
            FieldValue::Void => b'V',
            FieldValue::Array(_) => b'A',
            FieldValue::Table(_) => b'F',
        }
    }

    fn payload_size(&self) -> usize {
        match self {
            FieldValue::Boolean(v) => v.size(),
            FieldValue::Int8(v) => v.size(),
            FieldValue::UInt8(v) => v.size(),
            FieldValue::Int16(v) => v.size(),
            FieldValue::UInt16(v) => v.size(),
            FieldValue::Int32(v) => v.size(),
            FieldValue::UInt32(v) => v.size(),
            FieldValue::Int64(v) => v.size(),
            FieldValue::UInt64(v) => v.size(),
            FieldValue::Float(v) => v.size(),
            FieldValue::Double(v) => v.size(),
            FieldValue::Decimal(v) => v.size(),
            FieldValue::ShortString(v) => v.size(),
            FieldValue::LongString(v) => v.size(),
            FieldValue::ByteArray(v) => v.size(),
            FieldValue::Timestamp(v) => v.size(),
            FieldValue::Void => 0,
            FieldValue::Array(v) => v.size(),
            FieldValue::Table(v) => v.size(),
        }
    }
}

impl Encode for FieldValue {
    fn size(&self) -> usize {
        1 + self.payload_size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.tag());
        match self {
            FieldValue::Boolean(v) => v.encode(buf),
            FieldValue::Int8(v) => v.encode(buf),
            FieldValue::UInt8(v) => v.encode(buf),
            FieldValue::Int16(v) => v.encode(buf),
            FieldValue::UInt16(v) => v.encode(buf),
            FieldValue::Int32(v) => v.encode(buf),
            FieldValue::UInt32(v) => v.encode(buf),
            FieldValue::Int64(v) => v.encode(buf),
            FieldValue::UInt64(v) => v.encode(buf),
            FieldValue::Float(v) => v.encode(buf),
            FieldValue::Double(v) => v.encode(buf),
            FieldValue::Decimal(v) => v.encode(buf),
            FieldValue::ShortString(v) => v.encode(buf),
            FieldValue::LongString(v) => v.encode(buf),
            FieldValue::ByteArray(v) => v.encode(buf),
            FieldValue::Timestamp(v) => v.encode(buf),
            FieldValue::Void => {}
            FieldValue::Array(v) => v.encode(buf),
            FieldValue::Table(v) => v.encode(buf),
        }
    }
}

impl Decode for FieldValue {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        let tag = cursor.get_u8()?;
        let value = match tag {
            b't' => FieldValue::Boolean(bool::decode(cursor)?),
            b'b' => FieldValue::Int8(i8::decode(cursor)?),
            b'B' => FieldValue::UInt8(u8::decode(cursor)?),
            b'U' => FieldValue::Int16(i16::decode(cursor)?),
            b'u' => FieldValue::UInt16(u16::decode(cursor)?),
            b'I' => FieldValue::Int32(i32::decode(cursor)?),
            b'i' => FieldValue::UInt32(u32::decode(cursor)?),
            b'L' => FieldValue::Int64(i64::decode(cursor)?),
            b'l' => FieldValue::UInt64(u64::decode(cursor)?),
            b'f' => FieldValue::Float(f32::decode(cursor)?),
            b'd' => FieldValue::Double(f64::decode(cursor)?),
            b'D' => FieldValue::Decimal(Decimal::decode(cursor)?),
            b's' => FieldValue::ShortString(ShortStr::decode(cursor)?),
            b'S' => FieldValue::LongString(LongStr::decode(cursor)?),
            b'x' => FieldValue::ByteArray(LongStr::decode(cursor)?),
            b'T' => FieldValue::Timestamp(Timestamp::decode(cursor)?),
            b'V' => FieldValue::Void,
            b'A' => FieldValue::Array(FieldArray::decode(cursor)?),
            b'F' => FieldValue::Table(FieldTable::decode(cursor)?),
            tag => return Err(Error::UnknownFieldType { tag }),
        };
        Ok(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<i8> for FieldValue {
    fn from(value: i8) -> Self {
        FieldValue::Int8(value)
    }
}

impl From<u8> for FieldValue {
    fn from(value: u8) -> Self {
        FieldValue::UInt8(value)
    }
}

impl From<i16> for FieldValue {
    fn from(value: i16) -> Self {
        FieldValue::Int16(value)
    }
}

impl From<u16> for FieldValue {
    fn from(value: u16) -> Self {
        FieldValue::UInt16(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int32(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::UInt32(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int64(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::UInt64(value)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        FieldValue::Float(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Double(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        FieldValue::Decimal(value)
    }
}

impl From<Timestamp> for FieldValue {
    fn from(value: Timestamp) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::LongString(LongStr::from(value))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::LongString(LongStr::from(value))
    }
}

impl From<FieldArray> for FieldValue {
    fn from(value: FieldArray) -> Self {
        FieldValue::Array(value)
    }
}

impl From<FieldTable> for FieldValue {
    fn from(value: FieldTable) -> Self {
        FieldValue::Table(value)
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::FieldValue;
    use crate::codec::{Cursor, Decode, Encode};
    use crate::primitives::{Decimal, FieldArray, FieldTable, Timestamp};
    use crate::Error;

    fn roundtrip(value: FieldValue) {
        let mut buf = BytesMut::new();
        value.encode(&mut buf);
        assert_eq!(buf.len(), value.size(), "size mismatch for {value:?}");

        let mut cursor = Cursor::new(&buf);
        let decoded = FieldValue::decode(&mut cursor).unwrap();
        assert_eq!(decoded, value);
        assert!(cursor.is_empty());

        // re-encoding the decoded value reproduces the original bytes
        let mut again = BytesMut::new();
        decoded.encode(&mut again);
        assert_eq!(again, buf);
    }

    #[test]
    fn every_tag_roundtrips() {
        let mut table = FieldTable::new();
        table.insert("x-match".try_into().unwrap(), FieldValue::from("all"));

        let values = vec![
            FieldValue::Boolean(true),
            FieldValue::Int8(-5),
            FieldValue::UInt8(200),
            FieldValue::Int16(-12345),
            FieldValue::UInt16(54321),
            FieldValue::Int32(-7),
            FieldValue::UInt32(0xdead_beef),
            FieldValue::Int64(i64::MIN),
            FieldValue::UInt64(u64::MAX),
            FieldValue::Float(1.5),
            FieldValue::Double(-2.25),
            FieldValue::Decimal(Decimal::new(3, 123_456)),
            FieldValue::ShortString("tag".try_into().unwrap()),
            FieldValue::LongString("payload".into()),
            FieldValue::ByteArray(vec![0u8, 1, 2, 255].into()),
            FieldValue::Timestamp(Timestamp(1_600_000_000)),
            FieldValue::Void,
            FieldValue::Array(FieldArray::from(vec![
                FieldValue::Int32(1),
                FieldValue::from("two"),
            ])),
            FieldValue::Table(table),
        ];
        for value in values {
            roundtrip(value);
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut cursor = Cursor::new(&[b'Z', 0, 0]);
        assert!(matches!(
            FieldValue::decode(&mut cursor),
            Err(Error::UnknownFieldType { tag: b'Z' })
        ));
    }
}
