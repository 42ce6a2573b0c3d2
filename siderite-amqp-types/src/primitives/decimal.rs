//! The scaled decimal field type

use bytes::{BufMut, BytesMut};

use crate::codec::{Cursor, Decode, Encode};
use crate::Error;

/// A scaled decimal: one exponent byte followed by a signed 32-bit
/// mantissa. The represented value is `mantissa / 10^exponent`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Decimal {
    /// Number of decimal digits after the point
    pub exponent: u8,

    /// The unscaled value
    pub mantissa: i32,
}

impl Decimal {
    /// Creates a decimal with the given exponent and mantissa.
    pub fn new(exponent: u8, mantissa: i32) -> Self {
        Self { exponent, mantissa }
    }
}

impl Encode for Decimal {
    fn size(&self) -> usize {
        5
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.exponent);
        buf.put_i32(self.mantissa);
    }
}

impl Decode for Decimal {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        let exponent = cursor.get_u8()?;
        let mantissa = cursor.get_i32()?;
        Ok(Self { exponent, mantissa })
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::Decimal;
    use crate::codec::{Cursor, Decode, Encode};

    #[test]
    fn roundtrip() {
        let value = Decimal::new(2, -31415);
        let mut buf = BytesMut::new();
        value.encode(&mut buf);
        assert_eq!(buf.len(), value.size());

        let mut cursor = Cursor::new(&buf);
        assert_eq!(Decimal::decode(&mut cursor).unwrap(), value);
    }
}
