//! The field array container

use bytes::{BufMut, BytesMut};

use crate::codec::{Cursor, Decode, Encode};
use crate::Error;

use super::FieldValue;

/// A field array: a four-byte byte-length prefix followed by a sequence
/// of tagged values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldArray(Vec<FieldValue>);

impl FieldArray {
    /// Creates an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value.
    pub fn push(&mut self, value: impl Into<FieldValue>) {
        self.0.push(value.into());
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the array holds no values.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the values in order.
    pub fn iter(&self) -> std::slice::Iter<'_, FieldValue> {
        self.0.iter()
    }
}

impl From<Vec<FieldValue>> for FieldArray {
    fn from(values: Vec<FieldValue>) -> Self {
        Self(values)
    }
}

impl From<FieldArray> for Vec<FieldValue> {
    fn from(array: FieldArray) -> Self {
        array.0
    }
}

impl<'a> IntoIterator for &'a FieldArray {
    type Item = &'a FieldValue;
    type IntoIter = std::slice::Iter<'a, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for FieldArray {
    type Item = FieldValue;
    type IntoIter = std::vec::IntoIter<FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Encode for FieldArray {
    fn size(&self) -> usize {
        4 + self.0.iter().map(Encode::size).sum::<usize>()
    }

    fn encode(&self, buf: &mut BytesMut) {
        let body: usize = self.0.iter().map(Encode::size).sum();
        buf.put_u32(body as u32);
        for value in &self.0 {
            value.encode(buf);
        }
    }
}

impl Decode for FieldArray {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        let mut region = cursor.get_region()?;
        let mut values = Vec::new();
        while !region.is_empty() {
            values.push(FieldValue::decode(&mut region)?);
        }
        Ok(Self(values))
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::FieldArray;
    use crate::codec::{Cursor, Decode, Encode};
    use crate::primitives::FieldValue;

    #[test]
    fn nested_array_roundtrip() {
        let mut inner = FieldArray::new();
        inner.push(1_i32);
        inner.push("deep");

        let mut outer = FieldArray::new();
        outer.push(true);
        outer.push(inner);

        let mut buf = BytesMut::new();
        outer.encode(&mut buf);
        assert_eq!(buf.len(), outer.size());

        let mut cursor = Cursor::new(&buf);
        assert_eq!(FieldArray::decode(&mut cursor).unwrap(), outer);
    }

    #[test]
    fn truncated_region_fails() {
        // declares 10 bytes of content but supplies 2
        let bytes = [0, 0, 0, 10, b'I', 0];
        let mut cursor = Cursor::new(&bytes);
        assert!(FieldArray::decode(&mut cursor).is_err());
    }

    #[test]
    fn empty_array_is_four_bytes() {
        let array = FieldArray::new();
        let mut buf = BytesMut::new();
        array.encode(&mut buf);
        assert_eq!(&buf[..], &[0, 0, 0, 0]);
        let _ = FieldValue::Array(array);
    }
}
