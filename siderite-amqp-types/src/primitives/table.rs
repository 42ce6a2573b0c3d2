//! The field table container
//!
//! A field table is an ordered sequence of `(short-name, tagged-value)`
//! pairs prefixed by its byte length. Name lookup is case-sensitive;
//! equality is structural (same pairs, order-insensitive), which is
//! exactly the behaviour of [`IndexMap`]'s `PartialEq`.

use bytes::{BufMut, BytesMut};
use indexmap::IndexMap;

use crate::codec::{Cursor, Decode, Encode};
use crate::Error;

use super::{FieldValue, ShortStr};

/// An insertion-ordered table of named field values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTable(IndexMap<ShortStr, FieldValue>);

impl FieldTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing and returning any previous value under
    /// the same name.
    pub fn insert(&mut self, key: ShortStr, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.0.insert(key, value.into())
    }

    /// Looks up a value by name. Comparison is case-sensitive.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    /// Removes a value by name, preserving the order of the remaining
    /// entries.
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.0.shift_remove(key)
    }

    /// Whether the table holds a value under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> indexmap::map::Iter<'_, ShortStr, FieldValue> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a FieldTable {
    type Item = (&'a ShortStr, &'a FieldValue);
    type IntoIter = indexmap::map::Iter<'a, ShortStr, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<(ShortStr, FieldValue)> for FieldTable {
    fn from_iter<I: IntoIterator<Item = (ShortStr, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Encode for FieldTable {
    fn size(&self) -> usize {
        4 + self
            .0
            .iter()
            .map(|(key, value)| key.size() + value.size())
            .sum::<usize>()
    }

    fn encode(&self, buf: &mut BytesMut) {
        let body: usize = self
            .0
            .iter()
            .map(|(key, value)| key.size() + value.size())
            .sum();
        buf.put_u32(body as u32);
        for (key, value) in &self.0 {
            key.encode(buf);
            value.encode(buf);
        }
    }
}

impl Decode for FieldTable {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        let mut region = cursor.get_region()?;
        let mut map = IndexMap::new();
        while !region.is_empty() {
            let key = ShortStr::decode(&mut region)?;
            let value = FieldValue::decode(&mut region)?;
            map.insert(key, value);
        }
        Ok(Self(map))
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::FieldTable;
    use crate::codec::{Cursor, Decode, Encode};
    use crate::primitives::FieldValue;

    fn key(name: &str) -> crate::primitives::ShortStr {
        name.try_into().unwrap()
    }

    #[test]
    fn nested_table_roundtrip() {
        let mut capabilities = FieldTable::new();
        capabilities.insert(key("basic.nack"), true);
        capabilities.insert(key("publisher_confirms"), true);

        let mut table = FieldTable::new();
        table.insert(key("product"), "siderite");
        table.insert(key("capabilities"), capabilities);
        table.insert(key("priority"), 5_u8);

        let mut buf = BytesMut::new();
        table.encode(&mut buf);
        assert_eq!(buf.len(), table.size());

        let mut cursor = Cursor::new(&buf);
        let decoded = FieldTable::decode(&mut cursor).unwrap();
        assert_eq!(decoded, table);
        assert!(cursor.is_empty());
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let mut table = FieldTable::new();
        table.insert(key("Name"), "value");
        assert!(table.get("Name").is_some());
        assert!(table.get("name").is_none());
    }

    #[test]
    fn equality_is_structural() {
        let mut a = FieldTable::new();
        a.insert(key("one"), 1_i32);
        a.insert(key("two"), 2_i32);

        let mut b = FieldTable::new();
        b.insert(key("two"), 2_i32);
        b.insert(key("one"), 1_i32);

        // same pairs, different insertion order
        assert_eq!(a, b);

        b.insert(key("two"), 3_i32);
        assert_ne!(a, b);
    }

    #[test]
    fn insertion_order_survives_roundtrip() {
        let mut table = FieldTable::new();
        table.insert(key("z"), 1_i32);
        table.insert(key("a"), 2_i32);

        let mut buf = BytesMut::new();
        table.encode(&mut buf);
        let decoded = FieldTable::decode(&mut Cursor::new(&buf)).unwrap();

        let keys: Vec<&str> = decoded.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["z", "a"]);
        let _ = FieldValue::Table(decoded);
    }
}
