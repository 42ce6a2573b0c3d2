//! The timestamp field type

use bytes::{BufMut, BytesMut};

use crate::codec::{Cursor, Decode, Encode};
use crate::Error;

/// A point in time: whole seconds since the POSIX epoch, 64-bit on the
/// wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Seconds since the POSIX epoch.
    pub fn seconds(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Timestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Timestamp> for u64 {
    fn from(value: Timestamp) -> Self {
        value.0
    }
}

impl Encode for Timestamp {
    fn size(&self) -> usize {
        8
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.0);
    }
}

impl Decode for Timestamp {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self(cursor.get_u64()?))
    }
}
