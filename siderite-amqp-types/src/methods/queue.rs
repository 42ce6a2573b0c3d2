//! Methods of the Queue class

use bytes::{BufMut, BytesMut};

use crate::codec::{Cursor, Decode, Encode};
use crate::primitives::{FieldTable, ShortStr};
use crate::Error;

/// Creates a queue, or verifies an existing one when `passive`. An empty
/// name asks the broker to generate one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Declare {
    /// Reserved, must be zero
    pub reserved1: u16,

    /// Queue name, possibly empty
    pub queue: ShortStr,

    /// Only check that the queue exists
    pub passive: bool,

    /// Survive a broker restart
    pub durable: bool,

    /// Only accessible on this connection, deleted when it closes
    pub exclusive: bool,

    /// Delete when the last consumer cancels
    pub auto_delete: bool,

    /// Do not send a reply
    pub nowait: bool,

    /// Extension arguments
    pub arguments: FieldTable,
}

impl Encode for Declare {
    fn size(&self) -> usize {
        2 + self.queue.size() + 1 + self.arguments.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.reserved1);
        self.queue.encode(buf);
        let mut bits = 0u8;
        if self.passive {
            bits |= 1 << 0;
        }
        if self.durable {
            bits |= 1 << 1;
        }
        if self.exclusive {
            bits |= 1 << 2;
        }
        if self.auto_delete {
            bits |= 1 << 3;
        }
        if self.nowait {
            bits |= 1 << 4;
        }
        buf.put_u8(bits);
        self.arguments.encode(buf);
    }
}

impl Decode for Declare {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        let reserved1 = cursor.get_u16()?;
        let queue = ShortStr::decode(cursor)?;
        let bits = cursor.get_u8()?;
        Ok(Self {
            reserved1,
            queue,
            passive: bits & (1 << 0) != 0,
            durable: bits & (1 << 1) != 0,
            exclusive: bits & (1 << 2) != 0,
            auto_delete: bits & (1 << 3) != 0,
            nowait: bits & (1 << 4) != 0,
            arguments: FieldTable::decode(cursor)?,
        })
    }
}

/// Confirms a queue declaration with the resolved name and counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclareOk {
    /// The declared queue's name
    pub queue: ShortStr,

    /// Number of messages currently in the queue
    pub message_count: u32,

    /// Number of active consumers on the queue
    pub consumer_count: u32,
}

impl Encode for DeclareOk {
    fn size(&self) -> usize {
        self.queue.size() + 8
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.queue.encode(buf);
        buf.put_u32(self.message_count);
        buf.put_u32(self.consumer_count);
    }
}

impl Decode for DeclareOk {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            queue: ShortStr::decode(cursor)?,
            message_count: cursor.get_u32()?,
            consumer_count: cursor.get_u32()?,
        })
    }
}

/// Binds a queue to an exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bind {
    /// Reserved, must be zero
    pub reserved1: u16,

    /// Queue to bind
    pub queue: ShortStr,

    /// Exchange to bind to
    pub exchange: ShortStr,

    /// Routing key of the binding
    pub routing_key: ShortStr,

    /// Do not send a reply
    pub nowait: bool,

    /// Extension arguments
    pub arguments: FieldTable,
}

impl Encode for Bind {
    fn size(&self) -> usize {
        2 + self.queue.size()
            + self.exchange.size()
            + self.routing_key.size()
            + 1
            + self.arguments.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.reserved1);
        self.queue.encode(buf);
        self.exchange.encode(buf);
        self.routing_key.encode(buf);
        buf.put_u8(u8::from(self.nowait));
        self.arguments.encode(buf);
    }
}

impl Decode for Bind {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            reserved1: cursor.get_u16()?,
            queue: ShortStr::decode(cursor)?,
            exchange: ShortStr::decode(cursor)?,
            routing_key: ShortStr::decode(cursor)?,
            nowait: cursor.get_u8()? & 0x01 != 0,
            arguments: FieldTable::decode(cursor)?,
        })
    }
}

/// Confirms a queue binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindOk;

impl Encode for BindOk {
    fn size(&self) -> usize {
        0
    }

    fn encode(&self, _buf: &mut BytesMut) {}
}

impl Decode for BindOk {
    fn decode(_cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self)
    }
}

/// Discards all messages in a queue that are not awaiting
/// acknowledgement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Purge {
    /// Reserved, must be zero
    pub reserved1: u16,

    /// Queue to purge
    pub queue: ShortStr,

    /// Do not send a reply
    pub nowait: bool,
}

impl Encode for Purge {
    fn size(&self) -> usize {
        2 + self.queue.size() + 1
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.reserved1);
        self.queue.encode(buf);
        buf.put_u8(u8::from(self.nowait));
    }
}

impl Decode for Purge {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            reserved1: cursor.get_u16()?,
            queue: ShortStr::decode(cursor)?,
            nowait: cursor.get_u8()? & 0x01 != 0,
        })
    }
}

/// Confirms a purge with the number of messages discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeOk {
    /// Number of messages purged
    pub message_count: u32,
}

impl Encode for PurgeOk {
    fn size(&self) -> usize {
        4
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.message_count);
    }
}

impl Decode for PurgeOk {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            message_count: cursor.get_u32()?,
        })
    }
}

/// Deletes a queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delete {
    /// Reserved, must be zero
    pub reserved1: u16,

    /// Queue to delete
    pub queue: ShortStr,

    /// Only delete if the queue has no consumers
    pub if_unused: bool,

    /// Only delete if the queue is empty
    pub if_empty: bool,

    /// Do not send a reply
    pub nowait: bool,
}

impl Encode for Delete {
    fn size(&self) -> usize {
        2 + self.queue.size() + 1
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.reserved1);
        self.queue.encode(buf);
        let mut bits = 0u8;
        if self.if_unused {
            bits |= 1 << 0;
        }
        if self.if_empty {
            bits |= 1 << 1;
        }
        if self.nowait {
            bits |= 1 << 2;
        }
        buf.put_u8(bits);
    }
}

impl Decode for Delete {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        let reserved1 = cursor.get_u16()?;
        let queue = ShortStr::decode(cursor)?;
        let bits = cursor.get_u8()?;
        Ok(Self {
            reserved1,
            queue,
            if_unused: bits & (1 << 0) != 0,
            if_empty: bits & (1 << 1) != 0,
            nowait: bits & (1 << 2) != 0,
        })
    }
}

/// Confirms a queue deletion with the number of messages discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOk {
    /// Number of messages deleted along with the queue
    pub message_count: u32,
}

impl Encode for DeleteOk {
    fn size(&self) -> usize {
        4
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.message_count);
    }
}

impl Decode for DeleteOk {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            message_count: cursor.get_u32()?,
        })
    }
}

/// Removes a queue binding. This method has no `nowait` bit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unbind {
    /// Reserved, must be zero
    pub reserved1: u16,

    /// Queue to unbind
    pub queue: ShortStr,

    /// Exchange to unbind from
    pub exchange: ShortStr,

    /// Routing key of the binding
    pub routing_key: ShortStr,

    /// Extension arguments
    pub arguments: FieldTable,
}

impl Encode for Unbind {
    fn size(&self) -> usize {
        2 + self.queue.size()
            + self.exchange.size()
            + self.routing_key.size()
            + self.arguments.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.reserved1);
        self.queue.encode(buf);
        self.exchange.encode(buf);
        self.routing_key.encode(buf);
        self.arguments.encode(buf);
    }
}

impl Decode for Unbind {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            reserved1: cursor.get_u16()?,
            queue: ShortStr::decode(cursor)?,
            exchange: ShortStr::decode(cursor)?,
            routing_key: ShortStr::decode(cursor)?,
            arguments: FieldTable::decode(cursor)?,
        })
    }
}

/// Confirms removal of a queue binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnbindOk;

impl Encode for UnbindOk {
    fn size(&self) -> usize {
        0
    }

    fn encode(&self, _buf: &mut BytesMut) {}
}

impl Decode for UnbindOk {
    fn decode(_cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::{Declare, DeclareOk};
    use crate::codec::{Cursor, Decode, Encode};
    use crate::primitives::FieldTable;

    #[test]
    fn declare_roundtrip() {
        let declare = Declare {
            reserved1: 0,
            queue: "q".try_into().unwrap(),
            passive: false,
            durable: true,
            exclusive: false,
            auto_delete: false,
            nowait: false,
            arguments: FieldTable::new(),
        };

        let mut buf = BytesMut::new();
        declare.encode(&mut buf);
        assert_eq!(buf.len(), declare.size());
        // durable is bit 1 of the flag octet
        assert_eq!(buf[2 + 2], 1 << 1);
        assert_eq!(Declare::decode(&mut Cursor::new(&buf)).unwrap(), declare);
    }

    #[test]
    fn declare_ok_roundtrip() {
        let declare_ok = DeclareOk {
            queue: "q".try_into().unwrap(),
            message_count: 0,
            consumer_count: 0,
        };
        let mut buf = BytesMut::new();
        declare_ok.encode(&mut buf);
        assert_eq!(buf.len(), declare_ok.size());
        assert_eq!(
            DeclareOk::decode(&mut Cursor::new(&buf)).unwrap(),
            declare_ok
        );
    }
}
