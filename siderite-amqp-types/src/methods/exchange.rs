//! Methods of the Exchange class

use bytes::{BufMut, BytesMut};

use crate::codec::{Cursor, Decode, Encode};
use crate::primitives::{FieldTable, ShortStr};
use crate::Error;

/// Creates an exchange, or verifies an existing one when `passive`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Declare {
    /// Reserved, must be zero
    pub reserved1: u16,

    /// Exchange name
    pub exchange: ShortStr,

    /// Exchange type: `fanout`, `direct`, `topic` or `headers`
    pub kind: ShortStr,

    /// Only check that the exchange exists
    pub passive: bool,

    /// Survive a broker restart
    pub durable: bool,

    /// Delete when the last binding is removed
    pub auto_delete: bool,

    /// Only bindable from other exchanges, not publishable
    pub internal: bool,

    /// Do not send a reply
    pub nowait: bool,

    /// Extension arguments
    pub arguments: FieldTable,
}

impl Encode for Declare {
    fn size(&self) -> usize {
        2 + self.exchange.size() + self.kind.size() + 1 + self.arguments.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.reserved1);
        self.exchange.encode(buf);
        self.kind.encode(buf);
        let mut bits = 0u8;
        if self.passive {
            bits |= 1 << 0;
        }
        if self.durable {
            bits |= 1 << 1;
        }
        if self.auto_delete {
            bits |= 1 << 2;
        }
        if self.internal {
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
        let exchange = ShortStr::decode(cursor)?;
        let kind = ShortStr::decode(cursor)?;
        let bits = cursor.get_u8()?;
        Ok(Self {
            reserved1,
            exchange,
            kind,
            passive: bits & (1 << 0) != 0,
            durable: bits & (1 << 1) != 0,
            auto_delete: bits & (1 << 2) != 0,
            internal: bits & (1 << 3) != 0,
            nowait: bits & (1 << 4) != 0,
            arguments: FieldTable::decode(cursor)?,
        })
    }
}

/// Confirms an exchange declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeclareOk;

impl Encode for DeclareOk {
    fn size(&self) -> usize {
        0
    }

    fn encode(&self, _buf: &mut BytesMut) {}
}

impl Decode for DeclareOk {
    fn decode(_cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self)
    }
}

/// Deletes an exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delete {
    /// Reserved, must be zero
    pub reserved1: u16,

    /// Exchange name
    pub exchange: ShortStr,

    /// Only delete if the exchange has no bindings
    pub if_unused: bool,

    /// Do not send a reply
    pub nowait: bool,
}

impl Encode for Delete {
    fn size(&self) -> usize {
        2 + self.exchange.size() + 1
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.reserved1);
        self.exchange.encode(buf);
        let mut bits = 0u8;
        if self.if_unused {
            bits |= 1 << 0;
        }
        if self.nowait {
            bits |= 1 << 1;
        }
        buf.put_u8(bits);
    }
}

impl Decode for Delete {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        let reserved1 = cursor.get_u16()?;
        let exchange = ShortStr::decode(cursor)?;
        let bits = cursor.get_u8()?;
        Ok(Self {
            reserved1,
            exchange,
            if_unused: bits & (1 << 0) != 0,
            nowait: bits & (1 << 1) != 0,
        })
    }
}

/// Confirms an exchange deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOk;

impl Encode for DeleteOk {
    fn size(&self) -> usize {
        0
    }

    fn encode(&self, _buf: &mut BytesMut) {}
}

impl Decode for DeleteOk {
    fn decode(_cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self)
    }
}

/// Binds an exchange to another exchange (RabbitMQ extension).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bind {
    /// Reserved, must be zero
    pub reserved1: u16,

    /// Destination exchange receiving forwarded messages
    pub destination: ShortStr,

    /// Source exchange the binding is installed on
    pub source: ShortStr,

    /// Routing key of the binding
    pub routing_key: ShortStr,

    /// Do not send a reply
    pub nowait: bool,

    /// Extension arguments
    pub arguments: FieldTable,
}

impl Encode for Bind {
    fn size(&self) -> usize {
        2 + self.destination.size()
            + self.source.size()
            + self.routing_key.size()
            + 1
            + self.arguments.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.reserved1);
        self.destination.encode(buf);
        self.source.encode(buf);
        self.routing_key.encode(buf);
        buf.put_u8(u8::from(self.nowait));
        self.arguments.encode(buf);
    }
}

impl Decode for Bind {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            reserved1: cursor.get_u16()?,
            destination: ShortStr::decode(cursor)?,
            source: ShortStr::decode(cursor)?,
            routing_key: ShortStr::decode(cursor)?,
            nowait: cursor.get_u8()? & 0x01 != 0,
            arguments: FieldTable::decode(cursor)?,
        })
    }
}

/// Confirms an exchange-to-exchange binding.
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

/// Removes an exchange-to-exchange binding (RabbitMQ extension).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unbind {
    /// Reserved, must be zero
    pub reserved1: u16,

    /// Destination exchange of the binding
    pub destination: ShortStr,

    /// Source exchange of the binding
    pub source: ShortStr,

    /// Routing key of the binding
    pub routing_key: ShortStr,

    /// Do not send a reply
    pub nowait: bool,

    /// Extension arguments
    pub arguments: FieldTable,
}

impl Encode for Unbind {
    fn size(&self) -> usize {
        2 + self.destination.size()
            + self.source.size()
            + self.routing_key.size()
            + 1
            + self.arguments.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.reserved1);
        self.destination.encode(buf);
        self.source.encode(buf);
        self.routing_key.encode(buf);
        buf.put_u8(u8::from(self.nowait));
        self.arguments.encode(buf);
    }
}

impl Decode for Unbind {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            reserved1: cursor.get_u16()?,
            destination: ShortStr::decode(cursor)?,
            source: ShortStr::decode(cursor)?,
            routing_key: ShortStr::decode(cursor)?,
            nowait: cursor.get_u8()? & 0x01 != 0,
            arguments: FieldTable::decode(cursor)?,
        })
    }
}

/// Confirms removal of an exchange-to-exchange binding.
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

    use super::Declare;
    use crate::codec::{Cursor, Decode, Encode};
    use crate::primitives::FieldTable;

    #[test]
    fn declare_packs_bits_into_one_octet() {
        let declare = Declare {
            reserved1: 0,
            exchange: "logs".try_into().unwrap(),
            kind: "topic".try_into().unwrap(),
            passive: false,
            durable: true,
            auto_delete: false,
            internal: false,
            nowait: true,
            arguments: FieldTable::new(),
        };

        let mut buf = BytesMut::new();
        declare.encode(&mut buf);
        assert_eq!(buf.len(), declare.size());

        // octet after reserved1 + "logs" + "topic": durable | nowait
        let bits = buf[2 + 5 + 6];
        assert_eq!(bits, (1 << 1) | (1 << 4));

        assert_eq!(Declare::decode(&mut Cursor::new(&buf)).unwrap(), declare);
    }
}
