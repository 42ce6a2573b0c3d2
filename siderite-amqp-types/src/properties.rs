//! Content-header envelope metadata
//!
//! A content header carries a 16-bit flag bitmap identifying which of the
//! fourteen optional properties are present, followed by only the present
//! values in bitmap order.

use bytes::{BufMut, BytesMut};

use crate::codec::{Cursor, Decode, Encode};
use crate::primitives::{FieldTable, ShortStr, Timestamp};
use crate::Error;

mod flag {
    pub const CONTENT_TYPE: u16 = 1 << 15;
    pub const CONTENT_ENCODING: u16 = 1 << 14;
    pub const HEADERS: u16 = 1 << 13;
    pub const DELIVERY_MODE: u16 = 1 << 12;
    pub const PRIORITY: u16 = 1 << 11;
    pub const CORRELATION_ID: u16 = 1 << 10;
    pub const REPLY_TO: u16 = 1 << 9;
    pub const EXPIRATION: u16 = 1 << 8;
    pub const MESSAGE_ID: u16 = 1 << 7;
    pub const TIMESTAMP: u16 = 1 << 6;
    pub const MESSAGE_TYPE: u16 = 1 << 5;
    pub const USER_ID: u16 = 1 << 4;
    pub const APP_ID: u16 = 1 << 3;
    pub const CLUSTER_ID: u16 = 1 << 2;
}

/// Delivery mode values for [`BasicProperties::delivery_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// The message may be lost if the broker restarts.
    Transient = 1,

    /// The message survives a broker restart if the queue is durable.
    Persistent = 2,
}

/// The optional properties of a message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicProperties {
    /// MIME content type
    pub content_type: Option<ShortStr>,

    /// MIME content encoding
    pub content_encoding: Option<ShortStr>,

    /// Application headers table
    pub headers: Option<FieldTable>,

    /// Non-persistent (1) or persistent (2)
    pub delivery_mode: Option<u8>,

    /// Message priority, 0 to 9
    pub priority: Option<u8>,

    /// Application correlation identifier
    pub correlation_id: Option<ShortStr>,

    /// Address to reply to
    pub reply_to: Option<ShortStr>,

    /// Message expiration specification
    pub expiration: Option<ShortStr>,

    /// Application message identifier
    pub message_id: Option<ShortStr>,

    /// Message timestamp
    pub timestamp: Option<Timestamp>,

    /// Message type name
    pub message_type: Option<ShortStr>,

    /// Creating user id
    pub user_id: Option<ShortStr>,

    /// Creating application id
    pub app_id: Option<ShortStr>,

    /// Intra-cluster routing identifier
    pub cluster_id: Option<ShortStr>,
}

impl BasicProperties {
    /// The flag bitmap describing which properties are present.
    pub fn flags(&self) -> u16 {
        let mut flags = 0;
        if self.content_type.is_some() {
            flags |= flag::CONTENT_TYPE;
        }
        if self.content_encoding.is_some() {
            flags |= flag::CONTENT_ENCODING;
        }
        if self.headers.is_some() {
            flags |= flag::HEADERS;
        }
        if self.delivery_mode.is_some() {
            flags |= flag::DELIVERY_MODE;
        }
        if self.priority.is_some() {
            flags |= flag::PRIORITY;
        }
        if self.correlation_id.is_some() {
            flags |= flag::CORRELATION_ID;
        }
        if self.reply_to.is_some() {
            flags |= flag::REPLY_TO;
        }
        if self.expiration.is_some() {
            flags |= flag::EXPIRATION;
        }
        if self.message_id.is_some() {
            flags |= flag::MESSAGE_ID;
        }
        if self.timestamp.is_some() {
            flags |= flag::TIMESTAMP;
        }
        if self.message_type.is_some() {
            flags |= flag::MESSAGE_TYPE;
        }
        if self.user_id.is_some() {
            flags |= flag::USER_ID;
        }
        if self.app_id.is_some() {
            flags |= flag::APP_ID;
        }
        if self.cluster_id.is_some() {
            flags |= flag::CLUSTER_ID;
        }
        flags
    }
}

fn opt_size<T: Encode>(value: &Option<T>) -> usize {
    value.as_ref().map_or(0, Encode::size)
}

fn opt_encode<T: Encode>(value: &Option<T>, buf: &mut BytesMut) {
    if let Some(value) = value {
        value.encode(buf);
    }
}

fn opt_decode<T: Decode>(
    flags: u16,
    bit: u16,
    cursor: &mut Cursor<'_>,
) -> Result<Option<T>, Error> {
    if flags & bit != 0 {
        Ok(Some(T::decode(cursor)?))
    } else {
        Ok(None)
    }
}

impl Encode for BasicProperties {
    fn size(&self) -> usize {
        2 + opt_size(&self.content_type)
            + opt_size(&self.content_encoding)
            + opt_size(&self.headers)
            + opt_size(&self.delivery_mode)
            + opt_size(&self.priority)
            + opt_size(&self.correlation_id)
            + opt_size(&self.reply_to)
            + opt_size(&self.expiration)
            + opt_size(&self.message_id)
            + opt_size(&self.timestamp)
            + opt_size(&self.message_type)
            + opt_size(&self.user_id)
            + opt_size(&self.app_id)
            + opt_size(&self.cluster_id)
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.flags());
        opt_encode(&self.content_type, buf);
        opt_encode(&self.content_encoding, buf);
        opt_encode(&self.headers, buf);
        opt_encode(&self.delivery_mode, buf);
        opt_encode(&self.priority, buf);
        opt_encode(&self.correlation_id, buf);
        opt_encode(&self.reply_to, buf);
        opt_encode(&self.expiration, buf);
        opt_encode(&self.message_id, buf);
        opt_encode(&self.timestamp, buf);
        opt_encode(&self.message_type, buf);
        opt_encode(&self.user_id, buf);
        opt_encode(&self.app_id, buf);
        opt_encode(&self.cluster_id, buf);
    }
}

impl Decode for BasicProperties {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        let flags = cursor.get_u16()?;
        Ok(Self {
            content_type: opt_decode(flags, flag::CONTENT_TYPE, cursor)?,
            content_encoding: opt_decode(flags, flag::CONTENT_ENCODING, cursor)?,
            headers: opt_decode(flags, flag::HEADERS, cursor)?,
            delivery_mode: opt_decode(flags, flag::DELIVERY_MODE, cursor)?,
            priority: opt_decode(flags, flag::PRIORITY, cursor)?,
            correlation_id: opt_decode(flags, flag::CORRELATION_ID, cursor)?,
            reply_to: opt_decode(flags, flag::REPLY_TO, cursor)?,
            expiration: opt_decode(flags, flag::EXPIRATION, cursor)?,
            message_id: opt_decode(flags, flag::MESSAGE_ID, cursor)?,
            timestamp: opt_decode(flags, flag::TIMESTAMP, cursor)?,
            message_type: opt_decode(flags, flag::MESSAGE_TYPE, cursor)?,
            user_id: opt_decode(flags, flag::USER_ID, cursor)?,
            app_id: opt_decode(flags, flag::APP_ID, cursor)?,
            cluster_id: opt_decode(flags, flag::CLUSTER_ID, cursor)?,
        })
    }
}

/// The payload of a content-header frame: the owning class, a declared
/// body size and the optional properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentHeader {
    /// Class id of the method that introduced the content (always the
    /// Basic class for this engine).
    pub class_id: u16,

    /// Reserved on the wire, must be zero.
    pub weight: u16,

    /// Declared byte length of the body that follows.
    pub body_size: u64,

    /// The optional message properties.
    pub properties: BasicProperties,
}

impl ContentHeader {
    /// Creates a content header for the Basic class.
    pub fn basic(body_size: u64, properties: BasicProperties) -> Self {
        Self {
            class_id: crate::methods::class::BASIC,
            weight: 0,
            body_size,
            properties,
        }
    }
}

impl Encode for ContentHeader {
    fn size(&self) -> usize {
        12 + self.properties.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.class_id);
        buf.put_u16(self.weight);
        buf.put_u64(self.body_size);
        self.properties.encode(buf);
    }
}

impl Decode for ContentHeader {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            class_id: cursor.get_u16()?,
            weight: cursor.get_u16()?,
            body_size: cursor.get_u64()?,
            properties: BasicProperties::decode(cursor)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::{BasicProperties, ContentHeader};
    use crate::codec::{Cursor, Decode, Encode};
    use crate::primitives::{FieldTable, Timestamp};

    #[test]
    fn empty_properties_are_two_bytes() {
        let properties = BasicProperties::default();
        assert_eq!(properties.flags(), 0);

        let mut buf = BytesMut::new();
        properties.encode(&mut buf);
        assert_eq!(&buf[..], &[0, 0]);
    }

    #[test]
    fn present_properties_roundtrip() {
        let mut headers = FieldTable::new();
        headers.insert("attempt".try_into().unwrap(), 3_i32);

        let properties = BasicProperties {
            content_type: Some("application/json".try_into().unwrap()),
            headers: Some(headers),
            delivery_mode: Some(2),
            priority: Some(5),
            timestamp: Some(Timestamp(1_700_000_000)),
            app_id: Some("worker".try_into().unwrap()),
            ..Default::default()
        };

        let mut buf = BytesMut::new();
        properties.encode(&mut buf);
        assert_eq!(buf.len(), properties.size());

        let decoded = BasicProperties::decode(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, properties);
    }

    #[test]
    fn content_header_roundtrip() {
        let header = ContentHeader::basic(
            10_000,
            BasicProperties {
                delivery_mode: Some(1),
                ..Default::default()
            },
        );

        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), header.size());
        assert_eq!(header.class_id, 60);

        let decoded = ContentHeader::decode(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, header);
    }
}
