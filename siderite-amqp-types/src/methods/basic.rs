//! Methods of the Basic class
//!
//! `publish`, `deliver`, `get-ok` and `return` announce content: each is
//! followed on the wire by a content-header frame and body frames.

use bytes::{BufMut, BytesMut};

use crate::codec::{Cursor, Decode, Encode};
use crate::primitives::ShortStr;
use crate::Error;

use crate::primitives::FieldTable;

/// Sets the prefetch window for the channel or, with `global`, for the
/// whole connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Qos {
    /// Prefetch window in octets, 0 meaning no limit
    pub prefetch_size: u32,

    /// Prefetch window in messages, 0 meaning no limit
    pub prefetch_count: u16,

    /// Apply to the whole connection rather than this channel
    pub global: bool,
}

impl Encode for Qos {
    fn size(&self) -> usize {
        7
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.prefetch_size);
        buf.put_u16(self.prefetch_count);
        buf.put_u8(u8::from(self.global));
    }
}

impl Decode for Qos {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            prefetch_size: cursor.get_u32()?,
            prefetch_count: cursor.get_u16()?,
            global: cursor.get_u8()? & 0x01 != 0,
        })
    }
}

/// Confirms a qos change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QosOk;

impl Encode for QosOk {
    fn size(&self) -> usize {
        0
    }

    fn encode(&self, _buf: &mut BytesMut) {}
}

impl Decode for QosOk {
    fn decode(_cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self)
    }
}

/// Starts a consumer on a queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Consume {
    /// Reserved, must be zero
    pub reserved1: u16,

    /// Queue to consume from
    pub queue: ShortStr,

    /// Consumer tag, empty to let the broker generate one
    pub consumer_tag: ShortStr,

    /// Do not deliver messages published on this connection
    pub no_local: bool,

    /// The broker considers messages acknowledged once delivered
    pub no_ack: bool,

    /// Request exclusive access to the queue
    pub exclusive: bool,

    /// Do not send a reply
    pub nowait: bool,

    /// Extension arguments
    pub arguments: FieldTable,
}

impl Encode for Consume {
    fn size(&self) -> usize {
        2 + self.queue.size() + self.consumer_tag.size() + 1 + self.arguments.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.reserved1);
        self.queue.encode(buf);
        self.consumer_tag.encode(buf);
        let mut bits = 0u8;
        if self.no_local {
            bits |= 1 << 0;
        }
        if self.no_ack {
            bits |= 1 << 1;
        }
        if self.exclusive {
            bits |= 1 << 2;
        }
        if self.nowait {
            bits |= 1 << 3;
        }
        buf.put_u8(bits);
        self.arguments.encode(buf);
    }
}

impl Decode for Consume {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        let reserved1 = cursor.get_u16()?;
        let queue = ShortStr::decode(cursor)?;
        let consumer_tag = ShortStr::decode(cursor)?;
        let bits = cursor.get_u8()?;
        Ok(Self {
            reserved1,
            queue,
            consumer_tag,
            no_local: bits & (1 << 0) != 0,
            no_ack: bits & (1 << 1) != 0,
            exclusive: bits & (1 << 2) != 0,
            nowait: bits & (1 << 3) != 0,
            arguments: FieldTable::decode(cursor)?,
        })
    }
}

/// Confirms a consumer start with its (possibly broker-assigned) tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumeOk {
    /// The consumer's tag on this channel
    pub consumer_tag: ShortStr,
}

impl Encode for ConsumeOk {
    fn size(&self) -> usize {
        self.consumer_tag.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.consumer_tag.encode(buf);
    }
}

impl Decode for ConsumeOk {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            consumer_tag: ShortStr::decode(cursor)?,
        })
    }
}

/// Cancels a consumer. Also sent by the broker when a consumer is
/// cancelled out from under the client (consumer-cancel-notify).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cancel {
    /// Tag of the consumer to cancel
    pub consumer_tag: ShortStr,

    /// Do not send a reply
    pub nowait: bool,
}

impl Encode for Cancel {
    fn size(&self) -> usize {
        self.consumer_tag.size() + 1
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.consumer_tag.encode(buf);
        buf.put_u8(u8::from(self.nowait));
    }
}

impl Decode for Cancel {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            consumer_tag: ShortStr::decode(cursor)?,
            nowait: cursor.get_u8()? & 0x01 != 0,
        })
    }
}

/// Confirms a consumer cancellation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CancelOk {
    /// Tag of the cancelled consumer
    pub consumer_tag: ShortStr,
}

impl Encode for CancelOk {
    fn size(&self) -> usize {
        self.consumer_tag.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.consumer_tag.encode(buf);
    }
}

impl Decode for CancelOk {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            consumer_tag: ShortStr::decode(cursor)?,
        })
    }
}

/// Publishes a message to an exchange. Asynchronous; content frames
/// follow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Publish {
    /// Reserved, must be zero
    pub reserved1: u16,

    /// Exchange to publish to, empty for the default exchange
    pub exchange: ShortStr,

    /// Routing key
    pub routing_key: ShortStr,

    /// Return the message if it cannot be routed to a queue
    pub mandatory: bool,

    /// Return the message if it cannot be delivered immediately
    pub immediate: bool,
}

impl Encode for Publish {
    fn size(&self) -> usize {
        2 + self.exchange.size() + self.routing_key.size() + 1
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.reserved1);
        self.exchange.encode(buf);
        self.routing_key.encode(buf);
        let mut bits = 0u8;
        if self.mandatory {
            bits |= 1 << 0;
        }
        if self.immediate {
            bits |= 1 << 1;
        }
        buf.put_u8(bits);
    }
}

impl Decode for Publish {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        let reserved1 = cursor.get_u16()?;
        let exchange = ShortStr::decode(cursor)?;
        let routing_key = ShortStr::decode(cursor)?;
        let bits = cursor.get_u8()?;
        Ok(Self {
            reserved1,
            exchange,
            routing_key,
            mandatory: bits & (1 << 0) != 0,
            immediate: bits & (1 << 1) != 0,
        })
    }
}

/// Returns an unroutable message to its publisher. Content frames
/// follow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Return {
    /// Reply code explaining why the message was returned
    pub reply_code: u16,

    /// Human-readable reply text
    pub reply_text: ShortStr,

    /// Exchange the message was published to
    pub exchange: ShortStr,

    /// Routing key the message was published with
    pub routing_key: ShortStr,
}

impl Encode for Return {
    fn size(&self) -> usize {
        2 + self.reply_text.size() + self.exchange.size() + self.routing_key.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.reply_code);
        self.reply_text.encode(buf);
        self.exchange.encode(buf);
        self.routing_key.encode(buf);
    }
}

impl Decode for Return {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            reply_code: cursor.get_u16()?,
            reply_text: ShortStr::decode(cursor)?,
            exchange: ShortStr::decode(cursor)?,
            routing_key: ShortStr::decode(cursor)?,
        })
    }
}

/// Delivers a message to a consumer. Content frames follow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Deliver {
    /// Tag of the consumer receiving the message
    pub consumer_tag: ShortStr,

    /// Broker-assigned delivery tag, monotonic per channel
    pub delivery_tag: u64,

    /// The message has been delivered before
    pub redelivered: bool,

    /// Exchange the message was published to
    pub exchange: ShortStr,

    /// Routing key the message was published with
    pub routing_key: ShortStr,
}

impl Encode for Deliver {
    fn size(&self) -> usize {
        self.consumer_tag.size() + 8 + 1 + self.exchange.size() + self.routing_key.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.consumer_tag.encode(buf);
        buf.put_u64(self.delivery_tag);
        buf.put_u8(u8::from(self.redelivered));
        self.exchange.encode(buf);
        self.routing_key.encode(buf);
    }
}

impl Decode for Deliver {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            consumer_tag: ShortStr::decode(cursor)?,
            delivery_tag: cursor.get_u64()?,
            redelivered: cursor.get_u8()? & 0x01 != 0,
            exchange: ShortStr::decode(cursor)?,
            routing_key: ShortStr::decode(cursor)?,
        })
    }
}

/// Fetches a single message from a queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Get {
    /// Reserved, must be zero
    pub reserved1: u16,

    /// Queue to fetch from
    pub queue: ShortStr,

    /// The broker considers the message acknowledged once delivered
    pub no_ack: bool,
}

impl Encode for Get {
    fn size(&self) -> usize {
        2 + self.queue.size() + 1
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.reserved1);
        self.queue.encode(buf);
        buf.put_u8(u8::from(self.no_ack));
    }
}

impl Decode for Get {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            reserved1: cursor.get_u16()?,
            queue: ShortStr::decode(cursor)?,
            no_ack: cursor.get_u8()? & 0x01 != 0,
        })
    }
}

/// Answers a get with a message. Content frames follow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetOk {
    /// Broker-assigned delivery tag
    pub delivery_tag: u64,

    /// The message has been delivered before
    pub redelivered: bool,

    /// Exchange the message was published to
    pub exchange: ShortStr,

    /// Routing key the message was published with
    pub routing_key: ShortStr,

    /// Number of messages remaining in the queue
    pub message_count: u32,
}

impl Encode for GetOk {
    fn size(&self) -> usize {
        8 + 1 + self.exchange.size() + self.routing_key.size() + 4
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.delivery_tag);
        buf.put_u8(u8::from(self.redelivered));
        self.exchange.encode(buf);
        self.routing_key.encode(buf);
        buf.put_u32(self.message_count);
    }
}

impl Decode for GetOk {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            delivery_tag: cursor.get_u64()?,
            redelivered: cursor.get_u8()? & 0x01 != 0,
            exchange: ShortStr::decode(cursor)?,
            routing_key: ShortStr::decode(cursor)?,
            message_count: cursor.get_u32()?,
        })
    }
}

/// Answers a get on an empty queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetEmpty {
    /// Reserved, must be empty
    pub cluster_id: ShortStr,
}

impl Encode for GetEmpty {
    fn size(&self) -> usize {
        self.cluster_id.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.cluster_id.encode(buf);
    }
}

impl Decode for GetEmpty {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            cluster_id: ShortStr::decode(cursor)?,
        })
    }
}

/// Acknowledges one or more deliveries. Sent by the client for consumed
/// messages and by the broker for publisher confirms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ack {
    /// Delivery tag, 0 with `multiple` meaning everything outstanding
    pub delivery_tag: u64,

    /// Also acknowledge every lower delivery tag
    pub multiple: bool,
}

impl Encode for Ack {
    fn size(&self) -> usize {
        9
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.delivery_tag);
        buf.put_u8(u8::from(self.multiple));
    }
}

impl Decode for Ack {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            delivery_tag: cursor.get_u64()?,
            multiple: cursor.get_u8()? & 0x01 != 0,
        })
    }
}

/// Rejects a single delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reject {
    /// Delivery tag being rejected
    pub delivery_tag: u64,

    /// Requeue rather than discard
    pub requeue: bool,
}

impl Encode for Reject {
    fn size(&self) -> usize {
        9
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.delivery_tag);
        buf.put_u8(u8::from(self.requeue));
    }
}

impl Decode for Reject {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            delivery_tag: cursor.get_u64()?,
            requeue: cursor.get_u8()? & 0x01 != 0,
        })
    }
}

/// Redelivers unacknowledged messages without awaiting a reply
/// (deprecated in favour of [`Recover`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoverAsync {
    /// Requeue rather than redeliver to the original recipient
    pub requeue: bool,
}

impl Encode for RecoverAsync {
    fn size(&self) -> usize {
        1
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(self.requeue));
    }
}

impl Decode for RecoverAsync {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            requeue: cursor.get_u8()? & 0x01 != 0,
        })
    }
}

/// Redelivers unacknowledged messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Recover {
    /// Requeue rather than redeliver to the original recipient
    pub requeue: bool,
}

impl Encode for Recover {
    fn size(&self) -> usize {
        1
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(self.requeue));
    }
}

impl Decode for Recover {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            requeue: cursor.get_u8()? & 0x01 != 0,
        })
    }
}

/// Confirms a recover.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoverOk;

impl Encode for RecoverOk {
    fn size(&self) -> usize {
        0
    }

    fn encode(&self, _buf: &mut BytesMut) {}
}

impl Decode for RecoverOk {
    fn decode(_cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self)
    }
}

/// Negatively acknowledges one or more deliveries (RabbitMQ extension).
/// Sent by the client for consumed messages and by the broker for
/// publisher confirms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Nack {
    /// Delivery tag, 0 with `multiple` meaning everything outstanding
    pub delivery_tag: u64,

    /// Also reject every lower delivery tag
    pub multiple: bool,

    /// Requeue rather than discard
    pub requeue: bool,
}

impl Encode for Nack {
    fn size(&self) -> usize {
        9
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.delivery_tag);
        let mut bits = 0u8;
        if self.multiple {
            bits |= 1 << 0;
        }
        if self.requeue {
            bits |= 1 << 1;
        }
        buf.put_u8(bits);
    }
}

impl Decode for Nack {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        let delivery_tag = cursor.get_u64()?;
        let bits = cursor.get_u8()?;
        Ok(Self {
            delivery_tag,
            multiple: bits & (1 << 0) != 0,
            requeue: bits & (1 << 1) != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::{Consume, Deliver, Nack, Publish};
    use crate::codec::{Cursor, Decode, Encode};
    use crate::primitives::FieldTable;

    #[test]
    fn publish_roundtrip() {
        let publish = Publish {
            reserved1: 0,
            exchange: "".try_into().unwrap(),
            routing_key: "q".try_into().unwrap(),
            mandatory: true,
            immediate: false,
        };
        let mut buf = BytesMut::new();
        publish.encode(&mut buf);
        assert_eq!(buf.len(), publish.size());
        assert_eq!(Publish::decode(&mut Cursor::new(&buf)).unwrap(), publish);
    }

    #[test]
    fn consume_packs_four_bits() {
        let consume = Consume {
            reserved1: 0,
            queue: "jobs".try_into().unwrap(),
            consumer_tag: "".try_into().unwrap(),
            no_local: false,
            no_ack: true,
            exclusive: true,
            nowait: false,
            arguments: FieldTable::new(),
        };
        let mut buf = BytesMut::new();
        consume.encode(&mut buf);
        // flag octet follows reserved1 + "jobs" + empty tag
        assert_eq!(buf[2 + 5 + 1], (1 << 1) | (1 << 2));
        assert_eq!(Consume::decode(&mut Cursor::new(&buf)).unwrap(), consume);
    }

    #[test]
    fn deliver_roundtrip() {
        let deliver = Deliver {
            consumer_tag: "ctag-1".try_into().unwrap(),
            delivery_tag: 7,
            redelivered: true,
            exchange: "logs".try_into().unwrap(),
            routing_key: "info".try_into().unwrap(),
        };
        let mut buf = BytesMut::new();
        deliver.encode(&mut buf);
        assert_eq!(buf.len(), deliver.size());
        assert_eq!(Deliver::decode(&mut Cursor::new(&buf)).unwrap(), deliver);
    }

    #[test]
    fn nack_packs_two_bits() {
        let nack = Nack {
            delivery_tag: 3,
            multiple: true,
            requeue: true,
        };
        let mut buf = BytesMut::new();
        nack.encode(&mut buf);
        assert_eq!(buf[8], 0b11);
        assert_eq!(Nack::decode(&mut Cursor::new(&buf)).unwrap(), nack);
    }
}
