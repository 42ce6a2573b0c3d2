//! Messages and delivery metadata

use bytes::Bytes;

use siderite_amqp_types::primitives::ShortStr;
use siderite_amqp_types::properties::BasicProperties;

/// A complete inbound or outbound message: envelope metadata plus the
/// routing coordinates and the body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Exchange the message was published to
    pub exchange: ShortStr,

    /// Routing key the message was published with
    pub routing_key: ShortStr,

    /// The optional envelope properties
    pub properties: BasicProperties,

    /// The message body
    pub body: Bytes,
}

/// Metadata announcing an inbound message, carried by `basic.deliver`,
/// `basic.get-ok` or `basic.return`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delivery {
    /// Broker-assigned delivery tag; zero for returned messages
    pub delivery_tag: u64,

    /// Whether the message has been delivered before
    pub redelivered: bool,

    /// Exchange the message was published to
    pub exchange: ShortStr,

    /// Routing key the message was published with
    pub routing_key: ShortStr,

    /// The receiving consumer's tag, absent for get and return
    pub consumer_tag: Option<ShortStr>,

    /// Messages remaining in the queue, present for get
    pub message_count: Option<u32>,
}

/// An unroutable message handed back by the broker via `basic.return`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnedMessage {
    /// The broker's reply code explaining the return
    pub reply_code: u16,

    /// The broker's reply text
    pub reply_text: ShortStr,

    /// The reassembled message
    pub message: Message,
}
