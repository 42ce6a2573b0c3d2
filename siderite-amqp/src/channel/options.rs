//! Option flags for channel operations
//!
//! Each struct mirrors the bit set of the corresponding method. The bits
//! are orthogonal; unknown bits on the wire are ignored.

/// The built-in exchange types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeType {
    /// Deliver to every bound queue.
    Fanout,

    /// Deliver on an exact routing-key match.
    Direct,

    /// Deliver on a dotted-pattern routing-key match.
    Topic,

    /// Deliver on a headers-table match.
    Headers,
}

impl ExchangeType {
    /// The wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeType::Fanout => "fanout",
            ExchangeType::Direct => "direct",
            ExchangeType::Topic => "topic",
            ExchangeType::Headers => "headers",
        }
    }
}

/// Flags for `exchange.declare`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeDeclareOptions {
    /// Only check that the exchange exists
    pub passive: bool,

    /// Survive a broker restart
    pub durable: bool,

    /// Delete when the last binding is removed
    pub auto_delete: bool,

    /// Only bindable from other exchanges
    pub internal: bool,

    /// Do not await the reply
    pub nowait: bool,
}

/// Flags for `exchange.delete`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeDeleteOptions {
    /// Only delete if the exchange has no bindings
    pub if_unused: bool,

    /// Do not await the reply
    pub nowait: bool,
}

/// Flags for `queue.declare`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDeclareOptions {
    /// Only check that the queue exists
    pub passive: bool,

    /// Survive a broker restart
    pub durable: bool,

    /// Only accessible on this connection
    pub exclusive: bool,

    /// Delete when the last consumer cancels
    pub auto_delete: bool,

    /// Do not await the reply
    pub nowait: bool,
}

/// Flags for `queue.delete`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDeleteOptions {
    /// Only delete if the queue has no consumers
    pub if_unused: bool,

    /// Only delete if the queue is empty
    pub if_empty: bool,

    /// Do not await the reply
    pub nowait: bool,
}

/// Flags for `basic.consume`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeOptions {
    /// Do not deliver messages published on this connection
    pub no_local: bool,

    /// The broker considers messages acknowledged once delivered
    pub no_ack: bool,

    /// Request exclusive access to the queue
    pub exclusive: bool,

    /// Do not await the reply
    pub nowait: bool,
}

/// Flags for `basic.publish`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Return the message if it cannot be routed to a queue
    pub mandatory: bool,

    /// Return the message if it cannot be delivered immediately
    pub immediate: bool,
}
