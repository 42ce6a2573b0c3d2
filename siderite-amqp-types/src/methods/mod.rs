//! The typed method registry
//!
//! One record per AMQP 0-9-1 method across the seven classes the engine
//! speaks, plus the [`Method`] dispatch enum keyed by
//! `(class id, method id)`. Synchronous requests are marked through
//! [`Method::reply_expected`] so the channel state machine knows when to
//! push a deferred; the `nowait` bit, where a method carries one, converts
//! the request to asynchronous at the call site.

use bytes::{BufMut, BytesMut};

use crate::codec::{Cursor, Decode, Encode};
use crate::Error;

pub mod basic;
pub mod channel;
pub mod confirm;
pub mod connection;
pub mod exchange;
pub mod queue;
pub mod tx;

/// Class ids on the wire.
pub mod class {
    /// Connection class
    pub const CONNECTION: u16 = 10;
    /// Channel class
    pub const CHANNEL: u16 = 20;
    /// Exchange class
    pub const EXCHANGE: u16 = 40;
    /// Queue class
    pub const QUEUE: u16 = 50;
    /// Basic class
    pub const BASIC: u16 = 60;
    /// Confirm class (RabbitMQ extension)
    pub const CONFIRM: u16 = 85;
    /// Tx class
    pub const TX: u16 = 90;
}

macro_rules! methods {
    ($(
        $(#[$doc:meta])*
        $variant:ident($path:ty) = ($class:expr, $method:expr), reply: $reply:expr;
    )*) => {
        /// A decoded method frame payload.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Method {
            $(
                $(#[$doc])*
                $variant($path),
            )*
        }

        impl Method {
            /// Decodes the method identified by `(class_id, method_id)`
            /// from `cursor`.
            pub fn decode(
                class_id: u16,
                method_id: u16,
                cursor: &mut Cursor<'_>,
            ) -> Result<Self, Error> {
                $(
                    if class_id == $class && method_id == $method {
                        return Ok(Method::$variant(<$path>::decode(cursor)?));
                    }
                )*
                Err(Error::UnknownMethod { class_id, method_id })
            }

            /// The class id of this method.
            pub fn class_id(&self) -> u16 {
                match self {
                    $(Method::$variant(_) => $class,)*
                }
            }

            /// The method id of this method within its class.
            pub fn method_id(&self) -> u16 {
                match self {
                    $(Method::$variant(_) => $method,)*
                }
            }

            /// Whether the sender of this method awaits a paired reply.
            ///
            /// Replies and one-way methods report `false`; a request whose
            /// `nowait` bit is set is converted to asynchronous at the
            /// call site regardless of this marking.
            pub fn reply_expected(&self) -> bool {
                match self {
                    $(Method::$variant(_) => $reply,)*
                }
            }
        }

        impl Encode for Method {
            fn size(&self) -> usize {
                4 + match self {
                    $(Method::$variant(inner) => inner.size(),)*
                }
            }

            fn encode(&self, buf: &mut BytesMut) {
                buf.put_u16(self.class_id());
                buf.put_u16(self.method_id());
                match self {
                    $(Method::$variant(inner) => inner.encode(buf),)*
                }
            }
        }

        $(
            impl $path {
                /// Class id on the wire.
                pub const CLASS_ID: u16 = $class;

                /// Method id within the class.
                pub const METHOD_ID: u16 = $method;
            }

            impl From<$path> for Method {
                fn from(inner: $path) -> Self {
                    Method::$variant(inner)
                }
            }
        )*
    };
}

methods! {
    /// `connection.start`
    ConnectionStart(connection::Start) = (class::CONNECTION, 10), reply: true;
    /// `connection.start-ok`
    ConnectionStartOk(connection::StartOk) = (class::CONNECTION, 11), reply: false;
    /// `connection.secure`
    ConnectionSecure(connection::Secure) = (class::CONNECTION, 20), reply: true;
    /// `connection.secure-ok`
    ConnectionSecureOk(connection::SecureOk) = (class::CONNECTION, 21), reply: false;
    /// `connection.tune`
    ConnectionTune(connection::Tune) = (class::CONNECTION, 30), reply: true;
    /// `connection.tune-ok`
    ConnectionTuneOk(connection::TuneOk) = (class::CONNECTION, 31), reply: false;
    /// `connection.open`
    ConnectionOpen(connection::Open) = (class::CONNECTION, 40), reply: true;
    /// `connection.open-ok`
    ConnectionOpenOk(connection::OpenOk) = (class::CONNECTION, 41), reply: false;
    /// `connection.close`
    ConnectionClose(connection::Close) = (class::CONNECTION, 50), reply: true;
    /// `connection.close-ok`
    ConnectionCloseOk(connection::CloseOk) = (class::CONNECTION, 51), reply: false;
    /// `connection.blocked`
    ConnectionBlocked(connection::Blocked) = (class::CONNECTION, 60), reply: false;
    /// `connection.unblocked`
    ConnectionUnblocked(connection::Unblocked) = (class::CONNECTION, 61), reply: false;

    /// `channel.open`
    ChannelOpen(channel::Open) = (class::CHANNEL, 10), reply: true;
    /// `channel.open-ok`
    ChannelOpenOk(channel::OpenOk) = (class::CHANNEL, 11), reply: false;
    /// `channel.flow`
    ChannelFlow(channel::Flow) = (class::CHANNEL, 20), reply: true;
    /// `channel.flow-ok`
    ChannelFlowOk(channel::FlowOk) = (class::CHANNEL, 21), reply: false;
    /// `channel.close`
    ChannelClose(channel::Close) = (class::CHANNEL, 40), reply: true;
    /// `channel.close-ok`
    ChannelCloseOk(channel::CloseOk) = (class::CHANNEL, 41), reply: false;

    /// `exchange.declare`
    ExchangeDeclare(exchange::Declare) = (class::EXCHANGE, 10), reply: true;
    /// `exchange.declare-ok`
    ExchangeDeclareOk(exchange::DeclareOk) = (class::EXCHANGE, 11), reply: false;
    /// `exchange.delete`
    ExchangeDelete(exchange::Delete) = (class::EXCHANGE, 20), reply: true;
    /// `exchange.delete-ok`
    ExchangeDeleteOk(exchange::DeleteOk) = (class::EXCHANGE, 21), reply: false;
    /// `exchange.bind`
    ExchangeBind(exchange::Bind) = (class::EXCHANGE, 30), reply: true;
    /// `exchange.bind-ok`
    ExchangeBindOk(exchange::BindOk) = (class::EXCHANGE, 31), reply: false;
    /// `exchange.unbind`
    ExchangeUnbind(exchange::Unbind) = (class::EXCHANGE, 40), reply: true;
    /// `exchange.unbind-ok`
    ExchangeUnbindOk(exchange::UnbindOk) = (class::EXCHANGE, 51), reply: false;

    /// `queue.declare`
    QueueDeclare(queue::Declare) = (class::QUEUE, 10), reply: true;
    /// `queue.declare-ok`
    QueueDeclareOk(queue::DeclareOk) = (class::QUEUE, 11), reply: false;
    /// `queue.bind`
    QueueBind(queue::Bind) = (class::QUEUE, 20), reply: true;
    /// `queue.bind-ok`
    QueueBindOk(queue::BindOk) = (class::QUEUE, 21), reply: false;
    /// `queue.purge`
    QueuePurge(queue::Purge) = (class::QUEUE, 30), reply: true;
    /// `queue.purge-ok`
    QueuePurgeOk(queue::PurgeOk) = (class::QUEUE, 31), reply: false;
    /// `queue.delete`
    QueueDelete(queue::Delete) = (class::QUEUE, 40), reply: true;
    /// `queue.delete-ok`
    QueueDeleteOk(queue::DeleteOk) = (class::QUEUE, 41), reply: false;
    /// `queue.unbind`
    QueueUnbind(queue::Unbind) = (class::QUEUE, 50), reply: true;
    /// `queue.unbind-ok`
    QueueUnbindOk(queue::UnbindOk) = (class::QUEUE, 51), reply: false;

    /// `basic.qos`
    BasicQos(basic::Qos) = (class::BASIC, 10), reply: true;
    /// `basic.qos-ok`
    BasicQosOk(basic::QosOk) = (class::BASIC, 11), reply: false;
    /// `basic.consume`
    BasicConsume(basic::Consume) = (class::BASIC, 20), reply: true;
    /// `basic.consume-ok`
    BasicConsumeOk(basic::ConsumeOk) = (class::BASIC, 21), reply: false;
    /// `basic.cancel`
    BasicCancel(basic::Cancel) = (class::BASIC, 30), reply: true;
    /// `basic.cancel-ok`
    BasicCancelOk(basic::CancelOk) = (class::BASIC, 31), reply: false;
    /// `basic.publish`
    BasicPublish(basic::Publish) = (class::BASIC, 40), reply: false;
    /// `basic.return`
    BasicReturn(basic::Return) = (class::BASIC, 50), reply: false;
    /// `basic.deliver`
    BasicDeliver(basic::Deliver) = (class::BASIC, 60), reply: false;
    /// `basic.get`
    BasicGet(basic::Get) = (class::BASIC, 70), reply: true;
    /// `basic.get-ok`
    BasicGetOk(basic::GetOk) = (class::BASIC, 71), reply: false;
    /// `basic.get-empty`
    BasicGetEmpty(basic::GetEmpty) = (class::BASIC, 72), reply: false;
    /// `basic.ack`
    BasicAck(basic::Ack) = (class::BASIC, 80), reply: false;
    /// `basic.reject`
    BasicReject(basic::Reject) = (class::BASIC, 90), reply: false;
    /// `basic.recover-async`
    BasicRecoverAsync(basic::RecoverAsync) = (class::BASIC, 100), reply: false;
    /// `basic.recover`
    BasicRecover(basic::Recover) = (class::BASIC, 110), reply: true;
    /// `basic.recover-ok`
    BasicRecoverOk(basic::RecoverOk) = (class::BASIC, 111), reply: false;
    /// `basic.nack`
    BasicNack(basic::Nack) = (class::BASIC, 120), reply: false;

    /// `tx.select`
    TxSelect(tx::Select) = (class::TX, 10), reply: true;
    /// `tx.select-ok`
    TxSelectOk(tx::SelectOk) = (class::TX, 11), reply: false;
    /// `tx.commit`
    TxCommit(tx::Commit) = (class::TX, 20), reply: true;
    /// `tx.commit-ok`
    TxCommitOk(tx::CommitOk) = (class::TX, 21), reply: false;
    /// `tx.rollback`
    TxRollback(tx::Rollback) = (class::TX, 30), reply: true;
    /// `tx.rollback-ok`
    TxRollbackOk(tx::RollbackOk) = (class::TX, 31), reply: false;

    /// `confirm.select`
    ConfirmSelect(confirm::Select) = (class::CONFIRM, 10), reply: true;
    /// `confirm.select-ok`
    ConfirmSelectOk(confirm::SelectOk) = (class::CONFIRM, 11), reply: false;
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::{class, Method};
    use crate::codec::{Cursor, Encode};
    use crate::Error;

    #[test]
    fn dispatch_is_keyed_by_class_and_method() {
        let method = Method::from(super::basic::Ack {
            delivery_tag: 9,
            multiple: true,
        });
        assert_eq!(method.class_id(), class::BASIC);
        assert_eq!(method.method_id(), 80);

        let mut buf = BytesMut::new();
        method.encode(&mut buf);
        assert_eq!(buf.len(), method.size());

        let mut cursor = Cursor::new(&buf);
        let class_id = cursor.get_u16().unwrap();
        let method_id = cursor.get_u16().unwrap();
        let decoded = Method::decode(class_id, method_id, &mut cursor).unwrap();
        assert_eq!(decoded, method);
    }

    #[test]
    fn unknown_method_is_rejected() {
        let mut cursor = Cursor::new(&[]);
        assert!(matches!(
            Method::decode(42, 7, &mut cursor),
            Err(Error::UnknownMethod {
                class_id: 42,
                method_id: 7
            })
        ));
    }

    #[test]
    fn sync_requests_are_marked() {
        let declare = Method::from(super::queue::Declare::default());
        assert!(declare.reply_expected());

        let publish = Method::from(super::basic::Publish::default());
        assert!(!publish.reply_expected());

        let deliver = Method::from(super::basic::Deliver::default());
        assert!(!deliver.reply_expected());
    }
}
