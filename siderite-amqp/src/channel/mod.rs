//! The per-channel state machine
//!
//! A channel pipelines synchronous requests: every such request pushes a
//! deferred on the channel FIFO before its frame is emitted, and incoming
//! `*-ok` methods resolve the FIFO head strictly in order. A head
//! mismatch is a protocol error that fails this channel only. Content
//! sequences (deliver, get-ok, return) are reassembled by the
//! [`Assembler`](crate::assembler) and dispatched to the owning consumer,
//! get or return target.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use bytes::{Bytes, BytesMut};
use indexmap::IndexMap;
use tracing::{debug, trace};

use siderite_amqp_types::methods::{
    basic, channel as channel_methods, confirm as confirm_methods, exchange as exchange_methods,
    queue as queue_methods, tx as tx_methods, Method,
};
use siderite_amqp_types::primitives::{FieldTable, ShortStr};
use siderite_amqp_types::properties::{BasicProperties, ContentHeader};

use crate::assembler::{Assembler, Emit, Target};
use crate::confirm::ConfirmSink;
use crate::connection::{self, ConnectionInner};
use crate::consumer::{ConsumerCore, DeferredConsumer, DeferredGet, GetCore};
use crate::deferred::{Deferred, DeferredHandle};
use crate::frames::{Frame, FramePayload, OVERHEAD};
use crate::message::{Delivery, ReturnedMessage};
use crate::watch::{Monitor, Watchable};
use crate::Error;

mod options;
pub use options::{
    ConsumeOptions, ExchangeDeclareOptions, ExchangeDeleteOptions, ExchangeType, PublishOptions,
    QueueDeclareOptions, QueueDeleteOptions,
};

/// The payload of a resolved `queue.declare`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueDeclared {
    /// The declared queue's name, resolved when the broker generated it
    pub queue: ShortStr,

    /// Number of messages currently in the queue
    pub message_count: u32,

    /// Number of active consumers on the queue
    pub consumer_count: u32,
}

/// Lifecycle state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// The channel accepts user commands.
    Connected,

    /// A close is in flight; further user commands are rejected.
    Closing,

    /// Terminal; every operation fails with `ChannelClosed`.
    Closed,
}

/// A deferred sitting in the reply FIFO, typed by the reply it awaits.
pub(crate) enum Pending {
    Open(DeferredHandle<()>),
    Close(DeferredHandle<()>),
    Flow(DeferredHandle<bool>),
    Generic {
        class_id: u16,
        method_id: u16,
        deferred: DeferredHandle<()>,
    },
    QueueDeclare(DeferredHandle<QueueDeclared>),
    QueuePurge(DeferredHandle<u32>),
    QueueDelete(DeferredHandle<u32>),
    Consume(Rc<RefCell<ConsumerCore>>),
    Cancel(DeferredHandle<ShortStr>),
    Get(Rc<RefCell<GetCore>>),
}

impl Pending {
    fn matches(&self, method: &Method) -> bool {
        match (self, method) {
            (Pending::Open(_), Method::ChannelOpenOk(_)) => true,
            (Pending::Close(_), Method::ChannelCloseOk(_)) => true,
            (Pending::Flow(_), Method::ChannelFlowOk(_)) => true,
            (
                Pending::Generic {
                    class_id,
                    method_id,
                    ..
                },
                method,
            ) => method.class_id() == *class_id && method.method_id() == *method_id,
            (Pending::QueueDeclare(_), Method::QueueDeclareOk(_)) => true,
            (Pending::QueuePurge(_), Method::QueuePurgeOk(_)) => true,
            (Pending::QueueDelete(_), Method::QueueDeleteOk(_)) => true,
            (Pending::Consume(_), Method::BasicConsumeOk(_)) => true,
            (Pending::Cancel(_), Method::BasicCancelOk(_)) => true,
            (Pending::Get(_), Method::BasicGetOk(_) | Method::BasicGetEmpty(_)) => true,
            _ => false,
        }
    }

    fn fail(self, reason: &str) {
        match self {
            Pending::Open(deferred)
            | Pending::Close(deferred)
            | Pending::Generic { deferred, .. } => deferred.reject(reason),
            Pending::Flow(deferred) => deferred.reject(reason),
            Pending::QueueDeclare(deferred) => deferred.reject(reason),
            Pending::QueuePurge(deferred) | Pending::QueueDelete(deferred) => {
                deferred.reject(reason)
            }
            Pending::Cancel(deferred) => deferred.reject(reason),
            Pending::Consume(core) => ConsumerCore::fail(&core, Some(reason)),
            Pending::Get(core) => GetCore::fail(&core, Some(reason)),
        }
    }
}

pub(crate) struct ChannelInner {
    pub(crate) id: u16,
    pub(crate) state: ChannelState,
    pub(crate) pending: VecDeque<Pending>,
    pub(crate) consumers: IndexMap<ShortStr, Rc<RefCell<ConsumerCore>>>,
    pub(crate) assembler: Option<Assembler>,
    pub(crate) return_handler: Option<Box<dyn FnMut(ReturnedMessage)>>,
    pub(crate) error_handler: Option<Box<dyn FnMut(&str)>>,
    pub(crate) confirm: Option<Weak<dyn ConfirmSink>>,
    pub(crate) confirm_selected: bool,
    pub(crate) watch: Watchable,
}

impl ChannelInner {
    pub(crate) fn new(id: u16) -> Self {
        Self {
            id,
            state: ChannelState::Connected,
            pending: VecDeque::new(),
            consumers: IndexMap::new(),
            assembler: None,
            return_handler: None,
            error_handler: None,
            confirm: None,
            confirm_selected: false,
            watch: Watchable::new(),
        }
    }
}

/// A user handle to a channel.
///
/// The connection owns the channel; this handle holds a non-owning
/// reference and may be cloned freely. Dropping the last handle closes
/// the channel.
pub struct Channel {
    id: u16,
    inner: Weak<RefCell<ChannelInner>>,
    conn: Weak<RefCell<ConnectionInner>>,
    opened: DeferredHandle<()>,
    token: Rc<()>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel").field("id", &self.id).finish()
    }
}

impl Clone for Channel {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Weak::clone(&self.inner),
            conn: Weak::clone(&self.conn),
            opened: self.opened.clone(),
            token: Rc::clone(&self.token),
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if Rc::strong_count(&self.token) > 1 {
            return;
        }
        let (Some(chan), Some(conn)) = (self.inner.upgrade(), self.conn.upgrade()) else {
            return;
        };
        destroy(&chan, &conn);
        connection::drain_effects(&conn);
    }
}

fn send_method(
    channel_id: u16,
    conn: &Rc<RefCell<ConnectionInner>>,
    method: Method,
) -> Result<(), Error> {
    trace!(channel = channel_id, method = ?method, "send");
    let frame = Frame::new(channel_id, method);
    let result = { conn.borrow_mut().send_frame(&frame) };
    connection::drain_effects(conn);
    result
}

impl Channel {
    pub(crate) fn new(
        id: u16,
        inner: Weak<RefCell<ChannelInner>>,
        conn: Weak<RefCell<ConnectionInner>>,
        opened: DeferredHandle<()>,
    ) -> Self {
        Self {
            id,
            inner,
            conn,
            opened,
            token: Rc::new(()),
        }
    }

    /// The channel id on the wire.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// The channel's lifecycle state.
    pub fn state(&self) -> ChannelState {
        match self.inner.upgrade() {
            Some(chan) => chan.borrow().state,
            None => ChannelState::Closed,
        }
    }

    /// A deferred resolving when the broker confirms the channel open.
    pub fn ready(&self) -> Deferred<()> {
        Deferred::from_handle(self.opened.clone())
    }

    /// Installs the channel-level error handler, fired when the channel
    /// fails or the peer closes it.
    pub fn on_error(&self, callback: impl FnMut(&str) + 'static) {
        if let Some(chan) = self.inner.upgrade() {
            chan.borrow_mut().error_handler = Some(Box::new(callback));
        }
    }

    /// Installs the handler for unroutable messages handed back via
    /// `basic.return`.
    pub fn on_returned(&self, callback: impl FnMut(ReturnedMessage) + 'static) {
        if let Some(chan) = self.inner.upgrade() {
            chan.borrow_mut().return_handler = Some(Box::new(callback));
        }
    }

    fn upgrade(
        &self,
    ) -> Result<(Rc<RefCell<ChannelInner>>, Rc<RefCell<ConnectionInner>>), Error> {
        let chan = self.inner.upgrade().ok_or(Error::ChannelClosed)?;
        let conn = self.conn.upgrade().ok_or(Error::ConnectionClosed)?;
        Ok((chan, conn))
    }

    fn emit(&self, method: Method) -> Result<(), Error> {
        let (chan, conn) = self.upgrade()?;
        if chan.borrow().state != ChannelState::Connected {
            return Err(Error::ChannelClosed);
        }
        send_method(self.id, &conn, method)
    }

    fn sync_request<T: 'static>(
        &self,
        nowait_value: Option<T>,
        method: Method,
        make_pending: impl FnOnce(DeferredHandle<T>) -> Pending,
    ) -> Deferred<T> {
        let (chan, conn) = match self.upgrade() {
            Ok(pair) => pair,
            Err(error) => return Deferred::rejected(error.to_string()),
        };
        if chan.borrow().state != ChannelState::Connected {
            return Deferred::rejected(Error::ChannelClosed.to_string());
        }
        if let Some(value) = nowait_value {
            return match send_method(self.id, &conn, method) {
                Ok(()) => Deferred::resolved(value),
                Err(error) => Deferred::rejected(error.to_string()),
            };
        }
        let (deferred, handle) = Deferred::pending();
        chan.borrow_mut()
            .pending
            .push_back(make_pending(handle.clone()));
        if let Err(error) = send_method(self.id, &conn, method) {
            chan.borrow_mut().pending.pop_back();
            handle.reject(&error.to_string());
        }
        deferred
    }

    /// Closes the channel. Pending requests stay queued until the broker
    /// confirms the close, then fail.
    pub fn close(&self) -> Deferred<()> {
        let (chan, conn) = match self.upgrade() {
            Ok(pair) => pair,
            Err(error) => return Deferred::rejected(error.to_string()),
        };
        {
            let mut ch = chan.borrow_mut();
            if ch.state != ChannelState::Connected {
                return Deferred::rejected(Error::ChannelClosed.to_string());
            }
            ch.state = ChannelState::Closing;
        }
        debug!(channel = self.id, "closing channel");
        let (deferred, handle) = Deferred::pending();
        chan.borrow_mut()
            .pending
            .push_back(Pending::Close(handle.clone()));
        let method = Method::from(channel_methods::Close {
            reply_code: 200,
            reply_text: ShortStr::new("OK").unwrap_or_default(),
            class_id: 0,
            method_id: 0,
        });
        let result = {
            let frame = Frame::new(self.id, method);
            conn.borrow_mut().send_frame(&frame)
        };
        connection::drain_effects(&conn);
        if let Err(error) = result {
            chan.borrow_mut().pending.pop_back();
            handle.reject(&error.to_string());
        }
        deferred
    }

    /// Pauses (`active = false`) or restarts delivery on this channel.
    pub fn flow(&self, active: bool) -> Deferred<bool> {
        self.sync_request(
            None,
            Method::from(channel_methods::Flow { active }),
            Pending::Flow,
        )
    }

    /// Declares an exchange.
    pub fn exchange_declare(
        &self,
        name: &str,
        kind: ExchangeType,
        options: ExchangeDeclareOptions,
        arguments: FieldTable,
    ) -> Deferred<()> {
        let exchange = match ShortStr::new(name) {
            Ok(value) => value,
            Err(error) => return Deferred::rejected(error.to_string()),
        };
        let method = Method::from(exchange_methods::Declare {
            reserved1: 0,
            exchange,
            kind: ShortStr::new(kind.as_str()).unwrap_or_default(),
            passive: options.passive,
            durable: options.durable,
            auto_delete: options.auto_delete,
            internal: options.internal,
            nowait: options.nowait,
            arguments,
        });
        self.sync_generic(options.nowait, method, exchange_methods::DeclareOk::CLASS_ID, exchange_methods::DeclareOk::METHOD_ID)
    }

    /// Deletes an exchange.
    pub fn exchange_delete(&self, name: &str, options: ExchangeDeleteOptions) -> Deferred<()> {
        let exchange = match ShortStr::new(name) {
            Ok(value) => value,
            Err(error) => return Deferred::rejected(error.to_string()),
        };
        let method = Method::from(exchange_methods::Delete {
            reserved1: 0,
            exchange,
            if_unused: options.if_unused,
            nowait: options.nowait,
        });
        self.sync_generic(options.nowait, method, exchange_methods::DeleteOk::CLASS_ID, exchange_methods::DeleteOk::METHOD_ID)
    }

    /// Binds `destination` to `source` with `routing_key`.
    pub fn exchange_bind(
        &self,
        destination: &str,
        source: &str,
        routing_key: &str,
        nowait: bool,
        arguments: FieldTable,
    ) -> Deferred<()> {
        let fields = (|| -> Result<_, Error> {
            Ok((
                ShortStr::new(destination)?,
                ShortStr::new(source)?,
                ShortStr::new(routing_key)?,
            ))
        })();
        let (destination, source, routing_key) = match fields {
            Ok(value) => value,
            Err(error) => return Deferred::rejected(error.to_string()),
        };
        let method = Method::from(exchange_methods::Bind {
            reserved1: 0,
            destination,
            source,
            routing_key,
            nowait,
            arguments,
        });
        self.sync_generic(nowait, method, exchange_methods::BindOk::CLASS_ID, exchange_methods::BindOk::METHOD_ID)
    }

    /// Removes an exchange-to-exchange binding.
    pub fn exchange_unbind(
        &self,
        destination: &str,
        source: &str,
        routing_key: &str,
        nowait: bool,
        arguments: FieldTable,
    ) -> Deferred<()> {
        let fields = (|| -> Result<_, Error> {
            Ok((
                ShortStr::new(destination)?,
                ShortStr::new(source)?,
                ShortStr::new(routing_key)?,
            ))
        })();
        let (destination, source, routing_key) = match fields {
            Ok(value) => value,
            Err(error) => return Deferred::rejected(error.to_string()),
        };
        let method = Method::from(exchange_methods::Unbind {
            reserved1: 0,
            destination,
            source,
            routing_key,
            nowait,
            arguments,
        });
        self.sync_generic(nowait, method, exchange_methods::UnbindOk::CLASS_ID, exchange_methods::UnbindOk::METHOD_ID)
    }

    /// Declares a queue; an empty name asks the broker to generate one.
    pub fn queue_declare(
        &self,
        name: &str,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Deferred<QueueDeclared> {
        let queue = match ShortStr::new(name) {
            Ok(value) => value,
            Err(error) => return Deferred::rejected(error.to_string()),
        };
        let nowait_value = options.nowait.then(|| QueueDeclared {
            queue: queue.clone(),
            message_count: 0,
            consumer_count: 0,
        });
        let method = Method::from(queue_methods::Declare {
            reserved1: 0,
            queue,
            passive: options.passive,
            durable: options.durable,
            exclusive: options.exclusive,
            auto_delete: options.auto_delete,
            nowait: options.nowait,
            arguments,
        });
        self.sync_request(nowait_value, method, Pending::QueueDeclare)
    }

    /// Binds a queue to an exchange.
    pub fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        nowait: bool,
        arguments: FieldTable,
    ) -> Deferred<()> {
        let fields = (|| -> Result<_, Error> {
            Ok((
                ShortStr::new(queue)?,
                ShortStr::new(exchange)?,
                ShortStr::new(routing_key)?,
            ))
        })();
        let (queue, exchange, routing_key) = match fields {
            Ok(value) => value,
            Err(error) => return Deferred::rejected(error.to_string()),
        };
        let method = Method::from(queue_methods::Bind {
            reserved1: 0,
            queue,
            exchange,
            routing_key,
            nowait,
            arguments,
        });
        self.sync_generic(nowait, method, queue_methods::BindOk::CLASS_ID, queue_methods::BindOk::METHOD_ID)
    }

    /// Removes a queue binding.
    pub fn queue_unbind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> Deferred<()> {
        let fields = (|| -> Result<_, Error> {
            Ok((
                ShortStr::new(queue)?,
                ShortStr::new(exchange)?,
                ShortStr::new(routing_key)?,
            ))
        })();
        let (queue, exchange, routing_key) = match fields {
            Ok(value) => value,
            Err(error) => return Deferred::rejected(error.to_string()),
        };
        let method = Method::from(queue_methods::Unbind {
            reserved1: 0,
            queue,
            exchange,
            routing_key,
            arguments,
        });
        self.sync_generic(false, method, queue_methods::UnbindOk::CLASS_ID, queue_methods::UnbindOk::METHOD_ID)
    }

    /// Discards every message in the queue that is not awaiting
    /// acknowledgement; resolves with the number discarded.
    pub fn queue_purge(&self, name: &str, nowait: bool) -> Deferred<u32> {
        let queue = match ShortStr::new(name) {
            Ok(value) => value,
            Err(error) => return Deferred::rejected(error.to_string()),
        };
        let method = Method::from(queue_methods::Purge {
            reserved1: 0,
            queue,
            nowait,
        });
        self.sync_request(nowait.then_some(0), method, Pending::QueuePurge)
    }

    /// Deletes a queue; resolves with the number of messages discarded.
    pub fn queue_delete(&self, name: &str, options: QueueDeleteOptions) -> Deferred<u32> {
        let queue = match ShortStr::new(name) {
            Ok(value) => value,
            Err(error) => return Deferred::rejected(error.to_string()),
        };
        let method = Method::from(queue_methods::Delete {
            reserved1: 0,
            queue,
            if_unused: options.if_unused,
            if_empty: options.if_empty,
            nowait: options.nowait,
        });
        self.sync_request(options.nowait.then_some(0), method, Pending::QueueDelete)
    }

    /// Sets the prefetch window.
    pub fn qos(&self, prefetch_count: u16, global: bool) -> Deferred<()> {
        let method = Method::from(basic::Qos {
            prefetch_size: 0,
            prefetch_count,
            global,
        });
        self.sync_generic(false, method, basic::QosOk::CLASS_ID, basic::QosOk::METHOD_ID)
    }

    /// Starts a consumer. An empty tag asks the broker to generate one.
    pub fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        options: ConsumeOptions,
        arguments: FieldTable,
    ) -> DeferredConsumer {
        let (chan, conn) = match self.upgrade() {
            Ok(pair) => pair,
            Err(error) => return DeferredConsumer::rejected(error.to_string()),
        };
        if chan.borrow().state != ChannelState::Connected {
            return DeferredConsumer::rejected(Error::ChannelClosed.to_string());
        }
        let fields = (|| -> Result<_, Error> {
            Ok((ShortStr::new(queue)?, ShortStr::new(consumer_tag)?))
        })();
        let (queue, tag) = match fields {
            Ok(value) => value,
            Err(error) => return DeferredConsumer::rejected(error.to_string()),
        };
        if options.nowait && tag.is_empty() {
            return DeferredConsumer::rejected(
                "a consume without reply requires an explicit consumer tag",
            );
        }

        let core = Rc::new(RefCell::new(ConsumerCore::new()));
        if options.nowait {
            chan.borrow_mut()
                .consumers
                .insert(tag.clone(), Rc::clone(&core));
        } else {
            chan.borrow_mut()
                .pending
                .push_back(Pending::Consume(Rc::clone(&core)));
        }

        let method = Method::from(basic::Consume {
            reserved1: 0,
            queue,
            consumer_tag: tag.clone(),
            no_local: options.no_local,
            no_ack: options.no_ack,
            exclusive: options.exclusive,
            nowait: options.nowait,
            arguments,
        });
        match send_method(self.id, &conn, method) {
            Ok(()) if options.nowait => ConsumerCore::start(&core, &tag),
            Ok(()) => {}
            Err(error) => {
                if options.nowait {
                    chan.borrow_mut().consumers.shift_remove(&tag);
                } else {
                    chan.borrow_mut().pending.pop_back();
                }
                ConsumerCore::fail(&core, Some(&error.to_string()));
            }
        }
        DeferredConsumer::new(core)
    }

    /// Cancels a consumer; resolves with the cancelled tag.
    pub fn cancel(&self, consumer_tag: &str, nowait: bool) -> Deferred<ShortStr> {
        let tag = match ShortStr::new(consumer_tag) {
            Ok(value) => value,
            Err(error) => return Deferred::rejected(error.to_string()),
        };
        if nowait {
            if let Some(chan) = self.inner.upgrade() {
                let removed = chan.borrow_mut().consumers.shift_remove(&tag);
                if let Some(core) = removed {
                    ConsumerCore::fail(&core, None);
                }
            }
            let method = Method::from(basic::Cancel {
                consumer_tag: tag.clone(),
                nowait: true,
            });
            return match self.emit(method) {
                Ok(()) => Deferred::resolved(tag),
                Err(error) => Deferred::rejected(error.to_string()),
            };
        }
        let method = Method::from(basic::Cancel {
            consumer_tag: tag,
            nowait: false,
        });
        self.sync_request(None, method, Pending::Cancel)
    }

    /// Fetches one message from a queue.
    pub fn get(&self, queue: &str, no_ack: bool) -> DeferredGet {
        let (chan, conn) = match self.upgrade() {
            Ok(pair) => pair,
            Err(error) => return DeferredGet::rejected(error.to_string()),
        };
        if chan.borrow().state != ChannelState::Connected {
            return DeferredGet::rejected(Error::ChannelClosed.to_string());
        }
        let queue = match ShortStr::new(queue) {
            Ok(value) => value,
            Err(error) => return DeferredGet::rejected(error.to_string()),
        };
        let core = Rc::new(RefCell::new(GetCore::new()));
        chan.borrow_mut()
            .pending
            .push_back(Pending::Get(Rc::clone(&core)));
        let method = Method::from(basic::Get {
            reserved1: 0,
            queue,
            no_ack,
        });
        if let Err(error) = send_method(self.id, &conn, method) {
            chan.borrow_mut().pending.pop_back();
            GetCore::fail(&core, Some(&error.to_string()));
        }
        DeferredGet::new(core)
    }

    /// Publishes a message. Publishing is asynchronous; delivery of the
    /// frames to the transport is the only confirmation unless the
    /// channel is in confirm mode.
    pub fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: BasicProperties,
        options: PublishOptions,
    ) -> Result<(), Error> {
        let bytes = self.encode_publish(exchange, routing_key, body, properties, options)?;
        self.send_raw(bytes)
    }

    /// Acknowledges a delivery, or with `multiple` every delivery up to
    /// and including `delivery_tag`.
    pub fn ack(&self, delivery_tag: u64, multiple: bool) -> Result<(), Error> {
        self.emit(Method::from(basic::Ack {
            delivery_tag,
            multiple,
        }))
    }

    /// Rejects a delivery, or with `multiple` every delivery up to and
    /// including `delivery_tag`.
    pub fn nack(&self, delivery_tag: u64, multiple: bool, requeue: bool) -> Result<(), Error> {
        self.emit(Method::from(basic::Nack {
            delivery_tag,
            multiple,
            requeue,
        }))
    }

    /// Rejects a single delivery.
    pub fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        self.emit(Method::from(basic::Reject {
            delivery_tag,
            requeue,
        }))
    }

    /// Redelivers unacknowledged messages.
    pub fn recover(&self, requeue: bool) -> Deferred<()> {
        let method = Method::from(basic::Recover { requeue });
        self.sync_generic(false, method, basic::RecoverOk::CLASS_ID, basic::RecoverOk::METHOD_ID)
    }

    /// Redelivers unacknowledged messages without awaiting a reply.
    pub fn recover_async(&self, requeue: bool) -> Result<(), Error> {
        self.emit(Method::from(basic::RecoverAsync { requeue }))
    }

    /// Puts the channel in transactional mode.
    pub fn tx_select(&self) -> Deferred<()> {
        self.sync_generic(
            false,
            Method::from(tx_methods::Select),
            tx_methods::SelectOk::CLASS_ID,
            tx_methods::SelectOk::METHOD_ID,
        )
    }

    /// Commits the current transaction.
    pub fn tx_commit(&self) -> Deferred<()> {
        self.sync_generic(
            false,
            Method::from(tx_methods::Commit),
            tx_methods::CommitOk::CLASS_ID,
            tx_methods::CommitOk::METHOD_ID,
        )
    }

    /// Abandons the current transaction.
    pub fn tx_rollback(&self) -> Deferred<()> {
        self.sync_generic(
            false,
            Method::from(tx_methods::Rollback),
            tx_methods::RollbackOk::CLASS_ID,
            tx_methods::RollbackOk::METHOD_ID,
        )
    }

    /// Puts the channel in publisher-confirm mode.
    pub fn confirm_select(&self, nowait: bool) -> Deferred<()> {
        let deferred = self.sync_generic(
            nowait,
            Method::from(confirm_methods::Select { nowait }),
            confirm_methods::SelectOk::CLASS_ID,
            confirm_methods::SelectOk::METHOD_ID,
        );
        if let Some(chan) = self.inner.upgrade() {
            let mut ch = chan.borrow_mut();
            if ch.state == ChannelState::Connected {
                ch.confirm_selected = true;
            }
        }
        deferred
    }

    fn sync_generic(
        &self,
        nowait: bool,
        method: Method,
        class_id: u16,
        method_id: u16,
    ) -> Deferred<()> {
        self.sync_request(nowait.then_some(()), method, |deferred| Pending::Generic {
            class_id,
            method_id,
            deferred,
        })
    }

    /// Encodes a publish as its full frame sequence: the method frame,
    /// the content header, and body frames of at most
    /// `max_frame − 8` payload bytes each.
    pub(crate) fn encode_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: BasicProperties,
        options: PublishOptions,
    ) -> Result<Bytes, Error> {
        let (chan, conn) = self.upgrade()?;
        if chan.borrow().state != ChannelState::Connected {
            return Err(Error::ChannelClosed);
        }
        let frame_max = conn.borrow().frame_max() as usize;

        let method = Method::from(basic::Publish {
            reserved1: 0,
            exchange: ShortStr::new(exchange)?,
            routing_key: ShortStr::new(routing_key)?,
            mandatory: options.mandatory,
            immediate: options.immediate,
        });
        let method_frame = Frame::new(self.id, method);
        let header_frame = Frame::new(
            self.id,
            ContentHeader::basic(body.len() as u64, properties),
        );
        check_frame_size(&method_frame, frame_max)?;
        check_frame_size(&header_frame, frame_max)?;

        let chunk_size = if frame_max == 0 {
            body.len().max(1)
        } else {
            frame_max.saturating_sub(OVERHEAD).max(1)
        };
        let mut buf = BytesMut::with_capacity(
            method_frame.size() + header_frame.size() + body.len() + OVERHEAD,
        );
        method_frame.encode(&mut buf);
        header_frame.encode(&mut buf);
        for chunk in body.chunks(chunk_size) {
            Frame::new(self.id, Bytes::copy_from_slice(chunk)).encode(&mut buf);
        }
        Ok(buf.freeze())
    }

    /// Ships pre-encoded frames on this channel's connection.
    pub(crate) fn send_raw(&self, bytes: Bytes) -> Result<(), Error> {
        let (chan, conn) = self.upgrade()?;
        if chan.borrow().state != ChannelState::Connected {
            return Err(Error::ChannelClosed);
        }
        let result = { conn.borrow_mut().dispatch_bytes(bytes) };
        connection::drain_effects(&conn);
        result
    }

    /// A monitor on this channel's destruction witness.
    pub(crate) fn watch_monitor(&self) -> Monitor {
        match self.inner.upgrade() {
            Some(chan) => chan.borrow().watch.monitor(),
            None => Monitor::dead(),
        }
    }

    /// Installs the confirm sink fed by broker `basic.ack`/`basic.nack`.
    pub(crate) fn install_confirm_sink(&self, sink: Weak<dyn ConfirmSink>) {
        if let Some(chan) = self.inner.upgrade() {
            chan.borrow_mut().confirm = Some(sink);
        }
    }
}

fn check_frame_size(frame: &Frame, frame_max: usize) -> Result<(), Error> {
    let size = frame.size();
    if frame_max != 0 && size > frame_max {
        return Err(Error::Frame(crate::frames::Error::TooLarge {
            size,
            max: frame_max,
        }));
    }
    Ok(())
}

/// Routes one inbound frame payload into the channel state machine.
///
/// An `Err` is a protocol violation scoped to this channel; the caller
/// fails the channel and keeps the connection alive.
pub(crate) fn process_frame(
    chan: &Rc<RefCell<ChannelInner>>,
    conn: &Rc<RefCell<ConnectionInner>>,
    payload: FramePayload,
) -> Result<(), Error> {
    {
        // a torn-down channel lingers as a tombstone until its close-ok
        let state = chan.borrow().state;
        if state == ChannelState::Closed {
            if matches!(&payload, FramePayload::Method(Method::ChannelCloseOk(_))) {
                let id = chan.borrow().id;
                conn.borrow_mut().remove_channel(id);
            }
            return Ok(());
        }
    }

    match payload {
        FramePayload::Heartbeat => Err(Error::Protocol(
            "heartbeat frame on a non-zero channel".into(),
        )),
        FramePayload::Header(header) => {
            let emits = {
                let mut ch = chan.borrow_mut();
                match ch.assembler.as_mut() {
                    Some(assembler) => assembler.on_header(header)?,
                    None => {
                        return Err(Error::Protocol(
                            "content header without a preceding method".into(),
                        ))
                    }
                }
            };
            dispatch_emits(chan, emits);
            Ok(())
        }
        FramePayload::Body(body) => {
            let emits = {
                let mut ch = chan.borrow_mut();
                match ch.assembler.as_mut() {
                    Some(assembler) => assembler.on_body(body)?,
                    None => {
                        return Err(Error::Protocol(
                            "content body without a preceding method".into(),
                        ))
                    }
                }
            };
            dispatch_emits(chan, emits);
            Ok(())
        }
        FramePayload::Method(method) => {
            {
                let ch = chan.borrow();
                if ch.assembler.is_some() {
                    return Err(Error::Protocol(
                        "method frame interrupts a content sequence".into(),
                    ));
                }
            }
            on_method(chan, conn, method)
        }
    }
}

fn pop_matching(chan: &Rc<RefCell<ChannelInner>>, method: &Method) -> Result<Pending, Error> {
    let mut ch = chan.borrow_mut();
    match ch.pending.pop_front() {
        Some(entry) if entry.matches(method) => Ok(entry),
        Some(entry) => {
            ch.pending.push_front(entry);
            Err(Error::Protocol(format!(
                "reply {}.{} does not match the pending request",
                method.class_id(),
                method.method_id()
            )))
        }
        None => Err(Error::Protocol(format!(
            "reply {}.{} with no pending request",
            method.class_id(),
            method.method_id()
        ))),
    }
}

fn on_method(
    chan: &Rc<RefCell<ChannelInner>>,
    conn: &Rc<RefCell<ConnectionInner>>,
    method: Method,
) -> Result<(), Error> {
    trace!(method = ?method, "channel recv");
    match method {
        Method::ChannelOpenOk(_) => {
            if let Pending::Open(deferred) = pop_matching(chan, &Method::ChannelOpenOk(Default::default()))? {
                deferred.resolve(());
            }
            Ok(())
        }
        Method::ChannelFlowOk(flow_ok) => {
            if let Pending::Flow(deferred) =
                pop_matching(chan, &Method::ChannelFlowOk(flow_ok))?
            {
                deferred.resolve(flow_ok.active);
            }
            Ok(())
        }
        Method::ChannelFlow(flow) => {
            // the peer pauses or resumes us; confirm the new state
            let id = chan.borrow().id;
            let _ = send_method(
                id,
                conn,
                Method::from(channel_methods::FlowOk {
                    active: flow.active,
                }),
            );
            Ok(())
        }
        Method::ChannelClose(close) => {
            let id = chan.borrow().id;
            debug!(
                channel = id,
                code = close.reply_code,
                text = %close.reply_text,
                "peer closed channel"
            );
            let _ = send_method(id, conn, Method::from(channel_methods::CloseOk));
            let reason = format!(
                "channel closed by peer: {} {}",
                close.reply_code, close.reply_text
            );
            teardown(chan, Some(conn), Some(&reason), false);
            Ok(())
        }
        method @ Method::ChannelCloseOk(_) => {
            let entry = pop_matching(chan, &method)?;
            teardown(chan, Some(conn), None, false);
            if let Pending::Close(deferred) = entry {
                deferred.resolve(());
            }
            Ok(())
        }
        method @ (Method::ExchangeDeclareOk(_)
        | Method::ExchangeDeleteOk(_)
        | Method::ExchangeBindOk(_)
        | Method::ExchangeUnbindOk(_)
        | Method::QueueBindOk(_)
        | Method::QueueUnbindOk(_)
        | Method::BasicQosOk(_)
        | Method::BasicRecoverOk(_)
        | Method::TxSelectOk(_)
        | Method::TxCommitOk(_)
        | Method::TxRollbackOk(_)) => {
            if let Pending::Generic { deferred, .. } = pop_matching(chan, &method)? {
                deferred.resolve(());
            }
            Ok(())
        }
        method @ Method::ConfirmSelectOk(_) => {
            if let Pending::Generic { deferred, .. } = pop_matching(chan, &method)? {
                chan.borrow_mut().confirm_selected = true;
                deferred.resolve(());
            }
            Ok(())
        }
        method @ Method::QueueDeclareOk(_) => {
            let entry = pop_matching(chan, &method)?;
            let Method::QueueDeclareOk(ok) = method else {
                return Ok(());
            };
            if let Pending::QueueDeclare(deferred) = entry {
                deferred.resolve(QueueDeclared {
                    queue: ok.queue,
                    message_count: ok.message_count,
                    consumer_count: ok.consumer_count,
                });
            }
            Ok(())
        }
        method @ Method::QueuePurgeOk(_) => {
            let entry = pop_matching(chan, &method)?;
            let Method::QueuePurgeOk(ok) = method else {
                return Ok(());
            };
            if let Pending::QueuePurge(deferred) = entry {
                deferred.resolve(ok.message_count);
            }
            Ok(())
        }
        method @ Method::QueueDeleteOk(_) => {
            let entry = pop_matching(chan, &method)?;
            let Method::QueueDeleteOk(ok) = method else {
                return Ok(());
            };
            if let Pending::QueueDelete(deferred) = entry {
                deferred.resolve(ok.message_count);
            }
            Ok(())
        }
        method @ Method::BasicConsumeOk(_) => {
            let entry = pop_matching(chan, &method)?;
            let Method::BasicConsumeOk(ok) = method else {
                return Ok(());
            };
            if let Pending::Consume(core) = entry {
                chan.borrow_mut()
                    .consumers
                    .insert(ok.consumer_tag.clone(), Rc::clone(&core));
                ConsumerCore::start(&core, &ok.consumer_tag);
            }
            Ok(())
        }
        method @ Method::BasicCancelOk(_) => {
            let entry = pop_matching(chan, &method)?;
            let Method::BasicCancelOk(ok) = method else {
                return Ok(());
            };
            if let Pending::Cancel(deferred) = entry {
                let removed = chan.borrow_mut().consumers.shift_remove(&ok.consumer_tag);
                if let Some(core) = removed {
                    ConsumerCore::fail(&core, None);
                }
                deferred.resolve(ok.consumer_tag);
            }
            Ok(())
        }
        Method::BasicCancel(cancel) => {
            // consumer-cancel-notify: the broker dropped the consumer
            let removed = chan.borrow_mut().consumers.shift_remove(&cancel.consumer_tag);
            if let Some(core) = removed {
                ConsumerCore::fail(&core, Some("consumer cancelled by the broker"));
            }
            Ok(())
        }
        Method::BasicDeliver(deliver) => {
            let core = chan.borrow().consumers.get(&deliver.consumer_tag).cloned();
            let Some(core) = core else {
                return Err(Error::Protocol(format!(
                    "delivery for unknown consumer tag {}",
                    deliver.consumer_tag
                )));
            };
            let delivery = Delivery {
                delivery_tag: deliver.delivery_tag,
                redelivered: deliver.redelivered,
                exchange: deliver.exchange,
                routing_key: deliver.routing_key,
                consumer_tag: Some(deliver.consumer_tag),
                message_count: None,
            };
            chan.borrow_mut().assembler =
                Some(Assembler::new(Target::Consumer(core), delivery));
            Ok(())
        }
        method @ Method::BasicGetOk(_) => {
            let entry = pop_matching(chan, &method)?;
            let Method::BasicGetOk(ok) = method else {
                return Ok(());
            };
            if let Pending::Get(core) = entry {
                let delivery = Delivery {
                    delivery_tag: ok.delivery_tag,
                    redelivered: ok.redelivered,
                    exchange: ok.exchange,
                    routing_key: ok.routing_key,
                    consumer_tag: None,
                    message_count: Some(ok.message_count),
                };
                chan.borrow_mut().assembler =
                    Some(Assembler::new(Target::Get(core), delivery));
            }
            Ok(())
        }
        method @ Method::BasicGetEmpty(_) => {
            let entry = pop_matching(chan, &method)?;
            if let Pending::Get(core) = entry {
                let empty = {
                    let mut inner = core.borrow_mut();
                    inner.dead = true;
                    inner.empty.take()
                };
                if let Some(callback) = empty {
                    callback();
                }
            }
            Ok(())
        }
        Method::BasicReturn(ret) => {
            let delivery = Delivery {
                delivery_tag: 0,
                redelivered: false,
                exchange: ret.exchange,
                routing_key: ret.routing_key,
                consumer_tag: None,
                message_count: None,
            };
            chan.borrow_mut().assembler = Some(Assembler::new(
                Target::Return {
                    reply_code: ret.reply_code,
                    reply_text: ret.reply_text,
                },
                delivery,
            ));
            Ok(())
        }
        Method::BasicAck(ack) => {
            let sink = confirm_sink(chan, "basic.ack")?;
            if let Some(sink) = sink {
                sink.on_ack(ack.delivery_tag, ack.multiple);
            }
            Ok(())
        }
        Method::BasicNack(nack) => {
            let sink = confirm_sink(chan, "basic.nack")?;
            if let Some(sink) = sink {
                sink.on_nack(nack.delivery_tag, nack.multiple);
            }
            Ok(())
        }
        method => Err(Error::Protocol(format!(
            "unexpected method {}.{} on channel",
            method.class_id(),
            method.method_id()
        ))),
    }
}

fn confirm_sink(
    chan: &Rc<RefCell<ChannelInner>>,
    what: &str,
) -> Result<Option<Rc<dyn ConfirmSink>>, Error> {
    let ch = chan.borrow();
    if !ch.confirm_selected {
        return Err(Error::Protocol(format!("{what} outside confirm mode")));
    }
    Ok(ch.confirm.as_ref().and_then(Weak::upgrade))
}

/// Fires the callbacks produced by an assembler step, removing the
/// assembler first when the message completed. Every callback is guarded
/// by a monitor so it may tear the channel down.
fn dispatch_emits(chan: &Rc<RefCell<ChannelInner>>, emits: Vec<Emit>) {
    if emits.is_empty() {
        return;
    }
    let extracted = {
        let mut ch = chan.borrow_mut();
        let Some(assembler) = ch.assembler.as_ref() else {
            return;
        };
        let delivery = assembler.delivery().clone();
        let target = match &assembler.target {
            Target::Consumer(core) => Target::Consumer(Rc::clone(core)),
            Target::Get(core) => Target::Get(Rc::clone(core)),
            Target::Return {
                reply_code,
                reply_text,
            } => Target::Return {
                reply_code: *reply_code,
                reply_text: reply_text.clone(),
            },
        };
        if assembler.is_complete() {
            ch.assembler = None;
        }
        let monitor = ch.watch.monitor();
        (target, delivery, monitor)
    };
    let (target, delivery, monitor) = extracted;

    for emit in emits {
        if !monitor.valid() {
            return;
        }
        match (&target, emit) {
            (Target::Consumer(core), Emit::Begin) => {
                let callback = core.borrow_mut().begin.take();
                if let Some(mut callback) = callback {
                    callback(&delivery);
                    let mut inner = core.borrow_mut();
                    if !inner.dead {
                        inner.begin = Some(callback);
                    }
                }
            }
            (Target::Consumer(core), Emit::Headers(properties, body_size)) => {
                let callback = core.borrow_mut().headers.take();
                if let Some(mut callback) = callback {
                    callback(&properties, body_size);
                    let mut inner = core.borrow_mut();
                    if !inner.dead {
                        inner.headers = Some(callback);
                    }
                }
            }
            (Target::Consumer(core), Emit::Data(chunk)) => {
                let callback = core.borrow_mut().data.take();
                if let Some(mut callback) = callback {
                    callback(&chunk);
                    let mut inner = core.borrow_mut();
                    if !inner.dead {
                        inner.data = Some(callback);
                    }
                }
            }
            (Target::Consumer(core), Emit::Complete) => {
                let callback = core.borrow_mut().complete.take();
                if let Some(mut callback) = callback {
                    callback(&delivery);
                    let mut inner = core.borrow_mut();
                    if !inner.dead {
                        inner.complete = Some(callback);
                    }
                }
            }
            (Target::Consumer(core), Emit::Message(message)) => {
                let callback = core.borrow_mut().message.take();
                if let Some(mut callback) = callback {
                    callback(message, &delivery);
                    let mut inner = core.borrow_mut();
                    if !inner.dead {
                        inner.message = Some(callback);
                    }
                }
            }
            (Target::Get(core), Emit::Message(message)) => {
                let callback = {
                    let mut inner = core.borrow_mut();
                    inner.dead = true;
                    inner.message.take()
                };
                if let Some(callback) = callback {
                    callback(message, &delivery);
                }
            }
            (
                Target::Return {
                    reply_code,
                    reply_text,
                },
                Emit::Message(message),
            ) => {
                let callback = chan.borrow_mut().return_handler.take();
                if let Some(mut callback) = callback {
                    callback(ReturnedMessage {
                        reply_code: *reply_code,
                        reply_text: reply_text.clone(),
                        message,
                    });
                    let mut ch = chan.borrow_mut();
                    if ch.state != ChannelState::Closed && ch.return_handler.is_none() {
                        ch.return_handler = Some(callback);
                    }
                } else {
                    trace!("unroutable message returned with no handler installed");
                }
            }
            // streaming emits never reach get or return targets
            _ => {}
        }
    }
}

/// Tears the channel down: terminal state, invalidated monitors, failed
/// deferreds (in FIFO order), failed consumers (in registration order),
/// confirm-sink notification, then the channel-level error handler.
///
/// With `tombstone` the entry stays in the connection's table so the
/// broker's eventual `channel.close-ok` is swallowed instead of being
/// treated as a frame on an unknown channel.
pub(crate) fn teardown(
    chan: &Rc<RefCell<ChannelInner>>,
    conn: Option<&Rc<RefCell<ConnectionInner>>>,
    error: Option<&str>,
    tombstone: bool,
) {
    let (id, pending, consumers, confirm, error_handler) = {
        let mut ch = chan.borrow_mut();
        if ch.state == ChannelState::Closed {
            return;
        }
        ch.state = ChannelState::Closed;
        ch.watch.invalidate();
        ch.assembler = None;
        ch.return_handler = None;
        ch.confirm_selected = false;
        (
            ch.id,
            std::mem::take(&mut ch.pending),
            std::mem::take(&mut ch.consumers),
            ch.confirm.take(),
            ch.error_handler.take(),
        )
    };
    debug!(channel = id, error = ?error, "channel torn down");

    if !tombstone {
        if let Some(conn) = conn {
            conn.borrow_mut().remove_channel(id);
        }
    }

    let reason = error.unwrap_or("channel is closed");
    for entry in pending {
        entry.fail(reason);
    }
    for (_, core) in consumers {
        ConsumerCore::fail(&core, Some(reason));
    }
    if let Some(sink) = confirm.and_then(|weak| weak.upgrade()) {
        sink.on_close(reason);
    }
    if let (Some(mut handler), Some(error)) = (error_handler, error) {
        handler(error);
    }
}

/// Destruction of the last user handle: close towards the broker, tear
/// down immediately, and leave a tombstone for the close-ok.
pub(crate) fn destroy(chan: &Rc<RefCell<ChannelInner>>, conn: &Rc<RefCell<ConnectionInner>>) {
    let (id, state) = {
        let ch = chan.borrow();
        (ch.id, ch.state)
    };
    match state {
        ChannelState::Connected => {
            let method = Method::from(channel_methods::Close {
                reply_code: 200,
                reply_text: ShortStr::default(),
                class_id: 0,
                method_id: 0,
            });
            let _ = send_method(id, conn, method);
            teardown(chan, Some(conn), None, true);
        }
        ChannelState::Closing => teardown(chan, Some(conn), None, true),
        ChannelState::Closed => {}
    }
}
