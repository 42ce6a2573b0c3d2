//! Inbound message reassembly
//!
//! `basic.deliver`, `basic.get-ok` and `basic.return` each open a content
//! sequence: the method, then a header declaring the body size, then body
//! frames until the cumulative payload reaches that size. The assembler
//! enforces the sequence and produces either one whole message or a
//! stream of callbacks, depending on the target.
//!
//! The assembler itself never invokes user code: each step returns the
//! [`Emit`] actions for the channel to fire after it has released its
//! borrows.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::{Bytes, BytesMut};
use tracing::warn;

use siderite_amqp_types::primitives::ShortStr;
use siderite_amqp_types::properties::{BasicProperties, ContentHeader};

use crate::consumer::{ConsumerCore, GetCore};
use crate::message::{Delivery, Message};
use crate::Error;

/// Where a reassembled message is delivered.
pub(crate) enum Target {
    Consumer(Rc<RefCell<ConsumerCore>>),
    Get(Rc<RefCell<GetCore>>),
    Return {
        reply_code: u16,
        reply_text: ShortStr,
    },
}

/// A callback the channel must fire once its borrows are released.
pub(crate) enum Emit {
    Begin,
    Headers(BasicProperties, u64),
    Data(Bytes),
    Complete,
    Message(Message),
}

pub(crate) struct Assembler {
    pub(crate) target: Target,
    delivery: Delivery,
    properties: BasicProperties,
    body_size: u64,
    received: u64,
    chunks: Vec<Bytes>,
    have_header: bool,
    streaming: bool,
}

impl Assembler {
    pub(crate) fn new(target: Target, delivery: Delivery) -> Self {
        let streaming = match &target {
            Target::Consumer(core) => core.borrow().streaming,
            Target::Get(_) | Target::Return { .. } => false,
        };
        Self {
            target,
            delivery,
            properties: BasicProperties::default(),
            body_size: 0,
            received: 0,
            chunks: Vec::new(),
            have_header: false,
            streaming,
        }
    }

    pub(crate) fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.have_header && self.received == self.body_size
    }

    /// Accepts the content header that must follow the announcing method.
    pub(crate) fn on_header(&mut self, header: ContentHeader) -> Result<Vec<Emit>, Error> {
        if self.have_header {
            return Err(Error::Protocol(
                "duplicate content header in message sequence".into(),
            ));
        }
        if usize::try_from(header.body_size).is_err() {
            return Err(Error::Protocol(
                "declared body size exceeds addressable memory".into(),
            ));
        }
        self.have_header = true;
        self.body_size = header.body_size;
        self.properties = header.properties;

        let mut emits = Vec::new();
        if self.streaming {
            emits.push(Emit::Begin);
            emits.push(Emit::Headers(self.properties.clone(), self.body_size));
            if self.body_size == 0 {
                emits.push(Emit::Complete);
            }
        } else if self.body_size == 0 {
            emits.push(Emit::Message(self.assemble()));
        }
        Ok(emits)
    }

    /// Accepts one body frame, truncating any oversize tail to the
    /// declared size.
    pub(crate) fn on_body(&mut self, mut chunk: Bytes) -> Result<Vec<Emit>, Error> {
        if !self.have_header {
            return Err(Error::Protocol(
                "content body before content header".into(),
            ));
        }
        let remaining = self.body_size - self.received;
        if chunk.len() as u64 > remaining {
            // the peer sent more than the header declared
            warn!(
                declared = self.body_size,
                excess = chunk.len() as u64 - remaining,
                "truncating oversize message body"
            );
            chunk.truncate(remaining as usize);
        }
        self.received += chunk.len() as u64;

        let mut emits = Vec::new();
        if self.streaming {
            emits.push(Emit::Data(chunk));
            if self.is_complete() {
                emits.push(Emit::Complete);
            }
        } else {
            self.chunks.push(chunk);
            if self.is_complete() {
                emits.push(Emit::Message(self.assemble()));
            }
        }
        Ok(emits)
    }

    fn assemble(&mut self) -> Message {
        // single-frame bodies keep their original buffer
        let body = if self.chunks.len() == 1 {
            self.chunks.remove(0)
        } else {
            let mut buf = BytesMut::with_capacity(self.received as usize);
            for chunk in self.chunks.drain(..) {
                buf.extend_from_slice(&chunk);
            }
            buf.freeze()
        };
        Message {
            exchange: self.delivery.exchange.clone(),
            routing_key: self.delivery.routing_key.clone(),
            properties: std::mem::take(&mut self.properties),
            body,
        }
    }
}
