//! The windowed confirm wrapper

use std::fmt;
use std::rc::Rc;

use siderite_amqp_types::properties::BasicProperties;

use crate::channel::{Channel, PublishOptions};
use crate::Error;

use super::{ConfirmChannel, ConfirmOutcome, ConfirmState};

/// A [`Tagger`](super::Tagger) with a bounded outstanding window.
///
/// Publishing past the window encodes the message into a held buffer and
/// queues it with its id; confirms drain the queue in strict id order as
/// slots free up. At any time the number of emitted-but-unconfirmed
/// publications stays within the window.
pub struct Throttle {
    state: Rc<ConfirmState>,
}

impl fmt::Debug for Throttle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttle")
            .field("unacknowledged", &self.state.unacknowledged())
            .field("queued", &self.state.queued())
            .finish()
    }
}

impl Throttle {
    /// Puts the channel in confirm mode with the given window bound.
    pub fn new(channel: Channel, window: usize) -> Self {
        Self {
            state: ConfirmState::install(channel, window.max(1)),
        }
    }

    /// The wrapped channel.
    pub fn channel(&self) -> &Channel {
        self.state.channel()
    }

    /// Publishes a message; returns its publication id. Over-window
    /// publishes are held and released as confirms free slots.
    pub fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: BasicProperties,
        options: PublishOptions,
    ) -> Result<u64, Error> {
        self.state
            .publish(exchange, routing_key, body, properties, options)
    }

    /// Changes the window. Lowering it only takes effect on the next
    /// confirm; in-flight publications are never recalled.
    pub fn set_window(&mut self, window: usize) {
        self.state.set_window(window.max(1));
    }

    /// Number of publications awaiting a broker confirm.
    pub fn unacknowledged(&self) -> usize {
        self.state.unacknowledged()
    }

    /// Number of encoded publications held back by the window.
    pub fn queued(&self) -> usize {
        self.state.queued()
    }
}

impl ConfirmChannel for Throttle {
    fn publish_confirmed(
        &mut self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: BasicProperties,
        options: PublishOptions,
    ) -> Result<u64, Error> {
        self.publish(exchange, routing_key, body, properties, options)
    }

    fn unacknowledged(&self) -> usize {
        Throttle::unacknowledged(self)
    }

    fn set_observer(&mut self, observer: Box<dyn FnMut(u64, &ConfirmOutcome)>) {
        self.state.set_observer(observer);
    }
}
