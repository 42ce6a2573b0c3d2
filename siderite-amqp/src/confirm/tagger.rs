//! The base confirm wrapper

use std::fmt;
use std::rc::Rc;

use siderite_amqp_types::properties::BasicProperties;

use crate::channel::{Channel, PublishOptions};
use crate::Error;

use super::{ConfirmChannel, ConfirmOutcome, ConfirmState};

/// Wraps a channel in publisher-confirm mode, assigning monotonically
/// increasing publication ids starting at 1 and tracking the ordered set
/// of unacknowledged ids.
///
/// Constructing the tagger executes `confirm.select` on the channel.
pub struct Tagger {
    state: Rc<ConfirmState>,
}

impl fmt::Debug for Tagger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tagger")
            .field("unacknowledged", &self.state.unacknowledged())
            .finish()
    }
}

impl Tagger {
    /// Puts the channel in confirm mode and takes over its confirms.
    pub fn new(channel: Channel) -> Self {
        Self {
            state: ConfirmState::install(channel, usize::MAX),
        }
    }

    /// The wrapped channel.
    pub fn channel(&self) -> &Channel {
        self.state.channel()
    }

    /// Publishes a message; returns its publication id.
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

    /// Number of publications awaiting a broker confirm.
    pub fn unacknowledged(&self) -> usize {
        self.state.unacknowledged()
    }
}

impl ConfirmChannel for Tagger {
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
        Tagger::unacknowledged(self)
    }

    fn set_observer(&mut self, observer: Box<dyn FnMut(u64, &ConfirmOutcome)>) {
        self.state.set_observer(observer);
    }
}
