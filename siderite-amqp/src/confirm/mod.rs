//! Publisher-confirm wrappers
//!
//! Layers over a channel in confirm mode:
//!
//! - [`Tagger`] assigns publication ids from 1 and tracks the ordered set
//!   of unacknowledged ids
//! - [`Throttle`] additionally bounds the outstanding window, queueing
//!   encoded publishes and releasing them in id order as confirms free
//!   slots
//! - [`Reliable`] layers per-publication ack/nack/lost handlers over
//!   either base
//!
//! On `basic.ack`/`basic.nack` with `multiple` set, every unacknowledged
//! id up to the tag resolves in ascending order. User handlers resolve
//! before freed window slots admit queued publishes. Every fan-out
//! observes a monitor and stops when a handler tears the channel down.

mod reliable;
mod state;
mod tagger;
mod throttle;

pub use reliable::{Publication, Reliable};
pub use tagger::Tagger;
pub use throttle::Throttle;

pub(crate) use state::ConfirmState;

use siderite_amqp_types::properties::BasicProperties;

use crate::channel::PublishOptions;
use crate::Error;

/// How a tracked publication settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The broker accepted the publication.
    Ack,

    /// The broker refused the publication.
    Nack,

    /// The channel went away before the broker answered.
    Lost(String),
}

/// A publisher whose publications carry broker-confirmed ids.
pub trait ConfirmChannel {
    /// Publishes a message and returns its publication id.
    fn publish_confirmed(
        &mut self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: BasicProperties,
        options: PublishOptions,
    ) -> Result<u64, Error>;

    /// Number of publications emitted but not yet confirmed.
    fn unacknowledged(&self) -> usize;

    /// Installs the per-publication resolution observer.
    #[doc(hidden)]
    fn set_observer(&mut self, observer: Box<dyn FnMut(u64, &ConfirmOutcome)>);
}

/// The channel-facing half: broker confirms and channel teardown are fed
/// through this.
pub(crate) trait ConfirmSink {
    fn on_ack(&self, tag: u64, multiple: bool);
    fn on_nack(&self, tag: u64, multiple: bool);
    fn on_close(&self, reason: &str);
}
