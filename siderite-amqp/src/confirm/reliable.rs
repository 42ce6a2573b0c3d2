//! Per-publication handlers over a confirmed publisher

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use siderite_amqp_types::properties::BasicProperties;

use crate::channel::PublishOptions;
use crate::Error;

use super::{ConfirmChannel, ConfirmOutcome, Tagger};

#[derive(Default)]
struct PublicationHandlers {
    on_ack: Option<Box<dyn FnOnce()>>,
    on_nack: Option<Box<dyn FnOnce()>>,
    on_lost: Option<Box<dyn FnOnce(&str)>>,
}

type HandlerMap = Rc<RefCell<BTreeMap<u64, PublicationHandlers>>>;

/// Maps publication ids to ack/nack/lost handler triples over any
/// confirmed publisher.
///
/// With `multiple` confirms, handlers resolve in ascending id order,
/// each exactly once. On channel error every outstanding handler
/// receives its lost callback.
pub struct Reliable<B = Tagger> {
    base: B,
    handlers: HandlerMap,
}

impl<B> fmt::Debug for Reliable<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reliable")
            .field("tracked", &self.handlers.borrow().len())
            .finish()
    }
}

impl<B: ConfirmChannel> Reliable<B> {
    /// Layers per-publication handlers over `base`.
    pub fn new(mut base: B) -> Self {
        let handlers: HandlerMap = Rc::new(RefCell::new(BTreeMap::new()));
        let weak = Rc::downgrade(&handlers);
        base.set_observer(Box::new(move |id, outcome| {
            dispatch(&weak, id, outcome);
        }));
        Self { base, handlers }
    }

    /// Publishes a message; chain handlers on the returned publication.
    ///
    /// The engine is synchronous, so no confirm can arrive before the
    /// handlers are installed.
    pub fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: BasicProperties,
        options: PublishOptions,
    ) -> Result<Publication, Error> {
        let id = self
            .base
            .publish_confirmed(exchange, routing_key, body, properties, options)?;
        self.handlers
            .borrow_mut()
            .insert(id, PublicationHandlers::default());
        Ok(Publication {
            id,
            handlers: Rc::downgrade(&self.handlers),
        })
    }

    /// The wrapped publisher.
    pub fn base(&self) -> &B {
        &self.base
    }

    /// Number of publications awaiting a broker confirm.
    pub fn unacknowledged(&self) -> usize {
        self.base.unacknowledged()
    }

    /// Number of publications whose handlers have not resolved.
    pub fn tracked(&self) -> usize {
        self.handlers.borrow().len()
    }
}

fn dispatch(handlers: &Weak<RefCell<BTreeMap<u64, PublicationHandlers>>>, id: u64, outcome: &ConfirmOutcome) {
    let Some(handlers) = handlers.upgrade() else {
        return;
    };
    let entry = handlers.borrow_mut().remove(&id);
    let Some(entry) = entry else {
        return;
    };
    match outcome {
        ConfirmOutcome::Ack => {
            if let Some(callback) = entry.on_ack {
                callback();
            }
        }
        ConfirmOutcome::Nack => {
            if let Some(callback) = entry.on_nack {
                callback();
            }
        }
        ConfirmOutcome::Lost(reason) => {
            if let Some(callback) = entry.on_lost {
                callback(reason);
            }
        }
    }
}

/// A tracked publication; chains handlers for its confirm outcome.
pub struct Publication {
    id: u64,
    handlers: Weak<RefCell<BTreeMap<u64, PublicationHandlers>>>,
}

impl fmt::Debug for Publication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publication").field("id", &self.id).finish()
    }
}

impl Publication {
    /// The publication id the broker will confirm.
    pub fn id(&self) -> u64 {
        self.id
    }

    fn install(
        self,
        apply: impl FnOnce(&mut PublicationHandlers),
    ) -> Self {
        if let Some(handlers) = self.handlers.upgrade() {
            if let Some(entry) = handlers.borrow_mut().get_mut(&self.id) {
                apply(entry);
            }
        }
        self
    }

    /// Installs the handler fired when the broker accepts the
    /// publication.
    pub fn on_ack(self, callback: impl FnOnce() + 'static) -> Self {
        self.install(|entry| entry.on_ack = Some(Box::new(callback)))
    }

    /// Installs the handler fired when the broker refuses the
    /// publication.
    pub fn on_nack(self, callback: impl FnOnce() + 'static) -> Self {
        self.install(|entry| entry.on_nack = Some(Box::new(callback)))
    }

    /// Installs the handler fired when the channel goes away before the
    /// broker answers.
    pub fn on_lost(self, callback: impl FnOnce(&str) + 'static) -> Self {
        self.install(|entry| entry.on_lost = Some(Box::new(callback)))
    }
}
