//! Consumer and get continuations
//!
//! A consumer deferred resolves "started" first, when `basic.consume-ok`
//! arrives, and then fires message callbacks until the consumer is
//! cancelled or the channel closes. The message callbacks come in two
//! completion modes: whole-message (one callback per reassembled
//! message) or streaming (begin, headers, one data callback per body
//! frame, complete), selected by which handlers are installed.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use siderite_amqp_types::primitives::ShortStr;
use siderite_amqp_types::properties::BasicProperties;

use crate::message::{Delivery, Message};

pub(crate) struct ConsumerCore {
    pub(crate) tag: Option<ShortStr>,
    pub(crate) dead: bool,
    pub(crate) failed: Option<String>,
    pub(crate) started: Option<Box<dyn FnOnce(&str)>>,
    pub(crate) message: Option<Box<dyn FnMut(Message, &Delivery)>>,
    pub(crate) begin: Option<Box<dyn FnMut(&Delivery)>>,
    pub(crate) headers: Option<Box<dyn FnMut(&BasicProperties, u64)>>,
    pub(crate) data: Option<Box<dyn FnMut(&[u8])>>,
    pub(crate) complete: Option<Box<dyn FnMut(&Delivery)>>,
    pub(crate) error: Option<Box<dyn FnOnce(&str)>>,
    pub(crate) streaming: bool,
}

impl ConsumerCore {
    pub(crate) fn new() -> Self {
        Self {
            tag: None,
            dead: false,
            failed: None,
            started: None,
            message: None,
            begin: None,
            headers: None,
            data: None,
            complete: None,
            error: None,
            streaming: false,
        }
    }

    /// Marks the consumer started and fires the started handler.
    pub(crate) fn start(core: &Rc<RefCell<Self>>, tag: &ShortStr) {
        let started = {
            let mut inner = core.borrow_mut();
            if inner.dead {
                return;
            }
            inner.tag = Some(tag.clone());
            inner.started.take()
        };
        if let Some(callback) = started {
            callback(tag.as_str());
        }
    }

    /// Tears the consumer down, firing its error handler when a reason
    /// is given.
    pub(crate) fn fail(core: &Rc<RefCell<Self>>, reason: Option<&str>) {
        let error = {
            let mut inner = core.borrow_mut();
            if inner.dead {
                return;
            }
            inner.dead = true;
            inner.started = None;
            inner.message = None;
            inner.begin = None;
            inner.headers = None;
            inner.data = None;
            inner.complete = None;
            inner.error.take()
        };
        if let (Some(callback), Some(reason)) = (error, reason) {
            callback(reason);
        }
    }
}

/// The outcome of `basic.consume`: a started notification followed by
/// message callbacks.
pub struct DeferredConsumer {
    pub(crate) core: Rc<RefCell<ConsumerCore>>,
}

impl fmt::Debug for DeferredConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredConsumer").finish_non_exhaustive()
    }
}

impl DeferredConsumer {
    pub(crate) fn new(core: Rc<RefCell<ConsumerCore>>) -> Self {
        Self { core }
    }

    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        let mut core = ConsumerCore::new();
        core.dead = true;
        core.failed = Some(message.into());
        Self {
            core: Rc::new(RefCell::new(core)),
        }
    }

    /// Installs the started handler; it receives the consumer tag.
    pub fn on_success(self, callback: impl FnOnce(&str) + 'static) -> Self {
        let core = Rc::clone(&self.core);
        let cached = {
            let mut inner = core.borrow_mut();
            if inner.dead {
                None
            } else if let Some(tag) = inner.tag.clone() {
                Some(tag)
            } else {
                inner.started = Some(Box::new(callback));
                return self;
            }
        };
        if let Some(tag) = cached {
            callback(tag.as_str());
        }
        self
    }

    /// Installs the whole-message handler: one callback per reassembled
    /// message.
    pub fn on_message(self, callback: impl FnMut(Message, &Delivery) + 'static) -> Self {
        let mut core = self.core.borrow_mut();
        if !core.dead {
            core.message = Some(Box::new(callback));
            core.streaming = false;
        }
        drop(core);
        self
    }

    /// Installs the streaming begin handler and selects streaming mode.
    pub fn on_begin(self, callback: impl FnMut(&Delivery) + 'static) -> Self {
        let mut core = self.core.borrow_mut();
        if !core.dead {
            core.begin = Some(Box::new(callback));
            core.streaming = true;
        }
        drop(core);
        self
    }

    /// Installs the streaming headers handler, invoked with the message
    /// properties and the declared body size.
    pub fn on_headers(self, callback: impl FnMut(&BasicProperties, u64) + 'static) -> Self {
        let mut core = self.core.borrow_mut();
        if !core.dead {
            core.headers = Some(Box::new(callback));
            core.streaming = true;
        }
        drop(core);
        self
    }

    /// Installs the streaming data handler, invoked once per body frame.
    pub fn on_data(self, callback: impl FnMut(&[u8]) + 'static) -> Self {
        let mut core = self.core.borrow_mut();
        if !core.dead {
            core.data = Some(Box::new(callback));
            core.streaming = true;
        }
        drop(core);
        self
    }

    /// Installs the streaming completion handler.
    pub fn on_complete(self, callback: impl FnMut(&Delivery) + 'static) -> Self {
        let mut core = self.core.borrow_mut();
        if !core.dead {
            core.complete = Some(Box::new(callback));
            core.streaming = true;
        }
        drop(core);
        self
    }

    /// Installs the error handler.
    pub fn on_error(self, callback: impl FnOnce(&str) + 'static) -> Self {
        let core = Rc::clone(&self.core);
        let cached = {
            let mut inner = core.borrow_mut();
            match inner.failed.take() {
                Some(message) => Some(message),
                None => {
                    inner.error = Some(Box::new(callback));
                    return self;
                }
            }
        };
        if let Some(message) = cached {
            callback(&message);
        }
        self
    }
}

pub(crate) struct GetCore {
    pub(crate) dead: bool,
    pub(crate) failed: Option<String>,
    pub(crate) message: Option<Box<dyn FnOnce(Message, &Delivery)>>,
    pub(crate) empty: Option<Box<dyn FnOnce()>>,
    pub(crate) error: Option<Box<dyn FnOnce(&str)>>,
}

impl GetCore {
    pub(crate) fn new() -> Self {
        Self {
            dead: false,
            failed: None,
            message: None,
            empty: None,
            error: None,
        }
    }

    pub(crate) fn fail(core: &Rc<RefCell<Self>>, reason: Option<&str>) {
        let error = {
            let mut inner = core.borrow_mut();
            if inner.dead {
                return;
            }
            inner.dead = true;
            inner.message = None;
            inner.empty = None;
            inner.error.take()
        };
        if let (Some(callback), Some(reason)) = (error, reason) {
            callback(reason);
        }
    }
}

/// The outcome of `basic.get`: either one message or an empty-queue
/// notification.
pub struct DeferredGet {
    pub(crate) core: Rc<RefCell<GetCore>>,
}

impl fmt::Debug for DeferredGet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredGet").finish_non_exhaustive()
    }
}

impl DeferredGet {
    pub(crate) fn new(core: Rc<RefCell<GetCore>>) -> Self {
        Self { core }
    }

    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        let mut core = GetCore::new();
        core.dead = true;
        core.failed = Some(message.into());
        Self {
            core: Rc::new(RefCell::new(core)),
        }
    }

    /// Installs the message handler. The delivery carries the tag to
    /// acknowledge with and the remaining message count.
    pub fn on_message(self, callback: impl FnOnce(Message, &Delivery) + 'static) -> Self {
        let mut core = self.core.borrow_mut();
        if !core.dead {
            core.message = Some(Box::new(callback));
        }
        drop(core);
        self
    }

    /// Installs the empty-queue handler.
    pub fn on_empty(self, callback: impl FnOnce() + 'static) -> Self {
        let mut core = self.core.borrow_mut();
        if !core.dead {
            core.empty = Some(Box::new(callback));
        }
        drop(core);
        self
    }

    /// Installs the error handler.
    pub fn on_error(self, callback: impl FnOnce(&str) + 'static) -> Self {
        let core = Rc::clone(&self.core);
        let cached = {
            let mut inner = core.borrow_mut();
            match inner.failed.take() {
                Some(message) => Some(message),
                None => {
                    inner.error = Some(Box::new(callback));
                    return self;
                }
            }
        };
        if let Some(message) = cached {
            callback(&message);
        }
        self
    }
}
