//! Shared bookkeeping behind the confirm wrappers

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

use bytes::Bytes;
use tracing::trace;

use siderite_amqp_types::properties::BasicProperties;

use crate::channel::{Channel, PublishOptions};
use crate::watch::Monitor;
use crate::Error;

use super::{ConfirmOutcome, ConfirmSink};

struct ConfirmData {
    next: u64,
    unacked: BTreeSet<u64>,
    window: usize,
    queue: VecDeque<(u64, Bytes)>,
    observer: Option<Box<dyn FnMut(u64, &ConfirmOutcome)>>,
    // lost notifications stashed while the observer is out on loan
    lost_pending: Vec<u64>,
    lost_reason: String,
    dead: bool,
}

/// Publication bookkeeping shared by [`Tagger`](super::Tagger) and
/// [`Throttle`](super::Throttle). Also the [`ConfirmSink`] the channel
/// feeds broker confirms into.
pub(crate) struct ConfirmState {
    channel: Channel,
    data: RefCell<ConfirmData>,
}

impl ConfirmState {
    /// Selects confirm mode on the channel, registers the sink and
    /// returns the shared state. A `window` of `usize::MAX` disables
    /// throttling.
    pub(crate) fn install(channel: Channel, window: usize) -> Rc<Self> {
        let state = Rc::new(Self {
            channel,
            data: RefCell::new(ConfirmData {
                next: 1,
                unacked: BTreeSet::new(),
                window,
                queue: VecDeque::new(),
                observer: None,
                lost_pending: Vec::new(),
                lost_reason: String::new(),
                dead: false,
            }),
        });
        let _select = state.channel.confirm_select(false);
        let sink: Rc<dyn ConfirmSink> = Rc::clone(&state) as Rc<dyn ConfirmSink>;
        state.channel.install_confirm_sink(Rc::downgrade(&sink));
        state
    }

    pub(crate) fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Assigns the next publication id and either sends the encoded
    /// publish or, when the window is full, holds it for a freed slot.
    pub(crate) fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: BasicProperties,
        options: PublishOptions,
    ) -> Result<u64, Error> {
        if self.data.borrow().dead {
            return Err(Error::ChannelClosed);
        }
        let bytes = self
            .channel
            .encode_publish(exchange, routing_key, body, properties, options)?;
        let (id, to_send) = {
            let mut data = self.data.borrow_mut();
            let id = data.next;
            data.next += 1;
            if data.unacked.len() < data.window {
                data.unacked.insert(id);
                (id, Some(bytes))
            } else {
                trace!(id, "publication held back by the confirm window");
                data.queue.push_back((id, bytes));
                (id, None)
            }
        };
        if let Some(bytes) = to_send {
            self.channel.send_raw(bytes)?;
        }
        Ok(id)
    }

    pub(crate) fn unacknowledged(&self) -> usize {
        self.data.borrow().unacked.len()
    }

    pub(crate) fn queued(&self) -> usize {
        self.data.borrow().queue.len()
    }

    /// Changes the window bound; effective when the next confirm drains
    /// the queue. In-flight publications are never recalled.
    pub(crate) fn set_window(&self, window: usize) {
        self.data.borrow_mut().window = window;
    }

    pub(crate) fn set_observer(&self, observer: Box<dyn FnMut(u64, &ConfirmOutcome)>) {
        self.data.borrow_mut().observer = Some(observer);
    }

    fn resolve(&self, tag: u64, multiple: bool, acked: bool) {
        let resolved: Vec<u64> = {
            let mut data = self.data.borrow_mut();
            if data.dead {
                return;
            }
            let ids: Vec<u64> = if multiple {
                data.unacked.range(..=tag).copied().collect()
            } else if data.unacked.contains(&tag) {
                vec![tag]
            } else {
                // an unknown single tag is ignored
                Vec::new()
            };
            for id in &ids {
                data.unacked.remove(id);
            }
            ids
        };

        let outcome = if acked {
            ConfirmOutcome::Ack
        } else {
            ConfirmOutcome::Nack
        };
        let monitor = self.channel.watch_monitor();

        // user handlers first, in ascending id order; queued publishes
        // enter the freed slots only afterwards
        for id in resolved {
            let taken = { self.data.borrow_mut().observer.take() };
            if let Some(mut callback) = taken {
                callback(id, &outcome);
                let mut data = self.data.borrow_mut();
                if data.dead {
                    // a handler tore the channel down while the observer
                    // was out on loan; deliver the stashed losses with it
                    let lost = std::mem::take(&mut data.lost_pending);
                    let reason = std::mem::take(&mut data.lost_reason);
                    drop(data);
                    let lost_outcome = ConfirmOutcome::Lost(reason);
                    for lost_id in lost {
                        callback(lost_id, &lost_outcome);
                    }
                    return;
                }
                data.observer = Some(callback);
            }
            if !monitor.valid() {
                return;
            }
        }

        self.drain_queue(&monitor);
    }

    fn drain_queue(&self, monitor: &Monitor) {
        loop {
            let next = {
                let mut data = self.data.borrow_mut();
                if data.dead || data.unacked.len() >= data.window {
                    None
                } else {
                    data.queue.pop_front()
                }
            };
            let Some((id, bytes)) = next else {
                return;
            };
            self.data.borrow_mut().unacked.insert(id);
            trace!(id, "releasing held publication");
            if self.channel.send_raw(bytes).is_err() {
                return;
            }
            if !monitor.valid() {
                return;
            }
        }
    }
}

impl ConfirmSink for ConfirmState {
    fn on_ack(&self, tag: u64, multiple: bool) {
        self.resolve(tag, multiple, true);
    }

    fn on_nack(&self, tag: u64, multiple: bool) {
        self.resolve(tag, multiple, false);
    }

    fn on_close(&self, reason: &str) {
        let (ids, observer) = {
            let mut data = self.data.borrow_mut();
            if data.dead {
                return;
            }
            data.dead = true;
            // everything outstanding, emitted before queued, is lost in
            // ascending id order
            let mut ids: Vec<u64> = data.unacked.iter().copied().collect();
            ids.extend(data.queue.iter().map(|(id, _)| *id));
            data.unacked.clear();
            data.queue.clear();
            match data.observer.take() {
                Some(observer) => (ids, observer),
                None => {
                    data.lost_pending = ids;
                    data.lost_reason = reason.to_owned();
                    return;
                }
            }
        };
        let mut callback = observer;
        let outcome = ConfirmOutcome::Lost(reason.to_owned());
        for id in ids {
            callback(id, &outcome);
        }
    }
}
