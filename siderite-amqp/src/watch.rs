//! Re-entrancy-safe destruction detection
//!
//! Any public path that fans out to user callbacks constructs a
//! [`Monitor`] on the owning object's [`Watchable`] first. A callback is
//! free to tear the object down; the fan-out polls its monitor afterwards
//! and abandons the iteration instead of touching dead state.

use std::cell::Cell;
use std::rc::Rc;

/// A destruction witness owned by an engine object.
#[derive(Debug)]
pub(crate) struct Watchable {
    alive: Rc<Cell<bool>>,
}

impl Watchable {
    pub(crate) fn new() -> Self {
        Self {
            alive: Rc::new(Cell::new(true)),
        }
    }

    /// Creates a monitor observing this watchable.
    pub(crate) fn monitor(&self) -> Monitor {
        Monitor {
            alive: Rc::clone(&self.alive),
        }
    }

    /// Invalidates every live monitor. Called on teardown.
    pub(crate) fn invalidate(&self) {
        self.alive.set(false);
    }
}

impl Default for Watchable {
    fn default() -> Self {
        Self::new()
    }
}

/// A poll handle answering "is the watched object still alive".
#[derive(Debug, Clone)]
pub(crate) struct Monitor {
    alive: Rc<Cell<bool>>,
}

impl Monitor {
    /// A monitor whose watchable is already gone.
    pub(crate) fn dead() -> Self {
        Self {
            alive: Rc::new(Cell::new(false)),
        }
    }

    pub(crate) fn valid(&self) -> bool {
        self.alive.get()
    }
}
