//! One-shot continuations for synchronous AMQP requests
//!
//! Every synchronous operation returns a [`Deferred`] whose core also
//! sits in the owning channel's reply FIFO. A deferred resolves exactly
//! once with either a typed value or an error text; a finalize hook runs
//! on both outcomes. The outcome is cached, so a handler installed after
//! resolution (a `nowait` request resolves at the call site) still fires,
//! at installation time.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

enum Outcome<T> {
    Success(T),
    Error(String),
}

struct DeferredCore<T> {
    resolved: bool,
    outcome: Option<Outcome<T>>,
    on_success: Option<Box<dyn FnOnce(&T)>>,
    on_error: Option<Box<dyn FnOnce(&str)>>,
    on_finally: Option<Box<dyn FnOnce()>>,
}

impl<T> DeferredCore<T> {
    fn new() -> Self {
        Self {
            resolved: false,
            outcome: None,
            on_success: None,
            on_error: None,
            on_finally: None,
        }
    }
}

/// The engine-side handle used to settle a deferred.
pub(crate) struct DeferredHandle<T> {
    core: Rc<RefCell<DeferredCore<T>>>,
}

impl<T> Clone for DeferredHandle<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T> fmt::Debug for DeferredHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredHandle").finish_non_exhaustive()
    }
}

impl<T: 'static> DeferredHandle<T> {
    pub(crate) fn new() -> Self {
        Self {
            core: Rc::new(RefCell::new(DeferredCore::new())),
        }
    }

    /// Settles the deferred successfully. The error handler is released
    /// unfired; the finalize hook runs after the success handler.
    pub(crate) fn resolve(&self, value: T) {
        let mut core = self.core.borrow_mut();
        if core.resolved {
            return;
        }
        core.resolved = true;
        core.on_error = None;
        let success = core.on_success.take();
        let finally = core.on_finally.take();
        match success {
            Some(callback) => {
                drop(core);
                callback(&value);
            }
            None => {
                core.outcome = Some(Outcome::Success(value));
                drop(core);
            }
        }
        if let Some(finally) = finally {
            finally();
        }
    }

    /// Settles the deferred with an error text.
    pub(crate) fn reject(&self, message: &str) {
        let mut core = self.core.borrow_mut();
        if core.resolved {
            return;
        }
        core.resolved = true;
        core.on_success = None;
        let error = core.on_error.take();
        let finally = core.on_finally.take();
        match error {
            Some(callback) => {
                drop(core);
                callback(message);
            }
            None => {
                core.outcome = Some(Outcome::Error(message.to_owned()));
                drop(core);
            }
        }
        if let Some(finally) = finally {
            finally();
        }
    }

    fn install_success(&self, callback: Box<dyn FnOnce(&T)>) {
        let cached = {
            let mut core = self.core.borrow_mut();
            match core.outcome.take() {
                Some(Outcome::Success(value)) => Some(value),
                other => {
                    core.outcome = other;
                    core.on_success = Some(callback);
                    return;
                }
            }
        };
        if let Some(value) = cached {
            callback(&value);
        }
    }

    fn install_error(&self, callback: Box<dyn FnOnce(&str)>) {
        let cached = {
            let mut core = self.core.borrow_mut();
            match core.outcome.take() {
                Some(Outcome::Error(message)) => Some(message),
                other => {
                    core.outcome = other;
                    core.on_error = Some(callback);
                    return;
                }
            }
        };
        if let Some(message) = cached {
            callback(&message);
        }
    }

    fn install_finally(&self, callback: Box<dyn FnOnce()>) {
        let fire = {
            let mut core = self.core.borrow_mut();
            if core.resolved {
                true
            } else {
                core.on_finally = Some(callback);
                return;
            }
        };
        if fire {
            callback();
        }
    }
}

/// The outcome of a synchronous AMQP request.
///
/// Handlers chain by value; exactly one of the success and error paths
/// fires, followed by the finalize hook. Re-registering a handler
/// overwrites the previous one.
pub struct Deferred<T = ()> {
    handle: DeferredHandle<T>,
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}

impl<T: 'static> Deferred<T> {
    pub(crate) fn pending() -> (Self, DeferredHandle<T>) {
        let handle = DeferredHandle::new();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }

    pub(crate) fn from_handle(handle: DeferredHandle<T>) -> Self {
        Self { handle }
    }

    /// A deferred that already succeeded, used by `nowait` requests.
    pub(crate) fn resolved(value: T) -> Self {
        let handle = DeferredHandle::new();
        handle.resolve(value);
        Self { handle }
    }

    /// A deferred that already failed.
    pub(crate) fn rejected(message: impl AsRef<str>) -> Self {
        let handle = DeferredHandle::new();
        handle.reject(message.as_ref());
        Self { handle }
    }

    /// Installs the success handler.
    pub fn on_success(self, callback: impl FnOnce(&T) + 'static) -> Self {
        self.handle.install_success(Box::new(callback));
        self
    }

    /// Installs the error handler; it receives a textual message.
    pub fn on_error(self, callback: impl FnOnce(&str) + 'static) -> Self {
        self.handle.install_error(Box::new(callback));
        self
    }

    /// Installs the finalize hook; it runs after success or error alike.
    pub fn on_finally(self, callback: impl FnOnce() + 'static) -> Self {
        self.handle.install_finally(Box::new(callback));
        self
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::Deferred;

    #[test]
    fn resolves_exactly_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (deferred, handle) = Deferred::<u32>::pending();

        let l = Rc::clone(&log);
        let l2 = Rc::clone(&log);
        let l3 = Rc::clone(&log);
        let _deferred = deferred
            .on_success(move |value| l.borrow_mut().push(format!("ok {value}")))
            .on_error(move |message| l2.borrow_mut().push(format!("err {message}")))
            .on_finally(move || l3.borrow_mut().push("done".into()));

        handle.resolve(7);
        handle.resolve(8);
        handle.reject("late");

        assert_eq!(*log.borrow(), vec!["ok 7", "done"]);
    }

    #[test]
    fn error_path_runs_finalize() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (deferred, handle) = Deferred::<()>::pending();

        let l = Rc::clone(&log);
        let l2 = Rc::clone(&log);
        let _deferred = deferred
            .on_error(move |message| l.borrow_mut().push(message.to_owned()))
            .on_finally(move || l2.borrow_mut().push("done".into()));

        handle.reject("boom");
        assert_eq!(*log.borrow(), vec!["boom", "done"]);
    }

    #[test]
    fn handlers_installed_after_resolution_still_fire() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let deferred = Deferred::resolved(3_u32);

        let l = Rc::clone(&log);
        let l2 = Rc::clone(&log);
        let _deferred = deferred
            .on_success(move |value| l.borrow_mut().push(*value))
            .on_finally(move || l2.borrow_mut().push(0));

        assert_eq!(*log.borrow(), vec![3, 0]);
    }

    #[test]
    fn rejected_constructor_caches_the_message() {
        let seen = Rc::new(RefCell::new(String::new()));
        let s = Rc::clone(&seen);
        let _deferred =
            Deferred::<()>::rejected("channel is closed").on_error(move |m| *s.borrow_mut() = m.into());
        assert_eq!(&*seen.borrow(), "channel is closed");
    }
}
