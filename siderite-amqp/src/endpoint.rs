//! The transport contract consumed by the kernel
//!
//! The engine never opens sockets, resolves names, manages TLS or
//! schedules timers; all of that lives behind [`Transport`]. The kernel
//! drives the transport synchronously from whichever call produced the
//! outbound bytes or the notification.

use crate::Error;

/// The byte-sink and notification surface the connection kernel drives.
///
/// Implementations must not call back into the engine from inside
/// `send_bytes` or `negotiate_heartbeat`; the notification callbacks
/// (`on_connected`, `on_error`, ...) are invoked with the engine quiescent
/// and may re-enter it freely.
pub trait Transport {
    /// Ship bytes to the peer. The transport buffers as needed; partial
    /// writes must not be surfaced to the kernel.
    fn send_bytes(&mut self, data: &[u8]);

    /// The peer suggested a heartbeat interval of `suggested` seconds;
    /// return the interval to commit to, 0 to disable heartbeats.
    ///
    /// Emitting the periodic heartbeat is the transport's job: schedule a
    /// timer for the returned interval and call
    /// [`Connection::heartbeat`](crate::connection::Connection::heartbeat)
    /// from it.
    fn negotiate_heartbeat(&mut self, suggested: u16) -> u16 {
        suggested
    }

    /// The handshake completed and the connection is usable.
    fn on_connected(&mut self) {}

    /// The connection reached its terminal state.
    fn on_closed(&mut self) {}

    /// The connection failed; it is already closed when this fires.
    fn on_error(&mut self, _error: &Error) {}

    /// The broker stopped accepting publishes.
    fn on_blocked(&mut self, _reason: &str) {}

    /// The broker resumed accepting publishes.
    fn on_unblocked(&mut self) {}
}
