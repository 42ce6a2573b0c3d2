//! The connection kernel
//!
//! Owns the handshake, the tuning negotiation, the channel table and the
//! pre-handshake send queue. The kernel is strictly single-threaded and
//! sans-I/O: bytes come in through [`Connection::ingest`], bytes and
//! notifications go out through the [`Transport`] collaborator, and every
//! callback fires inline from whichever call produced it.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use bytes::{Bytes, BytesMut};
use tracing::{debug, error, trace};

use siderite_amqp_types::methods::{
    channel as channel_methods, connection as connection_methods, Method,
};
use siderite_amqp_types::primitives::{FieldTable, ShortStr};

use crate::channel::{self, Channel, ChannelInner, Pending};
use crate::deferred::{Deferred, DeferredHandle};
use crate::endpoint::Transport;
use crate::frames::{self, Frame, FramePayload, PROTOCOL_HEADER};
use crate::sasl::SaslProfile;
use crate::Error;

mod builder;
pub use builder::Builder;

/// The frame-max proposed to the server when the builder does not
/// override it.
pub const DEFAULT_FRAME_MAX: u32 = 131_072;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Nothing has been sent yet.
    Protocol,

    /// The protocol preamble is out; start, tune and open are being
    /// exchanged. Application frames are queued.
    Handshake,

    /// `connection.open-ok` received; application traffic flows.
    Connected,

    /// A client-initiated close awaits its `close-ok`. No outbound
    /// application frame leaves this state.
    Closing,

    /// Terminal.
    Closed,
}

/// Work produced while the kernel holds its own borrows, performed once
/// they are released. Draining is re-entrancy safe: a transport callback
/// that re-enters the engine only appends, and the outer drain picks the
/// new effects up.
pub(crate) enum Effect {
    Send(Bytes),
    Connected,
    Closed,
    Blocked(String),
    Unblocked,
    Failed(Error),
}

type SharedTransport = Rc<RefCell<Box<dyn Transport>>>;

pub(crate) struct ConnectionInner {
    transport: SharedTransport,
    state: ConnectionState,
    profile: SaslProfile,
    vhost: ShortStr,
    locale: ShortStr,
    client_properties: FieldTable,
    local_channel_max: u16,
    local_frame_max: u32,
    local_heartbeat: u16,
    channel_max: u16,
    frame_max: u32,
    heartbeat: u16,
    channels: BTreeMap<u16, Rc<RefCell<ChannelInner>>>,
    next_channel: u16,
    pending_send: VecDeque<Bytes>,
    pending_bytes: usize,
    close_request: Option<DeferredHandle<()>>,
    effects: VecDeque<Effect>,
    draining: bool,
}

impl ConnectionInner {
    pub(crate) fn frame_max(&self) -> u32 {
        self.frame_max
    }

    /// The pre-handshake queue is bounded by `frame_max × channel_max`
    /// bytes.
    fn buffer_capacity(&self) -> usize {
        let channels = if self.channel_max == 0 {
            u16::MAX
        } else {
            self.channel_max
        } as usize;
        let frame = if self.frame_max == 0 {
            DEFAULT_FRAME_MAX
        } else {
            self.frame_max
        } as usize;
        frame.saturating_mul(channels)
    }

    pub(crate) fn send_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        let size = frame.size();
        if self.frame_max != 0 && size > self.frame_max as usize {
            return Err(Error::Frame(frames::Error::TooLarge {
                size,
                max: self.frame_max as usize,
            }));
        }
        let mut buf = BytesMut::with_capacity(size);
        frame.encode(&mut buf);
        self.dispatch_bytes(buf.freeze())
    }

    /// Ships application bytes, or queues them while the handshake is
    /// still in flight. Nothing leaves a closing or closed connection.
    pub(crate) fn dispatch_bytes(&mut self, bytes: Bytes) -> Result<(), Error> {
        match self.state {
            ConnectionState::Connected => {
                self.effects.push_back(Effect::Send(bytes));
                Ok(())
            }
            ConnectionState::Protocol | ConnectionState::Handshake => {
                if self.pending_bytes + bytes.len() > self.buffer_capacity() {
                    return Err(Error::BufferFull);
                }
                self.pending_bytes += bytes.len();
                self.pending_send.push_back(bytes);
                Ok(())
            }
            ConnectionState::Closing | ConnectionState::Closed => Err(Error::ConnectionClosed),
        }
    }

    /// Handshake and close control frames bypass the queue and the state
    /// checks.
    fn send_control(&mut self, frame: &Frame) {
        let mut buf = BytesMut::with_capacity(frame.size());
        frame.encode(&mut buf);
        self.effects.push_back(Effect::Send(buf.freeze()));
    }

    pub(crate) fn remove_channel(&mut self, id: u16) {
        self.channels.remove(&id);
    }

    /// Scans for a free channel id from the last allocation point,
    /// wrapping at the negotiated maximum and skipping live ids.
    /// Returns 0 when every id is taken.
    fn allocate_channel_id(&mut self) -> u16 {
        let max = if self.channel_max == 0 {
            u16::MAX
        } else {
            self.channel_max
        };
        let mut candidate = if self.next_channel == 0 || self.next_channel > max {
            1
        } else {
            self.next_channel
        };
        for _ in 0..max {
            if !self.channels.contains_key(&candidate) {
                self.next_channel = if candidate >= max { 1 } else { candidate + 1 };
                return candidate;
            }
            candidate = if candidate >= max { 1 } else { candidate + 1 };
        }
        0
    }
}

/// Performs the queued transport work once every engine borrow is
/// released. Nested calls (from a transport notification that re-enters
/// the engine) return immediately; the outermost drain finishes the
/// queue.
pub(crate) fn drain_effects(conn: &Rc<RefCell<ConnectionInner>>) {
    {
        let mut inner = conn.borrow_mut();
        if inner.draining {
            return;
        }
        inner.draining = true;
    }
    loop {
        let effect = { conn.borrow_mut().effects.pop_front() };
        let Some(effect) = effect else {
            break;
        };
        let transport = { Rc::clone(&conn.borrow().transport) };
        let mut transport = transport.borrow_mut();
        match effect {
            Effect::Send(bytes) => transport.send_bytes(&bytes),
            Effect::Connected => transport.on_connected(),
            Effect::Closed => transport.on_closed(),
            Effect::Blocked(reason) => transport.on_blocked(&reason),
            Effect::Unblocked => transport.on_unblocked(),
            Effect::Failed(err) => transport.on_error(&err),
        }
    }
    conn.borrow_mut().draining = false;
}

/// Fails the whole connection: terminal state, every channel's deferreds
/// and consumers failed in channel-id order, then the transport is told.
pub(crate) fn fail_connection(conn: &Rc<RefCell<ConnectionInner>>, err: Error) -> Error {
    let channels = {
        let mut inner = conn.borrow_mut();
        if inner.state == ConnectionState::Closed {
            return err;
        }
        inner.state = ConnectionState::Closed;
        inner.pending_send.clear();
        inner.pending_bytes = 0;
        std::mem::take(&mut inner.channels)
    };
    error!(error = %err, "connection failed");
    let reason = err.to_string();
    for (_, chan) in channels {
        channel::teardown(&chan, None, Some(&reason), false);
    }
    let close_request = { conn.borrow_mut().close_request.take() };
    if let Some(handle) = close_request {
        handle.reject(&reason);
    }
    {
        let mut inner = conn.borrow_mut();
        inner.effects.push_back(Effect::Failed(err.clone()));
        inner.effects.push_back(Effect::Closed);
    }
    drain_effects(conn);
    err
}

/// A handle to a connection.
///
/// The handle may be cloned; all clones drive the same kernel. Dropping
/// the last handle closes the connection without firing callbacks.
pub struct Connection {
    inner: Rc<RefCell<ConnectionInner>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.inner.borrow().state)
            .finish()
    }
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if Rc::strong_count(&self.inner) > 1 {
            return;
        }
        let channels = {
            let mut inner = self.inner.borrow_mut();
            if inner.state == ConnectionState::Closed {
                return;
            }
            if inner.state == ConnectionState::Connected {
                let method = Method::from(connection_methods::Close {
                    reply_code: 200,
                    reply_text: ShortStr::default(),
                    class_id: 0,
                    method_id: 0,
                });
                inner.send_control(&Frame::new(0, method));
            }
            inner.state = ConnectionState::Closed;
            std::mem::take(&mut inner.channels)
        };
        // dropped outside the borrow: a channel callback dropping its
        // own handle must not find the connection locked
        drop(channels);
        drain_effects(&self.inner);
    }
}

impl Connection {
    /// Opens a connection with default tuning: sends the protocol
    /// preamble immediately and returns with the handshake in flight.
    pub fn open(
        transport: Box<dyn Transport>,
        profile: impl Into<SaslProfile>,
        vhost: &str,
    ) -> Result<Connection, Error> {
        Builder::new()
            .login(profile)
            .virtual_host(vhost)
            .open(transport)
    }

    pub(crate) fn from_inner(inner: Rc<RefCell<ConnectionInner>>) -> Self {
        Self { inner }
    }

    /// The connection's lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.borrow().state
    }

    /// The negotiated maximum frame size, 0 meaning unlimited.
    pub fn frame_max(&self) -> u32 {
        self.inner.borrow().frame_max
    }

    /// The negotiated channel limit, 0 meaning unbounded.
    pub fn channel_max(&self) -> u16 {
        self.inner.borrow().channel_max
    }

    /// The heartbeat interval committed during tuning, 0 when disabled.
    pub fn heartbeat_interval(&self) -> u16 {
        self.inner.borrow().heartbeat
    }

    /// The minimum number of bytes [`Connection::ingest`] needs to make
    /// progress on `data`.
    pub fn expected(&self, data: &[u8]) -> usize {
        Frame::expected(data)
    }

    /// Emits a heartbeat frame. The transport owns the timer; it calls
    /// this when the negotiated interval elapses.
    pub fn heartbeat(&self) -> Result<(), Error> {
        let result = { self.inner.borrow_mut().send_frame(&Frame::heartbeat()) };
        drain_effects(&self.inner);
        result
    }

    /// Opens a channel, allocating the next free id.
    pub fn open_channel(&self) -> Result<Channel, Error> {
        let id = {
            let mut inner = self.inner.borrow_mut();
            match inner.state {
                ConnectionState::Closing | ConnectionState::Closed => {
                    return Err(Error::ConnectionClosed)
                }
                _ => {}
            }
            let id = inner.allocate_channel_id();
            if id == 0 {
                return Err(Error::ChannelLimitExceeded);
            }
            id
        };
        let opened = DeferredHandle::new();
        let chan = Rc::new(RefCell::new(ChannelInner::new(id)));
        chan.borrow_mut()
            .pending
            .push_back(Pending::Open(opened.clone()));
        self.inner.borrow_mut().channels.insert(id, Rc::clone(&chan));
        debug!(channel = id, "opening channel");

        let result = {
            let frame = Frame::new(id, Method::from(channel_methods::Open::default()));
            self.inner.borrow_mut().send_frame(&frame)
        };
        drain_effects(&self.inner);
        if let Err(err) = result {
            self.inner.borrow_mut().channels.remove(&id);
            return Err(err);
        }
        Ok(Channel::new(
            id,
            Rc::downgrade(&chan),
            Rc::downgrade(&self.inner),
            opened,
        ))
    }

    /// Closes the connection. Every channel fails immediately; the
    /// deferred resolves when the broker confirms the close.
    pub fn close(&self) -> Deferred<()> {
        match self.inner.borrow().state {
            ConnectionState::Closing | ConnectionState::Closed => {
                return Deferred::rejected(Error::ConnectionClosed.to_string())
            }
            _ => {}
        }
        debug!("closing connection");
        let channels = { std::mem::take(&mut self.inner.borrow_mut().channels) };
        for (_, chan) in channels {
            channel::teardown(&chan, None, Some("connection is closed"), false);
        }
        let (deferred, handle) = Deferred::pending();
        {
            let mut inner = self.inner.borrow_mut();
            inner.pending_send.clear();
            inner.pending_bytes = 0;
            inner.close_request = Some(handle);
            let method = Method::from(connection_methods::Close {
                reply_code: 200,
                reply_text: ShortStr::new("OK").unwrap_or_default(),
                class_id: 0,
                method_id: 0,
            });
            inner.send_control(&Frame::new(0, method));
            inner.state = ConnectionState::Closing;
        }
        drain_effects(&self.inner);
        deferred
    }

    /// Feeds broker bytes into the engine and returns how many were
    /// consumed. Partial frames consume nothing; present the same bytes
    /// plus more on the next call. The engine keeps no receive buffer.
    pub fn ingest(&self, data: &[u8]) -> Result<usize, Error> {
        let mut consumed = 0;
        while consumed < data.len() {
            if self.inner.borrow().state == ConnectionState::Closed {
                break;
            }
            match Frame::parse(&data[consumed..]) {
                Ok(Some((frame, used))) => {
                    consumed += used;
                    if let Err(err) = self.process(frame) {
                        return Err(fail_connection(&self.inner, err));
                    }
                }
                Ok(None) => break,
                Err(frame_err) => {
                    return Err(fail_connection(&self.inner, Error::Frame(frame_err)));
                }
            }
        }
        drain_effects(&self.inner);
        Ok(consumed)
    }

    fn process(&self, frame: Frame) -> Result<(), Error> {
        if frame.channel == 0 {
            return self.on_connection_frame(frame.payload);
        }
        let state = self.inner.borrow().state;
        if matches!(state, ConnectionState::Closing | ConnectionState::Closed) {
            // in-flight channel traffic during a close race is discarded
            return Ok(());
        }
        let chan = self.inner.borrow().channels.get(&frame.channel).cloned();
        match chan {
            None => Err(Error::Protocol(format!(
                "frame on unknown channel {}",
                frame.channel
            ))),
            Some(chan) => {
                if let Err(err) = channel::process_frame(&chan, &self.inner, frame.payload) {
                    error!(channel = frame.channel, error = %err, "channel protocol violation");
                    channel::teardown(&chan, Some(&self.inner), Some(&err.to_string()), false);
                    drain_effects(&self.inner);
                }
                Ok(())
            }
        }
    }

    fn on_connection_frame(&self, payload: FramePayload) -> Result<(), Error> {
        let method = match payload {
            FramePayload::Heartbeat => return Ok(()),
            FramePayload::Method(method) => method,
            FramePayload::Header(_) | FramePayload::Body(_) => {
                return Err(Error::Protocol("content frame on channel 0".into()))
            }
        };
        trace!(method = ?method, "connection recv");
        let state = self.inner.borrow().state;
        match (state, method) {
            (_, Method::ConnectionClose(close)) => self.on_peer_close(close),
            (ConnectionState::Handshake, Method::ConnectionStart(start)) => self.on_start(start),
            (ConnectionState::Handshake, Method::ConnectionSecure(secure)) => {
                self.on_secure(secure)
            }
            (ConnectionState::Handshake, Method::ConnectionTune(tune)) => self.on_tune(tune),
            (ConnectionState::Handshake, Method::ConnectionOpenOk(_)) => self.on_open_ok(),
            (ConnectionState::Closing, Method::ConnectionCloseOk(_)) => {
                self.finish_close();
                Ok(())
            }
            (ConnectionState::Connected, Method::ConnectionBlocked(blocked)) => {
                self.inner
                    .borrow_mut()
                    .effects
                    .push_back(Effect::Blocked(blocked.reason.to_string()));
                Ok(())
            }
            (ConnectionState::Connected, Method::ConnectionUnblocked(_)) => {
                self.inner.borrow_mut().effects.push_back(Effect::Unblocked);
                Ok(())
            }
            (ConnectionState::Closing | ConnectionState::Closed, _) => Ok(()),
            (state, method) => Err(Error::Protocol(format!(
                "unexpected method {}.{} in state {:?}",
                method.class_id(),
                method.method_id(),
                state
            ))),
        }
    }

    fn on_start(&self, start: connection_methods::Start) -> Result<(), Error> {
        let mechanisms = String::from_utf8_lossy(start.mechanisms.as_bytes()).into_owned();
        debug!(
            version_major = start.version_major,
            version_minor = start.version_minor,
            mechanisms = %mechanisms,
            "connection.start received"
        );
        let start_ok = {
            let inner = self.inner.borrow();
            if !inner.profile.offered_in(&mechanisms) {
                return Err(Error::HandshakeFailed(format!(
                    "server offers no {} mechanism (advertised: {})",
                    inner.profile.mechanism(),
                    mechanisms
                )));
            }
            connection_methods::StartOk {
                client_properties: inner.client_properties.clone(),
                mechanism: ShortStr::new(inner.profile.mechanism()).unwrap_or_default(),
                response: inner.profile.response().into(),
                locale: inner.locale.clone(),
            }
        };
        self.inner
            .borrow_mut()
            .send_control(&Frame::new(0, Method::from(start_ok)));
        Ok(())
    }

    fn on_secure(&self, _secure: connection_methods::Secure) -> Result<(), Error> {
        // PLAIN and EXTERNAL carry everything in the initial response;
        // answer any challenge with the same bytes
        let secure_ok = {
            let inner = self.inner.borrow();
            connection_methods::SecureOk {
                response: inner.profile.response().into(),
            }
        };
        self.inner
            .borrow_mut()
            .send_control(&Frame::new(0, Method::from(secure_ok)));
        Ok(())
    }

    fn on_tune(&self, tune: connection_methods::Tune) -> Result<(), Error> {
        let (suggested, transport) = {
            let mut inner = self.inner.borrow_mut();
            inner.channel_max = negotiate_u16(inner.local_channel_max, tune.channel_max);
            inner.frame_max = negotiate_u32(inner.local_frame_max, tune.frame_max);
            let suggested = negotiate_u16(inner.local_heartbeat, tune.heartbeat);
            (suggested, Rc::clone(&inner.transport))
        };
        // the transport owns the timer and commits the final interval
        let effective = transport.borrow_mut().negotiate_heartbeat(suggested);
        {
            let mut inner = self.inner.borrow_mut();
            inner.heartbeat = effective;
            debug!(
                channel_max = inner.channel_max,
                frame_max = inner.frame_max,
                heartbeat = effective,
                "connection tuned"
            );
            let tune_ok = connection_methods::TuneOk {
                channel_max: inner.channel_max,
                frame_max: inner.frame_max,
                heartbeat: effective,
            };
            inner.send_control(&Frame::new(0, Method::from(tune_ok)));
            let open = connection_methods::Open {
                virtual_host: inner.vhost.clone(),
                capabilities: ShortStr::default(),
                insist: false,
            };
            inner.send_control(&Frame::new(0, Method::from(open)));
        }
        Ok(())
    }

    fn on_open_ok(&self) -> Result<(), Error> {
        {
            let mut inner = self.inner.borrow_mut();
            inner.state = ConnectionState::Connected;
            // flush frames queued before the handshake completed, in order
            while let Some(bytes) = inner.pending_send.pop_front() {
                inner.effects.push_back(Effect::Send(bytes));
            }
            inner.pending_bytes = 0;
            inner.effects.push_back(Effect::Connected);
        }
        debug!("connection established");
        Ok(())
    }

    fn on_peer_close(&self, close: connection_methods::Close) -> Result<(), Error> {
        let was_closing = {
            let mut inner = self.inner.borrow_mut();
            inner.send_control(&Frame::new(0, Method::from(connection_methods::CloseOk)));
            inner.state == ConnectionState::Closing
        };
        if was_closing {
            // both peers initiated a close; treat the peer's as the reply
            self.finish_close();
            return Ok(());
        }
        error!(
            code = close.reply_code,
            text = %close.reply_text,
            "connection closed by peer"
        );
        let err = Error::PeerClose {
            code: close.reply_code,
            text: close.reply_text.to_string(),
        };
        let _ = fail_connection(&self.inner, err);
        Ok(())
    }

    fn finish_close(&self) {
        let handle = {
            let mut inner = self.inner.borrow_mut();
            inner.state = ConnectionState::Closed;
            inner.effects.push_back(Effect::Closed);
            inner.close_request.take()
        };
        if let Some(handle) = handle {
            handle.resolve(());
        }
        debug!("connection closed");
    }
}

/// `min` with 0 meaning "no limit" on either side.
fn negotiate_u16(local: u16, server: u16) -> u16 {
    match (local, server) {
        (0, value) => value,
        (value, 0) => value,
        (local, server) => local.min(server),
    }
}

fn negotiate_u32(local: u32, server: u32) -> u32 {
    match (local, server) {
        (0, value) => value,
        (value, 0) => value,
        (local, server) => local.min(server),
    }
}

pub(crate) fn new_inner(
    transport: Box<dyn Transport>,
    profile: SaslProfile,
    vhost: ShortStr,
    locale: ShortStr,
    client_properties: FieldTable,
    local_channel_max: u16,
    local_frame_max: u32,
    local_heartbeat: u16,
) -> Rc<RefCell<ConnectionInner>> {
    Rc::new(RefCell::new(ConnectionInner {
        transport: Rc::new(RefCell::new(transport)),
        state: ConnectionState::Protocol,
        profile,
        vhost,
        locale,
        client_properties,
        local_channel_max,
        local_frame_max,
        local_heartbeat,
        channel_max: local_channel_max,
        frame_max: local_frame_max,
        heartbeat: 0,
        channels: BTreeMap::new(),
        next_channel: 1,
        pending_send: VecDeque::new(),
        pending_bytes: 0,
        close_request: None,
        effects: VecDeque::new(),
        draining: false,
    }))
}

/// Sends the protocol preamble and moves the state machine into the
/// handshake.
pub(crate) fn start_handshake(conn: &Rc<RefCell<ConnectionInner>>) {
    {
        let mut inner = conn.borrow_mut();
        inner
            .effects
            .push_back(Effect::Send(Bytes::from_static(&PROTOCOL_HEADER)));
        inner.state = ConnectionState::Handshake;
    }
    debug!("protocol header sent");
    drain_effects(conn);
}

#[cfg(test)]
mod tests {
    use super::{negotiate_u16, negotiate_u32};

    #[test]
    fn zero_means_unbounded_in_negotiation() {
        assert_eq!(negotiate_u16(0, 2047), 2047);
        assert_eq!(negotiate_u16(100, 0), 100);
        assert_eq!(negotiate_u16(0, 0), 0);
        assert_eq!(negotiate_u16(512, 2047), 512);
        assert_eq!(negotiate_u32(0, 131_072), 131_072);
        assert_eq!(negotiate_u32(4096, 131_072), 4096);
    }
}
