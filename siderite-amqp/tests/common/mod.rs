//! Shared test harness: a recording transport and frame helpers
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use siderite_amqp::connection::Connection;
use siderite_amqp::endpoint::Transport;
use siderite_amqp::frames::{Frame, FrameCodec, PROTOCOL_HEADER};
use siderite_amqp::Error;
use siderite_amqp_types::methods::{connection as connection_methods, Method};
use siderite_amqp_types::properties::{BasicProperties, ContentHeader};

/// Captures everything the engine pushes at its transport.
#[derive(Default)]
pub struct Recorder {
    pub sent: RefCell<Vec<u8>>,
    pub events: RefCell<Vec<String>>,
}

impl Recorder {
    pub fn take_sent(&self) -> Vec<u8> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }

    /// Decodes and drains the captured byte stream into frames.
    pub fn take_frames(&self) -> Vec<Frame> {
        let bytes = self.take_sent();
        let mut src = BytesMut::from(&bytes[..]);
        let mut codec = FrameCodec::default();
        let mut frames = Vec::new();
        loop {
            match codec.decode(&mut src) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(err) => panic!("sent stream does not parse: {err}"),
            }
        }
        assert!(src.is_empty(), "trailing bytes in sent stream");
        frames
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }
}

pub struct MockTransport {
    pub recorder: Rc<Recorder>,
    /// Interval committed during tuning; `u16::MAX` echoes the
    /// suggestion.
    pub heartbeat: u16,
}

impl MockTransport {
    pub fn new(recorder: Rc<Recorder>) -> Self {
        Self {
            recorder,
            heartbeat: u16::MAX,
        }
    }
}

impl Transport for MockTransport {
    fn send_bytes(&mut self, data: &[u8]) {
        self.recorder.sent.borrow_mut().extend_from_slice(data);
    }

    fn negotiate_heartbeat(&mut self, suggested: u16) -> u16 {
        if self.heartbeat == u16::MAX {
            suggested
        } else {
            self.heartbeat
        }
    }

    fn on_connected(&mut self) {
        self.recorder.events.borrow_mut().push("connected".into());
    }

    fn on_closed(&mut self) {
        self.recorder.events.borrow_mut().push("closed".into());
    }

    fn on_error(&mut self, error: &Error) {
        self.recorder
            .events
            .borrow_mut()
            .push(format!("error: {error}"));
    }

    fn on_blocked(&mut self, reason: &str) {
        self.recorder
            .events
            .borrow_mut()
            .push(format!("blocked: {reason}"));
    }

    fn on_unblocked(&mut self) {
        self.recorder.events.borrow_mut().push("unblocked".into());
    }
}

pub fn method_frame(channel: u16, method: impl Into<Method>) -> Vec<u8> {
    let mut buf = BytesMut::new();
    Frame::new(channel, method.into()).encode(&mut buf);
    buf.to_vec()
}

pub fn header_frame(channel: u16, body_size: u64) -> Vec<u8> {
    let mut buf = BytesMut::new();
    Frame::new(channel, ContentHeader::basic(body_size, BasicProperties::default()))
        .encode(&mut buf);
    buf.to_vec()
}

pub fn body_frame(channel: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    Frame::new(channel, Bytes::copy_from_slice(payload)).encode(&mut buf);
    buf.to_vec()
}

/// Feeds bytes, asserting the engine consumes all of them.
pub fn feed(connection: &Connection, bytes: &[u8]) {
    let consumed = connection.ingest(bytes).expect("ingest failed");
    assert_eq!(consumed, bytes.len());
}

/// Opens a connection over a fresh recorder and asserts the preamble.
pub fn open_connection() -> (Connection, Rc<Recorder>) {
    let recorder = Rc::new(Recorder::default());
    let transport = MockTransport::new(Rc::clone(&recorder));
    let connection =
        Connection::open(Box::new(transport), ("guest", "guest"), "/").expect("open failed");
    assert_eq!(recorder.take_sent(), PROTOCOL_HEADER.to_vec());
    (connection, recorder)
}

/// Drives the server side of the handshake to Connected.
pub fn perform_handshake(connection: &Connection, recorder: &Recorder, frame_max: u32) {
    feed(
        connection,
        &method_frame(
            0,
            connection_methods::Start {
                version_major: 0,
                version_minor: 9,
                server_properties: Default::default(),
                mechanisms: "PLAIN EXTERNAL".into(),
                locales: "en_US".into(),
            },
        ),
    );
    feed(
        connection,
        &method_frame(
            0,
            connection_methods::Tune {
                channel_max: 2047,
                frame_max,
                heartbeat: 60,
            },
        ),
    );
    feed(
        connection,
        &method_frame(0, connection_methods::OpenOk::default()),
    );
    // discard the handshake frames and the connected notification
    recorder.take_sent();
    recorder.events.borrow_mut().clear();
}

/// Handshake plus an opened channel 1.
pub fn connected_channel(
    frame_max: u32,
) -> (Connection, siderite_amqp::Channel, Rc<Recorder>) {
    let (connection, recorder) = open_connection();
    perform_handshake(&connection, &recorder, frame_max);
    let channel = connection.open_channel().expect("open_channel failed");
    feed(
        &connection,
        &method_frame(
            channel.id(),
            siderite_amqp_types::methods::channel::OpenOk::default(),
        ),
    );
    recorder.take_sent();
    (connection, channel, recorder)
}
