#![deny(missing_docs, missing_debug_implementations)]

//! A sans-I/O client-side protocol engine for AMQP 0-9-1.
//!
//! The engine owns the wire protocol and nothing else: the connection
//! handshake, frame multiplexing across channels, the per-channel
//! request/response pipeline, inbound message reassembly and the
//! publisher-confirm wrappers. Sockets, TLS, DNS and timers live behind
//! the [`Transport`](endpoint::Transport) trait the caller implements;
//! broker bytes are fed in through
//! [`Connection::ingest`](connection::Connection::ingest) and every
//! callback fires inline on the calling thread.
//!
//! ```no_run
//! use siderite_amqp::connection::Connection;
//! use siderite_amqp::channel::QueueDeclareOptions;
//! use siderite_amqp::endpoint::Transport;
//! use siderite_amqp_types::primitives::FieldTable;
//!
//! struct Tcp {/* socket, timer, ... */}
//! impl Transport for Tcp {
//!     fn send_bytes(&mut self, data: &[u8]) {
//!         /* write to the socket, buffering as needed */
//!     }
//! }
//!
//! let connection = Connection::open(
//!     Box::new(Tcp {}),
//!     ("guest", "guest"),
//!     "/",
//! ).unwrap();
//!
//! let channel = connection.open_channel().unwrap();
//! channel
//!     .queue_declare("jobs", QueueDeclareOptions { durable: true, ..Default::default() }, FieldTable::new())
//!     .on_success(|declared| println!("{} ready", declared.queue))
//!     .on_error(|message| eprintln!("declare failed: {message}"));
//!
//! // feed bytes read from the socket:
//! // connection.ingest(&read_buffer)?;
//! ```

pub mod address;
pub mod channel;
pub mod confirm;
pub mod connection;
pub mod consumer;
pub mod deferred;
pub mod endpoint;
pub mod frames;
pub mod message;
pub mod sasl;

mod assembler;
mod error;
mod watch;

pub use error::Error;

pub use channel::Channel;
pub use connection::Connection;
pub use deferred::Deferred;
pub use endpoint::Transport;
pub use message::{Delivery, Message, ReturnedMessage};
pub use sasl::SaslProfile;
