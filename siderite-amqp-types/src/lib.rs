#![deny(missing_docs, missing_debug_implementations)]

//! Wire types and method registry for the AMQP 0-9-1 protocol.
//!
//! This crate contains the protocol-level building blocks shared by the
//! engine crate:
//!
//! - [`codec`] — cursor-based decoding over an immutable byte slice and
//!   size-predictive encoding into a preallocated buffer
//! - [`primitives`] — the field value grammar (booleans, integers,
//!   strings, decimals, timestamps, arrays and tables)
//! - [`methods`] — one typed record per AMQP method across the
//!   Connection, Channel, Exchange, Queue, Basic, Tx and Confirm classes,
//!   plus the [`methods::Method`] dispatch enum
//! - [`properties`] — the content-header envelope with its fourteen
//!   optional properties
//!
//! All multibyte scalars are big-endian on the wire. Every value type
//! reports its encoded size through [`codec::Encode::size`] before
//! encoding, so a frame can be emitted into a single buffer without
//! growth.

pub mod codec;
pub mod methods;
pub mod primitives;
pub mod properties;

mod error;
pub use error::Error;
