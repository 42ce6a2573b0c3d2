//! Methods of the Connection class
//!
//! These travel exclusively on channel 0 and drive the handshake, the
//! tuning negotiation and the connection lifecycle.

use bytes::{BufMut, BytesMut};

use crate::codec::{Cursor, Decode, Encode};
use crate::primitives::{FieldTable, LongStr, ShortStr};
use crate::Error;

/// Opens the negotiation: the server proposes its protocol version,
/// properties, SASL mechanisms and locales.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Start {
    /// Protocol major version
    pub version_major: u8,

    /// Protocol minor version
    pub version_minor: u8,

    /// Server properties table
    pub server_properties: FieldTable,

    /// Space-separated list of SASL mechanisms
    pub mechanisms: LongStr,

    /// Space-separated list of message locales
    pub locales: LongStr,
}

impl Encode for Start {
    fn size(&self) -> usize {
        2 + self.server_properties.size() + self.mechanisms.size() + self.locales.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version_major);
        buf.put_u8(self.version_minor);
        self.server_properties.encode(buf);
        self.mechanisms.encode(buf);
        self.locales.encode(buf);
    }
}

impl Decode for Start {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            version_major: cursor.get_u8()?,
            version_minor: cursor.get_u8()?,
            server_properties: FieldTable::decode(cursor)?,
            mechanisms: LongStr::decode(cursor)?,
            locales: LongStr::decode(cursor)?,
        })
    }
}

/// The client's answer to [`Start`]: its properties, the selected SASL
/// mechanism and the initial response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartOk {
    /// Client properties table
    pub client_properties: FieldTable,

    /// Selected SASL mechanism
    pub mechanism: ShortStr,

    /// SASL initial response
    pub response: LongStr,

    /// Selected message locale
    pub locale: ShortStr,
}

impl Encode for StartOk {
    fn size(&self) -> usize {
        self.client_properties.size()
            + self.mechanism.size()
            + self.response.size()
            + self.locale.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.client_properties.encode(buf);
        self.mechanism.encode(buf);
        self.response.encode(buf);
        self.locale.encode(buf);
    }
}

impl Decode for StartOk {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            client_properties: FieldTable::decode(cursor)?,
            mechanism: ShortStr::decode(cursor)?,
            response: LongStr::decode(cursor)?,
            locale: ShortStr::decode(cursor)?,
        })
    }
}

/// A SASL challenge from the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Secure {
    /// Challenge data
    pub challenge: LongStr,
}

impl Encode for Secure {
    fn size(&self) -> usize {
        self.challenge.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.challenge.encode(buf);
    }
}

impl Decode for Secure {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            challenge: LongStr::decode(cursor)?,
        })
    }
}

/// The client's answer to a [`Secure`] challenge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecureOk {
    /// Response data
    pub response: LongStr,
}

impl Encode for SecureOk {
    fn size(&self) -> usize {
        self.response.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.response.encode(buf);
    }
}

impl Decode for SecureOk {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            response: LongStr::decode(cursor)?,
        })
    }
}

/// The server's proposed connection limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tune {
    /// Highest channel number, 0 meaning no limit
    pub channel_max: u16,

    /// Largest acceptable frame size in bytes, 0 meaning no limit
    pub frame_max: u32,

    /// Desired heartbeat interval in seconds, 0 disabling heartbeats
    pub heartbeat: u16,
}

impl Encode for Tune {
    fn size(&self) -> usize {
        8
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.channel_max);
        buf.put_u32(self.frame_max);
        buf.put_u16(self.heartbeat);
    }
}

impl Decode for Tune {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            channel_max: cursor.get_u16()?,
            frame_max: cursor.get_u32()?,
            heartbeat: cursor.get_u16()?,
        })
    }
}

/// The negotiated connection limits the client commits to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TuneOk {
    /// Highest channel number, 0 meaning no limit
    pub channel_max: u16,

    /// Largest frame size in bytes, 0 meaning no limit
    pub frame_max: u32,

    /// Heartbeat interval in seconds, 0 disabling heartbeats
    pub heartbeat: u16,
}

impl Encode for TuneOk {
    fn size(&self) -> usize {
        8
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.channel_max);
        buf.put_u32(self.frame_max);
        buf.put_u16(self.heartbeat);
    }
}

impl Decode for TuneOk {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            channel_max: cursor.get_u16()?,
            frame_max: cursor.get_u32()?,
            heartbeat: cursor.get_u16()?,
        })
    }
}

/// Selects the virtual host for the connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Open {
    /// Virtual host path
    pub virtual_host: ShortStr,

    /// Reserved, must be empty
    pub capabilities: ShortStr,

    /// Reserved, must be zero
    pub insist: bool,
}

impl Encode for Open {
    fn size(&self) -> usize {
        self.virtual_host.size() + self.capabilities.size() + 1
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.virtual_host.encode(buf);
        self.capabilities.encode(buf);
        buf.put_u8(u8::from(self.insist));
    }
}

impl Decode for Open {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            virtual_host: ShortStr::decode(cursor)?,
            capabilities: ShortStr::decode(cursor)?,
            insist: cursor.get_u8()? & 0x01 != 0,
        })
    }
}

/// Confirms the virtual host selection; the connection is now usable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenOk {
    /// Reserved
    pub known_hosts: ShortStr,
}

impl Encode for OpenOk {
    fn size(&self) -> usize {
        self.known_hosts.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.known_hosts.encode(buf);
    }
}

impl Decode for OpenOk {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            known_hosts: ShortStr::decode(cursor)?,
        })
    }
}

/// Requests an orderly connection shutdown. Sent by either peer; carries
/// the failing method coordinates when the close reports an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Close {
    /// Reply code
    pub reply_code: u16,

    /// Human-readable reply text
    pub reply_text: ShortStr,

    /// Class id of the method that caused the close, or zero
    pub class_id: u16,

    /// Method id of the method that caused the close, or zero
    pub method_id: u16,
}

impl Encode for Close {
    fn size(&self) -> usize {
        2 + self.reply_text.size() + 4
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.reply_code);
        self.reply_text.encode(buf);
        buf.put_u16(self.class_id);
        buf.put_u16(self.method_id);
    }
}

impl Decode for Close {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            reply_code: cursor.get_u16()?,
            reply_text: ShortStr::decode(cursor)?,
            class_id: cursor.get_u16()?,
            method_id: cursor.get_u16()?,
        })
    }
}

/// Confirms a connection close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseOk;

impl Encode for CloseOk {
    fn size(&self) -> usize {
        0
    }

    fn encode(&self, _buf: &mut BytesMut) {}
}

impl Decode for CloseOk {
    fn decode(_cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self)
    }
}

/// The broker stopped accepting publishes (RabbitMQ extension).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blocked {
    /// Reason for the block
    pub reason: ShortStr,
}

impl Encode for Blocked {
    fn size(&self) -> usize {
        self.reason.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.reason.encode(buf);
    }
}

impl Decode for Blocked {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            reason: ShortStr::decode(cursor)?,
        })
    }
}

/// The broker resumed accepting publishes (RabbitMQ extension).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unblocked;

impl Encode for Unblocked {
    fn size(&self) -> usize {
        0
    }

    fn encode(&self, _buf: &mut BytesMut) {}
}

impl Decode for Unblocked {
    fn decode(_cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::{Close, Start, StartOk, Tune};
    use crate::codec::{Cursor, Decode, Encode};
    use crate::primitives::FieldTable;

    #[test]
    fn start_roundtrip() {
        let mut server_properties = FieldTable::new();
        server_properties.insert("product".try_into().unwrap(), "RabbitMQ");

        let start = Start {
            version_major: 0,
            version_minor: 9,
            server_properties,
            mechanisms: "PLAIN EXTERNAL".into(),
            locales: "en_US".into(),
        };

        let mut buf = BytesMut::new();
        start.encode(&mut buf);
        assert_eq!(buf.len(), start.size());
        assert_eq!(Start::decode(&mut Cursor::new(&buf)).unwrap(), start);
    }

    #[test]
    fn start_ok_carries_plain_response() {
        let start_ok = StartOk {
            client_properties: FieldTable::new(),
            mechanism: "PLAIN".try_into().unwrap(),
            response: b"\x00guest\x00guest"[..].into(),
            locale: "en_US".try_into().unwrap(),
        };

        let mut buf = BytesMut::new();
        start_ok.encode(&mut buf);
        assert_eq!(StartOk::decode(&mut Cursor::new(&buf)).unwrap(), start_ok);
    }

    #[test]
    fn tune_roundtrip() {
        let tune = Tune {
            channel_max: 2047,
            frame_max: 131_072,
            heartbeat: 60,
        };
        let mut buf = BytesMut::new();
        tune.encode(&mut buf);
        assert_eq!(buf.len(), 8);
        assert_eq!(Tune::decode(&mut Cursor::new(&buf)).unwrap(), tune);
    }

    #[test]
    fn close_roundtrip() {
        let close = Close {
            reply_code: 320,
            reply_text: "CONNECTION_FORCED".try_into().unwrap(),
            class_id: 0,
            method_id: 0,
        };
        let mut buf = BytesMut::new();
        close.encode(&mut buf);
        assert_eq!(buf.len(), close.size());
        assert_eq!(Close::decode(&mut Cursor::new(&buf)).unwrap(), close);
    }
}
