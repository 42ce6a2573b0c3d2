//! Methods of the Channel class

use bytes::{BufMut, BytesMut};

use crate::codec::{Cursor, Decode, Encode};
use crate::primitives::{LongStr, ShortStr};
use crate::Error;

/// Opens a channel on the connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Open {
    /// Reserved, must be empty
    pub out_of_band: ShortStr,
}

impl Encode for Open {
    fn size(&self) -> usize {
        self.out_of_band.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.out_of_band.encode(buf);
    }
}

impl Decode for Open {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            out_of_band: ShortStr::decode(cursor)?,
        })
    }
}

/// Confirms a channel open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenOk {
    /// Reserved
    pub channel_id: LongStr,
}

impl Encode for OpenOk {
    fn size(&self) -> usize {
        self.channel_id.size()
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.channel_id.encode(buf);
    }
}

impl Decode for OpenOk {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            channel_id: LongStr::decode(cursor)?,
        })
    }
}

/// Asks the peer to pause or restart delivery on this channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flow {
    /// True to restart delivery, false to pause it
    pub active: bool,
}

impl Encode for Flow {
    fn size(&self) -> usize {
        1
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(self.active));
    }
}

impl Decode for Flow {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            active: cursor.get_u8()? & 0x01 != 0,
        })
    }
}

/// Confirms a flow change with the state now in effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowOk {
    /// The flow state now in effect
    pub active: bool,
}

impl Encode for FlowOk {
    fn size(&self) -> usize {
        1
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(self.active));
    }
}

impl Decode for FlowOk {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            active: cursor.get_u8()? & 0x01 != 0,
        })
    }
}

/// Requests an orderly channel shutdown.
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

/// Confirms a channel close.
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
