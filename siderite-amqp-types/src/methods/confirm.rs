//! Methods of the Confirm class (RabbitMQ extension)

use bytes::{BufMut, BytesMut};

use crate::codec::{Cursor, Decode, Encode};
use crate::Error;

/// Puts the channel in publisher-confirm mode. The broker thereafter
/// acknowledges every publish with `basic.ack` or `basic.nack`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Select {
    /// Do not send a reply
    pub nowait: bool,
}

impl Encode for Select {
    fn size(&self) -> usize {
        1
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(self.nowait));
    }
}

impl Decode for Select {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self {
            nowait: cursor.get_u8()? & 0x01 != 0,
        })
    }
}

/// Confirms publisher-confirm mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectOk;

impl Encode for SelectOk {
    fn size(&self) -> usize {
        0
    }

    fn encode(&self, _buf: &mut BytesMut) {}
}

impl Decode for SelectOk {
    fn decode(_cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self)
    }
}
