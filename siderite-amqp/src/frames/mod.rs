//! Frame encoder and decoder
//!
//! The receive side keeps no buffer of its own: [`Frame::parse`] works on
//! whatever byte view the caller presents, returns the number of bytes it
//! consumed, and leaves the view untouched when a frame is incomplete.
//! [`Frame::expected`] reports the minimum bytes required for the next
//! atomic step so callers can size their reads. A [`FrameCodec`] adapter
//! implements the `tokio_util` codec traits for callers that do keep a
//! rolling buffer.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use siderite_amqp_types::codec::{Cursor, Decode, Encode};
use siderite_amqp_types::methods::Method;
use siderite_amqp_types::properties::ContentHeader;

mod error;
pub use error::Error;

/// Type byte of a method frame
pub const FRAME_METHOD: u8 = 1;

/// Type byte of a content-header frame
pub const FRAME_HEADER: u8 = 2;

/// Type byte of a content-body frame
pub const FRAME_BODY: u8 = 3;

/// Type byte of a heartbeat frame
pub const FRAME_HEARTBEAT: u8 = 8;

/// The sentinel byte terminating every frame
pub const FRAME_END: u8 = 0xCE;

/// Byte length of the frame header (type + channel + payload length)
pub const HEADER_SIZE: usize = 7;

/// Per-frame overhead: the header plus the trailing sentinel
pub const OVERHEAD: usize = HEADER_SIZE + 1;

/// The connection preamble: `"AMQP"` followed by protocol 0-9-1
pub const PROTOCOL_HEADER: [u8; 8] = *b"AMQP\x00\x00\x09\x01";

/// An AMQP frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// The channel the frame travels on; 0 is reserved for connection
    /// control
    pub channel: u16,

    /// The frame payload
    pub payload: FramePayload,
}

/// The payload of a frame, discriminated by the frame type byte.
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    /// A method frame
    Method(Method),

    /// A content-header frame
    Header(ContentHeader),

    /// A content-body frame
    Body(Bytes),

    /// A heartbeat frame; always empty, always on channel 0
    Heartbeat,
}

impl Frame {
    /// Creates a frame on the given channel.
    pub fn new(channel: u16, payload: impl Into<FramePayload>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }

    /// Creates a heartbeat frame.
    pub fn heartbeat() -> Self {
        Self {
            channel: 0,
            payload: FramePayload::Heartbeat,
        }
    }

    fn type_byte(&self) -> u8 {
        match &self.payload {
            FramePayload::Method(_) => FRAME_METHOD,
            FramePayload::Header(_) => FRAME_HEADER,
            FramePayload::Body(_) => FRAME_BODY,
            FramePayload::Heartbeat => FRAME_HEARTBEAT,
        }
    }

    fn payload_size(&self) -> usize {
        match &self.payload {
            FramePayload::Method(method) => method.size(),
            FramePayload::Header(header) => header.size(),
            FramePayload::Body(body) => body.len(),
            FramePayload::Heartbeat => 0,
        }
    }

    /// Total encoded size of the frame, overhead included.
    pub fn size(&self) -> usize {
        OVERHEAD + self.payload_size()
    }

    /// Appends the encoded frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.size());
        dst.put_u8(self.type_byte());
        dst.put_u16(self.channel);
        dst.put_u32(self.payload_size() as u32);
        match &self.payload {
            FramePayload::Method(method) => method.encode(dst),
            FramePayload::Header(header) => header.encode(dst),
            FramePayload::Body(body) => dst.put_slice(body),
            FramePayload::Heartbeat => {}
        }
        dst.put_u8(FRAME_END);
    }

    /// The minimum number of bytes required for the next atomic parse
    /// step: the frame header first, then whatever the header declares
    /// plus the end marker.
    pub fn expected(src: &[u8]) -> usize {
        if src.len() < HEADER_SIZE {
            return HEADER_SIZE;
        }
        let length = u32::from_be_bytes([src[3], src[4], src[5], src[6]]) as usize;
        OVERHEAD + length
    }

    /// Attempts to parse one frame from the front of `src`.
    ///
    /// Returns the frame and the number of bytes consumed, or `None` when
    /// `src` does not yet hold a complete frame; in that case nothing is
    /// consumed and the caller must present the same bytes plus more on
    /// the next call.
    pub fn parse(src: &[u8]) -> Result<Option<(Frame, usize)>, Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }
        let total = Self::expected(src);
        if src.len() < total {
            return Ok(None);
        }

        let frame_type = src[0];
        let channel = u16::from_be_bytes([src[1], src[2]]);
        let payload = &src[HEADER_SIZE..total - 1];
        if src[total - 1] != FRAME_END {
            return Err(Error::Framing);
        }

        let payload = match frame_type {
            FRAME_METHOD => {
                let mut cursor = Cursor::new(payload);
                let class_id = cursor.get_u16()?;
                let method_id = cursor.get_u16()?;
                let method = Method::decode(class_id, method_id, &mut cursor)?;
                if !cursor.is_empty() {
                    return Err(siderite_amqp_types::Error::Malformed(
                        "trailing bytes after method arguments",
                    )
                    .into());
                }
                FramePayload::Method(method)
            }
            FRAME_HEADER => {
                let mut cursor = Cursor::new(payload);
                let header = ContentHeader::decode(&mut cursor)?;
                if !cursor.is_empty() {
                    return Err(siderite_amqp_types::Error::Malformed(
                        "trailing bytes after content header",
                    )
                    .into());
                }
                FramePayload::Header(header)
            }
            FRAME_BODY => FramePayload::Body(Bytes::copy_from_slice(payload)),
            FRAME_HEARTBEAT => FramePayload::Heartbeat,
            other => return Err(Error::UnknownFrameType(other)),
        };

        Ok(Some((Frame { channel, payload }, total)))
    }
}

impl From<Method> for FramePayload {
    fn from(method: Method) -> Self {
        FramePayload::Method(method)
    }
}

impl From<ContentHeader> for FramePayload {
    fn from(header: ContentHeader) -> Self {
        FramePayload::Header(header)
    }
}

impl From<Bytes> for FramePayload {
    fn from(body: Bytes) -> Self {
        FramePayload::Body(body)
    }
}

/// Encoder and decoder adapter over a rolling [`BytesMut`] buffer.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Largest frame the encoder will emit, 0 meaning no limit.
    pub max_frame: u32,
}

impl FrameCodec {
    /// Creates a codec bounded by the negotiated maximum frame size.
    pub fn new(max_frame: u32) -> Self {
        Self { max_frame }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let size = item.size();
        if self.max_frame != 0 && size > self.max_frame as usize {
            return Err(Error::TooLarge {
                size,
                max: self.max_frame as usize,
            });
        }
        item.encode(dst);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match Frame::parse(&src[..])? {
            Some((frame, consumed)) => {
                src.advance(consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}
