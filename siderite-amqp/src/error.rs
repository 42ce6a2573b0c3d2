//! Engine-level errors

use crate::frames;

/// Errors surfaced by the connection and channel kernels.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A frame-layer or codec violation.
    #[error(transparent)]
    Frame(#[from] frames::Error),

    /// An unexpected method for the current state, a frame on an unknown
    /// channel, or content frames out of sequence.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server rejected the connection during the handshake.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// An operation was attempted on a closing or closed channel.
    #[error("channel is closed")]
    ChannelClosed,

    /// An operation was attempted on a closing or closed connection.
    #[error("connection is closed")]
    ConnectionClosed,

    /// Every channel id up to the negotiated maximum is in use.
    #[error("no free channel id available")]
    ChannelLimitExceeded,

    /// The pre-handshake send queue ran out of room.
    #[error("connection send buffer is full")]
    BufferFull,

    /// The broker closed the connection, relaying its reply verbatim.
    #[error("connection closed by peer: {code} {text}")]
    PeerClose {
        /// The broker's reply code
        code: u16,
        /// The broker's reply text
        text: String,
    },
}

impl From<siderite_amqp_types::Error> for Error {
    fn from(err: siderite_amqp_types::Error) -> Self {
        Error::Frame(frames::Error::from(err))
    }
}
