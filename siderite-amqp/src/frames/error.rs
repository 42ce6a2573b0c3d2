//! Frame-layer errors

use std::io;

/// Errors raised while parsing or emitting frames.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error, surfaced through the codec integration.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The frame payload violates the wire grammar.
    #[error(transparent)]
    Codec(#[from] siderite_amqp_types::Error),

    /// The trailing sentinel byte is not `0xCE`.
    #[error("frame does not end with the 0xce sentinel")]
    Framing,

    /// An outbound frame exceeds the negotiated maximum frame size.
    #[error("frame of {size} bytes exceeds the negotiated maximum of {max}")]
    TooLarge {
        /// Total encoded size of the offending frame
        size: usize,
        /// The negotiated maximum
        max: usize,
    },

    /// The frame type octet is not method, header, body or heartbeat.
    #[error("unknown frame type {0}")]
    UnknownFrameType(u8),
}

impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            // io::Error does not implement Clone; preserve kind and text
            Error::Io(inner) => Error::Io(io::Error::new(inner.kind(), inner.to_string())),
            Error::Codec(inner) => Error::Codec(inner.clone()),
            Error::Framing => Error::Framing,
            Error::TooLarge { size, max } => Error::TooLarge {
                size: *size,
                max: *max,
            },
            Error::UnknownFrameType(value) => Error::UnknownFrameType(*value),
        }
    }
}
