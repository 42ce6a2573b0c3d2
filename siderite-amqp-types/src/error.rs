//! Codec errors

/// Errors raised while encoding or decoding wire data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A read would run past the end of the frame payload, or a length
    /// prefix disagrees with the bytes that follow it.
    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    /// A field value carries a type tag outside the protocol grammar.
    #[error("unknown field type tag {tag:#04x}")]
    UnknownFieldType {
        /// The offending tag byte
        tag: u8,
    },

    /// A method frame names a (class, method) pair outside the registry.
    #[error("unknown method {class_id}.{method_id}")]
    UnknownMethod {
        /// Class id of the unknown method
        class_id: u16,
        /// Method id of the unknown method
        method_id: u16,
    },

    /// A string value is not valid UTF-8.
    #[error("string value is not valid utf-8")]
    InvalidUtf8,

    /// A short string would not fit its one-byte length prefix.
    #[error("short string exceeds 255 bytes")]
    ShortStringTooLong,
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(_: std::string::FromUtf8Error) -> Self {
        Error::InvalidUtf8
    }
}
