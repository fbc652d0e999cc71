use crate::flags::Actions;
use std::io;

/// Result type used throughout the milter library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that end a milter session
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The underlying stream failed
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// The stream closed part way through a packet
    #[error("connection closed after {read} of {expected} bytes")]
    Truncated {
        /// Bytes that were expected
        expected: usize,
        /// Bytes that arrived before the stream closed
        read: usize,
    },
    /// A packet declared a length of zero, so it has no command code
    #[error("empty packet")]
    EmptyPacket,
    /// A packet declared a length above the session maximum
    #[error("packet length {length} exceeds maximum of {max}")]
    TooLarge {
        /// Declared length
        length: usize,
        /// Largest length accepted by the session
        max: usize,
    },
    /// The payload of a command could not be decoded
    #[error("malformed '{code}' command: {detail}")]
    Malformed {
        /// Command code of the packet
        code: char,
        /// What went wrong
        detail: String,
    },
    /// A filter asked for a modification that was not negotiated
    #[error("action {0:?} was not negotiated")]
    NotNegotiated(Actions),
    /// A filter callback failed
    #[error("filter error: {0}")]
    Filter(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an error raised by a filter implementation
    pub fn filter<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Filter(err.into())
    }

    pub(crate) fn malformed<S: Into<String>>(code: u8, detail: S) -> Self {
        Error::Malformed {
            code: char::from(code),
            detail: detail.into(),
        }
    }
}
