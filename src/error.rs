//! Error types for the WebSocket transport and the message codec.
//!
//! [`Error`] covers everything that can go wrong on a WebSocket session
//! (I/O, framing, handshake). [`DecodeError`] covers malformed message
//! payloads and never terminates a connection.

use thiserror::Error;

use crate::message::CloseCode;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur on a WebSocket session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in text message.
    #[error("Invalid UTF-8 in text message")]
    InvalidUtf8,

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// Payload length does not fit in `usize` on this platform.
    #[error("Payload too large for platform: {size} bytes (max: {max})")]
    PayloadTooLargeForPlatform {
        /// Declared payload length.
        size: u64,
        /// Maximum addressable length.
        max: u64,
    },

    /// Connection has been closed.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// Invalid WebSocket handshake.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Handshake data exceeds the configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes received so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// Invalid close code.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Unmasked client frame (security violation).
    #[error("Client frame must be masked")]
    UnmaskedClientFrame,

    /// Masked server frame (security violation).
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Reserved bits set without extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },
}

impl Error {
    /// The close code to report to the peer when this error ends a session.
    ///
    /// Returns `None` for errors where the transport is already gone and no
    /// close frame can be delivered.
    #[must_use]
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Error::Io(_) | Error::ConnectionClosed(_) => None,
            Error::InvalidUtf8 => Some(CloseCode::InvalidPayload),
            Error::FrameTooLarge { .. }
            | Error::MessageTooLarge { .. }
            | Error::TooManyFragments { .. }
            | Error::PayloadTooLargeForPlatform { .. } => Some(CloseCode::MessageTooBig),
            _ => Some(CloseCode::ProtocolError),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

/// Errors produced when a binary payload is not a valid message encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    /// Input ended in the middle of a varint.
    #[error("truncated varint at offset {offset}")]
    TruncatedVarint {
        /// Offset of the first byte of the varint.
        offset: usize,
    },

    /// Varint longer than 10 bytes or overflowing 64 bits.
    #[error("varint overflow at offset {offset}")]
    VarintOverflow {
        /// Offset of the first byte of the varint.
        offset: usize,
    },

    /// A length-delimited field claims more bytes than remain.
    #[error("field {field} length {len} exceeds remaining {remaining} bytes")]
    LengthOutOfBounds {
        /// Field number.
        field: u32,
        /// Declared length.
        len: u64,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A fixed-width field runs past the end of the buffer.
    #[error("field {field} truncated: need {needed} bytes, have {remaining}")]
    TruncatedFixed {
        /// Field number.
        field: u32,
        /// Width of the fixed field.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// Field number zero or larger than 2^29 - 1.
    #[error("invalid field number {0}")]
    InvalidFieldNumber(u64),

    /// A group start tag without its matching end tag.
    #[error("group {field} is not terminated")]
    UnterminatedGroup {
        /// Field number of the group.
        field: u32,
    },

    /// A group closed with the end tag of another field.
    #[error("group {expected} closed by end tag of field {found}")]
    MismatchedEndGroup {
        /// Field number of the open group.
        expected: u32,
        /// Field number of the end tag.
        found: u32,
    },

    /// An end-group tag outside any group.
    #[error("unexpected end of group {field}")]
    UnexpectedEndGroup {
        /// Field number of the end tag.
        field: u32,
    },

    /// Groups nested deeper than the decoder follows.
    #[error("group {field} nested too deeply")]
    GroupTooDeep {
        /// Field number of the innermost group.
        field: u32,
    },

    /// Reserved wire types 6 and 7.
    #[error("unsupported wire type {wire_type} for field {field}")]
    UnsupportedWireType {
        /// Field number.
        field: u32,
        /// Raw wire type.
        wire_type: u8,
    },

    /// A string field does not hold valid UTF-8.
    #[error("field {field} is not valid UTF-8")]
    InvalidUtf8 {
        /// Field number.
        field: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::FrameTooLarge {
            size: 20_000_000,
            max: 16_000_000,
        };
        assert_eq!(
            err.to_string(),
            "Frame too large: 20000000 bytes (max: 16000000)"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let ws_err: Error = io_err.into();
        assert!(matches!(ws_err, Error::Io(_)));
        assert_eq!(ws_err.close_code(), None);
    }

    #[test]
    fn test_close_code_mapping() {
        assert_eq!(
            Error::UnmaskedClientFrame.close_code(),
            Some(CloseCode::ProtocolError)
        );
        assert_eq!(Error::InvalidUtf8.close_code(), Some(CloseCode::InvalidPayload));
        assert_eq!(
            Error::MessageTooLarge { size: 2, max: 1 }.close_code(),
            Some(CloseCode::MessageTooBig)
        );
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::LengthOutOfBounds {
            field: 1,
            len: 17,
            remaining: 0,
        };
        assert_eq!(
            err.to_string(),
            "field 1 length 17 exceeds remaining 0 bytes"
        );
    }
}
