//! Protocol-level errors.

use thiserror::Error;

/// Errors produced while encoding, decoding or interpreting envelopes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame declares a body larger than the maximum frame size.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Declared body size.
        size: usize,
        /// Maximum permitted body size.
        max: usize,
    },

    /// Input ended before the declared frame was complete.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Frame body could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Frame body is not a valid envelope.
    #[error("decode failed: {0}")]
    Decode(String),

    /// Envelope names an operation this side does not know.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Envelope is a response where a request was expected.
    #[error("envelope seq {seq} carries no operation")]
    MissingOperation {
        /// Sequence id of the offending envelope.
        seq: u32,
    },
}
