//! Length-prefixed CBOR framing.
//!
//! Byte-stream transports (pipes, sockets) carry envelopes as frames:
//!
//! ```text
//! +----------------+---------------------------+
//! | length (u32 BE)| CBOR-encoded Envelope     |
//! +----------------+---------------------------+
//! ```
//!
//! Decoding validates the declared length before allocating, so a hostile
//! peer cannot force large allocations.

use bytes::{BufMut, BytesMut};

use crate::{Envelope, ProtocolError};

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Maximum frame body size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

impl Envelope {
    /// Append this envelope as a complete frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut body = Vec::new();
        ciborium::into_writer(self, &mut body)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;

        if body.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { size: body.len(), max: MAX_FRAME_SIZE });
        }

        dst.reserve(LENGTH_PREFIX_SIZE + body.len());
        dst.put_u32(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }

    /// Decode a complete frame (prefix and body).
    ///
    /// Trailing bytes after the declared body are ignored.
    pub fn decode(src: &[u8]) -> Result<Self, ProtocolError> {
        let prefix: [u8; LENGTH_PREFIX_SIZE] = src
            .get(..LENGTH_PREFIX_SIZE)
            .and_then(|p| p.try_into().ok())
            .ok_or(ProtocolError::Truncated { expected: LENGTH_PREFIX_SIZE, actual: src.len() })?;

        let len = Self::body_len(prefix)?;
        let end = LENGTH_PREFIX_SIZE + len;
        let body = src
            .get(LENGTH_PREFIX_SIZE..end)
            .ok_or(ProtocolError::Truncated { expected: end, actual: src.len() })?;

        Self::decode_body(body)
    }

    /// Validate a length prefix and return the body size it declares.
    pub fn body_len(prefix: [u8; LENGTH_PREFIX_SIZE]) -> Result<usize, ProtocolError> {
        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { size: len, max: MAX_FRAME_SIZE });
        }
        Ok(len)
    }

    /// Decode a frame body (without its prefix).
    pub fn decode_body(body: &[u8]) -> Result<Self, ProtocolError> {
        ciborium::from_reader(body).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}
