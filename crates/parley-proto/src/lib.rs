//! Wire format for the parley host/engine message channel.
//!
//! The host runtime (UI side) and the backend engine exchange [`Envelope`]s
//! over a single untyped, unordered, bidirectional channel. Every envelope is
//! tagged with the [`Side`] that produced it so both endpoints can share a
//! broadcast-style bus and ignore their own traffic.
//!
//! # Components
//!
//! - [`Envelope`]: The wire unit (sender, operation, sequence id, payload or
//!   error)
//! - [`Operation`]: Names of the backend operations a host may request
//! - [`payloads`]: Typed request and response bodies
//! - Frame codec: length-prefixed CBOR framing for byte-stream transports

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod codec;
mod envelope;
mod errors;
mod operation;
pub mod payloads;

pub use codec::{LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE};
pub use envelope::{Envelope, Side};
pub use errors::ProtocolError;
pub use operation::Operation;
pub use payloads::{Channel, ChannelId, Identity, IdentityKey, IdentityPair, Message};
