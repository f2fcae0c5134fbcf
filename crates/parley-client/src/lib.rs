//! Client
//!
//! Turns a single untyped, unordered, bidirectional envelope channel into
//! many concurrent typed async calls against the backend engine.
//!
//! # Architecture
//!
//! Leaves first:
//!
//! - [`transport`]: Moves [`Envelope`]s between endpoints. A shared [`Bus`]
//!   delivers every envelope to every attached endpoint (including the
//!   sender); [`connect_stream`] frames envelopes over any byte stream. Both
//!   hand out the same [`Link`].
//! - [`Correlator`]: Owns the sequence counter and pending-call table.
//!   Assigns a sequence id to each outgoing request and resolves the caller
//!   when the matching response arrives, in whatever order responses come.
//! - [`Backend`]: One typed async method per engine operation, each a thin
//!   request on top of the correlator. No retries, no caching.
//!
//! The correlator is an explicit handle: create it once at startup, clone it
//! into every component that talks to the engine, and shut it down at exit.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod backend;
mod config;
mod correlator;
mod error;
pub mod transport;

pub use backend::{Backend, DEFAULT_LOAD_LIMIT};
pub use config::ClientConfig;
pub use correlator::{Correlator, PendingCall};
pub use error::{CallError, TransportError};
pub use parley_proto::{
    Channel, ChannelId, Envelope, Identity, IdentityKey, IdentityPair, Message, Operation, Side,
};
pub use transport::{Bus, Link, LinkHandle, connect_stream};
