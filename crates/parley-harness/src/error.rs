//! Engine-side rejections.

use parley_proto::Operation;
use thiserror::Error;

/// Reasons the simulated engine rejects a request.
///
/// The display text is what the host sees in the response's `error` field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Any operation other than `init`/`isReady` before a successful `init`.
    #[error("Engine is not initialized")]
    NotInitialized,

    /// `init` with an empty passphrase.
    #[error("Passphrase must not be empty")]
    EmptyPassphrase,

    /// `init` with a passphrase differing from the one already in use.
    #[error("Invalid passphrase")]
    InvalidPassphrase,

    /// Referenced channel does not exist.
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// Referenced identity does not exist.
    #[error("Unknown identity: {0}")]
    UnknownIdentity(String),

    /// Identity exists but may not post to the channel.
    #[error("Identity {identity_key} cannot post to channel {channel_id}")]
    NotPostable {
        /// Posting identity.
        identity_key: String,
        /// Target channel.
        channel_id: String,
    },

    /// `invite` with a request blob the engine never issued or already used.
    #[error("Invalid invite request")]
    UnknownInviteRequest,

    /// Channel was removed while a wait on it was parked.
    #[error("Channel removed: {0}")]
    ChannelRemoved(String),

    /// Engine-side wait limit elapsed.
    #[error("Timed out waiting for incoming message")]
    WaitTimedOut,

    /// Request payload did not match the operation's shape.
    #[error("Invalid payload for {op}: {reason}")]
    InvalidPayload {
        /// Operation whose payload was malformed.
        op: Operation,
        /// Decoder message.
        reason: String,
    },

    /// Response could not be serialized.
    #[error("Failed to encode response: {0}")]
    Encode(String),
}
