//! Client error types.
//!
//! [`CallError`] separates "the engine said no" ([`CallError::Remote`]) from
//! "the engine never answered" ([`CallError::Timeout`]) so callers can react
//! differently. Unmatched responses are not errors at all: the correlator
//! drops them silently.

use std::{io, time::Duration};

use parley_proto::{Operation, ProtocolError};
use thiserror::Error;

/// Failure of a single backend call.
#[derive(Debug, Error)]
pub enum CallError {
    /// The engine answered with an error.
    #[error("{message}")]
    Remote {
        /// Remote error message.
        message: String,
        /// Remote stack trace, if the engine supplied one.
        stack: Option<String>,
    },

    /// No response arrived within the caller's timeout.
    #[error("{op} timed out after {timeout:?}")]
    Timeout {
        /// Operation that timed out.
        op: Operation,
        /// Timeout the caller supplied.
        timeout: Duration,
    },

    /// The transport or correlator shut down before a response arrived.
    #[error("backend channel closed")]
    Closed,

    /// Request could not be serialized, or a successful response did not
    /// have the expected shape.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

impl CallError {
    /// Whether the engine explicitly rejected the call.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Whether the call gave up waiting for the engine.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Remote stack trace, if this is a remote failure that carried one.
    pub fn remote_stack(&self) -> Option<&str> {
        match self {
            Self::Remote { stack, .. } => stack.as_deref(),
            _ => None,
        }
    }
}

/// Errors from a transport pump task.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error on the underlying byte stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Frame could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The local side of the link was dropped.
    #[error("link closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_message_is_displayed_verbatim() {
        let err = CallError::Remote { message: "Unknown identity".into(), stack: None };
        assert_eq!(err.to_string(), "Unknown identity");
        assert!(err.is_remote());
        assert!(!err.is_timeout());
    }

    #[test]
    fn timeout_names_operation() {
        let err =
            CallError::Timeout { op: Operation::GetChannels, timeout: Duration::from_millis(5) };
        assert!(err.is_timeout());
        assert!(err.to_string().starts_with("network:getChannels timed out"));
    }

    #[test]
    fn stack_is_exposed_for_remote_failures_only() {
        let err = CallError::Remote { message: "x".into(), stack: Some("at y".into()) };
        assert_eq!(err.remote_stack(), Some("at y"));
        assert_eq!(CallError::Closed.remote_stack(), None);
    }
}
