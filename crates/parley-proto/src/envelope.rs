//! The envelope exchanged between host and engine.
//!
//! Requests carry `type` (the operation name) and `payload`. Responses carry
//! the request's `seq` and either `payload` (success) or `error` + `stack`
//! (failure). Absent fields are omitted from the wire representation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Operation, ProtocolError};

/// Which endpoint produced an envelope.
///
/// The shared bus delivers every envelope to every endpoint, including the
/// one that sent it. Receivers drop envelopes tagged with their own side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The host runtime issuing calls (UI process).
    Host,
    /// The backend engine answering calls.
    Peer,
}

impl Side {
    /// The opposite endpoint.
    pub fn other(self) -> Self {
        match self {
            Self::Host => Self::Peer,
            Self::Peer => Self::Host,
        }
    }
}

/// Wire unit exchanged over the host/engine channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Endpoint that produced this envelope.
    pub sender: Side,

    /// Operation name. Present on requests only.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,

    /// Sequence id correlating a response with its request.
    pub seq: u32,

    /// Request body, or response body on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Remote error message. Presence marks a failed response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Remote stack trace accompanying `error`, if the engine supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl Envelope {
    /// Build a request for `op`.
    pub fn request(sender: Side, op: Operation, seq: u32, payload: Option<Value>) -> Self {
        Self { sender, op: Some(op.as_str().to_owned()), seq, payload, error: None, stack: None }
    }

    /// Build a successful response to request `seq`.
    pub fn success(sender: Side, seq: u32, payload: Value) -> Self {
        let payload = if payload.is_null() { None } else { Some(payload) };
        Self { sender, op: None, seq, payload, error: None, stack: None }
    }

    /// Build a failed response to request `seq`.
    pub fn failure(
        sender: Side,
        seq: u32,
        error: impl Into<String>,
        stack: Option<String>,
    ) -> Self {
        Self { sender, op: None, seq, payload: None, error: Some(error.into()), stack }
    }

    /// Whether this envelope reports a remote failure.
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Parse the operation name of a request envelope.
    pub fn operation(&self) -> Result<Operation, ProtocolError> {
        self.op
            .as_deref()
            .ok_or(ProtocolError::MissingOperation { seq: self.seq })?
            .parse()
    }
}
