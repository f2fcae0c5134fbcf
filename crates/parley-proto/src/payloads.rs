//! Typed request and response bodies.
//!
//! Field names are camelCase on the wire to match the engine's JSON shapes.
//! Operations without a body (`isReady`, `getChannels`, `getIdentities`) send
//! no payload at all.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Engine-assigned channel identifier.
pub type ChannelId = String;

/// Public key identifying a local identity.
pub type IdentityKey = String;

/// A channel as reported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Channel identifier.
    pub id: ChannelId,
    /// Human-readable channel name.
    pub name: String,
    /// Free-form metadata owned by the UI.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

/// A local identity as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Identity public key.
    pub public_key: IdentityKey,
    /// Display path (`<name>/<short key>`) shown next to posted messages.
    #[serde(default)]
    pub display_path: String,
    /// Channels this identity may post to.
    #[serde(default)]
    pub channel_ids: Vec<ChannelId>,
}

/// A message stored in a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Content hash; unique within a channel.
    pub hash: String,
    /// Position in the channel's history (0-based).
    pub height: u64,
    /// Display path of the posting identity, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Engine timestamp in milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: u64,
    /// Message body.
    pub json: Value,
}

/// Result of `createIdentityPair`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityPair {
    /// Newly created identity.
    pub identity: Identity,
    /// Channel the identity can post to.
    pub channel: Channel,
}

/// Body of `init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRequest {
    /// Passphrase unlocking the engine's key storage.
    pub passphrase: String,
}

/// Body of `createIdentityPair`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIdentityPairRequest {
    /// Name for both the identity and its channel.
    pub name: String,
}

/// Body of `channelFromPublicKey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelFromPublicKeyRequest {
    /// Peer's channel public key.
    pub public_key: String,
    /// Local name for the channel.
    pub name: String,
}

/// Body of `removeIdentityPair`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveIdentityPairRequest {
    /// Channel to remove.
    pub channel_id: ChannelId,
    /// Identity to remove.
    pub identity_key: IdentityKey,
}

/// Body of `updateChannelMetadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChannelMetadataRequest {
    /// Target channel.
    pub channel_id: ChannelId,
    /// Replacement metadata.
    pub metadata: Value,
}

/// Body of operations addressing a single channel (`getMessageCount`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRequest {
    /// Target channel.
    pub channel_id: ChannelId,
}

/// Body of `getReverseMessagesAtOffset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseMessagesRequest {
    /// Target channel.
    pub channel_id: ChannelId,
    /// Number of newest messages to skip.
    pub offset: u64,
    /// Maximum number of messages to return.
    pub limit: u64,
}

/// Body of `waitForIncomingMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitForIncomingMessageRequest {
    /// Channel to watch.
    pub channel_id: ChannelId,
    /// Engine-side wait limit in milliseconds. Absent means wait forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// Body of `postMessage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageRequest {
    /// Target channel.
    pub channel_id: ChannelId,
    /// Posting identity.
    pub identity_key: IdentityKey,
    /// Message body.
    pub json: Value,
}

/// Body of operations addressing a single identity (`requestInvite`,
/// `waitForInvite`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRequest {
    /// Target identity.
    pub identity_key: IdentityKey,
}

/// Body of `invite`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    /// Inviting identity.
    pub identity_key: IdentityKey,
    /// Channel the invitee joins.
    pub channel_id: ChannelId,
    /// Name the invitee will be known by.
    pub invitee_name: String,
    /// Invite request blob produced by the invitee's `requestInvite`.
    pub request: String,
}

/// Body of `renameChannel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameChannelRequest {
    /// Target channel.
    pub channel_id: ChannelId,
    /// New channel name.
    pub channel_name: String,
}
