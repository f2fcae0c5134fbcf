//! Backend operation names.

use std::{fmt, str::FromStr};

use crate::ProtocolError;

/// Operations the host may request from the backend engine.
///
/// Each variant maps 1:1 to a wire name of the form `network:<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    /// Unlock the engine with a passphrase.
    Init,
    /// Query whether the engine finished initializing.
    IsReady,
    /// List all known channels.
    GetChannels,
    /// List all local identities.
    GetIdentities,
    /// Create an identity together with its own channel.
    CreateIdentityPair,
    /// Derive a read-only channel from a peer's public key.
    ChannelFromPublicKey,
    /// Remove an identity and the channel it was paired with.
    RemoveIdentityPair,
    /// Replace a channel's metadata object.
    UpdateChannelMetadata,
    /// Number of messages stored for a channel.
    GetMessageCount,
    /// Page of messages, newest first, from an offset.
    GetReverseMessagesAtOffset,
    /// Block until a channel receives a new message.
    WaitForIncomingMessage,
    /// Post a message to a channel as an identity.
    PostMessage,
    /// Generate an invite request for an identity.
    RequestInvite,
    /// Block until a peer accepts an identity's invite request.
    WaitForInvite,
    /// Grant an invite request, completing the peer's handshake.
    Invite,
    /// Rename a channel locally.
    RenameChannel,
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Self; 16] = [
        Self::Init,
        Self::IsReady,
        Self::GetChannels,
        Self::GetIdentities,
        Self::CreateIdentityPair,
        Self::ChannelFromPublicKey,
        Self::RemoveIdentityPair,
        Self::UpdateChannelMetadata,
        Self::GetMessageCount,
        Self::GetReverseMessagesAtOffset,
        Self::WaitForIncomingMessage,
        Self::PostMessage,
        Self::RequestInvite,
        Self::WaitForInvite,
        Self::Invite,
        Self::RenameChannel,
    ];

    /// Wire name of this operation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "network:init",
            Self::IsReady => "network:isReady",
            Self::GetChannels => "network:getChannels",
            Self::GetIdentities => "network:getIdentities",
            Self::CreateIdentityPair => "network:createIdentityPair",
            Self::ChannelFromPublicKey => "network:channelFromPublicKey",
            Self::RemoveIdentityPair => "network:removeIdentityPair",
            Self::UpdateChannelMetadata => "network:updateChannelMetadata",
            Self::GetMessageCount => "network:getMessageCount",
            Self::GetReverseMessagesAtOffset => "network:getReverseMessagesAtOffset",
            Self::WaitForIncomingMessage => "network:waitForIncomingMessage",
            Self::PostMessage => "network:postMessage",
            Self::RequestInvite => "network:requestInvite",
            Self::WaitForInvite => "network:waitForInvite",
            Self::Invite => "network:invite",
            Self::RenameChannel => "network:renameChannel",
        }
    }

    /// Whether the engine may hold this request open indefinitely.
    ///
    /// Blocking operations never get a client-side timeout.
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::WaitForIncomingMessage | Self::WaitForInvite)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownOperation(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>(), Ok(op));
        }
    }

    #[test]
    fn wire_names_are_namespaced() {
        assert!(Operation::ALL.iter().all(|op| op.as_str().starts_with("network:")));
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert_eq!(
            "network:selfDestruct".parse::<Operation>(),
            Err(ProtocolError::UnknownOperation("network:selfDestruct".into()))
        );
    }

    #[test]
    fn only_waits_block() {
        let blocking: Vec<_> = Operation::ALL.into_iter().filter(|op| op.is_blocking()).collect();
        assert_eq!(blocking, vec![Operation::WaitForIncomingMessage, Operation::WaitForInvite]);
    }
}
