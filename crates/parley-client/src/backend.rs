//! Typed backend operations.
//!
//! Each method maps 1:1 onto one engine operation: a fixed operation name, a
//! fixed payload shape and a typed result. Nothing here retries, caches or
//! waits on its own; callers own retry and backoff policy.

use parley_proto::{
    Channel, ChannelId, Identity, IdentityPair, Message, Operation, Side,
    payloads::{
        ChannelFromPublicKeyRequest, ChannelRequest, CreateIdentityPairRequest, IdentityRequest,
        InitRequest, InviteRequest, PostMessageRequest, RemoveIdentityPairRequest,
        RenameChannelRequest, ReverseMessagesRequest, UpdateChannelMetadataRequest,
        WaitForIncomingMessageRequest,
    },
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{CallError, ClientConfig, Correlator, Link};

/// Default page size for [`Backend::get_reverse_messages_at_offset`].
pub const DEFAULT_LOAD_LIMIT: u64 = 1024;

/// Typed facade over the engine's operations.
#[derive(Clone)]
pub struct Backend {
    correlator: Correlator,
    config: ClientConfig,
}

impl Backend {
    /// Wrap an existing correlator.
    pub fn new(correlator: Correlator, config: ClientConfig) -> Self {
        Self { correlator, config }
    }

    /// Start a host-side correlator on `link` and wrap it.
    pub fn connect(link: Link, config: ClientConfig) -> Self {
        Self::new(Correlator::spawn(Side::Host, link), config)
    }

    /// Underlying correlator.
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Stop the correlator, failing outstanding calls.
    pub fn shutdown(&self) {
        self.correlator.shutdown();
    }

    /// Unlock the engine.
    pub async fn init(&self, passphrase: &str) -> Result<(), CallError> {
        self.send(Operation::Init, &InitRequest { passphrase: passphrase.to_owned() }).await
    }

    /// Whether the engine has finished initializing.
    pub async fn is_ready(&self) -> Result<bool, CallError> {
        self.query(Operation::IsReady).await
    }

    /// All channels known to the engine.
    pub async fn get_channels(&self) -> Result<Vec<Channel>, CallError> {
        self.query(Operation::GetChannels).await
    }

    /// All local identities.
    pub async fn get_identities(&self) -> Result<Vec<Identity>, CallError> {
        self.query(Operation::GetIdentities).await
    }

    /// Create an identity and a channel it can post to.
    pub async fn create_identity_pair(&self, name: &str) -> Result<IdentityPair, CallError> {
        self.request(Operation::CreateIdentityPair, &CreateIdentityPairRequest {
            name: name.to_owned(),
        })
        .await
    }

    /// Follow a peer's channel by its public key.
    pub async fn channel_from_public_key(
        &self,
        public_key: &str,
        name: &str,
    ) -> Result<Channel, CallError> {
        self.request(Operation::ChannelFromPublicKey, &ChannelFromPublicKeyRequest {
            public_key: public_key.to_owned(),
            name: name.to_owned(),
        })
        .await
    }

    /// Remove an identity together with its paired channel.
    pub async fn remove_identity_pair(
        &self,
        channel_id: &str,
        identity_key: &str,
    ) -> Result<(), CallError> {
        self.send(Operation::RemoveIdentityPair, &RemoveIdentityPairRequest {
            channel_id: channel_id.to_owned(),
            identity_key: identity_key.to_owned(),
        })
        .await
    }

    /// Replace a channel's metadata.
    pub async fn update_channel_metadata(
        &self,
        channel_id: &str,
        metadata: Value,
    ) -> Result<(), CallError> {
        self.send(Operation::UpdateChannelMetadata, &UpdateChannelMetadataRequest {
            channel_id: channel_id.to_owned(),
            metadata,
        })
        .await
    }

    /// Number of messages stored for a channel.
    pub async fn get_message_count(&self, channel_id: &str) -> Result<u64, CallError> {
        self.request(Operation::GetMessageCount, &ChannelRequest {
            channel_id: channel_id.to_owned(),
        })
        .await
    }

    /// Up to `limit` messages, newest first, skipping the `offset` newest.
    pub async fn get_reverse_messages_at_offset(
        &self,
        channel_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Message>, CallError> {
        self.request(Operation::GetReverseMessagesAtOffset, &ReverseMessagesRequest {
            channel_id: channel_id.to_owned(),
            offset,
            limit,
        })
        .await
    }

    /// Block until the channel receives a new message.
    ///
    /// `timeout_ms` is forwarded to the engine; no client-side timeout is
    /// applied.
    pub async fn wait_for_incoming_message(
        &self,
        channel_id: &ChannelId,
        timeout_ms: Option<u64>,
    ) -> Result<(), CallError> {
        self.send(Operation::WaitForIncomingMessage, &WaitForIncomingMessageRequest {
            channel_id: channel_id.clone(),
            timeout: timeout_ms,
        })
        .await
    }

    /// Post `json` to a channel as `identity_key`.
    pub async fn post_message(
        &self,
        channel_id: &str,
        identity_key: &str,
        json: Value,
    ) -> Result<Message, CallError> {
        self.request(Operation::PostMessage, &PostMessageRequest {
            channel_id: channel_id.to_owned(),
            identity_key: identity_key.to_owned(),
            json,
        })
        .await
    }

    /// Generate an invite request blob for an identity.
    pub async fn request_invite(&self, identity_key: &str) -> Result<String, CallError> {
        self.request(Operation::RequestInvite, &IdentityRequest {
            identity_key: identity_key.to_owned(),
        })
        .await
    }

    /// Block until a peer accepts the identity's invite request.
    pub async fn wait_for_invite(&self, identity_key: &str) -> Result<Channel, CallError> {
        self.request(Operation::WaitForInvite, &IdentityRequest {
            identity_key: identity_key.to_owned(),
        })
        .await
    }

    /// Grant a peer's invite request on one of our channels.
    pub async fn invite(&self, request: &InviteRequest) -> Result<(), CallError> {
        self.send(Operation::Invite, request).await
    }

    /// Rename a channel.
    pub async fn rename_channel(
        &self,
        channel_id: &str,
        channel_name: &str,
    ) -> Result<(), CallError> {
        self.send(Operation::RenameChannel, &RenameChannelRequest {
            channel_id: channel_id.to_owned(),
            channel_name: channel_name.to_owned(),
        })
        .await
    }

    /// Call with a body, decoding the response.
    async fn request<Req, Resp>(&self, op: Operation, body: &Req) -> Result<Resp, CallError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        self.correlator.call_as(op, body, self.config.timeout_for(op)).await
    }

    /// Call without a body, decoding the response.
    async fn query<Resp: DeserializeOwned>(&self, op: Operation) -> Result<Resp, CallError> {
        let response = self.correlator.call(op, None, self.config.timeout_for(op)).await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Call with a body, discarding whatever the engine returns.
    async fn send<Req: Serialize + ?Sized>(&self, op: Operation, body: &Req) -> Result<(), CallError> {
        let payload = serde_json::to_value(body)?;
        self.correlator.call(op, Some(payload), self.config.timeout_for(op)).await.map(drop)
    }
}
