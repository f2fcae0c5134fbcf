//! Integration layer.
//!
//! [`Session`] is what a UI talks to: every user action is one async method
//! that calls the engine, turns the result into [`AppEvent`]s and turns any
//! failure into a notification. The UI renders [`Session::snapshot`] and
//! reacts to [`Session::subscribe`].

use std::sync::Arc;

use parley_client::{Backend, CallError, DEFAULT_LOAD_LIMIT};
use parley_proto::{Channel, ChannelId, Message};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::{
    App, AppEvent, Command, CommandError, CommandRegistry, EventSink, InviteParams, SyncRegistry,
    invite, sync,
};

/// Session tunables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Messages loaded per round trip.
    pub page_size: u64,
    /// Events buffered per subscriber before it lags.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { page_size: DEFAULT_LOAD_LIMIT, event_capacity: 256 }
    }
}

/// Failure of a session action. Already reported to the user as an event or
/// notification by the time it is returned.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Engine call failed.
    #[error(transparent)]
    Call(#[from] CallError),

    /// Command text was rejected.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// What [`Session::post_message`] did with the text.
#[derive(Debug, Clone, PartialEq)]
pub enum PostOutcome {
    /// Posted as a plain message.
    Posted(Message),
    /// Ran as a command.
    Command(Command),
}

/// User-facing actions against one engine.
///
/// Cloning shares the backend, state and sync loops.
#[derive(Clone)]
pub struct Session {
    backend: Backend,
    events: EventSink,
    sync: SyncRegistry,
    commands: Arc<CommandRegistry>,
    config: SessionConfig,
}

impl Session {
    /// Session with the standard commands.
    pub fn new(backend: Backend, config: SessionConfig) -> Self {
        Self::with_commands(backend, config, CommandRegistry::standard())
    }

    /// Session with a custom command registry.
    pub fn with_commands(
        backend: Backend,
        config: SessionConfig,
        commands: CommandRegistry,
    ) -> Self {
        let events = EventSink::new(config.event_capacity);
        let sync = SyncRegistry::new(backend.clone(), events.clone(), config.page_size);
        Self { backend, events, sync, commands: Arc::new(commands), config }
    }

    /// Engine facade.
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Event sink.
    pub fn events(&self) -> &EventSink {
        &self.events
    }

    /// Sync loops.
    pub fn sync(&self) -> &SyncRegistry {
        &self.sync
    }

    /// Active configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.events.subscribe()
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> App {
        self.events.snapshot()
    }

    /// Unlock the engine and load its channels and identities.
    pub async fn init_network(&self, passphrase: &str) -> Result<(), SessionError> {
        self.events.emit(AppEvent::NetworkLoading);
        match self.load_network(passphrase).await {
            Ok(()) => {
                self.events.emit(AppEvent::NetworkReady);
                Ok(())
            },
            Err(e) => {
                tracing::warn!(error = %e, "network init failed");
                self.events.emit(AppEvent::NetworkError { message: e.to_string() });
                Err(e.into())
            },
        }
    }

    async fn load_network(&self, passphrase: &str) -> Result<(), CallError> {
        self.backend.init(passphrase).await?;

        for channel in self.backend.get_channels().await? {
            self.sync.add_channel(channel);
        }
        for identity in self.backend.get_identities().await? {
            self.events.emit(AppEvent::IdentityAdded(identity));
        }
        Ok(())
    }

    /// Create an identity together with a channel it can post to.
    pub async fn new_channel(&self, name: &str) -> Result<ChannelId, SessionError> {
        self.events.emit(AppEvent::NewChannelInProgress);
        let pair = self.backend.create_identity_pair(name).await.inspect_err(|e| {
            self.events.emit(AppEvent::NewChannelError { message: e.to_string() });
        })?;

        let channel_id = pair.channel.id.clone();
        self.sync.add_channel(pair.channel);
        self.events.emit(AppEvent::IdentityAdded(pair.identity));
        self.events.emit(AppEvent::NewChannelCreated { channel_id: channel_id.clone() });
        Ok(channel_id)
    }

    /// First invite phase: generate a request blob for `identity_key`.
    pub async fn request_invite(&self, identity_key: &str) -> Result<String, SessionError> {
        Ok(invite::request_invite(&self.backend, &self.events, identity_key).await?)
    }

    /// Second invite phase: block until a peer accepts.
    pub async fn wait_for_invite(&self, identity_key: &str) -> Result<Channel, SessionError> {
        Ok(invite::wait_for_invite(&self.backend, &self.events, &self.sync, identity_key).await?)
    }

    /// Grant a peer's invite request.
    pub async fn invite(&self, params: &InviteParams) -> Result<(), SessionError> {
        Ok(invite::invite(&self.backend, &self.events, params).await?)
    }

    /// Post `text` to a channel, running it as a command if it starts with
    /// `/`. Plain text is posted as `{"text": ...}`.
    pub async fn post_message(
        &self,
        channel_id: &str,
        identity_key: &str,
        text: &str,
    ) -> Result<PostOutcome, SessionError> {
        if CommandRegistry::is_command(text) {
            let command =
                self.commands.dispatch(text, channel_id, identity_key).inspect_err(|e| {
                    self.events.error(format!("Failed to post message: {e}"));
                })?;
            self.run(&command).await?;
            return Ok(PostOutcome::Command(command));
        }

        let message = self
            .backend
            .post_message(channel_id, identity_key, json!({ "text": text }))
            .await
            .inspect_err(|e| {
                self.events.error(format!("Failed to post message: {e}"));
            })?;

        self.events.emit(AppEvent::MessageAppended {
            channel_id: channel_id.to_owned(),
            message: message.clone(),
            is_posted: true,
        });
        Ok(PostOutcome::Posted(message))
    }

    async fn run(&self, command: &Command) -> Result<(), SessionError> {
        match command {
            Command::Invite(params) => self.invite(params).await,
        }
    }

    /// Announce a channel and start its sync loop (once).
    pub fn add_channel(&self, channel: Channel) -> bool {
        self.sync.add_channel(channel)
    }

    /// Refresh a channel's message count.
    pub async fn update_message_count(&self, channel_id: &str) -> Result<u64, SessionError> {
        Ok(sync::refresh_message_count(&self.backend, &self.events, channel_id).await?)
    }

    /// Load up to `limit` messages, skipping the `offset` newest.
    ///
    /// Returns the number of messages in the page.
    pub async fn load_messages(
        &self,
        channel_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<usize, SessionError> {
        Ok(sync::load_messages(&self.backend, &self.events, channel_id, offset, limit).await?)
    }

    /// Load the newest page of messages.
    pub async fn load_latest(&self, channel_id: &str) -> Result<usize, SessionError> {
        self.load_messages(channel_id, 0, self.config.page_size).await
    }

    /// Follow a peer's channel by public key.
    pub async fn channel_from_public_key(
        &self,
        public_key: &str,
        name: &str,
    ) -> Result<Channel, SessionError> {
        let channel =
            self.backend.channel_from_public_key(public_key, name).await.inspect_err(|e| {
                self.events.error(format!("Failed to add channel: {e}"));
            })?;
        self.sync.add_channel(channel.clone());
        Ok(channel)
    }

    /// Remove an identity and its paired channel, stopping the channel's
    /// sync loop.
    pub async fn remove_identity_pair(
        &self,
        channel_id: &str,
        identity_key: &str,
    ) -> Result<(), SessionError> {
        self.backend.remove_identity_pair(channel_id, identity_key).await.inspect_err(|e| {
            self.events.error(format!("Failed to remove channel: {e}"));
        })?;
        self.sync.stop(channel_id);
        Ok(())
    }

    /// Replace a channel's metadata.
    pub async fn update_channel_metadata(
        &self,
        channel_id: &str,
        metadata: Value,
    ) -> Result<(), SessionError> {
        self.backend.update_channel_metadata(channel_id, metadata).await.inspect_err(|e| {
            self.events.error(format!("Failed to update channel metadata: {e}"));
        })?;
        Ok(())
    }

    /// Rename a channel.
    pub async fn rename_channel(&self, channel_id: &str, name: &str) -> Result<(), SessionError> {
        self.backend.rename_channel(channel_id, name).await.inspect_err(|e| {
            self.events.error(format!("Failed to rename channel: {e}"));
        })?;
        self.events.emit(AppEvent::ChannelRenamed {
            channel_id: channel_id.to_owned(),
            name: name.to_owned(),
        });
        Ok(())
    }

    /// Mark a channel read up to its current message count.
    pub fn mark_read(&self, channel_id: &str) {
        self.events.emit(AppEvent::ChannelMarkedRead { channel_id: channel_id.to_owned() });
    }

    /// Keep only the newest `count` loaded messages of a channel.
    pub fn trim_messages(&self, channel_id: &str, count: usize) {
        self.events.emit(AppEvent::MessagesTrimmed { channel_id: channel_id.to_owned(), count });
    }

    /// Dismiss a notification.
    pub fn remove_notification(&self, id: u64) {
        self.events.emit(AppEvent::NotificationRemoved { id });
    }

    /// Clear the new channel form.
    pub fn reset_new_channel(&self) {
        self.events.emit(AppEvent::NewChannelReset);
    }

    /// Clear the invite handshake state.
    pub fn reset_invite_request(&self) {
        self.events.emit(AppEvent::InviteRequestReset);
    }

    /// Stop every sync loop and the backend connection.
    pub fn shutdown(&self) {
        self.sync.shutdown();
        self.backend.shutdown();
    }
}
