//! Application state reducer.
//!
//! [`App`] is a pure state machine: it consumes [`AppEvent`]s and updates the
//! view model. No I/O, no async; fully testable without an engine.
//!
//! # Invariants
//!
//! - Message hashes are unique within a channel; appending a known hash is a
//!   no-op. The sync loop and the posting path may both report a message.
//! - Loaded messages stay ordered by height regardless of arrival order.
//! - Notification ids increase monotonically.
//! - Events addressing an unknown channel or identity are ignored.

use std::collections::{BTreeMap, BTreeSet};

use parley_proto::{ChannelId, IdentityKey};

use crate::{
    AppEvent, ChannelState, IdentityState, InvitePhase, InviteRequestState, NetworkStatus,
    NewChannelState, Notification,
};

/// Application state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct App {
    network: NetworkStatus,
    new_channel: NewChannelState,
    invite_request: InviteRequestState,
    channels: BTreeMap<ChannelId, ChannelState>,
    identities: BTreeMap<IdentityKey, IdentityState>,
    notifications: Vec<Notification>,
    next_notification_id: u64,
}

impl App {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event.
    pub fn apply(&mut self, event: &AppEvent) {
        match event {
            AppEvent::NetworkLoading => self.network = NetworkStatus::Loading,
            AppEvent::NetworkReady => self.network = NetworkStatus::Ready,
            AppEvent::NetworkError { message } => {
                self.network = NetworkStatus::Error(message.clone());
            },
            AppEvent::NewChannelInProgress => self.new_channel = NewChannelState::InProgress,
            AppEvent::NewChannelCreated { channel_id } => {
                self.new_channel = NewChannelState::Created { channel_id: channel_id.clone() };
            },
            AppEvent::NewChannelError { message } => {
                self.new_channel = NewChannelState::Error(message.clone());
            },
            AppEvent::NewChannelReset => self.new_channel = NewChannelState::Idle,
            AppEvent::InviteRequestGenerating => {
                self.invite_request.phase = InvitePhase::Generating;
                self.invite_request.request = None;
            },
            AppEvent::InviteRequestReady { identity_key, request } => {
                self.invite_request.phase = InvitePhase::Ready;
                self.invite_request.identity_key = Some(identity_key.clone());
                self.invite_request.request = Some(request.clone());
            },
            AppEvent::InviteRequestWaiting => self.invite_request.phase = InvitePhase::Waiting,
            AppEvent::InviteRequestGotChannel { channel } => {
                self.invite_request.phase = InvitePhase::GotChannel;
                self.invite_request.channel = Some(channel.clone());
            },
            AppEvent::InviteRequestReset => self.invite_request = InviteRequestState::default(),
            AppEvent::NotificationAdded(notification) => {
                let after = notification.id.saturating_add(1);
                self.next_notification_id = self.next_notification_id.max(after);
                self.notifications.push(notification.clone());
            },
            AppEvent::NotificationRemoved { id } => self.notifications.retain(|n| n.id != *id),
            AppEvent::IdentityAdded(identity) => {
                let state = self.identities.entry(identity.public_key.clone()).or_insert_with(
                    || IdentityState {
                        public_key: identity.public_key.clone(),
                        display_path: String::new(),
                        postable: BTreeSet::new(),
                    },
                );
                state.display_path.clone_from(&identity.display_path);
                state.postable.extend(identity.channel_ids.iter().cloned());
            },
            AppEvent::IdentityChannelAdded { identity_key, channel_id } => {
                if let Some(identity) = self.identities.get_mut(identity_key) {
                    identity.postable.insert(channel_id.clone());
                }
            },
            AppEvent::ChannelAdded(channel) => {
                self.channels
                    .entry(channel.id.clone())
                    .and_modify(|state| {
                        state.name.clone_from(&channel.name);
                        state.metadata = channel.metadata.clone();
                    })
                    .or_insert_with(|| ChannelState::new(channel));
            },
            AppEvent::MessageAppended { channel_id, message, is_posted } => {
                if let Some(channel) = self.channels.get_mut(channel_id) {
                    channel.insert(message.clone(), *is_posted);
                }
            },
            AppEvent::MessagesTrimmed { channel_id, count } => {
                if let Some(channel) = self.channels.get_mut(channel_id) {
                    channel.trim(*count);
                }
            },
            AppEvent::MessageCountSet { channel_id, count } => {
                if let Some(channel) = self.channels.get_mut(channel_id) {
                    channel.message_count = *count;
                }
            },
            AppEvent::ChannelMarkedRead { channel_id } => {
                if let Some(channel) = self.channels.get_mut(channel_id) {
                    channel.last_read = channel.message_count;
                }
            },
            AppEvent::ChannelRenamed { channel_id, name } => {
                if let Some(channel) = self.channels.get_mut(channel_id) {
                    channel.name.clone_from(name);
                }
            },
        }
    }

    /// Id the next notification will receive.
    pub fn next_notification_id(&self) -> u64 {
        self.next_notification_id
    }

    /// Engine connection status.
    pub fn network(&self) -> &NetworkStatus {
        &self.network
    }

    /// New channel form status.
    pub fn new_channel(&self) -> &NewChannelState {
        &self.new_channel
    }

    /// Invite handshake state.
    pub fn invite_request(&self) -> &InviteRequestState {
        &self.invite_request
    }

    /// All known channels.
    pub fn channels(&self) -> &BTreeMap<ChannelId, ChannelState> {
        &self.channels
    }

    /// State of one channel.
    pub fn channel(&self, channel_id: &str) -> Option<&ChannelState> {
        self.channels.get(channel_id)
    }

    /// All known identities.
    pub fn identities(&self) -> &BTreeMap<IdentityKey, IdentityState> {
        &self.identities
    }

    /// State of one identity.
    pub fn identity(&self, identity_key: &str) -> Option<&IdentityState> {
        self.identities.get(identity_key)
    }

    /// Notifications, oldest first.
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }
}

#[cfg(test)]
mod tests {
    use parley_proto::{Channel, Identity, Message};
    use serde_json::{Value, json};

    use super::*;
    use crate::NotificationKind;

    fn channel(id: &str) -> Channel {
        Channel { id: id.into(), name: format!("#{id}"), metadata: Value::Null }
    }

    fn message(hash: &str, height: u64) -> Message {
        Message { hash: hash.into(), height, author: None, timestamp: 0, json: json!({}) }
    }

    fn app_with_channel(id: &str) -> App {
        let mut app = App::new();
        app.apply(&AppEvent::ChannelAdded(channel(id)));
        app
    }

    #[test]
    fn channel_added_twice_preserves_messages() {
        let mut app = app_with_channel("c");
        app.apply(&AppEvent::MessageAppended {
            channel_id: "c".into(),
            message: message("h", 0),
            is_posted: false,
        });

        let mut renamed = channel("c");
        renamed.name = "renamed".into();
        app.apply(&AppEvent::ChannelAdded(renamed));

        let state = app.channel("c").unwrap();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.name, "renamed");
    }

    #[test]
    fn duplicate_append_is_noop() {
        let mut app = app_with_channel("c");
        let event = AppEvent::MessageAppended {
            channel_id: "c".into(),
            message: message("h", 0),
            is_posted: true,
        };
        app.apply(&event);
        app.apply(&event);

        assert_eq!(app.channel("c").unwrap().messages.len(), 1);
    }

    #[test]
    fn append_to_unknown_channel_is_ignored() {
        let mut app = App::new();
        app.apply(&AppEvent::MessageAppended {
            channel_id: "missing".into(),
            message: message("h", 0),
            is_posted: false,
        });

        assert!(app.channels().is_empty());
    }

    #[test]
    fn mark_read_tracks_message_count() {
        let mut app = app_with_channel("c");
        app.apply(&AppEvent::MessageCountSet { channel_id: "c".into(), count: 5 });
        assert_eq!(app.channel("c").unwrap().unread(), 5);

        app.apply(&AppEvent::ChannelMarkedRead { channel_id: "c".into() });
        app.apply(&AppEvent::MessageCountSet { channel_id: "c".into(), count: 7 });

        let state = app.channel("c").unwrap();
        assert_eq!(state.last_read, 5);
        assert_eq!(state.unread(), 2);
    }

    #[test]
    fn identity_channel_grant_extends_postable_set() {
        let mut app = App::new();
        app.apply(&AppEvent::IdentityAdded(Identity {
            public_key: "k".into(),
            display_path: "me/k".into(),
            channel_ids: vec!["own".into()],
        }));
        app.apply(&AppEvent::IdentityChannelAdded {
            identity_key: "k".into(),
            channel_id: "shared".into(),
        });

        let identity = app.identity("k").unwrap();
        assert!(identity.can_post("own"));
        assert!(identity.can_post("shared"));
    }

    #[test]
    fn invite_request_lifecycle() {
        let mut app = App::new();
        app.apply(&AppEvent::InviteRequestGenerating);
        app.apply(&AppEvent::InviteRequestReady { identity_key: "k".into(), request: "r".into() });
        assert_eq!(app.invite_request().phase, InvitePhase::Ready);
        assert_eq!(app.invite_request().request.as_deref(), Some("r"));

        app.apply(&AppEvent::InviteRequestWaiting);
        app.apply(&AppEvent::InviteRequestGotChannel { channel: channel("shared") });
        assert_eq!(app.invite_request().channel, Some(channel("shared")));

        app.apply(&AppEvent::InviteRequestReset);
        assert_eq!(app.invite_request(), &InviteRequestState::default());
    }

    #[test]
    fn replayed_notification_advances_next_id() {
        let mut app = App::new();
        app.apply(&AppEvent::NotificationAdded(Notification {
            id: 9,
            kind: NotificationKind::Info,
            content: "hi".into(),
        }));
        assert_eq!(app.next_notification_id(), 10);

        app.apply(&AppEvent::NotificationRemoved { id: 9 });
        assert!(app.notifications().is_empty());
        assert_eq!(app.next_notification_id(), 10);
    }

    #[test]
    fn notification_id_at_max_saturates() {
        let mut app = App::new();
        app.apply(&AppEvent::NotificationAdded(Notification {
            id: u64::MAX,
            kind: NotificationKind::Error,
            content: "last".into(),
        }));

        assert_eq!(app.next_notification_id(), u64::MAX);
        assert_eq!(app.notifications().len(), 1);
    }
}
