//! Application events and the sink that applies and publishes them.
//!
//! [`AppEvent`] is the complete vocabulary of state changes. Every event is
//! applied to the [`crate::App`] reducer and then broadcast, in that order and
//! under one lock, so subscribers observe events in exactly the order the
//! reducer applied them.
//!
//! The integration layer's three required streams are subsets of the
//! broadcast: [`AppEvent::ChannelAdded`], [`AppEvent::MessageAppended`] and
//! [`AppEvent::NotificationAdded`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use parley_proto::{Channel, ChannelId, Identity, IdentityKey, Message};
use tokio::sync::broadcast;

use crate::{App, Notification, NotificationKind};

/// State changes processed by the [`App`] reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Engine initialization started.
    NetworkLoading,

    /// Engine initialized; initial channels and identities loaded.
    NetworkReady,

    /// Engine initialization failed.
    NetworkError {
        /// Failure description.
        message: String,
    },

    /// Channel creation started.
    NewChannelInProgress,

    /// Channel creation finished.
    NewChannelCreated {
        /// The new channel.
        channel_id: ChannelId,
    },

    /// Channel creation or an invite phase failed.
    NewChannelError {
        /// Failure description.
        message: String,
    },

    /// New channel form cleared.
    NewChannelReset,

    /// Invite request generation started.
    InviteRequestGenerating,

    /// Invite request blob generated.
    InviteRequestReady {
        /// Identity the request belongs to.
        identity_key: IdentityKey,
        /// Blob to share with the inviting peer.
        request: String,
    },

    /// Waiting for a peer to accept the invite request.
    InviteRequestWaiting,

    /// A peer accepted the invite request.
    InviteRequestGotChannel {
        /// The newly joined channel.
        channel: Channel,
    },

    /// Invite handshake state cleared.
    InviteRequestReset,

    /// Notification shown to the user.
    NotificationAdded(Notification),

    /// Notification dismissed.
    NotificationRemoved {
        /// Id of the dismissed notification.
        id: u64,
    },

    /// Identity became known.
    IdentityAdded(Identity),

    /// Identity gained posting rights on a channel.
    IdentityChannelAdded {
        /// Identity gaining the right.
        identity_key: IdentityKey,
        /// Channel it may now post to.
        channel_id: ChannelId,
    },

    /// Channel became known.
    ChannelAdded(Channel),

    /// Message loaded or posted.
    MessageAppended {
        /// Target channel.
        channel_id: ChannelId,
        /// The message.
        message: Message,
        /// Posted from this client.
        is_posted: bool,
    },

    /// Loaded history trimmed to the newest `count` messages.
    MessagesTrimmed {
        /// Target channel.
        channel_id: ChannelId,
        /// Messages to keep.
        count: usize,
    },

    /// Authoritative message count refreshed.
    MessageCountSet {
        /// Target channel.
        channel_id: ChannelId,
        /// Count reported by the engine.
        count: u64,
    },

    /// Channel marked read up to its current message count.
    ChannelMarkedRead {
        /// Target channel.
        channel_id: ChannelId,
    },

    /// Channel renamed.
    ChannelRenamed {
        /// Target channel.
        channel_id: ChannelId,
        /// New name.
        name: String,
    },
}

struct SinkShared {
    app: Mutex<App>,
    tx: broadcast::Sender<AppEvent>,
}

/// Applies events to the shared [`App`] and broadcasts them.
///
/// Cloning shares the same state and broadcast channel.
#[derive(Clone)]
pub struct EventSink {
    shared: Arc<SinkShared>,
}

impl EventSink {
    /// Create a sink over a fresh [`App`], buffering up to `capacity` events
    /// per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { shared: Arc::new(SinkShared { app: Mutex::new(App::new()), tx }) }
    }

    fn app(&self) -> MutexGuard<'_, App> {
        self.shared.app.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `event` and broadcast it.
    pub fn emit(&self, event: AppEvent) {
        let mut app = self.app();
        app.apply(&event);
        // No subscribers is fine; state is still updated.
        let _ = self.shared.tx.send(event);
    }

    /// Add a notification. Returns its id.
    pub fn notify(&self, kind: NotificationKind, content: impl Into<String>) -> u64 {
        let mut app = self.app();
        let notification =
            Notification { id: app.next_notification_id(), kind, content: content.into() };
        let id = notification.id;
        let event = AppEvent::NotificationAdded(notification);
        app.apply(&event);
        let _ = self.shared.tx.send(event);
        id
    }

    /// Add an error notification. Returns its id.
    pub fn error(&self, content: impl Into<String>) -> u64 {
        let content = content.into();
        tracing::warn!(%content, "error notification");
        self.notify(NotificationKind::Error, content)
    }

    /// Add an informational notification. Returns its id.
    pub fn info(&self, content: impl Into<String>) -> u64 {
        self.notify(NotificationKind::Info, content)
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.shared.tx.subscribe()
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> App {
        self.app().clone()
    }

    /// Read the current state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&App) -> R) -> R {
        f(&self.app())
    }
}
