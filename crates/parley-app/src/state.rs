//! Observable application state types.
//!
//! These are the view model the UI renders: channels with their loaded
//! history, identities with the channels they may post to, notifications and
//! the status of the long-running flows (network init, channel creation,
//! invite handshake).

use std::collections::{BTreeSet, HashSet};

use parley_proto::{Channel, ChannelId, IdentityKey, Message};
use serde_json::Value;

/// Status of the connection to the backend engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NetworkStatus {
    /// `init_network` not called yet.
    #[default]
    Idle,
    /// Engine initialization in progress.
    Loading,
    /// Engine initialized and initial channels/identities loaded.
    Ready,
    /// Initialization failed.
    Error(String),
}

/// Status of the "new channel" form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NewChannelState {
    /// Nothing in flight.
    #[default]
    Idle,
    /// Identity pair creation in flight.
    InProgress,
    /// Channel created.
    Created {
        /// The new channel.
        channel_id: ChannelId,
    },
    /// Creation (or an invite phase) failed.
    Error(String),
}

/// Phase of the invite handshake, from the invitee's side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvitePhase {
    /// No handshake in progress.
    #[default]
    Idle,
    /// Request blob being generated.
    Generating,
    /// Request blob ready to be shared out-of-band.
    Ready,
    /// Blocked until a peer accepts the request.
    Waiting,
    /// A peer accepted; the new channel is known.
    GotChannel,
}

/// Invite handshake state. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InviteRequestState {
    /// Current phase.
    pub phase: InvitePhase,
    /// Identity the request was generated for.
    pub identity_key: Option<IdentityKey>,
    /// Request blob to hand to the inviting peer.
    pub request: Option<String>,
    /// Channel obtained once the peer accepted.
    pub channel: Option<Channel>,
}

/// A message together with how it reached this client.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    /// Message as stored by the engine.
    pub message: Message,
    /// Posted from this client rather than loaded from the engine.
    pub is_posted: bool,
}

/// Per-channel state.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelState {
    /// Engine-assigned channel id.
    pub id: ChannelId,
    /// Display name.
    pub name: String,
    /// UI-owned metadata.
    pub metadata: Value,
    /// Loaded messages ordered by height. Hashes are unique.
    ///
    /// Read-only for callers; mutate through [`Self::insert`] and
    /// [`Self::trim`] so the hash index stays in step.
    pub messages: Vec<ChannelMessage>,
    /// Authoritative message count last reported by the engine.
    pub message_count: u64,
    /// Message count at the time the channel was last marked read.
    pub last_read: u64,
    /// Hashes of `messages`.
    hashes: HashSet<String>,
}

impl ChannelState {
    /// Empty state for a newly known channel.
    pub fn new(channel: &Channel) -> Self {
        Self {
            id: channel.id.clone(),
            name: channel.name.clone(),
            metadata: channel.metadata.clone(),
            messages: Vec::new(),
            message_count: 0,
            last_read: 0,
            hashes: HashSet::new(),
        }
    }

    /// Number of messages the engine holds beyond the read marker.
    pub fn unread(&self) -> u64 {
        self.message_count.saturating_sub(self.last_read)
    }

    /// Whether a message with `hash` is loaded.
    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    /// Insert a message at its height position. Returns `false` if a message
    /// with the same hash is already loaded; a posted report still marks the
    /// loaded copy as posted.
    pub fn insert(&mut self, message: Message, is_posted: bool) -> bool {
        if self.hashes.contains(&message.hash) {
            if is_posted {
                self.mark_posted(&message);
            }
            return false;
        }
        self.hashes.insert(message.hash.clone());
        let at = self.messages.partition_point(|m| m.message.height <= message.height);
        self.messages.insert(at, ChannelMessage { message, is_posted });
        true
    }

    fn mark_posted(&mut self, message: &Message) {
        // Copies share a height, so only that run needs scanning.
        let start = self.messages.partition_point(|m| m.message.height < message.height);
        let mut run = self.messages[start..]
            .iter_mut()
            .take_while(|m| m.message.height == message.height);
        if let Some(loaded) = run.find(|m| m.message.hash == message.hash) {
            loaded.is_posted = true;
            return;
        }
        if let Some(loaded) = self.messages.iter_mut().find(|m| m.message.hash == message.hash) {
            loaded.is_posted = true;
        }
    }

    /// Keep only the newest `count` loaded messages.
    pub fn trim(&mut self, count: usize) {
        let excess = self.messages.len().saturating_sub(count);
        for dropped in self.messages.drain(..excess) {
            self.hashes.remove(&dropped.message.hash);
        }
    }
}

/// Per-identity state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityState {
    /// Identity public key.
    pub public_key: IdentityKey,
    /// Display path shown next to posted messages.
    pub display_path: String,
    /// Channels this identity may post to.
    pub postable: BTreeSet<ChannelId>,
}

impl IdentityState {
    /// Whether this identity may post to `channel_id`.
    pub fn can_post(&self, channel_id: &str) -> bool {
        self.postable.contains(channel_id)
    }
}

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Informational.
    Info,
    /// A failed operation the user should know about.
    Error,
}

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Unique, monotonically increasing id.
    pub id: u64,
    /// Severity.
    pub kind: NotificationKind,
    /// Text shown to the user.
    pub content: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn message(hash: &str, height: u64) -> Message {
        Message { hash: hash.into(), height, author: None, timestamp: 0, json: json!(height) }
    }

    fn channel() -> ChannelState {
        ChannelState::new(&Channel { id: "c".into(), name: "c".into(), metadata: Value::Null })
    }

    #[test]
    fn insert_orders_by_height_regardless_of_arrival() {
        let mut state = channel();
        for (hash, height) in [("c", 2), ("a", 0), ("b", 1)] {
            assert!(state.insert(message(hash, height), false));
        }

        let hashes: Vec<&str> = state.messages.iter().map(|m| m.message.hash.as_str()).collect();
        assert_eq!(hashes, ["a", "b", "c"]);
    }

    #[test]
    fn insert_rejects_duplicate_hash() {
        let mut state = channel();
        assert!(state.insert(message("a", 0), true));
        assert!(!state.insert(message("a", 0), false));

        assert_eq!(state.messages.len(), 1);
        assert!(state.messages[0].is_posted);
    }

    #[test]
    fn posted_report_marks_loaded_copy() {
        let mut state = channel();
        assert!(state.insert(message("a", 0), false));
        assert!(!state.insert(message("a", 0), true));

        assert!(state.messages[0].is_posted);
    }

    #[test]
    fn trim_keeps_newest() {
        let mut state = channel();
        for height in 0..5 {
            state.insert(message(&height.to_string(), height), false);
        }
        state.trim(2);

        let heights: Vec<u64> = state.messages.iter().map(|m| m.message.height).collect();
        assert_eq!(heights, [3, 4]);
    }

    #[test]
    fn trimmed_message_can_be_loaded_again() {
        let mut state = channel();
        for height in 0..4 {
            state.insert(message(&height.to_string(), height), false);
        }
        state.trim(1);
        assert!(!state.contains("0"));
        assert!(state.contains("3"));

        assert!(state.insert(message("0", 0), false));
        assert!(!state.insert(message("3", 3), false));

        let heights: Vec<u64> = state.messages.iter().map(|m| m.message.height).collect();
        assert_eq!(heights, [0, 3]);
    }

    #[test]
    fn full_page_loads_every_message_once() {
        let mut state = channel();
        for height in (0..1024).rev() {
            assert!(state.insert(message(&format!("h{height}"), height), false));
        }
        for height in 0..1024 {
            assert!(!state.insert(message(&format!("h{height}"), height), false));
        }

        assert_eq!(state.messages.len(), 1024);
        assert!(state.messages.windows(2).all(|w| w[0].message.height < w[1].message.height));
        assert!((0..1024).all(|height| state.contains(&format!("h{height}"))));
    }
}
