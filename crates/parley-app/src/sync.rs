//! Per-channel synchronization loop.
//!
//! One background task per known channel blocks on `waitForIncomingMessage`,
//! then refreshes the channel's message count and loads the messages it has
//! not seen yet, then re-arms:
//!
//! ```text
//! Idle -> Waiting -> Draining -> Idle -> Waiting -> ...
//!            |
//!            +-> Failed (terminal)
//! ```
//!
//! # Invariants
//!
//! - At most one outstanding wait per channel: a new wait is only issued
//!   after the previous drain completes.
//! - The message count is refreshed before new messages are appended.
//! - A failed wait ends the loop. Nothing restarts it except an explicit
//!   [`SyncRegistry::restart`].
//! - Drain failures are reported and the loop re-arms; the next cycle retries
//!   the messages that failed to load.
//! - The loaded height only advances past messages actually appended. A
//!   message landing between the count refresh and the page request shifts
//!   the page but never leaves a gap.
//! - [`SyncRegistry`] runs at most one loop per channel id.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use parley_client::{Backend, CallError};
use parley_proto::{Channel, ChannelId, Message};
use tokio::{sync::watch, task::AbortHandle};

use crate::{AppEvent, EventSink};

/// State of one channel's synchronization loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Between cycles.
    Idle,
    /// Blocked on the engine reporting activity.
    Waiting,
    /// Refreshing the count and loading new messages.
    Draining,
    /// The wait failed; the loop has stopped.
    Failed,
}

/// Refresh a channel's message count, reporting failures to the user.
pub(crate) async fn refresh_message_count(
    backend: &Backend,
    events: &EventSink,
    channel_id: &str,
) -> Result<u64, CallError> {
    let count = backend.get_message_count(channel_id).await.inspect_err(|e| {
        events.error(format!("Failed to update message count: {e}"));
    })?;
    events.emit(AppEvent::MessageCountSet { channel_id: channel_id.to_owned(), count });
    Ok(count)
}

/// Fetch one page, newest first, reporting failures to the user.
async fn fetch_page(
    backend: &Backend,
    events: &EventSink,
    channel_id: &str,
    offset: u64,
    limit: u64,
) -> Result<Vec<Message>, CallError> {
    backend.get_reverse_messages_at_offset(channel_id, offset, limit).await.inspect_err(|e| {
        events.error(format!("Failed to load messages: {e}"));
    })
}

/// Append a newest-first run of messages oldest first.
fn append(events: &EventSink, channel_id: &str, newest_first: Vec<Message>) {
    for message in newest_first.into_iter().rev() {
        events.emit(AppEvent::MessageAppended {
            channel_id: channel_id.to_owned(),
            message,
            is_posted: false,
        });
    }
}

/// Load a page of messages and append them oldest first, reporting failures
/// to the user. Returns the number of messages in the page.
pub(crate) async fn load_messages(
    backend: &Backend,
    events: &EventSink,
    channel_id: &str,
    offset: u64,
    limit: u64,
) -> Result<usize, CallError> {
    let page = fetch_page(backend, events, channel_id, offset, limit).await?;
    let loaded = page.len();
    append(events, channel_id, page);
    Ok(loaded)
}

/// Drive one channel's synchronization loop until its wait fails.
///
/// `next_height` is one past the highest message height already loaded in
/// the app, or `None` if nothing is loaded. With nothing loaded the first
/// drain starts from the newest `page_size` messages as of the refreshed
/// count. Every drain pages back, `page_size` messages per request, until it
/// reaches the height it starts from. Returns the error that ended the loop.
pub async fn run_channel_sync(
    backend: Backend,
    events: EventSink,
    channel_id: ChannelId,
    next_height: Option<u64>,
    page_size: u64,
    state: watch::Sender<SyncState>,
) -> CallError {
    ChannelSync { backend, events, channel_id, next_height, page_size, state }.run().await
}

struct ChannelSync {
    backend: Backend,
    events: EventSink,
    channel_id: ChannelId,
    next_height: Option<u64>,
    page_size: u64,
    state: watch::Sender<SyncState>,
}

impl ChannelSync {
    async fn run(mut self) -> CallError {
        tracing::debug!(
            channel_id = %self.channel_id,
            next_height = ?self.next_height,
            "sync loop started"
        );
        loop {
            self.state.send_replace(SyncState::Waiting);
            if let Err(e) = self.backend.wait_for_incoming_message(&self.channel_id, None).await {
                tracing::warn!(channel_id = %self.channel_id, error = %e, "sync loop stopped");
                self.events.error(format!("Failed to wait for an update: {e}"));
                self.state.send_replace(SyncState::Failed);
                return e;
            }

            self.state.send_replace(SyncState::Draining);
            self.drain().await;
            self.state.send_replace(SyncState::Idle);
        }
    }

    async fn drain(&mut self) {
        let Ok(count) = refresh_message_count(&self.backend, &self.events, &self.channel_id).await
        else {
            return;
        };
        let floor = self.next_height.unwrap_or_else(|| count.saturating_sub(self.page_size));
        let Ok(unseen) = self.fetch_from(floor).await else {
            return;
        };

        let loaded = unseen.len();
        let newest = unseen.first().map_or(floor, |m| m.height.saturating_add(1));
        self.next_height = Some(floor.max(newest));
        append(&self.events, &self.channel_id, unseen);
        tracing::trace!(
            channel_id = %self.channel_id,
            count,
            loaded,
            next_height = ?self.next_height,
            "channel drained"
        );
    }

    /// Every message at or above height `floor`, newest first.
    ///
    /// Pages are requested from the newest end, so messages that land while
    /// paging shift older ones to higher offsets; paging continues until a
    /// page reaches `floor` or the start of the history.
    async fn fetch_from(&self, floor: u64) -> Result<Vec<Message>, CallError> {
        let mut unseen = Vec::new();
        let mut offset = 0u64;
        loop {
            let page =
                fetch_page(&self.backend, &self.events, &self.channel_id, offset, self.page_size)
                    .await?;
            let len = u64::try_from(page.len()).unwrap_or(u64::MAX);
            let reached = page.last().is_none_or(|oldest| oldest.height <= floor);
            unseen.extend(page.into_iter().filter(|m| m.height >= floor));
            if reached || len < self.page_size {
                return Ok(unseen);
            }
            offset = offset.saturating_add(len);
        }
    }
}

struct SyncHandle {
    state: watch::Receiver<SyncState>,
    task: AbortHandle,
}

struct RegistryShared {
    backend: Backend,
    events: EventSink,
    page_size: u64,
    loops: Mutex<HashMap<ChannelId, SyncHandle>>,
}

/// Owns the synchronization loops, at most one per channel.
///
/// Cloning shares the same set of loops.
#[derive(Clone)]
pub struct SyncRegistry {
    shared: Arc<RegistryShared>,
}

impl SyncRegistry {
    /// Create an empty registry. Loops request `page_size` messages at a
    /// time.
    pub fn new(backend: Backend, events: EventSink, page_size: u64) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                backend,
                events,
                page_size,
                loops: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn loops(&self) -> MutexGuard<'_, HashMap<ChannelId, SyncHandle>> {
        self.shared.loops.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Announce `channel` and start its loop.
    ///
    /// Returns `false` if the channel already had a loop.
    pub fn add_channel(&self, channel: Channel) -> bool {
        let channel_id = channel.id.clone();
        self.shared.events.emit(AppEvent::ChannelAdded(channel));
        self.start(&channel_id)
    }

    /// Start the loop for `channel_id`.
    ///
    /// Returns `false` if the channel already has a loop, including a failed
    /// one. Must be called from within a Tokio runtime.
    pub fn start(&self, channel_id: &str) -> bool {
        let mut loops = self.loops();
        if loops.contains_key(channel_id) {
            tracing::trace!(channel_id, "sync loop already running");
            return false;
        }
        loops.insert(channel_id.to_owned(), self.spawn(channel_id));
        true
    }

    /// Start a fresh loop for a channel whose loop failed.
    ///
    /// Returns `false` if the channel has no loop or its loop has not failed.
    pub fn restart(&self, channel_id: &str) -> bool {
        let mut loops = self.loops();
        let failed = loops
            .get(channel_id)
            .is_some_and(|handle| *handle.state.borrow() == SyncState::Failed);
        if !failed {
            return false;
        }
        tracing::info!(channel_id, "restarting sync loop");
        loops.insert(channel_id.to_owned(), self.spawn(channel_id));
        true
    }

    /// Stop and forget the loop for `channel_id`. Returns whether one existed.
    pub fn stop(&self, channel_id: &str) -> bool {
        match self.loops().remove(channel_id) {
            Some(handle) => {
                handle.task.abort();
                true
            },
            None => false,
        }
    }

    /// Current state of the loop for `channel_id`.
    pub fn state(&self, channel_id: &str) -> Option<SyncState> {
        self.loops().get(channel_id).map(|handle| *handle.state.borrow())
    }

    /// Watch the state of the loop for `channel_id`.
    pub fn watch(&self, channel_id: &str) -> Option<watch::Receiver<SyncState>> {
        self.loops().get(channel_id).map(|handle| handle.state.clone())
    }

    /// Channels with a loop, sorted.
    pub fn channels(&self) -> Vec<ChannelId> {
        let mut channels: Vec<ChannelId> = self.loops().keys().cloned().collect();
        channels.sort();
        channels
    }

    /// Abort every loop.
    pub fn shutdown(&self) {
        for (_, handle) in self.loops().drain() {
            handle.task.abort();
        }
    }

    fn spawn(&self, channel_id: &str) -> SyncHandle {
        let next_height = self.shared.events.read(|app| {
            app.channel(channel_id)
                .and_then(|channel| channel.messages.last())
                .map(|loaded| loaded.message.height.saturating_add(1))
        });
        let (tx, rx) = watch::channel(SyncState::Idle);
        let task = tokio::spawn(run_channel_sync(
            self.shared.backend.clone(),
            self.shared.events.clone(),
            channel_id.to_owned(),
            next_height,
            self.shared.page_size,
            tx,
        ));
        SyncHandle { state: rx, task: task.abort_handle() }
    }
}
