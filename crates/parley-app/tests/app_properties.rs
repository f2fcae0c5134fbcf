//! Property-based tests for the App reducer.
//!
//! Arbitrary event sequences, including duplicates, out-of-order heights and
//! events for unknown channels, must leave the state consistent.

use parley_app::{App, AppEvent, Notification, NotificationKind};
use parley_proto::{Channel, Message};
use proptest::prelude::*;
use serde_json::{Value, json};

const CHANNELS: [&str; 3] = ["a", "b", "c"];

fn channel_id() -> impl Strategy<Value = String> {
    prop::sample::select(CHANNELS.to_vec()).prop_map(str::to_owned)
}

/// Messages are identified by height so duplicates collide on hash.
fn message() -> impl Strategy<Value = Message> {
    (0u64..16).prop_map(|height| Message {
        hash: format!("h{height}"),
        height,
        author: Some("peer".into()),
        timestamp: height,
        json: json!(height),
    })
}

fn event_strategy() -> impl Strategy<Value = AppEvent> {
    prop_oneof![
        2 => channel_id().prop_map(|id| AppEvent::ChannelAdded(Channel {
            name: format!("#{id}"),
            id,
            metadata: Value::Null,
        })),
        6 => (channel_id(), message(), any::<bool>()).prop_map(|(channel_id, message, is_posted)| {
            AppEvent::MessageAppended { channel_id, message, is_posted }
        }),
        1 => (channel_id(), 0usize..8)
            .prop_map(|(channel_id, count)| AppEvent::MessagesTrimmed { channel_id, count }),
        2 => (channel_id(), 0u64..32)
            .prop_map(|(channel_id, count)| AppEvent::MessageCountSet { channel_id, count }),
        1 => channel_id().prop_map(|channel_id| AppEvent::ChannelMarkedRead { channel_id }),
        1 => (0u64..8).prop_map(|id| AppEvent::NotificationRemoved { id }),
    ]
}

/// Notifications are stamped the way the event sink stamps them.
fn apply_all(events: &[AppEvent], notify_every: usize) -> App {
    let mut app = App::new();
    for (i, event) in events.iter().enumerate() {
        app.apply(event);
        if notify_every > 0 && i % notify_every == 0 {
            let notification = Notification {
                id: app.next_notification_id(),
                kind: NotificationKind::Info,
                content: format!("event {i}"),
            };
            app.apply(&AppEvent::NotificationAdded(notification));
        }
    }
    app
}

proptest! {
    #[test]
    fn prop_messages_unique_and_ordered(
        events in prop::collection::vec(event_strategy(), 0..64)
    ) {
        let app = apply_all(&events, 0);

        for channel in app.channels().values() {
            let heights: Vec<u64> = channel.messages.iter().map(|m| m.message.height).collect();
            prop_assert!(heights.windows(2).all(|w| w[0] < w[1]), "unordered: {heights:?}");
        }
    }

    #[test]
    fn prop_only_known_channels_exist(
        events in prop::collection::vec(event_strategy(), 0..64)
    ) {
        let app = apply_all(&events, 0);

        for id in app.channels().keys() {
            let announced = events
                .iter()
                .any(|e| matches!(e, AppEvent::ChannelAdded(c) if c.id == *id));
            prop_assert!(announced);
        }
    }

    #[test]
    fn prop_notification_ids_increase(
        events in prop::collection::vec(event_strategy(), 0..64),
        notify_every in 1usize..4,
    ) {
        let app = apply_all(&events, notify_every);

        let ids: Vec<u64> = app.notifications().iter().map(|n| n.id).collect();
        prop_assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids: {ids:?}");
        if let Some(last) = ids.last() {
            prop_assert!(app.next_notification_id() > *last);
        }
    }

    #[test]
    fn prop_replay_is_deterministic(
        events in prop::collection::vec(event_strategy(), 0..64)
    ) {
        prop_assert_eq!(apply_all(&events, 2), apply_all(&events, 2));
    }
}
