//! Parley simulation binary.
//!
//! Runs a [`Session`] against an in-process simulated engine: unlocks the
//! engine, creates a channel, posts messages, then walks a second identity
//! through the invite handshake via the `/invite` command. Every app event
//! is logged.
//!
//! # Usage
//!
//! ```bash
//! parley-sim --channel general --messages 5
//! RUST_LOG=parley_client=trace parley-sim
//! ```

use std::time::Duration;

use clap::Parser;
use parley_app::{AppEvent, Session, SessionConfig};
use parley_harness::SimWorld;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley engine simulation
#[derive(Parser, Debug)]
#[command(name = "parley-sim")]
#[command(about = "Drive a parley session against a simulated engine")]
#[command(version)]
struct Args {
    /// Passphrase used to unlock the engine
    #[arg(long, default_value = "correct horse battery staple")]
    passphrase: String,

    /// Name of the channel to create
    #[arg(long, default_value = "general")]
    channel: String,

    /// Number of messages to post
    #[arg(long, default_value = "3")]
    messages: usize,

    /// Seed for the engine's RNG
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Identity allowed to post to `channel_id`.
fn poster(session: &Session, channel_id: &str) -> Result<String, Box<dyn std::error::Error>> {
    session
        .snapshot()
        .identities()
        .values()
        .find(|identity| identity.can_post(channel_id))
        .map(|identity| identity.public_key.clone())
        .ok_or_else(|| format!("no identity can post to {channel_id}").into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!(seed = args.seed, "parley simulation starting");

    let world = SimWorld::new(args.seed);
    let session = world.session(SessionConfig::default());

    let mut events = session.subscribe();
    let logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AppEvent::NotificationAdded(notification)) => {
                    tracing::info!(kind = ?notification.kind, "{}", notification.content);
                },
                Ok(event) => tracing::debug!(?event, "app event"),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    session.init_network(&args.passphrase).await?;
    let channel_id = session.new_channel(&args.channel).await?;
    let owner = poster(&session, &channel_id)?;
    tracing::info!(%channel_id, "channel created");

    for n in 0..args.messages {
        session.post_message(&channel_id, &owner, &format!("message {n}")).await?;
    }

    // A second identity joins the channel through the invite handshake.
    let guest_channel = session.new_channel("guest").await?;
    let guest = poster(&session, &guest_channel)?;
    let request = session.request_invite(&guest).await?;

    let waiter = {
        let session = session.clone();
        let guest = guest.clone();
        tokio::spawn(async move { session.wait_for_invite(&guest).await })
    };
    session.post_message(&channel_id, &owner, &format!("/invite guest sim-1 {request}")).await?;
    let joined = waiter.await??;
    session.post_message(&joined.id, &guest, "hello from the guest").await?;

    let expected = args.messages as u64 + 1;
    let caught_up = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let count = session.snapshot().channel(&channel_id).map_or(0, |c| c.message_count);
            if count >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if caught_up.is_err() {
        tracing::warn!(%channel_id, "sync loop did not catch up");
    }

    let app = session.snapshot();
    for channel in app.channels().values() {
        tracing::info!(
            channel = %channel.name,
            messages = channel.messages.len(),
            count = channel.message_count,
            sync = ?session.sync().state(&channel.id),
            "channel summary"
        );
    }

    session.shutdown();
    world.shutdown();
    logger.abort();
    Ok(())
}
