//! Application layer for parley
//!
//! View state, long-running engine interactions and user actions, built on
//! the typed [`parley_client::Backend`].
//!
//! # Components
//!
//! - [`App`]: Pure reducer over [`AppEvent`]s (channels, identities,
//!   notifications, flow status)
//! - [`EventSink`]: Applies events to the shared [`App`] and broadcasts them
//! - [`SyncRegistry`]: One synchronization loop per channel, pulling new
//!   messages whenever the engine reports activity
//! - [`invite`]: Two-phase invite handshake
//! - [`CommandRegistry`]: Slash commands in the posting path
//! - [`Session`]: Integration layer exposing every user action

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod app;
mod command;
mod event;
pub mod invite;
mod session;
mod state;
mod sync;

pub use app::App;
pub use command::{
    Command, CommandError, CommandInvocation, CommandRegistry, CommandSpec, InviteParams,
};
pub use event::{AppEvent, EventSink};
pub use session::{PostOutcome, Session, SessionConfig, SessionError};
pub use state::{
    ChannelMessage, ChannelState, IdentityState, InvitePhase, InviteRequestState, NetworkStatus,
    NewChannelState, Notification, NotificationKind,
};
pub use sync::{SyncRegistry, SyncState, run_channel_sync};
