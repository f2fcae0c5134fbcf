//! Invite handshake.
//!
//! Two independent phases, each a single engine call, coordinated by the
//! caller:
//!
//! 1. [`request_invite`]: generate a request blob for an identity. The blob
//!    travels out-of-band to the inviting peer.
//! 2. [`wait_for_invite`]: block until a peer accepts, then grant the
//!    identity posting rights on the new channel and start its sync loop.
//!
//! The inviting peer finishes the exchange with [`invite`], usually through
//! the `/invite` command.
//!
//! Either phase may be retried on its own. A failed phase emits no identity
//! or channel events.

use parley_client::{Backend, CallError};
use parley_proto::Channel;

use crate::{AppEvent, EventSink, InviteParams, SyncRegistry};

fn report_failure(events: &EventSink, error: &CallError) {
    events.emit(AppEvent::NewChannelError { message: error.to_string() });
    events.error(format!("Invite handshake failed: {error}"));
}

/// Generate an invite request for `identity_key`.
pub async fn request_invite(
    backend: &Backend,
    events: &EventSink,
    identity_key: &str,
) -> Result<String, CallError> {
    events.emit(AppEvent::InviteRequestGenerating);
    let request = backend
        .request_invite(identity_key)
        .await
        .inspect_err(|e| report_failure(events, e))?;

    events.emit(AppEvent::InviteRequestReady {
        identity_key: identity_key.to_owned(),
        request: request.clone(),
    });
    Ok(request)
}

/// Block until a peer accepts `identity_key`'s invite request.
///
/// On success the identity may post to the returned channel and the channel
/// has a running sync loop.
pub async fn wait_for_invite(
    backend: &Backend,
    events: &EventSink,
    sync: &SyncRegistry,
    identity_key: &str,
) -> Result<Channel, CallError> {
    events.emit(AppEvent::InviteRequestWaiting);
    let channel = backend
        .wait_for_invite(identity_key)
        .await
        .inspect_err(|e| report_failure(events, e))?;

    tracing::info!(identity_key, channel_id = %channel.id, "invite accepted");
    events.emit(AppEvent::IdentityChannelAdded {
        identity_key: identity_key.to_owned(),
        channel_id: channel.id.clone(),
    });
    sync.add_channel(channel.clone());
    events.emit(AppEvent::InviteRequestGotChannel { channel: channel.clone() });
    Ok(channel)
}

/// Grant a peer's invite request on one of our channels.
pub async fn invite(
    backend: &Backend,
    events: &EventSink,
    params: &InviteParams,
) -> Result<(), CallError> {
    match backend.invite(&params.to_request()).await {
        Ok(()) => {
            events.info(format!("Invited \"{}\" to the channel", params.invitee_name));
            Ok(())
        },
        Err(e) => {
            events.error(format!("Failed to invite \"{}\": {e}", params.invitee_name));
            Err(e)
        },
    }
}
