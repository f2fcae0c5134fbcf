//! Simulated backend engine.
//!
//! [`SimEngine`] attaches to a [`Bus`] as the [`Side::Peer`] endpoint and
//! answers host requests from in-memory state: channels, identities, message
//! histories and invite requests. Identifiers and hashes come from a seeded
//! ChaCha RNG, so a given seed and request sequence always produces the same
//! responses.
//!
//! Blocking operations behave like the real engine: `waitForIncomingMessage`
//! parks until a message lands in the channel (or its engine-side timeout
//! expires) and `waitForInvite` parks until an invite for the identity is
//! granted.
//!
//! Tests steer the engine through [`SimEngine::fail_next`],
//! [`SimEngine::silence`], [`SimEngine::fail_waits`],
//! [`SimEngine::deliver_message`] and [`SimEngine::accept_invite`], and
//! observe it through [`SimEngine::calls`] and [`SimEngine::wait_until`].

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use parley_client::{Bus, Link};
use parley_proto::{
    Channel, ChannelId, Envelope, Identity, IdentityKey, IdentityPair, Message, Operation, Side,
    payloads::{
        ChannelFromPublicKeyRequest, ChannelRequest, CreateIdentityPairRequest, IdentityRequest,
        InitRequest, InviteRequest, PostMessageRequest, RemoveIdentityPairRequest,
        RenameChannelRequest, ReverseMessagesRequest, UpdateChannelMetadataRequest,
        WaitForIncomingMessageRequest,
    },
};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::{
    sync::{Notify, mpsc},
    task::AbortHandle,
};

use crate::EngineError;

/// Timestamp of the first simulated message (milliseconds).
const EPOCH_MS: u64 = 1_700_000_000_000;

/// Simulated time between consecutive messages (milliseconds).
const TICK_MS: u64 = 1_000;

/// A channel and its history.
struct ChannelRecord {
    channel: Channel,
    messages: Vec<Message>,
}

/// Engine-side timeout for a parked message wait.
struct WaitTimer {
    channel_id: ChannelId,
    seq: u32,
    after: Duration,
}

/// Envelopes and timers produced by one state transition.
#[derive(Default)]
struct Effects {
    replies: Vec<Envelope>,
    timer: Option<WaitTimer>,
}

/// Engine state. Only touched under [`EngineShared::state`].
struct EngineState {
    rng: ChaCha8Rng,
    clock: u64,
    passphrase: Option<String>,
    channels: BTreeMap<ChannelId, ChannelRecord>,
    identities: BTreeMap<IdentityKey, Identity>,
    /// Issued invite request blob -> requesting identity.
    invite_requests: HashMap<String, IdentityKey>,
    /// Parked `waitForIncomingMessage` sequence ids per channel.
    message_waits: HashMap<ChannelId, Vec<u32>>,
    /// Parked `waitForInvite` sequence ids per identity.
    invite_waits: HashMap<IdentityKey, Vec<u32>>,
    /// Granted channels nobody was waiting for yet.
    accepted: HashMap<IdentityKey, VecDeque<Channel>>,
    faults: HashMap<Operation, VecDeque<String>>,
    silenced: HashSet<Operation>,
    calls: Vec<Operation>,
}

impl EngineState {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            clock: EPOCH_MS,
            passphrase: None,
            channels: BTreeMap::new(),
            identities: BTreeMap::new(),
            invite_requests: HashMap::new(),
            message_waits: HashMap::new(),
            invite_waits: HashMap::new(),
            accepted: HashMap::new(),
            faults: HashMap::new(),
            silenced: HashSet::new(),
            calls: Vec::new(),
        }
    }

    /// Process one host request.
    fn handle(&mut self, request: Envelope) -> Effects {
        let seq = request.seq;
        let op = match request.operation() {
            Ok(op) => op,
            Err(e) => {
                tracing::warn!(seq, error = %e, "rejecting unrecognized request");
                return Effects {
                    replies: vec![Envelope::failure(Side::Peer, seq, e.to_string(), None)],
                    timer: None,
                };
            },
        };

        self.calls.push(op);

        if self.silenced.contains(&op) {
            tracing::debug!(seq, %op, "request silenced");
            return Effects::default();
        }

        if let Some(message) = self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            tracing::debug!(seq, %op, "injecting failure");
            return Effects { replies: vec![failure(seq, op, message)], timer: None };
        }

        let mut effects = Effects::default();
        let payload = request.payload.unwrap_or(Value::Null);
        match self.execute(op, seq, payload, &mut effects) {
            Ok(Some(value)) => effects.replies.insert(0, Envelope::success(Side::Peer, seq, value)),
            Ok(None) => tracing::trace!(seq, %op, "request parked"),
            Err(e) => {
                tracing::debug!(seq, %op, error = %e, "request rejected");
                effects.replies.insert(0, failure(seq, op, e.to_string()));
            },
        }
        effects
    }

    /// Run `op`. `Ok(None)` parks the request.
    fn execute(
        &mut self,
        op: Operation,
        seq: u32,
        payload: Value,
        effects: &mut Effects,
    ) -> Result<Option<Value>, EngineError> {
        if !matches!(op, Operation::Init | Operation::IsReady) && self.passphrase.is_none() {
            return Err(EngineError::NotInitialized);
        }

        let value = match op {
            Operation::Init => {
                let req: InitRequest = parse(op, payload)?;
                self.init(req.passphrase)?;
                Value::Null
            },
            Operation::IsReady => Value::Bool(self.passphrase.is_some()),
            Operation::GetChannels => {
                let channels: Vec<&Channel> = self.channels.values().map(|r| &r.channel).collect();
                encode(&channels)?
            },
            Operation::GetIdentities => {
                let identities: Vec<&Identity> = self.identities.values().collect();
                encode(&identities)?
            },
            Operation::CreateIdentityPair => {
                let req: CreateIdentityPairRequest = parse(op, payload)?;
                encode(&self.create_identity_pair(&req.name))?
            },
            Operation::ChannelFromPublicKey => {
                let req: ChannelFromPublicKeyRequest = parse(op, payload)?;
                encode(&self.channel_from_public_key(req.public_key, req.name))?
            },
            Operation::RemoveIdentityPair => {
                let req: RemoveIdentityPairRequest = parse(op, payload)?;
                self.remove_identity_pair(&req.channel_id, &req.identity_key, effects)?;
                Value::Null
            },
            Operation::UpdateChannelMetadata => {
                let req: UpdateChannelMetadataRequest = parse(op, payload)?;
                self.channel_mut(&req.channel_id)?.channel.metadata = req.metadata;
                Value::Null
            },
            Operation::GetMessageCount => {
                let req: ChannelRequest = parse(op, payload)?;
                Value::from(self.channel(&req.channel_id)?.messages.len() as u64)
            },
            Operation::GetReverseMessagesAtOffset => {
                let req: ReverseMessagesRequest = parse(op, payload)?;
                let page: Vec<&Message> = self
                    .channel(&req.channel_id)?
                    .messages
                    .iter()
                    .rev()
                    .skip(usize::try_from(req.offset).unwrap_or(usize::MAX))
                    .take(usize::try_from(req.limit).unwrap_or(usize::MAX))
                    .collect();
                encode(&page)?
            },
            Operation::WaitForIncomingMessage => {
                let req: WaitForIncomingMessageRequest = parse(op, payload)?;
                self.channel(&req.channel_id)?;
                if let Some(ms) = req.timeout {
                    effects.timer = Some(WaitTimer {
                        channel_id: req.channel_id.clone(),
                        seq,
                        after: Duration::from_millis(ms),
                    });
                }
                self.message_waits.entry(req.channel_id).or_default().push(seq);
                return Ok(None);
            },
            Operation::PostMessage => {
                let req: PostMessageRequest = parse(op, payload)?;
                let message = self.post(&req.channel_id, &req.identity_key, req.json, effects)?;
                encode(&message)?
            },
            Operation::RequestInvite => {
                let req: IdentityRequest = parse(op, payload)?;
                Value::String(self.request_invite(req.identity_key)?)
            },
            Operation::WaitForInvite => {
                let req: IdentityRequest = parse(op, payload)?;
                self.identity(&req.identity_key)?;
                let ready = self.accepted.get_mut(&req.identity_key).and_then(VecDeque::pop_front);
                match ready {
                    Some(channel) => encode(&channel)?,
                    None => {
                        self.invite_waits.entry(req.identity_key).or_default().push(seq);
                        return Ok(None);
                    },
                }
            },
            Operation::Invite => {
                let req: InviteRequest = parse(op, payload)?;
                self.invite(&req, effects)?;
                Value::Null
            },
            Operation::RenameChannel => {
                let req: RenameChannelRequest = parse(op, payload)?;
                self.channel_mut(&req.channel_id)?.channel.name = req.channel_name;
                Value::Null
            },
        };

        Ok(Some(value))
    }

    fn init(&mut self, passphrase: String) -> Result<(), EngineError> {
        if passphrase.is_empty() {
            return Err(EngineError::EmptyPassphrase);
        }
        match &self.passphrase {
            Some(current) if *current != passphrase => Err(EngineError::InvalidPassphrase),
            Some(_) => Ok(()),
            None => {
                self.passphrase = Some(passphrase);
                Ok(())
            },
        }
    }

    /// Fresh hex identifier of `len` random bytes.
    fn new_id(&mut self, len: usize) -> String {
        let mut bytes = vec![0u8; len];
        self.rng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    fn channel(&self, channel_id: &str) -> Result<&ChannelRecord, EngineError> {
        self.channels.get(channel_id).ok_or_else(|| EngineError::UnknownChannel(channel_id.into()))
    }

    fn channel_mut(&mut self, channel_id: &str) -> Result<&mut ChannelRecord, EngineError> {
        self.channels
            .get_mut(channel_id)
            .ok_or_else(|| EngineError::UnknownChannel(channel_id.into()))
    }

    fn identity(&self, identity_key: &str) -> Result<&Identity, EngineError> {
        self.identities
            .get(identity_key)
            .ok_or_else(|| EngineError::UnknownIdentity(identity_key.into()))
    }

    fn add_channel(&mut self, channel: Channel) {
        self.channels
            .entry(channel.id.clone())
            .or_insert(ChannelRecord { channel, messages: Vec::new() });
    }

    fn create_identity_pair(&mut self, name: &str) -> IdentityPair {
        let public_key = self.new_id(32);
        let channel = Channel { id: self.new_id(16), name: name.to_owned(), metadata: Value::Null };
        let identity = Identity {
            display_path: format!("{name}/{}", &public_key[..8]),
            public_key,
            channel_ids: vec![channel.id.clone()],
        };

        self.add_channel(channel.clone());
        self.identities.insert(identity.public_key.clone(), identity.clone());
        IdentityPair { identity, channel }
    }

    fn channel_from_public_key(&mut self, public_key: String, name: String) -> Channel {
        if let Some(record) = self.channels.get(&public_key) {
            return record.channel.clone();
        }
        let channel = Channel { id: public_key, name, metadata: Value::Null };
        self.add_channel(channel.clone());
        channel
    }

    fn remove_identity_pair(
        &mut self,
        channel_id: &str,
        identity_key: &str,
        effects: &mut Effects,
    ) -> Result<(), EngineError> {
        self.channel(channel_id)?;
        self.identity(identity_key)?;

        self.identities.remove(identity_key);
        self.channels.remove(channel_id);
        for identity in self.identities.values_mut() {
            identity.channel_ids.retain(|id| id != channel_id);
        }

        let reason = EngineError::ChannelRemoved(channel_id.into()).to_string();
        for seq in self.message_waits.remove(channel_id).unwrap_or_default() {
            effects.replies.push(failure(seq, Operation::WaitForIncomingMessage, reason.clone()));
        }
        Ok(())
    }

    /// Append a message and wake every wait parked on the channel.
    fn append(
        &mut self,
        channel_id: &str,
        author: Option<String>,
        json: Value,
        effects: &mut Effects,
    ) -> Result<Message, EngineError> {
        self.channel(channel_id)?;
        let hash = self.new_id(32);
        self.clock += TICK_MS;
        let timestamp = self.clock;

        let record = self.channel_mut(channel_id)?;
        let message =
            Message { hash, height: record.messages.len() as u64, author, timestamp, json };
        record.messages.push(message.clone());

        for seq in self.message_waits.remove(channel_id).unwrap_or_default() {
            effects.replies.push(Envelope::success(Side::Peer, seq, Value::Null));
        }
        Ok(message)
    }

    fn post(
        &mut self,
        channel_id: &str,
        identity_key: &str,
        json: Value,
        effects: &mut Effects,
    ) -> Result<Message, EngineError> {
        let identity = self.identity(identity_key)?;
        if !identity.channel_ids.iter().any(|id| id == channel_id) {
            return Err(EngineError::NotPostable {
                identity_key: identity_key.into(),
                channel_id: channel_id.into(),
            });
        }
        let author = identity.display_path.clone();
        self.append(channel_id, Some(author), json, effects)
    }

    fn request_invite(&mut self, identity_key: IdentityKey) -> Result<String, EngineError> {
        self.identity(&identity_key)?;
        let request = self.new_id(24);
        self.invite_requests.insert(request.clone(), identity_key);
        Ok(request)
    }

    fn invite(&mut self, req: &InviteRequest, effects: &mut Effects) -> Result<(), EngineError> {
        let inviter = self.identity(&req.identity_key)?;
        if !inviter.channel_ids.contains(&req.channel_id) {
            return Err(EngineError::NotPostable {
                identity_key: req.identity_key.clone(),
                channel_id: req.channel_id.clone(),
            });
        }
        let channel = self.channel(&req.channel_id)?.channel.clone();
        let invitee =
            self.invite_requests.remove(&req.request).ok_or(EngineError::UnknownInviteRequest)?;

        tracing::debug!(channel_id = %channel.id, invitee_name = %req.invitee_name, "invite granted");
        self.grant(&invitee, channel, effects)
    }

    /// Give `identity_key` posting rights on `channel` and resolve its waits.
    fn grant(
        &mut self,
        identity_key: &str,
        channel: Channel,
        effects: &mut Effects,
    ) -> Result<(), EngineError> {
        let identity = self
            .identities
            .get_mut(identity_key)
            .ok_or_else(|| EngineError::UnknownIdentity(identity_key.into()))?;
        if !identity.channel_ids.contains(&channel.id) {
            identity.channel_ids.push(channel.id.clone());
        }

        let waiting = self.invite_waits.remove(identity_key).unwrap_or_default();
        if waiting.is_empty() {
            self.accepted.entry(identity_key.to_owned()).or_default().push_back(channel);
            return Ok(());
        }

        let value = encode(&channel)?;
        for seq in waiting {
            effects.replies.push(Envelope::success(Side::Peer, seq, value.clone()));
        }
        Ok(())
    }

    /// Remove a parked message wait. Returns whether it was still parked.
    fn take_message_wait(&mut self, channel_id: &str, seq: u32) -> bool {
        let Some(waits) = self.message_waits.get_mut(channel_id) else {
            return false;
        };
        let before = waits.len();
        waits.retain(|&s| s != seq);
        before != waits.len()
    }
}

struct EngineShared {
    state: Mutex<EngineState>,
    outgoing: mpsc::Sender<Envelope>,
    activity: Notify,
}

impl EngineShared {
    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send replies produced by a state transition.
    async fn deliver(&self, replies: Vec<Envelope>) -> bool {
        for reply in replies {
            if self.outgoing.send(reply).await.is_err() {
                return false;
            }
        }
        true
    }
}

/// In-process stand-in for the backend engine.
pub struct SimEngine {
    shared: Arc<EngineShared>,
    task: AbortHandle,
}

impl SimEngine {
    /// Attach a new engine to `bus`, seeding its RNG with `seed`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn attach(bus: &Bus, seed: u64) -> Self {
        Self::serve(bus.attach(), seed)
    }

    /// Serve requests arriving on `link`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn serve(link: Link, seed: u64) -> Self {
        let Link { outgoing, incoming, .. } = link;
        let shared = Arc::new(EngineShared {
            state: Mutex::new(EngineState::new(seed)),
            outgoing,
            activity: Notify::new(),
        });
        let task = tokio::spawn(run(Arc::clone(&shared), incoming)).abort_handle();
        Self { shared, task }
    }

    /// Fail the next `op` request with `message`.
    ///
    /// Multiple injected failures for the same operation fire in order.
    pub fn fail_next(&self, op: Operation, message: impl Into<String>) {
        self.shared.state().faults.entry(op).or_default().push_back(message.into());
    }

    /// Never answer `op` requests from now on.
    pub fn silence(&self, op: Operation) {
        self.shared.state().silenced.insert(op);
    }

    /// Fail every `waitForIncomingMessage` parked on `channel_id`.
    ///
    /// Returns the number of waits failed.
    pub async fn fail_waits(&self, channel_id: &str, message: &str) -> usize {
        let replies: Vec<Envelope> = {
            let mut state = self.shared.state();
            state
                .message_waits
                .remove(channel_id)
                .unwrap_or_default()
                .into_iter()
                .map(|seq| failure(seq, Operation::WaitForIncomingMessage, message.to_owned()))
                .collect()
        };
        let failed = replies.len();
        self.shared.activity.notify_waiters();
        self.shared.deliver(replies).await;
        failed
    }

    /// A remote peer posts `json` to `channel_id` as `author`.
    pub async fn deliver_message(
        &self,
        channel_id: &str,
        author: &str,
        json: Value,
    ) -> Result<Message, EngineError> {
        let mut effects = Effects::default();
        let message =
            self.shared.state().append(channel_id, Some(author.to_owned()), json, &mut effects)?;
        self.shared.activity.notify_waiters();
        self.shared.deliver(effects.replies).await;
        Ok(message)
    }

    /// A remote peer accepts `identity_key`'s invite request, creating a new
    /// shared channel named `channel_name`.
    pub async fn accept_invite(
        &self,
        identity_key: &str,
        channel_name: &str,
    ) -> Result<Channel, EngineError> {
        let mut effects = Effects::default();
        let channel = {
            let mut state = self.shared.state();
            let channel =
                Channel { id: state.new_id(16), name: channel_name.to_owned(), metadata: Value::Null };
            state.identity(identity_key)?;
            state.add_channel(channel.clone());
            state.grant(identity_key, channel.clone(), &mut effects)?;
            channel
        };
        self.shared.activity.notify_waiters();
        self.shared.deliver(effects.replies).await;
        Ok(channel)
    }

    /// Number of `op` requests received so far.
    pub fn calls(&self, op: Operation) -> usize {
        self.shared.state().calls.iter().filter(|&&c| c == op).count()
    }

    /// Every request received so far, in arrival order.
    pub fn call_log(&self) -> Vec<Operation> {
        self.shared.state().calls.clone()
    }

    /// Number of `waitForIncomingMessage` requests parked on `channel_id`.
    pub fn parked_waits(&self, channel_id: &str) -> usize {
        self.shared.state().message_waits.get(channel_id).map_or(0, Vec::len)
    }

    /// Stored history of `channel_id`, oldest first.
    pub fn messages(&self, channel_id: &str) -> Vec<Message> {
        self.shared.state().channels.get(channel_id).map(|r| r.messages.clone()).unwrap_or_default()
    }

    /// Current record for `identity_key`.
    pub fn identity(&self, identity_key: &str) -> Option<Identity> {
        self.shared.state().identities.get(identity_key).cloned()
    }

    /// Wait until `condition` holds, re-checking after every engine event.
    pub async fn wait_until(&self, mut condition: impl FnMut(&Self) -> bool) {
        loop {
            let notified = self.shared.activity.notified();
            if condition(self) {
                return;
            }
            notified.await;
        }
    }

    /// Stop serving requests. Parked requests are never answered.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

/// Serve requests until the link closes.
async fn run(shared: Arc<EngineShared>, mut incoming: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = incoming.recv().await {
        if envelope.sender == Side::Peer {
            continue;
        }

        let effects = shared.state().handle(envelope);
        shared.activity.notify_waiters();

        if let Some(timer) = effects.timer {
            arm(&shared, timer);
        }
        if !shared.deliver(effects.replies).await {
            break;
        }
    }
    tracing::debug!("sim engine stopped");
}

/// Expire a parked message wait after its engine-side timeout.
fn arm(shared: &Arc<EngineShared>, timer: WaitTimer) {
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        tokio::time::sleep(timer.after).await;
        let expired = shared.state().take_message_wait(&timer.channel_id, timer.seq);
        if expired {
            let reply = failure(
                timer.seq,
                Operation::WaitForIncomingMessage,
                EngineError::WaitTimedOut.to_string(),
            );
            shared.activity.notify_waiters();
            shared.deliver(vec![reply]).await;
        }
    });
}

fn failure(seq: u32, op: Operation, message: String) -> Envelope {
    Envelope::failure(Side::Peer, seq, message, Some(format!("at {op} (sim engine)")))
}

fn parse<T: DeserializeOwned>(op: Operation, payload: Value) -> Result<T, EngineError> {
    serde_json::from_value(payload)
        .map_err(|e| EngineError::InvalidPayload { op, reason: e.to_string() })
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Value, EngineError> {
    serde_json::to_value(value).map_err(|e| EngineError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request(op: Operation, seq: u32, payload: Value) -> Envelope {
        Envelope::request(Side::Host, op, seq, Some(payload))
    }

    fn ready_state() -> EngineState {
        let mut state = EngineState::new(7);
        let effects = state.handle(request(Operation::Init, 0, json!({ "passphrase": "pw" })));
        assert!(!effects.replies[0].is_failure());
        state
    }

    #[test]
    fn requests_before_init_are_rejected() {
        let mut state = EngineState::new(1);
        let effects = state.handle(Envelope::request(Side::Host, Operation::GetChannels, 3, None));

        assert_eq!(effects.replies.len(), 1);
        assert_eq!(effects.replies[0].seq, 3);
        assert_eq!(
            effects.replies[0].error.as_deref(),
            Some(EngineError::NotInitialized.to_string().as_str())
        );
    }

    #[test]
    fn same_seed_yields_same_identifiers() {
        let mut a = ready_state();
        let mut b = ready_state();

        assert_eq!(a.create_identity_pair("x"), b.create_identity_pair("x"));
    }

    #[test]
    fn post_wakes_parked_waits() {
        let mut state = ready_state();
        let pair = state.create_identity_pair("general");
        let channel_id = pair.channel.id.clone();

        let parked = state.handle(request(
            Operation::WaitForIncomingMessage,
            1,
            json!({ "channelId": channel_id }),
        ));
        assert!(parked.replies.is_empty());

        let posted = state.handle(request(
            Operation::PostMessage,
            2,
            json!({
                "channelId": channel_id,
                "identityKey": pair.identity.public_key,
                "json": { "text": "hi" },
            }),
        ));

        let seqs: Vec<u32> = posted.replies.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![2, 1]);
        assert!(posted.replies.iter().all(|e| !e.is_failure()));
    }

    #[test]
    fn reverse_page_is_newest_first() {
        let mut state = ready_state();
        let pair = state.create_identity_pair("general");
        let channel_id = pair.channel.id.clone();
        for n in 0..5 {
            state.append(&channel_id, None, json!(n), &mut Effects::default()).unwrap();
        }

        let effects = state.handle(request(
            Operation::GetReverseMessagesAtOffset,
            9,
            json!({ "channelId": channel_id, "offset": 1, "limit": 2 }),
        ));
        let page: Vec<Message> =
            serde_json::from_value(effects.replies[0].payload.clone().unwrap()).unwrap();

        assert_eq!(page.iter().map(|m| m.json.clone()).collect::<Vec<_>>(), vec![json!(3), json!(2)]);
    }

    #[test]
    fn invite_request_is_single_use() {
        let mut state = ready_state();
        let host = state.create_identity_pair("host");
        let guest = state.create_identity_pair("guest");
        let blob = state.request_invite(guest.identity.public_key.clone()).unwrap();

        let req = InviteRequest {
            identity_key: host.identity.public_key.clone(),
            channel_id: host.channel.id.clone(),
            invitee_name: "guest".into(),
            request: blob,
        };
        assert_eq!(state.invite(&req, &mut Effects::default()), Ok(()));
        assert_eq!(
            state.invite(&req, &mut Effects::default()),
            Err(EngineError::UnknownInviteRequest)
        );
        assert!(state.identities[&guest.identity.public_key].channel_ids.contains(&host.channel.id));
    }

    #[test]
    fn silenced_operation_gets_no_reply() {
        let mut state = ready_state();
        state.silenced.insert(Operation::IsReady);

        let effects = state.handle(Envelope::request(Side::Host, Operation::IsReady, 4, None));
        assert!(effects.replies.is_empty());
        assert_eq!(state.calls.last(), Some(&Operation::IsReady));
    }
}
