//! Request/response correlation.
//!
//! The [`Correlator`] multiplexes many concurrent calls over one envelope
//! channel. Each call gets a sequence id and a [`PendingCall`] entry; a single
//! dispatch task reads the channel and completes the entry whose id matches
//! each response. Responses resolve in arrival order, independent of request
//! order.
//!
//! # Invariants
//!
//! - At most one pending call per sequence id.
//! - A response resolves at most one call. Responses with no pending entry
//!   (late, duplicate or foreign) are dropped silently.
//! - Envelopes tagged with our own [`Side`] are ignored (bus echo).
//! - The sequence counter and pending table are only touched by
//!   [`Correlator::call`], its cancellation guard, and the dispatch task.
//! - Dropping a call future removes its pending entry, so abandoned calls
//!   cannot grow the table.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use parley_proto::{Envelope, Operation, Side};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot},
    task::AbortHandle,
};

use crate::{CallError, Link, LinkHandle};

/// Bookkeeping for an outstanding request.
#[derive(Debug)]
pub struct PendingCall {
    /// Sequence id the response must carry.
    pub seq: u32,
    /// Operation requested.
    pub op: Operation,
    /// When the request was registered.
    pub created_at: Instant,
    /// Caller-supplied timeout, if any.
    pub timeout: Option<Duration>,
    /// Distinguishes this call from a later one reusing `seq` after wrap.
    call_id: u64,
    responder: oneshot::Sender<Envelope>,
}

/// Sequence counter and outstanding calls.
#[derive(Debug, Default)]
struct PendingTable {
    next_seq: u32,
    next_call_id: u64,
    calls: HashMap<u32, PendingCall>,
    closed: bool,
}

impl PendingTable {
    /// Allocate the next free sequence id, wrapping at `u32::MAX`.
    ///
    /// Skips ids still outstanding so uniqueness holds after wrap. Returns
    /// `None` only if every id is outstanding.
    fn allocate(&mut self) -> Option<u32> {
        for _ in 0..=u32::MAX {
            let seq = self.next_seq;
            self.next_seq = self.next_seq.wrapping_add(1);
            if !self.calls.contains_key(&seq) {
                return Some(seq);
            }
        }
        None
    }
}

struct Shared {
    side: Side,
    outgoing: mpsc::Sender<Envelope>,
    table: Mutex<PendingTable>,
    link: LinkHandle,
    dispatcher: Mutex<Option<AbortHandle>>,
}

impl Shared {
    fn table(&self) -> MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Complete the pending call matching `envelope`, if any.
    fn route(&self, envelope: Envelope) {
        if envelope.sender == self.side {
            tracing::trace!(seq = envelope.seq, "ignoring own envelope");
            return;
        }

        let Some(call) = self.table().calls.remove(&envelope.seq) else {
            tracing::debug!(seq = envelope.seq, "dropping unmatched envelope");
            return;
        };

        tracing::trace!(
            seq = call.seq,
            op = %call.op,
            elapsed = ?call.created_at.elapsed(),
            failed = envelope.is_failure(),
            "call resolved"
        );
        // Receiver gone means the caller was cancelled between our removal
        // and its guard running; nothing to deliver.
        let _ = call.responder.send(envelope);
    }

    /// Fail every outstanding call and refuse new ones.
    fn close(&self) {
        let mut table = self.table();
        table.closed = true;
        let abandoned = table.calls.len();
        table.calls.clear();
        if abandoned > 0 {
            tracing::debug!(abandoned, "correlator closed with calls outstanding");
        }
    }
}

/// Removes a pending entry if the call future is dropped before completion.
struct PendingGuard<'a> {
    shared: &'a Shared,
    seq: u32,
    call_id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut table = self.shared.table();
        if table.calls.get(&self.seq).is_some_and(|call| call.call_id == self.call_id) {
            table.calls.remove(&self.seq);
        }
    }
}

/// Handle to the correlation layer.
///
/// Cloning shares the same sequence counter, pending table and dispatch
/// task.
#[derive(Clone)]
pub struct Correlator {
    shared: Arc<Shared>,
}

impl Correlator {
    /// Start correlating calls made from `side` over `link`.
    ///
    /// Spawns the dispatch task that owns `link.incoming`. Must be called
    /// from within a Tokio runtime.
    pub fn spawn(side: Side, link: Link) -> Self {
        let Link { outgoing, incoming, handle } = link;
        let shared = Arc::new(Shared {
            side,
            outgoing,
            table: Mutex::new(PendingTable::default()),
            link: handle,
            dispatcher: Mutex::new(None),
        });

        let task = tokio::spawn(dispatch(Arc::clone(&shared), incoming));
        *shared.dispatcher.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(task.abort_handle());

        Self { shared }
    }

    /// Side this correlator issues calls from.
    pub fn side(&self) -> Side {
        self.shared.side
    }

    /// Issue `op` with `payload` and wait for the matching response.
    ///
    /// With `timeout`, fails with [`CallError::Timeout`] if no response
    /// arrives in time, counting any wait for room on the link; a response
    /// arriving later is dropped as unmatched. Never retries.
    pub async fn call(
        &self,
        op: Operation,
        payload: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, CallError> {
        let (seq, call_id, rx) = self.register(op, timeout)?;
        let _guard = PendingGuard { shared: &self.shared, seq, call_id };

        tracing::trace!(seq, %op, "sending request");
        let request = Envelope::request(self.shared.side, op, seq, payload);
        let exchange = async {
            self.shared.outgoing.send(request).await.map_err(|_| CallError::Closed)?;
            rx.await.map_err(|_| CallError::Closed)
        };

        let response = match timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| CallError::Timeout { op, timeout: limit })??,
            None => exchange.await?,
        };

        into_result(response)
    }

    /// Typed variant of [`Correlator::call`].
    ///
    /// Serializes `request` as the payload and deserializes the response
    /// payload into `Resp` (a missing payload deserializes from `null`).
    pub async fn call_as<Req, Resp>(
        &self,
        op: Operation,
        request: &Req,
        timeout: Option<Duration>,
    ) -> Result<Resp, CallError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_value(request)?;
        let response = self.call(op, Some(payload), timeout).await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Number of calls awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.shared.table().calls.len()
    }

    /// Whether `seq` is currently outstanding.
    pub fn is_pending(&self, seq: u32) -> bool {
        self.shared.table().calls.contains_key(&seq)
    }

    /// Stop dispatching and fail all outstanding calls with
    /// [`CallError::Closed`]. Idempotent.
    pub fn shutdown(&self) {
        let dispatcher =
            self.shared.dispatcher.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = dispatcher {
            task.abort();
        }
        self.shared.link.stop();
        self.shared.close();
    }

    fn register(
        &self,
        op: Operation,
        timeout: Option<Duration>,
    ) -> Result<(u32, u64, oneshot::Receiver<Envelope>), CallError> {
        let mut table = self.shared.table();
        if table.closed {
            return Err(CallError::Closed);
        }

        let seq = table.allocate().ok_or(CallError::Closed)?;
        let call_id = table.next_call_id;
        table.next_call_id = table.next_call_id.wrapping_add(1);

        let (responder, rx) = oneshot::channel();
        table.calls.insert(seq, PendingCall {
            seq,
            op,
            created_at: Instant::now(),
            timeout,
            call_id,
            responder,
        });

        Ok((seq, call_id, rx))
    }

    #[cfg(test)]
    fn set_next_seq(&self, seq: u32) {
        self.shared.table().next_seq = seq;
    }
}

/// Route envelopes until the link closes, then fail outstanding calls.
async fn dispatch(shared: Arc<Shared>, mut incoming: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = incoming.recv().await {
        shared.route(envelope);
    }
    tracing::debug!("envelope channel closed");
    shared.close();
}

/// Interpret a response: `error` present means failure, otherwise success
/// with `payload` (`null` if absent).
fn into_result(response: Envelope) -> Result<Value, CallError> {
    match response.error {
        Some(message) => Err(CallError::Remote { message, stack: response.stack }),
        None => Ok(response.payload.unwrap_or(Value::Null)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Harness {
        correlator: Correlator,
        requests: mpsc::Receiver<Envelope>,
        responses: mpsc::Sender<Envelope>,
    }

    fn harness() -> Harness {
        harness_with_capacity(64)
    }

    fn harness_with_capacity(capacity: usize) -> Harness {
        let (outgoing, requests) = mpsc::channel(capacity);
        let (responses, incoming) = mpsc::channel(capacity);
        let correlator = Correlator::spawn(Side::Host, Link::from_channels(outgoing, incoming));
        Harness { correlator, requests, responses }
    }

    #[tokio::test]
    async fn responses_resolve_out_of_order() {
        let mut h = harness();
        let c1 = h.correlator.clone();
        let c2 = h.correlator.clone();
        let first = tokio::spawn(async move {
            c1.call(Operation::GetMessageCount, Some(json!("first")), None).await
        });
        let second = tokio::spawn(async move {
            c2.call(Operation::GetMessageCount, Some(json!("second")), None).await
        });

        let a = h.requests.recv().await.unwrap();
        let b = h.requests.recv().await.unwrap();

        // Answer in reverse order, echoing each request's payload.
        for request in [b, a] {
            let echo = request.payload.unwrap_or_default();
            h.responses.send(Envelope::success(Side::Peer, request.seq, echo)).await.unwrap();
        }

        assert_eq!(first.await.unwrap().unwrap(), json!("first"));
        assert_eq!(second.await.unwrap().unwrap(), json!("second"));
        assert_eq!(h.correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn remote_error_carries_message_and_stack() {
        let mut h = harness();
        let c = h.correlator.clone();
        let call = tokio::spawn(async move { c.call(Operation::RequestInvite, None, None).await });

        let request = h.requests.recv().await.unwrap();
        h.responses
            .send(Envelope::failure(Side::Peer, request.seq, "no such identity", Some("at x".into())))
            .await
            .unwrap();

        match call.await.unwrap() {
            Err(CallError::Remote { message, stack }) => {
                assert_eq!(message, "no such identity");
                assert_eq!(stack.as_deref(), Some("at x"));
            },
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn own_echo_does_not_resolve() {
        let mut h = harness();
        let c = h.correlator.clone();
        let call = tokio::spawn(async move { c.call(Operation::IsReady, None, None).await });

        let request = h.requests.recv().await.unwrap();
        h.responses.send(request.clone()).await.unwrap();
        h.responses
            .send(Envelope::success(Side::Host, request.seq, json!(false)))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        assert!(h.correlator.is_pending(request.seq));

        h.responses.send(Envelope::success(Side::Peer, request.seq, json!(true))).await.unwrap();
        assert_eq!(call.await.unwrap().unwrap(), json!(true));
    }

    #[tokio::test]
    async fn unmatched_response_is_dropped() {
        let mut h = harness();
        let c = h.correlator.clone();
        let call = tokio::spawn(async move { c.call(Operation::GetChannels, None, None).await });
        let request = h.requests.recv().await.unwrap();

        h.responses
            .send(Envelope::success(Side::Peer, request.seq.wrapping_add(100), json!("stray")))
            .await
            .unwrap();
        h.responses.send(Envelope::success(Side::Peer, request.seq, json!([]))).await.unwrap();

        assert_eq!(call.await.unwrap().unwrap(), json!([]));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_discards_pending_and_late_reply() {
        let mut h = harness();
        let result =
            h.correlator.call(Operation::GetChannels, None, Some(Duration::from_millis(50))).await;
        assert!(matches!(result, Err(CallError::Timeout { op: Operation::GetChannels, .. })));
        assert_eq!(h.correlator.pending_count(), 0);

        let request = h.requests.recv().await.unwrap();
        h.responses.send(Envelope::success(Side::Peer, request.seq, json!([]))).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(h.correlator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_covers_a_full_link() {
        // Nobody drains `requests`, so the second send never finds room.
        let h = harness_with_capacity(1);
        let c = h.correlator.clone();
        let _first = tokio::spawn(async move { c.call(Operation::WaitForInvite, None, None).await });
        while h.requests.is_empty() {
            tokio::task::yield_now().await;
        }

        let result =
            h.correlator.call(Operation::GetChannels, None, Some(Duration::from_millis(50))).await;
        assert!(matches!(result, Err(CallError::Timeout { op: Operation::GetChannels, .. })));
        assert_eq!(h.correlator.pending_count(), 1);
        assert_eq!(h.requests.len(), 1);
    }

    #[tokio::test]
    async fn dropped_call_is_removed_from_table() {
        let mut h = harness();
        let c = h.correlator.clone();
        let call = tokio::spawn(async move { c.call(Operation::WaitForInvite, None, None).await });
        let request = h.requests.recv().await.unwrap();
        assert!(h.correlator.is_pending(request.seq));

        call.abort();
        let _ = call.await;
        assert_eq!(h.correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn sequence_wraps_and_skips_outstanding() {
        let mut h = harness();
        h.correlator.set_next_seq(u32::MAX);

        let c = h.correlator.clone();
        let _held = tokio::spawn(async move { c.call(Operation::WaitForInvite, None, None).await });
        assert_eq!(h.requests.recv().await.unwrap().seq, u32::MAX);

        let c = h.correlator.clone();
        let _next = tokio::spawn(async move { c.call(Operation::IsReady, None, None).await });
        assert_eq!(h.requests.recv().await.unwrap().seq, 0);

        // Force the counter back onto the outstanding id.
        h.correlator.set_next_seq(u32::MAX);
        let c = h.correlator.clone();
        let _third = tokio::spawn(async move { c.call(Operation::IsReady, None, None).await });
        assert_eq!(h.requests.recv().await.unwrap().seq, 1);
    }

    #[tokio::test]
    async fn shutdown_fails_outstanding_and_new_calls() {
        let mut h = harness();
        let c = h.correlator.clone();
        let call = tokio::spawn(async move { c.call(Operation::WaitForInvite, None, None).await });
        let _ = h.requests.recv().await.unwrap();

        h.correlator.shutdown();

        assert!(matches!(call.await.unwrap(), Err(CallError::Closed)));
        assert!(matches!(
            h.correlator.call(Operation::IsReady, None, None).await,
            Err(CallError::Closed)
        ));
    }

    #[tokio::test]
    async fn closed_link_fails_outstanding_calls() {
        let mut h = harness();
        let c = h.correlator.clone();
        let call = tokio::spawn(async move { c.call(Operation::GetIdentities, None, None).await });
        let _ = h.requests.recv().await.unwrap();

        drop(h.responses);

        assert!(matches!(call.await.unwrap(), Err(CallError::Closed)));
    }

    #[tokio::test]
    async fn typed_call_decodes_response() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Count(u64);

        let mut h = harness();
        let c = h.correlator.clone();
        let call = tokio::spawn(async move {
            c.call_as::<_, Count>(Operation::GetMessageCount, &json!({ "channelId": "c" }), None)
                .await
        });

        let request = h.requests.recv().await.unwrap();
        assert_eq!(request.payload, Some(json!({ "channelId": "c" })));
        h.responses.send(Envelope::success(Side::Peer, request.seq, json!(7))).await.unwrap();

        assert_eq!(call.await.unwrap().unwrap(), Count(7));
    }
}
