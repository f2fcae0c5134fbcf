//! Property-based tests for request/response correlation.
//!
//! A scripted peer answers a batch of concurrent calls in an arbitrary order,
//! interleaved with stray and echoed envelopes. Every call must resolve with
//! the payload of its own response and nothing else.

use std::time::Duration;

use parley_client::{CallError, Correlator, Envelope, Link, Operation, Side};
use proptest::prelude::*;
use serde_json::{Value, json};
use tokio::sync::mpsc;

/// Responses the scripted peer sends, in order.
#[derive(Debug, Clone)]
enum Reply {
    /// Answer the nth request (by send order) successfully.
    Success(usize),
    /// Answer the nth request with a failure.
    Failure(usize),
    /// Envelope for a sequence id nobody is waiting on.
    Stray(u32),
    /// Echo of the nth request, as a shared bus would deliver it.
    Echo(usize),
}

/// Permutation of `0..n` with each index marked success or failure, plus
/// noise envelopes inserted at arbitrary positions.
fn script(n: usize) -> impl Strategy<Value = Vec<Reply>> {
    let order = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
    let answers = (order, prop::collection::vec(any::<bool>(), n)).prop_map(|(order, fails)| {
        order
            .into_iter()
            .map(|i| if fails[i] { Reply::Failure(i) } else { Reply::Success(i) })
            .collect::<Vec<_>>()
    });
    let noise = prop::collection::vec(
        prop_oneof![(1_000u32..2_000).prop_map(Reply::Stray), (0..n).prop_map(Reply::Echo)],
        0..8,
    );
    (answers, noise, prop::collection::vec(any::<prop::sample::Index>(), 8)).prop_map(
        |(mut replies, noise, positions)| {
            for (reply, at) in noise.into_iter().zip(positions) {
                let at = at.index(replies.len() + 1);
                replies.insert(at, reply);
            }
            replies
        },
    )
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_each_call_gets_its_own_response(
        (n, replies) in (1usize..12).prop_flat_map(|n| (Just(n), script(n)))
    ) {
        runtime().block_on(async move {
            let (outgoing, mut requests) = mpsc::channel(64);
            let (responses, incoming) = mpsc::channel(64);
            let correlator = Correlator::spawn(Side::Host, Link::from_channels(outgoing, incoming));

            let calls: Vec<_> = (0..n)
                .map(|i| {
                    let c = correlator.clone();
                    tokio::spawn(async move {
                        c.call(Operation::GetMessageCount, Some(json!(i)), None).await
                    })
                })
                .collect();

            // Requests may be sent in any order; index them by their payload.
            let mut sent = vec![None; n];
            for _ in 0..n {
                let request = requests.recv().await.unwrap();
                let i = request.payload.as_ref().and_then(Value::as_u64).unwrap() as usize;
                sent[i] = Some(request);
            }
            let sent: Vec<Envelope> = sent.into_iter().map(Option::unwrap).collect();

            for reply in &replies {
                let envelope = match *reply {
                    Reply::Success(i) => {
                        Envelope::success(Side::Peer, sent[i].seq, json!({ "for": i }))
                    },
                    Reply::Failure(i) => {
                        Envelope::failure(Side::Peer, sent[i].seq, format!("failed {i}"), None)
                    },
                    Reply::Stray(seq) => Envelope::success(Side::Peer, seq, json!("stray")),
                    Reply::Echo(i) => sent[i].clone(),
                };
                responses.send(envelope).await.unwrap();
            }

            for (i, call) in calls.into_iter().enumerate() {
                let result = call.await.unwrap();
                let failed = replies.iter().any(|r| matches!(r, Reply::Failure(j) if *j == i));
                match result {
                    Ok(payload) => {
                        assert!(!failed);
                        assert_eq!(payload, json!({ "for": i }));
                    },
                    Err(CallError::Remote { message, .. }) => {
                        assert!(failed);
                        assert_eq!(message, format!("failed {i}"));
                    },
                    Err(other) => panic!("call {i} failed unexpectedly: {other}"),
                }
            }
            assert_eq!(correlator.pending_count(), 0);
        });
    }

    #[test]
    fn prop_timed_out_calls_leave_no_residue(timeouts in prop::collection::vec(1u64..500, 1..8)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();
        rt.block_on(async move {
            let (outgoing, mut requests) = mpsc::channel(64);
            let (responses, incoming) = mpsc::channel(64);
            let correlator = Correlator::spawn(Side::Host, Link::from_channels(outgoing, incoming));

            let calls: Vec<_> = timeouts
                .iter()
                .map(|&ms| {
                    let c = correlator.clone();
                    tokio::spawn(async move {
                        c.call(Operation::GetChannels, None, Some(Duration::from_millis(ms))).await
                    })
                })
                .collect();

            for call in calls {
                assert!(call.await.unwrap().unwrap_err().is_timeout());
            }
            assert_eq!(correlator.pending_count(), 0);

            // Late answers are dropped as unmatched.
            while let Ok(request) = requests.try_recv() {
                responses.send(Envelope::success(Side::Peer, request.seq, json!([]))).await.unwrap();
            }
            tokio::task::yield_now().await;
            assert_eq!(correlator.pending_count(), 0);
        });
    }
}
