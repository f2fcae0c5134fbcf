//! Fuzz target for frame boundaries
//!
//! Well-formed envelopes are encoded and then damaged at arbitrary points.
//!
//! # Invariants
//!
//! - A complete frame decodes to the envelope that was encoded
//! - Any strict prefix of a frame is rejected
//! - A prefix claiming more than the maximum frame size is rejected before
//!   the body is read
//! - NEVER panic

#![no_main]

use arbitrary::Arbitrary;
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use parley_proto::{Envelope, MAX_FRAME_SIZE, Operation, Side};
use serde_json::Value;

#[derive(Debug, Arbitrary)]
enum Shape {
    Request { op: u8, text: Option<String> },
    Success { text: String },
    Failure { error: String, stack: Option<String> },
}

#[derive(Debug, Arbitrary)]
struct Input {
    from_host: bool,
    seq: u32,
    shape: Shape,
    cut: u16,
    claimed_len: u32,
}

fuzz_target!(|input: Input| {
    let sender = if input.from_host { Side::Host } else { Side::Peer };
    let envelope = match input.shape {
        Shape::Request { op, text } => {
            let op = Operation::ALL[op as usize % Operation::ALL.len()];
            Envelope::request(sender, op, input.seq, text.map(Value::String))
        }
        Shape::Success { text } => Envelope::success(sender, input.seq, Value::String(text)),
        Shape::Failure { error, stack } => Envelope::failure(sender, input.seq, error, stack),
    };

    let mut frame = BytesMut::new();
    if envelope.encode(&mut frame).is_err() {
        return;
    }

    assert_eq!(Envelope::decode(&frame).ok(), Some(envelope));

    let cut = input.cut as usize % frame.len();
    assert!(Envelope::decode(&frame[..cut]).is_err());

    let mut lying = frame.to_vec();
    lying[..4].copy_from_slice(&input.claimed_len.to_be_bytes());
    if input.claimed_len as usize > MAX_FRAME_SIZE {
        assert!(Envelope::decode(&lying).is_err());
    } else {
        let _ = Envelope::decode(&lying);
    }
});
