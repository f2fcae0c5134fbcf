//! Fuzz target for Envelope::decode and JSON envelope parsing
//!
//! Arbitrary bytes are fed to both wire forms an envelope can arrive in:
//! a length-prefixed CBOR frame and a JSON document from a message bus.
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use parley_proto::Envelope;

fuzz_target!(|data: &[u8]| {
    let _ = Envelope::decode(data);

    if let Ok(envelope) = serde_json::from_slice::<Envelope>(data) {
        // Anything that parses must classify without panicking.
        let _ = envelope.operation();
        let _ = envelope.is_failure();
    }
});
