//! Fuzz target: envelope decoding and signature verification
//!
//! Arbitrary bytes through the same path an inbound frame takes.  A frame
//! that decodes must never verify against a secret it was not signed
//! with, and must re-serialize without error.
//!
//! cargo fuzz run fuzz_envelope_decoder

#![no_main]

use doorlink::rpc::auth::{canonical_bytes, verify};
use doorlink::rpc::messages::decode_envelope;
use libfuzzer_sys::fuzz_target;

const SECRET: &[u8] = b"fuzz-secret";

fuzz_target!(|data: &[u8]| {
    if let Ok(envelope) = decode_envelope(data) {
        assert!(envelope.payload.timestamp() != 0);
        assert!(canonical_bytes(&envelope.payload).is_ok());
        assert!(!verify(&envelope.payload, &envelope.signature, SECRET));
    }
});
