//! Fuzz target: `LineDecoder::feed`
//!
//! Splits the input at a fuzzer-chosen point and feeds both halves, so
//! lines straddling reads are covered.  The decoder must never panic and
//! never yield a frame over the limit.
//!
//! cargo fuzz run fuzz_line_decoder

#![no_main]

use doorlink::rpc::codec::{Frame, LineDecoder, MAX_FRAME_SIZE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let at = usize::from(split).min(rest.len());
    let (a, b) = rest.split_at(at);

    let mut decoder = LineDecoder::new();
    let mut frames: Vec<Frame> = Vec::new();
    if decoder.feed(a, &mut frames).is_ok() {
        let _ = decoder.feed(b, &mut frames);
    }
    for frame in &frames {
        assert!(frame.len() <= MAX_FRAME_SIZE);
        assert!(!frame.contains(&b'\n'));
    }

    decoder.reset();
    assert_eq!(decoder.pending(), 0);
});
