//! Fuzz target for Frame::decode
//!
//! Arbitrary bytes are decoded as a frame. Truncated headers, bad magic,
//! oversized length fields and short payloads must all come back as errors.
//!
//! The fuzzer should NEVER panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use switchboard_proto::{Frame, FrameHeader};

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = Frame::decode(data) else {
        return;
    };

    // A frame that decodes re-encodes to the bytes it came from.
    let encoded = frame.to_bytes().expect("decoded frame re-encodes");
    assert_eq!(&encoded[..], &data[..FrameHeader::SIZE + frame.payload.len()]);
});
