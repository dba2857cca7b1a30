//! Fuzz target for Payload::from_frame
//!
//! Arbitrary bytes are placed behind every opcode's header and decoded. This
//! covers malformed CBOR, type confusion between opcodes, descriptors that are
//! not maps and presence entries with missing or duplicate `connectionId`.
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use switchboard_proto::{Frame, FrameHeader, Opcode, Payload};

fuzz_target!(|data: &[u8]| {
    for opcode in Opcode::ALL {
        let frame = Frame::new(FrameHeader::new(opcode), Bytes::copy_from_slice(data));

        if let Ok(payload) = Payload::from_frame(&frame) {
            assert_eq!(payload.opcode(), opcode);
        }
    }
});
