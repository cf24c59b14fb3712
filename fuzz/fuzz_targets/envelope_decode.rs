//! Arbitrary bytes must never panic the envelope decoder, and anything it
//! accepts must survive a re-encode.

#![no_main]

use libfuzzer_sys::fuzz_target;
use securefield_proto::{FieldMessage, HostRequest};

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = FieldMessage::decode(data) {
        if let Ok(encoded) = message.encode() {
            assert_eq!(FieldMessage::decode(&encoded).ok(), Some(message));
        }
    }

    if let Ok(request) = HostRequest::decode(data) {
        if let Ok(encoded) = request.encode() {
            assert_eq!(HostRequest::decode(&encoded).ok(), Some(request));
        }
    }
});
