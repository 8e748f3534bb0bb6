//! Decode arbitrary bytes as every payload type.

#![no_main]

use lamport_proto::{MessageType, Payload};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&raw_type, body)) = data.split_first() else {
        return;
    };
    let Ok(kind) = MessageType::from_u8(raw_type) else {
        return;
    };
    if let Ok(payload) = Payload::decode(kind, body) {
        assert_eq!(payload.message_type(), kind);
    }
});
