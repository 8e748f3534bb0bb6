//! Decode arbitrary bytes as a frame.
//!
//! Decoding must never panic, and whatever decodes must re-encode to the
//! bytes it consumed.

#![no_main]

use lamport_proto::Message;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok((message, consumed)) = Message::decode(data) {
        assert_eq!(message.encoded_len(), consumed);
        assert_eq!(&message.to_bytes()[..], &data[..consumed]);
        let _ = message.payload();
    }
});
