#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use topology_discovery::MessageCodec;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must decode or fail, never panic or loop
    let mut codec = MessageCodec::default();
    let mut buf = BytesMut::from(data);
    let before = buf.len();
    if let Ok(msgs) = codec.decode_all(&mut buf) {
        assert!(buf.len() <= before);
        assert!(msgs.is_empty() || buf.len() < before);
    }
});
