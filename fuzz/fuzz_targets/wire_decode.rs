#![no_main]
use libfuzzer_sys::fuzz_target;
use stratus_net::{ClientMsg, ServerMsg};

fuzz_target!(|data: &[u8]| {
    if data.len() >= ClientMsg::SIZE {
        let mut buf = [0u8; ClientMsg::SIZE];
        buf.copy_from_slice(&data[..ClientMsg::SIZE]);
        if let Ok(msg) = ClientMsg::decode(&buf) {
            let encoded = msg.encode();
            assert_eq!(ClientMsg::decode(&encoded).ok(), Some(msg));
        }
    }
    if data.len() >= ServerMsg::SIZE {
        let mut buf = [0u8; ServerMsg::SIZE];
        buf.copy_from_slice(&data[..ServerMsg::SIZE]);
        if let Ok(msg) = ServerMsg::decode(&buf) {
            let encoded = msg.encode();
            assert_eq!(ServerMsg::decode(&encoded).ok(), Some(msg));
        }
    }
});
