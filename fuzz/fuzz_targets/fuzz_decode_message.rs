#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use pg_probe::protocol::decode::decode_message;

fuzz_target!(|data: &[u8]| {
    // First byte picks where the input is split, so frames straddling two
    // reads are exercised as well as back-to-back frames.
    let Some((&split, data)) = data.split_first() else {
        return;
    };
    let split = (split as usize).min(data.len());

    let mut buf = BytesMut::from(&data[..split]);
    let mut pending = &data[split..];

    loop {
        match decode_message(&mut buf) {
            Ok(Some(_)) => continue,
            Ok(None) if pending.is_empty() => break,
            Ok(None) => {
                buf.extend_from_slice(pending);
                pending = &[];
            }
            Err(_) => break,
        }
    }
});
