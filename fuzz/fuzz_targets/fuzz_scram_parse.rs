#![no_main]

use libfuzzer_sys::arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use pg_probe::auth::ScramClient;

#[derive(Debug)]
struct ScramInput {
    username: String,
    password: String,
    server_first: String,
    server_final: String,
}

impl<'a> Arbitrary<'a> for ScramInput {
    fn arbitrary(u: &mut Unstructured<'a>) -> libfuzzer_sys::arbitrary::Result<Self> {
        Ok(Self {
            username: u.arbitrary()?,
            password: u.arbitrary()?,
            server_first: u.arbitrary()?,
            server_final: u.arbitrary()?,
        })
    }
}

fuzz_target!(|input: ScramInput| {
    let mut client = ScramClient::new(&input.username, &input.password);
    let _first = client.client_first();

    // Reject absurd iteration counts before PBKDF2 turns a fuzz run into a hang
    let iterations_ok = input
        .server_first
        .split(',')
        .filter_map(|attr| attr.strip_prefix("i="))
        .last()
        .and_then(|i| i.parse::<u32>().ok())
        .is_some_and(|i| i <= 4096);
    if !iterations_ok {
        return;
    }

    if client.client_final(&input.server_first).is_ok() {
        let _ = client.verify_server_final(&input.server_final);
    }
});
