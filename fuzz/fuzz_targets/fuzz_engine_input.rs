#![no_main]

//! Fuzz target for the full input path, both roles.
//!
//! Feeds arbitrary byte sequences to a client and a server endpoint to find
//! panics in framing, reassembly or handshake parsing. Errors are expected
//! and ignored; panics are the bug.

use libfuzzer_sys::fuzz_target;

use timpl::{Client, Config, Server};

fuzz_target!(|data: &[u8]| {
    {
        let mut server = Server::new(Config::new());
        let _ = server.handle_input(data);

        let mut buf = [0u8; 4096];
        let _ = server.poll_output(&mut buf);
    }

    {
        let mut client = Client::new(Config::new());

        // Drive the client into its waiting state so the input lands after
        // the ClientHello went out.
        let mut buf = [0u8; 4096];
        let _ = client.poll_output(&mut buf);
        let _ = client.handle_input(data);
        let _ = client.poll_output(&mut buf);
    }
});
