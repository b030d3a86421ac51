#![allow(dead_code)]

use std::sync::Once;

use timpl::{Client, Config, Error, Output, Server};

static INIT: Once = Once::new();

pub fn init_log() {
    INIT.call_once(|| {
        env_logger::Builder::from_default_env()
            .is_test(true)
            .init();
    });
}

/// A client and server wired back to back in memory.
pub struct Pair {
    pub client: Client,
    pub server: Server,
    pub client_rx: Vec<u8>,
    pub server_rx: Vec<u8>,
}

impl Pair {
    pub fn new() -> Self {
        Self::with_configs(Config::new(), Config::new())
    }

    pub fn with_configs(client: Config, server: Config) -> Self {
        init_log();
        Pair {
            client: Client::new(client),
            server: Server::new(server),
            client_rx: Vec::new(),
            server_rx: Vec::new(),
        }
    }

    /// Move packets between the peers until neither has anything to say.
    pub fn shuttle(&mut self) -> Result<(), Error> {
        self.shuttle_inner(usize::MAX)
    }

    /// Like `shuttle`, but delivers transport bytes in `chunk`-sized pieces.
    pub fn shuttle_chunked(&mut self, chunk: usize) -> Result<(), Error> {
        self.shuttle_inner(chunk)
    }

    fn shuttle_inner(&mut self, chunk: usize) -> Result<(), Error> {
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            let mut progressed = false;

            loop {
                match self.client.poll_output(&mut buf)? {
                    Output::Packet(packet) => {
                        for piece in packet.chunks(chunk.max(1)) {
                            self.server.handle_input(piece)?;
                        }
                        progressed = true;
                    }
                    Output::ApplicationData(data) => {
                        self.client_rx.extend_from_slice(data);
                        progressed = true;
                    }
                    Output::Connected => progressed = true,
                    Output::NeedInput => break,
                }
            }

            loop {
                match self.server.poll_output(&mut buf)? {
                    Output::Packet(packet) => {
                        for piece in packet.chunks(chunk.max(1)) {
                            self.client.handle_input(piece)?;
                        }
                        progressed = true;
                    }
                    Output::ApplicationData(data) => {
                        self.server_rx.extend_from_slice(data);
                        progressed = true;
                    }
                    Output::Connected => progressed = true,
                    Output::NeedInput => break,
                }
            }

            if !progressed {
                return Ok(());
            }
        }
    }
}
