//! Server side of the handshake.
//!
//! The server waits for the ClientHello, picks the cipher, receives the
//! pre-master secret and only switches keys after verifying the client's
//! Finished.

use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::buffer::Buf;
use crate::client::session_blob;
use crate::config::Config;
use crate::crypto::keying;
use crate::engine::{Engine, HandshakeBody};
use crate::message::{Finished, MessageType, ServerHello};
use crate::{Error, HandshakeState, Output};

pub struct Server {
    engine: Engine,
    state: HandshakeState,
    client_random: [u8; 32],
    server_random: [u8; 32],
    offered: Vec<String>,
    cipher_name: String,
    master: Zeroizing<Vec<u8>>,
    expected_peer_verify: Option<[u8; 32]>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Server {
            engine: Engine::new(config),
            state: HandshakeState::Start,
            client_random: [0u8; 32],
            server_random: [0u8; 32],
            offered: Vec::new(),
            cipher_name: String::new(),
            master: Zeroizing::new(Vec::new()),
            expected_peer_verify: None,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Feed bytes received from the transport.
    pub fn handle_input(&mut self, data: &[u8]) -> Result<(), Error> {
        self.ensure_live()?;
        self.guarded(|s| {
            s.engine.push_received(data)?;

            // Alternate record processing and state machine progress until
            // neither moves. A key-change record can only be consumed once
            // progress has staged the pending keys.
            loop {
                let pumped = s.engine.pump()?;
                let prev = s.state;
                s.make_progress()?;
                if !pumped && s.state == prev {
                    break;
                }
            }

            if s.engine.awaiting_key_change() {
                return Err(Error::KeyChangeWithoutPending);
            }
            Ok(())
        })
    }

    /// Poll for the next output.
    pub fn poll_output<'a>(&mut self, buf: &'a mut [u8]) -> Result<Output<'a>, Error> {
        self.ensure_live()?;
        self.guarded(Self::make_progress)?;
        Ok(self.engine.poll_output(buf))
    }

    /// Write application data. Queued until established.
    pub fn send_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        self.ensure_live()?;
        self.guarded(|s| s.engine.send_application_data(data))
    }

    /// Tear the connection down, dropping all key material.
    pub fn abort(&mut self) {
        self.fail();
    }

    /// Opaque resumption blob, available once established.
    pub fn session_blob(&self) -> Option<Zeroizing<Vec<u8>>> {
        session_blob(self.state, &self.cipher_name, &self.master)
    }

    fn ensure_live(&self) -> Result<(), Error> {
        if self.state == HandshakeState::Failed {
            return Err(Error::ConnectionFailed);
        }
        Ok(())
    }

    fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, Error>) -> Result<T, Error> {
        match f(self) {
            Ok(v) => Ok(v),
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    fn fail(&mut self) {
        self.state = HandshakeState::Failed;
        self.master = Zeroizing::new(Vec::new());
        self.expected_peer_verify = None;
        self.engine.disconnect();
    }

    fn make_progress(&mut self) -> Result<(), Error> {
        loop {
            let prev = self.state;
            let next = self.progress_one()?;
            if next == prev {
                break;
            }
            trace!("Server state {:?} -> {:?}", prev, next);
            self.state = next;
        }
        Ok(())
    }

    fn progress_one(&mut self) -> Result<HandshakeState, Error> {
        match self.state {
            HandshakeState::Start => Ok(HandshakeState::AwaitingPeerHello),

            HandshakeState::AwaitingPeerHello => {
                let Some(msg) = self.engine.next_handshake(MessageType::ClientHello)? else {
                    return Ok(self.state);
                };
                let HandshakeBody::ClientHello(hello) = msg else {
                    unreachable!("engine returns the requested message type");
                };

                self.client_random = hello.random;
                self.offered = hello.cipher_names;

                Ok(HandshakeState::NegotiatingCipher)
            }

            HandshakeState::NegotiatingCipher => {
                // First client preference that we also accept and can
                // instantiate. Unavailable backends fall through silently.
                let provider = self.engine.provider();
                let acceptable = &self.engine.config().offered_ciphers;
                let chosen = self
                    .offered
                    .iter()
                    .find(|name| {
                        acceptable.iter().any(|a| a == *name)
                            && provider.select_cipher(name.as_str()).is_some()
                    })
                    .cloned();

                let Some(name) = chosen else {
                    return Err(Error::UnsupportedCipher(self.offered.join(",")));
                };
                debug!("Negotiated cipher {}", name);
                self.cipher_name = name;
                self.server_random = self.engine.random_32()?;

                let hello = ServerHello {
                    random: self.server_random,
                    cipher_name: self.cipher_name.clone(),
                };
                let mut body = Buf::new();
                hello.serialize(&mut body);
                self.engine.send_handshake(MessageType::ServerHello, &body)?;

                Ok(HandshakeState::SendingHello)
            }

            HandshakeState::SendingHello => Ok(HandshakeState::ExchangingKeys),

            HandshakeState::ExchangingKeys => {
                let Some(msg) = self.engine.next_handshake(MessageType::KeyExchange)? else {
                    return Ok(self.state);
                };
                let HandshakeBody::KeyExchange(ke) = msg else {
                    unreachable!("engine returns the requested message type");
                };

                let provider = self.engine.provider();
                let hmac = provider.hmac_provider;
                let pre_master = Zeroizing::new(ke.pre_master);

                self.master = keying::derive_master(
                    hmac,
                    &pre_master,
                    &self.client_random,
                    &self.server_random,
                )?;
                let block = keying::derive_key_block(
                    hmac,
                    &self.master,
                    &self.client_random,
                    &self.server_random,
                    provider
                        .select_cipher(&self.cipher_name)
                        .ok_or_else(|| Error::UnsupportedCipher(self.cipher_name.clone()))?
                        .spec(),
                )?;
                let (read, write) =
                    keying::build_key_sets(&provider, &self.cipher_name, &block, false)?;
                self.engine.install_pending(read, write);

                // The client's verify covers the transcript up to here, so
                // snapshot it before its Finished lands in the transcript.
                self.expected_peer_verify = Some(keying::verify_data(
                    hmac,
                    &self.master,
                    b"client finished",
                    &self.engine.transcript_hash(),
                )?);

                Ok(HandshakeState::AwaitingFinished)
            }

            HandshakeState::AwaitingFinished => {
                let Some(msg) = self.engine.next_handshake(MessageType::Finished)? else {
                    return Ok(self.state);
                };
                let HandshakeBody::Finished(finished) = msg else {
                    unreachable!("engine returns the requested message type");
                };

                if !self.engine.read_protected() {
                    return Err(Error::RecordIntegrity("finished before key change"));
                }

                let expected = self
                    .expected_peer_verify
                    .ok_or(Error::RecordIntegrity("no expected verify data"))?;
                let ok: bool = finished.verify_data.ct_eq(&expected).into();
                if !ok {
                    return Err(Error::RecordIntegrity("finished verify data mismatch"));
                }

                // Our turn: key change, then Finished over a transcript that
                // includes the client's Finished.
                self.engine.send_key_change()?;

                let own_verify = keying::verify_data(
                    self.engine.provider().hmac_provider,
                    &self.master,
                    b"server finished",
                    &self.engine.transcript_hash(),
                )?;
                let reply = Finished {
                    verify_data: own_verify,
                };
                let mut body = Buf::new();
                reply.serialize(&mut body);
                self.engine.send_handshake(MessageType::Finished, &body)?;

                self.engine.set_connected()?;
                debug!("Server connected with cipher {}", self.cipher_name);

                Ok(HandshakeState::Established)
            }

            HandshakeState::Established => Ok(HandshakeState::Established),

            HandshakeState::Failed => Err(Error::ConnectionFailed),
        }
    }
}
