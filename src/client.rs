//! Client side of the handshake.
//!
//! The client speaks first: it offers its cipher names, supplies the
//! pre-master secret and is the first to switch to the negotiated keys.

use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::buffer::Buf;
use crate::config::Config;
use crate::crypto::keying;
use crate::engine::{Engine, HandshakeBody};
use crate::message::{ClientHello, Finished, KeyExchange, MessageType};
use crate::{Error, HandshakeState, Output};

/// Length of the random pre-master secret the client generates.
const PRE_MASTER_LEN: usize = 48;

pub struct Client {
    engine: Engine,
    state: HandshakeState,
    client_random: [u8; 32],
    server_random: [u8; 32],
    cipher_name: String,
    master: Zeroizing<Vec<u8>>,
    expected_peer_verify: Option<[u8; 32]>,
}

impl Client {
    pub fn new(config: Config) -> Self {
        Client {
            engine: Engine::new(config),
            state: HandshakeState::Start,
            client_random: [0u8; 32],
            server_random: [0u8; 32],
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
        self.guarded(|c| {
            c.engine.push_received(data)?;

            // Alternate record processing and state machine progress until
            // neither moves. A key-change record can only be consumed once
            // progress has staged the pending keys.
            loop {
                let pumped = c.engine.pump()?;
                let prev = c.state;
                c.make_progress()?;
                if !pumped && c.state == prev {
                    break;
                }
            }

            if c.engine.awaiting_key_change() {
                return Err(Error::KeyChangeWithoutPending);
            }
            Ok(())
        })
    }

    /// Poll for the next output. Also drives the state machine, so the very
    /// first poll produces the ClientHello.
    pub fn poll_output<'a>(&mut self, buf: &'a mut [u8]) -> Result<Output<'a>, Error> {
        self.ensure_live()?;
        self.guarded(Self::make_progress)?;
        Ok(self.engine.poll_output(buf))
    }

    /// Write application data. Before the handshake completes the data is
    /// queued and flushed on connection.
    pub fn send_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        self.ensure_live()?;
        self.guarded(|c| c.engine.send_application_data(data))
    }

    /// Tear the connection down, dropping all key material. The client is
    /// unusable afterwards.
    pub fn abort(&mut self) {
        self.fail();
    }

    /// Opaque resumption blob: negotiated cipher name plus master secret.
    /// Only available once established.
    pub fn session_blob(&self) -> Option<Zeroizing<Vec<u8>>> {
        session_blob(self.state, &self.cipher_name, &self.master)
    }

    fn ensure_live(&self) -> Result<(), Error> {
        if self.state == HandshakeState::Failed {
            return Err(Error::ConnectionFailed);
        }
        Ok(())
    }

    /// Run `f`, failing the connection permanently on any error.
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
            trace!("Client state {:?} -> {:?}", prev, next);
            self.state = next;
        }
        Ok(())
    }

    fn progress_one(&mut self) -> Result<HandshakeState, Error> {
        match self.state {
            HandshakeState::Start => {
                self.client_random = self.engine.random_32()?;

                let hello = ClientHello {
                    random: self.client_random,
                    cipher_names: self.engine.config().offered_ciphers.clone(),
                };
                let mut body = Buf::new();
                hello.serialize(&mut body);
                self.engine.send_handshake(MessageType::ClientHello, &body)?;

                Ok(HandshakeState::SendingHello)
            }

            HandshakeState::SendingHello => Ok(HandshakeState::AwaitingPeerHello),

            HandshakeState::AwaitingPeerHello => {
                let Some(msg) = self.engine.next_handshake(MessageType::ServerHello)? else {
                    return Ok(self.state);
                };
                let HandshakeBody::ServerHello(hello) = msg else {
                    unreachable!("engine returns the requested message type");
                };

                self.server_random = hello.random;
                self.cipher_name = hello.cipher_name;

                Ok(HandshakeState::NegotiatingCipher)
            }

            HandshakeState::NegotiatingCipher => {
                // The server must pick from what we offered, and we must be
                // able to instantiate it.
                let offered = &self.engine.config().offered_ciphers;
                if !offered.contains(&self.cipher_name) {
                    return Err(Error::UnsupportedCipher(self.cipher_name.clone()));
                }
                if self.engine.provider().select_cipher(&self.cipher_name).is_none() {
                    return Err(Error::UnsupportedCipher(self.cipher_name.clone()));
                }
                debug!("Negotiated cipher {}", self.cipher_name);

                Ok(HandshakeState::ExchangingKeys)
            }

            HandshakeState::ExchangingKeys => {
                let provider = self.engine.provider();
                let hmac = provider.hmac_provider;

                let mut pre_master = Zeroizing::new(vec![0u8; PRE_MASTER_LEN]);
                provider.secure_random.fill(&mut pre_master).map_err(Error::Crypto)?;

                let ke = KeyExchange {
                    pre_master: pre_master.to_vec(),
                };
                let mut body = Buf::new();
                ke.serialize(&mut body);
                self.engine.send_handshake(MessageType::KeyExchange, &body)?;

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
                let (read, write) = keying::build_key_sets(&provider, &self.cipher_name, &block, true)?;
                self.engine.install_pending(read, write);

                // Key change first, then our Finished under the new keys.
                self.engine.send_key_change()?;

                let own_verify = keying::verify_data(
                    hmac,
                    &self.master,
                    b"client finished",
                    &self.engine.transcript_hash(),
                )?;
                let finished = Finished {
                    verify_data: own_verify,
                };
                let mut body = Buf::new();
                finished.serialize(&mut body);
                self.engine.send_handshake(MessageType::Finished, &body)?;

                // The peer's verify covers our Finished too, so compute it
                // now that the transcript contains it.
                self.expected_peer_verify = Some(keying::verify_data(
                    hmac,
                    &self.master,
                    b"server finished",
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

                self.engine.set_connected()?;
                debug!("Client connected with cipher {}", self.cipher_name);

                Ok(HandshakeState::Established)
            }

            HandshakeState::Established => Ok(HandshakeState::Established),

            HandshakeState::Failed => Err(Error::ConnectionFailed),
        }
    }
}

/// Shared blob layout for client and server: name_len(1) + name + master(48).
pub(crate) fn session_blob(
    state: HandshakeState,
    cipher_name: &str,
    master: &[u8],
) -> Option<Zeroizing<Vec<u8>>> {
    if state != HandshakeState::Established {
        return None;
    }

    let mut blob = Zeroizing::new(Vec::with_capacity(1 + cipher_name.len() + master.len()));
    blob.push(cipher_name.len() as u8);
    blob.extend_from_slice(cipher_name.as_bytes());
    blob.extend_from_slice(master);
    Some(blob)
}
