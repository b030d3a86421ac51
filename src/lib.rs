//! Sans-IO TLS-style handshake and record protection engine with pluggable
//! symmetric ciphers.
//!
//! The crate never touches a socket. Bytes from the transport go in via
//! `handle_input`, and everything the engine wants to say comes back out of
//! `poll_output` copied into a caller-provided buffer:
//!
//! * [`Output::Packet`] - wire bytes to send to the peer.
//! * [`Output::Connected`] - the handshake completed.
//! * [`Output::ApplicationData`] - decrypted bytes from the peer.
//! * [`Output::NeedInput`] - nothing to do until more input arrives.
//!
//! Cipher implementations are pluggable through
//! [`crypto::CryptoProvider`]: a pure software backend is always compiled
//! in, and the "openssl" feature adds a native backend that is preferred
//! per cipher when the linked library actually provides it.
//!
//! ```no_run
//! use timpl::{Client, Config, Output};
//!
//! let mut client = Client::new(Config::new());
//! let mut buf = [0u8; 32 * 1024];
//!
//! // The first poll produces the ClientHello.
//! match client.poll_output(&mut buf).unwrap() {
//!     Output::Packet(_bytes) => { /* send to transport */ }
//!     _ => {}
//! }
//! ```
//!
//! For callers that just want a connection over a blocking stream there is
//! [`BlockingDriver`].

#![forbid(unsafe_code)]

#[macro_use]
extern crate log;

mod buffer;
mod client;
mod config;
pub mod crypto;
mod driver;
mod engine;
mod error;
pub mod message;
mod record;
mod server;
pub mod session;

use std::fmt;

pub use buffer::Buf;
pub use client::Client;
pub use config::Config;
pub use driver::{BlockingDriver, DriverError, Endpoint};
pub use error::Error;
pub use message::MessageType;
pub use server::Server;

/// Handshake progress, shared by both roles. Not every role visits every
/// state, and the order differs: the client sends its hello first, the
/// server waits for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing has happened yet.
    Start,
    /// Our hello is queued for the transport.
    SendingHello,
    /// Waiting for the peer's hello.
    AwaitingPeerHello,
    /// Both hellos are in; agreeing on a cipher.
    NegotiatingCipher,
    /// Transporting the pre-master secret and deriving keys.
    ExchangingKeys,
    /// Keys installed, waiting for the peer's Finished.
    AwaitingFinished,
    /// Handshake complete, application data flows.
    Established,
    /// A fatal error occurred. Terminal.
    Failed,
}

impl HandshakeState {
    pub fn name(&self) -> &'static str {
        match self {
            HandshakeState::Start => "Start",
            HandshakeState::SendingHello => "SendingHello",
            HandshakeState::AwaitingPeerHello => "AwaitingPeerHello",
            HandshakeState::NegotiatingCipher => "NegotiatingCipher",
            HandshakeState::ExchangingKeys => "ExchangingKeys",
            HandshakeState::AwaitingFinished => "AwaitingFinished",
            HandshakeState::Established => "Established",
            HandshakeState::Failed => "Failed",
        }
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Output from polling an endpoint.
///
/// Packet and application data payloads borrow the buffer passed to
/// `poll_output`. If the buffer is smaller than the queued item, the
/// remainder stays queued for the next poll.
pub enum Output<'a> {
    /// Wire bytes to hand to the transport.
    Packet(&'a [u8]),
    /// The handshake completed. Emitted exactly once.
    Connected,
    /// Decrypted application data from the peer.
    ApplicationData(&'a [u8]),
    /// Nothing to output until more input arrives. Not an error.
    NeedInput,
}

impl fmt::Debug for Output<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Packet(v) => write!(f, "Packet({})", v.len()),
            Output::Connected => write!(f, "Connected"),
            Output::ApplicationData(v) => write!(f, "ApplicationData({})", v.len()),
            Output::NeedInput => write!(f, "NeedInput"),
        }
    }
}
