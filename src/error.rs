use thiserror::Error;

use crate::message::MessageType;

/// Errors produced by the TLS engine.
///
/// Suspension (`Output::NeedInput`) is not an error; every variant here is a
/// real failure. `RecordIntegrity` and `ProtocolSequence` are always fatal to
/// the connection and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Bad key/IV/mode sizes at cipher construction. Local caller error,
    /// detected before any bytes touch the wire.
    #[error("invalid cipher parameters: {0}")]
    InvalidParameters(&'static str),

    /// A buffer whose length is not a multiple of the cipher block size was
    /// passed to a block cipher transform.
    #[error("buffer length {0} is not a multiple of block size {1}")]
    Alignment(usize, usize),

    /// A capability stub was invoked without a concrete backend.
    #[error("cipher operation not implemented: {0}")]
    NotImplemented(&'static str),

    /// MAC, padding or sequence failure on a record. Fatal: may indicate
    /// tampering, so the connection is torn down without retry.
    #[error("record integrity failure: {0}")]
    RecordIntegrity(&'static str),

    /// An out-of-order or unexpected handshake message arrived. Fatal.
    #[error("expected handshake message {expected} but got {got}")]
    ProtocolSequence {
        expected: MessageType,
        got: MessageType,
    },

    /// A key-change event arrived for a direction with no pending cipher.
    #[error("key change without a pending cipher for that direction")]
    KeyChangeWithoutPending,

    /// The connection previously failed and is permanently unusable.
    #[error("connection is in failed state")]
    ConnectionFailed,

    /// The peer selected (or we were configured with) a cipher name no
    /// compiled backend can provide.
    #[error("no available implementation for cipher {0}")]
    UnsupportedCipher(String),

    /// Incoming byte buffer hit the configured cap.
    #[error("receive buffer full")]
    ReceiveQueueFull,

    /// Outgoing record queue hit the configured cap.
    #[error("transmit queue full")]
    TransmitQueueFull,

    /// Malformed wire data.
    #[error("parse error: {0}")]
    Parse(&'static str),

    /// A record with an unexpected content type arrived.
    #[error("unexpected content type {0}")]
    UnexpectedContentType(u8),

    /// Record protocol version mismatch.
    #[error("unsupported protocol version {0}.{1}")]
    UnsupportedVersion(u8, u8),

    /// Per-direction sequence counters must never wrap.
    #[error("record sequence number overflow")]
    SequenceOverflow,

    /// Backend crypto failure outside the typed categories.
    #[error("crypto error: {0}")]
    Crypto(String),
}
