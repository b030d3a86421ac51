//! Cipher capability model and provider traits for pluggable crypto backends.
//!
//! The provider system uses a component-based approach: [`CryptoProvider`]
//! holds static references to trait objects, each representing one
//! cryptographic capability. Concrete backends (pure software, native
//! accelerated) register [`SupportedCipher`] factories; the record layer and
//! handshake state machine only ever see [`Cipher`] trait objects.
//!
//! This is a capability interface, not a class hierarchy: any type exposing
//! `{encrypt, decrypt}` plus a [`CipherSpec`] qualifies, so independent
//! backends are interchangeable at runtime based on availability and the
//! negotiated cipher name.

use std::fmt;
use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

use thiserror::Error;

use crate::buffer::Buf;
use crate::Error;

/// Marker trait for types that are safe to use in crypto provider components.
///
/// Combines the common bounds required for provider trait objects. It is
/// automatically implemented for all types that satisfy the bounds.
pub trait CryptoSafe: Send + Sync + Debug + UnwindSafe + RefUnwindSafe {}

impl<T: Send + Sync + Debug + UnwindSafe + RefUnwindSafe> CryptoSafe for T {}

/// Errors from cipher construction and transforms.
///
/// This is the provider-level subset of the crate error; call sites convert
/// with `?` via the `From` impl below.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// Key/IV length outside the spec's fixed bounds, or unsupported mode.
    #[error("invalid parameters: {0}")]
    InvalidParameters(&'static str),

    /// Buffer length not a multiple of the block size of a block cipher.
    #[error("input length {0} is not a multiple of block size {1}")]
    Alignment(usize, usize),

    /// The base contract stub was invoked; no concrete backend is present.
    #[error("not implemented")]
    NotImplemented,

    /// Backend-specific failure.
    #[error("{0}")]
    Failed(String),
}

impl From<CipherError> for Error {
    fn from(e: CipherError) -> Self {
        match e {
            CipherError::InvalidParameters(msg) => Error::InvalidParameters(msg),
            CipherError::Alignment(len, block) => Error::Alignment(len, block),
            CipherError::NotImplemented => Error::NotImplemented("cipher stub"),
            CipherError::Failed(msg) => Error::Crypto(msg),
        }
    }
}

/// Chaining mode requested at cipher construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    /// Stream cipher, no chaining, no IV.
    Stream,
    /// Cipher block chaining. IV length equals the block length.
    Cbc,
}

/// Static description of a named symmetric cipher's size and mode
/// constraints. Fixed per name; validated at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSpec {
    pub name: &'static str,
    pub key_len: usize,
    pub iv_len: usize,
    pub is_block: bool,
    /// 0 for stream ciphers.
    pub block_len: usize,
}

impl CipherSpec {
    /// Validate (key, mode, iv) against this spec.
    pub fn check(&self, key: &[u8], mode: CipherMode, iv: &[u8]) -> Result<(), CipherError> {
        if key.len() != self.key_len {
            return Err(CipherError::InvalidParameters("key length"));
        }
        if iv.len() != self.iv_len {
            return Err(CipherError::InvalidParameters("iv length"));
        }
        let expected_mode = if self.is_block {
            CipherMode::Cbc
        } else {
            CipherMode::Stream
        };
        if mode != expected_mode {
            return Err(CipherError::InvalidParameters("unsupported mode"));
        }
        Ok(())
    }

    /// Check a transform buffer against the block alignment constraint.
    pub fn check_alignment(&self, len: usize) -> Result<(), CipherError> {
        if self.is_block && len % self.block_len != 0 {
            return Err(CipherError::Alignment(len, self.block_len));
        }
        Ok(())
    }
}

/// Backend that produced a cipher instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Implementation {
    /// Pure-software RustCrypto backend. Always available.
    RustCrypto,
    /// Native OpenSSL backend (feature "openssl").
    OpenSsl,
    /// The contract stub backend.
    Null,
}

impl fmt::Display for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Implementation::RustCrypto => write!(f, "rust-crypto"),
            Implementation::OpenSsl => write!(f, "openssl"),
            Implementation::Null => write!(f, "null"),
        }
    }
}

/// A symmetric cipher instance owning its key and running chaining state.
///
/// Both transforms work in place: callers hand over the buffer contents and
/// must not assume the input is preserved. Chaining state (CBC IV, stream
/// keystream position) advances on every call, so one instance serves
/// exactly one direction of one connection.
pub trait Cipher: CryptoSafe {
    /// The spec this instance was constructed against.
    fn spec(&self) -> &CipherSpec;

    /// Which backend produced this instance.
    fn implementation(&self) -> Implementation;

    /// Encrypt `data` in place.
    fn encrypt(&mut self, data: &mut Buf) -> Result<(), CipherError>;

    /// Decrypt `data` in place.
    fn decrypt(&mut self, data: &mut Buf) -> Result<(), CipherError>;
}

/// Factory for cipher instances of one named cipher on one backend.
pub trait SupportedCipher: CryptoSafe {
    /// Size/mode constraints for this cipher name.
    fn spec(&self) -> &'static CipherSpec;

    /// Backend tag.
    fn implementation(&self) -> Implementation;

    /// Probe whether the backend can actually service this cipher.
    ///
    /// Called once at negotiation time. A `false` here silently falls back
    /// to the next factory in preference order, never aborts the handshake.
    fn is_available(&self) -> bool {
        true
    }

    /// Create a cipher instance, validating (key, mode, iv) against the spec.
    fn create(
        &self,
        key: &[u8],
        mode: CipherMode,
        iv: &[u8],
    ) -> Result<Box<dyn Cipher>, CipherError>;
}

/// Secure random number generator.
pub trait SecureRandom: CryptoSafe {
    /// Fill buffer with cryptographically secure random bytes.
    fn fill(&self, buf: &mut [u8]) -> Result<(), String>;
}

/// HMAC provider for record MACs and the key-derivation PRF.
pub trait HmacProvider: CryptoSafe {
    /// Compute HMAC-SHA256(key, data).
    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<[u8; 32], String>;
}

/// Cryptographic provider for the TLS engine.
///
/// Holds references to all cryptographic components. The cipher list is a
/// static preference order: when several factories exist for the same cipher
/// name, the first available one wins (accelerated backends are listed
/// before the software fallback). Resolution happens once at negotiation
/// time, never per record.
#[derive(Debug, Clone, Copy)]
pub struct CryptoProvider {
    /// Cipher factories in preference order.
    pub ciphers: &'static [&'static dyn SupportedCipher],

    /// Secure random number generator.
    pub secure_random: &'static dyn SecureRandom,

    /// HMAC provider for record integrity and key derivation.
    pub hmac_provider: &'static dyn HmacProvider,
}

impl CryptoProvider {
    /// Resolve the factory for a cipher name.
    ///
    /// Walks the preference order and returns the first available factory
    /// for `name`. Backends whose probe fails are skipped with a debug log.
    pub fn select_cipher(&self, name: &str) -> Option<&'static dyn SupportedCipher> {
        for factory in self.ciphers {
            if factory.spec().name != name {
                continue;
            }
            if !factory.is_available() {
                debug!(
                    "Cipher {} not available via {}, trying next backend",
                    name,
                    factory.implementation()
                );
                continue;
            }
            return Some(*factory);
        }
        None
    }

    /// Cipher names with at least one registered factory, in preference
    /// order, deduplicated. Used to build the ClientHello offer list.
    pub fn cipher_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        for factory in self.ciphers {
            let name = factory.spec().name;
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

/// The base implementation of the cipher contract.
///
/// Both transforms fail with `NotImplemented`. It exists purely to define
/// the contract; every concrete backend overrides both operations.
#[derive(Debug)]
pub struct NullCipher {
    spec: &'static CipherSpec,
}

impl NullCipher {
    pub fn new(spec: &'static CipherSpec) -> Self {
        NullCipher { spec }
    }
}

impl Cipher for NullCipher {
    fn spec(&self) -> &CipherSpec {
        self.spec
    }

    fn implementation(&self) -> Implementation {
        Implementation::Null
    }

    fn encrypt(&mut self, _data: &mut Buf) -> Result<(), CipherError> {
        Err(CipherError::NotImplemented)
    }

    fn decrypt(&mut self, _data: &mut Buf) -> Result<(), CipherError> {
        Err(CipherError::NotImplemented)
    }
}
