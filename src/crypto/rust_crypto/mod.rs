//! Pure-software cipher backend built on the RustCrypto crates.
//!
//! This backend is always compiled and serves as the universal fallback when
//! an accelerated backend is missing or fails its availability probe.

pub(crate) mod cipher;
mod hmac;
mod random;

use super::CryptoProvider;

/// A provider using only the software backend.
pub fn default_provider() -> CryptoProvider {
    CryptoProvider {
        ciphers: cipher::ALL_CIPHERS,
        secure_random: &random::SystemRandom,
        hmac_provider: &hmac::RustCryptoHmac,
    }
}

pub(crate) use hmac::RustCryptoHmac;
pub(crate) use random::SystemRandom;
