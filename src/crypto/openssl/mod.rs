//! Native cipher backend built on OpenSSL (feature "openssl").
//!
//! Registered ahead of the software factories so the accelerated transform
//! wins when the linked libcrypto actually services the cipher. RC4 stays
//! software-only: modern OpenSSL builds relegate it to the legacy provider.

mod cipher;

use super::rust_crypto;
use super::CryptoProvider;

/// A provider preferring OpenSSL, falling back to the software backend.
pub fn default_provider() -> CryptoProvider {
    CryptoProvider {
        ciphers: cipher::PREFERRED_CIPHERS,
        secure_random: &rust_crypto::SystemRandom,
        hmac_provider: &rust_crypto::RustCryptoHmac,
    }
}
