//! Cryptographic primitives and pluggable cipher backends.

pub(crate) mod keying;
pub mod provider;

pub mod rust_crypto;

#[cfg(feature = "openssl")]
pub mod openssl;

pub use provider::{Cipher, CipherError, CipherMode, CipherSpec, CryptoProvider, CryptoSafe};
pub use provider::{HmacProvider, Implementation, NullCipher, SecureRandom, SupportedCipher};

/// RC4 stream cipher: 16-byte key, no IV.
pub static RC4_SPEC: CipherSpec = CipherSpec {
    name: "rc4",
    key_len: 16,
    iv_len: 0,
    is_block: false,
    block_len: 0,
};

/// Triple-DES EDE3 in CBC mode: 24-byte key, 8-byte IV and blocks.
pub static TDES_CBC_SPEC: CipherSpec = CipherSpec {
    name: "3des-cbc",
    key_len: 24,
    iv_len: 8,
    is_block: true,
    block_len: 8,
};

/// AES-128 in CBC mode.
pub static AES128_CBC_SPEC: CipherSpec = CipherSpec {
    name: "aes128-cbc",
    key_len: 16,
    iv_len: 16,
    is_block: true,
    block_len: 16,
};

/// AES-256 in CBC mode.
pub static AES256_CBC_SPEC: CipherSpec = CipherSpec {
    name: "aes256-cbc",
    key_len: 32,
    iv_len: 16,
    is_block: true,
    block_len: 16,
};
