//! HMAC implementation using RustCrypto.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::crypto::provider::HmacProvider;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug)]
pub(crate) struct RustCryptoHmac;

impl HmacProvider for RustCryptoHmac {
    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<[u8; 32], String> {
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|_| "Invalid HMAC key length".to_string())?;
        mac.update(data);
        let result = mac.finalize().into_bytes();
        Ok(result.into())
    }
}
