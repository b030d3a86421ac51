//! Cipher implementations using OpenSSL.

use std::fmt;

use openssl::symm::{Cipher as OsslAlg, Crypter, Mode};

use crate::buffer::Buf;
use crate::crypto::provider::{
    Cipher, CipherError, CipherMode, CipherSpec, Implementation, SupportedCipher,
};
use crate::crypto::rust_crypto::cipher::{
    AES128_CBC_FACTORY, AES256_CBC_FACTORY, RC4_FACTORY, TDES_CBC_FACTORY,
};
use crate::crypto::{AES128_CBC_SPEC, AES256_CBC_SPEC, TDES_CBC_SPEC};

/// A cipher instance backed by two long-lived `Crypter` contexts, one per
/// transform direction. Padding is disabled; the record layer owns padding.
struct OsslCipher {
    spec: &'static CipherSpec,
    block_size: usize,
    enc: Crypter,
    dec: Crypter,
}

impl fmt::Debug for OsslCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OsslCipher")
            .field("name", &self.spec.name)
            .finish()
    }
}

impl OsslCipher {
    fn new(
        spec: &'static CipherSpec,
        alg: OsslAlg,
        key: &[u8],
        iv: &[u8],
    ) -> Result<Self, CipherError> {
        let iv = if spec.iv_len > 0 { Some(iv) } else { None };

        let mut enc = Crypter::new(alg, Mode::Encrypt, key, iv)
            .map_err(|e| CipherError::Failed(e.to_string()))?;
        let mut dec = Crypter::new(alg, Mode::Decrypt, key, iv)
            .map_err(|e| CipherError::Failed(e.to_string()))?;
        enc.pad(false);
        dec.pad(false);

        Ok(OsslCipher {
            spec,
            block_size: alg.block_size(),
            enc,
            dec,
        })
    }

    fn transform(&mut self, data: &mut Buf, encrypt: bool) -> Result<(), CipherError> {
        self.spec.check_alignment(data.len())?;

        // With padding off and aligned input, update() emits exactly as many
        // bytes as it consumes.
        let mut out = vec![0u8; data.len() + self.block_size];
        let crypter = if encrypt { &mut self.enc } else { &mut self.dec };
        let n = crypter
            .update(data, &mut out)
            .map_err(|e| CipherError::Failed(e.to_string()))?;

        if n != data.len() {
            return Err(CipherError::Failed(format!(
                "unexpected output length {} for input {}",
                n,
                data.len()
            )));
        }

        data.copy_from_slice(&out[..n]);
        Ok(())
    }
}

impl Cipher for OsslCipher {
    fn spec(&self) -> &CipherSpec {
        self.spec
    }

    fn implementation(&self) -> Implementation {
        Implementation::OpenSsl
    }

    fn encrypt(&mut self, data: &mut Buf) -> Result<(), CipherError> {
        self.transform(data, true)
    }

    fn decrypt(&mut self, data: &mut Buf) -> Result<(), CipherError> {
        self.transform(data, false)
    }
}

#[derive(Debug)]
struct OsslFactory {
    spec: &'static CipherSpec,
    alg: fn() -> OsslAlg,
}

impl SupportedCipher for OsslFactory {
    fn spec(&self) -> &'static CipherSpec {
        self.spec
    }

    fn implementation(&self) -> Implementation {
        Implementation::OpenSsl
    }

    fn is_available(&self) -> bool {
        // Probe the linked libcrypto. A cipher can be compiled into the
        // bindings yet rejected at runtime (legacy provider not loaded).
        let key = vec![0u8; self.spec.key_len];
        let iv = vec![0u8; self.spec.iv_len];
        let iv = if self.spec.iv_len > 0 {
            Some(&iv[..])
        } else {
            None
        };
        Crypter::new((self.alg)(), Mode::Encrypt, &key, iv).is_ok()
    }

    fn create(
        &self,
        key: &[u8],
        mode: CipherMode,
        iv: &[u8],
    ) -> Result<Box<dyn Cipher>, CipherError> {
        self.spec.check(key, mode, iv)?;
        Ok(Box::new(OsslCipher::new(self.spec, (self.alg)(), key, iv)?))
    }
}

static OSSL_TDES_CBC: OsslFactory = OsslFactory {
    spec: &TDES_CBC_SPEC,
    alg: OsslAlg::des_ede3_cbc,
};
static OSSL_AES128_CBC: OsslFactory = OsslFactory {
    spec: &AES128_CBC_SPEC,
    alg: OsslAlg::aes_128_cbc,
};
static OSSL_AES256_CBC: OsslFactory = OsslFactory {
    spec: &AES256_CBC_SPEC,
    alg: OsslAlg::aes_256_cbc,
};

/// Preference order: native first per cipher name, software fallback after.
pub(crate) static PREFERRED_CIPHERS: &[&dyn SupportedCipher] = &[
    &OSSL_AES256_CBC,
    &AES256_CBC_FACTORY,
    &OSSL_AES128_CBC,
    &AES128_CBC_FACTORY,
    &OSSL_TDES_CBC,
    &TDES_CBC_FACTORY,
    &RC4_FACTORY,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_matches_software_backend() {
        let key = [0x42u8; 16];
        let iv = [0x24u8; 16];
        let plain = [0x99u8; 48];

        let mut native = OSSL_AES128_CBC
            .create(&key, CipherMode::Cbc, &iv)
            .unwrap();
        let mut soft = AES128_CBC_FACTORY
            .create(&key, CipherMode::Cbc, &iv)
            .unwrap();

        let mut a = Buf::from_slice(&plain);
        let mut b = Buf::from_slice(&plain);
        native.encrypt(&mut a).unwrap();
        soft.encrypt(&mut b).unwrap();
        assert_eq!(a, b);

        native.decrypt(&mut a).unwrap();
        assert_eq!(&*a, &plain[..]);
    }

    #[test]
    fn alignment_enforced() {
        let mut cipher = OSSL_AES256_CBC
            .create(&[0u8; 32], CipherMode::Cbc, &[0u8; 16])
            .unwrap();
        let mut data = Buf::from_slice(&[0u8; 10]);

        assert_eq!(cipher.encrypt(&mut data), Err(CipherError::Alignment(10, 16)));
    }
}
