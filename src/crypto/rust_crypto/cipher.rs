//! Cipher implementations using RustCrypto.

use std::fmt;

use aes::{Aes128, Aes256};
use cipher::generic_array::GenericArray;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit, StreamCipher};
use des::TdesEde3;
use rc4::consts::U16;
use rc4::Rc4;

use crate::buffer::Buf;
use crate::crypto::provider::{
    Cipher, CipherError, CipherMode, CipherSpec, Implementation, SupportedCipher,
};
use crate::crypto::{AES128_CBC_SPEC, AES256_CBC_SPEC, RC4_SPEC, TDES_CBC_SPEC};

/// RC4 stream cipher instance. Encryption and decryption both advance the
/// same keystream, so one instance serves exactly one direction.
struct Rc4Cipher {
    state: Rc4<U16>,
}

impl fmt::Debug for Rc4Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rc4Cipher").finish()
    }
}

impl Cipher for Rc4Cipher {
    fn spec(&self) -> &CipherSpec {
        &RC4_SPEC
    }

    fn implementation(&self) -> Implementation {
        Implementation::RustCrypto
    }

    fn encrypt(&mut self, data: &mut Buf) -> Result<(), CipherError> {
        self.state.apply_keystream(data);
        Ok(())
    }

    fn decrypt(&mut self, data: &mut Buf) -> Result<(), CipherError> {
        // RC4 is symmetric: the keystream XOR is its own inverse.
        self.state.apply_keystream(data);
        Ok(())
    }
}

/// CBC-mode block cipher instance. The chaining IV carries over between
/// calls, so consecutive records form one CBC stream per direction.
enum CbcState {
    Aes128 {
        enc: cbc::Encryptor<Aes128>,
        dec: cbc::Decryptor<Aes128>,
    },
    Aes256 {
        enc: cbc::Encryptor<Aes256>,
        dec: cbc::Decryptor<Aes256>,
    },
    Tdes {
        enc: cbc::Encryptor<TdesEde3>,
        dec: cbc::Decryptor<TdesEde3>,
    },
}

struct CbcCipher {
    spec: &'static CipherSpec,
    state: CbcState,
}

impl fmt::Debug for CbcCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CbcCipher")
            .field("name", &self.spec.name)
            .finish()
    }
}

impl CbcCipher {
    fn new(spec: &'static CipherSpec, key: &[u8], iv: &[u8]) -> Result<Self, CipherError> {
        let invalid = |_| CipherError::InvalidParameters("key or iv length");

        let state = match spec.name {
            "aes128-cbc" => CbcState::Aes128 {
                enc: cbc::Encryptor::new_from_slices(key, iv).map_err(invalid)?,
                dec: cbc::Decryptor::new_from_slices(key, iv).map_err(invalid)?,
            },
            "aes256-cbc" => CbcState::Aes256 {
                enc: cbc::Encryptor::new_from_slices(key, iv).map_err(invalid)?,
                dec: cbc::Decryptor::new_from_slices(key, iv).map_err(invalid)?,
            },
            "3des-cbc" => CbcState::Tdes {
                enc: cbc::Encryptor::new_from_slices(key, iv).map_err(invalid)?,
                dec: cbc::Decryptor::new_from_slices(key, iv).map_err(invalid)?,
            },
            _ => return Err(CipherError::InvalidParameters("unknown cipher name")),
        };

        Ok(CbcCipher { spec, state })
    }
}

impl Cipher for CbcCipher {
    fn spec(&self) -> &CipherSpec {
        self.spec
    }

    fn implementation(&self) -> Implementation {
        Implementation::RustCrypto
    }

    fn encrypt(&mut self, data: &mut Buf) -> Result<(), CipherError> {
        self.spec.check_alignment(data.len())?;

        match &mut self.state {
            CbcState::Aes128 { enc, .. } => {
                for block in data.chunks_exact_mut(16) {
                    enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
                }
            }
            CbcState::Aes256 { enc, .. } => {
                for block in data.chunks_exact_mut(16) {
                    enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
                }
            }
            CbcState::Tdes { enc, .. } => {
                for block in data.chunks_exact_mut(8) {
                    enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
                }
            }
        }

        Ok(())
    }

    fn decrypt(&mut self, data: &mut Buf) -> Result<(), CipherError> {
        self.spec.check_alignment(data.len())?;

        match &mut self.state {
            CbcState::Aes128 { dec, .. } => {
                for block in data.chunks_exact_mut(16) {
                    dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
                }
            }
            CbcState::Aes256 { dec, .. } => {
                for block in data.chunks_exact_mut(16) {
                    dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
                }
            }
            CbcState::Tdes { dec, .. } => {
                for block in data.chunks_exact_mut(8) {
                    dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
                }
            }
        }

        Ok(())
    }
}

/// RC4 factory.
#[derive(Debug)]
pub(crate) struct Rc4Factory;

impl SupportedCipher for Rc4Factory {
    fn spec(&self) -> &'static CipherSpec {
        &RC4_SPEC
    }

    fn implementation(&self) -> Implementation {
        Implementation::RustCrypto
    }

    fn create(
        &self,
        key: &[u8],
        mode: CipherMode,
        iv: &[u8],
    ) -> Result<Box<dyn Cipher>, CipherError> {
        RC4_SPEC.check(key, mode, iv)?;
        let state = Rc4::new_from_slice(key)
            .map_err(|_| CipherError::InvalidParameters("key length"))?;
        Ok(Box::new(Rc4Cipher { state }))
    }
}

/// Shared factory shape for the three CBC suites.
#[derive(Debug)]
pub(crate) struct CbcFactory {
    spec: &'static CipherSpec,
}

impl SupportedCipher for CbcFactory {
    fn spec(&self) -> &'static CipherSpec {
        self.spec
    }

    fn implementation(&self) -> Implementation {
        Implementation::RustCrypto
    }

    fn create(
        &self,
        key: &[u8],
        mode: CipherMode,
        iv: &[u8],
    ) -> Result<Box<dyn Cipher>, CipherError> {
        self.spec.check(key, mode, iv)?;
        Ok(Box::new(CbcCipher::new(self.spec, key, iv)?))
    }
}

pub(crate) static RC4_FACTORY: Rc4Factory = Rc4Factory;
pub(crate) static TDES_CBC_FACTORY: CbcFactory = CbcFactory {
    spec: &TDES_CBC_SPEC,
};
pub(crate) static AES128_CBC_FACTORY: CbcFactory = CbcFactory {
    spec: &AES128_CBC_SPEC,
};
pub(crate) static AES256_CBC_FACTORY: CbcFactory = CbcFactory {
    spec: &AES256_CBC_SPEC,
};

/// All software cipher factories, strongest first.
pub(crate) static ALL_CIPHERS: &[&dyn SupportedCipher] = &[
    &AES256_CBC_FACTORY,
    &AES128_CBC_FACTORY,
    &TDES_CBC_FACTORY,
    &RC4_FACTORY,
];
