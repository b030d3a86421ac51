//! Record protection: MAC-then-encrypt with per-direction sequence numbers.
//!
//! Each direction holds an active and a pending key set. A key-change event
//! promotes pending to active and resets that direction's sequence counter.
//! Until the first activation, records pass through unprotected (the
//! handshake runs in the clear up to the key change).

use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::buffer::Buf;
use crate::crypto::provider::{Cipher, HmacProvider};
use crate::message::ContentType;
use crate::Error;

/// HMAC-SHA256 output length appended to every protected record.
pub(crate) const MAC_LEN: usize = 32;

/// Cipher instance plus the MAC key for one direction.
pub(crate) struct KeySet {
    pub cipher: Box<dyn Cipher>,
    pub mac_key: Zeroizing<Vec<u8>>,
}

/// Per-direction protection state.
struct DirectionState {
    active: Option<KeySet>,
    pending: Option<KeySet>,
    seq: u64,
}

impl DirectionState {
    fn new() -> Self {
        DirectionState {
            active: None,
            pending: None,
            seq: 0,
        }
    }

    fn activate(&mut self) -> Result<(), Error> {
        let pending = self.pending.take().ok_or(Error::KeyChangeWithoutPending)?;
        self.active = Some(pending);
        self.seq = 0;
        Ok(())
    }

    fn bump_seq(&mut self) -> Result<(), Error> {
        self.seq = self.seq.checked_add(1).ok_or(Error::SequenceOverflow)?;
        Ok(())
    }
}

pub(crate) struct RecordLayer {
    hmac: &'static dyn HmacProvider,
    read: DirectionState,
    write: DirectionState,
}

impl RecordLayer {
    pub fn new(hmac: &'static dyn HmacProvider) -> Self {
        RecordLayer {
            hmac,
            read: DirectionState::new(),
            write: DirectionState::new(),
        }
    }

    pub fn set_pending_read(&mut self, keys: KeySet) {
        self.read.pending = Some(keys);
    }

    pub fn set_pending_write(&mut self, keys: KeySet) {
        self.write.pending = Some(keys);
    }

    /// Promote the pending read keys. Incoming key-change record.
    pub fn activate_read(&mut self) -> Result<(), Error> {
        self.read.activate()
    }

    /// Promote the pending write keys. Called just after the key-change
    /// record goes out, so the record itself is still unprotected.
    pub fn activate_write(&mut self) -> Result<(), Error> {
        self.write.activate()
    }

    pub fn read_protected(&self) -> bool {
        self.read.active.is_some()
    }

    pub fn read_pending(&self) -> bool {
        self.read.pending.is_some()
    }

    pub fn write_protected(&self) -> bool {
        self.write.active.is_some()
    }

    /// Drop all key material, active and pending.
    pub fn release(&mut self) {
        self.read = DirectionState::new();
        self.write = DirectionState::new();
    }

    /// Protect an outgoing fragment in place: append MAC, pad to the block
    /// size if needed, encrypt.
    pub fn seal(&mut self, content_type: ContentType, payload: &mut Buf) -> Result<(), Error> {
        let Some(keys) = &mut self.write.active else {
            self.write.bump_seq()?;
            return Ok(());
        };

        let mac = mac_record(self.hmac, &keys.mac_key, self.write.seq, content_type, payload)?;
        payload.extend_from_slice(&mac);

        let spec = *keys.cipher.spec();
        if spec.is_block {
            let block = spec.block_len;
            let pad = (block - ((payload.len() + 1) % block)) % block;
            for _ in 0..pad {
                payload.push(pad as u8);
            }
            payload.push(pad as u8);
        }

        keys.cipher.encrypt(payload)?;
        self.write.bump_seq()
    }

    /// Unprotect an incoming fragment in place: decrypt, strip and verify
    /// padding, verify and strip the MAC. Any mismatch is fatal.
    pub fn open(&mut self, content_type: ContentType, data: &mut Buf) -> Result<(), Error> {
        let Some(keys) = &mut self.read.active else {
            self.read.bump_seq()?;
            return Ok(());
        };

        let spec = *keys.cipher.spec();
        if spec.is_block && data.len() % spec.block_len != 0 {
            return Err(Error::RecordIntegrity("ciphertext not block aligned"));
        }
        if data.is_empty() {
            return Err(Error::RecordIntegrity("empty protected record"));
        }

        keys.cipher.decrypt(data)?;

        if spec.is_block {
            let pad = *data.last().ok_or(Error::RecordIntegrity("empty record"))? as usize;
            if data.len() < pad + 1 + MAC_LEN {
                return Err(Error::RecordIntegrity("bad padding length"));
            }
            let body_len = data.len() - pad - 1;
            if data[body_len..data.len() - 1].iter().any(|b| *b as usize != pad) {
                return Err(Error::RecordIntegrity("bad padding bytes"));
            }
            data.truncate(body_len);
        }

        if data.len() < MAC_LEN {
            return Err(Error::RecordIntegrity("record too short for mac"));
        }
        let payload_len = data.len() - MAC_LEN;

        let expected = mac_record(
            self.hmac,
            &keys.mac_key,
            self.read.seq,
            content_type,
            &data[..payload_len],
        )?;

        let ok: bool = data[payload_len..].ct_eq(&expected).into();
        if !ok {
            return Err(Error::RecordIntegrity("mac mismatch"));
        }

        data.truncate(payload_len);
        self.read.bump_seq()
    }
}

/// MAC input covers the implicit sequence number and the record header the
/// fragment will be framed with: seq(8) type(1) version(2) len(2) fragment.
fn mac_record(
    hmac: &dyn HmacProvider,
    mac_key: &[u8],
    seq: u64,
    content_type: ContentType,
    payload: &[u8],
) -> Result<[u8; MAC_LEN], Error> {
    let mut input = Vec::with_capacity(13 + payload.len());
    input.extend_from_slice(&seq.to_be_bytes());
    input.push(content_type.as_u8());
    input.extend_from_slice(&[3, 3]);
    input.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    input.extend_from_slice(payload);

    hmac.hmac_sha256(mac_key, &input).map_err(Error::Crypto)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::provider::CipherMode;
    use crate::crypto::rust_crypto::{self, RustCryptoHmac};
    use crate::crypto::CryptoProvider;

    static HMAC: RustCryptoHmac = RustCryptoHmac;

    fn provider() -> CryptoProvider {
        rust_crypto::default_provider()
    }

    fn key_set(name: &str) -> KeySet {
        let factory = provider().select_cipher(name).unwrap();
        let spec = factory.spec();
        let mode = if spec.is_block {
            CipherMode::Cbc
        } else {
            CipherMode::Stream
        };
        let key = vec![0x11; spec.key_len];
        let iv = vec![0x22; spec.iv_len];
        KeySet {
            cipher: factory.create(&key, mode, &iv).unwrap(),
            mac_key: Zeroizing::new(vec![0x33; 32]),
        }
    }

    fn protected_pair(name: &str) -> (RecordLayer, RecordLayer) {
        let mut sender = RecordLayer::new(&HMAC);
        let mut receiver = RecordLayer::new(&HMAC);
        sender.set_pending_write(key_set(name));
        receiver.set_pending_read(key_set(name));
        sender.activate_write().unwrap();
        receiver.activate_read().unwrap();
        (sender, receiver)
    }

    #[test]
    fn plaintext_passthrough() {
        let mut layer = RecordLayer::new(&HMAC);
        let mut data = Buf::from_slice(b"hello");

        layer.seal(ContentType::Handshake, &mut data).unwrap();
        assert_eq!(&*data, b"hello");

        layer.open(ContentType::Handshake, &mut data).unwrap();
        assert_eq!(&*data, b"hello");
    }

    #[test]
    fn seal_open_roundtrip_cbc() {
        let (mut sender, mut receiver) = protected_pair("aes128-cbc");

        let mut data = Buf::from_slice(b"application payload");
        sender.seal(ContentType::ApplicationData, &mut data).unwrap();

        assert_eq!(data.len() % 16, 0);
        assert!(data.len() >= b"application payload".len() + MAC_LEN);

        receiver.open(ContentType::ApplicationData, &mut data).unwrap();
        assert_eq!(&*data, b"application payload");
    }

    #[test]
    fn seal_open_roundtrip_stream() {
        let (mut sender, mut receiver) = protected_pair("rc4");

        let mut data = Buf::from_slice(b"stream payload");
        sender.seal(ContentType::ApplicationData, &mut data).unwrap();

        // Stream ciphers add the MAC but no padding.
        assert_eq!(data.len(), b"stream payload".len() + MAC_LEN);

        receiver.open(ContentType::ApplicationData, &mut data).unwrap();
        assert_eq!(&*data, b"stream payload");
    }

    #[test]
    fn tampered_record_fails() {
        let (mut sender, mut receiver) = protected_pair("aes256-cbc");

        let mut data = Buf::from_slice(b"do not touch");
        sender.seal(ContentType::ApplicationData, &mut data).unwrap();
        data[0] ^= 0x01;

        let err = receiver
            .open(ContentType::ApplicationData, &mut data)
            .unwrap_err();
        assert!(matches!(err, Error::RecordIntegrity(_)));
    }

    #[test]
    fn sequence_mismatch_fails() {
        let (mut sender, mut receiver) = protected_pair("rc4");

        let mut first = Buf::from_slice(b"one");
        let mut second = Buf::from_slice(b"two");
        sender.seal(ContentType::ApplicationData, &mut first).unwrap();
        sender.seal(ContentType::ApplicationData, &mut second).unwrap();

        // Dropping the first record desynchronizes the sequence counter.
        let err = receiver
            .open(ContentType::ApplicationData, &mut second)
            .unwrap_err();
        assert!(matches!(err, Error::RecordIntegrity(_)));
    }

    #[test]
    fn wrong_content_type_fails() {
        let (mut sender, mut receiver) = protected_pair("aes128-cbc");

        let mut data = Buf::from_slice(b"typed");
        sender.seal(ContentType::ApplicationData, &mut data).unwrap();

        let err = receiver.open(ContentType::Handshake, &mut data).unwrap_err();
        assert!(matches!(err, Error::RecordIntegrity(_)));
    }

    #[test]
    fn activation_requires_pending() {
        let mut layer = RecordLayer::new(&HMAC);

        assert!(matches!(
            layer.activate_read(),
            Err(Error::KeyChangeWithoutPending)
        ));
        assert!(matches!(
            layer.activate_write(),
            Err(Error::KeyChangeWithoutPending)
        ));
    }

    #[test]
    fn activation_resets_sequence() {
        let (mut sender, mut receiver) = protected_pair("aes128-cbc");

        let mut data = Buf::from_slice(b"before swap");
        sender.seal(ContentType::ApplicationData, &mut data).unwrap();
        receiver.open(ContentType::ApplicationData, &mut data).unwrap();

        sender.set_pending_write(key_set("aes128-cbc"));
        receiver.set_pending_read(key_set("aes128-cbc"));
        sender.activate_write().unwrap();
        receiver.activate_read().unwrap();

        // Fresh keys restart at sequence zero.
        let mut data = Buf::from_slice(b"after swap");
        sender.seal(ContentType::ApplicationData, &mut data).unwrap();
        receiver.open(ContentType::ApplicationData, &mut data).unwrap();
        assert_eq!(&*data, b"after swap");
    }
}
