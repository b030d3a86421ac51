//! Key derivation for the handshake.
//!
//! P_SHA256 expansion from both peers' randoms and the exchanged pre-master
//! secret. All derived material is held in [`Zeroizing`] buffers so keys are
//! wiped when connection state is dropped.

use zeroize::Zeroizing;

use crate::crypto::provider::{CipherMode, CipherSpec, CryptoProvider, HmacProvider};
use crate::record::KeySet;
use crate::Error;

pub(crate) const MASTER_SECRET_LEN: usize = 48;
pub(crate) const MAC_KEY_LEN: usize = 32;

const MASTER_SECRET_LABEL: &[u8] = b"master secret";
const KEY_EXPANSION_LABEL: &[u8] = b"key expansion";

/// One direction's worth of record-protection material for both peers.
pub(crate) struct KeyBlock {
    pub client_mac: Zeroizing<Vec<u8>>,
    pub server_mac: Zeroizing<Vec<u8>>,
    pub client_key: Zeroizing<Vec<u8>>,
    pub server_key: Zeroizing<Vec<u8>>,
    pub client_iv: Zeroizing<Vec<u8>>,
    pub server_iv: Zeroizing<Vec<u8>>,
}

/// P_SHA256 expansion (HMAC-based PRF).
///
/// A(0) = seed, A(i) = HMAC(secret, A(i-1)), output is the concatenation of
/// HMAC(secret, A(i) || seed) truncated to `out_len`.
fn p_sha256(
    hmac: &dyn HmacProvider,
    secret: &[u8],
    label: &[u8],
    seed: &[u8],
    out_len: usize,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut label_seed = Zeroizing::new(Vec::with_capacity(label.len() + seed.len()));
    label_seed.extend_from_slice(label);
    label_seed.extend_from_slice(seed);

    let mut out = Zeroizing::new(Vec::with_capacity(out_len));
    let mut a = Zeroizing::new(label_seed.to_vec());

    while out.len() < out_len {
        a = Zeroizing::new(
            hmac.hmac_sha256(secret, &a).map_err(Error::Crypto)?.to_vec(),
        );

        let mut inner = Zeroizing::new(Vec::with_capacity(a.len() + label_seed.len()));
        inner.extend_from_slice(&a);
        inner.extend_from_slice(&label_seed);

        let chunk = hmac.hmac_sha256(secret, &inner).map_err(Error::Crypto)?;
        let take = (out_len - out.len()).min(chunk.len());
        out.extend_from_slice(&chunk[..take]);
    }

    Ok(out)
}

/// Derive the 48-byte master secret from the pre-master secret and the two
/// hello randoms (client random first).
pub(crate) fn derive_master(
    hmac: &dyn HmacProvider,
    pre_master: &[u8],
    client_random: &[u8],
    server_random: &[u8],
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut seed = Vec::with_capacity(client_random.len() + server_random.len());
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);

    p_sha256(hmac, pre_master, MASTER_SECRET_LABEL, &seed, MASTER_SECRET_LEN)
}

/// Expand the master secret into the key block and partition it.
///
/// The seed order flips relative to the master derivation (server random
/// first). Partition order: client MAC, server MAC, client key, server key,
/// client IV, server IV.
pub(crate) fn derive_key_block(
    hmac: &dyn HmacProvider,
    master: &[u8],
    client_random: &[u8],
    server_random: &[u8],
    spec: &CipherSpec,
) -> Result<KeyBlock, Error> {
    let mut seed = Vec::with_capacity(client_random.len() + server_random.len());
    seed.extend_from_slice(server_random);
    seed.extend_from_slice(client_random);

    let total = 2 * MAC_KEY_LEN + 2 * spec.key_len + 2 * spec.iv_len;
    let block = p_sha256(hmac, master, KEY_EXPANSION_LABEL, &seed, total)?;

    let mut off = 0;
    let mut take = |len: usize| {
        let part = Zeroizing::new(block[off..off + len].to_vec());
        off += len;
        part
    };

    Ok(KeyBlock {
        client_mac: take(MAC_KEY_LEN),
        server_mac: take(MAC_KEY_LEN),
        client_key: take(spec.key_len),
        server_key: take(spec.key_len),
        client_iv: take(spec.iv_len),
        server_iv: take(spec.iv_len),
    })
}

/// Materialize (read, write) key sets from a key block for one role.
///
/// Clients write with the client material and read with the server material;
/// servers the other way around.
pub(crate) fn build_key_sets(
    provider: &CryptoProvider,
    name: &str,
    block: &KeyBlock,
    is_client: bool,
) -> Result<(KeySet, KeySet), Error> {
    let factory = provider
        .select_cipher(name)
        .ok_or_else(|| Error::UnsupportedCipher(name.to_string()))?;

    let spec = factory.spec();
    let mode = if spec.is_block {
        CipherMode::Cbc
    } else {
        CipherMode::Stream
    };

    let client = KeySet {
        cipher: factory.create(&block.client_key, mode, &block.client_iv)?,
        mac_key: block.client_mac.clone(),
    };
    let server = KeySet {
        cipher: factory.create(&block.server_key, mode, &block.server_iv)?,
        mac_key: block.server_mac.clone(),
    };

    if is_client {
        Ok((server, client))
    } else {
        Ok((client, server))
    }
}

/// Compute the Finished verify data: HMAC(master, label || transcript_hash).
pub(crate) fn verify_data(
    hmac: &dyn HmacProvider,
    master: &[u8],
    label: &[u8],
    transcript_hash: &[u8; 32],
) -> Result<[u8; 32], Error> {
    let mut input = Vec::with_capacity(label.len() + transcript_hash.len());
    input.extend_from_slice(label);
    input.extend_from_slice(transcript_hash);

    hmac.hmac_sha256(master, &input).map_err(Error::Crypto)
}
