//! Protocol engine shared by the client and server state machines.
//!
//! The engine is sans-IO: bytes in via [`Engine::push_received`], bytes and
//! events out via [`Engine::poll_output`]. It owns record framing, record
//! protection, handshake stream reassembly and the running transcript. The
//! state machines sit on top and only deal in whole handshake messages.

use std::collections::VecDeque;

use sha2::{Digest, Sha256};

use crate::buffer::{Buf, BufferPool};
use crate::config::Config;
use crate::crypto::CryptoProvider;
use crate::message::{
    ClientHello, ContentType, Finished, HandshakeHeader, KeyExchange, MessageType,
    ProtocolVersion, ServerHello, TlsRecord, HANDSHAKE_HEADER_LEN, MAX_FRAGMENT_LEN,
    RECORD_HEADER_LEN,
};
use crate::record::{KeySet, RecordLayer};
use crate::{Error, Output};

/// Largest plaintext fragment per record. Larger writes are split.
const MAX_CHUNK: usize = 16_384;

/// A parsed handshake message handed up to the state machine.
#[derive(Debug)]
pub(crate) enum HandshakeBody {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    KeyExchange(KeyExchange),
    Finished(Finished),
}

pub(crate) struct Engine {
    config: Config,
    record: RecordLayer,
    pool: BufferPool,

    /// Raw incoming bytes, not yet framed into records.
    rx: Buf,

    /// Reassembled handshake stream. Messages can span record boundaries.
    hs_rx: Buf,

    /// Serialized records waiting for the caller to poll them out.
    queue_tx: VecDeque<Buf>,

    /// Decrypted application data waiting for the caller to poll it out.
    queue_app_rx: VecDeque<Buf>,

    /// Application data written before the handshake completed.
    queue_app_tx: VecDeque<Buf>,

    /// Every handshake message sent or received, in order.
    transcript: Buf,

    connected: bool,
    connected_emitted: bool,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let record = RecordLayer::new(config.provider.hmac_provider);

        Engine {
            config,
            record,
            pool: BufferPool::default(),
            rx: Buf::new(),
            hs_rx: Buf::new(),
            queue_tx: VecDeque::new(),
            queue_app_rx: VecDeque::new(),
            queue_app_tx: VecDeque::new(),
            transcript: Buf::new(),
            connected: false,
            connected_emitted: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn provider(&self) -> CryptoProvider {
        self.config.provider
    }

    /// 32 random bytes for a hello random.
    pub fn random_32(&self) -> Result<[u8; 32], Error> {
        let mut out = [0u8; 32];
        self.config
            .provider
            .secure_random
            .fill(&mut out)
            .map_err(Error::Crypto)?;
        Ok(out)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether incoming records are decrypted with active keys.
    pub fn read_protected(&self) -> bool {
        self.record.read_protected()
    }

    /// Stage key sets for the next key change, one per direction.
    pub fn install_pending(&mut self, read: KeySet, write: KeySet) {
        self.record.set_pending_read(read);
        self.record.set_pending_write(write);
    }

    /// SHA-256 over the transcript so far.
    pub fn transcript_hash(&self) -> [u8; 32] {
        Sha256::digest(&*self.transcript).into()
    }

    /// Accept raw bytes from the transport. Buffers only; call
    /// [`Engine::pump`] to process completed records.
    pub fn push_received(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.rx.len() + data.len() > self.config.max_rx_buffer {
            return Err(Error::ReceiveQueueFull);
        }
        self.rx.extend_from_slice(data);
        Ok(())
    }

    /// Process every complete buffered record. Returns whether at least one
    /// record was consumed.
    ///
    /// A key-change record found while no pending read keys are staged stays
    /// buffered: the state machine may still be about to derive them from
    /// handshake messages consumed this round. The caller decides when a
    /// stalled key change is an error (see [`Engine::awaiting_key_change`]).
    pub fn pump(&mut self) -> Result<bool, Error> {
        let mut consumed_any = false;

        loop {
            if self.rx.len() < RECORD_HEADER_LEN {
                break;
            }
            let len = u16::from_be_bytes([self.rx[3], self.rx[4]]) as usize;
            if len > MAX_FRAGMENT_LEN {
                return Err(Error::Parse("oversized record"));
            }
            let total = RECORD_HEADER_LEN + len;
            if self.rx.len() < total {
                break;
            }

            if self.rx[0] == ContentType::ChangeCipherSpec.as_u8()
                && !self.record.read_pending()
            {
                break;
            }

            let mut frag = self.pool.pop();
            let (content_type, version) = {
                let (_, record) =
                    TlsRecord::parse(&self.rx[..total]).map_err(|_| Error::Parse("record"))?;
                frag.extend_from_slice(record.fragment);
                (record.content_type, record.version)
            };
            self.rx.drain_front(total);
            consumed_any = true;

            if let ProtocolVersion::Unknown(major, minor) = version {
                return Err(Error::UnsupportedVersion(major, minor));
            }

            self.record.open(content_type, &mut frag)?;
            trace!("RX record {:?} len {}", content_type, frag.len());

            match content_type {
                ContentType::Handshake => {
                    if self.hs_rx.len() + frag.len() > self.config.max_rx_buffer {
                        return Err(Error::ReceiveQueueFull);
                    }
                    self.hs_rx.extend_from_slice(&frag);
                    self.pool.push(frag);
                }
                ContentType::ChangeCipherSpec => {
                    if frag.len() != 1 || frag[0] != 1 {
                        return Err(Error::RecordIntegrity("malformed key change record"));
                    }
                    self.pool.push(frag);
                    self.record.activate_read()?;
                    debug!("Activated read protection");
                }
                ContentType::ApplicationData => {
                    if !self.connected {
                        return Err(Error::RecordIntegrity(
                            "application data before handshake completion",
                        ));
                    }
                    if self.queue_app_rx.len() >= self.config.max_queue_app_rx {
                        return Err(Error::ReceiveQueueFull);
                    }
                    self.queue_app_rx.push_back(frag);
                }
                ContentType::Alert => {
                    warn!("Peer sent alert, closing");
                    return Err(Error::ConnectionFailed);
                }
                ContentType::Unknown(value) => {
                    return Err(Error::UnexpectedContentType(value));
                }
            }
        }

        Ok(consumed_any)
    }

    /// Whether a complete key-change record sits at the head of the input
    /// with no pending read keys to promote. Once the state machine has run
    /// out of progress to make, this means the peer changed keys it never
    /// negotiated.
    pub fn awaiting_key_change(&self) -> bool {
        if self.rx.len() < RECORD_HEADER_LEN
            || self.rx[0] != ContentType::ChangeCipherSpec.as_u8()
            || self.record.read_pending()
        {
            return false;
        }
        let len = u16::from_be_bytes([self.rx[3], self.rx[4]]) as usize;
        self.rx.len() >= RECORD_HEADER_LEN + len
    }

    /// Pop the next handshake message off the reassembled stream.
    ///
    /// Returns `Ok(None)` when the message is not complete yet. A complete
    /// message of the wrong type is a protocol sequence error.
    pub fn next_handshake(&mut self, expected: MessageType) -> Result<Option<HandshakeBody>, Error> {
        if self.hs_rx.len() < HANDSHAKE_HEADER_LEN {
            return Ok(None);
        }
        let (_, header) = HandshakeHeader::parse(&self.hs_rx[..HANDSHAKE_HEADER_LEN])
            .map_err(|_| Error::Parse("handshake header"))?;
        let body_len = header.length as usize;
        let total = HANDSHAKE_HEADER_LEN + body_len;
        if self.hs_rx.len() < total {
            return Ok(None);
        }

        if header.msg_type != expected {
            return Err(Error::ProtocolSequence {
                expected,
                got: header.msg_type,
            });
        }

        let body = &self.hs_rx[HANDSHAKE_HEADER_LEN..total];
        let parsed = parse_body(expected, body)?;

        trace!("RX handshake {}", header.msg_type);
        self.transcript.extend_from_slice(&self.hs_rx[..total]);
        self.hs_rx.drain_front(total);

        Ok(Some(parsed))
    }

    /// Frame and send a handshake message, recording it in the transcript.
    pub fn send_handshake(&mut self, msg_type: MessageType, body: &[u8]) -> Result<(), Error> {
        let mut msg = self.pool.pop();
        let header = HandshakeHeader {
            msg_type,
            length: body.len() as u32,
        };
        header.serialize(&mut msg);
        msg.extend_from_slice(body);

        self.transcript.extend_from_slice(&msg);
        trace!("TX handshake {}", msg_type);

        let result = self.send_record(ContentType::Handshake, &msg);
        self.pool.push(msg);
        result
    }

    /// Send the key change record and switch the write direction to the
    /// pending keys. The record itself goes out under the old keys.
    pub fn send_key_change(&mut self) -> Result<(), Error> {
        self.send_record(ContentType::ChangeCipherSpec, &[1])?;
        self.record.activate_write()?;
        debug!("Activated write protection");
        Ok(())
    }

    /// Send application data, splitting into records as needed. Data
    /// written before the handshake completes is queued and flushed on
    /// connection.
    pub fn send_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if !self.connected {
            if self.queue_app_tx.len() >= self.config.max_queue_tx {
                return Err(Error::TransmitQueueFull);
            }
            self.queue_app_tx.push_back(Buf::from_slice(data));
            return Ok(());
        }

        for chunk in data.chunks(MAX_CHUNK) {
            self.send_record(ContentType::ApplicationData, chunk)?;
        }
        Ok(())
    }

    /// Mark the handshake complete and flush writes queued before it.
    pub fn set_connected(&mut self) -> Result<(), Error> {
        self.connected = true;

        while let Some(buf) = self.queue_app_tx.pop_front() {
            for chunk in buf.chunks(MAX_CHUNK) {
                self.send_record(ContentType::ApplicationData, chunk)?;
            }
        }
        Ok(())
    }

    fn send_record(&mut self, content_type: ContentType, payload: &[u8]) -> Result<(), Error> {
        if self.queue_tx.len() >= self.config.max_queue_tx {
            return Err(Error::TransmitQueueFull);
        }

        let mut frag = self.pool.pop();
        frag.extend_from_slice(payload);
        self.record.seal(content_type, &mut frag)?;

        let mut out = self.pool.pop();
        let record = TlsRecord {
            content_type,
            version: ProtocolVersion::TLS1_2,
            length: frag.len() as u16,
            fragment: &frag,
        };
        record.serialize(&mut out);
        trace!("TX record {:?} len {}", content_type, frag.len());

        self.pool.push(frag);
        self.queue_tx.push_back(out);
        Ok(())
    }

    /// Drop all key material and buffered data.
    pub fn disconnect(&mut self) {
        self.record.release();
        self.rx.clear();
        self.hs_rx.clear();
        self.queue_tx.clear();
        self.queue_app_rx.clear();
        self.queue_app_tx.clear();
        self.connected = false;
    }

    /// Poll for the next output, copying into the caller's buffer.
    ///
    /// Priority: outgoing packets, then the connected notification, then
    /// decrypted application data. A partially copied buffer stays queued.
    pub fn poll_output<'a>(&mut self, buf: &'a mut [u8]) -> Output<'a> {
        if let Some(front) = self.queue_tx.pop_front() {
            let n = self.copy_out(front, buf, true);
            return Output::Packet(&buf[..n]);
        }

        if self.connected && !self.connected_emitted {
            self.connected_emitted = true;
            return Output::Connected;
        }

        if let Some(front) = self.queue_app_rx.pop_front() {
            let n = self.copy_out(front, buf, false);
            return Output::ApplicationData(&buf[..n]);
        }

        Output::NeedInput
    }

    fn copy_out(&mut self, mut front: Buf, buf: &mut [u8], to_tx: bool) -> usize {
        let n = front.len().min(buf.len());
        buf[..n].copy_from_slice(&front[..n]);

        if n < front.len() {
            front.drain_front(n);
            if to_tx {
                self.queue_tx.push_front(front);
            } else {
                self.queue_app_rx.push_front(front);
            }
        } else {
            self.pool.push(front);
        }
        n
    }
}

fn parse_body(expected: MessageType, body: &[u8]) -> Result<HandshakeBody, Error> {
    let parsed = match expected {
        MessageType::ClientHello => {
            let (rest, hello) =
                ClientHello::parse(body).map_err(|_| Error::Parse("client hello"))?;
            if !rest.is_empty() {
                return Err(Error::Parse("trailing bytes in client hello"));
            }
            HandshakeBody::ClientHello(hello)
        }
        MessageType::ServerHello => {
            let (rest, hello) =
                ServerHello::parse(body).map_err(|_| Error::Parse("server hello"))?;
            if !rest.is_empty() {
                return Err(Error::Parse("trailing bytes in server hello"));
            }
            HandshakeBody::ServerHello(hello)
        }
        MessageType::KeyExchange => {
            let (rest, ke) =
                KeyExchange::parse(body).map_err(|_| Error::Parse("key exchange"))?;
            if !rest.is_empty() {
                return Err(Error::Parse("trailing bytes in key exchange"));
            }
            HandshakeBody::KeyExchange(ke)
        }
        MessageType::Finished => {
            let (rest, fin) = Finished::parse(body).map_err(|_| Error::Parse("finished"))?;
            if !rest.is_empty() {
                return Err(Error::Parse("trailing bytes in finished"));
            }
            HandshakeBody::Finished(fin)
        }
        MessageType::Unknown(_) => return Err(Error::Parse("unknown handshake message")),
    };

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(Config::new())
    }

    fn raw_handshake_record(msg_type: MessageType, body: &[u8]) -> Vec<u8> {
        let mut msg = Buf::new();
        HandshakeHeader {
            msg_type,
            length: body.len() as u32,
        }
        .serialize(&mut msg);
        msg.extend_from_slice(body);

        let mut out = Buf::new();
        TlsRecord {
            content_type: ContentType::Handshake,
            version: ProtocolVersion::TLS1_2,
            length: msg.len() as u16,
            fragment: &msg,
        }
        .serialize(&mut out);
        out.into_vec()
    }

    #[test]
    fn handshake_spanning_records_reassembles() {
        let mut e = engine();

        let mut body = Buf::new();
        KeyExchange {
            pre_master: vec![0xAA; 48],
        }
        .serialize(&mut body);

        let record = raw_handshake_record(MessageType::KeyExchange, &body);

        // Byte at a time. The message only appears once complete.
        for byte in &record[..record.len() - 1] {
            e.push_received(&[*byte]).unwrap();
            e.pump().unwrap();
            assert!(e.next_handshake(MessageType::KeyExchange).unwrap().is_none());
        }
        e.push_received(&[record[record.len() - 1]]).unwrap();
        assert!(e.pump().unwrap());

        let msg = e.next_handshake(MessageType::KeyExchange).unwrap().unwrap();
        assert!(matches!(msg, HandshakeBody::KeyExchange(ke) if ke.pre_master == vec![0xAA; 48]));
    }

    #[test]
    fn unexpected_message_type_is_sequence_error() {
        let mut e = engine();

        let mut body = Buf::new();
        Finished {
            verify_data: [0u8; 32],
        }
        .serialize(&mut body);

        let record = raw_handshake_record(MessageType::Finished, &body);
        e.push_received(&record).unwrap();
        e.pump().unwrap();

        let err = e.next_handshake(MessageType::ClientHello).unwrap_err();
        assert!(matches!(
            err,
            Error::ProtocolSequence {
                expected: MessageType::ClientHello,
                got: MessageType::Finished,
            }
        ));
    }

    #[test]
    fn key_change_without_pending_keys_stalls() {
        let mut e = engine();

        let mut out = Buf::new();
        TlsRecord {
            content_type: ContentType::ChangeCipherSpec,
            version: ProtocolVersion::TLS1_2,
            length: 1,
            fragment: &[1],
        }
        .serialize(&mut out);

        // The record stays buffered until pending keys exist. The state
        // machines turn a stall with no possible progress into an error.
        e.push_received(&out).unwrap();
        assert!(!e.pump().unwrap());
        assert!(e.awaiting_key_change());
    }

    #[test]
    fn application_data_before_connected_is_fatal() {
        let mut e = engine();

        let mut out = Buf::new();
        TlsRecord {
            content_type: ContentType::ApplicationData,
            version: ProtocolVersion::TLS1_2,
            length: 3,
            fragment: b"abc",
        }
        .serialize(&mut out);

        e.push_received(&out).unwrap();
        let err = e.pump().unwrap_err();
        assert!(matches!(err, Error::RecordIntegrity(_)));
    }

    #[test]
    fn unsupported_version_rejected() {
        let mut e = engine();

        let mut out = Buf::new();
        TlsRecord {
            content_type: ContentType::Handshake,
            version: ProtocolVersion::Unknown(3, 1),
            length: 1,
            fragment: &[0],
        }
        .serialize(&mut out);

        e.push_received(&out).unwrap();
        let err = e.pump().unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion(3, 1)));
    }

    #[test]
    fn writes_before_connected_flush_after() {
        let mut e = engine();

        e.send_application_data(b"early").unwrap();

        let mut buf = [0u8; 1024];
        assert!(matches!(e.poll_output(&mut buf), Output::NeedInput));

        e.set_connected().unwrap();

        // The queued write goes out as a record once connected.
        let Output::Packet(packet) = e.poll_output(&mut buf) else {
            panic!("expected packet");
        };
        assert_eq!(packet[0], ContentType::ApplicationData.as_u8());

        assert!(matches!(e.poll_output(&mut buf), Output::Connected));
    }

    #[test]
    fn partial_poll_keeps_remainder_queued() {
        let mut e = engine();
        e.set_connected().unwrap();
        e.send_application_data(b"0123456789").unwrap();

        let mut small = [0u8; 4];
        let mut collected = Vec::new();
        loop {
            match e.poll_output(&mut small) {
                Output::Packet(p) => collected.extend_from_slice(p),
                _ => break,
            }
        }

        // Record header plus the plaintext payload (no keys active).
        assert_eq!(collected.len(), RECORD_HEADER_LEN + 10);
        assert_eq!(&collected[RECORD_HEADER_LEN..], b"0123456789");
    }
}
