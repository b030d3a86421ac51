//! Wire types for the record layer and handshake messages.
//!
//! Handshake bodies are deliberately small: the engine treats most of their
//! content as opaque bytes and only parses what negotiation needs (randoms,
//! cipher names, pre-master blob, verify data).

mod finished;
mod hello;
mod key_exchange;

pub use finished::Finished;
pub use hello::{ClientHello, ServerHello};
pub use key_exchange::KeyExchange;

use std::fmt;

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u24, be_u8};
use nom::IResult;

use crate::buffer::Buf;

/// Record header length: content_type(1) + version(2) + length(2).
pub const RECORD_HEADER_LEN: usize = 5;

/// Handshake message header length: msg_type(1) + length(3).
pub const HANDSHAKE_HEADER_LEN: usize = 4;

/// Largest fragment we accept in a single record. Plaintext limit plus
/// room for MAC and padding expansion.
pub const MAX_FRAGMENT_LEN: usize = 16_384 + 2_048;

/// TLS record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
    Unknown(u8),
}

impl ContentType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            _ => ContentType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ContentType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }
}

/// Record layer protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    TLS1_2,
    Unknown(u8, u8),
}

impl ProtocolVersion {
    pub fn parse(input: &[u8]) -> IResult<&[u8], ProtocolVersion> {
        let (input, major) = be_u8(input)?;
        let (input, minor) = be_u8(input)?;
        let version = match (major, minor) {
            (3, 3) => ProtocolVersion::TLS1_2,
            (a, b) => ProtocolVersion::Unknown(a, b),
        };
        Ok((input, version))
    }

    pub fn serialize(&self, output: &mut Buf) {
        let (major, minor) = match self {
            ProtocolVersion::TLS1_2 => (3, 3),
            ProtocolVersion::Unknown(a, b) => (*a, *b),
        };
        output.push(major);
        output.push(minor);
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::TLS1_2 => write!(f, "TLS1.2"),
            ProtocolVersion::Unknown(a, b) => write!(f, "Unknown({}.{})", a, b),
        }
    }
}

/// A parsed record as it appears on the wire. The fragment is still
/// encrypted if the read direction has an active cipher.
#[derive(Debug, PartialEq, Eq)]
pub struct TlsRecord<'a> {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub length: u16,
    pub fragment: &'a [u8],
}

impl<'a> TlsRecord<'a> {
    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], TlsRecord<'a>> {
        let (input, content_type) = ContentType::parse(input)?;
        let (input, version) = ProtocolVersion::parse(input)?;
        let (input, length) = be_u16(input)?;
        let (input, fragment) = take(length as usize)(input)?;

        Ok((
            input,
            TlsRecord {
                content_type,
                version,
                length,
                fragment,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.push(self.content_type.as_u8());
        self.version.serialize(output);
        output.extend_from_slice(&self.length.to_be_bytes());
        output.extend_from_slice(self.fragment);
    }
}

/// Handshake message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    ClientHello,
    ServerHello,
    KeyExchange,
    Finished,
    Unknown(u8),
}

impl MessageType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => MessageType::ClientHello,
            2 => MessageType::ServerHello,
            16 => MessageType::KeyExchange,
            20 => MessageType::Finished,
            _ => MessageType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            MessageType::ClientHello => 1,
            MessageType::ServerHello => 2,
            MessageType::KeyExchange => 16,
            MessageType::Finished => 20,
            MessageType::Unknown(value) => *value,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::ClientHello => write!(f, "ClientHello"),
            MessageType::ServerHello => write!(f, "ServerHello"),
            MessageType::KeyExchange => write!(f, "KeyExchange"),
            MessageType::Finished => write!(f, "Finished"),
            MessageType::Unknown(v) => write!(f, "Unknown({})", v),
        }
    }
}

/// Header of a handshake message: msg_type(1) + u24 length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeHeader {
    pub msg_type: MessageType,
    pub length: u32,
}

impl HandshakeHeader {
    pub fn parse(input: &[u8]) -> IResult<&[u8], HandshakeHeader> {
        let (input, msg_type) = be_u8(input)?;
        let (input, length) = be_u24(input)?;
        Ok((
            input,
            HandshakeHeader {
                msg_type: MessageType::from_u8(msg_type),
                length,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.push(self.msg_type.as_u8());
        output.extend_from_slice(&self.length.to_be_bytes()[1..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &[u8] = &[
        0x16, // ContentType::Handshake
        0x03, 0x03, // ProtocolVersion::TLS1_2
        0x00, 0x08, // length
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, // fragment
    ];

    #[test]
    fn record_roundtrip() {
        let record = TlsRecord {
            content_type: ContentType::Handshake,
            version: ProtocolVersion::TLS1_2,
            length: 8,
            fragment: &RECORD[5..],
        };

        let mut serialized = Buf::new();
        record.serialize(&mut serialized);
        assert_eq!(&*serialized, RECORD);

        let (rest, parsed) = TlsRecord::parse(&serialized).unwrap();
        assert_eq!(parsed, record);
        assert!(rest.is_empty());
    }

    #[test]
    fn record_parse_incomplete() {
        assert!(TlsRecord::parse(&RECORD[..4]).is_err());
        assert!(TlsRecord::parse(&RECORD[..7]).is_err());
    }

    #[test]
    fn handshake_header_roundtrip() {
        let header = HandshakeHeader {
            msg_type: MessageType::KeyExchange,
            length: 0x0102,
        };

        let mut serialized = Buf::new();
        header.serialize(&mut serialized);
        assert_eq!(&*serialized, &[0x10, 0x00, 0x01, 0x02]);

        let (rest, parsed) = HandshakeHeader::parse(&serialized).unwrap();
        assert_eq!(parsed, header);
        assert!(rest.is_empty());
    }
}
