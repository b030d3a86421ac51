//! ClientHello and ServerHello bodies.
//!
//! Cipher names travel as length-prefixed ASCII strings. Everything a full
//! TLS hello would additionally carry (session id, extensions) is out of
//! scope here.

use nom::bytes::complete::take;
use nom::number::complete::be_u8;
use nom::IResult;

use crate::buffer::Buf;

/// Random length in both hello messages.
pub const RANDOM_LEN: usize = 32;

fn parse_name(input: &[u8]) -> IResult<&[u8], String> {
    let (input, len) = be_u8(input)?;
    let (input, raw) = take(len as usize)(input)?;
    let name = std::str::from_utf8(raw)
        .map_err(|_| nom::Err::Error(nom::error::make_error(input, nom::error::ErrorKind::Char)))?;
    Ok((input, name.to_string()))
}

fn serialize_name(name: &str, output: &mut Buf) {
    debug_assert!(name.len() <= u8::MAX as usize);
    output.push(name.len() as u8);
    output.extend_from_slice(name.as_bytes());
}

/// ClientHello: random(32) + count(1) + offered cipher names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub random: [u8; RANDOM_LEN],
    pub cipher_names: Vec<String>,
}

impl ClientHello {
    pub fn parse(input: &[u8]) -> IResult<&[u8], ClientHello> {
        let (input, raw_random) = take(RANDOM_LEN)(input)?;
        let (mut input, count) = be_u8(input)?;

        let mut cipher_names = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (rest, name) = parse_name(input)?;
            cipher_names.push(name);
            input = rest;
        }

        let mut random = [0u8; RANDOM_LEN];
        random.copy_from_slice(raw_random);

        Ok((
            input,
            ClientHello {
                random,
                cipher_names,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&self.random);
        output.push(self.cipher_names.len() as u8);
        for name in &self.cipher_names {
            serialize_name(name, output);
        }
    }
}

/// ServerHello: random(32) + the single chosen cipher name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub random: [u8; RANDOM_LEN],
    pub cipher_name: String,
}

impl ServerHello {
    pub fn parse(input: &[u8]) -> IResult<&[u8], ServerHello> {
        let (input, raw_random) = take(RANDOM_LEN)(input)?;
        let (input, cipher_name) = parse_name(input)?;

        let mut random = [0u8; RANDOM_LEN];
        random.copy_from_slice(raw_random);

        Ok((
            input,
            ServerHello {
                random,
                cipher_name,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&self.random);
        serialize_name(&self.cipher_name, output);
    }
}
