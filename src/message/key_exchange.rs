//! KeyExchange body: a length-prefixed opaque pre-master blob.
//!
//! The asymmetric math that would normally protect this blob is an external
//! collaborator; the engine only transports the bytes.

use nom::bytes::complete::take;
use nom::number::complete::be_u16;
use nom::IResult;

use crate::buffer::Buf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyExchange {
    pub pre_master: Vec<u8>,
}

impl KeyExchange {
    pub fn parse(input: &[u8]) -> IResult<&[u8], KeyExchange> {
        let (input, len) = be_u16(input)?;
        let (input, blob) = take(len as usize)(input)?;
        Ok((
            input,
            KeyExchange {
                pre_master: blob.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        debug_assert!(self.pre_master.len() <= u16::MAX as usize);
        output.extend_from_slice(&(self.pre_master.len() as u16).to_be_bytes());
        output.extend_from_slice(&self.pre_master);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let ke = KeyExchange {
            pre_master: vec![0xAB; 48],
        };

        let mut serialized = Buf::new();
        ke.serialize(&mut serialized);
        assert_eq!(serialized.len(), 2 + 48);

        let (rest, parsed) = KeyExchange::parse(&serialized).unwrap();
        assert_eq!(parsed, ke);
        assert!(rest.is_empty());
    }

    #[test]
    fn truncated_blob_fails() {
        let mut serialized = Buf::new();
        serialized.extend_from_slice(&48u16.to_be_bytes());
        serialized.extend_from_slice(&[0u8; 20]);

        assert!(KeyExchange::parse(&serialized).is_err());
    }
}
