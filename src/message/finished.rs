//! Finished body: 32 bytes of verify data over the handshake transcript.

use nom::bytes::complete::take;
use nom::IResult;

use crate::buffer::Buf;

/// Length of the verify data (HMAC-SHA256 output).
pub const VERIFY_DATA_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    pub verify_data: [u8; VERIFY_DATA_LEN],
}

impl Finished {
    pub fn parse(input: &[u8]) -> IResult<&[u8], Finished> {
        let (input, raw) = take(VERIFY_DATA_LEN)(input)?;
        let mut verify_data = [0u8; VERIFY_DATA_LEN];
        verify_data.copy_from_slice(raw);
        Ok((input, Finished { verify_data }))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.extend_from_slice(&self.verify_data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let finished = Finished {
            verify_data: [0x42; VERIFY_DATA_LEN],
        };

        let mut serialized = Buf::new();
        finished.serialize(&mut serialized);

        let (rest, parsed) = Finished::parse(&serialized).unwrap();
        assert_eq!(parsed, finished);
        assert!(rest.is_empty());
    }

    #[test]
    fn short_input_fails() {
        assert!(Finished::parse(&[0u8; 16]).is_err());
    }
}
