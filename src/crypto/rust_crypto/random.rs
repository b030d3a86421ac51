//! Secure random implementation backed by the operating system RNG.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::crypto::provider::SecureRandom;

#[derive(Debug)]
pub(crate) struct SystemRandom;

impl SecureRandom for SystemRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<(), String> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| format!("OS RNG failure: {}", e))
    }
}
