//! AES-CMAC (RFC 4493) over the `cmac` crate

use ::aes::Aes128;
use cmac::{Cmac, Mac};
use subtle::ConstantTimeEq;

/// CMAC output size in bytes
pub const CMAC_SIZE: usize = 16;

/// Compute AES-CMAC of `msg` under a 128-bit key
pub fn calculate(key: &[u8; 16], msg: &[u8]) -> [u8; CMAC_SIZE] {
    let mut mac = <Cmac<Aes128> as cmac::digest::KeyInit>::new(key.into());
    mac.update(msg);
    let mut out = [0u8; CMAC_SIZE];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Constant-time check of a (possibly truncated) CMAC
pub fn verify(expected: &[u8], key: &[u8; 16], msg: &[u8]) -> bool {
    if expected.is_empty() || expected.len() > CMAC_SIZE {
        return false;
    }
    let full = calculate(key, msg);
    bool::from(full[..expected.len()].ct_eq(expected))
}
