//! 128-NIA2 and 128-NEA2 (TS 33.501 Annex D, TS 33.401 Annex B)

use crate::aes::ctr128_apply;
use crate::aes_cmac;

/// Uplink direction bit
pub const DIRECTION_UPLINK: u8 = 0;
/// Downlink direction bit
pub const DIRECTION_DOWNLINK: u8 = 1;

/// NAS bearer identity for 3GPP access
pub const NAS_BEARER_3GPP: u8 = 1;

/// MAC-I length in bytes
pub const NAS_MAC_LEN: usize = 4;

fn bearer_direction(bearer: u8, direction: u8) -> u8 {
    ((bearer & 0x1f) << 3) | ((direction & 0x01) << 2)
}

/// 128-NIA2: CMAC over `COUNT || BEARER || DIRECTION || 0^26 || MESSAGE`,
/// truncated to 32 bits
pub fn nia2(key: &[u8; 16], count: u32, bearer: u8, direction: u8, message: &[u8]) -> [u8; NAS_MAC_LEN] {
    let mut input = Vec::with_capacity(8 + message.len());
    input.extend_from_slice(&count.to_be_bytes());
    input.push(bearer_direction(bearer, direction));
    input.extend_from_slice(&[0, 0, 0]);
    input.extend_from_slice(message);

    let cmac = aes_cmac::calculate(key, &input);
    let mut mac = [0u8; NAS_MAC_LEN];
    mac.copy_from_slice(&cmac[..NAS_MAC_LEN]);
    mac
}

/// 128-NEA2: AES-CTR keyed with `COUNT || BEARER || DIRECTION || 0^26`
/// as the initial counter block, applied in place
pub fn nea2(key: &[u8; 16], count: u32, bearer: u8, direction: u8, data: &mut [u8]) {
    let mut iv = [0u8; 16];
    iv[..4].copy_from_slice(&count.to_be_bytes());
    iv[4] = bearer_direction(bearer, direction);
    ctr128_apply(key, &iv, data);
}
