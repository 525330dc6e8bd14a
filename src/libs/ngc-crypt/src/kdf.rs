//! Key Derivation Functions
//!
//! The 5G key hierarchy of 3GPP TS 33.501 Annex A on top of the generic
//! KDF of TS 33.220 Annex B.2: `HMAC-SHA-256(Key, FC || P0 || L0 || ...)`.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::{CryptError, CryptResult};

pub const KEY_LEN: usize = 16;
pub const SHA256_DIGEST_SIZE: usize = 32;

const FC_FOR_ALGORITHM_KEY_DERIVATION: u8 = 0x69;
const FC_FOR_KAUSF_DERIVATION: u8 = 0x6A;
const FC_FOR_RES_STAR_XRES_STAR_DERIVATION: u8 = 0x6B;
const FC_FOR_KSEAF_DERIVATION: u8 = 0x6C;
const FC_FOR_KAMF_DERIVATION: u8 = 0x6D;
const FC_FOR_KGNB_KN3IWF_DERIVATION: u8 = 0x6E;
const FC_FOR_NH_GNB_DERIVATION: u8 = 0x6F;

/// Algorithm type distinguishers (TS 33.501 Table A.8-1)
pub const ALG_TYPE_NAS_ENC: u8 = 0x01;
pub const ALG_TYPE_NAS_INT: u8 = 0x02;

/// Access type distinguisher for 3GPP access (TS 33.501 Table A.9-1)
pub const ACCESS_TYPE_3GPP: u8 = 0x01;

type HmacSha256 = Hmac<Sha256>;

/// Generic KDF, TS 33.220 Annex B.2.0
fn kdf(key: &[u8], fc: u8, params: &[&[u8]]) -> CryptResult<[u8; SHA256_DIGEST_SIZE]> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| CryptError::InvalidKeyLength(key.len()))?;
    mac.update(&[fc]);
    for p in params {
        mac.update(p);
        mac.update(&(p.len() as u16).to_be_bytes());
    }
    let mut out = [0u8; SHA256_DIGEST_SIZE];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn ck_ik(ck: &[u8; KEY_LEN], ik: &[u8; KEY_LEN]) -> [u8; 2 * KEY_LEN] {
    let mut key = [0u8; 2 * KEY_LEN];
    key[..KEY_LEN].copy_from_slice(ck);
    key[KEY_LEN..].copy_from_slice(ik);
    key
}

fn low_half(v: &[u8; SHA256_DIGEST_SIZE]) -> [u8; KEY_LEN] {
    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(&v[KEY_LEN..]);
    out
}

/// Serving network name, TS 24.501 Section 9.12.1:
/// `5G:mnc<MNC>.mcc<MCC>.3gppnetwork.org` with a three-digit MNC
pub fn serving_network_name(mcc: &str, mnc: &str) -> String {
    format!("5G:mnc{:0>3}.mcc{}.3gppnetwork.org", mnc, mcc)
}

/// Annex A.2: KAUSF from CK, IK, serving network name and SQN xor AK
pub fn kausf(
    ck: &[u8; KEY_LEN],
    ik: &[u8; KEY_LEN],
    serving_network_name: &str,
    sqn_xor_ak: &[u8; 6],
) -> CryptResult<[u8; SHA256_DIGEST_SIZE]> {
    kdf(
        &ck_ik(ck, ik),
        FC_FOR_KAUSF_DERIVATION,
        &[serving_network_name.as_bytes(), sqn_xor_ak],
    )
}

/// Annex A.4: RES* / XRES*, the 128 least significant bits of the KDF output
pub fn xres_star(
    ck: &[u8; KEY_LEN],
    ik: &[u8; KEY_LEN],
    serving_network_name: &str,
    rand: &[u8; 16],
    res: &[u8],
) -> CryptResult<[u8; KEY_LEN]> {
    let out = kdf(
        &ck_ik(ck, ik),
        FC_FOR_RES_STAR_XRES_STAR_DERIVATION,
        &[serving_network_name.as_bytes(), rand, res],
    )?;
    Ok(low_half(&out))
}

/// Annex A.5: HXRES* = lower 128 bits of SHA-256(RAND || XRES*)
pub fn hxres_star(rand: &[u8; 16], xres_star: &[u8; KEY_LEN]) -> [u8; KEY_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(rand);
    hasher.update(xres_star);
    let mut digest = [0u8; SHA256_DIGEST_SIZE];
    digest.copy_from_slice(&hasher.finalize());
    low_half(&digest)
}

/// Annex A.6: KSEAF from KAUSF
pub fn kseaf(kausf: &[u8; SHA256_DIGEST_SIZE], serving_network_name: &str) -> CryptResult<[u8; SHA256_DIGEST_SIZE]> {
    kdf(kausf, FC_FOR_KSEAF_DERIVATION, &[serving_network_name.as_bytes()])
}

/// Annex A.7: KAMF from KSEAF, SUPI and ABBA.
///
/// `supi` may carry its type prefix (`imsi-`); only the value is used.
pub fn kamf(kseaf: &[u8; SHA256_DIGEST_SIZE], supi: &str, abba: &[u8]) -> CryptResult<[u8; SHA256_DIGEST_SIZE]> {
    let value = supi.split_once('-').map_or(supi, |(_, v)| v);
    kdf(kseaf, FC_FOR_KAMF_DERIVATION, &[value.as_bytes(), abba])
}

/// Annex A.8: KNASint / KNASenc from KAMF
pub fn nas_key(
    kamf: &[u8; SHA256_DIGEST_SIZE],
    algorithm_type: u8,
    algorithm_id: u8,
) -> CryptResult<[u8; KEY_LEN]> {
    let out = kdf(kamf, FC_FOR_ALGORITHM_KEY_DERIVATION, &[&[algorithm_type], &[algorithm_id]])?;
    Ok(low_half(&out))
}

/// Annex A.9: KgNB from KAMF and the uplink NAS COUNT
pub fn kgnb(kamf: &[u8; SHA256_DIGEST_SIZE], ul_count: u32, access_type: u8) -> CryptResult<[u8; SHA256_DIGEST_SIZE]> {
    kdf(
        kamf,
        FC_FOR_KGNB_KN3IWF_DERIVATION,
        &[&ul_count.to_be_bytes(), &[access_type]],
    )
}

/// Annex A.10: NH from KAMF and the SYNC-input (KgNB or the previous NH)
pub fn nh(kamf: &[u8; SHA256_DIGEST_SIZE], sync_input: &[u8; SHA256_DIGEST_SIZE]) -> CryptResult<[u8; SHA256_DIGEST_SIZE]> {
    kdf(kamf, FC_FOR_NH_GNB_DERIVATION, &[sync_input])
}
