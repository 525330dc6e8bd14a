//! 3GPP Milenage Algorithm
//!
//! Implements the Milenage functions f1, f1*, f2, f3, f4, f5 and f5* of
//! 3GPP TS 35.206, the OPc derivation, network-side authentication vector
//! generation, AUTS resynchronisation, and the UE-side AUTN check.

use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::aes::encrypt_block;

pub const KEY_LEN: usize = 16;
pub const RAND_LEN: usize = 16;
pub const AUTN_LEN: usize = 16;
pub const AUTS_LEN: usize = 14;
pub const SQN_LEN: usize = 6;
pub const AMF_LEN: usize = 2;
pub const RES_LEN: usize = 8;

/// AMF value used in AUTS computation (TS 33.102 Section 6.3.3)
const RESYNC_AMF: [u8; AMF_LEN] = [0x00, 0x00];

/// Milenage failures
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MilenageError {
    #[error("invalid key material: {field} must be 16 bytes, got {len}")]
    InvalidKeyMaterial { field: &'static str, len: usize },

    #[error("MAC-S in AUTS does not verify")]
    MacMismatch,

    #[error("SQN in AUTN is out of range")]
    SyncFailure,
}

/// Outputs of f2, f3, f4, f5 and f5*
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct F2345 {
    pub res: [u8; RES_LEN],
    pub ck: [u8; 16],
    pub ik: [u8; 16],
    pub ak: [u8; SQN_LEN],
    pub ak_star: [u8; SQN_LEN],
}

/// Network-side authentication vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthVector {
    pub rand: [u8; RAND_LEN],
    pub autn: [u8; AUTN_LEN],
    pub xres: [u8; RES_LEN],
    pub ck: [u8; 16],
    pub ik: [u8; 16],
    pub ak: [u8; SQN_LEN],
}

fn to_key(field: &'static str, v: &[u8]) -> Result<[u8; KEY_LEN], MilenageError> {
    v.try_into()
        .map_err(|_| MilenageError::InvalidKeyMaterial { field, len: v.len() })
}

fn xor16(a: &[u8; 16], b: &[u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// rot(x, r) for r a multiple of 8 bits: cyclic left shift by `bytes`
fn rotate(x: &[u8; 16], bytes: usize) -> [u8; 16] {
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = x[(i + bytes) % 16];
    }
    out
}

/// OPc = E_K(OP) xor OP
///
/// Both inputs must be exactly 16 bytes.
pub fn derive_opc(k: &[u8], op: &[u8]) -> Result<[u8; KEY_LEN], MilenageError> {
    let k = to_key("K", k)?;
    let op = to_key("OP", op)?;
    Ok(xor16(&encrypt_block(&k, &op), &op))
}

/// f1 and f1*: returns (MAC-A, MAC-S)
pub fn f1(
    opc: &[u8; 16],
    k: &[u8; 16],
    rand: &[u8; RAND_LEN],
    sqn: &[u8; SQN_LEN],
    amf: &[u8; AMF_LEN],
) -> ([u8; 8], [u8; 8]) {
    let temp = encrypt_block(k, &xor16(rand, opc));

    let mut in1 = [0u8; 16];
    in1[..6].copy_from_slice(sqn);
    in1[6..8].copy_from_slice(amf);
    in1[8..14].copy_from_slice(sqn);
    in1[14..].copy_from_slice(amf);

    // r1 = 64, c1 = 0
    let input = xor16(&temp, &rotate(&xor16(&in1, opc), 8));
    let out1 = xor16(&encrypt_block(k, &input), opc);

    let mut mac_a = [0u8; 8];
    let mut mac_s = [0u8; 8];
    mac_a.copy_from_slice(&out1[..8]);
    mac_s.copy_from_slice(&out1[8..]);
    (mac_a, mac_s)
}

/// f2, f3, f4, f5 and f5*
pub fn f2345(opc: &[u8; 16], k: &[u8; 16], rand: &[u8; RAND_LEN]) -> F2345 {
    let temp = encrypt_block(k, &xor16(rand, opc));
    let masked = xor16(&temp, opc);

    // (rotation in bytes, last octet of the constant c_i)
    let out = |rot: usize, c: u8| {
        let mut input = rotate(&masked, rot);
        input[15] ^= c;
        xor16(&encrypt_block(k, &input), opc)
    };

    let out2 = out(0, 1);
    let out3 = out(4, 2);
    let out4 = out(8, 4);
    let out5 = out(12, 8);

    let mut r = F2345 {
        res: [0; RES_LEN],
        ck: out3,
        ik: out4,
        ak: [0; SQN_LEN],
        ak_star: [0; SQN_LEN],
    };
    r.ak.copy_from_slice(&out2[..6]);
    r.res.copy_from_slice(&out2[8..]);
    r.ak_star.copy_from_slice(&out5[..6]);
    r
}

/// Build an authentication vector for the given SQN and AMF.
///
/// AUTN = (SQN xor AK) || AMF || MAC-A
pub fn generate(
    opc: &[u8; 16],
    k: &[u8; 16],
    sqn: &[u8; SQN_LEN],
    amf: &[u8; AMF_LEN],
    rand: &[u8; RAND_LEN],
) -> AuthVector {
    let (mac_a, _) = f1(opc, k, rand, sqn, amf);
    let f = f2345(opc, k, rand);

    let mut autn = [0u8; AUTN_LEN];
    for i in 0..SQN_LEN {
        autn[i] = sqn[i] ^ f.ak[i];
    }
    autn[6..8].copy_from_slice(amf);
    autn[8..].copy_from_slice(&mac_a);

    AuthVector { rand: *rand, autn, xres: f.res, ck: f.ck, ik: f.ik, ak: f.ak }
}

/// Recover SQN_MS from an AUTS and verify its MAC-S
pub fn resync_sqn(
    opc: &[u8; 16],
    k: &[u8; 16],
    rand: &[u8; RAND_LEN],
    auts: &[u8; AUTS_LEN],
) -> Result<[u8; SQN_LEN], MilenageError> {
    let f = f2345(opc, k, rand);
    let mut sqn_ms = [0u8; SQN_LEN];
    for i in 0..SQN_LEN {
        sqn_ms[i] = auts[i] ^ f.ak_star[i];
    }

    let (_, mac_s) = f1(opc, k, rand, &sqn_ms, &RESYNC_AMF);
    if bool::from(mac_s[..].ct_eq(&auts[6..])) {
        Ok(sqn_ms)
    } else {
        Err(MilenageError::MacMismatch)
    }
}

/// AUTS = (SQN_MS xor AK*) || MAC-S, as built by the USIM on synch failure
pub fn build_auts(
    opc: &[u8; 16],
    k: &[u8; 16],
    rand: &[u8; RAND_LEN],
    sqn_ms: &[u8; SQN_LEN],
) -> [u8; AUTS_LEN] {
    let f = f2345(opc, k, rand);
    let (_, mac_s) = f1(opc, k, rand, sqn_ms, &RESYNC_AMF);
    let mut auts = [0u8; AUTS_LEN];
    for i in 0..SQN_LEN {
        auts[i] = sqn_ms[i] ^ f.ak_star[i];
    }
    auts[6..].copy_from_slice(&mac_s);
    auts
}

/// USIM-side AUTN check: verifies MAC-A and that the received SQN is
/// strictly newer than `sqn_ms`. Returns (RES, CK, IK).
pub fn check_autn(
    opc: &[u8; 16],
    k: &[u8; 16],
    sqn_ms: &[u8; SQN_LEN],
    rand: &[u8; RAND_LEN],
    autn: &[u8; AUTN_LEN],
) -> Result<([u8; RES_LEN], [u8; 16], [u8; 16]), MilenageError> {
    let f = f2345(opc, k, rand);
    let mut sqn = [0u8; SQN_LEN];
    for i in 0..SQN_LEN {
        sqn[i] = autn[i] ^ f.ak[i];
    }
    let amf = [autn[6], autn[7]];
    let (mac_a, _) = f1(opc, k, rand, &sqn, &amf);
    if !bool::from(mac_a[..].ct_eq(&autn[8..])) {
        return Err(MilenageError::MacMismatch);
    }
    if sqn.as_slice() <= sqn_ms.as_slice() {
        return Err(MilenageError::SyncFailure);
    }
    Ok((f.res, f.ck, f.ik))
}

/// Increment a 48-bit SQN, wrapping at 2^48
pub fn sqn_increment(sqn: &[u8; SQN_LEN]) -> [u8; SQN_LEN] {
    let mut buf = [0u8; 8];
    buf[2..].copy_from_slice(sqn);
    let next = (u64::from_be_bytes(buf).wrapping_add(1)) & 0xffff_ffff_ffff;
    let mut out = [0u8; SQN_LEN];
    out.copy_from_slice(&next.to_be_bytes()[2..]);
    out
}
