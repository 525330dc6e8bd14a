//! 5G-AKA on the network side
//!
//! Challenges are derived per attempt from the subscriber's K and OPc (or
//! OP), with the SQN supplied by the caller. Responses are checked against
//! HXRES* first and then XRES*, both in constant time.

use ngc_crypt::{kdf, milenage, MilenageError};
use subtle::ConstantTimeEq;

use crate::error::{AmfError, AmfResult};
use crate::subscriber::SubscriberRecord;

/// One outstanding authentication challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub rand: [u8; 16],
    pub autn: [u8; 16],
    pub sqn: [u8; 6],
    pub xres_star: [u8; 16],
    pub hxres_star: [u8; 16],
    pub kausf: [u8; 32],
    pub serving_network_name: String,
}

/// OPc from the record, else derived from the network OP
pub fn resolve_opc(record: &SubscriberRecord, operator_code: Option<&[u8; 16]>) -> AmfResult<[u8; 16]> {
    if let Some(opc) = record.opc {
        return Ok(opc);
    }
    let op = operator_code
        .ok_or_else(|| AmfError::InvalidKeyMaterial(format!("no OPc for {} and no operator code", record.imsi)))?;
    milenage::derive_opc(&record.permanent_key, op).map_err(key_error)
}

fn key_error(e: MilenageError) -> AmfError {
    AmfError::InvalidKeyMaterial(e.to_string())
}

/// Build a challenge for `sqn` with a fresh random RAND
pub fn generate_challenge(
    record: &SubscriberRecord,
    operator_code: Option<&[u8; 16]>,
    sqn: &[u8; 6],
    serving_network_name: &str,
) -> AmfResult<AuthChallenge> {
    challenge_with_rand(record, operator_code, sqn, serving_network_name, &rand::random())
}

pub fn challenge_with_rand(
    record: &SubscriberRecord,
    operator_code: Option<&[u8; 16]>,
    sqn: &[u8; 6],
    serving_network_name: &str,
    rand: &[u8; 16],
) -> AmfResult<AuthChallenge> {
    let opc = resolve_opc(record, operator_code)?;
    let vector = milenage::generate(&opc, &record.permanent_key, sqn, &record.authentication_amf, rand);

    let mut sqn_xor_ak = [0u8; 6];
    for (i, b) in sqn_xor_ak.iter_mut().enumerate() {
        *b = sqn[i] ^ vector.ak[i];
    }
    let kausf = kdf::kausf(&vector.ck, &vector.ik, serving_network_name, &sqn_xor_ak)?;
    let xres_star = kdf::xres_star(&vector.ck, &vector.ik, serving_network_name, rand, &vector.xres)?;
    let hxres_star = kdf::hxres_star(rand, &xres_star);

    Ok(AuthChallenge {
        rand: vector.rand,
        autn: vector.autn,
        sqn: *sqn,
        xres_star,
        hxres_star,
        kausf,
        serving_network_name: serving_network_name.to_string(),
    })
}

/// Check RES* from the UE
pub fn verify_response(challenge: &AuthChallenge, res_star: &[u8; 16]) -> AmfResult<()> {
    let hres_star = kdf::hxres_star(&challenge.rand, res_star);
    let hash_ok = hres_star[..].ct_eq(&challenge.hxres_star[..]);
    let value_ok = res_star[..].ct_eq(&challenge.xres_star[..]);
    if bool::from(hash_ok & value_ok) {
        Ok(())
    } else {
        Err(AmfError::AuthenticationFailed)
    }
}

/// KAMF for an authenticated challenge
pub fn derive_kamf(challenge: &AuthChallenge, supi: &str, abba: &[u8]) -> AmfResult<[u8; 32]> {
    let kseaf = kdf::kseaf(&challenge.kausf, &challenge.serving_network_name)?;
    Ok(kdf::kamf(&kseaf, supi, abba)?)
}

/// Recover SQN_MS from an AUTS. A MAC-S mismatch means the UE cannot be
/// authenticated at all.
pub fn resynchronise(
    record: &SubscriberRecord,
    operator_code: Option<&[u8; 16]>,
    rand: &[u8; 16],
    auts: &[u8; 14],
) -> AmfResult<[u8; 6]> {
    let opc = resolve_opc(record, operator_code)?;
    milenage::resync_sqn(&opc, &record.permanent_key, rand, auts).map_err(|e| match e {
        MilenageError::MacMismatch => AmfError::AuthenticationFailed,
        other => key_error(other),
    })
}
