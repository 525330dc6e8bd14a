//! NAS security (TS 33.501 Section 6.4, TS 24.501 Section 4.4)
//!
//! Keys, NAS COUNTs and the protect/unprotect operations for 5GMM
//! messages. The free functions are direction-agnostic so both ends of a
//! NAS connection can use them; [`NasSecurityContext`] is the AMF's view.

use bytes::{Bytes, BytesMut};
use ngc_crypt::{kdf, nas_alg, CryptError};
use ngc_nas::common::types::{SecurityAlgorithms, SecurityHeaderType};
use ngc_nas::fiveg::{parse_5gmm_message, peek_header, FiveGmmMessage, FiveGmmMessageType, SecuredNasMessage};

use crate::error::{AmfError, AmfResult};

// ============================================================================
// Keys and counts
// ============================================================================

/// KNASint/KNASenc for the selected algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NasKeys {
    pub algorithms: SecurityAlgorithms,
    pub knas_int: [u8; 16],
    pub knas_enc: [u8; 16],
}

impl NasKeys {
    pub fn derive(kamf: &[u8; 32], algorithms: SecurityAlgorithms) -> AmfResult<Self> {
        Ok(Self {
            algorithms,
            knas_int: kdf::nas_key(kamf, kdf::ALG_TYPE_NAS_INT, algorithms.integrity)?,
            knas_enc: kdf::nas_key(kamf, kdf::ALG_TYPE_NAS_ENC, algorithms.ciphering)?,
        })
    }
}

/// NAS COUNT: 16-bit overflow counter and 8-bit sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NasCount {
    overflow: u16,
    sqn: u8,
}

impl NasCount {
    pub fn new(overflow: u16, sqn: u8) -> Self {
        Self { overflow, sqn }
    }

    pub fn value(&self) -> u32 {
        (u32::from(self.overflow) << 8) | u32::from(self.sqn)
    }

    pub fn sqn(&self) -> u8 {
        self.sqn
    }

    pub fn next(&self) -> Self {
        match self.sqn.checked_add(1) {
            Some(sqn) => Self { overflow: self.overflow, sqn },
            None => Self { overflow: self.overflow.wrapping_add(1), sqn: 0 },
        }
    }

    /// Full COUNT for a received sequence number, `self` being the next
    /// expected count. A sequence number below the expected one means the
    /// sender wrapped.
    pub fn estimate(&self, received_sqn: u8) -> Self {
        if received_sqn < self.sqn {
            Self { overflow: self.overflow.wrapping_add(1), sqn: received_sqn }
        } else {
            Self { overflow: self.overflow, sqn: received_sqn }
        }
    }
}

// ============================================================================
// Protection primitives
// ============================================================================

fn compute_mac(keys: &NasKeys, count: u32, direction: u8, input: &[u8]) -> AmfResult<[u8; 4]> {
    match keys.algorithms.integrity {
        SecurityAlgorithms::NIA0 => Ok([0; 4]),
        SecurityAlgorithms::NIA2 => {
            Ok(nas_alg::nia2(&keys.knas_int, count, nas_alg::NAS_BEARER_3GPP, direction, input))
        }
        id => Err(CryptError::UnsupportedAlgorithm { kind: "integrity", id }.into()),
    }
}

fn apply_cipher(keys: &NasKeys, count: u32, direction: u8, data: &mut [u8]) -> AmfResult<()> {
    match keys.algorithms.ciphering {
        SecurityAlgorithms::NEA0 => Ok(()),
        SecurityAlgorithms::NEA2 => {
            nas_alg::nea2(&keys.knas_enc, count, nas_alg::NAS_BEARER_3GPP, direction, data);
            Ok(())
        }
        id => Err(CryptError::UnsupportedAlgorithm { kind: "ciphering", id }.into()),
    }
}

/// Wrap a plain 5GMM message in a security protected header
pub fn protect(
    keys: &NasKeys,
    count: NasCount,
    direction: u8,
    header: SecurityHeaderType,
    plain: &[u8],
) -> AmfResult<Vec<u8>> {
    let mut payload = plain.to_vec();
    if header.is_ciphered() {
        apply_cipher(keys, count.value(), direction, &mut payload)?;
    }
    let mut msg = SecuredNasMessage {
        security_header_type: header,
        message_authentication_code: [0; 4],
        sequence_number: count.sqn(),
        payload: Bytes::from(payload),
    };
    msg.message_authentication_code = compute_mac(keys, count.value(), direction, &msg.mac_input())?;

    let mut buf = BytesMut::with_capacity(msg.payload.len() + ngc_nas::fiveg::FIVEG_NAS_SECURITY_HEADER_LEN);
    msg.encode(&mut buf);
    Ok(buf.to_vec())
}

/// Verify and decipher; returns the inner plain message. NIA0 carries no
/// MAC to check.
pub fn unprotect(keys: &NasKeys, count: u32, direction: u8, msg: &SecuredNasMessage) -> AmfResult<Bytes> {
    if keys.algorithms.integrity != SecurityAlgorithms::NIA0 {
        let expected = compute_mac(keys, count, direction, &msg.mac_input())?;
        if expected != msg.message_authentication_code {
            return Err(AmfError::IntegrityCheckFailed { count });
        }
    }
    if msg.security_header_type.is_ciphered() {
        let mut payload = msg.payload.to_vec();
        apply_cipher(keys, count, direction, &mut payload)?;
        Ok(Bytes::from(payload))
    } else {
        Ok(msg.payload.clone())
    }
}

/// 5GMM messages a UE may send without NAS security (TS 24.501 Section 4.4.4.3)
pub fn plain_allowed(message_type: FiveGmmMessageType) -> bool {
    matches!(
        message_type,
        FiveGmmMessageType::RegistrationRequest
            | FiveGmmMessageType::IdentityResponse
            | FiveGmmMessageType::AuthenticationResponse
            | FiveGmmMessageType::AuthenticationFailure
            | FiveGmmMessageType::SecurityModeReject
            | FiveGmmMessageType::DeregistrationRequestFromUe
            | FiveGmmMessageType::DeregistrationAcceptToUe
            | FiveGmmMessageType::FiveGmmStatus
    )
}

// ============================================================================
// AMF security context
// ============================================================================

/// Current 5G NAS security context of a UE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NasSecurityContext {
    pub kamf: [u8; 32],
    pub ngksi: u8,
    pub keys: NasKeys,
    /// Next downlink count to use
    pub dl_count: NasCount,
    /// Next uplink count expected
    pub ul_count: NasCount,
    /// Count of the last uplink message that verified
    pub last_ul_count: u32,
}

impl NasSecurityContext {
    pub fn new(kamf: [u8; 32], ngksi: u8, algorithms: SecurityAlgorithms) -> AmfResult<Self> {
        Ok(Self {
            kamf,
            ngksi,
            keys: NasKeys::derive(&kamf, algorithms)?,
            dl_count: NasCount::default(),
            ul_count: NasCount::default(),
            last_ul_count: 0,
        })
    }

    pub fn protect_downlink(&mut self, header: SecurityHeaderType, plain: &[u8]) -> AmfResult<Vec<u8>> {
        let out = protect(&self.keys, self.dl_count, nas_alg::DIRECTION_DOWNLINK, header, plain)?;
        self.dl_count = self.dl_count.next();
        Ok(out)
    }

    /// Counts only move forward when the MAC verifies
    pub fn unprotect_uplink(&mut self, msg: &SecuredNasMessage) -> AmfResult<Bytes> {
        let count = self.ul_count.estimate(msg.sequence_number);
        let plain = unprotect(&self.keys, count.value(), nas_alg::DIRECTION_UPLINK, msg)?;
        self.last_ul_count = count.value();
        self.ul_count = count.next();
        Ok(plain)
    }
}

/// Decode an uplink 5GMM message, enforcing NAS security.
///
/// Returns the message and whether it arrived integrity protected.
pub fn decode_uplink(security: Option<&mut NasSecurityContext>, raw: &[u8]) -> AmfResult<(FiveGmmMessage, bool)> {
    let (_, header) = peek_header(raw)?;
    if header == SecurityHeaderType::PlainNas {
        let msg = parse_5gmm_message(&mut Bytes::copy_from_slice(raw))?;
        if security.is_some() && !plain_allowed(msg.message_type()) {
            return Err(AmfError::InvalidState {
                message: format!("unprotected {:?}", msg.message_type()),
                state: "NAS security active",
            });
        }
        return Ok((msg, false));
    }

    let secured = SecuredNasMessage::decode(&mut Bytes::copy_from_slice(raw))?;
    match security {
        Some(context) => {
            let mut plain = context.unprotect_uplink(&secured)?;
            Ok((parse_5gmm_message(&mut plain)?, true))
        }
        // No context to verify with: only a cleartext-readable initial
        // message can be acted on, and it is treated as unprotected.
        None if !header.is_ciphered() => {
            let msg = parse_5gmm_message(&mut secured.payload.clone())?;
            match msg.message_type() {
                FiveGmmMessageType::RegistrationRequest | FiveGmmMessageType::DeregistrationRequestFromUe => {
                    Ok((msg, false))
                }
                other => Err(AmfError::InvalidState {
                    message: format!("protected {:?}", other),
                    state: "no NAS security context",
                }),
            }
        }
        None => Err(AmfError::InvalidState {
            message: "ciphered NAS message".into(),
            state: "no NAS security context",
        }),
    }
}

/// NAS message of an Initial UE Message. The security context it was
/// protected with is only known once the UE identity in it is resolved.
#[derive(Debug, Clone)]
pub struct InitialNas {
    pub message: FiveGmmMessage,
    secured: Option<SecuredNasMessage>,
}

impl InitialNas {
    /// Whether the message verifies under `security`. Advances the uplink
    /// count when it does.
    pub fn verify(&self, security: &mut NasSecurityContext) -> bool {
        match &self.secured {
            Some(secured) => security.unprotect_uplink(secured).is_ok(),
            None => false,
        }
    }

    pub fn is_protected(&self) -> bool {
        self.secured.is_some()
    }
}

/// 5GMM messages a UE sends integrity protected but not ciphered in an
/// Initial UE Message (TS 24.501 Section 4.4.6)
fn initial_message_allowed(message_type: FiveGmmMessageType) -> bool {
    matches!(
        message_type,
        FiveGmmMessageType::RegistrationRequest
            | FiveGmmMessageType::DeregistrationRequestFromUe
            | FiveGmmMessageType::ServiceRequest
    )
}

/// Decode the NAS PDU of an Initial UE Message, keeping the protected
/// form for [`InitialNas::verify`]
pub fn decode_initial(raw: &[u8]) -> AmfResult<InitialNas> {
    let (_, header) = peek_header(raw)?;
    if header == SecurityHeaderType::PlainNas {
        let message = parse_5gmm_message(&mut Bytes::copy_from_slice(raw))?;
        return Ok(InitialNas { message, secured: None });
    }
    if header.is_ciphered() {
        return Err(AmfError::InvalidState {
            message: "ciphered NAS message".into(),
            state: "no NAS security context",
        });
    }
    let secured = SecuredNasMessage::decode(&mut Bytes::copy_from_slice(raw))?;
    let message = parse_5gmm_message(&mut secured.payload.clone())?;
    if !initial_message_allowed(message.message_type()) {
        return Err(AmfError::InvalidState {
            message: format!("protected {:?}", message.message_type()),
            state: "no NAS security context",
        });
    }
    Ok(InitialNas { message, secured: Some(secured) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ngc_nas::common::types::KeySetIdentifier;
    use ngc_nas::fiveg::{build_5gmm_message, FiveGSTmsi, MobileIdentity, RegistrationRequest, ServiceRequest, ServiceType};

    const KAMF: [u8; 32] = [0x5a; 32];

    fn context(ciphering: u8, integrity: u8) -> NasSecurityContext {
        NasSecurityContext::new(KAMF, 0, SecurityAlgorithms::new(ciphering, integrity)).unwrap()
    }

    fn uplink(keys: &NasKeys, count: NasCount, header: SecurityHeaderType, msg: &FiveGmmMessage) -> Vec<u8> {
        let plain = build_5gmm_message(msg).unwrap();
        protect(keys, count, nas_alg::DIRECTION_UPLINK, header, &plain).unwrap()
    }

    #[test]
    fn test_count_estimate_and_wrap() {
        let count = NasCount::new(0, 255);
        assert_eq!(count.next(), NasCount::new(1, 0));
        assert_eq!(count.next().value(), 0x100);

        let expected = NasCount::new(0, 10);
        assert_eq!(expected.estimate(12), NasCount::new(0, 12));
        assert_eq!(expected.estimate(3), NasCount::new(1, 3));
    }

    #[test]
    fn test_uplink_roundtrip_with_ciphering() {
        let mut amf = context(SecurityAlgorithms::NEA2, SecurityAlgorithms::NIA2);
        let ue_keys = NasKeys::derive(&KAMF, SecurityAlgorithms::new(2, 2)).unwrap();

        let raw = uplink(
            &ue_keys,
            NasCount::default(),
            SecurityHeaderType::IntegrityProtectedAndCiphered,
            &FiveGmmMessage::RegistrationComplete,
        );
        let (msg, protected) = decode_uplink(Some(&mut amf), &raw).unwrap();
        assert_eq!(msg, FiveGmmMessage::RegistrationComplete);
        assert!(protected);
        assert_eq!(amf.ul_count, NasCount::new(0, 1));
    }

    #[test]
    fn test_tampered_mac_is_rejected_without_advancing() {
        let mut amf = context(SecurityAlgorithms::NEA0, SecurityAlgorithms::NIA2);
        let mut raw = uplink(
            &amf.keys,
            NasCount::default(),
            SecurityHeaderType::IntegrityProtected,
            &FiveGmmMessage::RegistrationComplete,
        );
        raw[2] ^= 0x01;
        assert!(matches!(decode_uplink(Some(&mut amf), &raw), Err(AmfError::IntegrityCheckFailed { .. })));
        assert_eq!(amf.ul_count, NasCount::default());
    }

    #[test]
    fn test_replayed_message_fails() {
        let mut amf = context(SecurityAlgorithms::NEA0, SecurityAlgorithms::NIA2);
        let raw = uplink(
            &amf.keys,
            NasCount::default(),
            SecurityHeaderType::IntegrityProtected,
            &FiveGmmMessage::RegistrationComplete,
        );
        decode_uplink(Some(&mut amf), &raw).unwrap();
        assert!(decode_uplink(Some(&mut amf), &raw).is_err());
    }

    #[test]
    fn test_nia0_skips_mac() {
        let mut amf = context(SecurityAlgorithms::NEA0, SecurityAlgorithms::NIA0);
        let raw = uplink(
            &amf.keys,
            NasCount::default(),
            SecurityHeaderType::IntegrityProtected,
            &FiveGmmMessage::RegistrationComplete,
        );
        assert_eq!(&raw[2..6], &[0, 0, 0, 0]);
        assert!(decode_uplink(Some(&mut amf), &raw).is_ok());
    }

    #[test]
    fn test_downlink_counts_advance() {
        let mut amf = context(SecurityAlgorithms::NEA2, SecurityAlgorithms::NIA2);
        let plain = build_5gmm_message(&FiveGmmMessage::AuthenticationReject).unwrap();
        let first = amf.protect_downlink(SecurityHeaderType::IntegrityProtectedAndCiphered, &plain).unwrap();
        let second = amf.protect_downlink(SecurityHeaderType::IntegrityProtectedAndCiphered, &plain).unwrap();
        assert_eq!(first[6], 0);
        assert_eq!(second[6], 1);

        let secured = SecuredNasMessage::decode(&mut Bytes::from(second)).unwrap();
        let inner = unprotect(&amf.keys, 1, nas_alg::DIRECTION_DOWNLINK, &secured).unwrap();
        assert_eq!(inner, plain);
    }

    #[test]
    fn test_plain_message_policy() {
        let mut amf = context(SecurityAlgorithms::NEA0, SecurityAlgorithms::NIA2);
        let plain = build_5gmm_message(&FiveGmmMessage::RegistrationComplete).unwrap();
        assert!(decode_uplink(None, &plain).is_ok());
        assert!(matches!(decode_uplink(Some(&mut amf), &plain), Err(AmfError::InvalidState { .. })));

        let request = build_5gmm_message(&FiveGmmMessage::RegistrationRequest(RegistrationRequest::default())).unwrap();
        assert!(decode_uplink(Some(&mut amf), &request).is_ok());
    }

    fn service_request() -> FiveGmmMessage {
        FiveGmmMessage::ServiceRequest(ServiceRequest {
            ngksi: KeySetIdentifier::new(0, 0),
            service_type: ServiceType::Signalling,
            s_tmsi: MobileIdentity::FiveGSTmsi(FiveGSTmsi { amf_set_id: 1, amf_pointer: 0, tmsi: 0x1234 }),
            uplink_data_status: None,
            pdu_session_status: Some(0b10),
            allowed_pdu_session_status: None,
            nas_message_container: None,
        })
    }

    #[test]
    fn test_initial_service_request_verifies_under_its_context() {
        let mut amf = context(SecurityAlgorithms::NEA0, SecurityAlgorithms::NIA2);
        amf.ul_count = NasCount::new(0, 4);
        let raw = uplink(&amf.keys, NasCount::new(0, 4), SecurityHeaderType::IntegrityProtected, &service_request());

        let initial = decode_initial(&raw).unwrap();
        assert_eq!(initial.message, service_request());
        assert!(initial.is_protected());
        assert!(initial.verify(&mut amf));
        assert_eq!(amf.last_ul_count, 4);
        assert_eq!(amf.ul_count, NasCount::new(0, 5));
    }

    #[test]
    fn test_initial_message_under_foreign_keys_fails_verification() {
        let mut amf = context(SecurityAlgorithms::NEA0, SecurityAlgorithms::NIA2);
        let other = NasKeys::derive(&[0x11; 32], SecurityAlgorithms::new(0, 2)).unwrap();
        let raw = uplink(&other, NasCount::default(), SecurityHeaderType::IntegrityProtected, &service_request());

        let initial = decode_initial(&raw).unwrap();
        assert!(!initial.verify(&mut amf));
        assert_eq!(amf.ul_count, NasCount::default());
    }

    #[test]
    fn test_initial_message_policy() {
        let amf = context(SecurityAlgorithms::NEA2, SecurityAlgorithms::NIA2);
        let ciphered =
            uplink(&amf.keys, NasCount::default(), SecurityHeaderType::IntegrityProtectedAndCiphered, &service_request());
        assert!(decode_initial(&ciphered).is_err());

        let complete =
            uplink(&amf.keys, NasCount::default(), SecurityHeaderType::IntegrityProtected, &FiveGmmMessage::RegistrationComplete);
        assert!(decode_initial(&complete).is_err());

        // A plain Service Request decodes but never verifies
        let plain = build_5gmm_message(&service_request()).unwrap();
        let initial = decode_initial(&plain).unwrap();
        assert!(!initial.is_protected());
        assert!(!initial.verify(&mut amf.clone()));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn advance(count: NasCount, by: u32) -> NasCount {
            let value = count.value() + by;
            NasCount::new((value >> 8) as u16, value as u8)
        }

        fn header(ciphered: bool) -> SecurityHeaderType {
            if ciphered {
                SecurityHeaderType::IntegrityProtectedAndCiphered
            } else {
                SecurityHeaderType::IntegrityProtected
            }
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn prop_estimate_recovers_count_within_window(overflow in 0u16..u16::MAX, sqn in any::<u8>(), ahead in 0u32..256) {
                let expected = NasCount::new(overflow, sqn);
                let sent = advance(expected, ahead);
                prop_assert_eq!(expected.estimate(sent.sqn()), sent);
            }

            #[test]
            fn prop_uplink_accepted_once_at_its_count(
                overflow in 0u16..1024,
                sqn in any::<u8>(),
                ahead in 0u32..256,
                ciphered in any::<bool>(),
            ) {
                let mut amf = context(SecurityAlgorithms::NEA2, SecurityAlgorithms::NIA2);
                amf.ul_count = NasCount::new(overflow, sqn);
                let sent = advance(amf.ul_count, ahead);
                let raw = uplink(&amf.keys, sent, header(ciphered), &FiveGmmMessage::RegistrationComplete);

                let (msg, protected) = decode_uplink(Some(&mut amf), &raw).unwrap();
                prop_assert_eq!(msg, FiveGmmMessage::RegistrationComplete);
                prop_assert!(protected);
                prop_assert_eq!(amf.last_ul_count, sent.value());
                prop_assert_eq!(amf.ul_count, sent.next());

                // Replays land on a later COUNT and fail the MAC
                prop_assert!(decode_uplink(Some(&mut amf), &raw).is_err());
                prop_assert_eq!(amf.ul_count, sent.next());
            }

            #[test]
            fn prop_any_flipped_bit_fails_verification(
                position in any::<prop::sample::Index>(),
                bit in 0u8..8,
                ciphered in any::<bool>(),
            ) {
                let mut amf = context(SecurityAlgorithms::NEA2, SecurityAlgorithms::NIA2);
                let mut raw = uplink(&amf.keys, NasCount::default(), header(ciphered), &FiveGmmMessage::RegistrationComplete);
                // MAC, sequence number and payload; the first two octets select the header
                let at = 2 + position.index(raw.len() - 2);
                raw[at] ^= 1 << bit;
                prop_assert!(decode_uplink(Some(&mut amf), &raw).is_err());
                prop_assert_eq!(amf.ul_count, NasCount::default());
            }
        }
    }
}
