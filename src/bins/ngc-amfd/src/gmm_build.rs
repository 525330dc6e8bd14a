//! GMM Message Building
//!
//! Plain 5GMM and 5GSM messages sent by the AMF. Security protection is
//! applied afterwards, at the send path, by the UE's NAS security context.

use ngc_nas::common::types::{
    Abba, Dnn, GprsTimer3, KeySetIdentifier, SNssai, SecurityAlgorithms, Tai, UeSecurityCapability,
};
use ngc_nas::fiveg::{
    build_5gmm_message, build_5gsm_message, AuthenticationRequest, DeRegistrationType, DeregistrationRequestToUe,
    DlNasTransport, FiveGGuti, FiveGmmCause, FiveGmmMessage, FiveGsmCause, FiveGsmMessage, IdentityRequest,
    IdentityType, Nssai, PacketFilter, PayloadContainerType, PduAddress, PduSessionEstablishmentAccept,
    PduSessionType, QosRule, QosRules, RegistrationAccept, RegistrationReject, RegistrationResult,
    SecurityModeCommand, ServiceAccept, ServiceReject, SessionAmbr, TaiList,
};

use crate::error::AmfResult;
use crate::ngap_build::DEFAULT_QFI;
use crate::subscriber::Policy;
use crate::ue::PduSession;

/// Periodic registration update timer handed out in Registration Accept
const T3512_SECONDS: u32 = 54 * 60;

/// SSC mode 1
const SSC_MODE_1: u8 = 1;

fn encode(msg: &FiveGmmMessage) -> AmfResult<Vec<u8>> {
    Ok(build_5gmm_message(msg)?.to_vec())
}

// ============================================================================
// 5GMM
// ============================================================================

pub fn build_registration_accept(guti: FiveGGuti, tai_list: &[Tai], allowed_nssai: &[SNssai]) -> AmfResult<Vec<u8>> {
    encode(&FiveGmmMessage::RegistrationAccept(RegistrationAccept {
        registration_result: RegistrationResult::three_gpp(),
        guti: Some(guti),
        tai_list: Some(TaiList(tai_list.to_vec())),
        allowed_nssai: Some(Nssai(allowed_nssai.to_vec())),
        t3512: Some(GprsTimer3::from_seconds(T3512_SECONDS)),
    }))
}

pub fn build_registration_reject(gmm_cause: FiveGmmCause) -> AmfResult<Vec<u8>> {
    encode(&FiveGmmMessage::RegistrationReject(RegistrationReject { gmm_cause }))
}

/// Service Accept reporting the PDU sessions the AMF still holds
pub fn build_service_accept(pdu_session_status: u16) -> AmfResult<Vec<u8>> {
    encode(&FiveGmmMessage::ServiceAccept(ServiceAccept {
        pdu_session_status: Some(pdu_session_status),
        pdu_session_reactivation_result: None,
    }))
}

pub fn build_service_reject(gmm_cause: FiveGmmCause) -> AmfResult<Vec<u8>> {
    encode(&FiveGmmMessage::ServiceReject(ServiceReject { gmm_cause, pdu_session_status: None }))
}

pub fn build_identity_request(identity_type: IdentityType) -> AmfResult<Vec<u8>> {
    encode(&FiveGmmMessage::IdentityRequest(IdentityRequest { identity_type }))
}

pub fn build_authentication_request(ngksi: u8, abba: &[u8], rand: [u8; 16], autn: [u8; 16]) -> AmfResult<Vec<u8>> {
    encode(&FiveGmmMessage::AuthenticationRequest(AuthenticationRequest {
        ngksi: KeySetIdentifier::new(0, ngksi),
        abba: Abba(abba.to_vec()),
        rand: Some(rand),
        autn: Some(autn),
    }))
}

pub fn build_authentication_reject() -> AmfResult<Vec<u8>> {
    encode(&FiveGmmMessage::AuthenticationReject)
}

pub fn build_security_mode_command(
    algorithms: SecurityAlgorithms,
    ngksi: u8,
    ue_security_capability: UeSecurityCapability,
    abba: &[u8],
) -> AmfResult<Vec<u8>> {
    encode(&FiveGmmMessage::SecurityModeCommand(SecurityModeCommand {
        selected_nas_security_algorithms: algorithms,
        ngksi: KeySetIdentifier::new(0, ngksi),
        replayed_ue_security_capabilities: ue_security_capability,
        imeisv_request: false,
        additional_security_information: None,
        abba: Some(Abba(abba.to_vec())),
    }))
}

/// Accept for a UE-originated de-registration
pub fn build_deregistration_accept() -> AmfResult<Vec<u8>> {
    encode(&FiveGmmMessage::DeregistrationAcceptFromUe)
}

/// Network-initiated de-registration
pub fn build_deregistration_request(re_registration_required: bool, gmm_cause: Option<FiveGmmCause>) -> AmfResult<Vec<u8>> {
    encode(&FiveGmmMessage::DeregistrationRequestToUe(DeregistrationRequestToUe {
        deregistration_type: DeRegistrationType { switch_off: false, re_registration_required, access_type: 1 },
        gmm_cause,
    }))
}

pub fn build_gmm_status(gmm_cause: FiveGmmCause) -> AmfResult<Vec<u8>> {
    encode(&FiveGmmMessage::FiveGmmStatus(gmm_cause))
}

/// DL NAS Transport carrying one 5GSM message
pub fn build_dl_nas_transport(pdu_session_id: u8, n1_sm: Vec<u8>, gmm_cause: Option<FiveGmmCause>) -> AmfResult<Vec<u8>> {
    encode(&FiveGmmMessage::DlNasTransport(DlNasTransport {
        payload_container_type: PayloadContainerType::N1SmInformation,
        payload_container: n1_sm,
        pdu_session_id: Some(pdu_session_id),
        gmm_cause,
        back_off_timer: None,
    }))
}

// ============================================================================
// 5GSM
// ============================================================================

fn encode_gsm(pdu_session_id: u8, pti: u8, msg: &FiveGsmMessage) -> AmfResult<Vec<u8>> {
    Ok(build_5gsm_message(pdu_session_id, pti, msg)?.to_vec())
}

pub fn build_pdu_session_establishment_accept(session: &PduSession, policy: &Policy) -> AmfResult<Vec<u8>> {
    let accept = PduSessionEstablishmentAccept {
        pdu_session_type: PduSessionType::Ipv4,
        ssc_mode: SSC_MODE_1,
        qos_rules: QosRules(vec![QosRule {
            identifier: 1,
            default_rule: true,
            packet_filters: vec![PacketFilter::match_all(1)],
            precedence: 255,
            qfi: DEFAULT_QFI,
        }]),
        session_ambr: SessionAmbr::from_bps(policy.downlink_bitrate, policy.uplink_bitrate),
        gsm_cause: None,
        pdu_address: Some(PduAddress::Ipv4(session.ue_address)),
        s_nssai: Some(session.s_nssai),
        dnn: Some(Dnn::new(session.dnn.clone())),
    };
    encode_gsm(session.id, session.pti, &FiveGsmMessage::PduSessionEstablishmentAccept(accept))
}

pub fn build_pdu_session_establishment_reject(pdu_session_id: u8, pti: u8, cause: FiveGsmCause) -> AmfResult<Vec<u8>> {
    encode_gsm(pdu_session_id, pti, &FiveGsmMessage::PduSessionEstablishmentReject(cause))
}

pub fn build_pdu_session_release_command(pdu_session_id: u8, pti: u8, cause: FiveGsmCause) -> AmfResult<Vec<u8>> {
    encode_gsm(pdu_session_id, pti, &FiveGsmMessage::PduSessionReleaseCommand(cause))
}

pub fn build_pdu_session_release_reject(pdu_session_id: u8, pti: u8, cause: FiveGsmCause) -> AmfResult<Vec<u8>> {
    encode_gsm(pdu_session_id, pti, &FiveGsmMessage::PduSessionReleaseReject(cause))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use ngc_nas::common::types::PlmnId;
    use ngc_nas::fiveg::{parse_5gmm_message, parse_5gsm_message};

    fn parse(raw: Vec<u8>) -> FiveGmmMessage {
        parse_5gmm_message(&mut Bytes::from(raw)).unwrap()
    }

    #[test]
    fn test_build_registration_reject() {
        let msg = parse(build_registration_reject(FiveGmmCause::UE_IDENTITY_CANNOT_BE_DERIVED).unwrap());
        assert_eq!(
            msg,
            FiveGmmMessage::RegistrationReject(RegistrationReject { gmm_cause: FiveGmmCause::UE_IDENTITY_CANNOT_BE_DERIVED })
        );
    }

    #[test]
    fn test_build_registration_accept() {
        let plmn = PlmnId::from_digits("001", "01").unwrap();
        let guti = FiveGGuti { plmn_id: plmn, amf_region_id: 2, amf_set_id: 1, amf_pointer: 0, tmsi: 7 };
        let tai = Tai::new(plmn, [0, 0, 1]);
        let raw = build_registration_accept(guti, &[tai], &[SNssai::with_sd(1, [1, 2, 3])]).unwrap();
        match parse(raw) {
            FiveGmmMessage::RegistrationAccept(accept) => {
                assert_eq!(accept.guti, Some(guti));
                assert_eq!(accept.tai_list, Some(TaiList(vec![tai])));
                assert_eq!(accept.allowed_nssai, Some(Nssai(vec![SNssai::with_sd(1, [1, 2, 3])])));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_build_authentication_request() {
        let raw = build_authentication_request(1, &[0, 0], [0x11; 16], [0x22; 16]).unwrap();
        match parse(raw) {
            FiveGmmMessage::AuthenticationRequest(req) => {
                assert_eq!(req.ngksi.value, 1);
                assert_eq!(req.rand, Some([0x11; 16]));
                assert_eq!(req.autn, Some([0x22; 16]));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_build_security_mode_command() {
        let algorithms = SecurityAlgorithms::new(SecurityAlgorithms::NEA2, SecurityAlgorithms::NIA2);
        let capability = UeSecurityCapability::new(0xf0, 0xf0);
        let raw = build_security_mode_command(algorithms, 2, capability, &[0, 0]).unwrap();
        match parse(raw) {
            FiveGmmMessage::SecurityModeCommand(cmd) => {
                assert_eq!(cmd.selected_nas_security_algorithms, algorithms);
                assert_eq!(cmd.replayed_ue_security_capabilities.ea, 0xf0);
                assert_eq!(cmd.ngksi.value, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_build_dl_nas_transport() {
        let n1 = build_pdu_session_release_command(5, 1, FiveGsmCause::REGULAR_DEACTIVATION).unwrap();
        match parse(build_dl_nas_transport(5, n1.clone(), None).unwrap()) {
            FiveGmmMessage::DlNasTransport(dl) => {
                assert_eq!(dl.pdu_session_id, Some(5));
                let (header, msg) = parse_5gsm_message(&mut Bytes::from(dl.payload_container)).unwrap();
                assert_eq!(header.pdu_session_id, 5);
                assert_eq!(msg, FiveGsmMessage::PduSessionReleaseCommand(FiveGsmCause::REGULAR_DEACTIVATION));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_build_service_accept_and_reject() {
        match parse(build_service_accept(0b0010_0010).unwrap()) {
            FiveGmmMessage::ServiceAccept(accept) => assert_eq!(accept.pdu_session_status, Some(0b0010_0010)),
            other => panic!("unexpected {:?}", other),
        }
        match parse(build_service_reject(FiveGmmCause::UE_IDENTITY_CANNOT_BE_DERIVED).unwrap()) {
            FiveGmmMessage::ServiceReject(reject) => {
                assert_eq!(reject.gmm_cause, FiveGmmCause::UE_IDENTITY_CANNOT_BE_DERIVED)
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
