//! NGAP Message Building
//!
//! Builders for every NGAP message the AMF originates, plus conversions
//! between the NAS and NGAP forms of shared identifiers. Builders return
//! typed [`NgapMessage`] values; encoding happens at the send path.

use ngc_nas::common::types::{PlmnId, SNssai as NasSNssai, Tai as NasTai, UeSecurityCapability};
use ngc_nas::fiveg::FiveGGuti;
use ngc_ngap::transfer::{self, GtpTunnel, QosFlowSetupRequest, SetupRequestTransfer};
use ngc_ngap::{
    BitRates, Cause, CauseMisc, ErrorIndication, FiveGSTmsi, Guami, NgResetAcknowledge, NgSetupFailure,
    NgSetupResponse, NgapMessage, Paging, PagingDrx, PathSwitchRequestAcknowledge, PathSwitchRequestFailure,
    PduSessionResourceItem, PduSessionResourceReleaseCommand, PduSessionResourceSetupItem,
    PduSessionResourceSetupRequest, RanConfigurationUpdateFailure, SNssai, SecurityContext, ServedGuamiItem, Tai,
    TimeToWait, UeAssociatedLogicalNgConnection, UeContextReleaseCommand, UeNgapIds, UeSecurityCapabilities,
};

use crate::config::AmfConfig;
use crate::context::ServedNetwork;
use crate::error::AmfResult;
use crate::subscriber::Policy;
use crate::ue::PduSession;

/// Back-off the AMF asks a rejected RAN node to observe
pub const SETUP_TIME_TO_WAIT: TimeToWait = TimeToWait::V10s;

/// ARP priority of the default QoS flow
const DEFAULT_ARP_PRIORITY: u8 = 8;

/// QFI of the default QoS flow
pub const DEFAULT_QFI: u8 = 1;

// ============================================================================
// Conversions
// ============================================================================

pub fn to_ngap_snssai(s_nssai: &NasSNssai) -> SNssai {
    SNssai { sst: s_nssai.sst, sd: s_nssai.sd }
}

pub fn to_ngap_tai(tai: &NasTai) -> Tai {
    Tai { plmn_identity: tai.plmn_id.to_bytes(), tac: tai.tac }
}

pub fn from_ngap_tai(tai: &Tai) -> NasTai {
    NasTai::new(PlmnId::from_bytes(tai.plmn_identity), tai.tac)
}

/// NAS 5G-EA/5G-IA octets to the NGAP 16-bit lists. NAS bit 8 is algorithm 0,
/// which NGAP does not list, so NGAP's first bit is NAS bit 7.
pub fn to_ngap_security_capabilities(capability: &UeSecurityCapability) -> UeSecurityCapabilities {
    UeSecurityCapabilities {
        nr_encryption_algorithms: u16::from(capability.ea & 0x7f) << 9,
        nr_integrity_algorithms: u16::from(capability.ia & 0x7f) << 9,
        eutra_encryption_algorithms: capability.eea.map(|e| u16::from(e & 0x7f) << 9).unwrap_or(0),
        eutra_integrity_algorithms: capability.eia.map(|e| u16::from(e & 0x7f) << 9).unwrap_or(0),
    }
}

/// Paging identity of a GUTI
pub fn to_ngap_s_tmsi(guti: &FiveGGuti) -> FiveGSTmsi {
    FiveGSTmsi {
        amf_set_id: guti.amf_set_id,
        amf_pointer: guti.amf_pointer,
        five_g_tmsi: guti.tmsi.to_be_bytes(),
    }
}

pub fn tunnel_address(tunnel: &GtpTunnel) -> Option<std::net::Ipv4Addr> {
    let octets: [u8; 4] = tunnel.transport_layer_address.as_slice().try_into().ok()?;
    Some(std::net::Ipv4Addr::from(octets))
}

// ============================================================================
// Non-UE-associated signalling
// ============================================================================

pub fn build_ng_setup_response(config: &AmfConfig, served: &ServedNetwork) -> NgapMessage {
    NgapMessage::NgSetupResponse(NgSetupResponse {
        amf_name: config.amf_name.clone(),
        served_guami_list: served
            .guamis
            .iter()
            .map(|guami| ServedGuamiItem { guami: *guami, backup_amf_name: None })
            .collect(),
        relative_amf_capacity: config.relative_capacity,
        plmn_support_list: served.plmn_support.clone(),
    })
}

pub fn build_ng_setup_failure(cause: Cause) -> NgapMessage {
    NgapMessage::NgSetupFailure(NgSetupFailure { cause, time_to_wait: Some(SETUP_TIME_TO_WAIT) })
}

pub fn build_ran_configuration_update_failure(cause: Cause) -> NgapMessage {
    NgapMessage::RanConfigurationUpdateFailure(RanConfigurationUpdateFailure {
        cause,
        time_to_wait: Some(SETUP_TIME_TO_WAIT),
    })
}

pub fn build_ng_reset_acknowledge(connections: Option<Vec<UeAssociatedLogicalNgConnection>>) -> NgapMessage {
    NgapMessage::NgResetAcknowledge(NgResetAcknowledge { connections })
}

pub fn build_error_indication(amf_ue_ngap_id: Option<u64>, ran_ue_ngap_id: Option<u32>, cause: Cause) -> NgapMessage {
    NgapMessage::ErrorIndication(ErrorIndication { amf_ue_ngap_id, ran_ue_ngap_id, cause: Some(cause) })
}

pub fn build_paging(guti: &FiveGGuti, tai: Tai, paging_drx: PagingDrx) -> NgapMessage {
    NgapMessage::Paging(Paging {
        ue_paging_identity: to_ngap_s_tmsi(guti),
        paging_drx: Some(paging_drx),
        tai_list_for_paging: vec![tai],
    })
}

// ============================================================================
// UE-associated signalling
// ============================================================================

pub fn build_downlink_nas_transport(amf_ue_ngap_id: u64, ran_ue_ngap_id: u32, nas_pdu: Vec<u8>) -> NgapMessage {
    NgapMessage::DownlinkNasTransport(ngc_ngap::DownlinkNasTransport { amf_ue_ngap_id, ran_ue_ngap_id, nas_pdu })
}

/// Release Command addressed by both IDs when the RAN's ID is known
pub fn build_ue_context_release_command(amf_ue_ngap_id: u64, ran_ue_ngap_id: Option<u32>, cause: Cause) -> NgapMessage {
    let ue_ngap_ids = match ran_ue_ngap_id {
        Some(ran_ue_ngap_id) => UeNgapIds::Pair { amf_ue_ngap_id, ran_ue_ngap_id },
        None => UeNgapIds::AmfOnly(amf_ue_ngap_id),
    };
    NgapMessage::UeContextReleaseCommand(UeContextReleaseCommand { ue_ngap_ids, cause })
}

pub struct InitialContextSetup<'a> {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    pub guami: Guami,
    pub allowed_nssai: &'a [NasSNssai],
    pub ue_security_capability: &'a UeSecurityCapability,
    pub kgnb: [u8; 32],
    pub policy: Option<&'a Policy>,
    /// Sessions whose user plane is re-established with the context
    pub pdu_sessions: Vec<PduSessionResourceSetupItem>,
    pub nas_pdu: Vec<u8>,
}

pub fn build_initial_context_setup_request(setup: InitialContextSetup<'_>) -> NgapMessage {
    NgapMessage::InitialContextSetupRequest(ngc_ngap::InitialContextSetupRequest {
        amf_ue_ngap_id: setup.amf_ue_ngap_id,
        ran_ue_ngap_id: setup.ran_ue_ngap_id,
        ue_ambr: setup.policy.map(ue_ambr),
        guami: setup.guami,
        allowed_nssai: setup.allowed_nssai.iter().map(to_ngap_snssai).collect(),
        ue_security_capabilities: to_ngap_security_capabilities(setup.ue_security_capability),
        security_key: setup.kgnb,
        pdu_session_list: setup.pdu_sessions,
        nas_pdu: Some(setup.nas_pdu),
    })
}

fn ue_ambr(policy: &Policy) -> BitRates {
    BitRates { dl: policy.downlink_bitrate, ul: policy.uplink_bitrate }
}

/// SetupRequestTransfer for a session's default QoS flow
pub fn build_setup_request_transfer(session: &PduSession, policy: &Policy) -> AmfResult<Vec<u8>> {
    Ok(transfer::encode_setup_request_transfer(&SetupRequestTransfer {
        session_ambr: Some(ue_ambr(policy)),
        ul_ngu_up_tnl_information: session.ul_tunnel.clone(),
        pdu_session_type: transfer::PduSessionType::Ipv4,
        qos_flows: vec![QosFlowSetupRequest {
            qos_flow_identifier: DEFAULT_QFI,
            five_qi: policy.qos_class,
            priority_level_arp: DEFAULT_ARP_PRIORITY,
            may_trigger_pre_emption: false,
            pre_emptable: false,
        }],
    })?)
}

/// Setup list item re-establishing an active session's user plane
pub fn build_setup_item(session: &PduSession, policy: &Policy) -> AmfResult<PduSessionResourceSetupItem> {
    Ok(PduSessionResourceSetupItem {
        pdu_session_id: session.id,
        nas_pdu: None,
        s_nssai: to_ngap_snssai(&session.s_nssai),
        transfer: build_setup_request_transfer(session, policy)?,
    })
}

pub fn build_pdu_session_resource_setup_request(
    amf_ue_ngap_id: u64,
    ran_ue_ngap_id: u32,
    session: &PduSession,
    policy: &Policy,
    nas_pdu: Vec<u8>,
) -> AmfResult<NgapMessage> {
    Ok(NgapMessage::PduSessionResourceSetupRequest(PduSessionResourceSetupRequest {
        amf_ue_ngap_id,
        ran_ue_ngap_id,
        nas_pdu: None,
        pdu_session_list: vec![PduSessionResourceSetupItem {
            pdu_session_id: session.id,
            nas_pdu: Some(nas_pdu),
            s_nssai: to_ngap_snssai(&session.s_nssai),
            transfer: build_setup_request_transfer(session, policy)?,
        }],
        ue_ambr: Some(ue_ambr(policy)),
    }))
}

pub fn build_pdu_session_resource_release_command(
    amf_ue_ngap_id: u64,
    ran_ue_ngap_id: u32,
    pdu_session_id: u8,
    cause: &Cause,
    nas_pdu: Option<Vec<u8>>,
) -> AmfResult<NgapMessage> {
    Ok(NgapMessage::PduSessionResourceReleaseCommand(PduSessionResourceReleaseCommand {
        amf_ue_ngap_id,
        ran_ue_ngap_id,
        nas_pdu,
        pdu_session_list: vec![PduSessionResourceItem {
            pdu_session_id,
            transfer: transfer::encode_release_command_transfer(cause)?,
        }],
    }))
}

pub struct PathSwitchAck<'a> {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    pub ncc: u8,
    pub nh: [u8; 32],
    pub allowed_nssai: &'a [NasSNssai],
    /// Sessions switched, with the uplink tunnel the target keeps using
    pub switched: Vec<(u8, GtpTunnel)>,
}

pub fn build_path_switch_ack(ack: PathSwitchAck<'_>) -> AmfResult<NgapMessage> {
    let mut pdu_session_list = Vec::with_capacity(ack.switched.len());
    for (pdu_session_id, ul_tunnel) in &ack.switched {
        pdu_session_list.push(PduSessionResourceItem {
            pdu_session_id: *pdu_session_id,
            transfer: transfer::encode_path_switch_ack_transfer(ul_tunnel)?,
        });
    }
    Ok(NgapMessage::PathSwitchRequestAcknowledge(PathSwitchRequestAcknowledge {
        amf_ue_ngap_id: ack.amf_ue_ngap_id,
        ran_ue_ngap_id: ack.ran_ue_ngap_id,
        ue_security_capabilities: None,
        security_context: SecurityContext { next_hop_chaining_count: ack.ncc, next_hop_nh: ack.nh },
        pdu_session_list,
        allowed_nssai: ack.allowed_nssai.iter().map(to_ngap_snssai).collect(),
    }))
}

/// Path Switch Request Failure releasing every listed session
pub fn build_path_switch_failure(
    amf_ue_ngap_id: u64,
    ran_ue_ngap_id: u32,
    pdu_session_ids: &[u8],
    cause: &Cause,
) -> AmfResult<NgapMessage> {
    let transfer = transfer::encode_release_command_transfer(cause)?;
    Ok(NgapMessage::PathSwitchRequestFailure(PathSwitchRequestFailure {
        amf_ue_ngap_id,
        ran_ue_ngap_id,
        released_list: pdu_session_ids
            .iter()
            .map(|id| PduSessionResourceItem { pdu_session_id: *id, transfer: transfer.clone() })
            .collect(),
    }))
}

/// Cause sent when no configured PLMN or TAI matches a RAN node
pub fn unknown_plmn() -> Cause {
    Cause::Misc(CauseMisc::UnknownPlmn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ngc_ngap::{builder, parser};
    use std::net::Ipv4Addr;

    #[test]
    fn test_security_capability_mapping() {
        // EA0, EA1, EA2 and IA1, IA2
        let nas = UeSecurityCapability::new(0xe0, 0x60);
        let ngap = to_ngap_security_capabilities(&nas);
        assert_eq!(ngap.nr_encryption_algorithms, 0xc000);
        assert_eq!(ngap.nr_integrity_algorithms, 0xc000);
        assert_eq!(ngap.eutra_encryption_algorithms, 0);
    }

    #[test]
    fn test_tai_conversion() {
        let nas = NasTai::new(PlmnId::from_digits("001", "01").unwrap(), [0, 0, 1]);
        let ngap = to_ngap_tai(&nas);
        assert_eq!(ngap, Tai { plmn_identity: [0x00, 0xf1, 0x10], tac: [0, 0, 1] });
        assert_eq!(from_ngap_tai(&ngap), nas);
    }

    #[test]
    fn test_release_command_ids() {
        match build_ue_context_release_command(5, None, Cause::Misc(CauseMisc::Unspecified)) {
            NgapMessage::UeContextReleaseCommand(cmd) => assert_eq!(cmd.ue_ngap_ids, UeNgapIds::AmfOnly(5)),
            other => panic!("unexpected {:?}", other),
        }
        match build_ue_context_release_command(5, Some(9), Cause::Misc(CauseMisc::Unspecified)) {
            NgapMessage::UeContextReleaseCommand(cmd) => {
                assert_eq!(cmd.ue_ngap_ids, UeNgapIds::Pair { amf_ue_ngap_id: 5, ran_ue_ngap_id: 9 })
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_setup_failure_encodes() {
        let msg = build_ng_setup_failure(unknown_plmn());
        let bytes = builder::build(&msg).unwrap();
        assert_eq!(parser::decode_ngap_pdu(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_paging_identity() {
        let guti = FiveGGuti {
            plmn_id: PlmnId::from_digits("001", "01").unwrap(),
            amf_region_id: 2,
            amf_set_id: 1,
            amf_pointer: 0,
            tmsi: 0x0102_0304,
        };
        let tai = Tai { plmn_identity: [0x00, 0xf1, 0x10], tac: [0, 0, 1] };
        match build_paging(&guti, tai, PagingDrx::V128) {
            NgapMessage::Paging(paging) => {
                assert_eq!(paging.ue_paging_identity.five_g_tmsi, [1, 2, 3, 4]);
                assert_eq!(paging.tai_list_for_paging, vec![tai]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_tunnel_address() {
        let tunnel = GtpTunnel { transport_layer_address: vec![127, 0, 0, 7], gtp_teid: 1 };
        assert_eq!(tunnel_address(&tunnel), Some(Ipv4Addr::new(127, 0, 0, 7)));
        let v6 = GtpTunnel { transport_layer_address: vec![0; 16], gtp_teid: 1 };
        assert_eq!(tunnel_address(&v6), None);
    }
}
