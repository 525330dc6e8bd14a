//! PDU Session Resource transfer containers
//!
//! The `OCTET STRING (CONTAINING ...)` payloads carried inside the PDU session
//! resource lists (TS 38.413 Section 9.3.4). The AMF builds the request
//! transfers on behalf of the session management side and reads the gNB's
//! downlink tunnel out of the response transfers.

use ngc_asn1c::aper_enumerated;
use ngc_asn1c::ngap::cause::Cause;
use ngc_asn1c::ngap::ies::{ProtocolIeContainer, ProtocolIeField};
use ngc_asn1c::ngap::types::{Criticality, ProtocolIeId};
use ngc_asn1c::per::{AperDecode, AperDecoder, AperEncode, AperEncoder, Constraint, PerError};

use crate::error::{NgapError, NgapResult};
use crate::ie::{
    decode_bit_rates, decode_list, decode_with, encode_bit_rates, encode_list, encode_with,
    read_preamble, skip_ie_extensions, write_preamble,
};
use crate::types::BitRates;

const ID_PDU_SESSION_AGGREGATE_MAXIMUM_BIT_RATE: ProtocolIeId = ProtocolIeId(130);
const ID_PDU_SESSION_TYPE: ProtocolIeId = ProtocolIeId(134);
const ID_QOS_FLOW_SETUP_REQUEST_LIST: ProtocolIeId = ProtocolIeId(136);
const ID_UL_NGU_UP_TNL_INFORMATION: ProtocolIeId = ProtocolIeId(139);

const MAX_QOS_FLOWS: usize = 64;
const MAX_TRANSPORT_ADDRESS_BITS: usize = 160;

aper_enumerated! {
    /// PDUSessionType ::= ENUMERATED { ipv4, ipv6, ipv4v6, ethernet, unstructured, ... }
    pub enum PduSessionType (Constraint::extensible(0, 4)) {
        Ipv4 = 0,
        Ipv6 = 1,
        Ipv4v6 = 2,
        Ethernet = 3,
        Unstructured = 4,
    }
}

/// GTP-U tunnel endpoint (UPTransportLayerInformation, gTPTunnel alternative)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GtpTunnel {
    /// IPv4 (4 octets) or IPv6 (16 octets) address
    pub transport_layer_address: Vec<u8>,
    pub gtp_teid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QosFlowSetupRequest {
    pub qos_flow_identifier: u8,
    pub five_qi: u8,
    /// ARP priority level, 1..=15
    pub priority_level_arp: u8,
    pub may_trigger_pre_emption: bool,
    pub pre_emptable: bool,
}

/// PDUSessionResourceSetupRequestTransfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupRequestTransfer {
    pub session_ambr: Option<BitRates>,
    pub ul_ngu_up_tnl_information: GtpTunnel,
    pub pdu_session_type: PduSessionType,
    pub qos_flows: Vec<QosFlowSetupRequest>,
}

/// PDUSessionResourceSetupResponseTransfer, downlink QoS flow per TNL information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupResponseTransfer {
    pub dl_ngu_up_tnl_information: GtpTunnel,
    pub associated_qos_flows: Vec<u8>,
}

/// PathSwitchRequestTransfer: the target gNB's downlink tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSwitchRequestTransfer {
    pub dl_ngu_up_tnl_information: GtpTunnel,
    pub qos_flow_accepted: Vec<u8>,
}

// ============================================================================
// Shared pieces
// ============================================================================

/// UPTransportLayerInformation ::= CHOICE { gTPTunnel, choice-Extensions }
fn encode_up_tnl_information(enc: &mut AperEncoder, tunnel: &GtpTunnel) -> NgapResult<()> {
    let bits = tunnel.transport_layer_address.len() * 8;
    if bits == 0 || bits > MAX_TRANSPORT_ADDRESS_BITS {
        return Err(NgapError::InvalidIeValue {
            ie_name: "TransportLayerAddress",
            reason: format!("{bits} bits"),
        });
    }
    enc.encode_choice_index(0, 2, false)?;
    write_preamble(enc, &[false]);
    // BIT STRING (SIZE(1..160, ...))
    enc.write_bit(false);
    enc.encode_constrained_length(bits, 1, MAX_TRANSPORT_ADDRESS_BITS)?;
    enc.align();
    enc.write_bytes(&tunnel.transport_layer_address);
    enc.encode_octet_string(&tunnel.gtp_teid.to_be_bytes(), Some(4), Some(4))?;
    Ok(())
}

fn decode_up_tnl_information(dec: &mut AperDecoder<'_>) -> NgapResult<GtpTunnel> {
    if dec.decode_choice_index(2, false)? != 0 {
        return Err(PerError::UnsupportedExtension.into());
    }
    let [ext_present] = read_preamble::<1>(dec)?;
    if dec.read_bit()? {
        return Err(PerError::UnsupportedExtension.into());
    }
    let bits = dec.decode_constrained_length(1, MAX_TRANSPORT_ADDRESS_BITS)?;
    if bits % 8 != 0 {
        return Err(NgapError::InvalidIeValue {
            ie_name: "TransportLayerAddress",
            reason: format!("{bits} bits is not an address"),
        });
    }
    dec.align();
    let transport_layer_address = dec.read_bytes(bits / 8)?;
    let gtp_teid = u32::from_be_bytes(dec.decode_fixed_octets::<4>()?);
    if ext_present {
        skip_ie_extensions(dec)?;
    }
    Ok(GtpTunnel {
        transport_layer_address,
        gtp_teid,
    })
}

/// QosFlowIdentifier ::= INTEGER (0..63, ...)
fn encode_qfi(enc: &mut AperEncoder, qfi: u8) -> NgapResult<()> {
    enc.write_bit(false);
    Ok(enc.encode_constrained_whole_number(qfi as i64, &Constraint::new(0, 63))?)
}

fn decode_qfi(dec: &mut AperDecoder<'_>) -> NgapResult<u8> {
    if dec.read_bit()? {
        return Err(PerError::UnsupportedExtension.into());
    }
    Ok(dec.decode_constrained_whole_number(&Constraint::new(0, 63))? as u8)
}

/// `SEQUENCE (SIZE(1..64)) OF SEQUENCE { qosFlowIdentifier, ... }`. AssociatedQosFlowItem
/// carries an optional qosFlowMappingIndication ahead of iE-Extensions.
fn encode_qfi_list(
    enc: &mut AperEncoder,
    ie_name: &'static str,
    qfis: &[u8],
    with_mapping_indication: bool,
) -> NgapResult<()> {
    encode_list(enc, ie_name, qfis, MAX_QOS_FLOWS, |enc, qfi| {
        if with_mapping_indication {
            write_preamble(enc, &[false, false]);
        } else {
            write_preamble(enc, &[false]);
        }
        encode_qfi(enc, *qfi)
    })
}

fn decode_qfi_list(dec: &mut AperDecoder<'_>, with_mapping_indication: bool) -> NgapResult<Vec<u8>> {
    decode_list(dec, MAX_QOS_FLOWS, |dec| {
        let (indication_present, ext_present) = if with_mapping_indication {
            let [indication, ext] = read_preamble::<2>(dec)?;
            (indication, ext)
        } else {
            let [ext] = read_preamble::<1>(dec)?;
            (false, ext)
        };
        let qfi = decode_qfi(dec)?;
        if indication_present {
            // qosFlowMappingIndication ::= ENUMERATED { ul, dl, ... }
            dec.decode_enumerated(&Constraint::extensible(0, 1))?;
        }
        if ext_present {
            skip_ie_extensions(dec)?;
        }
        Ok(qfi)
    })
}

fn encode_qos_flow_setup_request(enc: &mut AperEncoder, flow: &QosFlowSetupRequest) -> NgapResult<()> {
    // e-RAB-ID, iE-Extensions
    write_preamble(enc, &[false, false]);
    encode_qfi(enc, flow.qos_flow_identifier)?;

    // QosFlowLevelQosParameters: gBR, reflective, additional, iE-Extensions
    write_preamble(enc, &[false, false, false, false]);
    // QosCharacteristics ::= CHOICE { nonDynamic5QI, dynamic5QI, choice-Extensions }
    enc.encode_choice_index(0, 3, false)?;
    // NonDynamic5QIDescriptor: priorityLevelQos, averagingWindow, maximumDataBurstVolume, iE-Extensions
    write_preamble(enc, &[false, false, false, false]);
    enc.write_bit(false);
    enc.encode_constrained_whole_number(flow.five_qi as i64, &Constraint::new(0, 255))?;

    // AllocationAndRetentionPriority
    write_preamble(enc, &[false]);
    enc.encode_constrained_whole_number(flow.priority_level_arp as i64, &Constraint::new(1, 15))?;
    enc.encode_enumerated(flow.may_trigger_pre_emption as i64, &Constraint::extensible(0, 1))?;
    enc.encode_enumerated(flow.pre_emptable as i64, &Constraint::extensible(0, 1))?;
    Ok(())
}

fn decode_qos_flow_setup_request(dec: &mut AperDecoder<'_>) -> NgapResult<QosFlowSetupRequest> {
    let [erab_present, ext_present] = read_preamble::<2>(dec)?;
    let qos_flow_identifier = decode_qfi(dec)?;

    let [gbr, reflective, additional, params_ext] = read_preamble::<4>(dec)?;
    if dec.decode_choice_index(3, false)? != 0 {
        return Err(NgapError::InvalidIeValue {
            ie_name: "QosCharacteristics",
            reason: "only non-dynamic 5QI is supported".into(),
        });
    }
    let [priority, window, burst, descriptor_ext] = read_preamble::<4>(dec)?;
    if priority || window || burst || descriptor_ext {
        return Err(NgapError::InvalidIeValue {
            ie_name: "NonDynamic5QIDescriptor",
            reason: "optional components are not supported".into(),
        });
    }
    if dec.read_bit()? {
        return Err(PerError::UnsupportedExtension.into());
    }
    let five_qi = dec.decode_constrained_whole_number(&Constraint::new(0, 255))? as u8;

    let [arp_ext] = read_preamble::<1>(dec)?;
    let priority_level_arp = dec.decode_constrained_whole_number(&Constraint::new(1, 15))? as u8;
    let may_trigger_pre_emption = dec.decode_enumerated(&Constraint::extensible(0, 1))? == 1;
    let pre_emptable = dec.decode_enumerated(&Constraint::extensible(0, 1))? == 1;
    if arp_ext || gbr || reflective || additional || params_ext || erab_present || ext_present {
        return Err(NgapError::InvalidIeValue {
            ie_name: "QosFlowSetupRequestItem",
            reason: "optional components are not supported".into(),
        });
    }

    Ok(QosFlowSetupRequest {
        qos_flow_identifier,
        five_qi,
        priority_level_arp,
        may_trigger_pre_emption,
        pre_emptable,
    })
}

fn push_field<F>(container: &mut ProtocolIeContainer, id: ProtocolIeId, f: F) -> NgapResult<()>
where
    F: FnOnce(&mut AperEncoder) -> NgapResult<()>,
{
    container.push(ProtocolIeField {
        id,
        criticality: Criticality::Reject,
        value: encode_with(f)?,
    });
    Ok(())
}

/// `SEQUENCE { protocolIEs ProtocolIE-Container, ... }`
fn encode_ie_sequence(container: &ProtocolIeContainer) -> NgapResult<Vec<u8>> {
    encode_with(|enc| {
        enc.write_bit(false);
        Ok(container.encode_aper(enc)?)
    })
}

fn decode_ie_sequence(raw: &[u8]) -> NgapResult<ProtocolIeContainer> {
    decode_with(raw, |dec| {
        let _extended = dec.read_bit()?;
        Ok(ProtocolIeContainer::decode_aper(dec)?)
    })
}

fn missing(ie_name: &'static str, id: ProtocolIeId) -> NgapError {
    NgapError::MissingMandatoryIe {
        ie_name,
        ie_id: id.0,
    }
}

// ============================================================================
// PDUSessionResourceSetupRequestTransfer
// ============================================================================

pub fn encode_setup_request_transfer(transfer: &SetupRequestTransfer) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    if let Some(ref ambr) = transfer.session_ambr {
        push_field(&mut container, ID_PDU_SESSION_AGGREGATE_MAXIMUM_BIT_RATE, |enc| {
            encode_bit_rates(enc, ambr)
        })?;
    }
    push_field(&mut container, ID_UL_NGU_UP_TNL_INFORMATION, |enc| {
        encode_up_tnl_information(enc, &transfer.ul_ngu_up_tnl_information)
    })?;
    push_field(&mut container, ID_PDU_SESSION_TYPE, |enc| {
        Ok(transfer.pdu_session_type.encode_aper(enc)?)
    })?;
    push_field(&mut container, ID_QOS_FLOW_SETUP_REQUEST_LIST, |enc| {
        encode_list(
            enc,
            "QosFlowSetupRequestList",
            &transfer.qos_flows,
            MAX_QOS_FLOWS,
            encode_qos_flow_setup_request,
        )
    })?;
    encode_ie_sequence(&container)
}

pub fn decode_setup_request_transfer(raw: &[u8]) -> NgapResult<SetupRequestTransfer> {
    let container = decode_ie_sequence(raw)?;

    let mut session_ambr = None;
    let mut ul_tunnel = None;
    let mut pdu_session_type = None;
    let mut qos_flows = None;

    for field in container.iter() {
        match field.id {
            ID_PDU_SESSION_AGGREGATE_MAXIMUM_BIT_RATE => {
                session_ambr = Some(decode_with(&field.value, decode_bit_rates)?);
            }
            ID_UL_NGU_UP_TNL_INFORMATION => {
                ul_tunnel = Some(decode_with(&field.value, decode_up_tnl_information)?);
            }
            ID_PDU_SESSION_TYPE => {
                pdu_session_type =
                    Some(decode_with(&field.value, |dec| Ok(PduSessionType::decode_aper(dec)?))?);
            }
            ID_QOS_FLOW_SETUP_REQUEST_LIST => {
                qos_flows = Some(decode_with(&field.value, |dec| {
                    decode_list(dec, MAX_QOS_FLOWS, decode_qos_flow_setup_request)
                })?);
            }
            _ => {}
        }
    }

    Ok(SetupRequestTransfer {
        session_ambr,
        ul_ngu_up_tnl_information: ul_tunnel
            .ok_or_else(|| missing("UL-NGU-UP-TNLInformation", ID_UL_NGU_UP_TNL_INFORMATION))?,
        pdu_session_type: pdu_session_type
            .ok_or_else(|| missing("PDUSessionType", ID_PDU_SESSION_TYPE))?,
        qos_flows: qos_flows
            .ok_or_else(|| missing("QosFlowSetupRequestList", ID_QOS_FLOW_SETUP_REQUEST_LIST))?,
    })
}

// ============================================================================
// PDUSessionResourceSetupResponseTransfer
// ============================================================================

pub fn encode_setup_response_transfer(transfer: &SetupResponseTransfer) -> NgapResult<Vec<u8>> {
    encode_with(|enc| {
        // additionalDLQosFlowPerTNLInformation, securityResult, qosFlowFailedToSetupList, iE-Extensions
        write_preamble(enc, &[false, false, false, false]);
        // QosFlowPerTNLInformation
        write_preamble(enc, &[false]);
        encode_up_tnl_information(enc, &transfer.dl_ngu_up_tnl_information)?;
        encode_qfi_list(enc, "AssociatedQosFlowList", &transfer.associated_qos_flows, true)
    })
}

/// Only the downlink tunnel is read; trailing optional components are ignored
pub fn decode_setup_response_transfer(raw: &[u8]) -> NgapResult<SetupResponseTransfer> {
    decode_with(raw, |dec| {
        let _optionals = read_preamble::<4>(dec)?;
        let [ext_present] = read_preamble::<1>(dec)?;
        let dl_ngu_up_tnl_information = decode_up_tnl_information(dec)?;
        let associated_qos_flows = decode_qfi_list(dec, true)?;
        if ext_present {
            skip_ie_extensions(dec)?;
        }
        Ok(SetupResponseTransfer {
            dl_ngu_up_tnl_information,
            associated_qos_flows,
        })
    })
}

// ============================================================================
// PDUSessionResourceReleaseCommandTransfer
// ============================================================================

pub fn encode_release_command_transfer(cause: &Cause) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    container.push(ProtocolIeField {
        id: ProtocolIeId::CAUSE,
        criticality: Criticality::Ignore,
        value: encode_with(|enc| Ok(cause.encode_aper(enc)?))?,
    });
    encode_ie_sequence(&container)
}

pub fn decode_release_command_transfer(raw: &[u8]) -> NgapResult<Cause> {
    let container = decode_ie_sequence(raw)?;
    let field = container
        .find(ProtocolIeId::CAUSE)
        .ok_or_else(|| missing("Cause", ProtocolIeId::CAUSE))?;
    decode_with(&field.value, |dec| Ok(Cause::decode_aper(dec)?))
}

// ============================================================================
// Path switch transfers
// ============================================================================

pub fn encode_path_switch_request_transfer(
    transfer: &PathSwitchRequestTransfer,
) -> NgapResult<Vec<u8>> {
    encode_with(|enc| {
        // dL-NGU-TNLInformationReused, userPlaneSecurityInformation, iE-Extensions
        write_preamble(enc, &[false, false, false]);
        encode_up_tnl_information(enc, &transfer.dl_ngu_up_tnl_information)?;
        encode_qfi_list(enc, "QosFlowAcceptedList", &transfer.qos_flow_accepted, false)
    })
}

pub fn decode_path_switch_request_transfer(raw: &[u8]) -> NgapResult<PathSwitchRequestTransfer> {
    decode_with(raw, |dec| {
        let [reused, security, _ext] = read_preamble::<3>(dec)?;
        let dl_ngu_up_tnl_information = decode_up_tnl_information(dec)?;
        if reused || security {
            return Err(NgapError::InvalidIeValue {
                ie_name: "PathSwitchRequestTransfer",
                reason: "optional components are not supported".into(),
            });
        }
        let qos_flow_accepted = decode_qfi_list(dec, false)?;
        Ok(PathSwitchRequestTransfer {
            dl_ngu_up_tnl_information,
            qos_flow_accepted,
        })
    })
}

/// PathSwitchRequestAcknowledgeTransfer carrying the uplink tunnel
pub fn encode_path_switch_ack_transfer(ul_tunnel: &GtpTunnel) -> NgapResult<Vec<u8>> {
    encode_with(|enc| {
        // uL-NGU-UP-TNLInformation, securityIndication, iE-Extensions
        write_preamble(enc, &[true, false, false]);
        encode_up_tnl_information(enc, ul_tunnel)
    })
}

pub fn decode_path_switch_ack_transfer(raw: &[u8]) -> NgapResult<Option<GtpTunnel>> {
    decode_with(raw, |dec| {
        let [ul_present, _security, _ext] = read_preamble::<3>(dec)?;
        if ul_present {
            Ok(Some(decode_up_tnl_information(dec)?))
        } else {
            Ok(None)
        }
    })
}
