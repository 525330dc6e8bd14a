//! NGAP Message Parsers
//!
//! Functions for decoding NGAP PDU messages from APER bytes into high-level types.
//! Each function decodes the PDU wrapper, extracts the IE container, and maps
//! the IEs to their strongly-typed representations. Unknown IEs are skipped.

use ngc_asn1c::ngap::ies::ProtocolIeContainer;
use ngc_asn1c::ngap::pdu::*;
use ngc_asn1c::ngap::types::{ProcedureCode, ProtocolIeId};
use ngc_asn1c::per::{AperDecode, AperDecoder};

use crate::error::{NgapError, NgapResult};
use crate::ie;
use crate::types::*;

/// Decoded NGAP message - discriminated union of all supported message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NgapMessage {
    NgSetupRequest(NgSetupRequest),
    NgSetupResponse(NgSetupResponse),
    NgSetupFailure(NgSetupFailure),
    RanConfigurationUpdate(RanConfigurationUpdate),
    RanConfigurationUpdateAcknowledge(RanConfigurationUpdateAcknowledge),
    RanConfigurationUpdateFailure(RanConfigurationUpdateFailure),
    NgReset(NgReset),
    NgResetAcknowledge(NgResetAcknowledge),
    ErrorIndication(ErrorIndication),
    InitialUeMessage(InitialUeMessage),
    DownlinkNasTransport(DownlinkNasTransport),
    UplinkNasTransport(UplinkNasTransport),
    NasNonDeliveryIndication(NasNonDeliveryIndication),
    InitialContextSetupRequest(InitialContextSetupRequest),
    InitialContextSetupResponse(InitialContextSetupResponse),
    InitialContextSetupFailure(InitialContextSetupFailure),
    UeContextReleaseRequest(UeContextReleaseRequest),
    UeContextReleaseCommand(UeContextReleaseCommand),
    UeContextReleaseComplete(UeContextReleaseComplete),
    PduSessionResourceSetupRequest(PduSessionResourceSetupRequest),
    PduSessionResourceSetupResponse(PduSessionResourceSetupResponse),
    PduSessionResourceReleaseCommand(PduSessionResourceReleaseCommand),
    PduSessionResourceReleaseResponse(PduSessionResourceReleaseResponse),
    Paging(Paging),
    PathSwitchRequest(PathSwitchRequest),
    PathSwitchRequestAcknowledge(PathSwitchRequestAcknowledge),
    PathSwitchRequestFailure(PathSwitchRequestFailure),
}

impl NgapMessage {
    /// Message name for logging
    pub fn name(&self) -> &'static str {
        match self {
            NgapMessage::NgSetupRequest(_) => "NGSetupRequest",
            NgapMessage::NgSetupResponse(_) => "NGSetupResponse",
            NgapMessage::NgSetupFailure(_) => "NGSetupFailure",
            NgapMessage::RanConfigurationUpdate(_) => "RANConfigurationUpdate",
            NgapMessage::RanConfigurationUpdateAcknowledge(_) => {
                "RANConfigurationUpdateAcknowledge"
            }
            NgapMessage::RanConfigurationUpdateFailure(_) => "RANConfigurationUpdateFailure",
            NgapMessage::NgReset(_) => "NGReset",
            NgapMessage::NgResetAcknowledge(_) => "NGResetAcknowledge",
            NgapMessage::ErrorIndication(_) => "ErrorIndication",
            NgapMessage::InitialUeMessage(_) => "InitialUEMessage",
            NgapMessage::DownlinkNasTransport(_) => "DownlinkNASTransport",
            NgapMessage::UplinkNasTransport(_) => "UplinkNASTransport",
            NgapMessage::NasNonDeliveryIndication(_) => "NASNonDeliveryIndication",
            NgapMessage::InitialContextSetupRequest(_) => "InitialContextSetupRequest",
            NgapMessage::InitialContextSetupResponse(_) => "InitialContextSetupResponse",
            NgapMessage::InitialContextSetupFailure(_) => "InitialContextSetupFailure",
            NgapMessage::UeContextReleaseRequest(_) => "UEContextReleaseRequest",
            NgapMessage::UeContextReleaseCommand(_) => "UEContextReleaseCommand",
            NgapMessage::UeContextReleaseComplete(_) => "UEContextReleaseComplete",
            NgapMessage::PduSessionResourceSetupRequest(_) => "PDUSessionResourceSetupRequest",
            NgapMessage::PduSessionResourceSetupResponse(_) => "PDUSessionResourceSetupResponse",
            NgapMessage::PduSessionResourceReleaseCommand(_) => "PDUSessionResourceReleaseCommand",
            NgapMessage::PduSessionResourceReleaseResponse(_) => {
                "PDUSessionResourceReleaseResponse"
            }
            NgapMessage::Paging(_) => "Paging",
            NgapMessage::PathSwitchRequest(_) => "PathSwitchRequest",
            NgapMessage::PathSwitchRequestAcknowledge(_) => "PathSwitchRequestAcknowledge",
            NgapMessage::PathSwitchRequestFailure(_) => "PathSwitchRequestFailure",
        }
    }

    /// NGAP ids carried by UE-associated messages, used for error reporting
    pub fn ue_ngap_ids(&self) -> (Option<u64>, Option<u32>) {
        match self {
            NgapMessage::InitialUeMessage(m) => (None, Some(m.ran_ue_ngap_id)),
            NgapMessage::DownlinkNasTransport(m) => (Some(m.amf_ue_ngap_id), Some(m.ran_ue_ngap_id)),
            NgapMessage::UplinkNasTransport(m) => (Some(m.amf_ue_ngap_id), Some(m.ran_ue_ngap_id)),
            NgapMessage::NasNonDeliveryIndication(m) => {
                (Some(m.amf_ue_ngap_id), Some(m.ran_ue_ngap_id))
            }
            NgapMessage::InitialContextSetupRequest(m) => {
                (Some(m.amf_ue_ngap_id), Some(m.ran_ue_ngap_id))
            }
            NgapMessage::InitialContextSetupResponse(m) => {
                (Some(m.amf_ue_ngap_id), Some(m.ran_ue_ngap_id))
            }
            NgapMessage::InitialContextSetupFailure(m) => {
                (Some(m.amf_ue_ngap_id), Some(m.ran_ue_ngap_id))
            }
            NgapMessage::UeContextReleaseRequest(m) => {
                (Some(m.amf_ue_ngap_id), Some(m.ran_ue_ngap_id))
            }
            NgapMessage::UeContextReleaseComplete(m) => {
                (Some(m.amf_ue_ngap_id), Some(m.ran_ue_ngap_id))
            }
            NgapMessage::PduSessionResourceSetupResponse(m) => {
                (Some(m.amf_ue_ngap_id), Some(m.ran_ue_ngap_id))
            }
            NgapMessage::PduSessionResourceReleaseResponse(m) => {
                (Some(m.amf_ue_ngap_id), Some(m.ran_ue_ngap_id))
            }
            NgapMessage::PathSwitchRequest(m) => {
                (Some(m.source_amf_ue_ngap_id), Some(m.ran_ue_ngap_id))
            }
            _ => (None, None),
        }
    }
}

/// Decode an NGAP PDU from APER bytes into a high-level NgapMessage
pub fn decode_ngap_pdu(data: &[u8]) -> NgapResult<NgapMessage> {
    let mut decoder = AperDecoder::new(data);
    let pdu = NgapPdu::decode_aper(&mut decoder)?;
    decode_ngap_pdu_raw(pdu)
}

/// Decode the raw NgapPdu (without re-decoding from bytes)
pub fn decode_ngap_pdu_raw(pdu: NgapPdu) -> NgapResult<NgapMessage> {
    match pdu {
        NgapPdu::InitiatingMessage(msg) => decode_initiating_message(msg),
        NgapPdu::SuccessfulOutcome(msg) => decode_successful_outcome(msg),
        NgapPdu::UnsuccessfulOutcome(msg) => decode_unsuccessful_outcome(msg),
    }
}

fn required<T>(value: Option<T>, ie_name: &'static str, id: ProtocolIeId) -> NgapResult<T> {
    value.ok_or(NgapError::MissingMandatoryIe {
        ie_name,
        ie_id: id.0,
    })
}

fn unsupported(code: ProcedureCode, kind: &'static str) -> NgapError {
    NgapError::UnsupportedProcedure {
        procedure_code: code.0,
        kind,
    }
}

// ============================================================================
// Dispatch
// ============================================================================

fn decode_initiating_message(msg: InitiatingMessage) -> NgapResult<NgapMessage> {
    let ies = msg.value;
    let message = match msg.procedure_code {
        ProcedureCode::NG_SETUP => NgapMessage::NgSetupRequest(parse_ng_setup_request(ies)?),
        ProcedureCode::RAN_CONFIGURATION_UPDATE => {
            NgapMessage::RanConfigurationUpdate(parse_ran_configuration_update(ies)?)
        }
        ProcedureCode::NG_RESET => NgapMessage::NgReset(parse_ng_reset(ies)?),
        ProcedureCode::ERROR_INDICATION => {
            NgapMessage::ErrorIndication(parse_error_indication(ies)?)
        }
        ProcedureCode::INITIAL_UE_MESSAGE => {
            NgapMessage::InitialUeMessage(parse_initial_ue_message(ies)?)
        }
        ProcedureCode::DOWNLINK_NAS_TRANSPORT => {
            NgapMessage::DownlinkNasTransport(parse_downlink_nas_transport(ies)?)
        }
        ProcedureCode::UPLINK_NAS_TRANSPORT => {
            NgapMessage::UplinkNasTransport(parse_uplink_nas_transport(ies)?)
        }
        ProcedureCode::NAS_NON_DELIVERY_INDICATION => {
            NgapMessage::NasNonDeliveryIndication(parse_nas_non_delivery_indication(ies)?)
        }
        ProcedureCode::INITIAL_CONTEXT_SETUP => {
            NgapMessage::InitialContextSetupRequest(parse_initial_context_setup_request(ies)?)
        }
        ProcedureCode::UE_CONTEXT_RELEASE_REQUEST => {
            NgapMessage::UeContextReleaseRequest(parse_ue_context_release_request(ies)?)
        }
        ProcedureCode::UE_CONTEXT_RELEASE => {
            NgapMessage::UeContextReleaseCommand(parse_ue_context_release_command(ies)?)
        }
        ProcedureCode::PDU_SESSION_RESOURCE_SETUP => NgapMessage::PduSessionResourceSetupRequest(
            parse_pdu_session_resource_setup_request(ies)?,
        ),
        ProcedureCode::PDU_SESSION_RESOURCE_RELEASE => {
            NgapMessage::PduSessionResourceReleaseCommand(
                parse_pdu_session_resource_release_command(ies)?,
            )
        }
        ProcedureCode::PAGING => NgapMessage::Paging(parse_paging(ies)?),
        ProcedureCode::PATH_SWITCH_REQUEST => {
            NgapMessage::PathSwitchRequest(parse_path_switch_request(ies)?)
        }
        code => return Err(unsupported(code, "InitiatingMessage")),
    };
    Ok(message)
}

fn decode_successful_outcome(msg: SuccessfulOutcome) -> NgapResult<NgapMessage> {
    let ies = msg.value;
    let message = match msg.procedure_code {
        ProcedureCode::NG_SETUP => NgapMessage::NgSetupResponse(parse_ng_setup_response(ies)?),
        ProcedureCode::RAN_CONFIGURATION_UPDATE => {
            NgapMessage::RanConfigurationUpdateAcknowledge(RanConfigurationUpdateAcknowledge)
        }
        ProcedureCode::NG_RESET => {
            NgapMessage::NgResetAcknowledge(parse_ng_reset_acknowledge(ies)?)
        }
        ProcedureCode::INITIAL_CONTEXT_SETUP => {
            let (amf_ue_ngap_id, ran_ue_ngap_id) = parse_ue_id_pair(&ies)?;
            NgapMessage::InitialContextSetupResponse(InitialContextSetupResponse {
                amf_ue_ngap_id,
                ran_ue_ngap_id,
                setup_list: parse_item_list(&ies, ProtocolIeId::PDU_SESSION_RESOURCE_SETUP_LIST_CXT_RES)?
                    .unwrap_or_default(),
                failed_list: parse_item_list(
                    &ies,
                    ProtocolIeId::PDU_SESSION_RESOURCE_FAILED_TO_SETUP_LIST_CXT_RES,
                )?
                .unwrap_or_default(),
            })
        }
        ProcedureCode::UE_CONTEXT_RELEASE => {
            let (amf_ue_ngap_id, ran_ue_ngap_id) = parse_ue_id_pair(&ies)?;
            NgapMessage::UeContextReleaseComplete(UeContextReleaseComplete {
                amf_ue_ngap_id,
                ran_ue_ngap_id,
            })
        }
        ProcedureCode::PDU_SESSION_RESOURCE_SETUP => NgapMessage::PduSessionResourceSetupResponse(
            parse_pdu_session_resource_setup_response(ies)?,
        ),
        ProcedureCode::PDU_SESSION_RESOURCE_RELEASE => {
            NgapMessage::PduSessionResourceReleaseResponse(
                parse_pdu_session_resource_release_response(ies)?,
            )
        }
        ProcedureCode::PATH_SWITCH_REQUEST => NgapMessage::PathSwitchRequestAcknowledge(
            parse_path_switch_request_acknowledge(ies)?,
        ),
        code => return Err(unsupported(code, "SuccessfulOutcome")),
    };
    Ok(message)
}

fn decode_unsuccessful_outcome(msg: UnsuccessfulOutcome) -> NgapResult<NgapMessage> {
    let ies = msg.value;
    let message = match msg.procedure_code {
        ProcedureCode::NG_SETUP => {
            let (cause, time_to_wait) = parse_cause_with_wait(&ies)?;
            NgapMessage::NgSetupFailure(NgSetupFailure {
                cause,
                time_to_wait,
            })
        }
        ProcedureCode::RAN_CONFIGURATION_UPDATE => {
            let (cause, time_to_wait) = parse_cause_with_wait(&ies)?;
            NgapMessage::RanConfigurationUpdateFailure(RanConfigurationUpdateFailure {
                cause,
                time_to_wait,
            })
        }
        ProcedureCode::INITIAL_CONTEXT_SETUP => {
            let (amf_ue_ngap_id, ran_ue_ngap_id) = parse_ue_id_pair(&ies)?;
            let cause = parse_mandatory_cause(&ies)?;
            NgapMessage::InitialContextSetupFailure(InitialContextSetupFailure {
                amf_ue_ngap_id,
                ran_ue_ngap_id,
                cause,
            })
        }
        ProcedureCode::PATH_SWITCH_REQUEST => {
            NgapMessage::PathSwitchRequestFailure(parse_path_switch_request_failure(ies)?)
        }
        code => return Err(unsupported(code, "UnsuccessfulOutcome")),
    };
    Ok(message)
}

// ============================================================================
// Shared IE groups
// ============================================================================

fn parse_ue_id_pair(ies: &ProtocolIeContainer) -> NgapResult<(u64, u32)> {
    let mut amf_ue_ngap_id = None;
    let mut ran_ue_ngap_id = None;
    for field in ies.iter() {
        match field.id {
            ProtocolIeId::AMF_UE_NGAP_ID => {
                amf_ue_ngap_id = Some(ie::decode_amf_ue_ngap_id(field)?);
            }
            ProtocolIeId::RAN_UE_NGAP_ID => {
                ran_ue_ngap_id = Some(ie::decode_ran_ue_ngap_id(field)?);
            }
            _ => {}
        }
    }
    Ok((
        required(amf_ue_ngap_id, "AMF-UE-NGAP-ID", ProtocolIeId::AMF_UE_NGAP_ID)?,
        required(ran_ue_ngap_id, "RAN-UE-NGAP-ID", ProtocolIeId::RAN_UE_NGAP_ID)?,
    ))
}

fn parse_mandatory_cause(ies: &ProtocolIeContainer) -> NgapResult<Cause> {
    let field = required(ies.find(ProtocolIeId::CAUSE), "Cause", ProtocolIeId::CAUSE)?;
    ie::decode_cause(field)
}

fn parse_cause_with_wait(ies: &ProtocolIeContainer) -> NgapResult<(Cause, Option<TimeToWait>)> {
    let cause = parse_mandatory_cause(ies)?;
    let time_to_wait = match ies.find(ProtocolIeId::TIME_TO_WAIT) {
        Some(field) => Some(ie::decode_time_to_wait(field)?),
        None => None,
    };
    Ok((cause, time_to_wait))
}

// ============================================================================
// NG Setup / RAN Configuration Update / NG Reset / Error Indication
// ============================================================================

fn parse_ng_setup_request(ies: ProtocolIeContainer) -> NgapResult<NgSetupRequest> {
    let mut global_ran_node_id = None;
    let mut ran_node_name = None;
    let mut supported_ta_list = None;
    let mut default_paging_drx = None;

    for field in ies.iter() {
        match field.id {
            ProtocolIeId::GLOBAL_RAN_NODE_ID => {
                global_ran_node_id = Some(ie::decode_global_ran_node_id(field)?);
            }
            ProtocolIeId::RAN_NODE_NAME => {
                ran_node_name = Some(ie::decode_ran_node_name(field)?);
            }
            ProtocolIeId::SUPPORTED_TA_LIST => {
                supported_ta_list = Some(ie::decode_supported_ta_list(field)?);
            }
            ProtocolIeId::DEFAULT_PAGING_DRX => {
                default_paging_drx = Some(ie::decode_paging_drx(field)?);
            }
            _ => {}
        }
    }

    Ok(NgSetupRequest {
        global_ran_node_id: required(
            global_ran_node_id,
            "GlobalRANNodeID",
            ProtocolIeId::GLOBAL_RAN_NODE_ID,
        )?,
        ran_node_name,
        supported_ta_list: required(
            supported_ta_list,
            "SupportedTAList",
            ProtocolIeId::SUPPORTED_TA_LIST,
        )?,
        default_paging_drx: required(
            default_paging_drx,
            "DefaultPagingDRX",
            ProtocolIeId::DEFAULT_PAGING_DRX,
        )?,
    })
}

fn parse_ng_setup_response(ies: ProtocolIeContainer) -> NgapResult<NgSetupResponse> {
    let mut amf_name = None;
    let mut served_guami_list = None;
    let mut relative_amf_capacity = None;
    let mut plmn_support_list = None;

    for field in ies.iter() {
        match field.id {
            ProtocolIeId::AMF_NAME => amf_name = Some(ie::decode_amf_name(field)?),
            ProtocolIeId::SERVED_GUAMI_LIST => {
                served_guami_list = Some(ie::decode_served_guami_list(field)?);
            }
            ProtocolIeId::RELATIVE_AMF_CAPACITY => {
                relative_amf_capacity = Some(ie::decode_relative_amf_capacity(field)?);
            }
            ProtocolIeId::PLMN_SUPPORT_LIST => {
                plmn_support_list = Some(ie::decode_plmn_support_list(field)?);
            }
            _ => {}
        }
    }

    Ok(NgSetupResponse {
        amf_name: required(amf_name, "AMFName", ProtocolIeId::AMF_NAME)?,
        served_guami_list: required(
            served_guami_list,
            "ServedGUAMIList",
            ProtocolIeId::SERVED_GUAMI_LIST,
        )?,
        relative_amf_capacity: required(
            relative_amf_capacity,
            "RelativeAMFCapacity",
            ProtocolIeId::RELATIVE_AMF_CAPACITY,
        )?,
        plmn_support_list: required(
            plmn_support_list,
            "PLMNSupportList",
            ProtocolIeId::PLMN_SUPPORT_LIST,
        )?,
    })
}

fn parse_ran_configuration_update(ies: ProtocolIeContainer) -> NgapResult<RanConfigurationUpdate> {
    let mut msg = RanConfigurationUpdate::default();
    for field in ies.iter() {
        match field.id {
            ProtocolIeId::RAN_NODE_NAME => {
                msg.ran_node_name = Some(ie::decode_ran_node_name(field)?);
            }
            ProtocolIeId::SUPPORTED_TA_LIST => {
                msg.supported_ta_list = Some(ie::decode_supported_ta_list(field)?);
            }
            ProtocolIeId::DEFAULT_PAGING_DRX => {
                msg.default_paging_drx = Some(ie::decode_paging_drx(field)?);
            }
            ProtocolIeId::GLOBAL_RAN_NODE_ID => {
                msg.global_ran_node_id = Some(ie::decode_global_ran_node_id(field)?);
            }
            _ => {}
        }
    }
    Ok(msg)
}

fn parse_ng_reset(ies: ProtocolIeContainer) -> NgapResult<NgReset> {
    let cause = parse_mandatory_cause(&ies)?;
    let field = required(
        ies.find(ProtocolIeId::RESET_TYPE),
        "ResetType",
        ProtocolIeId::RESET_TYPE,
    )?;
    Ok(NgReset {
        cause,
        reset_type: ie::decode_reset_type(field)?,
    })
}

fn parse_ng_reset_acknowledge(ies: ProtocolIeContainer) -> NgapResult<NgResetAcknowledge> {
    let connections = match ies.find(ProtocolIeId::UE_ASSOCIATED_LOGICAL_NG_CONNECTION_LIST) {
        Some(field) => Some(ie::decode_ng_connection_list_ie(field)?),
        None => None,
    };
    Ok(NgResetAcknowledge { connections })
}

fn parse_error_indication(ies: ProtocolIeContainer) -> NgapResult<ErrorIndication> {
    let mut msg = ErrorIndication::default();
    for field in ies.iter() {
        match field.id {
            ProtocolIeId::AMF_UE_NGAP_ID => {
                msg.amf_ue_ngap_id = Some(ie::decode_amf_ue_ngap_id(field)?);
            }
            ProtocolIeId::RAN_UE_NGAP_ID => {
                msg.ran_ue_ngap_id = Some(ie::decode_ran_ue_ngap_id(field)?);
            }
            ProtocolIeId::CAUSE => msg.cause = Some(ie::decode_cause(field)?),
            _ => {}
        }
    }
    Ok(msg)
}

// ============================================================================
// NAS Transport
// ============================================================================

fn parse_initial_ue_message(ies: ProtocolIeContainer) -> NgapResult<InitialUeMessage> {
    let mut ran_ue_ngap_id = None;
    let mut nas_pdu = None;
    let mut user_location_info = None;
    let mut rrc_establishment_cause = None;
    let mut five_g_s_tmsi = None;
    let mut ue_context_request = false;

    for field in ies.iter() {
        match field.id {
            ProtocolIeId::RAN_UE_NGAP_ID => {
                ran_ue_ngap_id = Some(ie::decode_ran_ue_ngap_id(field)?);
            }
            ProtocolIeId::NAS_PDU => nas_pdu = Some(ie::decode_nas_pdu(field)?),
            ProtocolIeId::USER_LOCATION_INFORMATION => {
                user_location_info = Some(ie::decode_user_location_info(field)?);
            }
            ProtocolIeId::RRC_ESTABLISHMENT_CAUSE => {
                rrc_establishment_cause = Some(ie::decode_rrc_establishment_cause(field)?);
            }
            ProtocolIeId::FIVE_G_S_TMSI => {
                five_g_s_tmsi = Some(ie::decode_five_g_s_tmsi(field)?);
            }
            ProtocolIeId::UE_CONTEXT_REQUEST => {
                ue_context_request = ie::decode_ue_context_request(field)?;
            }
            _ => {}
        }
    }

    Ok(InitialUeMessage {
        ran_ue_ngap_id: required(ran_ue_ngap_id, "RAN-UE-NGAP-ID", ProtocolIeId::RAN_UE_NGAP_ID)?,
        nas_pdu: required(nas_pdu, "NAS-PDU", ProtocolIeId::NAS_PDU)?,
        user_location_info: required(
            user_location_info,
            "UserLocationInformation",
            ProtocolIeId::USER_LOCATION_INFORMATION,
        )?,
        rrc_establishment_cause: required(
            rrc_establishment_cause,
            "RRCEstablishmentCause",
            ProtocolIeId::RRC_ESTABLISHMENT_CAUSE,
        )?,
        five_g_s_tmsi,
        ue_context_request,
    })
}

fn parse_nas_pdu(ies: &ProtocolIeContainer) -> NgapResult<Vec<u8>> {
    let field = required(ies.find(ProtocolIeId::NAS_PDU), "NAS-PDU", ProtocolIeId::NAS_PDU)?;
    ie::decode_nas_pdu(field)
}

fn parse_optional_nas_pdu(ies: &ProtocolIeContainer) -> NgapResult<Option<Vec<u8>>> {
    match ies.find(ProtocolIeId::NAS_PDU) {
        Some(field) => Ok(Some(ie::decode_nas_pdu(field)?)),
        None => Ok(None),
    }
}

fn parse_downlink_nas_transport(ies: ProtocolIeContainer) -> NgapResult<DownlinkNasTransport> {
    let (amf_ue_ngap_id, ran_ue_ngap_id) = parse_ue_id_pair(&ies)?;
    Ok(DownlinkNasTransport {
        amf_ue_ngap_id,
        ran_ue_ngap_id,
        nas_pdu: parse_nas_pdu(&ies)?,
    })
}

fn parse_uplink_nas_transport(ies: ProtocolIeContainer) -> NgapResult<UplinkNasTransport> {
    let (amf_ue_ngap_id, ran_ue_ngap_id) = parse_ue_id_pair(&ies)?;
    let uli = required(
        ies.find(ProtocolIeId::USER_LOCATION_INFORMATION),
        "UserLocationInformation",
        ProtocolIeId::USER_LOCATION_INFORMATION,
    )?;
    Ok(UplinkNasTransport {
        amf_ue_ngap_id,
        ran_ue_ngap_id,
        nas_pdu: parse_nas_pdu(&ies)?,
        user_location_info: ie::decode_user_location_info(uli)?,
    })
}

fn parse_nas_non_delivery_indication(
    ies: ProtocolIeContainer,
) -> NgapResult<NasNonDeliveryIndication> {
    let (amf_ue_ngap_id, ran_ue_ngap_id) = parse_ue_id_pair(&ies)?;
    Ok(NasNonDeliveryIndication {
        amf_ue_ngap_id,
        ran_ue_ngap_id,
        nas_pdu: parse_nas_pdu(&ies)?,
        cause: parse_mandatory_cause(&ies)?,
    })
}

// ============================================================================
// Initial Context Setup / UE Context Release
// ============================================================================

fn parse_initial_context_setup_request(
    ies: ProtocolIeContainer,
) -> NgapResult<InitialContextSetupRequest> {
    let (amf_ue_ngap_id, ran_ue_ngap_id) = parse_ue_id_pair(&ies)?;
    let mut ue_ambr = None;
    let mut guami = None;
    let mut allowed_nssai = None;
    let mut ue_security_capabilities = None;
    let mut security_key = None;
    let mut pdu_session_list = Vec::new();

    for field in ies.iter() {
        match field.id {
            ProtocolIeId::UE_AGGREGATE_MAXIMUM_BIT_RATE => {
                ue_ambr = Some(ie::decode_ue_ambr(field)?);
            }
            ProtocolIeId::GUAMI => guami = Some(ie::decode_guami(field)?),
            ProtocolIeId::ALLOWED_NSSAI => allowed_nssai = Some(ie::decode_allowed_nssai(field)?),
            ProtocolIeId::UE_SECURITY_CAPABILITIES => {
                ue_security_capabilities = Some(ie::decode_ue_security_capabilities(field)?);
            }
            ProtocolIeId::SECURITY_KEY => security_key = Some(ie::decode_security_key(field)?),
            ProtocolIeId::PDU_SESSION_RESOURCE_SETUP_LIST_CXT_REQ => {
                pdu_session_list = ie::decode_pdu_session_setup_list(field)?;
            }
            _ => {}
        }
    }

    Ok(InitialContextSetupRequest {
        amf_ue_ngap_id,
        ran_ue_ngap_id,
        ue_ambr,
        guami: required(guami, "GUAMI", ProtocolIeId::GUAMI)?,
        allowed_nssai: required(allowed_nssai, "AllowedNSSAI", ProtocolIeId::ALLOWED_NSSAI)?,
        ue_security_capabilities: required(
            ue_security_capabilities,
            "UESecurityCapabilities",
            ProtocolIeId::UE_SECURITY_CAPABILITIES,
        )?,
        security_key: required(security_key, "SecurityKey", ProtocolIeId::SECURITY_KEY)?,
        pdu_session_list,
        nas_pdu: parse_optional_nas_pdu(&ies)?,
    })
}

fn parse_ue_context_release_request(
    ies: ProtocolIeContainer,
) -> NgapResult<UeContextReleaseRequest> {
    let (amf_ue_ngap_id, ran_ue_ngap_id) = parse_ue_id_pair(&ies)?;
    Ok(UeContextReleaseRequest {
        amf_ue_ngap_id,
        ran_ue_ngap_id,
        cause: parse_mandatory_cause(&ies)?,
    })
}

fn parse_ue_context_release_command(
    ies: ProtocolIeContainer,
) -> NgapResult<UeContextReleaseCommand> {
    let field = required(
        ies.find(ProtocolIeId::UE_NGAP_IDS),
        "UE-NGAP-IDs",
        ProtocolIeId::UE_NGAP_IDS,
    )?;
    Ok(UeContextReleaseCommand {
        ue_ngap_ids: ie::decode_ue_ngap_ids(field)?,
        cause: parse_mandatory_cause(&ies)?,
    })
}

// ============================================================================
// PDU Session Resource
// ============================================================================

fn parse_item_list(
    ies: &ProtocolIeContainer,
    id: ProtocolIeId,
) -> NgapResult<Option<Vec<PduSessionResourceItem>>> {
    match ies.find(id) {
        Some(field) => Ok(Some(ie::decode_pdu_session_item_list(field)?)),
        None => Ok(None),
    }
}

fn parse_pdu_session_resource_setup_request(
    ies: ProtocolIeContainer,
) -> NgapResult<PduSessionResourceSetupRequest> {
    let (amf_ue_ngap_id, ran_ue_ngap_id) = parse_ue_id_pair(&ies)?;
    let list = required(
        ies.find(ProtocolIeId::PDU_SESSION_RESOURCE_SETUP_LIST_SU_REQ),
        "PDUSessionResourceSetupListSUReq",
        ProtocolIeId::PDU_SESSION_RESOURCE_SETUP_LIST_SU_REQ,
    )?;
    let ue_ambr = match ies.find(ProtocolIeId::UE_AGGREGATE_MAXIMUM_BIT_RATE) {
        Some(field) => Some(ie::decode_ue_ambr(field)?),
        None => None,
    };
    Ok(PduSessionResourceSetupRequest {
        amf_ue_ngap_id,
        ran_ue_ngap_id,
        nas_pdu: parse_optional_nas_pdu(&ies)?,
        pdu_session_list: ie::decode_pdu_session_setup_list(list)?,
        ue_ambr,
    })
}

fn parse_pdu_session_resource_setup_response(
    ies: ProtocolIeContainer,
) -> NgapResult<PduSessionResourceSetupResponse> {
    let (amf_ue_ngap_id, ran_ue_ngap_id) = parse_ue_id_pair(&ies)?;
    Ok(PduSessionResourceSetupResponse {
        amf_ue_ngap_id,
        ran_ue_ngap_id,
        setup_list: parse_item_list(&ies, ProtocolIeId::PDU_SESSION_RESOURCE_SETUP_LIST_SU_RES)?
            .unwrap_or_default(),
        failed_list: parse_item_list(
            &ies,
            ProtocolIeId::PDU_SESSION_RESOURCE_FAILED_TO_SETUP_LIST_SU_RES,
        )?
        .unwrap_or_default(),
    })
}

fn parse_pdu_session_resource_release_command(
    ies: ProtocolIeContainer,
) -> NgapResult<PduSessionResourceReleaseCommand> {
    let (amf_ue_ngap_id, ran_ue_ngap_id) = parse_ue_id_pair(&ies)?;
    let id = ProtocolIeId::PDU_SESSION_RESOURCE_TO_RELEASE_LIST_REL_CMD;
    Ok(PduSessionResourceReleaseCommand {
        amf_ue_ngap_id,
        ran_ue_ngap_id,
        nas_pdu: parse_optional_nas_pdu(&ies)?,
        pdu_session_list: required(
            parse_item_list(&ies, id)?,
            "PDUSessionResourceToReleaseListRelCmd",
            id,
        )?,
    })
}

fn parse_pdu_session_resource_release_response(
    ies: ProtocolIeContainer,
) -> NgapResult<PduSessionResourceReleaseResponse> {
    let (amf_ue_ngap_id, ran_ue_ngap_id) = parse_ue_id_pair(&ies)?;
    let id = ProtocolIeId::PDU_SESSION_RESOURCE_RELEASED_LIST_REL_RES;
    Ok(PduSessionResourceReleaseResponse {
        amf_ue_ngap_id,
        ran_ue_ngap_id,
        released_list: required(
            parse_item_list(&ies, id)?,
            "PDUSessionResourceReleasedListRelRes",
            id,
        )?,
    })
}

// ============================================================================
// Paging / Path Switch
// ============================================================================

fn parse_paging(ies: ProtocolIeContainer) -> NgapResult<Paging> {
    let identity = required(
        ies.find(ProtocolIeId::UE_PAGING_IDENTITY),
        "UEPagingIdentity",
        ProtocolIeId::UE_PAGING_IDENTITY,
    )?;
    let tais = required(
        ies.find(ProtocolIeId::TAI_LIST_FOR_PAGING),
        "TAIListForPaging",
        ProtocolIeId::TAI_LIST_FOR_PAGING,
    )?;
    let paging_drx = match ies.find(ProtocolIeId::PAGING_DRX) {
        Some(field) => Some(ie::decode_paging_drx(field)?),
        None => None,
    };
    Ok(Paging {
        ue_paging_identity: ie::decode_ue_paging_identity(identity)?,
        paging_drx,
        tai_list_for_paging: ie::decode_tai_list_for_paging(tais)?,
    })
}

fn parse_path_switch_request(ies: ProtocolIeContainer) -> NgapResult<PathSwitchRequest> {
    let mut ran_ue_ngap_id = None;
    let mut source_amf_ue_ngap_id = None;
    let mut user_location_info = None;
    let mut ue_security_capabilities = None;
    let mut pdu_session_list = None;

    for field in ies.iter() {
        match field.id {
            ProtocolIeId::RAN_UE_NGAP_ID => {
                ran_ue_ngap_id = Some(ie::decode_ran_ue_ngap_id(field)?);
            }
            ProtocolIeId::SOURCE_AMF_UE_NGAP_ID => {
                source_amf_ue_ngap_id = Some(ie::decode_amf_ue_ngap_id(field)?);
            }
            ProtocolIeId::USER_LOCATION_INFORMATION => {
                user_location_info = Some(ie::decode_user_location_info(field)?);
            }
            ProtocolIeId::UE_SECURITY_CAPABILITIES => {
                ue_security_capabilities = Some(ie::decode_ue_security_capabilities(field)?);
            }
            ProtocolIeId::PDU_SESSION_RESOURCE_TO_BE_SWITCHED_DL_LIST => {
                pdu_session_list = Some(ie::decode_pdu_session_item_list(field)?);
            }
            _ => {}
        }
    }

    Ok(PathSwitchRequest {
        ran_ue_ngap_id: required(ran_ue_ngap_id, "RAN-UE-NGAP-ID", ProtocolIeId::RAN_UE_NGAP_ID)?,
        source_amf_ue_ngap_id: required(
            source_amf_ue_ngap_id,
            "SourceAMF-UE-NGAP-ID",
            ProtocolIeId::SOURCE_AMF_UE_NGAP_ID,
        )?,
        user_location_info: required(
            user_location_info,
            "UserLocationInformation",
            ProtocolIeId::USER_LOCATION_INFORMATION,
        )?,
        ue_security_capabilities: required(
            ue_security_capabilities,
            "UESecurityCapabilities",
            ProtocolIeId::UE_SECURITY_CAPABILITIES,
        )?,
        pdu_session_list: required(
            pdu_session_list,
            "PDUSessionResourceToBeSwitchedDLList",
            ProtocolIeId::PDU_SESSION_RESOURCE_TO_BE_SWITCHED_DL_LIST,
        )?,
    })
}

fn parse_path_switch_request_acknowledge(
    ies: ProtocolIeContainer,
) -> NgapResult<PathSwitchRequestAcknowledge> {
    let (amf_ue_ngap_id, ran_ue_ngap_id) = parse_ue_id_pair(&ies)?;
    let ue_security_capabilities = match ies.find(ProtocolIeId::UE_SECURITY_CAPABILITIES) {
        Some(field) => Some(ie::decode_ue_security_capabilities(field)?),
        None => None,
    };
    let security_context = required(
        ies.find(ProtocolIeId::SECURITY_CONTEXT),
        "SecurityContext",
        ProtocolIeId::SECURITY_CONTEXT,
    )?;
    let switched = ProtocolIeId::PDU_SESSION_RESOURCE_SWITCHED_LIST;
    let allowed = required(
        ies.find(ProtocolIeId::ALLOWED_NSSAI),
        "AllowedNSSAI",
        ProtocolIeId::ALLOWED_NSSAI,
    )?;
    Ok(PathSwitchRequestAcknowledge {
        amf_ue_ngap_id,
        ran_ue_ngap_id,
        ue_security_capabilities,
        security_context: ie::decode_security_context(security_context)?,
        pdu_session_list: required(
            parse_item_list(&ies, switched)?,
            "PDUSessionResourceSwitchedList",
            switched,
        )?,
        allowed_nssai: ie::decode_allowed_nssai(allowed)?,
    })
}

fn parse_path_switch_request_failure(
    ies: ProtocolIeContainer,
) -> NgapResult<PathSwitchRequestFailure> {
    let (amf_ue_ngap_id, ran_ue_ngap_id) = parse_ue_id_pair(&ies)?;
    let id = ProtocolIeId::PDU_SESSION_RESOURCE_RELEASED_LIST_PS_FAIL;
    Ok(PathSwitchRequestFailure {
        amf_ue_ngap_id,
        ran_ue_ngap_id,
        released_list: required(
            parse_item_list(&ies, id)?,
            "PDUSessionResourceReleasedListPSFail",
            id,
        )?,
    })
}
