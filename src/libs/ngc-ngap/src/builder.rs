//! NGAP Message Builders
//!
//! Functions for building NGAP PDU messages from high-level types.
//! Each function constructs the IE container, wraps it in the appropriate
//! PDU wrapper (InitiatingMessage, SuccessfulOutcome, UnsuccessfulOutcome),
//! and APER-encodes it to bytes.

use ngc_asn1c::ngap::ies::ProtocolIeContainer;
use ngc_asn1c::ngap::pdu::*;
use ngc_asn1c::ngap::types::{Criticality, ProcedureCode, ProtocolIeId};
use ngc_asn1c::per::{AperEncode, AperEncoder};

use crate::error::NgapResult;
use crate::ie;
use crate::parser::NgapMessage;
use crate::types::*;

/// Encode an NgapPdu to APER bytes
pub fn encode_pdu(pdu: &NgapPdu) -> NgapResult<Vec<u8>> {
    let mut encoder = AperEncoder::new();
    pdu.encode_aper(&mut encoder)?;
    encoder.align();
    Ok(encoder.into_bytes().to_vec())
}

fn initiating(
    code: ProcedureCode,
    criticality: Criticality,
    container: ProtocolIeContainer,
) -> NgapResult<Vec<u8>> {
    encode_pdu(&NgapPdu::InitiatingMessage(InitiatingMessage::new(
        code,
        criticality,
        container,
    )))
}

fn successful(
    code: ProcedureCode,
    criticality: Criticality,
    container: ProtocolIeContainer,
) -> NgapResult<Vec<u8>> {
    encode_pdu(&NgapPdu::SuccessfulOutcome(SuccessfulOutcome::new(
        code,
        criticality,
        container,
    )))
}

fn unsuccessful(
    code: ProcedureCode,
    criticality: Criticality,
    container: ProtocolIeContainer,
) -> NgapResult<Vec<u8>> {
    encode_pdu(&NgapPdu::UnsuccessfulOutcome(UnsuccessfulOutcome::new(
        code,
        criticality,
        container,
    )))
}

/// Build the wire form of any supported message
pub fn build(msg: &NgapMessage) -> NgapResult<Vec<u8>> {
    match msg {
        NgapMessage::NgSetupRequest(m) => build_ng_setup_request(m),
        NgapMessage::NgSetupResponse(m) => build_ng_setup_response(m),
        NgapMessage::NgSetupFailure(m) => build_ng_setup_failure(m),
        NgapMessage::RanConfigurationUpdate(m) => build_ran_configuration_update(m),
        NgapMessage::RanConfigurationUpdateAcknowledge(m) => {
            build_ran_configuration_update_acknowledge(m)
        }
        NgapMessage::RanConfigurationUpdateFailure(m) => build_ran_configuration_update_failure(m),
        NgapMessage::NgReset(m) => build_ng_reset(m),
        NgapMessage::NgResetAcknowledge(m) => build_ng_reset_acknowledge(m),
        NgapMessage::ErrorIndication(m) => build_error_indication(m),
        NgapMessage::InitialUeMessage(m) => build_initial_ue_message(m),
        NgapMessage::DownlinkNasTransport(m) => build_downlink_nas_transport(m),
        NgapMessage::UplinkNasTransport(m) => build_uplink_nas_transport(m),
        NgapMessage::NasNonDeliveryIndication(m) => build_nas_non_delivery_indication(m),
        NgapMessage::InitialContextSetupRequest(m) => build_initial_context_setup_request(m),
        NgapMessage::InitialContextSetupResponse(m) => build_initial_context_setup_response(m),
        NgapMessage::InitialContextSetupFailure(m) => build_initial_context_setup_failure(m),
        NgapMessage::UeContextReleaseRequest(m) => build_ue_context_release_request(m),
        NgapMessage::UeContextReleaseCommand(m) => build_ue_context_release_command(m),
        NgapMessage::UeContextReleaseComplete(m) => build_ue_context_release_complete(m),
        NgapMessage::PduSessionResourceSetupRequest(m) => {
            build_pdu_session_resource_setup_request(m)
        }
        NgapMessage::PduSessionResourceSetupResponse(m) => {
            build_pdu_session_resource_setup_response(m)
        }
        NgapMessage::PduSessionResourceReleaseCommand(m) => {
            build_pdu_session_resource_release_command(m)
        }
        NgapMessage::PduSessionResourceReleaseResponse(m) => {
            build_pdu_session_resource_release_response(m)
        }
        NgapMessage::Paging(m) => build_paging(m),
        NgapMessage::PathSwitchRequest(m) => build_path_switch_request(m),
        NgapMessage::PathSwitchRequestAcknowledge(m) => build_path_switch_request_acknowledge(m),
        NgapMessage::PathSwitchRequestFailure(m) => build_path_switch_request_failure(m),
    }
}

// ============================================================================
// NG Setup Procedure
// ============================================================================

/// Build an NG Setup Request PDU
pub fn build_ng_setup_request(msg: &NgSetupRequest) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();

    // IE: GlobalRANNodeID (mandatory)
    ie::encode_global_ran_node_id(&mut container, &msg.global_ran_node_id)?;

    // IE: RANNodeName (optional)
    if let Some(ref name) = msg.ran_node_name {
        ie::encode_ran_node_name(&mut container, name)?;
    }

    // IE: SupportedTAList (mandatory)
    ie::encode_supported_ta_list(&mut container, &msg.supported_ta_list)?;

    // IE: DefaultPagingDRX (mandatory)
    ie::encode_default_paging_drx(&mut container, msg.default_paging_drx)?;

    initiating(ProcedureCode::NG_SETUP, Criticality::Reject, container)
}

/// Build an NG Setup Response PDU
pub fn build_ng_setup_response(msg: &NgSetupResponse) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_amf_name(&mut container, &msg.amf_name)?;
    ie::encode_served_guami_list(&mut container, &msg.served_guami_list)?;
    ie::encode_relative_amf_capacity(&mut container, msg.relative_amf_capacity)?;
    ie::encode_plmn_support_list(&mut container, &msg.plmn_support_list)?;

    successful(ProcedureCode::NG_SETUP, Criticality::Reject, container)
}

/// Build an NG Setup Failure PDU
pub fn build_ng_setup_failure(msg: &NgSetupFailure) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_cause(&mut container, &msg.cause)?;
    if let Some(ttw) = msg.time_to_wait {
        ie::encode_time_to_wait(&mut container, ttw)?;
    }

    unsuccessful(ProcedureCode::NG_SETUP, Criticality::Reject, container)
}

// ============================================================================
// RAN Configuration Update Procedure
// ============================================================================

pub fn build_ran_configuration_update(msg: &RanConfigurationUpdate) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    if let Some(ref name) = msg.ran_node_name {
        ie::encode_ran_node_name(&mut container, name)?;
    }
    if let Some(ref list) = msg.supported_ta_list {
        ie::encode_supported_ta_list(&mut container, list)?;
    }
    if let Some(drx) = msg.default_paging_drx {
        ie::encode_default_paging_drx(&mut container, drx)?;
    }
    if let Some(ref id) = msg.global_ran_node_id {
        ie::encode_global_ran_node_id(&mut container, id)?;
    }

    initiating(
        ProcedureCode::RAN_CONFIGURATION_UPDATE,
        Criticality::Reject,
        container,
    )
}

pub fn build_ran_configuration_update_acknowledge(
    _msg: &RanConfigurationUpdateAcknowledge,
) -> NgapResult<Vec<u8>> {
    successful(
        ProcedureCode::RAN_CONFIGURATION_UPDATE,
        Criticality::Reject,
        ProtocolIeContainer::new(),
    )
}

pub fn build_ran_configuration_update_failure(
    msg: &RanConfigurationUpdateFailure,
) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_cause(&mut container, &msg.cause)?;
    if let Some(ttw) = msg.time_to_wait {
        ie::encode_time_to_wait(&mut container, ttw)?;
    }

    unsuccessful(
        ProcedureCode::RAN_CONFIGURATION_UPDATE,
        Criticality::Reject,
        container,
    )
}

// ============================================================================
// NG Reset / Error Indication
// ============================================================================

pub fn build_ng_reset(msg: &NgReset) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_cause(&mut container, &msg.cause)?;
    ie::encode_reset_type(&mut container, &msg.reset_type)?;

    initiating(ProcedureCode::NG_RESET, Criticality::Reject, container)
}

pub fn build_ng_reset_acknowledge(msg: &NgResetAcknowledge) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    if let Some(ref list) = msg.connections {
        ie::encode_ng_connection_list_ie(&mut container, list)?;
    }

    successful(ProcedureCode::NG_RESET, Criticality::Reject, container)
}

pub fn build_error_indication(msg: &ErrorIndication) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    if let Some(id) = msg.amf_ue_ngap_id {
        ie::encode_amf_ue_ngap_id(&mut container, id)?;
    }
    if let Some(id) = msg.ran_ue_ngap_id {
        ie::encode_ran_ue_ngap_id(&mut container, id)?;
    }
    if let Some(ref cause) = msg.cause {
        ie::encode_cause(&mut container, cause)?;
    }

    initiating(ProcedureCode::ERROR_INDICATION, Criticality::Ignore, container)
}

// ============================================================================
// NAS Transport Procedures
// ============================================================================

/// Build an Initial UE Message PDU
pub fn build_initial_ue_message(msg: &InitialUeMessage) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_ran_ue_ngap_id(&mut container, msg.ran_ue_ngap_id)?;
    ie::encode_nas_pdu(&mut container, &msg.nas_pdu)?;
    ie::encode_user_location_info(&mut container, &msg.user_location_info)?;
    ie::encode_rrc_establishment_cause(&mut container, msg.rrc_establishment_cause)?;
    if let Some(ref tmsi) = msg.five_g_s_tmsi {
        ie::encode_five_g_s_tmsi(&mut container, tmsi)?;
    }
    if msg.ue_context_request {
        ie::encode_ue_context_request(&mut container)?;
    }

    initiating(
        ProcedureCode::INITIAL_UE_MESSAGE,
        Criticality::Ignore,
        container,
    )
}

/// Build a Downlink NAS Transport PDU
pub fn build_downlink_nas_transport(msg: &DownlinkNasTransport) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_amf_ue_ngap_id(&mut container, msg.amf_ue_ngap_id)?;
    ie::encode_ran_ue_ngap_id(&mut container, msg.ran_ue_ngap_id)?;
    ie::encode_nas_pdu(&mut container, &msg.nas_pdu)?;

    initiating(
        ProcedureCode::DOWNLINK_NAS_TRANSPORT,
        Criticality::Ignore,
        container,
    )
}

/// Build an Uplink NAS Transport PDU
pub fn build_uplink_nas_transport(msg: &UplinkNasTransport) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_amf_ue_ngap_id(&mut container, msg.amf_ue_ngap_id)?;
    ie::encode_ran_ue_ngap_id(&mut container, msg.ran_ue_ngap_id)?;
    ie::encode_nas_pdu(&mut container, &msg.nas_pdu)?;
    ie::encode_user_location_info(&mut container, &msg.user_location_info)?;

    initiating(
        ProcedureCode::UPLINK_NAS_TRANSPORT,
        Criticality::Ignore,
        container,
    )
}

pub fn build_nas_non_delivery_indication(msg: &NasNonDeliveryIndication) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_amf_ue_ngap_id(&mut container, msg.amf_ue_ngap_id)?;
    ie::encode_ran_ue_ngap_id(&mut container, msg.ran_ue_ngap_id)?;
    ie::encode_nas_pdu(&mut container, &msg.nas_pdu)?;
    ie::encode_cause(&mut container, &msg.cause)?;

    initiating(
        ProcedureCode::NAS_NON_DELIVERY_INDICATION,
        Criticality::Ignore,
        container,
    )
}

// ============================================================================
// Initial Context Setup Procedure
// ============================================================================

/// Build an Initial Context Setup Request PDU
pub fn build_initial_context_setup_request(
    msg: &InitialContextSetupRequest,
) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_amf_ue_ngap_id(&mut container, msg.amf_ue_ngap_id)?;
    ie::encode_ran_ue_ngap_id(&mut container, msg.ran_ue_ngap_id)?;
    if let Some(ref ambr) = msg.ue_ambr {
        ie::encode_ue_ambr(&mut container, ambr)?;
    }
    ie::encode_guami(&mut container, &msg.guami)?;
    ie::encode_allowed_nssai(&mut container, &msg.allowed_nssai)?;
    ie::encode_ue_security_capabilities(&mut container, &msg.ue_security_capabilities)?;
    ie::encode_security_key(&mut container, &msg.security_key)?;
    if !msg.pdu_session_list.is_empty() {
        ie::encode_pdu_session_setup_list(
            &mut container,
            ProtocolIeId::PDU_SESSION_RESOURCE_SETUP_LIST_CXT_REQ,
            &msg.pdu_session_list,
        )?;
    }
    if let Some(ref nas) = msg.nas_pdu {
        ie::encode_nas_pdu(&mut container, nas)?;
    }

    initiating(
        ProcedureCode::INITIAL_CONTEXT_SETUP,
        Criticality::Reject,
        container,
    )
}

pub fn build_initial_context_setup_response(
    msg: &InitialContextSetupResponse,
) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_amf_ue_ngap_id(&mut container, msg.amf_ue_ngap_id)?;
    ie::encode_ran_ue_ngap_id(&mut container, msg.ran_ue_ngap_id)?;
    if !msg.setup_list.is_empty() {
        ie::encode_pdu_session_item_list(
            &mut container,
            ProtocolIeId::PDU_SESSION_RESOURCE_SETUP_LIST_CXT_RES,
            &msg.setup_list,
        )?;
    }
    if !msg.failed_list.is_empty() {
        ie::encode_pdu_session_item_list(
            &mut container,
            ProtocolIeId::PDU_SESSION_RESOURCE_FAILED_TO_SETUP_LIST_CXT_RES,
            &msg.failed_list,
        )?;
    }

    successful(
        ProcedureCode::INITIAL_CONTEXT_SETUP,
        Criticality::Reject,
        container,
    )
}

pub fn build_initial_context_setup_failure(
    msg: &InitialContextSetupFailure,
) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_amf_ue_ngap_id(&mut container, msg.amf_ue_ngap_id)?;
    ie::encode_ran_ue_ngap_id(&mut container, msg.ran_ue_ngap_id)?;
    ie::encode_cause(&mut container, &msg.cause)?;

    unsuccessful(
        ProcedureCode::INITIAL_CONTEXT_SETUP,
        Criticality::Reject,
        container,
    )
}

// ============================================================================
// UE Context Release Procedures
// ============================================================================

pub fn build_ue_context_release_request(msg: &UeContextReleaseRequest) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_amf_ue_ngap_id(&mut container, msg.amf_ue_ngap_id)?;
    ie::encode_ran_ue_ngap_id(&mut container, msg.ran_ue_ngap_id)?;
    ie::encode_cause(&mut container, &msg.cause)?;

    initiating(
        ProcedureCode::UE_CONTEXT_RELEASE_REQUEST,
        Criticality::Ignore,
        container,
    )
}

/// Build a UE Context Release Command PDU
pub fn build_ue_context_release_command(msg: &UeContextReleaseCommand) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_ue_ngap_ids(&mut container, &msg.ue_ngap_ids)?;
    ie::encode_cause(&mut container, &msg.cause)?;

    initiating(
        ProcedureCode::UE_CONTEXT_RELEASE,
        Criticality::Reject,
        container,
    )
}

pub fn build_ue_context_release_complete(msg: &UeContextReleaseComplete) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_amf_ue_ngap_id(&mut container, msg.amf_ue_ngap_id)?;
    ie::encode_ran_ue_ngap_id(&mut container, msg.ran_ue_ngap_id)?;

    successful(
        ProcedureCode::UE_CONTEXT_RELEASE,
        Criticality::Reject,
        container,
    )
}

// ============================================================================
// PDU Session Resource Procedures
// ============================================================================

pub fn build_pdu_session_resource_setup_request(
    msg: &PduSessionResourceSetupRequest,
) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_amf_ue_ngap_id(&mut container, msg.amf_ue_ngap_id)?;
    ie::encode_ran_ue_ngap_id(&mut container, msg.ran_ue_ngap_id)?;
    if let Some(ref nas) = msg.nas_pdu {
        ie::encode_nas_pdu(&mut container, nas)?;
    }
    ie::encode_pdu_session_setup_list(
        &mut container,
        ProtocolIeId::PDU_SESSION_RESOURCE_SETUP_LIST_SU_REQ,
        &msg.pdu_session_list,
    )?;
    if let Some(ref ambr) = msg.ue_ambr {
        ie::encode_ue_ambr(&mut container, ambr)?;
    }

    initiating(
        ProcedureCode::PDU_SESSION_RESOURCE_SETUP,
        Criticality::Reject,
        container,
    )
}

pub fn build_pdu_session_resource_setup_response(
    msg: &PduSessionResourceSetupResponse,
) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_amf_ue_ngap_id(&mut container, msg.amf_ue_ngap_id)?;
    ie::encode_ran_ue_ngap_id(&mut container, msg.ran_ue_ngap_id)?;
    if !msg.setup_list.is_empty() {
        ie::encode_pdu_session_item_list(
            &mut container,
            ProtocolIeId::PDU_SESSION_RESOURCE_SETUP_LIST_SU_RES,
            &msg.setup_list,
        )?;
    }
    if !msg.failed_list.is_empty() {
        ie::encode_pdu_session_item_list(
            &mut container,
            ProtocolIeId::PDU_SESSION_RESOURCE_FAILED_TO_SETUP_LIST_SU_RES,
            &msg.failed_list,
        )?;
    }

    successful(
        ProcedureCode::PDU_SESSION_RESOURCE_SETUP,
        Criticality::Reject,
        container,
    )
}

pub fn build_pdu_session_resource_release_command(
    msg: &PduSessionResourceReleaseCommand,
) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_amf_ue_ngap_id(&mut container, msg.amf_ue_ngap_id)?;
    ie::encode_ran_ue_ngap_id(&mut container, msg.ran_ue_ngap_id)?;
    if let Some(ref nas) = msg.nas_pdu {
        ie::encode_nas_pdu(&mut container, nas)?;
    }
    ie::encode_pdu_session_item_list(
        &mut container,
        ProtocolIeId::PDU_SESSION_RESOURCE_TO_RELEASE_LIST_REL_CMD,
        &msg.pdu_session_list,
    )?;

    initiating(
        ProcedureCode::PDU_SESSION_RESOURCE_RELEASE,
        Criticality::Reject,
        container,
    )
}

pub fn build_pdu_session_resource_release_response(
    msg: &PduSessionResourceReleaseResponse,
) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_amf_ue_ngap_id(&mut container, msg.amf_ue_ngap_id)?;
    ie::encode_ran_ue_ngap_id(&mut container, msg.ran_ue_ngap_id)?;
    ie::encode_pdu_session_item_list(
        &mut container,
        ProtocolIeId::PDU_SESSION_RESOURCE_RELEASED_LIST_REL_RES,
        &msg.released_list,
    )?;

    successful(
        ProcedureCode::PDU_SESSION_RESOURCE_RELEASE,
        Criticality::Reject,
        container,
    )
}

// ============================================================================
// Paging / Path Switch
// ============================================================================

pub fn build_paging(msg: &Paging) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_ue_paging_identity(&mut container, &msg.ue_paging_identity)?;
    if let Some(drx) = msg.paging_drx {
        ie::encode_paging_drx(&mut container, drx)?;
    }
    ie::encode_tai_list_for_paging(&mut container, &msg.tai_list_for_paging)?;

    initiating(ProcedureCode::PAGING, Criticality::Ignore, container)
}

pub fn build_path_switch_request(msg: &PathSwitchRequest) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_ran_ue_ngap_id(&mut container, msg.ran_ue_ngap_id)?;
    ie::encode_amf_ue_ngap_id_as(
        &mut container,
        ProtocolIeId::SOURCE_AMF_UE_NGAP_ID,
        msg.source_amf_ue_ngap_id,
    )?;
    ie::encode_user_location_info(&mut container, &msg.user_location_info)?;
    ie::encode_ue_security_capabilities(&mut container, &msg.ue_security_capabilities)?;
    ie::encode_pdu_session_item_list(
        &mut container,
        ProtocolIeId::PDU_SESSION_RESOURCE_TO_BE_SWITCHED_DL_LIST,
        &msg.pdu_session_list,
    )?;

    initiating(
        ProcedureCode::PATH_SWITCH_REQUEST,
        Criticality::Reject,
        container,
    )
}

pub fn build_path_switch_request_acknowledge(
    msg: &PathSwitchRequestAcknowledge,
) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_amf_ue_ngap_id(&mut container, msg.amf_ue_ngap_id)?;
    ie::encode_ran_ue_ngap_id(&mut container, msg.ran_ue_ngap_id)?;
    if let Some(ref caps) = msg.ue_security_capabilities {
        ie::encode_ue_security_capabilities(&mut container, caps)?;
    }
    ie::encode_security_context(&mut container, &msg.security_context)?;
    ie::encode_pdu_session_item_list(
        &mut container,
        ProtocolIeId::PDU_SESSION_RESOURCE_SWITCHED_LIST,
        &msg.pdu_session_list,
    )?;
    ie::encode_allowed_nssai(&mut container, &msg.allowed_nssai)?;

    successful(
        ProcedureCode::PATH_SWITCH_REQUEST,
        Criticality::Reject,
        container,
    )
}

pub fn build_path_switch_request_failure(msg: &PathSwitchRequestFailure) -> NgapResult<Vec<u8>> {
    let mut container = ProtocolIeContainer::new();
    ie::encode_amf_ue_ngap_id(&mut container, msg.amf_ue_ngap_id)?;
    ie::encode_ran_ue_ngap_id(&mut container, msg.ran_ue_ngap_id)?;
    ie::encode_pdu_session_item_list(
        &mut container,
        ProtocolIeId::PDU_SESSION_RESOURCE_RELEASED_LIST_PS_FAIL,
        &msg.released_list,
    )?;

    unsuccessful(
        ProcedureCode::PATH_SWITCH_REQUEST,
        Criticality::Reject,
        container,
    )
}
