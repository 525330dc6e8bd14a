//! NGAP Message Handling
//!
//! Non-UE-associated procedures (NG Setup, RAN Configuration Update, NG
//! Reset, Error Indication) run on the association's reader task. Everything
//! UE-associated arrives here through the UE's work queue.

use std::net::SocketAddr;

use ngc_crypt::kdf;
use ngc_ngap::transfer::{decode_path_switch_request_transfer, decode_setup_response_transfer};
use ngc_ngap::{
    Cause, CauseMisc, CauseProtocol, CauseRadioNetwork, ErrorIndication, NgReset, NgSetupRequest, NgapMessage,
    PathSwitchRequest, PduSessionResourceItem, RanConfigurationUpdate, RanConfigurationUpdateAcknowledge,
    ResetType, SupportedTaItem, Tai, UeAssociatedLogicalNgConnection,
};

use crate::context::AmfContext;
use crate::error::{AmfError, AmfResult};
use crate::gmm_handler;
use crate::ngap_build::{self, PathSwitchAck};
use crate::ngap_path;
use crate::ran::{ran_identifier, RanContext};
use crate::timer::{self, AmfTimer};
use crate::transport::ConnectionHandle;
use crate::ue::{PduSessionState, ServingRan, UeContext, UeHandle};

// ============================================================================
// Non-UE-associated procedures
// ============================================================================

/// True when some broadcast PLMN of some TA is a TAI this AMF serves
fn serves_any(ctx: &AmfContext, supported_ta_list: &[SupportedTaItem]) -> bool {
    supported_ta_list.iter().any(|ta| {
        ta.broadcast_plmn_list
            .iter()
            .any(|plmn| ctx.served.serves_tai(&Tai { plmn_identity: plmn.plmn_identity, tac: ta.tac }))
    })
}

pub fn handle_ng_setup_request(ctx: &AmfContext, handle: ConnectionHandle, peer: SocketAddr, request: NgSetupRequest) {
    let identifier = ran_identifier(&request.global_ran_node_id);
    log::info!(
        "[{}] NGSetupRequest from {} ({} TA(s))",
        identifier,
        peer,
        request.supported_ta_list.len()
    );

    let cause = if request.supported_ta_list.is_empty() {
        Some(Cause::Misc(CauseMisc::Unspecified))
    } else if !serves_any(ctx, &request.supported_ta_list) {
        Some(ngap_build::unknown_plmn())
    } else {
        None
    };
    if let Some(cause) = cause {
        log::warn!("[{}] NG Setup failed: {:?}", identifier, cause);
        if let Err(e) = ngap_path::send_non_ue(ctx, handle, &ngap_build::build_ng_setup_failure(cause)) {
            log::warn!("[{}] NGSetupFailure not sent: {}", identifier, e);
        }
        return;
    }

    let ran = RanContext {
        handle,
        global_ran_node_id: request.global_ran_node_id,
        name: request.ran_node_name,
        address: peer,
        supported_ta_list: request.supported_ta_list,
        default_paging_drx: request.default_paging_drx,
    };
    let label = ran.label();
    ctx.ran.upsert(ran);

    let response = ngap_build::build_ng_setup_response(&ctx.config, &ctx.served);
    match ngap_path::send_non_ue(ctx, handle, &response) {
        Ok(()) => log::info!("[{}] NG Setup complete ({} RAN(s))", label, ctx.ran.len()),
        Err(e) => log::warn!("[{}] NGSetupResponse not sent: {}", label, e),
    }
}

pub fn handle_ran_configuration_update(ctx: &AmfContext, handle: ConnectionHandle, update: RanConfigurationUpdate) {
    let Some(current) = ctx.ran.get(handle) else {
        log::warn!("[{}] RANConfigurationUpdate before NG Setup", handle);
        ngap_path::send_error_indication(
            ctx,
            handle,
            None,
            None,
            Cause::Protocol(CauseProtocol::MessageNotCompatibleWithReceiverState),
        );
        return;
    };

    let mut ran = (*current).clone();
    if let Some(list) = update.supported_ta_list {
        if !serves_any(ctx, &list) {
            log::warn!("[{}] RAN configuration update names no served TAI", ran.label());
            let failure = ngap_build::build_ran_configuration_update_failure(ngap_build::unknown_plmn());
            if let Err(e) = ngap_path::send_non_ue(ctx, handle, &failure) {
                log::warn!("[{}] RANConfigurationUpdateFailure not sent: {}", ran.label(), e);
            }
            return;
        }
        ran.supported_ta_list = list;
    }
    if let Some(name) = update.ran_node_name {
        ran.name = Some(name);
    }
    if let Some(drx) = update.default_paging_drx {
        ran.default_paging_drx = drx;
    }
    if let Some(id) = update.global_ran_node_id {
        ran.global_ran_node_id = id;
    }
    let label = ran.label();
    ctx.ran.upsert(ran);

    let ack = NgapMessage::RanConfigurationUpdateAcknowledge(RanConfigurationUpdateAcknowledge);
    match ngap_path::send_non_ue(ctx, handle, &ack) {
        Ok(()) => log::info!("[{}] RAN configuration updated", label),
        Err(e) => log::warn!("[{}] RANConfigurationUpdateAcknowledge not sent: {}", label, e),
    }
}

/// NG Reset: the listed UE-associated connections (or all of them) are gone
/// on the RAN side. UE contexts survive without a serving RAN.
pub async fn handle_ng_reset(ctx: &AmfContext, handle: ConnectionHandle, reset: NgReset) {
    let Some(ran) = ctx.ran.get(handle) else {
        log::warn!("[{}] NGReset before NG Setup", handle);
        ngap_path::send_error_indication(
            ctx,
            handle,
            None,
            None,
            Cause::Protocol(CauseProtocol::MessageNotCompatibleWithReceiverState),
        );
        return;
    };
    log::info!("[{}] NGReset: {:?}", ran.label(), reset.cause);

    let (listed, connections) = match reset.reset_type {
        ResetType::NgInterface => (None, None),
        ResetType::PartOfNgInterface(list) => (Some(list.clone()), Some(list)),
    };

    let mut detached = 0;
    for (_, ue_handle) in ctx.ues.handles() {
        let mut ue = ue_handle.lock().await;
        let Some(serving) = ue.serving_ran.filter(|s| s.handle == handle) else {
            continue;
        };
        let affected = match &listed {
            None => true,
            Some(list) => list.iter().any(|c| matches_connection(c, ue.amf_ue_ngap_id, serving.ran_ue_ngap_id)),
        };
        if affected {
            ue.detach_ran();
            timer::cancel(ctx, ue.amf_ue_ngap_id, AmfTimer::NgHolding);
            detached += 1;
        }
    }

    let ack = ngap_build::build_ng_reset_acknowledge(connections);
    match ngap_path::send_non_ue(ctx, handle, &ack) {
        Ok(()) => log::info!("[{}] NG Reset acknowledged, {} UE(s) detached", ran.label(), detached),
        Err(e) => log::warn!("[{}] NGResetAcknowledge not sent: {}", ran.label(), e),
    }
}

fn matches_connection(connection: &UeAssociatedLogicalNgConnection, amf_ue_ngap_id: u64, ran_ue_ngap_id: u32) -> bool {
    match (connection.amf_ue_ngap_id, connection.ran_ue_ngap_id) {
        (Some(amf), _) => amf == amf_ue_ngap_id,
        (None, Some(ran)) => ran == ran_ue_ngap_id,
        (None, None) => false,
    }
}

pub fn handle_error_indication(ctx: &AmfContext, handle: ConnectionHandle, indication: &ErrorIndication) {
    let label = ctx.ran.get(handle).map(|r| r.label()).unwrap_or_else(|| handle.to_string());
    log::warn!(
        "[{}] ErrorIndication (amf_ue_ngap_id={:?}, ran_ue_ngap_id={:?}): {:?}",
        label,
        indication.amf_ue_ngap_id,
        indication.ran_ue_ngap_id,
        indication.cause
    );
}

// ============================================================================
// UE-associated procedures
// ============================================================================

/// Run one UE-associated message. `amf_ue_ngap_id` is freshly allocated for
/// an Initial UE Message and taken from the message otherwise.
pub async fn handle_ue_message(
    ctx: &AmfContext,
    handle: ConnectionHandle,
    amf_ue_ngap_id: u64,
    message: NgapMessage,
) {
    let (_, ran_ue_ngap_id) = message.ue_ngap_ids();
    let message = match message {
        NgapMessage::InitialUeMessage(initial) => {
            gmm_handler::handle_initial_ue_message(ctx, handle, amf_ue_ngap_id, initial).await;
            return;
        }
        other => other,
    };

    let Some(ue_handle) = ctx.ues.get(amf_ue_ngap_id) else {
        if let NgapMessage::UeContextReleaseComplete(_) = message {
            log::debug!("[{}] UEContextReleaseComplete for removed UE (amf_ue_ngap_id={})", handle, amf_ue_ngap_id);
        } else {
            log::warn!("[{}] {} for unknown amf_ue_ngap_id={}", handle, message.name(), amf_ue_ngap_id);
            ngap_path::send_error_indication(
                ctx,
                handle,
                Some(amf_ue_ngap_id),
                ran_ue_ngap_id,
                Cause::RadioNetwork(CauseRadioNetwork::UnknownLocalUeNgapId),
            );
        }
        return;
    };

    // The RAN's side of the UE association must match what the context
    // recorded, except for a path switch which moves it to a new RAN.
    if !matches!(message, NgapMessage::PathSwitchRequest(_)) {
        let mut ue = ue_handle.lock().await;
        let consistent = ue.serving_ran.map(|s| (s.handle, s.ran_ue_ngap_id)) == ran_ue_ngap_id.map(|r| (handle, r));
        if !consistent {
            if let NgapMessage::UeContextReleaseComplete(_) = message {
                log::debug!("[{}] Late UEContextReleaseComplete", ue.label());
            } else {
                log::warn!(
                    "[{}] {} with inconsistent RAN UE NGAP ID {:?} from {}",
                    ue.label(),
                    message.name(),
                    ran_ue_ngap_id,
                    handle
                );
                ngap_path::send_error_indication(
                    ctx,
                    handle,
                    Some(amf_ue_ngap_id),
                    ran_ue_ngap_id,
                    Cause::RadioNetwork(CauseRadioNetwork::InconsistentRemoteUeNgapId),
                );
            }
            return;
        }
        ue.last_activity = ctx.now();
    }

    match message {
        NgapMessage::UplinkNasTransport(uplink) => {
            ue_handle.lock().await.last_tai = Some(*uplink.user_location_info.tai());
            gmm_handler::handle_uplink_nas(ctx, &ue_handle, &uplink.nas_pdu).await;
        }
        NgapMessage::NasNonDeliveryIndication(indication) => {
            let ue = ue_handle.lock().await;
            log::warn!("[{}] NAS non delivery: {:?}", ue.label(), indication.cause);
        }
        NgapMessage::InitialContextSetupResponse(response) => {
            log::info!("[{}] Initial context setup complete", ue_handle.lock().await.label());
            apply_session_setup(ctx, &ue_handle, &response.setup_list, &response.failed_list).await;
        }
        NgapMessage::InitialContextSetupFailure(failure) => {
            let mut ue = ue_handle.lock().await;
            log::warn!("[{}] Initial context setup failed: {:?}", ue.label(), failure.cause);
            gmm_handler::abandon(ctx, &mut ue);
        }
        NgapMessage::UeContextReleaseRequest(request) => {
            let mut ue = ue_handle.lock().await;
            log::info!("[{}] UE context release requested: {:?}", ue.label(), request.cause);
            gmm_handler::release_ue_connection(ctx, &mut ue, request.cause);
        }
        NgapMessage::UeContextReleaseComplete(_) => {
            let mut ue = ue_handle.lock().await;
            handle_ue_context_release_complete(ctx, &mut ue);
        }
        NgapMessage::PduSessionResourceSetupResponse(response) => {
            apply_session_setup(ctx, &ue_handle, &response.setup_list, &response.failed_list).await;
        }
        NgapMessage::PduSessionResourceReleaseResponse(response) => {
            let ue = ue_handle.lock().await;
            let ids: Vec<u8> = response.released_list.iter().map(|i| i.pdu_session_id).collect();
            log::info!("[{}] PDU session resources released: {:?}", ue.label(), ids);
        }
        NgapMessage::PathSwitchRequest(request) => {
            handle_path_switch_request(ctx, handle, &ue_handle, request).await;
        }
        other => {
            log::warn!("[{}] Unexpected {} from RAN", handle, other.name());
            ngap_path::send_error_indication(
                ctx,
                handle,
                Some(amf_ue_ngap_id),
                ran_ue_ngap_id,
                Cause::Protocol(CauseProtocol::MessageNotCompatibleWithReceiverState),
            );
        }
    }
}

fn handle_ue_context_release_complete(ctx: &AmfContext, ue: &mut UeContext) {
    timer::cancel(ctx, ue.amf_ue_ngap_id, AmfTimer::NgHolding);
    ue.detach_ran();
    // Downlink tunnels ended in the released RAN UE context
    for session in ue.sessions.values_mut() {
        session.dl_tunnel = None;
    }
    // A registration that lost its NG connection cannot finish
    if !ue.state().is_registered() && ue.fsm.procedure != crate::gmm_sm::Procedure::None {
        gmm_handler::abandon(ctx, ue);
    }
    log::info!("[{}] UE context released ({})", ue.label(), ue.state());
}

/// Downlink tunnels the RAN reported for established or reactivated
/// sessions; sessions it could not set up are dropped
async fn apply_session_setup(
    ctx: &AmfContext,
    ue_handle: &UeHandle,
    setup_list: &[PduSessionResourceItem],
    failed_list: &[PduSessionResourceItem],
) {
    if setup_list.is_empty() && failed_list.is_empty() {
        return;
    }
    let (label, failed) = {
        let mut ue = ue_handle.lock().await;
        let label = ue.label();
        for item in setup_list {
            let Some(session) = ue.sessions.get_mut(&item.pdu_session_id) else {
                log::warn!("[{}] Setup response for unknown PDU session {}", label, item.pdu_session_id);
                continue;
            };
            match decode_setup_response_transfer(&item.transfer) {
                Ok(transfer) => {
                    session.dl_tunnel = Some(transfer.dl_ngu_up_tnl_information);
                    session.state = PduSessionState::Active;
                    log::info!("[{}] PDU session {} active", label, item.pdu_session_id);
                }
                Err(e) => log::warn!("[{}] PDU session {} transfer undecodable: {}", label, item.pdu_session_id, e),
            }
        }
        let mut failed = Vec::new();
        for item in failed_list {
            if let Some(session) = ue.sessions.remove(&item.pdu_session_id) {
                log::warn!("[{}] PDU session {} setup failed on RAN", label, item.pdu_session_id);
                failed.push(session.upf_handle);
            }
        }
        if ue.state().is_registered() {
            let next = ue.session_state();
            ue.fsm.transition(next);
        }
        (label, failed)
    };
    for upf_handle in failed {
        gmm_handler::release_upf(ctx, &label, upf_handle);
    }
}

/// Xn handover completion: the target RAN takes over the UE association
async fn handle_path_switch_request(
    ctx: &AmfContext,
    target: ConnectionHandle,
    ue_handle: &UeHandle,
    request: PathSwitchRequest,
) {
    let mut ue = ue_handle.lock().await;
    let psis: Vec<u8> = request.pdu_session_list.iter().map(|i| i.pdu_session_id).collect();

    match switch_path(ctx, target, &mut ue, &request) {
        Ok(ack) => match ngap_path::send_to_ran_ue(ctx, target, request.ran_ue_ngap_id, &ack) {
            Ok(()) => log::info!("[{}] Path switched to {}", ue.label(), target),
            Err(e) => log::warn!("[{}] PathSwitchRequestAcknowledge not sent: {}", ue.label(), e),
        },
        Err(e) => {
            log::warn!("[{}] Path switch to {} failed: {}", ue.label(), target, e);
            let failure = ngap_build::build_path_switch_failure(
                request.source_amf_ue_ngap_id,
                request.ran_ue_ngap_id,
                &psis,
                &Cause::RadioNetwork(CauseRadioNetwork::Unspecified),
            );
            let sent = failure.and_then(|f| ngap_path::send_to_ran_ue(ctx, target, request.ran_ue_ngap_id, &f));
            if let Err(e) = sent {
                log::warn!("[{}] PathSwitchRequestFailure not sent: {}", ue.label(), e);
            }
        }
    }
}

fn switch_path(
    ctx: &AmfContext,
    target: ConnectionHandle,
    ue: &mut UeContext,
    request: &PathSwitchRequest,
) -> AmfResult<NgapMessage> {
    if !ue.state().is_registered() {
        return Err(AmfError::InvalidState { message: "path switch".into(), state: ue.state().name() });
    }
    let source = ngap_path::live_serving_ran(ctx, ue)?;
    let (Some(security), Some(kgnb)) = (ue.security.as_ref(), ue.kgnb) else {
        return Err(AmfError::InvalidState { message: "path switch without AS keys".into(), state: ue.state().name() });
    };
    let nh = kdf::nh(&security.kamf, &ue.nh.unwrap_or(kgnb))?;

    // Sessions move only together with the UE association
    let mut tunnels = Vec::new();
    for item in &request.pdu_session_list {
        if !ue.sessions.contains_key(&item.pdu_session_id) {
            continue;
        }
        match decode_path_switch_request_transfer(&item.transfer) {
            Ok(transfer) => tunnels.push((item.pdu_session_id, transfer.dl_ngu_up_tnl_information)),
            Err(e) => log::warn!("PDU session {} path switch transfer undecodable: {}", item.pdu_session_id, e),
        }
    }
    if tunnels.is_empty() {
        return Err(AmfError::InvalidState { message: "path switch of no known PDU session".into(), state: ue.state().name() });
    }

    let target_ran = ctx.ran.get(target).ok_or(AmfError::ConnectionClosed(target))?;
    let serving = ServingRan {
        handle: target,
        ran_id: target_ran.global_ran_node_id,
        ran_ue_ngap_id: request.ran_ue_ngap_id,
    };
    // Both ends must still be registered when the UE moves
    ctx.ran
        .commit_if_live(&[source.handle, target], || ue.attach_ran(serving))
        .ok_or(AmfError::ConnectionClosed(source.handle))?;

    let mut switched = Vec::new();
    for (psi, dl_tunnel) in tunnels {
        if let Some(session) = ue.sessions.get_mut(&psi) {
            session.dl_tunnel = Some(dl_tunnel);
            switched.push((psi, session.ul_tunnel.clone()));
        }
    }

    ue.nh = Some(nh);
    ue.ncc = (ue.ncc + 1) & 0x07;
    ue.last_tai = Some(*request.user_location_info.tai());

    ngap_build::build_path_switch_ack(PathSwitchAck {
        amf_ue_ngap_id: ue.amf_ue_ngap_id,
        ran_ue_ngap_id: request.ran_ue_ngap_id,
        ncc: ue.ncc,
        nh,
        allowed_nssai: &ue.allowed_nssai,
        switched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_connection() {
        let by_amf = UeAssociatedLogicalNgConnection { amf_ue_ngap_id: Some(7), ran_ue_ngap_id: Some(1) };
        assert!(matches_connection(&by_amf, 7, 99));
        assert!(!matches_connection(&by_amf, 8, 1));

        let by_ran = UeAssociatedLogicalNgConnection { amf_ue_ngap_id: None, ran_ue_ngap_id: Some(3) };
        assert!(matches_connection(&by_ran, 100, 3));
        assert!(!matches_connection(&by_ran, 100, 4));

        let empty = UeAssociatedLogicalNgConnection { amf_ue_ngap_id: None, ran_ue_ngap_id: None };
        assert!(!matches_connection(&empty, 1, 1));
    }
}
