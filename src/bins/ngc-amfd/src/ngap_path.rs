//! NGAP Path - gNB associations
//!
//! Owns the per-association tasks and every outbound NGAP send:
//! - accept loop over the SCTP listener
//! - reader task per association, decoding NGAP and dispatching it
//! - writer task per association, draining the connection table queue
//! - send helpers that revalidate a UE's serving RAN before use

use std::net::SocketAddr;
use std::sync::Arc;

use ngc_nas::common::types::SecurityHeaderType;
use ngc_ngap::{parser, Cause, CauseProtocol, NgapMessage};
use ngc_sctp::{ue_stream, SctpListener, NGAP_PPID, NON_UE_SIGNALLING_STREAM};

use crate::context::AmfContext;
use crate::error::{AmfError, AmfResult};
use crate::ngap_build;
use crate::ngap_handler;
use crate::timer::{self, AmfTimer, TimerPayload};
use crate::transport::{ConnectionHandle, Transport, TransportEvent};
use crate::ue::{ServingRan, UeContext};
use crate::worker::{AmfWorkers, WorkItem};

/// Unspecified PPID, accepted from peers that do not set one
const UNSPECIFIED_PPID: u32 = 0;

// ============================================================================
// Associations
// ============================================================================

/// Accept gNB associations until the task is aborted
pub async fn accept_loop(ctx: Arc<AmfContext>, workers: AmfWorkers, listener: SctpListener) {
    log::info!("NGAP server listening on {}", listener.local_addr());
    loop {
        match listener.accept().await {
            Ok((association, peer)) => {
                log::info!("gNB-N2 accepted[{}]", peer);
                tokio::spawn(serve_association(ctx.clone(), workers.clone(), association));
            }
            Err(e) => {
                log::error!("NGAP accept failed: {}", e);
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}

/// Run one association to completion: register it, start its writer, read
/// frames until it closes, then clean up the registry and the UEs it served.
pub async fn serve_association<T: Transport>(ctx: Arc<AmfContext>, workers: AmfWorkers, mut transport: T) {
    let peer = transport.peer_addr();
    let (handle, mut outbound) = ctx.connections.register(peer, ctx.config.ngap.outbound_streams);
    log::debug!("[{}] association from {}", handle, peer);

    let writer_transport = transport.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = writer_transport.send(frame.stream, frame.data).await {
                log::warn!("[{}] send failed: {}", handle, e);
                break;
            }
        }
        writer_transport.close();
    });

    loop {
        match transport.recv().await {
            Ok(TransportEvent::Connected { outbound_streams }) => {
                ctx.connections.set_outbound_streams(handle, outbound_streams);
                log::debug!("[{}] {} outbound stream(s)", handle, outbound_streams);
            }
            Ok(TransportEvent::Frame { stream, ppid, data }) => {
                if ppid != NGAP_PPID && ppid != UNSPECIFIED_PPID {
                    log::warn!("[{}] Dropped frame with PPID {} on stream {}", handle, ppid, stream);
                    continue;
                }
                handle_frame(&ctx, &workers, handle, peer, &data).await;
            }
            Ok(TransportEvent::Disconnected) => break,
            Err(e) => {
                log::warn!("[{}] association error: {}", handle, e);
                break;
            }
        }
    }

    on_disconnect(&ctx, handle).await;
    transport.close();
    let _ = writer.await;
}

/// Decode one frame and route it. Non-UE signalling is handled here, in
/// arrival order; UE-associated messages go to the UE's work queue.
async fn handle_frame(ctx: &AmfContext, workers: &AmfWorkers, handle: ConnectionHandle, peer: SocketAddr, data: &[u8]) {
    let message = match parser::decode_ngap_pdu(data) {
        Ok(message) => message,
        Err(e) => {
            log::warn!("[{}] Undecodable NGAP PDU from {} ({} bytes): {}", handle, peer, data.len(), e);
            return;
        }
    };
    log::debug!("[{}] {} received", handle, message.name());

    match message {
        NgapMessage::NgSetupRequest(request) => ngap_handler::handle_ng_setup_request(ctx, handle, peer, request),
        NgapMessage::RanConfigurationUpdate(update) => {
            ngap_handler::handle_ran_configuration_update(ctx, handle, update)
        }
        NgapMessage::NgReset(reset) => ngap_handler::handle_ng_reset(ctx, handle, reset).await,
        NgapMessage::ErrorIndication(indication) => ngap_handler::handle_error_indication(ctx, handle, &indication),
        other => route_ue_message(ctx, workers, handle, other),
    }
}

fn route_ue_message(ctx: &AmfContext, workers: &AmfWorkers, handle: ConnectionHandle, message: NgapMessage) {
    let (amf_ue_ngap_id, ran_ue_ngap_id) = message.ue_ngap_ids();
    if !ctx.ran.contains(handle) {
        log::warn!("[{}] {} before NG Setup", handle, message.name());
        send_error_indication(
            ctx,
            handle,
            amf_ue_ngap_id,
            ran_ue_ngap_id,
            Cause::Protocol(CauseProtocol::MessageNotCompatibleWithReceiverState),
        );
        return;
    }

    let amf_ue_ngap_id = match (&message, amf_ue_ngap_id) {
        (NgapMessage::InitialUeMessage(_), _) => ctx.allocate_amf_ue_ngap_id(),
        (_, Some(id)) => id,
        (_, None) => {
            log::warn!("[{}] Unexpected {} from RAN", handle, message.name());
            send_error_indication(
                ctx,
                handle,
                None,
                ran_ue_ngap_id,
                Cause::Protocol(CauseProtocol::MessageNotCompatibleWithReceiverState),
            );
            return;
        }
    };

    let name = message.name();
    if let Err(e) = workers.submit(amf_ue_ngap_id, WorkItem::Ngap { handle, amf_ue_ngap_id, message }) {
        log::warn!("[{}] {} dropped (amf_ue_ngap_id={}): {}", handle, name, amf_ue_ngap_id, e);
    }
}

/// Transport closed: forget the association and its RAN context, and drop
/// the RAN key of every UE it was serving. UE contexts themselves survive.
pub async fn on_disconnect(ctx: &AmfContext, handle: ConnectionHandle) {
    ctx.connections.close(handle);
    let label = match ctx.ran.remove(handle) {
        Some(ran) => ran.label(),
        None => handle.to_string(),
    };

    let mut detached = 0;
    for (_, ue_handle) in ctx.ues.handles() {
        let mut ue = ue_handle.lock().await;
        if ue.serving_ran.map(|s| s.handle) == Some(handle) {
            ue.detach_ran();
            timer::cancel(ctx, ue.amf_ue_ngap_id, AmfTimer::NgHolding);
            detached += 1;
        }
    }
    log::info!("[{}] gNB-N2 closed, {} UE(s) detached", label, detached);
}

// ============================================================================
// Sending
// ============================================================================

pub fn send_to_ran(ctx: &AmfContext, handle: ConnectionHandle, stream: u16, message: &NgapMessage) -> AmfResult<()> {
    let data = ngc_ngap::builder::build(message)?;
    ctx.connections.send(handle, stream, data)?;
    log::debug!("[{}] {} sent on stream {}", handle, message.name(), stream);
    Ok(())
}

/// Non-UE-associated signalling, stream 0
pub fn send_non_ue(ctx: &AmfContext, handle: ConnectionHandle, message: &NgapMessage) -> AmfResult<()> {
    send_to_ran(ctx, handle, NON_UE_SIGNALLING_STREAM, message)
}

/// UE-associated signalling on the stream picked for `ran_ue_ngap_id`
pub fn send_to_ran_ue(
    ctx: &AmfContext,
    handle: ConnectionHandle,
    ran_ue_ngap_id: u32,
    message: &NgapMessage,
) -> AmfResult<()> {
    let streams = ctx.connections.outbound_streams(handle).ok_or(AmfError::ConnectionClosed(handle))?;
    send_to_ran(ctx, handle, ue_stream(u64::from(ran_ue_ngap_id), streams), message)
}

/// Best-effort Error Indication
pub fn send_error_indication(
    ctx: &AmfContext,
    handle: ConnectionHandle,
    amf_ue_ngap_id: Option<u64>,
    ran_ue_ngap_id: Option<u32>,
    cause: Cause,
) {
    let message = ngap_build::build_error_indication(amf_ue_ngap_id, ran_ue_ngap_id, cause);
    if let Err(e) = send_non_ue(ctx, handle, &message) {
        log::warn!("[{}] ErrorIndication not sent: {}", handle, e);
    }
}

/// The UE's serving RAN, if it is still the association registered under
/// the recorded RAN identity
pub fn live_serving_ran(ctx: &AmfContext, ue: &UeContext) -> AmfResult<ServingRan> {
    match ue.serving_ran {
        Some(serving) if ctx.ran.is_live(serving.handle, &serving.ran_id) => Ok(serving),
        Some(serving) => Err(AmfError::ConnectionClosed(serving.handle)),
        None => Err(AmfError::ConnectionClosed(ue.last_ran.unwrap_or(ConnectionHandle::new(0)))),
    }
}

/// Send a UE-associated NGAP message through the UE's serving RAN
pub fn send_to_ue(ctx: &AmfContext, ue: &UeContext, message: &NgapMessage) -> AmfResult<()> {
    let serving = live_serving_ran(ctx, ue)?;
    send_to_ran_ue(ctx, serving.handle, serving.ran_ue_ngap_id, message)
}

/// Apply the UE's NAS security to a plain 5GMM message. `None` picks
/// integrity protected and ciphered; plain goes out as is.
pub fn protect_nas(ue: &mut UeContext, plain: &[u8], header: Option<SecurityHeaderType>) -> AmfResult<Vec<u8>> {
    match (ue.security.as_mut(), header) {
        (None, _) | (_, Some(SecurityHeaderType::PlainNas)) => Ok(plain.to_vec()),
        (Some(security), header) => {
            security.protect_downlink(header.unwrap_or(SecurityHeaderType::IntegrityProtectedAndCiphered), plain)
        }
    }
}

/// Downlink NAS Transport to the UE
pub fn send_nas(
    ctx: &AmfContext,
    ue: &mut UeContext,
    plain: &[u8],
    header: Option<SecurityHeaderType>,
) -> AmfResult<()> {
    let serving = live_serving_ran(ctx, ue)?;
    let nas_pdu = protect_nas(ue, plain, header)?;
    let message = ngap_build::build_downlink_nas_transport(ue.amf_ue_ngap_id, serving.ran_ue_ngap_id, nas_pdu);
    send_to_ran_ue(ctx, serving.handle, serving.ran_ue_ngap_id, &message)
}

/// Send a NAS message that expects an answer, with `timer` armed to
/// retransmit it. A failed first send is left to the timer.
pub fn send_nas_with_timer(
    ctx: &AmfContext,
    ue: &mut UeContext,
    plain: Vec<u8>,
    header: Option<SecurityHeaderType>,
    timer: AmfTimer,
) -> AmfResult<()> {
    timer::arm(ctx, ue.amf_ue_ngap_id, timer, TimerPayload::Nas { plain: plain.clone(), header })?;
    if let Err(e) = send_nas(ctx, ue, &plain, header) {
        log::warn!("[{}] NAS message not delivered, {} will retry: {}", ue.label(), timer, e);
    }
    Ok(())
}

// ============================================================================
// Paging
// ============================================================================

/// Page the UE in its last TAI through every RAN serving it.
/// Returns the number of RANs paged.
pub fn send_paging(ctx: &AmfContext, ue: &UeContext) -> AmfResult<usize> {
    let guti = ue.guti.ok_or_else(|| AmfError::not_found(format!("5G-GUTI of {}", ue.label())))?;
    let tai = ue.last_tai.ok_or_else(|| AmfError::not_found(format!("last TAI of {}", ue.label())))?;

    let mut paged = 0;
    for ran in ctx.ran.serving(&tai) {
        let message = ngap_build::build_paging(&guti, tai, ran.default_paging_drx);
        match send_non_ue(ctx, ran.handle, &message) {
            Ok(()) => paged += 1,
            Err(e) => log::warn!("[{}] Paging for {} not sent: {}", ran.label(), ue.label(), e),
        }
    }
    if paged == 0 {
        return Err(AmfError::ConnectionClosed(ue.last_ran.unwrap_or(ConnectionHandle::new(0))));
    }
    Ok(paged)
}

/// Page a UE and supervise the attempt with T3513
pub async fn page_ue(ctx: &AmfContext, amf_ue_ngap_id: u64) -> AmfResult<usize> {
    let handle = ctx
        .ues
        .get(amf_ue_ngap_id)
        .ok_or_else(|| AmfError::not_found(format!("UE amf_ue_ngap_id={}", amf_ue_ngap_id)))?;
    let ue = handle.lock().await;
    let paged = send_paging(ctx, &ue)?;
    timer::arm(ctx, amf_ue_ngap_id, AmfTimer::T3513, TimerPayload::Paging)?;
    log::info!("[{}] Paging sent to {} RAN(s)", ue.label(), paged);
    Ok(paged)
}
