//! GMM Message Handler
//!
//! 5GMM procedures for one UE: registration with 5G-AKA and NAS security
//! mode control, PDU session management carried in UL/DL NAS Transport,
//! and de-registration from either side.
//!
//! Handlers take the UE's [`UeHandle`] and lock it themselves. The lock is
//! released around subscriber store and UPF calls and re-taken afterwards;
//! the UE's work queue keeps these steps ordered.

use std::sync::Arc;

use bytes::Bytes;
use ngc_crypt::kdf;
use ngc_nas::common::types::{SNssai, SecurityAlgorithms, SecurityHeaderType, UeSecurityCapability};
use ngc_nas::fiveg::{
    parse_5gsm_message, AuthenticationFailure, AuthenticationResponse, DeregistrationRequestFromUe, FiveGmmCause,
    FiveGmmMessage, FiveGsmCause, FiveGsmMessage, IdentityResponse, IdentityType, MobileIdentity,
    PayloadContainerType, RegistrationRequest, ServiceRequest, TaiList, UlNasTransport,
};
use ngc_ngap::transfer::GtpTunnel;
use ngc_ngap::{Cause, CauseNas, CauseProtocol, CauseRadioNetwork, InitialUeMessage, Tai};

use crate::auth::{self, AuthChallenge};
use crate::context::AmfContext;
use crate::error::{AmfError, AmfResult};
use crate::gmm_build;
use crate::gmm_sm::{GmmState, Procedure};
use crate::nas_security::{self, InitialNas, NasSecurityContext};
use crate::ngap_build::{self, InitialContextSetup};
use crate::ngap_path;
use crate::timer::{self, AmfTimer};
use crate::transport::ConnectionHandle;
use crate::ue::{PduSession, PduSessionState, ServingRan, Subscription, UeContext, UeHandle};

/// ABBA sent in Authentication Request and Security Mode Command
const ABBA: [u8; 2] = [0, 0];

/// Access type input of the KgNB derivation, 3GPP access
const ACCESS_TYPE_3GPP: u8 = 1;

/// Timers of the NAS procedures a new registration supersedes
const PROCEDURE_TIMERS: [AmfTimer; 4] = [AmfTimer::T3522, AmfTimer::T3550, AmfTimer::T3560, AmfTimer::T3570];

// ============================================================================
// Initial UE Message
// ============================================================================

/// Initial UE Message: the only way a UE context comes into existence
pub async fn handle_initial_ue_message(
    ctx: &AmfContext,
    handle: ConnectionHandle,
    amf_ue_ngap_id: u64,
    message: InitialUeMessage,
) {
    let Some(ran) = ctx.ran.get(handle) else {
        log::warn!("[{}] InitialUEMessage from released RAN", handle);
        return;
    };
    let serving = ServingRan { handle, ran_id: ran.global_ran_node_id, ran_ue_ngap_id: message.ran_ue_ngap_id };
    let tai = *message.user_location_info.tai();

    let initial = match nas_security::decode_initial(&message.nas_pdu) {
        Ok(initial) => initial,
        Err(e) => {
            log::warn!(
                "[{}] InitialUEMessage dropped (ran_ue_ngap_id={}): {}",
                ran.label(),
                message.ran_ue_ngap_id,
                e
            );
            return;
        }
    };

    let existing = match &initial.message {
        FiveGmmMessage::RegistrationRequest(request) => find_context(ctx, &request.mobile_identity),
        FiveGmmMessage::DeregistrationRequestFromUe(request) => find_context(ctx, &request.mobile_identity),
        FiveGmmMessage::ServiceRequest(request) => find_context(ctx, &request.s_tmsi),
        other => {
            log::warn!("[{}] {:?} in InitialUEMessage", ran.label(), other.message_type());
            let release = ngap_build::build_ue_context_release_command(
                amf_ue_ngap_id,
                Some(serving.ran_ue_ngap_id),
                Cause::Protocol(CauseProtocol::MessageNotCompatibleWithReceiverState),
            );
            if let Err(e) = ngap_path::send_to_ran_ue(ctx, handle, serving.ran_ue_ngap_id, &release) {
                log::warn!("[{}] UEContextReleaseCommand not sent: {}", ran.label(), e);
            }
            return;
        }
    };

    // State of the context the message verified under, if any
    let verified = match &existing {
        Some((old_id, ue_handle)) if initial.is_protected() => verify_initial(ue_handle, *old_id, &initial).await,
        _ => None,
    };

    if let FiveGmmMessage::ServiceRequest(_) = &initial.message {
        if !verified.is_some_and(|state| state.is_registered()) {
            reject_service(ctx, handle, amf_ue_ngap_id, serving.ran_ue_ngap_id);
            return;
        }
    }

    let ue_handle = adopt_or_create(ctx, existing, amf_ue_ngap_id, serving, tai).await;
    match initial.message {
        FiveGmmMessage::RegistrationRequest(request) => {
            handle_registration_request(ctx, &ue_handle, request, verified.is_some()).await
        }
        FiveGmmMessage::DeregistrationRequestFromUe(request) => {
            handle_deregistration_request(ctx, &ue_handle, request).await
        }
        FiveGmmMessage::ServiceRequest(request) => handle_service_request(ctx, &ue_handle, request).await,
        _ => {}
    }
}

/// Check an initial NAS message against the current security context of
/// the UE it names. Returns the UE's state when it verifies.
async fn verify_initial(ue_handle: &UeHandle, amf_ue_ngap_id: u64, initial: &InitialNas) -> Option<GmmState> {
    let mut ue = ue_handle.lock().await;
    if ue.amf_ue_ngap_id != amf_ue_ngap_id {
        return None;
    }
    let label = ue.label();
    let security = ue.security.as_mut()?;
    if initial.verify(security) {
        Some(ue.state())
    } else {
        log::warn!("[{}] {:?} failed the integrity check", label, initial.message.message_type());
        None
    }
}

/// Context already holding the identity the UE presented
fn find_context(ctx: &AmfContext, identity: &MobileIdentity) -> Option<(u64, UeHandle)> {
    match identity {
        MobileIdentity::Suci(suci) => suci.supi().and_then(|supi| ctx.ues.find_by_supi(&supi)),
        MobileIdentity::FiveGGuti(guti) if ctx.owns_guti(guti) => ctx.ues.find_by_tmsi(guti.tmsi),
        MobileIdentity::FiveGSTmsi(s_tmsi) => ctx.ues.find_by_tmsi(s_tmsi.tmsi),
        _ => None,
    }
}

/// Move a known context onto the new signalling connection, or create one
async fn adopt_or_create(
    ctx: &AmfContext,
    existing: Option<(u64, UeHandle)>,
    amf_ue_ngap_id: u64,
    serving: ServingRan,
    tai: Tai,
) -> UeHandle {
    let mut adopted = None;
    if let Some((old_id, ue_handle)) = existing {
        let mut ue = ue_handle.lock().await;
        // Removed while we waited for the lock
        if ue.amf_ue_ngap_id == old_id && ctx.ues.rekey(old_id, amf_ue_ngap_id) {
            timer::cancel_all(ctx, old_id);
            if let Some(previous) = ue.detach_ran() {
                release_stale_connection(ctx, old_id, previous);
            }
            ue.amf_ue_ngap_id = amf_ue_ngap_id;
            ue.fsm.amf_ue_ngap_id = amf_ue_ngap_id;
            log::info!(
                "[{}] Known UE on a new NG connection (amf_ue_ngap_id {} -> {})",
                ue.label(),
                old_id,
                amf_ue_ngap_id
            );
            drop(ue);
            adopted = Some(ue_handle);
        }
    }

    let ue_handle = match adopted {
        Some(ue_handle) => ue_handle,
        None => ctx.ues.insert(UeContext::new(amf_ue_ngap_id, ctx.now())),
    };
    {
        let mut ue = ue_handle.lock().await;
        ue.attach_ran(serving);
        ue.last_tai = Some(tai);
        ue.last_activity = ctx.now();
    }
    ue_handle
}

/// Release the NG connection a UE left behind, if its RAN is still there
fn release_stale_connection(ctx: &AmfContext, amf_ue_ngap_id: u64, previous: ServingRan) {
    if !ctx.ran.is_live(previous.handle, &previous.ran_id) {
        return;
    }
    let release = ngap_build::build_ue_context_release_command(
        amf_ue_ngap_id,
        Some(previous.ran_ue_ngap_id),
        Cause::RadioNetwork(CauseRadioNetwork::ReleaseDueTo5gcGeneratedReason),
    );
    if let Err(e) = ngap_path::send_to_ran_ue(ctx, previous.handle, previous.ran_ue_ngap_id, &release) {
        log::debug!("[{}] Stale NG connection not released: {}", previous.handle, e);
    }
}

// ============================================================================
// Uplink NAS
// ============================================================================

/// 5GMM message received in Uplink NAS Transport
pub async fn handle_uplink_nas(ctx: &AmfContext, ue_handle: &UeHandle, nas_pdu: &[u8]) {
    let (message, protected) = {
        let mut ue = ue_handle.lock().await;
        let decoded = nas_security::decode_uplink(ue.security.as_mut(), nas_pdu);
        match decoded {
            Ok((message, protected)) if ue.fsm.accepts(message.message_type()) => (message, protected),
            Ok((message, _)) => {
                log::warn!(
                    "[{}] {:?} not expected in {} ({:?})",
                    ue.label(),
                    message.message_type(),
                    ue.state(),
                    ue.fsm.procedure
                );
                send_gmm_status(ctx, &mut ue, FiveGmmCause::MESSAGE_NOT_COMPATIBLE_WITH_PROTOCOL_STATE);
                return;
            }
            Err(AmfError::IntegrityCheckFailed { count }) => {
                log::warn!("[{}] NAS MAC failure (count={}), message dropped", ue.label(), count);
                return;
            }
            Err(e) => {
                log::warn!("[{}] Uplink NAS dropped: {}", ue.label(), e);
                return;
            }
        }
    };

    match message {
        FiveGmmMessage::RegistrationRequest(request) => {
            handle_registration_request(ctx, ue_handle, request, protected).await
        }
        FiveGmmMessage::IdentityResponse(response) => handle_identity_response(ctx, ue_handle, response).await,
        FiveGmmMessage::AuthenticationResponse(response) => {
            handle_authentication_response(ctx, ue_handle, response).await
        }
        FiveGmmMessage::AuthenticationFailure(failure) => {
            handle_authentication_failure(ctx, ue_handle, failure).await
        }
        FiveGmmMessage::SecurityModeComplete(_) => handle_security_mode_complete(ctx, ue_handle).await,
        FiveGmmMessage::SecurityModeReject(cause) => {
            let mut ue = ue_handle.lock().await;
            timer::cancel(ctx, ue.amf_ue_ngap_id, AmfTimer::T3560);
            log::warn!("[{}] Security mode reject [{}]", ue.label(), cause.0);
            ue.reset_security();
            reject_registration(ctx, &mut ue, FiveGmmCause::SECURITY_MODE_REJECTED_UNSPECIFIED);
        }
        FiveGmmMessage::RegistrationComplete => {
            let mut ue = ue_handle.lock().await;
            timer::cancel(ctx, ue.amf_ue_ngap_id, AmfTimer::T3550);
            ue.fsm.finish();
            let next = ue.session_state();
            ue.fsm.transition(next);
            log::info!("[{}] Registration complete", ue.label());
        }
        FiveGmmMessage::UlNasTransport(transport) => handle_ul_nas_transport(ctx, ue_handle, transport).await,
        FiveGmmMessage::DeregistrationRequestFromUe(request) => {
            handle_deregistration_request(ctx, ue_handle, request).await
        }
        FiveGmmMessage::DeregistrationAcceptToUe => {
            {
                let mut ue = ue_handle.lock().await;
                timer::cancel(ctx, ue.amf_ue_ngap_id, AmfTimer::T3522);
                log::info!("[{}] Deregistration accept", ue.label());
                release_ue_connection(ctx, &mut ue, Cause::Nas(CauseNas::Deregister));
            }
            remove_ue(ctx, ue_handle).await;
        }
        FiveGmmMessage::FiveGmmStatus(cause) => {
            let ue = ue_handle.lock().await;
            log::warn!("[{}] 5GMM status [{}]", ue.label(), cause.0);
        }
        other => {
            log::debug!("Unhandled uplink 5GMM {:?}", other.message_type());
        }
    }
}

fn send_gmm_status(ctx: &AmfContext, ue: &mut UeContext, cause: FiveGmmCause) {
    let result = gmm_build::build_gmm_status(cause).and_then(|status| ngap_path::send_nas(ctx, ue, &status, None));
    if let Err(e) = result {
        log::warn!("[{}] 5GMM status not sent: {}", ue.label(), e);
    }
}

// ============================================================================
// Registration
// ============================================================================

enum Next {
    Authenticate(String),
    Identify,
    Accept(String),
    Done,
}

/// Registration Request. A mobility or periodic update naming this AMF's
/// 5G-GUTI that verified under the current NAS security context is accepted
/// without a new authentication.
pub async fn handle_registration_request(
    ctx: &AmfContext,
    ue_handle: &UeHandle,
    request: RegistrationRequest,
    integrity_verified: bool,
) {
    let next = {
        let mut ue = ue_handle.lock().await;
        let id = ue.amf_ue_ngap_id;
        for t in PROCEDURE_TIMERS {
            timer::cancel(ctx, id, t);
        }
        timer::cancel(ctx, id, AmfTimer::NgHolding);
        ue.auth_failures = 0;
        ue.fsm.finish();
        log::info!("[{}] Registration request ({:?})", ue.label(), request.registration_type.value);

        if let Some(capability) = request.ue_security_capability {
            ue.ue_security_capability = Some(capability);
        }
        ue.requested_nssai = request.requested_nssai.map(|n| n.0).unwrap_or_default();

        let update = integrity_verified
            && request.registration_type.value.is_update()
            && matches!(request.mobile_identity, MobileIdentity::FiveGGuti(_))
            && ue.security.is_some()
            && ue.ue_security_capability.is_some();
        match ue.supi.clone() {
            Some(supi) if update => match refresh_kgnb(&mut ue) {
                Ok(()) => {
                    ue.fsm.transition(GmmState::SecurityContextEstablished);
                    log::info!("[{}] Registration update under the current NAS security context", ue.label());
                    Next::Accept(supi)
                }
                Err(e) => {
                    log::error!("[{}] KgNB derivation failed: {}", ue.label(), e);
                    reject_registration(ctx, &mut ue, FiveGmmCause::PROTOCOL_ERROR_UNSPECIFIED);
                    Next::Done
                }
            },
            _ => {
                ue.reset_security();
                ue.fsm.transition(GmmState::InitialAccessReceived);
                if ue.ue_security_capability.is_none() {
                    log::warn!("[{}] No UE security capability", ue.label());
                    reject_registration(ctx, &mut ue, FiveGmmCause::PROTOCOL_ERROR_UNSPECIFIED);
                    Next::Done
                } else {
                    match &request.mobile_identity {
                        MobileIdentity::Suci(suci) => match suci.supi() {
                            Some(supi) => {
                                ue.supi = Some(supi.clone());
                                ctx.ues.bind_supi(&supi, id);
                                Next::Authenticate(supi)
                            }
                            None => {
                                log::warn!(
                                    "[{}] SUCI protection scheme {} not supported",
                                    ue.label(),
                                    suci.protection_scheme_id
                                );
                                reject_registration(ctx, &mut ue, FiveGmmCause::UE_IDENTITY_CANNOT_BE_DERIVED);
                                Next::Done
                            }
                        },
                        _ => match ue.supi.clone() {
                            Some(supi) => Next::Authenticate(supi),
                            None => Next::Identify,
                        },
                    }
                }
            }
        }
    };

    match next {
        Next::Authenticate(supi) => start_authentication(ctx, ue_handle, &supi).await,
        Next::Identify => {
            let mut ue = ue_handle.lock().await;
            ue.fsm.start(Procedure::Identity);
            let result = gmm_build::build_identity_request(IdentityType::Suci)
                .and_then(|request| ngap_path::send_nas_with_timer(ctx, &mut ue, request, None, AmfTimer::T3570));
            if let Err(e) = result {
                log::error!("[{}] Identity request failed: {}", ue.label(), e);
            }
        }
        Next::Accept(supi) => complete_registration(ctx, ue_handle, &supi).await,
        Next::Done => {}
    }
}

async fn handle_identity_response(ctx: &AmfContext, ue_handle: &UeHandle, response: IdentityResponse) {
    let supi = {
        let mut ue = ue_handle.lock().await;
        timer::cancel(ctx, ue.amf_ue_ngap_id, AmfTimer::T3570);
        ue.fsm.finish();
        let supi = match &response.mobile_identity {
            MobileIdentity::Suci(suci) => suci.supi(),
            _ => None,
        };
        match supi {
            Some(supi) => supi,
            None => {
                log::warn!("[{}] Identity response without usable SUCI", ue.label());
                reject_registration(ctx, &mut ue, FiveGmmCause::UE_IDENTITY_CANNOT_BE_DERIVED);
                return;
            }
        }
    };

    // A context left behind under this SUPI is superseded
    if let Some((_, other)) = ctx.ues.find_by_supi(&supi) {
        if !Arc::ptr_eq(&other, ue_handle) {
            remove_ue(ctx, &other).await;
        }
    }
    {
        let mut ue = ue_handle.lock().await;
        ue.supi = Some(supi.clone());
        ctx.ues.bind_supi(&supi, ue.amf_ue_ngap_id);
    }
    start_authentication(ctx, ue_handle, &supi).await;
}

/// Registration Reject, then release of the NG connection
fn reject_registration(ctx: &AmfContext, ue: &mut UeContext, cause: FiveGmmCause) {
    timer::cancel_all(ctx, ue.amf_ue_ngap_id);
    let result = gmm_build::build_registration_reject(cause).and_then(|reject| ngap_path::send_nas(ctx, ue, &reject, None));
    if let Err(e) = result {
        log::warn!("[{}] Registration reject not sent: {}", ue.label(), e);
    }
    release_ue_connection(ctx, ue, Cause::Nas(CauseNas::Unspecified));
    ue.reset_security();
    ue.fsm.abort();
    log::warn!("[{}] Registration reject [{}]", ue.label(), cause.0);
}

// ============================================================================
// Authentication
// ============================================================================

/// Fresh challenge under a newly claimed SQN
fn new_challenge(ctx: &AmfContext, supi: &str) -> AmfResult<AuthChallenge> {
    let record = ctx.subscribers.next_sqn(supi)?;
    auth::generate_challenge(
        &record,
        ctx.subscribers.operator_code().as_ref(),
        &record.sequence_number,
        &ctx.served.serving_network_name,
    )
}

async fn start_authentication(ctx: &AmfContext, ue_handle: &UeHandle, supi: &str) {
    let challenge = new_challenge(ctx, supi);

    let mut ue = ue_handle.lock().await;
    let challenge = match challenge {
        Ok(challenge) => challenge,
        Err(AmfError::NotFound(what)) => {
            log::warn!("[{}] Unknown subscriber ({})", supi, what);
            reject_registration(ctx, &mut ue, FiveGmmCause::UE_IDENTITY_CANNOT_BE_DERIVED);
            drop(ue);
            remove_ue(ctx, ue_handle).await;
            return;
        }
        Err(e) => {
            log::error!("[{}] No authentication vector: {}", supi, e);
            reject_registration(ctx, &mut ue, FiveGmmCause::ILLEGAL_UE);
            return;
        }
    };

    ue.ngksi = (ue.ngksi + 1) % 7;
    let request = match gmm_build::build_authentication_request(ue.ngksi, &ABBA, challenge.rand, challenge.autn) {
        Ok(request) => request,
        Err(e) => {
            log::error!("[{}] Authentication request not built: {}", supi, e);
            return;
        }
    };
    ue.auth = Some(challenge);
    ue.fsm.transition(GmmState::Authenticating);
    ue.fsm.start(Procedure::Authentication);
    if let Err(e) = ngap_path::send_nas_with_timer(ctx, &mut ue, request, None, AmfTimer::T3560) {
        log::error!("[{}] Authentication request failed: {}", supi, e);
    }
}

async fn handle_authentication_response(ctx: &AmfContext, ue_handle: &UeHandle, response: AuthenticationResponse) {
    let mut ue = ue_handle.lock().await;
    timer::cancel(ctx, ue.amf_ue_ngap_id, AmfTimer::T3560);
    ue.fsm.finish();
    let Some(challenge) = ue.auth.take() else {
        log::warn!("[{}] Authentication response without challenge", ue.label());
        return;
    };

    let verified = match response.res_star {
        Some(res_star) => auth::verify_response(&challenge, &res_star),
        None => Err(AmfError::AuthenticationFailed),
    };
    if verified.is_err() {
        ue.auth_failures += 1;
        log::warn!("[{}] RES* mismatch ({} failure(s))", ue.label(), ue.auth_failures);
        if ue.auth_failures > ctx.config.auth.max_failures {
            reject_authentication(ctx, &mut ue);
            return;
        }
        let supi = ue.supi.clone();
        drop(ue);
        if let Some(supi) = supi {
            start_authentication(ctx, ue_handle, &supi).await;
        }
        return;
    }

    ue.auth_failures = 0;
    log::info!("[{}] Authentication successful", ue.label());
    if let Err(e) = start_security_mode(ctx, &mut ue, &challenge) {
        log::error!("[{}] Security mode control failed: {}", ue.label(), e);
        reject_registration(ctx, &mut ue, FiveGmmCause::PROTOCOL_ERROR_UNSPECIFIED);
    }
}

async fn handle_authentication_failure(ctx: &AmfContext, ue_handle: &UeHandle, failure: AuthenticationFailure) {
    let (supi, rand, auts) = {
        let mut ue = ue_handle.lock().await;
        timer::cancel(ctx, ue.amf_ue_ngap_id, AmfTimer::T3560);
        ue.fsm.finish();
        let challenge = ue.auth.take();
        log::warn!("[{}] Authentication failure [{}]", ue.label(), failure.gmm_cause.0);

        let resync = failure.gmm_cause == FiveGmmCause::SYNCH_FAILURE && !ue.resynced;
        match (resync, failure.auts, challenge, ue.supi.clone()) {
            (true, Some(auts), Some(challenge), Some(supi)) => {
                ue.resynced = true;
                (supi, challenge.rand, auts)
            }
            _ => {
                reject_authentication(ctx, &mut ue);
                return;
            }
        }
    };

    let resynced = ctx.subscribers.subscriber_by_identity(&supi).and_then(|record| {
        let sqn_ms = auth::resynchronise(&record, ctx.subscribers.operator_code().as_ref(), &rand, &auts)?;
        ctx.subscribers.update_sequence_number(&record.imsi, sqn_ms)
    });
    match resynced {
        Ok(()) => {
            log::info!("[{}] SQN resynchronised", supi);
            start_authentication(ctx, ue_handle, &supi).await;
        }
        Err(e) => {
            log::warn!("[{}] Resynchronisation failed: {}", supi, e);
            let mut ue = ue_handle.lock().await;
            reject_authentication(ctx, &mut ue);
        }
    }
}

/// Authentication Reject. The context stays, DE_REGISTERED.
fn reject_authentication(ctx: &AmfContext, ue: &mut UeContext) {
    timer::cancel_all(ctx, ue.amf_ue_ngap_id);
    let result = gmm_build::build_authentication_reject().and_then(|reject| ngap_path::send_nas(ctx, ue, &reject, None));
    if let Err(e) = result {
        log::warn!("[{}] Authentication reject not sent: {}", ue.label(), e);
    }
    release_ue_connection(ctx, ue, Cause::Nas(CauseNas::AuthenticationFailure));
    ue.reset_security();
    ue.auth_failures = 0;
    ue.fsm.abort();
    log::warn!("[{}] Authentication reject", ue.label());
}

// ============================================================================
// Security mode
// ============================================================================

/// Highest-preference algorithms the UE supports
pub fn select_algorithms(
    integrity_order: &[u8],
    ciphering_order: &[u8],
    capability: &UeSecurityCapability,
) -> Option<SecurityAlgorithms> {
    let integrity = integrity_order.iter().copied().find(|a| capability.supports_ia(*a))?;
    let ciphering = ciphering_order.iter().copied().find(|a| capability.supports_ea(*a))?;
    Some(SecurityAlgorithms::new(ciphering, integrity))
}

fn start_security_mode(ctx: &AmfContext, ue: &mut UeContext, challenge: &AuthChallenge) -> AmfResult<()> {
    let (Some(supi), Some(capability)) = (ue.supi.clone(), ue.ue_security_capability) else {
        return Err(AmfError::InvalidState { message: "security mode without identity".into(), state: ue.state().name() });
    };
    let kamf = auth::derive_kamf(challenge, &supi, &ABBA)?;

    let Some(algorithms) =
        select_algorithms(&ctx.served.integrity_order, &ctx.served.ciphering_order, &capability)
    else {
        log::warn!("[{}] No common NAS security algorithm (ea=0x{:02x} ia=0x{:02x})", supi, capability.ea, capability.ia);
        reject_registration(ctx, ue, FiveGmmCause::UE_SECURITY_CAPABILITIES_MISMATCH);
        return Ok(());
    };

    ue.security = Some(NasSecurityContext::new(kamf, ue.ngksi, algorithms)?);
    ue.fsm.start(Procedure::SecurityMode);
    let command = gmm_build::build_security_mode_command(algorithms, ue.ngksi, capability, &ABBA)?;
    ngap_path::send_nas_with_timer(
        ctx,
        ue,
        command,
        Some(SecurityHeaderType::IntegrityProtectedWithNewContext),
        AmfTimer::T3560,
    )
}

async fn handle_security_mode_complete(ctx: &AmfContext, ue_handle: &UeHandle) {
    let supi = {
        let mut ue = ue_handle.lock().await;
        timer::cancel(ctx, ue.amf_ue_ngap_id, AmfTimer::T3560);
        ue.fsm.finish();
        if ue.security.is_none() {
            return;
        }
        if let Err(e) = refresh_kgnb(&mut ue) {
            log::error!("[{}] KgNB derivation failed: {}", ue.label(), e);
            reject_registration(ctx, &mut ue, FiveGmmCause::PROTOCOL_ERROR_UNSPECIFIED);
            return;
        }
        ue.fsm.transition(GmmState::SecurityContextEstablished);
        log::info!("[{}] Security mode complete", ue.label());
        match ue.supi.clone() {
            Some(supi) => supi,
            None => return,
        }
    };
    complete_registration(ctx, ue_handle, &supi).await;
}

/// KgNB from the count of the last verified uplink NAS message. The NH
/// chain starts over.
fn refresh_kgnb(ue: &mut UeContext) -> AmfResult<()> {
    let security = ue
        .security
        .as_ref()
        .ok_or_else(|| AmfError::InvalidState { message: "KgNB without NAS security".into(), state: ue.state().name() })?;
    let kgnb = kdf::kgnb(&security.kamf, security.last_ul_count, ACCESS_TYPE_3GPP)?;
    ue.kgnb = Some(kgnb);
    ue.nh = None;
    ue.ncc = 0;
    Ok(())
}

/// Subscription lookup, then Registration Accept
async fn complete_registration(ctx: &AmfContext, ue_handle: &UeHandle, supi: &str) {
    let subscription = fetch_subscription(ctx, supi);

    let mut ue = ue_handle.lock().await;
    let subscription = match subscription {
        Ok(subscription) => subscription,
        Err(e) => {
            log::warn!("[{}] Subscription unavailable: {}", supi, e);
            reject_registration(ctx, &mut ue, FiveGmmCause::UE_IDENTITY_CANNOT_BE_DERIVED);
            return;
        }
    };
    if let Err(e) = accept_registration(ctx, &mut ue, subscription) {
        log::error!("[{}] Registration accept failed: {}", supi, e);
    }
}

fn fetch_subscription(ctx: &AmfContext, supi: &str) -> AmfResult<Subscription> {
    let record = ctx.subscribers.subscriber_by_identity(supi)?;
    let policy = ctx.subscribers.policy(&record.policy_id)?;
    Ok(Subscription { policy, subscribed_nssai: record.s_nssai })
}

/// Slices the UE may use: supported and subscribed (an empty subscription
/// allows all), narrowed to the requested ones unless none of them is allowed
pub fn allowed_nssai(supported: &[SNssai], subscribed: &[SNssai], requested: &[SNssai]) -> Vec<SNssai> {
    let permitted: Vec<SNssai> =
        supported.iter().filter(|s| subscribed.is_empty() || subscribed.contains(s)).copied().collect();
    let narrowed: Vec<SNssai> = permitted.iter().filter(|s| requested.contains(s)).copied().collect();
    if narrowed.is_empty() {
        permitted
    } else {
        narrowed
    }
}

/// Registration Accept carried in Initial Context Setup Request
fn accept_registration(ctx: &AmfContext, ue: &mut UeContext, subscription: Subscription) -> AmfResult<()> {
    let allowed = allowed_nssai(&ctx.served.supported_nssai(), &subscription.subscribed_nssai, &ue.requested_nssai);
    if allowed.is_empty() {
        log::warn!("[{}] No allowed network slice", ue.label());
        reject_registration(ctx, ue, FiveGmmCause::NO_NETWORK_SLICES_AVAILABLE);
        return Ok(());
    }

    let id = ue.amf_ue_ngap_id;
    let guti = ctx.allocate_guti()?;
    ctx.ues.bind_tmsi(guti.tmsi, id);
    ue.guti = Some(guti);
    ue.allowed_nssai = allowed;

    let tai_list: Vec<_> = ctx.served.tais.iter().take(TaiList::MAX_ELEMENTS).map(ngap_build::from_ngap_tai).collect();
    let accept = gmm_build::build_registration_accept(guti, &tai_list, &ue.allowed_nssai)?;
    ue.fsm.start(Procedure::RegistrationAccept);
    timer::arm(ctx, id, AmfTimer::T3550, timer::TimerPayload::Nas { plain: accept.clone(), header: None })?;

    let serving = match ngap_path::live_serving_ran(ctx, ue) {
        Ok(serving) => serving,
        Err(e) => {
            log::warn!("[{}] Registration accept deferred to {}: {}", ue.label(), AmfTimer::T3550, e);
            ue.subscription = Some(subscription);
            return Ok(());
        }
    };
    let (Some(kgnb), Some(capability)) = (ue.kgnb, ue.ue_security_capability) else {
        return Err(AmfError::InvalidState { message: "no KgNB".into(), state: ue.state().name() });
    };
    let guami = *ctx.served.primary_guami().ok_or_else(|| AmfError::Config("no GUAMI configured".into()))?;
    let nas_pdu = ngap_path::protect_nas(ue, &accept, None)?;
    let request = ngap_build::build_initial_context_setup_request(InitialContextSetup {
        amf_ue_ngap_id: id,
        ran_ue_ngap_id: serving.ran_ue_ngap_id,
        guami,
        allowed_nssai: &ue.allowed_nssai,
        ue_security_capability: &capability,
        kgnb,
        policy: Some(&subscription.policy),
        pdu_sessions: Vec::new(),
        nas_pdu,
    });
    ue.subscription = Some(subscription);
    ngap_path::send_to_ran_ue(ctx, serving.handle, serving.ran_ue_ngap_id, &request)?;
    log::info!("[{}] Registration accept, 5G-TMSI 0x{:08x}", ue.label(), guti.tmsi);
    Ok(())
}

// ============================================================================
// Service request
// ============================================================================

/// Bit of a PSI in a PDU session status bitmap
fn psi_bit(psi: u8) -> u16 {
    1u16.checked_shl(u32::from(psi)).unwrap_or(0)
}

/// Service Reject #9 on a connection with no usable context, then release
fn reject_service(ctx: &AmfContext, handle: ConnectionHandle, amf_ue_ngap_id: u64, ran_ue_ngap_id: u32) {
    let cause = FiveGmmCause::UE_IDENTITY_CANNOT_BE_DERIVED;
    log::warn!("[{}] Service reject [{}] (ran_ue_ngap_id={})", handle, cause.0, ran_ue_ngap_id);
    let result = gmm_build::build_service_reject(cause).and_then(|reject| {
        let dl = ngap_build::build_downlink_nas_transport(amf_ue_ngap_id, ran_ue_ngap_id, reject);
        ngap_path::send_to_ran_ue(ctx, handle, ran_ue_ngap_id, &dl)
    });
    if let Err(e) = result {
        log::warn!("[{}] Service reject not sent: {}", handle, e);
    }
    let release = ngap_build::build_ue_context_release_command(
        amf_ue_ngap_id,
        Some(ran_ue_ngap_id),
        Cause::Nas(CauseNas::NormalRelease),
    );
    if let Err(e) = ngap_path::send_to_ran_ue(ctx, handle, ran_ue_ngap_id, &release) {
        log::warn!("[{}] UEContextReleaseCommand not sent: {}", handle, e);
    }
}

/// Service Request of a registered UE that verified under its NAS security
/// context. Sessions the UE no longer reports are released; the rest have
/// their user plane re-established with the new UE context.
async fn handle_service_request(ctx: &AmfContext, ue_handle: &UeHandle, request: ServiceRequest) {
    let (label, dropped) = {
        let mut ue = ue_handle.lock().await;
        timer::cancel(ctx, ue.amf_ue_ngap_id, AmfTimer::T3513);
        log::info!("[{}] Service request ({:?})", ue.label(), request.service_type);

        let mut dropped = Vec::new();
        if let Some(status) = request.pdu_session_status {
            let gone: Vec<u8> = ue.sessions.keys().copied().filter(|psi| status & psi_bit(*psi) == 0).collect();
            dropped.extend(gone.into_iter().filter_map(|psi| ue.sessions.remove(&psi)));
        }
        if let Err(e) = accept_service(ctx, &mut ue) {
            log::error!("[{}] Service accept failed: {}", ue.label(), e);
            release_ue_connection(ctx, &mut ue, Cause::Nas(CauseNas::Unspecified));
        }
        (ue.label(), dropped)
    };
    for session in dropped {
        release_upf(ctx, &label, session.upf_handle);
        log::info!("[{}] PDU session {} released, not active in the UE", label, session.id);
    }
}

/// Service Accept carried in Initial Context Setup Request
fn accept_service(ctx: &AmfContext, ue: &mut UeContext) -> AmfResult<()> {
    let serving = ngap_path::live_serving_ran(ctx, ue)?;
    let Some(capability) = ue.ue_security_capability else {
        return Err(AmfError::InvalidState { message: "no UE security capability".into(), state: ue.state().name() });
    };
    refresh_kgnb(ue)?;
    let kgnb = ue.kgnb.ok_or_else(|| AmfError::InvalidState { message: "no KgNB".into(), state: ue.state().name() })?;

    let status = ue.sessions.keys().fold(0u16, |bits, psi| bits | psi_bit(*psi));
    let pdu_sessions = match &ue.subscription {
        Some(subscription) => ue
            .sessions
            .values()
            .filter(|s| s.state == PduSessionState::Active)
            .map(|s| ngap_build::build_setup_item(s, &subscription.policy))
            .collect::<AmfResult<Vec<_>>>()?,
        None => Vec::new(),
    };
    let reactivated = pdu_sessions.len();

    let guami = *ctx.served.primary_guami().ok_or_else(|| AmfError::Config("no GUAMI configured".into()))?;
    let accept = gmm_build::build_service_accept(status)?;
    let nas_pdu = ngap_path::protect_nas(ue, &accept, None)?;
    let request = ngap_build::build_initial_context_setup_request(InitialContextSetup {
        amf_ue_ngap_id: ue.amf_ue_ngap_id,
        ran_ue_ngap_id: serving.ran_ue_ngap_id,
        guami,
        allowed_nssai: &ue.allowed_nssai,
        ue_security_capability: &capability,
        kgnb,
        policy: ue.subscription.as_ref().map(|s| &s.policy),
        pdu_sessions,
        nas_pdu,
    });
    ngap_path::send_to_ran_ue(ctx, serving.handle, serving.ran_ue_ngap_id, &request)?;

    let next = ue.session_state();
    ue.fsm.transition(next);
    log::info!("[{}] Service accept, {} PDU session(s) reactivated", ue.label(), reactivated);
    Ok(())
}

// ============================================================================
// PDU sessions
// ============================================================================

async fn handle_ul_nas_transport(ctx: &AmfContext, ue_handle: &UeHandle, transport: UlNasTransport) {
    if transport.payload_container_type != PayloadContainerType::N1SmInformation {
        log::warn!("[{}] Unsupported payload container {:?}", ue_handle.lock().await.label(), transport.payload_container_type);
        return;
    }
    let (header, message) = match parse_5gsm_message(&mut Bytes::from(transport.payload_container)) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::warn!("[{}] Undecodable 5GSM message: {}", ue_handle.lock().await.label(), e);
            return;
        }
    };
    let psi = transport.pdu_session_id.unwrap_or(header.pdu_session_id);
    let pti = header.pti;

    match message {
        FiveGsmMessage::PduSessionEstablishmentRequest(_) => {
            establish_session(ctx, ue_handle, psi, pti, transport.s_nssai, transport.dnn.map(|d| d.0)).await
        }
        FiveGsmMessage::PduSessionReleaseRequest(_) => request_session_release(ctx, ue_handle, psi, pti).await,
        FiveGsmMessage::PduSessionReleaseComplete(_) => complete_session_release(ctx, ue_handle, psi).await,
        FiveGsmMessage::FiveGsmStatus(cause) => {
            log::warn!("[{}] 5GSM status [{}] for PSI {}", ue_handle.lock().await.label(), cause.0, psi);
        }
        other => {
            log::debug!("Unhandled uplink 5GSM {:?}", other);
        }
    }
}

/// PDU Session Establishment Reject in DL NAS Transport
fn reject_session(ctx: &AmfContext, ue: &mut UeContext, psi: u8, pti: u8, cause: FiveGsmCause) {
    log::warn!("[{}] PDU session {} rejected [{}]", ue.label(), psi, cause.0);
    let result = gmm_build::build_pdu_session_establishment_reject(psi, pti, cause)
        .and_then(|n1| gmm_build::build_dl_nas_transport(psi, n1, None))
        .and_then(|dl| ngap_path::send_nas(ctx, ue, &dl, None));
    if let Err(e) = result {
        log::warn!("[{}] PDU session reject not sent: {}", ue.label(), e);
    }
}

async fn establish_session(
    ctx: &AmfContext,
    ue_handle: &UeHandle,
    psi: u8,
    pti: u8,
    s_nssai: Option<SNssai>,
    dnn: Option<String>,
) {
    let (supi, subscription, s_nssai, dnn) = {
        let mut ue = ue_handle.lock().await;
        if ue.sessions.contains_key(&psi) {
            reject_session(ctx, &mut ue, psi, pti, FiveGsmCause::INVALID_PDU_SESSION_IDENTITY);
            return;
        }
        let (Some(supi), Some(subscription)) = (ue.supi.clone(), ue.subscription.clone()) else {
            reject_session(ctx, &mut ue, psi, pti, FiveGsmCause::REQUEST_REJECTED_UNSPECIFIED);
            return;
        };
        let s_nssai = match s_nssai {
            Some(s_nssai) if ue.allowed_nssai.contains(&s_nssai) => s_nssai,
            None if !ue.allowed_nssai.is_empty() => ue.allowed_nssai[0],
            _ => {
                reject_session(ctx, &mut ue, psi, pti, FiveGsmCause::REQUEST_REJECTED_UNSPECIFIED);
                return;
            }
        };
        let dnn = dnn.unwrap_or_else(|| subscription.policy.data_network.clone());
        (supi, subscription, s_nssai, dnn)
    };

    let reserved = ctx.upf.establish_session(&supi, &dnn, &subscription.policy);

    let mut ue = ue_handle.lock().await;
    let upf_session = match reserved {
        Ok(upf_session) => upf_session,
        Err(e) => {
            log::warn!("[{}] User plane for PSI {} not reserved: {}", supi, psi, e);
            let cause = match e {
                AmfError::ResourceExhausted(_) => FiveGsmCause::INSUFFICIENT_RESOURCES,
                _ => FiveGsmCause::REQUEST_REJECTED_UNSPECIFIED,
            };
            reject_session(ctx, &mut ue, psi, pti, cause);
            return;
        }
    };
    if !ctx.ues.contains(ue.amf_ue_ngap_id) {
        drop(ue);
        release_upf(ctx, &supi, upf_session.handle);
        return;
    }

    let session = PduSession {
        id: psi,
        pti,
        state: PduSessionState::Establishing,
        dnn,
        s_nssai,
        ue_address: upf_session.ue_address,
        upf_handle: upf_session.handle,
        ul_tunnel: GtpTunnel {
            transport_layer_address: upf_session.upf_address.octets().to_vec(),
            gtp_teid: upf_session.ul_teid,
        },
        dl_tunnel: None,
    };

    match send_session_setup(ctx, &mut ue, &session, &subscription) {
        Ok(()) => {
            log::info!("[{}] PDU session {} establishing, UE address {}", supi, psi, session.ue_address);
            ue.sessions.insert(psi, session);
            let next = ue.session_state();
            ue.fsm.transition(next);
        }
        Err(e) => {
            log::warn!("[{}] PDU session {} setup not sent: {}", supi, psi, e);
            drop(ue);
            release_upf(ctx, &supi, session.upf_handle);
        }
    }
}

fn send_session_setup(
    ctx: &AmfContext,
    ue: &mut UeContext,
    session: &PduSession,
    subscription: &Subscription,
) -> AmfResult<()> {
    let serving = ngap_path::live_serving_ran(ctx, ue)?;
    let accept = gmm_build::build_pdu_session_establishment_accept(session, &subscription.policy)?;
    let dl = gmm_build::build_dl_nas_transport(session.id, accept, None)?;
    let nas_pdu = ngap_path::protect_nas(ue, &dl, None)?;
    let request = ngap_build::build_pdu_session_resource_setup_request(
        ue.amf_ue_ngap_id,
        serving.ran_ue_ngap_id,
        session,
        &subscription.policy,
        nas_pdu,
    )?;
    ngap_path::send_to_ran_ue(ctx, serving.handle, serving.ran_ue_ngap_id, &request)
}

async fn request_session_release(ctx: &AmfContext, ue_handle: &UeHandle, psi: u8, pti: u8) {
    let mut ue = ue_handle.lock().await;
    if !ue.sessions.contains_key(&psi) {
        log::warn!("[{}] Release of unknown PDU session {}", ue.label(), psi);
        let result = gmm_build::build_pdu_session_release_reject(psi, pti, FiveGsmCause::INVALID_PDU_SESSION_IDENTITY)
            .and_then(|n1| gmm_build::build_dl_nas_transport(psi, n1, None))
            .and_then(|dl| ngap_path::send_nas(ctx, &mut ue, &dl, None));
        if let Err(e) = result {
            log::warn!("[{}] PDU session release reject not sent: {}", ue.label(), e);
        }
        return;
    }
    if let Some(session) = ue.sessions.get_mut(&psi) {
        session.state = PduSessionState::Releasing;
        session.pti = pti;
    }

    let result = send_session_release(ctx, &mut ue, psi, pti);
    match result {
        Ok(()) => log::info!("[{}] PDU session {} releasing", ue.label(), psi),
        Err(e) => log::warn!("[{}] PDU session {} release not sent: {}", ue.label(), psi, e),
    }
}

fn send_session_release(ctx: &AmfContext, ue: &mut UeContext, psi: u8, pti: u8) -> AmfResult<()> {
    let serving = ngap_path::live_serving_ran(ctx, ue)?;
    let command = gmm_build::build_pdu_session_release_command(psi, pti, FiveGsmCause::REGULAR_DEACTIVATION)?;
    let dl = gmm_build::build_dl_nas_transport(psi, command, None)?;
    let nas_pdu = ngap_path::protect_nas(ue, &dl, None)?;
    let message = ngap_build::build_pdu_session_resource_release_command(
        ue.amf_ue_ngap_id,
        serving.ran_ue_ngap_id,
        psi,
        &Cause::Nas(CauseNas::NormalRelease),
        Some(nas_pdu),
    )?;
    ngap_path::send_to_ran_ue(ctx, serving.handle, serving.ran_ue_ngap_id, &message)
}

async fn complete_session_release(ctx: &AmfContext, ue_handle: &UeHandle, psi: u8) {
    let (label, released) = {
        let mut ue = ue_handle.lock().await;
        let released = ue.sessions.remove(&psi);
        if ue.state().is_registered() {
            let next = ue.session_state();
            ue.fsm.transition(next);
        }
        (ue.label(), released)
    };
    match released {
        Some(session) => {
            release_upf(ctx, &label, session.upf_handle);
            log::info!("[{}] PDU session {} released", label, psi);
        }
        None => log::debug!("[{}] Release complete for unknown PDU session {}", label, psi),
    }
}

pub(crate) fn release_upf(ctx: &AmfContext, label: &str, upf_handle: u64) {
    if let Err(e) = ctx.upf.release_session(upf_handle) {
        log::warn!("[{}] User plane release failed: {}", label, e);
    }
}

// ============================================================================
// De-registration
// ============================================================================

async fn handle_deregistration_request(ctx: &AmfContext, ue_handle: &UeHandle, request: DeregistrationRequestFromUe) {
    {
        let mut ue = ue_handle.lock().await;
        timer::cancel_all(ctx, ue.amf_ue_ngap_id);
        ue.fsm.finish();
        ue.fsm.transition(GmmState::Deregistering);
        log::info!(
            "[{}] Deregistration request{}",
            ue.label(),
            if request.deregistration_type.switch_off { " (switch off)" } else { "" }
        );
        if !request.deregistration_type.switch_off {
            let result =
                gmm_build::build_deregistration_accept().and_then(|accept| ngap_path::send_nas(ctx, &mut ue, &accept, None));
            if let Err(e) = result {
                log::warn!("[{}] Deregistration accept not sent: {}", ue.label(), e);
            }
        }
        release_ue_connection(ctx, &mut ue, Cause::Nas(CauseNas::Deregister));
    }
    remove_ue(ctx, ue_handle).await;
}

/// Network-initiated de-registration, supervised by T3522
pub async fn deregister_ue(ctx: &AmfContext, amf_ue_ngap_id: u64) -> AmfResult<()> {
    let ue_handle = ctx
        .ues
        .get(amf_ue_ngap_id)
        .ok_or_else(|| AmfError::not_found(format!("UE amf_ue_ngap_id={}", amf_ue_ngap_id)))?;
    let mut ue = ue_handle.lock().await;
    if !ue.state().is_registered() {
        return Err(AmfError::InvalidState { message: "de-registration".into(), state: ue.state().name() });
    }
    ngap_path::live_serving_ran(ctx, &ue)?;

    ue.fsm.transition(GmmState::Deregistering);
    ue.fsm.start(Procedure::Deregistration);
    let request = gmm_build::build_deregistration_request(false, None)?;
    ngap_path::send_nas_with_timer(ctx, &mut ue, request, None, AmfTimer::T3522)?;
    log::info!("[{}] Deregistration request sent", ue.label());
    Ok(())
}

// ============================================================================
// Release and removal
// ============================================================================

/// UE Context Release Command towards the serving RAN, supervised by the
/// NG holding timer
pub fn release_ue_connection(ctx: &AmfContext, ue: &mut UeContext, cause: Cause) {
    let Some(serving) = ue.serving_ran else {
        return;
    };
    let command = ngap_build::build_ue_context_release_command(ue.amf_ue_ngap_id, Some(serving.ran_ue_ngap_id), cause);
    match ngap_path::send_to_ue(ctx, ue, &command) {
        Ok(()) => {
            if let Err(e) = timer::arm(ctx, ue.amf_ue_ngap_id, AmfTimer::NgHolding, timer::TimerPayload::Hold) {
                log::warn!("[{}] {} not armed: {}", ue.label(), AmfTimer::NgHolding, e);
            }
        }
        Err(e) => {
            log::debug!("[{}] UEContextReleaseCommand not sent: {}", ue.label(), e);
            ue.detach_ran();
        }
    }
}

/// A network-initiated procedure ran out of retransmissions
pub fn abandon(ctx: &AmfContext, ue: &mut UeContext) {
    for t in PROCEDURE_TIMERS {
        timer::cancel(ctx, ue.amf_ue_ngap_id, t);
    }
    log::warn!("[{}] {:?} abandoned in {}", ue.label(), ue.fsm.procedure, ue.state());
    ue.fsm.abort();
    ue.reset_security();
    release_ue_connection(ctx, ue, Cause::Nas(CauseNas::Unspecified));
}

/// Drop a UE context with its timers and user plane resources
pub async fn remove_ue(ctx: &AmfContext, ue_handle: &UeHandle) {
    let (id, label, sessions) = {
        let mut ue = ue_handle.lock().await;
        ue.fsm.abort();
        (ue.amf_ue_ngap_id, ue.label(), std::mem::take(&mut ue.sessions))
    };
    if let Some(current) = ctx.ues.get(id) {
        if Arc::ptr_eq(&current, ue_handle) {
            ctx.ues.remove(id);
        }
    }
    timer::cancel_all(ctx, id);
    for session in sessions.values() {
        release_upf(ctx, &label, session.upf_handle);
    }
    log::info!("[{}] UE context removed ({} PDU session(s) released)", label, sessions.len());
}
