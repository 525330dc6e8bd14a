//! Idle-mode procedures: Service Request and registration updates of a UE
//! whose NG connection was released

mod common;

use common::*;
use ngc_amfd::gmm_sm::GmmState;
use ngc_amfd::AmfApp;
use ngc_nas::common::types::SecurityHeaderType;
use ngc_nas::fiveg::{FiveGmmCause, FiveGmmMessage, RegistrationTypeValue};
use ngc_ngap::{
    Cause, CauseNas, InitialContextSetupRequest, InitialContextSetupResponse, NgapMessage, PduSessionResourceItem,
};

const MSIN: &str = "0000000001";

fn expect_setup(message: NgapMessage) -> InitialContextSetupRequest {
    match message {
        NgapMessage::InitialContextSetupRequest(setup) => setup,
        other => panic!("expected InitialContextSetupRequest, got {other:?}"),
    }
}

/// Service Reject in a DL NAS Transport, then the release of the connection
async fn expect_service_reject(gnb: &mut SimGnb, ue: &mut SimUe) {
    let (_, nas) = gnb.recv_dl_nas().await;
    match ue.receive(&nas) {
        FiveGmmMessage::ServiceReject(reject) => {
            assert_eq!(reject.gmm_cause, FiveGmmCause::UE_IDENTITY_CANNOT_BE_DERIVED)
        }
        other => panic!("expected Service Reject, got {other:?}"),
    }
    match gnb.recv().await {
        NgapMessage::UeContextReleaseCommand(command) => assert_eq!(command.cause, Cause::Nas(CauseNas::NormalRelease)),
        other => panic!("expected UEContextReleaseCommand, got {other:?}"),
    }
}

#[tokio::test]
async fn test_service_request_reactivates_sessions() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 20).await;
    let mut ue = SimUe::new(MSIN, 1);

    let id = register(&mut gnb, &mut ue).await;
    establish_session(&mut gnb, &mut ue, 5).await;
    wait_for_state(&ctx, id, GmmState::PduSessionActive).await;
    release_to_idle(&ctx, &mut gnb, &ue, id).await;
    assert_eq!(dl_tunnel(&ctx, id, 5).await, None);

    ue.ran_ue_ngap_id = 2;
    let request = ue.service_request(Some(1 << 5));
    gnb.initial_ue_message(&ue, request).await;

    let setup = expect_setup(gnb.recv().await);
    assert_eq!(setup.ran_ue_ngap_id, 2);
    assert_eq!(setup.pdu_session_list.len(), 1);
    assert_eq!(setup.pdu_session_list[0].pdu_session_id, 5);
    match ue.receive(&setup.nas_pdu.expect("Service Accept")) {
        FiveGmmMessage::ServiceAccept(accept) => assert_eq!(accept.pdu_session_status, Some(1 << 5)),
        other => panic!("expected Service Accept, got {other:?}"),
    }

    // Same context, now on the new NG connection
    let new_id = setup.amf_ue_ngap_id;
    assert_eq!(ctx.ues.len(), 1);
    assert_eq!(ctx.ue_summaries().await[0].ran_ue_ngap_id, Some(2));

    gnb.send(&NgapMessage::InitialContextSetupResponse(InitialContextSetupResponse {
        amf_ue_ngap_id: new_id,
        ran_ue_ngap_id: 2,
        setup_list: vec![PduSessionResourceItem {
            pdu_session_id: 5,
            transfer: setup_response_transfer([10, 0, 0, 21], 0x300),
        }],
        failed_list: Vec::new(),
    }))
    .await;
    eventually("downlink tunnel restored", || async {
        dl_tunnel(&ctx, new_id, 5).await.map(|t| t.gtp_teid) == Some(0x300)
    })
    .await;
    assert_eq!(ue_state(&ctx, new_id).await, Some(GmmState::PduSessionActive));
}

#[tokio::test]
async fn test_service_request_releases_sessions_the_ue_dropped() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 21).await;
    let mut ue = SimUe::new(MSIN, 1);

    let id = register(&mut gnb, &mut ue).await;
    establish_session(&mut gnb, &mut ue, 5).await;
    establish_session(&mut gnb, &mut ue, 6).await;
    eventually("two active sessions", || async { ctx.ue_summaries().await[0].pdu_sessions == 2 }).await;
    release_to_idle(&ctx, &mut gnb, &ue, id).await;

    ue.ran_ue_ngap_id = 2;
    let request = ue.service_request(Some(1 << 6));
    gnb.initial_ue_message(&ue, request).await;

    let setup = expect_setup(gnb.recv().await);
    let psis: Vec<u8> = setup.pdu_session_list.iter().map(|i| i.pdu_session_id).collect();
    assert_eq!(psis, vec![6]);
    match ue.receive(&setup.nas_pdu.expect("Service Accept")) {
        FiveGmmMessage::ServiceAccept(accept) => assert_eq!(accept.pdu_session_status, Some(1 << 6)),
        other => panic!("expected Service Accept, got {other:?}"),
    }
    assert_eq!(ctx.ue_summaries().await[0].pdu_sessions, 1);
}

#[tokio::test]
async fn test_service_request_from_unknown_or_unverified_ue() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 22).await;
    let mut ue = SimUe::new(MSIN, 1);

    let id = register(&mut gnb, &mut ue).await;
    wait_for_state(&ctx, id, GmmState::Registered).await;
    release_to_idle(&ctx, &mut gnb, &ue, id).await;
    let guti = ue.guti.expect("registered");

    // Unprotected Service Request naming the real 5G-S-TMSI
    ue.ran_ue_ngap_id = 2;
    let unprotected = plain(&FiveGmmMessage::ServiceRequest(ue.service_request_message(None)));
    gnb.initial_ue_message(&ue, unprotected).await;
    expect_service_reject(&mut gnb, &mut ue).await;

    // 5G-S-TMSI this AMF never assigned
    ue.ran_ue_ngap_id = 3;
    let mut stranger = guti;
    stranger.tmsi ^= 0x00ff_0000;
    ue.guti = Some(stranger);
    let request = ue.service_request(None);
    gnb.initial_ue_message(&ue, request).await;
    expect_service_reject(&mut gnb, &mut ue).await;

    // The registered context is untouched
    assert_eq!(ctx.ues.len(), 1);
    assert_eq!(ue_state(&ctx, id).await, Some(GmmState::Registered));
    assert!(ctx.ues.contains(id));
}

#[tokio::test]
async fn test_mobility_update_under_current_security_skips_authentication() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 23).await;
    let mut ue = SimUe::new(MSIN, 1);

    let id = register(&mut gnb, &mut ue).await;
    wait_for_state(&ctx, id, GmmState::Registered).await;
    release_to_idle(&ctx, &mut gnb, &ue, id).await;
    let old_tmsi = ue.guti.map(|g| g.tmsi);

    ue.ran_ue_ngap_id = 2;
    let update = ue.update_request(RegistrationTypeValue::MobilityRegistrationUpdating);
    let request = ue.protect(&update, SecurityHeaderType::IntegrityProtected);
    gnb.initial_ue_message(&ue, request).await;

    // The accept arrives directly, with no Authentication Request first
    let setup = expect_setup(gnb.recv().await);
    match ue.receive(&setup.nas_pdu.expect("Registration Accept")) {
        FiveGmmMessage::RegistrationAccept(accept) => ue.guti = accept.guti,
        other => panic!("expected Registration Accept, got {other:?}"),
    }
    assert_ne!(ue.guti.map(|g| g.tmsi), old_tmsi);

    let new_id = setup.amf_ue_ngap_id;
    ue.amf_ue_ngap_id = Some(new_id);
    gnb.send(&NgapMessage::InitialContextSetupResponse(InitialContextSetupResponse {
        amf_ue_ngap_id: new_id,
        ran_ue_ngap_id: 2,
        setup_list: Vec::new(),
        failed_list: Vec::new(),
    }))
    .await;
    let complete = ue.secured(&FiveGmmMessage::RegistrationComplete);
    gnb.uplink_nas(&ue, complete).await;
    wait_for_state(&ctx, new_id, GmmState::Registered).await;
    assert_eq!(ctx.ues.len(), 1);
}

#[tokio::test]
async fn test_unverified_periodic_update_reauthenticates() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 24).await;
    let mut ue = SimUe::new(MSIN, 1);

    let id = register(&mut gnb, &mut ue).await;
    wait_for_state(&ctx, id, GmmState::Registered).await;
    release_to_idle(&ctx, &mut gnb, &ue, id).await;

    ue.ran_ue_ngap_id = 2;
    let update = plain(&ue.update_request(RegistrationTypeValue::PeriodicRegistrationUpdating));
    gnb.initial_ue_message(&ue, update).await;

    let (new_id, nas) = gnb.recv_dl_nas().await;
    assert!(matches!(ue.receive(&nas), FiveGmmMessage::AuthenticationRequest(_)));
    wait_for_state(&ctx, new_id, GmmState::Authenticating).await;
}
