//! RAN association lifecycle, paging and de-registration

mod common;

use std::time::Duration;

use common::*;
use ngc_amfd::gmm_handler;
use ngc_amfd::gmm_sm::GmmState;
use ngc_amfd::ngap_handler;
use ngc_amfd::ngap_path;
use ngc_amfd::AmfApp;
use ngc_nas::fiveg::FiveGmmMessage;
use ngc_ngap::transfer::{self, GtpTunnel, PathSwitchRequestTransfer};
use ngc_ngap::{
    Cause, CauseMisc, CauseNas, CauseRadioNetwork, NgapMessage, PathSwitchRequest, PduSessionResourceItem,
    UeContextReleaseComplete, UeContextReleaseRequest, UeSecurityCapabilities,
};

const MSIN: &str = "0000000001";

#[tokio::test]
async fn test_ng_setup_unknown_plmn() {
    init_logging();
    let app = AmfApp::new(test_config(&[])).unwrap();
    let mut gnb = SimGnb::connect(&app, 1);

    // 002/02 is not served
    gnb.send(&gnb.ng_setup_request([0x00, 0xf2, 0x20])).await;
    match gnb.recv().await {
        NgapMessage::NgSetupFailure(failure) => assert_eq!(failure.cause, Cause::Misc(CauseMisc::UnknownPlmn)),
        other => panic!("expected NGSetupFailure, got {other:?}"),
    }
    assert!(app.context().ran.is_empty());
    assert!(app.context().find_ran_by_name("gnb-1").is_none());
}

#[tokio::test]
async fn test_ng_setup_registers_ran() {
    init_logging();
    let app = AmfApp::new(test_config(&[])).unwrap();
    let gnb = SimGnb::setup(&app, 2).await;

    let ctx = app.context();
    assert_eq!(ctx.ran.len(), 1);
    let summary = ctx.find_ran_by_identity(&gnb.global_id()).expect("registered RAN");
    assert_eq!(summary.name.as_deref(), Some("gnb-2"));
    assert_eq!(summary.supported_tracking_areas, vec!["001/01:000001".to_string()]);
}

#[tokio::test]
async fn test_malformed_frame_keeps_association() {
    init_logging();
    let app = AmfApp::new(test_config(&[])).unwrap();
    let mut gnb = SimGnb::connect(&app, 14);

    // Truncated after the NG Setup procedure code
    gnb.send_raw(&[0x00, 0x15]).await;
    gnb.expect_silence(Duration::from_millis(200)).await;

    gnb.send(&gnb.ng_setup_request(plmn())).await;
    assert!(matches!(gnb.recv().await, NgapMessage::NgSetupResponse(_)));
    assert_eq!(app.context().ran.len(), 1);
}

#[tokio::test]
async fn test_ue_message_before_ng_setup() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let mut gnb = SimGnb::connect(&app, 3);
    let ue = SimUe::new(MSIN, 1);

    gnb.initial_ue_message(&ue, ue.registration_request()).await;
    assert!(matches!(gnb.recv().await, NgapMessage::ErrorIndication(_)));
    assert!(app.context().ues.is_empty());
}

#[tokio::test]
async fn test_ran_disconnect_detaches_ues() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 4).await;
    let mut ue = SimUe::new(MSIN, 1);

    let id = register(&mut gnb, &mut ue).await;
    wait_for_state(&ctx, id, GmmState::Registered).await;
    let handles = ctx.connections.handles();
    assert_eq!(handles.len(), 1);

    drop(gnb);
    eventually("RAN removal", || async { ctx.ran.is_empty() }).await;

    // The UE stays registered but has nowhere to be reached
    assert_eq!(ue_state(&ctx, id).await, Some(GmmState::Registered));
    assert_eq!(ctx.ue_summaries().await[0].ran_ue_ngap_id, None);
    let err = ngap_path::page_ue(&ctx, id).await.unwrap_err();
    assert!(err.is_connection_closed(), "{err}");

    // Cleanup for an already-removed association is a no-op
    ngap_path::on_disconnect(&ctx, handles[0]).await;
    assert!(ctx.ran.is_empty());
    assert!(ctx.ues.contains(id));
}

#[tokio::test]
async fn test_paging_reaches_serving_ran() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 5).await;
    let mut ue = SimUe::new(MSIN, 1);

    let id = register(&mut gnb, &mut ue).await;
    wait_for_state(&ctx, id, GmmState::Registered).await;

    assert_eq!(ngap_path::page_ue(&ctx, id).await.unwrap(), 1);
    assert!(matches!(gnb.recv().await, NgapMessage::Paging(_)));
}

#[tokio::test]
async fn test_ue_initiated_deregistration() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 6).await;
    let mut ue = SimUe::new(MSIN, 1);

    let id = register(&mut gnb, &mut ue).await;
    wait_for_state(&ctx, id, GmmState::Registered).await;

    let request = ue.deregistration_request(false);
    gnb.uplink_nas(&ue, request).await;
    let (_, nas) = gnb.recv_dl_nas().await;
    assert_eq!(ue.receive(&nas), FiveGmmMessage::DeregistrationAcceptFromUe);
    match gnb.recv().await {
        NgapMessage::UeContextReleaseCommand(command) => assert_eq!(command.cause, Cause::Nas(CauseNas::Deregister)),
        other => panic!("expected UEContextReleaseCommand, got {other:?}"),
    }
    eventually("context removal", || async { !ctx.ues.contains(id) }).await;

    gnb.send(&NgapMessage::UeContextReleaseComplete(UeContextReleaseComplete {
        amf_ue_ngap_id: id,
        ran_ue_ngap_id: ue.ran_ue_ngap_id,
    }))
    .await;
    gnb.expect_silence(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_switch_off_deregistration_sends_no_accept() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 7).await;
    let mut ue = SimUe::new(MSIN, 1);

    let id = register(&mut gnb, &mut ue).await;
    wait_for_state(&ctx, id, GmmState::Registered).await;

    let request = ue.deregistration_request(true);
    gnb.uplink_nas(&ue, request).await;
    assert!(matches!(gnb.recv().await, NgapMessage::UeContextReleaseCommand(_)));
    eventually("context removal", || async { ctx.ues.is_empty() }).await;
}

#[tokio::test]
async fn test_network_initiated_deregistration() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 8).await;
    let mut ue = SimUe::new(MSIN, 1);

    let id = register(&mut gnb, &mut ue).await;
    wait_for_state(&ctx, id, GmmState::Registered).await;

    gmm_handler::deregister_ue(&ctx, id).await.unwrap();
    let (_, nas) = gnb.recv_dl_nas().await;
    assert!(matches!(ue.receive(&nas), FiveGmmMessage::DeregistrationRequestToUe(_)));
    assert_eq!(ue_state(&ctx, id).await, Some(GmmState::Deregistering));

    let accept = ue.secured(&FiveGmmMessage::DeregistrationAcceptToUe);
    gnb.uplink_nas(&ue, accept).await;
    assert!(matches!(gnb.recv().await, NgapMessage::UeContextReleaseCommand(_)));
    eventually("context removal", || async { ctx.ues.is_empty() }).await;

    // Unknown UE
    assert!(gmm_handler::deregister_ue(&ctx, id).await.is_err());
}

fn path_switch(ran_ue_ngap_id: u32, source_amf_ue_ngap_id: u64, psi: u8, dl_address: [u8; 4]) -> NgapMessage {
    let transfer = transfer::encode_path_switch_request_transfer(&PathSwitchRequestTransfer {
        dl_ngu_up_tnl_information: GtpTunnel { transport_layer_address: dl_address.to_vec(), gtp_teid: 0x200 },
        qos_flow_accepted: vec![1],
    })
    .unwrap();
    NgapMessage::PathSwitchRequest(PathSwitchRequest {
        ran_ue_ngap_id,
        source_amf_ue_ngap_id,
        user_location_info: uli(),
        ue_security_capabilities: UeSecurityCapabilities {
            nr_encryption_algorithms: 0x4000,
            nr_integrity_algorithms: 0x4000,
            eutra_encryption_algorithms: 0,
            eutra_integrity_algorithms: 0,
        },
        pdu_session_list: vec![PduSessionResourceItem { pdu_session_id: psi, transfer }],
    })
}

#[tokio::test]
async fn test_path_switch_moves_ue() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut source = SimGnb::setup(&app, 9).await;
    let mut target = SimGnb::setup(&app, 10).await;
    let mut ue = SimUe::new(MSIN, 1);

    let id = register(&mut source, &mut ue).await;
    establish_session(&mut source, &mut ue, 5).await;
    wait_for_state(&ctx, id, GmmState::PduSessionActive).await;

    target.send(&path_switch(77, id, 5, [10, 0, 0, 10])).await;
    match target.recv().await {
        NgapMessage::PathSwitchRequestAcknowledge(ack) => {
            assert_eq!(ack.amf_ue_ngap_id, id);
            assert_eq!(ack.ran_ue_ngap_id, 77);
            assert_eq!(ack.pdu_session_list[0].pdu_session_id, 5);
            assert_eq!(ack.security_context.next_hop_chaining_count, 1);
        }
        other => panic!("expected PathSwitchRequestAcknowledge, got {other:?}"),
    }
    assert_eq!(ctx.ue_summaries().await[0].ran_ue_ngap_id, Some(77));
    assert_eq!(dl_tunnel(&ctx, id, 5).await.unwrap().transport_layer_address, vec![10, 0, 0, 10]);

    // Paging now goes through the target as well as the source
    assert_eq!(ngap_path::page_ue(&ctx, id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_path_switch_from_lost_source_fails() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut source = SimGnb::setup(&app, 11).await;
    let mut target = SimGnb::setup(&app, 12).await;
    let mut ue = SimUe::new(MSIN, 1);

    let id = register(&mut source, &mut ue).await;
    establish_session(&mut source, &mut ue, 5).await;
    wait_for_state(&ctx, id, GmmState::PduSessionActive).await;
    drop(source);
    eventually("source removal", || async { ctx.ran.len() == 1 }).await;

    target.send(&path_switch(78, id, 5, [10, 0, 0, 12])).await;
    match target.recv().await {
        NgapMessage::PathSwitchRequestFailure(failure) => assert_eq!(failure.released_list[0].pdu_session_id, 5),
        other => panic!("expected PathSwitchRequestFailure, got {other:?}"),
    }
    assert_eq!(ctx.ue_summaries().await[0].ran_ue_ngap_id, None);
    assert_eq!(dl_tunnel(&ctx, id, 5).await.unwrap().transport_layer_address, vec![10, 0, 0, 11]);
}

#[tokio::test]
async fn test_path_switch_to_closed_target_keeps_sessions() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut source = SimGnb::setup(&app, 14).await;
    let target = SimGnb::setup(&app, 15).await;
    let mut ue = SimUe::new(MSIN, 1);

    let id = register(&mut source, &mut ue).await;
    establish_session(&mut source, &mut ue, 5).await;
    wait_for_state(&ctx, id, GmmState::PduSessionActive).await;

    // The target's association goes away with its request still queued
    let target_handle = ctx.ran.find_by_identity(&target.global_id()).unwrap().handle;
    drop(target);
    eventually("target removal", || async { ctx.ran.len() == 1 }).await;
    ngap_handler::handle_ue_message(&ctx, target_handle, id, path_switch(79, id, 5, [10, 0, 0, 15])).await;

    assert_eq!(dl_tunnel(&ctx, id, 5).await.unwrap().transport_layer_address, vec![10, 0, 0, 14]);
    assert_eq!(ctx.ue_summaries().await[0].ran_ue_ngap_id, Some(ue.ran_ue_ngap_id));
    assert_eq!(ue_state(&ctx, id).await, Some(GmmState::PduSessionActive));
    source.expect_silence(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_ran_requested_release_keeps_registration() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 13).await;
    let mut ue = SimUe::new(MSIN, 1);

    let id = register(&mut gnb, &mut ue).await;
    wait_for_state(&ctx, id, GmmState::Registered).await;

    let cause = Cause::RadioNetwork(CauseRadioNetwork::UserInactivity);
    gnb.send(&NgapMessage::UeContextReleaseRequest(UeContextReleaseRequest {
        amf_ue_ngap_id: id,
        ran_ue_ngap_id: ue.ran_ue_ngap_id,
        cause,
    }))
    .await;
    match gnb.recv().await {
        NgapMessage::UeContextReleaseCommand(command) => assert_eq!(command.cause, cause),
        other => panic!("expected UEContextReleaseCommand, got {other:?}"),
    }
    gnb.send(&NgapMessage::UeContextReleaseComplete(UeContextReleaseComplete {
        amf_ue_ngap_id: id,
        ran_ue_ngap_id: ue.ran_ue_ngap_id,
    }))
    .await;

    eventually("RAN association cleared", || async {
        ctx.ue_summaries().await[0].ran_ue_ngap_id.is_none()
    })
    .await;
    assert_eq!(ue_state(&ctx, id).await, Some(GmmState::Registered));
}
