//! Registration, authentication and PDU session procedures against a
//! simulated gNB and UE

mod common;

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use ngc_amfd::config::TimerConfig;
use ngc_amfd::gmm_sm::GmmState;
use ngc_amfd::subscriber::MemorySubscriberStore;
use ngc_amfd::timer::{self, AmfTimer, TimerKey, TimerPayload};
use ngc_amfd::upf::PoolUpf;
use ngc_amfd::AmfApp;
use ngc_core::{Expired, Expiry, FakeClock};
use ngc_nas::common::types::SecurityAlgorithms;
use ngc_nas::fiveg::{
    AuthenticationResponse, FiveGmmCause, FiveGmmMessage, FiveGsmCause, FiveGsmMessage, PduAddress,
};
use ngc_ngap::{Cause, CauseNas, CauseRadioNetwork, NgapMessage, UeContextReleaseComplete, UeNgapIds, UplinkNasTransport};

const MSIN: &str = "0000000001";

fn expect_release(message: NgapMessage) -> Cause {
    match message {
        NgapMessage::UeContextReleaseCommand(command) => command.cause,
        other => panic!("expected UEContextReleaseCommand, got {other:?}"),
    }
}

#[tokio::test]
async fn test_registration_and_pdu_session() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 1).await;
    let mut ue = SimUe::new(MSIN, 1);

    let id = register(&mut gnb, &mut ue).await;
    wait_for_state(&ctx, id, GmmState::Registered).await;

    // NEA2 is preferred and the UE supports it
    let algorithms = ue.selected_algorithms().unwrap();
    assert_eq!(algorithms.ciphering, SecurityAlgorithms::NEA2);
    assert_eq!(algorithms.integrity, SecurityAlgorithms::NIA2);
    let guti = ue.guti.expect("Registration Accept carries a 5G-GUTI");
    assert_eq!(guti.amf_region_id, 2);
    assert_eq!(guti.plmn_id, plmn_id());

    let summary = ctx.ue_summaries().await;
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].supi.as_deref(), Some(ue.supi().as_str()));
    assert_eq!(summary[0].ran_ue_ngap_id, Some(1));

    match establish_session(&mut gnb, &mut ue, 5).await {
        FiveGsmMessage::PduSessionEstablishmentAccept(accept) => {
            assert!(matches!(accept.pdu_address, Some(PduAddress::Ipv4(addr)) if addr != Ipv4Addr::UNSPECIFIED));
        }
        other => panic!("expected PDU Session Establishment Accept, got {other:?}"),
    }
    wait_for_state(&ctx, id, GmmState::PduSessionActive).await;
    assert_eq!(ctx.ue_summaries().await[0].pdu_sessions, 1);

    // A second request for the same PSI is rejected without touching the first
    let duplicate = ue.session_request(5, 2);
    gnb.uplink_nas(&ue, duplicate).await;
    let (_, nas) = gnb.recv_dl_nas().await;
    match ue.receive_5gsm(&nas) {
        FiveGsmMessage::PduSessionEstablishmentReject(cause) => {
            assert_eq!(cause, FiveGsmCause::INVALID_PDU_SESSION_IDENTITY)
        }
        other => panic!("expected PDU Session Establishment Reject, got {other:?}"),
    }
    assert_eq!(ue_state(&ctx, id).await, Some(GmmState::PduSessionActive));
}

#[tokio::test]
async fn test_pdu_session_release() {
    init_logging();
    let config = test_config(&[MSIN]);
    let upf = Arc::new(PoolUpf::from_config(&config.upf).unwrap());
    let subscribers = Arc::new(MemorySubscriberStore::from_config(&config).unwrap());
    let app = AmfApp::with_parts(config, subscribers, upf.clone(), Arc::new(ngc_core::SystemClock)).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 2).await;
    let mut ue = SimUe::new(MSIN, 7);

    let id = register(&mut gnb, &mut ue).await;
    establish_session(&mut gnb, &mut ue, 1).await;
    wait_for_state(&ctx, id, GmmState::PduSessionActive).await;
    assert_eq!(upf.active_sessions(), 1);

    let request = ue.session_release_request(1, 3);
    gnb.uplink_nas(&ue, request).await;
    let command = match gnb.recv().await {
        NgapMessage::PduSessionResourceReleaseCommand(command) => command,
        other => panic!("expected PDUSessionResourceReleaseCommand, got {other:?}"),
    };
    match ue.receive_5gsm(&command.nas_pdu.expect("N1 SM container")) {
        FiveGsmMessage::PduSessionReleaseCommand(cause) => assert_eq!(cause, FiveGsmCause::REGULAR_DEACTIVATION),
        other => panic!("expected PDU Session Release Command, got {other:?}"),
    }

    let complete = ue.session_release_complete(1, 3);
    gnb.uplink_nas(&ue, complete).await;
    wait_for_state(&ctx, id, GmmState::Registered).await;
    assert_eq!(ctx.ue_summaries().await[0].pdu_sessions, 0);
    assert_eq!(upf.active_sessions(), 0);
}

#[tokio::test]
async fn test_wrong_res_star_is_rejected() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 3).await;
    let mut ue = SimUe::new(MSIN, 1);

    gnb.initial_ue_message(&ue, ue.registration_request()).await;
    let (id, nas) = gnb.recv_dl_nas().await;
    ue.amf_ue_ngap_id = Some(id);
    assert!(matches!(ue.receive(&nas), FiveGmmMessage::AuthenticationRequest(_)));

    let wrong = plain(&FiveGmmMessage::AuthenticationResponse(AuthenticationResponse { res_star: Some([0x5a; 16]) }));
    gnb.uplink_nas(&ue, wrong).await;

    let (_, nas) = gnb.recv_dl_nas().await;
    assert_eq!(ue.receive(&nas), FiveGmmMessage::AuthenticationReject);
    assert_eq!(expect_release(gnb.recv().await), Cause::Nas(CauseNas::AuthenticationFailure));

    // The context is kept for the identity, without security
    wait_for_state(&ctx, id, GmmState::Deregistered).await;
    let summary = ctx.ue_summaries().await;
    assert_eq!(summary[0].supi.as_deref(), Some(ue.supi().as_str()));
}

#[tokio::test]
async fn test_unknown_subscriber_is_rejected() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 4).await;
    let mut ue = SimUe::new("0000009999", 1);

    gnb.initial_ue_message(&ue, ue.registration_request()).await;
    let (id, nas) = gnb.recv_dl_nas().await;
    ue.amf_ue_ngap_id = Some(id);
    match ue.receive(&nas) {
        FiveGmmMessage::RegistrationReject(reject) => {
            assert_eq!(reject.gmm_cause, FiveGmmCause::UE_IDENTITY_CANNOT_BE_DERIVED)
        }
        other => panic!("expected Registration Reject, got {other:?}"),
    }
    expect_release(gnb.recv().await);

    eventually("context removal", || async { ctx.ues.is_empty() }).await;

    // Release complete for the removed context is absorbed quietly
    gnb.send(&NgapMessage::UeContextReleaseComplete(UeContextReleaseComplete {
        amf_ue_ngap_id: id,
        ran_ue_ngap_id: ue.ran_ue_ngap_id,
    }))
    .await;
    gnb.expect_silence(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_uplink_for_unknown_ue() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 5).await;
    let ue = SimUe::new(MSIN, 9);

    gnb.send(&NgapMessage::UplinkNasTransport(UplinkNasTransport {
        amf_ue_ngap_id: 4242,
        ran_ue_ngap_id: ue.ran_ue_ngap_id,
        nas_pdu: ue.registration_request(),
        user_location_info: uli(),
    }))
    .await;

    match gnb.recv().await {
        NgapMessage::ErrorIndication(indication) => {
            assert_eq!(indication.amf_ue_ngap_id, Some(4242));
            assert_eq!(indication.cause, Some(Cause::RadioNetwork(CauseRadioNetwork::UnknownLocalUeNgapId)));
        }
        other => panic!("expected ErrorIndication, got {other:?}"),
    }
    // Only an Initial UE Message creates a context
    assert!(ctx.ues.is_empty());
}

#[tokio::test]
async fn test_initial_ue_message_needs_registration_or_deregistration() {
    init_logging();
    let app = AmfApp::new(test_config(&[MSIN])).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 6).await;
    let ue = SimUe::new(MSIN, 3);

    let stray = plain(&FiveGmmMessage::AuthenticationResponse(AuthenticationResponse { res_star: Some([0; 16]) }));
    gnb.initial_ue_message(&ue, stray).await;
    match gnb.recv().await {
        NgapMessage::UeContextReleaseCommand(command) => match command.ue_ngap_ids {
            UeNgapIds::Pair { ran_ue_ngap_id, .. } => assert_eq!(ran_ue_ngap_id, 3),
            other => panic!("unexpected UE NGAP IDs {other:?}"),
        },
        other => panic!("expected UEContextReleaseCommand, got {other:?}"),
    }
    assert!(ctx.ues.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations() {
    init_logging();
    let msins: Vec<String> = (1..=8).map(|i| format!("{:010}", i)).collect();
    let refs: Vec<&str> = msins.iter().map(String::as_str).collect();
    let app = AmfApp::new(test_config(&refs)).unwrap();
    let ctx = app.context().clone();

    let mut tasks = Vec::new();
    for (i, msin) in msins.iter().enumerate() {
        let mut gnb = SimGnb::setup(&app, 100 + i as u32).await;
        let mut ue = SimUe::new(msin, 1);
        tasks.push(tokio::spawn(async move {
            let id = register(&mut gnb, &mut ue).await;
            (id, ue.guti.map(|g| g.tmsi), gnb)
        }));
    }

    let mut ids = Vec::new();
    let mut tmsis = Vec::new();
    let mut gnbs = Vec::new();
    for task in tasks {
        let (id, tmsi, gnb) = task.await.unwrap();
        ids.push(id);
        tmsis.push(tmsi.unwrap());
        gnbs.push(gnb);
    }
    for id in &ids {
        wait_for_state(&ctx, *id, GmmState::Registered).await;
    }

    ids.sort_unstable();
    ids.dedup();
    tmsis.sort_unstable();
    tmsis.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(tmsis.len(), 8);
    assert_eq!(ctx.ues.len(), 8);
    assert_eq!(ctx.ran.len(), 8);
}

#[tokio::test]
async fn test_t3560_retransmission_and_expiry() {
    init_logging();
    let mut config = test_config(&[MSIN]);
    config.timers.t3560 = TimerConfig::new(1_000, 1);
    let clock = Arc::new(FakeClock::new());
    let subscribers = Arc::new(MemorySubscriberStore::from_config(&config).unwrap());
    let upf = Arc::new(PoolUpf::from_config(&config.upf).unwrap());
    let app = AmfApp::with_parts(config, subscribers, upf, clock.clone()).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 7).await;
    let mut ue = SimUe::new(MSIN, 1);

    gnb.initial_ue_message(&ue, ue.registration_request()).await;
    let (id, first) = gnb.recv_dl_nas().await;
    ue.amf_ue_ngap_id = Some(id);
    wait_for_state(&ctx, id, GmmState::Authenticating).await;

    // Nothing happens until the clock moves
    gnb.expect_silence(Duration::from_millis(200)).await;

    clock.advance(Duration::from_millis(1_000));
    let (_, again) = gnb.recv_dl_nas().await;
    assert_eq!(again, first);

    clock.advance(Duration::from_millis(1_000));
    assert_eq!(expect_release(gnb.recv().await), Cause::Nas(CauseNas::Unspecified));
    wait_for_state(&ctx, id, GmmState::Deregistered).await;

    // No further retransmission once abandoned
    clock.advance(Duration::from_millis(1_000));
    gnb.expect_silence(Duration::from_millis(200)).await;
    assert_eq!(ctx.ue_summaries().await[0].supi.as_deref(), Some(ue.supi().as_str()));
}

#[tokio::test]
async fn test_stale_t3560_expiry_after_rearm_is_dropped() {
    init_logging();
    let mut config = test_config(&[MSIN]);
    config.timers.t3560 = TimerConfig::new(1_000, 1);
    let clock = Arc::new(FakeClock::new());
    let subscribers = Arc::new(MemorySubscriberStore::from_config(&config).unwrap());
    let upf = Arc::new(PoolUpf::from_config(&config.upf).unwrap());
    let app = AmfApp::with_parts(config, subscribers, upf, clock).unwrap();
    let ctx = app.context().clone();
    let mut gnb = SimGnb::setup(&app, 8).await;
    let mut ue = SimUe::new(MSIN, 1);

    gnb.initial_ue_message(&ue, ue.registration_request()).await;
    let (id, challenge) = gnb.recv_dl_nas().await;
    ue.amf_ue_ngap_id = Some(id);
    let key = TimerKey { amf_ue_ngap_id: id, timer: AmfTimer::T3560 };
    let auth_timer = ctx.timers.timer_id(&key).expect("T3560 guards the challenge");

    let response = match ue.receive(&challenge) {
        FiveGmmMessage::AuthenticationRequest(request) => ue.answer_challenge(&request),
        other => panic!("expected Authentication Request, got {other:?}"),
    };
    gnb.uplink_nas(&ue, response).await;
    let (_, nas) = gnb.recv_dl_nas().await;
    assert!(matches!(ue.receive(&nas), FiveGmmMessage::SecurityModeCommand(_)));
    let smc_timer = ctx.timers.timer_id(&key).expect("T3560 re-armed for the Security Mode Command");
    assert_ne!(smc_timer, auth_timer);

    // Expiries of the challenge's timer that fired before the re-arm
    for expiry in [Expiry::Retransmit { attempt: 1 }, Expiry::Exhausted] {
        let expired = Expired {
            key,
            id: auth_timer,
            payload: TimerPayload::Nas { plain: challenge.clone(), header: None },
            expiry,
        };
        timer::handle_expiry(&ctx, expired).await;
    }
    gnb.expect_silence(Duration::from_millis(200)).await;
    assert_eq!(ue_state(&ctx, id).await, Some(GmmState::Authenticating));

    let complete = ue.security_mode_complete();
    gnb.uplink_nas(&ue, complete).await;
    match gnb.recv().await {
        NgapMessage::InitialContextSetupRequest(setup) => assert_eq!(setup.amf_ue_ngap_id, id),
        other => panic!("expected InitialContextSetupRequest, got {other:?}"),
    }
}
