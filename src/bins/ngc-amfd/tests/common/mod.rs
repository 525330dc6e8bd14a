//! Common test utilities
//!
//! A simulated gNB speaking NGAP over the in-memory transport and a
//! simulated UE with a USIM (TS 35.208 test set 1 credentials) that
//! answers 5G-AKA and runs its side of NAS security.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ngc_amfd::config::{SliceConfig, SubscriberConfig};
use ngc_amfd::gmm_sm::GmmState;
use ngc_amfd::nas_security::{protect, unprotect, NasCount, NasKeys};
use ngc_amfd::transport::MemoryPeer;
use ngc_amfd::{AmfApp, AmfConfig, AmfContext};
use ngc_crypt::{kdf, milenage, nas_alg};
use ngc_nas::common::types::{
    Dnn, KeySetIdentifier, PlmnId, SNssai, SecurityAlgorithms, SecurityHeaderType, UeSecurityCapability,
};
use ngc_nas::fiveg::{
    build_5gmm_message, build_5gsm_message, parse_5gmm_message, parse_5gsm_message, peek_header,
    AuthenticationRequest, AuthenticationResponse, DeRegistrationType, DeregistrationRequestFromUe, FiveGGuti,
    FiveGmmMessage, FiveGsmMessage, MobileIdentity, Nssai, PayloadContainerType, PduSessionEstablishmentRequest,
    RegistrationRequest, RegistrationType, RegistrationTypeValue, RequestType, SecuredNasMessage,
    SecurityModeComplete, ServiceRequest, ServiceType, Suci, UlNasTransport,
};
use ngc_ngap::transfer::{self, GtpTunnel, SetupResponseTransfer};
use ngc_ngap::{
    builder, parser, BroadcastPlmnItem, Cause, CauseRadioNetwork, GlobalRanNodeId, InitialContextSetupResponse,
    InitialUeMessage, NgSetupRequest, NgapMessage, NrCgi, PagingDrx, PduSessionResourceItem,
    PduSessionResourceSetupResponse, RrcEstablishmentCause, SupportedTaItem, Tai, UeContextReleaseComplete,
    UeContextReleaseRequest, UplinkNasTransport, UserLocationInformation,
};

pub const K: [u8; 16] = [
    0x46, 0x5b, 0x5c, 0xe8, 0xb1, 0x99, 0xb4, 0x9f, 0xaa, 0x5f, 0x0a, 0x2e, 0xe2, 0x38, 0xa6, 0xbc,
];
pub const OPC: [u8; 16] = [
    0xcd, 0x63, 0xcb, 0x71, 0x95, 0x4a, 0x9f, 0x4e, 0x48, 0xa5, 0x99, 0x4e, 0x37, 0xa0, 0x2b, 0xaf,
];
const K_HEX: &str = "465b5ce8b199b49faa5f0a2ee238a6bc";
const OPC_HEX: &str = "cd63cb71954a9f4e48a5994e37a02baf";

pub const MCC: &str = "001";
pub const MNC: &str = "01";
pub const SLICE: SNssai = SNssai { sst: 1, sd: Some([0x01, 0x02, 0x03]) };

/// How long a test waits for the AMF to answer
pub const RECV_TIMEOUT: Duration = Duration::from_secs(3);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn plmn_id() -> PlmnId {
    PlmnId::from_digits(MCC, MNC).unwrap()
}

pub fn plmn() -> [u8; 3] {
    plmn_id().to_bytes()
}

pub fn tai() -> Tai {
    Tai { plmn_identity: plmn(), tac: [0, 0, 1] }
}

pub fn uli() -> UserLocationInformation {
    UserLocationInformation::Nr { nr_cgi: NrCgi { plmn_identity: plmn(), nr_cell_identity: 0x10 }, tai: tai() }
}

pub fn imsi(msin: &str) -> String {
    format!("{}{}{}", MCC, MNC, msin)
}

/// AMF serving 001/01 TAC 1 with slice 1/010203 and the given subscribers
pub fn test_config(msins: &[&str]) -> AmfConfig {
    let yaml = r#"
amf:
  amf_name: test-amf
  guami:
    - plmn_id: { mcc: "001", mnc: "01" }
      amf_id: { region: 2, set: 1, pointer: 0 }
  tai:
    - plmn_id: { mcc: "001", mnc: "01" }
      tac: 1
  plmn_support:
    - plmn_id: { mcc: "001", mnc: "01" }
      s_nssai:
        - sst: 1
          sd: "010203"
  security:
    integrity_order: [NIA2]
    ciphering_order: [NEA2, NEA0]
"#;
    let mut config = AmfConfig::from_yaml_str(yaml).unwrap();
    config.subscribers = msins
        .iter()
        .map(|msin| SubscriberConfig {
            imsi: imsi(msin),
            k: K_HEX.into(),
            opc: Some(OPC_HEX.into()),
            sqn: 0x20,
            amf: "8000".into(),
            policy: "default".into(),
            s_nssai: vec![SliceConfig { sst: 1, sd: Some("010203".into()) }],
        })
        .collect();
    config.validate().unwrap();
    config
}

/// Poll `check` until it holds or the receive timeout passes
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let waited = tokio::time::timeout(RECV_TIMEOUT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}

pub async fn ue_state(ctx: &AmfContext, amf_ue_ngap_id: u64) -> Option<GmmState> {
    let handle = ctx.ues.get(amf_ue_ngap_id)?;
    let state = handle.lock().await.state();
    Some(state)
}

pub async fn wait_for_state(ctx: &Arc<AmfContext>, amf_ue_ngap_id: u64, state: GmmState) {
    eventually(&format!("UE {} in {}", amf_ue_ngap_id, state), || async move {
        ue_state(ctx, amf_ue_ngap_id).await == Some(state)
    })
    .await;
}

// ============================================================================
// Simulated gNB
// ============================================================================

pub struct SimGnb {
    peer: MemoryPeer,
    pub gnb_id: u32,
}

impl SimGnb {
    /// Open an association and complete NG Setup
    pub async fn setup(app: &AmfApp, gnb_id: u32) -> Self {
        let mut gnb = Self::connect(app, gnb_id);
        gnb.send(&gnb.ng_setup_request(plmn())).await;
        match gnb.recv().await {
            NgapMessage::NgSetupResponse(_) => gnb,
            other => panic!("expected NGSetupResponse, got {other:?}"),
        }
    }

    /// Association only, no NG Setup
    pub fn connect(app: &AmfApp, gnb_id: u32) -> Self {
        let addr: SocketAddr = format!("127.0.0.1:{}", 40000 + gnb_id).parse().unwrap();
        Self { peer: app.connect_memory(addr, 4), gnb_id }
    }

    pub fn global_id(&self) -> GlobalRanNodeId {
        GlobalRanNodeId::GlobalGnbId { plmn_identity: plmn(), gnb_id: self.gnb_id, gnb_id_len: 22 }
    }

    pub fn ng_setup_request(&self, broadcast_plmn: [u8; 3]) -> NgapMessage {
        NgapMessage::NgSetupRequest(NgSetupRequest {
            global_ran_node_id: self.global_id(),
            ran_node_name: Some(format!("gnb-{}", self.gnb_id)),
            supported_ta_list: vec![SupportedTaItem {
                tac: [0, 0, 1],
                broadcast_plmn_list: vec![BroadcastPlmnItem {
                    plmn_identity: broadcast_plmn,
                    tai_slice_support_list: vec![ngc_ngap::SNssai { sst: 1, sd: Some([1, 2, 3]) }],
                }],
            }],
            default_paging_drx: PagingDrx::V128,
        })
    }

    pub async fn send(&self, message: &NgapMessage) {
        let data = builder::build(message).unwrap();
        self.peer.send(1, data).await.unwrap();
    }

    pub async fn send_raw(&self, data: &[u8]) {
        self.peer.send(0, data.to_vec()).await.unwrap();
    }

    pub async fn recv(&mut self) -> NgapMessage {
        match tokio::time::timeout(RECV_TIMEOUT, self.peer.recv()).await {
            Ok(Some((_, data))) => parser::decode_ngap_pdu(&data).unwrap(),
            Ok(None) => panic!("association closed by the AMF"),
            Err(_) => panic!("no NGAP message from the AMF"),
        }
    }

    /// Nothing arrives within `wait`
    pub async fn expect_silence(&mut self, wait: Duration) {
        if let Ok(Some((_, data))) = tokio::time::timeout(wait, self.peer.recv()).await {
            panic!("unexpected {:?}", parser::decode_ngap_pdu(&data));
        }
    }

    /// Next Downlink NAS Transport: (AMF UE NGAP ID, NAS PDU)
    pub async fn recv_dl_nas(&mut self) -> (u64, Vec<u8>) {
        match self.recv().await {
            NgapMessage::DownlinkNasTransport(dl) => (dl.amf_ue_ngap_id, dl.nas_pdu),
            other => panic!("expected DownlinkNASTransport, got {other:?}"),
        }
    }

    pub async fn initial_ue_message(&self, ue: &SimUe, nas_pdu: Vec<u8>) {
        self.send(&NgapMessage::InitialUeMessage(InitialUeMessage {
            ran_ue_ngap_id: ue.ran_ue_ngap_id,
            nas_pdu,
            user_location_info: uli(),
            rrc_establishment_cause: RrcEstablishmentCause::MoSignalling,
            five_g_s_tmsi: None,
            ue_context_request: true,
        }))
        .await;
    }

    pub async fn uplink_nas(&self, ue: &SimUe, nas_pdu: Vec<u8>) {
        self.send(&NgapMessage::UplinkNasTransport(UplinkNasTransport {
            amf_ue_ngap_id: ue.amf_ue_ngap_id.expect("UE has no AMF UE NGAP ID"),
            ran_ue_ngap_id: ue.ran_ue_ngap_id,
            nas_pdu,
            user_location_info: uli(),
        }))
        .await;
    }
}

// ============================================================================
// Simulated UE
// ============================================================================

pub struct SimUe {
    pub msin: String,
    pub ran_ue_ngap_id: u32,
    pub amf_ue_ngap_id: Option<u64>,
    pub guti: Option<FiveGGuti>,
    sqn_ms: [u8; 6],
    kamf: Option<[u8; 32]>,
    keys: Option<NasKeys>,
    ul_count: NasCount,
    dl_count: NasCount,
}

impl SimUe {
    pub fn new(msin: &str, ran_ue_ngap_id: u32) -> Self {
        Self {
            msin: msin.to_string(),
            ran_ue_ngap_id,
            amf_ue_ngap_id: None,
            guti: None,
            sqn_ms: [0; 6],
            kamf: None,
            keys: None,
            ul_count: NasCount::default(),
            dl_count: NasCount::default(),
        }
    }

    pub fn supi(&self) -> String {
        format!("imsi-{}", imsi(&self.msin))
    }

    pub fn registration_request(&self) -> Vec<u8> {
        let request = RegistrationRequest {
            registration_type: RegistrationType {
                follow_on_request: false,
                value: RegistrationTypeValue::InitialRegistration,
            },
            ngksi: KeySetIdentifier::default(),
            mobile_identity: MobileIdentity::Suci(Suci::from_imsi(plmn_id(), &self.msin).unwrap()),
            // EA0/EA2 and IA0/IA2
            ue_security_capability: Some(UeSecurityCapability::new(0xa0, 0xa0)),
            requested_nssai: Some(Nssai(vec![SLICE])),
            ..Default::default()
        };
        plain(&FiveGmmMessage::RegistrationRequest(request))
    }

    /// Run the USIM on the challenge and derive KAMF
    pub fn answer_challenge(&mut self, request: &AuthenticationRequest) -> Vec<u8> {
        let rand = request.rand.expect("RAND");
        let autn = request.autn.expect("AUTN");
        let (res, ck, ik) = milenage::check_autn(&OPC, &K, &self.sqn_ms, &rand, &autn).expect("AUTN rejected");
        let ak = milenage::f2345(&OPC, &K, &rand).ak;
        for i in 0..6 {
            self.sqn_ms[i] = autn[i] ^ ak[i];
        }

        let snn = kdf::serving_network_name(MCC, MNC);
        let res_star = kdf::xres_star(&ck, &ik, &snn, &rand, &res).unwrap();
        let mut sqn_xor_ak = [0u8; 6];
        sqn_xor_ak.copy_from_slice(&autn[..6]);
        let kausf = kdf::kausf(&ck, &ik, &snn, &sqn_xor_ak).unwrap();
        let kseaf = kdf::kseaf(&kausf, &snn).unwrap();
        self.kamf = Some(kdf::kamf(&kseaf, &self.supi(), &request.abba.0).unwrap());

        plain(&FiveGmmMessage::AuthenticationResponse(AuthenticationResponse { res_star: Some(res_star) }))
    }

    /// Decode a downlink 5GMM message, verifying and deciphering it. A
    /// Security Mode Command installs the new NAS keys first.
    pub fn receive(&mut self, nas_pdu: &[u8]) -> FiveGmmMessage {
        let (_, header) = peek_header(nas_pdu).unwrap();
        if header == SecurityHeaderType::PlainNas {
            return parse_5gmm_message(&mut Bytes::copy_from_slice(nas_pdu)).unwrap();
        }
        let secured = SecuredNasMessage::decode(&mut Bytes::copy_from_slice(nas_pdu)).unwrap();
        if header == SecurityHeaderType::IntegrityProtectedWithNewContext {
            if let FiveGmmMessage::SecurityModeCommand(command) = parse_5gmm_message(&mut secured.payload.clone()).unwrap()
            {
                let kamf = self.kamf.expect("Security Mode Command before authentication");
                self.keys = Some(NasKeys::derive(&kamf, command.selected_nas_security_algorithms).unwrap());
                self.ul_count = NasCount::default();
                self.dl_count = NasCount::default();
            }
        }
        let keys = self.keys.as_ref().expect("protected NAS without a security context");
        let count = self.dl_count.estimate(secured.sequence_number);
        let mut inner = unprotect(keys, count.value(), nas_alg::DIRECTION_DOWNLINK, &secured).expect("downlink MAC");
        self.dl_count = count.next();
        parse_5gmm_message(&mut inner).unwrap()
    }

    pub fn selected_algorithms(&self) -> Option<SecurityAlgorithms> {
        self.keys.map(|k| k.algorithms)
    }

    pub fn protect(&mut self, message: &FiveGmmMessage, header: SecurityHeaderType) -> Vec<u8> {
        let keys = self.keys.as_ref().expect("no NAS security context");
        let raw = build_5gmm_message(message).unwrap();
        let out = protect(keys, self.ul_count, nas_alg::DIRECTION_UPLINK, header, &raw).unwrap();
        self.ul_count = self.ul_count.next();
        out
    }

    pub fn secured(&mut self, message: &FiveGmmMessage) -> Vec<u8> {
        self.protect(message, SecurityHeaderType::IntegrityProtectedAndCiphered)
    }

    pub fn security_mode_complete(&mut self) -> Vec<u8> {
        self.protect(
            &FiveGmmMessage::SecurityModeComplete(SecurityModeComplete::default()),
            SecurityHeaderType::IntegrityProtectedAndCipheredWithNewContext,
        )
    }

    pub fn session_request(&mut self, psi: u8, pti: u8) -> Vec<u8> {
        let n1 = build_5gsm_message(
            psi,
            pti,
            &FiveGsmMessage::PduSessionEstablishmentRequest(PduSessionEstablishmentRequest::default()),
        )
        .unwrap();
        self.ul_nas_transport(psi, n1.to_vec(), Some(RequestType::InitialRequest))
    }

    pub fn session_release_request(&mut self, psi: u8, pti: u8) -> Vec<u8> {
        let n1 = build_5gsm_message(psi, pti, &FiveGsmMessage::PduSessionReleaseRequest(None)).unwrap();
        self.ul_nas_transport(psi, n1.to_vec(), None)
    }

    pub fn session_release_complete(&mut self, psi: u8, pti: u8) -> Vec<u8> {
        let n1 = build_5gsm_message(psi, pti, &FiveGsmMessage::PduSessionReleaseComplete(None)).unwrap();
        self.ul_nas_transport(psi, n1.to_vec(), None)
    }

    fn ul_nas_transport(&mut self, psi: u8, n1: Vec<u8>, request_type: Option<RequestType>) -> Vec<u8> {
        let transport = UlNasTransport {
            payload_container_type: PayloadContainerType::N1SmInformation,
            payload_container: n1,
            pdu_session_id: Some(psi),
            request_type,
            s_nssai: request_type.map(|_| SLICE),
            dnn: request_type.map(|_| Dnn::new("internet")),
            ..Default::default()
        };
        self.secured(&FiveGmmMessage::UlNasTransport(transport))
    }

    /// Service Request naming the UE's 5G-S-TMSI, integrity protected
    pub fn service_request(&mut self, pdu_session_status: Option<u16>) -> Vec<u8> {
        let request = FiveGmmMessage::ServiceRequest(self.service_request_message(pdu_session_status));
        self.protect(&request, SecurityHeaderType::IntegrityProtected)
    }

    pub fn service_request_message(&self, pdu_session_status: Option<u16>) -> ServiceRequest {
        let guti = self.guti.expect("UE is not registered");
        ServiceRequest {
            ngksi: KeySetIdentifier::new(0, 1),
            service_type: ServiceType::Data,
            s_tmsi: MobileIdentity::FiveGSTmsi(ngc_nas::fiveg::FiveGSTmsi {
                amf_set_id: guti.amf_set_id,
                amf_pointer: guti.amf_pointer,
                tmsi: guti.tmsi,
            }),
            uplink_data_status: pdu_session_status,
            pdu_session_status,
            allowed_pdu_session_status: None,
            nas_message_container: None,
        }
    }

    /// Mobility or periodic registration update naming the 5G-GUTI
    pub fn update_request(&self, value: RegistrationTypeValue) -> FiveGmmMessage {
        FiveGmmMessage::RegistrationRequest(RegistrationRequest {
            registration_type: RegistrationType { follow_on_request: false, value },
            ngksi: KeySetIdentifier::new(0, 1),
            mobile_identity: MobileIdentity::FiveGGuti(self.guti.expect("UE is not registered")),
            ue_security_capability: Some(UeSecurityCapability::new(0xa0, 0xa0)),
            requested_nssai: Some(Nssai(vec![SLICE])),
            ..Default::default()
        })
    }

    pub fn deregistration_request(&mut self, switch_off: bool) -> Vec<u8> {
        let guti = self.guti.expect("UE is not registered");
        let request = DeregistrationRequestFromUe {
            deregistration_type: DeRegistrationType { switch_off, re_registration_required: false, access_type: 1 },
            ngksi: KeySetIdentifier::default(),
            mobile_identity: MobileIdentity::FiveGGuti(guti),
        };
        self.secured(&FiveGmmMessage::DeregistrationRequestFromUe(request))
    }

    /// 5GSM message carried in a DL NAS Transport
    pub fn receive_5gsm(&mut self, nas_pdu: &[u8]) -> FiveGsmMessage {
        match self.receive(nas_pdu) {
            FiveGmmMessage::DlNasTransport(dl) => parse_5gsm_message(&mut Bytes::from(dl.payload_container)).unwrap().1,
            other => panic!("expected DL NAS Transport, got {other:?}"),
        }
    }
}

pub fn plain(message: &FiveGmmMessage) -> Vec<u8> {
    build_5gmm_message(message).unwrap().to_vec()
}

// ============================================================================
// Procedures
// ============================================================================

/// Full initial registration through Registration Complete. Returns the
/// AMF UE NGAP ID.
pub async fn register(gnb: &mut SimGnb, ue: &mut SimUe) -> u64 {
    gnb.initial_ue_message(ue, ue.registration_request()).await;

    let (amf_ue_ngap_id, nas) = gnb.recv_dl_nas().await;
    ue.amf_ue_ngap_id = Some(amf_ue_ngap_id);
    let response = match ue.receive(&nas) {
        FiveGmmMessage::AuthenticationRequest(request) => ue.answer_challenge(&request),
        other => panic!("expected Authentication Request, got {other:?}"),
    };
    gnb.uplink_nas(ue, response).await;

    let (_, nas) = gnb.recv_dl_nas().await;
    match ue.receive(&nas) {
        FiveGmmMessage::SecurityModeCommand(_) => {}
        other => panic!("expected Security Mode Command, got {other:?}"),
    }
    let complete = ue.security_mode_complete();
    gnb.uplink_nas(ue, complete).await;

    let setup = match gnb.recv().await {
        NgapMessage::InitialContextSetupRequest(setup) => setup,
        other => panic!("expected InitialContextSetupRequest, got {other:?}"),
    };
    match ue.receive(&setup.nas_pdu.expect("Registration Accept")) {
        FiveGmmMessage::RegistrationAccept(accept) => ue.guti = accept.guti,
        other => panic!("expected Registration Accept, got {other:?}"),
    }
    gnb.send(&NgapMessage::InitialContextSetupResponse(InitialContextSetupResponse {
        amf_ue_ngap_id,
        ran_ue_ngap_id: ue.ran_ue_ngap_id,
        setup_list: Vec::new(),
        failed_list: Vec::new(),
    }))
    .await;
    let complete = ue.secured(&FiveGmmMessage::RegistrationComplete);
    gnb.uplink_nas(ue, complete).await;
    amf_ue_ngap_id
}

/// RAN-initiated release of the UE's NG connection; the UE goes idle
pub async fn release_to_idle(ctx: &AmfContext, gnb: &mut SimGnb, ue: &SimUe, amf_ue_ngap_id: u64) {
    gnb.send(&NgapMessage::UeContextReleaseRequest(UeContextReleaseRequest {
        amf_ue_ngap_id,
        ran_ue_ngap_id: ue.ran_ue_ngap_id,
        cause: Cause::RadioNetwork(CauseRadioNetwork::UserInactivity),
    }))
    .await;
    match gnb.recv().await {
        NgapMessage::UeContextReleaseCommand(_) => {}
        other => panic!("expected UEContextReleaseCommand, got {other:?}"),
    }
    gnb.send(&NgapMessage::UeContextReleaseComplete(UeContextReleaseComplete {
        amf_ue_ngap_id,
        ran_ue_ngap_id: ue.ran_ue_ngap_id,
    }))
    .await;
    eventually("UE idle", || async {
        match ctx.ues.get(amf_ue_ngap_id) {
            Some(handle) => handle.lock().await.serving_ran.is_none(),
            None => false,
        }
    })
    .await;
}

/// Downlink tunnel the AMF holds for a session
pub async fn dl_tunnel(ctx: &AmfContext, amf_ue_ngap_id: u64, psi: u8) -> Option<GtpTunnel> {
    let handle = ctx.ues.get(amf_ue_ngap_id)?;
    let ue = handle.lock().await;
    ue.sessions.get(&psi).and_then(|s| s.dl_tunnel.clone())
}

/// SetupResponseTransfer naming a downlink tunnel on `address`
pub fn setup_response_transfer(address: [u8; 4], gtp_teid: u32) -> Vec<u8> {
    transfer::encode_setup_response_transfer(&SetupResponseTransfer {
        dl_ngu_up_tnl_information: GtpTunnel { transport_layer_address: address.to_vec(), gtp_teid },
        associated_qos_flows: vec![1],
    })
    .unwrap()
}

/// PDU session establishment up to the RAN's setup response
pub async fn establish_session(gnb: &mut SimGnb, ue: &mut SimUe, psi: u8) -> FiveGsmMessage {
    let request = ue.session_request(psi, 1);
    gnb.uplink_nas(ue, request).await;

    let setup = match gnb.recv().await {
        NgapMessage::PduSessionResourceSetupRequest(setup) => setup,
        other => panic!("expected PDUSessionResourceSetupRequest, got {other:?}"),
    };
    let item = &setup.pdu_session_list[0];
    assert_eq!(item.pdu_session_id, psi);
    let accept = ue.receive_5gsm(item.nas_pdu.as_deref().expect("N1 SM container"));

    let response_transfer = setup_response_transfer([10, 0, 0, gnb.gnb_id as u8], 0x100);
    gnb.send(&NgapMessage::PduSessionResourceSetupResponse(PduSessionResourceSetupResponse {
        amf_ue_ngap_id: setup.amf_ue_ngap_id,
        ran_ue_ngap_id: setup.ran_ue_ngap_id,
        setup_list: vec![PduSessionResourceItem { pdu_session_id: psi, transfer: response_transfer }],
        failed_list: Vec::new(),
    }))
    .await;
    accept
}
