//! NGAP Higher-Level Message Types
//!
//! Strongly-typed representations of the NGAP procedure messages handled by
//! the AMF (3GPP TS 38.413). They abstract over the raw ProtocolIeContainer.

pub use ngc_asn1c::ngap::cause::{
    Cause, CauseMisc, CauseNas, CauseProtocol, CauseRadioNetwork, CauseTransport,
};
pub use ngc_asn1c::ngap::ies::{PagingDrx, RrcEstablishmentCause, TimeToWait};

// ============================================================================
// Shared structures
// ============================================================================

/// Global RAN Node ID (TS 38.413 Section 9.3.1.5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalRanNodeId {
    GlobalGnbId {
        plmn_identity: [u8; 3],
        /// gNB ID right-aligned in `gnb_id_len` bits (22..=32)
        gnb_id: u32,
        gnb_id_len: u8,
    },
    GlobalNgEnbId {
        plmn_identity: [u8; 3],
        /// Macro ngeNB ID, 20 bits
        ng_enb_id: u32,
    },
}

impl GlobalRanNodeId {
    pub fn plmn_identity(&self) -> [u8; 3] {
        match self {
            GlobalRanNodeId::GlobalGnbId { plmn_identity, .. } => *plmn_identity,
            GlobalRanNodeId::GlobalNgEnbId { plmn_identity, .. } => *plmn_identity,
        }
    }
}

/// S-NSSAI (TS 38.413 Section 9.3.1.24)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SNssai {
    /// Slice/Service Type
    pub sst: u8,
    /// Slice Differentiator (optional)
    pub sd: Option<[u8; 3]>,
}

/// Supported TA Item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedTaItem {
    pub tac: [u8; 3],
    pub broadcast_plmn_list: Vec<BroadcastPlmnItem>,
}

/// Broadcast PLMN Item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastPlmnItem {
    pub plmn_identity: [u8; 3],
    pub tai_slice_support_list: Vec<SNssai>,
}

/// GUAMI (TS 38.413 Section 9.3.3.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guami {
    pub plmn_identity: [u8; 3],
    pub amf_region_id: u8,
    /// 10 bits
    pub amf_set_id: u16,
    /// 6 bits
    pub amf_pointer: u8,
}

/// Served GUAMI Item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedGuamiItem {
    pub guami: Guami,
    pub backup_amf_name: Option<String>,
}

/// PLMN Support Item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlmnSupportItem {
    pub plmn_identity: [u8; 3],
    pub slice_support_list: Vec<SNssai>,
}

/// Tracking Area Identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tai {
    pub plmn_identity: [u8; 3],
    pub tac: [u8; 3],
}

/// NR Cell Global Identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NrCgi {
    pub plmn_identity: [u8; 3],
    /// 36-bit NR cell identity
    pub nr_cell_identity: u64,
}

/// User Location Information (TS 38.413 Section 9.3.1.16)
///
/// Only the NR alternative is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserLocationInformation {
    Nr { nr_cgi: NrCgi, tai: Tai },
}

impl UserLocationInformation {
    pub fn tai(&self) -> &Tai {
        match self {
            UserLocationInformation::Nr { tai, .. } => tai,
        }
    }
}

/// 5G-S-TMSI (TS 38.413 Section 9.3.3.20)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiveGSTmsi {
    /// 10 bits
    pub amf_set_id: u16,
    /// 6 bits
    pub amf_pointer: u8,
    pub five_g_tmsi: [u8; 4],
}

/// UE Security Capabilities (TS 38.413 Section 9.3.1.86), 16-bit masks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UeSecurityCapabilities {
    pub nr_encryption_algorithms: u16,
    pub nr_integrity_algorithms: u16,
    pub eutra_encryption_algorithms: u16,
    pub eutra_integrity_algorithms: u16,
}

/// UE / PDU session Aggregate Maximum Bit Rate, bits per second
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitRates {
    pub dl: u64,
    pub ul: u64,
}

/// Security Context (TS 38.413 Section 9.3.1.88)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityContext {
    /// Next Hop Chaining Count (0..=7)
    pub next_hop_chaining_count: u8,
    pub next_hop_nh: [u8; 32],
}

/// UE NGAP IDs CHOICE (TS 38.413 Section 9.3.3.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UeNgapIds {
    Pair {
        amf_ue_ngap_id: u64,
        ran_ue_ngap_id: u32,
    },
    AmfOnly(u64),
}

impl UeNgapIds {
    pub fn amf_ue_ngap_id(&self) -> u64 {
        match self {
            UeNgapIds::Pair { amf_ue_ngap_id, .. } => *amf_ue_ngap_id,
            UeNgapIds::AmfOnly(id) => *id,
        }
    }
}

/// One UE-associated logical NG-connection, as listed in NG Reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UeAssociatedLogicalNgConnection {
    pub amf_ue_ngap_id: Option<u64>,
    pub ran_ue_ngap_id: Option<u32>,
}

/// Reset Type (TS 38.413 Section 9.3.1.28)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetType {
    NgInterface,
    PartOfNgInterface(Vec<UeAssociatedLogicalNgConnection>),
}

/// PDU Session Resource item carrying an opaque transfer container.
/// Used by every list whose items are `{ pDUSessionID, transfer }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduSessionResourceItem {
    pub pdu_session_id: u8,
    pub transfer: Vec<u8>,
}

/// PDU Session Resource Setup Item SU Req
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduSessionResourceSetupItem {
    pub pdu_session_id: u8,
    pub nas_pdu: Option<Vec<u8>>,
    pub s_nssai: SNssai,
    /// Encoded PDUSessionResourceSetupRequestTransfer
    pub transfer: Vec<u8>,
}

// ============================================================================
// NG Setup (Section 9.2.6)
// ============================================================================

/// NG Setup Request - sent by gNB to AMF (TS 38.413 Section 9.2.6.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NgSetupRequest {
    pub global_ran_node_id: GlobalRanNodeId,
    pub ran_node_name: Option<String>,
    pub supported_ta_list: Vec<SupportedTaItem>,
    pub default_paging_drx: PagingDrx,
}

/// NG Setup Response - sent by AMF to gNB (TS 38.413 Section 9.2.6.2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NgSetupResponse {
    pub amf_name: String,
    pub served_guami_list: Vec<ServedGuamiItem>,
    pub relative_amf_capacity: u8,
    pub plmn_support_list: Vec<PlmnSupportItem>,
}

/// NG Setup Failure - sent by AMF to gNB (TS 38.413 Section 9.2.6.3)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NgSetupFailure {
    pub cause: Cause,
    pub time_to_wait: Option<TimeToWait>,
}

// ============================================================================
// RAN Configuration Update (Section 9.2.6.4 - 9.2.6.6)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RanConfigurationUpdate {
    pub ran_node_name: Option<String>,
    pub supported_ta_list: Option<Vec<SupportedTaItem>>,
    pub default_paging_drx: Option<PagingDrx>,
    pub global_ran_node_id: Option<GlobalRanNodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RanConfigurationUpdateAcknowledge;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RanConfigurationUpdateFailure {
    pub cause: Cause,
    pub time_to_wait: Option<TimeToWait>,
}

// ============================================================================
// NG Reset / Error Indication (Section 9.2.6.11 - 9.2.6.13)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NgReset {
    pub cause: Cause,
    pub reset_type: ResetType,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NgResetAcknowledge {
    pub connections: Option<Vec<UeAssociatedLogicalNgConnection>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorIndication {
    pub amf_ue_ngap_id: Option<u64>,
    pub ran_ue_ngap_id: Option<u32>,
    pub cause: Option<Cause>,
}

// ============================================================================
// NAS Transport (Section 9.2.5)
// ============================================================================

/// Initial UE Message - sent by gNB to AMF (TS 38.413 Section 9.2.5.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialUeMessage {
    pub ran_ue_ngap_id: u32,
    pub nas_pdu: Vec<u8>,
    pub user_location_info: UserLocationInformation,
    pub rrc_establishment_cause: RrcEstablishmentCause,
    pub five_g_s_tmsi: Option<FiveGSTmsi>,
    /// UE Context Request present
    pub ue_context_request: bool,
}

/// Downlink NAS Transport - sent by AMF to gNB (TS 38.413 Section 9.2.5.2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownlinkNasTransport {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    pub nas_pdu: Vec<u8>,
}

/// Uplink NAS Transport - sent by gNB to AMF (TS 38.413 Section 9.2.5.3)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkNasTransport {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    pub nas_pdu: Vec<u8>,
    pub user_location_info: UserLocationInformation,
}

/// NAS Non Delivery Indication (TS 38.413 Section 9.2.5.4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NasNonDeliveryIndication {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    pub nas_pdu: Vec<u8>,
    pub cause: Cause,
}

// ============================================================================
// Initial Context Setup (Section 9.2.2.1 - 9.2.2.3)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialContextSetupRequest {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    pub ue_ambr: Option<BitRates>,
    pub guami: Guami,
    pub allowed_nssai: Vec<SNssai>,
    pub ue_security_capabilities: UeSecurityCapabilities,
    /// KgNB
    pub security_key: [u8; 32],
    /// Sessions whose user plane is set up with the context
    pub pdu_session_list: Vec<PduSessionResourceSetupItem>,
    pub nas_pdu: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialContextSetupResponse {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    /// Transfers are encoded PDUSessionResourceSetupResponseTransfer
    pub setup_list: Vec<PduSessionResourceItem>,
    pub failed_list: Vec<PduSessionResourceItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialContextSetupFailure {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    pub cause: Cause,
}

// ============================================================================
// UE Context Release (Section 9.2.2.4 - 9.2.2.6)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UeContextReleaseRequest {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    pub cause: Cause,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UeContextReleaseCommand {
    pub ue_ngap_ids: UeNgapIds,
    pub cause: Cause,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UeContextReleaseComplete {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
}

// ============================================================================
// PDU Session Resource (Section 9.2.1)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduSessionResourceSetupRequest {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    pub nas_pdu: Option<Vec<u8>>,
    pub pdu_session_list: Vec<PduSessionResourceSetupItem>,
    pub ue_ambr: Option<BitRates>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduSessionResourceSetupResponse {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    /// Transfers are encoded PDUSessionResourceSetupResponseTransfer
    pub setup_list: Vec<PduSessionResourceItem>,
    pub failed_list: Vec<PduSessionResourceItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduSessionResourceReleaseCommand {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    pub nas_pdu: Option<Vec<u8>>,
    pub pdu_session_list: Vec<PduSessionResourceItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduSessionResourceReleaseResponse {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    pub released_list: Vec<PduSessionResourceItem>,
}

// ============================================================================
// Paging (Section 9.2.4.1)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paging {
    pub ue_paging_identity: FiveGSTmsi,
    pub paging_drx: Option<PagingDrx>,
    pub tai_list_for_paging: Vec<Tai>,
}

// ============================================================================
// Path Switch (Section 9.2.3.8 - 9.2.3.10)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSwitchRequest {
    pub ran_ue_ngap_id: u32,
    pub source_amf_ue_ngap_id: u64,
    pub user_location_info: UserLocationInformation,
    pub ue_security_capabilities: UeSecurityCapabilities,
    pub pdu_session_list: Vec<PduSessionResourceItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSwitchRequestAcknowledge {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    pub ue_security_capabilities: Option<UeSecurityCapabilities>,
    pub security_context: SecurityContext,
    pub pdu_session_list: Vec<PduSessionResourceItem>,
    pub allowed_nssai: Vec<SNssai>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSwitchRequestFailure {
    pub amf_ue_ngap_id: u64,
    pub ran_ue_ngap_id: u32,
    pub released_list: Vec<PduSessionResourceItem>,
}
