//! NGAP Basic Types
//!
//! Basic types from NGAP-CommonDataTypes and NGAP-Constants (3GPP TS 38.413)

use std::fmt;

use crate::per::{AperDecode, AperDecoder, AperEncode, AperEncoder, Constraint, PerResult};

aper_enumerated! {
    /// Criticality - indicates how to handle unrecognized IEs
    /// ASN.1: Criticality ::= ENUMERATED { reject, ignore, notify }
    pub enum Criticality (Constraint::new(0, 2)) {
        Reject = 0,
        Ignore = 1,
        Notify = 2,
    }
}

/// ProcedureCode - identifies the NGAP procedure
/// ASN.1: ProcedureCode ::= INTEGER (0..255)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcedureCode(pub u8);

impl ProcedureCode {
    pub const CONSTRAINT: Constraint = Constraint::new(0, 255);

    pub const AMF_CONFIGURATION_UPDATE: Self = Self(0);
    pub const DOWNLINK_NAS_TRANSPORT: Self = Self(4);
    pub const ERROR_INDICATION: Self = Self(9);
    pub const HANDOVER_CANCEL: Self = Self(10);
    pub const HANDOVER_NOTIFICATION: Self = Self(11);
    pub const HANDOVER_PREPARATION: Self = Self(12);
    pub const HANDOVER_RESOURCE_ALLOCATION: Self = Self(13);
    pub const INITIAL_CONTEXT_SETUP: Self = Self(14);
    pub const INITIAL_UE_MESSAGE: Self = Self(15);
    pub const NAS_NON_DELIVERY_INDICATION: Self = Self(19);
    pub const NG_RESET: Self = Self(20);
    pub const NG_SETUP: Self = Self(21);
    pub const PAGING: Self = Self(24);
    pub const PATH_SWITCH_REQUEST: Self = Self(25);
    pub const PDU_SESSION_RESOURCE_RELEASE: Self = Self(28);
    pub const PDU_SESSION_RESOURCE_SETUP: Self = Self(29);
    pub const RAN_CONFIGURATION_UPDATE: Self = Self(35);
    pub const UE_CONTEXT_RELEASE: Self = Self(41);
    pub const UE_CONTEXT_RELEASE_REQUEST: Self = Self(42);
    pub const UPLINK_NAS_TRANSPORT: Self = Self(46);

    /// Procedure name for logging
    pub fn name(&self) -> &'static str {
        match *self {
            Self::AMF_CONFIGURATION_UPDATE => "AMFConfigurationUpdate",
            Self::DOWNLINK_NAS_TRANSPORT => "DownlinkNASTransport",
            Self::ERROR_INDICATION => "ErrorIndication",
            Self::HANDOVER_CANCEL => "HandoverCancel",
            Self::HANDOVER_NOTIFICATION => "HandoverNotification",
            Self::HANDOVER_PREPARATION => "HandoverPreparation",
            Self::HANDOVER_RESOURCE_ALLOCATION => "HandoverResourceAllocation",
            Self::INITIAL_CONTEXT_SETUP => "InitialContextSetup",
            Self::INITIAL_UE_MESSAGE => "InitialUEMessage",
            Self::NAS_NON_DELIVERY_INDICATION => "NASNonDeliveryIndication",
            Self::NG_RESET => "NGReset",
            Self::NG_SETUP => "NGSetup",
            Self::PAGING => "Paging",
            Self::PATH_SWITCH_REQUEST => "PathSwitchRequest",
            Self::PDU_SESSION_RESOURCE_RELEASE => "PDUSessionResourceRelease",
            Self::PDU_SESSION_RESOURCE_SETUP => "PDUSessionResourceSetup",
            Self::RAN_CONFIGURATION_UPDATE => "RANConfigurationUpdate",
            Self::UE_CONTEXT_RELEASE => "UEContextRelease",
            Self::UE_CONTEXT_RELEASE_REQUEST => "UEContextReleaseRequest",
            Self::UPLINK_NAS_TRANSPORT => "UplinkNASTransport",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ProcedureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

impl AperEncode for ProcedureCode {
    fn encode_aper(&self, encoder: &mut AperEncoder) -> PerResult<()> {
        encoder.encode_constrained_whole_number(self.0 as i64, &Self::CONSTRAINT)
    }
}

impl AperDecode for ProcedureCode {
    fn decode_aper(decoder: &mut AperDecoder) -> PerResult<Self> {
        let value = decoder.decode_constrained_whole_number(&Self::CONSTRAINT)?;
        Ok(ProcedureCode(value as u8))
    }
}

/// ProtocolIE-ID - identifies the Information Element
/// ASN.1: ProtocolIE-ID ::= INTEGER (0..65535)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolIeId(pub u16);

impl ProtocolIeId {
    pub const CONSTRAINT: Constraint = Constraint::new(0, 65535);

    pub const ALLOWED_NSSAI: Self = Self(0);
    pub const AMF_NAME: Self = Self(1);
    pub const AMF_UE_NGAP_ID: Self = Self(10);
    pub const CAUSE: Self = Self(15);
    pub const CRITICALITY_DIAGNOSTICS: Self = Self(19);
    pub const DEFAULT_PAGING_DRX: Self = Self(21);
    pub const FIVE_G_S_TMSI: Self = Self(26);
    pub const GLOBAL_RAN_NODE_ID: Self = Self(27);
    pub const GUAMI: Self = Self(28);
    pub const NAS_PDU: Self = Self(38);
    pub const PAGING_DRX: Self = Self(50);
    pub const PDU_SESSION_RESOURCE_FAILED_TO_SETUP_LIST_CXT_RES: Self = Self(55);
    pub const PDU_SESSION_RESOURCE_FAILED_TO_SETUP_LIST_SU_RES: Self = Self(58);
    pub const PDU_SESSION_RESOURCE_RELEASED_LIST_PS_FAIL: Self = Self(69);
    pub const PDU_SESSION_RESOURCE_RELEASED_LIST_REL_RES: Self = Self(70);
    pub const PDU_SESSION_RESOURCE_SETUP_LIST_CXT_REQ: Self = Self(71);
    pub const PDU_SESSION_RESOURCE_SETUP_LIST_CXT_RES: Self = Self(72);
    pub const PDU_SESSION_RESOURCE_SETUP_LIST_SU_REQ: Self = Self(74);
    pub const PDU_SESSION_RESOURCE_SETUP_LIST_SU_RES: Self = Self(75);
    pub const PDU_SESSION_RESOURCE_TO_BE_SWITCHED_DL_LIST: Self = Self(76);
    pub const PDU_SESSION_RESOURCE_SWITCHED_LIST: Self = Self(77);
    pub const PDU_SESSION_RESOURCE_TO_RELEASE_LIST_REL_CMD: Self = Self(79);
    pub const PLMN_SUPPORT_LIST: Self = Self(80);
    pub const RAN_NODE_NAME: Self = Self(82);
    pub const RAN_UE_NGAP_ID: Self = Self(85);
    pub const RELATIVE_AMF_CAPACITY: Self = Self(86);
    pub const RESET_TYPE: Self = Self(88);
    pub const RRC_ESTABLISHMENT_CAUSE: Self = Self(90);
    pub const SECURITY_CONTEXT: Self = Self(93);
    pub const SECURITY_KEY: Self = Self(94);
    pub const SERVED_GUAMI_LIST: Self = Self(96);
    pub const SOURCE_AMF_UE_NGAP_ID: Self = Self(100);
    pub const SUPPORTED_TA_LIST: Self = Self(102);
    pub const TAI_LIST_FOR_PAGING: Self = Self(103);
    pub const TIME_TO_WAIT: Self = Self(107);
    pub const UE_AGGREGATE_MAXIMUM_BIT_RATE: Self = Self(110);
    pub const UE_ASSOCIATED_LOGICAL_NG_CONNECTION_LIST: Self = Self(111);
    pub const UE_CONTEXT_REQUEST: Self = Self(112);
    pub const UE_NGAP_IDS: Self = Self(114);
    pub const UE_PAGING_IDENTITY: Self = Self(115);
    pub const UE_SECURITY_CAPABILITIES: Self = Self(119);
    pub const USER_LOCATION_INFORMATION: Self = Self(121);
}

impl AperEncode for ProtocolIeId {
    fn encode_aper(&self, encoder: &mut AperEncoder) -> PerResult<()> {
        encoder.encode_constrained_whole_number(self.0 as i64, &Self::CONSTRAINT)
    }
}

impl AperDecode for ProtocolIeId {
    fn decode_aper(decoder: &mut AperDecoder) -> PerResult<Self> {
        let value = decoder.decode_constrained_whole_number(&Self::CONSTRAINT)?;
        Ok(ProtocolIeId(value as u16))
    }
}
