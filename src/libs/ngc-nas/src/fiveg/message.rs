//! 5GS NAS messages
//!
//! Based on 3GPP TS 24.501 Section 8

use bytes::{Buf, BufMut, Bytes, BytesMut};
use crate::error::{need, NasError, NasResult};
use crate::common::ie::*;
use crate::common::types::*;
use super::header::*;
use super::types::*;

// IEIs used by the messages below
const IEI_NON_CURRENT_NGKSI: u8 = 0xC0;
const IEI_GMM_CAPABILITY: u8 = 0x10;
const IEI_UE_SECURITY_CAPABILITY: u8 = 0x2E;
const IEI_REQUESTED_NSSAI: u8 = 0x2F;
const IEI_LAST_VISITED_TAI: u8 = 0x52;
const IEI_PDU_SESSION_STATUS: u8 = 0x50;
const IEI_NAS_MESSAGE_CONTAINER: u8 = 0x71;
const IEI_GUTI: u8 = 0x77;
const IEI_TAI_LIST: u8 = 0x54;
const IEI_ALLOWED_NSSAI: u8 = 0x15;
const IEI_T3512: u8 = 0x5E;
const IEI_FULL_NETWORK_NAME: u8 = 0x43;
const IEI_GMM_CAUSE: u8 = 0x58;
const IEI_RAND: u8 = 0x21;
const IEI_AUTN: u8 = 0x20;
const IEI_RES_STAR: u8 = 0x2D;
const IEI_AUTS: u8 = 0x30;
const IEI_IMEISV_REQUEST: u8 = 0xE0;
const IEI_ADDITIONAL_SECURITY_INFO: u8 = 0x36;
const IEI_ABBA: u8 = 0x38;
const IEI_IMEISV: u8 = 0x77;
const IEI_PDU_SESSION_ID: u8 = 0x12;
const IEI_OLD_PDU_SESSION_ID: u8 = 0x59;
const IEI_REQUEST_TYPE: u8 = 0x80;
const IEI_S_NSSAI: u8 = 0x22;
const IEI_DNN: u8 = 0x25;
const IEI_BACK_OFF_TIMER: u8 = 0x37;
const IEI_PDU_SESSION_TYPE: u8 = 0x90;
const IEI_SSC_MODE: u8 = 0xA0;
const IEI_GSM_CAUSE: u8 = 0x59;
const IEI_PDU_ADDRESS: u8 = 0x29;
const IEI_UPLINK_DATA_STATUS: u8 = 0x40;
const IEI_ALLOWED_PDU_SESSION_STATUS: u8 = 0x25;
const IEI_PDU_SESSION_REACTIVATION_RESULT: u8 = 0x26;

/// 5GMM message
#[derive(Debug, Clone, PartialEq)]
pub enum FiveGmmMessage {
    RegistrationRequest(RegistrationRequest),
    RegistrationAccept(RegistrationAccept),
    RegistrationComplete,
    RegistrationReject(RegistrationReject),
    DeregistrationRequestFromUe(DeregistrationRequestFromUe),
    DeregistrationAcceptFromUe,
    DeregistrationRequestToUe(DeregistrationRequestToUe),
    DeregistrationAcceptToUe,
    ServiceRequest(ServiceRequest),
    ServiceAccept(ServiceAccept),
    ServiceReject(ServiceReject),
    AuthenticationRequest(AuthenticationRequest),
    AuthenticationResponse(AuthenticationResponse),
    AuthenticationReject,
    AuthenticationFailure(AuthenticationFailure),
    IdentityRequest(IdentityRequest),
    IdentityResponse(IdentityResponse),
    SecurityModeCommand(SecurityModeCommand),
    SecurityModeComplete(SecurityModeComplete),
    SecurityModeReject(FiveGmmCause),
    FiveGmmStatus(FiveGmmCause),
    UlNasTransport(UlNasTransport),
    DlNasTransport(DlNasTransport),
}

impl FiveGmmMessage {
    pub fn message_type(&self) -> FiveGmmMessageType {
        match self {
            Self::RegistrationRequest(_) => FiveGmmMessageType::RegistrationRequest,
            Self::RegistrationAccept(_) => FiveGmmMessageType::RegistrationAccept,
            Self::RegistrationComplete => FiveGmmMessageType::RegistrationComplete,
            Self::RegistrationReject(_) => FiveGmmMessageType::RegistrationReject,
            Self::DeregistrationRequestFromUe(_) => FiveGmmMessageType::DeregistrationRequestFromUe,
            Self::DeregistrationAcceptFromUe => FiveGmmMessageType::DeregistrationAcceptFromUe,
            Self::DeregistrationRequestToUe(_) => FiveGmmMessageType::DeregistrationRequestToUe,
            Self::DeregistrationAcceptToUe => FiveGmmMessageType::DeregistrationAcceptToUe,
            Self::ServiceRequest(_) => FiveGmmMessageType::ServiceRequest,
            Self::ServiceAccept(_) => FiveGmmMessageType::ServiceAccept,
            Self::ServiceReject(_) => FiveGmmMessageType::ServiceReject,
            Self::AuthenticationRequest(_) => FiveGmmMessageType::AuthenticationRequest,
            Self::AuthenticationResponse(_) => FiveGmmMessageType::AuthenticationResponse,
            Self::AuthenticationReject => FiveGmmMessageType::AuthenticationReject,
            Self::AuthenticationFailure(_) => FiveGmmMessageType::AuthenticationFailure,
            Self::IdentityRequest(_) => FiveGmmMessageType::IdentityRequest,
            Self::IdentityResponse(_) => FiveGmmMessageType::IdentityResponse,
            Self::SecurityModeCommand(_) => FiveGmmMessageType::SecurityModeCommand,
            Self::SecurityModeComplete(_) => FiveGmmMessageType::SecurityModeComplete,
            Self::SecurityModeReject(_) => FiveGmmMessageType::SecurityModeReject,
            Self::FiveGmmStatus(_) => FiveGmmMessageType::FiveGmmStatus,
            Self::UlNasTransport(_) => FiveGmmMessageType::UlNasTransport,
            Self::DlNasTransport(_) => FiveGmmMessageType::DlNasTransport,
        }
    }
}

/// PSI bitmaps (PDU session status, uplink data status, reactivation
/// result) carry bit n for PDU session n, PSI 0-7 in the first octet
fn put_psi_bitmap(buf: &mut BytesMut, ie: &'static str, psi: u16) -> NasResult<()> {
    put_lv(buf, ie, &psi.to_le_bytes())
}

fn get_psi_bitmap(buf: &mut Bytes, ie: &'static str) -> NasResult<u16> {
    let v = get_lv(buf)?;
    if v.len() < 2 {
        return Err(NasError::InvalidIeLength { ie, len: v.len() });
    }
    Ok(u16::from_le_bytes([v[0], v[1]]))
}

// ============================================================================
// Registration
// ============================================================================

/// Registration Request (TS 24.501 Section 8.2.6)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegistrationRequest {
    pub registration_type: RegistrationType,
    pub ngksi: KeySetIdentifier,
    pub mobile_identity: MobileIdentity,
    pub non_current_ngksi: Option<KeySetIdentifier>,
    /// 5GMM capability octets
    pub gmm_capability: Option<Vec<u8>>,
    pub ue_security_capability: Option<UeSecurityCapability>,
    pub requested_nssai: Option<Nssai>,
    pub last_visited_tai: Option<Tai>,
    /// PSI bitmap, bit n set for PDU session n
    pub pdu_session_status: Option<u16>,
    pub nas_message_container: Option<Vec<u8>>,
}

impl RegistrationRequest {
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        buf.put_u8((self.ngksi.encode() << 4) | self.registration_type.encode());
        self.mobile_identity.encode(buf)?;
        if let Some(ksi) = self.non_current_ngksi {
            buf.put_u8(IEI_NON_CURRENT_NGKSI | ksi.encode());
        }
        if let Some(ref cap) = self.gmm_capability {
            buf.put_u8(IEI_GMM_CAPABILITY);
            put_lv(buf, "5GMM capability", cap)?;
        }
        if let Some(ref cap) = self.ue_security_capability {
            buf.put_u8(IEI_UE_SECURITY_CAPABILITY);
            cap.encode(buf);
        }
        if let Some(ref nssai) = self.requested_nssai {
            buf.put_u8(IEI_REQUESTED_NSSAI);
            nssai.encode(buf)?;
        }
        if let Some(ref tai) = self.last_visited_tai {
            buf.put_u8(IEI_LAST_VISITED_TAI);
            tai.encode(buf);
        }
        if let Some(psi) = self.pdu_session_status {
            buf.put_u8(IEI_PDU_SESSION_STATUS);
            put_psi_bitmap(buf, "PDU session status", psi)?;
        }
        if let Some(ref container) = self.nas_message_container {
            buf.put_u8(IEI_NAS_MESSAGE_CONTAINER);
            put_lve(buf, "NAS message container", container)?;
        }
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        need(buf, 1)?;
        let first = buf.get_u8();
        let registration_type = RegistrationType::decode(first & 0x0F)?;
        let ngksi = KeySetIdentifier::decode(first >> 4);
        let mobile_identity = MobileIdentity::decode(buf)?;
        let mut msg = Self { registration_type, ngksi, mobile_identity, ..Default::default() };

        for_each_optional_ie(buf, |key, octet, b| {
            match key {
                IEI_NON_CURRENT_NGKSI => msg.non_current_ngksi = Some(KeySetIdentifier::decode(octet & 0x0F)),
                IEI_GMM_CAPABILITY => msg.gmm_capability = Some(get_lv(b)?.to_vec()),
                IEI_UE_SECURITY_CAPABILITY => msg.ue_security_capability = Some(UeSecurityCapability::decode(b)?),
                IEI_REQUESTED_NSSAI => msg.requested_nssai = Some(Nssai::decode(b)?),
                IEI_LAST_VISITED_TAI => msg.last_visited_tai = Some(Tai::decode(b)?),
                IEI_PDU_SESSION_STATUS => msg.pdu_session_status = Some(get_psi_bitmap(b, "PDU session status")?),
                IEI_NAS_MESSAGE_CONTAINER => msg.nas_message_container = Some(get_lve(b)?.to_vec()),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(msg)
    }
}

/// Registration Accept (TS 24.501 Section 8.2.7)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegistrationAccept {
    pub registration_result: RegistrationResult,
    pub guti: Option<FiveGGuti>,
    pub tai_list: Option<TaiList>,
    pub allowed_nssai: Option<Nssai>,
    pub t3512: Option<GprsTimer3>,
}

impl RegistrationAccept {
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        self.registration_result.encode(buf);
        if let Some(guti) = self.guti {
            buf.put_u8(IEI_GUTI);
            MobileIdentity::FiveGGuti(guti).encode(buf)?;
        }
        if let Some(ref list) = self.tai_list {
            buf.put_u8(IEI_TAI_LIST);
            list.encode(buf)?;
        }
        if let Some(ref nssai) = self.allowed_nssai {
            buf.put_u8(IEI_ALLOWED_NSSAI);
            nssai.encode(buf)?;
        }
        if let Some(ref t) = self.t3512 {
            buf.put_u8(IEI_T3512);
            t.encode(buf);
        }
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        let registration_result = RegistrationResult::decode(buf)?;
        let mut msg = Self { registration_result, ..Default::default() };
        for_each_optional_ie(buf, |key, _, b| {
            match key {
                IEI_GUTI => match MobileIdentity::decode(b)? {
                    MobileIdentity::FiveGGuti(guti) => msg.guti = Some(guti),
                    other => return Err(NasError::InvalidMobileIdentityType(other.identity_type() as u8)),
                },
                IEI_TAI_LIST => msg.tai_list = Some(TaiList::decode(b)?),
                IEI_ALLOWED_NSSAI => msg.allowed_nssai = Some(Nssai::decode(b)?),
                IEI_T3512 => msg.t3512 = Some(GprsTimer3::decode(b)?),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(msg)
    }
}

/// Registration Reject (TS 24.501 Section 8.2.9)
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationReject {
    pub gmm_cause: FiveGmmCause,
}

impl RegistrationReject {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.gmm_cause.0);
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        need(buf, 1)?;
        let gmm_cause = FiveGmmCause(buf.get_u8());
        for_each_optional_ie(buf, |_, _, _| Ok(false))?;
        Ok(Self { gmm_cause })
    }
}

// ============================================================================
// De-registration
// ============================================================================

/// De-registration Request, UE originating (TS 24.501 Section 8.2.12)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeregistrationRequestFromUe {
    pub deregistration_type: DeRegistrationType,
    pub ngksi: KeySetIdentifier,
    pub mobile_identity: MobileIdentity,
}

impl DeregistrationRequestFromUe {
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        buf.put_u8((self.ngksi.encode() << 4) | self.deregistration_type.encode());
        self.mobile_identity.encode(buf)
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        need(buf, 1)?;
        let first = buf.get_u8();
        Ok(Self {
            deregistration_type: DeRegistrationType::decode(first & 0x0F),
            ngksi: KeySetIdentifier::decode(first >> 4),
            mobile_identity: MobileIdentity::decode(buf)?,
        })
    }
}

/// De-registration Request, UE terminated (TS 24.501 Section 8.2.14)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeregistrationRequestToUe {
    pub deregistration_type: DeRegistrationType,
    pub gmm_cause: Option<FiveGmmCause>,
}

impl DeregistrationRequestToUe {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.deregistration_type.encode());
        if let Some(cause) = self.gmm_cause {
            buf.put_u8(IEI_GMM_CAUSE);
            buf.put_u8(cause.0);
        }
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        need(buf, 1)?;
        let mut msg = Self {
            deregistration_type: DeRegistrationType::decode(buf.get_u8() & 0x0F),
            gmm_cause: None,
        };
        for_each_optional_ie(buf, |key, _, b| {
            if key != IEI_GMM_CAUSE {
                return Ok(false);
            }
            msg.gmm_cause = Some(FiveGmmCause(get_array::<1>(b)?[0]));
            Ok(true)
        })?;
        Ok(msg)
    }
}

// ============================================================================
// Service request
// ============================================================================

/// Service Request (TS 24.501 Section 8.2.16)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceRequest {
    pub ngksi: KeySetIdentifier,
    pub service_type: ServiceType,
    pub s_tmsi: MobileIdentity,
    pub uplink_data_status: Option<u16>,
    pub pdu_session_status: Option<u16>,
    pub allowed_pdu_session_status: Option<u16>,
    pub nas_message_container: Option<Vec<u8>>,
}

impl ServiceRequest {
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        buf.put_u8((self.ngksi.encode() << 4) | (self.service_type as u8 & 0x0F));
        self.s_tmsi.encode(buf)?;
        if let Some(psi) = self.uplink_data_status {
            buf.put_u8(IEI_UPLINK_DATA_STATUS);
            put_psi_bitmap(buf, "Uplink data status", psi)?;
        }
        if let Some(psi) = self.pdu_session_status {
            buf.put_u8(IEI_PDU_SESSION_STATUS);
            put_psi_bitmap(buf, "PDU session status", psi)?;
        }
        if let Some(psi) = self.allowed_pdu_session_status {
            buf.put_u8(IEI_ALLOWED_PDU_SESSION_STATUS);
            put_psi_bitmap(buf, "Allowed PDU session status", psi)?;
        }
        if let Some(ref container) = self.nas_message_container {
            buf.put_u8(IEI_NAS_MESSAGE_CONTAINER);
            put_lve(buf, "NAS message container", container)?;
        }
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        need(buf, 1)?;
        let first = buf.get_u8();
        let ngksi = KeySetIdentifier::decode(first >> 4);
        let service_type = ServiceType::decode(first);
        let s_tmsi = MobileIdentity::decode(buf)?;
        let mut msg = Self { ngksi, service_type, s_tmsi, ..Default::default() };
        for_each_optional_ie(buf, |key, _, b| {
            match key {
                IEI_UPLINK_DATA_STATUS => msg.uplink_data_status = Some(get_psi_bitmap(b, "Uplink data status")?),
                IEI_PDU_SESSION_STATUS => msg.pdu_session_status = Some(get_psi_bitmap(b, "PDU session status")?),
                IEI_ALLOWED_PDU_SESSION_STATUS => {
                    msg.allowed_pdu_session_status = Some(get_psi_bitmap(b, "Allowed PDU session status")?)
                }
                IEI_NAS_MESSAGE_CONTAINER => msg.nas_message_container = Some(get_lve(b)?.to_vec()),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(msg)
    }
}

/// Service Accept (TS 24.501 Section 8.2.17)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceAccept {
    pub pdu_session_status: Option<u16>,
    pub pdu_session_reactivation_result: Option<u16>,
}

impl ServiceAccept {
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        if let Some(psi) = self.pdu_session_status {
            buf.put_u8(IEI_PDU_SESSION_STATUS);
            put_psi_bitmap(buf, "PDU session status", psi)?;
        }
        if let Some(psi) = self.pdu_session_reactivation_result {
            buf.put_u8(IEI_PDU_SESSION_REACTIVATION_RESULT);
            put_psi_bitmap(buf, "PDU session reactivation result", psi)?;
        }
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        let mut msg = Self::default();
        for_each_optional_ie(buf, |key, _, b| {
            match key {
                IEI_PDU_SESSION_STATUS => msg.pdu_session_status = Some(get_psi_bitmap(b, "PDU session status")?),
                IEI_PDU_SESSION_REACTIVATION_RESULT => {
                    msg.pdu_session_reactivation_result = Some(get_psi_bitmap(b, "PDU session reactivation result")?)
                }
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(msg)
    }
}

/// Service Reject (TS 24.501 Section 8.2.18)
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceReject {
    pub gmm_cause: FiveGmmCause,
    pub pdu_session_status: Option<u16>,
}

impl ServiceReject {
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        buf.put_u8(self.gmm_cause.0);
        if let Some(psi) = self.pdu_session_status {
            buf.put_u8(IEI_PDU_SESSION_STATUS);
            put_psi_bitmap(buf, "PDU session status", psi)?;
        }
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        need(buf, 1)?;
        let mut msg = Self { gmm_cause: FiveGmmCause(buf.get_u8()), pdu_session_status: None };
        for_each_optional_ie(buf, |key, _, b| {
            if key != IEI_PDU_SESSION_STATUS {
                return Ok(false);
            }
            msg.pdu_session_status = Some(get_psi_bitmap(b, "PDU session status")?);
            Ok(true)
        })?;
        Ok(msg)
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Authentication Request (TS 24.501 Section 8.2.1)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuthenticationRequest {
    pub ngksi: KeySetIdentifier,
    pub abba: Abba,
    pub rand: Option<[u8; 16]>,
    pub autn: Option<[u8; 16]>,
}

impl AuthenticationRequest {
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        buf.put_u8(self.ngksi.encode());
        self.abba.encode(buf)?;
        if let Some(ref rand) = self.rand {
            buf.put_u8(IEI_RAND);
            buf.put_slice(rand);
        }
        if let Some(ref autn) = self.autn {
            buf.put_u8(IEI_AUTN);
            put_lv(buf, "AUTN", autn)?;
        }
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        need(buf, 1)?;
        let ngksi = KeySetIdentifier::decode(buf.get_u8() & 0x0F);
        let abba = Abba::decode(buf)?;
        let mut msg = Self { ngksi, abba, ..Default::default() };
        for_each_optional_ie(buf, |key, _, b| {
            match key {
                IEI_RAND => msg.rand = Some(get_array::<16>(b)?),
                IEI_AUTN => {
                    let mut v = get_lv(b)?;
                    if v.len() != 16 {
                        return Err(NasError::InvalidIeLength { ie: "AUTN", len: v.len() });
                    }
                    msg.autn = Some(get_array::<16>(&mut v)?);
                }
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(msg)
    }
}

/// Authentication Response (TS 24.501 Section 8.2.2)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuthenticationResponse {
    /// RES*
    pub res_star: Option<[u8; 16]>,
}

impl AuthenticationResponse {
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        if let Some(ref res) = self.res_star {
            buf.put_u8(IEI_RES_STAR);
            put_lv(buf, "RES*", res)?;
        }
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        let mut msg = Self::default();
        for_each_optional_ie(buf, |key, _, b| {
            if key != IEI_RES_STAR {
                return Ok(false);
            }
            let mut v = get_lv(b)?;
            if v.len() != 16 {
                return Err(NasError::InvalidIeLength { ie: "RES*", len: v.len() });
            }
            msg.res_star = Some(get_array::<16>(&mut v)?);
            Ok(true)
        })?;
        Ok(msg)
    }
}

/// Authentication Failure (TS 24.501 Section 8.2.4)
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticationFailure {
    pub gmm_cause: FiveGmmCause,
    /// AUTS, present with synch failure
    pub auts: Option<[u8; 14]>,
}

impl AuthenticationFailure {
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        buf.put_u8(self.gmm_cause.0);
        if let Some(ref auts) = self.auts {
            buf.put_u8(IEI_AUTS);
            put_lv(buf, "AUTS", auts)?;
        }
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        need(buf, 1)?;
        let mut msg = Self { gmm_cause: FiveGmmCause(buf.get_u8()), auts: None };
        for_each_optional_ie(buf, |key, _, b| {
            if key != IEI_AUTS {
                return Ok(false);
            }
            let mut v = get_lv(b)?;
            if v.len() != 14 {
                return Err(NasError::InvalidIeLength { ie: "AUTS", len: v.len() });
            }
            msg.auts = Some(get_array::<14>(&mut v)?);
            Ok(true)
        })?;
        Ok(msg)
    }
}

// ============================================================================
// Identification and security mode control
// ============================================================================

/// Identity Request (TS 24.501 Section 8.2.21)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IdentityRequest {
    pub identity_type: IdentityType,
}

impl IdentityRequest {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.identity_type as u8);
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        need(buf, 1)?;
        Ok(Self { identity_type: IdentityType::try_from(buf.get_u8() & 0x07)? })
    }
}

/// Identity Response (TS 24.501 Section 8.2.22)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IdentityResponse {
    pub mobile_identity: MobileIdentity,
}

impl IdentityResponse {
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        self.mobile_identity.encode(buf)
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        Ok(Self { mobile_identity: MobileIdentity::decode(buf)? })
    }
}

/// Security Mode Command (TS 24.501 Section 8.2.25)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SecurityModeCommand {
    pub selected_nas_security_algorithms: SecurityAlgorithms,
    pub ngksi: KeySetIdentifier,
    pub replayed_ue_security_capabilities: UeSecurityCapability,
    pub imeisv_request: bool,
    /// Additional 5G security information octet (RINMR, HDP)
    pub additional_security_information: Option<u8>,
    pub abba: Option<Abba>,
}

impl SecurityModeCommand {
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        buf.put_u8(self.selected_nas_security_algorithms.encode());
        buf.put_u8(self.ngksi.encode());
        self.replayed_ue_security_capabilities.encode(buf);
        if self.imeisv_request {
            buf.put_u8(IEI_IMEISV_REQUEST | 0x01);
        }
        if let Some(info) = self.additional_security_information {
            buf.put_u8(IEI_ADDITIONAL_SECURITY_INFO);
            put_lv(buf, "additional 5G security information", &[info])?;
        }
        if let Some(ref abba) = self.abba {
            buf.put_u8(IEI_ABBA);
            abba.encode(buf)?;
        }
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        need(buf, 2)?;
        let selected_nas_security_algorithms = SecurityAlgorithms::decode(buf.get_u8());
        let ngksi = KeySetIdentifier::decode(buf.get_u8() & 0x0F);
        let replayed_ue_security_capabilities = UeSecurityCapability::decode(buf)?;
        let mut msg = Self {
            selected_nas_security_algorithms,
            ngksi,
            replayed_ue_security_capabilities,
            ..Default::default()
        };
        for_each_optional_ie(buf, |key, octet, b| {
            match key {
                IEI_IMEISV_REQUEST => msg.imeisv_request = octet & 0x07 == 1,
                IEI_ADDITIONAL_SECURITY_INFO => {
                    let v = get_lv(b)?;
                    msg.additional_security_information = v.first().copied();
                }
                IEI_ABBA => msg.abba = Some(Abba::decode(b)?),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(msg)
    }
}

/// Security Mode Complete (TS 24.501 Section 8.2.26)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SecurityModeComplete {
    pub imeisv: Option<MobileIdentity>,
    /// Complete initial message when the Registration Request was cleartext-only
    pub nas_message_container: Option<Vec<u8>>,
}

impl SecurityModeComplete {
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        if let Some(ref imeisv) = self.imeisv {
            buf.put_u8(IEI_IMEISV);
            imeisv.encode(buf)?;
        }
        if let Some(ref container) = self.nas_message_container {
            buf.put_u8(IEI_NAS_MESSAGE_CONTAINER);
            put_lve(buf, "NAS message container", container)?;
        }
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        let mut msg = Self::default();
        for_each_optional_ie(buf, |key, _, b| {
            match key {
                IEI_IMEISV => msg.imeisv = Some(MobileIdentity::decode(b)?),
                IEI_NAS_MESSAGE_CONTAINER => msg.nas_message_container = Some(get_lve(b)?.to_vec()),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(msg)
    }
}

// ============================================================================
// NAS transport
// ============================================================================

/// UL NAS Transport (TS 24.501 Section 8.2.10)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UlNasTransport {
    pub payload_container_type: PayloadContainerType,
    pub payload_container: Vec<u8>,
    pub pdu_session_id: Option<u8>,
    pub old_pdu_session_id: Option<u8>,
    pub request_type: Option<RequestType>,
    pub s_nssai: Option<SNssai>,
    pub dnn: Option<Dnn>,
}

impl UlNasTransport {
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        buf.put_u8(self.payload_container_type as u8);
        put_lve(buf, "payload container", &self.payload_container)?;
        if let Some(psi) = self.pdu_session_id {
            buf.put_u8(IEI_PDU_SESSION_ID);
            buf.put_u8(psi);
        }
        if let Some(psi) = self.old_pdu_session_id {
            buf.put_u8(IEI_OLD_PDU_SESSION_ID);
            buf.put_u8(psi);
        }
        if let Some(rt) = self.request_type {
            buf.put_u8(IEI_REQUEST_TYPE | rt as u8);
        }
        if let Some(ref s) = self.s_nssai {
            buf.put_u8(IEI_S_NSSAI);
            s.encode(buf);
        }
        if let Some(ref dnn) = self.dnn {
            buf.put_u8(IEI_DNN);
            dnn.encode(buf)?;
        }
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        need(buf, 1)?;
        let payload_container_type = PayloadContainerType::try_from(buf.get_u8() & 0x0F)?;
        let payload_container = get_lve(buf)?.to_vec();
        let mut msg = Self { payload_container_type, payload_container, ..Default::default() };
        for_each_optional_ie(buf, |key, octet, b| {
            match key {
                IEI_PDU_SESSION_ID => msg.pdu_session_id = Some(get_array::<1>(b)?[0]),
                IEI_OLD_PDU_SESSION_ID => msg.old_pdu_session_id = Some(get_array::<1>(b)?[0]),
                IEI_REQUEST_TYPE => msg.request_type = Some(RequestType::try_from(octet & 0x07)?),
                IEI_S_NSSAI => msg.s_nssai = Some(SNssai::decode(b)?),
                IEI_DNN => msg.dnn = Some(Dnn::decode(b)?),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(msg)
    }
}

/// DL NAS Transport (TS 24.501 Section 8.2.11)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DlNasTransport {
    pub payload_container_type: PayloadContainerType,
    pub payload_container: Vec<u8>,
    pub pdu_session_id: Option<u8>,
    pub gmm_cause: Option<FiveGmmCause>,
    pub back_off_timer: Option<GprsTimer3>,
}

impl DlNasTransport {
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        buf.put_u8(self.payload_container_type as u8);
        put_lve(buf, "payload container", &self.payload_container)?;
        if let Some(psi) = self.pdu_session_id {
            buf.put_u8(IEI_PDU_SESSION_ID);
            buf.put_u8(psi);
        }
        if let Some(cause) = self.gmm_cause {
            buf.put_u8(IEI_GMM_CAUSE);
            buf.put_u8(cause.0);
        }
        if let Some(ref t) = self.back_off_timer {
            buf.put_u8(IEI_BACK_OFF_TIMER);
            t.encode(buf);
        }
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        need(buf, 1)?;
        let payload_container_type = PayloadContainerType::try_from(buf.get_u8() & 0x0F)?;
        let payload_container = get_lve(buf)?.to_vec();
        let mut msg = Self { payload_container_type, payload_container, ..Default::default() };
        for_each_optional_ie(buf, |key, _, b| {
            match key {
                IEI_PDU_SESSION_ID => msg.pdu_session_id = Some(get_array::<1>(b)?[0]),
                IEI_GMM_CAUSE => msg.gmm_cause = Some(FiveGmmCause(get_array::<1>(b)?[0])),
                IEI_BACK_OFF_TIMER => msg.back_off_timer = Some(GprsTimer3::decode(b)?),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(msg)
    }
}

// ============================================================================
// 5GMM framing
// ============================================================================

/// Build a plain 5GMM message
pub fn build_5gmm_message(msg: &FiveGmmMessage) -> NasResult<Bytes> {
    let mut buf = BytesMut::new();
    FiveGmmHeader { message_type: msg.message_type() }.encode(&mut buf);

    match msg {
        FiveGmmMessage::RegistrationRequest(m) => m.encode(&mut buf)?,
        FiveGmmMessage::RegistrationAccept(m) => m.encode(&mut buf)?,
        FiveGmmMessage::RegistrationReject(m) => m.encode(&mut buf),
        FiveGmmMessage::DeregistrationRequestFromUe(m) => m.encode(&mut buf)?,
        FiveGmmMessage::DeregistrationRequestToUe(m) => m.encode(&mut buf),
        FiveGmmMessage::ServiceRequest(m) => m.encode(&mut buf)?,
        FiveGmmMessage::ServiceAccept(m) => m.encode(&mut buf)?,
        FiveGmmMessage::ServiceReject(m) => m.encode(&mut buf)?,
        FiveGmmMessage::AuthenticationRequest(m) => m.encode(&mut buf)?,
        FiveGmmMessage::AuthenticationResponse(m) => m.encode(&mut buf)?,
        FiveGmmMessage::AuthenticationFailure(m) => m.encode(&mut buf)?,
        FiveGmmMessage::IdentityRequest(m) => m.encode(&mut buf),
        FiveGmmMessage::IdentityResponse(m) => m.encode(&mut buf)?,
        FiveGmmMessage::SecurityModeCommand(m) => m.encode(&mut buf)?,
        FiveGmmMessage::SecurityModeComplete(m) => m.encode(&mut buf)?,
        FiveGmmMessage::SecurityModeReject(cause) | FiveGmmMessage::FiveGmmStatus(cause) => buf.put_u8(cause.0),
        FiveGmmMessage::UlNasTransport(m) => m.encode(&mut buf)?,
        FiveGmmMessage::DlNasTransport(m) => m.encode(&mut buf)?,
        FiveGmmMessage::RegistrationComplete
        | FiveGmmMessage::DeregistrationAcceptFromUe
        | FiveGmmMessage::DeregistrationAcceptToUe
        | FiveGmmMessage::AuthenticationReject => {}
    }

    Ok(buf.freeze())
}

/// Parse a plain 5GMM message
pub fn parse_5gmm_message(buf: &mut Bytes) -> NasResult<FiveGmmMessage> {
    let header = FiveGmmHeader::decode(buf)?;

    let msg = match header.message_type {
        FiveGmmMessageType::RegistrationRequest => FiveGmmMessage::RegistrationRequest(RegistrationRequest::decode(buf)?),
        FiveGmmMessageType::RegistrationAccept => FiveGmmMessage::RegistrationAccept(RegistrationAccept::decode(buf)?),
        FiveGmmMessageType::RegistrationComplete => FiveGmmMessage::RegistrationComplete,
        FiveGmmMessageType::RegistrationReject => FiveGmmMessage::RegistrationReject(RegistrationReject::decode(buf)?),
        FiveGmmMessageType::DeregistrationRequestFromUe => {
            FiveGmmMessage::DeregistrationRequestFromUe(DeregistrationRequestFromUe::decode(buf)?)
        }
        FiveGmmMessageType::DeregistrationAcceptFromUe => FiveGmmMessage::DeregistrationAcceptFromUe,
        FiveGmmMessageType::DeregistrationRequestToUe => {
            FiveGmmMessage::DeregistrationRequestToUe(DeregistrationRequestToUe::decode(buf)?)
        }
        FiveGmmMessageType::DeregistrationAcceptToUe => FiveGmmMessage::DeregistrationAcceptToUe,
        FiveGmmMessageType::ServiceRequest => FiveGmmMessage::ServiceRequest(ServiceRequest::decode(buf)?),
        FiveGmmMessageType::ServiceAccept => FiveGmmMessage::ServiceAccept(ServiceAccept::decode(buf)?),
        FiveGmmMessageType::ServiceReject => FiveGmmMessage::ServiceReject(ServiceReject::decode(buf)?),
        FiveGmmMessageType::AuthenticationRequest => {
            FiveGmmMessage::AuthenticationRequest(AuthenticationRequest::decode(buf)?)
        }
        FiveGmmMessageType::AuthenticationResponse => {
            FiveGmmMessage::AuthenticationResponse(AuthenticationResponse::decode(buf)?)
        }
        FiveGmmMessageType::AuthenticationReject => FiveGmmMessage::AuthenticationReject,
        FiveGmmMessageType::AuthenticationFailure => {
            FiveGmmMessage::AuthenticationFailure(AuthenticationFailure::decode(buf)?)
        }
        FiveGmmMessageType::IdentityRequest => FiveGmmMessage::IdentityRequest(IdentityRequest::decode(buf)?),
        FiveGmmMessageType::IdentityResponse => FiveGmmMessage::IdentityResponse(IdentityResponse::decode(buf)?),
        FiveGmmMessageType::SecurityModeCommand => {
            FiveGmmMessage::SecurityModeCommand(SecurityModeCommand::decode(buf)?)
        }
        FiveGmmMessageType::SecurityModeComplete => {
            FiveGmmMessage::SecurityModeComplete(SecurityModeComplete::decode(buf)?)
        }
        FiveGmmMessageType::SecurityModeReject => FiveGmmMessage::SecurityModeReject(FiveGmmCause(get_array::<1>(buf)?[0])),
        FiveGmmMessageType::FiveGmmStatus => FiveGmmMessage::FiveGmmStatus(FiveGmmCause(get_array::<1>(buf)?[0])),
        FiveGmmMessageType::UlNasTransport => FiveGmmMessage::UlNasTransport(UlNasTransport::decode(buf)?),
        FiveGmmMessageType::DlNasTransport => FiveGmmMessage::DlNasTransport(DlNasTransport::decode(buf)?),
    };

    Ok(msg)
}

// ============================================================================
// 5GSM
// ============================================================================

/// 5GSM message
#[derive(Debug, Clone, PartialEq)]
pub enum FiveGsmMessage {
    PduSessionEstablishmentRequest(PduSessionEstablishmentRequest),
    PduSessionEstablishmentAccept(PduSessionEstablishmentAccept),
    PduSessionEstablishmentReject(FiveGsmCause),
    PduSessionReleaseRequest(Option<FiveGsmCause>),
    PduSessionReleaseReject(FiveGsmCause),
    PduSessionReleaseCommand(FiveGsmCause),
    PduSessionReleaseComplete(Option<FiveGsmCause>),
    FiveGsmStatus(FiveGsmCause),
}

impl FiveGsmMessage {
    pub fn message_type(&self) -> FiveGsmMessageType {
        match self {
            Self::PduSessionEstablishmentRequest(_) => FiveGsmMessageType::PduSessionEstablishmentRequest,
            Self::PduSessionEstablishmentAccept(_) => FiveGsmMessageType::PduSessionEstablishmentAccept,
            Self::PduSessionEstablishmentReject(_) => FiveGsmMessageType::PduSessionEstablishmentReject,
            Self::PduSessionReleaseRequest(_) => FiveGsmMessageType::PduSessionReleaseRequest,
            Self::PduSessionReleaseReject(_) => FiveGsmMessageType::PduSessionReleaseReject,
            Self::PduSessionReleaseCommand(_) => FiveGsmMessageType::PduSessionReleaseCommand,
            Self::PduSessionReleaseComplete(_) => FiveGsmMessageType::PduSessionReleaseComplete,
            Self::FiveGsmStatus(_) => FiveGsmMessageType::FiveGsmStatus,
        }
    }
}

/// PDU Session Establishment Request (TS 24.501 Section 8.3.1)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PduSessionEstablishmentRequest {
    /// Integrity protection maximum data rate (UL, DL)
    pub integrity_max_data_rate: [u8; 2],
    pub pdu_session_type: Option<PduSessionType>,
    pub ssc_mode: Option<u8>,
}

impl PduSessionEstablishmentRequest {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.integrity_max_data_rate);
        if let Some(t) = self.pdu_session_type {
            buf.put_u8(IEI_PDU_SESSION_TYPE | t as u8);
        }
        if let Some(mode) = self.ssc_mode {
            buf.put_u8(IEI_SSC_MODE | (mode & 0x07));
        }
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        let integrity_max_data_rate = get_array::<2>(buf)?;
        let mut msg = Self { integrity_max_data_rate, ..Default::default() };
        for_each_optional_ie(buf, |key, octet, _| {
            match key {
                IEI_PDU_SESSION_TYPE => msg.pdu_session_type = Some(PduSessionType::try_from(octet & 0x07)?),
                IEI_SSC_MODE => msg.ssc_mode = Some(octet & 0x07),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(msg)
    }
}

/// PDU Session Establishment Accept (TS 24.501 Section 8.3.2)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PduSessionEstablishmentAccept {
    pub pdu_session_type: PduSessionType,
    pub ssc_mode: u8,
    pub qos_rules: QosRules,
    pub session_ambr: SessionAmbr,
    pub gsm_cause: Option<FiveGsmCause>,
    pub pdu_address: Option<PduAddress>,
    pub s_nssai: Option<SNssai>,
    pub dnn: Option<Dnn>,
}

impl PduSessionEstablishmentAccept {
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        buf.put_u8(((self.ssc_mode & 0x07) << 4) | self.pdu_session_type as u8);
        self.qos_rules.encode(buf)?;
        self.session_ambr.encode(buf);
        if let Some(cause) = self.gsm_cause {
            buf.put_u8(IEI_GSM_CAUSE);
            buf.put_u8(cause.0);
        }
        if let Some(ref addr) = self.pdu_address {
            buf.put_u8(IEI_PDU_ADDRESS);
            addr.encode(buf);
        }
        if let Some(ref s) = self.s_nssai {
            buf.put_u8(IEI_S_NSSAI);
            s.encode(buf);
        }
        if let Some(ref dnn) = self.dnn {
            buf.put_u8(IEI_DNN);
            dnn.encode(buf)?;
        }
        Ok(())
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        need(buf, 1)?;
        let first = buf.get_u8();
        let pdu_session_type = PduSessionType::try_from(first & 0x07)?;
        let qos_rules = QosRules::decode(buf)?;
        let session_ambr = SessionAmbr::decode(buf)?;
        let mut msg = Self {
            pdu_session_type,
            ssc_mode: (first >> 4) & 0x07,
            qos_rules,
            session_ambr,
            ..Default::default()
        };
        for_each_optional_ie(buf, |key, _, b| {
            match key {
                IEI_GSM_CAUSE => msg.gsm_cause = Some(FiveGsmCause(get_array::<1>(b)?[0])),
                IEI_PDU_ADDRESS => msg.pdu_address = Some(PduAddress::decode(b)?),
                IEI_S_NSSAI => msg.s_nssai = Some(SNssai::decode(b)?),
                IEI_DNN => msg.dnn = Some(Dnn::decode(b)?),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(msg)
    }
}

fn decode_optional_gsm_cause(buf: &mut Bytes) -> NasResult<Option<FiveGsmCause>> {
    let mut cause = None;
    for_each_optional_ie(buf, |key, _, b| {
        if key != IEI_GSM_CAUSE {
            return Ok(false);
        }
        cause = Some(FiveGsmCause(get_array::<1>(b)?[0]));
        Ok(true)
    })?;
    Ok(cause)
}

/// Build a 5GSM message
pub fn build_5gsm_message(pdu_session_id: u8, pti: u8, msg: &FiveGsmMessage) -> NasResult<Bytes> {
    let mut buf = BytesMut::new();
    FiveGsmHeader { pdu_session_id, pti, message_type: msg.message_type() }.encode(&mut buf);

    match msg {
        FiveGsmMessage::PduSessionEstablishmentRequest(m) => m.encode(&mut buf),
        FiveGsmMessage::PduSessionEstablishmentAccept(m) => m.encode(&mut buf)?,
        FiveGsmMessage::PduSessionEstablishmentReject(cause)
        | FiveGsmMessage::PduSessionReleaseReject(cause)
        | FiveGsmMessage::PduSessionReleaseCommand(cause)
        | FiveGsmMessage::FiveGsmStatus(cause) => buf.put_u8(cause.0),
        FiveGsmMessage::PduSessionReleaseRequest(cause) | FiveGsmMessage::PduSessionReleaseComplete(cause) => {
            if let Some(cause) = cause {
                buf.put_u8(IEI_GSM_CAUSE);
                buf.put_u8(cause.0);
            }
        }
    }

    Ok(buf.freeze())
}

/// Parse a 5GSM message, returning the header alongside it
pub fn parse_5gsm_message(buf: &mut Bytes) -> NasResult<(FiveGsmHeader, FiveGsmMessage)> {
    let header = FiveGsmHeader::decode(buf)?;
    let mandatory_cause = |b: &mut Bytes| -> NasResult<FiveGsmCause> { Ok(FiveGsmCause(get_array::<1>(b)?[0])) };

    let msg = match header.message_type {
        FiveGsmMessageType::PduSessionEstablishmentRequest => {
            FiveGsmMessage::PduSessionEstablishmentRequest(PduSessionEstablishmentRequest::decode(buf)?)
        }
        FiveGsmMessageType::PduSessionEstablishmentAccept => {
            FiveGsmMessage::PduSessionEstablishmentAccept(PduSessionEstablishmentAccept::decode(buf)?)
        }
        FiveGsmMessageType::PduSessionEstablishmentReject => {
            FiveGsmMessage::PduSessionEstablishmentReject(mandatory_cause(buf)?)
        }
        FiveGsmMessageType::PduSessionReleaseRequest => {
            FiveGsmMessage::PduSessionReleaseRequest(decode_optional_gsm_cause(buf)?)
        }
        FiveGsmMessageType::PduSessionReleaseReject => FiveGsmMessage::PduSessionReleaseReject(mandatory_cause(buf)?),
        FiveGsmMessageType::PduSessionReleaseCommand => FiveGsmMessage::PduSessionReleaseCommand(mandatory_cause(buf)?),
        FiveGsmMessageType::PduSessionReleaseComplete => {
            FiveGsmMessage::PduSessionReleaseComplete(decode_optional_gsm_cause(buf)?)
        }
        FiveGsmMessageType::FiveGsmStatus => FiveGsmMessage::FiveGsmStatus(mandatory_cause(buf)?),
    };

    Ok((header, msg))
}
