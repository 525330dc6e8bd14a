//! 5GS-specific NAS information elements
//!
//! Based on 3GPP TS 24.501 Sections 9.11.3 (5GMM) and 9.11.4 (5GSM)

use bytes::{Buf, BufMut, Bytes, BytesMut};
use crate::error::{need, NasError, NasResult};
use crate::common::ie::{get_lv, get_lve, put_lv, put_lve};
use crate::common::types::{PlmnId, SNssai, Tai};

/// 5GMM cause (TS 24.501 Section 9.11.3.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiveGmmCause(pub u8);

impl FiveGmmCause {
    pub const ILLEGAL_UE: Self = Self(3);
    pub const ILLEGAL_ME: Self = Self(6);
    pub const FIVEGS_SERVICES_NOT_ALLOWED: Self = Self(7);
    pub const UE_IDENTITY_CANNOT_BE_DERIVED: Self = Self(9);
    pub const IMPLICITLY_DEREGISTERED: Self = Self(10);
    pub const PLMN_NOT_ALLOWED: Self = Self(11);
    pub const TA_NOT_ALLOWED: Self = Self(12);
    pub const MAC_FAILURE: Self = Self(20);
    pub const SYNCH_FAILURE: Self = Self(21);
    pub const CONGESTION: Self = Self(22);
    pub const UE_SECURITY_CAPABILITIES_MISMATCH: Self = Self(23);
    pub const SECURITY_MODE_REJECTED_UNSPECIFIED: Self = Self(24);
    pub const NON_5G_AUTHENTICATION_UNACCEPTABLE: Self = Self(26);
    pub const NO_NETWORK_SLICES_AVAILABLE: Self = Self(62);
    pub const PAYLOAD_WAS_NOT_FORWARDED: Self = Self(90);
    pub const DNN_NOT_SUPPORTED: Self = Self(91);
    pub const SEMANTICALLY_INCORRECT_MESSAGE: Self = Self(95);
    pub const INVALID_MANDATORY_INFORMATION: Self = Self(96);
    pub const MESSAGE_TYPE_NON_EXISTENT: Self = Self(97);
    pub const MESSAGE_NOT_COMPATIBLE_WITH_PROTOCOL_STATE: Self = Self(101);
    pub const PROTOCOL_ERROR_UNSPECIFIED: Self = Self(111);
}

/// 5GSM cause (TS 24.501 Section 9.11.4.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiveGsmCause(pub u8);

impl FiveGsmCause {
    pub const INSUFFICIENT_RESOURCES: Self = Self(26);
    pub const MISSING_OR_UNKNOWN_DNN: Self = Self(27);
    pub const UNKNOWN_PDU_SESSION_TYPE: Self = Self(28);
    pub const REQUEST_REJECTED_UNSPECIFIED: Self = Self(31);
    pub const REGULAR_DEACTIVATION: Self = Self(36);
    pub const INVALID_PDU_SESSION_IDENTITY: Self = Self(43);
    pub const PDU_SESSION_DOES_NOT_EXIST: Self = Self(54);
    pub const PROTOCOL_ERROR_UNSPECIFIED: Self = Self(111);
}

/// 5GS registration type (TS 24.501 Section 9.11.3.7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistrationType {
    /// Follow-on request pending
    pub follow_on_request: bool,
    pub value: RegistrationTypeValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RegistrationTypeValue {
    #[default]
    InitialRegistration = 1,
    MobilityRegistrationUpdating = 2,
    PeriodicRegistrationUpdating = 3,
    EmergencyRegistration = 4,
}

impl RegistrationTypeValue {
    /// Mobility or periodic update of an existing registration
    pub fn is_update(&self) -> bool {
        matches!(self, Self::MobilityRegistrationUpdating | Self::PeriodicRegistrationUpdating)
    }
}

impl RegistrationType {
    pub fn new(follow_on_request: bool, value: RegistrationTypeValue) -> Self {
        Self { follow_on_request, value }
    }

    pub fn encode(&self) -> u8 {
        let for_bit = if self.follow_on_request { 0x08 } else { 0 };
        for_bit | self.value as u8
    }

    pub fn decode(nibble: u8) -> NasResult<Self> {
        let value = match nibble & 0x07 {
            1 => RegistrationTypeValue::InitialRegistration,
            2 => RegistrationTypeValue::MobilityRegistrationUpdating,
            3 => RegistrationTypeValue::PeriodicRegistrationUpdating,
            4 => RegistrationTypeValue::EmergencyRegistration,
            v => return Err(NasError::InvalidRegistrationType(v)),
        };
        Ok(Self { follow_on_request: nibble & 0x08 != 0, value })
    }
}

/// 5GS identity type used in Identity Request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum IdentityType {
    NoIdentity = 0,
    #[default]
    Suci = 1,
    FiveGGuti = 2,
    Imei = 3,
    FiveGSTmsi = 4,
    Imeisv = 5,
}

impl TryFrom<u8> for IdentityType {
    type Error = NasError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::NoIdentity),
            1 => Ok(Self::Suci),
            2 => Ok(Self::FiveGGuti),
            3 => Ok(Self::Imei),
            4 => Ok(Self::FiveGSTmsi),
            5 => Ok(Self::Imeisv),
            _ => Err(NasError::InvalidMobileIdentityType(value)),
        }
    }
}

/// 5GS mobile identity (TS 24.501 Section 9.11.3.4)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MobileIdentity {
    #[default]
    NoIdentity,
    Suci(Suci),
    FiveGGuti(FiveGGuti),
    /// IMEI digits
    Imei(String),
    FiveGSTmsi(FiveGSTmsi),
    /// IMEISV digits
    Imeisv(String),
}

impl MobileIdentity {
    /// Value part, without any length field
    pub fn encode_value(&self, buf: &mut BytesMut) -> NasResult<()> {
        match self {
            Self::NoIdentity => buf.put_u8(IdentityType::NoIdentity as u8),
            Self::Suci(suci) => suci.encode_value(buf)?,
            Self::FiveGGuti(guti) => guti.encode_value(buf),
            Self::Imei(digits) => encode_digit_identity(buf, IdentityType::Imei, digits)?,
            Self::FiveGSTmsi(tmsi) => tmsi.encode_value(buf),
            Self::Imeisv(digits) => encode_digit_identity(buf, IdentityType::Imeisv, digits)?,
        }
        Ok(())
    }

    /// Encode as LV-E
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        let mut value = BytesMut::new();
        self.encode_value(&mut value)?;
        put_lve(buf, "5GS mobile identity", &value)
    }

    /// Decode an LV-E mobile identity
    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        let mut v = get_lve(buf)?;
        Self::decode_value(&mut v)
    }

    pub fn decode_value(v: &mut Bytes) -> NasResult<Self> {
        need(v, 1)?;
        match IdentityType::try_from(v[0] & 0x07)? {
            IdentityType::NoIdentity => {
                v.advance(v.remaining());
                Ok(Self::NoIdentity)
            }
            IdentityType::Suci => Ok(Self::Suci(Suci::decode_value(v)?)),
            IdentityType::FiveGGuti => Ok(Self::FiveGGuti(FiveGGuti::decode_value(v)?)),
            IdentityType::Imei => Ok(Self::Imei(decode_digit_identity(v)?)),
            IdentityType::FiveGSTmsi => Ok(Self::FiveGSTmsi(FiveGSTmsi::decode_value(v)?)),
            IdentityType::Imeisv => Ok(Self::Imeisv(decode_digit_identity(v)?)),
        }
    }

    pub fn identity_type(&self) -> IdentityType {
        match self {
            Self::NoIdentity => IdentityType::NoIdentity,
            Self::Suci(_) => IdentityType::Suci,
            Self::FiveGGuti(_) => IdentityType::FiveGGuti,
            Self::Imei(_) => IdentityType::Imei,
            Self::FiveGSTmsi(_) => IdentityType::FiveGSTmsi,
            Self::Imeisv(_) => IdentityType::Imeisv,
        }
    }
}

fn digit_value(field: &'static str, c: char) -> NasResult<u8> {
    c.to_digit(10)
        .map(|d| d as u8)
        .ok_or(NasError::InvalidValue { field, value: c as u32 })
}

fn encode_digit_identity(buf: &mut BytesMut, ty: IdentityType, digits: &str) -> NasResult<()> {
    let d: Vec<u8> = digits.chars().map(|c| digit_value("identity digit", c)).collect::<NasResult<_>>()?;
    let first = *d.first().ok_or(NasError::MissingMandatoryIe("identity digits"))?;
    let odd = if d.len() % 2 == 1 { 0x08 } else { 0 };
    buf.put_u8((first << 4) | odd | ty as u8);
    for pair in d[1..].chunks(2) {
        let hi = pair.get(1).copied().unwrap_or(0x0F);
        buf.put_u8((hi << 4) | pair[0]);
    }
    Ok(())
}

fn decode_digit_identity(v: &mut Bytes) -> NasResult<String> {
    let first = v.get_u8();
    let mut out = String::new();
    out.push(char::from(b'0' + (first >> 4)));
    while v.has_remaining() {
        let b = v.get_u8();
        out.push(char::from(b'0' + (b & 0x0F)));
        let hi = b >> 4;
        if !(hi == 0x0F && !v.has_remaining()) {
            out.push(char::from(b'0' + hi));
        }
    }
    Ok(out)
}

/// SUCI (TS 24.501 Section 9.11.3.4) in IMSI format
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Suci {
    pub plmn_id: PlmnId,
    /// Routing indicator digits, BCD packed with F fillers
    pub routing_indicator: [u8; 2],
    /// Protection scheme id (0 = null scheme)
    pub protection_scheme_id: u8,
    pub home_network_pki: u8,
    /// MSIN (BCD) for the null scheme, ciphertext otherwise
    pub scheme_output: Vec<u8>,
}

impl Suci {
    pub const NULL_SCHEME: u8 = 0;

    /// Null-scheme SUCI for an IMSI written as `<MCC><MNC><MSIN>`
    pub fn from_imsi(plmn_id: PlmnId, msin: &str) -> NasResult<Self> {
        let d: Vec<u8> = msin.chars().map(|c| digit_value("msin digit", c)).collect::<NasResult<_>>()?;
        let scheme_output = d
            .chunks(2)
            .map(|p| (p.get(1).copied().unwrap_or(0x0F) << 4) | p[0])
            .collect();
        Ok(Self {
            plmn_id,
            routing_indicator: [0xF0, 0xFF],
            protection_scheme_id: Self::NULL_SCHEME,
            home_network_pki: 0,
            scheme_output,
        })
    }

    /// MSIN digits of a null-scheme SUCI
    pub fn msin(&self) -> Option<String> {
        if self.protection_scheme_id != Self::NULL_SCHEME {
            return None;
        }
        let mut out = String::new();
        for b in &self.scheme_output {
            for nibble in [b & 0x0F, b >> 4] {
                if nibble > 9 {
                    return Some(out);
                }
                out.push(char::from(b'0' + nibble));
            }
        }
        Some(out)
    }

    /// `imsi-<MCC><MNC><MSIN>` for a null-scheme SUCI
    pub fn supi(&self) -> Option<String> {
        let msin = self.msin()?;
        Some(format!("imsi-{}{}{}", self.plmn_id.mcc_string(), self.plmn_id.mnc_string(), msin))
    }

    fn encode_value(&self, buf: &mut BytesMut) -> NasResult<()> {
        // SUPI format IMSI (0), type SUCI
        buf.put_u8(IdentityType::Suci as u8);
        self.plmn_id.encode(buf);
        buf.put_slice(&self.routing_indicator);
        buf.put_u8(self.protection_scheme_id & 0x0F);
        buf.put_u8(self.home_network_pki);
        buf.put_slice(&self.scheme_output);
        Ok(())
    }

    fn decode_value(v: &mut Bytes) -> NasResult<Self> {
        need(v, 8)?;
        let first = v.get_u8();
        let supi_format = (first >> 4) & 0x07;
        if supi_format != 0 {
            return Err(NasError::InvalidValue { field: "SUPI format", value: supi_format as u32 });
        }
        let plmn_id = PlmnId::decode(v)?;
        let mut routing_indicator = [0u8; 2];
        v.copy_to_slice(&mut routing_indicator);
        let protection_scheme_id = v.get_u8() & 0x0F;
        let home_network_pki = v.get_u8();
        let scheme_output = v.split_off(0).to_vec();
        Ok(Self {
            plmn_id,
            routing_indicator,
            protection_scheme_id,
            home_network_pki,
            scheme_output,
        })
    }
}

/// 5G-GUTI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FiveGGuti {
    pub plmn_id: PlmnId,
    pub amf_region_id: u8,
    /// AMF Set ID (10 bits)
    pub amf_set_id: u16,
    /// AMF Pointer (6 bits)
    pub amf_pointer: u8,
    pub tmsi: u32,
}

impl FiveGGuti {
    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_u8(0xF0 | IdentityType::FiveGGuti as u8);
        self.plmn_id.encode(buf);
        buf.put_u8(self.amf_region_id);
        buf.put_u16(((self.amf_set_id & 0x3FF) << 6) | (self.amf_pointer as u16 & 0x3F));
        buf.put_u32(self.tmsi);
    }

    fn decode_value(v: &mut Bytes) -> NasResult<Self> {
        if v.remaining() != 11 {
            return Err(NasError::InvalidIeLength { ie: "5G-GUTI", len: v.remaining() });
        }
        v.advance(1);
        let plmn_id = PlmnId::decode(v)?;
        let amf_region_id = v.get_u8();
        let amf_id = v.get_u16();
        let tmsi = v.get_u32();
        Ok(Self {
            plmn_id,
            amf_region_id,
            amf_set_id: amf_id >> 6,
            amf_pointer: (amf_id & 0x3F) as u8,
            tmsi,
        })
    }

    pub fn s_tmsi(&self) -> FiveGSTmsi {
        FiveGSTmsi { amf_set_id: self.amf_set_id, amf_pointer: self.amf_pointer, tmsi: self.tmsi }
    }
}

/// 5G-S-TMSI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FiveGSTmsi {
    pub amf_set_id: u16,
    pub amf_pointer: u8,
    pub tmsi: u32,
}

impl FiveGSTmsi {
    fn encode_value(&self, buf: &mut BytesMut) {
        buf.put_u8(0xF0 | IdentityType::FiveGSTmsi as u8);
        buf.put_u16(((self.amf_set_id & 0x3FF) << 6) | (self.amf_pointer as u16 & 0x3F));
        buf.put_u32(self.tmsi);
    }

    fn decode_value(v: &mut Bytes) -> NasResult<Self> {
        if v.remaining() != 7 {
            return Err(NasError::InvalidIeLength { ie: "5G-S-TMSI", len: v.remaining() });
        }
        v.advance(1);
        let amf_id = v.get_u16();
        Ok(Self {
            amf_set_id: amf_id >> 6,
            amf_pointer: (amf_id & 0x3F) as u8,
            tmsi: v.get_u32(),
        })
    }
}

/// 5GS registration result (TS 24.501 Section 9.11.3.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistrationResult {
    pub sms_allowed: bool,
    /// 1 = 3GPP access
    pub value: u8,
}

impl RegistrationResult {
    pub const THREE_GPP_ACCESS: u8 = 1;

    pub fn three_gpp() -> Self {
        Self { sms_allowed: false, value: Self::THREE_GPP_ACCESS }
    }

    /// Encode as LV
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(1);
        buf.put_u8(if self.sms_allowed { 0x08 } else { 0 } | (self.value & 0x07));
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        let v = get_lv(buf)?;
        if v.len() != 1 {
            return Err(NasError::InvalidIeLength { ie: "5GS registration result", len: v.len() });
        }
        Ok(Self { sms_allowed: v[0] & 0x08 != 0, value: v[0] & 0x07 })
    }
}

/// De-registration type (TS 24.501 Section 9.11.3.20)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeRegistrationType {
    pub switch_off: bool,
    pub re_registration_required: bool,
    /// 1 = 3GPP access
    pub access_type: u8,
}

impl DeRegistrationType {
    pub fn encode(&self) -> u8 {
        let switch_off = if self.switch_off { 0x08 } else { 0 };
        let re_reg = if self.re_registration_required { 0x04 } else { 0 };
        switch_off | re_reg | (self.access_type & 0x03)
    }

    pub fn decode(nibble: u8) -> Self {
        Self {
            switch_off: nibble & 0x08 != 0,
            re_registration_required: nibble & 0x04 != 0,
            access_type: nibble & 0x03,
        }
    }
}

/// 5GS tracking area identity list (TS 24.501 Section 9.11.3.9)
///
/// Held as a flat list; encoding picks one partial list when every TAI
/// shares a PLMN and a mixed-PLMN partial list otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaiList(pub Vec<Tai>);

impl TaiList {
    pub const MAX_ELEMENTS: usize = 16;

    /// Encode as LV
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        let tais = &self.0;
        if tais.is_empty() || tais.len() > Self::MAX_ELEMENTS {
            return Err(NasError::InvalidIeLength { ie: "TAI list", len: tais.len() });
        }
        let mut v = BytesMut::new();
        let count = (tais.len() - 1) as u8;
        if tais.iter().all(|t| t.plmn_id == tais[0].plmn_id) {
            v.put_u8(count);
            tais[0].plmn_id.encode(&mut v);
            for t in tais {
                v.put_slice(&t.tac);
            }
        } else {
            v.put_u8(0x40 | count);
            for t in tais {
                t.encode(&mut v);
            }
        }
        put_lv(buf, "TAI list", &v)
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        let mut v = get_lv(buf)?;
        let mut tais = Vec::new();
        while v.has_remaining() {
            let head = v.get_u8();
            let count = (head & 0x1F) as usize + 1;
            match (head >> 5) & 0x03 {
                0 => {
                    let plmn_id = PlmnId::decode(&mut v)?;
                    for _ in 0..count {
                        need(&v, 3)?;
                        let mut tac = [0u8; 3];
                        v.copy_to_slice(&mut tac);
                        tais.push(Tai::new(plmn_id, tac));
                    }
                }
                1 => {
                    let first = Tai::decode(&mut v)?;
                    let base = u32::from_be_bytes([0, first.tac[0], first.tac[1], first.tac[2]]);
                    for i in 0..count as u32 {
                        let t = base.wrapping_add(i).to_be_bytes();
                        tais.push(Tai::new(first.plmn_id, [t[1], t[2], t[3]]));
                    }
                }
                2 => {
                    for _ in 0..count {
                        tais.push(Tai::decode(&mut v)?);
                    }
                }
                ty => return Err(NasError::InvalidValue { field: "TAI list type", value: ty as u32 }),
            }
        }
        Ok(Self(tais))
    }
}

/// NSSAI (TS 24.501 Section 9.11.3.37)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Nssai(pub Vec<SNssai>);

impl Nssai {
    /// Encode as LV
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        let mut v = BytesMut::new();
        for s in &self.0 {
            s.encode(&mut v);
        }
        put_lv(buf, "NSSAI", &v)
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        let mut v = get_lv(buf)?;
        let mut list = Vec::new();
        while v.has_remaining() {
            list.push(SNssai::decode(&mut v)?);
        }
        Ok(Self(list))
    }
}

/// Payload container type (TS 24.501 Section 9.11.3.40)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PayloadContainerType {
    #[default]
    N1SmInformation = 1,
    SmsContainer = 2,
    LppMessage = 3,
    SorTransparentContainer = 4,
    UePolicyContainer = 5,
}

impl TryFrom<u8> for PayloadContainerType {
    type Error = NasError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::N1SmInformation),
            2 => Ok(Self::SmsContainer),
            3 => Ok(Self::LppMessage),
            4 => Ok(Self::SorTransparentContainer),
            5 => Ok(Self::UePolicyContainer),
            _ => Err(NasError::InvalidValue { field: "payload container type", value: value as u32 }),
        }
    }
}

/// Request type (TS 24.501 Section 9.11.3.47)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RequestType {
    #[default]
    InitialRequest = 1,
    ExistingPduSession = 2,
    InitialEmergencyRequest = 3,
    ExistingEmergencyPduSession = 4,
    ModificationRequest = 5,
}

impl TryFrom<u8> for RequestType {
    type Error = NasError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::InitialRequest),
            2 => Ok(Self::ExistingPduSession),
            3 => Ok(Self::InitialEmergencyRequest),
            4 => Ok(Self::ExistingEmergencyPduSession),
            5 => Ok(Self::ModificationRequest),
            _ => Err(NasError::InvalidValue { field: "request type", value: value as u32 }),
        }
    }
}

/// Service type (TS 24.501 Section 9.11.3.50)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ServiceType {
    #[default]
    Signalling = 0,
    Data = 1,
    MobileTerminatedServices = 2,
    EmergencyServices = 3,
    EmergencyServicesFallback = 4,
    HighPriorityAccess = 5,
    ElevatedSignalling = 6,
    /// Spare values, treated as Data by the network
    Unused = 7,
}

impl ServiceType {
    pub fn decode(nibble: u8) -> Self {
        match nibble & 0x0F {
            0 => Self::Signalling,
            1 => Self::Data,
            2 => Self::MobileTerminatedServices,
            3 => Self::EmergencyServices,
            4 => Self::EmergencyServicesFallback,
            5 => Self::HighPriorityAccess,
            6 => Self::ElevatedSignalling,
            _ => Self::Unused,
        }
    }
}

/// PDU session type (TS 24.501 Section 9.11.4.11)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PduSessionType {
    #[default]
    Ipv4 = 1,
    Ipv6 = 2,
    Ipv4v6 = 3,
    Unstructured = 4,
    Ethernet = 5,
}

impl TryFrom<u8> for PduSessionType {
    type Error = NasError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Ipv4),
            2 => Ok(Self::Ipv6),
            3 => Ok(Self::Ipv4v6),
            4 => Ok(Self::Unstructured),
            5 => Ok(Self::Ethernet),
            _ => Err(NasError::InvalidValue { field: "PDU session type", value: value as u32 }),
        }
    }
}

/// PDU address (TS 24.501 Section 9.11.4.10)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduAddress {
    Ipv4(std::net::Ipv4Addr),
    /// IPv6 interface identifier
    Ipv6([u8; 8]),
}

impl PduAddress {
    /// Encode as LV
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::Ipv4(addr) => {
                buf.put_u8(5);
                buf.put_u8(PduSessionType::Ipv4 as u8);
                buf.put_slice(&addr.octets());
            }
            Self::Ipv6(iid) => {
                buf.put_u8(9);
                buf.put_u8(PduSessionType::Ipv6 as u8);
                buf.put_slice(iid);
            }
        }
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        let mut v = get_lv(buf)?;
        need(&v, 1)?;
        match v.get_u8() & 0x07 {
            1 if v.remaining() == 4 => {
                let o = [v[0], v[1], v[2], v[3]];
                Ok(Self::Ipv4(o.into()))
            }
            2 if v.remaining() == 8 => {
                let mut iid = [0u8; 8];
                v.copy_to_slice(&mut iid);
                Ok(Self::Ipv6(iid))
            }
            _ => Err(NasError::InvalidIeLength { ie: "PDU address", len: v.remaining() + 1 }),
        }
    }
}

/// Session-AMBR (TS 24.501 Section 9.11.4.14)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionAmbr {
    pub dl_unit: u8,
    pub dl_value: u16,
    pub ul_unit: u8,
    pub ul_value: u16,
}

impl SessionAmbr {
    /// Unit 1 is 1 Kbps; each further unit multiplies by 4
    fn to_unit(kbps: u64) -> (u8, u16) {
        let mut unit = 1u8;
        let mut step = 1u64;
        while kbps.div_ceil(step) > u16::MAX as u64 && unit < 25 {
            unit += 1;
            step *= 4;
        }
        (unit, kbps.div_ceil(step).min(u16::MAX as u64) as u16)
    }

    pub fn from_bps(dl_bps: u64, ul_bps: u64) -> Self {
        let (dl_unit, dl_value) = Self::to_unit(dl_bps.div_ceil(1000));
        let (ul_unit, ul_value) = Self::to_unit(ul_bps.div_ceil(1000));
        Self { dl_unit, dl_value, ul_unit, ul_value }
    }

    fn kbps(unit: u8, value: u16) -> u64 {
        4u64.pow(unit.saturating_sub(1) as u32) * value as u64
    }

    pub fn dl_kbps(&self) -> u64 {
        Self::kbps(self.dl_unit, self.dl_value)
    }

    pub fn ul_kbps(&self) -> u64 {
        Self::kbps(self.ul_unit, self.ul_value)
    }

    /// Encode as LV
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(6);
        buf.put_u8(self.dl_unit);
        buf.put_u16(self.dl_value);
        buf.put_u8(self.ul_unit);
        buf.put_u16(self.ul_value);
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        let mut v = get_lv(buf)?;
        if v.len() != 6 {
            return Err(NasError::InvalidIeLength { ie: "Session-AMBR", len: v.len() });
        }
        Ok(Self {
            dl_unit: v.get_u8(),
            dl_value: v.get_u16(),
            ul_unit: v.get_u8(),
            ul_value: v.get_u16(),
        })
    }
}

/// One packet filter inside a QoS rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketFilter {
    /// 1 downlink, 2 uplink, 3 bidirectional
    pub direction: u8,
    pub identifier: u8,
    pub contents: Vec<u8>,
}

impl PacketFilter {
    /// Bidirectional match-all filter
    pub fn match_all(identifier: u8) -> Self {
        Self { direction: 3, identifier, contents: vec![0x01] }
    }
}

/// QoS rule (TS 24.501 Section 9.11.4.13), create-new operation only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QosRule {
    pub identifier: u8,
    pub default_rule: bool,
    pub packet_filters: Vec<PacketFilter>,
    pub precedence: u8,
    pub qfi: u8,
}

impl QosRule {
    const CREATE_NEW: u8 = 1;

    fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        let mut body = BytesMut::new();
        let dqr = if self.default_rule { 0x10 } else { 0 };
        body.put_u8((Self::CREATE_NEW << 5) | dqr | (self.packet_filters.len() as u8 & 0x0F));
        for pf in &self.packet_filters {
            body.put_u8(((pf.direction & 0x03) << 4) | (pf.identifier & 0x0F));
            put_lv(&mut body, "packet filter", &pf.contents)?;
        }
        body.put_u8(self.precedence);
        body.put_u8(self.qfi & 0x3F);
        buf.put_u8(self.identifier);
        put_lve(buf, "QoS rule", &body)
    }

    fn decode(buf: &mut Bytes) -> NasResult<Self> {
        need(buf, 1)?;
        let identifier = buf.get_u8();
        let mut body = get_lve(buf)?;
        need(&body, 1)?;
        let head = body.get_u8();
        let op = head >> 5;
        if op != Self::CREATE_NEW {
            return Err(NasError::InvalidValue { field: "QoS rule operation code", value: op as u32 });
        }
        let mut packet_filters = Vec::new();
        for _ in 0..(head & 0x0F) {
            need(&body, 1)?;
            let b = body.get_u8();
            let contents = get_lv(&mut body)?.to_vec();
            packet_filters.push(PacketFilter { direction: (b >> 4) & 0x03, identifier: b & 0x0F, contents });
        }
        need(&body, 2)?;
        let precedence = body.get_u8();
        let qfi = body.get_u8() & 0x3F;
        Ok(Self { identifier, default_rule: head & 0x10 != 0, packet_filters, precedence, qfi })
    }
}

/// QoS rules IE contents
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QosRules(pub Vec<QosRule>);

impl QosRules {
    /// Encode as LV-E
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        let mut v = BytesMut::new();
        for rule in &self.0 {
            rule.encode(&mut v)?;
        }
        put_lve(buf, "QoS rules", &v)
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        let mut v = get_lve(buf)?;
        let mut rules = Vec::new();
        while v.has_remaining() {
            rules.push(QosRule::decode(&mut v)?);
        }
        Ok(Self(rules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plmn() -> PlmnId {
        PlmnId::from_digits("001", "01").unwrap()
    }

    #[test]
    fn test_suci_null_scheme_supi() {
        let suci = Suci::from_imsi(plmn(), "0000000001").unwrap();
        let mut buf = BytesMut::new();
        MobileIdentity::Suci(suci.clone()).encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..],
            &[0x00, 0x0d, 0x01, 0x00, 0xf1, 0x10, 0xf0, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10]
        );
        let decoded = MobileIdentity::decode(&mut buf.freeze()).unwrap();
        match decoded {
            MobileIdentity::Suci(s) => assert_eq!(s.supi().as_deref(), Some("imsi-001010000000001")),
            other => panic!("unexpected identity {:?}", other),
        }
    }

    #[test]
    fn test_suci_odd_msin_filler() {
        let suci = Suci::from_imsi(plmn(), "123456789").unwrap();
        assert_eq!(suci.scheme_output.last(), Some(&0xF9));
        assert_eq!(suci.msin().as_deref(), Some("123456789"));
    }

    #[test]
    fn test_protected_suci_has_no_supi() {
        let mut suci = Suci::from_imsi(plmn(), "0000000001").unwrap();
        suci.protection_scheme_id = 1;
        assert_eq!(suci.supi(), None);
    }

    #[test]
    fn test_guti_layout() {
        let guti = FiveGGuti { plmn_id: plmn(), amf_region_id: 2, amf_set_id: 1, amf_pointer: 0, tmsi: 0xdeadbeef };
        let mut buf = BytesMut::new();
        MobileIdentity::FiveGGuti(guti).encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x00, 0x0b, 0xf2, 0x00, 0xf1, 0x10, 0x02, 0x00, 0x40, 0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(MobileIdentity::decode(&mut buf.freeze()).unwrap(), MobileIdentity::FiveGGuti(guti));
    }

    #[test]
    fn test_imeisv_digits() {
        let id = MobileIdentity::Imeisv("4370816125816151".into());
        let mut buf = BytesMut::new();
        id.encode(&mut buf).unwrap();
        assert_eq!(MobileIdentity::decode(&mut buf.freeze()).unwrap(), id);

        let imei = MobileIdentity::Imei("490154203237518".into());
        let mut buf = BytesMut::new();
        imei.encode(&mut buf).unwrap();
        assert_eq!(MobileIdentity::decode(&mut buf.freeze()).unwrap(), imei);
    }

    #[test]
    fn test_tai_list_single_plmn() {
        let list = TaiList(vec![Tai::new(plmn(), [0, 0, 1]), Tai::new(plmn(), [0, 0, 2])]);
        let mut buf = BytesMut::new();
        list.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x0a, 0x01, 0x00, 0xf1, 0x10, 0x00, 0x00, 0x01, 0x00, 0x00, 0x02]);
        assert_eq!(TaiList::decode(&mut buf.freeze()).unwrap(), list);
    }

    #[test]
    fn test_tai_list_mixed_plmn() {
        let other = PlmnId::from_digits("208", "93").unwrap();
        let list = TaiList(vec![Tai::new(plmn(), [0, 0, 1]), Tai::new(other, [0, 0, 7])]);
        let mut buf = BytesMut::new();
        list.encode(&mut buf).unwrap();
        assert_eq!(buf[1], 0x41);
        assert_eq!(TaiList::decode(&mut buf.freeze()).unwrap(), list);
    }

    #[test]
    fn test_tai_list_consecutive_tacs() {
        let mut buf = Bytes::from_static(&[0x07, 0x22, 0x00, 0xf1, 0x10, 0x00, 0x00, 0x05]);
        let list = TaiList::decode(&mut buf).unwrap();
        assert_eq!(list.0.len(), 3);
        assert_eq!(list.0[2].tac, [0, 0, 7]);
    }

    #[test]
    fn test_empty_tai_list_rejected() {
        let mut buf = BytesMut::new();
        assert!(TaiList::default().encode(&mut buf).is_err());
    }

    #[test]
    fn test_session_ambr_units() {
        let ambr = SessionAmbr::from_bps(1_000_000_000, 100_000_000);
        assert!(ambr.dl_kbps() >= 1_000_000);
        assert_eq!(ambr.ul_unit, 2);
        assert_eq!(ambr.ul_kbps(), 100_000);
        let small = SessionAmbr::from_bps(64_000, 64_000);
        assert_eq!((small.dl_unit, small.dl_value), (1, 64));
    }

    #[test]
    fn test_default_qos_rule() {
        let rules = QosRules(vec![QosRule {
            identifier: 1,
            default_rule: true,
            packet_filters: vec![PacketFilter::match_all(1)],
            precedence: 255,
            qfi: 1,
        }]);
        let mut buf = BytesMut::new();
        rules.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x00, 0x09, 0x01, 0x00, 0x06, 0x31, 0x31, 0x01, 0x01, 0xff, 0x01]);
        assert_eq!(QosRules::decode(&mut buf.freeze()).unwrap(), rules);
    }
}
