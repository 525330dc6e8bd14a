//! Common NAS value types
//!
//! Based on 3GPP TS 24.501 Section 9.11 and TS 24.008 Section 10.5

use bytes::{Buf, BufMut, Bytes, BytesMut};
use crate::error::{need, NasError, NasResult};
use super::ie::{get_lv, put_lv};

/// Extended protocol discriminator values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProtocolDiscriminator {
    /// 5GS Mobility Management (5GMM)
    FiveGsMobilityManagement = 0x7e,
    /// 5GS Session Management (5GSM)
    FiveGsSessionManagement = 0x2e,
}

impl TryFrom<u8> for ProtocolDiscriminator {
    type Error = NasError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x7e => Ok(Self::FiveGsMobilityManagement),
            0x2e => Ok(Self::FiveGsSessionManagement),
            _ => Err(NasError::InvalidProtocolDiscriminator(value)),
        }
    }
}

/// Security header type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SecurityHeaderType {
    /// Plain NAS message, not security protected
    #[default]
    PlainNas = 0,
    /// Integrity protected
    IntegrityProtected = 1,
    /// Integrity protected and ciphered
    IntegrityProtectedAndCiphered = 2,
    /// Integrity protected with new 5G NAS security context
    IntegrityProtectedWithNewContext = 3,
    /// Integrity protected and ciphered with new 5G NAS security context
    IntegrityProtectedAndCipheredWithNewContext = 4,
}

impl SecurityHeaderType {
    pub fn is_ciphered(&self) -> bool {
        matches!(self, Self::IntegrityProtectedAndCiphered | Self::IntegrityProtectedAndCipheredWithNewContext)
    }
}

impl TryFrom<u8> for SecurityHeaderType {
    type Error = NasError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::PlainNas),
            1 => Ok(Self::IntegrityProtected),
            2 => Ok(Self::IntegrityProtectedAndCiphered),
            3 => Ok(Self::IntegrityProtectedWithNewContext),
            4 => Ok(Self::IntegrityProtectedAndCipheredWithNewContext),
            _ => Err(NasError::InvalidSecurityHeaderType(value)),
        }
    }
}

/// PLMN ID (MCC + MNC), BCD encoded on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PlmnId {
    /// Mobile Country Code (3 digits)
    pub mcc: [u8; 3],
    /// Mobile Network Code (2 or 3 digits)
    pub mnc: [u8; 3],
    /// MNC length (2 or 3)
    pub mnc_len: u8,
}

impl PlmnId {
    pub fn new(mcc: [u8; 3], mnc: [u8; 3], mnc_len: u8) -> Self {
        Self { mcc, mnc, mnc_len }
    }

    /// Build from decimal strings such as `"001"` and `"01"`
    pub fn from_digits(mcc: &str, mnc: &str) -> NasResult<Self> {
        fn digits<const N: usize>(field: &'static str, s: &str, out: &mut [u8; N]) -> NasResult<()> {
            for (i, c) in s.chars().enumerate() {
                let d = c.to_digit(10).ok_or(NasError::InvalidValue { field, value: c as u32 })?;
                out[i] = d as u8;
            }
            Ok(())
        }
        if mcc.len() != 3 {
            return Err(NasError::InvalidValue { field: "mcc length", value: mcc.len() as u32 });
        }
        if mnc.len() != 2 && mnc.len() != 3 {
            return Err(NasError::InvalidValue { field: "mnc length", value: mnc.len() as u32 });
        }
        let mut plmn = Self { mnc_len: mnc.len() as u8, ..Default::default() };
        digits("mcc", mcc, &mut plmn.mcc)?;
        digits("mnc", mnc, &mut plmn.mnc)?;
        Ok(plmn)
    }

    /// Three-octet wire form shared with NGAP
    pub fn to_bytes(&self) -> [u8; 3] {
        let mnc3 = if self.mnc_len == 3 { self.mnc[2] } else { 0x0F };
        [
            (self.mcc[1] << 4) | self.mcc[0],
            (mnc3 << 4) | self.mcc[2],
            (self.mnc[1] << 4) | self.mnc[0],
        ]
    }

    pub fn from_bytes(b: [u8; 3]) -> Self {
        let mnc3 = b[1] >> 4;
        let (mnc, mnc_len) = if mnc3 == 0x0F {
            ([b[2] & 0x0F, b[2] >> 4, 0], 2)
        } else {
            ([b[2] & 0x0F, b[2] >> 4, mnc3], 3)
        };
        Self {
            mcc: [b[0] & 0x0F, b[0] >> 4, b[1] & 0x0F],
            mnc,
            mnc_len,
        }
    }

    pub fn mcc_string(&self) -> String {
        self.mcc.iter().map(|d| char::from(b'0' + d)).collect()
    }

    pub fn mnc_string(&self) -> String {
        self.mnc[..self.mnc_len as usize].iter().map(|d| char::from(b'0' + d)).collect()
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.to_bytes());
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        need(buf, 3)?;
        let mut b = [0u8; 3];
        buf.copy_to_slice(&mut b);
        Ok(Self::from_bytes(b))
    }
}

impl std::fmt::Display for PlmnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.mcc_string(), self.mnc_string())
    }
}

/// Tracking area identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tai {
    pub plmn_id: PlmnId,
    /// 24-bit tracking area code
    pub tac: [u8; 3],
}

impl Tai {
    pub fn new(plmn_id: PlmnId, tac: [u8; 3]) -> Self {
        Self { plmn_id, tac }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        self.plmn_id.encode(buf);
        buf.put_slice(&self.tac);
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        let plmn_id = PlmnId::decode(buf)?;
        need(buf, 3)?;
        let mut tac = [0u8; 3];
        buf.copy_to_slice(&mut tac);
        Ok(Self { plmn_id, tac })
    }
}

/// S-NSSAI (TS 24.501 Section 9.11.2.8), without the LV length octet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SNssai {
    /// Slice/Service Type
    pub sst: u8,
    /// Slice Differentiator
    pub sd: Option<[u8; 3]>,
}

impl SNssai {
    pub fn new(sst: u8) -> Self {
        Self { sst, sd: None }
    }

    pub fn with_sd(sst: u8, sd: [u8; 3]) -> Self {
        Self { sst, sd: Some(sd) }
    }

    /// Encode as LV
    pub fn encode(&self, buf: &mut BytesMut) {
        match self.sd {
            Some(sd) => {
                buf.put_u8(4);
                buf.put_u8(self.sst);
                buf.put_slice(&sd);
            }
            None => {
                buf.put_u8(1);
                buf.put_u8(self.sst);
            }
        }
    }

    /// Decode an LV S-NSSAI; mapped HPLMN values are read and dropped
    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        let mut v = get_lv(buf)?;
        let sd_present = match v.len() {
            1 | 2 => false,
            4 | 5 | 8 => true,
            len => return Err(NasError::InvalidIeLength { ie: "S-NSSAI", len }),
        };
        let sst = v.get_u8();
        let sd = if sd_present {
            let mut sd = [0u8; 3];
            v.copy_to_slice(&mut sd);
            Some(sd)
        } else {
            None
        };
        Ok(Self { sst, sd })
    }
}

/// GPRS timer 3 (TS 24.008 Section 10.5.7.4a), value part only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GprsTimer3 {
    /// Timer unit (3 bits)
    pub unit: u8,
    /// Timer value (5 bits)
    pub value: u8,
}

impl GprsTimer3 {
    pub const UNIT_10_MINUTES: u8 = 0;
    pub const UNIT_1_HOUR: u8 = 1;
    pub const UNIT_2_SECONDS: u8 = 3;
    pub const UNIT_30_SECONDS: u8 = 4;
    pub const UNIT_1_MINUTE: u8 = 5;
    pub const UNIT_DEACTIVATED: u8 = 7;

    pub fn new(unit: u8, value: u8) -> Self {
        Self { unit: unit & 0x07, value: value & 0x1F }
    }

    /// Pick the finest unit that represents `secs` exactly, else round up
    pub fn from_seconds(secs: u32) -> Self {
        let candidates = [
            (Self::UNIT_2_SECONDS, 2),
            (Self::UNIT_30_SECONDS, 30),
            (Self::UNIT_1_MINUTE, 60),
            (Self::UNIT_10_MINUTES, 600),
            (Self::UNIT_1_HOUR, 3600),
        ];
        for (unit, step) in candidates {
            if secs / step <= 31 && secs % step == 0 {
                return Self::new(unit, (secs / step) as u8);
            }
        }
        for (unit, step) in candidates {
            let rounded = secs.div_ceil(step);
            if rounded <= 31 {
                return Self::new(unit, rounded as u8);
            }
        }
        Self::new(Self::UNIT_1_HOUR, 31)
    }

    pub fn to_seconds(&self) -> Option<u32> {
        let step = match self.unit {
            0 => 600,
            1 => 3600,
            2 => 36000,
            3 => 2,
            4 => 30,
            5 => 60,
            6 => 1_152_000,
            _ => return None,
        };
        Some(step * self.value as u32)
    }

    /// Encode as LV
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(1);
        buf.put_u8((self.unit << 5) | (self.value & 0x1F));
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        let v = get_lv(buf)?;
        if v.len() != 1 {
            return Err(NasError::InvalidIeLength { ie: "GPRS timer 3", len: v.len() });
        }
        Ok(Self::new(v[0] >> 5, v[0]))
    }
}

/// Data network name, label encoded on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Dnn(pub String);

impl Dnn {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encode as LV
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        let mut labels = BytesMut::new();
        for label in self.0.split('.').filter(|l| !l.is_empty()) {
            put_lv(&mut labels, "DNN label", label.as_bytes())?;
        }
        put_lv(buf, "DNN", &labels)
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        let mut v = get_lv(buf)?;
        let mut parts = Vec::new();
        while v.has_remaining() {
            let label = get_lv(&mut v)?;
            parts.push(String::from_utf8_lossy(&label).into_owned());
        }
        Ok(Self(parts.join(".")))
    }
}

/// NAS key set identifier (half octet)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySetIdentifier {
    /// Type of security context flag (0 = native)
    pub tsc: u8,
    /// Key set identifier value (0-6, 7 = no key available)
    pub value: u8,
}

impl Default for KeySetIdentifier {
    fn default() -> Self {
        Self::no_key()
    }
}

impl KeySetIdentifier {
    pub const NO_KEY_AVAILABLE: u8 = 7;

    pub fn new(tsc: u8, value: u8) -> Self {
        Self { tsc: tsc & 0x01, value: value & 0x07 }
    }

    pub fn no_key() -> Self {
        Self::new(0, Self::NO_KEY_AVAILABLE)
    }

    pub fn is_no_key(&self) -> bool {
        self.value == Self::NO_KEY_AVAILABLE
    }

    pub fn encode(&self) -> u8 {
        (self.tsc << 3) | self.value
    }

    pub fn decode(nibble: u8) -> Self {
        Self::new((nibble >> 3) & 0x01, nibble & 0x07)
    }
}

/// NAS security algorithms (TS 24.501 Section 9.11.3.34)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SecurityAlgorithms {
    /// Type of ciphering algorithm (5G-EA)
    pub ciphering: u8,
    /// Type of integrity protection algorithm (5G-IA)
    pub integrity: u8,
}

impl SecurityAlgorithms {
    pub const NEA0: u8 = 0;
    pub const NEA1: u8 = 1;
    pub const NEA2: u8 = 2;
    pub const NEA3: u8 = 3;
    pub const NIA0: u8 = 0;
    pub const NIA1: u8 = 1;
    pub const NIA2: u8 = 2;
    pub const NIA3: u8 = 3;

    pub fn new(ciphering: u8, integrity: u8) -> Self {
        Self { ciphering: ciphering & 0x0F, integrity: integrity & 0x0F }
    }

    pub fn encode(&self) -> u8 {
        (self.ciphering << 4) | self.integrity
    }

    pub fn decode(byte: u8) -> Self {
        Self::new(byte >> 4, byte & 0x0F)
    }
}

/// UE security capability (TS 24.501 Section 9.11.3.54)
///
/// Bit 8 of each octet is algorithm 0, bit 7 algorithm 1 and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UeSecurityCapability {
    /// 5G-EA algorithms
    pub ea: u8,
    /// 5G-IA algorithms
    pub ia: u8,
    /// EPS EEA algorithms
    pub eea: Option<u8>,
    /// EPS EIA algorithms
    pub eia: Option<u8>,
}

impl UeSecurityCapability {
    pub fn new(ea: u8, ia: u8) -> Self {
        Self { ea, ia, eea: None, eia: None }
    }

    pub fn supports_ea(&self, alg: u8) -> bool {
        alg < 8 && self.ea & (0x80 >> alg) != 0
    }

    pub fn supports_ia(&self, alg: u8) -> bool {
        alg < 8 && self.ia & (0x80 >> alg) != 0
    }

    /// Encode as LV
    pub fn encode(&self, buf: &mut BytesMut) {
        match (self.eea, self.eia) {
            (Some(eea), Some(eia)) => {
                buf.put_u8(4);
                buf.put_slice(&[self.ea, self.ia, eea, eia]);
            }
            _ => {
                buf.put_u8(2);
                buf.put_slice(&[self.ea, self.ia]);
            }
        }
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        let v = get_lv(buf)?;
        if v.len() < 2 || v.len() > 8 {
            return Err(NasError::InvalidIeLength { ie: "UE security capability", len: v.len() });
        }
        let mut cap = Self::new(v[0], v[1]);
        if v.len() >= 4 {
            cap.eea = Some(v[2]);
            cap.eia = Some(v[3]);
        }
        Ok(cap)
    }
}

/// ABBA (TS 24.501 Section 9.11.3.10)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abba(pub Vec<u8>);

impl Default for Abba {
    fn default() -> Self {
        Self(vec![0x00, 0x00])
    }
}

impl Abba {
    /// Encode as LV
    pub fn encode(&self, buf: &mut BytesMut) -> NasResult<()> {
        put_lv(buf, "ABBA", &self.0)
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        let v = get_lv(buf)?;
        if v.len() < 2 {
            return Err(NasError::InvalidIeLength { ie: "ABBA", len: v.len() });
        }
        Ok(Self(v.to_vec()))
    }
}
