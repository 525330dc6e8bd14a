//! NGAP Information Elements
//!
//! Protocol IE containers and the primitive IEs from NGAP-IEs (3GPP TS 38.413)

use crate::per::{AperDecode, AperDecoder, AperEncode, AperEncoder, Constraint, PerResult};
use super::types::{Criticality, ProtocolIeId};

/// ProtocolIE-Field - Single IE with ID, criticality, and value
/// ASN.1: ProtocolIE-Field ::= SEQUENCE { id, criticality, value }
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolIeField {
    pub id: ProtocolIeId,
    pub criticality: Criticality,
    /// Raw APER-encoded value (open type contents)
    pub value: Vec<u8>,
}

impl AperEncode for ProtocolIeField {
    fn encode_aper(&self, encoder: &mut AperEncoder) -> PerResult<()> {
        self.id.encode_aper(encoder)?;
        self.criticality.encode_aper(encoder)?;
        encoder.encode_open_type(&self.value)
    }
}

impl AperDecode for ProtocolIeField {
    fn decode_aper(decoder: &mut AperDecoder) -> PerResult<Self> {
        let id = ProtocolIeId::decode_aper(decoder)?;
        let criticality = Criticality::decode_aper(decoder)?;
        let value = decoder.decode_open_type()?;

        Ok(ProtocolIeField {
            id,
            criticality,
            value,
        })
    }
}

/// ProtocolIE-Container - Sequence of IEs
/// ASN.1: ProtocolIE-Container ::= SEQUENCE (SIZE (0..maxProtocolIEs)) OF ProtocolIE-Field
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProtocolIeContainer {
    pub ies: Vec<ProtocolIeField>,
}

impl ProtocolIeContainer {
    pub const MAX_PROTOCOL_IES: usize = 65535;

    pub fn new() -> Self {
        Self { ies: Vec::new() }
    }

    pub fn push(&mut self, ie: ProtocolIeField) {
        self.ies.push(ie);
    }

    pub fn len(&self) -> usize {
        self.ies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ies.is_empty()
    }

    /// Find an IE by ID
    pub fn find(&self, id: ProtocolIeId) -> Option<&ProtocolIeField> {
        self.ies.iter().find(|ie| ie.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProtocolIeField> {
        self.ies.iter()
    }
}

impl AperEncode for ProtocolIeContainer {
    fn encode_aper(&self, encoder: &mut AperEncoder) -> PerResult<()> {
        encoder.encode_constrained_length(self.ies.len(), 0, Self::MAX_PROTOCOL_IES)?;
        for ie in &self.ies {
            ie.encode_aper(encoder)?;
        }
        Ok(())
    }
}

impl AperDecode for ProtocolIeContainer {
    fn decode_aper(decoder: &mut AperDecoder) -> PerResult<Self> {
        let count = decoder.decode_constrained_length(0, Self::MAX_PROTOCOL_IES)?;

        // Each field takes at least four octets; refuse counts the buffer cannot hold
        let mut ies = Vec::with_capacity(count.min(decoder.remaining_bits() / 32));
        for _ in 0..count {
            ies.push(ProtocolIeField::decode_aper(decoder)?);
        }

        Ok(ProtocolIeContainer { ies })
    }
}

/// AMF-UE-NGAP-ID - Unique identifier for UE in AMF
/// ASN.1: AMF-UE-NGAP-ID ::= INTEGER (0..1099511627775)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AmfUeNgapId(pub u64);

impl AmfUeNgapId {
    pub const MAX: u64 = 1_099_511_627_775;
    pub const CONSTRAINT: Constraint = Constraint::new(0, Self::MAX as i64);
}

impl AperEncode for AmfUeNgapId {
    fn encode_aper(&self, encoder: &mut AperEncoder) -> PerResult<()> {
        encoder.encode_constrained_whole_number(self.0 as i64, &Self::CONSTRAINT)
    }
}

impl AperDecode for AmfUeNgapId {
    fn decode_aper(decoder: &mut AperDecoder) -> PerResult<Self> {
        let value = decoder.decode_constrained_whole_number(&Self::CONSTRAINT)?;
        Ok(AmfUeNgapId(value as u64))
    }
}

/// RAN-UE-NGAP-ID - Unique identifier for UE in RAN
/// ASN.1: RAN-UE-NGAP-ID ::= INTEGER (0..4294967295)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RanUeNgapId(pub u32);

impl RanUeNgapId {
    pub const CONSTRAINT: Constraint = Constraint::new(0, 4_294_967_295);
}

impl AperEncode for RanUeNgapId {
    fn encode_aper(&self, encoder: &mut AperEncoder) -> PerResult<()> {
        encoder.encode_constrained_whole_number(self.0 as i64, &Self::CONSTRAINT)
    }
}

impl AperDecode for RanUeNgapId {
    fn decode_aper(decoder: &mut AperDecoder) -> PerResult<Self> {
        let value = decoder.decode_constrained_whole_number(&Self::CONSTRAINT)?;
        Ok(RanUeNgapId(value as u32))
    }
}

aper_enumerated! {
    /// TimeToWait - Time to wait before retrying
    /// ASN.1: TimeToWait ::= ENUMERATED { v1s, v2s, v5s, v10s, v20s, v60s, ... }
    pub enum TimeToWait (Constraint::extensible(0, 5)) {
        V1s = 0,
        V2s = 1,
        V5s = 2,
        V10s = 3,
        V20s = 4,
        V60s = 5,
    }
}

/// RelativeAMFCapacity - Relative capacity of AMF
/// ASN.1: RelativeAMFCapacity ::= INTEGER (0..255)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelativeAmfCapacity(pub u8);

impl RelativeAmfCapacity {
    pub const CONSTRAINT: Constraint = Constraint::new(0, 255);
}

impl AperEncode for RelativeAmfCapacity {
    fn encode_aper(&self, encoder: &mut AperEncoder) -> PerResult<()> {
        encoder.encode_constrained_whole_number(self.0 as i64, &Self::CONSTRAINT)
    }
}

impl AperDecode for RelativeAmfCapacity {
    fn decode_aper(decoder: &mut AperDecoder) -> PerResult<Self> {
        let value = decoder.decode_constrained_whole_number(&Self::CONSTRAINT)?;
        Ok(RelativeAmfCapacity(value as u8))
    }
}

/// NAS-PDU - NAS Protocol Data Unit (opaque octet string)
/// ASN.1: NAS-PDU ::= OCTET STRING
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NasPdu(pub Vec<u8>);

impl AperEncode for NasPdu {
    fn encode_aper(&self, encoder: &mut AperEncoder) -> PerResult<()> {
        encoder.encode_octet_string(&self.0, None, None)
    }
}

impl AperDecode for NasPdu {
    fn decode_aper(decoder: &mut AperDecoder) -> PerResult<Self> {
        Ok(NasPdu(decoder.decode_octet_string(None, None)?))
    }
}

aper_enumerated! {
    /// PagingDRX - Paging DRX cycle
    /// ASN.1: PagingDRX ::= ENUMERATED { v32, v64, v128, v256, ... }
    pub enum PagingDrx (Constraint::extensible(0, 3)) {
        V32 = 0,
        V64 = 1,
        V128 = 2,
        V256 = 3,
    }
}

aper_enumerated! {
    /// RRCEstablishmentCause
    /// ASN.1: RRCEstablishmentCause ::= ENUMERATED { emergency, ..., mcs-PriorityAccess, ..., notAvailable }
    pub enum RrcEstablishmentCause (Constraint::extensible(0, 9)) {
        Emergency = 0,
        HighPriorityAccess = 1,
        MtAccess = 2,
        MoSignalling = 3,
        MoData = 4,
        MoVoiceCall = 5,
        MoVideoCall = 6,
        MoSms = 7,
        MpsPriorityAccess = 8,
        McsPriorityAccess = 9,
        NotAvailable = 10,
    }
}

aper_enumerated! {
    /// UEContextRequest
    /// ASN.1: UEContextRequest ::= ENUMERATED { requested, ... }
    pub enum UeContextRequest (Constraint::extensible(0, 0)) {
        Requested = 0,
    }
}

aper_enumerated! {
    /// ResetAll
    /// ASN.1: ResetAll ::= ENUMERATED { reset-all, ... }
    pub enum ResetAll (Constraint::extensible(0, 0)) {
        ResetAll = 0,
    }
}
