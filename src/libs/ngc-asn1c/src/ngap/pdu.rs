//! NGAP PDU Types
//!
//! Top-level PDU structures from NGAP-PDU-Descriptions (3GPP TS 38.413).
//!
//! Every procedure message handled by the AMF is a
//! `SEQUENCE { protocolIEs ProtocolIE-Container, ... }`, so the message
//! value is kept as the IE container and the procedure code carries the
//! message identity. This keeps decode/encode symmetric for every procedure.

use crate::per::{AperDecode, AperDecoder, AperEncode, AperEncoder, PerError, PerResult};
use super::ies::ProtocolIeContainer;
use super::types::{Criticality, ProcedureCode};

/// NGAP-PDU - Top-level PDU for all NGAP messages
/// ASN.1: NGAP-PDU ::= CHOICE { initiatingMessage, successfulOutcome, unsuccessfulOutcome, ... }
#[derive(Debug, Clone, PartialEq)]
pub enum NgapPdu {
    InitiatingMessage(InitiatingMessage),
    SuccessfulOutcome(SuccessfulOutcome),
    UnsuccessfulOutcome(UnsuccessfulOutcome),
}

impl NgapPdu {
    pub const NUM_ALTERNATIVES: usize = 3;
    pub const EXTENSIBLE: bool = true;

    pub fn procedure_code(&self) -> ProcedureCode {
        match self {
            NgapPdu::InitiatingMessage(m) => m.procedure_code,
            NgapPdu::SuccessfulOutcome(m) => m.procedure_code,
            NgapPdu::UnsuccessfulOutcome(m) => m.procedure_code,
        }
    }

    pub fn ies(&self) -> &ProtocolIeContainer {
        match self {
            NgapPdu::InitiatingMessage(m) => &m.value,
            NgapPdu::SuccessfulOutcome(m) => &m.value,
            NgapPdu::UnsuccessfulOutcome(m) => &m.value,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NgapPdu::InitiatingMessage(_) => "InitiatingMessage",
            NgapPdu::SuccessfulOutcome(_) => "SuccessfulOutcome",
            NgapPdu::UnsuccessfulOutcome(_) => "UnsuccessfulOutcome",
        }
    }
}

impl AperEncode for NgapPdu {
    fn encode_aper(&self, encoder: &mut AperEncoder) -> PerResult<()> {
        match self {
            NgapPdu::InitiatingMessage(msg) => {
                encoder.encode_choice_index(0, Self::NUM_ALTERNATIVES, Self::EXTENSIBLE)?;
                msg.encode_aper(encoder)
            }
            NgapPdu::SuccessfulOutcome(msg) => {
                encoder.encode_choice_index(1, Self::NUM_ALTERNATIVES, Self::EXTENSIBLE)?;
                msg.encode_aper(encoder)
            }
            NgapPdu::UnsuccessfulOutcome(msg) => {
                encoder.encode_choice_index(2, Self::NUM_ALTERNATIVES, Self::EXTENSIBLE)?;
                msg.encode_aper(encoder)
            }
        }
    }
}

impl AperDecode for NgapPdu {
    fn decode_aper(decoder: &mut AperDecoder) -> PerResult<Self> {
        let index = decoder.decode_choice_index(Self::NUM_ALTERNATIVES, Self::EXTENSIBLE)?;
        match index {
            0 => Ok(NgapPdu::InitiatingMessage(InitiatingMessage::decode_aper(decoder)?)),
            1 => Ok(NgapPdu::SuccessfulOutcome(SuccessfulOutcome::decode_aper(decoder)?)),
            2 => Ok(NgapPdu::UnsuccessfulOutcome(UnsuccessfulOutcome::decode_aper(decoder)?)),
            _ => Err(PerError::InvalidChoiceIndex {
                index,
                max: Self::NUM_ALTERNATIVES - 1,
            }),
        }
    }
}

/// Message value: `SEQUENCE { protocolIEs, ... }` carried as an open type
struct MessageValue<'a>(&'a ProtocolIeContainer);

impl AperEncode for MessageValue<'_> {
    fn encode_aper(&self, encoder: &mut AperEncoder) -> PerResult<()> {
        encoder.write_bit(false); // no extension additions
        self.0.encode_aper(encoder)
    }
}

fn decode_message_value(decoder: &mut AperDecoder) -> PerResult<ProtocolIeContainer> {
    let raw = decoder.decode_open_type()?;
    let mut inner = AperDecoder::new(&raw);
    // Extension additions, if flagged, trail the container and are not interpreted
    let _extended = inner.read_bit()?;
    ProtocolIeContainer::decode_aper(&mut inner)
}

macro_rules! procedure_message {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            pub procedure_code: ProcedureCode,
            pub criticality: Criticality,
            pub value: ProtocolIeContainer,
        }

        impl $name {
            pub fn new(procedure_code: ProcedureCode, criticality: Criticality, value: ProtocolIeContainer) -> Self {
                Self { procedure_code, criticality, value }
            }
        }

        impl AperEncode for $name {
            fn encode_aper(&self, encoder: &mut AperEncoder) -> PerResult<()> {
                self.procedure_code.encode_aper(encoder)?;
                self.criticality.encode_aper(encoder)?;
                encoder.encode_open_type_of(&MessageValue(&self.value))
            }
        }

        impl AperDecode for $name {
            fn decode_aper(decoder: &mut AperDecoder) -> PerResult<Self> {
                let procedure_code = ProcedureCode::decode_aper(decoder)?;
                let criticality = Criticality::decode_aper(decoder)?;
                let value = decode_message_value(decoder)?;
                Ok(Self { procedure_code, criticality, value })
            }
        }
    };
}

procedure_message! {
    /// InitiatingMessage - Request/indication messages
    /// ASN.1: InitiatingMessage ::= SEQUENCE { procedureCode, criticality, value }
    InitiatingMessage
}

procedure_message! {
    /// SuccessfulOutcome - Response messages for successful procedures
    SuccessfulOutcome
}

procedure_message! {
    /// UnsuccessfulOutcome - Response messages for failed procedures
    UnsuccessfulOutcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ngap::ies::ProtocolIeField;
    use crate::ngap::types::ProtocolIeId;
    use crate::per::{decode_from_slice, encode_to_vec};

    #[test]
    fn test_initiating_message_header_layout() {
        let mut ies = ProtocolIeContainer::new();
        ies.push(ProtocolIeField {
            id: ProtocolIeId::RAN_NODE_NAME,
            criticality: Criticality::Ignore,
            value: vec![0x01],
        });
        let pdu = NgapPdu::InitiatingMessage(InitiatingMessage::new(
            ProcedureCode::NG_SETUP,
            Criticality::Reject,
            ies,
        ));
        let bytes = encode_to_vec(&pdu).unwrap();
        // choice 0, procedure 21, reject, open type length, ext bit, IE count 1
        assert_eq!(&bytes[..7], &[0x00, 0x15, 0x00, 0x08, 0x00, 0x00, 0x01]);
        // IE: id 82, ignore, length 1, value
        assert_eq!(&bytes[7..], &[0x00, 0x52, 0x40, 0x01, 0x01]);

        let decoded: NgapPdu = decode_from_slice(&bytes).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn test_unknown_procedure_roundtrips() {
        let pdu = NgapPdu::UnsuccessfulOutcome(UnsuccessfulOutcome::new(
            ProcedureCode(52),
            Criticality::Ignore,
            ProtocolIeContainer::new(),
        ));
        let bytes = encode_to_vec(&pdu).unwrap();
        assert_eq!(bytes[0], 0x40);
        let decoded: NgapPdu = decode_from_slice(&bytes).unwrap();
        assert_eq!(decoded.procedure_code(), ProcedureCode(52));
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn test_truncated_pdu_fails() {
        assert!(decode_from_slice::<NgapPdu>(&[0x00, 0x15, 0x00, 0x20, 0x00]).is_err());
    }
}
