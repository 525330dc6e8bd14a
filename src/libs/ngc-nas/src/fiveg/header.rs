//! 5GS NAS message headers
//!
//! Based on 3GPP TS 24.501 Section 9.1

use bytes::{Buf, BufMut, Bytes, BytesMut};
use crate::error::{need, NasError, NasResult};
use crate::common::types::{ProtocolDiscriminator, SecurityHeaderType};

/// Security protected header length: EPD, SHT, MAC (4), sequence number
pub const FIVEG_NAS_SECURITY_HEADER_LEN: usize = 7;

macro_rules! message_type_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal,)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($variant = $value,)+
        }

        impl TryFrom<u8> for $name {
            type Error = NasError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    _ => Err(NasError::InvalidMessageType(value)),
                }
            }
        }
    };
}

message_type_enum! {
    /// 5GMM message types
    FiveGmmMessageType {
        RegistrationRequest = 0x41,
        RegistrationAccept = 0x42,
        RegistrationComplete = 0x43,
        RegistrationReject = 0x44,
        DeregistrationRequestFromUe = 0x45,
        DeregistrationAcceptFromUe = 0x46,
        DeregistrationRequestToUe = 0x47,
        DeregistrationAcceptToUe = 0x48,
        ServiceRequest = 0x4C,
        ServiceReject = 0x4D,
        ServiceAccept = 0x4E,
        AuthenticationRequest = 0x56,
        AuthenticationResponse = 0x57,
        AuthenticationReject = 0x58,
        AuthenticationFailure = 0x59,
        IdentityRequest = 0x5B,
        IdentityResponse = 0x5C,
        SecurityModeCommand = 0x5D,
        SecurityModeComplete = 0x5E,
        SecurityModeReject = 0x5F,
        FiveGmmStatus = 0x64,
        UlNasTransport = 0x67,
        DlNasTransport = 0x68,
    }
}

message_type_enum! {
    /// 5GSM message types
    FiveGsmMessageType {
        PduSessionEstablishmentRequest = 0xC1,
        PduSessionEstablishmentAccept = 0xC2,
        PduSessionEstablishmentReject = 0xC3,
        PduSessionReleaseRequest = 0xD1,
        PduSessionReleaseReject = 0xD2,
        PduSessionReleaseCommand = 0xD3,
        PduSessionReleaseComplete = 0xD4,
        FiveGsmStatus = 0xD6,
    }
}

/// Plain 5GMM header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiveGmmHeader {
    pub message_type: FiveGmmMessageType,
}

impl FiveGmmHeader {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(ProtocolDiscriminator::FiveGsMobilityManagement as u8);
        buf.put_u8(SecurityHeaderType::PlainNas as u8);
        buf.put_u8(self.message_type as u8);
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        need(buf, 3)?;
        let epd = buf.get_u8();
        if epd != ProtocolDiscriminator::FiveGsMobilityManagement as u8 {
            return Err(NasError::InvalidProtocolDiscriminator(epd));
        }
        let sht = SecurityHeaderType::try_from(buf.get_u8() & 0x0F)?;
        if sht != SecurityHeaderType::PlainNas {
            return Err(NasError::InvalidSecurityHeaderType(sht as u8));
        }
        let message_type = FiveGmmMessageType::try_from(buf.get_u8())?;
        Ok(Self { message_type })
    }
}

/// 5GSM header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiveGsmHeader {
    pub pdu_session_id: u8,
    /// Procedure transaction identity
    pub pti: u8,
    pub message_type: FiveGsmMessageType,
}

impl FiveGsmHeader {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(ProtocolDiscriminator::FiveGsSessionManagement as u8);
        buf.put_u8(self.pdu_session_id);
        buf.put_u8(self.pti);
        buf.put_u8(self.message_type as u8);
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        need(buf, 4)?;
        let epd = buf.get_u8();
        if epd != ProtocolDiscriminator::FiveGsSessionManagement as u8 {
            return Err(NasError::InvalidProtocolDiscriminator(epd));
        }
        let pdu_session_id = buf.get_u8();
        let pti = buf.get_u8();
        let message_type = FiveGsmMessageType::try_from(buf.get_u8())?;
        Ok(Self { pdu_session_id, pti, message_type })
    }
}

/// Security protected 5GMM message: header fields plus the (possibly
/// ciphered) inner plain message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecuredNasMessage {
    pub security_header_type: SecurityHeaderType,
    pub message_authentication_code: [u8; 4],
    pub sequence_number: u8,
    pub payload: Bytes,
}

impl SecuredNasMessage {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(ProtocolDiscriminator::FiveGsMobilityManagement as u8);
        buf.put_u8(self.security_header_type as u8);
        buf.put_slice(&self.message_authentication_code);
        buf.put_u8(self.sequence_number);
        buf.put_slice(&self.payload);
    }

    pub fn decode(buf: &mut Bytes) -> NasResult<Self> {
        need(buf, FIVEG_NAS_SECURITY_HEADER_LEN)?;
        let epd = buf.get_u8();
        if epd != ProtocolDiscriminator::FiveGsMobilityManagement as u8 {
            return Err(NasError::InvalidProtocolDiscriminator(epd));
        }
        let security_header_type = SecurityHeaderType::try_from(buf.get_u8() & 0x0F)?;
        if security_header_type == SecurityHeaderType::PlainNas {
            return Err(NasError::InvalidSecurityHeaderType(0));
        }
        let mut message_authentication_code = [0u8; 4];
        buf.copy_to_slice(&mut message_authentication_code);
        let sequence_number = buf.get_u8();
        let payload = buf.split_off(0);
        Ok(Self {
            security_header_type,
            message_authentication_code,
            sequence_number,
            payload,
        })
    }

    /// The octets the MAC is computed over: sequence number and payload
    pub fn mac_input(&self) -> Vec<u8> {
        let mut v = Vec::with_capacity(1 + self.payload.len());
        v.push(self.sequence_number);
        v.extend_from_slice(&self.payload);
        v
    }
}

/// Peek at the extended protocol discriminator and security header type
/// without consuming anything.
pub fn peek_header(raw: &[u8]) -> NasResult<(ProtocolDiscriminator, SecurityHeaderType)> {
    if raw.len() < 3 {
        return Err(NasError::BufferTooShort { expected: 3, actual: raw.len() });
    }
    let epd = ProtocolDiscriminator::try_from(raw[0])?;
    let sht = match epd {
        ProtocolDiscriminator::FiveGsMobilityManagement => SecurityHeaderType::try_from(raw[1] & 0x0F)?,
        ProtocolDiscriminator::FiveGsSessionManagement => SecurityHeaderType::PlainNas,
    };
    Ok((epd, sht))
}
