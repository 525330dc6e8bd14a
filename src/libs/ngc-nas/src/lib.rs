//! 5GS NAS message building and parsing
//!
//! Covers the 5GMM and 5GSM messages an AMF exchanges with the UE during
//! registration, authentication, security mode control, PDU session
//! transport and de-registration (3GPP TS 24.501). Message protection
//! (integrity and ciphering) lives with the AMF, which owns the keys;
//! this crate only frames the security protected header.
//!
//! # Example
//!
//! ```rust
//! use ngc_nas::fiveg::{build_5gmm_message, parse_5gmm_message, FiveGmmMessage, IdentityRequest, IdentityType};
//!
//! let msg = FiveGmmMessage::IdentityRequest(IdentityRequest { identity_type: IdentityType::Suci });
//! let mut raw = build_5gmm_message(&msg).unwrap();
//! assert_eq!(&raw[..], &[0x7e, 0x00, 0x5b, 0x01]);
//! assert_eq!(parse_5gmm_message(&mut raw).unwrap(), msg);
//! ```

pub mod error;
pub mod common;
pub mod fiveg;


pub use error::{NasError, NasResult};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{NasError, NasResult};
    pub use crate::common::types::{
        Abba,
        Dnn,
        GprsTimer3,
        KeySetIdentifier,
        PlmnId,
        ProtocolDiscriminator,
        SNssai,
        SecurityAlgorithms,
        SecurityHeaderType,
        Tai,
        UeSecurityCapability,
    };
    pub use crate::fiveg::{
        build_5gmm_message,
        build_5gsm_message,
        parse_5gmm_message,
        parse_5gsm_message,
        peek_header,
        FiveGGuti,
        FiveGSTmsi,
        FiveGmmCause,
        FiveGmmMessage,
        FiveGsmCause,
        FiveGsmMessage,
        MobileIdentity,
        SecuredNasMessage,
        Suci,
        TaiList,
    };
}
