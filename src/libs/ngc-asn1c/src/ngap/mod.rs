//! NGAP (3GPP TS 38.413) PDU skeleton
//!
//! The top-level PDU, the ProtocolIE container and the IEs shared by
//! several procedures. Procedure-level typing lives in `ngc-ngap`.

pub mod types;
pub mod pdu;
pub mod ies;
pub mod cause;

pub use cause::Cause;
pub use ies::{ProtocolIeContainer, ProtocolIeField};
pub use pdu::{InitiatingMessage, NgapPdu, SuccessfulOutcome, UnsuccessfulOutcome};
pub use types::{Criticality, ProcedureCode, ProtocolIeId};
