//! NextGCore ASN.1 Codec Library
//!
//! Aligned PER (X.691) primitives and the NGAP PDU skeleton (3GPP TS 38.413).
//!
//! # Modules
//!
//! - `per` - APER encoder/decoder
//! - `ngap` - NGAP PDU, IE container, common IEs and causes

#[macro_use]
mod macros;

pub mod per;
pub mod ngap;

pub use per::{AperDecode, AperDecoder, AperEncode, AperEncoder, Constraint, PerError, PerResult};
