//! NextGCore Cryptographic Library
//!
//! The algorithms the AMF needs for 5G-AKA and NAS security:
//! Milenage (TS 35.206), the TS 33.501 Annex A key hierarchy, AES-CMAC
//! and AES-CTR, and the NAS algorithms built on them (128-NIA2/128-NEA2).
//! Everything here is a pure function over caller-supplied inputs.

use thiserror::Error;

pub mod milenage;   // Milenage f1-f5*, OPc, vector generation and resync
pub mod kdf;        // TS 33.501 Annex A key derivation
pub mod aes;        // AES-128 block and CTR mode
pub mod aes_cmac;   // AES-CMAC (RFC 4493)
pub mod nas_alg;    // 128-NIA2 / 128-NEA2

#[cfg(test)]
mod property_tests;

pub use milenage::MilenageError;

/// Errors raised by the crypto primitives
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptError {
    #[error(transparent)]
    Milenage(#[from] MilenageError),

    #[error("invalid key length: {0}")]
    InvalidKeyLength(usize),

    #[error("unsupported {kind} algorithm {id}")]
    UnsupportedAlgorithm { kind: &'static str, id: u8 },
}

pub type CryptResult<T> = Result<T, CryptError>;
