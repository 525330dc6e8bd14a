//! NAS error types

use thiserror::Error;

/// NAS error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NasError {
    /// Buffer too short for decoding
    #[error("Buffer too short: expected {expected} bytes, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    /// Invalid message type
    #[error("Invalid message type: 0x{0:02x}")]
    InvalidMessageType(u8),

    /// Invalid extended protocol discriminator
    #[error("Invalid extended protocol discriminator: 0x{0:02x}")]
    InvalidProtocolDiscriminator(u8),

    /// Invalid security header type
    #[error("Invalid security header type: {0}")]
    InvalidSecurityHeaderType(u8),

    /// IE length outside the range allowed for it
    #[error("Invalid length for IE {ie}: {len}")]
    InvalidIeLength { ie: &'static str, len: usize },

    /// Missing mandatory IE
    #[error("Missing mandatory IE: {0}")]
    MissingMandatoryIe(&'static str),

    /// Invalid mobile identity type
    #[error("Invalid mobile identity type: {0}")]
    InvalidMobileIdentityType(u8),

    /// Invalid registration type
    #[error("Invalid registration type: {0}")]
    InvalidRegistrationType(u8),

    /// Field value outside its defined range
    #[error("Invalid value {value} for {field}")]
    InvalidValue { field: &'static str, value: u32 },

    /// A payload that cannot be represented on the wire
    #[error("Encoding error: {0}")]
    EncodingError(String),
}

/// NAS result type
pub type NasResult<T> = Result<T, NasError>;

/// Fail with `BufferTooShort` unless `buf` holds at least `expected` bytes.
pub(crate) fn need(buf: &impl bytes::Buf, expected: usize) -> NasResult<()> {
    if buf.remaining() < expected {
        return Err(NasError::BufferTooShort { expected, actual: buf.remaining() });
    }
    Ok(())
}
