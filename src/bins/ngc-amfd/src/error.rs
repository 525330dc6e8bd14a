//! AMF error types

use ngc_crypt::CryptError;
use ngc_nas::NasError;
use ngc_ngap::NgapError;
use ngc_sctp::SctpError;
use thiserror::Error;

use crate::transport::ConnectionHandle;

/// Errors surfaced by AMF operations
#[derive(Error, Debug)]
pub enum AmfError {
    /// The RAN association is gone or the UE no longer has a live serving RAN
    #[error("Connection closed: {0}")]
    ConnectionClosed(ConnectionHandle),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Authentication failed")]
    AuthenticationFailed,

    /// NAS MAC did not verify; the message is discarded
    #[error("NAS integrity check failed (count={count})")]
    IntegrityCheckFailed { count: u32 },

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Configuration rejected: {0}")]
    ConfigurationRejected(String),

    #[error("Invalid state: {message} in {state}")]
    InvalidState { message: String, state: &'static str },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("NGAP error: {0}")]
    Ngap(#[from] NgapError),

    #[error("NAS error: {0}")]
    Nas(#[from] NasError),

    #[error("Crypto error: {0}")]
    Crypt(#[from] CryptError),

    #[error("SCTP error: {0}")]
    Sctp(#[from] SctpError),
}

pub type AmfResult<T> = std::result::Result<T, AmfError>;

impl AmfError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// True when the failure means the peer cannot be reached any more
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed(_) | Self::Sctp(SctpError::AssociationClosed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AmfError::ConnectionClosed(ConnectionHandle::new(7));
        assert_eq!(err.to_string(), "Connection closed: conn-7");

        let err = AmfError::InvalidState { message: "RegistrationComplete".into(), state: "GMM_STATE_DE_REGISTERED" };
        assert!(err.to_string().contains("GMM_STATE_DE_REGISTERED"));
    }

    #[test]
    fn test_is_connection_closed() {
        assert!(AmfError::ConnectionClosed(ConnectionHandle::new(1)).is_connection_closed());
        assert!(AmfError::Sctp(SctpError::AssociationClosed).is_connection_closed());
        assert!(!AmfError::AuthenticationFailed.is_connection_closed());
    }
}
