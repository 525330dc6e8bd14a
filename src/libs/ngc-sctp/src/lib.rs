//! NextGCore SCTP Transport Library
//!
//! Linux kernel SCTP one-to-one associations for NGAP (TS 38.412):
//! - `kernel`: raw socket setup (`SCTP_INITMSG`, `SCTP_EVENTS`) and
//!   `sendmsg`/`recvmsg` with `SCTP_SNDRCV` ancillary data
//! - `stream`: tokio wrappers (`SctpListener`, `SctpAssociation`)
//!
//! Requires the SCTP kernel module (`modprobe sctp`). No libsctp is needed,
//! the ancillary data is built directly.

use std::io;

use bytes::Bytes;
use thiserror::Error;

pub mod kernel;
pub mod stream;

pub use kernel::KernelSctpSocket;
pub use stream::{SctpAssociation, SctpListener};

// ============================================================================
// Constants (matching 3GPP specifications)
// ============================================================================

/// NGAP SCTP port (3GPP TS 38.412)
pub const NGAP_PORT: u16 = 38412;

/// NGAP payload protocol identifier
pub const NGAP_PPID: u32 = 60;

/// Maximum SDU length
pub const MAX_SDU_LEN: usize = 8192;

/// Default number of SCTP streams offered to a gNB
pub const DEFAULT_NUM_STREAMS: u16 = 2;

/// Stream carrying non-UE-associated signalling
pub const NON_UE_SIGNALLING_STREAM: u16 = 0;

// ============================================================================
// Error types
// ============================================================================

/// SCTP-specific errors
#[derive(Error, Debug)]
pub enum SctpError {
    #[error("Socket creation failed: {0}")]
    SocketCreation(io::Error),

    #[error("Bind failed: {0}")]
    BindFailed(io::Error),

    #[error("Listen failed: {0}")]
    ListenFailed(io::Error),

    #[error("Accept failed: {0}")]
    AcceptFailed(io::Error),

    #[error("Send failed: {0}")]
    SendFailed(io::Error),

    #[error("Receive failed: {0}")]
    ReceiveFailed(io::Error),

    #[error("Socket option failed: {0}")]
    SockoptFailed(io::Error),

    #[error("No valid address")]
    NoValidAddress,

    #[error("Association closed")]
    AssociationClosed,
}

pub type SctpResult<T> = std::result::Result<T, SctpError>;

// ============================================================================
// Configuration and events
// ============================================================================

/// Stream negotiation parameters for new associations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SctpConfig {
    pub max_outbound_streams: u16,
    pub max_inbound_streams: u16,
    pub max_attempts: u16,
    pub max_init_timeout_ms: u16,
}

impl Default for SctpConfig {
    fn default() -> Self {
        Self {
            max_outbound_streams: DEFAULT_NUM_STREAMS,
            max_inbound_streams: DEFAULT_NUM_STREAMS,
            max_attempts: 4,
            max_init_timeout_ms: 8000,
        }
    }
}

/// Received SCTP message
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub stream_id: u16,
    pub ppid: u32,
    pub data: Bytes,
}

/// What one read from an association produced
#[derive(Debug, Clone)]
pub enum SctpEvent {
    /// Association is up with the negotiated stream counts
    Connected { inbound_streams: u16, outbound_streams: u16 },
    DataReceived(ReceivedMessage),
    /// Peer shut down, aborted or the association was lost
    Disconnected,
}

/// Pick the outbound stream for UE-associated signalling.
///
/// Stream 0 stays reserved for non-UE signalling whenever the peer
/// accepted more than one stream.
pub fn ue_stream(ran_ue_ngap_id: u64, outbound_streams: u16) -> u16 {
    if outbound_streams <= 1 {
        return NON_UE_SIGNALLING_STREAM;
    }
    let ue_streams = u64::from(outbound_streams - 1);
    1 + (ran_ue_ngap_id % ue_streams) as u16
}
