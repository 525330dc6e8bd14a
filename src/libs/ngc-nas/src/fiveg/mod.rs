//! 5GS NAS: 5GMM and 5GSM messages (TS 24.501)

pub mod header;
pub mod types;
pub mod message;

pub use header::*;
pub use types::*;
pub use message::*;
