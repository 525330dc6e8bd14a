//! Common NAS types and IE framing helpers

pub mod types;
pub mod ie;

pub use types::*;
pub use ie::*;
