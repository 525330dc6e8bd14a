//! NextGCore AMF (Access and Mobility Management Function)
//!
//! NGAP/NAS signalling core: accepts gNB associations, tracks the RAN nodes
//! and UE contexts, authenticates subscribers with 5G-AKA, establishes NAS
//! security and drives registration, PDU session and de-registration
//! procedures under supervised NAS timers.
//!
//! All state hangs off one explicit [`context::AmfContext`]. Non-UE NGAP
//! signalling runs on each association's reader task; UE-associated work is
//! serialised per UE by [`worker::WorkerPool`].

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub mod admin;
pub mod app;
pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod gmm_build;
pub mod gmm_handler;
pub mod gmm_sm;
pub mod nas_security;
pub mod ngap_build;
pub mod ngap_handler;
pub mod ngap_path;
pub mod ran;
pub mod subscriber;
pub mod timer;
pub mod transport;
pub mod ue;
pub mod upf;
pub mod worker;

pub use app::AmfApp;
pub use config::AmfConfig;
pub use context::AmfContext;
pub use error::{AmfError, AmfResult};
pub use transport::ConnectionHandle;

/// Lock for reading; a panicked writer leaves plain maps consistent
pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
