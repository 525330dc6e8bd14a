//! NextGCore core runtime pieces shared by the network functions
//!
//! Currently the procedure timer supervisor: named, per-procedure timers
//! with bounded retransmission budgets, driven by an injectable clock so
//! expiry can be tested without sleeping.

pub mod timer;

pub use timer::{Clock, Expired, Expiry, FakeClock, SystemClock, TimerError, TimerSupervisor};
