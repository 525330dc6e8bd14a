//! AMF Timer Management
//!
//! Named NAS/NGAP procedure timers on top of [`ngc_core::TimerSupervisor`].
//! Every timer belongs to one UE and carries what must be resent when it
//! fires. Expiries are delivered through the UE's work queue, so they are
//! ordered with the UE's other messages.

use std::time::Duration;

use ngc_core::{Expired, Expiry};
use ngc_nas::common::types::SecurityHeaderType;

use crate::config::{TimerConfig, TimersConfig};
use crate::context::AmfContext;
use crate::error::{AmfError, AmfResult};
use crate::gmm_handler;
use crate::gmm_sm::Procedure;
use crate::ngap_path;

/// Poll period of the supervisor task
pub const TIMER_TICK: Duration = Duration::from_millis(50);

// ============================================================================
// Timer IDs
// ============================================================================

/// AMF timer identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AmfTimer {
    /// T3513 - Paging
    T3513,
    /// T3522 - Deregistration request sent
    T3522,
    /// T3550 - Registration accept sent
    T3550,
    /// T3560 - Authentication request / Security mode command sent
    T3560,
    /// T3570 - Identity request sent
    T3570,
    /// NG holding timer, waiting for UE Context Release Complete
    NgHolding,
}

impl AmfTimer {
    pub fn name(&self) -> &'static str {
        match self {
            Self::T3513 => "AMF_TIMER_T3513",
            Self::T3522 => "AMF_TIMER_T3522",
            Self::T3550 => "AMF_TIMER_T3550",
            Self::T3560 => "AMF_TIMER_T3560",
            Self::T3570 => "AMF_TIMER_T3570",
            Self::NgHolding => "AMF_TIMER_NG_HOLDING",
        }
    }

    pub fn config(&self, timers: &TimersConfig) -> TimerConfig {
        match self {
            Self::T3513 => timers.t3513,
            Self::T3522 => timers.t3522,
            Self::T3550 => timers.t3550,
            Self::T3560 => timers.t3560,
            Self::T3570 => timers.t3570,
            Self::NgHolding => timers.ng_holding,
        }
    }

    /// Whether the timer still guards `procedure`
    pub fn guards(&self, procedure: Procedure) -> bool {
        match self {
            Self::T3522 => procedure == Procedure::Deregistration,
            Self::T3550 => procedure == Procedure::RegistrationAccept,
            Self::T3560 => matches!(procedure, Procedure::Authentication | Procedure::SecurityMode),
            Self::T3570 => procedure == Procedure::Identity,
            Self::T3513 | Self::NgHolding => true,
        }
    }
}

impl std::fmt::Display for AmfTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub amf_ue_ngap_id: u64,
    pub timer: AmfTimer,
}

/// What a timer resends on expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerPayload {
    /// Plain NAS message, protected afresh on every retransmission
    Nas { plain: Vec<u8>, header: Option<SecurityHeaderType> },
    Paging,
    Hold,
}

// ============================================================================
// Arm / cancel
// ============================================================================

pub fn arm(ctx: &AmfContext, amf_ue_ngap_id: u64, timer: AmfTimer, payload: TimerPayload) -> AmfResult<()> {
    let config = timer.config(&ctx.config.timers);
    ctx.timers
        .arm(TimerKey { amf_ue_ngap_id, timer }, config.duration(), config.max_count, payload)
        .map_err(|e| AmfError::Config(format!("{}: {}", timer, e)))?;
    Ok(())
}

pub fn cancel(ctx: &AmfContext, amf_ue_ngap_id: u64, timer: AmfTimer) -> bool {
    ctx.timers.cancel(&TimerKey { amf_ue_ngap_id, timer })
}

/// Stop every timer of one UE
pub fn cancel_all(ctx: &AmfContext, amf_ue_ngap_id: u64) -> usize {
    ctx.timers.cancel_where(|key| key.amf_ue_ngap_id == amf_ue_ngap_id)
}

// ============================================================================
// Expiry
// ============================================================================

pub async fn handle_expiry(ctx: &AmfContext, expired: Expired<TimerKey, TimerPayload>) {
    let key = expired.key;
    let Some(handle) = ctx.ues.get(key.amf_ue_ngap_id) else {
        log::debug!("{} expired for released UE (amf_ue_ngap_id={})", key.timer, key.amf_ue_ngap_id);
        return;
    };
    let mut ue = handle.lock().await;
    if ue.amf_ue_ngap_id != key.amf_ue_ngap_id || !key.timer.guards(ue.fsm.procedure) {
        return;
    }
    // Answered or re-armed while this expiry sat in the queue
    if ctx.timers.is_stale(&expired) {
        log::debug!("[{}] Dropped stale {} expiry", ue.label(), key.timer);
        return;
    }

    match expired.expiry {
        Expiry::Retransmit { attempt } => {
            log::info!("[{}] {} expired, retransmission {}", ue.label(), key.timer, attempt);
            let result = match &expired.payload {
                TimerPayload::Nas { plain, header } => ngap_path::send_nas(ctx, &mut ue, plain, *header),
                TimerPayload::Paging => ngap_path::send_paging(ctx, &ue).map(|_| ()),
                TimerPayload::Hold => Ok(()),
            };
            if let Err(e) = result {
                log::warn!("[{}] {} retransmission failed: {}", ue.label(), key.timer, e);
            }
        }
        Expiry::Exhausted => {
            log::warn!("[{}] {} exhausted in {}", ue.label(), key.timer, ue.state());
            match key.timer {
                AmfTimer::T3513 => {
                    log::info!("[{}] Paging failed", ue.label());
                }
                AmfTimer::T3522 => {
                    drop(ue);
                    gmm_handler::remove_ue(ctx, &handle).await;
                }
                AmfTimer::T3550 | AmfTimer::T3560 | AmfTimer::T3570 => {
                    gmm_handler::abandon(ctx, &mut ue);
                }
                AmfTimer::NgHolding => {
                    if let Some(serving) = ue.detach_ran() {
                        log::info!("[{}] No UE Context Release Complete from {}", ue.label(), serving.handle);
                    }
                }
            }
        }
    }
}

/// Drop UE contexts that are deregistered, or unreachable through any RAN,
/// and idle for longer than `ue_inactivity_secs`
pub async fn sweep_inactive(ctx: &AmfContext) -> usize {
    let limit = Duration::from_secs(ctx.config.ue_inactivity_secs);
    let now = ctx.now();
    let mut removed = 0;
    for (id, handle) in ctx.ues.handles() {
        let idle = {
            let ue = handle.lock().await;
            let dormant = ue.state() == crate::gmm_sm::GmmState::Deregistered || ue.serving_ran.is_none();
            dormant && now.saturating_duration_since(ue.last_activity) > limit
        };
        if idle {
            log::info!("UE context expired after inactivity (amf_ue_ngap_id={})", id);
            gmm_handler::remove_ue(ctx, &handle).await;
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_names() {
        assert_eq!(AmfTimer::T3560.name(), "AMF_TIMER_T3560");
        assert_eq!(AmfTimer::NgHolding.to_string(), "AMF_TIMER_NG_HOLDING");
    }

    #[test]
    fn test_timer_config_lookup() {
        let timers = TimersConfig::default();
        assert_eq!(AmfTimer::T3560.config(&timers), timers.t3560);
        assert_eq!(AmfTimer::T3513.config(&timers).max_count, 2);
    }

    #[test]
    fn test_guards() {
        assert!(AmfTimer::T3560.guards(Procedure::Authentication));
        assert!(AmfTimer::T3560.guards(Procedure::SecurityMode));
        assert!(!AmfTimer::T3560.guards(Procedure::None));
        assert!(!AmfTimer::T3550.guards(Procedure::Identity));
        assert!(AmfTimer::NgHolding.guards(Procedure::None));
    }
}
