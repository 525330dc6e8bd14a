//! Procedure Timer Supervisor
//!
//! One timer per outstanding procedure, keyed by a caller-chosen procedure
//! id (for the AMF: UE plus timer name). Each timer carries a payload, the
//! message to retransmit, and a retransmission budget:
//! - expiry with budget left reschedules the timer and reports
//!   [`Expiry::Retransmit`]
//! - expiry with the budget spent removes the timer and reports
//!   [`Expiry::Exhausted`]
//!
//! Time comes from a [`Clock`], so tests drive expiry with [`FakeClock`].

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

// ============================================================================
// Clock
// ============================================================================

/// Source of monotonic time
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Wall clock backed by `Instant::now`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests
#[derive(Debug)]
pub struct FakeClock {
    base: Instant,
    offset_ms: AtomicU64,
}

impl FakeClock {
    pub fn new() -> Self {
        Self { base: Instant::now(), offset_ms: AtomicU64::new(0) }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        self.offset_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    #[error("timer duration must be non-zero")]
    ZeroDuration,

    #[error("timer not armed")]
    NotArmed,
}

// ============================================================================
// Timer entries
// ============================================================================

/// What an expiry asks the owner to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Send the payload again; `attempt` counts from 1
    Retransmit { attempt: u32 },
    /// Budget spent; abandon the procedure
    Exhausted,
}

/// A fired timer. `id` is the handle returned by the [`TimerSupervisor::arm`]
/// call that produced it.
#[derive(Debug, Clone)]
pub struct Expired<K, T> {
    pub key: K,
    pub id: u64,
    pub payload: T,
    pub expiry: Expiry,
}

#[derive(Debug)]
struct TimerEntry<T> {
    id: u64,
    payload: T,
    duration: Duration,
    expires_at: Instant,
    retransmissions: u32,
    max_retransmissions: u32,
}

// ============================================================================
// Supervisor
// ============================================================================

/// Per-procedure timers with bounded retransmission
pub struct TimerSupervisor<K, T> {
    clock: Arc<dyn Clock>,
    timers: Mutex<HashMap<K, TimerEntry<T>>>,
    next_id: AtomicU64,
}

impl<K, T> TimerSupervisor<K, T>
where
    K: Clone + Eq + Hash + fmt::Debug,
    T: Clone,
{
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            timers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<K, TimerEntry<T>>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm (or re-arm) the timer for `key`. An already armed timer for the
    /// same key is replaced and its retransmission count restarts.
    pub fn arm(&self, key: K, duration: Duration, max_retransmissions: u32, payload: T) -> Result<u64, TimerError> {
        if duration.is_zero() {
            return Err(TimerError::ZeroDuration);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let entry = TimerEntry {
            id,
            payload,
            duration,
            expires_at: self.clock.now() + duration,
            retransmissions: 0,
            max_retransmissions,
        };
        log::debug!("Timer armed: {:?} duration={:?} max_retx={}", key, duration, max_retransmissions);
        self.entries().insert(key, entry);
        Ok(id)
    }

    /// Stop the timer for `key`; returns whether one was armed
    pub fn cancel(&self, key: &K) -> bool {
        let removed = self.entries().remove(key).is_some();
        if removed {
            log::debug!("Timer cancelled: {:?}", key);
        }
        removed
    }

    /// Stop every timer whose key matches
    pub fn cancel_where(&self, mut matches: impl FnMut(&K) -> bool) -> usize {
        let mut timers = self.entries();
        let before = timers.len();
        timers.retain(|k, _| !matches(k));
        before - timers.len()
    }

    pub fn is_armed(&self, key: &K) -> bool {
        self.entries().contains_key(key)
    }

    /// Handle of the current timer for `key`
    pub fn timer_id(&self, key: &K) -> Option<u64> {
        self.entries().get(key).map(|e| e.id)
    }

    /// Whether `expired` was overtaken by a cancel or re-arm of its key after
    /// it fired. An exhausted timer is already gone, so only a newer timer on
    /// the same key makes it stale.
    pub fn is_stale(&self, expired: &Expired<K, T>) -> bool {
        let current = self.timer_id(&expired.key);
        match expired.expiry {
            Expiry::Retransmit { .. } => current != Some(expired.id),
            Expiry::Exhausted => current.is_some_and(|id| id != expired.id),
        }
    }

    /// Time left on the timer for `key`
    pub fn remaining(&self, key: &K) -> Result<Duration, TimerError> {
        let now = self.clock.now();
        self.entries()
            .get(key)
            .map(|e| e.expires_at.saturating_duration_since(now))
            .ok_or(TimerError::NotArmed)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Time until the earliest expiry
    pub fn next_expiration(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.entries()
            .values()
            .map(|e| e.expires_at.saturating_duration_since(now))
            .min()
    }

    /// Collect every due timer. Timers with budget left are rescheduled one
    /// period from now; exhausted timers are removed.
    pub fn process_expired(&self) -> Vec<Expired<K, T>> {
        let now = self.clock.now();
        let mut fired = Vec::new();
        let mut exhausted = Vec::new();

        let mut timers = self.entries();
        for (key, entry) in timers.iter_mut() {
            if entry.expires_at > now {
                continue;
            }
            if entry.retransmissions < entry.max_retransmissions {
                entry.retransmissions += 1;
                entry.expires_at = now + entry.duration;
                fired.push(Expired {
                    key: key.clone(),
                    id: entry.id,
                    payload: entry.payload.clone(),
                    expiry: Expiry::Retransmit { attempt: entry.retransmissions },
                });
            } else {
                exhausted.push(key.clone());
            }
        }
        for key in exhausted {
            if let Some(entry) = timers.remove(&key) {
                log::debug!("Timer exhausted: {:?} after {} retransmissions", key, entry.retransmissions);
                fired.push(Expired { key, id: entry.id, payload: entry.payload, expiry: Expiry::Exhausted });
            }
        }

        fired
    }

    /// Poll for expiries every `tick` and hand each one to `on_expire`.
    /// Runs until the surrounding task is dropped or aborted.
    pub async fn run<F>(&self, tick: Duration, mut on_expire: F)
    where
        F: FnMut(Expired<K, T>),
    {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            for expired in self.process_expired() {
                on_expire(expired);
            }
        }
    }
}

impl<K, T> fmt::Debug for TimerSupervisor<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let armed = self.timers.lock().map(|t| t.len()).unwrap_or(0);
        f.debug_struct("TimerSupervisor").field("armed", &armed).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestTimer {
        T3560(u64),
        T3550(u64),
        T3570(u64),
    }

    fn supervisor() -> (Arc<FakeClock>, TimerSupervisor<TestTimer, &'static str>) {
        let clock = Arc::new(FakeClock::new());
        let sup = TimerSupervisor::new(clock.clone() as Arc<dyn Clock>);
        (clock, sup)
    }

    #[test]
    fn test_nothing_fires_before_deadline() {
        let (clock, sup) = supervisor();
        sup.arm(TestTimer::T3560(1), Duration::from_secs(6), 4, "auth").unwrap();
        clock.advance(Duration::from_millis(5999));
        assert!(sup.process_expired().is_empty());
        assert_eq!(sup.remaining(&TestTimer::T3560(1)).unwrap(), Duration::from_millis(1));
    }

    #[test]
    fn test_retransmit_then_exhaust() {
        let (clock, sup) = supervisor();
        sup.arm(TestTimer::T3560(1), Duration::from_secs(6), 2, "auth").unwrap();

        clock.advance(Duration::from_secs(6));
        let fired = sup.process_expired();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].expiry, Expiry::Retransmit { attempt: 1 });
        assert_eq!(fired[0].payload, "auth");

        clock.advance(Duration::from_secs(6));
        assert_eq!(sup.process_expired()[0].expiry, Expiry::Retransmit { attempt: 2 });

        clock.advance(Duration::from_secs(6));
        let fired = sup.process_expired();
        assert_eq!(fired[0].expiry, Expiry::Exhausted);
        assert!(!sup.is_armed(&TestTimer::T3560(1)));
    }

    #[test]
    fn test_zero_budget_exhausts_on_first_expiry() {
        let (clock, sup) = supervisor();
        sup.arm(TestTimer::T3550(9), Duration::from_secs(1), 0, "accept").unwrap();
        clock.advance(Duration::from_secs(1));
        let fired = sup.process_expired();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].expiry, Expiry::Exhausted);
    }

    #[test]
    fn test_cancel_prevents_expiry() {
        let (clock, sup) = supervisor();
        sup.arm(TestTimer::T3560(1), Duration::from_secs(1), 1, "auth").unwrap();
        assert!(sup.cancel(&TestTimer::T3560(1)));
        assert!(!sup.cancel(&TestTimer::T3560(1)));
        clock.advance(Duration::from_secs(5));
        assert!(sup.process_expired().is_empty());
    }

    #[test]
    fn test_rearm_replaces_and_resets_budget() {
        let (clock, sup) = supervisor();
        let first = sup.arm(TestTimer::T3560(1), Duration::from_secs(1), 1, "auth").unwrap();
        clock.advance(Duration::from_secs(1));
        sup.process_expired();

        let second = sup.arm(TestTimer::T3560(1), Duration::from_secs(1), 1, "smc").unwrap();
        assert_ne!(first, second);
        assert_eq!(sup.timer_id(&TestTimer::T3560(1)), Some(second));
        clock.advance(Duration::from_secs(1));
        let fired = sup.process_expired();
        assert_eq!(fired[0].payload, "smc");
        assert_eq!(fired[0].expiry, Expiry::Retransmit { attempt: 1 });
    }

    #[test]
    fn test_expiry_overtaken_by_rearm_is_stale() {
        let (clock, sup) = supervisor();
        let key = TestTimer::T3560(1);
        let auth = sup.arm(key, Duration::from_secs(1), 1, "auth").unwrap();
        clock.advance(Duration::from_secs(1));
        let retransmit = sup.process_expired().remove(0);
        assert_eq!(retransmit.id, auth);
        assert!(!sup.is_stale(&retransmit));

        clock.advance(Duration::from_secs(1));
        let exhausted = sup.process_expired().remove(0);
        assert_eq!(exhausted.expiry, Expiry::Exhausted);
        assert!(!sup.is_stale(&exhausted));

        sup.arm(key, Duration::from_secs(1), 1, "smc").unwrap();
        assert!(sup.is_stale(&retransmit));
        assert!(sup.is_stale(&exhausted));
    }

    #[test]
    fn test_retransmit_after_cancel_is_stale() {
        let (clock, sup) = supervisor();
        sup.arm(TestTimer::T3570(4), Duration::from_secs(1), 2, "identity").unwrap();
        clock.advance(Duration::from_secs(1));
        let fired = sup.process_expired().remove(0);
        sup.cancel(&TestTimer::T3570(4));
        assert!(sup.is_stale(&fired));
    }

    #[test]
    fn test_cancel_where_and_next_expiration() {
        let (_clock, sup) = supervisor();
        assert!(sup.next_expiration().is_none());
        sup.arm(TestTimer::T3560(1), Duration::from_secs(6), 4, "a").unwrap();
        sup.arm(TestTimer::T3550(1), Duration::from_secs(2), 4, "b").unwrap();
        sup.arm(TestTimer::T3560(2), Duration::from_secs(6), 4, "c").unwrap();
        assert_eq!(sup.next_expiration(), Some(Duration::from_secs(2)));

        let removed = sup.cancel_where(|k| matches!(k, TestTimer::T3560(1) | TestTimer::T3550(1)));
        assert_eq!(removed, 2);
        assert_eq!(sup.len(), 1);
    }

    #[test]
    fn test_zero_duration_rejected() {
        let (_clock, sup) = supervisor();
        assert_eq!(
            sup.arm(TestTimer::T3560(1), Duration::ZERO, 0, "x"),
            Err(TimerError::ZeroDuration)
        );
        assert_eq!(sup.remaining(&TestTimer::T3560(1)), Err(TimerError::NotArmed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_delivers_expiry() {
        let sup = Arc::new(TimerSupervisor::<u32, u32>::new(Arc::new(SystemClock)));
        sup.arm(7, Duration::from_millis(1), 0, 70).unwrap();
        std::thread::sleep(Duration::from_millis(2));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let runner = sup.clone();
        let task = tokio::spawn(async move {
            runner.run(Duration::from_millis(10), move |e| {
                let _ = tx.send(e);
            }).await;
        });

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.key, 7);
        assert_eq!(fired.payload, 70);
        task.abort();
    }
}
