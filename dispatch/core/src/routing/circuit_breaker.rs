//! Per-Model Circuit Breaker
//!
//! Stops traffic to a backend after repeated consecutive failures and lets a
//! single probe through once the open period has elapsed.
//!
//! ```text
//! +--------+  threshold failures  +------+   timeout elapsed   +-----------+
//! | Closed | -------------------> | Open | ------------------> | Half-Open |
//! +--------+                      +------+                     +-----------+
//!     ^                               ^            1 failure         |
//!     |                               +------------------------------+
//!     |                     1 success                                |
//!     +--------------------------------------------------------------+
//! ```
//!
//! # Thread Safety
//!
//! All state lives in atomics. State changes go through compare-exchange so
//! exactly one caller wins the Open to Half-Open transition and with it the
//! probe. The registry uses `DashMap` for concurrent per-model access.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::BreakerConfig;

const CLOSED: u32 = 0;
const OPEN: u32 = 1;
const HALF_OPEN: u32 = 2;

// ============================================================================
// Breaker State
// ============================================================================

/// Circuit breaker state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BreakerState {
    /// Normal operation
    #[default]
    Closed,
    /// Rejecting traffic
    Open,
    /// One probe allowed to test recovery
    HalfOpen,
}

impl BreakerState {
    fn from_u32(raw: u32) -> Self {
        match raw {
            OPEN => Self::Open,
            HALF_OPEN => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Point-in-time view of one breaker
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitBreakerState {
    pub model_id: String,
    pub state: BreakerState,
    pub consecutive_failures: u32,
    /// `None` if the model never failed
    pub since_last_failure: Option<Duration>,
}

// ============================================================================
// Circuit Breaker
// ============================================================================

/// Breaker guarding a single model
#[derive(Debug)]
pub struct CircuitBreaker {
    model_id: String,
    config: BreakerConfig,

    /// 0 = Closed, 1 = Open, 2 = `HalfOpen`
    state: AtomicU32,
    consecutive_failures: AtomicU32,

    /// Millis since `startup`, offset by one so 0 means never
    last_failure_ms: AtomicU64,

    /// When the outstanding half-open probe was handed out
    probe_claimed_ms: AtomicU64,

    startup: Instant,
}

impl CircuitBreaker {
    pub fn new(model_id: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            model_id: model_id.into(),
            config,
            state: AtomicU32::new(CLOSED),
            consecutive_failures: AtomicU32::new(0),
            last_failure_ms: AtomicU64::new(0),
            probe_claimed_ms: AtomicU64::new(0),
            startup: Instant::now(),
        }
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    #[must_use]
    pub fn state(&self) -> BreakerState {
        BreakerState::from_u32(self.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Whether traffic must be kept away from this model.
    ///
    /// An open breaker whose timeout has elapsed moves to half-open and
    /// returns `false` to exactly one caller, which becomes the probe. While
    /// the probe is outstanding every other caller sees `true`. A probe that
    /// never reports back forfeits its claim after one timeout.
    pub fn is_open(&self) -> bool {
        let now = self.now_millis();
        match self.state() {
            BreakerState::Closed => false,
            BreakerState::Open => {
                if !self.open_period_elapsed(now) {
                    return true;
                }
                if self
                    .state
                    .compare_exchange(OPEN, HALF_OPEN, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.probe_claimed_ms.store(now, Ordering::Release);
                    tracing::info!(
                        model = %self.model_id,
                        "Circuit breaker half-open, allowing probe"
                    );
                    false
                } else {
                    // Lost the race; only a concurrent success lets us through
                    self.state() == BreakerState::Closed
                }
            }
            BreakerState::HalfOpen => {
                let claimed = self.probe_claimed_ms.load(Ordering::Acquire);
                if now.saturating_sub(claimed) <= self.timeout_ms() {
                    return true;
                }
                // Lease expired; race other callers for the new probe
                if self
                    .probe_claimed_ms
                    .compare_exchange(claimed, now, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    tracing::info!(
                        model = %self.model_id,
                        "Half-open probe lease expired, allowing new probe"
                    );
                    false
                } else {
                    true
                }
            }
        }
    }

    /// Whether a new caller would be turned away, without claiming anything.
    ///
    /// True while open inside the timeout, or half-open with a probe lease
    /// still held. An open breaker past its timeout is admissible: the probe
    /// is only claimed by [`is_open`](Self::is_open) when a call is issued.
    #[must_use]
    pub fn peek_open(&self) -> bool {
        let now = self.now_millis();
        match self.state() {
            BreakerState::Closed => false,
            BreakerState::Open => !self.open_period_elapsed(now),
            BreakerState::HalfOpen => !self.probe_lease_expired(now),
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        let previous = self.state.swap(CLOSED, Ordering::AcqRel);
        if previous != CLOSED {
            tracing::info!(
                model = %self.model_id,
                from = %BreakerState::from_u32(previous),
                "Circuit breaker closed - model recovered"
            );
        }
    }

    pub fn record_failure(&self) {
        let now = self.now_millis();
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        self.last_failure_ms.store(now, Ordering::Release);

        match self.state() {
            BreakerState::Closed => {
                if failures >= self.config.failure_threshold
                    && self
                        .state
                        .compare_exchange(CLOSED, OPEN, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                {
                    tracing::warn!(
                        model = %self.model_id,
                        consecutive_failures = failures,
                        "Circuit breaker opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                if self
                    .state
                    .compare_exchange(HALF_OPEN, OPEN, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    tracing::warn!(
                        model = %self.model_id,
                        consecutive_failures = failures,
                        "Half-open probe failed, circuit breaker re-opened"
                    );
                }
            }
            BreakerState::Open => {}
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> CircuitBreakerState {
        let last = self.last_failure_ms.load(Ordering::Acquire);
        let since_last_failure = (last != 0)
            .then(|| Duration::from_millis(self.now_millis().saturating_sub(last)));
        CircuitBreakerState {
            model_id: self.model_id.clone(),
            state: self.state(),
            consecutive_failures: self.consecutive_failures(),
            since_last_failure,
        }
    }

    fn open_period_elapsed(&self, now: u64) -> bool {
        let last = self.last_failure_ms.load(Ordering::Acquire);
        now.saturating_sub(last) > self.timeout_ms()
    }

    fn probe_lease_expired(&self, now: u64) -> bool {
        let claimed = self.probe_claimed_ms.load(Ordering::Acquire);
        now.saturating_sub(claimed) > self.timeout_ms()
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    fn now_millis(&self) -> u64 {
        u64::try_from(self.startup.elapsed().as_millis()).unwrap_or(u64::MAX - 1) + 1
    }
}

// ============================================================================
// Breaker Registry
// ============================================================================

/// Breakers for every model the engine has seen
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: BreakerConfig,
}

impl CircuitBreakerRegistry {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Breaker for `model_id`, created closed on first use
    pub fn breaker(&self, model_id: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(model_id) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .breakers
            .entry(model_id.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(model_id, self.config)));
        Arc::clone(entry.value())
    }

    #[must_use]
    pub fn get(&self, model_id: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(model_id).map(|b| Arc::clone(b.value()))
    }

    /// Whether a new call to `model_id` would be rejected; never claims a probe
    #[must_use]
    pub fn peek_open(&self, model_id: &str) -> bool {
        self.get(model_id).is_some_and(|b| b.peek_open())
    }

    /// Number of breakers that would reject a new caller
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.breakers.iter().filter(|b| b.peek_open()).count()
    }

    /// Snapshots of every breaker, sorted by model ID
    #[must_use]
    pub fn snapshots(&self) -> Vec<CircuitBreakerState> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        snapshots
    }

    #[must_use]
    pub fn config(&self) -> BreakerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, timeout_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "model-a",
            BreakerConfig {
                failure_threshold: threshold,
                timeout: Duration::from_secs(timeout_secs),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_exactly_threshold_failures() {
        let cb = breaker(5, 60);

        for _ in 0..4 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), BreakerState::Closed);
        assert!(!cb.is_open());

        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(cb.is_open());
        assert!(cb.peek_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let cb = breaker(5, 60);
        for _ in 0..4 {
            cb.record_failure();
        }
        cb.record_success();
        assert_eq!(cb.consecutive_failures(), 0);

        for _ in 0..4 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_open_until_timeout_strictly_elapsed() {
        let cb = breaker(1, 60);
        cb.record_failure();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cb.is_open());

        tokio::time::advance(Duration::from_millis(5)).await;
        assert!(!cb.is_open());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_allows_exactly_one_probe() {
        let cb = breaker(1, 60);
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(!cb.is_open());
        assert!(cb.is_open());
        assert!(cb.is_open());
        assert!(cb.peek_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_success_closes() {
        let cb = breaker(2, 60);
        cb.record_failure();
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!cb.is_open());

        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
        assert!(!cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_reopens_and_restarts_timer() {
        let cb = breaker(3, 60);
        for _ in 0..3 {
            cb.record_failure();
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!cb.is_open());

        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cb.is_open());
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.since_last_failure, Some(Duration::from_secs(30)));
        assert_eq!(snapshot.consecutive_failures, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_probe_lease_expires() {
        let cb = breaker(1, 10);
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!cb.is_open());
        assert!(cb.is_open());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!cb.peek_open());
        assert!(!cb.is_open());
        assert!(cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_peek_does_not_claim_probe() {
        let cb = breaker(1, 60);
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(!cb.peek_open());
        assert!(!cb.peek_open());
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_probe_claims() {
        let cb = Arc::new(breaker(1, 60));
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(61)).await;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cb = Arc::clone(&cb);
                tokio::task::spawn_blocking(move || cb.is_open())
            })
            .collect();
        let mut allowed = 0;
        for handle in handles {
            if !handle.await.unwrap() {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_lazily_creates_and_counts_open() {
        let registry = CircuitBreakerRegistry::new(BreakerConfig {
            failure_threshold: 1,
            timeout: Duration::from_secs(60),
        });

        assert!(!registry.peek_open("a"));
        assert!(registry.get("a").is_none());

        registry.breaker("a").record_failure();
        registry.breaker("b").record_success();

        assert_eq!(registry.open_count(), 1);
        assert!(registry.peek_open("a"));
        let states: Vec<_> = registry.snapshots().into_iter().map(|s| s.state).collect();
        assert_eq!(states, vec![BreakerState::Open, BreakerState::Closed]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peek_tracks_outstanding_half_open_lease() {
        let cb = breaker(1, 10);
        cb.record_failure();
        assert!(cb.peek_open());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!cb.peek_open());
        assert_eq!(cb.state(), BreakerState::Open);

        assert!(!cb.is_open());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(cb.peek_open());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!cb.peek_open());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_count_includes_held_half_open_lease() {
        let registry = CircuitBreakerRegistry::new(BreakerConfig {
            failure_threshold: 1,
            timeout: Duration::from_secs(10),
        });
        registry.breaker("a").record_failure();
        registry.breaker("b").record_failure();
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(registry.open_count(), 0);

        assert!(!registry.breaker("a").is_open());
        assert_eq!(registry.open_count(), 1);

        registry.breaker("a").record_success();
        assert_eq!(registry.open_count(), 0);
    }
}
