//! Request staggering for sequential per-identifier dispatch
//!
//! When a retry level has too few identifiers to parallelize, each identifier
//! is sent on its own. The remote service throttles bursts of tiny requests,
//! so call starts are spaced out by a [`RequestGate`]. A fresh gate is created
//! by the cascade for every level and dropped at the end of that level.

use crate::config::StaggerPolicy;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Rate limiter gating the start of sequential batch calls
///
/// Cloning shares the underlying gate and counters.
#[derive(Clone)]
pub struct RequestGate {
    policy: StaggerPolicy,
    /// Held while sleeping in gated mode so concurrent callers queue up
    gate: Arc<Mutex<()>>,
    /// Number of turns granted so far
    granted: Arc<AtomicU64>,
}

impl RequestGate {
    /// Create a gate for one retry level
    #[must_use]
    pub fn new(policy: StaggerPolicy) -> Self {
        Self {
            policy,
            gate: Arc::new(Mutex::new(())),
            granted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Wait until the call with the given index may start
    ///
    /// - `Gated`: acquire the gate, sleep `delay`, release. Concurrent callers are
    ///   therefore spaced at least `delay` apart regardless of `index`.
    /// - `Indexed`: sleep `step × index` without any locking.
    pub async fn wait_turn(&self, index: usize) {
        match self.policy {
            StaggerPolicy::Gated { delay } => {
                let _guard = self.gate.lock().await;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            StaggerPolicy::Indexed { step } => {
                let wait = Self::indexed_delay(step, index);
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
            }
        }
        self.granted.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of turns granted since the gate was created
    pub fn granted(&self) -> u64 {
        self.granted.load(Ordering::Relaxed)
    }

    /// The policy this gate enforces
    pub fn policy(&self) -> StaggerPolicy {
        self.policy
    }

    fn indexed_delay(step: Duration, index: usize) -> Duration {
        let factor = u32::try_from(index).unwrap_or(u32::MAX);
        step.saturating_mul(factor)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn zero_delay_gate_returns_immediately() {
        let gate = RequestGate::new(StaggerPolicy::Gated {
            delay: Duration::ZERO,
        });

        let start = Instant::now();
        for i in 0..100 {
            gate.wait_turn(i).await;
        }

        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(gate.granted(), 100);
    }

    #[tokio::test]
    async fn gated_mode_serializes_concurrent_callers() {
        let gate = RequestGate::new(StaggerPolicy::Gated {
            delay: Duration::from_millis(40),
        });

        let start = Instant::now();
        let a = tokio::spawn({
            let gate = gate.clone();
            async move { gate.wait_turn(0).await }
        });
        let b = tokio::spawn({
            let gate = gate.clone();
            async move { gate.wait_turn(0).await }
        });
        a.await.unwrap();
        b.await.unwrap();

        assert!(
            start.elapsed() >= Duration::from_millis(80),
            "two gated turns must not overlap, took {:?}",
            start.elapsed()
        );
        assert_eq!(gate.granted(), 2);
    }

    #[tokio::test]
    async fn indexed_mode_scales_with_index() {
        let gate = RequestGate::new(StaggerPolicy::Indexed {
            step: Duration::from_millis(20),
        });

        let start = Instant::now();
        gate.wait_turn(0).await;
        assert!(start.elapsed() < Duration::from_millis(20), "index 0 waits nothing");

        let start = Instant::now();
        gate.wait_turn(3).await;
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn indexed_delay_saturates_instead_of_overflowing() {
        let delay = RequestGate::indexed_delay(Duration::from_secs(u64::MAX / 2), usize::MAX);
        assert_eq!(delay, Duration::MAX);
    }
}
