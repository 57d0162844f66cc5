//! Per-call planning context: cancellation, retry bounds and randomness

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::{RoboticsError, RoboticsResult};

use super::config::RetryPolicy;

/// Cloneable flag a caller flips to abort planning
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// State owned by one planning call
#[derive(Debug, Clone)]
pub struct PlanContext {
    pub cancel: CancellationToken,
    pub retry: RetryPolicy,
    rng: StdRng,
}

impl PlanContext {
    /// Context with an entropy-seeded RNG and an unbounded retry policy
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            retry: RetryPolicy::default(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Context whose random restarts are reproducible
    pub fn with_seed(seed: u64) -> Self {
        Self {
            cancel: CancellationToken::new(),
            retry: RetryPolicy::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fail with `Cancelled` if the caller asked to stop
    pub fn check_cancelled(&self) -> RoboticsResult<()> {
        if self.cancel.is_cancelled() {
            Err(RoboticsError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Uniform sample in `[-bound, bound]`
    pub fn sample_symmetric(&mut self, bound: f64) -> f64 {
        if bound > 0.0 {
            self.rng.gen_range(-bound..=bound)
        } else {
            0.0
        }
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.retry.timeout.map(|timeout| Instant::now() + timeout)
    }
}

impl Default for PlanContext {
    fn default() -> Self {
        Self::new()
    }
}
