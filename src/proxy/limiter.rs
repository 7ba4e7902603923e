//! In-flight request limit with an explicit overload policy.
//!
//! # Responsibilities
//! - Bound concurrently forwarded requests (backpressure)
//! - Reject or briefly queue requests past the bound
//! - Release the slot when the relay finishes, fails, or the caller leaves
//!
//! # Design Decisions
//! - Semaphore permits, same as connection limiting on the listener side
//! - The permit travels with the response relay, so a slot is held until
//!   the last byte is relayed, not just until headers are sent

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{timeout_at, Instant};

use crate::config::schema::{LimitsConfig, OverloadMode};
use crate::error::ForwardError;
use crate::observability::metrics;

/// Behaviour once all slots are taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverloadPolicy {
    /// Fail immediately.
    Reject,
    /// Wait up to `max_wait` for a slot.
    Queue { max_wait: Duration },
}

impl From<&LimitsConfig> for OverloadPolicy {
    fn from(config: &LimitsConfig) -> Self {
        match config.overload {
            OverloadMode::Reject => OverloadPolicy::Reject,
            OverloadMode::Queue => OverloadPolicy::Queue {
                max_wait: Duration::from_millis(config.queue_timeout_ms),
            },
        }
    }
}

/// Shared in-flight limiter.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_in_flight: usize,
    policy: OverloadPolicy,
}

impl ConcurrencyLimiter {
    pub fn new(max_in_flight: usize, policy: OverloadPolicy) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            policy,
        }
    }

    pub fn from_config(config: &LimitsConfig) -> Self {
        Self::new(config.max_in_flight, OverloadPolicy::from(config))
    }

    /// Take a slot according to the overload policy. A queued wait never
    /// runs past `deadline`, the end of the request's total budget.
    pub async fn acquire(&self, deadline: Instant) -> Result<InFlightPermit, ForwardError> {
        let permit = match self.policy {
            OverloadPolicy::Reject => self.semaphore.clone().try_acquire_owned().ok(),
            OverloadPolicy::Queue { max_wait } => {
                let give_up = deadline.min(Instant::now() + max_wait);
                timeout_at(give_up, self.semaphore.clone().acquire_owned())
                    .await
                    .ok()
                    .and_then(Result::ok)
            }
        };

        match permit {
            Some(permit) => {
                metrics::in_flight_changed(1.0);
                Ok(InFlightPermit { _permit: permit })
            }
            None => Err(ForwardError::ServiceOverloaded {
                in_flight: self.in_flight(),
            }),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.max_in_flight
            .saturating_sub(self.semaphore.available_permits())
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }
}

/// A held in-flight slot, released on drop.
#[derive(Debug)]
pub struct InFlightPermit {
    _permit: OwnedSemaphorePermit,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        metrics::in_flight_changed(-1.0);
    }
}
