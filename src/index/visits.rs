//! Bounded retry state for `visits` itinerary hydration.

use std::time::{Duration, Instant};

/// Hydration state of the `visits` field.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VisitsStatus {
    /// Every visible row had an itinerary at the last lookup.
    Ready,
    /// Some itineraries were missing; another attempt is scheduled.
    Retrying {
        /// Attempts made so far.
        attempt: u32,
        /// When the next attempt is due.
        next_at: Instant,
    },
    /// Retries are exhausted; the user has to request a refresh.
    ManualRefresh,
}

/// Retry policy and counters for itinerary hydration.
#[derive(Debug)]
pub struct VisitsRetry {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    attempts: u32,
    status: VisitsStatus,
}

impl VisitsRetry {
    /// Creates a policy allowing `max_attempts` retries.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            attempts: 0,
            status: VisitsStatus::Ready,
        }
    }

    /// Current status.
    pub fn status(&self) -> VisitsStatus {
        self.status
    }

    /// Delay before retry number `attempt` (0-based): doubling, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Records a lookup with missing itineraries. Returns the next deadline,
    /// or `None` when no retry should be scheduled.
    pub fn on_unavailable(&mut self, now: Instant) -> Option<Instant> {
        match self.status {
            VisitsStatus::ManualRefresh => None,
            VisitsStatus::Retrying { next_at, .. } if next_at > now => Some(next_at),
            _ if self.attempts >= self.max_attempts => {
                self.status = VisitsStatus::ManualRefresh;
                None
            }
            _ => {
                let next_at = now + self.delay_for(self.attempts);
                self.attempts += 1;
                self.status = VisitsStatus::Retrying {
                    attempt: self.attempts,
                    next_at,
                };
                Some(next_at)
            }
        }
    }

    /// Records a fully hydrated lookup.
    pub fn on_ready(&mut self) {
        self.attempts = 0;
        self.status = VisitsStatus::Ready;
    }

    /// Resets the budget after the user asked for a refresh.
    pub fn manual_refresh(&mut self) {
        self.on_ready();
    }
}
