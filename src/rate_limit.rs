//! Rate limiting for outbound receipts.
//!
//! A sliding one-minute window caps how many messages the dispatcher hands to
//! the transport. Rows over the cap are deferred to a later tick.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;

const WINDOW: Duration = Duration::from_secs(60);

/// Rate limiting error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// Rate limit exceeded; must wait before sending.
    #[error("rate limit exceeded; retry after {retry_after_secs}s")]
    Exceeded {
        /// Seconds to wait before retry.
        retry_after_secs: u64,
    },
}

/// Sliding-window limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Maximum messages allowed per minute.
    max_messages_per_minute: u32,
    /// Send timestamps inside the current window.
    window: VecDeque<Instant>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given per-minute limit.
    #[must_use]
    pub fn new(max_messages_per_minute: u32) -> Self {
        Self {
            max_messages_per_minute,
            window: VecDeque::new(),
        }
    }

    /// Limiter for a configured cap, where `0` means unlimited.
    #[must_use]
    pub fn from_limit(max_messages_per_minute: u32) -> Option<Self> {
        (max_messages_per_minute > 0).then(|| Self::new(max_messages_per_minute))
    }

    /// Claim a slot, recording the send on success.
    pub fn try_acquire(&mut self) -> Result<(), RateLimitError> {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&mut self, now: Instant) -> Result<(), RateLimitError> {
        while let Some(&first) = self.window.front() {
            if now.duration_since(first) >= WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }

        if self.window.len() >= self.max_messages_per_minute as usize {
            let retry_after_secs = self.window.front().map_or(1, |&oldest| {
                WINDOW
                    .saturating_sub(now.duration_since(oldest))
                    .as_secs()
                    .saturating_add(1)
            });
            return Err(RateLimitError::Exceeded { retry_after_secs });
        }

        self.window.push_back(now);
        Ok(())
    }

    /// Slots left in the current window.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.max_messages_per_minute
            .saturating_sub(u32::try_from(self.window.len()).unwrap_or(u32::MAX))
    }
}
