//! Run-scoped time budget shared by every blocking operation of a run.

use std::time::{Duration, Instant};

use thiserror::Error;

/// The run's global deadline has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("run deadline of {limit:?} exceeded")]
pub struct DeadlineExceeded {
    pub limit: Duration,
}

/// A deadline established once at run start and inherited by every
/// downstream call.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn starting_now(limit: Duration) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.limit
    }

    /// Return the remaining time budget, or an error once it is used up.
    pub fn remaining(&self) -> Result<Duration, DeadlineExceeded> {
        let remaining = self.limit.saturating_sub(self.elapsed());
        if remaining.is_zero() {
            return Err(DeadlineExceeded { limit: self.limit });
        }
        Ok(remaining)
    }

    fn expires_at(&self) -> Option<Instant> {
        self.start.checked_add(self.limit)
    }

    /// Whichever of the two deadlines expires first.
    pub fn earliest(self, other: Deadline) -> Deadline {
        match (self.expires_at(), other.expires_at()) {
            (Some(mine), Some(theirs)) if theirs < mine => other,
            (None, Some(_)) => other,
            _ => self,
        }
    }

    /// Layer a per-operation timeout under the run deadline.
    pub fn cap(&self, timeout: Duration) -> Result<Duration, DeadlineExceeded> {
        Ok(self.remaining()?.min(timeout))
    }
}
