//! Reconnect Backoff Policy
//!
//! Computes the next permissible reconnect time from a close code and the
//! current waiting state. The key invariant is compounding: any still
//! pending wait is added to the new delay, so consecutive failures push the
//! eligible time strictly further out without needing a failure counter.

use std::time::{Duration, Instant};

/// Transport close codes the policy distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// 1000 - normal closure. Benign; recovers faster.
    Normal,
    /// 1001 - endpoint going away.
    GoingAway,
    /// 1012 - service restart / venue maintenance. Backs off hard.
    ServiceRestart,
    /// Any other code.
    Other(u16),
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            1001 => Self::GoingAway,
            1012 => Self::ServiceRestart,
            other => Self::Other(other),
        }
    }
}

impl CloseCode {
    /// The raw wire code.
    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::GoingAway => 1001,
            Self::ServiceRestart => 1012,
            Self::Other(code) => *code,
        }
    }
}

/// Per-session reconnect schedule.
///
/// Mutated only by [`push_back`](Self::push_back) (on transport loss) and
/// [`reset`](Self::reset) (on successful reconnect). `next_allowed_at` is
/// monotonically non-decreasing within a waiting episode.
#[derive(Debug, Clone)]
pub struct ReconnectSchedule {
    base_timeout: Duration,
    next_allowed_at: Instant,
}

impl ReconnectSchedule {
    /// Create a schedule that is immediately eligible to reconnect.
    #[must_use]
    pub const fn new(base_timeout: Duration, now: Instant) -> Self {
        Self {
            base_timeout,
            next_allowed_at: now,
        }
    }

    /// Whether a reconnect is allowed at `now`.
    #[must_use]
    pub fn can_reconnect(&self, now: Instant) -> bool {
        now >= self.next_allowed_at
    }

    /// Time remaining until a reconnect becomes allowed (zero if eligible).
    #[must_use]
    pub fn time_until_eligible(&self, now: Instant) -> Duration {
        self.next_allowed_at.saturating_duration_since(now)
    }

    /// The instant at which reconnecting becomes allowed.
    #[must_use]
    pub const fn next_allowed_at(&self) -> Instant {
        self.next_allowed_at
    }

    /// Push the next allowed reconnect time back after a transport loss.
    ///
    /// Returns the total delay applied, for logging. Rules:
    /// - normal closure: `base_timeout` while waiting, else `base_timeout / 2`;
    /// - service restart (venue maintenance): `base_timeout * 10`;
    /// - anything else: `base_timeout * 2` while waiting, else `base_timeout`;
    /// - the pending wait is always added on top.
    pub fn push_back(&mut self, code: CloseCode, now: Instant) -> Duration {
        let pending = self.time_until_eligible(now);
        let in_waiting_period = pending > Duration::ZERO;

        let base = match code {
            CloseCode::Normal => {
                if in_waiting_period {
                    self.base_timeout
                } else {
                    self.base_timeout / 2
                }
            }
            CloseCode::ServiceRestart => self.base_timeout * 10,
            CloseCode::GoingAway | CloseCode::Other(_) => {
                if in_waiting_period {
                    self.base_timeout * 2
                } else {
                    self.base_timeout
                }
            }
        };

        let delay = base + pending;
        self.next_allowed_at = now + delay;
        delay
    }

    /// Reset after a successful reconnect: immediately eligible again.
    pub fn reset(&mut self, now: Instant) {
        self.next_allowed_at = now;
    }
}
