//! Bounded retry for relay connections.
//!
//! A relay that refuses the first connection attempt is retried with
//! exponentially growing delays until the attempt budget is spent.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with an attempt budget.
///
/// `max_attempts` counts every connection attempt, including the first, so a
/// budget of 3 yields two delays: `initial` and `2 * initial`. Delays never
/// exceed `max`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExponentialBackoff {
    #[serde(with = "duration_ms", rename = "initial_delay_ms")]
    pub initial: Duration,
    #[serde(with = "duration_ms", rename = "max_delay_ms")]
    pub max: Duration,
    pub max_attempts: u32,
    #[serde(skip)]
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            max,
            max_attempts: max_attempts.max(1),
            attempt: 0,
        }
    }

    /// Record a failed attempt and return how long to wait before the next
    /// one, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempt = self.attempt.saturating_add(1);
        if self.attempt >= self.max_attempts {
            return None;
        }

        let factor = 2u32.saturating_pow(self.attempt - 1);
        Some(self.initial.saturating_mul(factor).min(self.max))
    }

    /// Failed attempts recorded so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(8), 3)
    }
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budget() {
        let mut backoff = ExponentialBackoff::default();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(500)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.attempt(), 3);
    }

    #[test]
    fn test_delay_is_capped() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(3), Duration::from_secs(8), 10);
        let delays: Vec<_> = std::iter::from_fn(|| backoff.next_delay()).collect();
        assert_eq!(delays.len(), 9);
        assert_eq!(delays[0], Duration::from_secs(3));
        assert_eq!(delays[1], Duration::from_secs(6));
        assert!(delays[2..].iter().all(|d| *d == Duration::from_secs(8)));
    }

    #[test]
    fn test_single_attempt_never_waits() {
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_secs(1), 0);
        assert_eq!(backoff.max_attempts, 1);
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn test_reset() {
        let mut backoff = ExponentialBackoff::default();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(500)));
    }
}
