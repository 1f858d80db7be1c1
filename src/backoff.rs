//! Linear, error-aware backoff for validation retries.

use serde::{Deserialize, Serialize};

use crate::validator::{retry_delay_with_base, ErrorKind};

/// Tracks the 1-based attempt counter of a validation loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryBackoff {
    base_ms: u64,
    max_attempts: u32,
    attempt: u32,
}

impl RetryBackoff {
    /// Creates a backoff at attempt 1 that allows `max_attempts` probes.
    pub fn new(base_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_ms,
            max_attempts: max_attempts.max(1),
            attempt: 1,
        }
    }

    /// Returns the current attempt.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// True once the current attempt is the last one allowed.
    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Delay in milliseconds before the next attempt, given how the current
    /// one failed.
    pub fn delay_ms_for(&self, kind: ErrorKind) -> u64 {
        retry_delay_with_base(self.base_ms, self.attempt, kind)
    }

    /// Advances to the next attempt.
    pub fn next(&mut self) {
        self.attempt = self.attempt.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_starts_at_first_attempt() {
        let backoff = RetryBackoff::new(2000, 3);
        assert_eq!(backoff.attempt(), 1);
        assert!(!backoff.exhausted());
    }

    #[test]
    fn delay_grows_with_attempt() {
        let mut backoff = RetryBackoff::new(2000, 3);
        assert_eq!(backoff.delay_ms_for(ErrorKind::MissingPackage), 4000);
        backoff.next();
        assert_eq!(backoff.delay_ms_for(ErrorKind::MissingPackage), 8000);
        backoff.next();
        assert_eq!(backoff.delay_ms_for(ErrorKind::SandboxTimeout), 24000);
    }

    #[test]
    fn backoff_exhausts_at_max_attempts() {
        let mut backoff = RetryBackoff::new(2000, 2);
        backoff.next();
        assert!(backoff.exhausted());
    }

    #[test]
    fn zero_max_attempts_still_allows_one_probe() {
        let backoff = RetryBackoff::new(2000, 0);
        assert!(backoff.exhausted());
        assert_eq!(backoff.attempt(), 1);
    }

    #[test]
    fn first_timeout_waits_four_base_units() {
        let backoff = RetryBackoff::new(2000, 3);
        assert_eq!(backoff.delay_ms_for(ErrorKind::SandboxTimeout), 8000);
    }
}
