use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use super::AuthError;

pub const MAX_ATTEMPTS: usize = 5;
pub const WINDOW: Duration = Duration::from_secs(5 * 60);

/// Sliding-window login limiter keyed by email.
pub struct LoginRateLimiter {
    attempts: Mutex<HashMap<String, VecDeque<Instant>>>,
    max_attempts: usize,
    window: Duration,
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new(MAX_ATTEMPTS, WINDOW)
    }
}

impl LoginRateLimiter {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            max_attempts,
            window,
        }
    }

    pub fn check(&self, email: &str) -> Result<(), AuthError> {
        self.check_at(email, Instant::now())
    }

    /// Records the attempt unless `max_attempts` already happened inside the
    /// window, in which case it is refused and not recorded.
    pub fn check_at(&self, email: &str, now: Instant) -> Result<(), AuthError> {
        let mut attempts = self.attempts.lock();
        let history = attempts.entry(email.to_lowercase()).or_default();

        while let Some(oldest) = history.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                history.pop_front();
            } else {
                break;
            }
        }

        if history.len() >= self.max_attempts {
            let retry_after = history
                .front()
                .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or(self.window);
            log::warn!("Too many login attempts for {}", email);
            return Err(AuthError::TooManyAttempts {
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }

        history.push_back(now);
        Ok(())
    }
}
