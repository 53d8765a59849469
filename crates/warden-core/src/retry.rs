//! Bounded retry for dependencies that are not ready at startup

use tracing::{debug, error, info};

/// Outcome of polling a [`StartupRetry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStatus {
    /// Still waiting for the dependency
    Pending,
    /// The dependency reported ready
    Ready,
    /// Max attempts used up; the caller should disable itself
    Exhausted,
}

/// Probes a dependency at a fixed interval, up to a maximum number of attempts.
#[derive(Debug, Clone)]
pub struct StartupRetry {
    label: String,
    interval: f64,
    max_attempts: u32,
    attempts: u32,
    next_attempt_at: f64,
    status: RetryStatus,
}

impl StartupRetry {
    pub fn new(label: impl Into<String>, interval: f64, max_attempts: u32) -> Self {
        Self {
            label: label.into(),
            interval: interval.max(0.0),
            max_attempts: max_attempts.max(1),
            attempts: 0,
            next_attempt_at: 0.0,
            status: RetryStatus::Pending,
        }
    }

    /// Probe the dependency if an attempt is due. Once `Ready` or `Exhausted`
    /// the status is sticky and `probe` is no longer called.
    pub fn poll(&mut self, now: f64, probe: impl FnOnce() -> bool) -> RetryStatus {
        if self.status != RetryStatus::Pending || now < self.next_attempt_at {
            return self.status;
        }

        self.attempts += 1;
        if probe() {
            info!("{} ready after {} attempt(s)", self.label, self.attempts);
            self.status = RetryStatus::Ready;
        } else if self.attempts >= self.max_attempts {
            error!(
                "{} not ready after {} attempts, giving up",
                self.label, self.attempts
            );
            self.status = RetryStatus::Exhausted;
        } else {
            debug!(
                "{} not ready (attempt {}/{})",
                self.label, self.attempts, self.max_attempts
            );
            self.next_attempt_at = now + self.interval;
        }
        self.status
    }

    pub fn status(&self) -> RetryStatus {
        self.status
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
